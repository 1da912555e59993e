use std::future::Future;
use std::pin::Pin;
use std::sync::Arc;

use rust_decimal::Decimal;
use serde_json::Value;

use crate::adapters::{
    decimal_from_str, decimal_from_value, detect_ashare_market, get_checked, get_history, tail,
};
use crate::data_source::{FetchError, QuoteRequest, QuoteSource};
use crate::http_client::{HttpClient, HttpRequest, DEFAULT_TIMEOUT_MS};
use crate::{ProviderKind, Quote};

/// Daily forward-adjusted kline endpoint for mainland equities.
pub const ASHARE_KLINE_URL: &str = "https://web.ifzq.gtimg.cn/appstock/app/fqkline/get";

const MIN_FIELDS: usize = 45;
const FIELD_NAME: usize = 1;
const FIELD_PRICE: usize = 3;
const FIELD_PREV_CLOSE: usize = 4;
const FIELD_CHANGE_PERCENT: usize = 32;
const KLINE_CLOSE_INDEX: usize = 2;
const HISTORY_DAYS: usize = 30;

/// Mainland China equities through the Tencent quote service.
///
/// Quotes come back as GBK text of the form
/// `v_sh600519="1~NAME~600519~1849.00~1857.88~..."`.
#[derive(Clone)]
pub struct AShareAdapter {
    http_client: Arc<dyn HttpClient>,
    timeout_ms: u64,
}

impl AShareAdapter {
    pub fn new(http_client: Arc<dyn HttpClient>) -> Self {
        Self {
            http_client,
            timeout_ms: DEFAULT_TIMEOUT_MS,
        }
    }

    pub fn with_timeout_ms(mut self, timeout_ms: u64) -> Self {
        self.timeout_ms = timeout_ms;
        self
    }

    async fn fetch_realtime(&self, req: &QuoteRequest, code: &str) -> Result<Quote, FetchError> {
        let request = HttpRequest::get(format!("{}/q={code}", req.base()))
            .with_timeout_ms(self.timeout_ms);
        let response = get_checked(self.http_client.as_ref(), request, "A-Share").await?;

        let (text, _, _) = encoding_rs::GBK.decode(&response.body);
        parse_realtime(&text, code)
    }

    async fn fetch_daily_closes(&self, code: &str) -> Vec<Decimal> {
        let request = HttpRequest::get(format!(
            "{ASHARE_KLINE_URL}?param={code},day,,,{HISTORY_DAYS},qfq"
        ))
        .with_timeout_ms(self.timeout_ms);

        get_history(self.http_client.as_ref(), request, "A-Share", |response| {
            let payload: Value =
                serde_json::from_slice(&response.body).map_err(|e| e.to_string())?;
            parse_klines(&payload, code)
        })
        .await
    }
}

impl QuoteSource for AShareAdapter {
    fn kind(&self) -> ProviderKind {
        ProviderKind::AShare
    }

    fn fetch_quote<'a>(
        &'a self,
        req: QuoteRequest,
    ) -> Pin<Box<dyn Future<Output = Result<Quote, FetchError>> + Send + 'a>> {
        Box::pin(async move {
            let code = detect_ashare_market(req.symbol.as_str());
            let quote = self.fetch_realtime(&req, &code).await?;
            let history = self.fetch_daily_closes(&code).await;
            Ok(quote.with_history(history))
        })
    }
}

fn parse_realtime(text: &str, code: &str) -> Result<Quote, FetchError> {
    let payload = extract_payload(text)
        .ok_or_else(|| FetchError::parse(format!("A-Share: invalid response for {code}")))?;

    let fields = payload.split('~').collect::<Vec<_>>();
    if fields.len() < MIN_FIELDS {
        return Err(FetchError::parse(format!(
            "A-Share: incomplete data for {code} ({} fields)",
            fields.len()
        )));
    }

    let price = decimal_from_str(fields[FIELD_PRICE])
        .filter(|price| *price > Decimal::ZERO)
        .ok_or_else(|| FetchError::parse(format!("A-Share: no usable price for {code}")))?;

    let change = decimal_from_str(fields[FIELD_CHANGE_PERCENT])
        .filter(|change| !change.is_zero())
        .or_else(|| {
            let prev_close = decimal_from_str(fields[FIELD_PREV_CLOSE])?;
            if prev_close.is_zero() {
                return None;
            }
            (price - prev_close)
                .checked_div(prev_close)?
                .checked_mul(Decimal::ONE_HUNDRED)
        })
        .unwrap_or(Decimal::ZERO);

    let name = fields[FIELD_NAME].trim();
    let display_name = (!name.is_empty()).then(|| name.to_owned());

    Ok(Quote::new(price, change).with_display_name(display_name))
}

/// Returns the text between `="` and the closing quote of the first
/// `v_CODE="..."` assignment.
fn extract_payload(text: &str) -> Option<&str> {
    let start = text.find("v_")?;
    let rest = &text[start..];
    let open = rest.find("=\"")? + 2;
    let close = rest[open..].find('"')?;
    let payload = &rest[open..open + close];
    (!payload.is_empty()).then_some(payload)
}

fn parse_klines(payload: &Value, code: &str) -> Result<Vec<Decimal>, String> {
    if payload.get("code").and_then(Value::as_i64) != Some(0) {
        return Err(String::from("kline response code is not 0"));
    }

    let stock = payload
        .pointer(&format!("/data/{code}"))
        .ok_or_else(|| format!("kline response has no entry for {code}"))?;
    let rows = stock
        .get("qfqday")
        .or_else(|| stock.get("day"))
        .and_then(Value::as_array)
        .ok_or_else(|| format!("kline response for {code} has no daily rows"))?;

    let closes = rows
        .iter()
        .filter_map(|row| row.get(KLINE_CLOSE_INDEX).and_then(decimal_from_value))
        .collect();
    Ok(tail(closes, HISTORY_DAYS))
}

#[cfg(test)]
mod tests {
    use std::str::FromStr;

    use super::*;
    use crate::data_source::FetchErrorKind;
    use crate::http_client::{HttpResponse, ScriptedHttpClient};
    use crate::Ticker;

    const BASE: &str = "https://qt.gtimg.test";

    fn tencent_line(code: &str, name: &str, price: &str, prev_close: &str, change: &str) -> String {
        let mut fields = vec![String::from("0"); MIN_FIELDS];
        fields[FIELD_NAME] = name.to_owned();
        fields[2] = code.trim_start_matches(|c: char| c.is_ascii_alphabetic()).to_owned();
        fields[FIELD_PRICE] = price.to_owned();
        fields[FIELD_PREV_CLOSE] = prev_close.to_owned();
        fields[FIELD_CHANGE_PERCENT] = change.to_owned();
        format!("v_{code}=\"{}\";\n", fields.join("~"))
    }

    #[test]
    fn computes_change_when_field_is_not_numeric() {
        let line = tencent_line("sh600519", "Moutai", "110.00", "100.00", "-");
        let quote = parse_realtime(&line, "sh600519").expect("quote");

        assert_eq!(quote.change_percent_24h, Decimal::from(10));
        assert_eq!(quote.display_name.as_deref(), Some("Moutai"));
    }

    #[test]
    fn short_payload_is_parse_error() {
        let error = parse_realtime("v_sh600519=\"1~x~600519~10\";", "sh600519")
            .expect_err("must fail");
        assert_eq!(error.kind(), FetchErrorKind::Parse);
    }

    #[tokio::test]
    async fn decodes_gbk_and_reads_qfq_closes() {
        let line = tencent_line("sz000001", "平安银行", "11.52", "11.40", "1.05");
        let (encoded, _, _) = encoding_rs::GBK.encode(&line);
        let client = Arc::new(
            ScriptedHttpClient::new()
                .with_route(format!("{BASE}/q=sz000001"), HttpResponse::new(200, encoded.to_vec()))
                .with_json(
                    ASHARE_KLINE_URL,
                    r#"{"code":0,"data":{"sz000001":{"qfqday":[["2024-01-02","11.0","11.10","11.2","10.9","100"],["2024-01-03","11.1","11.52","11.6","11.0","120"]]}}}"#,
                ),
        );
        let adapter = AShareAdapter::new(client.clone());

        let quote = adapter
            .fetch_quote(QuoteRequest::new(Ticker::parse("000001").expect("valid"), BASE))
            .await
            .expect("quote");

        assert_eq!(quote.display_name.as_deref(), Some("平安银行"));
        assert_eq!(quote.price, Decimal::from_str("11.52").expect("decimal"));
        assert_eq!(quote.change_percent_24h, Decimal::from_str("1.05").expect("decimal"));
        assert_eq!(
            quote.history,
            vec![
                Decimal::from_str("11.10").expect("decimal"),
                Decimal::from_str("11.52").expect("decimal"),
            ]
        );
        assert!(client.requests()[1]
            .url
            .ends_with("?param=sz000001,day,,,30,qfq"));
    }
}
