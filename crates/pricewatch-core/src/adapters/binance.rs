use std::future::Future;
use std::pin::Pin;
use std::sync::Arc;

use rust_decimal::Decimal;
use serde::Deserialize;
use serde_json::Value;

use crate::adapters::{decimal_from_str, decimal_from_value, get_checked, get_history, parse_json};
use crate::data_source::{FetchError, QuoteRequest, QuoteSource};
use crate::http_client::{HttpClient, HttpRequest, DEFAULT_TIMEOUT_MS};
use crate::{ProviderKind, Quote};

const KLINE_CLOSE_INDEX: usize = 4;

/// Binance spot and USD-M futures adapter. Both expose the same ticker and
/// kline endpoints under different base URLs.
#[derive(Clone)]
pub struct BinanceAdapter {
    kind: ProviderKind,
    http_client: Arc<dyn HttpClient>,
    timeout_ms: u64,
}

impl BinanceAdapter {
    pub fn spot(http_client: Arc<dyn HttpClient>) -> Self {
        Self {
            kind: ProviderKind::Binance,
            http_client,
            timeout_ms: DEFAULT_TIMEOUT_MS,
        }
    }

    pub fn futures(http_client: Arc<dyn HttpClient>) -> Self {
        Self {
            kind: ProviderKind::BinanceFutures,
            ..Self::spot(http_client)
        }
    }

    pub fn with_timeout_ms(mut self, timeout_ms: u64) -> Self {
        self.timeout_ms = timeout_ms;
        self
    }

    fn provider(&self) -> &'static str {
        self.kind.label()
    }

    async fn fetch_ticker(&self, req: &QuoteRequest) -> Result<Quote, FetchError> {
        let symbol = urlencoding::encode(req.symbol.as_str());
        let mut request = HttpRequest::get(format!("{}/ticker/24hr?symbol={symbol}", req.base()))
            .with_timeout_ms(self.timeout_ms);
        if let Some(api_key) = req.credentials.api_key() {
            request = request.with_header("X-MBX-APIKEY", api_key);
        }

        let response = get_checked(self.http_client.as_ref(), request, self.provider()).await?;
        let ticker: BinanceTicker = parse_json(&response, self.provider())?;

        let price = ticker
            .last_price
            .as_deref()
            .and_then(decimal_from_str)
            .ok_or_else(|| {
                FetchError::parse(format!(
                    "{} ticker for {} has no usable lastPrice",
                    self.provider(),
                    req.symbol
                ))
            })?;
        let change = ticker
            .price_change_percent
            .as_deref()
            .and_then(decimal_from_str)
            .unwrap_or(Decimal::ZERO);

        Ok(Quote::new(price, change))
    }

    async fn fetch_klines(&self, req: &QuoteRequest) -> Vec<Decimal> {
        let symbol = urlencoding::encode(req.symbol.as_str());
        let request = HttpRequest::get(format!(
            "{}/klines?symbol={symbol}&interval=1h&limit=24",
            req.base()
        ))
        .with_timeout_ms(self.timeout_ms);

        get_history(self.http_client.as_ref(), request, self.provider(), |response| {
            let rows: Vec<Vec<Value>> =
                serde_json::from_slice(&response.body).map_err(|e| e.to_string())?;
            Ok(rows
                .iter()
                .filter_map(|row| row.get(KLINE_CLOSE_INDEX).and_then(decimal_from_value))
                .collect())
        })
        .await
    }
}

impl QuoteSource for BinanceAdapter {
    fn kind(&self) -> ProviderKind {
        self.kind
    }

    fn fetch_quote<'a>(
        &'a self,
        req: QuoteRequest,
    ) -> Pin<Box<dyn Future<Output = Result<Quote, FetchError>> + Send + 'a>> {
        Box::pin(async move {
            let quote = self.fetch_ticker(&req).await?;
            let history = self.fetch_klines(&req).await;
            Ok(quote.with_history(history))
        })
    }
}

#[derive(Debug, Deserialize)]
#[serde(rename_all = "camelCase")]
struct BinanceTicker {
    #[serde(default)]
    last_price: Option<String>,
    #[serde(default)]
    price_change_percent: Option<String>,
}

#[cfg(test)]
mod tests {
    use std::str::FromStr;

    use super::*;
    use crate::data_source::FetchErrorKind;
    use crate::http_client::{HttpResponse, ScriptedHttpClient};
    use crate::{Credentials, Ticker};

    const BASE: &str = "https://api.binance.test/api/v3";

    fn request() -> QuoteRequest {
        QuoteRequest::new(Ticker::parse("BTCUSDT").expect("valid"), BASE)
    }

    #[tokio::test]
    async fn parses_ticker_and_kline_closes() {
        let client = Arc::new(
            ScriptedHttpClient::new()
                .with_json(
                    format!("{BASE}/ticker/24hr"),
                    r#"{"symbol":"BTCUSDT","lastPrice":"67000.50","priceChangePercent":"-1.25"}"#,
                )
                .with_json(
                    format!("{BASE}/klines"),
                    r#"[[1,"1","2","0.5","66000.00","10"],[2,"1","2","0.5","67000.50","10"]]"#,
                ),
        );
        let adapter = BinanceAdapter::spot(client.clone());

        let quote = adapter.fetch_quote(request()).await.expect("quote");

        assert_eq!(quote.price, Decimal::from_str("67000.50").expect("decimal"));
        assert_eq!(quote.change_percent_24h, Decimal::from_str("-1.25").expect("decimal"));
        assert_eq!(
            quote.history,
            vec![
                Decimal::from_str("66000.00").expect("decimal"),
                Decimal::from_str("67000.50").expect("decimal"),
            ]
        );
        assert_eq!(client.request_count(), 2);
    }

    #[tokio::test]
    async fn sends_api_key_header_only_when_configured() {
        let client = Arc::new(ScriptedHttpClient::new().with_json(
            format!("{BASE}/ticker/24hr"),
            r#"{"lastPrice":"1","priceChangePercent":"0"}"#,
        ));
        let adapter = BinanceAdapter::spot(client.clone());

        adapter.fetch_quote(request()).await.expect("anonymous quote");
        adapter
            .fetch_quote(request().with_credentials(Credentials {
                api_key: Some(String::from("mbx-key")),
                secret_key: None,
            }))
            .await
            .expect("keyed quote");

        let requests = client.requests();
        assert_eq!(requests[0].header("x-mbx-apikey"), None);
        assert_eq!(requests[2].header("x-mbx-apikey"), Some("mbx-key"));
    }

    #[tokio::test]
    async fn kline_failure_leaves_history_empty() {
        let client = Arc::new(
            ScriptedHttpClient::new()
                .with_json(
                    format!("{BASE}/ticker/24hr"),
                    r#"{"lastPrice":"2.5","priceChangePercent":"3"}"#,
                )
                .with_route(format!("{BASE}/klines"), HttpResponse::new(500, "boom")),
        );
        let adapter = BinanceAdapter::futures(client);

        let quote = adapter.fetch_quote(request()).await.expect("quote");

        assert!(quote.history.is_empty());
        assert_eq!(quote.price, Decimal::from_str("2.5").expect("decimal"));
    }

    #[tokio::test]
    async fn ticker_rejection_is_upstream_error() {
        let client = Arc::new(ScriptedHttpClient::new().with_route(
            format!("{BASE}/ticker/24hr"),
            HttpResponse::new(400, r#"{"code":-1121,"msg":"Invalid symbol."}"#),
        ));
        let adapter = BinanceAdapter::spot(client.clone());

        let error = adapter.fetch_quote(request()).await.expect_err("must fail");

        assert_eq!(error.kind(), FetchErrorKind::Upstream);
        assert_eq!(error.status(), Some(400));
        assert_eq!(client.request_count(), 1);
    }
}
