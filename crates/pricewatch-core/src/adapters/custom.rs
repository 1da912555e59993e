use std::future::Future;
use std::pin::Pin;
use std::sync::Arc;

use rust_decimal::Decimal;
use serde_json::Value;

use crate::adapters::{decimal_from_value, get_checked, parse_json};
use crate::data_source::{FetchError, QuoteRequest, QuoteSource};
use crate::http_client::{HttpAuth, HttpClient, HttpRequest, DEFAULT_TIMEOUT_MS};
use crate::{ProviderKind, Quote};

const PRICE_FIELDS: [&str; 3] = ["price", "lastPrice", "last"];
const CHANGE_FIELDS: [&str; 3] = ["change24h", "priceChangePercent", "changePercent"];
const HISTORY_FIELDS: [&str; 3] = ["history", "kline", "candles"];

/// User-supplied JSON endpoint with a loosely defined response shape.
///
/// `GET {base}?symbol=S` is expected to answer with a JSON object carrying the
/// price under one of a few common names.
#[derive(Clone)]
pub struct CustomAdapter {
    http_client: Arc<dyn HttpClient>,
    timeout_ms: u64,
}

impl CustomAdapter {
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
}

impl QuoteSource for CustomAdapter {
    fn kind(&self) -> ProviderKind {
        ProviderKind::Custom
    }

    fn fetch_quote<'a>(
        &'a self,
        req: QuoteRequest,
    ) -> Pin<Box<dyn Future<Output = Result<Quote, FetchError>> + Send + 'a>> {
        Box::pin(async move {
            let separator = if req.base_url.contains('?') { '&' } else { '?' };
            let auth = req
                .credentials
                .api_key()
                .map(|key| HttpAuth::BearerToken(key.to_owned()))
                .unwrap_or(HttpAuth::None);
            let request = HttpRequest::get(format!(
                "{}{separator}symbol={}",
                req.base_url,
                urlencoding::encode(req.symbol.as_str())
            ))
            .with_auth(&auth)
            .with_timeout_ms(self.timeout_ms);

            let response = get_checked(self.http_client.as_ref(), request, "custom").await?;
            let body: Value = parse_json(&response, "custom")?;
            parse_custom(&body)
        })
    }
}

fn parse_custom(body: &Value) -> Result<Quote, FetchError> {
    let price = PRICE_FIELDS
        .iter()
        .filter_map(|field| body.get(field).and_then(decimal_from_value))
        .find(|price| !price.is_zero())
        .ok_or_else(|| FetchError::parse("custom: could not find a price in the response"))?;

    let change = CHANGE_FIELDS
        .iter()
        .find_map(|field| body.get(field).and_then(decimal_from_value))
        .unwrap_or(Decimal::ZERO);

    let history = HISTORY_FIELDS
        .iter()
        .find_map(|field| body.get(field).and_then(Value::as_array))
        .map(|points| points.iter().filter_map(decimal_from_value).collect())
        .unwrap_or_default();

    Ok(Quote::new(price, change).with_history(history))
}

#[cfg(test)]
mod tests {
    use std::str::FromStr;

    use serde_json::json;

    use super::*;
    use crate::data_source::FetchErrorKind;

    #[test]
    fn accepts_alternate_price_field_names() {
        let quote = parse_custom(&json!({"lastPrice": "42.10", "changePercent": -0.5}))
            .expect("quote");

        assert_eq!(quote.price, Decimal::from_str("42.10").expect("decimal"));
        assert_eq!(quote.change_percent_24h, Decimal::from_str("-0.5").expect("decimal"));
    }

    #[test]
    fn zero_price_falls_through_to_next_field() {
        let quote = parse_custom(&json!({"price": 0, "last": 7})).expect("quote");
        assert_eq!(quote.price, Decimal::from(7));
    }

    #[test]
    fn drops_non_numeric_history_points() {
        let quote = parse_custom(&json!({"price": 1, "candles": [1, "2", null, {"c": 3}]}))
            .expect("quote");
        assert_eq!(quote.history, vec![Decimal::from(1), Decimal::from(2)]);
    }

    #[test]
    fn missing_price_is_parse_error() {
        let error = parse_custom(&json!({"volume": 10})).expect_err("must fail");
        assert_eq!(error.kind(), FetchErrorKind::Parse);
    }
}
