use std::future::Future;
use std::pin::Pin;
use std::sync::Arc;

use rust_decimal::Decimal;
use serde::Deserialize;
use serde_json::Value;

use crate::adapters::{coinmarketcap_symbol, decimal_from_value, get_checked, parse_json};
use crate::data_source::{FetchError, QuoteRequest, QuoteSource};
use crate::http_client::{HttpClient, HttpRequest, DEFAULT_TIMEOUT_MS};
use crate::{ProviderKind, Quote};

/// CoinMarketCap adapter. Requires an API key; history is a paid upstream
/// feature and is always returned empty.
#[derive(Clone)]
pub struct CoinMarketCapAdapter {
    http_client: Arc<dyn HttpClient>,
    timeout_ms: u64,
}

impl CoinMarketCapAdapter {
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

impl QuoteSource for CoinMarketCapAdapter {
    fn kind(&self) -> ProviderKind {
        ProviderKind::CoinMarketCap
    }

    fn fetch_quote<'a>(
        &'a self,
        req: QuoteRequest,
    ) -> Pin<Box<dyn Future<Output = Result<Quote, FetchError>> + Send + 'a>> {
        Box::pin(async move {
            let Some(api_key) = req.credentials.api_key() else {
                return Err(FetchError::missing_credentials(
                    ProviderKind::CoinMarketCap.as_str(),
                ));
            };

            let cmc_symbol = coinmarketcap_symbol(req.symbol.as_str());
            let request = HttpRequest::get(format!(
                "{}/cryptocurrency/quotes/latest?symbol={}&convert=USD",
                req.base(),
                urlencoding::encode(&cmc_symbol)
            ))
            .with_header("X-CMC_PRO_API_KEY", api_key)
            .with_header("Accept", "application/json")
            .with_timeout_ms(self.timeout_ms);

            let response = get_checked(self.http_client.as_ref(), request, "CoinMarketCap").await?;
            let payload: QuotesLatest = parse_json(&response, "CoinMarketCap")?;

            if let Some(status) = payload.status.as_ref().filter(|status| status.error_code != 0) {
                return Err(FetchError::upstream(
                    response.status,
                    format!(
                        "CoinMarketCap error {}: {}",
                        status.error_code,
                        status.error_message.as_deref().unwrap_or("unknown error")
                    ),
                ));
            }

            let usd = payload
                .data
                .as_ref()
                .and_then(|data| data.get(&cmc_symbol))
                .and_then(first_listing)
                .and_then(|listing| listing.pointer("/quote/USD"))
                .ok_or_else(|| {
                    FetchError::parse(format!("CoinMarketCap: symbol '{cmc_symbol}' not found"))
                })?;

            let price = usd.get("price").and_then(decimal_from_value).ok_or_else(|| {
                FetchError::parse(format!("CoinMarketCap: symbol '{cmc_symbol}' has no USD price"))
            })?;
            let change = usd
                .get("percent_change_24h")
                .and_then(decimal_from_value)
                .unwrap_or(Decimal::ZERO);

            Ok(Quote::new(price, change))
        })
    }
}

/// The v1 endpoint keys a single object per symbol; v2 wraps it in an array.
fn first_listing(entry: &Value) -> Option<&Value> {
    match entry {
        Value::Array(listings) => listings.first(),
        Value::Object(_) => Some(entry),
        _ => None,
    }
}

#[derive(Debug, Deserialize)]
struct QuotesLatest {
    #[serde(default)]
    status: Option<CmcStatus>,
    #[serde(default)]
    data: Option<serde_json::Map<String, Value>>,
}

#[derive(Debug, Deserialize)]
struct CmcStatus {
    #[serde(default)]
    error_code: i64,
    #[serde(default)]
    error_message: Option<String>,
}

#[cfg(test)]
mod tests {
    use std::str::FromStr;

    use super::*;
    use crate::data_source::FetchErrorKind;
    use crate::http_client::ScriptedHttpClient;
    use crate::{Credentials, Ticker};

    const BASE: &str = "https://pro-api.cmc.test/v1";

    fn keyed(symbol: &str) -> QuoteRequest {
        QuoteRequest::new(Ticker::parse(symbol).expect("valid"), BASE).with_credentials(
            Credentials {
                api_key: Some(String::from("cmc-key")),
                secret_key: None,
            },
        )
    }

    #[tokio::test]
    async fn missing_key_fails_before_any_request() {
        let client = Arc::new(ScriptedHttpClient::new());
        let adapter = CoinMarketCapAdapter::new(client.clone());

        let error = adapter
            .fetch_quote(QuoteRequest::new(
                Ticker::parse("BTCUSDT").expect("valid"),
                BASE,
            ))
            .await
            .expect_err("must fail");

        assert_eq!(error.kind(), FetchErrorKind::MissingCredentials);
        assert_eq!(client.request_count(), 0);
    }

    #[tokio::test]
    async fn parses_usd_quote_for_mapped_symbol() {
        let client = Arc::new(ScriptedHttpClient::new().with_json(
            format!("{BASE}/cryptocurrency/quotes/latest?symbol=ETH"),
            r#"{"status":{"error_code":0},"data":{"ETH":{"quote":{"USD":{"price":3500.25,"percent_change_24h":2.5}}}}}"#,
        ));
        let adapter = CoinMarketCapAdapter::new(client.clone());

        let quote = adapter.fetch_quote(keyed("ETHUSDT")).await.expect("quote");

        assert_eq!(quote.price, Decimal::from_str("3500.25").expect("decimal"));
        assert_eq!(quote.change_percent_24h, Decimal::from_str("2.5").expect("decimal"));
        assert!(quote.history.is_empty());
        assert_eq!(client.requests()[0].header("x-cmc_pro_api_key"), Some("cmc-key"));
    }

    #[tokio::test]
    async fn api_level_error_code_is_upstream_error() {
        let client = Arc::new(ScriptedHttpClient::new().with_json(
            format!("{BASE}/cryptocurrency/quotes/latest"),
            r#"{"status":{"error_code":1002,"error_message":"API key missing."}}"#,
        ));
        let adapter = CoinMarketCapAdapter::new(client);

        let error = adapter.fetch_quote(keyed("BTCUSDT")).await.expect_err("must fail");

        assert_eq!(error.kind(), FetchErrorKind::Upstream);
        assert!(error.message().contains("API key missing."));
    }
}
