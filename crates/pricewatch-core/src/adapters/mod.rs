mod ashare;
mod binance;
mod coingecko;
mod coinmarketcap;
mod custom;
mod symbol_map;

pub use ashare::{AShareAdapter, ASHARE_KLINE_URL};
pub use binance::BinanceAdapter;
pub use coingecko::CoinGeckoAdapter;
pub use coinmarketcap::CoinMarketCapAdapter;
pub use custom::CustomAdapter;
pub use symbol_map::{coingecko_id, coinmarketcap_symbol, detect_ashare_market};

use std::str::FromStr;

use rust_decimal::Decimal;
use serde::de::DeserializeOwned;
use serde_json::Value;
use tracing::{debug, warn};

use crate::data_source::FetchError;
use crate::http_client::{HttpClient, HttpRequest, HttpResponse};

/// Runs the primary quote call. Transport failures and non-2xx statuses are
/// the only fatal outcomes of a fetch.
pub(crate) async fn get_checked(
    http_client: &dyn HttpClient,
    request: HttpRequest,
    provider: &str,
) -> Result<HttpResponse, FetchError> {
    debug!(provider, url = %request.url, "requesting quote");
    let response = http_client.execute(request).await.map_err(|error| {
        FetchError::transport(format!("{provider} transport error: {}", error.message()))
    })?;

    if !response.is_success() {
        return Err(FetchError::upstream(
            response.status,
            format!(
                "{provider} returned status {}: {}",
                response.status,
                snippet(&response.text())
            ),
        ));
    }

    Ok(response)
}

/// Runs a secondary history call. Every failure is logged and collapses to an
/// empty series.
pub(crate) async fn get_history<F>(
    http_client: &dyn HttpClient,
    request: HttpRequest,
    provider: &str,
    parse: F,
) -> Vec<Decimal>
where
    F: FnOnce(&HttpResponse) -> Result<Vec<Decimal>, String>,
{
    let url = request.url.clone();
    debug!(provider, url = %url, "requesting history");

    let response = match http_client.execute(request).await {
        Ok(response) => response,
        Err(error) => {
            warn!(provider, url = %url, error = %error, "history request failed");
            return Vec::new();
        }
    };

    if !response.is_success() {
        warn!(provider, url = %url, status = response.status, "history request rejected");
        return Vec::new();
    }

    match parse(&response) {
        Ok(history) => history,
        Err(reason) => {
            warn!(provider, url = %url, reason = %reason, "history response unusable");
            Vec::new()
        }
    }
}

pub(crate) fn parse_json<T: DeserializeOwned>(
    response: &HttpResponse,
    provider: &str,
) -> Result<T, FetchError> {
    serde_json::from_slice(&response.body)
        .map_err(|e| FetchError::parse(format!("failed to parse {provider} response: {e}")))
}

/// Reads a JSON number or numeric string as a decimal.
pub(crate) fn decimal_from_value(value: &Value) -> Option<Decimal> {
    match value {
        Value::Number(number) => decimal_from_str(&number.to_string()),
        Value::String(text) => decimal_from_str(text),
        _ => None,
    }
}

pub(crate) fn decimal_from_str(text: &str) -> Option<Decimal> {
    let trimmed = text.trim();
    if trimmed.is_empty() {
        return None;
    }
    Decimal::from_str(trimmed)
        .or_else(|_| Decimal::from_scientific(trimmed))
        .ok()
}

/// Keeps the last `limit` points.
pub(crate) fn tail(mut values: Vec<Decimal>, limit: usize) -> Vec<Decimal> {
    if values.len() > limit {
        values.drain(..values.len() - limit);
    }
    values
}

fn snippet(text: &str) -> String {
    const MAX: usize = 200;
    if text.chars().count() <= MAX {
        return text.trim().to_owned();
    }
    let cut = text.chars().take(MAX).collect::<String>();
    format!("{}...", cut.trim_end())
}
