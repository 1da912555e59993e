use std::collections::HashMap;
use std::future::Future;
use std::pin::Pin;
use std::sync::Arc;

use rust_decimal::Decimal;
use serde::Deserialize;
use serde_json::Value;

use crate::adapters::{
    coingecko_id, decimal_from_value, get_checked, get_history, parse_json, tail,
};
use crate::data_source::{FetchError, QuoteRequest, QuoteSource};
use crate::http_client::{HttpClient, HttpRequest, DEFAULT_TIMEOUT_MS};
use crate::{ProviderKind, Quote};

const HISTORY_POINTS: usize = 24;

/// CoinGecko adapter. Tickers are translated to coin ids before any call.
#[derive(Clone)]
pub struct CoinGeckoAdapter {
    http_client: Arc<dyn HttpClient>,
    timeout_ms: u64,
}

impl CoinGeckoAdapter {
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

    fn authorize(&self, request: HttpRequest, req: &QuoteRequest) -> HttpRequest {
        let request = request
            .with_header("Accept", "application/json")
            .with_timeout_ms(self.timeout_ms);
        match req.credentials.api_key() {
            Some(api_key) => request.with_header("x-cg-demo-api-key", api_key),
            None => request,
        }
    }

    async fn fetch_price(&self, req: &QuoteRequest, coin_id: &str) -> Result<Quote, FetchError> {
        let ids = urlencoding::encode(coin_id);
        let request = self.authorize(
            HttpRequest::get(format!(
                "{}/simple/price?ids={ids}&vs_currencies=usd&include_24hr_change=true",
                req.base()
            )),
            req,
        );

        let response = get_checked(self.http_client.as_ref(), request, "CoinGecko").await?;
        let mut prices: HashMap<String, SimplePrice> = parse_json(&response, "CoinGecko")?;
        let entry = prices
            .remove(coin_id)
            .ok_or_else(|| FetchError::parse(format!("CoinGecko: coin '{coin_id}' not found")))?;

        let price = entry
            .usd
            .as_ref()
            .and_then(decimal_from_value)
            .ok_or_else(|| {
                FetchError::parse(format!("CoinGecko: coin '{coin_id}' has no usd price"))
            })?;
        let change = entry
            .usd_24h_change
            .as_ref()
            .and_then(decimal_from_value)
            .unwrap_or(Decimal::ZERO);

        Ok(Quote::new(price, change))
    }

    async fn fetch_chart(&self, req: &QuoteRequest, coin_id: &str) -> Vec<Decimal> {
        let request = self.authorize(
            HttpRequest::get(format!(
                "{}/coins/{}/market_chart?vs_currency=usd&days=1&interval=hourly",
                req.base(),
                urlencoding::encode(coin_id)
            )),
            req,
        );

        get_history(self.http_client.as_ref(), request, "CoinGecko", |response| {
            let chart: MarketChart =
                serde_json::from_slice(&response.body).map_err(|e| e.to_string())?;
            let closes = chart
                .prices
                .iter()
                .filter_map(|point| point.get(1).and_then(decimal_from_value))
                .collect::<Vec<_>>();
            Ok(tail(closes, HISTORY_POINTS))
        })
        .await
    }
}

impl QuoteSource for CoinGeckoAdapter {
    fn kind(&self) -> ProviderKind {
        ProviderKind::CoinGecko
    }

    fn fetch_quote<'a>(
        &'a self,
        req: QuoteRequest,
    ) -> Pin<Box<dyn Future<Output = Result<Quote, FetchError>> + Send + 'a>> {
        Box::pin(async move {
            let coin_id = coingecko_id(req.symbol.as_str());
            let quote = self.fetch_price(&req, &coin_id).await?;
            let history = self.fetch_chart(&req, &coin_id).await;
            Ok(quote.with_history(history))
        })
    }
}

#[derive(Debug, Deserialize)]
struct SimplePrice {
    #[serde(default)]
    usd: Option<Value>,
    #[serde(default)]
    usd_24h_change: Option<Value>,
}

#[derive(Debug, Deserialize)]
struct MarketChart {
    #[serde(default)]
    prices: Vec<Vec<Value>>,
}
