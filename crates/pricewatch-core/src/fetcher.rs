use std::sync::Arc;

use tracing::debug;

use crate::adapters::{
    AShareAdapter, BinanceAdapter, CoinGeckoAdapter, CoinMarketCapAdapter, CustomAdapter,
};
use crate::data_source::{FetchError, QuoteRequest, QuoteSource};
use crate::http_client::{HttpClient, DEFAULT_TIMEOUT_MS};
use crate::throttling::ProviderThrottle;
use crate::vault::{Vault, VaultError};
use crate::{ProviderConfig, ProviderKind, Quote, Ticker};

/// Fetches one quote for a watched symbol through the adapter matching the
/// provider's kind.
pub struct QuoteFetcher {
    binance: BinanceAdapter,
    binance_futures: BinanceAdapter,
    coingecko: CoinGeckoAdapter,
    coinmarketcap: CoinMarketCapAdapter,
    ashare: AShareAdapter,
    custom: CustomAdapter,
    throttle: ProviderThrottle,
}

impl QuoteFetcher {
    pub fn new(http_client: Arc<dyn HttpClient>) -> Self {
        Self::with_timeout_ms(http_client, DEFAULT_TIMEOUT_MS)
    }

    pub fn with_timeout_ms(http_client: Arc<dyn HttpClient>, timeout_ms: u64) -> Self {
        Self {
            binance: BinanceAdapter::spot(http_client.clone()).with_timeout_ms(timeout_ms),
            binance_futures: BinanceAdapter::futures(http_client.clone())
                .with_timeout_ms(timeout_ms),
            coingecko: CoinGeckoAdapter::new(http_client.clone()).with_timeout_ms(timeout_ms),
            coinmarketcap: CoinMarketCapAdapter::new(http_client.clone())
                .with_timeout_ms(timeout_ms),
            ashare: AShareAdapter::new(http_client.clone()).with_timeout_ms(timeout_ms),
            custom: CustomAdapter::new(http_client).with_timeout_ms(timeout_ms),
            throttle: ProviderThrottle::default(),
        }
    }

    pub fn with_throttle(mut self, throttle: ProviderThrottle) -> Self {
        self.throttle = throttle;
        self
    }

    fn source(&self, kind: ProviderKind) -> &dyn QuoteSource {
        match kind {
            ProviderKind::Binance => &self.binance,
            ProviderKind::BinanceFutures => &self.binance_futures,
            ProviderKind::CoinGecko => &self.coingecko,
            ProviderKind::CoinMarketCap => &self.coinmarketcap,
            ProviderKind::AShare => &self.ashare,
            ProviderKind::Custom => &self.custom,
        }
    }

    /// Checks run in order: enablement, key presence, credential decryption,
    /// quota. Only then does the adapter issue any request.
    pub async fn fetch(
        &self,
        vault: &Vault,
        config: &ProviderConfig,
        symbol: &Ticker,
    ) -> Result<Quote, FetchError> {
        if !config.enabled {
            return Err(FetchError::configuration(format!(
                "provider '{}' is disabled",
                config.provider_id
            )));
        }
        if config.kind.requires_api_key() && !config.has_api_key() {
            return Err(FetchError::missing_credentials(&config.provider_id));
        }

        let credentials = vault
            .resolve_credentials(config)
            .await
            .map_err(|error| match error {
                VaultError::UnlockRequired => FetchError::unlock_required(&config.provider_id),
                other => FetchError::vault(other.to_string()),
            })?;

        let symbol = if config.kind.quotes_crypto_pairs() {
            Ticker::parse(&symbol.crypto_pair()).map_err(|e| FetchError::configuration(e.to_string()))?
        } else {
            symbol.clone()
        };

        if !self.throttle.try_acquire(config.kind) {
            return Err(FetchError::rate_limited(&config.provider_id));
        }

        debug!(provider = %config.provider_id, kind = %config.kind, symbol = %symbol, "fetching quote");
        let request = QuoteRequest::new(symbol, config.base_url.clone()).with_credentials(credentials);
        self.source(config.kind).fetch_quote(request).await
    }
}

#[cfg(test)]
mod tests {
    use std::time::Duration;

    use super::*;
    use crate::data_source::FetchErrorKind;
    use crate::http_client::ScriptedHttpClient;
    use crate::provider_policy::ProviderPolicy;
    use crate::SecretField;

    const BINANCE: &str = "https://api.binance.com/api/v3";

    fn binance_config() -> ProviderConfig {
        ProviderConfig::new("binance", ProviderKind::Binance, BINANCE).expect("valid config")
    }

    fn ticker(raw: &str) -> Ticker {
        Ticker::parse(raw).expect("valid ticker")
    }

    #[tokio::test]
    async fn disabled_provider_is_a_configuration_error() {
        let client = Arc::new(ScriptedHttpClient::new());
        let fetcher = QuoteFetcher::new(client.clone());
        let config = binance_config().with_enabled(false);

        let error = fetcher
            .fetch(&Vault::new(), &config, &ticker("BTCUSDT"))
            .await
            .expect_err("disabled");

        assert_eq!(error.kind(), FetchErrorKind::Configuration);
        assert_eq!(client.request_count(), 0);
    }

    #[tokio::test]
    async fn keyless_coinmarketcap_fails_before_any_request() {
        let client = Arc::new(ScriptedHttpClient::new());
        let fetcher = QuoteFetcher::new(client.clone());
        let config = ProviderConfig::new(
            "coinmarketcap",
            ProviderKind::CoinMarketCap,
            "https://pro-api.coinmarketcap.com/v1",
        )
        .expect("valid config")
        .with_enabled(true);

        let error = fetcher
            .fetch(&Vault::new(), &config, &ticker("BTC"))
            .await
            .expect_err("no key");

        assert_eq!(error.kind(), FetchErrorKind::MissingCredentials);
        assert_eq!(client.request_count(), 0);
    }

    #[tokio::test]
    async fn locked_vault_is_unlock_required() {
        let client = Arc::new(ScriptedHttpClient::new());
        let fetcher = QuoteFetcher::new(client.clone());
        let mut config = binance_config();
        config.set_encrypted(SecretField::ApiKey, String::from("c2VhbGVk"));

        let error = fetcher
            .fetch(&Vault::new(), &config, &ticker("BTCUSDT"))
            .await
            .expect_err("locked");

        assert_eq!(error.kind(), FetchErrorKind::UnlockRequired);
        assert_eq!(client.request_count(), 0);
    }

    #[tokio::test]
    async fn crypto_tickers_are_paired_before_the_call() {
        let client = Arc::new(ScriptedHttpClient::new().with_json(
            format!("{BINANCE}/ticker/24hr"),
            r#"{"lastPrice":"3000.5","priceChangePercent":"1.2"}"#,
        ));
        let fetcher = QuoteFetcher::new(client.clone());

        fetcher
            .fetch(&Vault::new(), &binance_config(), &ticker("eth"))
            .await
            .expect("quote");

        let requests = client.requests();
        assert!(requests[0].url.ends_with("symbol=ETHUSDT"));
    }

    #[tokio::test]
    async fn exhausted_quota_skips_the_call() {
        let client = Arc::new(ScriptedHttpClient::new().with_json(
            format!("{BINANCE}/ticker/24hr"),
            r#"{"lastPrice":"1","priceChangePercent":"0"}"#,
        ));
        let throttle = ProviderThrottle::from_policies(&[ProviderPolicy {
            kind: ProviderKind::Binance,
            quota_window: Duration::from_secs(60),
            quota_limit: 1,
        }]);
        let fetcher = QuoteFetcher::new(client.clone()).with_throttle(throttle);
        let vault = Vault::new();
        let config = binance_config();

        fetcher
            .fetch(&vault, &config, &ticker("BTCUSDT"))
            .await
            .expect("first call fits the quota");
        let error = fetcher
            .fetch(&vault, &config, &ticker("BTCUSDT"))
            .await
            .expect_err("quota exhausted");

        assert_eq!(error.kind(), FetchErrorKind::RateLimited);
    }
}
