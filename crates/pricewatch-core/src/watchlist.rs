//! Authoritative watchlist and provider state.
//!
//! Every persisted key goes through [`WatchlistStore`]; nothing else touches the
//! [`KeyValueStore`]. Each key holds one JSON document that is read and written
//! wholesale:
//!
//! | Key | Document |
//! |-----|----------|
//! | `tokens` | `MonitoredSymbol[]` |
//! | `apiConfigs` | `{ providerId: ProviderConfig }` |
//! | `refreshInterval` | seconds |
//! | `passwordVerifier` | vault ciphertext |
//! | `hasCompletedSetup` | bool |

use std::collections::BTreeMap;
use std::sync::Arc;

use rust_decimal::Decimal;
use serde::de::DeserializeOwned;
use serde::Serialize;
use serde_json::{Map, Value};
use time::OffsetDateTime;
use tokio::sync::Mutex;
use tracing::{debug, warn};

use crate::kv_store::KeyValueStore;
use crate::{
    MonitoredSymbol, ProviderConfig, Quote, StoreError, ThresholdSlot, Ticker, ValidationError,
    DEFAULT_PROVIDER_ID, HISTORY_CAP,
};

pub const TOKENS_KEY: &str = "tokens";
pub const API_CONFIGS_KEY: &str = "apiConfigs";
pub const REFRESH_INTERVAL_KEY: &str = "refreshInterval";
pub const PASSWORD_VERIFIER_KEY: &str = "passwordVerifier";
pub const HAS_COMPLETED_SETUP_KEY: &str = "hasCompletedSetup";

pub const DEFAULT_REFRESH_INTERVAL_SECS: u64 = 10;
pub const MIN_REFRESH_INTERVAL_SECS: u64 = 5;

/// A fetched quote for one watched symbol, as produced by a poll cycle.
#[derive(Debug, Clone)]
pub struct QuoteUpdate {
    pub symbol: Ticker,
    pub provider_id: String,
    pub quote: Quote,
}

/// A quote that was folded into a symbol still on the watchlist.
#[derive(Debug, Clone)]
pub struct AppliedQuote {
    pub previous_price: Option<Decimal>,
    pub symbol: MonitoredSymbol,
}

pub struct WatchlistStore {
    store: Arc<dyn KeyValueStore>,
    write_lock: Mutex<()>,
    history_cap: usize,
}

impl WatchlistStore {
    pub fn new(store: Arc<dyn KeyValueStore>) -> Self {
        Self {
            store,
            write_lock: Mutex::new(()),
            history_cap: HISTORY_CAP,
        }
    }

    pub fn with_history_cap(mut self, history_cap: usize) -> Self {
        self.history_cap = history_cap.max(1);
        self
    }

    /// Watched symbols, with legacy records migrated on the fly. Records that
    /// cannot be read are skipped.
    pub async fn symbols(&self) -> Result<Vec<MonitoredSymbol>, StoreError> {
        let Some(raw) = self.store.get(TOKENS_KEY).await? else {
            return Ok(Vec::new());
        };
        let Value::Array(records) = raw else {
            warn!(key = TOKENS_KEY, "stored watchlist is not an array; ignoring it");
            return Ok(Vec::new());
        };

        Ok(records
            .into_iter()
            .filter_map(|record| {
                let migrated = migrate_legacy_record(record);
                match serde_json::from_value::<MonitoredSymbol>(migrated) {
                    Ok(symbol) => Some(symbol),
                    Err(error) => {
                        warn!(error = %error, "skipping unreadable watchlist record");
                        None
                    }
                }
            })
            .collect())
    }

    pub async fn provider_configs(&self) -> Result<BTreeMap<String, ProviderConfig>, StoreError> {
        let mut configs: BTreeMap<String, ProviderConfig> =
            self.read(API_CONFIGS_KEY).await?.unwrap_or_default();
        for (id, config) in &mut configs {
            config.provider_id.clone_from(id);
            config.normalize_secrets();
        }
        Ok(configs)
    }

    pub async fn provider_config(
        &self,
        provider_id: &str,
    ) -> Result<Option<ProviderConfig>, StoreError> {
        Ok(self.provider_configs().await?.remove(provider_id))
    }

    pub async fn add_symbol(
        &self,
        raw_symbol: &str,
        provider_id: &str,
    ) -> Result<MonitoredSymbol, StoreError> {
        let symbol = Ticker::parse(raw_symbol)?;
        let provider_id = provider_id.trim();

        let _guard = self.write_lock.lock().await;
        if !self.provider_configs().await?.contains_key(provider_id) {
            return Err(ValidationError::UnknownProvider {
                value: provider_id.to_owned(),
            }
            .into());
        }

        let mut symbols = self.symbols().await?;
        if symbols.iter().any(|entry| entry.is_same(&symbol, provider_id)) {
            return Err(StoreError::Duplicate {
                symbol: symbol.to_string(),
                provider_id: provider_id.to_owned(),
            });
        }

        let added = MonitoredSymbol::new(symbol, provider_id);
        symbols.push(added.clone());
        self.write(vec![entry(TOKENS_KEY, &symbols)?]).await?;
        Ok(added)
    }

    pub async fn remove_symbol(&self, raw_symbol: &str, provider_id: &str) -> Result<(), StoreError> {
        let symbol = Ticker::parse(raw_symbol)?;

        let _guard = self.write_lock.lock().await;
        let mut symbols = self.symbols().await?;
        let before = symbols.len();
        symbols.retain(|entry| !entry.is_same(&symbol, provider_id));
        if symbols.len() == before {
            return Err(not_found(&symbol, provider_id));
        }

        self.write(vec![entry(TOKENS_KEY, &symbols)?]).await
    }

    pub async fn set_threshold(
        &self,
        raw_symbol: &str,
        provider_id: &str,
        slot: ThresholdSlot,
        value: Option<Decimal>,
    ) -> Result<MonitoredSymbol, StoreError> {
        let symbol = Ticker::parse(raw_symbol)?;

        let _guard = self.write_lock.lock().await;
        let mut symbols = self.symbols().await?;
        let target = symbols
            .iter_mut()
            .find(|entry| entry.is_same(&symbol, provider_id))
            .ok_or_else(|| not_found(&symbol, provider_id))?;
        target.set_threshold(slot, value)?;
        let updated = target.clone();

        self.write(vec![entry(TOKENS_KEY, &symbols)?]).await?;
        Ok(updated)
    }

    /// Folds one cycle's quotes into the watchlist with a single write.
    ///
    /// The list is re-read under the write lock, so symbols removed or edited
    /// while the cycle was fetching keep the user's change. Quotes for symbols
    /// no longer watched are dropped.
    pub async fn apply_cycle(
        &self,
        updates: &[QuoteUpdate],
        now: OffsetDateTime,
    ) -> Result<Vec<AppliedQuote>, StoreError> {
        if updates.is_empty() {
            return Ok(Vec::new());
        }

        let _guard = self.write_lock.lock().await;
        let mut symbols = self.symbols().await?;
        let mut applied = Vec::with_capacity(updates.len());

        for update in updates {
            let Some(target) = symbols
                .iter_mut()
                .find(|entry| entry.is_same(&update.symbol, &update.provider_id))
            else {
                debug!(symbol = %update.symbol, provider = %update.provider_id, "dropping quote for unwatched symbol");
                continue;
            };

            let previous_price = target.last_price;
            target.apply_quote(&update.quote, self.history_cap, now);
            applied.push(AppliedQuote {
                previous_price,
                symbol: target.clone(),
            });
        }

        if !applied.is_empty() {
            self.write(vec![entry(TOKENS_KEY, &symbols)?]).await?;
        }
        Ok(applied)
    }

    /// Saves a provider config. `enabled` follows the stored credentials: a
    /// provider is enabled when it has an API key or does not need one.
    pub async fn upsert_provider(
        &self,
        mut config: ProviderConfig,
    ) -> Result<ProviderConfig, StoreError> {
        config.enabled = config.has_api_key() || config.kind.enabled_without_key();
        self.save_provider(config).await
    }

    /// Overrides the derived `enabled` flag.
    pub async fn set_provider_enabled(
        &self,
        provider_id: &str,
        enabled: bool,
    ) -> Result<ProviderConfig, StoreError> {
        let mut config = self.provider_config(provider_id).await?.ok_or_else(|| {
            ValidationError::UnknownProvider {
                value: provider_id.to_owned(),
            }
        })?;
        config.enabled = enabled;
        self.save_provider(config).await
    }

    async fn save_provider(&self, config: ProviderConfig) -> Result<ProviderConfig, StoreError> {
        let _guard = self.write_lock.lock().await;
        let mut configs = self.provider_configs().await?;
        configs.insert(config.provider_id.clone(), config.clone());
        self.write(vec![entry(API_CONFIGS_KEY, &configs)?]).await?;
        Ok(config)
    }

    /// Stored interval, clamped up to the minimum.
    pub async fn refresh_interval(&self) -> Result<u64, StoreError> {
        let stored: Option<u64> = self.read(REFRESH_INTERVAL_KEY).await?;
        Ok(stored
            .filter(|secs| *secs > 0)
            .unwrap_or(DEFAULT_REFRESH_INTERVAL_SECS)
            .max(MIN_REFRESH_INTERVAL_SECS))
    }

    pub async fn set_refresh_interval(&self, seconds: u64) -> Result<(), StoreError> {
        if seconds < MIN_REFRESH_INTERVAL_SECS {
            return Err(ValidationError::RefreshIntervalTooShort {
                seconds,
                min: MIN_REFRESH_INTERVAL_SECS,
            }
            .into());
        }
        let _guard = self.write_lock.lock().await;
        self.write(vec![entry(REFRESH_INTERVAL_KEY, &seconds)?]).await
    }

    pub async fn password_verifier(&self) -> Result<Option<String>, StoreError> {
        Ok(self
            .read::<String>(PASSWORD_VERIFIER_KEY)
            .await?
            .filter(|verifier| !verifier.is_empty()))
    }

    /// Writes a new verifier together with the provider configs sealed under
    /// the same password, in one batch.
    pub async fn set_password_verifier(
        &self,
        verifier: &str,
        configs: &BTreeMap<String, ProviderConfig>,
    ) -> Result<(), StoreError> {
        let _guard = self.write_lock.lock().await;
        self.write(vec![
            entry(PASSWORD_VERIFIER_KEY, &verifier)?,
            entry(API_CONFIGS_KEY, configs)?,
        ])
        .await
    }

    pub async fn has_completed_setup(&self) -> Result<bool, StoreError> {
        Ok(self
            .read::<bool>(HAS_COMPLETED_SETUP_KEY)
            .await?
            .unwrap_or(false))
    }

    /// Seeds the default providers and watchlist where they are missing, and
    /// rewrites migrated legacy records in the current shape. Safe to repeat.
    pub async fn seed_defaults(&self) -> Result<(), StoreError> {
        let _guard = self.write_lock.lock().await;
        let mut entries = Vec::new();

        if self.store.get(API_CONFIGS_KEY).await?.is_none() {
            let defaults = ProviderConfig::defaults()
                .into_iter()
                .map(|config| (config.provider_id.clone(), config))
                .collect::<BTreeMap<_, _>>();
            entries.push(entry(API_CONFIGS_KEY, &defaults)?);
        }

        let symbols = self.symbols().await?;
        let symbols = if symbols.is_empty() {
            MonitoredSymbol::default_watchlist()
        } else {
            symbols
        };
        entries.push(entry(TOKENS_KEY, &symbols)?);
        entries.push(entry(HAS_COMPLETED_SETUP_KEY, &true)?);

        self.write(entries).await
    }

    /// Deletes every persisted key.
    pub async fn reset(&self) -> Result<(), StoreError> {
        let _guard = self.write_lock.lock().await;
        self.store.clear().await
    }

    async fn read<T: DeserializeOwned>(&self, key: &str) -> Result<Option<T>, StoreError> {
        match self.store.get(key).await? {
            None | Some(Value::Null) => Ok(None),
            Some(value) => serde_json::from_value(value)
                .map(Some)
                .map_err(|source| StoreError::Corrupt {
                    key: key.to_owned(),
                    source,
                }),
        }
    }

    async fn write(&self, entries: Vec<(String, Value)>) -> Result<(), StoreError> {
        debug!(keys = entries.len(), "writing state batch");
        self.store.set_many(entries).await
    }
}

fn entry<T: Serialize + ?Sized>(key: &str, value: &T) -> Result<(String, Value), StoreError> {
    serde_json::to_value(value)
        .map(|value| (key.to_owned(), value))
        .map_err(|source| StoreError::Encode {
            key: key.to_owned(),
            source,
        })
}

fn not_found(symbol: &Ticker, provider_id: &str) -> StoreError {
    StoreError::NotFound {
        symbol: symbol.to_string(),
        provider_id: provider_id.to_owned(),
    }
}

/// Renames fields written by earlier releases to the current names.
///
/// `alertPrice` and `alertPrice1`/`alertPrice2` become the threshold slots,
/// `apiSource` becomes `providerId` (defaulting to binance), and the old price
/// fields move to `lastChangePercent` and `priceHistory`. Zero or null
/// thresholds mean "unset".
fn migrate_legacy_record(record: Value) -> Value {
    let Value::Object(mut fields) = record else {
        return record;
    };

    if let Some(legacy) = fields.remove("alertPrice") {
        fields.entry("alertPrice1").or_insert(legacy);
    }
    rename(&mut fields, "alertPrice1", "alertThreshold1");
    rename(&mut fields, "alertPrice2", "alertThreshold2");
    rename(&mut fields, "apiSource", "providerId");
    rename(&mut fields, "priceChangePercent", "lastChangePercent");
    rename(&mut fields, "history", "priceHistory");

    for key in ["alertThreshold1", "alertThreshold2"] {
        let unset = match fields.get(key) {
            Some(Value::Number(number)) => number.as_f64().is_some_and(|value| value <= 0.0),
            Some(Value::String(text)) => text.trim().is_empty(),
            Some(Value::Null) => true,
            _ => false,
        };
        if unset {
            fields.remove(key);
        }
    }

    let missing_provider = !matches!(fields.get("providerId"), Some(Value::String(id)) if !id.is_empty());
    if missing_provider {
        fields.insert(
            String::from("providerId"),
            Value::String(String::from(DEFAULT_PROVIDER_ID)),
        );
    }

    if let Some(Value::Array(points)) = fields.get_mut("priceHistory") {
        points.retain(|point| point.is_number() || point.is_string());
    }

    Value::Object(fields)
}

fn rename(fields: &mut Map<String, Value>, from: &str, to: &str) {
    if let Some(value) = fields.remove(from) {
        fields.entry(to).or_insert(value);
    }
}

#[cfg(test)]
mod tests {
    use std::str::FromStr;

    use serde_json::json;

    use super::*;
    use crate::kv_store::MemoryStore;

    async fn seeded() -> (Arc<MemoryStore>, WatchlistStore) {
        let memory = Arc::new(MemoryStore::new());
        let store = WatchlistStore::new(memory.clone());
        store.seed_defaults().await.expect("seed");
        (memory, store)
    }

    fn dec(value: &str) -> Decimal {
        Decimal::from_str(value).expect("decimal literal")
    }

    #[tokio::test]
    async fn seeds_defaults_once() {
        let (_memory, store) = seeded().await;
        store.add_symbol("600519", "ashare").await.expect("add");
        store.seed_defaults().await.expect("seed again");

        let symbols = store.symbols().await.expect("symbols");
        assert_eq!(symbols.len(), 5);
        assert!(store.has_completed_setup().await.expect("setup flag"));
        assert_eq!(store.provider_configs().await.expect("configs").len(), 5);
    }

    #[tokio::test]
    async fn rejects_duplicates_and_unknown_providers() {
        let (_memory, store) = seeded().await;

        let duplicate = store
            .add_symbol(" btcusdt ", "binance")
            .await
            .expect_err("duplicate must fail");
        assert!(matches!(duplicate, StoreError::Duplicate { .. }));

        store
            .add_symbol("BTCUSDT", "binanceFutures")
            .await
            .expect("same ticker on another provider");

        let unknown = store
            .add_symbol("BTCUSDT", "kraken")
            .await
            .expect_err("unknown provider must fail");
        assert!(matches!(
            unknown,
            StoreError::Validation(ValidationError::UnknownProvider { .. })
        ));
    }

    #[tokio::test]
    async fn migrates_legacy_records() {
        let memory = Arc::new(MemoryStore::new());
        memory
            .set_many(vec![(
                String::from(TOKENS_KEY),
                json!([
                    {"symbol": "BTCUSDT", "alertPrice": 50000, "lastPrice": 49000},
                    {"symbol": "ETHUSDT", "apiSource": "coingecko", "alertPrice1": null, "alertPrice2": 4000},
                    {"symbol": "bad symbol!"}
                ]),
            )])
            .await
            .expect("write legacy");
        let store = WatchlistStore::new(memory);

        let symbols = store.symbols().await.expect("symbols");

        assert_eq!(symbols.len(), 2);
        assert_eq!(symbols[0].provider_id, "binance");
        assert_eq!(symbols[0].alert_threshold1, Some(dec("50000")));
        assert_eq!(symbols[0].last_price, Some(dec("49000")));
        assert_eq!(symbols[1].provider_id, "coingecko");
        assert_eq!(symbols[1].alert_threshold1, None);
        assert_eq!(symbols[1].alert_threshold2, Some(dec("4000")));
    }

    #[tokio::test]
    async fn apply_cycle_writes_once_and_skips_removed_symbols() {
        let (memory, store) = seeded().await;
        store.remove_symbol("SOLUSDT", "binance").await.expect("remove");
        let writes_before = memory.batch_count();

        let updates = ["BTCUSDT", "SOLUSDT"]
            .into_iter()
            .map(|raw| QuoteUpdate {
                symbol: Ticker::parse(raw).expect("valid"),
                provider_id: String::from("binance"),
                quote: Quote::new(dec("10"), dec("1")),
            })
            .collect::<Vec<_>>();

        let applied = store
            .apply_cycle(&updates, OffsetDateTime::UNIX_EPOCH)
            .await
            .expect("apply");

        assert_eq!(applied.len(), 1);
        assert_eq!(applied[0].previous_price, None);
        assert_eq!(applied[0].symbol.last_price, Some(dec("10")));
        assert_eq!(memory.batch_count(), writes_before + 1);
    }

    #[tokio::test]
    async fn refresh_interval_is_clamped_and_validated() {
        let memory = Arc::new(MemoryStore::new());
        memory
            .set_many(vec![(String::from(REFRESH_INTERVAL_KEY), json!(2))])
            .await
            .expect("write");
        let store = WatchlistStore::new(memory);

        assert_eq!(
            store.refresh_interval().await.expect("interval"),
            MIN_REFRESH_INTERVAL_SECS
        );

        let error = store.set_refresh_interval(4).await.expect_err("too short");
        assert!(matches!(
            error,
            StoreError::Validation(ValidationError::RefreshIntervalTooShort { .. })
        ));

        store.set_refresh_interval(30).await.expect("valid interval");
        assert_eq!(store.refresh_interval().await.expect("interval"), 30);
    }

    #[tokio::test]
    async fn upsert_derives_enabled_from_api_key() {
        let (_memory, store) = seeded().await;
        let mut config = store
            .provider_config("coinmarketcap")
            .await
            .expect("read")
            .expect("seeded");
        assert!(!config.enabled);

        config.set_plain(crate::SecretField::ApiKey, Some(String::from("cmc-key")));
        let saved = store.upsert_provider(config).await.expect("upsert");
        assert!(saved.enabled);
    }

    #[tokio::test]
    async fn reset_clears_everything() {
        let (_memory, store) = seeded().await;
        store.reset().await.expect("reset");

        assert!(store.symbols().await.expect("symbols").is_empty());
        assert!(!store.has_completed_setup().await.expect("flag"));
        assert_eq!(
            store.refresh_interval().await.expect("interval"),
            DEFAULT_REFRESH_INTERVAL_SECS
        );
    }
}
