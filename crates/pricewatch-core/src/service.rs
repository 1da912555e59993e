//! Coordinating service.
//!
//! [`PriceWatch`] owns the state store, the vault, the quote fetcher and the
//! outbound event channel. Inbound [`Command`]s and scheduler ticks both end
//! up in [`PriceWatch::run_cycle`], which admits one cycle at a time.

use std::fmt::{Debug, Formatter};
use std::sync::{Arc, Mutex};
use std::time::Duration;

use futures::future::join_all;
use serde::Serialize;
use thiserror::Error;
use time::OffsetDateTime;
use tokio::sync::{broadcast, watch};
use tokio::time::Instant;
use tracing::{debug, info, info_span, warn, Instrument};
use uuid::Uuid;

use crate::alert::{self, AlertCrossed};
use crate::config::WatchConfig;
use crate::data_source::{FetchError, FetchErrorKind};
use crate::fetcher::QuoteFetcher;
use crate::http_client::HttpClient;
use crate::kv_store::KeyValueStore;
use crate::scheduler::{CycleGate, SchedulerState};
use crate::vault::{RekeyError, Vault, VaultError};
use crate::watchlist::{QuoteUpdate, WatchlistStore, DEFAULT_REFRESH_INTERVAL_SECS};
use crate::{MonitoredSymbol, ProviderConfig, StoreError};

#[derive(Debug, Error)]
pub enum ServiceError {
    #[error(transparent)]
    Store(#[from] StoreError),
    #[error(transparent)]
    Vault(#[from] VaultError),
}

impl ServiceError {
    pub const fn code(&self) -> &'static str {
        match self {
            Self::Store(error) => error.code(),
            Self::Vault(error) => error.code(),
        }
    }
}

impl From<RekeyError> for ServiceError {
    fn from(error: RekeyError) -> Self {
        match error {
            RekeyError::Vault(error) => Self::Vault(error),
            RekeyError::Store(error) => Self::Store(error),
        }
    }
}

/// Inbound commands. Each is safe to issue repeatedly.
#[derive(Clone, PartialEq, Eq)]
pub enum Command {
    RefreshNow,
    SettingsChanged,
    TokensChanged,
    PasswordSet(String),
    ResetAllData,
    RequestDefaultData,
}

impl Debug for Command {
    fn fmt(&self, f: &mut Formatter<'_>) -> std::fmt::Result {
        match self {
            Self::RefreshNow => f.write_str("RefreshNow"),
            Self::SettingsChanged => f.write_str("SettingsChanged"),
            Self::TokensChanged => f.write_str("TokensChanged"),
            Self::PasswordSet(_) => f.write_str("PasswordSet(<redacted>)"),
            Self::ResetAllData => f.write_str("ResetAllData"),
            Self::RequestDefaultData => f.write_str("RequestDefaultData"),
        }
    }
}

/// Outbound events for the presentation layer.
#[derive(Debug, Clone, Serialize)]
#[serde(tag = "event", rename_all = "camelCase", rename_all_fields = "camelCase")]
pub enum WatchEvent {
    /// Sent once per cycle that changed at least one symbol.
    PricesUpdated {
        cycle_id: Uuid,
        symbols: Vec<MonitoredSymbol>,
    },
    /// Sent at most once per cooldown period.
    UnlockRequired { provider_ids: Vec<String> },
    AlertCrossed(AlertCrossed),
}

/// A symbol skipped in one cycle.
#[derive(Debug, Clone, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct SymbolFailure {
    pub symbol: String,
    pub provider_id: String,
    pub code: &'static str,
    pub message: String,
}

#[derive(Debug, Clone, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct CycleReport {
    pub cycle_id: Uuid,
    #[serde(with = "time::serde::rfc3339")]
    pub started_at: OffsetDateTime,
    pub watched: usize,
    pub updated: usize,
    pub failures: Vec<SymbolFailure>,
    pub alerts: Vec<AlertCrossed>,
    pub latency_ms: u64,
}

#[derive(Debug, Clone)]
pub enum CycleOutcome {
    Completed(CycleReport),
    /// Another cycle was already running.
    Skipped,
}

#[derive(Debug, Clone)]
pub enum CommandOutcome {
    Cycle(CycleOutcome),
    Applied,
}

/// Rate limit for user-facing notices.
#[derive(Debug)]
struct NoticeThrottle {
    cooldown: Duration,
    last: Mutex<Option<Instant>>,
}

impl NoticeThrottle {
    fn new(cooldown: Duration) -> Self {
        Self {
            cooldown,
            last: Mutex::new(None),
        }
    }

    fn try_fire(&self) -> bool {
        let now = Instant::now();
        let mut last = self.last.lock().expect("notice throttle should not be poisoned");
        match *last {
            Some(previous) if now.duration_since(previous) < self.cooldown => false,
            _ => {
                *last = Some(now);
                true
            }
        }
    }

    fn reset(&self) {
        *self.last.lock().expect("notice throttle should not be poisoned") = None;
    }
}

pub struct PriceWatch {
    store: WatchlistStore,
    vault: Vault,
    fetcher: QuoteFetcher,
    gate: CycleGate,
    unlock_notices: NoticeThrottle,
    events: broadcast::Sender<WatchEvent>,
    interval: watch::Sender<Duration>,
}

impl PriceWatch {
    pub fn new(
        store: Arc<dyn KeyValueStore>,
        http_client: Arc<dyn HttpClient>,
        config: WatchConfig,
    ) -> Self {
        let fetcher = QuoteFetcher::with_timeout_ms(http_client, config.http_timeout_ms);
        Self::with_fetcher(store, fetcher, config)
    }

    pub fn with_fetcher(
        store: Arc<dyn KeyValueStore>,
        fetcher: QuoteFetcher,
        config: WatchConfig,
    ) -> Self {
        let (events, _) = broadcast::channel(config.event_capacity.max(1));
        let (interval, _) = watch::channel(Duration::from_secs(DEFAULT_REFRESH_INTERVAL_SECS));
        Self {
            store: WatchlistStore::new(store).with_history_cap(config.history_cap),
            vault: Vault::new(),
            fetcher,
            gate: CycleGate::default(),
            unlock_notices: NoticeThrottle::new(config.unlock_notice_cooldown),
            events,
            interval,
        }
    }

    pub fn store(&self) -> &WatchlistStore {
        &self.store
    }

    pub fn vault(&self) -> &Vault {
        &self.vault
    }

    pub fn subscribe(&self) -> broadcast::Receiver<WatchEvent> {
        self.events.subscribe()
    }

    pub fn interval_updates(&self) -> watch::Receiver<Duration> {
        self.interval.subscribe()
    }

    pub fn scheduler_state(&self) -> SchedulerState {
        self.gate.state()
    }

    /// Reads the stored refresh interval and publishes it to the scheduler.
    pub async fn sync_refresh_interval(&self) -> Result<Duration, ServiceError> {
        let period = Duration::from_secs(self.store.refresh_interval().await?);
        self.interval.send_if_modified(|current| {
            let changed = *current != period;
            *current = period;
            changed
        });
        Ok(period)
    }

    /// Opens the vault with an existing password.
    pub async fn unlock(&self, password: &str) -> Result<(), ServiceError> {
        let verifier = self
            .store
            .password_verifier()
            .await?
            .ok_or(VaultError::NotInitialized)?;
        self.vault.unlock(&verifier, password).await?;
        Ok(())
    }

    /// Saves a provider config, sealing plain secrets first when a vault
    /// password is set.
    pub async fn save_provider(
        &self,
        mut config: ProviderConfig,
    ) -> Result<ProviderConfig, ServiceError> {
        if config.has_plain_secrets() && self.store.password_verifier().await?.is_some() {
            self.vault.seal(&mut config).await?;
        }
        let saved = self.store.upsert_provider(config).await?;
        self.vault.invalidate_cache();
        Ok(saved)
    }

    pub async fn handle(&self, command: Command) -> Result<CommandOutcome, ServiceError> {
        debug!(command = ?command, "handling command");
        match command {
            Command::RefreshNow | Command::TokensChanged => {
                Ok(CommandOutcome::Cycle(self.run_cycle().await?))
            }
            Command::SettingsChanged => {
                self.sync_refresh_interval().await?;
                self.vault.invalidate_cache();
                Ok(CommandOutcome::Cycle(self.run_cycle().await?))
            }
            Command::PasswordSet(password) => {
                self.vault.set_password(&self.store, &password).await?;
                self.unlock_notices.reset();
                Ok(CommandOutcome::Cycle(self.run_cycle().await?))
            }
            Command::ResetAllData => {
                self.store.reset().await?;
                self.vault.lock();
                self.unlock_notices.reset();
                self.sync_refresh_interval().await?;
                info!("all data reset");
                Ok(CommandOutcome::Applied)
            }
            Command::RequestDefaultData => {
                self.store.seed_defaults().await?;
                Ok(CommandOutcome::Applied)
            }
        }
    }

    /// Runs one poll cycle unless one is already running.
    ///
    /// Symbols are fetched concurrently and fail independently. Results land
    /// in one batched write, followed by one `PricesUpdated` event and one
    /// `AlertCrossed` event per fired threshold.
    pub async fn run_cycle(&self) -> Result<CycleOutcome, ServiceError> {
        let Some(_ticket) = self.gate.try_enter() else {
            return Ok(CycleOutcome::Skipped);
        };

        let cycle_id = Uuid::new_v4();
        let span = info_span!("poll_cycle", cycle_id = %cycle_id);
        self.cycle(cycle_id).instrument(span).await.map(CycleOutcome::Completed)
    }

    async fn cycle(&self, cycle_id: Uuid) -> Result<CycleReport, ServiceError> {
        let started = Instant::now();
        let started_at = OffsetDateTime::now_utc();
        let symbols = self.store.symbols().await?;
        let configs = self.store.provider_configs().await?;

        let configs = &configs;
        let results = join_all(symbols.iter().map(|watched| async move {
            let outcome = match configs.get(&watched.provider_id) {
                Some(config) => self.fetcher.fetch(&self.vault, config, &watched.symbol).await,
                None => Err(FetchError::configuration(format!(
                    "provider '{}' is not configured",
                    watched.provider_id
                ))),
            };
            (watched, outcome)
        }))
        .await;

        let mut updates = Vec::new();
        let mut failures = Vec::new();
        let mut locked_providers = Vec::new();
        for (watched, outcome) in results {
            match outcome {
                Ok(quote) => updates.push(QuoteUpdate {
                    symbol: watched.symbol.clone(),
                    provider_id: watched.provider_id.clone(),
                    quote,
                }),
                Err(error) => {
                    warn!(
                        symbol = %watched.symbol,
                        provider = %watched.provider_id,
                        code = error.code(),
                        error = %error.message(),
                        "quote fetch failed; keeping last known values"
                    );
                    if error.kind() == FetchErrorKind::UnlockRequired
                        && !locked_providers.contains(&watched.provider_id)
                    {
                        locked_providers.push(watched.provider_id.clone());
                    }
                    failures.push(SymbolFailure {
                        symbol: watched.symbol.to_string(),
                        provider_id: watched.provider_id.clone(),
                        code: error.code(),
                        message: error.message().to_owned(),
                    });
                }
            }
        }

        if !locked_providers.is_empty() && self.unlock_notices.try_fire() {
            self.emit(WatchEvent::UnlockRequired {
                provider_ids: locked_providers,
            });
        }

        let applied = self
            .store
            .apply_cycle(&updates, OffsetDateTime::now_utc())
            .await?;

        let alerts = applied
            .iter()
            .flat_map(|entry| alert::evaluate(entry.previous_price, &entry.symbol))
            .collect::<Vec<_>>();

        if !applied.is_empty() {
            self.emit(WatchEvent::PricesUpdated {
                cycle_id,
                symbols: applied.iter().map(|entry| entry.symbol.clone()).collect(),
            });
        }
        for crossed in &alerts {
            info!(
                symbol = %crossed.symbol,
                slot = crossed.slot.number(),
                threshold = %crossed.threshold,
                price = %crossed.new_price,
                "alert threshold crossed"
            );
            self.emit(WatchEvent::AlertCrossed(crossed.clone()));
        }

        let report = CycleReport {
            cycle_id,
            started_at,
            watched: symbols.len(),
            updated: applied.len(),
            failures,
            alerts,
            latency_ms: u64::try_from(started.elapsed().as_millis()).unwrap_or(u64::MAX),
        };
        info!(
            watched = report.watched,
            updated = report.updated,
            failed = report.failures.len(),
            alerts = report.alerts.len(),
            latency_ms = report.latency_ms,
            "poll cycle finished"
        );
        Ok(report)
    }

    fn emit(&self, event: WatchEvent) {
        // No subscribers is not an error.
        let _ = self.events.send(event);
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::http_client::ScriptedHttpClient;
    use crate::kv_store::MemoryStore;

    fn service(client: ScriptedHttpClient) -> PriceWatch {
        PriceWatch::new(
            Arc::new(MemoryStore::new()),
            Arc::new(client),
            WatchConfig::default(),
        )
    }

    #[tokio::test]
    async fn empty_watchlist_completes_without_events() {
        let watch = service(ScriptedHttpClient::new());
        let mut events = watch.subscribe();

        let outcome = watch.run_cycle().await.expect("cycle");

        let CycleOutcome::Completed(report) = outcome else {
            panic!("cycle should run");
        };
        assert_eq!(report.watched, 0);
        assert!(events.try_recv().is_err());
    }

    #[tokio::test]
    async fn failures_are_reported_per_symbol() {
        let watch = service(ScriptedHttpClient::new());
        watch
            .handle(Command::RequestDefaultData)
            .await
            .expect("seed");

        let CommandOutcome::Cycle(CycleOutcome::Completed(report)) =
            watch.handle(Command::RefreshNow).await.expect("refresh")
        else {
            panic!("refresh should run a cycle");
        };

        assert_eq!(report.watched, 4);
        assert_eq!(report.updated, 0);
        assert!(report
            .failures
            .iter()
            .all(|failure| failure.code == "fetch.upstream"));
    }

    #[tokio::test]
    async fn settings_changed_publishes_the_interval() {
        let watch = service(ScriptedHttpClient::new());
        let mut intervals = watch.interval_updates();
        watch.store().set_refresh_interval(30).await.expect("interval");

        watch
            .handle(Command::SettingsChanged)
            .await
            .expect("settings");

        assert!(intervals.has_changed().expect("sender alive"));
        assert_eq!(*intervals.borrow_and_update(), Duration::from_secs(30));
    }

    #[tokio::test(start_paused = true)]
    async fn notice_throttle_respects_cooldown() {
        let throttle = NoticeThrottle::new(Duration::from_secs(60));

        assert!(throttle.try_fire());
        tokio::time::advance(Duration::from_secs(59)).await;
        assert!(!throttle.try_fire());
        tokio::time::advance(Duration::from_secs(1)).await;
        assert!(throttle.try_fire());
    }
}
