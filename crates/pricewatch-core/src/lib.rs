//! Core of pricewatch.
//!
//! This crate contains:
//! - Canonical watchlist and provider models with validation
//! - Quote adapters, one per provider kind, behind [`QuoteSource`]
//! - The credential vault sealing provider secrets under a password
//! - Threshold crossing detection
//! - The watchlist store mediating every persisted key
//! - The coordinating [`PriceWatch`] service and its [`PollScheduler`]

pub mod adapters;
pub mod alert;
pub mod config;
pub mod data_source;
pub mod domain;
pub mod error;
pub mod fetcher;
pub mod http_client;
pub mod kv_store;
pub mod provider_policy;
pub mod scheduler;
pub mod service;
pub mod source;
pub mod throttling;
pub mod vault;
pub mod watchlist;

pub use adapters::{
    AShareAdapter, BinanceAdapter, CoinGeckoAdapter, CoinMarketCapAdapter, CustomAdapter,
};
pub use alert::{detect_crossing, AlertCrossed, Crossing};
pub use config::WatchConfig;
pub use data_source::{FetchError, FetchErrorKind, QuoteRequest, QuoteSource};
pub use domain::{
    Credentials, MonitoredSymbol, ProviderConfig, Quote, SecretField, StoredSecret, ThresholdSlot,
    Ticker, DEFAULT_PROVIDER_ID, DEFAULT_QUOTE_CURRENCY, HISTORY_CAP,
};
pub use error::{StoreError, ValidationError};
pub use fetcher::QuoteFetcher;
pub use http_client::{
    HttpAuth, HttpClient, HttpError, HttpRequest, HttpResponse, ReqwestHttpClient,
    ScriptedHttpClient,
};
pub use kv_store::{KeyValueStore, MemoryStore};
pub use pricewatch_warehouse::{StateWarehouse, WarehouseConfig, WarehouseError};
pub use provider_policy::ProviderPolicy;
pub use scheduler::{CycleGate, PollScheduler, SchedulerState};
pub use service::{
    Command, CommandOutcome, CycleOutcome, CycleReport, PriceWatch, ServiceError, SymbolFailure,
    WatchEvent,
};
pub use source::ProviderKind;
pub use throttling::{ProviderThrottle, ThrottlingQueue};
pub use vault::{RekeyError, Vault, VaultError};
pub use watchlist::{AppliedQuote, QuoteUpdate, WatchlistStore};
