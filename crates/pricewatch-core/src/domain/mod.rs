//! # Domain Models
//!
//! Canonical domain types for the watchlist and its providers.
//!
//! | Type | Description |
//! |------|-------------|
//! | [`MonitoredSymbol`] | Watched symbol, thresholds and last quote |
//! | [`ProviderConfig`] | Provider endpoint, enablement and secrets |
//! | [`Quote`] | Normalized adapter output |
//! | [`Credentials`] | Decrypted secrets for one call |
//! | [`Ticker`] | Validated, uppercased user ticker |
//! | [`ThresholdSlot`] | Alert threshold 1 or 2 |
//!
//! Prices are [`rust_decimal::Decimal`] throughout so threshold comparisons are
//! exact.

mod models;
mod symbol;

pub use models::{
    Credentials, MonitoredSymbol, ProviderConfig, Quote, SecretField, StoredSecret, ThresholdSlot,
    DEFAULT_PROVIDER_ID, HISTORY_CAP,
};
pub use symbol::{Ticker, DEFAULT_QUOTE_CURRENCY};
