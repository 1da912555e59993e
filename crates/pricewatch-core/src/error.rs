use thiserror::Error;

/// Validation and contract errors exposed by `pricewatch-core`.
#[derive(Debug, Error, Clone, PartialEq, Eq)]
pub enum ValidationError {
    #[error("symbol cannot be empty")]
    EmptySymbol,
    #[error("symbol length {len} exceeds max {max}")]
    SymbolTooLong { len: usize, max: usize },
    #[error("symbol contains invalid character '{ch}' at index {index}")]
    SymbolInvalidChar { ch: char, index: usize },

    #[error("invalid provider kind '{value}', expected one of binance, binanceFutures, coingecko, coinmarketcap, ashare, custom")]
    InvalidProviderKind { value: String },
    #[error("provider '{value}' is not configured")]
    UnknownProvider { value: String },
    #[error("provider id cannot be empty")]
    EmptyProviderId,
    #[error("provider '{provider_id}' requires a base url")]
    EmptyBaseUrl { provider_id: String },

    #[error("refresh interval must be at least {min}s, got {seconds}s")]
    RefreshIntervalTooShort { seconds: u64, min: u64 },

    #[error("alert threshold must be positive: '{value}'")]
    InvalidThreshold { value: String },
    #[error("threshold slot must be 1 or 2, got {value}")]
    InvalidThresholdSlot { value: u8 },
}

/// Persistence errors raised by the watchlist store.
#[derive(Debug, Error)]
pub enum StoreError {
    #[error(transparent)]
    Warehouse(#[from] pricewatch_warehouse::WarehouseError),

    #[error("stored value for '{key}' is malformed: {source}")]
    Corrupt {
        key: String,
        #[source]
        source: serde_json::Error,
    },

    #[error("failed to encode '{key}': {source}")]
    Encode {
        key: String,
        #[source]
        source: serde_json::Error,
    },

    #[error(transparent)]
    Validation(#[from] ValidationError),

    #[error("symbol '{symbol}' on provider '{provider_id}' is already watched")]
    Duplicate { symbol: String, provider_id: String },

    #[error("symbol '{symbol}' on provider '{provider_id}' is not watched")]
    NotFound { symbol: String, provider_id: String },

    #[error("storage task failed: {0}")]
    Task(String),
}

impl StoreError {
    pub const fn code(&self) -> &'static str {
        match self {
            Self::Warehouse(_) | Self::Task(_) => "store.backend",
            Self::Corrupt { .. } => "store.corrupt",
            Self::Encode { .. } => "store.encode",
            Self::Validation(_) => "store.validation",
            Self::Duplicate { .. } => "store.duplicate",
            Self::NotFound { .. } => "store.not_found",
        }
    }
}
