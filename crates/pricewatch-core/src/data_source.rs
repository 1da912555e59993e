//! Quote source contract and the structured error every adapter returns.
//!
//! Each [`ProviderKind`] has exactly one [`QuoteSource`] implementation in
//! [`crate::adapters`]. Adapters return `Result<Quote, FetchError>` for the
//! primary price call; trailing history is never an error channel and comes
//! back as a possibly empty `Vec` inside the [`Quote`].
//!
//! # Error kinds
//!
//! | Kind | Code | Cycle behavior |
//! |------|------|----------------|
//! | `Configuration` | `fetch.configuration` | skip symbol, keep stale data |
//! | `MissingCredentials` | `fetch.missing_credentials` | skip symbol |
//! | `Upstream` | `fetch.upstream` | skip symbol, log status |
//! | `Parse` | `fetch.parse` | skip symbol, log |
//! | `UnlockRequired` | `fetch.unlock_required` | skip symbol, notify (rate limited) |
//! | `Vault` | `fetch.vault` | skip symbol, vault session dropped |
//! | `Transport` | `fetch.transport` | skip symbol, log |
//! | `RateLimited` | `fetch.rate_limited` | skip symbol for this cycle |

use std::fmt::{Display, Formatter};
use std::future::Future;
use std::pin::Pin;

use serde::{Deserialize, Serialize};

use crate::{Credentials, ProviderKind, Quote, Ticker};

/// Stable error kind for provider fetch failures.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum FetchErrorKind {
    Configuration,
    MissingCredentials,
    Upstream,
    Parse,
    UnlockRequired,
    Vault,
    Transport,
    RateLimited,
}

/// Structured error returned from a quote fetch.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct FetchError {
    kind: FetchErrorKind,
    message: String,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    status: Option<u16>,
}

impl FetchError {
    fn new(kind: FetchErrorKind, message: impl Into<String>) -> Self {
        Self {
            kind,
            message: message.into(),
            status: None,
        }
    }

    pub fn configuration(message: impl Into<String>) -> Self {
        Self::new(FetchErrorKind::Configuration, message)
    }

    pub fn missing_credentials(provider_id: &str) -> Self {
        Self::new(
            FetchErrorKind::MissingCredentials,
            format!("provider '{provider_id}' requires an API key"),
        )
    }

    pub fn upstream(status: u16, message: impl Into<String>) -> Self {
        Self {
            status: Some(status),
            ..Self::new(FetchErrorKind::Upstream, message)
        }
    }

    pub fn parse(message: impl Into<String>) -> Self {
        Self::new(FetchErrorKind::Parse, message)
    }

    pub fn unlock_required(provider_id: &str) -> Self {
        Self::new(
            FetchErrorKind::UnlockRequired,
            format!("provider '{provider_id}' has encrypted credentials and the vault is locked"),
        )
    }

    pub fn vault(message: impl Into<String>) -> Self {
        Self::new(FetchErrorKind::Vault, message)
    }

    pub fn transport(message: impl Into<String>) -> Self {
        Self::new(FetchErrorKind::Transport, message)
    }

    pub fn rate_limited(provider_id: &str) -> Self {
        Self::new(
            FetchErrorKind::RateLimited,
            format!("provider '{provider_id}' quota exhausted for this window"),
        )
    }

    pub const fn kind(&self) -> FetchErrorKind {
        self.kind
    }

    pub fn message(&self) -> &str {
        &self.message
    }

    /// HTTP status of the failed primary call, for `Upstream` errors.
    pub const fn status(&self) -> Option<u16> {
        self.status
    }

    /// Whether the next cycle may reasonably succeed without user action.
    pub const fn retryable(&self) -> bool {
        matches!(
            self.kind,
            FetchErrorKind::Upstream | FetchErrorKind::Transport | FetchErrorKind::RateLimited
        )
    }

    pub const fn code(&self) -> &'static str {
        match self.kind {
            FetchErrorKind::Configuration => "fetch.configuration",
            FetchErrorKind::MissingCredentials => "fetch.missing_credentials",
            FetchErrorKind::Upstream => "fetch.upstream",
            FetchErrorKind::Parse => "fetch.parse",
            FetchErrorKind::UnlockRequired => "fetch.unlock_required",
            FetchErrorKind::Vault => "fetch.vault",
            FetchErrorKind::Transport => "fetch.transport",
            FetchErrorKind::RateLimited => "fetch.rate_limited",
        }
    }
}

impl Display for FetchError {
    fn fmt(&self, f: &mut Formatter<'_>) -> std::fmt::Result {
        match self.status {
            Some(status) => write!(f, "{} (status {status}): {}", self.code(), self.message),
            None => write!(f, "{}: {}", self.code(), self.message),
        }
    }
}

impl std::error::Error for FetchError {}

/// Everything an adapter needs for one quote call.
#[derive(Debug, Clone)]
pub struct QuoteRequest {
    pub symbol: Ticker,
    pub base_url: String,
    pub credentials: Credentials,
}

impl QuoteRequest {
    pub fn new(symbol: Ticker, base_url: impl Into<String>) -> Self {
        Self {
            symbol,
            base_url: base_url.into(),
            credentials: Credentials::default(),
        }
    }

    pub fn with_credentials(mut self, credentials: Credentials) -> Self {
        self.credentials = credentials;
        self
    }

    /// Base URL without a trailing slash.
    pub fn base(&self) -> &str {
        self.base_url.trim_end_matches('/')
    }
}

/// Adapter contract implemented once per provider kind.
pub trait QuoteSource: Send + Sync {
    fn kind(&self) -> ProviderKind;

    fn fetch_quote<'a>(
        &'a self,
        req: QuoteRequest,
    ) -> Pin<Box<dyn Future<Output = Result<Quote, FetchError>> + Send + 'a>>;
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn upstream_error_carries_status_and_code() {
        let error = FetchError::upstream(503, "binance returned status 503");

        assert_eq!(error.kind(), FetchErrorKind::Upstream);
        assert_eq!(error.status(), Some(503));
        assert_eq!(error.code(), "fetch.upstream");
        assert!(error.retryable());
        assert_eq!(
            error.to_string(),
            "fetch.upstream (status 503): binance returned status 503"
        );
    }

    #[test]
    fn credential_errors_are_not_retryable() {
        assert!(!FetchError::missing_credentials("coinmarketcap").retryable());
        assert!(!FetchError::unlock_required("coinmarketcap").retryable());
    }

    #[test]
    fn base_strips_trailing_slash() {
        let request = QuoteRequest::new(
            Ticker::parse("BTCUSDT").expect("valid"),
            "https://api.binance.com/api/v3/",
        );
        assert_eq!(request.base(), "https://api.binance.com/api/v3");
    }
}
