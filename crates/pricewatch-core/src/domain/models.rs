use std::fmt::{Debug, Formatter};

use rust_decimal::Decimal;
use serde::{Deserialize, Serialize};
use time::OffsetDateTime;

use crate::{ProviderKind, Ticker, ValidationError};

/// Rolling window kept in [`MonitoredSymbol::price_history`].
pub const HISTORY_CAP: usize = 30;

/// Provider id new and migrated symbols fall back to.
pub const DEFAULT_PROVIDER_ID: &str = "binance";

/// One of the two independent alert thresholds carried by a symbol.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(into = "u8", try_from = "u8")]
pub enum ThresholdSlot {
    First,
    Second,
}

impl ThresholdSlot {
    pub const ALL: [Self; 2] = [Self::First, Self::Second];

    pub const fn number(self) -> u8 {
        match self {
            Self::First => 1,
            Self::Second => 2,
        }
    }
}

impl From<ThresholdSlot> for u8 {
    fn from(value: ThresholdSlot) -> Self {
        value.number()
    }
}

impl TryFrom<u8> for ThresholdSlot {
    type Error = ValidationError;

    fn try_from(value: u8) -> Result<Self, Self::Error> {
        match value {
            1 => Ok(Self::First),
            2 => Ok(Self::Second),
            _ => Err(ValidationError::InvalidThresholdSlot { value }),
        }
    }
}

/// A watched symbol with its alert thresholds and last observed quote.
///
/// Identity is the `(symbol, provider_id)` pair.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct MonitoredSymbol {
    pub symbol: Ticker,
    pub provider_id: String,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub alert_threshold1: Option<Decimal>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub alert_threshold2: Option<Decimal>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub last_price: Option<Decimal>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub last_change_percent: Option<Decimal>,
    #[serde(default)]
    pub price_history: Vec<Decimal>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub display_name: Option<String>,
    #[serde(
        default,
        skip_serializing_if = "Option::is_none",
        with = "time::serde::rfc3339::option"
    )]
    pub updated_at: Option<OffsetDateTime>,
}

impl MonitoredSymbol {
    pub fn new(symbol: Ticker, provider_id: impl Into<String>) -> Self {
        Self {
            symbol,
            provider_id: provider_id.into(),
            alert_threshold1: None,
            alert_threshold2: None,
            last_price: None,
            last_change_percent: None,
            price_history: Vec::new(),
            display_name: None,
            updated_at: None,
        }
    }

    pub fn is_same(&self, symbol: &Ticker, provider_id: &str) -> bool {
        self.symbol == *symbol && self.provider_id == provider_id
    }

    pub const fn threshold(&self, slot: ThresholdSlot) -> Option<Decimal> {
        match slot {
            ThresholdSlot::First => self.alert_threshold1,
            ThresholdSlot::Second => self.alert_threshold2,
        }
    }

    /// Sets or clears one threshold. Non-positive values are rejected.
    pub fn set_threshold(
        &mut self,
        slot: ThresholdSlot,
        value: Option<Decimal>,
    ) -> Result<(), ValidationError> {
        if let Some(value) = value {
            if value <= Decimal::ZERO {
                return Err(ValidationError::InvalidThreshold {
                    value: value.to_string(),
                });
            }
        }

        match slot {
            ThresholdSlot::First => self.alert_threshold1 = value,
            ThresholdSlot::Second => self.alert_threshold2 = value,
        }
        Ok(())
    }

    /// Folds a freshly fetched quote into the price fields.
    ///
    /// The quote's history always replaces the stored series, so a failed
    /// history fetch leaves it empty. The series keeps at most `history_cap`
    /// most-recent points.
    pub fn apply_quote(&mut self, quote: &Quote, history_cap: usize, now: OffsetDateTime) {
        self.last_price = Some(quote.price);
        self.last_change_percent = Some(quote.change_percent_24h);

        self.price_history = quote.history.clone();
        truncate_front(&mut self.price_history, history_cap);

        if let Some(name) = quote.display_name.as_ref().filter(|name| !name.is_empty()) {
            self.display_name = Some(name.clone());
        }
        self.updated_at = Some(now);
    }

    /// Watchlist seeded on first run.
    pub fn default_watchlist() -> Vec<Self> {
        ["BTCUSDT", "ETHUSDT", "SOLUSDT", "PAXGUSDT"]
            .into_iter()
            .filter_map(|raw| Ticker::parse(raw).ok())
            .map(|ticker| Self::new(ticker, DEFAULT_PROVIDER_ID))
            .collect()
    }
}

fn truncate_front(values: &mut Vec<Decimal>, cap: usize) {
    if values.len() > cap {
        let excess = values.len() - cap;
        values.drain(..excess);
    }
}

/// Normalized quote produced by every provider adapter.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Quote {
    pub price: Decimal,
    pub change_percent_24h: Decimal,
    pub history: Vec<Decimal>,
    pub display_name: Option<String>,
}

impl Quote {
    pub fn new(price: Decimal, change_percent_24h: Decimal) -> Self {
        Self {
            price,
            change_percent_24h,
            history: Vec::new(),
            display_name: None,
        }
    }

    pub fn with_history(mut self, history: Vec<Decimal>) -> Self {
        self.history = history;
        self
    }

    pub fn with_display_name(mut self, display_name: Option<String>) -> Self {
        self.display_name = display_name;
        self
    }
}

/// Secret slots carried by a provider config.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum SecretField {
    ApiKey,
    SecretKey,
}

impl SecretField {
    pub const ALL: [Self; 2] = [Self::ApiKey, Self::SecretKey];
}

/// Current storage state of one secret field.
#[derive(Clone, Copy, PartialEq, Eq)]
pub enum StoredSecret<'a> {
    Absent,
    Plain(&'a str),
    Encrypted(&'a str),
}

impl Debug for StoredSecret<'_> {
    fn fmt(&self, f: &mut Formatter<'_>) -> std::fmt::Result {
        match self {
            Self::Absent => f.write_str("Absent"),
            Self::Plain(_) => f.write_str("Plain(<redacted>)"),
            Self::Encrypted(_) => f.write_str("Encrypted(..)"),
        }
    }
}

/// Connection settings for one provider.
///
/// Each secret field is either absent, plain or encrypted, never both plain
/// and encrypted. The setters below maintain that.
#[derive(Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct ProviderConfig {
    pub provider_id: String,
    pub kind: ProviderKind,
    pub name: String,
    pub enabled: bool,
    pub base_url: String,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    api_key_plain: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    api_key_encrypted: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    secret_key_plain: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    secret_key_encrypted: Option<String>,
}

impl ProviderConfig {
    pub fn new(
        provider_id: impl Into<String>,
        kind: ProviderKind,
        base_url: impl Into<String>,
    ) -> Result<Self, ValidationError> {
        let provider_id = provider_id.into().trim().to_owned();
        if provider_id.is_empty() {
            return Err(ValidationError::EmptyProviderId);
        }

        let base_url = base_url.into().trim().trim_end_matches('/').to_owned();
        if base_url.is_empty() {
            return Err(ValidationError::EmptyBaseUrl { provider_id });
        }

        Ok(Self {
            name: kind.label().to_owned(),
            provider_id,
            kind,
            enabled: kind.enabled_without_key(),
            base_url,
            api_key_plain: None,
            api_key_encrypted: None,
            secret_key_plain: None,
            secret_key_encrypted: None,
        })
    }

    pub fn with_name(mut self, name: impl Into<String>) -> Self {
        self.name = name.into();
        self
    }

    pub fn with_enabled(mut self, enabled: bool) -> Self {
        self.enabled = enabled;
        self
    }

    pub fn set_base_url(&mut self, base_url: &str) -> Result<(), ValidationError> {
        let base_url = base_url.trim().trim_end_matches('/');
        if base_url.is_empty() {
            return Err(ValidationError::EmptyBaseUrl {
                provider_id: self.provider_id.clone(),
            });
        }
        base_url.clone_into(&mut self.base_url);
        Ok(())
    }

    /// Provider set seeded on first run.
    pub fn defaults() -> Vec<Self> {
        [
            ("binance", ProviderKind::Binance, "https://api.binance.com/api/v3", true),
            (
                "binanceFutures",
                ProviderKind::BinanceFutures,
                "https://fapi.binance.com/fapi/v1",
                true,
            ),
            (
                "coingecko",
                ProviderKind::CoinGecko,
                "https://api.coingecko.com/api/v3",
                false,
            ),
            (
                "coinmarketcap",
                ProviderKind::CoinMarketCap,
                "https://pro-api.coinmarketcap.com/v1",
                false,
            ),
            ("ashare", ProviderKind::AShare, "https://qt.gtimg.cn", true),
        ]
        .into_iter()
        .filter_map(|(id, kind, base_url, enabled)| {
            Self::new(id, kind, base_url)
                .ok()
                .map(|config| config.with_enabled(enabled))
        })
        .collect()
    }

    pub fn secret(&self, field: SecretField) -> StoredSecret<'_> {
        let (plain, encrypted) = match field {
            SecretField::ApiKey => (&self.api_key_plain, &self.api_key_encrypted),
            SecretField::SecretKey => (&self.secret_key_plain, &self.secret_key_encrypted),
        };

        match (non_empty(encrypted), non_empty(plain)) {
            (Some(ciphertext), _) => StoredSecret::Encrypted(ciphertext),
            (None, Some(value)) => StoredSecret::Plain(value),
            (None, None) => StoredSecret::Absent,
        }
    }

    /// Stores a plaintext secret, dropping any ciphertext for the same field.
    pub fn set_plain(&mut self, field: SecretField, value: Option<String>) {
        let value = value.filter(|value| !value.is_empty());
        let (plain, encrypted) = self.slots_mut(field);
        *plain = value;
        *encrypted = None;
    }

    /// Stores a ciphertext, dropping any plaintext for the same field.
    pub fn set_encrypted(&mut self, field: SecretField, ciphertext: String) {
        let (plain, encrypted) = self.slots_mut(field);
        *plain = None;
        *encrypted = Some(ciphertext);
    }

    pub fn has_api_key(&self) -> bool {
        self.secret(SecretField::ApiKey) != StoredSecret::Absent
    }

    pub fn has_encrypted_secrets(&self) -> bool {
        SecretField::ALL
            .into_iter()
            .any(|field| matches!(self.secret(field), StoredSecret::Encrypted(_)))
    }

    pub fn has_plain_secrets(&self) -> bool {
        SecretField::ALL
            .into_iter()
            .any(|field| matches!(self.secret(field), StoredSecret::Plain(_)))
    }

    /// Resolves a config loaded from storage that populated both forms of a
    /// field. The ciphertext wins.
    pub fn normalize_secrets(&mut self) {
        for field in SecretField::ALL {
            let (plain, encrypted) = self.slots_mut(field);
            if non_empty(encrypted).is_some() {
                *plain = None;
            } else {
                *encrypted = None;
            }
            if plain.as_deref() == Some("") {
                *plain = None;
            }
        }
    }

    fn slots_mut(&mut self, field: SecretField) -> (&mut Option<String>, &mut Option<String>) {
        match field {
            SecretField::ApiKey => (&mut self.api_key_plain, &mut self.api_key_encrypted),
            SecretField::SecretKey => (&mut self.secret_key_plain, &mut self.secret_key_encrypted),
        }
    }
}

fn non_empty(value: &Option<String>) -> Option<&str> {
    value.as_deref().filter(|value| !value.is_empty())
}

impl Debug for ProviderConfig {
    fn fmt(&self, f: &mut Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("ProviderConfig")
            .field("provider_id", &self.provider_id)
            .field("kind", &self.kind)
            .field("name", &self.name)
            .field("enabled", &self.enabled)
            .field("base_url", &self.base_url)
            .field("api_key", &self.secret(SecretField::ApiKey))
            .field("secret_key", &self.secret(SecretField::SecretKey))
            .finish()
    }
}

/// Decrypted credentials for a single provider call.
#[derive(Clone, Default, PartialEq, Eq)]
pub struct Credentials {
    pub api_key: Option<String>,
    pub secret_key: Option<String>,
}

impl Credentials {
    pub fn api_key(&self) -> Option<&str> {
        self.api_key.as_deref().filter(|key| !key.is_empty())
    }
}

impl Debug for Credentials {
    fn fmt(&self, f: &mut Formatter<'_>) -> std::fmt::Result {
        let redact = |value: &Option<String>| value.as_ref().map(|_| "<redacted>");
        f.debug_struct("Credentials")
            .field("api_key", &redact(&self.api_key))
            .field("secret_key", &redact(&self.secret_key))
            .finish()
    }
}
