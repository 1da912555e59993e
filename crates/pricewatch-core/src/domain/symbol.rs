use std::fmt::{Display, Formatter};

use serde::{Deserialize, Serialize};

use crate::ValidationError;

const MAX_TICKER_LEN: usize = 24;

/// Quote currencies that already terminate a crypto trading pair.
const PAIR_SUFFIXES: [&str; 3] = ["USDT", "BTC", "ETH"];

/// Default quote currency appended to bare crypto tickers.
pub const DEFAULT_QUOTE_CURRENCY: &str = "USDT";

/// Canonical ticker as entered by the user, trimmed and uppercased.
///
/// Unlike exchange symbols this may start with a digit, since A-share codes
/// such as `600519` are plain numbers.
#[derive(Debug, Clone, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
#[serde(try_from = "String", into = "String")]
pub struct Ticker(String);

impl Ticker {
    pub fn parse(input: &str) -> Result<Self, ValidationError> {
        let trimmed = input.trim();
        if trimmed.is_empty() {
            return Err(ValidationError::EmptySymbol);
        }

        let normalized = trimmed.to_ascii_uppercase();
        let len = normalized.chars().count();
        if len > MAX_TICKER_LEN {
            return Err(ValidationError::SymbolTooLong {
                len,
                max: MAX_TICKER_LEN,
            });
        }

        for (index, ch) in normalized.chars().enumerate() {
            let valid = ch.is_ascii_alphanumeric() || matches!(ch, '.' | '-' | '_' | '/');
            if !valid {
                return Err(ValidationError::SymbolInvalidChar { ch, index });
            }
        }

        Ok(Self(normalized))
    }

    pub fn as_str(&self) -> &str {
        &self.0
    }

    /// Trading-pair form used by crypto providers: `BTC` becomes `BTCUSDT`,
    /// while `BTCUSDT`, `ETHBTC` and `LINKETH` are left alone.
    pub fn crypto_pair(&self) -> String {
        if PAIR_SUFFIXES
            .iter()
            .any(|suffix| self.0.ends_with(suffix))
        {
            self.0.clone()
        } else {
            format!("{}{DEFAULT_QUOTE_CURRENCY}", self.0)
        }
    }
}

impl Display for Ticker {
    fn fmt(&self, f: &mut Formatter<'_>) -> std::fmt::Result {
        f.write_str(self.as_str())
    }
}

impl TryFrom<String> for Ticker {
    type Error = ValidationError;

    fn try_from(value: String) -> Result<Self, Self::Error> {
        Self::parse(&value)
    }
}

impl TryFrom<&str> for Ticker {
    type Error = ValidationError;

    fn try_from(value: &str) -> Result<Self, Self::Error> {
        Self::parse(value)
    }
}

impl From<Ticker> for String {
    fn from(value: Ticker) -> Self {
        value.0
    }
}
