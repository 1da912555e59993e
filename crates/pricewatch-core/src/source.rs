use std::fmt::{Display, Formatter};
use std::str::FromStr;

use serde::{Deserialize, Serialize};

use crate::ValidationError;

/// Closed set of provider kinds. Adding a provider means adding a variant here
/// and one adapter in [`crate::adapters`].
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
pub enum ProviderKind {
    #[serde(rename = "binance")]
    Binance,
    #[serde(rename = "binanceFutures")]
    BinanceFutures,
    #[serde(rename = "coingecko")]
    CoinGecko,
    #[serde(rename = "coinmarketcap")]
    CoinMarketCap,
    #[serde(rename = "ashare")]
    AShare,
    #[serde(rename = "custom")]
    Custom,
}

impl ProviderKind {
    pub const ALL: [Self; 6] = [
        Self::Binance,
        Self::BinanceFutures,
        Self::CoinGecko,
        Self::CoinMarketCap,
        Self::AShare,
        Self::Custom,
    ];

    pub const fn as_str(self) -> &'static str {
        match self {
            Self::Binance => "binance",
            Self::BinanceFutures => "binanceFutures",
            Self::CoinGecko => "coingecko",
            Self::CoinMarketCap => "coinmarketcap",
            Self::AShare => "ashare",
            Self::Custom => "custom",
        }
    }

    pub const fn label(self) -> &'static str {
        match self {
            Self::Binance => "Binance",
            Self::BinanceFutures => "Binance Futures",
            Self::CoinGecko => "CoinGecko",
            Self::CoinMarketCap => "CoinMarketCap",
            Self::AShare => "A-Share",
            Self::Custom => "Custom",
        }
    }

    /// Providers that refuse anonymous access.
    pub const fn requires_api_key(self) -> bool {
        matches!(self, Self::CoinMarketCap)
    }

    /// Crypto providers quote trading pairs, so bare tickers get a quote-currency suffix.
    pub const fn quotes_crypto_pairs(self) -> bool {
        matches!(
            self,
            Self::Binance | Self::BinanceFutures | Self::CoinGecko | Self::CoinMarketCap
        )
    }

    /// Whether saving a config without an API key leaves it enabled.
    pub const fn enabled_without_key(self) -> bool {
        matches!(
            self,
            Self::Binance | Self::BinanceFutures | Self::AShare | Self::Custom
        )
    }
}

impl Display for ProviderKind {
    fn fmt(&self, f: &mut Formatter<'_>) -> std::fmt::Result {
        f.write_str(self.as_str())
    }
}

impl FromStr for ProviderKind {
    type Err = ValidationError;

    fn from_str(value: &str) -> Result<Self, Self::Err> {
        let trimmed = value.trim();
        Self::ALL
            .into_iter()
            .find(|kind| kind.as_str().eq_ignore_ascii_case(trimmed))
            .ok_or_else(|| ValidationError::InvalidProviderKind {
                value: trimmed.to_owned(),
            })
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn parses_kinds_case_insensitively() {
        assert_eq!(
            "BinanceFutures".parse::<ProviderKind>(),
            Ok(ProviderKind::BinanceFutures)
        );
        assert_eq!(" ashare ".parse::<ProviderKind>(), Ok(ProviderKind::AShare));
    }

    #[test]
    fn rejects_unknown_kind() {
        let err = "kraken".parse::<ProviderKind>().expect_err("must fail");
        assert!(matches!(err, ValidationError::InvalidProviderKind { .. }));
    }

    #[test]
    fn serde_names_match_as_str() {
        for kind in ProviderKind::ALL {
            let encoded = serde_json::to_string(&kind).expect("serialize");
            assert_eq!(encoded, format!("\"{}\"", kind.as_str()));
        }
    }
}
