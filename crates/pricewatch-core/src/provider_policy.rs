use std::time::Duration;

use crate::ProviderKind;

/// Best-effort request quota for one provider kind.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ProviderPolicy {
    pub kind: ProviderKind,
    pub quota_window: Duration,
    pub quota_limit: u32,
}

impl ProviderPolicy {
    pub const fn per_minute(kind: ProviderKind, quota_limit: u32) -> Self {
        Self {
            kind,
            quota_window: Duration::from_secs(60),
            quota_limit,
        }
    }

    /// Public free-tier limits, rounded down.
    pub const fn default_for(kind: ProviderKind) -> Self {
        match kind {
            ProviderKind::CoinGecko | ProviderKind::CoinMarketCap => Self::per_minute(kind, 30),
            ProviderKind::Binance | ProviderKind::BinanceFutures => Self::per_minute(kind, 1200),
            ProviderKind::AShare | ProviderKind::Custom => Self::per_minute(kind, 120),
        }
    }

    pub fn defaults() -> Vec<Self> {
        ProviderKind::ALL
            .into_iter()
            .map(Self::default_for)
            .collect()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn coingecko_policy_matches_free_tier() {
        let policy = ProviderPolicy::default_for(ProviderKind::CoinGecko);

        assert_eq!(policy.quota_window, Duration::from_secs(60));
        assert_eq!(policy.quota_limit, 30);
    }

    #[test]
    fn every_kind_has_a_policy() {
        let policies = ProviderPolicy::defaults();
        assert_eq!(policies.len(), ProviderKind::ALL.len());
        assert!(policies.iter().all(|policy| policy.quota_limit > 0));
    }
}
