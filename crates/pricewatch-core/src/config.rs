use std::time::Duration;

use crate::http_client::DEFAULT_TIMEOUT_MS;
use crate::HISTORY_CAP;

/// Minimum spacing between two `UnlockRequired` notices.
pub const UNLOCK_NOTICE_COOLDOWN: Duration = Duration::from_secs(60);

/// Runtime knobs for a [`crate::PriceWatch`] instance. Settings the user edits
/// at runtime, such as the refresh interval, live in the state store instead.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct WatchConfig {
    pub http_timeout_ms: u64,
    pub history_cap: usize,
    pub unlock_notice_cooldown: Duration,
    /// Buffered outbound events per subscriber before slow receivers lag.
    pub event_capacity: usize,
}

impl Default for WatchConfig {
    fn default() -> Self {
        Self {
            http_timeout_ms: DEFAULT_TIMEOUT_MS,
            history_cap: HISTORY_CAP,
            unlock_notice_cooldown: UNLOCK_NOTICE_COOLDOWN,
            event_capacity: 256,
        }
    }
}

impl WatchConfig {
    pub fn with_http_timeout_ms(mut self, http_timeout_ms: u64) -> Self {
        self.http_timeout_ms = http_timeout_ms.max(1);
        self
    }

    pub fn with_unlock_notice_cooldown(mut self, cooldown: Duration) -> Self {
        self.unlock_notice_cooldown = cooldown;
        self
    }
}
