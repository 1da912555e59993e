use std::collections::HashMap;
use std::num::NonZeroU32;
use std::sync::Arc;
use std::time::Duration;

use governor::clock::DefaultClock;
use governor::state::direct::NotKeyed;
use governor::state::InMemoryState;
use governor::{Quota, RateLimiter};

use crate::provider_policy::ProviderPolicy;
use crate::ProviderKind;

type DirectRateLimiter = RateLimiter<NotKeyed, InMemoryState, DefaultClock>;

/// Non-blocking rate budget for one provider kind. An exhausted budget skips
/// the request instead of queueing it.
#[derive(Clone)]
pub struct ThrottlingQueue {
    limiter: Arc<DirectRateLimiter>,
}

impl ThrottlingQueue {
    pub fn new(quota_window: Duration, quota_limit: u32) -> Self {
        Self {
            limiter: Arc::new(RateLimiter::direct(quota_from_window(
                quota_window,
                quota_limit,
            ))),
        }
    }

    pub fn from_policy(policy: &ProviderPolicy) -> Self {
        Self::new(policy.quota_window, policy.quota_limit)
    }

    /// Takes one unit of budget if any is left.
    pub fn try_acquire(&self) -> bool {
        self.limiter.check().is_ok()
    }
}

/// One [`ThrottlingQueue`] per provider kind.
#[derive(Clone)]
pub struct ProviderThrottle {
    queues: HashMap<ProviderKind, ThrottlingQueue>,
}

impl ProviderThrottle {
    pub fn from_policies(policies: &[ProviderPolicy]) -> Self {
        Self {
            queues: policies
                .iter()
                .map(|policy| (policy.kind, ThrottlingQueue::from_policy(policy)))
                .collect(),
        }
    }

    /// Kinds without a policy are never throttled.
    pub fn try_acquire(&self, kind: ProviderKind) -> bool {
        self.queues
            .get(&kind)
            .map_or(true, ThrottlingQueue::try_acquire)
    }
}

impl Default for ProviderThrottle {
    fn default() -> Self {
        Self::from_policies(&ProviderPolicy::defaults())
    }
}

fn quota_from_window(quota_window: Duration, quota_limit: u32) -> Quota {
    let safe_limit = quota_limit.max(1);
    let burst = NonZeroU32::new(safe_limit).unwrap_or(NonZeroU32::MIN);

    let seconds_per_cell = (quota_window.as_secs_f64() / f64::from(safe_limit)).max(0.001);
    let period = Duration::from_secs_f64(seconds_per_cell);

    Quota::with_period(period)
        .unwrap_or_else(|| Quota::per_second(NonZeroU32::MIN))
        .allow_burst(burst)
}
