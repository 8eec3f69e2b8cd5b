use std::fmt;
use std::sync::Arc;
use std::time::Duration;

use tracing::debug;

use shared::types::server_config::PolicyConfig;

use crate::auth::clock::SharedClock;
use crate::error::StoreError;
use crate::security::counter_store::{CounterKey, CounterStore};

/// What to do with a request when the counter store cannot answer.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum FailMode {
    /// Let the request through unlimited.
    Open,
    /// Refuse the request with 503.
    Closed,
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct RateLimitPolicy {
    pub name: &'static str,
    pub limit: u64,
    pub window: Duration,
    pub fail_mode: FailMode,
}

impl RateLimitPolicy {
    /// General API traffic. Losing the counter store should not take the
    /// whole API down.
    pub fn standard(config: &PolicyConfig) -> Self {
        Self {
            name: "standard",
            limit: config.limit,
            window: config.window(),
            fail_mode: FailMode::Open,
        }
    }

    /// Login and public writes. Without counters these are unprotected, so
    /// they are refused instead.
    pub fn strict(config: &PolicyConfig) -> Self {
        Self {
            name: "strict",
            limit: config.limit,
            window: config.window(),
            fail_mode: FailMode::Closed,
        }
    }
}

/// Outcome of one `admit` call.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct Decision {
    pub allowed: bool,
    pub limit: u64,
    pub remaining: u64,
    /// End of the current window (Unix milliseconds).
    pub reset_at_ms: u64,
    /// Whole seconds until `reset_at_ms`, never below 1.
    pub retry_after_secs: u64,
}

impl Decision {
    /// `reset_at_ms` as Unix seconds, rounded up.
    pub fn reset_at_secs(&self) -> u64 {
        self.reset_at_ms.div_ceil(1000)
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct RateLimiterStats {
    pub tracked: usize,
    pub limited: usize,
}

/// Fixed-window limiter over a shared `CounterStore`.
#[derive(Clone)]
pub struct RateLimiter {
    store: Arc<dyn CounterStore>,
    clock: SharedClock,
    grace: Duration,
}

impl fmt::Debug for RateLimiter {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("RateLimiter")
            .field("clock", &self.clock)
            .field("grace", &self.grace)
            .finish()
    }
}

impl RateLimiter {
    pub fn new(store: Arc<dyn CounterStore>, clock: SharedClock, grace: Duration) -> Self {
        Self {
            store,
            clock,
            grace,
        }
    }

    /// Count this request against `client` under `policy` and decide.
    pub async fn admit(
        &self,
        client: &str,
        policy: &RateLimitPolicy,
    ) -> Result<Decision, StoreError> {
        let now = self.clock.now_ms();
        let key = CounterKey::new(policy.name, client);
        let window = self.store.increment(&key, policy.window, now).await?;

        let reset_at_ms = window.reset_at_ms();
        let decision = Decision {
            allowed: window.count <= policy.limit,
            limit: policy.limit,
            remaining: policy.limit - window.count.min(policy.limit),
            reset_at_ms,
            retry_after_secs: reset_at_ms.saturating_sub(now).div_ceil(1000).max(1),
        };

        debug!(
            "Rate limit {}: {}/{} (allowed: {})",
            key, window.count, policy.limit, decision.allowed
        );

        Ok(decision)
    }

    /// Remove counters that have been idle past their window plus grace.
    pub async fn gc(&self) -> Result<usize, StoreError> {
        self.store
            .purge_expired(self.clock.now_ms(), self.grace)
            .await
    }

    /// Tracked keys, and how many of them are currently over their limit.
    pub async fn stats(&self, policies: &[&RateLimitPolicy]) -> Result<RateLimiterStats, StoreError> {
        let now = self.clock.now_ms();
        let windows = self.store.snapshot().await?;

        let limited = windows
            .iter()
            .filter(|(key, window)| {
                now < window.reset_at_ms()
                    && policies
                        .iter()
                        .find(|p| p.name == key.policy)
                        .is_some_and(|p| window.count > p.limit)
            })
            .count();

        Ok(RateLimiterStats {
            tracked: windows.len(),
            limited,
        })
    }
}
