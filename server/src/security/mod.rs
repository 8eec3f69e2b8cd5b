pub mod counter_store;
pub mod rate_limiter;

pub use counter_store::{CounterKey, CounterStore, MemoryCounterStore, WindowSnapshot};
pub use rate_limiter::{Decision, FailMode, RateLimitPolicy, RateLimiter, RateLimiterStats};
