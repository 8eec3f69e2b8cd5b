use std::collections::HashMap;
use std::fmt;
use std::sync::Arc;
use std::time::Duration;

use async_trait::async_trait;
use tokio::sync::RwLock;

use crate::error::StoreError;

/// One counter per (policy, client) pair.
#[derive(Debug, Clone, PartialEq, Eq, Hash)]
pub struct CounterKey {
    pub policy: &'static str,
    pub client: String,
}

impl CounterKey {
    pub fn new(policy: &'static str, client: impl Into<String>) -> Self {
        Self {
            policy,
            client: client.into(),
        }
    }
}

impl fmt::Display for CounterKey {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}:{}", self.policy, self.client)
    }
}

/// State of a counter right after an increment.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct WindowSnapshot {
    pub count: u64,
    pub window_start_ms: u64,
    pub window_ms: u64,
}

impl WindowSnapshot {
    pub fn reset_at_ms(&self) -> u64 {
        self.window_start_ms + self.window_ms
    }
}

/// Shared counter state. `increment` must be atomic per key: two callers
/// never observe the same count.
#[async_trait]
pub trait CounterStore: Send + Sync {
    /// Count one hit for `key`, starting a fresh window first if the current
    /// one has ended at `now_ms`.
    async fn increment(
        &self,
        key: &CounterKey,
        window: Duration,
        now_ms: u64,
    ) -> Result<WindowSnapshot, StoreError>;

    /// Drop counters whose window ended at least `grace` ago. Returns how
    /// many were removed.
    async fn purge_expired(&self, now_ms: u64, grace: Duration) -> Result<usize, StoreError>;

    async fn snapshot(&self) -> Result<Vec<(CounterKey, WindowSnapshot)>, StoreError>;
}

/// Process-local counters behind a single write lock.
#[derive(Debug, Clone, Default)]
pub struct MemoryCounterStore {
    windows: Arc<RwLock<HashMap<CounterKey, WindowSnapshot>>>,
}

impl MemoryCounterStore {
    pub fn new() -> Self {
        Self::default()
    }
}

#[async_trait]
impl CounterStore for MemoryCounterStore {
    async fn increment(
        &self,
        key: &CounterKey,
        window: Duration,
        now_ms: u64,
    ) -> Result<WindowSnapshot, StoreError> {
        let window_ms = window.as_millis() as u64;
        let mut windows = self.windows.write().await;

        let entry = windows.entry(key.clone()).or_insert(WindowSnapshot {
            count: 0,
            window_start_ms: now_ms,
            window_ms,
        });

        if now_ms >= entry.reset_at_ms() {
            entry.count = 0;
            entry.window_start_ms = now_ms;
            entry.window_ms = window_ms;
        }

        entry.count += 1;
        Ok(*entry)
    }

    async fn purge_expired(&self, now_ms: u64, grace: Duration) -> Result<usize, StoreError> {
        let grace_ms = grace.as_millis() as u64;
        let mut windows = self.windows.write().await;

        let before = windows.len();
        windows.retain(|_, w| now_ms < w.reset_at_ms() + grace_ms);
        Ok(before - windows.len())
    }

    async fn snapshot(&self) -> Result<Vec<(CounterKey, WindowSnapshot)>, StoreError> {
        let windows = self.windows.read().await;
        Ok(windows.iter().map(|(k, w)| (k.clone(), *w)).collect())
    }
}
