//! Port for the shared rate-limit counter store.
//!
//! The production deployment points this at an external key-value store so
//! that counters are shared across gateway workers; correctness requires
//! the increment to be atomic at the store, not at the gateway process.
use std::time::Duration;

use async_trait::async_trait;
use thiserror::Error;

/// Errors reaching the shared store. The limiter maps these through its
/// configured failure policy (fail-open by default).
#[derive(Error, Debug)]
#[non_exhaustive]
pub enum StoreError {
    #[error("counter store unavailable: {0}")]
    Unavailable(String),
}

pub type StoreResult<T> = Result<T, StoreError>;

/// Result of one atomic window increment.
#[derive(Debug, Clone, Copy)]
pub struct WindowCount {
    /// Post-increment counter value for the key's current window.
    pub count: u64,
    /// Epoch milliseconds at which the current window expires.
    pub reset_at_ms: i64,
}

/// Atomic counter with a per-key TTL window.
#[async_trait]
pub trait CounterStore: Send + Sync + 'static {
    /// Atomically increment `key`. The store sets the key's TTL to `window`
    /// exactly once per window, when the increment creates the key
    /// (first-writer-sets-expiry).
    async fn incr(&self, key: &str, window: Duration) -> StoreResult<WindowCount>;
}
