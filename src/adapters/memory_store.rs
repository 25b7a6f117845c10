//! In-process counter store backing the rate limiter.
//!
//! Implements the fixed-window contract over an `scc::HashMap`: the first
//! writer of a window sets its expiry, later increments within the window
//! leave the expiry untouched. Expired entries are recycled in place on the
//! next increment, so no background sweeper is needed.
use std::{sync::Arc, time::Duration};

use async_trait::async_trait;
use scc::HashMap;
use tokio::time::Instant;

use crate::ports::counter_store::{CounterStore, StoreResult, WindowCount};

#[derive(Debug, Clone)]
struct CounterEntry {
    count: u64,
    expires_at: Instant,
}

#[derive(Debug, Default, Clone)]
pub struct InMemoryCounterStore {
    counters: Arc<HashMap<String, CounterEntry>>,
}

impl InMemoryCounterStore {
    pub fn new() -> Self {
        Self::default()
    }
}

#[async_trait]
impl CounterStore for InMemoryCounterStore {
    async fn incr(&self, key: &str, window: Duration) -> StoreResult<WindowCount> {
        loop {
            let now = Instant::now();

            if let Some(entry) = self
                .counters
                .update_async(key, |_, entry| {
                    if entry.expires_at <= now {
                        // Window rolled over; this increment opens a new one.
                        entry.count = 1;
                        entry.expires_at = now + window;
                    } else {
                        entry.count += 1;
                    }
                    entry.clone()
                })
                .await
            {
                return Ok(window_count(&entry, now));
            }

            let fresh = CounterEntry {
                count: 1,
                expires_at: now + window,
            };
            match self.counters.insert_async(key.to_string(), fresh.clone()).await {
                Ok(()) => return Ok(window_count(&fresh, now)),
                // Another task created the entry first; retry the update path.
                Err(_) => continue,
            }
        }
    }
}

fn window_count(entry: &CounterEntry, now: Instant) -> WindowCount {
    let remaining = entry.expires_at.saturating_duration_since(now);
    WindowCount {
        count: entry.count,
        reset_at_ms: chrono::Utc::now().timestamp_millis() + remaining.as_millis() as i64,
    }
}
