//! Lightweight metrics helpers for Verge.
//!
//! This module exposes a small set of convenience functions wrapping the
//! `metrics` crate macros. It intentionally avoids embedding a concrete
//! exporter (the application can initialize any compatible recorder
//! externally) while still documenting and describing Verge-specific metric
//! names.
//!
//! Provided metrics (labels vary by family):
//! * `verge_requests_total` (counter)
//! * `verge_request_duration_seconds` (histogram)
//! * `verge_rate_limited_total` (counter)
//! * `verge_store_failures_total` (counter)
//! * `verge_breaker_transitions_total` (counter)
//! * `verge_breaker_state` (gauge per backend)
//! * `verge_retries_total` (counter)
//! * `verge_fallback_total` (counter)
//! * `verge_cookie_observed_total` (counter)
use metrics::{
    Unit, counter, describe_counter, describe_gauge, describe_histogram, gauge, histogram,
};
use once_cell::sync::Lazy;

use crate::core::breaker::BreakerState;

pub const VERGE_REQUESTS_TOTAL: &str = "verge_requests_total";
pub const VERGE_REQUEST_DURATION_SECONDS: &str = "verge_request_duration_seconds";
pub const VERGE_RATE_LIMITED_TOTAL: &str = "verge_rate_limited_total";
pub const VERGE_STORE_FAILURES_TOTAL: &str = "verge_store_failures_total";
pub const VERGE_BREAKER_TRANSITIONS_TOTAL: &str = "verge_breaker_transitions_total";
pub const VERGE_BREAKER_STATE: &str = "verge_breaker_state";
pub const VERGE_RETRIES_TOTAL: &str = "verge_retries_total";
pub const VERGE_FALLBACK_TOTAL: &str = "verge_fallback_total";
pub const VERGE_COOKIE_OBSERVED_TOTAL: &str = "verge_cookie_observed_total";

static DESCRIBE_ONCE: Lazy<()> = Lazy::new(|| {
    describe_counter!(
        VERGE_REQUESTS_TOTAL,
        Unit::Count,
        "Total number of HTTP requests processed by the gateway."
    );
    describe_histogram!(
        VERGE_REQUEST_DURATION_SECONDS,
        Unit::Seconds,
        "Latency of HTTP requests processed by the gateway."
    );
    describe_counter!(
        VERGE_RATE_LIMITED_TOTAL,
        Unit::Count,
        "Requests rejected by the rate limiter (by path group)."
    );
    describe_counter!(
        VERGE_STORE_FAILURES_TOTAL,
        Unit::Count,
        "Counter store operations that failed."
    );
    describe_counter!(
        VERGE_BREAKER_TRANSITIONS_TOTAL,
        Unit::Count,
        "Circuit breaker state transitions (by backend, from, to)."
    );
    describe_gauge!(
        VERGE_BREAKER_STATE,
        "Current breaker state per backend (0 closed, 1 half-open, 2 open)."
    );
    describe_counter!(
        VERGE_RETRIES_TOTAL,
        Unit::Count,
        "Re-dispatch attempts made for idempotent requests."
    );
    describe_counter!(
        VERGE_FALLBACK_TOTAL,
        Unit::Count,
        "Responses served from a route fallback (by backend, reason)."
    );
    describe_counter!(
        VERGE_COOKIE_OBSERVED_TOTAL,
        Unit::Count,
        "Set-Cookie headers observed on watched paths (by cookie name)."
    );
});

/// Register metric descriptions once at startup.
pub fn init_metrics() {
    Lazy::force(&DESCRIBE_ONCE);
}

/// Increment the total request counter for an inbound gateway request.
pub fn increment_request_total(path: &str, method: &str, status: u16) {
    counter!(
        VERGE_REQUESTS_TOTAL,
        "path" => path.to_string(),
        "method" => method.to_string(),
        "status" => status.to_string()
    )
    .increment(1);
}

/// Record a completed inbound request's duration.
pub fn record_request_duration(path: &str, method: &str, duration: std::time::Duration) {
    histogram!(
        VERGE_REQUEST_DURATION_SECONDS,
        "path" => path.to_string(),
        "method" => method.to_string()
    )
    .record(duration.as_secs_f64());
}

pub fn increment_rate_limited(path_group: &str) {
    counter!(VERGE_RATE_LIMITED_TOTAL, "group" => path_group.to_string()).increment(1);
}

pub fn increment_store_failures() {
    counter!(VERGE_STORE_FAILURES_TOTAL).increment(1);
}

pub fn record_breaker_transition(backend: &str, from: &str, to: &str) {
    counter!(
        VERGE_BREAKER_TRANSITIONS_TOTAL,
        "backend" => backend.to_string(),
        "from" => from.to_string(),
        "to" => to.to_string()
    )
    .increment(1);
}

/// Set the breaker state gauge for a backend.
pub fn set_breaker_state(backend: &str, state: BreakerState) {
    let value = match state {
        BreakerState::Closed => 0.0,
        BreakerState::HalfOpen => 1.0,
        BreakerState::Open => 2.0,
    };
    gauge!(VERGE_BREAKER_STATE, "backend" => backend.to_string()).set(value);
}

pub fn increment_retries(backend: &str) {
    counter!(VERGE_RETRIES_TOTAL, "backend" => backend.to_string()).increment(1);
}

pub fn increment_fallback(backend: &str, reason: &str) {
    counter!(
        VERGE_FALLBACK_TOTAL,
        "backend" => backend.to_string(),
        "reason" => reason.to_string()
    )
    .increment(1);
}

pub fn increment_cookie_observed(cookie_name: &str) {
    counter!(VERGE_COOKIE_OBSERVED_TOTAL, "cookie" => cookie_name.to_string()).increment(1);
}
