//! Bounded re-dispatch wrapped inside the circuit breaker.
//!
//! The breaker permit is taken once per logical request; every attempt made
//! under it (retries included) records one outcome into the breaker's
//! sliding window, so a single request can contribute several outcomes. If
//! the dispatch future is dropped before any outcome lands, the permit's
//! own drop returns the trial slot to the breaker. The
//! per-attempt timeout races the whole dispatch, which already carries the
//! client's own connect timeout; whichever fires first produces the single
//! failure outcome for that attempt, never two.
use std::time::Duration;

use axum::body::Body;
use hyper::{Method, Response};
use tokio::time::timeout;

use crate::{
    core::breaker::{BreakerRejected, CallOutcome, CircuitBreaker},
    metrics,
    ports::http_client::HttpClientError,
};

/// Terminal outcome of a breaker/retry-wrapped dispatch.
#[derive(Debug)]
pub enum DispatchError {
    /// Circuit was open; no network attempt was made.
    Open,
    /// Final attempt timed out.
    Timeout,
    /// Final attempt failed before a response arrived.
    Failed(String),
}

/// Only idempotent methods are eligible for re-dispatch.
pub fn is_idempotent(method: &Method) -> bool {
    matches!(
        *method,
        Method::GET | Method::HEAD | Method::OPTIONS | Method::PUT | Method::DELETE
    )
}

/// Dispatch through `breaker` with up to `retries` additional attempts.
///
/// `attempt` is invoked with the attempt index (0-based). A 5xx response
/// counts as a failure outcome and is retried while budget remains; the
/// last response is surfaced as-is when the budget runs out.
pub async fn dispatch_with_retries<F, Fut>(
    breaker: &CircuitBreaker,
    method: &Method,
    retries: u32,
    mut attempt: F,
) -> Result<Response<Body>, DispatchError>
where
    F: FnMut(u32) -> Fut,
    Fut: Future<Output = Result<Response<Body>, HttpClientError>>,
{
    let mut permit = match breaker.try_acquire() {
        Ok(permit) => permit,
        Err(BreakerRejected) => return Err(DispatchError::Open),
    };

    let budget = if is_idempotent(method) { retries } else { 0 };
    let call_timeout = breaker.policy().call_timeout;
    let mut last_error: Option<DispatchError> = None;

    for n in 0..=budget {
        if n > 0 {
            metrics::increment_retries(breaker.backend());
            tracing::debug!(
                backend = %breaker.backend(),
                attempt = n,
                "retrying dispatch"
            );
        }

        match run_attempt(call_timeout, attempt(n)).await {
            AttemptResult::Ok(response) => {
                permit.record(CallOutcome::Success);
                return Ok(response);
            }
            AttemptResult::ServerError(response) => {
                permit.record(CallOutcome::Failure);
                if n == budget {
                    // Out of budget: the backend's own error is the answer.
                    return Ok(response);
                }
            }
            AttemptResult::TimedOut => {
                permit.record(CallOutcome::Failure);
                last_error = Some(DispatchError::Timeout);
            }
            AttemptResult::Failed(reason) => {
                permit.record(CallOutcome::Failure);
                last_error = Some(DispatchError::Failed(reason));
            }
        }
    }

    Err(last_error.unwrap_or(DispatchError::Failed("dispatch failed".to_string())))
}

enum AttemptResult {
    Ok(Response<Body>),
    ServerError(Response<Body>),
    TimedOut,
    Failed(String),
}

async fn run_attempt<Fut>(call_timeout: Duration, fut: Fut) -> AttemptResult
where
    Fut: Future<Output = Result<Response<Body>, HttpClientError>>,
{
    match timeout(call_timeout, fut).await {
        Ok(Ok(response)) => {
            if response.status().is_server_error() {
                AttemptResult::ServerError(response)
            } else {
                AttemptResult::Ok(response)
            }
        }
        Ok(Err(HttpClientError::Timeout(_))) => AttemptResult::TimedOut,
        Ok(Err(e)) => AttemptResult::Failed(e.to_string()),
        Err(_) => AttemptResult::TimedOut,
    }
}
