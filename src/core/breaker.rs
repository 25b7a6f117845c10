//! Per-backend circuit breakers.
//!
//! Each breaker owns a sliding window of recent call outcomes (a fixed ring
//! buffer for count-based windows, a pruned timestamp list for time-based
//! ones) and a three-state machine: CLOSED dispatches normally, OPEN
//! short-circuits every call for a wait duration, HALF_OPEN admits a fixed
//! trial budget to probe recovery. All bookkeeping for one breaker sits
//! behind a single mutex so state transitions are linearizable: two racing
//! requests can never both flip CLOSED to OPEN with inconsistent counters.
//!
//! Clocks use `tokio::time::Instant` so the wait-duration timer can be
//! driven by a paused test clock.
use std::{
    collections::HashMap,
    sync::{Arc, Mutex},
    time::Duration,
};

use tokio::time::Instant;

use crate::{
    config::{BreakerConfig, BreakerSettings, SlidingWindowType},
    core::route::RouteTable,
    metrics,
};

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum BreakerState {
    Closed,
    Open,
    HalfOpen,
}

impl std::fmt::Display for BreakerState {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            BreakerState::Closed => write!(f, "closed"),
            BreakerState::Open => write!(f, "open"),
            BreakerState::HalfOpen => write!(f, "half_open"),
        }
    }
}

/// Result of one dispatch attempt, as seen by the breaker. The retry layer
/// converts per-call timeouts into failures before recording.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum CallOutcome {
    Success,
    Failure,
}

/// Returned when a call is refused without any network attempt.
#[derive(Debug, Clone, Copy)]
pub struct BreakerRejected;

/// Permission to dispatch one logical request.
///
/// Dropping the permit without recording any outcome hands an unused
/// HALF_OPEN trial slot back, so a dispatch future dropped mid-flight (the
/// server drops the handler when the client disconnects) cannot strand the
/// breaker waiting for an outcome that will never arrive.
#[must_use]
pub struct BreakerPermit<'a> {
    breaker: &'a CircuitBreaker,
    trial: bool,
    recorded: bool,
}

impl BreakerPermit<'_> {
    pub fn record(&mut self, outcome: CallOutcome) {
        self.recorded = true;
        self.breaker.record(outcome);
    }
}

impl Drop for BreakerPermit<'_> {
    fn drop(&mut self) {
        if self.trial && !self.recorded {
            self.breaker.release_trial_permit();
        }
    }
}

/// Resolved breaker policy (durations parsed, thresholds validated).
#[derive(Debug, Clone)]
pub struct BreakerPolicy {
    pub window: WindowKind,
    /// Percentage in (0, 100].
    pub failure_rate_threshold: f32,
    pub wait_open: Duration,
    pub half_open_permits: u32,
    pub call_timeout: Duration,
    /// Outcomes required in the window before the failure rate is evaluated.
    pub minimum_calls: u32,
}

#[derive(Debug, Clone)]
pub enum WindowKind {
    Count(usize),
    Time(Duration),
}

impl BreakerPolicy {
    pub fn from_config(cfg: &BreakerConfig) -> Self {
        let window = match cfg.sliding_window_type {
            SlidingWindowType::Count => WindowKind::Count(cfg.sliding_window_size as usize),
            SlidingWindowType::Time => {
                WindowKind::Time(Duration::from_secs(cfg.sliding_window_size as u64))
            }
        };
        // A count window can never hold more than its size, so the floor is
        // clamped to keep the breaker able to trip at all.
        let minimum_calls = match window {
            WindowKind::Count(size) => cfg.minimum_calls.min(size as u32),
            WindowKind::Time(_) => cfg.minimum_calls,
        };
        Self {
            window,
            failure_rate_threshold: cfg.failure_rate_threshold,
            wait_open: cfg.wait_duration_open,
            half_open_permits: cfg.half_open_permits,
            call_timeout: cfg.call_timeout,
            minimum_calls,
        }
    }
}

/// Sliding outcome history owned by one breaker.
#[derive(Debug)]
enum Window {
    Count(RingBuffer),
    Time {
        outcomes: Vec<(Instant, CallOutcome)>,
        span: Duration,
    },
}

impl Window {
    fn new(kind: &WindowKind) -> Self {
        match kind {
            WindowKind::Count(size) => Window::Count(RingBuffer::new(*size)),
            WindowKind::Time(span) => Window::Time {
                outcomes: Vec::new(),
                span: *span,
            },
        }
    }

    fn record(&mut self, outcome: CallOutcome) {
        match self {
            Window::Count(ring) => ring.push(outcome),
            Window::Time { outcomes, span } => {
                let now = Instant::now();
                outcomes.retain(|(at, _)| now.duration_since(*at) < *span);
                outcomes.push((now, outcome));
            }
        }
    }

    fn totals(&self) -> (u32, u32) {
        match self {
            Window::Count(ring) => ring.totals(),
            Window::Time { outcomes, span } => {
                let now = Instant::now();
                let mut total = 0;
                let mut failures = 0;
                for (at, outcome) in outcomes {
                    if now.duration_since(*at) < *span {
                        total += 1;
                        if *outcome == CallOutcome::Failure {
                            failures += 1;
                        }
                    }
                }
                (total, failures)
            }
        }
    }

    fn reset(&mut self) {
        match self {
            Window::Count(ring) => ring.clear(),
            Window::Time { outcomes, .. } => outcomes.clear(),
        }
    }
}

/// Fixed-capacity ring of the last N outcomes.
#[derive(Debug)]
struct RingBuffer {
    slots: Vec<Option<CallOutcome>>,
    head: usize,
}

impl RingBuffer {
    fn new(capacity: usize) -> Self {
        Self {
            slots: vec![None; capacity.max(1)],
            head: 0,
        }
    }

    fn push(&mut self, outcome: CallOutcome) {
        self.slots[self.head] = Some(outcome);
        self.head = (self.head + 1) % self.slots.len();
    }

    fn totals(&self) -> (u32, u32) {
        let mut total = 0;
        let mut failures = 0;
        for slot in &self.slots {
            if let Some(outcome) = slot {
                total += 1;
                if *outcome == CallOutcome::Failure {
                    failures += 1;
                }
            }
        }
        (total, failures)
    }

    fn clear(&mut self) {
        for slot in &mut self.slots {
            *slot = None;
        }
        self.head = 0;
    }
}

#[derive(Debug)]
struct Inner {
    state: BreakerState,
    window: Window,
    opened_at: Option<Instant>,
    half_open_issued: u32,
    half_open_outcomes: Vec<CallOutcome>,
}

/// One breaker per backend, alive for the process lifetime.
pub struct CircuitBreaker {
    backend: String,
    policy: BreakerPolicy,
    inner: Mutex<Inner>,
}

impl CircuitBreaker {
    pub fn new(backend: impl Into<String>, policy: BreakerPolicy) -> Self {
        let window = Window::new(&policy.window);
        Self {
            backend: backend.into(),
            policy,
            inner: Mutex::new(Inner {
                state: BreakerState::Closed,
                window,
                opened_at: None,
                half_open_issued: 0,
                half_open_outcomes: Vec::new(),
            }),
        }
    }

    pub fn backend(&self) -> &str {
        &self.backend
    }

    pub fn policy(&self) -> &BreakerPolicy {
        &self.policy
    }

    pub fn state(&self) -> BreakerState {
        self.lock().state
    }

    /// Ask permission to dispatch. OPEN breakers reject until the wait
    /// duration elapses, then flip to HALF_OPEN and hand out trial permits.
    pub fn try_acquire(&self) -> Result<BreakerPermit<'_>, BreakerRejected> {
        let mut inner = self.lock();
        let trial = match inner.state {
            BreakerState::Closed => false,
            BreakerState::Open => {
                let elapsed_wait = inner
                    .opened_at
                    .map(|at| at.elapsed() >= self.policy.wait_open)
                    .unwrap_or(true);
                if !elapsed_wait {
                    return Err(BreakerRejected);
                }
                self.transition(&mut inner, BreakerState::HalfOpen);
                inner.half_open_issued = 1;
                true
            }
            BreakerState::HalfOpen => {
                if inner.half_open_issued >= self.policy.half_open_permits {
                    return Err(BreakerRejected);
                }
                inner.half_open_issued += 1;
                true
            }
        };
        Ok(BreakerPermit {
            breaker: self,
            trial,
            recorded: false,
        })
    }

    /// Record one dispatch attempt's outcome and apply transitions. Only
    /// reachable through a held permit.
    fn record(&self, outcome: CallOutcome) {
        let mut inner = self.lock();
        match inner.state {
            BreakerState::Closed => {
                inner.window.record(outcome);
                let (total, failures) = inner.window.totals();
                if total >= self.policy.minimum_calls && total > 0 {
                    let rate = failures as f32 * 100.0 / total as f32;
                    if rate >= self.policy.failure_rate_threshold {
                        tracing::warn!(
                            backend = %self.backend,
                            failure_rate = rate,
                            threshold = self.policy.failure_rate_threshold,
                            "failure rate over threshold, opening circuit"
                        );
                        self.transition(&mut inner, BreakerState::Open);
                        inner.opened_at = Some(Instant::now());
                    }
                }
            }
            BreakerState::HalfOpen => {
                inner.half_open_outcomes.push(outcome);
                if inner.half_open_outcomes.len() as u32 >= self.policy.half_open_permits {
                    let failures = inner
                        .half_open_outcomes
                        .iter()
                        .filter(|o| **o == CallOutcome::Failure)
                        .count() as f32;
                    let rate = failures * 100.0 / inner.half_open_outcomes.len() as f32;
                    if rate < self.policy.failure_rate_threshold {
                        tracing::info!(backend = %self.backend, "trial calls recovered, closing circuit");
                        self.transition(&mut inner, BreakerState::Closed);
                        inner.window.reset();
                        inner.opened_at = None;
                    } else {
                        tracing::warn!(backend = %self.backend, "trial calls still failing, reopening circuit");
                        self.transition(&mut inner, BreakerState::Open);
                        inner.opened_at = Some(Instant::now());
                    }
                }
            }
            // Late results after a transition carry no signal for an open
            // breaker.
            BreakerState::Open => {}
        }
    }

    /// Return a trial slot whose dispatch never produced an outcome. A
    /// transition since acquisition already reset the counter, so this is a
    /// no-op unless the breaker is still half-open.
    fn release_trial_permit(&self) {
        let mut inner = self.lock();
        if inner.state == BreakerState::HalfOpen {
            inner.half_open_issued = inner.half_open_issued.saturating_sub(1);
        }
    }

    fn transition(&self, inner: &mut Inner, to: BreakerState) {
        let from = inner.state;
        inner.state = to;
        inner.half_open_issued = 0;
        inner.half_open_outcomes.clear();
        metrics::record_breaker_transition(&self.backend, &from.to_string(), &to.to_string());
        metrics::set_breaker_state(&self.backend, to);
    }

    fn lock(&self) -> std::sync::MutexGuard<'_, Inner> {
        // Inner never panics while the lock is held.
        self.inner
            .lock()
            .unwrap_or_else(std::sync::PoisonError::into_inner)
    }
}

/// Typed registry: backend identifier to breaker, resolved once at startup.
pub struct CircuitBreakerRegistry {
    breakers: HashMap<String, Arc<CircuitBreaker>>,
    default_policy: BreakerPolicy,
}

impl CircuitBreakerRegistry {
    /// Build one breaker per backend named by the route table. A route's
    /// `breaker` name selects a policy override; otherwise an override keyed
    /// by the backend name applies, else the default policy.
    pub fn from_config(routes: &RouteTable, settings: &BreakerSettings) -> Self {
        let default_policy = BreakerPolicy::from_config(&settings.default);
        let mut breakers = HashMap::new();

        for route in routes.routes() {
            if breakers.contains_key(&route.backend) {
                continue;
            }
            let override_name = route.breaker.as_deref().unwrap_or(&route.backend);
            let policy = settings
                .overrides
                .get(override_name)
                .map(BreakerPolicy::from_config)
                .unwrap_or_else(|| default_policy.clone());
            tracing::info!(
                backend = %route.backend,
                threshold = policy.failure_rate_threshold,
                "registered circuit breaker"
            );
            breakers.insert(
                route.backend.clone(),
                Arc::new(CircuitBreaker::new(route.backend.clone(), policy)),
            );
        }

        Self {
            breakers,
            default_policy,
        }
    }

    /// Every backend in the route table has a breaker; unknown names (only
    /// reachable from tests constructing registries by hand) fall back to a
    /// fresh default breaker.
    pub fn get(&self, backend: &str) -> Arc<CircuitBreaker> {
        self.breakers.get(backend).cloned().unwrap_or_else(|| {
            Arc::new(CircuitBreaker::new(backend, self.default_policy.clone()))
        })
    }

    pub fn len(&self) -> usize {
        self.breakers.len()
    }

    pub fn is_empty(&self) -> bool {
        self.breakers.is_empty()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn count_policy(window: usize, threshold: f32, permits: u32) -> BreakerPolicy {
        BreakerPolicy {
            window: WindowKind::Count(window),
            failure_rate_threshold: threshold,
            wait_open: Duration::from_secs(30),
            half_open_permits: permits,
            call_timeout: Duration::from_secs(5),
            minimum_calls: window as u32,
        }
    }

    fn fill(breaker: &CircuitBreaker, successes: u32, failures: u32) {
        for _ in 0..successes {
            let mut permit = breaker.try_acquire().unwrap();
            permit.record(CallOutcome::Success);
        }
        for _ in 0..failures {
            let mut permit = breaker.try_acquire().unwrap();
            permit.record(CallOutcome::Failure);
        }
    }

    #[tokio::test]
    async fn test_opens_at_failure_rate_threshold() {
        let breaker = CircuitBreaker::new("user-service", count_policy(10, 50.0, 3));

        fill(&breaker, 5, 4);
        assert_eq!(breaker.state(), BreakerState::Closed);

        // Fifth failure out of the last ten tips the rate to 50%.
        let mut permit = breaker.try_acquire().unwrap();
        permit.record(CallOutcome::Failure);
        assert_eq!(breaker.state(), BreakerState::Open);

        // The next call short-circuits with no network attempt.
        assert!(breaker.try_acquire().is_err());
    }

    #[tokio::test]
    async fn test_does_not_trip_below_minimum_calls() {
        let breaker = CircuitBreaker::new("user-service", count_policy(10, 50.0, 3));
        fill(&breaker, 0, 4);
        assert_eq!(breaker.state(), BreakerState::Closed);
        assert!(breaker.try_acquire().is_ok());
    }

    #[tokio::test(start_paused = true)]
    async fn test_half_open_after_wait_and_recloses() {
        let breaker = CircuitBreaker::new("user-service", count_policy(10, 50.0, 3));
        fill(&breaker, 5, 5);
        assert_eq!(breaker.state(), BreakerState::Open);
        assert!(breaker.try_acquire().is_err());

        tokio::time::advance(Duration::from_secs(31)).await;

        // Exactly the permitted number of trial calls is allowed.
        let mut first = breaker.try_acquire().unwrap();
        assert_eq!(breaker.state(), BreakerState::HalfOpen);
        let mut second = breaker.try_acquire().unwrap();
        let mut third = breaker.try_acquire().unwrap();
        assert!(breaker.try_acquire().is_err());

        first.record(CallOutcome::Success);
        second.record(CallOutcome::Success);
        third.record(CallOutcome::Success);
        assert_eq!(breaker.state(), BreakerState::Closed);
        assert!(breaker.try_acquire().is_ok());
    }

    #[tokio::test(start_paused = true)]
    async fn test_abandoned_trial_returns_its_permit() {
        let breaker = CircuitBreaker::new("user-service", count_policy(10, 50.0, 1));
        fill(&breaker, 0, 10);
        assert_eq!(breaker.state(), BreakerState::Open);

        tokio::time::advance(Duration::from_secs(31)).await;

        // A trial dropped without an outcome (the client went away before
        // the dispatch finished) hands its slot back instead of leaving the
        // breaker half-open with no way to evaluate.
        {
            let _trial = breaker.try_acquire().unwrap();
        }
        tokio::time::advance(Duration::from_secs(3600)).await;
        assert_eq!(breaker.state(), BreakerState::HalfOpen);

        let mut trial = breaker.try_acquire().unwrap();
        trial.record(CallOutcome::Success);
        assert_eq!(breaker.state(), BreakerState::Closed);
    }

    #[tokio::test(start_paused = true)]
    async fn test_half_open_failure_reopens_and_restarts_wait() {
        let breaker = CircuitBreaker::new("user-service", count_policy(10, 50.0, 2));
        fill(&breaker, 0, 10);
        assert_eq!(breaker.state(), BreakerState::Open);

        tokio::time::advance(Duration::from_secs(31)).await;
        let mut first = breaker.try_acquire().unwrap();
        let mut second = breaker.try_acquire().unwrap();
        first.record(CallOutcome::Failure);
        second.record(CallOutcome::Failure);
        assert_eq!(breaker.state(), BreakerState::Open);

        // Wait timer restarted: still rejecting before it elapses again.
        tokio::time::advance(Duration::from_secs(10)).await;
        assert!(breaker.try_acquire().is_err());
        tokio::time::advance(Duration::from_secs(21)).await;
        assert!(breaker.try_acquire().is_ok());
    }

    #[tokio::test(start_paused = true)]
    async fn test_time_window_prunes_old_outcomes() {
        let policy = BreakerPolicy {
            window: WindowKind::Time(Duration::from_secs(10)),
            failure_rate_threshold: 50.0,
            wait_open: Duration::from_secs(30),
            half_open_permits: 2,
            call_timeout: Duration::from_secs(5),
            minimum_calls: 4,
        };
        let breaker = CircuitBreaker::new("user-service", policy);

        fill(&breaker, 0, 3);
        assert_eq!(breaker.state(), BreakerState::Closed);

        // Old failures age out of the window before the fourth arrives.
        tokio::time::advance(Duration::from_secs(11)).await;
        fill(&breaker, 0, 3);
        assert_eq!(breaker.state(), BreakerState::Closed);

        fill(&breaker, 0, 1);
        assert_eq!(breaker.state(), BreakerState::Open);
    }

    #[tokio::test]
    async fn test_ring_buffer_keeps_last_n() {
        let ring = {
            let mut ring = RingBuffer::new(3);
            ring.push(CallOutcome::Failure);
            ring.push(CallOutcome::Failure);
            ring.push(CallOutcome::Failure);
            ring.push(CallOutcome::Success);
            ring
        };
        let (total, failures) = ring.totals();
        assert_eq!(total, 3);
        assert_eq!(failures, 2);
    }
}
