//! Distributed fixed-window rate limiting.
//!
//! Counters live in a shared store behind the [`CounterStore`] port and are
//! keyed by `prefix + client_ip + ":" + path_group`, where the path group is
//! a coarse bucket built from the first two path segments. Rules are matched
//! most-specific-first against configured per-path overrides, falling back
//! to the default rule. Store failures are governed by an explicit named
//! policy: fail-open (allow and log) or fail-closed (reject with 503).
use std::{sync::Arc, time::Duration};

use crate::{
    config::{FailurePolicy, RateLimitSettings},
    core::{
        error::GatewayError,
        route::{PathPattern, PatternError},
    },
    metrics,
    ports::counter_store::CounterStore,
};

/// An applicable limit: `limit` requests per `window`.
#[derive(Debug, Clone)]
pub struct RateLimitRule {
    pub limit: u64,
    pub window: Duration,
}

struct RuleOverride {
    pattern: PathPattern,
    rule: RateLimitRule,
}

/// Outcome of a rate-limit check for one request.
#[derive(Debug, Clone, Copy)]
pub enum RateLimitDecision {
    /// Under the limit; header material for the final response.
    Allowed { limit: u64, remaining: u64 },
    /// Over the limit; terminal 429.
    Limited { limit: u64, reset_at_ms: i64 },
    /// Limiting disabled, or the store failed under a fail-open policy.
    Bypassed,
}

/// Shared-store-backed request counter per client/path-group.
pub struct RateLimiter {
    store: Arc<dyn CounterStore>,
    enabled: bool,
    default_rule: RateLimitRule,
    overrides: Vec<RuleOverride>,
    key_prefix: String,
    on_store_error: FailurePolicy,
}

impl RateLimiter {
    pub fn from_config(
        settings: &RateLimitSettings,
        store: Arc<dyn CounterStore>,
    ) -> Result<Self, PatternError> {
        let mut overrides = Vec::with_capacity(settings.overrides.len());
        for o in &settings.overrides {
            overrides.push(RuleOverride {
                pattern: PathPattern::compile(&o.pattern)?,
                rule: RateLimitRule {
                    limit: o.limit,
                    window: o.window,
                },
            });
        }
        // Longest pattern first so the most specific override wins.
        overrides.sort_by(|a, b| b.pattern.as_str().len().cmp(&a.pattern.as_str().len()));

        Ok(Self {
            store,
            enabled: settings.enabled,
            default_rule: RateLimitRule {
                limit: settings.default.limit,
                window: settings.default.window,
            },
            overrides,
            key_prefix: settings.key_prefix.clone(),
            on_store_error: settings.on_store_error,
        })
    }

    /// Coarse counter scope: the first two path segments.
    pub fn path_group(path: &str) -> String {
        let mut group = String::new();
        for segment in path.trim_start_matches('/').split('/').take(2) {
            if segment.is_empty() {
                break;
            }
            group.push('/');
            group.push_str(segment);
        }
        if group.is_empty() {
            group.push('/');
        }
        group
    }

    /// Resolve the applicable rule for a path, most-specific-first.
    pub fn resolve_rule(&self, path: &str) -> &RateLimitRule {
        self.overrides
            .iter()
            .find(|o| o.pattern.matches(path))
            .map(|o| &o.rule)
            .unwrap_or(&self.default_rule)
    }

    /// Check and count one request. Public paths must be filtered out by the
    /// caller; this method always increments.
    pub async fn check(
        &self,
        client_ip: &str,
        path: &str,
    ) -> Result<RateLimitDecision, GatewayError> {
        if !self.enabled {
            return Ok(RateLimitDecision::Bypassed);
        }

        let group = Self::path_group(path);
        let rule = self.resolve_rule(path);
        let key = format!("{}{}:{}", self.key_prefix, client_ip, group);

        match self.store.incr(&key, rule.window).await {
            Ok(window) => {
                if window.count > rule.limit {
                    metrics::increment_rate_limited(&group);
                    tracing::warn!(
                        key = %key,
                        count = window.count,
                        limit = rule.limit,
                        "rate limit exceeded"
                    );
                    Ok(RateLimitDecision::Limited {
                        limit: rule.limit,
                        reset_at_ms: window.reset_at_ms,
                    })
                } else {
                    Ok(RateLimitDecision::Allowed {
                        limit: rule.limit,
                        remaining: rule.limit.saturating_sub(window.count),
                    })
                }
            }
            Err(e) => {
                metrics::increment_store_failures();
                match self.on_store_error {
                    FailurePolicy::FailOpen => {
                        tracing::error!(error = %e, "counter store unreachable, failing open");
                        Ok(RateLimitDecision::Bypassed)
                    }
                    FailurePolicy::FailClosed => {
                        tracing::error!(error = %e, "counter store unreachable, failing closed");
                        Err(GatewayError::StoreUnavailable(e.to_string()))
                    }
                }
            }
        }
    }
}

#[cfg(test)]
mod tests {
    use async_trait::async_trait;

    use super::*;
    use crate::{
        adapters::memory_store::InMemoryCounterStore,
        config::{RateLimitOverrideConfig, RateLimitRuleConfig},
        ports::counter_store::{StoreError, StoreResult, WindowCount},
    };

    struct DownStore;

    #[async_trait]
    impl CounterStore for DownStore {
        async fn incr(&self, _key: &str, _window: Duration) -> StoreResult<WindowCount> {
            Err(StoreError::Unavailable("connection refused".to_string()))
        }
    }

    fn settings(limit: u64, window_secs: u64) -> RateLimitSettings {
        RateLimitSettings {
            enabled: true,
            default: RateLimitRuleConfig {
                limit,
                window: Duration::from_secs(window_secs),
            },
            overrides: vec![],
            key_prefix: "rl:".to_string(),
            on_store_error: FailurePolicy::FailOpen,
        }
    }

    #[test]
    fn test_path_group_uses_first_two_segments() {
        assert_eq!(RateLimiter::path_group("/api/users/42/profile"), "/api/users");
        assert_eq!(RateLimiter::path_group("/api"), "/api");
        assert_eq!(RateLimiter::path_group("/"), "/");
    }

    #[tokio::test]
    async fn test_most_specific_override_wins() {
        let mut cfg = settings(100, 60);
        cfg.overrides = vec![
            RateLimitOverrideConfig {
                pattern: "/api/**".to_string(),
                limit: 50,
                window: Duration::from_secs(60),
            },
            RateLimitOverrideConfig {
                pattern: "/api/documents/**".to_string(),
                limit: 10,
                window: Duration::from_secs(60),
            },
        ];
        let limiter =
            RateLimiter::from_config(&cfg, Arc::new(InMemoryCounterStore::new())).unwrap();

        assert_eq!(limiter.resolve_rule("/api/documents/upload").limit, 10);
        assert_eq!(limiter.resolve_rule("/api/users/1").limit, 50);
        assert_eq!(limiter.resolve_rule("/misc").limit, 100);
    }

    #[tokio::test]
    async fn test_counts_and_limits_per_client() {
        let limiter = RateLimiter::from_config(
            &settings(3, 60),
            Arc::new(InMemoryCounterStore::new()),
        )
        .unwrap();

        let mut remaining_seen = Vec::new();
        for _ in 0..3 {
            match limiter.check("1.2.3.4", "/api/users/1").await.unwrap() {
                RateLimitDecision::Allowed { remaining, .. } => remaining_seen.push(remaining),
                other => panic!("expected Allowed, got {other:?}"),
            }
        }
        assert_eq!(remaining_seen, vec![2, 1, 0]);

        match limiter.check("1.2.3.4", "/api/users/2").await.unwrap() {
            RateLimitDecision::Limited { limit, .. } => assert_eq!(limit, 3),
            other => panic!("expected Limited, got {other:?}"),
        }

        // A different client IP has its own counter.
        match limiter.check("5.6.7.8", "/api/users/1").await.unwrap() {
            RateLimitDecision::Allowed { remaining, .. } => assert_eq!(remaining, 2),
            other => panic!("expected Allowed, got {other:?}"),
        }
    }

    #[tokio::test]
    async fn test_fail_open_on_store_error() {
        let limiter = RateLimiter::from_config(&settings(3, 60), Arc::new(DownStore)).unwrap();
        match limiter.check("1.2.3.4", "/api/users/1").await.unwrap() {
            RateLimitDecision::Bypassed => {}
            other => panic!("expected Bypassed, got {other:?}"),
        }
    }

    #[tokio::test]
    async fn test_fail_closed_on_store_error() {
        let mut cfg = settings(3, 60);
        cfg.on_store_error = FailurePolicy::FailClosed;
        let limiter = RateLimiter::from_config(&cfg, Arc::new(DownStore)).unwrap();
        let err = limiter.check("1.2.3.4", "/api/users/1").await.unwrap_err();
        assert!(matches!(err, GatewayError::StoreUnavailable(_)));
    }

    #[tokio::test]
    async fn test_disabled_limiter_bypasses() {
        let mut cfg = settings(3, 60);
        cfg.enabled = false;
        let limiter = RateLimiter::from_config(&cfg, Arc::new(DownStore)).unwrap();
        match limiter.check("1.2.3.4", "/api/users/1").await.unwrap() {
            RateLimitDecision::Bypassed => {}
            other => panic!("expected Bypassed, got {other:?}"),
        }
    }
}
