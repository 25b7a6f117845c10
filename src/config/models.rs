//! Configuration data structures for Verge.
//!
//! These types map directly to TOML (also JSON / YAML) configuration files.
//! They are intentionally serde-friendly and include defaults so that
//! minimal configs remain concise. Durations are humantime strings in the
//! file ("60s", "5m") and typed `Duration`s in memory.
use std::{collections::HashMap, time::Duration};

use serde::{Deserialize, Serialize};

/// Serde bridge for humantime duration strings.
pub(crate) mod humantime_duration {
    use std::time::Duration;

    use serde::{Deserialize, Deserializer, Serializer};

    pub fn deserialize<'de, D>(deserializer: D) -> Result<Duration, D::Error>
    where
        D: Deserializer<'de>,
    {
        let raw = String::deserialize(deserializer)?;
        humantime::parse_duration(&raw).map_err(serde::de::Error::custom)
    }

    pub fn serialize<S>(duration: &Duration, serializer: S) -> Result<S::Ok, S::Error>
    where
        S: Serializer,
    {
        serializer.serialize_str(&humantime::format_duration(*duration).to_string())
    }
}

/// Top-level gateway configuration.
#[derive(Debug, Serialize, Deserialize, Clone)]
pub struct GatewayConfig {
    pub listen_addr: String,
    /// Logical backend name -> base URL (static discovery table).
    pub backends: HashMap<String, String>,
    /// Ordered route definitions; declaration order is the tie-break for
    /// overlapping patterns.
    pub routes: Vec<RouteConfig>,
    /// Ordered glob patterns exempt from auth and rate limiting.
    #[serde(default)]
    pub public_paths: Vec<String>,
    #[serde(default)]
    pub auth: AuthConfig,
    #[serde(default)]
    pub rate_limit: RateLimitSettings,
    #[serde(default)]
    pub circuit_breakers: BreakerSettings,
    #[serde(default)]
    pub http_client: HttpClientConfig,
}

/// One route: path patterns, rewrite rule and dispatch policy.
#[derive(Debug, Serialize, Deserialize, Clone)]
pub struct RouteConfig {
    pub id: String,
    pub patterns: Vec<String>,
    /// Number of leading path segments stripped before dispatch.
    #[serde(default)]
    pub strip_prefix: usize,
    pub backend: String,
    /// Named breaker policy override; defaults to the backend's own name.
    #[serde(default)]
    pub breaker: Option<String>,
    #[serde(default)]
    pub fallback: Option<FallbackConfig>,
    /// Additional dispatch attempts for idempotent methods.
    #[serde(default)]
    pub retries: u32,
}

/// Degraded-mode response for a route.
#[derive(Debug, Serialize, Deserialize, Clone)]
pub struct FallbackConfig {
    /// Internal path forwarded through the gateway's own route table when
    /// the primary backend fails; must resolve to a different backend.
    #[serde(default)]
    pub path: Option<String>,
    /// Static JSON payload; when absent the default degraded shape is used.
    #[serde(default)]
    pub body: Option<serde_json::Value>,
    #[serde(default = "default_fallback_status")]
    pub status: u16,
}

fn default_fallback_status() -> u16 {
    503
}

#[derive(Debug, Serialize, Deserialize, Clone)]
#[serde(default)]
pub struct AuthConfig {
    /// Cookie consulted when the Authorization header carries no bearer.
    pub cookie_name: String,
    /// Glob patterns whose responses are observed for Set-Cookie headers.
    pub watch_paths: Vec<String>,
}

impl Default for AuthConfig {
    fn default() -> Self {
        Self {
            cookie_name: "ACCESS_TOKEN".to_string(),
            watch_paths: Vec::new(),
        }
    }
}

/// Behaviour when the shared counter store cannot be reached.
#[derive(Debug, Serialize, Deserialize, Clone, Copy, PartialEq, Eq)]
#[serde(rename_all = "snake_case")]
pub enum FailurePolicy {
    FailOpen,
    FailClosed,
}

#[derive(Debug, Serialize, Deserialize, Clone)]
#[serde(default)]
pub struct RateLimitSettings {
    pub enabled: bool,
    pub default: RateLimitRuleConfig,
    pub overrides: Vec<RateLimitOverrideConfig>,
    pub key_prefix: String,
    pub on_store_error: FailurePolicy,
}

impl Default for RateLimitSettings {
    fn default() -> Self {
        Self {
            enabled: true,
            default: RateLimitRuleConfig::default(),
            overrides: Vec::new(),
            key_prefix: "rl:".to_string(),
            on_store_error: FailurePolicy::FailOpen,
        }
    }
}

#[derive(Debug, Serialize, Deserialize, Clone)]
pub struct RateLimitRuleConfig {
    pub limit: u64,
    #[serde(with = "humantime_duration")]
    pub window: Duration,
}

impl Default for RateLimitRuleConfig {
    fn default() -> Self {
        Self {
            limit: 100,
            window: Duration::from_secs(60),
        }
    }
}

#[derive(Debug, Serialize, Deserialize, Clone)]
pub struct RateLimitOverrideConfig {
    pub pattern: String,
    pub limit: u64,
    #[serde(with = "humantime_duration")]
    pub window: Duration,
}

/// Sliding window flavor for a breaker.
#[derive(Debug, Serialize, Deserialize, Clone, Copy, PartialEq, Eq)]
#[serde(rename_all = "snake_case")]
pub enum SlidingWindowType {
    Count,
    Time,
}

#[derive(Debug, Serialize, Deserialize, Clone)]
#[serde(default)]
pub struct BreakerConfig {
    pub sliding_window_type: SlidingWindowType,
    /// Outcome count for count-based windows, seconds for time-based.
    pub sliding_window_size: u32,
    /// Percentage in (0, 100].
    pub failure_rate_threshold: f32,
    #[serde(with = "humantime_duration")]
    pub wait_duration_open: Duration,
    pub half_open_permits: u32,
    #[serde(with = "humantime_duration")]
    pub call_timeout: Duration,
    /// Outcomes required before the failure rate is evaluated.
    pub minimum_calls: u32,
}

impl Default for BreakerConfig {
    fn default() -> Self {
        Self {
            sliding_window_type: SlidingWindowType::Count,
            sliding_window_size: 20,
            failure_rate_threshold: 50.0,
            wait_duration_open: Duration::from_secs(30),
            half_open_permits: 3,
            call_timeout: Duration::from_secs(5),
            minimum_calls: 10,
        }
    }
}

#[derive(Debug, Serialize, Deserialize, Clone, Default)]
#[serde(default)]
pub struct BreakerSettings {
    pub default: BreakerConfig,
    /// Named policy overrides, keyed by breaker name or backend name.
    pub overrides: HashMap<String, BreakerConfig>,
}

/// Outbound connection pool and timeout settings.
#[derive(Debug, Serialize, Deserialize, Clone)]
#[serde(default)]
pub struct HttpClientConfig {
    #[serde(with = "humantime_duration")]
    pub connect_timeout: Duration,
    #[serde(with = "humantime_duration")]
    pub pool_idle_timeout: Duration,
    pub pool_max_idle_per_host: usize,
}

impl Default for HttpClientConfig {
    fn default() -> Self {
        Self {
            connect_timeout: Duration::from_secs(3),
            pool_idle_timeout: Duration::from_secs(90),
            pool_max_idle_per_host: 32,
        }
    }
}
