//! Verge - an edge API gateway request pipeline.
//!
//! Verge is an opinionated API gateway implementing a **hexagonal architecture**.
//! Every proxied request passes through one explicitly ordered filter chain:
//! request context, authentication, rate limiting, route matching, circuit
//! breaker / retry wrapped dispatch, and response-side cookie observation.
//! This library exposes the building blocks so you can embed the gateway or
//! compose parts of it inside your own application.
//!
//! # Features
//! - Declarative path routing with glob patterns (`*`, `**`, `{var}`) where
//!   the first declared match wins and prefixes can be stripped on dispatch
//! - Bearer propagation from the `Authorization` header or a named cookie,
//!   with an ordered public-path allowlist bypassing auth and rate limiting
//! - Distributed fixed-window rate limiting keyed by client IP and path
//!   group, with per-path overrides and an explicit fail-open/fail-closed
//!   policy for store outages
//! - Per-backend circuit breakers (count or time sliding windows), bounded
//!   retries for idempotent methods, per-call timeouts, and configured
//!   fallback responses for degraded backends
//! - Per-request ids and cancellation-safe completion logging
//! - Metrics (`metrics` facade) & structured tracing via `tracing`
//! - Graceful shutdown
//!
//! # Quick Example
//! ```no_run
//! # #[tokio::main] async fn main() -> eyre::Result<()> {
//! let cfg = verge::config::loader::load_config("gateway.toml").await?;
//! verge::config::GatewayConfigValidator::validate(&cfg)?;
//! let routes = verge::core::RouteTable::from_config(&cfg.routes)?;
//! // Wire routes, limiter and breakers into the Ingress adapter (see the
//! // binary crate for the full assembly).
//! # Ok(()) }
//! ```
//!
//! # Architecture
//! The crate separates **ports** (traits) from **adapters** (implementations)
//! while keeping business logic inside `core`. End users should prefer the
//! re-exports documented below instead of reaching into internal modules
//! directly.
//!
//! # Error Handling
//! All fallible APIs return `eyre::Result<T>` or a domain specific error
//! type. Custom error context is attached using `WrapErr` for debuggability.
//!
//! # Concurrency & Data Structures
//! For shared mutable maps the project uses `scc::HashMap` instead of
//! `dashmap` to maintain predictable performance characteristics under
//! contention.
//!
//! # License
//! Licensed under Apache-2.0.
pub mod config;
pub mod metrics;
pub mod ports;
pub mod tracing_setup;
pub mod utils;

// These modules are implementation details and should not be directly used by users
pub mod adapters;
pub mod core;

// Re-exports used by the binary crate
pub use crate::{
    adapters::{HttpClientAdapter, InMemoryCounterStore, Ingress, StaticDiscovery},
    core::{CircuitBreakerRegistry, PathSet, RateLimiter, RouteTable},
    ports::{counter_store::CounterStore, http_client::HttpClient},
    utils::GracefulShutdown,
};
