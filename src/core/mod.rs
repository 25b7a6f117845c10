pub mod auth;
pub mod backend;
pub mod breaker;
pub mod context;
pub mod error;
pub mod fallback;
pub mod pipeline;
pub mod rate_limit;
pub mod retry;
pub mod route;

pub use breaker::{CircuitBreaker, CircuitBreakerRegistry};
pub use error::GatewayError;
pub use rate_limit::RateLimiter;
pub use route::{PathSet, RouteTable};
