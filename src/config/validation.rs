use std::net::SocketAddr;

use tracing::warn;

use crate::{
    config::models::{BreakerConfig, GatewayConfig, RouteConfig},
    core::route::{PathPattern, RouteTable},
};

/// Validation result type alias
pub type ValidationResult<T> = Result<T, ValidationError>;

/// Validation error types
#[derive(Debug, thiserror::Error, Clone)]
pub enum ValidationError {
    #[error("Missing required field: {field}")]
    MissingField { field: String },

    #[error("Invalid field '{field}': {message}")]
    InvalidField { field: String, message: String },

    #[error("Invalid listen address '{address}': {reason}")]
    InvalidListenAddress { address: String, reason: String },

    #[error("Validation failed: {message}")]
    ValidationFailed { message: String },
}

/// Gateway configuration validator
pub struct GatewayConfigValidator;

impl GatewayConfigValidator {
    /// Validate the entire gateway configuration
    pub fn validate(config: &GatewayConfig) -> ValidationResult<()> {
        let mut errors = Vec::new();

        if let Err(e) = Self::validate_listen_address(&config.listen_addr) {
            errors.push(e);
        }

        for (name, url) in &config.backends {
            if let Err(e) = Self::validate_backend_url(name, url) {
                errors.push(e);
            }
        }

        if config.routes.is_empty() {
            errors.push(ValidationError::MissingField {
                field: "routes".to_string(),
            });
        } else {
            for route in &config.routes {
                if let Err(mut route_errors) = Self::validate_single_route(route, config) {
                    errors.append(&mut route_errors);
                }
            }
        }

        for (i, pattern) in config.public_paths.iter().enumerate() {
            if let Err(e) = PathPattern::compile(pattern) {
                errors.push(ValidationError::InvalidField {
                    field: format!("public_paths[{i}]"),
                    message: e.to_string(),
                });
            }
        }

        for (i, ovr) in config.rate_limit.overrides.iter().enumerate() {
            if ovr.limit == 0 {
                errors.push(ValidationError::InvalidField {
                    field: format!("rate_limit.overrides[{i}].limit"),
                    message: "Limit must be greater than zero".to_string(),
                });
            }
            if let Err(e) = PathPattern::compile(&ovr.pattern) {
                errors.push(ValidationError::InvalidField {
                    field: format!("rate_limit.overrides[{i}].pattern"),
                    message: e.to_string(),
                });
            }
        }
        if config.rate_limit.default.limit == 0 {
            errors.push(ValidationError::InvalidField {
                field: "rate_limit.default.limit".to_string(),
                message: "Limit must be greater than zero".to_string(),
            });
        }

        if let Err(e) =
            Self::validate_breaker("circuit_breakers.default", &config.circuit_breakers.default)
        {
            errors.push(e);
        }
        for (name, breaker) in &config.circuit_breakers.overrides {
            if let Err(e) =
                Self::validate_breaker(&format!("circuit_breakers.overrides.{name}"), breaker)
            {
                errors.push(e);
            }
        }

        for (i, pattern) in config.auth.watch_paths.iter().enumerate() {
            if let Err(e) = PathPattern::compile(pattern) {
                errors.push(ValidationError::InvalidField {
                    field: format!("auth.watch_paths[{i}]"),
                    message: e.to_string(),
                });
            }
        }

        // Overlapping route patterns are legal; declaration order decides.
        // Surface them anyway so accidental shadowing is visible.
        if errors.is_empty() {
            if let Ok(table) = RouteTable::from_config(&config.routes) {
                for (first, first_pattern, shadowed, shadowed_pattern) in
                    table.overlapping_routes()
                {
                    warn!(
                        first_route = %first,
                        first_pattern = %first_pattern,
                        shadowed_route = %shadowed,
                        shadowed_pattern = %shadowed_pattern,
                        "route pattern is shadowed by an earlier declaration"
                    );
                }
            }
        }

        if errors.is_empty() {
            Ok(())
        } else {
            Err(ValidationError::ValidationFailed {
                message: Self::format_multiple_errors(errors),
            })
        }
    }

    /// Validate listen address format
    fn validate_listen_address(address: &str) -> ValidationResult<()> {
        if address.parse::<SocketAddr>().is_err() {
            return Err(ValidationError::InvalidListenAddress {
                address: address.to_string(),
                reason: "Must be in format 'IP:PORT' (e.g., '127.0.0.1:8080' or '0.0.0.0:8080')"
                    .to_string(),
            });
        }
        Ok(())
    }

    fn validate_backend_url(name: &str, url: &str) -> ValidationResult<()> {
        if !url.starts_with("http://") && !url.starts_with("https://") {
            return Err(ValidationError::InvalidField {
                field: format!("backends.{name}"),
                message: "Backend URLs must start with http:// or https://".to_string(),
            });
        }
        Ok(())
    }

    /// Validate a single route definition against the rest of the config
    fn validate_single_route(
        route: &RouteConfig,
        config: &GatewayConfig,
    ) -> Result<(), Vec<ValidationError>> {
        let mut errors = Vec::new();

        if route.patterns.is_empty() {
            errors.push(ValidationError::MissingField {
                field: format!("routes.{}.patterns", route.id),
            });
        }
        for pattern in &route.patterns {
            if !pattern.starts_with('/') {
                errors.push(ValidationError::InvalidField {
                    field: format!("routes.{}.patterns", route.id),
                    message: format!("Pattern '{pattern}' must start with '/'"),
                });
            } else if let Err(e) = PathPattern::compile(pattern) {
                errors.push(ValidationError::InvalidField {
                    field: format!("routes.{}.patterns", route.id),
                    message: e.to_string(),
                });
            }
        }

        if !config.backends.contains_key(&route.backend) {
            errors.push(ValidationError::InvalidField {
                field: format!("routes.{}.backend", route.id),
                message: format!("Unknown backend '{}'", route.backend),
            });
        }

        if let Some(breaker) = &route.breaker {
            let known = config.circuit_breakers.overrides.contains_key(breaker)
                || config.backends.contains_key(breaker);
            if !known {
                errors.push(ValidationError::InvalidField {
                    field: format!("routes.{}.breaker", route.id),
                    message: format!("Unknown breaker policy '{breaker}'"),
                });
            }
        }

        if let Some(fallback) = &route.fallback
            && let Some(path) = &fallback.path
            && !path.starts_with('/')
        {
            errors.push(ValidationError::InvalidField {
                field: format!("routes.{}.fallback.path", route.id),
                message: "Fallback paths must start with '/'".to_string(),
            });
        }

        if errors.is_empty() { Ok(()) } else { Err(errors) }
    }

    fn validate_breaker(field: &str, breaker: &BreakerConfig) -> ValidationResult<()> {
        if breaker.sliding_window_size == 0 {
            return Err(ValidationError::InvalidField {
                field: format!("{field}.sliding_window_size"),
                message: "Window size must be greater than zero".to_string(),
            });
        }
        if breaker.failure_rate_threshold <= 0.0 || breaker.failure_rate_threshold > 100.0 {
            return Err(ValidationError::InvalidField {
                field: format!("{field}.failure_rate_threshold"),
                message: "Threshold must be a percentage in (0, 100]".to_string(),
            });
        }
        if breaker.half_open_permits == 0 {
            return Err(ValidationError::InvalidField {
                field: format!("{field}.half_open_permits"),
                message: "At least one trial call is required".to_string(),
            });
        }
        Ok(())
    }

    /// Format multiple validation errors into a single message
    fn format_multiple_errors(errors: Vec<ValidationError>) -> String {
        errors
            .iter()
            .map(|e| e.to_string())
            .collect::<Vec<_>>()
            .join("; ")
    }
}

#[cfg(test)]
mod tests {
    use std::collections::HashMap;

    use super::*;
    use crate::config::models::{FallbackConfig, RateLimitOverrideConfig};

    fn base_config() -> GatewayConfig {
        GatewayConfig {
            listen_addr: "127.0.0.1:8080".to_string(),
            backends: HashMap::from([(
                "user-service".to_string(),
                "http://user-service:8080".to_string(),
            )]),
            routes: vec![RouteConfig {
                id: "users".to_string(),
                patterns: vec!["/api/users/**".to_string()],
                strip_prefix: 0,
                backend: "user-service".to_string(),
                breaker: None,
                fallback: None,
                retries: 0,
            }],
            public_paths: vec!["/api/auth/login".to_string()],
            auth: Default::default(),
            rate_limit: Default::default(),
            circuit_breakers: Default::default(),
            http_client: Default::default(),
        }
    }

    #[test]
    fn test_valid_config_passes() {
        assert!(GatewayConfigValidator::validate(&base_config()).is_ok());
    }

    #[test]
    fn test_invalid_listen_address() {
        let mut config = base_config();
        config.listen_addr = "not-an-address".to_string();
        let err = GatewayConfigValidator::validate(&config).unwrap_err();
        assert!(err.to_string().contains("Invalid listen address"));
    }

    #[test]
    fn test_empty_routes_rejected() {
        let mut config = base_config();
        config.routes.clear();
        let err = GatewayConfigValidator::validate(&config).unwrap_err();
        assert!(err.to_string().contains("routes"));
    }

    #[test]
    fn test_unknown_backend_rejected() {
        let mut config = base_config();
        config.routes[0].backend = "missing".to_string();
        let err = GatewayConfigValidator::validate(&config).unwrap_err();
        assert!(err.to_string().contains("Unknown backend"));
    }

    #[test]
    fn test_unknown_breaker_rejected() {
        let mut config = base_config();
        config.routes[0].breaker = Some("missing-policy".to_string());
        let err = GatewayConfigValidator::validate(&config).unwrap_err();
        assert!(err.to_string().contains("Unknown breaker policy"));
    }

    #[test]
    fn test_bad_pattern_rejected() {
        let mut config = base_config();
        config.routes[0].patterns = vec!["/api/**/users".to_string()];
        assert!(GatewayConfigValidator::validate(&config).is_err());
    }

    #[test]
    fn test_zero_rate_limit_rejected() {
        let mut config = base_config();
        config.rate_limit.overrides.push(RateLimitOverrideConfig {
            pattern: "/api/search/**".to_string(),
            limit: 0,
            window: std::time::Duration::from_secs(60),
        });
        assert!(GatewayConfigValidator::validate(&config).is_err());
    }

    #[test]
    fn test_breaker_threshold_bounds() {
        let mut config = base_config();
        config.circuit_breakers.default.failure_rate_threshold = 0.0;
        assert!(GatewayConfigValidator::validate(&config).is_err());
        config.circuit_breakers.default.failure_rate_threshold = 101.0;
        assert!(GatewayConfigValidator::validate(&config).is_err());
    }

    #[test]
    fn test_relative_fallback_path_rejected() {
        let mut config = base_config();
        config.routes[0].fallback = Some(FallbackConfig {
            path: Some("degraded".to_string()),
            body: None,
            status: 503,
        });
        assert!(GatewayConfigValidator::validate(&config).is_err());
    }
}
