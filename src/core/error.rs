//! Error taxonomy for the edge pipeline.
//!
//! Terminal rejections (missing credential, quota) never reach a backend;
//! backend-facing failures are only ever handled by the retry/breaker/
//! fallback layer. Every terminal error response carries the stable
//! `{status, error, message, timestamp}` JSON shape plus the originating
//! request id in `X-Request-Id`.
use axum::body::Body;
use chrono::Utc;
use hyper::{Response, StatusCode, header};
use serde::Serialize;
use thiserror::Error;

/// Domain errors produced by the request pipeline.
#[derive(Error, Debug)]
#[non_exhaustive]
pub enum GatewayError {
    /// Protected path, no bearer token in header or cookie.
    #[error("missing bearer credential")]
    MissingCredential,

    /// Rate limit window exhausted for a client/path-group key.
    #[error("rate limit exceeded for {key}")]
    QuotaExceeded {
        key: String,
        limit: u64,
        reset_at_ms: i64,
    },

    /// Circuit is open; no network attempt was made.
    #[error("backend {backend} circuit is open")]
    UpstreamUnavailable { backend: String },

    /// Per-call timeout elapsed with no retry budget left.
    #[error("backend {backend} timed out")]
    UpstreamTimeout { backend: String },

    /// Dispatch failed after exhausting the retry budget.
    #[error("backend {backend} dispatch failed: {reason}")]
    UpstreamFailure { backend: String, reason: String },

    /// No route pattern matched the request path.
    #[error("no route matches {path}")]
    RouteNotFound { path: String },

    /// Control-plane infrastructure (counter store) unreachable under a
    /// fail-closed policy.
    #[error("counter store unreachable: {0}")]
    StoreUnavailable(String),
}

impl GatewayError {
    pub fn status(&self) -> StatusCode {
        match self {
            GatewayError::MissingCredential => StatusCode::UNAUTHORIZED,
            GatewayError::QuotaExceeded { .. } => StatusCode::TOO_MANY_REQUESTS,
            GatewayError::UpstreamUnavailable { .. } | GatewayError::StoreUnavailable(_) => {
                StatusCode::SERVICE_UNAVAILABLE
            }
            GatewayError::UpstreamTimeout { .. } => StatusCode::GATEWAY_TIMEOUT,
            GatewayError::UpstreamFailure { .. } => StatusCode::BAD_GATEWAY,
            GatewayError::RouteNotFound { .. } => StatusCode::NOT_FOUND,
        }
    }
}

/// The wire shape of every terminal error the edge synthesizes.
#[derive(Debug, Serialize)]
pub struct ErrorBody {
    pub status: u16,
    pub error: String,
    pub message: String,
    pub timestamp: String,
}

impl ErrorBody {
    pub fn new(status: StatusCode, message: impl Into<String>) -> Self {
        Self {
            status: status.as_u16(),
            error: status
                .canonical_reason()
                .unwrap_or("Unknown Error")
                .to_string(),
            message: message.into(),
            timestamp: Utc::now().to_rfc3339(),
        }
    }
}

/// Build a JSON error response with the documented body shape and the
/// request id header for correlation.
pub fn error_response(
    status: StatusCode,
    message: impl Into<String>,
    request_id: &str,
) -> Response<Body> {
    let body = ErrorBody::new(status, message);
    let json = serde_json::to_string(&body)
        .unwrap_or_else(|_| format!("{{\"status\":{}}}", status.as_u16()));

    let mut builder = Response::builder()
        .status(status)
        .header(header::CONTENT_TYPE, "application/json");
    if let Ok(value) = header::HeaderValue::from_str(request_id) {
        builder = builder.header("X-Request-Id", value);
    }
    builder
        .body(Body::from(json))
        .unwrap_or_else(|_| Response::new(Body::empty()))
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_error_body_shape() {
        let body = ErrorBody::new(StatusCode::UNAUTHORIZED, "missing bearer token");
        assert_eq!(body.status, 401);
        assert_eq!(body.error, "Unauthorized");
        assert_eq!(body.message, "missing bearer token");
        assert!(!body.timestamp.is_empty());
    }

    #[test]
    fn test_status_mapping() {
        assert_eq!(
            GatewayError::MissingCredential.status(),
            StatusCode::UNAUTHORIZED
        );
        assert_eq!(
            GatewayError::QuotaExceeded {
                key: "1.2.3.4:/api/users".to_string(),
                limit: 50,
                reset_at_ms: 0,
            }
            .status(),
            StatusCode::TOO_MANY_REQUESTS
        );
        assert_eq!(
            GatewayError::UpstreamTimeout {
                backend: "auth-service".to_string()
            }
            .status(),
            StatusCode::GATEWAY_TIMEOUT
        );
    }

    #[test]
    fn test_error_response_headers() {
        let resp = error_response(StatusCode::UNAUTHORIZED, "no token", "req-abc123");
        assert_eq!(resp.status(), StatusCode::UNAUTHORIZED);
        assert_eq!(
            resp.headers().get(header::CONTENT_TYPE).unwrap(),
            "application/json"
        );
        assert_eq!(resp.headers().get("X-Request-Id").unwrap(), "req-abc123");
    }
}
