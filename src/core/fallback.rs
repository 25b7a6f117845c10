//! Locally synthesized responses for degraded backends.
//!
//! A failed dispatch degrades in two steps: a configured fallback path is
//! forwarded through the gateway's own route table first (one shot, handled
//! by the ingress), and only when that is absent or also fails does this
//! dispatcher synthesize the terminal response with no further I/O, from
//! either a configured static payload or the default gateway error shape.
use axum::body::Body;
use chrono::Utc;
use hyper::{Response, StatusCode, header};

use crate::{
    config::FallbackConfig,
    core::{
        error::{GatewayError, error_response},
        retry::DispatchError,
    },
    metrics,
};

/// Synthesizes a response when a breaker is open or retries are exhausted.
pub struct FallbackDispatcher;

impl FallbackDispatcher {
    /// Monitoring label for a failure mode.
    pub fn reason(error: &DispatchError) -> &'static str {
        match error {
            DispatchError::Open => "circuit_open",
            DispatchError::Timeout => "timeout",
            DispatchError::Failed(_) => "failure",
        }
    }

    /// Produce the terminal response for a failed dispatch. With a fallback
    /// configured the route degrades to it for every failure mode; without
    /// one the failure surfaces as a gateway error (503/504/502).
    pub fn respond(
        backend: &str,
        fallback: Option<&FallbackConfig>,
        error: &DispatchError,
        request_id: &str,
    ) -> Response<Body> {
        if let Some(cfg) = fallback {
            metrics::increment_fallback(backend, Self::reason(error));
            return Self::render_fallback(backend, cfg, request_id);
        }

        let err = match error {
            DispatchError::Open => GatewayError::UpstreamUnavailable {
                backend: backend.to_string(),
            },
            DispatchError::Timeout => GatewayError::UpstreamTimeout {
                backend: backend.to_string(),
            },
            DispatchError::Failed(detail) => GatewayError::UpstreamFailure {
                backend: backend.to_string(),
                reason: detail.clone(),
            },
        };
        error_response(err.status(), err.to_string(), request_id)
    }

    fn render_fallback(
        backend: &str,
        cfg: &FallbackConfig,
        request_id: &str,
    ) -> Response<Body> {
        let status =
            StatusCode::from_u16(cfg.status).unwrap_or(StatusCode::SERVICE_UNAVAILABLE);

        let body = match &cfg.body {
            Some(value) => value.clone(),
            None => serde_json::json!({
                "status": status.as_u16(),
                "error": status.canonical_reason().unwrap_or("Service Unavailable"),
                "message": format!("{backend} is temporarily unavailable, responding from {}",
                    cfg.path.as_deref().unwrap_or("/fallback")),
                "timestamp": Utc::now().to_rfc3339(),
            }),
        };

        let mut builder = Response::builder()
            .status(status)
            .header(header::CONTENT_TYPE, "application/json");
        if let Ok(value) = header::HeaderValue::from_str(request_id) {
            builder = builder.header("X-Request-Id", value);
        }
        builder
            .body(Body::from(body.to_string()))
            .unwrap_or_else(|_| Response::new(Body::empty()))
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_static_payload_fallback() {
        let cfg = FallbackConfig {
            path: None,
            body: Some(serde_json::json!({"degraded": true})),
            status: 200,
        };
        let resp = FallbackDispatcher::respond(
            "scoring-service",
            Some(&cfg),
            &DispatchError::Open,
            "req-1",
        );
        assert_eq!(resp.status(), StatusCode::OK);
        assert_eq!(resp.headers().get("X-Request-Id").unwrap(), "req-1");
    }

    // The forward to a configured fallback path happens upstream in the
    // ingress; when it cannot be taken, respond() degrades to the shape
    // below.
    #[test]
    fn test_unforwardable_fallback_path_renders_default_shape() {
        let cfg = FallbackConfig {
            path: Some("/fallback/documents".to_string()),
            body: None,
            status: 503,
        };
        let resp = FallbackDispatcher::respond(
            "document-service",
            Some(&cfg),
            &DispatchError::Timeout,
            "req-2",
        );
        assert_eq!(resp.status(), StatusCode::SERVICE_UNAVAILABLE);
    }

    #[test]
    fn test_no_fallback_surfaces_gateway_errors() {
        let open =
            FallbackDispatcher::respond("svc", None, &DispatchError::Open, "req-3");
        assert_eq!(open.status(), StatusCode::SERVICE_UNAVAILABLE);

        let timeout =
            FallbackDispatcher::respond("svc", None, &DispatchError::Timeout, "req-3");
        assert_eq!(timeout.status(), StatusCode::GATEWAY_TIMEOUT);

        let failed = FallbackDispatcher::respond(
            "svc",
            None,
            &DispatchError::Failed("connection refused".to_string()),
            "req-3",
        );
        assert_eq!(failed.status(), StatusCode::BAD_GATEWAY);
    }
}
