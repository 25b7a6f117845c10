//! Per-request context and completion instrumentation.
//!
//! A `RequestContext` is created before any other filter runs and carries
//! the request id, resolved client IP, method, path and start time. The
//! paired `CompletionGuard` logs on `Drop`, so the completion hook fires on
//! every exit path: success, error, and client cancellation.
use std::time::Instant;

use hyper::{HeaderMap, Method, StatusCode};
use uuid::Uuid;

use crate::metrics;

/// Immutable request metadata, cloned into request extensions.
#[derive(Debug, Clone)]
pub struct RequestContext {
    pub id: String,
    pub client_ip: String,
    pub method: Method,
    pub path: String,
    pub started: Instant,
}

impl RequestContext {
    pub fn new(method: Method, path: &str, headers: &HeaderMap, peer_ip: Option<String>) -> Self {
        Self {
            id: generate_request_id(),
            client_ip: resolve_client_ip(headers, peer_ip),
            method,
            path: path.to_string(),
            started: Instant::now(),
        }
    }
}

/// A short, opaque, per-request id.
pub fn generate_request_id() -> String {
    let mut id = Uuid::new_v4().simple().to_string();
    id.truncate(12);
    id
}

/// Resolution order: first `X-Forwarded-For` entry, else `X-Real-IP`, else
/// the peer address.
pub fn resolve_client_ip(headers: &HeaderMap, peer_ip: Option<String>) -> String {
    if let Some(forwarded_for) = headers.get("X-Forwarded-For")
        && let Ok(value) = forwarded_for.to_str()
        && let Some(first) = value.split(',').next()
        && !first.trim().is_empty()
    {
        return first.trim().to_string();
    }

    if let Some(real_ip) = headers.get("X-Real-IP")
        && let Ok(value) = real_ip.to_str()
        && !value.trim().is_empty()
    {
        return value.trim().to_string();
    }

    peer_ip.unwrap_or_else(|| "unknown".to_string())
}

/// Logs request completion when dropped. A dropped guard with no recorded
/// status means the client went away mid-flight.
pub struct CompletionGuard {
    ctx: RequestContext,
    status: Option<StatusCode>,
}

impl CompletionGuard {
    pub fn new(ctx: RequestContext) -> Self {
        Self { ctx, status: None }
    }

    pub fn record_status(&mut self, status: StatusCode) {
        self.status = Some(status);
    }
}

impl Drop for CompletionGuard {
    fn drop(&mut self) {
        let elapsed = self.ctx.started.elapsed();
        match self.status {
            Some(status) => {
                metrics::increment_request_total(
                    &self.ctx.path,
                    self.ctx.method.as_str(),
                    status.as_u16(),
                );
                tracing::info!(
                    request_id = %self.ctx.id,
                    client_ip = %self.ctx.client_ip,
                    http.method = %self.ctx.method,
                    http.path = %self.ctx.path,
                    http.status_code = status.as_u16(),
                    elapsed_ms = elapsed.as_millis() as u64,
                    "request completed"
                );
            }
            None => {
                tracing::info!(
                    request_id = %self.ctx.id,
                    client_ip = %self.ctx.client_ip,
                    http.method = %self.ctx.method,
                    http.path = %self.ctx.path,
                    elapsed_ms = elapsed.as_millis() as u64,
                    "request cancelled by client"
                );
            }
        }
        metrics::record_request_duration(&self.ctx.path, self.ctx.method.as_str(), elapsed);
    }
}

#[cfg(test)]
mod tests {
    use hyper::header::HeaderValue;

    use super::*;

    #[test]
    fn test_request_id_is_short_and_unique() {
        let a = generate_request_id();
        let b = generate_request_id();
        assert_eq!(a.len(), 12);
        assert_ne!(a, b);
    }

    #[test]
    fn test_forwarded_for_first_entry_wins() {
        let mut headers = HeaderMap::new();
        headers.insert(
            "X-Forwarded-For",
            HeaderValue::from_static("203.0.113.9, 10.0.0.1"),
        );
        headers.insert("X-Real-IP", HeaderValue::from_static("10.0.0.2"));
        assert_eq!(
            resolve_client_ip(&headers, Some("127.0.0.1".to_string())),
            "203.0.113.9"
        );
    }

    #[test]
    fn test_real_ip_fallback() {
        let mut headers = HeaderMap::new();
        headers.insert("X-Real-IP", HeaderValue::from_static("10.0.0.2"));
        assert_eq!(
            resolve_client_ip(&headers, Some("127.0.0.1".to_string())),
            "10.0.0.2"
        );
    }

    #[test]
    fn test_peer_address_fallback() {
        let headers = HeaderMap::new();
        assert_eq!(
            resolve_client_ip(&headers, Some("127.0.0.1".to_string())),
            "127.0.0.1"
        );
        assert_eq!(resolve_client_ip(&headers, None), "unknown");
    }
}
