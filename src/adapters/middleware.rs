//! Axum middleware layers wrapping the dispatch pipeline.
//!
//! Two layers live here. The request context layer runs first on the way in
//! and establishes the per-request identity (request id, client IP) that
//! every later filter reads; its completion guard runs last on the way out,
//! so the completion log fires even when the client disconnects mid-flight.
//! The cookie watch layer observes `Set-Cookie` response headers on
//! configured paths.
use std::{net::SocketAddr, sync::Arc};

use axum::{
    extract::{ConnectInfo, Request},
    http::HeaderValue,
    middleware::Next,
    response::Response,
};
use hyper::header;

use crate::{
    core::{
        context::{CompletionGuard, RequestContext},
        route::PathSet,
    },
    metrics,
};

/// Establish the request context and completion guard.
///
/// The context is inserted into request extensions for downstream filters,
/// the request id is echoed back to the caller as `X-Request-Id`, and the
/// whole call runs inside a span carrying the request identity.
pub async fn request_context_middleware(
    ConnectInfo(peer): ConnectInfo<SocketAddr>,
    mut req: Request,
    next: Next,
) -> Response {
    let ctx = RequestContext::new(
        req.method().clone(),
        req.uri().path(),
        req.headers(),
        Some(peer.ip().to_string()),
    );

    let span = tracing::info_span!(
        "request",
        request_id = %ctx.id,
        client_ip = %ctx.client_ip,
        http.method = %ctx.method,
        http.path = %ctx.path,
    );
    let _enter = span.enter();

    let mut guard = CompletionGuard::new(ctx.clone());
    let request_id = ctx.id.clone();
    req.extensions_mut().insert(ctx);

    let mut response = next.run(req).await;
    guard.record_status(response.status());

    if let Ok(value) = HeaderValue::from_str(&request_id) {
        response.headers_mut().insert("X-Request-Id", value);
    }

    response
}

/// Build the cookie watch layer for the configured path patterns.
///
/// Responses on watched paths are scanned for `Set-Cookie` headers; cookie
/// names (never values) are logged and counted. Runs as the outermost
/// response-side filter so it sees the final response, fallback included.
pub fn create_cookie_watch_middleware(
    watch_paths: Arc<PathSet>,
) -> impl Fn(Request, Next) -> std::pin::Pin<Box<dyn Future<Output = Response> + Send>> + Clone {
    move |req, next| {
        let watch_paths = watch_paths.clone();
        Box::pin(async move { cookie_watch(req, next, watch_paths).await })
    }
}

async fn cookie_watch(req: Request, next: Next, watch_paths: Arc<PathSet>) -> Response {
    let path = req.uri().path().to_string();
    let watched = watch_paths.contains(&path);

    let response = next.run(req).await;

    if watched {
        for value in response.headers().get_all(header::SET_COOKIE) {
            if let Some(name) = cookie_name(value) {
                metrics::increment_cookie_observed(&name);
                tracing::info!(
                    http.path = %path,
                    cookie_name = %name,
                    "set-cookie observed on watched path"
                );
            }
        }
    }

    response
}

/// Extract the cookie name from a `Set-Cookie` header value. Values are
/// never logged.
fn cookie_name(value: &HeaderValue) -> Option<String> {
    let raw = value.to_str().ok()?;
    let name = raw.split('=').next()?.trim();
    if name.is_empty() {
        None
    } else {
        Some(name.to_string())
    }
}
