//! The request pipeline entry point.
//!
//! Every proxied request passes through the same ordered filters: context
//! (installed by middleware), authentication, rate limiting, route matching,
//! breaker/retry-wrapped dispatch and, on failure, fallback. Public paths
//! skip authentication and rate limiting but still flow through routing and
//! dispatch.
use std::sync::Arc;

use axum::body::Body as AxumBody;
use bytes::Bytes;
use http_body_util::BodyExt;
use hyper::{
    HeaderMap, Request, Response, StatusCode,
    header::{self, HeaderValue},
};

use crate::{
    config::GatewayConfig,
    core::{
        auth::extract_bearer,
        breaker::CircuitBreakerRegistry,
        context::RequestContext,
        error::{GatewayError, error_response},
        fallback::FallbackDispatcher,
        pipeline::FilterPhase,
        rate_limit::{RateLimitDecision, RateLimiter},
        retry::{DispatchError, dispatch_with_retries},
        route::{PathSet, RouteDefinition, RouteTable},
    },
    metrics,
    ports::{discovery::ServiceDiscovery, http_client::HttpClient},
};

/// Buffered request bodies are capped so a retry replay cannot balloon
/// gateway memory.
const MAX_BUFFERED_BODY: usize = 2 * 1024 * 1024;

/// Shared state driving the proxy handler.
pub struct Ingress {
    routes: RouteTable,
    public_paths: PathSet,
    cookie_name: String,
    rate_limiter: RateLimiter,
    breakers: CircuitBreakerRegistry,
    discovery: Arc<dyn ServiceDiscovery>,
    http_client: Arc<dyn HttpClient>,
}

impl Ingress {
    pub fn new(
        config: &GatewayConfig,
        routes: RouteTable,
        public_paths: PathSet,
        rate_limiter: RateLimiter,
        breakers: CircuitBreakerRegistry,
        discovery: Arc<dyn ServiceDiscovery>,
        http_client: Arc<dyn HttpClient>,
    ) -> Self {
        Self {
            routes,
            public_paths,
            cookie_name: config.auth.cookie_name.clone(),
            rate_limiter,
            breakers,
            discovery,
            http_client,
        }
    }

    /// Run one request through the full filter chain.
    pub async fn handle(&self, req: Request<AxumBody>) -> Response<AxumBody> {
        let ctx = req
            .extensions()
            .get::<RequestContext>()
            .cloned()
            .unwrap_or_else(|| {
                RequestContext::new(req.method().clone(), req.uri().path(), req.headers(), None)
            });

        let path = req.uri().path().to_string();

        if path == "/healthz" {
            return health_response();
        }

        let public = self.public_paths.contains(&path);

        // Authentication: bearer from header or cookie, public paths exempt.
        let bearer = extract_bearer(req.headers(), &self.cookie_name);
        if !public && bearer.is_none() {
            let err = GatewayError::MissingCredential;
            tracing::warn!(
                request_id = %ctx.id,
                http.path = %path,
                phase = ?FilterPhase::Auth,
                "request without credential"
            );
            return error_response(err.status(), err.to_string(), &ctx.id);
        }

        // Rate limiting, also exempt for public paths.
        let decision = if public {
            RateLimitDecision::Bypassed
        } else {
            match self.rate_limiter.check(&ctx.client_ip, &path).await {
                Ok(decision) => decision,
                Err(err) => {
                    return error_response(err.status(), err.to_string(), &ctx.id);
                }
            }
        };

        if let RateLimitDecision::Limited { limit, reset_at_ms } = decision {
            let err = GatewayError::QuotaExceeded {
                key: RateLimiter::path_group(&path),
                limit,
                reset_at_ms,
            };
            let mut resp = error_response(err.status(), err.to_string(), &ctx.id);
            apply_rate_limit_headers(resp.headers_mut(), &decision);
            return resp;
        }

        // Route matching: first declared pattern wins.
        let Some(route) = self.routes.match_path(&path) else {
            tracing::debug!(
                request_id = %ctx.id,
                http.path = %path,
                phase = ?FilterPhase::Route,
                "no route matched"
            );
            let err = GatewayError::RouteNotFound { path };
            return error_response(err.status(), err.to_string(), &ctx.id);
        };

        let mut response = self.dispatch(req, route, &ctx, bearer.as_deref()).await;
        apply_rate_limit_headers(response.headers_mut(), &decision);
        response
    }

    /// Forward to the route's backend under its breaker, replaying buffered
    /// bodies across retry attempts.
    async fn dispatch(
        &self,
        req: Request<AxumBody>,
        route: &RouteDefinition,
        ctx: &RequestContext,
        bearer: Option<&str>,
    ) -> Response<AxumBody> {
        let Some(backend_url) = self.discovery.resolve(&route.backend).await else {
            let err = GatewayError::UpstreamUnavailable {
                backend: route.backend.clone(),
            };
            tracing::error!(backend = %route.backend, "backend has no resolvable address");
            return error_response(err.status(), err.to_string(), &ctx.id);
        };

        let (parts, body) = req.into_parts();

        // Buffer the body once so retries can replay it byte for byte.
        let body_bytes: Bytes = match http_body_util::Limited::new(body, MAX_BUFFERED_BODY)
            .collect()
            .await
        {
            Ok(collected) => collected.to_bytes(),
            Err(_) => {
                return error_response(
                    StatusCode::PAYLOAD_TOO_LARGE,
                    "Request body exceeds the proxy buffer limit",
                    &ctx.id,
                );
            }
        };

        let rewritten = route.rewrite(parts.uri.path());
        let target = match parts.uri.query() {
            Some(query) => backend_url.join(&format!("{rewritten}?{query}")),
            None => backend_url.join(&rewritten),
        };

        let mut headers = parts.headers.clone();
        headers.remove(header::HOST);
        if let Some(token) = bearer
            && let Ok(value) = HeaderValue::from_str(&format!("Bearer {token}"))
        {
            headers.insert(header::AUTHORIZATION, value);
        }
        if let Ok(value) = HeaderValue::from_str(&ctx.id) {
            headers.insert("X-Request-Id", value);
        }
        if let Ok(value) = HeaderValue::from_str(&ctx.client_ip) {
            headers.insert("X-Forwarded-For", value);
        }
        headers.insert("X-Forwarded-Proto", HeaderValue::from_static("http"));

        let breaker = self.breakers.get(&route.backend);
        let result = dispatch_with_retries(&breaker, &parts.method, route.retries, |attempt| {
            let target = target.clone();
            let method = parts.method.clone();
            let headers = headers.clone();
            let body = body_bytes.clone();
            let client = self.http_client.clone();
            async move {
                if attempt > 0 {
                    tracing::debug!(target = %target, attempt, "replaying buffered request");
                }
                let mut builder = Request::builder().method(method).uri(&target);
                if let Some(out_headers) = builder.headers_mut() {
                    *out_headers = headers;
                }
                let req = builder.body(AxumBody::from(body)).map_err(|e| {
                    crate::ports::http_client::HttpClientError::InvalidRequest(e.to_string())
                })?;
                client.send_request(req).await
            }
        })
        .await;

        match result {
            Ok(response) => response,
            Err(error) => {
                tracing::warn!(
                    request_id = %ctx.id,
                    backend = %route.backend,
                    error = ?error,
                    "dispatch failed, degrading"
                );
                self.respond_fallback(route, &error, ctx).await
            }
        }
    }

    /// Degrade a failed dispatch: forward to the configured fallback path
    /// when one resolves, else synthesize the fallback response locally.
    async fn respond_fallback(
        &self,
        route: &RouteDefinition,
        error: &DispatchError,
        ctx: &RequestContext,
    ) -> Response<AxumBody> {
        if let Some(cfg) = route.fallback.as_ref()
            && let Some(path) = cfg.path.as_deref()
            && let Some(response) = self.forward_fallback(route, path, ctx).await
        {
            metrics::increment_fallback(&route.backend, FallbackDispatcher::reason(error));
            return response;
        }
        FallbackDispatcher::respond(&route.backend, route.fallback.as_ref(), error, &ctx.id)
    }

    /// One-shot GET of an internal fallback path through the route table.
    /// No retries and no nested fallback; anything short of a usable
    /// response means the caller renders the local shape instead.
    async fn forward_fallback(
        &self,
        origin: &RouteDefinition,
        path: &str,
        ctx: &RequestContext,
    ) -> Option<Response<AxumBody>> {
        let route = self.routes.match_path(path)?;
        // A fallback pointing back at the failing backend would only fail
        // again.
        if route.backend == origin.backend {
            return None;
        }
        let backend_url = self.discovery.resolve(&route.backend).await?;
        let target = backend_url.join(&route.rewrite(path));

        let mut builder = Request::builder().method(hyper::Method::GET).uri(&target);
        if let Some(out_headers) = builder.headers_mut()
            && let Ok(value) = HeaderValue::from_str(&ctx.id)
        {
            out_headers.insert("X-Request-Id", value);
        }
        let req = builder.body(AxumBody::empty()).ok()?;

        match self.http_client.send_request(req).await {
            Ok(response) if !response.status().is_server_error() => {
                tracing::info!(
                    request_id = %ctx.id,
                    fallback_path = %path,
                    backend = %route.backend,
                    "served internal fallback path"
                );
                Some(response)
            }
            Ok(_) | Err(_) => {
                tracing::warn!(
                    request_id = %ctx.id,
                    fallback_path = %path,
                    "fallback path dispatch failed"
                );
                None
            }
        }
    }
}

fn health_response() -> Response<AxumBody> {
    let body = serde_json::json!({ "status": "UP" });
    Response::builder()
        .status(StatusCode::OK)
        .header(header::CONTENT_TYPE, "application/json")
        .body(AxumBody::from(body.to_string()))
        .unwrap_or_else(|_| Response::new(AxumBody::empty()))
}

/// Attach the standard quota headers for both allowed and limited outcomes.
fn apply_rate_limit_headers(headers: &mut HeaderMap, decision: &RateLimitDecision) {
    match decision {
        RateLimitDecision::Allowed { limit, remaining } => {
            headers.insert("X-RateLimit-Limit", header_value_u64(*limit));
            headers.insert("X-RateLimit-Remaining", header_value_u64(*remaining));
        }
        RateLimitDecision::Limited { limit, reset_at_ms } => {
            headers.insert("X-RateLimit-Limit", header_value_u64(*limit));
            headers.insert("X-RateLimit-Remaining", HeaderValue::from_static("0"));
            if let Ok(value) = HeaderValue::from_str(&reset_at_ms.to_string()) {
                headers.insert("X-RateLimit-Reset", value);
            }
        }
        RateLimitDecision::Bypassed => {}
    }
}

fn header_value_u64(value: u64) -> HeaderValue {
    HeaderValue::from_str(&value.to_string()).unwrap_or_else(|_| HeaderValue::from_static("0"))
}
