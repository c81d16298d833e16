//! # HTTP Middleware Chain
//!
//! Four `axum::middleware::from_fn` stages run in a fixed order on every
//! request: audit, then auth, then rate limiting, then structural
//! validation, then the handler. `tower::ServiceBuilder` composes layers
//! outside-in in the order they're added, so `server.rs` attaches them as
//! `.layer(audit).layer(auth).layer(rate_limit).layer(validation)` — the
//! same order they run in — to get that order at request time. Security
//! response headers and CORS are applied separately — headers always, CORS
//! only when configured.

use axum::body::Body;
use axum::extract::State;
use axum::http::{self, HeaderValue, Request, StatusCode};
use axum::middleware::Next;
use axum::response::{IntoResponse, Response};

use crate::audit::{AuditEvent, AuditEventType};
use crate::config::CorsConfig;
use crate::gateway_error::GatewayError;
use crate::rate_limit::extract_key;
use crate::request_context::RequestContext;
use crate::server::AppState;

fn client_ip(headers: &http::HeaderMap) -> Option<String> {
    headers
        .get("x-forwarded-for")
        .and_then(|v| v.to_str().ok())
        .and_then(|v| v.split(',').next())
        .map(|s| s.trim().to_string())
}

/// Outermost stage: always records an audit event for the final response,
/// regardless of what later stages decide.
pub async fn audit_middleware(State(state): State<AppState>, req: Request<Body>, next: Next) -> Response {
    let method = req.method().to_string();
    let path = req.uri().path().to_string();
    let ip = client_ip(req.headers());

    let response = next.run(req).await;
    let status = response.status();

    let ctx = response.extensions().get::<RequestContext>().cloned();
    let request_id = ctx.as_ref().map(|c| c.request_id.clone()).unwrap_or_default();

    let event_type = if status == StatusCode::UNAUTHORIZED {
        AuditEventType::AuthenticationFailure
    } else if status == StatusCode::TOO_MANY_REQUESTS {
        AuditEventType::RateLimitExceeded
    } else if status == StatusCode::BAD_REQUEST {
        AuditEventType::ValidationFailure
    } else if status.is_server_error() {
        AuditEventType::SecurityViolation
    } else {
        AuditEventType::ApiKeyUsage
    };

    let mut event = AuditEvent::new(event_type, request_id, method, path, status.as_u16());
    if let Some(ctx) = &ctx {
        if let Some(user_id) = &ctx.user_id {
            event = event.with_user_id(user_id.clone());
        }
    }
    if let Some(ip) = ip {
        event = event.with_client_ip(ip);
    }
    state.audit.record(event);

    response
}

/// Authenticates the request and injects a [`RequestContext`] into both
/// the request (for downstream handlers) and the response (for the audit
/// stage, which runs after this one completes).
pub async fn auth_middleware(State(state): State<AppState>, mut req: Request<Body>, next: Next) -> Response {
    if req.method() == http::Method::OPTIONS {
        return next.run(req).await;
    }

    let path = req.uri().path();
    if !state.auth.requires_auth(state.config.auth.enabled, path) {
        let ctx = RequestContext::new();
        req.extensions_mut().insert(ctx.clone());
        let mut response = next.run(req).await;
        response.extensions_mut().insert(ctx);
        return response;
    }

    match state.auth.authenticate(req.headers()) {
        Ok(info) => {
            let ctx = RequestContext::with_auth(Some(info.user_id), info.api_key);
            req.extensions_mut().insert(ctx.clone());
            let mut response = next.run(req).await;
            response.extensions_mut().insert(ctx);
            response
        }
        Err(err) => {
            let mut response = err.into_response();
            response.extensions_mut().insert(RequestContext::new());
            response
        }
    }
}

/// Applies the token bucket keyed on authenticated identity, falling back
/// to the connecting address. Always stamps `X-RateLimit-*` headers on the
/// way through, successful or not.
pub async fn rate_limit_middleware(State(state): State<AppState>, req: Request<Body>, next: Next) -> Response {
    let user_id = req
        .extensions()
        .get::<RequestContext>()
        .and_then(|c| c.user_id.as_deref());
    let ip = client_ip(req.headers());
    let key = extract_key(user_id, ip.as_deref());

    let decision = state.rate_limiter.allow(&key);

    if !decision.allowed {
        state.metrics.record_rate_limit_rejection();
        let err = GatewayError::RateLimit {
            message: format!("rate limit exceeded for {key}"),
            retry_after: decision.retry_after.unwrap_or_default(),
        };
        let mut response = err.into_response();
        stamp_rate_limit_headers(response.headers_mut(), &decision);
        return response;
    }

    let mut response = next.run(req).await;
    stamp_rate_limit_headers(response.headers_mut(), &decision);
    response
}

fn stamp_rate_limit_headers(headers: &mut http::HeaderMap, decision: &crate::rate_limit::RateLimitDecision) {
    headers.insert("X-RateLimit-Limit", HeaderValue::from(decision.limit));
    headers.insert("X-RateLimit-Remaining", HeaderValue::from(decision.remaining));
    headers.insert(
        "X-RateLimit-Reset",
        HeaderValue::from(decision.reset_after.as_secs()),
    );
    if let Some(retry_after) = decision.retry_after {
        if let Ok(value) = HeaderValue::from_str(&retry_after.as_secs().to_string()) {
            headers.insert("Retry-After", value);
        }
    }
}

/// Structural checks that don't require a parsed body: method, size,
/// content-type, URL content. Body-shape checks (depth, message count)
/// run inside the chat handlers once the JSON is already parsed.
pub async fn validation_middleware(State(state): State<AppState>, req: Request<Body>, next: Next) -> Response {
    let content_length = req
        .headers()
        .get(http::header::CONTENT_LENGTH)
        .and_then(|v| v.to_str().ok())
        .and_then(|v| v.parse::<usize>().ok());
    let path_and_query = req
        .uri()
        .path_and_query()
        .map(|p| p.as_str().to_string())
        .unwrap_or_else(|| req.uri().path().to_string());

    match state
        .validator
        .validate_request(req.method(), req.headers(), &path_and_query, content_length)
    {
        Ok(()) => next.run(req).await,
        Err(err) => err.into_response(),
    }
}

/// Writes the fixed security header set onto every response. Applied as
/// the outermost layer in `server.rs` so it runs on errors too.
pub async fn security_headers_middleware(req: Request<Body>, next: Next) -> Response {
    let mut response = next.run(req).await;
    let headers = response.headers_mut();
    headers.insert("X-Content-Type-Options", HeaderValue::from_static("nosniff"));
    headers.insert("X-Frame-Options", HeaderValue::from_static("DENY"));
    headers.insert("X-XSS-Protection", HeaderValue::from_static("1; mode=block"));
    headers.insert("Referrer-Policy", HeaderValue::from_static("no-referrer"));
    headers.insert(
        "Content-Security-Policy",
        HeaderValue::from_static("default-src 'self'"),
    );
    headers.insert(
        "Strict-Transport-Security",
        HeaderValue::from_static("max-age=31536000; includeSubDomains"),
    );
    headers.insert("Server", HeaderValue::from_static("router-gateway"));
    response
}

pub fn cors_layer(cors_config: &CorsConfig) -> tower_http::cors::CorsLayer {
    use tower_http::cors::{Any, CorsLayer};

    if !cors_config.enabled {
        return CorsLayer::new();
    }

    let mut cors = CorsLayer::new().allow_methods(Any).allow_headers(Any);

    if cors_config.allowed_origins.iter().any(|o| o == "*") {
        cors = cors.allow_origin(Any);
    } else {
        for origin in &cors_config.allowed_origins {
            if let Ok(value) = origin.parse::<HeaderValue>() {
                cors = cors.allow_origin(value);
            }
        }
    }

    cors.max_age(cors_config.max_age)
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::rate_limit::RateLimitDecision;
    use std::time::Duration;

    #[test]
    fn client_ip_takes_the_first_forwarded_address() {
        let mut headers = http::HeaderMap::new();
        headers.insert("x-forwarded-for", HeaderValue::from_static("1.2.3.4, 5.6.7.8"));
        assert_eq!(client_ip(&headers).as_deref(), Some("1.2.3.4"));
    }

    #[test]
    fn rate_limit_headers_are_stamped() {
        let mut headers = http::HeaderMap::new();
        let decision = RateLimitDecision {
            allowed: true,
            limit: 10,
            remaining: 4,
            retry_after: None,
            reset_after: Duration::from_secs(12),
        };
        stamp_rate_limit_headers(&mut headers, &decision);
        assert_eq!(headers.get("X-RateLimit-Remaining").unwrap(), "4");
        assert_eq!(headers.get("X-RateLimit-Reset").unwrap(), "12");
    }

    #[test]
    fn cors_disabled_layer_allows_nothing_extra() {
        let cfg = CorsConfig {
            enabled: false,
            allowed_origins: vec![],
            max_age: Duration::from_secs(1),
        };
        let _layer = cors_layer(&cfg);
    }
}
