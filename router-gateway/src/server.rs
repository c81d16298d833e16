//! # HTTP Server Assembly
//!
//! Builds the provider registry from configuration, wires the router,
//! execution engine, health monitor, rate limiter, auth provider,
//! validator, audit logger, and metrics collector into one [`AppState`],
//! and lays out the route table with the fixed middleware chain from
//! [`crate::middleware`].

use axum::{
    routing::{get, post},
    Router,
};
use std::collections::HashMap;
use std::sync::Arc;
use tower_http::timeout::TimeoutLayer;

use router_providers::providers::{
    AnthropicConfig, AnthropicProvider, CustomProvider, CustomProviderConfig, OpenAiConfig, OpenAiProvider,
};
use router_providers::Provider;

use crate::audit::AuditLogger;
use crate::auth::AuthProvider;
use crate::config::{Config, ProviderEntry, ProviderKind};
use crate::engine::ExecutionEngine;
use crate::handlers;
use crate::health::HealthMonitor;
use crate::metrics::MetricsCollector;
use crate::middleware;
use crate::rate_limit::{start_reclaimer, RateLimiter};
use crate::router::Router as GatewayRouter;
use crate::validation::RequestValidator;

#[derive(Clone)]
pub struct AppState {
    pub config: Arc<Config>,
    pub providers: Arc<HashMap<String, Arc<dyn Provider>>>,
    pub health: Arc<HealthMonitor>,
    pub router: Arc<GatewayRouter>,
    pub engine: Arc<ExecutionEngine>,
    pub rate_limiter: Arc<RateLimiter>,
    pub auth: Arc<AuthProvider>,
    pub validator: Arc<RequestValidator>,
    pub audit: Arc<AuditLogger>,
    pub metrics: Arc<MetricsCollector>,
}

fn build_provider(name: &str, entry: &ProviderEntry) -> anyhow::Result<Arc<dyn Provider>> {
    let provider: Arc<dyn Provider> = match entry.kind {
        ProviderKind::OpenAi => Arc::new(OpenAiProvider::new(OpenAiConfig {
            api_key: entry.api_key.clone(),
            base_url: entry.base_url.clone(),
            timeout: entry.timeout,
            headers: entry.headers.clone(),
        })?),
        ProviderKind::Anthropic => Arc::new(AnthropicProvider::new(AnthropicConfig {
            api_key: entry.api_key.clone(),
            base_url: entry.base_url.clone(),
            timeout: entry.timeout,
            headers: entry.headers.clone(),
        })?),
        ProviderKind::Custom => Arc::new(CustomProvider::new(CustomProviderConfig {
            name: name.to_string(),
            base_url: entry
                .base_url
                .clone()
                .ok_or_else(|| anyhow::anyhow!("custom provider {name} requires base_url"))?,
            api_key: entry.api_key.clone(),
            chat_path: entry.chat_path.clone().unwrap_or_else(|| "/chat/completions".to_string()),
            timeout: entry.timeout,
            headers: entry.headers.clone(),
            models: entry.models.clone(),
            streaming: entry.streaming,
        })?),
    };
    Ok(provider)
}

pub async fn create_server(config: Config) -> anyhow::Result<Router> {
    config.validate()?;

    let mut providers = HashMap::new();
    for (name, entry) in &config.providers {
        providers.insert(name.clone(), build_provider(name, entry)?);
    }

    let health = Arc::new(HealthMonitor::new(config.routing.health_check_interval));
    let router = Arc::new(GatewayRouter::new(
        providers.clone(),
        health.clone(),
        config.routing.strategy.clone(),
    ));
    let engine = Arc::new(ExecutionEngine::new(providers.clone()));

    let rate_limiter = Arc::new(RateLimiter::new(&config.rate_limit));
    if config.rate_limit.enabled {
        tokio::spawn(start_reclaimer(rate_limiter.clone()));
    }

    let auth = Arc::new(AuthProvider::new(&config.auth));
    let validator = Arc::new(RequestValidator::new(config.validation.clone()));

    let (audit_logger, _audit_handle) = AuditLogger::start(
        config.audit.buffer_size,
        config.audit.batch_size,
        config.audit.flush_interval,
        config.audit.sensitive_fields.clone(),
    );
    let audit = Arc::new(audit_logger);

    let metrics = Arc::new(MetricsCollector::new(
        config.metrics.max_requests,
        config.metrics.retention_duration,
    ));

    if config.server.cors.enabled && config.server.cors.allowed_origins.iter().any(|o| o == "*") {
        tracing::warn!("CORS is enabled with wildcard origins; unsafe for production");
    }

    let state = AppState {
        config: Arc::new(config.clone()),
        providers: Arc::new(providers),
        health,
        router,
        engine,
        rate_limiter,
        auth,
        validator,
        audit,
        metrics,
    };

    let app = Router::new()
        .route("/v1/chat/completions", post(handlers::chat_completions))
        .route("/v1/messages", post(handlers::messages))
        .route("/v1/completions", post(handlers::completions))
        .route("/v1/routing/decision", post(handlers::routing_decision))
        .route("/v1/providers", get(handlers::list_providers))
        .route("/v1/providers/{name}", get(handlers::provider_detail))
        .route("/v1/capabilities", get(handlers::capabilities))
        .route("/health", get(handlers::health_check))
        .route("/health/{name}", get(handlers::provider_health))
        .route("/metrics", get(handlers::metrics_text))
        .layer(
            tower::ServiceBuilder::new()
                .layer(axum::middleware::from_fn(middleware::security_headers_middleware))
                .layer(axum::middleware::from_fn_with_state(
                    state.clone(),
                    middleware::audit_middleware,
                ))
                .layer(axum::middleware::from_fn_with_state(
                    state.clone(),
                    middleware::auth_middleware,
                ))
                .layer(axum::middleware::from_fn_with_state(
                    state.clone(),
                    middleware::rate_limit_middleware,
                ))
                .layer(axum::middleware::from_fn_with_state(
                    state.clone(),
                    middleware::validation_middleware,
                ))
                .layer(middleware::cors_layer(&state.config.server.cors))
                .layer(TimeoutLayer::new(state.config.server.timeout)),
        )
        .with_state(state);

    Ok(app)
}
