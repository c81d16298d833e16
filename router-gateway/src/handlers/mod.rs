//! # HTTP Handlers
//!
//! One handler per documented endpoint. Chat-shaped endpoints share
//! [`run_chat`]/[`run_stream`]: the gateway's wire format is already the
//! canonical `ChatRequest`/`ChatResponse` shape the OpenAI adapter is
//! modeled on, so `/v1/chat/completions` and `/v1/messages` differ only in
//! which front-end clients call them, not in how the body is parsed.

use axum::body::Body;
use axum::extract::{Path, State};
use axum::http::StatusCode;
use axum::response::{IntoResponse, Response};
use axum::{Extension, Json};
use futures::StreamExt;
use serde::{Deserialize, Serialize};
use serde_json::{json, Value};

use router_providers::{ChatRequest, Message, RequestContext as ProviderContext, RouterMetadata};

use crate::gateway_error::GatewayError;
use crate::metrics::RequestRecordBuilder;
use crate::request_context::RequestContext as HttpRequestContext;
use crate::server::AppState;

fn provider_context(http_ctx: Option<&HttpRequestContext>) -> ProviderContext {
    let request_id = http_ctx
        .map(|c| c.request_id.clone())
        .unwrap_or_else(|| uuid::Uuid::new_v4().to_string());
    let mut ctx = ProviderContext::new(request_id);
    if let Some(user_id) = http_ctx.and_then(|c| c.user_id.clone()) {
        ctx = ctx.with_client_id(user_id);
    }
    ctx
}

fn parse_and_validate(state: &AppState, body: Value) -> Result<ChatRequest, GatewayError> {
    state.validator.validate_body(&body)?;
    serde_json::from_value(body).map_err(GatewayError::from)
}

async fn record_metrics(
    state: &AppState,
    method: &str,
    path: &str,
    status: u16,
    started: std::time::Instant,
    provider: Option<&str>,
) {
    if !state.config.metrics.enabled {
        return;
    }
    let mut builder = RequestRecordBuilder::new(method, path, status, started.elapsed());
    if let Some(provider) = provider {
        builder = builder.provider(provider);
    }
    state.metrics.record(builder.build()).await;
}

async fn run_chat(
    state: AppState,
    http_ctx: Option<HttpRequestContext>,
    path: &'static str,
    mut request: ChatRequest,
) -> Response {
    let started = std::time::Instant::now();
    state.router.maybe_trigger_health_cycle();

    if request.wants_streaming() {
        return run_stream(state, http_ctx, path, request).await;
    }
    request.stream = Some(false);

    let decision = match state.router.route(&request) {
        Ok(decision) => decision,
        Err(err) => {
            record_metrics(&state, "POST", path, err.status_code().as_u16(), started, None).await;
            return err.into_response();
        }
    };

    let ctx = provider_context(http_ctx.as_ref());
    match state.engine.execute_buffered(&decision, &request, &ctx).await {
        Ok(response) => {
            record_metrics(&state, "POST", path, 200, started, Some(&decision.selected_provider)).await;
            (StatusCode::OK, Json(response)).into_response()
        }
        Err(err) => {
            record_metrics(
                &state,
                "POST",
                path,
                err.status_code().as_u16(),
                started,
                Some(&decision.selected_provider),
            )
            .await;
            err.into_response()
        }
    }
}

async fn run_stream(
    state: AppState,
    http_ctx: Option<HttpRequestContext>,
    path: &'static str,
    mut request: ChatRequest,
) -> Response {
    let started = std::time::Instant::now();
    request.stream = Some(true);

    let decision = match state.router.route(&request) {
        Ok(decision) => decision,
        Err(err) => {
            record_metrics(&state, "POST", path, err.status_code().as_u16(), started, None).await;
            return err.into_response();
        }
    };

    let ctx = provider_context(http_ctx.as_ref());
    let stream = match state.engine.execute_streaming(&decision, &request, &ctx).await {
        Ok(stream) => stream,
        Err(err) => {
            record_metrics(
                &state,
                "POST",
                path,
                err.status_code().as_u16(),
                started,
                Some(&decision.selected_provider),
            )
            .await;
            return err.into_response();
        }
    };

    record_metrics(&state, "POST", path, 200, started, Some(&decision.selected_provider)).await;

    let body_stream = stream.map(|item| match item {
        Ok(chunk) => {
            let payload = serde_json::to_string(&chunk).unwrap_or_else(|_| "{}".to_string());
            Ok::<_, std::io::Error>(format!("data: {payload}\n\n"))
        }
        Err(err) => {
            let payload = json!({"error": {"message": err.to_string()}}).to_string();
            Ok(format!("data: {payload}\n\n"))
        }
    });
    let terminated = body_stream.chain(futures::stream::once(async { Ok("data: [DONE]\n\n".to_string()) }));

    Response::builder()
        .status(StatusCode::OK)
        .header("content-type", "text/event-stream")
        .header("cache-control", "no-cache")
        .header("connection", "keep-alive")
        .body(Body::from_stream(terminated))
        .unwrap_or_else(|_| {
            GatewayError::Internal {
                message: "failed to build streaming response".to_string(),
            }
            .into_response()
        })
}

pub async fn chat_completions(
    State(state): State<AppState>,
    ctx: Option<Extension<HttpRequestContext>>,
    Json(body): Json<Value>,
) -> Response {
    let request = match parse_and_validate(&state, body) {
        Ok(r) => r,
        Err(err) => return err.into_response(),
    };
    run_chat(state, ctx.map(|Extension(c)| c), "/v1/chat/completions", request).await
}

pub async fn messages(
    State(state): State<AppState>,
    ctx: Option<Extension<HttpRequestContext>>,
    Json(body): Json<Value>,
) -> Response {
    let request = match parse_and_validate(&state, body) {
        Ok(r) => r,
        Err(err) => return err.into_response(),
    };
    run_chat(state, ctx.map(|Extension(c)| c), "/v1/messages", request).await
}

#[derive(Debug, Deserialize)]
struct LegacyCompletionRequest {
    model: String,
    prompt: String,
    #[serde(default)]
    max_tokens: Option<u32>,
    #[serde(default)]
    temperature: Option<f32>,
    #[serde(default)]
    stream: Option<bool>,
}

/// Legacy bodies carry `prompt`, not `messages`, so the usual
/// `validate_body` messages/model checks don't apply; only the
/// method/size/content-type checks from the validation middleware run.
pub async fn completions(
    State(state): State<AppState>,
    ctx: Option<Extension<HttpRequestContext>>,
    Json(body): Json<Value>,
) -> Response {
    let legacy: LegacyCompletionRequest = match serde_json::from_value(body) {
        Ok(v) => v,
        Err(err) => {
            return GatewayError::Validation {
                message: format!("invalid legacy completion request: {err}"),
            }
            .into_response()
        }
    };

    let request = ChatRequest {
        model: legacy.model,
        messages: vec![Message::user(legacy.prompt)],
        max_tokens: legacy.max_tokens,
        temperature: legacy.temperature,
        stream: legacy.stream,
        ..Default::default()
    };
    run_chat(state, ctx.map(|Extension(c)| c), "/v1/completions", request).await
}

#[derive(Debug, Serialize)]
struct DecisionView {
    router_metadata: RouterMetadata,
}

pub async fn routing_decision(State(state): State<AppState>, Json(body): Json<Value>) -> Response {
    let request = match parse_and_validate(&state, body) {
        Ok(r) => r,
        Err(err) => return err.into_response(),
    };

    match state.router.route(&request) {
        Ok(decision) => {
            let metadata = RouterMetadata {
                provider: decision.selected_provider,
                model: request.model,
                reasoning: decision.reasoning,
                estimated_cost: decision.estimated_cost,
                ..Default::default()
            };
            (StatusCode::OK, Json(DecisionView { router_metadata: metadata })).into_response()
        }
        Err(err) => err.into_response(),
    }
}

pub async fn list_providers(State(state): State<AppState>) -> Response {
    let mut names: Vec<&String> = state.providers.keys().collect();
    names.sort();
    (
        StatusCode::OK,
        Json(json!({
            "providers": names,
            "count": names.len(),
        })),
    )
        .into_response()
}

pub async fn provider_detail(State(state): State<AppState>, Path(name): Path<String>) -> Response {
    match state.providers.get(&name) {
        Some(provider) => (StatusCode::OK, Json(provider.capabilities())).into_response(),
        None => (
            StatusCode::NOT_FOUND,
            Json(json!({
                "error": {"message": format!("provider '{name}' is not registered"), "type": "not_found"},
            })),
        )
            .into_response(),
    }
}

pub async fn capabilities(State(state): State<AppState>) -> Response {
    let matrix: std::collections::HashMap<&String, &router_providers::ProviderCapabilities> = state
        .providers
        .iter()
        .map(|(name, provider)| (name, provider.capabilities()))
        .collect();
    (StatusCode::OK, Json(matrix)).into_response()
}

pub async fn health_check(State(state): State<AppState>) -> Response {
    let snapshot = state.health.snapshot();
    let all_healthy = state.providers.keys().all(|name| {
        matches!(
            state.health.state_of(name),
            router_providers::HealthState::Healthy | router_providers::HealthState::Unknown
        )
    });

    let body = json!({
        "status": if all_healthy { "healthy" } else { "degraded" },
        "providers": snapshot
            .into_iter()
            .map(|(name, health_state)| json!({"name": name, "state": format!("{health_state:?}")}))
            .collect::<Vec<_>>(),
    });

    let status = if all_healthy { StatusCode::OK } else { StatusCode::SERVICE_UNAVAILABLE };
    (status, Json(body)).into_response()
}

pub async fn provider_health(State(state): State<AppState>, Path(name): Path<String>) -> Response {
    if !state.providers.contains_key(&name) {
        return (
            StatusCode::NOT_FOUND,
            Json(json!({
                "error": {"message": format!("provider '{name}' is not registered"), "type": "not_found"},
            })),
        )
            .into_response();
    }

    let health_state = state.health.state_of(&name);
    (
        StatusCode::OK,
        Json(json!({"name": name, "state": format!("{health_state:?}")})),
    )
        .into_response()
}

pub async fn metrics_text(State(state): State<AppState>) -> Response {
    let body = state.metrics.prometheus_text().await;
    (StatusCode::OK, [("content-type", "text/plain; version=0.0.4")], body).into_response()
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn legacy_completion_request_maps_to_a_single_user_message() {
        let legacy = LegacyCompletionRequest {
            model: "gpt-4".to_string(),
            prompt: "hello".to_string(),
            max_tokens: Some(10),
            temperature: None,
            stream: None,
        };
        let request = ChatRequest {
            model: legacy.model,
            messages: vec![Message::user(legacy.prompt)],
            max_tokens: legacy.max_tokens,
            temperature: legacy.temperature,
            stream: legacy.stream,
            ..Default::default()
        };
        assert_eq!(request.messages.len(), 1);
        assert_eq!(request.messages[0].content.as_text(), "hello");
    }
}
