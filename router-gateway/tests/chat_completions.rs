//! End-to-end HTTP tests against a mocked upstream provider. Each test
//! spins up its own `wiremock::MockServer` standing in for OpenAI and
//! points a gateway `Config` at it via `base_url`, so these exercise the
//! full request path: middleware chain, router, execution engine, and the
//! OpenAI adapter's wire translation.

use std::collections::HashMap;
use std::time::Duration;

use axum::http::StatusCode;
use axum_test::TestServer;
use router_gateway::config::{
    AuthConfig, Config, ProviderEntry, ProviderKind, RateLimitConfig,
};
use serde_json::json;
use wiremock::matchers::{method, path};
use wiremock::{Mock, MockServer, ResponseTemplate};

async fn config_with_mock_openai(mock: &MockServer) -> Config {
    let mut config = Config::default();
    config.rate_limit = RateLimitConfig {
        enabled: false,
        ..config.rate_limit
    };
    config.providers.insert(
        "openai".to_string(),
        ProviderEntry {
            kind: ProviderKind::OpenAi,
            api_key: "sk-test".to_string(),
            base_url: Some(mock.uri()),
            timeout: Duration::from_secs(5),
            headers: HashMap::new(),
            chat_path: None,
            streaming: true,
            models: Vec::new(),
        },
    );
    config
}

fn openai_success_body() -> serde_json::Value {
    json!({
        "id": "chatcmpl-abc123",
        "object": "chat.completion",
        "created": 1_700_000_000,
        "model": "gpt-4o",
        "choices": [{
            "index": 0,
            "message": {"role": "assistant", "content": "Hello there!"},
            "finish_reason": "stop"
        }],
        "usage": {"prompt_tokens": 5, "completion_tokens": 3, "total_tokens": 8}
    })
}

#[tokio::test]
async fn chat_completions_routes_to_the_only_eligible_provider() {
    let mock = MockServer::start().await;
    Mock::given(method("POST"))
        .and(path("/chat/completions"))
        .respond_with(ResponseTemplate::new(200).set_body_json(openai_success_body()))
        .mount(&mock)
        .await;

    let app = router_gateway::create_server(config_with_mock_openai(&mock).await)
        .await
        .unwrap();
    let server = TestServer::new(app).unwrap();

    let response = server
        .post("/v1/chat/completions")
        .json(&json!({
            "model": "gpt-4o",
            "messages": [{"role": "user", "content": "hi"}]
        }))
        .await;

    assert_eq!(response.status_code(), StatusCode::OK);
    let body = response.json::<serde_json::Value>();
    assert_eq!(body["choices"][0]["message"]["content"], "Hello there!");
    assert_eq!(body["router_metadata"]["provider"], "openai");
    assert_eq!(body["router_metadata"]["fallback_used"], false);
}

#[tokio::test]
async fn legacy_completions_endpoint_wraps_prompt_as_a_user_message() {
    let mock = MockServer::start().await;
    Mock::given(method("POST"))
        .and(path("/chat/completions"))
        .respond_with(ResponseTemplate::new(200).set_body_json(openai_success_body()))
        .mount(&mock)
        .await;

    let app = router_gateway::create_server(config_with_mock_openai(&mock).await)
        .await
        .unwrap();
    let server = TestServer::new(app).unwrap();

    let response = server
        .post("/v1/completions")
        .json(&json!({"model": "gpt-4o", "prompt": "hi there"}))
        .await;

    assert_eq!(response.status_code(), StatusCode::OK);
}

#[tokio::test]
async fn upstream_failure_with_no_fallback_surfaces_as_a_gateway_error() {
    let mock = MockServer::start().await;
    Mock::given(method("POST"))
        .and(path("/chat/completions"))
        .respond_with(ResponseTemplate::new(500).set_body_json(json!({"error": "boom"})))
        .mount(&mock)
        .await;

    let app = router_gateway::create_server(config_with_mock_openai(&mock).await)
        .await
        .unwrap();
    let server = TestServer::new(app).unwrap();

    let response = server
        .post("/v1/chat/completions")
        .json(&json!({
            "model": "gpt-4o",
            "messages": [{"role": "user", "content": "hi"}]
        }))
        .await;

    assert!(response.status_code().is_server_error() || response.status_code().is_client_error());
    let body = response.json::<serde_json::Value>();
    assert!(body["error"].is_object());
}

#[tokio::test]
async fn routing_decision_is_a_dry_run_that_never_calls_the_provider() {
    let mock = MockServer::start().await;
    // No mock registered for /chat/completions: if the engine were called
    // this request would fail with a wiremock "no matching mock" error.
    let app = router_gateway::create_server(config_with_mock_openai(&mock).await)
        .await
        .unwrap();
    let server = TestServer::new(app).unwrap();

    let response = server
        .post("/v1/routing/decision")
        .json(&json!({
            "model": "gpt-4o",
            "messages": [{"role": "user", "content": "hi"}]
        }))
        .await;

    assert_eq!(response.status_code(), StatusCode::OK);
    let body = response.json::<serde_json::Value>();
    assert_eq!(body["router_metadata"]["provider"], "openai");
}

#[tokio::test]
async fn malformed_body_is_rejected_before_reaching_the_router() {
    let mock = MockServer::start().await;
    let app = router_gateway::create_server(config_with_mock_openai(&mock).await)
        .await
        .unwrap();
    let server = TestServer::new(app).unwrap();

    let response = server
        .post("/v1/chat/completions")
        .json(&json!({"messages": []}))
        .await;

    assert!(response.status_code().is_client_error());
}

#[tokio::test]
async fn authentication_is_enforced_when_api_keys_are_configured() {
    let mock = MockServer::start().await;
    Mock::given(method("POST"))
        .and(path("/chat/completions"))
        .respond_with(ResponseTemplate::new(200).set_body_json(openai_success_body()))
        .mount(&mock)
        .await;

    let mut config = config_with_mock_openai(&mock).await;
    config.auth = AuthConfig {
        enabled: true,
        api_keys: vec!["sk-allowed".to_string()],
        jwt_secret: None,
    };
    let app = router_gateway::create_server(config).await.unwrap();
    let server = TestServer::new(app).unwrap();

    let unauthenticated = server
        .post("/v1/chat/completions")
        .json(&json!({"model": "gpt-4o", "messages": [{"role": "user", "content": "hi"}]}))
        .await;
    assert_eq!(unauthenticated.status_code(), StatusCode::UNAUTHORIZED);

    let authenticated = server
        .post("/v1/chat/completions")
        .add_header(
            axum::http::HeaderName::from_static("x-api-key"),
            axum::http::HeaderValue::from_static("sk-allowed"),
        )
        .json(&json!({"model": "gpt-4o", "messages": [{"role": "user", "content": "hi"}]}))
        .await;
    assert_eq!(authenticated.status_code(), StatusCode::OK);
}

#[tokio::test]
async fn rate_limit_rejects_requests_once_the_burst_is_exhausted() {
    let mock = MockServer::start().await;
    Mock::given(method("POST"))
        .and(path("/chat/completions"))
        .respond_with(ResponseTemplate::new(200).set_body_json(openai_success_body()))
        .mount(&mock)
        .await;

    let mut config = config_with_mock_openai(&mock).await;
    config.rate_limit = RateLimitConfig {
        enabled: true,
        requests_per_minute: 60,
        burst_size: 1,
        cleanup_interval: Duration::from_secs(300),
    };
    let app = router_gateway::create_server(config).await.unwrap();
    let server = TestServer::new(app).unwrap();

    let body = json!({"model": "gpt-4o", "messages": [{"role": "user", "content": "hi"}]});
    let first = server.post("/v1/chat/completions").json(&body).await;
    assert_eq!(first.status_code(), StatusCode::OK);

    let second = server.post("/v1/chat/completions").json(&body).await;
    assert_eq!(second.status_code(), StatusCode::TOO_MANY_REQUESTS);
    assert!(second.headers().contains_key("x-ratelimit-limit"));
}

#[tokio::test]
async fn list_and_capabilities_endpoints_reflect_the_registered_provider() {
    let mock = MockServer::start().await;
    let app = router_gateway::create_server(config_with_mock_openai(&mock).await)
        .await
        .unwrap();
    let server = TestServer::new(app).unwrap();

    let providers = server.get("/v1/providers").await;
    assert_eq!(providers.status_code(), StatusCode::OK);
    let body = providers.json::<serde_json::Value>();
    assert_eq!(body["count"], 1);

    let detail = server.get("/v1/providers/openai").await;
    assert_eq!(detail.status_code(), StatusCode::OK);

    let missing = server.get("/v1/providers/does-not-exist").await;
    assert_eq!(missing.status_code(), StatusCode::NOT_FOUND);

    let capabilities = server.get("/v1/capabilities").await;
    assert_eq!(capabilities.status_code(), StatusCode::OK);
}
