//! # Router Gateway
//!
//! A multi-provider LLM chat-completion gateway: one HTTP surface in front
//! of several upstream providers, with routing, retry/fallback, auth, rate
//! limiting, request validation, audit logging, and metrics.
//!
//! ## Modules
//!
//! - **`config`**: configuration loading and validation
//! - **`server`**: route table and middleware assembly
//! - **`handlers`**: per-endpoint request handling
//! - **`middleware`**: the fixed audit/auth/rate-limit/validation chain
//! - **`router`**: provider selection strategies
//! - **`engine`**: retry and fallback execution
//! - **`health`**: provider health tracking
//! - **`rate_limit`**: token-bucket limiting
//! - **`auth`**: API key and JWT authentication
//! - **`validation`**: structural request validation
//! - **`audit`**: buffered audit event logging
//! - **`metrics`**: request metrics and Prometheus export
//!
//! ## Quick start
//!
//! ```rust,no_run
//! use router_gateway::{config::Config, create_server};
//!
//! #[tokio::main]
//! async fn main() -> anyhow::Result<()> {
//!     let config = Config::load("config.toml")?;
//!     let app = create_server(config).await?;
//!     let listener = tokio::net::TcpListener::bind("0.0.0.0:8080").await?;
//!     axum::serve(listener, app).await?;
//!     Ok(())
//! }
//! ```

pub mod audit;
pub mod auth;
pub mod config;
pub mod engine;
pub mod gateway_error;
pub mod handlers;
pub mod health;
pub mod metrics;
pub mod middleware;
pub mod rate_limit;
pub mod request_context;
pub mod router;
pub mod server;
pub mod validation;

pub use server::create_server;

#[cfg(test)]
mod tests {
    use super::*;
    use crate::config::{Config, ProviderEntry, ProviderKind};
    use axum::http::StatusCode;
    use axum_test::TestServer;
    use std::time::Duration;

    fn config_with_openai() -> Config {
        let mut config = Config::default();
        config.providers.insert(
            "openai".to_string(),
            ProviderEntry {
                kind: ProviderKind::OpenAi,
                api_key: "test-key".to_string(),
                base_url: Some("https://api.openai.com/v1".to_string()),
                timeout: Duration::from_secs(30),
                headers: Default::default(),
                chat_path: None,
                streaming: true,
                models: Vec::new(),
            },
        );
        config
    }

    #[tokio::test]
    async fn health_endpoint_reports_healthy_with_no_failures() {
        let app = create_server(config_with_openai()).await.unwrap();
        let server = TestServer::new(app).unwrap();
        let response = server.get("/health").await;
        assert_eq!(response.status_code(), StatusCode::OK);
        let body = response.json::<serde_json::Value>();
        assert_eq!(body["status"], "healthy");
    }

    #[tokio::test]
    async fn metrics_endpoint_serves_prometheus_text() {
        let app = create_server(config_with_openai()).await.unwrap();
        let server = TestServer::new(app).unwrap();
        let response = server.get("/metrics").await;
        assert_eq!(response.status_code(), StatusCode::OK);
        let body = response.text();
        assert!(body.contains("gateway_requests_total"));
    }

    #[tokio::test]
    async fn list_providers_reflects_configuration() {
        let app = create_server(config_with_openai()).await.unwrap();
        let server = TestServer::new(app).unwrap();
        let response = server.get("/v1/providers").await;
        assert_eq!(response.status_code(), StatusCode::OK);
        let body = response.json::<serde_json::Value>();
        assert_eq!(body["count"], 1);
    }

    #[test]
    fn invalid_server_port_fails_validation() {
        let mut config = config_with_openai();
        config.server.port = 0;
        assert!(config.validate().is_err());
    }
}
