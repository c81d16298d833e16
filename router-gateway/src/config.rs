//! # Gateway Configuration
//!
//! Loads and validates the gateway's configuration tree. Sources are
//! layered the way the `config` crate is meant to be used: a TOML file
//! first, then environment variables prefixed `GATEWAY__` with `__` as the
//! nesting separator (`GATEWAY__SERVER__PORT=9000` overrides
//! `server.port`), so a deployment never has to rewrite the file to change
//! one value.
//!
//! ## Usage
//!
//! ```rust,no_run
//! use router_gateway::config::Config;
//!
//! let config = Config::load("config.toml").unwrap();
//! config.validate().unwrap();
//! ```

use crate::gateway_error::GatewayError;
use router_providers::common::duration_serde;
use serde::{Deserialize, Serialize};
use std::collections::HashMap;
use std::time::Duration;

#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct ServerConfig {
    pub host: String,
    pub port: u16,
    #[serde(with = "duration_serde")]
    pub timeout: Duration,
    pub max_body_size: usize,
    pub cors: CorsConfig,
}

impl Default for ServerConfig {
    fn default() -> Self {
        Self {
            host: "0.0.0.0".to_string(),
            port: 8080,
            timeout: Duration::from_secs(30),
            max_body_size: 10 * 1024 * 1024,
            cors: CorsConfig::default(),
        }
    }
}

#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct CorsConfig {
    pub enabled: bool,
    pub allowed_origins: Vec<String>,
    #[serde(with = "duration_serde")]
    pub max_age: Duration,
}

impl Default for CorsConfig {
    fn default() -> Self {
        Self {
            enabled: false,
            allowed_origins: vec!["*".to_string()],
            max_age: Duration::from_secs(3600),
        }
    }
}

#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct RoutingConfig {
    pub strategy: router_providers::RoutingStrategy,
    #[serde(with = "duration_serde")]
    pub health_check_interval: Duration,
}

impl Default for RoutingConfig {
    fn default() -> Self {
        Self {
            strategy: router_providers::RoutingStrategy::default(),
            health_check_interval: Duration::from_secs(30),
        }
    }
}

#[derive(Debug, Clone, Copy, Serialize, Deserialize, PartialEq, Eq)]
#[serde(rename_all = "snake_case")]
pub enum ProviderKind {
    OpenAi,
    Anthropic,
    Custom,
}

/// One entry in the provider registry. Shape is
/// the gateway's own — distinct from an adapter's construction config,
/// which lives in `router_providers::providers::*`.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ProviderEntry {
    pub kind: ProviderKind,
    pub api_key: String,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub base_url: Option<String>,
    #[serde(with = "duration_serde")]
    pub timeout: Duration,
    #[serde(default)]
    pub headers: HashMap<String, String>,
    #[serde(default)]
    pub chat_path: Option<String>,
    #[serde(default)]
    pub streaming: bool,
    #[serde(default)]
    pub models: Vec<router_providers::ModelInfo>,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct AuthConfig {
    pub enabled: bool,
    pub api_keys: Vec<String>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub jwt_secret: Option<String>,
}

impl Default for AuthConfig {
    fn default() -> Self {
        Self {
            enabled: false,
            api_keys: Vec::new(),
            jwt_secret: None,
        }
    }
}

#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct RateLimitConfig {
    pub enabled: bool,
    pub requests_per_minute: u64,
    pub burst_size: u64,
    #[serde(with = "duration_serde")]
    pub cleanup_interval: Duration,
}

impl Default for RateLimitConfig {
    fn default() -> Self {
        Self {
            enabled: true,
            requests_per_minute: 60,
            burst_size: 10,
            cleanup_interval: Duration::from_secs(300),
        }
    }
}

#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct ValidationConfig {
    pub max_request_size: usize,
    pub max_message_length: usize,
    pub max_messages_count: usize,
    pub max_model_name_length: usize,
    pub max_json_depth: usize,
    pub block_dangerous_patterns: bool,
}

impl Default for ValidationConfig {
    fn default() -> Self {
        Self {
            max_request_size: 10 * 1024 * 1024,
            max_message_length: 100_000,
            max_messages_count: 100,
            max_model_name_length: 200,
            max_json_depth: 10,
            block_dangerous_patterns: true,
        }
    }
}

#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct AuditConfig {
    pub enabled: bool,
    pub buffer_size: usize,
    pub batch_size: usize,
    #[serde(with = "duration_serde")]
    pub flush_interval: Duration,
    /// Extra details-map keys to redact, merged with the audit logger's
    /// hardcoded marker set (password/token/secret/key/auth/...).
    pub sensitive_fields: Vec<String>,
}

impl Default for AuditConfig {
    fn default() -> Self {
        Self {
            enabled: true,
            buffer_size: 1000,
            batch_size: 100,
            flush_interval: Duration::from_secs(10),
            sensitive_fields: Vec::new(),
        }
    }
}

#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct MetricsConfig {
    pub enabled: bool,
    pub max_requests: usize,
    #[serde(with = "duration_serde")]
    pub retention_duration: Duration,
    #[serde(with = "duration_serde")]
    pub cleanup_interval: Duration,
}

impl Default for MetricsConfig {
    fn default() -> Self {
        Self {
            enabled: true,
            max_requests: 10_000,
            retention_duration: Duration::from_secs(3600),
            cleanup_interval: Duration::from_secs(300),
        }
    }
}

#[derive(Debug, Clone, Copy, Serialize, Deserialize, PartialEq, Eq)]
#[serde(rename_all = "snake_case")]
pub enum LogFormat {
    Json,
    Pretty,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct LoggingConfig {
    pub level: String,
    pub format: LogFormat,
}

impl Default for LoggingConfig {
    fn default() -> Self {
        Self {
            level: "info".to_string(),
            format: LogFormat::Pretty,
        }
    }
}

#[derive(Debug, Clone, Serialize, Deserialize, Default)]
#[serde(default)]
pub struct Config {
    pub server: ServerConfig,
    pub routing: RoutingConfig,
    pub providers: HashMap<String, ProviderEntry>,
    pub auth: AuthConfig,
    pub rate_limit: RateLimitConfig,
    pub validation: ValidationConfig,
    pub audit: AuditConfig,
    pub metrics: MetricsConfig,
    pub logging: LoggingConfig,
}

impl Config {
    /// Load from `path` (if it exists) layered under `GATEWAY__`-prefixed
    /// environment variables, then validate.
    pub fn load(path: &str) -> anyhow::Result<Self> {
        let builder = config::Config::builder()
            .add_source(config::File::with_name(path).required(false))
            .add_source(
                config::Environment::with_prefix("GATEWAY")
                    .separator("__")
                    .try_parsing(true),
            );

        let raw = builder.build()?;
        let config: Config = raw.try_deserialize()?;
        config.validate()?;
        Ok(config)
    }

    pub fn validate(&self) -> Result<(), GatewayError> {
        self.validate_server()?;
        self.validate_auth()?;
        self.validate_rate_limit()?;
        self.validate_audit()?;
        self.validate_metrics()?;
        Ok(())
    }

    fn validate_server(&self) -> Result<(), GatewayError> {
        if self.server.port == 0 {
            return Err(GatewayError::Internal {
                message: "server.port must be non-zero".to_string(),
            });
        }
        if self.server.cors.enabled
            && self.server.cors.allowed_origins.iter().any(|o| o == "*")
        {
            tracing::warn!(
                "CORS is enabled with wildcard origins; safe for development only"
            );
        }
        Ok(())
    }

    fn validate_auth(&self) -> Result<(), GatewayError> {
        if !self.auth.enabled {
            return Ok(());
        }
        if self.auth.api_keys.is_empty() && self.auth.jwt_secret.is_none() {
            return Err(GatewayError::Internal {
                message: "auth.enabled is true but no api_keys or jwt_secret configured"
                    .to_string(),
            });
        }
        if let Some(secret) = &self.auth.jwt_secret {
            if secret == "change-me" || secret.len() < 16 {
                return Err(GatewayError::Internal {
                    message: "auth.jwt_secret is missing or too weak".to_string(),
                });
            }
        }
        Ok(())
    }

    fn validate_rate_limit(&self) -> Result<(), GatewayError> {
        if self.rate_limit.enabled && self.rate_limit.burst_size == 0 {
            return Err(GatewayError::Internal {
                message: "rate_limit.burst_size must be non-zero when enabled".to_string(),
            });
        }
        if self.rate_limit.enabled && self.rate_limit.requests_per_minute == 0 {
            return Err(GatewayError::Internal {
                message: "rate_limit.requests_per_minute must be non-zero when enabled".to_string(),
            });
        }
        Ok(())
    }

    fn validate_audit(&self) -> Result<(), GatewayError> {
        if self.audit.enabled && self.audit.buffer_size == 0 {
            return Err(GatewayError::Internal {
                message: "audit.buffer_size must be non-zero when enabled".to_string(),
            });
        }
        Ok(())
    }

    fn validate_metrics(&self) -> Result<(), GatewayError> {
        if self.metrics.enabled && self.metrics.max_requests == 0 {
            return Err(GatewayError::Internal {
                message: "metrics.max_requests must be non-zero when enabled".to_string(),
            });
        }
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn default_config_validates() {
        let config = Config::default();
        assert!(config.validate().is_ok());
    }

    #[test]
    fn auth_enabled_without_credentials_fails_validation() {
        let mut config = Config::default();
        config.auth.enabled = true;
        assert!(config.validate().is_err());
    }

    #[test]
    fn weak_jwt_secret_fails_validation() {
        let mut config = Config::default();
        config.auth.enabled = true;
        config.auth.jwt_secret = Some("short".to_string());
        assert!(config.validate().is_err());
    }

    #[test]
    fn zero_requests_per_minute_fails_validation_when_rate_limiting_enabled() {
        let mut config = Config::default();
        config.rate_limit.enabled = true;
        config.rate_limit.requests_per_minute = 0;
        assert!(config.validate().is_err());
    }

    #[test]
    fn duration_fields_parse_from_suffixed_strings() {
        let toml = r#"
            [server]
            timeout = "45s"
        "#;
        let raw = config::Config::builder()
            .add_source(config::File::from_str(toml, config::FileFormat::Toml))
            .build()
            .unwrap();
        let config: Config = raw.try_deserialize().unwrap();
        assert_eq!(config.server.timeout, Duration::from_secs(45));
    }
}
