//! # Auth Provider
//!
//! Two stateless credential kinds, tried in order: an API key read from
//! `X-API-Key`, `API-Key`, or a literal `Authorization: Bearer` value,
//! compared in constant time against the configured set; failing that, an
//! `Authorization: Bearer` value is tried as an HS256 JWT. No sessions, no
//! server-side state beyond the configured keys and secret.

use axum::http::HeaderMap;
use jsonwebtoken::{decode, Algorithm, DecodingKey, Validation};
use serde::Deserialize;
use std::collections::HashMap;
use subtle::ConstantTimeEq;

use crate::config::AuthConfig;
use crate::gateway_error::GatewayError;

#[derive(Debug, Clone)]
pub struct AuthInfo {
    pub user_id: String,
    pub api_key: Option<String>,
    pub permissions: Vec<String>,
    pub metadata: HashMap<String, String>,
}

#[derive(Debug, Deserialize)]
struct Claims {
    sub: String,
    #[serde(default)]
    permissions: Vec<String>,
    #[serde(default)]
    metadata: HashMap<String, String>,
    #[allow(dead_code)]
    exp: usize,
}

pub struct AuthProvider {
    api_keys: Vec<String>,
    jwt_secret: Option<String>,
}

impl AuthProvider {
    pub fn new(config: &AuthConfig) -> Self {
        Self {
            api_keys: config.api_keys.clone(),
            jwt_secret: config.jwt_secret.clone(),
        }
    }

    /// Passed through without credentials when auth is disabled or the path
    /// is a health endpoint.
    pub fn requires_auth(&self, enabled: bool, path: &str) -> bool {
        enabled && !path.starts_with("/health")
    }

    pub fn authenticate(&self, headers: &HeaderMap) -> Result<AuthInfo, GatewayError> {
        if let Some(candidate) = api_key_candidate(headers) {
            if let Ok(info) = self.verify_api_key(&candidate) {
                return Ok(info);
            }
        }

        if let Some(token) = bearer_token(headers) {
            return self.verify_jwt(&token);
        }

        Err(GatewayError::Authentication {
            message: "missing or invalid credentials".to_string(),
        })
    }

    fn verify_api_key(&self, key: &str) -> Result<AuthInfo, GatewayError> {
        let matches_any = self
            .api_keys
            .iter()
            .any(|configured| constant_time_eq(configured.as_bytes(), key.as_bytes()));

        if !matches_any {
            return Err(GatewayError::Authentication {
                message: "invalid API key".to_string(),
            });
        }

        let mut metadata = HashMap::new();
        metadata.insert("auth_type".to_string(), "api_key".to_string());

        Ok(AuthInfo {
            user_id: format!("user_{}", &key[..key.len().min(8)]),
            api_key: Some(key.to_string()),
            permissions: vec!["api:access".to_string()],
            metadata,
        })
    }

    fn verify_jwt(&self, token: &str) -> Result<AuthInfo, GatewayError> {
        let secret = self.jwt_secret.as_ref().ok_or_else(|| GatewayError::Authentication {
            message: "JWT authentication is not configured".to_string(),
        })?;

        let mut validation = Validation::new(Algorithm::HS256);
        validation.validate_exp = true;
        validation.validate_nbf = true;

        let data = decode::<Claims>(
            token,
            &DecodingKey::from_secret(secret.as_bytes()),
            &validation,
        )
        .map_err(|e| GatewayError::Authentication {
            message: format!("invalid token: {e}"),
        })?;

        let mut metadata = data.claims.metadata;
        metadata
            .entry("auth_type".to_string())
            .or_insert_with(|| "jwt".to_string());

        Ok(AuthInfo {
            user_id: data.claims.sub,
            api_key: None,
            permissions: data.claims.permissions,
            metadata,
        })
    }
}

/// Constant-time byte comparison; mismatched lengths short-circuit to
/// `false` (length alone is not the secret being protected).
fn constant_time_eq(a: &[u8], b: &[u8]) -> bool {
    a.len() == b.len() && bool::from(a.ct_eq(b))
}

fn header_str<'a>(headers: &'a HeaderMap, name: &str) -> Option<&'a str> {
    headers.get(name).and_then(|v| v.to_str().ok())
}

fn api_key_candidate(headers: &HeaderMap) -> Option<String> {
    header_str(headers, "x-api-key")
        .or_else(|| header_str(headers, "api-key"))
        .map(str::to_string)
        .or_else(|| bearer_token(headers))
}

fn bearer_token(headers: &HeaderMap) -> Option<String> {
    header_str(headers, "authorization")
        .and_then(|v| v.strip_prefix("Bearer "))
        .map(str::to_string)
}
