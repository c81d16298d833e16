//! # Gateway Error Taxonomy
//!
//! The error type returned by every fallible path in the gateway, and its
//! `IntoResponse` mapping to the HTTP error envelope clients see:
//! `{"error": {"message", "type", "code"}, "timestamp"}`.

use axum::http::StatusCode;
use axum::response::{IntoResponse, Response};
use axum::Json;
use router_providers::ProviderError;
use serde_json::json;
use thiserror::Error;

#[derive(Error, Debug, Clone)]
pub enum GatewayError {
    #[error("authentication error: {message}")]
    Authentication { message: String },

    #[error("validation error: {message}")]
    Validation { message: String },

    #[error("rate limit exceeded: {message}")]
    RateLimit {
        message: String,
        retry_after: std::time::Duration,
    },

    #[error("no provider is capable of handling this request: {message}")]
    NoCapableProvider { message: String },

    #[error("provider error: {0}")]
    Provider(#[from] ProviderError),

    #[error("request cancelled")]
    Cancelled,

    #[error("internal error: {message}")]
    Internal { message: String },
}

impl From<serde_json::Error> for GatewayError {
    fn from(err: serde_json::Error) -> Self {
        GatewayError::Validation {
            message: format!("invalid JSON: {err}"),
        }
    }
}

impl GatewayError {
    /// HTTP status per the taxonomy table above. 499 ("Client Closed Request")
    /// is not a registered `StatusCode` constant; it is constructed
    /// explicitly below since axum has no built-in for it.
    pub fn status_code(&self) -> StatusCode {
        match self {
            GatewayError::Authentication { .. } => StatusCode::UNAUTHORIZED,
            GatewayError::Validation { .. } => StatusCode::BAD_REQUEST,
            GatewayError::RateLimit { .. } => StatusCode::TOO_MANY_REQUESTS,
            GatewayError::NoCapableProvider { .. } => StatusCode::SERVICE_UNAVAILABLE,
            GatewayError::Provider(err) => match err {
                ProviderError::ServiceUnavailable { .. } => StatusCode::SERVICE_UNAVAILABLE,
                ProviderError::Authentication { .. } => StatusCode::UNAUTHORIZED,
                ProviderError::InvalidRequest { .. } => StatusCode::BAD_REQUEST,
                _ => StatusCode::INTERNAL_SERVER_ERROR,
            },
            GatewayError::Cancelled => {
                StatusCode::from_u16(499).unwrap_or(StatusCode::INTERNAL_SERVER_ERROR)
            }
            GatewayError::Internal { .. } => StatusCode::INTERNAL_SERVER_ERROR,
        }
    }

    pub fn error_type(&self) -> &'static str {
        match self {
            GatewayError::Authentication { .. } => "authentication_error",
            GatewayError::Validation { .. } => "validation_error",
            GatewayError::RateLimit { .. } => "rate_limit_error",
            GatewayError::NoCapableProvider { .. } => "no_capable_provider_error",
            GatewayError::Provider(_) => "provider_error",
            GatewayError::Cancelled => "cancelled_error",
            GatewayError::Internal { .. } => "internal_error",
        }
    }

    /// The integer status-style code spec.md §7 puts in the error envelope
    /// (400/401/429/503/500), not an HTTP status in every case — `Cancelled`
    /// has no registered `StatusCode` (499) but still reports a plain int.
    pub fn code(&self) -> u16 {
        self.status_code().as_u16()
    }
}

impl IntoResponse for GatewayError {
    fn into_response(self) -> Response {
        let status = self.status_code();

        if status.is_server_error() {
            tracing::error!(error = %self, "request failed");
        } else {
            tracing::warn!(error = %self, "request rejected");
        }

        let mut response = (
            status,
            Json(json!({
                "error": {
                    "message": self.to_string(),
                    "type": self.error_type(),
                    "code": self.code(),
                },
                "timestamp": chrono::Utc::now().timestamp(),
            })),
        )
            .into_response();

        if let GatewayError::RateLimit { retry_after, .. } = &self {
            if let Ok(value) = retry_after.as_secs().to_string().parse() {
                response.headers_mut().insert("Retry-After", value);
            }
        }

        response
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn validation_error_maps_to_400() {
        let err = GatewayError::Validation {
            message: "bad".to_string(),
        };
        assert_eq!(err.status_code(), StatusCode::BAD_REQUEST);
    }

    #[test]
    fn rate_limit_maps_to_429() {
        let err = GatewayError::RateLimit {
            message: "too many".to_string(),
            retry_after: std::time::Duration::from_secs(5),
        };
        assert_eq!(err.status_code(), StatusCode::TOO_MANY_REQUESTS);
    }

    #[test]
    fn no_capable_provider_maps_to_503() {
        let err = GatewayError::NoCapableProvider {
            message: "none eligible".to_string(),
        };
        assert_eq!(err.status_code(), StatusCode::SERVICE_UNAVAILABLE);
    }

    #[test]
    fn cancelled_maps_to_499() {
        let err = GatewayError::Cancelled;
        assert_eq!(err.status_code().as_u16(), 499);
    }
}
