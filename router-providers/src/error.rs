//! # Provider Error Types
//!
//! Errors surfaced by individual provider adapters. The execution engine
//! classifies these as retryable or
//! terminal by inspecting the error's message text against a substring
//! list — the provider itself never decides whether it should be retried.

use thiserror::Error;

/// Errors raised by a [`crate::provider::Provider`] implementation.
///
/// The message text of each variant is what the execution engine's retry
/// classifier matches substrings against (`timeout`, `connection`,
/// `unavailable`, `rate limit`, or a caller-supplied list), so adapters
/// should keep upstream error text inside the message rather than
/// discarding it.
#[derive(Error, Debug, Clone)]
pub enum ProviderError {
    /// The upstream call did not complete within the configured timeout.
    #[error("upstream timeout: {message}")]
    Timeout { message: String },

    /// A transport-level failure (DNS, TCP reset, TLS handshake, ...).
    #[error("connection error: {message}")]
    Connection { message: String },

    /// The provider's own rate limiter rejected the request.
    #[error("rate limit exceeded: {message}")]
    RateLimited { message: String },

    /// Credentials were missing, malformed, or rejected by the provider.
    #[error("authentication failed: {message}")]
    Authentication { message: String },

    /// The request itself was malformed from the provider's point of view.
    #[error("invalid request: {message}")]
    InvalidRequest { message: String },

    /// The provider reported it is temporarily unavailable.
    #[error("service unavailable: {message}")]
    ServiceUnavailable { message: String },

    /// The adapter is misconfigured (missing API key, unsupported model, ...).
    #[error("configuration error: {message}")]
    Configuration { message: String },

    /// An operation that is not implemented for this adapter was requested.
    #[error("unsupported: {message}")]
    Unsupported { message: String },

    /// The request's context was cancelled before the call completed.
    #[error("request cancelled")]
    Cancelled,

    /// Any other upstream failure; the message is preserved verbatim so the
    /// default retryable-substring classification can still apply.
    #[error("provider error: {message}")]
    Upstream { message: String },
}

impl ProviderError {
    /// Default retryable markers for `RetryConfig`.
    pub const DEFAULT_RETRYABLE_MARKERS: &'static [&'static str] =
        &["timeout", "connection", "unavailable", "rate limit"];

    /// The text used for retryable-substring classification by the
    /// execution engine. Always lower-cased.
    pub fn classify_message(&self) -> String {
        self.to_string().to_lowercase()
    }

    /// Whether this error matches any of the given substrings (or the
    /// default marker set when `markers` is empty).
    pub fn is_retryable(&self, markers: &[String]) -> bool {
        let haystack = self.classify_message();
        if markers.is_empty() {
            Self::DEFAULT_RETRYABLE_MARKERS
                .iter()
                .any(|m| haystack.contains(m))
        } else {
            markers.iter().any(|m| haystack.contains(&m.to_lowercase()))
        }
    }
}

impl From<reqwest::Error> for ProviderError {
    fn from(err: reqwest::Error) -> Self {
        if err.is_timeout() {
            ProviderError::Timeout {
                message: err.to_string(),
            }
        } else if err.is_connect() {
            ProviderError::Connection {
                message: err.to_string(),
            }
        } else {
            ProviderError::Upstream {
                message: err.to_string(),
            }
        }
    }
}

impl From<serde_json::Error> for ProviderError {
    fn from(err: serde_json::Error) -> Self {
        ProviderError::InvalidRequest {
            message: format!("json error: {err}"),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn default_markers_match_known_transient_errors() {
        let err = ProviderError::Timeout {
            message: "upstream took too long".to_string(),
        };
        assert!(err.is_retryable(&[]));

        let err = ProviderError::Authentication {
            message: "invalid api key".to_string(),
        };
        assert!(!err.is_retryable(&[]));
    }

    #[test]
    fn custom_markers_override_defaults() {
        let err = ProviderError::Upstream {
            message: "upstream replied with overloaded".to_string(),
        };
        assert!(!err.is_retryable(&[])); // not in the default set
        assert!(err.is_retryable(&["overloaded".to_string()]));
    }
}
