//! # HTTP Request Context
//!
//! Per-HTTP-request tracking injected into axum's request extensions by the
//! auth middleware: identity and timing, for logging and audit correlation.
//! Distinct from [`router_providers::RequestContext`], which carries the
//! cancellation flag passed into a single provider call — a router-level
//! [`crate::router::Decision`] is constructed from one of these at the top
//! of the request and a fresh `router_providers::RequestContext` is handed
//! to the execution engine per attempt.

use std::collections::HashMap;
use std::time::Instant;

#[derive(Debug, Clone)]
pub struct RequestContext {
    pub request_id: String,
    pub user_id: Option<String>,
    pub api_key: Option<String>,
    pub start_time: Instant,
    pub metadata: HashMap<String, String>,
}

impl RequestContext {
    pub fn new() -> Self {
        Self {
            request_id: uuid::Uuid::new_v4().to_string(),
            user_id: None,
            api_key: None,
            start_time: Instant::now(),
            metadata: HashMap::new(),
        }
    }

    pub fn with_auth(user_id: Option<String>, api_key: Option<String>) -> Self {
        Self {
            user_id,
            api_key,
            ..Self::new()
        }
    }

    pub fn duration(&self) -> std::time::Duration {
        self.start_time.elapsed()
    }

    pub fn with_metadata(mut self, key: impl Into<String>, value: impl Into<String>) -> Self {
        self.metadata.insert(key.into(), value.into());
        self
    }

    pub fn get_metadata(&self, key: &str) -> Option<&String> {
        self.metadata.get(key)
    }
}

impl Default for RequestContext {
    fn default() -> Self {
        Self::new()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn new_context_has_no_identity() {
        let ctx = RequestContext::new();
        assert!(ctx.user_id.is_none());
        assert!(ctx.api_key.is_none());
        assert!(!ctx.request_id.is_empty());
    }

    #[test]
    fn with_auth_sets_identity() {
        let ctx = RequestContext::with_auth(Some("u1".to_string()), Some("key1".to_string()));
        assert_eq!(ctx.user_id.as_deref(), Some("u1"));
        assert_eq!(ctx.api_key.as_deref(), Some("key1"));
    }

    #[test]
    fn metadata_builder_round_trips() {
        let ctx = RequestContext::new().with_metadata("provider", "openai");
        assert_eq!(ctx.get_metadata("provider").map(String::as_str), Some("openai"));
    }
}
