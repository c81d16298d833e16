//! # Request Validator
//!
//! Every check here runs regardless of earlier failures and all violations
//! are reported together — a client fixing one problem at a time against a
//! short-circuiting validator burns one round trip per violation.

use axum::http::{HeaderMap, Method};
use serde_json::Value;

use crate::config::ValidationConfig;
use crate::gateway_error::GatewayError;

const ALLOWED_METHODS: &[Method] = &[Method::GET, Method::POST, Method::PUT, Method::PATCH, Method::DELETE];
const BLOCKED_URL_SCHEMES: &[&str] = &["javascript:", "data:", "vbscript:", "file:"];
static BLOCKED_PATTERNS: &[&str] = &[
    "<script",
    "</script>",
    "'; drop table",
    "union select",
    "../",
    "..\\",
    "/etc/passwd",
    "{{",
    "${",
    "ignore previous instructions",
];

pub struct RequestValidator {
    config: ValidationConfig,
}

impl RequestValidator {
    pub fn new(config: ValidationConfig) -> Self {
        Self { config }
    }

    /// Checks method, size, content-type, and URL; does not require a
    /// parsed body. Violations accumulate rather than short-circuit.
    pub fn validate_request(
        &self,
        method: &Method,
        headers: &HeaderMap,
        path_and_query: &str,
        content_length: Option<usize>,
    ) -> Result<(), GatewayError> {
        let mut violations = Vec::new();

        if !ALLOWED_METHODS.contains(method) {
            violations.push(format!("method {method} is not allowed"));
        }

        if let Some(len) = content_length {
            if len > self.config.max_request_size {
                violations.push(format!(
                    "request size {len} exceeds max {}",
                    self.config.max_request_size
                ));
            }
        }

        if matches!(*method, Method::POST | Method::PUT | Method::PATCH) {
            match headers.get("content-type").and_then(|v| v.to_str().ok()) {
                Some(ct) if ct.starts_with("application/json") => {}
                Some(ct) => violations.push(format!("unsupported content-type {ct}")),
                None => violations.push("missing content-type header".to_string()),
            }
        }

        let lowered = path_and_query.to_lowercase();
        if let Some(scheme) = BLOCKED_URL_SCHEMES.iter().find(|s| lowered.contains(**s)) {
            violations.push(format!("URL contains blocked scheme {scheme}"));
        }
        if self.config.block_dangerous_patterns {
            if let Some(pattern) = BLOCKED_PATTERNS.iter().find(|p| lowered.contains(**p)) {
                violations.push(format!("URL matches blocked pattern {pattern}"));
            }
        }

        self.finish(violations)
    }

    /// JSON body checks: UTF-8 and parseability are the caller's
    /// responsibility (axum's `Json` extractor already enforces both);
    /// this validates depth, field length, and blocked-pattern content.
    pub fn validate_body(&self, body: &Value) -> Result<(), GatewayError> {
        let mut violations = Vec::new();

        let depth = json_depth(body);
        if depth > self.config.max_json_depth {
            violations.push(format!(
                "JSON nesting depth {depth} exceeds max {}",
                self.config.max_json_depth
            ));
        }

        walk_strings(body, &mut |s| {
            if s.len() > self.config.max_message_length {
                violations.push(format!(
                    "field value of length {} exceeds max {}",
                    s.len(),
                    self.config.max_message_length
                ));
            }
            if self.config.block_dangerous_patterns {
                let lowered = s.to_lowercase();
                if let Some(pattern) = BLOCKED_PATTERNS.iter().find(|p| lowered.contains(**p)) {
                    violations.push(format!("field value matches blocked pattern {pattern}"));
                }
            }
        });

        if let Some(messages) = body.get("messages").and_then(Value::as_array) {
            if messages.len() > self.config.max_messages_count {
                violations.push(format!(
                    "message count {} exceeds max {}",
                    messages.len(),
                    self.config.max_messages_count
                ));
            }
        }

        if let Some(model) = body.get("model").and_then(Value::as_str) {
            if model.len() > self.config.max_model_name_length {
                violations.push(format!(
                    "model name length {} exceeds max {}",
                    model.len(),
                    self.config.max_model_name_length
                ));
            }
        }

        self.finish(violations)
    }

    fn finish(&self, violations: Vec<String>) -> Result<(), GatewayError> {
        if violations.is_empty() {
            Ok(())
        } else {
            Err(GatewayError::Validation {
                message: violations.join("; "),
            })
        }
    }
}

fn json_depth(value: &Value) -> usize {
    match value {
        Value::Object(obj) => 1 + obj.values().map(json_depth).max().unwrap_or(0),
        Value::Array(arr) => 1 + arr.iter().map(json_depth).max().unwrap_or(0),
        _ => 1,
    }
}

fn walk_strings(value: &Value, visit: &mut impl FnMut(&str)) {
    match value {
        Value::String(s) => visit(s),
        Value::Object(obj) => {
            for (key, v) in obj {
                visit(key);
                walk_strings(v, visit);
            }
        }
        Value::Array(arr) => {
            for v in arr {
                walk_strings(v, visit);
            }
        }
        _ => {}
    }
}

/// Removes NUL and C0 control characters other than `\n` and `\t`.
pub fn sanitize(input: &str) -> String {
    input
        .chars()
        .filter(|c| *c == '\n' || *c == '\t' || !c.is_control())
        .collect()
}

#[cfg(test)]
mod tests {
    use super::*;
    use axum::http::HeaderValue;
    use serde_json::json;

    fn validator() -> RequestValidator {
        RequestValidator::new(ValidationConfig {
            max_request_size: 1024,
            max_message_length: 20,
            max_messages_count: 3,
            max_model_name_length: 50,
            max_json_depth: 4,
            block_dangerous_patterns: true,
        })
    }

    #[test]
    fn rejects_disallowed_method() {
        let v = validator();
        let result = v.validate_request(&Method::TRACE, &HeaderMap::new(), "/v1/chat/completions", Some(10));
        assert!(result.is_err());
    }

    #[test]
    fn collects_multiple_violations_at_once() {
        let v = validator();
        let result = v.validate_request(&Method::TRACE, &HeaderMap::new(), "/v1/chat/completions", Some(10_000));
        let err = result.unwrap_err();
        let message = err.to_string();
        assert!(message.contains("method"));
    }

    #[test]
    fn requires_json_content_type_on_post() {
        let v = validator();
        let mut headers = HeaderMap::new();
        headers.insert("content-type", HeaderValue::from_static("text/plain"));
        assert!(v
            .validate_request(&Method::POST, &headers, "/v1/chat/completions", Some(10))
            .is_err());
    }

    #[test]
    fn blocked_url_scheme_is_rejected() {
        let v = validator();
        let headers = HeaderMap::new();
        let result = v.validate_request(&Method::GET, &headers, "/v1/providers?cb=javascript:alert(1)", None);
        assert!(result.is_err());
    }

    #[test]
    fn body_depth_over_limit_is_rejected() {
        let v = validator();
        let body = json!({"a": {"b": {"c": {"d": 1}}}});
        assert!(v.validate_body(&body).is_err());
    }

    #[test]
    fn json_depth_matches_worked_examples() {
        assert_eq!(json_depth(&json!({})), 1);
        assert_eq!(json_depth(&json!([])), 1);
        assert_eq!(json_depth(&json!({"a": {"b": 1}})), 3);
        assert_eq!(json_depth(&json!([[1]])), 3);
    }

    #[test]
    fn too_many_messages_is_rejected() {
        let v = validator();
        let message = json!({"role": "user", "content": "hi"});
        let body = json!({
            "model": "gpt-4",
            "messages": [message.clone(), message.clone(), message.clone(), message.clone(), message]
        });
        assert!(v.validate_body(&body).is_err());
    }

    #[test]
    fn well_formed_body_passes() {
        let v = validator();
        let body = json!({
            "model": "gpt-4",
            "messages": [{"role": "user", "content": "hi"}]
        });
        assert!(v.validate_body(&body).is_ok());
    }

    #[test]
    fn sanitize_strips_control_characters_but_keeps_newlines() {
        let input = "hello\u{0000}\u{0007}world\n\ttab";
        assert_eq!(sanitize(input), "helloworld\n\ttab");
    }
}
