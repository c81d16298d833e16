//! # Chat Request/Response Data Model
//!
//! This module defines the OpenAI-shaped chat completion types that flow
//! through the gateway: the request a client sends, the response a provider
//! returns (buffered or as a stream of chunks), and the routing metadata
//! the gateway stamps onto every response.
//!
//! Message content is intentionally a tagged union (plain string, or an
//! ordered list of text/image parts) rather than an untyped JSON value —
//! the custom `Deserialize` impl below inspects the JSON shape once, at the
//! decode boundary, so the rest of the gateway only ever sees the typed
//! `MessageContent` enum.

use serde::de::{self, Deserializer, MapAccess, SeqAccess, Visitor};
use serde::{Deserialize, Serialize};
use std::fmt;
use std::time::Duration;

/// Role of a message in a conversation.
#[derive(Debug, Clone, Copy, Serialize, Deserialize, Hash, PartialEq, Eq)]
#[serde(rename_all = "lowercase")]
pub enum Role {
    System,
    User,
    Assistant,
    Tool,
}

/// One part of a multimodal message: text or an image reference.
///
/// Lifetime: per request only.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(tag = "type", rename_all = "snake_case")]
pub enum ContentPart {
    Text { text: String },
    ImageUrl { image_url: ImageUrl },
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ImageUrl {
    pub url: String,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub detail: Option<String>,
}

/// Message content: either a plain string or an ordered sequence of parts.
///
/// Never decoded as an untyped `serde_json::Value` beyond this boundary —
/// `matches` / `has_image` / `as_text` give the rest of the gateway a typed
/// view.
#[derive(Debug, Clone, Serialize)]
#[serde(untagged)]
pub enum MessageContent {
    Text(String),
    Parts(Vec<ContentPart>),
}

impl<'de> Deserialize<'de> for MessageContent {
    fn deserialize<D>(deserializer: D) -> Result<Self, D::Error>
    where
        D: Deserializer<'de>,
    {
        struct ContentVisitor;

        impl<'de> Visitor<'de> for ContentVisitor {
            type Value = MessageContent;

            fn expecting(&self, f: &mut fmt::Formatter) -> fmt::Result {
                f.write_str("a string or an array of content parts")
            }

            fn visit_str<E>(self, v: &str) -> Result<Self::Value, E>
            where
                E: de::Error,
            {
                Ok(MessageContent::Text(v.to_string()))
            }

            fn visit_string<E>(self, v: String) -> Result<Self::Value, E>
            where
                E: de::Error,
            {
                Ok(MessageContent::Text(v))
            }

            fn visit_seq<A>(self, mut seq: A) -> Result<Self::Value, A::Error>
            where
                A: SeqAccess<'de>,
            {
                let mut parts = Vec::new();
                while let Some(part) = seq.next_element::<ContentPart>()? {
                    parts.push(part);
                }
                Ok(MessageContent::Parts(parts))
            }

            fn visit_map<A>(self, map: A) -> Result<Self::Value, A::Error>
            where
                A: MapAccess<'de>,
            {
                // Some clients send a single part object rather than an array.
                let part =
                    ContentPart::deserialize(de::value::MapAccessDeserializer::new(map))?;
                Ok(MessageContent::Parts(vec![part]))
            }
        }

        deserializer.deserialize_any(ContentVisitor)
    }
}

impl MessageContent {
    /// Concatenated text content, ignoring image parts. Used for token
    /// estimation and for providers whose wire format wants a flat string.
    pub fn as_text(&self) -> String {
        match self {
            MessageContent::Text(s) => s.clone(),
            MessageContent::Parts(parts) => parts
                .iter()
                .filter_map(|p| match p {
                    ContentPart::Text { text } => Some(text.clone()),
                    ContentPart::ImageUrl { .. } => None,
                })
                .collect::<Vec<_>>()
                .join(""),
        }
    }

    /// Whether this content contains at least one image part.
    pub fn has_image(&self) -> bool {
        matches!(self, MessageContent::Parts(parts) if parts.iter().any(|p| matches!(p, ContentPart::ImageUrl { .. })))
    }
}

impl From<&str> for MessageContent {
    fn from(s: &str) -> Self {
        MessageContent::Text(s.to_string())
    }
}

impl From<String> for MessageContent {
    fn from(s: String) -> Self {
        MessageContent::Text(s)
    }
}

/// A single message in a conversation.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Message {
    pub role: Role,
    pub content: MessageContent,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub name: Option<String>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub tool_calls: Option<Vec<ToolCall>>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub tool_call_id: Option<String>,
}

impl Message {
    pub fn user(content: impl Into<MessageContent>) -> Self {
        Self {
            role: Role::User,
            content: content.into(),
            name: None,
            tool_calls: None,
            tool_call_id: None,
        }
    }

    pub fn assistant(content: impl Into<MessageContent>) -> Self {
        Self {
            role: Role::Assistant,
            content: content.into(),
            name: None,
            tool_calls: None,
            tool_call_id: None,
        }
    }

    pub fn system(content: impl Into<MessageContent>) -> Self {
        Self {
            role: Role::System,
            content: content.into(),
            name: None,
            tool_calls: None,
            tool_call_id: None,
        }
    }
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Tool {
    #[serde(rename = "type")]
    pub tool_type: String,
    pub function: Function,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Function {
    pub name: String,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub description: Option<String>,
    pub parameters: serde_json::Value,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(untagged)]
pub enum ToolChoice {
    Mode(ToolChoiceMode),
    Specific { function: FunctionChoice },
}

#[derive(Debug, Clone, Copy, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum ToolChoiceMode {
    None,
    Auto,
    Required,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct FunctionChoice {
    pub name: String,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ToolCall {
    pub id: String,
    #[serde(rename = "type")]
    pub call_type: String,
    pub function: FunctionCall,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct FunctionCall {
    pub name: String,
    pub arguments: String,
}

/// Requested response shape. `json_schema` carries the schema the model
/// should conform to; support requires `capabilities.structured_output`.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(tag = "type", rename_all = "snake_case")]
pub enum ResponseFormat {
    Text,
    JsonObject,
    JsonSchema { json_schema: serde_json::Value },
}

/// Backoff shape for retry delay computation.
#[derive(Debug, Clone, Copy, Serialize, Deserialize, PartialEq, Eq)]
#[serde(rename_all = "snake_case")]
pub enum BackoffType {
    Exponential,
    Linear,
}

/// Per-request retry policy.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct RetryConfig {
    pub max_attempts: u32,
    pub backoff_type: BackoffType,
    #[serde(with = "crate::common::duration_serde")]
    pub base_delay: Duration,
    #[serde(with = "crate::common::duration_serde")]
    pub max_delay: Duration,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub retryable_errors: Option<Vec<String>>,
}

impl Default for RetryConfig {
    fn default() -> Self {
        Self {
            max_attempts: 1,
            backoff_type: BackoffType::Exponential,
            base_delay: Duration::from_millis(500),
            max_delay: Duration::from_secs(30),
            retryable_errors: None,
        }
    }
}

impl RetryConfig {
    /// `max_attempts = 0` is treated as 1.
    pub fn effective_max_attempts(&self) -> u32 {
        self.max_attempts.clamp(0, 5).max(1)
    }

    /// Delay before the `attempt`-th retry (1-indexed: attempt 1 is the
    /// first retry, i.e. the second overall call). Clamped at `max_delay`.
    pub fn delay_for_attempt(&self, attempt: u32) -> Duration {
        let computed = match self.backoff_type {
            BackoffType::Exponential => {
                let exp = attempt.saturating_sub(1);
                self.base_delay.saturating_mul(1u32.checked_shl(exp).unwrap_or(u32::MAX))
            }
            BackoffType::Linear => self.base_delay.saturating_mul(attempt.saturating_sub(1)),
        };
        std::cmp::min(computed, self.max_delay)
    }

    pub fn retryable_markers(&self) -> Vec<String> {
        self.retryable_errors.clone().unwrap_or_default()
    }
}

/// Fallback-chain policy.
#[derive(Debug, Clone, Serialize, Deserialize, Default)]
pub struct FallbackConfig {
    pub enabled: bool,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub preferred_chain: Option<Vec<String>>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub max_cost_increase: Option<f64>,
    #[serde(default)]
    pub require_same_features: bool,
}

/// Routing optimization hint. `RoundRobin` is accepted alongside the more
/// conventional cost/performance/quality hints because the router's
/// strategy-selection rules treat it as an equally valid override.
#[derive(Debug, Clone, Copy, Serialize, Deserialize, PartialEq, Eq)]
#[serde(rename_all = "snake_case")]
pub enum OptimizeFor {
    Cost,
    Performance,
    Quality,
    RoundRobin,
}

/// A chat completion request.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ChatRequest {
    #[serde(skip_serializing_if = "Option::is_none")]
    pub id: Option<String>,
    pub model: String,
    pub messages: Vec<Message>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub temperature: Option<f32>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub top_p: Option<f32>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub frequency_penalty: Option<f32>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub presence_penalty: Option<f32>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub max_tokens: Option<u32>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub seed: Option<i64>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub stop: Option<Vec<String>>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub tools: Option<Vec<Tool>>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub tool_choice: Option<ToolChoice>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub response_format: Option<ResponseFormat>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub stream: Option<bool>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub retry: Option<RetryConfig>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub fallback: Option<FallbackConfig>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub optimize_for: Option<OptimizeFor>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub required_features: Option<Vec<String>>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub user: Option<String>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub application: Option<String>,
}

impl Default for ChatRequest {
    fn default() -> Self {
        Self {
            id: None,
            model: String::new(),
            messages: Vec::new(),
            temperature: None,
            top_p: None,
            frequency_penalty: None,
            presence_penalty: None,
            max_tokens: None,
            seed: None,
            stop: None,
            tools: None,
            tool_choice: None,
            response_format: None,
            stream: None,
            retry: None,
            fallback: None,
            optimize_for: None,
            required_features: None,
            user: None,
            application: None,
        }
    }
}

impl ChatRequest {
    /// True when any message in the request carries a tool/function call
    /// request — used by the router's feature filter.
    pub fn requests_tools(&self) -> bool {
        self.tools.as_ref().is_some_and(|t| !t.is_empty())
    }

    /// True when any message contains an image part.
    pub fn requests_vision(&self) -> bool {
        self.messages.iter().any(|m| m.content.has_image())
    }

    pub fn wants_streaming(&self) -> bool {
        self.stream.unwrap_or(false)
    }

    /// Stable identifier: the caller's `id`, or a freshly generated one.
    pub fn id_or_generate(&self) -> String {
        self.id.clone().unwrap_or_else(|| {
            format!("req-{}", uuid::Uuid::new_v4())
        })
    }
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Usage {
    pub prompt_tokens: u32,
    pub completion_tokens: u32,
    pub total_tokens: u32,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Choice {
    pub index: u32,
    pub message: Message,
    pub finish_reason: Option<String>,
}

/// Routing metadata attached to every response leaving the gateway.
/// Constructed by the router and mutated by the execution engine as
/// attempts progress; sealed before emission.
#[derive(Debug, Clone, Serialize, Deserialize, Default)]
pub struct RouterMetadata {
    pub provider: String,
    pub model: String,
    pub reasoning: Vec<String>,
    pub estimated_cost: f64,
    pub processing_time_ms: u64,
    pub request_id: String,
    pub attempt_count: u32,
    pub failed_providers: Vec<String>,
    pub fallback_used: bool,
    pub retry_delays_ms: Vec<u64>,
    pub total_retry_time_ms: u64,
}

impl RouterMetadata {
    pub fn add_failed_provider(&mut self, provider: &str) {
        if !self.failed_providers.iter().any(|p| p == provider) {
            self.failed_providers.push(provider.to_string());
        }
    }
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ChatResponse {
    pub id: String,
    pub object: String,
    pub created: u64,
    pub model: String,
    pub choices: Vec<Choice>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub usage: Option<Usage>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub router_metadata: Option<RouterMetadata>,
}

/// A `delta` message inside a streamed chunk — only the fields that changed
/// since the previous chunk are populated.
#[derive(Debug, Clone, Serialize, Deserialize, Default)]
pub struct MessageDelta {
    #[serde(skip_serializing_if = "Option::is_none")]
    pub role: Option<Role>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub content: Option<String>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub tool_calls: Option<Vec<ToolCall>>,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ChunkChoice {
    pub index: u32,
    pub delta: MessageDelta,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub finish_reason: Option<String>,
}

/// Streaming analog of [`ChatResponse`]. The first chunk emitted by the
/// gateway carries `router_metadata` only, with an empty choice list.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ChatChunk {
    pub id: String,
    pub object: String,
    pub created: u64,
    pub model: String,
    pub choices: Vec<ChunkChoice>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub router_metadata: Option<RouterMetadata>,
}

impl ChatChunk {
    /// The synthetic first chunk carrying only sealed routing metadata.
    pub fn metadata_only(id: String, created: u64, model: String, metadata: RouterMetadata) -> Self {
        Self {
            id,
            object: "chat.completion.chunk".to_string(),
            created,
            model,
            choices: Vec::new(),
            router_metadata: Some(metadata),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn content_decodes_plain_string() {
        let v: MessageContent = serde_json::from_str(r#""hello""#).unwrap();
        assert_eq!(v.as_text(), "hello");
        assert!(!v.has_image());
    }

    #[test]
    fn content_decodes_parts_array() {
        let v: MessageContent = serde_json::from_str(
            r#"[{"type":"text","text":"look at this"},{"type":"image_url","image_url":{"url":"https://x/y.png"}}]"#,
        )
        .unwrap();
        assert_eq!(v.as_text(), "look at this");
        assert!(v.has_image());
    }

    #[test]
    fn retry_config_zero_attempts_means_one() {
        let cfg = RetryConfig {
            max_attempts: 0,
            ..Default::default()
        };
        assert_eq!(cfg.effective_max_attempts(), 1);
    }

    #[test]
    fn exponential_backoff_matches_spec_example() {
        let cfg = RetryConfig {
            max_attempts: 6,
            backoff_type: BackoffType::Exponential,
            base_delay: Duration::from_secs(1),
            max_delay: Duration::from_secs(30),
            retryable_errors: None,
        };
        assert_eq!(cfg.delay_for_attempt(5), Duration::from_secs(16));
        assert_eq!(cfg.delay_for_attempt(6), Duration::from_secs(30));
    }

    #[test]
    fn linear_backoff_scales_with_attempt_minus_one() {
        let cfg = RetryConfig {
            max_attempts: 3,
            backoff_type: BackoffType::Linear,
            base_delay: Duration::from_millis(100),
            max_delay: Duration::from_secs(10),
            retryable_errors: None,
        };
        assert_eq!(cfg.delay_for_attempt(1), Duration::from_millis(0));
        assert_eq!(cfg.delay_for_attempt(2), Duration::from_millis(100));
        assert_eq!(cfg.delay_for_attempt(3), Duration::from_millis(200));
    }
}
