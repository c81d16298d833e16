//! # Router Providers
//!
//! The provider abstraction, chat data model, and routing-strategy
//! primitives shared by the gateway. This crate has no HTTP server of its
//! own — it is a library the gateway binary depends on.
//!
//! ## Overview
//!
//! - [`provider::Provider`] is the trait every vendor adapter implements:
//!   name, capabilities, chat, stream, cost estimate, health probe.
//! - [`models`] defines the canonical request/response shapes
//!   (OpenAI-compatible on the wire) that flow between the HTTP surface,
//!   the router, and every adapter.
//! - [`capabilities`] describes what an adapter can do, used by the
//!   router's feature filter.
//! - [`routing_strategy`] defines the strategy enum the router dispatches
//!   on; provider selection given a strategy lives in the gateway crate,
//!   which also owns health state.
//!
//! ## Example
//!
//! ```rust
//! use router_providers::models::{ChatRequest, Message};
//!
//! let request = ChatRequest {
//!     model: "gpt-4o".to_string(),
//!     messages: vec![Message::user("Hello, world!")],
//!     temperature: Some(0.7),
//!     max_tokens: Some(100),
//!     ..Default::default()
//! };
//! assert_eq!(request.messages.len(), 1);
//! ```

pub mod capabilities;
pub mod common;
pub mod context;
pub mod error;
pub mod models;
pub mod provider;
pub mod providers;
pub mod routing_strategy;

pub use capabilities::{CostEstimate, HealthState, ModelInfo, ProviderCapabilities};
pub use context::RequestContext;
pub use error::ProviderError;
pub use models::{
    BackoffType, ChatChunk, ChatRequest, ChatResponse, Choice, FallbackConfig, Message, OptimizeFor,
    ResponseFormat, RetryConfig, Role, RouterMetadata, Usage,
};
pub use provider::{Provider, StreamResult};
pub use routing_strategy::RoutingStrategy;

#[cfg(test)]
mod tests {
    use super::*;
    use crate::models::ChatRequest;

    #[test]
    fn message_constructors_set_expected_roles() {
        let user_msg = Message::user("Hello, world!");
        assert_eq!(user_msg.role, Role::User);
        assert_eq!(user_msg.content.as_text(), "Hello, world!");

        let assistant_msg = Message::assistant("Hi there!");
        assert_eq!(assistant_msg.role, Role::Assistant);

        let system_msg = Message::system("You are a helpful assistant.");
        assert_eq!(system_msg.role, Role::System);
    }

    #[test]
    fn chat_request_default_has_no_messages() {
        let request = ChatRequest::default();
        assert_eq!(request.model, "");
        assert_eq!(request.messages.len(), 0);
        assert_eq!(request.temperature, None);
        assert_eq!(request.max_tokens, None);
        assert_eq!(request.stream, None);
    }
}
