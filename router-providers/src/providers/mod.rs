//! # Provider Adapters
//!
//! Concrete [`crate::provider::Provider`] implementations. OpenAI and
//! Anthropic are built in; [`custom::CustomProvider`] is the template for
//! any additional OpenAI-compatible vendor the gateway is configured with.

pub mod anthropic;
pub mod custom;
pub mod http_client;
pub mod openai;

pub use anthropic::{AnthropicConfig, AnthropicProvider};
pub use custom::{CustomProvider, CustomProviderConfig};
pub use openai::{OpenAiConfig, OpenAiProvider};
