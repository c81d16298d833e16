//! # Provider Adapter Contract
//!
//! Every upstream LLM vendor is reached through this trait. An adapter's
//! only job is translating the canonical [`crate::models::ChatRequest`] to
//! and from a vendor's wire format — it holds no retry, fallback, or
//! routing logic of its own.

use crate::capabilities::ProviderCapabilities;
use crate::context::RequestContext;
use crate::error::ProviderError;
use crate::models::{ChatChunk, ChatRequest, ChatResponse};
use futures::Stream;
use std::pin::Pin;

/// A pinned, boxed stream of streaming chunks or errors, yielded by
/// [`Provider::stream`].
pub type StreamResult = Pin<Box<dyn Stream<Item = Result<ChatChunk, ProviderError>> + Send>>;

#[async_trait::async_trait]
pub trait Provider: Send + Sync {
    /// Unique identifier used in routing decisions, audit records, and the
    /// `/providers` endpoint.
    fn name(&self) -> &str;

    /// Static description of what this adapter can do, independent of any
    /// single request.
    fn capabilities(&self) -> &ProviderCapabilities;

    /// Perform a non-streaming chat completion.
    async fn chat(
        &self,
        request: &ChatRequest,
        ctx: &RequestContext,
    ) -> Result<ChatResponse, ProviderError>;

    /// Perform a streaming chat completion.
    async fn stream(
        &self,
        request: &ChatRequest,
        ctx: &RequestContext,
    ) -> Result<StreamResult, ProviderError>;

    /// Estimate the USD cost of a request before it is sent, used by the
    /// cost-optimized routing strategy and the fallback chain's cost gate.
    /// `completion_tokens` is a caller-supplied estimate
    /// (e.g. `max_tokens`, or a default) since the real count is unknown
    /// until the response arrives.
    fn estimate_cost(&self, model: &str, prompt_tokens: u32, completion_tokens: u32) -> f64;

    /// Lightweight liveness probe used by the Health Monitor. Must
    /// not be confused with `chat` — implementations should use the
    /// cheapest upstream call that proves reachability.
    async fn probe(&self) -> Result<(), ProviderError>;
}
