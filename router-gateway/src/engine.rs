//! # Execution Engine — Retry + Fallback
//!
//! The behavioral heart of the gateway. Consumes a [`crate::router::Decision`]
//! and drives the attempt loop against the selected provider, then against
//! a fallback chain on failure. The buffered and streaming entrypoints
//! share the decision but differ in mid-call retry semantics: a streaming
//! open failure jumps straight to the next candidate rather than retrying
//! on the same provider, since replaying bytes across providers would
//! break client ordering guarantees.

use std::collections::HashMap;
use std::sync::Arc;
use std::time::Instant;

use futures::stream::{self, StreamExt};
use router_providers::{
    ChatChunk, ChatRequest, ChatResponse, FallbackConfig, Provider, ProviderError, RequestContext,
    RouterMetadata, StreamResult,
};

use crate::gateway_error::GatewayError;
use crate::router::{required_features, Decision};

pub struct ExecutionEngine {
    providers: HashMap<String, Arc<dyn Provider>>,
}

impl ExecutionEngine {
    pub fn new(providers: HashMap<String, Arc<dyn Provider>>) -> Self {
        Self { providers }
    }

    pub async fn execute_buffered(
        &self,
        decision: &Decision,
        request: &ChatRequest,
        ctx: &RequestContext,
    ) -> Result<ChatResponse, GatewayError> {
        let mut metadata = RouterMetadata {
            provider: decision.selected_provider.clone(),
            model: request.model.clone(),
            reasoning: decision.reasoning.clone(),
            estimated_cost: decision.estimated_cost,
            request_id: ctx.request_id.clone(),
            attempt_count: 0,
            ..Default::default()
        };

        let started = Instant::now();

        let primary = self.provider(&decision.selected_provider)?;
        match self
            .attempt_with_retry(primary.as_ref(), request, ctx, &mut metadata)
            .await
        {
            Ok(mut response) => {
                metadata.processing_time_ms = started.elapsed().as_millis() as u64;
                response.router_metadata = Some(metadata);
                return Ok(response);
            }
            Err(last_error) => {
                metadata.add_failed_provider(&decision.selected_provider);

                let fallback = request.fallback.clone().unwrap_or_default();
                if !fallback.enabled {
                    return Err(last_error.into());
                }

                let primary_cost = decision.estimated_cost;
                let required = required_features(request);
                let chain = build_fallback_chain(
                    &fallback,
                    &decision.fallback_chain,
                    &metadata.failed_providers,
                );

                for candidate_name in chain {
                    let Some(candidate) = self.providers.get(&candidate_name) else {
                        continue;
                    };
                    if fallback.require_same_features && !candidate.capabilities().satisfies(&required) {
                        continue;
                    }

                    if let Some(max_increase) = fallback.max_cost_increase {
                        if primary_cost > 0.0 {
                            let candidate_cost = candidate.estimate_cost(
                                &request.model,
                                estimate_prompt_tokens(request),
                                request.max_tokens.unwrap_or(100),
                            );
                            if candidate_cost > primary_cost * (1.0 + max_increase) {
                                continue;
                            }
                        }
                    }

                    match self
                        .attempt_with_retry(candidate.as_ref(), request, ctx, &mut metadata)
                        .await
                    {
                        Ok(mut response) => {
                            metadata.provider = candidate_name.clone();
                            metadata.fallback_used = true;
                            metadata.reasoning.push(format!("Fallback to {candidate_name}"));
                            metadata.processing_time_ms = started.elapsed().as_millis() as u64;
                            response.router_metadata = Some(metadata);
                            return Ok(response);
                        }
                        Err(_) => {
                            metadata.add_failed_provider(&candidate_name);
                        }
                    }
                }

                Err(last_error.into())
            }
        }
    }

    /// Up to `RetryConfig.max_attempts` attempts against a single
    /// provider. Non-retryable errors abort immediately without
    /// consuming further attempts.
    async fn attempt_with_retry(
        &self,
        provider: &dyn Provider,
        request: &ChatRequest,
        ctx: &RequestContext,
        metadata: &mut RouterMetadata,
    ) -> Result<ChatResponse, ProviderError> {
        let retry = request.retry.clone().unwrap_or_default();
        let max_attempts = retry.effective_max_attempts();
        let markers = retry.retryable_markers();

        let mut last_error = None;
        for attempt in 1..=max_attempts {
            metadata.attempt_count = metadata.attempt_count.max(attempt);

            if attempt > 1 {
                if ctx.cancellation.is_cancelled() {
                    return Err(ProviderError::Cancelled);
                }
                let delay = retry.delay_for_attempt(attempt);
                metadata.retry_delays_ms.push(delay.as_millis() as u64);
                metadata.total_retry_time_ms += delay.as_millis() as u64;
                if sleep_honoring_cancellation(delay, ctx).await {
                    return Err(ProviderError::Cancelled);
                }
            }

            match provider.chat(request, ctx).await {
                Ok(response) => return Ok(response),
                Err(err) => {
                    let retryable = err.is_retryable(&markers);
                    last_error = Some(err);
                    if !retryable {
                        break;
                    }
                }
            }
        }

        Err(last_error.unwrap_or(ProviderError::Upstream {
            message: "no attempt was made".to_string(),
        }))
    }

    /// Streaming path: a failed open jumps to the next fallback candidate
    /// without retrying the same provider. A successful open is preceded
    /// by a synthetic metadata-only chunk; there is no mid-stream
    /// fallback once the first content chunk has been forwarded.
    pub async fn execute_streaming(
        &self,
        decision: &Decision,
        request: &ChatRequest,
        ctx: &RequestContext,
    ) -> Result<StreamResult, GatewayError> {
        let mut metadata = RouterMetadata {
            provider: decision.selected_provider.clone(),
            model: request.model.clone(),
            reasoning: decision.reasoning.clone(),
            estimated_cost: decision.estimated_cost,
            request_id: ctx.request_id.clone(),
            attempt_count: 1,
            ..Default::default()
        };

        let primary = self.provider(&decision.selected_provider)?;
        match primary.stream(request, ctx).await {
            Ok(inner) => Ok(prefix_with_metadata(inner, metadata)),
            Err(first_error) => {
                metadata.add_failed_provider(&decision.selected_provider);

                let fallback = request.fallback.clone().unwrap_or_default();
                if !fallback.enabled {
                    return Err(first_error.into());
                }

                let required = required_features(request);
                let chain = build_fallback_chain(
                    &fallback,
                    &decision.fallback_chain,
                    &metadata.failed_providers,
                );

                for candidate_name in chain {
                    let Some(candidate) = self.providers.get(&candidate_name) else {
                        continue;
                    };
                    if fallback.require_same_features && !candidate.capabilities().satisfies(&required) {
                        continue;
                    }
                    match candidate.stream(request, ctx).await {
                        Ok(inner) => {
                            metadata.provider = candidate_name.clone();
                            metadata.fallback_used = true;
                            metadata.reasoning.push(format!("Fallback to {candidate_name}"));
                            return Ok(prefix_with_metadata(inner, metadata));
                        }
                        Err(_) => {
                            metadata.add_failed_provider(&candidate_name);
                        }
                    }
                }

                Err(first_error.into())
            }
        }
    }

    fn provider(&self, name: &str) -> Result<Arc<dyn Provider>, GatewayError> {
        self.providers
            .get(name)
            .cloned()
            .ok_or_else(|| GatewayError::NoCapableProvider {
                message: format!("provider '{name}' is not registered"),
            })
    }
}

/// `preferred_chain` intersected with still-eligible, not-yet-failed,
/// non-primary candidates when set; otherwise the router's auto-built
/// chain (already excludes the primary and ineligible providers).
fn build_fallback_chain(
    fallback: &FallbackConfig,
    auto_chain: &[String],
    failed: &[String],
) -> Vec<String> {
    let base: Vec<String> = match &fallback.preferred_chain {
        Some(preferred) => preferred
            .iter()
            .filter(|p| auto_chain.contains(p))
            .cloned()
            .collect(),
        None => auto_chain.to_vec(),
    };
    base.into_iter().filter(|p| !failed.contains(p)).collect()
}

fn estimate_prompt_tokens(request: &ChatRequest) -> u32 {
    let chars: usize = request.messages.iter().map(|m| m.content.as_text().len()).sum();
    (chars / 4).max(1) as u32
}

/// Sleeps for `delay`, but returns early (signaling cancellation) if the
/// context is cancelled first.
async fn sleep_honoring_cancellation(delay: std::time::Duration, ctx: &RequestContext) -> bool {
    let cancellation = ctx.cancellation.clone();
    tokio::select! {
        _ = tokio::time::sleep(delay) => false,
        _ = async {
            while !cancellation.is_cancelled() {
                tokio::time::sleep(std::time::Duration::from_millis(20)).await;
            }
        } => true,
    }
}

fn prefix_with_metadata(inner: StreamResult, metadata: RouterMetadata) -> StreamResult {
    let id = format!("chatcmpl-{}", uuid::Uuid::new_v4());
    let created = chrono::Utc::now().timestamp() as u64;
    let model = metadata.model.clone();

    let metadata_chunk = ChatChunk::metadata_only(id, created, model, metadata);
    let head = stream::once(async move { Ok(metadata_chunk) });
    Box::pin(head.chain(inner))
}
