//! OpenAI chat completion adapter. The wire format here is the canonical
//! one `ChatRequest`/`ChatResponse`/`ChatChunk` are already modeled on, so
//! this adapter is mostly pass-through plus SSE framing.

use crate::capabilities::{CostEstimate, ModelInfo, ProviderCapabilities};
use crate::context::RequestContext;
use crate::error::ProviderError;
use crate::models::{ChatChunk, ChatRequest, ChatResponse};
use crate::provider::{Provider, StreamResult};
use crate::providers::http_client::{map_error_response, AuthStrategy, HttpProviderClient};
use async_stream::stream;
use serde::Serialize;
use std::collections::HashMap;
use std::time::Duration;

pub struct OpenAiConfig {
    pub api_key: String,
    pub base_url: Option<String>,
    pub timeout: Duration,
    pub headers: HashMap<String, String>,
}

pub struct OpenAiProvider {
    http: HttpProviderClient,
    capabilities: ProviderCapabilities,
}

/// `ChatRequest` flattened plus `parallel_tool_calls`, which isn't part of
/// the canonical request model since it's an OpenAI-specific dial on
/// whether tool calls may be batched in one turn.
#[derive(Serialize)]
struct OpenAiChatWire<'a> {
    #[serde(flatten)]
    request: &'a ChatRequest,
    #[serde(skip_serializing_if = "Option::is_none")]
    parallel_tool_calls: Option<bool>,
}

impl OpenAiProvider {
    pub fn new(config: OpenAiConfig) -> Result<Self, ProviderError> {
        let http = HttpProviderClient::new(
            config.timeout,
            config.base_url,
            "https://api.openai.com/v1",
            &config.headers,
            AuthStrategy::Bearer {
                token: config.api_key,
            },
        )?;

        let cost = CostEstimate {
            prompt_cost_per_million: 2.50,
            completion_cost_per_million: 10.00,
            currency: "USD",
        };
        let capabilities = ProviderCapabilities {
            streaming: true,
            function_calling: true,
            parallel_functions: true,
            vision: true,
            structured_output: true,
            assistants: true,
            batch: true,
            max_context_tokens: 128_000,
            supported_image_formats: vec![
                "image/png".to_string(),
                "image/jpeg".to_string(),
                "image/webp".to_string(),
                "image/gif".to_string(),
            ],
            models: vec![
                ModelInfo {
                    name: "gpt-4o".to_string(),
                    cost,
                },
                ModelInfo {
                    name: "gpt-4o-mini".to_string(),
                    cost: CostEstimate {
                        prompt_cost_per_million: 0.15,
                        completion_cost_per_million: 0.60,
                        currency: "USD",
                    },
                },
            ],
        };

        Ok(Self { http, capabilities })
    }

    /// `parallel_tool_calls` is only meaningful once tools are present, and
    /// its value mirrors whether this provider actually supports running
    /// more than one per turn.
    fn parallel_tool_calls(&self, request: &ChatRequest) -> Option<bool> {
        request.tools.as_ref().map(|_| self.capabilities.parallel_functions)
    }
}

#[async_trait::async_trait]
impl Provider for OpenAiProvider {
    fn name(&self) -> &str {
        "openai"
    }

    fn capabilities(&self) -> &ProviderCapabilities {
        &self.capabilities
    }

    async fn chat(
        &self,
        request: &ChatRequest,
        _ctx: &RequestContext,
    ) -> Result<ChatResponse, ProviderError> {
        let mut owned = request.clone();
        owned.stream = Some(false);
        let wire = OpenAiChatWire {
            parallel_tool_calls: self.parallel_tool_calls(&owned),
            request: &owned,
        };
        self.http.post_json("/chat/completions", &wire).await
    }

    async fn stream(
        &self,
        request: &ChatRequest,
        _ctx: &RequestContext,
    ) -> Result<StreamResult, ProviderError> {
        let mut owned = request.clone();
        owned.stream = Some(true);
        let wire = OpenAiChatWire {
            parallel_tool_calls: self.parallel_tool_calls(&owned),
            request: &owned,
        };

        let response = self.http.post_json_raw("/chat/completions", &wire).await?;
        if !response.status().is_success() {
            return Err(map_error_response(response).await);
        }

        let stream = Box::pin(stream! {
            let mut bytes_stream = response.bytes_stream();
            let mut buffer = String::new();

            while let Some(chunk_result) = futures::StreamExt::next(&mut bytes_stream).await {
                match chunk_result {
                    Ok(chunk) => {
                        buffer.push_str(&String::from_utf8_lossy(&chunk));
                        while let Some(line_end) = buffer.find('\n') {
                            let line = buffer[..line_end].trim().to_string();
                            buffer = buffer[line_end + 1..].to_string();

                            if let Some(json_str) = line.strip_prefix("data: ") {
                                if json_str == "[DONE]" {
                                    return;
                                }
                                match serde_json::from_str::<ChatChunk>(json_str) {
                                    Ok(chunk) => yield Ok(chunk),
                                    Err(e) => yield Err(ProviderError::from(e)),
                                }
                            }
                        }
                    }
                    Err(e) => yield Err(ProviderError::from(e)),
                }
            }
        });

        Ok(stream)
    }

    fn estimate_cost(&self, model: &str, prompt_tokens: u32, completion_tokens: u32) -> f64 {
        self.capabilities
            .models
            .iter()
            .find(|m| m.name == model)
            .map(|m| m.cost.estimate(prompt_tokens, completion_tokens))
            .unwrap_or_else(|| {
                self.capabilities.models[0]
                    .cost
                    .estimate(prompt_tokens, completion_tokens)
            })
    }

    async fn probe(&self) -> Result<(), ProviderError> {
        self.http.get_json::<serde_json::Value>("/models").await.map(|_| ())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::models::{Function, Message, Tool};

    fn provider() -> OpenAiProvider {
        OpenAiProvider::new(OpenAiConfig {
            api_key: "test-key".to_string(),
            base_url: None,
            timeout: Duration::from_secs(5),
            headers: HashMap::new(),
        })
        .unwrap()
    }

    #[test]
    fn parallel_tool_calls_is_absent_without_tools() {
        let p = provider();
        let request = ChatRequest {
            model: "gpt-4o".to_string(),
            messages: vec![Message::user("hi")],
            ..Default::default()
        };
        assert_eq!(p.parallel_tool_calls(&request), None);
    }

    #[test]
    fn parallel_tool_calls_mirrors_the_capability_flag() {
        let p = provider();
        let request = ChatRequest {
            model: "gpt-4o".to_string(),
            messages: vec![Message::user("hi")],
            tools: Some(vec![Tool {
                tool_type: "function".to_string(),
                function: Function {
                    name: "lookup".to_string(),
                    description: None,
                    parameters: serde_json::json!({}),
                },
            }]),
            ..Default::default()
        };
        assert_eq!(p.parallel_tool_calls(&request), Some(p.capabilities.parallel_functions));
        assert_eq!(p.parallel_tool_calls(&request), Some(true));
    }
}
