//! Template adapter for any OpenAI-compatible endpoint that isn't OpenAI
//! or Anthropic themselves — self-hosted inference servers, proxies, and
//! other future vendors. Demonstrates
//! that adding a vendor means implementing [`crate::provider::Provider`],
//! nothing more.

use crate::capabilities::{CostEstimate, ModelInfo, ProviderCapabilities};
use crate::context::RequestContext;
use crate::error::ProviderError;
use crate::models::{ChatChunk, ChatRequest, ChatResponse};
use crate::provider::{Provider, StreamResult};
use crate::providers::http_client::{map_error_response, AuthStrategy, HttpProviderClient};
use async_stream::stream;
use std::collections::HashMap;
use std::time::Duration;

pub struct CustomProviderConfig {
    pub name: String,
    pub base_url: String,
    pub api_key: String,
    pub chat_path: String,
    pub timeout: Duration,
    pub headers: HashMap<String, String>,
    pub models: Vec<ModelInfo>,
    pub streaming: bool,
}

pub struct CustomProvider {
    name: String,
    chat_path: String,
    http: HttpProviderClient,
    capabilities: ProviderCapabilities,
}

impl CustomProvider {
    pub fn new(config: CustomProviderConfig) -> Result<Self, ProviderError> {
        let http = HttpProviderClient::new(
            config.timeout,
            Some(config.base_url),
            "",
            &config.headers,
            AuthStrategy::Bearer {
                token: config.api_key,
            },
        )?;

        let capabilities = ProviderCapabilities {
            streaming: config.streaming,
            function_calling: false,
            parallel_functions: false,
            vision: false,
            structured_output: false,
            assistants: false,
            batch: false,
            max_context_tokens: 32_000,
            supported_image_formats: vec![],
            models: if config.models.is_empty() {
                vec![ModelInfo {
                    name: "default".to_string(),
                    cost: CostEstimate {
                        prompt_cost_per_million: 0.0,
                        completion_cost_per_million: 0.0,
                        currency: "USD",
                    },
                }]
            } else {
                config.models
            },
        };

        Ok(Self {
            name: config.name,
            chat_path: config.chat_path,
            http,
            capabilities,
        })
    }
}

#[async_trait::async_trait]
impl Provider for CustomProvider {
    fn name(&self) -> &str {
        &self.name
    }

    fn capabilities(&self) -> &ProviderCapabilities {
        &self.capabilities
    }

    async fn chat(
        &self,
        request: &ChatRequest,
        _ctx: &RequestContext,
    ) -> Result<ChatResponse, ProviderError> {
        let mut wire = request.clone();
        wire.stream = Some(false);
        self.http.post_json(&self.chat_path, &wire).await
    }

    async fn stream(
        &self,
        request: &ChatRequest,
        _ctx: &RequestContext,
    ) -> Result<StreamResult, ProviderError> {
        if !self.capabilities.streaming {
            return Err(ProviderError::Unsupported {
                message: format!("{} does not support streaming", self.name),
            });
        }

        let mut wire = request.clone();
        wire.stream = Some(true);

        let response = self.http.post_json_raw(&self.chat_path, &wire).await?;
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
            .or_else(|| self.capabilities.models.first())
            .map(|m| m.cost.estimate(prompt_tokens, completion_tokens))
            .unwrap_or(0.0)
    }

    async fn probe(&self) -> Result<(), ProviderError> {
        self.http
            .get_json::<serde_json::Value>("/health")
            .await
            .map(|_| ())
    }
}
