//! Anthropic Messages API adapter. Anthropic's wire format differs from
//! the canonical one in three ways the conversion below accounts for:
//! system messages move to a top-level `system` field, `max_tokens` is
//! mandatory (we default it rather than rejecting the request), and
//! streaming events are framed as named SSE events rather than bare
//! `data:` chunks.

use crate::capabilities::{CostEstimate, ModelInfo, ProviderCapabilities};
use crate::context::RequestContext;
use crate::error::ProviderError;
use crate::models::{
    ChatChunk, ChatRequest, ChatResponse, Choice, ChunkChoice, ContentPart, Message, MessageContent,
    MessageDelta, Role, Tool, ToolChoice, ToolChoiceMode, Usage,
};
use crate::provider::{Provider, StreamResult};
use crate::providers::http_client::{map_error_response, AuthStrategy, HttpProviderClient};
use async_stream::stream;
use serde::{Deserialize, Serialize};
use std::collections::HashMap;
use std::time::Duration;

/// Anthropic requires an explicit `max_tokens`; this floor is used for
/// requests that didn't ask for a budget at all.
const DEFAULT_MAX_TOKENS: u32 = 1024;

pub struct AnthropicConfig {
    pub api_key: String,
    pub base_url: Option<String>,
    pub timeout: Duration,
    pub headers: HashMap<String, String>,
}

pub struct AnthropicProvider {
    http: HttpProviderClient,
    capabilities: ProviderCapabilities,
}

#[derive(Debug, Serialize)]
struct AnthropicRequest {
    model: String,
    max_tokens: u32,
    messages: Vec<AnthropicMessage>,
    #[serde(skip_serializing_if = "Option::is_none")]
    system: Option<String>,
    #[serde(skip_serializing_if = "Option::is_none")]
    temperature: Option<f32>,
    #[serde(skip_serializing_if = "Option::is_none")]
    stream: Option<bool>,
    #[serde(skip_serializing_if = "Option::is_none")]
    tools: Option<Vec<AnthropicTool>>,
    #[serde(skip_serializing_if = "Option::is_none")]
    tool_choice: Option<AnthropicToolChoice>,
}

#[derive(Debug, Serialize)]
struct AnthropicMessage {
    role: String,
    content: AnthropicContent,
}

/// Anthropic accepts either a plain string or an ordered array of content
/// blocks; we only reach for the array form when a message actually has
/// non-text parts, matching the shape a hand-written client would send.
#[derive(Debug, Serialize)]
#[serde(untagged)]
enum AnthropicContent {
    Text(String),
    Blocks(Vec<AnthropicContentBlock>),
}

#[derive(Debug, Serialize)]
#[serde(tag = "type", rename_all = "snake_case")]
enum AnthropicContentBlock {
    Text { text: String },
    Image { source: AnthropicImageSource },
}

#[derive(Debug, Serialize)]
#[serde(tag = "type", rename_all = "snake_case")]
enum AnthropicImageSource {
    Base64 { media_type: String, data: String },
    Url { url: String },
}

/// Name + description + JSON-schema parameters, forwarded under
/// Anthropic's `input_schema` field name.
#[derive(Debug, Serialize)]
struct AnthropicTool {
    name: String,
    #[serde(skip_serializing_if = "Option::is_none")]
    description: Option<String>,
    input_schema: serde_json::Value,
}

#[derive(Debug, Serialize)]
#[serde(tag = "type", rename_all = "snake_case")]
enum AnthropicToolChoice {
    Auto {
        #[serde(skip_serializing_if = "Option::is_none")]
        disable_parallel_tool_use: Option<bool>,
    },
    Any {
        #[serde(skip_serializing_if = "Option::is_none")]
        disable_parallel_tool_use: Option<bool>,
    },
    Tool {
        name: String,
        #[serde(skip_serializing_if = "Option::is_none")]
        disable_parallel_tool_use: Option<bool>,
    },
}

#[derive(Debug, Deserialize)]
struct AnthropicResponse {
    id: String,
    content: Vec<AnthropicResponseContent>,
    model: String,
    stop_reason: Option<String>,
    usage: AnthropicUsage,
}

#[derive(Debug, Deserialize)]
struct AnthropicResponseContent {
    #[serde(rename = "type")]
    #[allow(dead_code)]
    content_type: String,
    #[serde(default)]
    text: String,
}

#[derive(Debug, Deserialize)]
struct AnthropicUsage {
    input_tokens: u32,
    output_tokens: u32,
}

impl AnthropicProvider {
    pub fn new(config: AnthropicConfig) -> Result<Self, ProviderError> {
        let mut headers = config.headers;
        headers
            .entry("anthropic-version".to_string())
            .or_insert_with(|| "2023-06-01".to_string());

        let http = HttpProviderClient::new(
            config.timeout,
            config.base_url,
            "https://api.anthropic.com",
            &headers,
            AuthStrategy::Header {
                name: "x-api-key".to_string(),
                value: config.api_key,
            },
        )?;

        let cost = CostEstimate {
            prompt_cost_per_million: 3.00,
            completion_cost_per_million: 15.00,
            currency: "USD",
        };
        let capabilities = ProviderCapabilities {
            streaming: true,
            function_calling: true,
            parallel_functions: true,
            vision: true,
            structured_output: false,
            assistants: false,
            batch: true,
            max_context_tokens: 200_000,
            supported_image_formats: vec![
                "image/png".to_string(),
                "image/jpeg".to_string(),
                "image/webp".to_string(),
                "image/gif".to_string(),
            ],
            models: vec![
                ModelInfo {
                    name: "claude-sonnet-4-20250514".to_string(),
                    cost,
                },
                ModelInfo {
                    name: "claude-3-5-haiku-20241022".to_string(),
                    cost: CostEstimate {
                        prompt_cost_per_million: 0.80,
                        completion_cost_per_million: 4.00,
                        currency: "USD",
                    },
                },
            ],
        };

        Ok(Self { http, capabilities })
    }

    fn convert_request(&self, request: &ChatRequest, stream: bool) -> AnthropicRequest {
        let mut system_parts = Vec::new();
        let mut messages = Vec::new();

        for msg in &request.messages {
            match msg.role {
                // System messages must be text-only; they move to the
                // top-level `system` field rather than the message list.
                Role::System => system_parts.push(msg.content.as_text()),
                Role::User => messages.push(AnthropicMessage {
                    role: "user".to_string(),
                    content: self.convert_content(&msg.content),
                }),
                Role::Assistant => messages.push(AnthropicMessage {
                    role: "assistant".to_string(),
                    content: self.convert_content(&msg.content),
                }),
                Role::Tool => continue,
            }
        }

        let tools = request.tools.as_ref().map(|tools| {
            tools.iter().map(convert_tool).collect::<Vec<_>>()
        });
        let tool_choice = request
            .tool_choice
            .as_ref()
            .and_then(|choice| convert_tool_choice(choice, self.capabilities.parallel_functions));

        AnthropicRequest {
            model: request.model.clone(),
            max_tokens: request.max_tokens.unwrap_or(DEFAULT_MAX_TOKENS),
            messages,
            system: (!system_parts.is_empty()).then(|| system_parts.join("\n")),
            temperature: request.temperature,
            stream: Some(stream),
            tools,
            tool_choice,
        }
    }

    /// Text-only content stays a plain string; a message with at least one
    /// image part becomes an ordered block array since Anthropic has no
    /// separate "inline image" slot the way multipart form data would.
    fn convert_content(&self, content: &MessageContent) -> AnthropicContent {
        match content {
            MessageContent::Text(text) => AnthropicContent::Text(text.clone()),
            MessageContent::Parts(_) if !content.has_image() || !self.capabilities.vision => {
                AnthropicContent::Text(content.as_text())
            }
            MessageContent::Parts(parts) => AnthropicContent::Blocks(
                parts
                    .iter()
                    .map(|part| match part {
                        ContentPart::Text { text } => AnthropicContentBlock::Text { text: text.clone() },
                        ContentPart::ImageUrl { image_url } => AnthropicContentBlock::Image {
                            source: image_source_from_url(&image_url.url),
                        },
                    })
                    .collect(),
            ),
        }
    }

    fn convert_response(&self, response: AnthropicResponse) -> ChatResponse {
        let content = response
            .content
            .into_iter()
            .map(|c| c.text)
            .collect::<Vec<_>>()
            .join("");

        ChatResponse {
            id: response.id,
            object: "chat.completion".to_string(),
            created: chrono::Utc::now().timestamp() as u64,
            model: response.model,
            choices: vec![Choice {
                index: 0,
                message: Message::assistant(content),
                finish_reason: response.stop_reason,
            }],
            usage: Some(Usage {
                prompt_tokens: response.usage.input_tokens,
                completion_tokens: response.usage.output_tokens,
                total_tokens: response.usage.input_tokens + response.usage.output_tokens,
            }),
            router_metadata: None,
        }
    }
}

/// Data-URL images (`data:image/png;base64,...`) become an inline
/// base64 block; anything else is forwarded as a URL source.
fn image_source_from_url(url: &str) -> AnthropicImageSource {
    if let Some(rest) = url.strip_prefix("data:") {
        if let Some((meta, data)) = rest.split_once(',') {
            let media_type = meta.split(';').next().unwrap_or("image/png").to_string();
            return AnthropicImageSource::Base64 {
                media_type,
                data: data.to_string(),
            };
        }
    }
    AnthropicImageSource::Url {
        url: url.to_string(),
    }
}

fn convert_tool(tool: &Tool) -> AnthropicTool {
    AnthropicTool {
        name: tool.function.name.clone(),
        description: tool.function.description.clone(),
        input_schema: tool.function.parameters.clone(),
    }
}

/// `disable_parallel_tool_use` mirrors the gateway-wide
/// `capabilities.parallel_functions` flag rather than anything per-request.
fn convert_tool_choice(choice: &ToolChoice, parallel_functions: bool) -> Option<AnthropicToolChoice> {
    let disable_parallel_tool_use = (!parallel_functions).then_some(true);
    match choice {
        ToolChoice::Mode(ToolChoiceMode::None) => None,
        ToolChoice::Mode(ToolChoiceMode::Auto) => Some(AnthropicToolChoice::Auto {
            disable_parallel_tool_use,
        }),
        ToolChoice::Mode(ToolChoiceMode::Required) => Some(AnthropicToolChoice::Any {
            disable_parallel_tool_use,
        }),
        ToolChoice::Specific { function } => Some(AnthropicToolChoice::Tool {
            name: function.name.clone(),
            disable_parallel_tool_use,
        }),
    }
}

#[async_trait::async_trait]
impl Provider for AnthropicProvider {
    fn name(&self) -> &str {
        "anthropic"
    }

    fn capabilities(&self) -> &ProviderCapabilities {
        &self.capabilities
    }

    async fn chat(
        &self,
        request: &ChatRequest,
        _ctx: &RequestContext,
    ) -> Result<ChatResponse, ProviderError> {
        let wire = self.convert_request(request, false);
        let response: AnthropicResponse = self.http.post_json("/v1/messages", &wire).await?;
        Ok(self.convert_response(response))
    }

    async fn stream(
        &self,
        request: &ChatRequest,
        _ctx: &RequestContext,
    ) -> Result<StreamResult, ProviderError> {
        let wire = self.convert_request(request, true);
        let response = self.http.post_json_raw("/v1/messages", &wire).await?;
        if !response.status().is_success() {
            return Err(map_error_response(response).await);
        }

        let model = request.model.clone();
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
                                if json_str.is_empty() {
                                    continue;
                                }
                                match serde_json::from_str::<serde_json::Value>(json_str) {
                                    Ok(event) => {
                                        if let Some(text) = event
                                            .get("delta")
                                            .and_then(|d| d.get("text"))
                                            .and_then(|t| t.as_str())
                                        {
                                            yield Ok(ChatChunk {
                                                id: format!("anthropic-{}", uuid::Uuid::new_v4()),
                                                object: "chat.completion.chunk".to_string(),
                                                created: chrono::Utc::now().timestamp() as u64,
                                                model: model.clone(),
                                                choices: vec![ChunkChoice {
                                                    index: 0,
                                                    delta: MessageDelta {
                                                        role: None,
                                                        content: Some(text.to_string()),
                                                        tool_calls: None,
                                                    },
                                                    finish_reason: None,
                                                }],
                                                router_metadata: None,
                                            });
                                        }
                                    }
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
        let probe = AnthropicRequest {
            model: "claude-3-5-haiku-20241022".to_string(),
            max_tokens: 1,
            messages: vec![AnthropicMessage {
                role: "user".to_string(),
                content: AnthropicContent::Text("ping".to_string()),
            }],
            system: None,
            temperature: Some(0.0),
            stream: Some(false),
            tools: None,
            tool_choice: None,
        };
        self.http
            .post_json::<AnthropicRequest, serde_json::Value>("/v1/messages", &probe)
            .await
            .map(|_| ())
    }
}
