//! @ai:module:intent Anthropic Messages API client
//! @ai:module:layer infrastructure
//! @ai:module:public_api AnthropicAdapter
//! @ai:module:stateless false

use crate::adapter::rate_limiter::{RateLimiter, RateLimiterTrait};
use crate::adapter::stream::{response_lines, sse_data};
use crate::adapter::{
    http_client, status_error, ChatConfig, ChatMessage, Completion, DeltaStream, ModelAdapter,
    ModelInfo, Role, ToolCall,
};
use crate::error::AdapterError;
use async_trait::async_trait;
use futures::{future, StreamExt, TryStreamExt};
use serde::{Deserialize, Serialize};
use serde_json::Value;
use std::time::Duration;
use tokio::time::Instant;

const ANTHROPIC_BASE_URL: &str = "https://api.anthropic.com/v1";
const ANTHROPIC_VERSION: &str = "2023-06-01";

/// @ai:intent Messages API request body
#[derive(Debug, Serialize)]
struct ApiRequest<'a> {
    model: &'a str,
    max_tokens: u32,
    temperature: f32,
    #[serde(skip_serializing_if = "Option::is_none")]
    system: Option<String>,
    messages: Vec<WireMessage>,
    #[serde(skip_serializing_if = "Vec::is_empty")]
    tools: Vec<WireTool<'a>>,
    #[serde(skip_serializing_if = "std::ops::Not::not")]
    stream: bool,
}

#[derive(Debug, Serialize)]
struct WireMessage {
    role: &'static str,
    content: Vec<Block>,
}

#[derive(Debug, Serialize)]
#[serde(tag = "type", rename_all = "snake_case")]
enum Block {
    Text {
        text: String,
    },
    ToolUse {
        id: String,
        name: String,
        input: Value,
    },
    ToolResult {
        tool_use_id: String,
        content: String,
    },
}

#[derive(Debug, Serialize)]
struct WireTool<'a> {
    name: &'a str,
    description: &'a str,
    input_schema: &'a Value,
}

/// @ai:intent Messages API response body
#[derive(Debug, Deserialize)]
struct ApiResponse {
    #[serde(default)]
    content: Vec<ResponseBlock>,
    #[serde(default)]
    usage: Option<Usage>,
}

#[derive(Debug, Deserialize)]
#[serde(tag = "type", rename_all = "snake_case")]
enum ResponseBlock {
    Text {
        text: String,
    },
    ToolUse {
        id: String,
        name: String,
        #[serde(default)]
        input: Value,
    },
    #[serde(other)]
    Other,
}

#[derive(Debug, Deserialize)]
struct Usage {
    input_tokens: u32,
    output_tokens: u32,
}

/// @ai:intent One server-sent event of a streamed message
#[derive(Debug, Deserialize)]
#[serde(tag = "type", rename_all = "snake_case")]
enum StreamEvent {
    ContentBlockDelta { delta: StreamDelta },
    MessageStop,
    Error { error: StreamFailure },
    #[serde(other)]
    Other,
}

#[derive(Debug, Deserialize)]
struct StreamDelta {
    #[serde(default)]
    text: Option<String>,
}

#[derive(Debug, Deserialize)]
struct StreamFailure {
    #[serde(default)]
    message: String,
}

/// @ai:intent Split off system turns and convert the rest to content-block messages
/// @ai:effects pure
fn to_wire(messages: &[ChatMessage]) -> (Option<String>, Vec<WireMessage>) {
    let system: Vec<&str> = messages
        .iter()
        .filter(|m| m.role == Role::System)
        .map(|m| m.content.as_str())
        .collect();

    let mut wire: Vec<WireMessage> = Vec::new();
    for message in messages.iter().filter(|m| m.role != Role::System) {
        match message.role {
            Role::Tool => {
                let block = Block::ToolResult {
                    tool_use_id: message.tool_call_id.clone().unwrap_or_default(),
                    content: message.content.clone(),
                };
                // Consecutive tool results belong in one user turn
                match wire.last_mut() {
                    Some(last)
                        if last.role == "user"
                            && matches!(last.content.last(), Some(Block::ToolResult { .. })) =>
                    {
                        last.content.push(block)
                    }
                    _ => wire.push(WireMessage {
                        role: "user",
                        content: vec![block],
                    }),
                }
            }
            Role::Assistant => {
                let mut content = Vec::new();
                if !message.content.is_empty() {
                    content.push(Block::Text {
                        text: message.content.clone(),
                    });
                }
                content.extend(message.tool_calls.iter().map(|call| Block::ToolUse {
                    id: call.id.clone(),
                    name: call.name.clone(),
                    input: call.arguments.clone(),
                }));
                wire.push(WireMessage {
                    role: "assistant",
                    content,
                });
            }
            Role::User | Role::System => wire.push(WireMessage {
                role: "user",
                content: vec![Block::Text {
                    text: message.content.clone(),
                }],
            }),
        }
    }

    let system = (!system.is_empty()).then(|| system.join("\n\n"));
    (system, wire)
}

#[derive(Debug, Deserialize)]
struct ModelList {
    #[serde(default)]
    data: Vec<ModelEntry>,
}

#[derive(Debug, Deserialize)]
struct ModelEntry {
    id: String,
    #[serde(default)]
    display_name: Option<String>,
}

/// @ai:intent Anthropic client with per-adapter rate limiting
pub struct AnthropicAdapter {
    client: reqwest::Client,
    base_url: String,
    api_key: Option<String>,
    timeout: Duration,
    rate_limiter: RateLimiter,
}

impl AnthropicAdapter {
    /// @ai:intent Create a client; a missing key surfaces as an auth error on first call
    /// @ai:effects pure
    pub fn new(
        api_key: Option<String>,
        timeout: Duration,
        requests_per_minute: u32,
    ) -> Result<Self, AdapterError> {
        Ok(Self {
            client: http_client(timeout)?,
            base_url: ANTHROPIC_BASE_URL.to_string(),
            api_key,
            timeout,
            rate_limiter: RateLimiter::new(requests_per_minute),
        })
    }

    pub fn with_base_url(mut self, base_url: impl Into<String>) -> Self {
        self.base_url = base_url.into();
        self
    }

    fn api_key(&self) -> Result<&str, AdapterError> {
        self.api_key
            .as_deref()
            .ok_or_else(|| AdapterError::Auth("no anthropic API key configured".to_string()))
    }

    /// @ai:effects network
    async fn send(
        &self,
        messages: &[ChatMessage],
        config: &ChatConfig,
        stream: bool,
    ) -> Result<reqwest::Response, AdapterError> {
        let api_key = self.api_key()?;

        self.rate_limiter.wait().await;

        let (system, messages) = to_wire(messages);
        let request = ApiRequest {
            model: &config.model,
            max_tokens: config.max_tokens,
            temperature: config.temperature,
            system,
            messages,
            tools: config
                .tools
                .iter()
                .map(|tool| WireTool {
                    name: &tool.name,
                    description: &tool.description,
                    input_schema: &tool.parameters,
                })
                .collect(),
            stream,
        };

        tracing::debug!(model = %config.model, stream, "sending Anthropic messages request");

        let response = self
            .client
            .post(format!("{}/messages", self.base_url))
            .header("x-api-key", api_key)
            .header("anthropic-version", ANTHROPIC_VERSION)
            .timeout(config.timeout)
            .json(&request)
            .send()
            .await
            .map_err(|e| AdapterError::from_reqwest(e, config.timeout.min(self.timeout)))?;

        if !response.status().is_success() {
            return Err(status_error(response).await);
        }

        Ok(response)
    }
}

#[async_trait]
impl ModelAdapter for AnthropicAdapter {
    /// @ai:effects network
    async fn chat(
        &self,
        messages: &[ChatMessage],
        config: &ChatConfig,
    ) -> Result<Completion, AdapterError> {
        let start = Instant::now();
        let response = self.send(messages, config, false).await?;

        let body: ApiResponse = response
            .json()
            .await
            .map_err(|e| AdapterError::Decode(e.to_string()))?;

        let mut text = Vec::new();
        let mut tool_calls = Vec::new();
        for block in body.content {
            match block {
                ResponseBlock::Text { text: t } => text.push(t),
                ResponseBlock::ToolUse { id, name, input } => tool_calls.push(ToolCall {
                    id,
                    name,
                    arguments: input,
                }),
                ResponseBlock::Other => {}
            }
        }

        Ok(Completion {
            content: text.join("\n"),
            tokens_used: body.usage.map(|u| u.input_tokens + u.output_tokens),
            latency_ms: start.elapsed().as_secs_f64() * 1000.0,
            tool_calls,
        })
    }

    /// @ai:effects network
    async fn stream(
        &self,
        messages: &[ChatMessage],
        config: &ChatConfig,
    ) -> Result<DeltaStream, AdapterError> {
        let response = self.send(messages, config, true).await?;

        let deltas = response_lines(response)
            .try_filter_map(|line| {
                let event = sse_data(&line).and_then(|data| serde_json::from_str(data).ok());
                future::ready(Ok(event))
            })
            .try_take_while(|event| future::ready(Ok(!matches!(event, StreamEvent::MessageStop))))
            .try_filter_map(|event| {
                future::ready(match event {
                    StreamEvent::ContentBlockDelta { delta } => {
                        Ok(delta.text.filter(|t| !t.is_empty()))
                    }
                    StreamEvent::Error { error } => Err(AdapterError::Provider {
                        status: 200,
                        message: error.message,
                    }),
                    StreamEvent::MessageStop | StreamEvent::Other => Ok(None),
                })
            })
            .boxed();

        Ok(deltas)
    }

    /// @ai:effects network
    async fn list_models(&self) -> Result<Vec<ModelInfo>, AdapterError> {
        let response = self
            .client
            .get(format!("{}/models", self.base_url))
            .header("x-api-key", self.api_key()?)
            .header("anthropic-version", ANTHROPIC_VERSION)
            .send()
            .await
            .map_err(|e| AdapterError::from_reqwest(e, self.timeout))?;

        if !response.status().is_success() {
            return Err(status_error(response).await);
        }

        let list: ModelList = response
            .json()
            .await
            .map_err(|e| AdapterError::Decode(e.to_string()))?;

        Ok(list
            .data
            .into_iter()
            .map(|m| match m.display_name {
                Some(name) => ModelInfo {
                    id: m.id,
                    name,
                    owned_by: Some("anthropic".to_string()),
                },
                None => ModelInfo::from_id(m.id, Some("anthropic".to_string())),
            })
            .collect())
    }
}
