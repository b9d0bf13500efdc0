//! @ai:module:intent Client for a local or remote Ollama server
//! @ai:module:layer infrastructure
//! @ai:module:public_api OllamaAdapter
//! @ai:module:stateless false

use crate::adapter::rate_limiter::{RateLimiter, RateLimiterTrait};
use crate::adapter::stream::response_lines;
use crate::adapter::{
    http_client, status_error, ChatConfig, ChatMessage, Completion, DeltaStream, ModelAdapter,
    ModelInfo, ToolCall,
};
use crate::error::AdapterError;
use async_trait::async_trait;
use futures::{future, StreamExt, TryStreamExt};
use serde::{Deserialize, Serialize};
use serde_json::Value;
use std::time::Duration;
use tokio::time::Instant;

const DEFAULT_OLLAMA_URL: &str = "http://localhost:11434";

#[derive(Debug, Serialize)]
struct ApiRequest<'a> {
    model: &'a str,
    messages: Vec<WireMessage<'a>>,
    stream: bool,
    options: Options,
    #[serde(skip_serializing_if = "Vec::is_empty")]
    tools: Vec<Value>,
}

#[derive(Debug, Serialize)]
struct Options {
    temperature: f32,
    num_predict: u32,
}

#[derive(Debug, Serialize)]
struct WireMessage<'a> {
    role: &'static str,
    content: &'a str,
    #[serde(skip_serializing_if = "Vec::is_empty")]
    tool_calls: Vec<WireToolCall>,
}

#[derive(Debug, Serialize, Deserialize)]
struct WireToolCall {
    function: WireFunction,
}

#[derive(Debug, Serialize, Deserialize)]
struct WireFunction {
    name: String,
    #[serde(default)]
    arguments: Value,
}

/// @ai:intent Body of a non-streamed reply, and of each NDJSON line when streaming
#[derive(Debug, Deserialize)]
struct ChatChunk {
    #[serde(default)]
    message: Option<ResponseMessage>,
    #[serde(default)]
    prompt_eval_count: Option<u32>,
    #[serde(default)]
    eval_count: Option<u32>,
    #[serde(default)]
    error: Option<String>,
}

#[derive(Debug, Deserialize)]
struct ResponseMessage {
    #[serde(default)]
    content: String,
    #[serde(default)]
    tool_calls: Vec<WireToolCall>,
}

#[derive(Debug, Deserialize)]
struct TagList {
    #[serde(default)]
    models: Vec<Tag>,
}

#[derive(Debug, Deserialize)]
struct Tag {
    name: String,
}

impl ChatChunk {
    fn tokens_used(&self) -> Option<u32> {
        match (self.prompt_eval_count, self.eval_count) {
            (None, None) => None,
            (prompt, completion) => Some(prompt.unwrap_or(0) + completion.unwrap_or(0)),
        }
    }
}

/// @ai:intent Ollama `/api/chat` client; no credentials required
pub struct OllamaAdapter {
    client: reqwest::Client,
    base_url: String,
    timeout: Duration,
    rate_limiter: RateLimiter,
}

impl OllamaAdapter {
    /// @ai:effects pure
    pub fn new(
        base_url: Option<String>,
        timeout: Duration,
        requests_per_minute: u32,
    ) -> Result<Self, AdapterError> {
        let base_url = base_url.unwrap_or_else(|| DEFAULT_OLLAMA_URL.to_string());
        Ok(Self {
            client: http_client(timeout)?,
            base_url: base_url.trim_end_matches('/').to_string(),
            timeout,
            rate_limiter: RateLimiter::new(requests_per_minute),
        })
    }

    /// @ai:effects network
    async fn send(
        &self,
        messages: &[ChatMessage],
        config: &ChatConfig,
        stream: bool,
    ) -> Result<reqwest::Response, AdapterError> {
        self.rate_limiter.wait().await;

        let request = ApiRequest {
            model: &config.model,
            messages: messages
                .iter()
                .map(|m| WireMessage {
                    role: m.role.as_str(),
                    content: &m.content,
                    tool_calls: m
                        .tool_calls
                        .iter()
                        .map(|call| WireToolCall {
                            function: WireFunction {
                                name: call.name.clone(),
                                arguments: call.arguments.clone(),
                            },
                        })
                        .collect(),
                })
                .collect(),
            stream,
            options: Options {
                temperature: config.temperature,
                num_predict: config.max_tokens,
            },
            tools: config
                .tools
                .iter()
                .map(|tool| tool.to_function_schema())
                .collect(),
        };

        tracing::debug!(base_url = %self.base_url, model = %config.model, stream, "sending Ollama chat request");

        let response = self
            .client
            .post(format!("{}/api/chat", self.base_url))
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
impl ModelAdapter for OllamaAdapter {
    /// @ai:effects network
    async fn chat(
        &self,
        messages: &[ChatMessage],
        config: &ChatConfig,
    ) -> Result<Completion, AdapterError> {
        let start = Instant::now();
        let response = self.send(messages, config, false).await?;

        let body: ChatChunk = response
            .json()
            .await
            .map_err(|e| AdapterError::Decode(e.to_string()))?;

        let tokens_used = body.tokens_used();
        if let Some(error) = body.error {
            return Err(AdapterError::Provider {
                status: 200,
                message: error,
            });
        }

        let message = body
            .message
            .ok_or_else(|| AdapterError::Decode("response contained no message".to_string()))?;

        Ok(Completion {
            content: message.content,
            tokens_used,
            latency_ms: start.elapsed().as_secs_f64() * 1000.0,
            // Ollama does not assign call ids
            tool_calls: message
                .tool_calls
                .into_iter()
                .enumerate()
                .map(|(i, call)| ToolCall {
                    id: format!("call_{i}"),
                    name: call.function.name,
                    arguments: call.function.arguments,
                })
                .collect(),
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
                if line.trim().is_empty() {
                    return future::ready(Ok(None));
                }
                let delta = match serde_json::from_str::<ChatChunk>(&line) {
                    Ok(ChatChunk {
                        error: Some(error), ..
                    }) => Err(AdapterError::Provider {
                        status: 200,
                        message: error,
                    }),
                    Ok(chunk) => Ok(chunk
                        .message
                        .map(|m| m.content)
                        .filter(|text| !text.is_empty())),
                    Err(e) => Err(AdapterError::Decode(e.to_string())),
                };
                future::ready(delta)
            })
            .boxed();

        Ok(deltas)
    }

    /// @ai:intent Locally pulled models from `/api/tags`; an unreachable server lists none
    /// @ai:effects network
    async fn list_models(&self) -> Result<Vec<ModelInfo>, AdapterError> {
        let response = match self
            .client
            .get(format!("{}/api/tags", self.base_url))
            .send()
            .await
        {
            Ok(response) => response,
            Err(e) if e.is_connect() => {
                tracing::debug!(base_url = %self.base_url, "Ollama not reachable, no models listed");
                return Ok(Vec::new());
            }
            Err(e) => return Err(AdapterError::from_reqwest(e, self.timeout)),
        };

        if !response.status().is_success() {
            return Err(status_error(response).await);
        }

        let tags: TagList = response
            .json()
            .await
            .map_err(|e| AdapterError::Decode(e.to_string()))?;

        Ok(tags
            .models
            .into_iter()
            .map(|tag| ModelInfo::from_id(tag.name, None))
            .collect())
    }
}
