//! @ai:module:intent Chat-completions client for OpenAI and OpenAI-compatible providers (DeepSeek)
//! @ai:module:layer infrastructure
//! @ai:module:public_api OpenAiAdapter
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

const OPENAI_BASE_URL: &str = "https://api.openai.com/v1";
const DEEPSEEK_BASE_URL: &str = "https://api.deepseek.com/v1";

/// OpenAI model ids that cannot serve chat completions
const NON_CHAT_MODELS: [&str; 10] = [
    "0301", "0314", "0613", "embedding", "whisper", "tts", "dall-e", "davinci", "curie", "babbage",
];

#[derive(Debug, Serialize)]
struct ApiRequest<'a> {
    model: &'a str,
    messages: Vec<WireMessage<'a>>,
    temperature: f32,
    max_tokens: u32,
    #[serde(skip_serializing_if = "Vec::is_empty")]
    tools: Vec<Value>,
    #[serde(skip_serializing_if = "std::ops::Not::not")]
    stream: bool,
}

#[derive(Debug, Serialize)]
struct WireMessage<'a> {
    role: &'static str,
    /// `null` is accepted for assistant turns that only carry tool calls
    content: Option<&'a str>,
    #[serde(skip_serializing_if = "Vec::is_empty")]
    tool_calls: Vec<WireToolCall>,
    #[serde(skip_serializing_if = "Option::is_none")]
    tool_call_id: Option<&'a str>,
}

#[derive(Debug, Serialize, Deserialize)]
struct WireToolCall {
    id: String,
    #[serde(rename = "type", default = "function_kind")]
    kind: String,
    function: WireFunction,
}

#[derive(Debug, Serialize, Deserialize)]
struct WireFunction {
    name: String,
    /// JSON-encoded argument object
    #[serde(default)]
    arguments: String,
}

fn function_kind() -> String {
    "function".to_string()
}

#[derive(Debug, Deserialize)]
struct ApiResponse {
    #[serde(default)]
    choices: Vec<Choice>,
    #[serde(default)]
    usage: Option<Usage>,
}

#[derive(Debug, Deserialize)]
struct Choice {
    message: ResponseMessage,
}

#[derive(Debug, Deserialize)]
struct ResponseMessage {
    #[serde(default)]
    content: Option<String>,
    #[serde(default)]
    tool_calls: Vec<WireToolCall>,
}

#[derive(Debug, Deserialize)]
struct Usage {
    total_tokens: u32,
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
    owned_by: Option<String>,
}

#[derive(Debug, Deserialize)]
struct StreamChunk {
    #[serde(default)]
    choices: Vec<StreamChoice>,
}

#[derive(Debug, Deserialize)]
struct StreamChoice {
    #[serde(default)]
    delta: StreamDelta,
}

#[derive(Debug, Default, Deserialize)]
struct StreamDelta {
    #[serde(default)]
    content: Option<String>,
}

impl<'a> WireMessage<'a> {
    fn from_message(message: &'a ChatMessage) -> Self {
        let content = match message.role {
            Role::Assistant if !message.tool_calls.is_empty() && message.content.is_empty() => {
                None
            }
            _ => Some(message.content.as_str()),
        };

        Self {
            role: message.role.as_str(),
            content,
            tool_calls: message
                .tool_calls
                .iter()
                .map(|call| WireToolCall {
                    id: call.id.clone(),
                    kind: function_kind(),
                    function: WireFunction {
                        name: call.name.clone(),
                        arguments: match &call.arguments {
                            Value::String(raw) => raw.clone(),
                            other => other.to_string(),
                        },
                    },
                })
                .collect(),
            tool_call_id: message.tool_call_id.as_deref(),
        }
    }
}

impl From<WireToolCall> for ToolCall {
    fn from(call: WireToolCall) -> Self {
        // Models occasionally emit arguments that are not valid JSON; keep the raw text
        let arguments = serde_json::from_str(&call.function.arguments)
            .unwrap_or(Value::String(call.function.arguments));
        ToolCall {
            id: call.id,
            name: call.function.name,
            arguments,
        }
    }
}

/// @ai:intent Client for `/chat/completions` style APIs with per-adapter rate limiting
pub struct OpenAiAdapter {
    client: reqwest::Client,
    provider: &'static str,
    base_url: String,
    api_key: Option<String>,
    timeout: Duration,
    rate_limiter: RateLimiter,
}

impl OpenAiAdapter {
    /// @ai:intent Build a client for an arbitrary compatible endpoint
    /// @ai:effects pure
    pub fn new(
        provider: &'static str,
        base_url: impl Into<String>,
        api_key: Option<String>,
        timeout: Duration,
        requests_per_minute: u32,
    ) -> Result<Self, AdapterError> {
        Ok(Self {
            client: http_client(timeout)?,
            provider,
            base_url: base_url.into(),
            api_key,
            timeout,
            rate_limiter: RateLimiter::new(requests_per_minute),
        })
    }

    pub fn openai(
        api_key: Option<String>,
        timeout: Duration,
        requests_per_minute: u32,
    ) -> Result<Self, AdapterError> {
        Self::new("openai", OPENAI_BASE_URL, api_key, timeout, requests_per_minute)
    }

    pub fn deepseek(
        api_key: Option<String>,
        timeout: Duration,
        requests_per_minute: u32,
    ) -> Result<Self, AdapterError> {
        Self::new("deepseek", DEEPSEEK_BASE_URL, api_key, timeout, requests_per_minute)
    }

    /// @ai:intent Override the API base URL (for testing or proxies)
    /// @ai:effects pure
    pub fn with_base_url(mut self, base_url: impl Into<String>) -> Self {
        self.base_url = base_url.into();
        self
    }

    fn api_key(&self) -> Result<&str, AdapterError> {
        self.api_key
            .as_deref()
            .ok_or_else(|| AdapterError::Auth(format!("no {} API key configured", self.provider)))
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

        let request = ApiRequest {
            model: &config.model,
            messages: messages.iter().map(WireMessage::from_message).collect(),
            temperature: config.temperature,
            max_tokens: config.max_tokens,
            tools: config
                .tools
                .iter()
                .map(|tool| tool.to_function_schema())
                .collect(),
            stream,
        };

        tracing::debug!(
            provider = self.provider,
            model = %config.model,
            messages = messages.len(),
            tools = request.tools.len(),
            stream,
            "sending chat completion request"
        );

        let response = self
            .client
            .post(format!("{}/chat/completions", self.base_url))
            .bearer_auth(api_key)
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
impl ModelAdapter for OpenAiAdapter {
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

        let choice = body
            .choices
            .into_iter()
            .next()
            .ok_or_else(|| AdapterError::Decode("response contained no choices".to_string()))?;

        Ok(Completion {
            content: choice.message.content.unwrap_or_default(),
            tokens_used: body.usage.map(|u| u.total_tokens),
            latency_ms: start.elapsed().as_secs_f64() * 1000.0,
            tool_calls: choice
                .message
                .tool_calls
                .into_iter()
                .map(ToolCall::from)
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
            .try_filter_map(|line| future::ready(Ok(sse_data(&line).map(str::to_string))))
            .try_take_while(|data| future::ready(Ok(data != "[DONE]")))
            .try_filter_map(|data| {
                let delta = serde_json::from_str::<StreamChunk>(&data)
                    .ok()
                    .and_then(|chunk| chunk.choices.into_iter().next())
                    .and_then(|choice| choice.delta.content)
                    .filter(|text| !text.is_empty());
                future::ready(Ok(delta))
            })
            .boxed();

        Ok(deltas)
    }

    /// @ai:intent List `/models`, dropping OpenAI ids that are not chat models
    /// @ai:effects network
    async fn list_models(&self) -> Result<Vec<ModelInfo>, AdapterError> {
        let api_key = self.api_key()?;

        let response = self
            .client
            .get(format!("{}/models", self.base_url))
            .bearer_auth(api_key)
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

        let models = list
            .data
            .into_iter()
            .filter(|m| {
                self.provider != "openai"
                    || !NON_CHAT_MODELS.iter().any(|p| m.id.to_lowercase().contains(p))
            })
            .map(|m| {
                let owned_by = m.owned_by.or_else(|| Some(self.provider.to_string()));
                ModelInfo::from_id(m.id, owned_by)
            })
            .collect::<Vec<_>>();

        tracing::debug!(provider = self.provider, models = models.len(), "listed models");
        Ok(models)
    }
}
