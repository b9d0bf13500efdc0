//! @ai:module:intent Model adapter contract and provider clients
//! @ai:module:layer infrastructure
//! @ai:module:public_api ModelAdapter, ChatMessage, ChatConfig, Completion, ToolCall, ModelInfo, connect
//! @ai:module:stateless false

pub mod anthropic;
pub mod mock;
pub mod ollama;
pub mod openai;
pub mod rate_limiter;
pub mod stream;

pub use anthropic::AnthropicAdapter;
pub use mock::{Script, ScriptedAdapter};
pub use ollama::OllamaAdapter;
pub use openai::OpenAiAdapter;
pub use rate_limiter::{RateLimiter, RateLimiterTrait};

use crate::config::{ProviderCredentials, RunSettings};
use crate::error::AdapterError;
use crate::testset::Provider;
use crate::tools::ToolDefinition;
use async_trait::async_trait;
use futures::stream::BoxStream;
use futures::StreamExt;
use serde::{Deserialize, Serialize};
use serde_json::Value;
use std::sync::Arc;
use std::time::Duration;

/// @ai:intent Speaker of a chat message
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum Role {
    System,
    User,
    Assistant,
    Tool,
}

impl Role {
    pub fn as_str(&self) -> &'static str {
        match self {
            Role::System => "system",
            Role::User => "user",
            Role::Assistant => "assistant",
            Role::Tool => "tool",
        }
    }
}

/// @ai:intent A tool invocation requested by the model
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ToolCall {
    pub id: String,
    pub name: String,
    pub arguments: Value,
}

/// @ai:intent One message in a chat transcript
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ChatMessage {
    pub role: Role,
    pub content: String,
    /// Set on assistant messages that requested tools
    #[serde(default, skip_serializing_if = "Vec::is_empty")]
    pub tool_calls: Vec<ToolCall>,
    /// Set on tool-result messages
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub tool_call_id: Option<String>,
}

impl ChatMessage {
    fn plain(role: Role, content: impl Into<String>) -> Self {
        Self {
            role,
            content: content.into(),
            tool_calls: Vec::new(),
            tool_call_id: None,
        }
    }

    pub fn system(content: impl Into<String>) -> Self {
        Self::plain(Role::System, content)
    }

    pub fn user(content: impl Into<String>) -> Self {
        Self::plain(Role::User, content)
    }

    pub fn assistant(content: impl Into<String>) -> Self {
        Self::plain(Role::Assistant, content)
    }

    /// @ai:intent Assistant turn that requested tool calls
    pub fn assistant_tool_calls(content: impl Into<String>, calls: Vec<ToolCall>) -> Self {
        Self {
            tool_calls: calls,
            ..Self::plain(Role::Assistant, content)
        }
    }

    /// @ai:intent Result of one tool call, fed back to the model
    pub fn tool_result(call_id: impl Into<String>, content: impl Into<String>) -> Self {
        Self {
            tool_call_id: Some(call_id.into()),
            ..Self::plain(Role::Tool, content)
        }
    }
}

/// @ai:intent Per-call generation settings
#[derive(Debug, Clone)]
pub struct ChatConfig {
    pub model: String,
    pub temperature: f32,
    pub max_tokens: u32,
    /// Offered to the model; empty disables tool calling
    pub tools: Vec<ToolDefinition>,
    /// HTTP-level deadline; the runner also enforces its own
    pub timeout: Duration,
}

impl ChatConfig {
    pub fn new(model: impl Into<String>) -> Self {
        Self {
            model: model.into(),
            temperature: 0.7,
            max_tokens: 1000,
            tools: Vec::new(),
            timeout: Duration::from_secs(60),
        }
    }

    pub fn with_tools(mut self, tools: Vec<ToolDefinition>) -> Self {
        self.tools = tools;
        self
    }

    /// @ai:intent Same settings without tools, e.g. for judge or repair calls
    pub fn without_tools(&self) -> Self {
        Self {
            tools: Vec::new(),
            ..self.clone()
        }
    }
}

/// @ai:intent A completed model answer
#[derive(Debug, Clone, PartialEq, Default)]
pub struct Completion {
    pub content: String,
    pub tokens_used: Option<u32>,
    pub latency_ms: f64,
    /// Tools the model asked to call; empty when it answered directly
    pub tool_calls: Vec<ToolCall>,
}

/// @ai:intent One model a provider offers
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ModelInfo {
    pub id: String,
    pub name: String,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub owned_by: Option<String>,
}

impl ModelInfo {
    /// @ai:intent Entry whose display name is derived from the id, e.g. `gpt-4o-mini` → `Gpt 4o Mini`
    /// @ai:effects pure
    pub fn from_id(id: impl Into<String>, owned_by: Option<String>) -> Self {
        let id = id.into();
        let name = id
            .split(['-', ':', '_'])
            .filter(|word| !word.is_empty())
            .map(|word| {
                let mut chars = word.chars();
                match chars.next() {
                    Some(first) => first.to_uppercase().chain(chars).collect::<String>(),
                    None => String::new(),
                }
            })
            .collect::<Vec<_>>()
            .join(" ");
        Self { id, name, owned_by }
    }
}

/// Content deltas; an `Err` item ends the stream early
pub type DeltaStream = BoxStream<'static, Result<String, AdapterError>>;

/// @ai:intent Capability contract every provider client satisfies
#[async_trait]
pub trait ModelAdapter: Send + Sync {
    /// @ai:intent Produce a single completion
    /// @ai:effects network
    async fn chat(
        &self,
        messages: &[ChatMessage],
        config: &ChatConfig,
    ) -> Result<Completion, AdapterError>;

    /// @ai:intent Produce the completion as content deltas; defaults to one delta from `chat`
    /// @ai:effects network
    async fn stream(
        &self,
        messages: &[ChatMessage],
        config: &ChatConfig,
    ) -> Result<DeltaStream, AdapterError> {
        let completion = self.chat(messages, config).await?;
        Ok(futures::stream::once(async move { Ok(completion.content) }).boxed())
    }

    /// @ai:intent Models this provider can serve; adapters without a listing endpoint return none
    /// @ai:effects network
    async fn list_models(&self) -> Result<Vec<ModelInfo>, AdapterError> {
        Ok(Vec::new())
    }
}

/// @ai:intent Build the adapter for a provider from explicit per-run credentials
/// @ai:effects pure
pub fn connect(
    provider: Provider,
    credentials: &ProviderCredentials,
    settings: &RunSettings,
) -> Result<Arc<dyn ModelAdapter>, AdapterError> {
    let rpm = settings.requests_per_minute;
    let timeout = settings.request_timeout();

    let adapter: Arc<dyn ModelAdapter> = match provider {
        Provider::OpenAi => Arc::new(OpenAiAdapter::openai(
            credentials.openai_api_key.clone(),
            timeout,
            rpm,
        )?),
        Provider::DeepSeek => Arc::new(OpenAiAdapter::deepseek(
            credentials.deepseek_api_key.clone(),
            timeout,
            rpm,
        )?),
        Provider::Anthropic => Arc::new(AnthropicAdapter::new(
            credentials.anthropic_api_key.clone(),
            timeout,
            rpm,
        )?),
        Provider::Ollama => Arc::new(OllamaAdapter::new(
            credentials.ollama_url.clone(),
            timeout,
            rpm,
        )?),
    };

    Ok(adapter)
}

/// @ai:intent Shared reqwest client construction
/// @ai:effects pure
pub(crate) fn http_client(timeout: Duration) -> Result<reqwest::Client, AdapterError> {
    reqwest::Client::builder()
        .timeout(timeout)
        .build()
        .map_err(|e| AdapterError::Transport(format!("failed to build HTTP client: {e}")))
}

/// @ai:intent Read an error body and classify the status
/// @ai:effects network
pub(crate) async fn status_error(response: reqwest::Response) -> AdapterError {
    let status = response.status().as_u16();
    let body = response.text().await.unwrap_or_default();
    AdapterError::from_status(status, body)
}
