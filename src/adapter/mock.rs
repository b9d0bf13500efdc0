//! @ai:module:intent Scripted in-process adapter for tests and dry runs
//! @ai:module:layer infrastructure
//! @ai:module:public_api ScriptedAdapter, Script
//! @ai:module:stateless false

use crate::adapter::{ChatConfig, ChatMessage, Completion, DeltaStream, ModelAdapter, ToolCall};
use crate::error::AdapterError;
use async_trait::async_trait;
use futures::StreamExt;
use serde_json::Value;
use std::collections::VecDeque;
use std::sync::Mutex;

/// @ai:intent One scripted reaction to an adapter call
#[derive(Debug, Clone)]
pub enum Script {
    Reply(Completion),
    Fail(AdapterError),
    /// Never completes; used to exercise deadlines
    Hang,
    /// Streamed deltas, optionally cut off by an error
    Stream {
        deltas: Vec<String>,
        error: Option<AdapterError>,
    },
}

impl Script {
    pub fn reply(content: impl Into<String>) -> Self {
        Script::Reply(Completion {
            content: content.into(),
            tokens_used: Some(10),
            latency_ms: 1.0,
            tool_calls: Vec::new(),
        })
    }

    /// @ai:intent A reply that asks for a single tool call
    pub fn tool_call(id: impl Into<String>, name: impl Into<String>, arguments: Value) -> Self {
        Script::Reply(Completion {
            content: String::new(),
            tokens_used: Some(10),
            latency_ms: 1.0,
            tool_calls: vec![ToolCall {
                id: id.into(),
                name: name.into(),
                arguments,
            }],
        })
    }

    pub fn stream<I, S>(deltas: I, error: Option<AdapterError>) -> Self
    where
        I: IntoIterator<Item = S>,
        S: Into<String>,
    {
        Script::Stream {
            deltas: deltas.into_iter().map(Into::into).collect(),
            error,
        }
    }
}

/// @ai:intent Adapter that plays back queued scripts, then a fixed fallback reply
pub struct ScriptedAdapter {
    scripts: Mutex<VecDeque<Script>>,
    fallback: String,
    calls: Mutex<Vec<Vec<ChatMessage>>>,
    configs: Mutex<Vec<ChatConfig>>,
}

impl ScriptedAdapter {
    /// @ai:intent Create an adapter that plays `scripts` in order
    /// @ai:effects pure
    pub fn new(scripts: impl IntoIterator<Item = Script>) -> Self {
        Self {
            scripts: Mutex::new(scripts.into_iter().collect()),
            fallback: String::new(),
            calls: Mutex::new(Vec::new()),
            configs: Mutex::new(Vec::new()),
        }
    }

    /// @ai:intent Create an adapter that always returns the same content
    /// @ai:effects pure
    pub fn fixed(content: impl Into<String>) -> Self {
        Self::new([]).with_fallback(content)
    }

    pub fn with_fallback(mut self, content: impl Into<String>) -> Self {
        self.fallback = content.into();
        self
    }

    /// @ai:intent Message lists received so far, one entry per call
    pub fn calls(&self) -> Vec<Vec<ChatMessage>> {
        self.calls.lock().map(|c| c.clone()).unwrap_or_default()
    }

    /// @ai:intent Chat configs received so far, one entry per call
    pub fn configs(&self) -> Vec<ChatConfig> {
        self.configs.lock().map(|c| c.clone()).unwrap_or_default()
    }

    pub fn call_count(&self) -> usize {
        self.calls.lock().map(|c| c.len()).unwrap_or(0)
    }

    fn next_script(&self, messages: &[ChatMessage], config: &ChatConfig) -> Script {
        if let Ok(mut calls) = self.calls.lock() {
            calls.push(messages.to_vec());
        }
        if let Ok(mut configs) = self.configs.lock() {
            configs.push(config.clone());
        }
        self.scripts
            .lock()
            .ok()
            .and_then(|mut scripts| scripts.pop_front())
            .unwrap_or_else(|| Script::reply(self.fallback.clone()))
    }
}

#[async_trait]
impl ModelAdapter for ScriptedAdapter {
    async fn chat(
        &self,
        messages: &[ChatMessage],
        config: &ChatConfig,
    ) -> Result<Completion, AdapterError> {
        match self.next_script(messages, config) {
            Script::Reply(completion) => Ok(completion),
            Script::Fail(err) => Err(err),
            Script::Hang => futures::future::pending().await,
            Script::Stream {
                error: Some(err), ..
            } => Err(err),
            Script::Stream { deltas, error: None } => Ok(Completion {
                content: deltas.concat(),
                tokens_used: None,
                latency_ms: 1.0,
                tool_calls: Vec::new(),
            }),
        }
    }

    async fn stream(
        &self,
        messages: &[ChatMessage],
        config: &ChatConfig,
    ) -> Result<DeltaStream, AdapterError> {
        match self.next_script(messages, config) {
            Script::Reply(completion) => {
                Ok(futures::stream::once(async move { Ok(completion.content) }).boxed())
            }
            Script::Fail(err) => Err(err),
            Script::Hang => futures::future::pending().await,
            Script::Stream { deltas, error } => {
                let items = deltas
                    .into_iter()
                    .map(Ok)
                    .chain(error.map(Err))
                    .collect::<Vec<_>>();
                Ok(futures::stream::iter(items).boxed())
            }
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[tokio::test]
    async fn test_scripts_play_in_order_then_fallback() {
        let adapter = ScriptedAdapter::new([
            Script::reply("first"),
            Script::Fail(AdapterError::Transport("reset".to_string())),
        ])
        .with_fallback("later");
        let config = ChatConfig::new("mock");
        let messages = [ChatMessage::user("q")];

        assert_eq!(adapter.chat(&messages, &config).await.unwrap().content, "first");
        assert!(adapter.chat(&messages, &config).await.is_err());
        assert_eq!(adapter.chat(&messages, &config).await.unwrap().content, "later");
        assert_eq!(adapter.call_count(), 3);
    }

    #[tokio::test]
    async fn test_stream_script_ends_with_error() {
        let adapter = ScriptedAdapter::new([Script::stream(
            ["a", "b"],
            Some(AdapterError::Transport("cut".to_string())),
        )]);
        let items: Vec<_> = adapter
            .stream(&[ChatMessage::user("q")], &ChatConfig::new("mock"))
            .await
            .unwrap()
            .collect()
            .await;

        assert_eq!(items.len(), 3);
        assert_eq!(items[1], Ok("b".to_string()));
        assert!(items[2].is_err());
    }
}
