//! @ai:module:intent Tools a subject model may call during a benchmark run
//! @ai:module:layer application
//! @ai:module:public_api Tool, ToolDefinition, ToolRegistry, MathTool, TavilySearch

pub mod math;
pub mod web_search;

pub use math::MathTool;
pub use web_search::TavilySearch;

use crate::config::ProviderCredentials;
use crate::error::ToolError;
use async_trait::async_trait;
use serde::{Deserialize, Serialize};
use serde_json::{json, Value};
use std::collections::BTreeMap;
use std::sync::Arc;
use std::time::Duration;

/// @ai:intent Name, description and JSON-schema parameters advertised to the model
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ToolDefinition {
    pub name: String,
    pub description: String,
    pub parameters: Value,
}

impl ToolDefinition {
    /// @ai:intent OpenAI-style function schema
    /// @ai:effects pure
    pub fn to_function_schema(&self) -> Value {
        json!({
            "type": "function",
            "function": {
                "name": self.name,
                "description": self.description,
                "parameters": self.parameters,
            }
        })
    }
}

/// @ai:intent A callable tool: structured arguments in, structured result or error out
#[async_trait]
pub trait Tool: Send + Sync {
    fn definition(&self) -> ToolDefinition;

    async fn execute(&self, args: &Value) -> Result<Value, ToolError>;
}

/// @ai:intent Name-indexed set of tools available to one run
#[derive(Clone, Default)]
pub struct ToolRegistry {
    tools: BTreeMap<String, Arc<dyn Tool>>,
}

impl ToolRegistry {
    pub fn new() -> Self {
        Self::default()
    }

    /// @ai:intent Registry with the built-in calculator and web search
    /// @ai:effects pure
    pub fn with_defaults(credentials: &ProviderCredentials) -> Self {
        let mut registry = Self::new();
        registry.register(Arc::new(TavilySearch::new(credentials.tavily_api_key.clone())));
        registry.register(Arc::new(MathTool));
        registry
    }

    pub fn register(&mut self, tool: Arc<dyn Tool>) {
        self.tools.insert(tool.definition().name, tool);
    }

    pub fn get(&self, name: &str) -> Option<Arc<dyn Tool>> {
        self.tools.get(name).cloned()
    }

    pub fn is_empty(&self) -> bool {
        self.tools.is_empty()
    }

    pub fn definitions(&self) -> Vec<ToolDefinition> {
        self.tools.values().map(|t| t.definition()).collect()
    }

    /// @ai:intent Run a tool by name under a deadline
    /// @ai:effects network (tool dependent)
    pub async fn invoke(
        &self,
        name: &str,
        args: &Value,
        deadline: Duration,
    ) -> Result<Value, ToolError> {
        let tool = self
            .get(name)
            .ok_or_else(|| ToolError::NotFound(name.to_string()))?;

        match tokio::time::timeout(deadline, tool.execute(args)).await {
            Ok(result) => result,
            Err(_) => Err(ToolError::Timeout {
                after_ms: deadline.as_millis() as u64,
            }),
        }
    }
}
