//! @ai:module:intent Configuration structs for the benchmark service
//! @ai:module:layer infrastructure
//! @ai:module:public_api BenchConfig, ServerConfig, RunSettings, ProviderCredentials
//! @ai:module:stateless true

use serde::{Deserialize, Serialize};
use std::time::Duration;

/// @ai:intent Main configuration for the benchmark service
/// @ai:effects pure
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct BenchConfig {
    #[serde(default)]
    pub server: ServerConfig,
    #[serde(default)]
    pub run: RunSettings,
    #[serde(default)]
    pub providers: ProviderCredentials,
}

/// @ai:intent HTTP server configuration
/// @ai:effects pure
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ServerConfig {
    #[serde(default = "default_bind")]
    pub bind: String,
}

/// @ai:intent Per-run deadlines, budgets and generation defaults
/// @ai:effects pure
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct RunSettings {
    #[serde(default = "default_request_timeout")]
    pub request_timeout_secs: u64,
    #[serde(default = "default_tool_timeout")]
    pub tool_timeout_secs: u64,
    #[serde(default = "default_eval_timeout")]
    pub eval_timeout_secs: u64,
    /// Extra model calls allowed per prompt to reformat unparseable judge output
    #[serde(default = "default_repair_budget")]
    pub repair_budget: u32,
    #[serde(default = "default_max_tool_rounds")]
    pub max_tool_rounds: u32,
    #[serde(default = "default_rate_limit")]
    pub requests_per_minute: u32,
    #[serde(default = "default_temperature")]
    pub temperature: f32,
    #[serde(default = "default_max_tokens")]
    pub max_tokens: u32,
}

/// @ai:intent Credentials and endpoints for providers and tools, passed explicitly to each run
/// @ai:effects pure
#[derive(Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct ProviderCredentials {
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub openai_api_key: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub anthropic_api_key: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub deepseek_api_key: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub tavily_api_key: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub ollama_url: Option<String>,
}

impl std::fmt::Debug for ProviderCredentials {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        let mask = |v: &Option<String>| if v.is_some() { "<set>" } else { "<unset>" };
        f.debug_struct("ProviderCredentials")
            .field("openai_api_key", &mask(&self.openai_api_key))
            .field("anthropic_api_key", &mask(&self.anthropic_api_key))
            .field("deepseek_api_key", &mask(&self.deepseek_api_key))
            .field("tavily_api_key", &mask(&self.tavily_api_key))
            .field("ollama_url", &self.ollama_url)
            .finish()
    }
}

impl Default for ServerConfig {
    fn default() -> Self {
        Self {
            bind: default_bind(),
        }
    }
}

impl Default for RunSettings {
    fn default() -> Self {
        Self {
            request_timeout_secs: default_request_timeout(),
            tool_timeout_secs: default_tool_timeout(),
            eval_timeout_secs: default_eval_timeout(),
            repair_budget: default_repair_budget(),
            max_tool_rounds: default_max_tool_rounds(),
            requests_per_minute: default_rate_limit(),
            temperature: default_temperature(),
            max_tokens: default_max_tokens(),
        }
    }
}

fn default_bind() -> String {
    "127.0.0.1:8000".to_string()
}

fn default_request_timeout() -> u64 {
    60
}

fn default_tool_timeout() -> u64 {
    30
}

fn default_eval_timeout() -> u64 {
    60
}

fn default_repair_budget() -> u32 {
    1
}

fn default_max_tool_rounds() -> u32 {
    1
}

fn default_rate_limit() -> u32 {
    60
}

fn default_temperature() -> f32 {
    0.7
}

fn default_max_tokens() -> u32 {
    1000
}

impl RunSettings {
    pub fn request_timeout(&self) -> Duration {
        Duration::from_secs(self.request_timeout_secs)
    }

    pub fn tool_timeout(&self) -> Duration {
        Duration::from_secs(self.tool_timeout_secs)
    }

    pub fn eval_timeout(&self) -> Duration {
        Duration::from_secs(self.eval_timeout_secs)
    }
}

impl ProviderCredentials {
    /// @ai:intent Read credentials from the conventional environment variables
    /// @ai:effects env
    pub fn from_env() -> Self {
        let var = |name: &str| std::env::var(name).ok().filter(|v| !v.trim().is_empty());
        Self {
            openai_api_key: var("OPENAI_API_KEY"),
            anthropic_api_key: var("ANTHROPIC_API_KEY"),
            deepseek_api_key: var("DEEPSEEK_API_KEY"),
            tavily_api_key: var("TAVILY_API_KEY"),
            ollama_url: var("OLLAMA_URL"),
        }
    }

    /// @ai:intent Fill unset fields from another source; values already set win
    /// @ai:effects pure
    pub fn or(self, fallback: ProviderCredentials) -> Self {
        Self {
            openai_api_key: self.openai_api_key.or(fallback.openai_api_key),
            anthropic_api_key: self.anthropic_api_key.or(fallback.anthropic_api_key),
            deepseek_api_key: self.deepseek_api_key.or(fallback.deepseek_api_key),
            tavily_api_key: self.tavily_api_key.or(fallback.tavily_api_key),
            ollama_url: self.ollama_url.or(fallback.ollama_url),
        }
    }
}

impl BenchConfig {
    /// @ai:intent Load configuration from a TOML file
    /// @ai:pre path exists and is readable
    /// @ai:effects fs:read
    pub fn load(path: &std::path::Path) -> anyhow::Result<Self> {
        let content = std::fs::read_to_string(path)?;
        let config: Self = toml::from_str(&content)?;
        Ok(config)
    }

    /// @ai:intent Save configuration to a TOML file
    /// @ai:effects fs:write
    pub fn save(&self, path: &std::path::Path) -> anyhow::Result<()> {
        let content = toml::to_string_pretty(self)?;
        std::fs::write(path, content)?;
        Ok(())
    }
}
