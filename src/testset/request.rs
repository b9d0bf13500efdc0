//! @ai:module:intent Benchmark request model and validation
//! @ai:module:layer domain
//! @ai:module:public_api BenchmarkRequest, Provider, EvalType
//! @ai:module:stateless true

use crate::error::RequestError;
use crate::testset::prompt::PromptItem;
use serde::{Deserialize, Serialize};
use serde_json::{Map, Value};
use std::collections::HashSet;

/// @ai:intent Language-model backend a request targets
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum Provider {
    OpenAi,
    Anthropic,
    DeepSeek,
    Ollama,
}

impl Provider {
    pub fn as_str(&self) -> &'static str {
        match self {
            Provider::OpenAi => "openai",
            Provider::Anthropic => "anthropic",
            Provider::DeepSeek => "deepseek",
            Provider::Ollama => "ollama",
        }
    }
}

impl std::fmt::Display for Provider {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "{}", self.as_str())
    }
}

impl std::str::FromStr for Provider {
    type Err = RequestError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s.to_ascii_lowercase().as_str() {
            "openai" => Ok(Provider::OpenAi),
            "anthropic" => Ok(Provider::Anthropic),
            "deepseek" => Ok(Provider::DeepSeek),
            "ollama" => Ok(Provider::Ollama),
            other => Err(RequestError::Invalid(format!("unknown provider: {other}"))),
        }
    }
}

/// @ai:intent Scoring strategy selector
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Default, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum EvalType {
    #[default]
    Basic,
    LlmAsJudge,
    Custom,
}

impl EvalType {
    pub fn as_str(&self) -> &'static str {
        match self {
            EvalType::Basic => "basic",
            EvalType::LlmAsJudge => "llm_as_judge",
            EvalType::Custom => "custom",
        }
    }
}

impl std::fmt::Display for EvalType {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "{}", self.as_str())
    }
}

impl std::str::FromStr for EvalType {
    type Err = RequestError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s.to_ascii_lowercase().replace('-', "_").as_str() {
            "basic" => Ok(EvalType::Basic),
            "llm_as_judge" | "judge" => Ok(EvalType::LlmAsJudge),
            "custom" => Ok(EvalType::Custom),
            other => Err(RequestError::Invalid(format!("unknown eval type: {other}"))),
        }
    }
}

/// @ai:intent A batch of prompts plus the subject/evaluator configuration; read-only to the runner
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct BenchmarkRequest {
    pub name: String,
    pub subject_provider: Provider,
    pub subject_model: String,
    /// Defaults to the subject provider
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub evaluator_provider: Option<Provider>,
    /// Defaults to the subject model
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub evaluator_model: Option<String>,
    #[serde(default)]
    pub enable_tools: bool,
    #[serde(default)]
    pub eval_type: EvalType,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub eval_config: Option<Map<String, Value>>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub system_prompt: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub temperature: Option<f32>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub max_tokens: Option<u32>,
    /// Consume the subject's token stream instead of a single completion
    #[serde(default)]
    pub stream: bool,
    pub prompts: Vec<PromptItem>,
}

impl BenchmarkRequest {
    /// @ai:intent Build a minimal request for a subject model
    /// @ai:effects pure
    pub fn new(
        name: impl Into<String>,
        provider: Provider,
        model: impl Into<String>,
        prompts: Vec<PromptItem>,
    ) -> Self {
        Self {
            name: name.into(),
            subject_provider: provider,
            subject_model: model.into(),
            evaluator_provider: None,
            evaluator_model: None,
            enable_tools: false,
            eval_type: EvalType::Basic,
            eval_config: None,
            system_prompt: None,
            temperature: None,
            max_tokens: None,
            stream: false,
            prompts,
        }
    }

    /// @ai:intent Reject empty requests and duplicate or blank prompt ids
    /// @ai:post Ok implies prompts non-empty and ids unique
    /// @ai:effects pure
    pub fn validate(&self) -> Result<(), RequestError> {
        if self.prompts.is_empty() {
            return Err(RequestError::EmptyPrompts);
        }

        let mut seen = HashSet::with_capacity(self.prompts.len());
        for (index, prompt) in self.prompts.iter().enumerate() {
            if prompt.id.trim().is_empty() {
                return Err(RequestError::EmptyPromptId { index });
            }
            if !seen.insert(prompt.id.as_str()) {
                return Err(RequestError::DuplicatePromptId(prompt.id.clone()));
            }
        }

        if let Some(t) = self.temperature {
            if !(0.0..=2.0).contains(&t) {
                return Err(RequestError::Invalid(format!(
                    "temperature {t} outside 0.0..=2.0"
                )));
            }
        }

        Ok(())
    }

    pub fn evaluator_provider(&self) -> Provider {
        self.evaluator_provider.unwrap_or(self.subject_provider)
    }

    pub fn evaluator_model(&self) -> &str {
        self.evaluator_model
            .as_deref()
            .unwrap_or(&self.subject_model)
    }

    /// @ai:intent Look up a key in `eval_config`
    /// @ai:effects pure
    pub fn eval_option(&self, key: &str) -> Option<&Value> {
        self.eval_config.as_ref().and_then(|c| c.get(key))
    }

    /// @ai:intent Whether tool use is on for a prompt (request flag, eval_config or prompt metadata)
    /// @ai:effects pure
    pub fn tools_enabled_for(&self, prompt: &PromptItem) -> bool {
        self.enable_tools
            || self
                .eval_option("enable_tools")
                .and_then(Value::as_bool)
                .unwrap_or(false)
            || prompt.wants_tools()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;

    fn request(prompts: Vec<PromptItem>) -> BenchmarkRequest {
        BenchmarkRequest::new("test", Provider::OpenAi, "gpt-4o-mini", prompts)
    }

    #[test]
    fn test_empty_prompts_rejected() {
        assert_eq!(request(vec![]).validate(), Err(RequestError::EmptyPrompts));
    }

    #[test]
    fn test_duplicate_id_rejected() {
        let req = request(vec![PromptItem::new("1", "a"), PromptItem::new("1", "b")]);
        assert_eq!(
            req.validate(),
            Err(RequestError::DuplicatePromptId("1".to_string()))
        );
    }

    #[test]
    fn test_blank_id_rejected() {
        let req = request(vec![PromptItem::new("1", "a"), PromptItem::new(" ", "b")]);
        assert_eq!(req.validate(), Err(RequestError::EmptyPromptId { index: 1 }));
    }

    #[test]
    fn test_evaluator_defaults_to_subject() {
        let req = request(vec![PromptItem::new("1", "a")]);
        assert_eq!(req.evaluator_provider(), Provider::OpenAi);
        assert_eq!(req.evaluator_model(), "gpt-4o-mini");
    }

    #[test]
    fn test_deserialize_wire_request() {
        let req: BenchmarkRequest = serde_json::from_value(json!({
            "name": "Math reasoning test",
            "subject_provider": "anthropic",
            "subject_model": "claude-3-haiku-20240307",
            "evaluator_provider": "openai",
            "evaluator_model": "gpt-4o",
            "enable_tools": true,
            "eval_type": "llm_as_judge",
            "eval_config": {"repair_budget": 1},
            "prompts": [{"id": "1", "content": "What is 2+2?", "expected_answer": "4"}]
        }))
        .unwrap();

        assert_eq!(req.subject_provider, Provider::Anthropic);
        assert_eq!(req.evaluator_provider(), Provider::OpenAi);
        assert_eq!(req.eval_type, EvalType::LlmAsJudge);
        assert!(req.tools_enabled_for(&req.prompts[0]));
        assert!(req.validate().is_ok());
    }

    #[test]
    fn test_unknown_provider_rejected() {
        assert!("mistral".parse::<Provider>().is_err());
        assert_eq!("OpenAI".parse::<Provider>(), Ok(Provider::OpenAi));
    }

    #[test]
    fn test_eval_type_parsing() {
        assert_eq!("llm-as-judge".parse::<EvalType>(), Ok(EvalType::LlmAsJudge));
        assert_eq!("Custom".parse::<EvalType>(), Ok(EvalType::Custom));
        assert!("fuzzy".parse::<EvalType>().is_err());
    }
}
