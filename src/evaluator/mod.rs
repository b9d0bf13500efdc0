//! @ai:module:intent Pluggable scoring of model answers (basic, llm_as_judge, custom)
//! @ai:module:layer application
//! @ai:module:public_api Evaluator, EvalInput, EvalResult, Verdict

pub mod basic;
pub mod custom;
pub mod judge;

pub use basic::{normalize, score_basic};
pub use custom::CustomStrategy;
pub use judge::{default_judge_template, render_template, JudgeClient};

use crate::adapter::{ChatConfig, ModelAdapter};
use crate::config::RunSettings;
use crate::error::EvalError;
use crate::testset::{BenchmarkRequest, Difficulty, EvalType, PromptItem};
use serde::{Deserialize, Serialize};
use serde_json::{Map, Value};
use std::sync::Arc;
use std::time::Duration;

/// @ai:intent Everything a strategy may look at for one answer
#[derive(Debug, Clone, Copy)]
pub struct EvalInput<'a> {
    pub prompt: &'a PromptItem,
    pub response: &'a str,
    pub system_prompt: Option<&'a str>,
}

/// @ai:intent Raw strategy output before the pass threshold is applied
#[derive(Debug, Clone, PartialEq)]
pub struct Verdict {
    pub score: f64,
    pub details: Map<String, Value>,
}

impl Verdict {
    /// Scores are clamped to [0, 1]; NaN becomes 0
    pub fn new(score: f64, details: Map<String, Value>) -> Self {
        let score = if score.is_nan() { 0.0 } else { score.clamp(0.0, 1.0) };
        Self { score, details }
    }
}

/// @ai:intent Per-prompt evaluation outcome as carried on the eval event
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct EvalResult {
    pub prompt_id: String,
    pub score: f64,
    pub passed: bool,
    #[serde(default)]
    pub details: Option<Map<String, Value>>,
    #[serde(default)]
    pub error: Option<String>,
}

impl EvalResult {
    /// @ai:intent Apply the difficulty-aware pass threshold to a verdict
    /// @ai:post passed == (score >= threshold(prompt.difficulty))
    /// @ai:effects pure
    pub fn from_verdict(prompt: &PromptItem, verdict: Verdict) -> Self {
        let threshold = Difficulty::pass_threshold(prompt.difficulty_level());
        Self {
            prompt_id: prompt.id.clone(),
            score: verdict.score,
            passed: verdict.score >= threshold,
            details: Some(verdict.details),
            error: None,
        }
    }

    /// @ai:intent Zero-score failed result carrying a reason
    /// @ai:effects pure
    pub fn failure(
        prompt_id: impl Into<String>,
        reason: impl Into<String>,
        details: Option<Map<String, Value>>,
    ) -> Self {
        Self {
            prompt_id: prompt_id.into(),
            score: 0.0,
            passed: false,
            details,
            error: Some(reason.into()),
        }
    }
}

/// @ai:intent Strategy object parameterized by eval type and config; holds no per-run state
pub struct Evaluator {
    eval_type: EvalType,
    eval_config: Map<String, Value>,
    /// Parsed once from `eval_config` for custom evaluators
    custom: Option<Result<CustomStrategy, EvalError>>,
    judge: Option<JudgeClient>,
    repair_budget: u32,
}

impl Evaluator {
    /// @ai:intent Create an evaluator with an empty config and the default repair budget
    /// @ai:effects pure
    pub fn new(eval_type: EvalType) -> Self {
        Self {
            eval_type,
            eval_config: Map::new(),
            custom: None,
            judge: None,
            repair_budget: RunSettings::default().repair_budget,
        }
        .with_config(Map::new())
    }

    /// @ai:intent Evaluator for a request; `judge` is used by judge-backed strategies
    /// @ai:effects pure
    pub fn for_request(
        request: &BenchmarkRequest,
        judge: Option<Arc<dyn ModelAdapter>>,
        settings: &RunSettings,
    ) -> Self {
        let mut evaluator = Self::new(request.eval_type)
            .with_config(request.eval_config.clone().unwrap_or_default())
            .with_repair_budget(settings.repair_budget);

        if let Some(adapter) = judge {
            let config = ChatConfig {
                model: request.evaluator_model().to_string(),
                // Judging should be as repeatable as the provider allows
                temperature: 0.0,
                max_tokens: settings.max_tokens,
                tools: Vec::new(),
                timeout: settings.eval_timeout(),
            };
            evaluator = evaluator.with_judge(adapter, config);
        }
        evaluator
    }

    pub fn with_config(mut self, eval_config: Map<String, Value>) -> Self {
        self.custom = (self.eval_type == EvalType::Custom)
            .then(|| CustomStrategy::from_config(&eval_config));
        self.eval_config = eval_config;
        self
    }

    pub fn with_judge(mut self, adapter: Arc<dyn ModelAdapter>, config: ChatConfig) -> Self {
        self.judge = Some(JudgeClient::new(adapter, config));
        self
    }

    pub fn with_repair_budget(mut self, budget: u32) -> Self {
        self.repair_budget = budget;
        self
    }

    pub fn eval_type(&self) -> EvalType {
        self.eval_type
    }

    /// @ai:intent Whether this configuration makes judge model calls
    /// @ai:effects pure
    pub fn needs_judge(eval_type: EvalType, eval_config: Option<&Map<String, Value>>) -> bool {
        match eval_type {
            EvalType::Basic => false,
            EvalType::LlmAsJudge => true,
            EvalType::Custom => eval_config
                .and_then(|c| c.get("strategy"))
                .and_then(Value::as_str)
                == Some("judge"),
        }
    }

    /// `eval_config.repair_budget` wins over the configured budget
    fn repair_budget(&self) -> u32 {
        self.eval_config
            .get("repair_budget")
            .and_then(Value::as_u64)
            .map(|b| b.min(u32::MAX as u64) as u32)
            .unwrap_or(self.repair_budget)
    }

    fn judge(&self) -> Result<&JudgeClient, EvalError> {
        self.judge.as_ref().ok_or(EvalError::MissingJudge)
    }

    /// @ai:intent Run the configured strategy without applying the threshold
    /// @ai:effects network (judge strategies)
    pub async fn score(&self, input: &EvalInput<'_>) -> Result<Verdict, EvalError> {
        match self.eval_type {
            EvalType::Basic => Ok(score_basic(input.response, input.prompt.expected())),
            EvalType::LlmAsJudge => {
                let template = self
                    .eval_config
                    .get("judge_prompt")
                    .and_then(Value::as_str)
                    .unwrap_or(default_judge_template());
                self.judge()?
                    .judge(template, input, self.repair_budget())
                    .await
            }
            EvalType::Custom => match &self.custom {
                Some(Ok(strategy)) => {
                    strategy
                        .score(input, self.judge.as_ref(), self.repair_budget())
                        .await
                }
                Some(Err(err)) => Err(err.clone()),
                None => Err(EvalError::InvalidConfig("missing `strategy`".to_string())),
            },
        }
    }

    /// @ai:intent Score one answer under a deadline; every failure becomes a zero-score result
    /// @ai:post result.passed implies result.error is None
    /// @ai:effects network (judge strategies)
    pub async fn evaluate(&self, input: &EvalInput<'_>, deadline: Duration) -> EvalResult {
        let outcome = match tokio::time::timeout(deadline, self.score(input)).await {
            Ok(outcome) => outcome,
            Err(_) => Err(EvalError::Timeout {
                after_ms: deadline.as_millis() as u64,
            }),
        };

        match outcome {
            Ok(verdict) => EvalResult::from_verdict(input.prompt, verdict),
            Err(err) => {
                tracing::warn!(prompt_id = %input.prompt.id, "evaluation failed: {err}");
                let mut details = Map::new();
                details.insert("eval_type".to_string(), self.eval_type.as_str().into());
                EvalResult::failure(&input.prompt.id, err.reason(), Some(details))
            }
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::adapter::{Script, ScriptedAdapter};
    use serde_json::json;

    fn verdict(score: f64) -> Verdict {
        Verdict::new(score, Map::new())
    }

    #[test]
    fn test_threshold_boundaries() {
        let hard = PromptItem::new("h", "q").with_difficulty("hard");
        assert!(EvalResult::from_verdict(&hard, verdict(0.4)).passed);
        assert!(!EvalResult::from_verdict(&hard, verdict(0.39999)).passed);

        let medium = PromptItem::new("m", "q").with_difficulty("Medium");
        assert!(EvalResult::from_verdict(&medium, verdict(0.5)).passed);
        assert!(!EvalResult::from_verdict(&medium, verdict(0.49)).passed);

        let unset = PromptItem::new("u", "q");
        assert!(EvalResult::from_verdict(&unset, verdict(0.6)).passed);
        assert!(!EvalResult::from_verdict(&unset, verdict(0.59)).passed);
    }

    #[test]
    fn test_verdict_is_clamped() {
        assert_eq!(verdict(1.7).score, 1.0);
        assert_eq!(verdict(-0.2).score, 0.0);
        assert_eq!(verdict(f64::NAN).score, 0.0);
    }

    #[tokio::test]
    async fn test_basic_exact_match() {
        let prompt = PromptItem::new("1", "What is 2+2?").with_expected_answer("4");
        let input = EvalInput {
            prompt: &prompt,
            response: "4",
            system_prompt: None,
        };

        let result = Evaluator::new(EvalType::Basic)
            .evaluate(&input, Duration::from_secs(1))
            .await;

        assert_eq!(result.score, 1.0);
        assert!(result.passed);
        assert_eq!(result.error, None);
    }

    #[tokio::test]
    async fn test_judge_without_adapter_is_non_fatal() {
        let prompt = PromptItem::new("1", "q");
        let input = EvalInput {
            prompt: &prompt,
            response: "a",
            system_prompt: None,
        };

        let result = Evaluator::new(EvalType::LlmAsJudge)
            .evaluate(&input, Duration::from_secs(1))
            .await;

        assert_eq!(result.score, 0.0);
        assert!(!result.passed);
        assert_eq!(result.error.as_deref(), Some("no judge model configured"));
    }

    #[tokio::test]
    async fn test_judge_parse_failure_after_budget() {
        let judge = Arc::new(ScriptedAdapter::new([
            Script::reply("The answer looks fine to me."),
            Script::reply("Still prose, sorry."),
        ]));
        let evaluator = Evaluator::new(EvalType::LlmAsJudge)
            .with_judge(judge.clone(), ChatConfig::new("judge"))
            .with_repair_budget(1);
        let prompt = PromptItem::new("1", "q");
        let input = EvalInput {
            prompt: &prompt,
            response: "a",
            system_prompt: None,
        };

        let result = evaluator.evaluate(&input, Duration::from_secs(5)).await;

        assert_eq!(result.error.as_deref(), Some("judge_parse_failed"));
        assert_eq!(result.score, 0.0);
        assert!(!result.passed);
        assert_eq!(judge.call_count(), 2);
    }

    #[tokio::test(start_paused = true)]
    async fn test_evaluation_deadline() {
        let judge = Arc::new(ScriptedAdapter::new([Script::Hang]));
        let evaluator = Evaluator::new(EvalType::LlmAsJudge)
            .with_judge(judge, ChatConfig::new("judge"));
        let prompt = PromptItem::new("slow", "q");
        let input = EvalInput {
            prompt: &prompt,
            response: "a",
            system_prompt: None,
        };

        let result = evaluator.evaluate(&input, Duration::from_secs(2)).await;
        assert_eq!(
            result.error.as_deref(),
            Some("evaluation timed out after 2000ms")
        );
    }

    #[test]
    fn test_config_repair_budget_override() {
        let evaluator = Evaluator::new(EvalType::LlmAsJudge)
            .with_repair_budget(1)
            .with_config(json!({"repair_budget": 3}).as_object().cloned().unwrap());
        assert_eq!(evaluator.repair_budget(), 3);
    }

    #[tokio::test]
    async fn test_custom_config_errors_surface_per_prompt() {
        let evaluator = Evaluator::new(EvalType::Custom)
            .with_config(json!({"strategy": "regex", "pattern": "("}).as_object().cloned().unwrap());
        assert!(matches!(evaluator.custom, Some(Err(EvalError::InvalidConfig(_)))));

        let prompt = PromptItem::new("1", "q");
        let input = EvalInput {
            prompt: &prompt,
            response: "a",
            system_prompt: None,
        };
        let result = evaluator.evaluate(&input, Duration::from_secs(5)).await;
        assert!(result.error.unwrap().starts_with("invalid eval config: bad pattern"));
        assert!(!result.passed);
    }

    #[test]
    fn test_needs_judge() {
        let judge_cfg = json!({"strategy": "judge"}).as_object().cloned().unwrap();
        assert!(Evaluator::needs_judge(EvalType::Custom, Some(&judge_cfg)));
        assert!(!Evaluator::needs_judge(EvalType::Custom, None));
        assert!(Evaluator::needs_judge(EvalType::LlmAsJudge, None));
        assert!(!Evaluator::needs_judge(EvalType::Basic, Some(&judge_cfg)));
    }
}
