//! @ai:module:intent LLM-as-judge scoring with a weighted rubric and repaired verdict parsing
//! @ai:module:layer application
//! @ai:module:public_api JudgeClient, default_judge_template, render_template
//! @ai:module:stateless true

use crate::adapter::{ChatConfig, ChatMessage, ModelAdapter};
use crate::error::{EvalError, RepairError};
use crate::evaluator::{EvalInput, Verdict};
use crate::repair::JsonRepairer;
use regex::{Captures, Regex};
use serde_json::{Map, Value};
use std::sync::{Arc, LazyLock};

static PLACEHOLDER: LazyLock<Regex> = LazyLock::new(|| {
    Regex::new(r"\{(prompt|response|expected_answer|system_prompt)\}").expect("static regex")
});

/// Rubric criteria and their weights in the overall score
pub const RUBRIC_WEIGHTS: [(&str, f64); 5] = [
    ("correctness", 0.4),
    ("clarity", 0.2),
    ("completeness", 0.2),
    ("citation", 0.1),
    ("chain_of_thought", 0.1),
];

/// @ai:intent Default rubric prompt; placeholders are filled by `render_template`
/// @ai:effects pure
pub fn default_judge_template() -> &'static str {
    r#"You are an expert evaluator. Score the answer below against this rubric:

1. Correctness (40%): Is the answer accurate? Compare it with the expected answer when one is given.
2. Clarity (20%): Is the answer clear and well structured?
3. Completeness (20%): Does it address every part of the question?
4. Citation (10%): Are factual claims backed by sources or evidence where appropriate?
5. Chain of thought (10%): Is any reasoning shown sound and easy to follow?

System prompt given to the model: {system_prompt}
Question: {prompt}
Expected answer: {expected_answer}
Answer: {response}

Return ONLY JSON: {"score": <0-1>, "passed": <true/false>, "reason": "<brief reason>", "breakdown": {"correctness": <0-1>, "clarity": <0-1>, "completeness": <0-1>, "citation": <0-1>, "chain_of_thought": <0-1>}}"#
}

/// @ai:intent Substitute `{prompt}`, `{response}`, `{expected_answer}` and `{system_prompt}` in one pass
/// @ai:effects pure
pub fn render_template(template: &str, input: &EvalInput<'_>) -> String {
    PLACEHOLDER
        .replace_all(template, |caps: &Captures| match &caps[1] {
            "prompt" => input.prompt.content.clone(),
            "response" => input.response.to_string(),
            "expected_answer" => input.prompt.expected().unwrap_or("").to_string(),
            _ => input.system_prompt.unwrap_or("").to_string(),
        })
        .into_owned()
}

/// @ai:intent Judge model plus the repairer used on its output
pub struct JudgeClient {
    adapter: Arc<dyn ModelAdapter>,
    config: ChatConfig,
    repairer: JsonRepairer,
}

impl JudgeClient {
    pub fn new(adapter: Arc<dyn ModelAdapter>, config: ChatConfig) -> Self {
        let config = config.without_tools();
        Self {
            repairer: JsonRepairer::new(adapter.clone(), config.clone()),
            adapter,
            config,
        }
    }

    /// @ai:intent Ask the judge for a verdict and parse it, spending at most `repair_budget` extra calls
    /// @ai:effects network
    pub async fn judge(
        &self,
        template: &str,
        input: &EvalInput<'_>,
        repair_budget: u32,
    ) -> Result<Verdict, EvalError> {
        let prompt = render_template(template, input);
        let reply = self
            .adapter
            .chat(&[ChatMessage::user(prompt)], &self.config)
            .await?;

        tracing::debug!(prompt_id = %input.prompt.id, raw = %reply.content, "judge replied");

        let parsed = self
            .repairer
            .repair(&reply.content, repair_budget)
            .await
            .map_err(EvalError::JudgeParseFailed)?;

        verdict_from_judgement(parsed)
    }
}

/// @ai:intent Turn the judge's JSON into a verdict; the score falls back to the weighted breakdown
/// @ai:effects pure
fn verdict_from_judgement(judgement: Map<String, Value>) -> Result<Verdict, EvalError> {
    let score = judgement
        .get("score")
        .and_then(number)
        .or_else(|| judgement.get("breakdown").and_then(weighted_breakdown))
        .ok_or_else(|| unusable("verdict has no numeric score"))?;

    let mut details = Map::new();
    details.insert("eval_type".to_string(), "llm_as_judge".into());
    for (key, value) in judgement {
        // The pass decision is re-derived from the score; keep the judge's opinion for reference
        let key = if key == "passed" {
            "judge_passed".to_string()
        } else {
            key
        };
        details.insert(key, value);
    }

    Ok(Verdict::new(score, details))
}

fn unusable(reason: &str) -> EvalError {
    EvalError::JudgeParseFailed(RepairError::Exhausted {
        attempts: 0,
        last_error: reason.to_string(),
    })
}

fn number(value: &Value) -> Option<f64> {
    match value {
        Value::Number(n) => n.as_f64(),
        Value::String(s) => s.trim().parse().ok(),
        _ => None,
    }
}

fn weighted_breakdown(breakdown: &Value) -> Option<f64> {
    let scores: Vec<f64> = RUBRIC_WEIGHTS
        .iter()
        .map(|(name, weight)| breakdown.get(*name).and_then(number).map(|s| s * weight))
        .collect::<Option<_>>()?;
    Some(scores.iter().sum())
}
