//! @ai:module:intent Caller-configured scoring strategies selected by `eval_config.strategy`
//! @ai:module:layer application
//! @ai:module:public_api CustomStrategy
//! @ai:module:stateless true

use crate::error::EvalError;
use crate::evaluator::basic::normalize;
use crate::evaluator::judge::JudgeClient;
use crate::evaluator::{EvalInput, Verdict};
use regex::{Regex, RegexBuilder};
use serde_json::{json, Map, Value};

/// @ai:intent A custom strategy parsed once per evaluator: exact, contains, regex, keywords or judge
#[derive(Debug, Clone)]
pub enum CustomStrategy {
    Exact,
    Contains,
    Regex(Regex),
    Keywords(Vec<String>),
    Judge { template: String },
}

impl CustomStrategy {
    /// @ai:intent Parse and compile the strategy described by `eval_config`
    /// @ai:effects pure
    pub fn from_config(config: &Map<String, Value>) -> Result<Self, EvalError> {
        let strategy = config
            .get("strategy")
            .and_then(Value::as_str)
            .ok_or_else(|| EvalError::InvalidConfig("missing `strategy`".to_string()))?;

        match strategy {
            "exact" => Ok(CustomStrategy::Exact),
            "contains" => Ok(CustomStrategy::Contains),
            "regex" => {
                let pattern = config
                    .get("pattern")
                    .and_then(Value::as_str)
                    .ok_or_else(|| EvalError::InvalidConfig("regex strategy needs `pattern`".to_string()))?;
                let regex = RegexBuilder::new(pattern)
                    .case_insensitive(config.get("case_insensitive").and_then(Value::as_bool).unwrap_or(false))
                    .build()
                    .map_err(|e| EvalError::InvalidConfig(format!("bad pattern: {e}")))?;
                Ok(CustomStrategy::Regex(regex))
            }
            "keywords" => {
                let keywords: Vec<String> = config
                    .get("keywords")
                    .and_then(Value::as_array)
                    .map(|list| list.iter().filter_map(Value::as_str).map(str::to_string).collect())
                    .unwrap_or_default();
                if keywords.is_empty() {
                    return Err(EvalError::InvalidConfig(
                        "keywords strategy needs a non-empty `keywords` list".to_string(),
                    ));
                }
                Ok(CustomStrategy::Keywords(keywords))
            }
            "judge" => {
                let template = config
                    .get("judge_prompt")
                    .and_then(Value::as_str)
                    .ok_or_else(|| EvalError::InvalidConfig("judge strategy needs `judge_prompt`".to_string()))?;
                Ok(CustomStrategy::Judge {
                    template: template.to_string(),
                })
            }
            other => Err(EvalError::InvalidConfig(format!("unknown strategy `{other}`"))),
        }
    }

    pub fn name(&self) -> &'static str {
        match self {
            CustomStrategy::Exact => "exact",
            CustomStrategy::Contains => "contains",
            CustomStrategy::Regex(_) => "regex",
            CustomStrategy::Keywords(_) => "keywords",
            CustomStrategy::Judge { .. } => "judge",
        }
    }

    /// @ai:intent Score one answer with this strategy
    /// @ai:effects network (judge strategy)
    pub async fn score(
        &self,
        input: &EvalInput<'_>,
        judge: Option<&JudgeClient>,
        repair_budget: u32,
    ) -> Result<Verdict, EvalError> {
        let mut verdict = match self {
            CustomStrategy::Exact => {
                let expected = required_expected(input, self.name())?;
                binary(normalize(input.response) == normalize(expected))
            }
            CustomStrategy::Contains => {
                let expected = required_expected(input, self.name())?;
                binary(normalize(input.response).contains(&normalize(expected)))
            }
            CustomStrategy::Regex(regex) => binary(regex.is_match(input.response)),
            CustomStrategy::Keywords(keywords) => keyword_fraction(keywords, input.response),
            CustomStrategy::Judge { template } => {
                judge
                    .ok_or(EvalError::MissingJudge)?
                    .judge(template, input, repair_budget)
                    .await?
            }
        };

        verdict.details.insert("eval_type".to_string(), json!("custom"));
        verdict.details.insert("strategy".to_string(), json!(self.name()));
        Ok(verdict)
    }
}

fn binary(hit: bool) -> Verdict {
    let mut details = Map::new();
    details.insert("matched".to_string(), json!(hit));
    Verdict::new(if hit { 1.0 } else { 0.0 }, details)
}

fn required_expected<'a>(input: &EvalInput<'a>, strategy: &str) -> Result<&'a str, EvalError> {
    input.prompt.expected().ok_or_else(|| {
        EvalError::InvalidConfig(format!("{strategy} strategy needs an expected answer"))
    })
}

/// Fraction of configured keywords present in the answer, case-insensitive
fn keyword_fraction(keywords: &[String], response: &str) -> Verdict {
    let answer = normalize(response);
    let (found, missing): (Vec<&str>, Vec<&str>) = keywords
        .iter()
        .map(String::as_str)
        .partition(|k| answer.contains(&normalize(k)));

    let mut details = Map::new();
    details.insert("found".to_string(), json!(found));
    details.insert("missing".to_string(), json!(missing));
    Verdict::new(found.len() as f64 / keywords.len() as f64, details)
}
