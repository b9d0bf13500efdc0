//! @ai:module:intent Best-effort recovery of malformed JSON emitted by a model
//! @ai:module:layer application
//! @ai:module:public_api JsonRepairer, structural_repair
//! @ai:module:stateless true

use crate::adapter::{ChatConfig, ChatMessage, ModelAdapter};
use crate::error::RepairError;
use regex::Regex;
use serde_json::{Map, Value};
use std::sync::{Arc, LazyLock};

static CODE_FENCE: LazyLock<Regex> = LazyLock::new(|| {
    Regex::new(r"(?s)```[A-Za-z]*\s*\n?(.*?)(?:```|$)").expect("static regex")
});
static UNQUOTED_KEY: LazyLock<Regex> = LazyLock::new(|| {
    Regex::new(r"([{,]\s*)([A-Za-z_][A-Za-z0-9_\-]*)(\s*:)").expect("static regex")
});
static TRAILING_COMMA: LazyLock<Regex> =
    LazyLock::new(|| Regex::new(r",(\s*[}\]])").expect("static regex"));
static PYTHON_LITERAL: LazyLock<Regex> =
    LazyLock::new(|| Regex::new(r"\b(True|False|None)\b").expect("static regex"));

/// @ai:intent Parse model output as JSON, escalating to bounded model-assisted reformatting
pub struct JsonRepairer {
    adapter: Option<Arc<dyn ModelAdapter>>,
    config: ChatConfig,
}

impl JsonRepairer {
    /// @ai:intent Repairer that reformats through `adapter` when structural fixes fail
    /// @ai:effects pure
    pub fn new(adapter: Arc<dyn ModelAdapter>, config: ChatConfig) -> Self {
        Self {
            adapter: Some(adapter),
            config: config.without_tools(),
        }
    }

    /// @ai:intent Repairer limited to local structural fixes
    /// @ai:effects pure
    pub fn structural_only() -> Self {
        Self {
            adapter: None,
            config: ChatConfig::new(""),
        }
    }

    /// @ai:intent Parse `raw` into a JSON object, spending at most `retry_budget` extra model calls
    /// @ai:post Ok holds a JSON object; Err only once the budget is exhausted
    /// @ai:effects network
    pub async fn repair(
        &self,
        raw: &str,
        retry_budget: u32,
    ) -> Result<Map<String, Value>, RepairError> {
        let mut text = raw.to_string();
        let mut attempts = 0;

        loop {
            let last_error = match structural_repair(&text) {
                Ok(value) => return Ok(value),
                Err(e) => e,
            };

            let adapter = match &self.adapter {
                Some(adapter) if attempts < retry_budget => adapter,
                _ => {
                    return Err(RepairError::Exhausted {
                        attempts,
                        last_error,
                    })
                }
            };

            attempts += 1;
            tracing::debug!(attempt = attempts, "asking model to reformat unparseable JSON");

            match adapter
                .chat(&[ChatMessage::user(reformat_prompt(&text))], &self.config)
                .await
            {
                Ok(completion) => text = completion.content,
                Err(e) => tracing::warn!(attempt = attempts, "JSON reformat call failed: {e}"),
            }
        }
    }
}

/// @ai:effects pure
fn reformat_prompt(text: &str) -> String {
    format!(
        "Fix this JSON to be valid. Return ONLY the fixed JSON, no explanation:\n\n{text}\n\nFixed JSON:"
    )
}

/// @ai:intent Apply local fixes one at a time, returning the first text that parses as an object
/// @ai:post Err carries the parse error of the last attempt
/// @ai:effects pure
pub fn structural_repair(raw: &str) -> Result<Map<String, Value>, String> {
    let mut text = raw.trim().to_string();
    let mut last_error = match parse_object(&text) {
        Ok(value) => return Ok(value),
        Err(e) => e.to_string(),
    };

    let fixes: [fn(&str) -> String; 7] = [
        strip_code_fence,
        extract_span,
        replace_python_literals,
        convert_single_quotes,
        quote_unquoted_keys,
        strip_trailing_commas,
        balance_delimiters,
    ];

    for fix in fixes {
        text = fix(&text);
        match parse_object(&text) {
            Ok(value) => return Ok(value),
            Err(e) => last_error = e.to_string(),
        }
    }

    Err(last_error)
}

/// Valid JSON that is not an object counts as a failed parse
fn parse_object(text: &str) -> Result<Map<String, Value>, String> {
    match serde_json::from_str(text).map_err(|e| e.to_string())? {
        Value::Object(object) => Ok(object),
        Value::Array(_) => Err("expected a JSON object, found an array".to_string()),
        other => Err(format!("expected a JSON object, found `{other}`")),
    }
}

fn strip_code_fence(text: &str) -> String {
    match CODE_FENCE.captures(text).and_then(|c| c.get(1)) {
        Some(inner) => inner.as_str().trim().to_string(),
        None => text.to_string(),
    }
}

/// Drop prose before the first `{` and after the last `}`
fn extract_span(text: &str) -> String {
    let Some(start) = text.find('{') else {
        return text.to_string();
    };
    match text.rfind('}') {
        Some(end) if end > start => text[start..=end].to_string(),
        _ => text[start..].to_string(),
    }
}

fn replace_python_literals(text: &str) -> String {
    map_outside_strings(text, |segment| {
        PYTHON_LITERAL
            .replace_all(segment, |caps: &regex::Captures| match &caps[1] {
                "True" => "true",
                "False" => "false",
                _ => "null",
            })
            .into_owned()
    })
}

fn convert_single_quotes(text: &str) -> String {
    if text.contains('"') {
        text.to_string()
    } else {
        text.replace('\'', "\"")
    }
}

fn quote_unquoted_keys(text: &str) -> String {
    map_outside_strings(text, |segment| {
        UNQUOTED_KEY.replace_all(segment, "$1\"$2\"$3").into_owned()
    })
}

fn strip_trailing_commas(text: &str) -> String {
    map_outside_strings(text, |segment| {
        TRAILING_COMMA.replace_all(segment, "$1").into_owned()
    })
}

/// Close an unterminated string and any open objects or arrays, innermost first
fn balance_delimiters(text: &str) -> String {
    let mut stack = Vec::new();
    let mut in_string = false;
    let mut escaped = false;

    for ch in text.chars() {
        if in_string {
            match ch {
                _ if escaped => escaped = false,
                '\\' => escaped = true,
                '"' => in_string = false,
                _ => {}
            }
            continue;
        }
        match ch {
            '"' => in_string = true,
            '{' => stack.push('}'),
            '[' => stack.push(']'),
            '}' | ']' => {
                if stack.last() == Some(&ch) {
                    stack.pop();
                }
            }
            _ => {}
        }
    }

    let mut out = text.to_string();
    if in_string {
        out.push('"');
    }

    let trimmed_len = out.trim_end().trim_end_matches(',').trim_end().len();
    out.truncate(trimmed_len);
    if out.ends_with(':') {
        out.push_str(" null");
    }

    out.extend(stack.into_iter().rev());
    out
}

/// Rewrite only the text outside double-quoted string literals
fn map_outside_strings(text: &str, f: impl Fn(&str) -> String) -> String {
    let mut out = String::with_capacity(text.len());
    let mut outside = String::new();
    let mut inside = String::new();
    let mut in_string = false;
    let mut escaped = false;

    for ch in text.chars() {
        if in_string {
            inside.push(ch);
            match ch {
                _ if escaped => escaped = false,
                '\\' => escaped = true,
                '"' => {
                    in_string = false;
                    out.push_str(&inside);
                    inside.clear();
                }
                _ => {}
            }
        } else if ch == '"' {
            out.push_str(&f(&outside));
            outside.clear();
            in_string = true;
            inside.push(ch);
        } else {
            outside.push(ch);
        }
    }

    out.push_str(&f(&outside));
    out.push_str(&inside);
    out
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::adapter::{Script, ScriptedAdapter};
    use pretty_assertions::assert_eq;
    use serde_json::json;

    fn object(value: Value) -> Map<String, Value> {
        match value {
            Value::Object(object) => object,
            other => panic!("not an object: {other}"),
        }
    }

    #[test]
    fn test_valid_json_passes_through() {
        assert_eq!(structural_repair(r#"{"score": 1}"#), Ok(object(json!({"score": 1}))));
    }

    #[test]
    fn test_code_fence_and_prose() {
        let raw = "Here is my verdict:\n```json\n{\"score\": 0.8, \"passed\": true}\n```\nThanks!";
        assert_eq!(
            structural_repair(raw),
            Ok(object(json!({"score": 0.8, "passed": true})))
        );

        let raw = r#"Sure. {"score": 0.5} Let me know if you need more."#;
        assert_eq!(structural_repair(raw), Ok(object(json!({"score": 0.5}))));
    }

    #[test]
    fn test_unquoted_keys_and_trailing_commas() {
        let raw = r#"{score: 0.9, passed: true, breakdown: {correctness: 1,},}"#;
        assert_eq!(
            structural_repair(raw),
            Ok(object(json!({"score": 0.9, "passed": true, "breakdown": {"correctness": 1}})))
        );
    }

    #[test]
    fn test_string_contents_are_not_rewritten() {
        let raw = r#"{"reason": "said {a: True,}", score: 1,}"#;
        assert_eq!(
            structural_repair(raw),
            Ok(object(json!({"reason": "said {a: True,}", "score": 1})))
        );
    }

    #[test]
    fn test_truncated_output_is_closed() {
        let raw = r#"{"score": 0.7, "reason": "mostly right", "breakdown": {"clarity": 0.5"#;
        assert_eq!(
            structural_repair(raw),
            Ok(object(json!({"score": 0.7, "reason": "mostly right", "breakdown": {"clarity": 0.5}})))
        );

        let raw = r#"{"score": 0.7, "reason": "cut off mid"#;
        assert_eq!(
            structural_repair(raw),
            Ok(object(json!({"score": 0.7, "reason": "cut off mid"})))
        );
    }

    #[test]
    fn test_single_quotes_and_python_literals() {
        assert_eq!(
            structural_repair("{'score': 1.0, 'passed': True, 'breakdown': None}"),
            Ok(object(json!({"score": 1.0, "passed": true, "breakdown": null})))
        );
    }

    #[test]
    fn test_bracketed_prose_before_verdict() {
        let raw = r#"Scored on a [0,1] scale. Verdict: {"score": 0.8, "passed": true}"#;
        assert_eq!(
            structural_repair(raw),
            Ok(object(json!({"score": 0.8, "passed": true})))
        );
    }

    #[test]
    fn test_non_object_json_is_not_a_repair() {
        assert!(structural_repair("[0, 1]").is_err());
        assert!(structural_repair("0.8").is_err());
        assert!(structural_repair(r#""score""#).is_err());
    }

    #[tokio::test]
    async fn test_array_reply_spends_budget_on_reformat() {
        let adapter = Arc::new(ScriptedAdapter::new([Script::reply(
            r#"{"score": 0.6, "passed": true}"#,
        )]));
        let repairer = JsonRepairer::new(adapter.clone(), ChatConfig::new("judge"));

        let value = repairer.repair("Ratings: [0.6, 1]", 1).await.unwrap();

        assert_eq!(value, object(json!({"score": 0.6, "passed": true})));
        assert_eq!(adapter.call_count(), 1);
    }

    #[test]
    fn test_hopeless_text_fails() {
        assert!(structural_repair("I cannot grade this answer.").is_err());
    }

    #[tokio::test]
    async fn test_model_assisted_repair_uses_one_call() {
        let adapter = Arc::new(ScriptedAdapter::new([Script::reply(
            r#"{"score": 0.4, "passed": false}"#,
        )]));
        let repairer = JsonRepairer::new(adapter.clone(), ChatConfig::new("judge"));

        let value = repairer.repair("score is four tenths", 1).await.unwrap();

        assert_eq!(value, object(json!({"score": 0.4, "passed": false})));
        assert_eq!(adapter.call_count(), 1);
        assert!(adapter.calls()[0][0].content.contains("score is four tenths"));
    }

    #[tokio::test]
    async fn test_budget_exhausted() {
        let adapter = Arc::new(ScriptedAdapter::fixed("still not json"));
        let repairer = JsonRepairer::new(adapter.clone(), ChatConfig::new("judge"));

        let err = repairer.repair("not json", 1).await.unwrap_err();

        assert!(matches!(err, RepairError::Exhausted { attempts: 1, .. }));
        assert_eq!(adapter.call_count(), 1);
    }

    #[tokio::test]
    async fn test_zero_budget_never_calls_model() {
        let adapter = Arc::new(ScriptedAdapter::fixed("{}"));
        let repairer = JsonRepairer::new(adapter.clone(), ChatConfig::new("judge"));

        let err = repairer.repair("nope", 0).await.unwrap_err();

        assert!(matches!(err, RepairError::Exhausted { attempts: 0, .. }));
        assert_eq!(adapter.call_count(), 0);
    }
}
