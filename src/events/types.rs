//! @ai:module:intent Typed benchmark events with their exact wire shape
//! @ai:module:layer domain
//! @ai:module:public_api BenchEvent, EventPayload, AnswerEvent, ToolEvent, EvalEvent, SummaryEvent
//! @ai:module:stateless true

use crate::evaluator::EvalResult;
use crate::testset::Provider;
use crate::versioner::PromptHash;
use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use serde_json::Value;

/// @ai:intent One line of the event stream: a timestamp plus a tagged payload
/// @ai:effects pure
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct BenchEvent {
    pub timestamp: DateTime<Utc>,
    #[serde(flatten)]
    pub payload: EventPayload,
}

/// Serialized as `"event_type": "answer" | "tool" | "eval" | "summary"` beside the payload fields
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(tag = "event_type", rename_all = "lowercase")]
pub enum EventPayload {
    Answer(AnswerEvent),
    Tool(ToolEvent),
    Eval(EvalEvent),
    Summary(SummaryEvent),
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct AnswerEvent {
    pub prompt_id: String,
    pub prompt_hash: PromptHash,
    /// Final answer text, or an error placeholder when the model call failed
    pub content: String,
    pub model: String,
    pub provider: Provider,
    pub latency_ms: f64,
    #[serde(default)]
    pub tokens_used: Option<u32>,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ToolEvent {
    pub prompt_id: String,
    pub tool_name: String,
    pub tool_args: Value,
    #[serde(default)]
    pub tool_result: Option<Value>,
    #[serde(default)]
    pub error: Option<String>,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct EvalEvent {
    pub prompt_id: String,
    pub result: EvalResult,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct SummaryEvent {
    pub total_prompts: usize,
    pub passed: usize,
    pub failed: usize,
    pub average_score: f64,
    pub total_duration_ms: f64,
    /// One `"<prompt_id>: <reason>"` entry per prompt that hit a failure
    pub errors: Vec<String>,
}

impl SummaryEvent {
    /// @ai:intent Format one `errors` entry from a prompt's adapter and evaluation failures
    /// @ai:post None iff both are None; an eval error equal to the adapter error is not repeated
    /// @ai:effects pure
    pub fn error_entry(
        prompt_id: &str,
        adapter_error: Option<&str>,
        eval_error: Option<&str>,
    ) -> Option<String> {
        match (adapter_error, eval_error) {
            (Some(adapter), Some(eval)) if adapter != eval => {
                Some(format!("{prompt_id}: {adapter}; {eval}"))
            }
            (Some(reason), _) | (None, Some(reason)) => Some(format!("{prompt_id}: {reason}")),
            (None, None) => None,
        }
    }
}

impl BenchEvent {
    /// @ai:intent Stamp a payload with the current time
    /// @ai:effects time
    pub fn now(payload: impl Into<EventPayload>) -> Self {
        Self {
            timestamp: Utc::now(),
            payload: payload.into(),
        }
    }

    pub fn event_type(&self) -> &'static str {
        match self.payload {
            EventPayload::Answer(_) => "answer",
            EventPayload::Tool(_) => "tool",
            EventPayload::Eval(_) => "eval",
            EventPayload::Summary(_) => "summary",
        }
    }

    /// `None` for the summary event
    pub fn prompt_id(&self) -> Option<&str> {
        match &self.payload {
            EventPayload::Answer(e) => Some(&e.prompt_id),
            EventPayload::Tool(e) => Some(&e.prompt_id),
            EventPayload::Eval(e) => Some(&e.prompt_id),
            EventPayload::Summary(_) => None,
        }
    }
}

impl From<AnswerEvent> for EventPayload {
    fn from(event: AnswerEvent) -> Self {
        EventPayload::Answer(event)
    }
}

impl From<ToolEvent> for EventPayload {
    fn from(event: ToolEvent) -> Self {
        EventPayload::Tool(event)
    }
}

impl From<EvalEvent> for EventPayload {
    fn from(event: EvalEvent) -> Self {
        EventPayload::Eval(event)
    }
}

impl From<SummaryEvent> for EventPayload {
    fn from(event: SummaryEvent) -> Self {
        EventPayload::Summary(event)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::versioner::hash_prompt;
    use serde_json::json;

    fn keys(value: &Value) -> Vec<&str> {
        value
            .as_object()
            .unwrap()
            .keys()
            .map(String::as_str)
            .collect()
    }

    #[test]
    fn test_answer_wire_fields() {
        let event = BenchEvent::now(AnswerEvent {
            prompt_id: "1".to_string(),
            prompt_hash: hash_prompt("What is 2+2?"),
            content: "4".to_string(),
            model: "gpt-4o-mini".to_string(),
            provider: Provider::OpenAi,
            latency_ms: 12.5,
            tokens_used: None,
        });
        let value = serde_json::to_value(&event).unwrap();

        let mut fields = keys(&value);
        fields.sort_unstable();
        assert_eq!(
            fields,
            vec![
                "content",
                "event_type",
                "latency_ms",
                "model",
                "prompt_hash",
                "prompt_id",
                "provider",
                "timestamp",
                "tokens_used"
            ]
        );
        assert_eq!(value["event_type"], "answer");
        assert_eq!(value["provider"], "openai");
        assert_eq!(value["tokens_used"], Value::Null);
    }

    #[test]
    fn test_eval_and_tool_wire_fields() {
        let eval = serde_json::to_value(BenchEvent::now(EvalEvent {
            prompt_id: "1".to_string(),
            result: EvalResult::failure("1", "judge_parse_failed", None),
        }))
        .unwrap();
        assert_eq!(eval["event_type"], "eval");
        assert_eq!(
            eval["result"],
            json!({"prompt_id": "1", "score": 0.0, "passed": false, "details": null, "error": "judge_parse_failed"})
        );

        let tool = serde_json::to_value(BenchEvent::now(ToolEvent {
            prompt_id: "1".to_string(),
            tool_name: "math_eval".to_string(),
            tool_args: json!({"expression": "2+2"}),
            tool_result: Some(json!({"result": 4})),
            error: None,
        }))
        .unwrap();
        assert_eq!(tool["event_type"], "tool");
        assert_eq!(tool["error"], Value::Null);
    }

    #[test]
    fn test_unknown_fields_are_ignored() {
        let line = r#"{"timestamp":"2024-01-01T00:00:00Z","event_type":"summary","total_prompts":1,"passed":1,"failed":0,"average_score":1.0,"total_duration_ms":3.0,"errors":[],"run_id":"extra"}"#;
        let event: BenchEvent = serde_json::from_str(line).unwrap();
        assert_eq!(event.event_type(), "summary");
        assert_eq!(event.prompt_id(), None);
    }

    #[test]
    fn test_error_entry() {
        assert_eq!(SummaryEvent::error_entry("1", None, None), None);
        assert_eq!(
            SummaryEvent::error_entry("1", Some("timed out after 5000ms"), Some("timed out after 5000ms")).as_deref(),
            Some("1: timed out after 5000ms")
        );
        assert_eq!(
            SummaryEvent::error_entry("2", Some("transport error: reset"), Some("judge_parse_failed")).as_deref(),
            Some("2: transport error: reset; judge_parse_failed")
        );
        assert_eq!(
            SummaryEvent::error_entry("3", None, Some("judge_parse_failed")).as_deref(),
            Some("3: judge_parse_failed")
        );
    }
}
