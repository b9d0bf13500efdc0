//! @ai:module:intent Self-contained export document for a finished (or aborted) run
//! @ai:module:layer domain
//! @ai:module:public_api ExportDocument, ExportMetadata, ExportConfig, PromptResult, ToolTrace
//! @ai:module:stateless true

use crate::evaluator::EvalResult;
use crate::events::{SummaryEvent, ToolEvent};
use crate::report::aggregator::GroupStats;
use crate::testset::{BenchmarkRequest, EvalType, PromptItem, Provider};
use crate::versioner::PromptHash;
use anyhow::{Context, Result};
use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use serde_json::{Map, Value};
use std::path::Path;

/// @ai:intent Run statistics, as reported by the summary event when there was one
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ExportMetadata {
    pub name: String,
    pub exported_at: DateTime<Utc>,
    /// False when the run was aborted before its summary
    pub completed: bool,
    pub total_prompts: usize,
    pub passed: usize,
    pub failed: usize,
    pub average_score: f64,
    pub total_duration_ms: f64,
    #[serde(default)]
    pub errors: Vec<String>,
    #[serde(default)]
    pub by_category: Vec<GroupStats>,
    #[serde(default)]
    pub by_difficulty: Vec<GroupStats>,
}

/// @ai:intent Provider and model settings the run used
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ExportConfig {
    pub subject_provider: Provider,
    pub subject_model: String,
    pub evaluator_provider: Provider,
    pub evaluator_model: String,
    pub eval_type: EvalType,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub eval_config: Option<Map<String, Value>>,
    #[serde(default)]
    pub enable_tools: bool,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub system_prompt: Option<String>,
}

impl From<&BenchmarkRequest> for ExportConfig {
    fn from(request: &BenchmarkRequest) -> Self {
        Self {
            subject_provider: request.subject_provider,
            subject_model: request.subject_model.clone(),
            evaluator_provider: request.evaluator_provider(),
            evaluator_model: request.evaluator_model().to_string(),
            eval_type: request.eval_type,
            eval_config: request.eval_config.clone(),
            enable_tools: request.enable_tools,
            system_prompt: request.system_prompt.clone(),
        }
    }
}

/// @ai:intent One tool call made while answering a prompt
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ToolTrace {
    pub tool_name: String,
    pub tool_args: Value,
    #[serde(default)]
    pub tool_result: Option<Value>,
    #[serde(default)]
    pub error: Option<String>,
}

impl From<ToolEvent> for ToolTrace {
    fn from(event: ToolEvent) -> Self {
        Self {
            tool_name: event.tool_name,
            tool_args: event.tool_args,
            tool_result: event.tool_result,
            error: event.error,
        }
    }
}

/// @ai:intent Per-prompt outcome: the answer, its tool calls and its evaluation
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct PromptResult {
    pub prompt_id: String,
    #[serde(default)]
    pub prompt_hash: Option<PromptHash>,
    pub response: String,
    pub latency_ms: f64,
    #[serde(default)]
    pub tokens_used: Option<u32>,
    #[serde(default, skip_serializing_if = "Vec::is_empty")]
    pub tool_calls: Vec<ToolTrace>,
    pub evaluation: EvalResult,
}

impl PromptResult {
    /// Adapter failure that still left a partial answer to score
    fn stream_error(&self) -> Option<&str> {
        self.evaluation
            .details
            .as_ref()
            .and_then(|d| d.get("stream_error"))
            .and_then(Value::as_str)
    }

    /// @ai:intent The summary `errors` entry this result contributes, if any
    /// @ai:effects pure
    pub fn error_entry(&self) -> Option<String> {
        SummaryEvent::error_entry(
            &self.prompt_id,
            self.stream_error(),
            self.evaluation.error.as_deref(),
        )
    }
}

/// @ai:intent Export file: `metadata`, `config`, `prompts`, `results`
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ExportDocument {
    pub metadata: ExportMetadata,
    pub config: ExportConfig,
    pub prompts: Vec<PromptItem>,
    pub results: Vec<PromptResult>,
}

impl ExportDocument {
    /// @ai:intent Rebuild a summary-equivalent view from `results` alone
    /// @ai:post total_prompts == results.len() and passed + failed == total_prompts
    /// @ai:effects pure
    pub fn summary(&self) -> SummaryEvent {
        let total_prompts = self.results.len();
        let passed = self.results.iter().filter(|r| r.evaluation.passed).count();
        let average_score = if total_prompts == 0 {
            0.0
        } else {
            self.results.iter().map(|r| r.evaluation.score).sum::<f64>() / total_prompts as f64
        };

        SummaryEvent {
            total_prompts,
            passed,
            failed: total_prompts - passed,
            average_score,
            total_duration_ms: self.metadata.total_duration_ms,
            errors: self.results.iter().filter_map(PromptResult::error_entry).collect(),
        }
    }

    /// @ai:intent Write the document as pretty-printed JSON
    /// @ai:effects fs:write
    pub fn save(&self, path: &Path) -> Result<()> {
        if let Some(parent) = path.parent().filter(|p| !p.as_os_str().is_empty()) {
            std::fs::create_dir_all(parent)
                .with_context(|| format!("Failed to create directory {}", parent.display()))?;
        }
        let json = serde_json::to_string_pretty(self)?;
        std::fs::write(path, json)
            .with_context(|| format!("Failed to write export to {}", path.display()))?;
        tracing::info!("Export written to {}", path.display());
        Ok(())
    }

    /// @ai:intent Read an export document from disk
    /// @ai:effects fs:read
    pub fn load(path: &Path) -> Result<Self> {
        let content = std::fs::read_to_string(path)
            .with_context(|| format!("Failed to read export {}", path.display()))?;
        serde_json::from_str(&content)
            .with_context(|| format!("Failed to parse export {}", path.display()))
    }
}
