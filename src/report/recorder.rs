//! @ai:module:intent Builds an export document by observing a run's event stream
//! @ai:module:layer application
//! @ai:module:public_api RunRecorder
//! @ai:module:stateless false

use crate::evaluator::EvalResult;
use crate::events::{AnswerEvent, BenchEvent, EventPayload, SummaryEvent};
use crate::report::aggregator::StatsAggregator;
use crate::report::export::{ExportConfig, ExportDocument, ExportMetadata, PromptResult, ToolTrace};
use crate::testset::BenchmarkRequest;
use chrono::Utc;
use std::collections::HashMap;

/// Answer seen, evaluation not yet
#[derive(Debug)]
struct PendingPrompt {
    answer: AnswerEvent,
    tool_calls: Vec<ToolTrace>,
}

impl PendingPrompt {
    fn complete(self, evaluation: EvalResult) -> PromptResult {
        PromptResult {
            prompt_id: self.answer.prompt_id,
            prompt_hash: Some(self.answer.prompt_hash),
            response: self.answer.content,
            latency_ms: self.answer.latency_ms,
            tokens_used: self.answer.tokens_used,
            tool_calls: self.tool_calls,
            evaluation,
        }
    }
}

/// @ai:intent Accumulates events for one request into an `ExportDocument`
pub struct RunRecorder {
    request: BenchmarkRequest,
    pending: HashMap<String, PendingPrompt>,
    results: Vec<PromptResult>,
    summary: Option<SummaryEvent>,
}

impl RunRecorder {
    pub fn new(request: BenchmarkRequest) -> Self {
        Self {
            request,
            pending: HashMap::new(),
            results: Vec::new(),
            summary: None,
        }
    }

    /// @ai:intent Fold one event into the recording
    /// @ai:pre events arrive in stream order
    /// @ai:effects pure
    pub fn record(&mut self, event: &BenchEvent) {
        match &event.payload {
            EventPayload::Answer(answer) => {
                self.pending.insert(
                    answer.prompt_id.clone(),
                    PendingPrompt {
                        answer: answer.clone(),
                        tool_calls: Vec::new(),
                    },
                );
            }
            EventPayload::Tool(tool) => match self.pending.get_mut(&tool.prompt_id) {
                Some(pending) => pending.tool_calls.push(ToolTrace::from(tool.clone())),
                None => tracing::warn!(prompt_id = %tool.prompt_id, "tool event without answer"),
            },
            EventPayload::Eval(eval) => match self.pending.remove(&eval.prompt_id) {
                Some(pending) => self.results.push(pending.complete(eval.result.clone())),
                None => tracing::warn!(prompt_id = %eval.prompt_id, "eval event without answer"),
            },
            EventPayload::Summary(summary) => self.summary = Some(summary.clone()),
        }
    }

    pub fn processed(&self) -> usize {
        self.results.len()
    }

    /// @ai:intent Close the recording; an aborted run keeps only fully evaluated prompts
    /// @ai:post metadata.completed iff a summary event was recorded
    /// @ai:effects time
    pub fn finish(self) -> ExportDocument {
        let by_category = StatsAggregator::by_category(&self.request.prompts, &self.results);
        let by_difficulty = StatsAggregator::by_difficulty(&self.request.prompts, &self.results);
        let completed = self.summary.is_some();

        let mut document = ExportDocument {
            metadata: ExportMetadata {
                name: self.request.name.clone(),
                exported_at: Utc::now(),
                completed,
                total_prompts: 0,
                passed: 0,
                failed: 0,
                average_score: 0.0,
                total_duration_ms: 0.0,
                errors: Vec::new(),
                by_category,
                by_difficulty,
            },
            config: ExportConfig::from(&self.request),
            prompts: self.request.prompts,
            results: self.results,
        };

        let summary = match self.summary {
            Some(summary) => summary,
            None => document.summary(),
        };
        document.metadata.total_prompts = summary.total_prompts;
        document.metadata.passed = summary.passed;
        document.metadata.failed = summary.failed;
        document.metadata.average_score = summary.average_score;
        document.metadata.total_duration_ms = summary.total_duration_ms;
        document.metadata.errors = summary.errors;

        document
    }
}
