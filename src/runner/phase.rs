//! @ai:module:intent Per-prompt lifecycle states and run outcomes
//! @ai:module:layer domain
//! @ai:module:public_api PromptPhase, RunOutcome

use crate::events::SummaryEvent;

/// @ai:intent Lifecycle of one prompt; transitions only move forward
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord)]
pub enum PromptPhase {
    Pending,
    Answering,
    ToolUse,
    Evaluating,
    Done,
}

impl PromptPhase {
    pub fn as_str(&self) -> &'static str {
        match self {
            PromptPhase::Pending => "pending",
            PromptPhase::Answering => "answering",
            PromptPhase::ToolUse => "tool_use",
            PromptPhase::Evaluating => "evaluating",
            PromptPhase::Done => "done",
        }
    }

    /// @ai:intent Move to `next`, logging the transition
    /// @ai:pre next > self, except ToolUse -> ToolUse
    /// @ai:effects log
    pub fn advance(self, next: PromptPhase, prompt_id: &str) -> PromptPhase {
        debug_assert!(
            next > self || (self == PromptPhase::ToolUse && next == PromptPhase::ToolUse),
            "illegal transition {} -> {}",
            self.as_str(),
            next.as_str()
        );
        tracing::debug!(prompt_id, from = self.as_str(), to = next.as_str(), "prompt phase");
        next
    }
}

/// @ai:intent How a run ended
#[derive(Debug, Clone, PartialEq)]
pub enum RunOutcome {
    /// Every prompt processed and the summary emitted
    Completed(SummaryEvent),
    /// The consumer went away; no summary was emitted
    Aborted { processed: usize },
}

impl RunOutcome {
    pub fn summary(&self) -> Option<&SummaryEvent> {
        match self {
            RunOutcome::Completed(summary) => Some(summary),
            RunOutcome::Aborted { .. } => None,
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_phases_are_ordered() {
        let order = [
            PromptPhase::Pending,
            PromptPhase::Answering,
            PromptPhase::ToolUse,
            PromptPhase::Evaluating,
            PromptPhase::Done,
        ];
        assert!(order.windows(2).all(|w| w[0] < w[1]));
    }

    #[test]
    fn test_advance_skipping_tool_use() {
        let phase = PromptPhase::Pending
            .advance(PromptPhase::Answering, "p")
            .advance(PromptPhase::Evaluating, "p")
            .advance(PromptPhase::Done, "p");
        assert_eq!(phase, PromptPhase::Done);
    }
}
