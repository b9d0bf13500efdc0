//! @ai:module:intent Prompt definitions for benchmark test sets
//! @ai:module:layer domain
//! @ai:module:public_api PromptItem, Difficulty
//! @ai:module:stateless true

use serde::{Deserialize, Serialize};
use serde_json::{Map, Value};

/// @ai:intent Difficulty level of a prompt, selecting the pass threshold
/// @ai:effects pure
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum Difficulty {
    Easy,
    Medium,
    Hard,
}

impl Difficulty {
    /// @ai:intent Convert difficulty to string representation
    /// @ai:effects pure
    pub fn as_str(&self) -> &'static str {
        match self {
            Difficulty::Easy => "easy",
            Difficulty::Medium => "medium",
            Difficulty::Hard => "hard",
        }
    }

    /// @ai:intent Parse a free-form difficulty label (case-insensitive)
    /// @ai:effects pure
    pub fn parse(label: &str) -> Option<Self> {
        match label.trim().to_ascii_lowercase().as_str() {
            "easy" => Some(Difficulty::Easy),
            "medium" => Some(Difficulty::Medium),
            "hard" => Some(Difficulty::Hard),
            _ => None,
        }
    }

    /// @ai:intent Minimum score for a pass at this difficulty
    /// @ai:effects pure
    pub fn pass_threshold(difficulty: Option<Difficulty>) -> f64 {
        match difficulty {
            Some(Difficulty::Hard) => 0.4,
            Some(Difficulty::Medium) => 0.5,
            Some(Difficulty::Easy) | None => 0.6,
        }
    }
}

impl std::fmt::Display for Difficulty {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "{}", self.as_str())
    }
}

/// @ai:intent A single prompt submitted for benchmarking; immutable once submitted
/// @ai:effects pure
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct PromptItem {
    pub id: String,
    pub content: String,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub expected_answer: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub category: Option<String>,
    /// Kept verbatim so exported test sets re-import byte-for-byte
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub difficulty: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub metadata: Option<Map<String, Value>>,
}

impl PromptItem {
    /// @ai:intent Create a prompt with only the required fields
    /// @ai:effects pure
    pub fn new(id: impl Into<String>, content: impl Into<String>) -> Self {
        Self {
            id: id.into(),
            content: content.into(),
            expected_answer: None,
            category: None,
            difficulty: None,
            metadata: None,
        }
    }

    pub fn with_expected_answer(mut self, expected: impl Into<String>) -> Self {
        self.expected_answer = Some(expected.into());
        self
    }

    pub fn with_difficulty(mut self, difficulty: impl Into<String>) -> Self {
        self.difficulty = Some(difficulty.into());
        self
    }

    pub fn with_category(mut self, category: impl Into<String>) -> Self {
        self.category = Some(category.into());
        self
    }

    /// @ai:intent Parsed difficulty; unknown labels count as unset
    /// @ai:effects pure
    pub fn difficulty_level(&self) -> Option<Difficulty> {
        self.difficulty.as_deref().and_then(Difficulty::parse)
    }

    /// @ai:intent Expected answer, falling back to `metadata.expected_answer`
    /// @ai:effects pure
    pub fn expected(&self) -> Option<&str> {
        self.expected_answer.as_deref().or_else(|| {
            self.metadata
                .as_ref()
                .and_then(|m| m.get("expected_answer"))
                .and_then(Value::as_str)
        })
    }

    /// @ai:intent Whether the prompt's own metadata asks for tool use
    /// @ai:effects pure
    pub fn wants_tools(&self) -> bool {
        self.metadata
            .as_ref()
            .and_then(|m| m.get("enable_tools"))
            .and_then(Value::as_bool)
            .unwrap_or(false)
    }
}
