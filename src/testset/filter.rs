//! @ai:module:intent Prompt selection by category, difficulty and id
//! @ai:module:layer domain
//! @ai:module:public_api PromptFilter
//! @ai:module:stateless true

use crate::testset::prompt::PromptItem;
use serde::{Deserialize, Serialize};

/// @ai:intent Filter configuration for selecting prompts
/// @ai:effects pure
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct PromptFilter {
    pub categories: Option<Vec<String>>,
    pub difficulties: Option<Vec<String>>,
    pub prompt_ids: Option<Vec<String>>,
}

impl PromptFilter {
    /// @ai:intent Build a filter from comma-separated CLI values
    /// @ai:effects pure
    pub fn from_lists(
        categories: Option<String>,
        difficulties: Option<String>,
        ids: Option<String>,
    ) -> Self {
        let split = |s: String| -> Vec<String> {
            s.split(',')
                .map(|v| v.trim().to_string())
                .filter(|v| !v.is_empty())
                .collect()
        };

        Self {
            categories: categories.map(split),
            difficulties: difficulties.map(split),
            prompt_ids: ids.map(split),
        }
    }

    /// @ai:intent Check if the filter matches a prompt; unset criteria match everything
    /// @ai:effects pure
    pub fn matches(&self, prompt: &PromptItem) -> bool {
        let category_match = self
            .categories
            .as_ref()
            .map(|c| {
                prompt
                    .category
                    .as_deref()
                    .map(|cat| c.iter().any(|want| want.eq_ignore_ascii_case(cat)))
                    .unwrap_or(false)
            })
            .unwrap_or(true);

        let difficulty_match = self
            .difficulties
            .as_ref()
            .map(|d| {
                prompt
                    .difficulty
                    .as_deref()
                    .map(|diff| d.iter().any(|want| want.eq_ignore_ascii_case(diff)))
                    .unwrap_or(false)
            })
            .unwrap_or(true);

        let id_match = self
            .prompt_ids
            .as_ref()
            .map(|ids| ids.iter().any(|id| id == &prompt.id))
            .unwrap_or(true);

        category_match && difficulty_match && id_match
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_filter_matches_all_when_empty() {
        let filter = PromptFilter::default();
        assert!(filter.matches(&PromptItem::new("1", "q")));
    }

    #[test]
    fn test_filter_matches_specific_category() {
        let filter = PromptFilter::from_lists(Some("math, logic".to_string()), None, None);
        assert!(filter.matches(&PromptItem::new("1", "q").with_category("Math")));
        assert!(!filter.matches(&PromptItem::new("2", "q").with_category("geography")));
        assert!(!filter.matches(&PromptItem::new("3", "q")));
    }

    #[test]
    fn test_filter_matches_multiple_criteria() {
        let filter = PromptFilter {
            difficulties: Some(vec!["hard".to_string()]),
            prompt_ids: Some(vec!["7".to_string()]),
            ..Default::default()
        };
        assert!(filter.matches(&PromptItem::new("7", "q").with_difficulty("hard")));
        assert!(!filter.matches(&PromptItem::new("8", "q").with_difficulty("hard")));
        assert!(!filter.matches(&PromptItem::new("7", "q").with_difficulty("easy")));
    }
}
