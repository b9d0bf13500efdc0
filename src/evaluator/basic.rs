//! @ai:module:intent Heuristic scoring against an optional expected answer
//! @ai:module:layer domain
//! @ai:module:public_api score_basic, normalize
//! @ai:module:stateless true

use crate::evaluator::Verdict;
use serde_json::{json, Map, Value};
use std::collections::BTreeSet;

/// Score for a non-empty answer when there is nothing to compare against
pub const BASELINE_SCORE: f64 = 0.6;

/// Ceiling for answers that only partially overlap the expected answer
const PARTIAL_CEILING: f64 = 0.9;

/// @ai:intent Lowercase and collapse runs of whitespace
/// @ai:effects pure
pub fn normalize(text: &str) -> String {
    text.split_whitespace()
        .collect::<Vec<_>>()
        .join(" ")
        .to_lowercase()
}

fn tokens(text: &str) -> BTreeSet<String> {
    text.split(|c: char| !c.is_alphanumeric())
        .filter(|t| !t.is_empty())
        .map(str::to_lowercase)
        .collect()
}

/// @ai:intent Exact or substring match scores 1.0, otherwise keyword overlap scaled to 0.9
/// @ai:post 0.0 <= score <= 1.0
/// @ai:effects pure
pub fn score_basic(response: &str, expected: Option<&str>) -> Verdict {
    let answer = normalize(response);
    let mut details = Map::new();
    details.insert("length".to_string(), json!(response.chars().count()));

    if answer.is_empty() {
        details.insert("match".to_string(), json!("empty"));
        return Verdict::new(0.0, details);
    }

    let expected = expected.map(normalize).filter(|e| !e.is_empty());
    let Some(expected) = expected else {
        details.insert("match".to_string(), json!("no_expected_answer"));
        return Verdict::new(BASELINE_SCORE, details);
    };

    if answer == expected {
        details.insert("match".to_string(), json!("exact"));
        return Verdict::new(1.0, details);
    }
    if answer.contains(&expected) {
        details.insert("match".to_string(), json!("substring"));
        return Verdict::new(1.0, details);
    }

    let wanted = tokens(&expected);
    let found = tokens(&answer);
    let overlap = if wanted.is_empty() {
        0.0
    } else {
        wanted.intersection(&found).count() as f64 / wanted.len() as f64
    };

    details.insert("match".to_string(), json!("partial"));
    details.insert("overlap".to_string(), Value::from(overlap));
    Verdict::new(PARTIAL_CEILING * overlap, details)
}
