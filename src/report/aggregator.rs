//! @ai:module:intent Pass/score breakdowns of recorded results by category and difficulty
//! @ai:module:layer application
//! @ai:module:public_api GroupStats, StatsAggregator
//! @ai:module:stateless true

use crate::report::export::PromptResult;
use crate::testset::{Difficulty, PromptItem};
use serde::{Deserialize, Serialize};
use std::collections::{BTreeMap, HashMap};

pub const UNCATEGORIZED: &str = "uncategorized";
pub const UNRATED: &str = "unrated";

/// @ai:intent Aggregate figures for one group of prompts
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct GroupStats {
    pub group: String,
    pub prompt_count: usize,
    pub passed: usize,
    pub failed: usize,
    /// Percentage, 0-100
    pub pass_rate: f64,
    pub average_score: f64,
    pub average_latency_ms: f64,
}

/// @ai:intent Groups results by prompt attributes and summarizes each group
pub struct StatsAggregator;

impl StatsAggregator {
    /// @ai:intent Summarize a set of results
    /// @ai:effects pure
    pub fn calculate(group: impl Into<String>, results: &[&PromptResult]) -> GroupStats {
        if results.is_empty() {
            return GroupStats {
                group: group.into(),
                ..GroupStats::default()
            };
        }

        let prompt_count = results.len();
        let passed = results.iter().filter(|r| r.evaluation.passed).count();

        GroupStats {
            group: group.into(),
            prompt_count,
            passed,
            failed: prompt_count - passed,
            pass_rate: (passed as f64 / prompt_count as f64) * 100.0,
            average_score: average(results.iter().map(|r| r.evaluation.score)),
            average_latency_ms: average(results.iter().map(|r| r.latency_ms)),
        }
    }

    /// @ai:intent One entry per category in name order; prompts without one fall under `uncategorized`
    /// @ai:effects pure
    pub fn by_category(prompts: &[PromptItem], results: &[PromptResult]) -> Vec<GroupStats> {
        Self::group_by(prompts, results, |p| {
            p.category
                .as_deref()
                .map(str::trim)
                .filter(|c| !c.is_empty())
                .unwrap_or(UNCATEGORIZED)
                .to_string()
        })
    }

    /// @ai:intent One entry per difficulty level present, easy to hard, then `unrated`
    /// @ai:effects pure
    pub fn by_difficulty(prompts: &[PromptItem], results: &[PromptResult]) -> Vec<GroupStats> {
        let mut stats = Self::group_by(prompts, results, |p| {
            p.difficulty_level()
                .map(|d| d.as_str().to_string())
                .unwrap_or_else(|| UNRATED.to_string())
        });
        stats.sort_by_key(|s| difficulty_rank(&s.group));
        stats
    }

    fn group_by<F>(prompts: &[PromptItem], results: &[PromptResult], key: F) -> Vec<GroupStats>
    where
        F: Fn(&PromptItem) -> String,
    {
        let prompt_map: HashMap<_, _> = prompts.iter().map(|p| (p.id.as_str(), p)).collect();

        let mut groups: BTreeMap<String, Vec<&PromptResult>> = BTreeMap::new();
        for result in results {
            let group = prompt_map
                .get(result.prompt_id.as_str())
                .map(|p| key(p))
                .unwrap_or_else(|| UNCATEGORIZED.to_string());
            groups.entry(group).or_default().push(result);
        }

        groups
            .into_iter()
            .map(|(group, members)| Self::calculate(group, &members))
            .collect()
    }
}

fn difficulty_rank(label: &str) -> usize {
    match Difficulty::parse(label) {
        Some(Difficulty::Easy) => 0,
        Some(Difficulty::Medium) => 1,
        Some(Difficulty::Hard) => 2,
        None => 3,
    }
}

/// @ai:intent Mean of an iterator of f64, zero when empty
/// @ai:effects pure
fn average<I: Iterator<Item = f64>>(iter: I) -> f64 {
    let (sum, count) = iter.fold((0.0, 0u32), |(s, c), v| (s + v, c + 1));

    if count == 0 {
        0.0
    } else {
        sum / count as f64
    }
}
