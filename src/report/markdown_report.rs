//! @ai:module:intent Markdown rendering of an export document
//! @ai:module:layer infrastructure
//! @ai:module:public_api MarkdownReport
//! @ai:module:stateless true

use crate::report::aggregator::GroupStats;
use crate::report::export::ExportDocument;
use anyhow::Result;
use std::fmt;
use std::path::Path;

/// @ai:intent Displays an export as a Markdown report
pub struct MarkdownReport<'a>(pub &'a ExportDocument);

impl MarkdownReport<'_> {
    /// @ai:intent Write the report to a file
    /// @ai:effects fs:write
    pub fn write_to(&self, output_path: &Path) -> Result<()> {
        std::fs::write(output_path, self.to_string())?;
        Ok(())
    }

    fn group_table(f: &mut fmt::Formatter<'_>, title: &str, groups: &[GroupStats]) -> fmt::Result {
        if groups.is_empty() {
            return Ok(());
        }

        writeln!(f, "## Results by {title}")?;
        writeln!(f)?;
        writeln!(f, "| {title} | Prompts | Passed | Pass Rate | Avg Score | Avg Latency |")?;
        writeln!(f, "|---|---|---|---|---|---|")?;
        for group in groups {
            writeln!(
                f,
                "| {} | {} | {} | {:.1}% | {:.3} | {:.0}ms |",
                group.group,
                group.prompt_count,
                group.passed,
                group.pass_rate,
                group.average_score,
                group.average_latency_ms
            )?;
        }
        writeln!(f)
    }
}

impl fmt::Display for MarkdownReport<'_> {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let doc = self.0;
        let meta = &doc.metadata;

        writeln!(f, "# Benchmark Results: {}", meta.name)?;
        writeln!(f)?;
        writeln!(f, "**Date:** {}", meta.exported_at.to_rfc3339())?;
        writeln!(
            f,
            "**Model:** {} ({})",
            doc.config.subject_model, doc.config.subject_provider
        )?;
        writeln!(
            f,
            "**Evaluation:** {} via {} ({})",
            doc.config.eval_type, doc.config.evaluator_model, doc.config.evaluator_provider
        )?;
        if !meta.completed {
            writeln!(f, "**Status:** aborted after {} prompt(s)", meta.total_prompts)?;
        }
        writeln!(f)?;

        writeln!(f, "## Overall Results")?;
        writeln!(f)?;
        writeln!(f, "| Metric | Value |")?;
        writeln!(f, "|--------|-------|")?;
        writeln!(f, "| Prompts | {} |", meta.total_prompts)?;
        writeln!(f, "| Passed | {} |", meta.passed)?;
        writeln!(f, "| Failed | {} |", meta.failed)?;
        writeln!(f, "| Average Score | {:.3} |", meta.average_score)?;
        writeln!(f, "| Duration | {:.1}s |", meta.total_duration_ms / 1000.0)?;
        writeln!(f)?;

        Self::group_table(f, "Category", &meta.by_category)?;
        Self::group_table(f, "Difficulty", &meta.by_difficulty)?;

        if !meta.errors.is_empty() {
            writeln!(f, "## Errors")?;
            writeln!(f)?;
            for error in &meta.errors {
                writeln!(f, "- {error}")?;
            }
            writeln!(f)?;
        }

        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::report::export::{ExportConfig, ExportMetadata};
    use crate::testset::{BenchmarkRequest, Provider};
    use chrono::Utc;
    use tempfile::TempDir;

    fn document(errors: Vec<String>) -> ExportDocument {
        let request = BenchmarkRequest::new("nightly", Provider::DeepSeek, "deepseek-chat", vec![]);
        ExportDocument {
            metadata: ExportMetadata {
                name: "nightly".to_string(),
                exported_at: Utc::now(),
                completed: true,
                total_prompts: 2,
                passed: 1,
                failed: 1,
                average_score: 0.55,
                total_duration_ms: 2500.0,
                errors,
                by_category: vec![GroupStats {
                    group: "math".to_string(),
                    prompt_count: 2,
                    passed: 1,
                    failed: 1,
                    pass_rate: 50.0,
                    average_score: 0.55,
                    average_latency_ms: 120.0,
                }],
                by_difficulty: Vec::new(),
            },
            config: ExportConfig::from(&request),
            prompts: Vec::new(),
            results: Vec::new(),
        }
    }

    #[test]
    fn test_render_sections() {
        let doc = document(vec!["2: timed out after 60000ms".to_string()]);
        let md = MarkdownReport(&doc).to_string();

        assert!(md.starts_with("# Benchmark Results: nightly"));
        assert!(md.contains("**Model:** deepseek-chat (deepseek)"));
        assert!(md.contains("| Average Score | 0.550 |"));
        assert!(md.contains("## Results by Category"));
        assert!(md.contains("| math | 2 | 1 | 50.0% | 0.550 | 120ms |"));
        assert!(!md.contains("## Results by Difficulty"));
        assert!(md.contains("- 2: timed out after 60000ms"));
    }

    #[test]
    fn test_write_to_file() {
        let temp = TempDir::new().unwrap();
        let output = temp.path().join("results.md");

        MarkdownReport(&document(Vec::new())).write_to(&output).unwrap();

        let content = std::fs::read_to_string(&output).unwrap();
        assert!(content.contains("## Overall Results"));
        assert!(!content.contains("## Errors"));
    }
}
