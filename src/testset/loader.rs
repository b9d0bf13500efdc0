//! @ai:module:intent NDJSON test-set import and export
//! @ai:module:layer infrastructure
//! @ai:module:public_api TestsetLoader, TestsetLoaderTrait, parse_testset, write_testset
//! @ai:module:stateless true

use crate::testset::filter::PromptFilter;
use crate::testset::prompt::PromptItem;
use anyhow::{Context, Result};
use std::io::Write;
use std::path::Path;
use walkdir::WalkDir;

/// @ai:intent Trait for loading test sets
pub trait TestsetLoaderTrait: Send + Sync {
    /// @ai:intent Load one NDJSON test-set file
    fn load_file(&self, path: &Path) -> Result<Vec<PromptItem>>;

    /// @ai:intent Load every `.jsonl` file under a directory
    fn load_dir(&self, dir: &Path) -> Result<Vec<PromptItem>>;

    /// @ai:intent Load a file or directory and keep prompts matching the filter
    fn load_filtered(&self, path: &Path, filter: &PromptFilter) -> Result<Vec<PromptItem>>;
}

/// @ai:intent Loads prompts from newline-delimited JSON
/// @ai:effects pure (stateless)
pub struct TestsetLoader;

impl TestsetLoader {
    pub fn new() -> Self {
        Self
    }

    /// @ai:intent Find all test-set files in a directory, sorted for stable prompt order
    /// @ai:effects fs:read
    fn find_testset_files(dir: &Path) -> Vec<std::path::PathBuf> {
        let mut files: Vec<_> = WalkDir::new(dir)
            .into_iter()
            .filter_map(|e| e.ok())
            .filter(|e| {
                e.path()
                    .extension()
                    .map(|ext| ext == "jsonl" || ext == "ndjson")
                    .unwrap_or(false)
            })
            .map(|e| e.path().to_path_buf())
            .collect();
        files.sort();
        files
    }
}

impl Default for TestsetLoader {
    fn default() -> Self {
        Self::new()
    }
}

impl TestsetLoaderTrait for TestsetLoader {
    /// @ai:effects fs:read
    fn load_file(&self, path: &Path) -> Result<Vec<PromptItem>> {
        let content = std::fs::read_to_string(path)
            .with_context(|| format!("Failed to read test set: {}", path.display()))?;

        parse_testset(&content)
            .with_context(|| format!("Failed to parse test set: {}", path.display()))
    }

    /// @ai:effects fs:read
    fn load_dir(&self, dir: &Path) -> Result<Vec<PromptItem>> {
        let mut prompts = Vec::new();

        for path in Self::find_testset_files(dir) {
            prompts.extend(self.load_file(&path)?);
        }

        Ok(prompts)
    }

    /// @ai:effects fs:read
    fn load_filtered(&self, path: &Path, filter: &PromptFilter) -> Result<Vec<PromptItem>> {
        let prompts = if path.is_dir() {
            self.load_dir(path)?
        } else {
            self.load_file(path)?
        };

        Ok(prompts.into_iter().filter(|p| filter.matches(p)).collect())
    }
}

/// @ai:intent Parse NDJSON text into prompts; blank lines are skipped
/// @ai:effects pure
pub fn parse_testset(content: &str) -> Result<Vec<PromptItem>> {
    content
        .lines()
        .enumerate()
        .filter(|(_, line)| !line.trim().is_empty())
        .map(|(index, line)| {
            serde_json::from_str::<PromptItem>(line)
                .with_context(|| format!("invalid prompt on line {}", index + 1))
        })
        .collect()
}

/// @ai:intent Write prompts as compact NDJSON, one prompt per line
/// @ai:effects io
pub fn write_testset<W: Write>(writer: &mut W, prompts: &[PromptItem]) -> Result<()> {
    for prompt in prompts {
        serde_json::to_writer(&mut *writer, prompt)?;
        writer.write_all(b"\n")?;
    }
    writer.flush()?;
    Ok(())
}
