//! @ai:module:intent Run recording, export documents and breakdown reports
//! @ai:module:layer infrastructure
//! @ai:module:public_api ExportDocument, RunRecorder, StatsAggregator, MarkdownReport

pub mod aggregator;
pub mod export;
pub mod markdown_report;
pub mod recorder;

pub use aggregator::{GroupStats, StatsAggregator};
pub use export::{ExportConfig, ExportDocument, ExportMetadata, PromptResult, ToolTrace};
pub use markdown_report::MarkdownReport;
pub use recorder::RunRecorder;
