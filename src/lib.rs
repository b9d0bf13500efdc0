//! @ai:module:intent LLM benchmark pipeline library
//! @ai:module:layer application
//! @ai:module:public_api config, testset, adapter, tools, repair, evaluator, events, runner, report, server

pub mod adapter;
pub mod config;
pub mod error;
pub mod evaluator;
pub mod events;
pub mod repair;
pub mod report;
pub mod runner;
pub mod server;
pub mod testset;
pub mod tools;
pub mod versioner;

pub use adapter::{ModelAdapter, ModelInfo, ScriptedAdapter};
pub use config::{BenchConfig, ProviderCredentials, RunSettings};
pub use error::{AdapterError, EvalError, GenerationError, RepairError, RequestError, StreamError, ToolError};
pub use evaluator::{EvalResult, Evaluator};
pub use events::{BenchEvent, EventEncoder, EventSink};
pub use repair::JsonRepairer;
pub use report::{ExportDocument, RunRecorder};
pub use runner::{BenchmarkRunner, RunOutcome};
pub use testset::{generate_testset, BenchmarkRequest, PromptItem, TestsetGenerationRequest, TestsetLoader};
pub use versioner::{hash_prompt, PromptHash};
