//! @ai:module:intent Test-set and request definitions
//! @ai:module:layer domain
//! @ai:module:public_api PromptItem, Difficulty, BenchmarkRequest, Provider, EvalType, TestsetLoader, PromptFilter, TestsetGenerationRequest

pub mod filter;
pub mod generate;
pub mod loader;
pub mod prompt;
pub mod request;

pub use filter::PromptFilter;
pub use generate::{extract_jsonl, generate_testset, TestsetGenerationRequest};
pub use loader::{parse_testset, write_testset, TestsetLoader, TestsetLoaderTrait};
pub use prompt::{Difficulty, PromptItem};
pub use request::{BenchmarkRequest, EvalType, Provider};
