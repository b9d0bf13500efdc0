//! @ai:module:intent Benchmark run orchestration
//! @ai:module:layer application
//! @ai:module:public_api BenchmarkRunner, PromptPhase, RunOutcome

pub mod executor;
pub mod phase;

pub use executor::BenchmarkRunner;
pub use phase::{PromptPhase, RunOutcome};
