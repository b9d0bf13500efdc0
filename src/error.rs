//! @ai:module:intent Error taxonomy for the benchmark pipeline
//! @ai:module:layer domain
//! @ai:module:public_api RequestError, AdapterError, RepairError, EvalError, ToolError, StreamError, GenerationError
//! @ai:module:stateless true

use std::time::Duration;
use thiserror::Error;

/// @ai:intent Malformed benchmark request, rejected before any event is emitted
#[derive(Error, Debug, Clone, PartialEq, Eq)]
pub enum RequestError {
    #[error("benchmark request contains no prompts")]
    EmptyPrompts,

    #[error("prompt at index {index} has an empty id")]
    EmptyPromptId { index: usize },

    #[error("duplicate prompt id: {0}")]
    DuplicatePromptId(String),

    #[error("invalid request: {0}")]
    Invalid(String),
}

/// @ai:intent Failure of a model adapter call (provider, network, deadline, credentials)
#[derive(Error, Debug, Clone, PartialEq, Eq)]
pub enum AdapterError {
    #[error("provider error ({status}): {message}")]
    Provider { status: u16, message: String },

    #[error("timed out after {after_ms}ms")]
    Timeout { after_ms: u64 },

    #[error("authentication failed: {0}")]
    Auth(String),

    #[error("transport error: {0}")]
    Transport(String),

    #[error("malformed provider response: {0}")]
    Decode(String),
}

impl AdapterError {
    /// @ai:intent Map a reqwest failure onto the adapter taxonomy
    /// @ai:effects pure
    pub fn from_reqwest(err: reqwest::Error, deadline: Duration) -> Self {
        if err.is_timeout() {
            AdapterError::Timeout {
                after_ms: deadline.as_millis() as u64,
            }
        } else if err.is_decode() {
            AdapterError::Decode(err.to_string())
        } else {
            AdapterError::Transport(err.to_string())
        }
    }

    /// @ai:intent Classify a non-2xx status, treating 401/403 as credential failures
    /// @ai:effects pure
    pub fn from_status(status: u16, message: String) -> Self {
        match status {
            401 | 403 => AdapterError::Auth(message),
            _ => AdapterError::Provider { status, message },
        }
    }
}

/// @ai:intent Structured-output recovery exhausted its retry budget
#[derive(Error, Debug, Clone, PartialEq, Eq)]
pub enum RepairError {
    #[error("could not repair JSON after {attempts} model-assisted attempt(s): {last_error}")]
    Exhausted { attempts: u32, last_error: String },
}

/// @ai:intent Evaluator strategy failure; recorded on the eval event, never fatal to the run
#[derive(Error, Debug, Clone, PartialEq)]
pub enum EvalError {
    #[error("judge_parse_failed")]
    JudgeParseFailed(#[source] RepairError),

    #[error("judge call failed: {0}")]
    JudgeCall(#[from] AdapterError),

    #[error("no judge model configured")]
    MissingJudge,

    #[error("invalid eval config: {0}")]
    InvalidConfig(String),

    #[error("evaluation timed out after {after_ms}ms")]
    Timeout { after_ms: u64 },
}

impl EvalError {
    /// @ai:intent Short reason string surfaced in `EvalResult.error` and summary errors
    /// @ai:effects pure
    pub fn reason(&self) -> String {
        match self {
            EvalError::JudgeParseFailed(_) => "judge_parse_failed".to_string(),
            other => other.to_string(),
        }
    }
}

/// @ai:intent Tool invocation failure, attached to the tool event only
#[derive(Error, Debug, Clone, PartialEq, Eq)]
pub enum ToolError {
    #[error("tool {0} not found")]
    NotFound(String),

    #[error("invalid arguments: {0}")]
    InvalidArguments(String),

    #[error("{0}")]
    Execution(String),

    #[error("tool timed out after {after_ms}ms")]
    Timeout { after_ms: u64 },
}

/// @ai:intent Model-assisted test-set generation failure
#[derive(Error, Debug, Clone, PartialEq, Eq)]
pub enum GenerationError {
    #[error("invalid generation request: {0}")]
    Invalid(String),

    #[error("no credentials configured for any generation provider")]
    NoCredentials,

    #[error("generation call failed: {0}")]
    Adapter(#[from] AdapterError),

    #[error("model produced no valid JSONL prompt lines")]
    NoValidLines,

    #[error("generated test set is malformed: {0}")]
    Malformed(String),
}

/// @ai:intent The event consumer went away; the run stops without a summary
#[derive(Error, Debug, Clone, Copy, PartialEq, Eq)]
pub enum StreamError {
    #[error("event consumer disconnected")]
    ConsumerClosed,
}
