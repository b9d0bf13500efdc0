//! @ai:module:intent Event model, NDJSON encoding and the run's output channel
//! @ai:module:layer domain
//! @ai:module:public_api BenchEvent, EventPayload, EventEncoder, EventSink

pub mod encoder;
pub mod sink;
pub mod types;

pub use encoder::EventEncoder;
pub use sink::EventSink;
pub use types::{AnswerEvent, BenchEvent, EvalEvent, EventPayload, SummaryEvent, ToolEvent};
