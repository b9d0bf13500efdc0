//! @ai:module:intent NDJSON encoding of the event stream
//! @ai:module:layer infrastructure
//! @ai:module:public_api EventEncoder

use crate::events::BenchEvent;
use std::io::Write;

/// @ai:intent Serializes events one JSON object per line, in emission order
pub struct EventEncoder;

impl EventEncoder {
    /// @ai:intent Encode one event as a newline-terminated line
    /// @ai:post result ends with exactly one '\n' and contains no other newline
    /// @ai:effects pure
    pub fn encode(event: &BenchEvent) -> serde_json::Result<String> {
        let mut line = serde_json::to_string(event)?;
        line.push('\n');
        Ok(line)
    }

    /// @ai:intent Write one event line and flush so consumers see it immediately
    /// @ai:effects io
    pub fn write<W: Write>(writer: &mut W, event: &BenchEvent) -> anyhow::Result<()> {
        writer.write_all(Self::encode(event)?.as_bytes())?;
        writer.flush()?;
        Ok(())
    }

    /// @ai:intent Parse an NDJSON document back into events, skipping blank lines
    /// @ai:effects pure
    pub fn decode_all(input: &str) -> anyhow::Result<Vec<BenchEvent>> {
        input
            .lines()
            .enumerate()
            .filter(|(_, line)| !line.trim().is_empty())
            .map(|(i, line)| {
                serde_json::from_str(line)
                    .map_err(|e| anyhow::anyhow!("invalid event on line {}: {e}", i + 1))
            })
            .collect()
    }
}
