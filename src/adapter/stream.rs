//! @ai:module:intent Line framing for streamed provider responses (SSE and NDJSON)
//! @ai:module:layer infrastructure
//! @ai:module:public_api response_lines, sse_data

use crate::error::AdapterError;
use futures::{Stream, StreamExt};
use tokio::io::AsyncBufReadExt;
use tokio_stream::wrappers::LinesStream;
use tokio_util::io::StreamReader;

/// @ai:intent Split a streaming HTTP body into text lines
/// @ai:effects network
pub fn response_lines(
    response: reqwest::Response,
) -> impl Stream<Item = Result<String, AdapterError>> + Send + 'static {
    let bytes = response
        .bytes_stream()
        .map(|chunk| chunk.map_err(std::io::Error::other));

    LinesStream::new(StreamReader::new(bytes).lines())
        .map(|line| line.map_err(|e| AdapterError::Transport(format!("stream interrupted: {e}"))))
}

/// @ai:intent Payload of an SSE `data:` line, if the line is one
/// @ai:effects pure
pub fn sse_data(line: &str) -> Option<&str> {
    line.strip_prefix("data:").map(str::trim)
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_sse_data() {
        assert_eq!(sse_data("data: {\"a\":1}"), Some("{\"a\":1}"));
        assert_eq!(sse_data("data:[DONE]"), Some("[DONE]"));
        assert_eq!(sse_data("event: message_start"), None);
        assert_eq!(sse_data(""), None);
    }
}
