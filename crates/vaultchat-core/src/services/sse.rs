use bytes::Bytes;
use futures::StreamExt;
use futures::stream::BoxStream;
use serde::Deserialize;
use tracing::debug;

use super::relay::RelayError;

/// One decoded unit from a streaming model response. Consumed immediately by
/// the session; never stored.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum ProviderEvent {
    /// A fragment of assistant text.
    ContentDelta(String),
    /// Explicit provider failure; terminates the stream.
    Error(String),
}

/// Raw bytes as they arrive from a response body.
pub type ByteStream = BoxStream<'static, Result<Bytes, RelayError>>;

/// Lazy, finite, non-restartable sequence of decoded provider events.
pub type EventStream = BoxStream<'static, Result<ProviderEvent, RelayError>>;

const DATA_PREFIX: &str = "data:";
const DONE_SENTINEL: &str = "[DONE]";

/// Line-buffering framer that tolerates event lines split across chunks.
///
/// Bytes accumulate until a `\n` completes a line, so a multi-byte UTF-8
/// character split across two chunks is never decoded until its line is
/// whole (`\n` cannot occur inside a multi-byte sequence).
#[derive(Debug, Default)]
struct EventLineBuffer {
    buffer: Vec<u8>,
}

impl EventLineBuffer {
    fn new() -> Self {
        Self::default()
    }

    /// Feed one chunk, returning every line it completes. The trailing
    /// partial segment stays buffered for the next chunk.
    fn feed(&mut self, chunk: &[u8]) -> Vec<String> {
        self.buffer.extend_from_slice(chunk);

        let mut lines = Vec::new();
        while let Some(newline_pos) = self.buffer.iter().position(|&b| b == b'\n') {
            let rest = self.buffer.split_off(newline_pos + 1);
            let mut line = std::mem::replace(&mut self.buffer, rest);

            line.pop();
            if line.last() == Some(&b'\r') {
                line.pop();
            }

            lines.push(String::from_utf8_lossy(&line).into_owned());
        }

        lines
    }
}

/// Provider stream payloads this client understands. Everything else
/// (`message_start`, `ping`, ...) decodes to `Other` and is skipped.
#[derive(Deserialize)]
#[serde(tag = "type")]
enum WirePayload {
    #[serde(rename = "content_block_delta")]
    ContentBlockDelta { delta: WireDelta },
    #[serde(rename = "error")]
    Error { error: WireError },
    #[serde(other)]
    Other,
}

#[derive(Deserialize)]
struct WireDelta {
    #[serde(default)]
    text: String,
}

#[derive(Deserialize)]
struct WireError {
    #[serde(default)]
    message: String,
}

/// Decode one complete line into a provider event.
///
/// Lines without the `data:` marker (blank lines, comments, other SSE
/// fields), the `[DONE]` sentinel, malformed payloads, and empty deltas all
/// decode to `None` and are skipped.
fn decode_line(line: &str) -> Option<ProviderEvent> {
    let payload = line.trim().strip_prefix(DATA_PREFIX)?.trim_start();

    if payload == DONE_SENTINEL {
        return None;
    }

    match serde_json::from_str::<WirePayload>(payload) {
        Ok(WirePayload::ContentBlockDelta { delta }) if !delta.text.is_empty() => {
            Some(ProviderEvent::ContentDelta(delta.text))
        }
        Ok(WirePayload::Error { error }) => Some(ProviderEvent::Error(error.message)),
        Ok(_) => None,
        Err(err) => {
            debug!(error = %err, "Skipping malformed stream event");
            None
        }
    }
}

/// Decode a raw byte stream into provider events.
///
/// A transport failure while reading propagates as a hard `Err` and ends
/// the stream; a malformed event line is skipped. A provider `error` event
/// is yielded and terminates decoding. A trailing partial line at
/// end-of-stream is discarded; the provider terminates on line boundaries.
pub fn decode_stream(bytes: ByteStream) -> EventStream {
    Box::pin(async_stream::stream! {
        let mut bytes = bytes;
        let mut lines = EventLineBuffer::new();

        while let Some(chunk) = bytes.next().await {
            match chunk {
                Ok(chunk) => {
                    for line in lines.feed(&chunk) {
                        match decode_line(&line) {
                            Some(ProviderEvent::Error(message)) => {
                                yield Ok(ProviderEvent::Error(message));
                                return;
                            }
                            Some(event) => yield Ok(event),
                            None => {}
                        }
                    }
                }
                Err(err) => {
                    yield Err(err);
                    return;
                }
            }
        }
    })
}
