//! Count frames on the event stream.
//!
//! Each update is one event-stream frame:
//!
//! ```text
//! data: {"count":42}
//!
//! ```
//!
//! Lines starting with `:` are comments and are used as keep-alives.

use bytes::{Buf, Bytes, BytesMut};
use serde::{Deserialize, Serialize};

/// Media type of the count stream.
pub const EVENT_STREAM: &str = "text/event-stream";

const KEEP_ALIVE: &[u8] = b": keep-alive\n\n";

/// Payload carried by every data frame.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub struct CountUpdate {
    pub count: u64,
}

impl CountUpdate {
    /// Read the count out of one event payload.
    ///
    /// Returns `Ok(None)` for well-formed JSON without a numeric `count`,
    /// which callers skip silently.
    pub fn from_payload(payload: &str) -> Result<Option<u64>, serde_json::Error> {
        let value: serde_json::Value = serde_json::from_str(payload)?;
        Ok(value.get("count").and_then(serde_json::Value::as_u64))
    }
}

/// Encode a count as a single data frame.
pub fn encode_count(count: u64) -> Bytes {
    let json = serde_json::to_string(&CountUpdate { count }).unwrap_or_default();
    Bytes::from(format!("data: {}\n\n", json))
}

/// Comment frame that keeps idle connections open through proxies.
pub fn encode_keep_alive() -> Bytes {
    Bytes::from_static(KEEP_ALIVE)
}

/// Incremental event-stream parser.
///
/// Chunks may split lines and events anywhere; complete events are returned
/// as their joined `data` payloads.
#[derive(Debug, Default)]
pub struct FrameParser {
    buffer: BytesMut,
    data: Vec<String>,
}

impl FrameParser {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn feed(&mut self, chunk: &[u8]) -> Vec<String> {
        self.buffer.extend_from_slice(chunk);
        let mut events = Vec::new();

        while let Some(pos) = self.buffer.iter().position(|b| *b == b'\n') {
            let raw = self.buffer.split_to(pos);
            self.buffer.advance(1);

            let decoded = String::from_utf8_lossy(&raw);
            let line = decoded.strip_suffix('\r').unwrap_or(&decoded);

            if line.is_empty() {
                if !self.data.is_empty() {
                    events.push(self.data.join("\n"));
                    self.data.clear();
                }
                continue;
            }

            if line.starts_with(':') {
                continue;
            }

            let (field, value) = match line.split_once(':') {
                Some((field, value)) => (field, value.strip_prefix(' ').unwrap_or(value)),
                None => (line, ""),
            };

            // event/id/retry carry nothing for the count stream
            if field == "data" {
                self.data.push(value.to_string());
            }
        }

        events
    }
}
