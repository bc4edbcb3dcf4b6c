//! Server-Sent Events decoding.
//!
//! Turns complete [`LineRecord`]s into parsed JSON payloads. Comment
//! lines (`:`), blank lines and non-`data` fields are ignored; the
//! `[DONE]` sentinel ends the data; anything that fails to parse as
//! JSON is dropped without an error.

use serde_json::Value;

use crate::lines::LineRecord;

/// The sentinel some providers send after the last payload.
pub const DONE_SENTINEL: &str = "[DONE]";

/// One successfully parsed `data:` line.
#[derive(Debug, Clone, PartialEq)]
pub struct SsePayload {
    /// 0-based position among parsed payloads of this stream.
    pub ordinal: u64,
    /// The decoded JSON.
    pub json: Value,
}

/// What a single line decoded to.
#[derive(Debug, Clone, PartialEq)]
pub enum SseFrame {
    /// A JSON payload.
    Payload(SsePayload),
    /// The `[DONE]` sentinel.
    Done,
}

/// Decodes SSE lines into [`SseFrame`]s.
#[derive(Debug, Default)]
pub struct SseDecoder {
    next_ordinal: u64,
    done: bool,
    dropped: u64,
}

impl SseDecoder {
    /// Creates a decoder for one stream.
    pub fn new() -> Self {
        Self::default()
    }

    /// Decodes one line. Incomplete lines are never eligible.
    pub fn decode(&mut self, line: &LineRecord) -> Option<SseFrame> {
        if !line.complete {
            return None;
        }
        let data = extract_data(&line.text)?;

        if data.trim() == DONE_SENTINEL {
            self.done = true;
            return Some(SseFrame::Done);
        }

        match serde_json::from_str::<Value>(data) {
            Ok(json) => {
                let ordinal = self.next_ordinal;
                self.next_ordinal += 1;
                Some(SseFrame::Payload(SsePayload { ordinal, json }))
            }
            Err(e) => {
                self.dropped += 1;
                tracing::debug!(
                    line = line.line_number,
                    error = %e,
                    "dropping SSE data line that is not valid JSON"
                );
                None
            }
        }
    }

    /// Parses a bare JSON document (brace-framed bodies) as the next payload.
    pub fn decode_json(&mut self, text: &str) -> Option<SsePayload> {
        match serde_json::from_str::<Value>(text) {
            Ok(json) => {
                let ordinal = self.next_ordinal;
                self.next_ordinal += 1;
                Some(SsePayload { ordinal, json })
            }
            Err(e) => {
                self.dropped += 1;
                tracing::debug!(error = %e, "dropping JSON block that failed to parse");
                None
            }
        }
    }

    /// Returns `true` once `[DONE]` has been seen.
    pub fn is_done(&self) -> bool {
        self.done
    }

    /// Number of payloads parsed so far.
    pub fn payloads(&self) -> u64 {
        self.next_ordinal
    }

    /// Number of `data:` lines dropped because they were not JSON.
    pub fn dropped(&self) -> u64 {
        self.dropped
    }
}

/// Extracts the value of a `data:` field, stripping one leading space.
///
/// Returns `None` for comments, blank lines and other fields.
pub fn extract_data(line: &str) -> Option<&str> {
    let line = line.trim_end_matches('\r');
    if line.is_empty() || line.starts_with(':') {
        return None;
    }
    let value = line.strip_prefix("data:")?;
    Some(value.strip_prefix(' ').unwrap_or(value))
}
