//! Line and block framing over arbitrarily chunked input.
//!
//! Two splitters share the same contract: `feed` appends a chunk and
//! returns every record that became complete, `finish` flushes what is
//! left. Neither looks ahead of what it has been given, and the only
//! state either keeps is the residual since the last delimiter.
//!
//! - [`LineSplitter`] cuts on `\n` (a trailing `\r` is stripped) and
//!   numbers lines from 1, independent of how the input was chunked.
//! - [`BraceSplitter`] cuts out balanced `{ … }` regions, for bodies
//!   that stream bare JSON objects instead of SSE.
//!
//! Byte input goes through [`Utf8Decoder`] first, so a chunk boundary
//! may fall inside a multi-byte code point.

use crate::error::StreamError;

/// One line of input.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct LineRecord {
    /// 1-based, increasing by exactly one per line.
    pub line_number: u64,
    /// The line text, without its terminator.
    pub text: String,
    /// `false` only when the line's terminator never arrived.
    pub complete: bool,
}

/// Splits text chunks into [`LineRecord`]s.
#[derive(Debug, Default)]
pub struct LineSplitter {
    residual: String,
    next_line: u64,
    max_buffer_bytes: Option<usize>,
    overflow: Option<usize>,
}

impl LineSplitter {
    /// Creates a splitter with no buffer cap.
    pub fn new() -> Self {
        Self::default()
    }

    /// Creates a splitter that errors once a single line exceeds `limit` bytes.
    pub fn with_limit(limit: usize) -> Self {
        Self {
            max_buffer_bytes: Some(limit),
            ..Self::default()
        }
    }

    /// Appends `chunk` and returns every line it completed, in order.
    ///
    /// When the cap trips, the residual is cleared. If no line completed
    /// in this chunk the overflow is returned as the error; otherwise the
    /// lines are returned and the overflow is held for
    /// [`take_overflow`](Self::take_overflow).
    pub fn feed(&mut self, chunk: &str) -> Result<Vec<LineRecord>, StreamError> {
        if chunk.is_empty() {
            return Ok(Vec::new());
        }

        // Only the new text can contain a delimiter we have not seen.
        let scan_from = self.residual.len();
        self.residual.push_str(chunk);

        let mut records = Vec::new();
        let mut consumed = 0;
        let mut search = scan_from;
        while let Some(offset) = self.residual[search..].find('\n') {
            let end = search + offset;
            let line = &self.residual[consumed..end];
            let text = line.strip_suffix('\r').unwrap_or(line).to_string();
            records.push(self.record(text, true));
            consumed = end + 1;
            search = consumed;
        }
        self.residual.drain(..consumed);

        if let Some(limit) = self.max_buffer_bytes
            && self.residual.len() > limit
        {
            self.residual.clear();
            if records.is_empty() {
                return Err(StreamError::BufferOverflow { limit });
            }
            self.overflow = Some(limit);
        }

        Ok(records)
    }

    /// Returns an overflow held back by the last [`feed`](Self::feed).
    pub fn take_overflow(&mut self) -> Option<StreamError> {
        self.overflow
            .take()
            .map(|limit| StreamError::BufferOverflow { limit })
    }

    /// Flushes the residual as a final, incomplete record.
    ///
    /// Returns `None` when the input ended on a line terminator.
    pub fn finish(&mut self) -> Option<LineRecord> {
        if self.residual.is_empty() {
            return None;
        }
        let text = std::mem::take(&mut self.residual);
        Some(self.record(text, false))
    }

    /// A non-consuming view of the line currently being assembled.
    pub fn peek_partial(&self) -> Option<LineRecord> {
        (!self.residual.is_empty()).then(|| LineRecord {
            line_number: self.next_line + 1,
            text: self.residual.clone(),
            complete: false,
        })
    }

    /// Number of lines emitted so far (complete or not).
    pub fn lines_emitted(&self) -> u64 {
        self.next_line
    }

    fn record(&mut self, text: String, complete: bool) -> LineRecord {
        self.next_line += 1;
        LineRecord {
            line_number: self.next_line,
            text,
            complete,
        }
    }
}

/// Output of [`BraceSplitter`].
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum BlockRecord {
    /// An opening `{` was found at depth zero.
    Open {
        /// 1-based block number.
        block: u64,
    },
    /// The text of the block, outer braces included.
    Content {
        /// The block this text belongs to.
        block: u64,
        /// The region text.
        text: String,
        /// `false` when the stream ended before the matching `}`.
        complete: bool,
    },
    /// The matching `}` was found.
    Close {
        /// The block being closed.
        block: u64,
    },
}

/// Splits text chunks into balanced `{ … }` regions.
///
/// Depth is tracked so nested objects stay inside their parent, and
/// braces inside JSON string literals are ignored. Anything between
/// regions (whitespace, `[`, `,`, `]`) is discarded.
#[derive(Debug, Default)]
pub struct BraceSplitter {
    region: String,
    depth: usize,
    in_string: bool,
    escaped: bool,
    next_block: u64,
    max_buffer_bytes: Option<usize>,
    overflow: Option<usize>,
}

impl BraceSplitter {
    /// Creates a splitter with no buffer cap.
    pub fn new() -> Self {
        Self::default()
    }

    /// Creates a splitter that errors once a single region exceeds `limit` bytes.
    pub fn with_limit(limit: usize) -> Self {
        Self {
            max_buffer_bytes: Some(limit),
            ..Self::default()
        }
    }

    /// Appends `chunk` and returns the records it produced, in order.
    ///
    /// Overflow is reported the same way as [`LineSplitter::feed`].
    pub fn feed(&mut self, chunk: &str) -> Result<Vec<BlockRecord>, StreamError> {
        let mut records = Vec::new();

        for ch in chunk.chars() {
            if self.depth == 0 {
                if ch == '{' {
                    self.next_block += 1;
                    self.depth = 1;
                    self.region.push(ch);
                    records.push(BlockRecord::Open {
                        block: self.next_block,
                    });
                }
                continue;
            }

            self.region.push(ch);
            if self.in_string {
                match (self.escaped, ch) {
                    (true, _) => self.escaped = false,
                    (false, '\\') => self.escaped = true,
                    (false, '"') => self.in_string = false,
                    _ => {}
                }
                continue;
            }

            match ch {
                '"' => self.in_string = true,
                '{' => self.depth += 1,
                '}' => {
                    self.depth -= 1;
                    if self.depth == 0 {
                        let block = self.next_block;
                        records.push(BlockRecord::Content {
                            block,
                            text: std::mem::take(&mut self.region),
                            complete: true,
                        });
                        records.push(BlockRecord::Close { block });
                    }
                }
                _ => {}
            }
        }

        if let Some(limit) = self.max_buffer_bytes
            && self.region.len() > limit
        {
            self.reset_region();
            if records.is_empty() {
                return Err(StreamError::BufferOverflow { limit });
            }
            self.overflow = Some(limit);
        }

        Ok(records)
    }

    /// Returns an overflow held back by the last [`feed`](Self::feed).
    pub fn take_overflow(&mut self) -> Option<StreamError> {
        self.overflow
            .take()
            .map(|limit| StreamError::BufferOverflow { limit })
    }

    /// Flushes an unterminated region as incomplete content.
    pub fn finish(&mut self) -> Option<BlockRecord> {
        if self.depth == 0 {
            return None;
        }
        let record = BlockRecord::Content {
            block: self.next_block,
            text: std::mem::take(&mut self.region),
            complete: false,
        };
        self.reset_region();
        Some(record)
    }

    fn reset_region(&mut self) {
        self.region.clear();
        self.depth = 0;
        self.in_string = false;
        self.escaped = false;
    }
}

/// Incremental UTF-8 decoder for byte chunks.
///
/// The incomplete tail of a multi-byte sequence is held until the next
/// chunk. Bytes that can never form valid UTF-8 are skipped.
#[derive(Debug, Default)]
pub struct Utf8Decoder {
    pending: Vec<u8>,
}

impl Utf8Decoder {
    /// Creates an empty decoder.
    pub fn new() -> Self {
        Self::default()
    }

    /// Decodes as much of `pending + bytes` as is valid so far.
    pub fn decode(&mut self, bytes: &[u8]) -> String {
        self.pending.extend_from_slice(bytes);

        let mut out = String::new();
        let mut start = 0;
        loop {
            match std::str::from_utf8(&self.pending[start..]) {
                Ok(text) => {
                    out.push_str(text);
                    start = self.pending.len();
                    break;
                }
                Err(e) => {
                    let valid_up_to = start + e.valid_up_to();
                    // `valid_up_to` marks a prefix already checked by `from_utf8`.
                    if let Ok(valid) = std::str::from_utf8(&self.pending[start..valid_up_to]) {
                        out.push_str(valid);
                    }
                    match e.error_len() {
                        Some(len) => start = valid_up_to + len,
                        None => {
                            // Incomplete sequence at the end; wait for more bytes.
                            start = valid_up_to;
                            break;
                        }
                    }
                }
            }
        }
        self.pending.drain(..start);
        out
    }

    /// Returns `true` if part of a code point is still buffered.
    pub fn has_pending(&self) -> bool {
        !self.pending.is_empty()
    }

    /// Drops any incomplete trailing sequence.
    pub fn finish(&mut self) {
        if !self.pending.is_empty() {
            tracing::debug!(
                bytes = self.pending.len(),
                "dropping incomplete UTF-8 sequence at end of stream"
            );
            self.pending.clear();
        }
    }
}
