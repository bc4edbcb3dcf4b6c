//! Markdown code-fence detection over streamed text.
//!
//! [`FenceDetector`] re-segments content deltas into prose and fenced
//! code, one character at a time, so the result never depends on where
//! the deltas were split. Characters whose meaning is still undecided (a
//! run of backticks, or the newline right before a possible closing
//! fence) are held back until the next character resolves them.
//!
//! Output for the text ``"Here:\n```rust\nlet x = 1;\n```\n"``:
//!
//! ```text
//! Text("Here:\n")
//! BlockOpen { block_id: "block-0", language: "rust" }
//! Code { block_id: "block-0", text: "let x = 1;" }
//! BlockClose { block_id: "block-0" }
//! ```
//!
//! Pending fragments are flushed at the end of every delta, so one
//! logical run may arrive as several `Text` or `Code` events. Use
//! [`coalesce`] to compare sequences produced from different splits.

use serde::{Deserialize, Serialize};

const MIN_FENCE: usize = 3;

/// A segment of content, relative to code fences.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub enum FenceEvent {
    /// Prose outside any code block.
    Text(String),
    /// A fenced block was opened.
    BlockOpen {
        /// Per-stream id, `block-0`, `block-1`, ...
        block_id: String,
        /// The trimmed info string after the fence; may be empty.
        language: String,
    },
    /// Code inside the current block.
    Code {
        /// The block this code belongs to.
        block_id: String,
        /// Code text.
        text: String,
    },
    /// The current block was closed.
    BlockClose {
        /// The block being closed.
        block_id: String,
    },
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
enum State {
    Text,
    MaybeFence,
    InCode,
    MaybeClose,
}

/// Incremental code-fence state machine for one stream.
#[derive(Debug)]
pub struct FenceDetector {
    state: State,
    /// Decided text (in `Text`) or code (in `InCode`) not yet emitted.
    pending: String,
    /// Backticks seen but not yet classified.
    ticks: usize,
    /// Length of the opening fence of the current block.
    fence_len: usize,
    language: String,
    /// A newline in code that may precede a closing fence.
    held_newline: bool,
    block_id: Option<String>,
    next_block: u64,
}

impl Default for FenceDetector {
    fn default() -> Self {
        Self::new()
    }
}

impl FenceDetector {
    /// Creates a detector in the prose state.
    pub fn new() -> Self {
        Self {
            state: State::Text,
            pending: String::new(),
            ticks: 0,
            fence_len: MIN_FENCE,
            language: String::new(),
            held_newline: false,
            block_id: None,
            next_block: 0,
        }
    }

    /// Feeds one content delta and returns the events it decided.
    pub fn feed(&mut self, delta: &str) -> Vec<FenceEvent> {
        let mut out = Vec::new();
        for c in delta.chars() {
            self.step(c, &mut out);
        }
        self.flush(&mut out);
        out
    }

    /// Flushes held characters and closes any open block.
    ///
    /// Safe to call more than once; later calls return nothing.
    pub fn finalize(&mut self) -> Vec<FenceEvent> {
        let mut out = Vec::new();
        match self.state {
            State::Text => {
                self.release_ticks();
                self.flush(&mut out);
            }
            State::MaybeFence => {
                self.pending.push_str(&"`".repeat(self.fence_len));
                self.pending.push_str(&std::mem::take(&mut self.language));
                self.state = State::Text;
                self.flush(&mut out);
            }
            State::InCode => {
                self.release_held();
                self.close_block(&mut out);
            }
            State::MaybeClose => {
                if self.ticks >= self.fence_len {
                    self.ticks = 0;
                    self.held_newline = false;
                } else {
                    self.release_held();
                }
                self.close_block(&mut out);
            }
        }
        out
    }

    /// Returns `true` while inside a code block.
    pub fn in_block(&self) -> bool {
        self.block_id.is_some()
    }

    fn step(&mut self, c: char, out: &mut Vec<FenceEvent>) {
        match self.state {
            State::Text => self.on_text(c, out),
            State::MaybeFence => self.on_maybe_fence(c, out),
            State::InCode => self.on_code(c),
            State::MaybeClose => self.on_maybe_close(c, out),
        }
    }

    fn on_text(&mut self, c: char, out: &mut Vec<FenceEvent>) {
        if c == '`' {
            self.ticks += 1;
            if self.ticks == MIN_FENCE {
                self.ticks = 0;
                self.flush(out);
                self.fence_len = MIN_FENCE;
                self.language.clear();
                self.state = State::MaybeFence;
            }
            return;
        }
        self.release_ticks();
        self.pending.push(c);
    }

    fn on_maybe_fence(&mut self, c: char, out: &mut Vec<FenceEvent>) {
        match c {
            '`' if self.language.is_empty() => self.fence_len += 1,
            '\n' => {
                let block_id = format!("block-{}", self.next_block);
                self.next_block += 1;
                out.push(FenceEvent::BlockOpen {
                    block_id: block_id.clone(),
                    language: self.language.trim().to_string(),
                });
                self.language.clear();
                self.block_id = Some(block_id);
                self.state = State::InCode;
            }
            _ => self.language.push(c),
        }
    }

    fn on_code(&mut self, c: char) {
        match c {
            '`' => {
                self.ticks += 1;
                if self.ticks == MIN_FENCE {
                    self.state = State::MaybeClose;
                }
            }
            '\n' => {
                self.release_held();
                self.held_newline = true;
            }
            _ => {
                self.release_held();
                self.pending.push(c);
            }
        }
    }

    fn on_maybe_close(&mut self, c: char, out: &mut Vec<FenceEvent>) {
        if c == '`' {
            self.ticks += 1;
            return;
        }
        if is_fence_whitespace(c) && self.ticks >= self.fence_len {
            self.ticks = 0;
            self.held_newline = false;
            self.close_block(out);
            if c != '\n' {
                self.pending.push(c);
            }
            return;
        }
        // Not a close: the run was code after all.
        self.release_held();
        self.state = State::InCode;
        self.on_code(c);
    }

    fn close_block(&mut self, out: &mut Vec<FenceEvent>) {
        self.flush(out);
        if let Some(block_id) = self.block_id.take() {
            out.push(FenceEvent::BlockClose { block_id });
        }
        self.fence_len = MIN_FENCE;
        self.state = State::Text;
    }

    /// Moves held backticks into pending prose.
    fn release_ticks(&mut self) {
        if self.ticks > 0 {
            self.pending.push_str(&"`".repeat(self.ticks));
            self.ticks = 0;
        }
    }

    /// Moves a held newline and backticks into pending code, in order.
    fn release_held(&mut self) {
        if self.held_newline {
            self.pending.push('\n');
            self.held_newline = false;
        }
        self.release_ticks();
    }

    fn flush(&mut self, out: &mut Vec<FenceEvent>) {
        if self.pending.is_empty() {
            return;
        }
        let text = std::mem::take(&mut self.pending);
        match (&self.state, &self.block_id) {
            (State::InCode | State::MaybeClose, Some(block_id)) => out.push(FenceEvent::Code {
                block_id: block_id.clone(),
                text,
            }),
            _ => out.push(FenceEvent::Text(text)),
        }
    }
}

fn is_fence_whitespace(c: char) -> bool {
    matches!(c, ' ' | '\t' | '\n' | '\r')
}

/// Merges adjacent `Text` fragments, and adjacent `Code` fragments of the
/// same block.
pub fn coalesce<I>(events: I) -> Vec<FenceEvent>
where
    I: IntoIterator<Item = FenceEvent>,
{
    let mut out: Vec<FenceEvent> = Vec::new();
    for event in events {
        match (out.last_mut(), event) {
            (Some(FenceEvent::Text(prev)), FenceEvent::Text(next)) => prev.push_str(&next),
            (
                Some(FenceEvent::Code { block_id: a, text: prev }),
                FenceEvent::Code { block_id: b, text: next },
            ) if *a == b => prev.push_str(&next),
            (_, event) => out.push(event),
        }
    }
    out
}
