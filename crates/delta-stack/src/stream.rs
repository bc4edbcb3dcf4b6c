//! Pipeline output types.
//!
//! A [`ChatPipeline`](crate::ChatPipeline) turns a response body into a
//! flat sequence of [`StreamEvent`]s. Consume them as they are decided,
//! either from the `feed` return values, from handlers registered with
//! [`subscribe`](crate::ChatPipeline::subscribe), or by pulling from a
//! [`ChatStream`]. All three see the same events in the same order.
//!
//! ```rust,no_run
//! use futures::StreamExt;
//! use delta_stack::{ChatStream, StreamEvent};
//!
//! async fn print_stream(mut stream: ChatStream) {
//!     while let Some(event) = stream.next().await {
//!         match event {
//!             Ok(StreamEvent::Text(text)) => print!("{text}"),
//!             Ok(StreamEvent::Code { text, .. }) => print!("{text}"),
//!             Ok(StreamEvent::Done { finish_reason }) => println!("\n[done: {finish_reason}]"),
//!             Err(e) => eprintln!("stream error: {e}"),
//!             _ => {}
//!         }
//!     }
//! }
//! ```
//!
//! # Tool calls
//!
//! Tool calls arrive in three phases, linked by `index`:
//! [`ToolCallStart`](StreamEvent::ToolCallStart), zero or more
//! [`ToolCallArguments`](StreamEvent::ToolCallArguments), then exactly one
//! [`ToolCallComplete`](StreamEvent::ToolCallComplete).

use std::pin::Pin;

use bytes::Bytes;
use futures::Stream;
use serde::{Deserialize, Serialize};

use crate::error::StreamError;
use crate::fence::FenceEvent;
use crate::normalize::{ImageData, StreamMeta};
use crate::tool_call::{ToolCallComplete, ToolCallEvent};
use crate::usage::Usage;

/// A pinned, boxed, `Send` stream of [`StreamEvent`] results.
pub type ChatStream = Pin<Box<dyn Stream<Item = Result<StreamEvent, StreamError>> + Send>>;

/// A response body as a stream of byte chunks.
///
/// Transports map their own read errors into [`StreamError::Transport`].
pub type ByteStream = Pin<Box<dyn Stream<Item = Result<Bytes, StreamError>> + Send>>;

/// An event decided by the pipeline.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[non_exhaustive]
pub enum StreamEvent {
    /// Response metadata. At most once, before any content it came with.
    Meta(StreamMeta),
    /// Prose. With fence detection off, all content arrives as `Text`.
    Text(String),
    /// A fenced code block was opened.
    BlockOpen {
        /// Per-stream block id.
        block_id: String,
        /// The fence's language tag, possibly empty.
        language: String,
    },
    /// Code inside an open block.
    Code {
        /// The block this code belongs to.
        block_id: String,
        /// Code text.
        text: String,
    },
    /// A fenced code block was closed.
    BlockClose {
        /// The block being closed.
        block_id: String,
    },
    /// A tool call was seen for the first time.
    ToolCallStart {
        /// Index of the call within the response.
        index: u32,
        /// Provider call id, if it came with the first fragment.
        call_id: Option<String>,
        /// Function name, if it came with the first fragment.
        function_name: Option<String>,
    },
    /// A raw fragment of a call's JSON arguments.
    ToolCallArguments {
        /// Index of the call.
        index: u32,
        /// The fragment text.
        fragment: String,
    },
    /// A call's arguments are complete.
    ToolCallComplete(ToolCallComplete),
    /// Token usage. At most once.
    Usage(Usage),
    /// A generated image.
    Image(ImageData),
    /// The model finished. At most once.
    Done {
        /// The raw finish reason (`stop`, `length`, `tool_calls`, ...).
        finish_reason: String,
    },
}

impl From<FenceEvent> for StreamEvent {
    fn from(event: FenceEvent) -> Self {
        match event {
            FenceEvent::Text(text) => Self::Text(text),
            FenceEvent::BlockOpen { block_id, language } => Self::BlockOpen { block_id, language },
            FenceEvent::Code { block_id, text } => Self::Code { block_id, text },
            FenceEvent::BlockClose { block_id } => Self::BlockClose { block_id },
        }
    }
}

impl From<ToolCallEvent> for StreamEvent {
    fn from(event: ToolCallEvent) -> Self {
        match event {
            ToolCallEvent::Start {
                index,
                call_id,
                function_name,
            } => Self::ToolCallStart {
                index,
                call_id,
                function_name,
            },
            ToolCallEvent::Arguments { index, fragment } => Self::ToolCallArguments { index, fragment },
            ToolCallEvent::Complete(call) => Self::ToolCallComplete(call),
        }
    }
}

impl StreamEvent {
    /// Returns the event as a fence segment, if it is one.
    pub fn as_fence_event(&self) -> Option<FenceEvent> {
        match self {
            Self::Text(text) => Some(FenceEvent::Text(text.clone())),
            Self::BlockOpen { block_id, language } => Some(FenceEvent::BlockOpen {
                block_id: block_id.clone(),
                language: language.clone(),
            }),
            Self::Code { block_id, text } => Some(FenceEvent::Code {
                block_id: block_id.clone(),
                text: text.clone(),
            }),
            Self::BlockClose { block_id } => Some(FenceEvent::BlockClose {
                block_id: block_id.clone(),
            }),
            _ => None,
        }
    }
}

/// Merges adjacent `Text` events, and adjacent `Code` events of the same
/// block, leaving every other event in place.
///
/// Fragment boundaries follow the input's chunk boundaries; the coalesced
/// sequence does not.
pub fn coalesce_events<I>(events: I) -> Vec<StreamEvent>
where
    I: IntoIterator<Item = StreamEvent>,
{
    let mut out: Vec<StreamEvent> = Vec::new();
    for event in events {
        match (out.last_mut(), event) {
            (Some(StreamEvent::Text(prev)), StreamEvent::Text(next)) => prev.push_str(&next),
            (
                Some(StreamEvent::Code { block_id: a, text: prev }),
                StreamEvent::Code { block_id: b, text: next },
            ) if *a == b => prev.push_str(&next),
            (_, event) => out.push(event),
        }
    }
    out
}
