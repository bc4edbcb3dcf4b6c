//! Chunk-boundary-safe parsing for streamed chat-completion responses.
//!
//! `delta-stack` turns the raw body of a chat-completion response into
//! typed events, and produces the same events whether the body arrives
//! one byte at a time or all at once. The stages, leaves first:
//!
//! | Stage | Module | Emits |
//! |-------|--------|-------|
//! | Line / brace framing, UTF-8 decoding | [`lines`] | [`LineRecord`](lines::LineRecord) |
//! | Server-Sent Events | [`sse`] | [`SsePayload`](sse::SsePayload) |
//! | Provider shapes | [`normalize`] | [`DeltaEvent`](normalize::DeltaEvent) |
//! | Code fences | [`fence`] | [`FenceEvent`](fence::FenceEvent) |
//! | Tool calls | [`tool_call`] | [`ToolCallEvent`](tool_call::ToolCallEvent) |
//!
//! [`ChatPipeline`] wires them together for one stream. Around it,
//! [`RetryOrchestrator`] sends a [`ChatRequest`] through any
//! [`Transport`], retrying once with a fallback model when the API
//! rejects the model and once with a refreshed credential on 401/403.
//!
//! # Quick start
//!
//! ```rust
//! use delta_stack::{ChatPipeline, StreamEvent};
//!
//! let mut pipeline = ChatPipeline::default();
//! let mut events = pipeline
//!     .feed("data: {\"choices\":[{\"delta\":{\"content\":\"Hel")
//!     .unwrap();
//! events.extend(pipeline.feed("lo\"},\"finish_reason\":\"stop\"}]}\n\n").unwrap());
//! events.extend(pipeline.finish());
//!
//! assert_eq!(events[0], StreamEvent::Text("Hello".into()));
//! ```

#![warn(missing_docs)]

pub mod collect;
pub mod config;
pub mod error;
pub mod fence;
pub mod lines;
pub mod normalize;
pub mod pipeline;
pub mod retry;
pub mod sse;
pub mod stream;
pub mod tool_call;
pub mod usage;

mod wire;

#[cfg(any(test, feature = "test-utils"))]
pub mod mock;

#[cfg(any(test, feature = "test-utils"))]
pub mod test_helpers;

// Everything else lives in its submodule:
//
//   delta_stack::lines::*      LineSplitter, BraceSplitter, Utf8Decoder
//   delta_stack::sse::*        SseDecoder, SsePayload
//   delta_stack::normalize::*  DeltaNormalizer, DeltaEvent
//   delta_stack::fence::*      FenceDetector, coalesce
//   delta_stack::tool_call::*  ToolCallAccumulator
//   delta_stack::mock::*       MockTransport (test-utils feature)

pub use collect::{ChatOutcome, CodeBlock};
pub use config::{DEFAULT_FALLBACK_MODEL, Framing, PipelineConfig, RetryPolicy};
pub use error::{ApiErrorKind, ApiFailure, RequestError, StreamError};
pub use normalize::{ImageData, StreamMeta};
pub use pipeline::ChatPipeline;
pub use retry::{Attempted, ChatRequest, CredentialSource, Reply, RetryOrchestrator, Transport};
pub use stream::{ByteStream, ChatStream, StreamEvent, coalesce_events};
pub use tool_call::ToolCallComplete;
pub use usage::Usage;
