//! One response body in, ordered [`StreamEvent`]s out.
//!
//! [`ChatPipeline`] owns one instance of every stage for a single
//! stream: framing, SSE decoding, normalization, code-fence detection
//! and tool-call reassembly. Nothing is shared between pipelines, so a
//! retry or a concurrent request simply builds a new one.
//!
//! Three ways to consume the same events:
//!
//! - return values of [`feed`](ChatPipeline::feed) /
//!   [`finish`](ChatPipeline::finish),
//! - handlers registered with [`subscribe`](ChatPipeline::subscribe),
//!   called synchronously in registration order,
//! - [`into_stream`](ChatPipeline::into_stream), which drives the
//!   pipeline from an async byte stream and yields a [`ChatStream`].

use futures::StreamExt;

use crate::config::{Framing, PipelineConfig};
use crate::error::StreamError;
use crate::fence::FenceDetector;
use crate::lines::{BlockRecord, BraceSplitter, LineSplitter, Utf8Decoder};
use crate::normalize::{DeltaEvent, DeltaNormalizer};
use crate::sse::{SseDecoder, SseFrame, SsePayload};
use crate::stream::{ChatStream, StreamEvent};
use crate::tool_call::ToolCallAccumulator;

type Handler = Box<dyn FnMut(&StreamEvent) + Send>;

const KNOWN_FINISH_REASONS: &[&str] = &[
    "stop",
    "length",
    "tool_calls",
    "function_call",
    "content_filter",
    "error",
];

#[derive(Debug)]
enum Framer {
    Lines(LineSplitter),
    Braces(BraceSplitter),
}

impl Framer {
    fn new(config: &PipelineConfig) -> Self {
        match (config.framing, config.max_buffer_bytes) {
            (Framing::Sse, Some(limit)) => Self::Lines(LineSplitter::with_limit(limit)),
            (Framing::Sse, None) => Self::Lines(LineSplitter::new()),
            (Framing::JsonObjects, Some(limit)) => Self::Braces(BraceSplitter::with_limit(limit)),
            (Framing::JsonObjects, None) => Self::Braces(BraceSplitter::new()),
        }
    }

    fn take_overflow(&mut self) -> Option<StreamError> {
        match self {
            Self::Lines(splitter) => splitter.take_overflow(),
            Self::Braces(splitter) => splitter.take_overflow(),
        }
    }
}

/// The per-stream parsing pipeline.
pub struct ChatPipeline {
    config: PipelineConfig,
    framer: Framer,
    utf8: Utf8Decoder,
    sse: SseDecoder,
    normalizer: DeltaNormalizer,
    fences: FenceDetector,
    tools: ToolCallAccumulator,
    handlers: Vec<Handler>,
    finished: bool,
}

impl std::fmt::Debug for ChatPipeline {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("ChatPipeline")
            .field("config", &self.config)
            .field("framer", &self.framer)
            .field("handlers", &self.handlers.len())
            .field("finished", &self.finished)
            .finish_non_exhaustive()
    }
}

impl Default for ChatPipeline {
    fn default() -> Self {
        Self::new(PipelineConfig::default())
    }
}

impl ChatPipeline {
    /// Creates a pipeline with the given configuration.
    pub fn new(config: PipelineConfig) -> Self {
        Self {
            framer: Framer::new(&config),
            config,
            utf8: Utf8Decoder::new(),
            sse: SseDecoder::new(),
            normalizer: DeltaNormalizer::new(),
            fences: FenceDetector::new(),
            tools: ToolCallAccumulator::new(),
            handlers: Vec::new(),
            finished: false,
        }
    }

    /// Registers a handler for every event this pipeline emits from now on.
    pub fn subscribe<F>(&mut self, handler: F)
    where
        F: FnMut(&StreamEvent) + Send + 'static,
    {
        self.handlers.push(Box::new(handler));
    }

    /// Returns the configuration.
    pub fn config(&self) -> &PipelineConfig {
        &self.config
    }

    /// Returns `true` once the stream has been finalized, by `[DONE]`,
    /// [`finish`](Self::finish) or [`process_document`](Self::process_document).
    pub fn is_finished(&self) -> bool {
        self.finished
    }

    /// Feeds one text chunk and returns the events it decided.
    ///
    /// Input after the stream was finalized is ignored. When the buffer
    /// cap trips after some events were decided, those events are
    /// returned and the overflow is held for
    /// [`take_overflow`](Self::take_overflow).
    pub fn feed(&mut self, chunk: &str) -> Result<Vec<StreamEvent>, StreamError> {
        if self.finished {
            if !chunk.is_empty() {
                tracing::debug!(bytes = chunk.len(), "ignoring input after end of stream");
            }
            return Ok(Vec::new());
        }

        let mut out = Vec::new();
        match &mut self.framer {
            Framer::Lines(splitter) => {
                let lines = splitter.feed(chunk)?;
                for line in &lines {
                    match self.sse.decode(line) {
                        Some(SseFrame::Payload(payload)) => self.on_payload(payload, &mut out),
                        Some(SseFrame::Done) => {
                            self.finalize_into(&mut out);
                            break;
                        }
                        None => {}
                    }
                }
            }
            Framer::Braces(splitter) => {
                let blocks = splitter.feed(chunk)?;
                for block in blocks {
                    if let BlockRecord::Content {
                        text, complete: true, ..
                    } = block
                        && let Some(payload) = self.sse.decode_json(&text)
                    {
                        self.on_payload(payload, &mut out);
                    }
                }
            }
        }

        self.dispatch(&out);
        Ok(out)
    }

    /// Returns a buffer overflow held back by the last feed.
    pub fn take_overflow(&mut self) -> Option<StreamError> {
        self.framer.take_overflow()
    }

    /// Feeds raw body bytes. A chunk may end inside a UTF-8 code point.
    pub fn feed_bytes(&mut self, bytes: &[u8]) -> Result<Vec<StreamEvent>, StreamError> {
        if self.finished {
            return Ok(Vec::new());
        }
        let text = self.utf8.decode(bytes);
        self.feed(&text)
    }

    /// Signals end of input: flushes every stage and closes open
    /// constructs. Later calls return nothing.
    pub fn finish(&mut self) -> Vec<StreamEvent> {
        if self.finished {
            return Vec::new();
        }
        self.utf8.finish();
        if let Some(err) = self.framer.take_overflow() {
            tracing::warn!(%err, "buffer overflow was never collected");
        }

        let residual = match &mut self.framer {
            Framer::Lines(splitter) => splitter.finish().map(|line| line.text),
            Framer::Braces(splitter) => splitter.finish().map(|block| match block {
                BlockRecord::Content { text, .. } => text,
                BlockRecord::Open { .. } | BlockRecord::Close { .. } => String::new(),
            }),
        };
        if let Some(text) = residual.filter(|t| !t.trim().is_empty()) {
            tracing::debug!(bytes = text.len(), "dropping unterminated input at end of stream");
        }

        let mut out = Vec::new();
        self.finalize_into(&mut out);
        self.dispatch(&out);
        out
    }

    /// Processes a whole non-streaming response body.
    ///
    /// The pipeline is finalized afterwards.
    pub fn process_document(&mut self, body: &str) -> Result<Vec<StreamEvent>, StreamError> {
        if self.finished {
            return Ok(Vec::new());
        }
        let document: serde_json::Value =
            serde_json::from_str(body).map_err(|e| StreamError::ResponseFormat {
                message: format!("response body is not JSON: {e}"),
                raw: body.to_string(),
            })?;

        let mut out = Vec::new();
        for event in self.normalizer.normalize_document(document) {
            self.on_delta_event(event, &mut out);
        }
        self.finalize_into(&mut out);
        self.dispatch(&out);
        Ok(out)
    }

    /// Drives this pipeline from a byte stream, yielding events as they
    /// are decided. End of the body triggers [`finish`](Self::finish).
    ///
    /// A body error is yielded in place; the stream keeps going until
    /// the body ends.
    pub fn into_stream<S, B, E>(self, body: S) -> ChatStream
    where
        S: futures::Stream<Item = Result<B, E>> + Send + 'static,
        B: AsRef<[u8]> + Send + 'static,
        E: Into<StreamError> + Send + 'static,
    {
        let stream = body
            .map(Some)
            .chain(futures::stream::once(async { None }))
            .scan(self, |pipeline, item| {
                let batch: Vec<Result<StreamEvent, StreamError>> = match item {
                    Some(Ok(bytes)) => match pipeline.feed_bytes(bytes.as_ref()) {
                        Ok(events) => events
                            .into_iter()
                            .map(Ok)
                            .chain(pipeline.take_overflow().map(Err))
                            .collect(),
                        Err(e) => vec![Err(e)],
                    },
                    Some(Err(e)) => vec![Err(e.into())],
                    None => pipeline.finish().into_iter().map(Ok).collect(),
                };
                futures::future::ready(Some(batch))
            })
            .flat_map(futures::stream::iter);

        Box::pin(stream)
    }

    fn on_payload(&mut self, payload: SsePayload, out: &mut Vec<StreamEvent>) {
        for event in self.normalizer.normalize(payload) {
            self.on_delta_event(event, out);
        }
    }

    fn on_delta_event(&mut self, event: DeltaEvent, out: &mut Vec<StreamEvent>) {
        match event {
            DeltaEvent::Meta(meta) => out.push(StreamEvent::Meta(meta)),
            DeltaEvent::Content(text) if self.config.detect_code_fences => {
                out.extend(self.fences.feed(&text).into_iter().map(StreamEvent::from));
            }
            DeltaEvent::Content(text) => out.push(StreamEvent::Text(text)),
            DeltaEvent::ToolCall(delta) => {
                out.extend(self.tools.on_delta(delta).into_iter().map(StreamEvent::from));
            }
            DeltaEvent::Usage(usage) => out.push(StreamEvent::Usage(usage)),
            DeltaEvent::Image(image) => out.push(StreamEvent::Image(image)),
            DeltaEvent::Done { finish_reason } => {
                if !KNOWN_FINISH_REASONS.contains(&finish_reason.as_str()) {
                    tracing::warn!(%finish_reason, "unexpected finish reason");
                }
                out.extend(self.fences.finalize().into_iter().map(StreamEvent::from));
                out.extend(
                    self.tools
                        .on_finish_reason(&finish_reason)
                        .into_iter()
                        .map(StreamEvent::from),
                );
                out.push(StreamEvent::Done { finish_reason });
            }
        }
    }

    fn finalize_into(&mut self, out: &mut Vec<StreamEvent>) {
        out.extend(self.fences.finalize().into_iter().map(StreamEvent::from));
        out.extend(self.tools.finalize().into_iter().map(StreamEvent::from));
        self.finished = true;
    }

    fn dispatch(&mut self, events: &[StreamEvent]) {
        for event in events {
            for handler in &mut self.handlers {
                handler(event);
            }
        }
    }
}
