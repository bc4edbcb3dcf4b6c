//! Provider chunk shapes → one normalized event vocabulary.
//!
//! Streaming chunks carry a `delta` per choice; non-streaming responses
//! carry a `message`, which [`DeltaNormalizer::normalize_document`]
//! relabels as `delta` before taking the same path.
//!
//! Within a delta, content and tool calls are each classified into a
//! small closed set of shapes and handled by exhaustive matches:
//!
//! | Shape | Source | Event |
//! |-------|--------|-------|
//! | text | string `content` | [`DeltaEvent::Content`] |
//! | tool calls | `tool_calls[]` | [`DeltaEvent::ToolCall`] per entry |
//! | legacy call | `function_call` | [`DeltaEvent::ToolCall`] at index 0 |
//! | parts | array `content` | `tool_use` parts as calls, else joined `text` parts |

use std::collections::HashMap;

use serde::{Deserialize, Serialize};
use serde_json::Value;

use crate::sse::SsePayload;
use crate::usage::Usage;
use crate::wire::{ChunkPayload, WireContent, WireDelta, WireFunction, WireImage, WirePart, WireToolCall};

/// Stream-level metadata, taken from the first chunk that has an `id`.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct StreamMeta {
    /// Response / generation id.
    pub id: String,
    /// Upstream provider name, when an aggregator reports one.
    pub provider: Option<String>,
    /// The model that actually served the request.
    pub model: Option<String>,
    /// Unix timestamp of creation.
    pub created: Option<i64>,
    /// `system_fingerprint`.
    pub fingerprint: Option<String>,
}

/// One fragment of a tool call.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct ToolCallDelta {
    /// Stable per call within one response.
    pub index: u32,
    /// Provider-assigned call id, usually only on the first fragment.
    pub call_id: Option<String>,
    /// Function name, usually only on the first fragment.
    pub function_name: Option<String>,
    /// Raw slice of the JSON arguments text.
    pub arguments_fragment: Option<String>,
}

/// A generated image.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct ImageData {
    /// Position of the image within its array.
    pub index: u32,
    /// Inline base64 payload.
    pub base64: Option<String>,
    /// Remote URL.
    pub url: Option<String>,
}

/// A normalized event.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[non_exhaustive]
pub enum DeltaEvent {
    /// At most once per stream.
    Meta(StreamMeta),
    /// Non-empty text.
    Content(String),
    /// A tool-call fragment.
    ToolCall(ToolCallDelta),
    /// At most once per stream.
    Usage(Usage),
    /// An image.
    Image(ImageData),
    /// At most once per stream.
    Done {
        /// The raw `finish_reason`.
        finish_reason: String,
    },
}

enum ContentShape<'a> {
    Text(&'a str),
    Parts(&'a [WirePart]),
    Empty,
}

impl<'a> ContentShape<'a> {
    fn classify(delta: &'a WireDelta) -> Self {
        match &delta.content {
            Some(WireContent::Text(text)) if !text.is_empty() => Self::Text(text),
            Some(WireContent::Parts(parts)) if !parts.is_empty() => Self::Parts(parts),
            _ => Self::Empty,
        }
    }
}

enum CallShape<'a> {
    ToolCalls(&'a [WireToolCall]),
    Legacy(&'a WireFunction),
    None,
}

impl<'a> CallShape<'a> {
    fn classify(delta: &'a WireDelta) -> Self {
        match (&delta.tool_calls, &delta.function_call) {
            (Some(calls), _) if !calls.is_empty() => Self::ToolCalls(calls),
            (_, Some(function)) => Self::Legacy(function),
            _ => Self::None,
        }
    }
}

/// Maps chunk payloads to [`DeltaEvent`]s for one stream.
#[derive(Debug, Default)]
pub struct DeltaNormalizer {
    meta_emitted: bool,
    usage_emitted: bool,
    done_emitted: bool,
    tool_use: ToolUseIndices,
}

/// Stream-wide indices for `tool_use` content parts, keyed by part id.
#[derive(Debug, Default)]
struct ToolUseIndices {
    by_id: HashMap<String, u32>,
    allocated: u32,
    latest: Option<u32>,
}

impl ToolUseIndices {
    /// An unseen id opens a new call; a part without an id continues the
    /// latest one.
    fn index_for(&mut self, id: Option<&str>) -> u32 {
        let index = match id.filter(|id| !id.is_empty()) {
            Some(id) => match self.by_id.get(id) {
                Some(&index) => index,
                None => {
                    let index = self.allocate();
                    self.by_id.insert(id.to_string(), index);
                    index
                }
            },
            None => match self.latest {
                Some(index) => index,
                None => self.allocate(),
            },
        };
        self.latest = Some(index);
        index
    }

    fn allocate(&mut self) -> u32 {
        let index = self.allocated;
        self.allocated = self.allocated.saturating_add(1);
        index
    }
}

impl DeltaNormalizer {
    /// Creates a normalizer for one stream.
    pub fn new() -> Self {
        Self::default()
    }

    /// Normalizes one SSE payload.
    pub fn normalize(&mut self, payload: SsePayload) -> Vec<DeltaEvent> {
        self.normalize_value(payload.json)
    }

    /// Normalizes a whole non-streaming response.
    pub fn normalize_document(&mut self, mut document: Value) -> Vec<DeltaEvent> {
        relabel_messages(&mut document);
        self.normalize_value(document)
    }

    /// Returns `true` once a `Done` has been emitted.
    pub fn is_done(&self) -> bool {
        self.done_emitted
    }

    fn normalize_value(&mut self, json: Value) -> Vec<DeltaEvent> {
        let chunk: ChunkPayload = match serde_json::from_value(json) {
            Ok(chunk) => chunk,
            Err(e) => {
                tracing::debug!(error = %e, "dropping payload that does not match the chunk schema");
                return Vec::new();
            }
        };

        let mut events = Vec::new();

        if !self.meta_emitted
            && let Some(id) = &chunk.id
        {
            self.meta_emitted = true;
            events.push(DeltaEvent::Meta(StreamMeta {
                id: id.clone(),
                provider: chunk.provider.clone(),
                model: chunk.model.clone(),
                created: chunk.created.as_ref().and_then(created_timestamp),
                fingerprint: chunk.system_fingerprint.clone(),
            }));
        }

        let choice = chunk.choices.first();
        if let Some(delta) = choice.and_then(|c| c.delta.as_ref()) {
            self.push_delta_events(delta, &mut events);
        }

        if let Some(images) = &chunk.data {
            push_images(images, &mut events);
        }

        if let Some(usage) = &chunk.usage {
            if self.usage_emitted {
                tracing::debug!("ignoring repeated usage block");
            } else {
                self.usage_emitted = true;
                events.push(DeltaEvent::Usage(Usage::from(usage)));
            }
        }

        if let Some(reason) = choice
            .and_then(|c| c.finish_reason.as_deref())
            .filter(|r| !r.is_empty())
            && !self.done_emitted
        {
            self.done_emitted = true;
            events.push(DeltaEvent::Done {
                finish_reason: reason.to_string(),
            });
        }

        events
    }

    fn push_delta_events(&mut self, delta: &WireDelta, events: &mut Vec<DeltaEvent>) {
        let content = ContentShape::classify(delta);

        if let ContentShape::Text(text) = content {
            events.push(DeltaEvent::Content(text.to_string()));
        }

        match CallShape::classify(delta) {
            CallShape::ToolCalls(calls) => {
                for (position, call) in calls.iter().enumerate() {
                    let function = call.function.as_ref();
                    push_tool_call(
                        events,
                        call.index.unwrap_or_else(|| index_of(position)),
                        call.id.as_deref(),
                        function.and_then(|f| f.name.as_deref()),
                        function.and_then(|f| f.arguments.clone()),
                    );
                }
            }
            CallShape::Legacy(function) => push_tool_call(
                events,
                0,
                None,
                function.name.as_deref(),
                function.arguments.clone(),
            ),
            CallShape::None => {}
        }

        if let ContentShape::Parts(parts) = content {
            self.push_parts(parts, events);
        }

        if let Some(images) = &delta.images {
            push_images(images, events);
        }
    }

    fn push_parts(&mut self, parts: &[WirePart], events: &mut Vec<DeltaEvent>) {
        let tool_uses: Vec<&WirePart> = parts
            .iter()
            .filter(|p| p.kind.as_deref() == Some("tool_use"))
            .collect();

        if tool_uses.is_empty() {
            let text: String = parts
                .iter()
                .filter(|p| p.kind.as_deref() == Some("text"))
                .filter_map(|p| p.text.as_deref())
                .collect();
            if !text.is_empty() {
                events.push(DeltaEvent::Content(text));
            }
            return;
        }

        for part in tool_uses {
            let arguments = part.input.as_ref().map(|input| match input {
                Value::String(raw) => raw.clone(),
                other => other.to_string(),
            });
            push_tool_call(
                events,
                self.tool_use.index_for(part.id.as_deref()),
                part.id.as_deref(),
                part.name.as_deref(),
                arguments,
            );
        }
    }
}

fn push_tool_call(
    events: &mut Vec<DeltaEvent>,
    index: u32,
    call_id: Option<&str>,
    function_name: Option<&str>,
    arguments: Option<String>,
) {
    let delta = ToolCallDelta {
        index,
        call_id: non_empty(call_id),
        function_name: non_empty(function_name),
        arguments_fragment: arguments.filter(|a| !a.is_empty()),
    };
    if delta.call_id.is_none() && delta.function_name.is_none() && delta.arguments_fragment.is_none() {
        return;
    }
    events.push(DeltaEvent::ToolCall(delta));
}

fn push_images(images: &[WireImage], events: &mut Vec<DeltaEvent>) {
    for (position, image) in images.iter().enumerate() {
        let url = image
            .url
            .as_deref()
            .or_else(|| image.image_url.as_ref().and_then(|u| u.url.as_deref()));

        let (base64, url) = match (image.b64_json.as_deref(), url) {
            (Some(b64), url) => (Some(b64.to_string()), url.map(str::to_string)),
            (None, Some(url)) => match split_data_url(url) {
                Some(b64) => (Some(b64.to_string()), None),
                None => (None, Some(url.to_string())),
            },
            (None, None) => continue,
        };

        events.push(DeltaEvent::Image(ImageData {
            index: image.index.unwrap_or_else(|| index_of(position)),
            base64,
            url,
        }));
    }
}

/// Returns the payload of a `data:<mime>;base64,<payload>` URL.
fn split_data_url(url: &str) -> Option<&str> {
    let rest = url.strip_prefix("data:")?;
    let (_, payload) = rest.split_once(";base64,")?;
    Some(payload)
}

fn relabel_messages(document: &mut Value) {
    let Some(choices) = document.get_mut("choices").and_then(Value::as_array_mut) else {
        return;
    };
    for choice in choices {
        if let Some(object) = choice.as_object_mut()
            && !object.contains_key("delta")
            && let Some(message) = object.remove("message")
        {
            object.insert("delta".into(), message);
        }
    }
}

fn created_timestamp(value: &Value) -> Option<i64> {
    #[allow(clippy::cast_possible_truncation)]
    value.as_i64().or_else(|| value.as_f64().map(|f| f as i64))
}

fn non_empty(value: Option<&str>) -> Option<String> {
    value.filter(|v| !v.is_empty()).map(str::to_string)
}

fn index_of(position: usize) -> u32 {
    u32::try_from(position).unwrap_or(u32::MAX)
}
