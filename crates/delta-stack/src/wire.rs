//! Chat-completion chunk wire types.
//!
//! These mirror the JSON shapes OpenAI-compatible APIs (and the
//! aggregators in front of them) put on the wire. Every field is
//! optional and defaulted so that an unfamiliar extra field, or a
//! missing one, never costs us the whole chunk. Interpretation happens
//! in [`normalize`](crate::normalize).

use serde::Deserialize;
use serde_json::Value;

/// One streamed chunk, or a whole non-streaming response whose
/// `message` fields have been relabeled `delta`.
#[derive(Debug, Default, Deserialize)]
#[serde(default)]
pub(crate) struct ChunkPayload {
    pub id: Option<String>,
    pub provider: Option<String>,
    pub model: Option<String>,
    /// Usually an integer timestamp; kept loose so a float never drops the chunk.
    pub created: Option<Value>,
    pub system_fingerprint: Option<String>,
    pub choices: Vec<WireChoice>,
    pub usage: Option<WireUsage>,
    /// Image-generation responses: `data: [{b64_json | url}]`.
    pub data: Option<Vec<WireImage>>,
}

/// A choice within a chunk.
#[derive(Debug, Default, Deserialize)]
#[serde(default)]
pub(crate) struct WireChoice {
    pub delta: Option<WireDelta>,
    pub finish_reason: Option<String>,
}

/// The incremental part of a choice.
#[derive(Debug, Default, Deserialize)]
#[serde(default)]
pub(crate) struct WireDelta {
    pub content: Option<WireContent>,
    pub tool_calls: Option<Vec<WireToolCall>>,
    pub function_call: Option<WireFunction>,
    pub images: Option<Vec<WireImage>>,
}

/// `content` is a string for most providers and an array of typed
/// parts for Claude-style ones.
#[derive(Debug, Deserialize)]
#[serde(untagged)]
pub(crate) enum WireContent {
    Text(String),
    Parts(Vec<WirePart>),
    Other(serde::de::IgnoredAny),
}

/// A typed content part. `kind` is the part's `type` field.
#[derive(Debug, Default, Deserialize)]
#[serde(default)]
pub(crate) struct WirePart {
    #[serde(rename = "type")]
    pub kind: Option<String>,
    pub text: Option<String>,
    pub id: Option<String>,
    pub name: Option<String>,
    pub input: Option<Value>,
}

/// Tool call delta in a streaming chunk.
#[derive(Debug, Default, Deserialize)]
#[serde(default)]
pub(crate) struct WireToolCall {
    pub index: Option<u32>,
    pub id: Option<String>,
    pub function: Option<WireFunction>,
}

/// Function name and argument fragment; also the legacy `function_call`.
#[derive(Debug, Default, Deserialize)]
#[serde(default)]
pub(crate) struct WireFunction {
    pub name: Option<String>,
    pub arguments: Option<String>,
}

/// An image, either inline base64 or by URL.
#[derive(Debug, Default, Deserialize)]
#[serde(default)]
pub(crate) struct WireImage {
    pub index: Option<u32>,
    pub b64_json: Option<String>,
    pub url: Option<String>,
    pub image_url: Option<WireImageUrl>,
}

/// `{"image_url": {"url": "..."}}`.
#[derive(Debug, Default, Deserialize)]
#[serde(default)]
pub(crate) struct WireImageUrl {
    pub url: Option<String>,
}

/// Token usage, sent once near the end of a stream.
#[derive(Debug, Default, Deserialize)]
#[serde(default)]
pub(crate) struct WireUsage {
    pub prompt_tokens: Option<u64>,
    pub completion_tokens: Option<u64>,
    pub total_tokens: Option<u64>,
    pub cost: Option<f64>,
}
