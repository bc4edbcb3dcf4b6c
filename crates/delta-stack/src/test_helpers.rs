//! Pre-built helpers for testing code that uses `delta-stack`.
//!
//! Available when the `test-utils` feature is enabled, allowing
//! downstream crates to reuse these utilities in their own test
//! suites. Also compiled during `#[cfg(test)]` for this crate's own
//! tests. Provides SSE body builders, chunk splitters and pipeline
//! drivers.

use futures::StreamExt;

use crate::config::PipelineConfig;
use crate::error::StreamError;
use crate::pipeline::ChatPipeline;
use crate::stream::{ChatStream, StreamEvent};

/// Wraps one JSON payload as an SSE record: `data: <json>\n\n`.
pub fn sse_data(json: &str) -> String {
    format!("data: {json}\n\n")
}

/// Builds an SSE body from payloads, terminated by `data: [DONE]`.
pub fn sse_body(payloads: &[&str]) -> String {
    let mut body: String = payloads.iter().map(|p| sse_data(p)).collect();
    body.push_str("data: [DONE]\n\n");
    body
}

/// Builds an SSE body whose payloads each carry one content delta.
pub fn content_body(deltas: &[&str]) -> String {
    let payloads: Vec<String> = deltas
        .iter()
        .map(|d| serde_json::json!({"choices": [{"delta": {"content": d}}]}).to_string())
        .collect();
    let refs: Vec<&str> = payloads.iter().map(String::as_str).collect();
    sse_body(&refs)
}

/// Splits `bytes` at the given offsets. Offsets are sorted, deduplicated
/// and clamped to the input length.
pub fn split_at_offsets(bytes: &[u8], offsets: &[usize]) -> Vec<Vec<u8>> {
    let mut cuts: Vec<usize> = offsets.iter().map(|&o| o.min(bytes.len())).collect();
    cuts.sort_unstable();
    cuts.dedup();

    let mut chunks = Vec::with_capacity(cuts.len() + 1);
    let mut start = 0;
    for cut in cuts {
        chunks.push(bytes[start..cut].to_vec());
        start = cut;
    }
    chunks.push(bytes[start..].to_vec());
    chunks
}

/// Splits `bytes` into two chunks at every possible offset.
pub fn every_split(bytes: &[u8]) -> impl Iterator<Item = Vec<Vec<u8>>> + '_ {
    (0..=bytes.len()).map(move |offset| split_at_offsets(bytes, &[offset]))
}

/// Splits `text` into chunks of at most `size` characters.
pub fn char_chunks(text: &str, size: usize) -> Vec<String> {
    let chars: Vec<char> = text.chars().collect();
    chars.chunks(size.max(1)).map(|c| c.iter().collect()).collect()
}

/// Feeds byte chunks through a fresh pipeline and returns every event,
/// including those from `finish`. Panics on a pipeline error.
pub fn run_bytes<C: AsRef<[u8]>>(config: PipelineConfig, chunks: &[C]) -> Vec<StreamEvent> {
    let mut pipeline = ChatPipeline::new(config);
    let mut events = Vec::new();
    for chunk in chunks {
        events.extend(pipeline.feed_bytes(chunk.as_ref()).expect("pipeline error"));
    }
    events.extend(pipeline.finish());
    events
}

/// Feeds text chunks through a fresh default pipeline.
pub fn run_text<C: AsRef<str>>(chunks: &[C]) -> Vec<StreamEvent> {
    let mut pipeline = ChatPipeline::default();
    let mut events = Vec::new();
    for chunk in chunks {
        events.extend(pipeline.feed(chunk.as_ref()).expect("pipeline error"));
    }
    events.extend(pipeline.finish());
    events
}

/// Collect stream events, returning results including errors.
pub async fn collect_stream_results(stream: ChatStream) -> Vec<Result<StreamEvent, StreamError>> {
    stream.collect::<Vec<_>>().await
}

/// Collect stream events, panicking on any error.
/// Use `collect_stream_results` when testing error scenarios.
pub async fn collect_stream(stream: ChatStream) -> Vec<StreamEvent> {
    stream
        .map(|r| r.expect("stream yielded an error"))
        .collect()
        .await
}

/// Concatenates the text of every `Text` and `Code` event.
pub fn all_content(events: &[StreamEvent]) -> String {
    events
        .iter()
        .filter_map(|e| match e {
            StreamEvent::Text(t) | StreamEvent::Code { text: t, .. } => Some(t.as_str()),
            _ => None,
        })
        .collect()
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_sse_body() {
        assert_eq!(sse_body(&["{}"]), "data: {}\n\ndata: [DONE]\n\n");
    }

    #[test]
    fn test_content_body_escapes() {
        let body = content_body(&["a\"b\n"]);
        assert!(body.starts_with(r#"data: {"choices":[{"delta":{"content":"a\"b\n"}}]}"#));
    }

    #[test]
    fn test_split_at_offsets() {
        let chunks = split_at_offsets(b"abcdef", &[4, 2, 2, 99]);
        assert_eq!(chunks, vec![b"ab".to_vec(), b"cd".to_vec(), b"ef".to_vec(), Vec::new()]);
    }

    #[test]
    fn test_every_split_count() {
        assert_eq!(every_split(b"abc").count(), 4);
        for chunks in every_split(b"abc") {
            assert_eq!(chunks.concat(), b"abc");
        }
    }

    #[test]
    fn test_char_chunks_respects_code_points() {
        assert_eq!(char_chunks("héllo", 2), ["hé", "ll", "o"]);
    }

    #[test]
    fn test_run_text() {
        let events = run_text(&[content_body(&["x"])]);
        assert_eq!(events, vec![StreamEvent::Text("x".into())]);
    }

    #[tokio::test]
    async fn test_collect_stream() {
        let stream: ChatStream = Box::pin(futures::stream::iter(vec![
            Ok::<_, StreamError>(StreamEvent::Text("a".into())),
            Ok(StreamEvent::Text("b".into())),
        ]));
        let events = collect_stream(stream).await;
        assert_eq!(all_content(&events), "ab");
    }
}
