//! Await-the-whole-result access mode.
//!
//! [`ChatOutcome`] folds a sequence of [`StreamEvent`]s into the final
//! response: prose, code blocks, completed tool calls, usage and the
//! finish reason.

use futures::StreamExt;
use serde::{Deserialize, Serialize};

use crate::error::StreamError;
use crate::normalize::{ImageData, StreamMeta};
use crate::stream::{ChatStream, StreamEvent};
use crate::tool_call::ToolCallComplete;
use crate::usage::Usage;

/// A fenced code block, reassembled.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct CodeBlock {
    /// Per-stream block id.
    pub block_id: String,
    /// Language tag, possibly empty.
    pub language: String,
    /// The code, without the fences.
    pub code: String,
}

/// The accumulated result of one response.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct ChatOutcome {
    /// Response metadata, if the API sent an id.
    pub meta: Option<StreamMeta>,
    /// Prose outside code blocks, concatenated.
    pub text: String,
    /// The whole content as markdown, code blocks re-fenced in place.
    pub content: String,
    /// Code blocks in the order they were opened.
    pub code_blocks: Vec<CodeBlock>,
    /// Completed tool calls in completion order.
    pub tool_calls: Vec<ToolCallComplete>,
    /// Generated images.
    pub images: Vec<ImageData>,
    /// Token usage, if reported.
    pub usage: Option<Usage>,
    /// The finish reason, if the model sent one.
    pub finish_reason: Option<String>,
}

impl ChatOutcome {
    /// Folds one event into the outcome.
    pub fn apply(&mut self, event: &StreamEvent) {
        match event {
            StreamEvent::Meta(meta) => self.meta = Some(meta.clone()),
            StreamEvent::Text(text) => {
                self.text.push_str(text);
                self.content.push_str(text);
            }
            StreamEvent::BlockOpen { block_id, language } => {
                self.content.push_str("```");
                self.content.push_str(language);
                self.content.push('\n');
                self.code_blocks.push(CodeBlock {
                    block_id: block_id.clone(),
                    language: language.clone(),
                    code: String::new(),
                });
            }
            StreamEvent::Code { block_id, text } => {
                self.content.push_str(text);
                if let Some(block) = self
                    .code_blocks
                    .iter_mut()
                    .rev()
                    .find(|b| b.block_id == *block_id)
                {
                    block.code.push_str(text);
                }
            }
            StreamEvent::ToolCallComplete(call) => self.tool_calls.push(call.clone()),
            StreamEvent::Image(image) => self.images.push(image.clone()),
            StreamEvent::Usage(usage) => self.usage = Some(usage.clone()),
            StreamEvent::Done { finish_reason } => self.finish_reason = Some(finish_reason.clone()),
            StreamEvent::BlockClose { .. } => self.content.push_str("\n```\n"),
            StreamEvent::ToolCallStart { .. }
            | StreamEvent::ToolCallArguments { .. } => {}
        }
    }

    /// Folds a finished list of events.
    pub fn from_events<'a, I>(events: I) -> Self
    where
        I: IntoIterator<Item = &'a StreamEvent>,
    {
        let mut outcome = Self::default();
        for event in events {
            outcome.apply(event);
        }
        outcome
    }

    /// Drains a [`ChatStream`], stopping at the first error.
    pub async fn collect(mut stream: ChatStream) -> Result<Self, StreamError> {
        let mut outcome = Self::default();
        while let Some(event) = stream.next().await {
            outcome.apply(&event?);
        }
        Ok(outcome)
    }

    /// Returns `true` if the model stopped to call tools.
    pub fn has_tool_calls(&self) -> bool {
        !self.tool_calls.is_empty()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn events() -> Vec<StreamEvent> {
        vec![
            StreamEvent::Meta(StreamMeta {
                id: "gen-1".into(),
                provider: None,
                model: Some("m".into()),
                created: None,
                fingerprint: None,
            }),
            StreamEvent::Text("Use this:\n".into()),
            StreamEvent::BlockOpen {
                block_id: "block-0".into(),
                language: "sh".into(),
            },
            StreamEvent::Code {
                block_id: "block-0".into(),
                text: "ls ".into(),
            },
            StreamEvent::Code {
                block_id: "block-0".into(),
                text: "-la".into(),
            },
            StreamEvent::BlockClose {
                block_id: "block-0".into(),
            },
            StreamEvent::ToolCallStart {
                index: 0,
                call_id: Some("c".into()),
                function_name: Some("run".into()),
            },
            StreamEvent::ToolCallComplete(ToolCallComplete {
                index: 0,
                call_id: Some("c".into()),
                function_name: Some("run".into()),
                arguments: "{}".into(),
            }),
            StreamEvent::Usage(Usage {
                prompt_tokens: 1,
                completion_tokens: 1,
                total_tokens: 2,
                cost: None,
            }),
            StreamEvent::Done {
                finish_reason: "tool_calls".into(),
            },
        ]
    }

    #[test]
    fn test_from_events() {
        let outcome = ChatOutcome::from_events(&events());
        assert_eq!(outcome.meta.as_ref().map(|m| m.id.as_str()), Some("gen-1"));
        assert_eq!(outcome.text, "Use this:\n");
        assert_eq!(
            outcome.code_blocks,
            vec![CodeBlock {
                block_id: "block-0".into(),
                language: "sh".into(),
                code: "ls -la".into(),
            }]
        );
        assert!(outcome.has_tool_calls());
        assert_eq!(outcome.usage.as_ref().map(|u| u.total_tokens), Some(2));
        assert_eq!(outcome.finish_reason.as_deref(), Some("tool_calls"));
    }

    #[test]
    fn test_content_refences_blocks() {
        let outcome = ChatOutcome::from_events(&events());
        assert_eq!(outcome.content, "Use this:\n```sh\nls -la\n```\n");
    }

    #[tokio::test]
    async fn test_collect_stream() {
        let stream: ChatStream = Box::pin(futures::stream::iter(events().into_iter().map(Ok::<_, StreamError>)));
        let outcome = ChatOutcome::collect(stream).await.unwrap();
        assert_eq!(outcome.tool_calls.len(), 1);
    }

    #[tokio::test]
    async fn test_collect_stops_at_error() {
        let items = vec![
            Ok(StreamEvent::Text("partial".into())),
            Err(StreamError::BufferOverflow { limit: 1 }),
            Ok(StreamEvent::Text("never".into())),
        ];
        let stream: ChatStream = Box::pin(futures::stream::iter(items));
        let err = ChatOutcome::collect(stream).await.unwrap_err();
        assert!(matches!(err, StreamError::BufferOverflow { limit: 1 }));
    }
}
