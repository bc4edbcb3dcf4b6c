//! Tool-call reassembly.
//!
//! Providers stream a tool call as a series of fragments that share an
//! `index`: the first usually carries the call id and function name, the
//! rest carry slices of the JSON arguments text, split wherever the
//! transport happened to split them. [`ToolCallAccumulator`] concatenates
//! the slices per index and emits each call's lifecycle:
//!
//! 1. [`Start`](ToolCallEvent::Start), the first time an index is seen.
//! 2. [`Arguments`](ToolCallEvent::Arguments), once per non-empty fragment,
//!    raw and in order.
//! 3. [`Complete`](ToolCallEvent::Complete), exactly once per index, on a
//!    `tool_calls` finish reason or at [`finalize`](ToolCallAccumulator::finalize).

use std::collections::BTreeMap;

use serde::{Deserialize, Serialize};
use serde_json::Value;

use crate::error::StreamError;
use crate::normalize::ToolCallDelta;

/// The finish reason that completes all pending calls.
pub const TOOL_CALLS_FINISH_REASON: &str = "tool_calls";

/// The same, from APIs that still stream the legacy `function_call`.
pub const FUNCTION_CALL_FINISH_REASON: &str = "function_call";

/// A fully reassembled tool call.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct ToolCallComplete {
    /// The call's index within the response.
    pub index: u32,
    /// Provider-assigned call id, if one was ever sent.
    pub call_id: Option<String>,
    /// Function name, if one was ever sent.
    pub function_name: Option<String>,
    /// The concatenated arguments text, unparsed.
    pub arguments: String,
}

impl ToolCallComplete {
    /// Parses the arguments text as JSON. Empty arguments parse as `{}`.
    pub fn parse_arguments(&self) -> Result<Value, StreamError> {
        if self.arguments.trim().is_empty() {
            return Ok(Value::Object(serde_json::Map::new()));
        }
        serde_json::from_str(&self.arguments).map_err(|e| StreamError::ResponseFormat {
            message: format!("tool call {} arguments are not valid JSON: {e}", self.index),
            raw: self.arguments.clone(),
        })
    }
}

/// A tool-call lifecycle event.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub enum ToolCallEvent {
    /// First sighting of an index.
    Start {
        /// The call's index.
        index: u32,
        /// Call id, if known yet.
        call_id: Option<String>,
        /// Function name, if known yet.
        function_name: Option<String>,
    },
    /// One raw arguments fragment.
    Arguments {
        /// The call's index.
        index: u32,
        /// The fragment text.
        fragment: String,
    },
    /// The call is complete.
    Complete(ToolCallComplete),
}

#[derive(Debug, Default)]
struct Accumulation {
    call_id: Option<String>,
    function_name: Option<String>,
    arguments: String,
    complete: bool,
}

/// Reassembles tool calls for one stream.
#[derive(Debug, Default)]
pub struct ToolCallAccumulator {
    calls: BTreeMap<u32, Accumulation>,
}

impl ToolCallAccumulator {
    /// Creates an empty accumulator.
    pub fn new() -> Self {
        Self::default()
    }

    /// Applies one fragment.
    pub fn on_delta(&mut self, delta: ToolCallDelta) -> Vec<ToolCallEvent> {
        let ToolCallDelta {
            index,
            call_id,
            function_name,
            arguments_fragment,
        } = delta;
        let mut events = Vec::new();

        match self.calls.get_mut(&index) {
            Some(call) if call.complete => {
                tracing::debug!(index, "dropping fragment for a completed tool call");
                return events;
            }
            Some(call) => {
                if call.call_id.is_none() {
                    call.call_id = call_id;
                }
                if call.function_name.is_none() {
                    call.function_name = function_name;
                }
            }
            None => {
                events.push(ToolCallEvent::Start {
                    index,
                    call_id: call_id.clone(),
                    function_name: function_name.clone(),
                });
                self.calls.insert(
                    index,
                    Accumulation {
                        call_id,
                        function_name,
                        ..Accumulation::default()
                    },
                );
            }
        }

        if let Some(fragment) = arguments_fragment.filter(|f| !f.is_empty())
            && let Some(call) = self.calls.get_mut(&index)
        {
            call.arguments.push_str(&fragment);
            events.push(ToolCallEvent::Arguments { index, fragment });
        }

        events
    }

    /// Completes every pending call when `reason` is `tool_calls` (or the
    /// legacy `function_call`).
    pub fn on_finish_reason(&mut self, reason: &str) -> Vec<ToolCallEvent> {
        if reason == TOOL_CALLS_FINISH_REASON || reason == FUNCTION_CALL_FINISH_REASON {
            self.complete_pending()
        } else {
            Vec::new()
        }
    }

    /// Completes every call not completed yet, in index order.
    pub fn finalize(&mut self) -> Vec<ToolCallEvent> {
        self.complete_pending()
    }

    /// Number of calls seen but not yet completed.
    pub fn pending(&self) -> usize {
        self.calls.values().filter(|c| !c.complete).count()
    }

    fn complete_pending(&mut self) -> Vec<ToolCallEvent> {
        self.calls
            .iter_mut()
            .filter(|(_, call)| !call.complete)
            .map(|(&index, call)| {
                call.complete = true;
                ToolCallEvent::Complete(ToolCallComplete {
                    index,
                    call_id: call.call_id.clone(),
                    function_name: call.function_name.clone(),
                    arguments: std::mem::take(&mut call.arguments),
                })
            })
            .collect()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn fragment(index: u32, args: &str) -> ToolCallDelta {
        ToolCallDelta {
            index,
            call_id: None,
            function_name: None,
            arguments_fragment: Some(args.into()),
        }
    }

    fn head(index: u32, id: &str, name: &str) -> ToolCallDelta {
        ToolCallDelta {
            index,
            call_id: Some(id.into()),
            function_name: Some(name.into()),
            arguments_fragment: None,
        }
    }

    fn completes(events: &[ToolCallEvent]) -> Vec<&ToolCallComplete> {
        events
            .iter()
            .filter_map(|e| match e {
                ToolCallEvent::Complete(c) => Some(c),
                _ => None,
            })
            .collect()
    }

    #[test]
    fn test_lifecycle() {
        let mut acc = ToolCallAccumulator::new();
        let mut events = acc.on_delta(head(0, "call_1", "get_weather"));
        events.extend(acc.on_delta(fragment(0, "{\"city\":")));
        events.extend(acc.on_delta(fragment(0, "\"Paris\"}")));
        events.extend(acc.on_finish_reason("tool_calls"));

        assert_eq!(
            events,
            vec![
                ToolCallEvent::Start {
                    index: 0,
                    call_id: Some("call_1".into()),
                    function_name: Some("get_weather".into()),
                },
                ToolCallEvent::Arguments {
                    index: 0,
                    fragment: "{\"city\":".into(),
                },
                ToolCallEvent::Arguments {
                    index: 0,
                    fragment: "\"Paris\"}".into(),
                },
                ToolCallEvent::Complete(ToolCallComplete {
                    index: 0,
                    call_id: Some("call_1".into()),
                    function_name: Some("get_weather".into()),
                    arguments: "{\"city\":\"Paris\"}".into(),
                }),
            ]
        );
    }

    #[test]
    fn test_reassembly_at_every_split() {
        let original = r#"{"key": "val"}"#;
        for split in 1..original.len() {
            let mut acc = ToolCallAccumulator::new();
            acc.on_delta(head(0, "c", "f"));
            acc.on_delta(fragment(0, &original[..split]));
            acc.on_delta(fragment(0, &original[split..]));
            let events = acc.finalize();
            let done = completes(&events);
            assert_eq!(done.len(), 1, "split at {split}");
            assert_eq!(done[0].arguments, original, "split at {split}");
        }
    }

    #[test]
    fn test_finish_then_finalize_completes_once() {
        let mut acc = ToolCallAccumulator::new();
        acc.on_delta(head(0, "a", "one"));
        acc.on_delta(head(1, "b", "two"));
        let first = acc.on_finish_reason("tool_calls");
        let second = acc.finalize();
        assert_eq!(completes(&first).len(), 2);
        assert!(second.is_empty());
        assert_eq!(acc.pending(), 0);
    }

    #[test]
    fn test_completion_in_index_order() {
        let mut acc = ToolCallAccumulator::new();
        acc.on_delta(head(2, "c", "three"));
        acc.on_delta(head(0, "a", "one"));
        acc.on_delta(head(1, "b", "two"));
        let events = acc.finalize();
        let indices: Vec<u32> = completes(&events).iter().map(|c| c.index).collect();
        assert_eq!(indices, [0, 1, 2]);
    }

    #[test]
    fn test_other_finish_reason_does_not_complete() {
        let mut acc = ToolCallAccumulator::new();
        acc.on_delta(head(0, "a", "one"));
        assert!(acc.on_finish_reason("stop").is_empty());
        assert_eq!(acc.pending(), 1);
        assert_eq!(completes(&acc.finalize()).len(), 1);
    }

    #[test]
    fn test_legacy_function_call_finish_reason_completes() {
        let mut acc = ToolCallAccumulator::new();
        acc.on_delta(head(0, "a", "one"));
        assert_eq!(completes(&acc.on_finish_reason(FUNCTION_CALL_FINISH_REASON)).len(), 1);
        assert_eq!(acc.pending(), 0);
    }

    #[test]
    fn test_late_id_and_name_fill_in() {
        let mut acc = ToolCallAccumulator::new();
        let start = acc.on_delta(fragment(0, "{}"));
        assert!(matches!(
            &start[0],
            ToolCallEvent::Start { call_id: None, function_name: None, .. }
        ));
        acc.on_delta(head(0, "late_id", "late_name"));
        let done = acc.finalize();
        let call = completes(&done)[0];
        assert_eq!(call.call_id.as_deref(), Some("late_id"));
        assert_eq!(call.function_name.as_deref(), Some("late_name"));
        assert_eq!(call.arguments, "{}");
    }

    #[test]
    fn test_first_id_wins() {
        let mut acc = ToolCallAccumulator::new();
        acc.on_delta(head(0, "first", "f"));
        acc.on_delta(head(0, "second", "g"));
        let done = acc.finalize();
        assert_eq!(completes(&done)[0].call_id.as_deref(), Some("first"));
    }

    #[test]
    fn test_fragment_after_completion_dropped() {
        let mut acc = ToolCallAccumulator::new();
        acc.on_delta(head(0, "a", "f"));
        acc.on_finish_reason("tool_calls");
        assert!(acc.on_delta(fragment(0, "late")).is_empty());
        assert!(acc.finalize().is_empty());
    }

    #[test]
    fn test_empty_fragment_produces_no_arguments_event() {
        let mut acc = ToolCallAccumulator::new();
        acc.on_delta(head(0, "a", "f"));
        assert!(acc.on_delta(fragment(0, "")).is_empty());
    }

    #[test]
    fn test_parse_arguments() {
        let call = ToolCallComplete {
            index: 0,
            call_id: None,
            function_name: Some("f".into()),
            arguments: r#"{"n": 3}"#.into(),
        };
        assert_eq!(call.parse_arguments().unwrap()["n"], 3);
    }

    #[test]
    fn test_parse_arguments_empty_is_object() {
        let call = ToolCallComplete {
            index: 0,
            call_id: None,
            function_name: None,
            arguments: String::new(),
        };
        assert_eq!(call.parse_arguments().unwrap(), serde_json::json!({}));
    }

    #[test]
    fn test_parse_arguments_invalid() {
        let call = ToolCallComplete {
            index: 4,
            call_id: None,
            function_name: None,
            arguments: "{\"truncated\":".into(),
        };
        let err = call.parse_arguments().unwrap_err();
        assert!(matches!(err, StreamError::ResponseFormat { ref raw, .. } if raw == "{\"truncated\":"));
    }
}
