//! Reassembly of streamed completions.

use std::collections::BTreeMap;

use serde_json::{Value, json};

use super::types::{Completion, CompletionDelta};

#[derive(Debug, Default)]
struct PartialCall {
    id: String,
    name: String,
    arguments: String,
}

/// Folds [`CompletionDelta`]s into the [`Completion`] a non-streaming
/// request would have returned.
///
/// Tool-call fragments are keyed by index: the first fragment carrying an id
/// or name sets it, every fragment appends argument text.
#[derive(Debug, Default)]
pub struct StreamAccumulator {
    content: String,
    calls: BTreeMap<usize, PartialCall>,
    finish_reason: Option<String>,
}

impl StreamAccumulator {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn push(&mut self, delta: CompletionDelta) {
        if let Some(text) = delta.content {
            self.content.push_str(&text);
        }
        for fragment in delta.tool_calls {
            let call = self.calls.entry(fragment.index).or_default();
            // Some servers repeat id and name on every fragment.
            if let Some(id) = fragment.id.filter(|_| call.id.is_empty()) {
                call.id = id;
            }
            if let Some(name) = fragment.name.filter(|_| call.name.is_empty()) {
                call.name = name;
            }
            if let Some(arguments) = fragment.arguments {
                call.arguments.push_str(&arguments);
            }
        }
        if delta.finish_reason.is_some() {
            self.finish_reason = delta.finish_reason;
        }
    }

    pub fn finish(self) -> Completion {
        let tool_calls: Vec<Value> = self
            .calls
            .into_values()
            .map(|call| {
                json!({
                    "id": call.id,
                    "type": "function",
                    "function": {"name": call.name, "arguments": call.arguments}
                })
            })
            .collect();

        Completion {
            content: (!self.content.is_empty()).then_some(self.content),
            tool_calls,
            finish_reason: self.finish_reason,
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::llm::types::ToolCallDelta;

    fn fragment(index: usize, id: Option<&str>, name: Option<&str>, args: &str) -> CompletionDelta {
        CompletionDelta {
            content: None,
            tool_calls: vec![ToolCallDelta {
                index,
                id: id.map(str::to_string),
                name: name.map(str::to_string),
                arguments: Some(args.to_string()),
            }],
            finish_reason: None,
        }
    }

    #[test]
    fn concatenates_content() {
        let mut acc = StreamAccumulator::new();
        for text in ["Hel", "lo", ""] {
            acc.push(CompletionDelta {
                content: Some(text.to_string()),
                ..Default::default()
            });
        }
        acc.push(CompletionDelta {
            finish_reason: Some("stop".into()),
            ..Default::default()
        });
        let completion = acc.finish();
        assert_eq!(completion.content.as_deref(), Some("Hello"));
        assert_eq!(completion.finish_reason.as_deref(), Some("stop"));
        assert!(completion.tool_calls.is_empty());
    }

    #[test]
    fn reassembles_interleaved_calls_by_index() {
        let mut acc = StreamAccumulator::new();
        acc.push(fragment(1, Some("c2"), Some("second"), ""));
        acc.push(fragment(0, Some("c1"), Some("first"), "{\"a\""));
        acc.push(fragment(1, None, None, "{}"));
        acc.push(fragment(0, None, None, ":1}"));
        acc.push(CompletionDelta {
            finish_reason: Some("tool_calls".into()),
            ..Default::default()
        });

        let completion = acc.finish();
        assert_eq!(completion.content, None);
        assert_eq!(
            completion.tool_calls,
            vec![
                json!({"id": "c1", "type": "function", "function": {"name": "first", "arguments": "{\"a\":1}"}}),
                json!({"id": "c2", "type": "function", "function": {"name": "second", "arguments": "{}"}}),
            ]
        );
    }

    #[test]
    fn repeated_id_and_name_are_kept_once() {
        let mut acc = StreamAccumulator::new();
        acc.push(fragment(0, Some("call_1"), Some("search"), "{\"q\""));
        acc.push(fragment(0, Some("call_1"), Some("search"), ":\"x\"}"));

        let completion = acc.finish();
        assert_eq!(
            completion.tool_calls,
            vec![json!({
                "id": "call_1",
                "type": "function",
                "function": {"name": "search", "arguments": "{\"q\":\"x\"}"}
            })]
        );
    }
}
