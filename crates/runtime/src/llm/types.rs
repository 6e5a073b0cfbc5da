//! Chat-completion types in the OpenAI function-calling shape.
//!
//! History messages, tool specs and canonical tool calls serialize exactly
//! as the provider expects them. Raw tool calls coming back from a model are
//! classified into [`CallShape`] before anything else touches them.

use serde::{Deserialize, Serialize};
use serde_json::{Value, json};

/// Role of a message participant.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum Role {
    System,
    User,
    Assistant,
    Tool,
}

/// Function half of a canonical tool call.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct FunctionCall {
    pub name: String,
    /// Arguments as a JSON-encoded string.
    pub arguments: String,
}

/// A tool call as it is recorded in history and replayed to the model.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct ToolCall {
    pub id: String,
    #[serde(rename = "type")]
    pub kind: String,
    pub function: FunctionCall,
}

impl ToolCall {
    pub fn function(
        id: impl Into<String>,
        name: impl Into<String>,
        arguments: impl Into<String>,
    ) -> Self {
        Self {
            id: id.into(),
            kind: "function".to_string(),
            function: FunctionCall {
                name: name.into(),
                arguments: arguments.into(),
            },
        }
    }
}

/// A message in the conversation.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Message {
    pub role: Role,
    #[serde(default)]
    pub content: String,
    #[serde(default, skip_serializing_if = "Vec::is_empty")]
    pub tool_calls: Vec<ToolCall>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub tool_call_id: Option<String>,
}

impl Message {
    fn new(role: Role, content: impl Into<String>) -> Self {
        Self {
            role,
            content: content.into(),
            tool_calls: Vec::new(),
            tool_call_id: None,
        }
    }

    pub fn system(content: impl Into<String>) -> Self {
        Self::new(Role::System, content)
    }

    pub fn user(content: impl Into<String>) -> Self {
        Self::new(Role::User, content)
    }

    /// Create an assistant message, optionally carrying tool calls.
    pub fn assistant(content: impl Into<String>, tool_calls: Vec<ToolCall>) -> Self {
        Self {
            tool_calls,
            ..Self::new(Role::Assistant, content)
        }
    }

    /// Create a tool message answering the call with `call_id`.
    pub fn tool(call_id: impl Into<String>, output: impl Into<String>) -> Self {
        Self {
            tool_call_id: Some(call_id.into()),
            ..Self::new(Role::Tool, output)
        }
    }
}

/// Function schema half of a [`ToolSpec`].
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct FunctionSpec {
    pub name: String,
    pub description: String,
    /// JSON Schema for the function's parameters.
    pub parameters: Value,
}

/// Tool specification exposed to the model.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ToolSpec {
    #[serde(rename = "type")]
    pub kind: String,
    pub function: FunctionSpec,
}

impl ToolSpec {
    pub fn function(
        name: impl Into<String>,
        description: impl Into<String>,
        parameters: Value,
    ) -> Self {
        Self {
            kind: "function".to_string(),
            function: FunctionSpec {
                name: name.into(),
                description: description.into(),
                parameters,
            },
        }
    }

    pub fn name(&self) -> &str {
        &self.function.name
    }
}

/// Output of one executed tool call, paired with the call ID.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct ToolResult {
    pub call_id: String,
    pub output: String,
}

impl ToolResult {
    pub fn new(call_id: impl Into<String>, output: impl Into<String>) -> Self {
        Self {
            call_id: call_id.into(),
            output: output.into(),
        }
    }
}

/// Why the model stopped generating.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum FinishReason {
    /// Natural end of the turn.
    Stop,
    /// The model wants tools executed before it continues.
    ToolCalls,
    /// Output was cut off at the token limit.
    Length,
    /// Output was withheld by the provider's filter.
    ContentFilter,
    /// Anything the provider invents later.
    Other(String),
}

impl FinishReason {
    pub fn parse(raw: &str) -> Self {
        match raw {
            "stop" => Self::Stop,
            "tool_calls" => Self::ToolCalls,
            "length" => Self::Length,
            "content_filter" => Self::ContentFilter,
            other => Self::Other(other.to_string()),
        }
    }
}

/// Provider-independent result of one completion request.
///
/// Streaming and non-streaming transports both produce this; tool calls stay
/// raw here and are classified by the client.
#[derive(Debug, Clone, Default, PartialEq)]
pub struct Completion {
    pub content: Option<String>,
    pub tool_calls: Vec<Value>,
    pub finish_reason: Option<String>,
}

/// One incremental piece of a streamed completion.
#[derive(Debug, Clone, Default, PartialEq)]
pub struct CompletionDelta {
    pub content: Option<String>,
    pub tool_calls: Vec<ToolCallDelta>,
    pub finish_reason: Option<String>,
}

/// Fragment of a streamed tool call, keyed by its position in the response.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct ToolCallDelta {
    pub index: usize,
    pub id: Option<String>,
    pub name: Option<String>,
    pub arguments: Option<String>,
}

/// Request handed to a [`Backend`](super::Backend).
#[derive(Debug, Clone, Copy)]
pub struct CompletionRequest<'a> {
    pub model: &'a str,
    pub messages: &'a [Message],
    pub tools: &'a [ToolSpec],
    pub temperature: f32,
    pub max_tokens: u32,
}

/// Raw arguments of a pending tool call, before normalization.
#[derive(Debug, Clone, PartialEq)]
pub enum RawArguments {
    Text(String),
    Structured(Value),
}

/// A tool call extracted from a model response and ready for dispatch.
#[derive(Debug, Clone, PartialEq)]
pub struct PendingToolCall {
    pub id: String,
    /// Name as the model used it (the sanitized name).
    pub name: String,
    pub arguments: RawArguments,
}

/// Why a raw tool call could not be dispatched.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum ShapeError {
    MissingId { name: String },
    Unrecognized(String),
}

impl std::fmt::Display for ShapeError {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            Self::MissingId { name } => write!(f, "tool call for {name} has no id"),
            Self::Unrecognized(raw) => write!(f, "unrecognized tool call shape: {raw}"),
        }
    }
}

/// A raw tool call as a model returned it.
///
/// Providers (and SDKs wrapping them) disagree on the exact shape: some
/// deliver typed objects whose arguments are a JSON string, others hand
/// back loose maps whose arguments are already decoded. Anything else is
/// kept verbatim so it can be reported.
#[derive(Debug, Clone, PartialEq)]
pub enum CallShape {
    /// `{id, function: {name, arguments: "<json>"}}`
    Structured {
        id: String,
        name: String,
        arguments: String,
    },
    /// `{id?, function: {name, arguments: <any>}}`
    KeyValue {
        id: Option<String>,
        name: String,
        arguments: Value,
    },
    Unrecognized(Value),
}

impl CallShape {
    pub fn from_value(value: Value) -> Self {
        let Some(function) = value.get("function").and_then(Value::as_object) else {
            return Self::Unrecognized(value);
        };
        let Some(name) = function.get("name").and_then(Value::as_str) else {
            return Self::Unrecognized(value);
        };
        let name = name.to_string();
        let id = value.get("id").and_then(Value::as_str).map(str::to_string);

        match (id, function.get("arguments")) {
            (Some(id), Some(Value::String(arguments))) => Self::Structured {
                id,
                name,
                arguments: arguments.clone(),
            },
            (Some(id), None) => Self::Structured {
                id,
                name,
                arguments: String::new(),
            },
            (id, arguments) => Self::KeyValue {
                id,
                name,
                arguments: arguments.cloned().unwrap_or(Value::Null),
            },
        }
    }

    pub fn name(&self) -> Option<&str> {
        match self {
            Self::Structured { name, .. } | Self::KeyValue { name, .. } => Some(name),
            Self::Unrecognized(_) => None,
        }
    }

    /// Extract the dispatchable parts of this call.
    pub fn pending(&self) -> Result<PendingToolCall, ShapeError> {
        match self {
            Self::Structured {
                id,
                name,
                arguments,
            } => Ok(PendingToolCall {
                id: id.clone(),
                name: name.clone(),
                arguments: RawArguments::Text(arguments.clone()),
            }),
            Self::KeyValue {
                id: Some(id),
                name,
                arguments,
            } => Ok(PendingToolCall {
                id: id.clone(),
                name: name.clone(),
                arguments: match arguments {
                    Value::String(text) => RawArguments::Text(text.clone()),
                    other => RawArguments::Structured(other.clone()),
                },
            }),
            Self::KeyValue { id: None, name, .. } => {
                Err(ShapeError::MissingId { name: name.clone() })
            }
            Self::Unrecognized(raw) => Err(ShapeError::Unrecognized(raw.to_string())),
        }
    }

    /// Canonical form for history, or `None` when the call cannot be replayed.
    pub fn to_tool_call(&self) -> Option<ToolCall> {
        match self {
            Self::Structured {
                id,
                name,
                arguments,
            } => Some(ToolCall::function(id, name, arguments)),
            Self::KeyValue {
                id: Some(id),
                name,
                arguments,
            } => {
                let arguments = match arguments {
                    Value::String(text) => text.clone(),
                    Value::Null => "{}".to_string(),
                    other => other.to_string(),
                };
                Some(ToolCall::function(id, name, arguments))
            }
            Self::KeyValue { id: None, .. } | Self::Unrecognized(_) => None,
        }
    }
}

/// One model turn after classification.
#[derive(Debug, Clone, PartialEq)]
pub struct LlmResponse {
    pub content: String,
    pub finish_reason: Option<FinishReason>,
    pub tool_calls: Vec<CallShape>,
}

impl LlmResponse {
    pub fn from_completion(completion: Completion) -> Self {
        Self {
            content: completion.content.unwrap_or_default(),
            finish_reason: completion.finish_reason.as_deref().map(FinishReason::parse),
            tool_calls: completion
                .tool_calls
                .into_iter()
                .map(CallShape::from_value)
                .collect(),
        }
    }

    /// Whether the model stopped to have tools executed.
    pub fn is_tool_call(&self) -> bool {
        self.finish_reason == Some(FinishReason::ToolCalls) && !self.tool_calls.is_empty()
    }

    /// The assistant message this turn contributes to history.
    pub fn to_message(&self) -> Message {
        let calls = self
            .tool_calls
            .iter()
            .filter_map(CallShape::to_tool_call)
            .collect();
        Message::assistant(self.content.clone(), calls)
    }
}

/// Schema used for tools that declare no input schema.
pub fn empty_parameters() -> Value {
    json!({"type": "object", "properties": {}, "required": []})
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn messages_serialize_in_provider_shape() {
        let msg = Message::assistant("", vec![ToolCall::function("c1", "echo", "{\"x\":1}")]);
        let json = serde_json::to_value(&msg).unwrap();
        assert_eq!(
            json,
            json!({
                "role": "assistant",
                "content": "",
                "tool_calls": [{
                    "id": "c1",
                    "type": "function",
                    "function": {"name": "echo", "arguments": "{\"x\":1}"}
                }]
            })
        );

        let json = serde_json::to_value(Message::tool("c1", "done")).unwrap();
        assert_eq!(json, json!({"role": "tool", "content": "done", "tool_call_id": "c1"}));

        let json = serde_json::to_value(Message::user("hi")).unwrap();
        assert_eq!(json, json!({"role": "user", "content": "hi"}));
    }

    #[test]
    fn tool_spec_shape() {
        let spec = ToolSpec::function("get_weather", "Weather lookup", empty_parameters());
        assert_eq!(
            serde_json::to_value(&spec).unwrap(),
            json!({
                "type": "function",
                "function": {
                    "name": "get_weather",
                    "description": "Weather lookup",
                    "parameters": {"type": "object", "properties": {}, "required": []}
                }
            })
        );
    }

    #[test]
    fn classifies_call_shapes() {
        let structured = CallShape::from_value(json!({
            "id": "c1", "type": "function",
            "function": {"name": "echo", "arguments": "{\"text\":\"hi\"}"}
        }));
        assert_eq!(
            structured,
            CallShape::Structured {
                id: "c1".into(),
                name: "echo".into(),
                arguments: "{\"text\":\"hi\"}".into()
            }
        );

        let keyed = CallShape::from_value(json!({
            "id": "c2", "function": {"name": "echo", "arguments": {"text": "hi"}}
        }));
        assert!(matches!(keyed, CallShape::KeyValue { id: Some(_), .. }));

        let anonymous = CallShape::from_value(json!({"function": {"name": "echo", "arguments": "{}"}}));
        assert!(matches!(anonymous, CallShape::KeyValue { id: None, .. }));

        assert!(matches!(CallShape::from_value(json!("nope")), CallShape::Unrecognized(_)));
        assert!(matches!(
            CallShape::from_value(json!({"id": "c3", "function": {"arguments": "{}"}})),
            CallShape::Unrecognized(_)
        ));
    }

    #[test]
    fn pending_requires_id_and_shape() {
        let keyed = CallShape::KeyValue {
            id: Some("c1".into()),
            name: "echo".into(),
            arguments: json!({"a": 1}),
        };
        assert_eq!(
            keyed.pending().unwrap().arguments,
            RawArguments::Structured(json!({"a": 1}))
        );

        let anonymous = CallShape::KeyValue {
            id: None,
            name: "echo".into(),
            arguments: Value::Null,
        };
        assert!(matches!(anonymous.pending(), Err(ShapeError::MissingId { .. })));
        assert!(matches!(
            CallShape::Unrecognized(json!(1)).pending(),
            Err(ShapeError::Unrecognized(_))
        ));
    }

    #[test]
    fn history_keeps_only_replayable_calls() {
        let response = LlmResponse {
            content: String::new(),
            finish_reason: Some(FinishReason::ToolCalls),
            tool_calls: vec![
                CallShape::KeyValue {
                    id: Some("c1".into()),
                    name: "echo".into(),
                    arguments: json!({"a": 1}),
                },
                CallShape::KeyValue {
                    id: None,
                    name: "echo".into(),
                    arguments: Value::Null,
                },
                CallShape::Unrecognized(json!(null)),
            ],
        };
        let message = response.to_message();
        assert_eq!(message.tool_calls, vec![ToolCall::function("c1", "echo", "{\"a\":1}")]);
    }

    #[test]
    fn tool_call_turn_needs_reason_and_calls() {
        let completion = Completion {
            content: None,
            tool_calls: vec![],
            finish_reason: Some("tool_calls".into()),
        };
        assert!(!LlmResponse::from_completion(completion).is_tool_call());

        let completion = Completion {
            content: Some("hi".into()),
            tool_calls: vec![json!({"id": "c1", "function": {"name": "x", "arguments": "{}"}})],
            finish_reason: Some("stop".into()),
        };
        let response = LlmResponse::from_completion(completion);
        assert!(!response.is_tool_call());
        assert_eq!(response.finish_reason, Some(FinishReason::Stop));
    }
}
