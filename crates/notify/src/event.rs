//! Event payloads and classes.

use serde::Serialize;
use serde_json::Value;

/// JSON-RPC method of tool server progress notifications.
pub const PROGRESS_METHOD: &str = "notifications/progress";

/// An event delivered to hub observers.
#[derive(Debug, Clone, PartialEq, Serialize)]
#[serde(tag = "kind", rename_all = "snake_case")]
pub enum Event {
    /// A tool is about to be invoked, by its tool-server name.
    ToolCall { name: String },
    /// A content fragment from a streamed completion.
    Token { text: String },
    /// An out-of-band message from the tool server.
    Notification { method: String, params: Value },
}

impl Event {
    pub fn tool_call(name: impl Into<String>) -> Self {
        Self::ToolCall { name: name.into() }
    }

    pub fn token(text: impl Into<String>) -> Self {
        Self::Token { text: text.into() }
    }

    pub fn notification(method: impl Into<String>, params: Value) -> Self {
        Self::Notification {
            method: method.into(),
            params,
        }
    }

    /// The class observers subscribe to for this event.
    pub fn class(&self) -> EventClass {
        match self {
            Self::ToolCall { .. } => EventClass::ToolCall,
            Self::Token { .. } => EventClass::Token,
            Self::Notification { method, .. } => EventClass::Notification(method.clone()),
        }
    }
}

/// Subscription key for hub observers.
///
/// Notifications are keyed additionally by method name.
#[derive(Debug, Clone, PartialEq, Eq, Hash)]
pub enum EventClass {
    ToolCall,
    Token,
    Notification(String),
}

impl EventClass {
    /// Subscription key for tool server progress notifications.
    pub fn progress() -> Self {
        Self::Notification(PROGRESS_METHOD.to_string())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;

    #[test]
    fn class_of_each_event() {
        assert_eq!(Event::tool_call("x").class(), EventClass::ToolCall);
        assert_eq!(Event::token("t").class(), EventClass::Token);
        assert_eq!(
            Event::notification(PROGRESS_METHOD, json!({})).class(),
            EventClass::progress()
        );
    }

    #[test]
    fn serialize_tagged() {
        let value = serde_json::to_value(Event::tool_call("read_file")).unwrap();
        assert_eq!(value, json!({"kind": "tool_call", "name": "read_file"}));
    }
}
