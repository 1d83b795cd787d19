//! Chat message domain types.
//!
//! These are the value objects that flow through the whole engine:
//! the composer emits them, the orchestrator appends to them, and the
//! provider serializes them onto the wire.

use serde::{Deserialize, Serialize};
use serde_json::Value;

/// The role of a message sender in a conversation.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum Role {
    /// System instructions (prompt, memory, reference artifacts)
    System,
    /// The end user
    User,
    /// The model
    Assistant,
    /// Tool execution result
    Tool,
}

impl Role {
    pub fn as_str(&self) -> &'static str {
        match self {
            Self::System => "system",
            Self::User => "user",
            Self::Assistant => "assistant",
            Self::Tool => "tool",
        }
    }
}

impl std::fmt::Display for Role {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.write_str(self.as_str())
    }
}

/// Message content: plain text or structured parts.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(untagged)]
pub enum MessageContent {
    Text(String),
    Parts(Vec<Value>),
}

impl MessageContent {
    /// Flatten into plain text.
    ///
    /// String parts and `{ "text": ... }` objects are kept and joined with
    /// newlines; anything else is ignored.
    pub fn to_text(&self) -> String {
        match self {
            Self::Text(text) => text.clone(),
            Self::Parts(parts) => parts
                .iter()
                .map(text_of_part)
                .filter(|text| !text.is_empty())
                .collect::<Vec<_>>()
                .join("\n"),
        }
    }

    /// Build content from a raw JSON value as found in provider payloads.
    pub fn from_value(value: &Value) -> Option<Self> {
        match value {
            Value::String(text) => Some(Self::Text(text.clone())),
            Value::Array(items) => Some(Self::Parts(items.clone())),
            Value::Object(_) => Some(Self::Parts(vec![value.clone()])),
            _ => None,
        }
    }
}

fn text_of_part(part: &Value) -> String {
    match part {
        Value::String(text) => text.clone(),
        Value::Object(object) => object
            .get("text")
            .and_then(Value::as_str)
            .unwrap_or_default()
            .to_string(),
        _ => String::new(),
    }
}

impl From<&str> for MessageContent {
    fn from(text: &str) -> Self {
        Self::Text(text.to_string())
    }
}

impl From<String> for MessageContent {
    fn from(text: String) -> Self {
        Self::Text(text)
    }
}

/// A tool call requested by the assistant.
///
/// `arguments` is kept as the raw JSON string the model produced; it is
/// only parsed by whoever executes the call.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct ToolCall {
    /// Unique ID for this tool call
    pub id: String,

    /// Name of the tool to invoke
    pub name: String,

    /// Arguments as JSON string
    pub arguments: String,
}

impl ToolCall {
    pub fn new(id: impl Into<String>, name: impl Into<String>, arguments: impl Into<String>) -> Self {
        Self {
            id: id.into(),
            name: name.into(),
            arguments: arguments.into(),
        }
    }
}

/// A single message in an outbound request or a loop transcript.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ChatMessage {
    /// Who sent this message
    pub role: Role,

    /// Text or structured parts; absent is distinct from empty
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub content: Option<MessageContent>,

    /// Tool name (tool messages only)
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub name: Option<String>,

    /// If this is a tool result, which tool call it responds to
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub tool_call_id: Option<String>,

    /// Tool calls requested by the assistant, in the order received
    #[serde(default, skip_serializing_if = "Vec::is_empty")]
    pub tool_calls: Vec<ToolCall>,
}

impl ChatMessage {
    fn with_text(role: Role, content: impl Into<String>) -> Self {
        Self {
            role,
            content: Some(MessageContent::Text(content.into())),
            name: None,
            tool_call_id: None,
            tool_calls: Vec::new(),
        }
    }

    /// Create a new system message.
    pub fn system(content: impl Into<String>) -> Self {
        Self::with_text(Role::System, content)
    }

    /// Create a new user message.
    pub fn user(content: impl Into<String>) -> Self {
        Self::with_text(Role::User, content)
    }

    /// Create a new assistant message.
    pub fn assistant(content: impl Into<String>) -> Self {
        Self::with_text(Role::Assistant, content)
    }

    /// Create an assistant message that requests tool calls.
    pub fn assistant_tool_calls(content: impl Into<String>, tool_calls: Vec<ToolCall>) -> Self {
        Self {
            tool_calls,
            ..Self::with_text(Role::Assistant, content)
        }
    }

    /// Create a tool result message.
    pub fn tool_result(
        tool_call_id: impl Into<String>,
        name: impl Into<String>,
        content: impl Into<String>,
    ) -> Self {
        Self {
            name: Some(name.into()),
            tool_call_id: Some(tool_call_id.into()),
            ..Self::with_text(Role::Tool, content)
        }
    }

    /// The message content flattened to text (empty when absent).
    pub fn text(&self) -> String {
        self.content
            .as_ref()
            .map(MessageContent::to_text)
            .unwrap_or_default()
    }

    pub fn has_tool_calls(&self) -> bool {
        !self.tool_calls.is_empty()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn create_user_message() {
        let msg = ChatMessage::user("Hello, camp!");
        assert_eq!(msg.role, Role::User);
        assert_eq!(msg.text(), "Hello, camp!");
        assert!(msg.tool_calls.is_empty());
    }

    #[test]
    fn tool_result_carries_id_and_name() {
        let msg = ChatMessage::tool_result("call_1", "read_file", "{\"ok\":true}");
        assert_eq!(msg.role, Role::Tool);
        assert_eq!(msg.tool_call_id.as_deref(), Some("call_1"));
        assert_eq!(msg.name.as_deref(), Some("read_file"));
    }

    #[test]
    fn absent_fields_are_not_serialized() {
        let json = serde_json::to_value(ChatMessage::user("hi")).unwrap();
        let object = json.as_object().unwrap();
        assert_eq!(object.len(), 2);
        assert_eq!(object["role"], "user");
        assert_eq!(object["content"], "hi");
    }

    #[test]
    fn parts_content_flattens_to_text() {
        let content = MessageContent::Parts(vec![
            serde_json::json!({"type": "text", "text": "first"}),
            serde_json::json!("second"),
            serde_json::json!({"type": "image_url", "image_url": {"url": "x"}}),
        ]);
        assert_eq!(content.to_text(), "first\nsecond");
    }

    #[test]
    fn content_deserializes_from_string_or_array() {
        let text: MessageContent = serde_json::from_str(r#""plain""#).unwrap();
        assert_eq!(text, MessageContent::Text("plain".into()));

        let parts: MessageContent = serde_json::from_str(r#"[{"type":"text","text":"a"}]"#).unwrap();
        assert_eq!(parts.to_text(), "a");
    }
}
