//! Field extraction from chat-completion payloads.
//!
//! Payloads are read as loose `serde_json::Value`s so that one oddly-typed
//! field never discards the rest of a response or stream chunk.

use basecamp_core::error::ProviderError;
use basecamp_core::message::{ChatMessage, MessageContent, Role, ToolCall};
use basecamp_core::provider::Usage;
use serde_json::Value;

fn first_choice(payload: &Value) -> Option<&Value> {
    payload
        .get("choices")
        .and_then(Value::as_array)
        .and_then(|choices| choices.first())
}

/// Plain text of a content value (string, parts array or `{text}` object).
pub(crate) fn content_text(value: &Value) -> String {
    MessageContent::from_value(value)
        .map(|content| content.to_text())
        .unwrap_or_default()
}

pub(crate) fn parse_usage(payload: &Value) -> Usage {
    let usage = payload.get("usage").and_then(Value::as_object);
    let counter = |key: &str| usage.and_then(|entry| entry.get(key)).and_then(Value::as_u64);
    Usage {
        prompt_tokens: counter("prompt_tokens"),
        completion_tokens: counter("completion_tokens"),
        total_tokens: counter("total_tokens"),
    }
}

pub(crate) fn parse_model(payload: &Value) -> Option<String> {
    payload
        .get("model")
        .and_then(Value::as_str)
        .map(str::trim)
        .filter(|model| !model.is_empty())
        .map(ToString::to_string)
}

pub(crate) fn parse_finish_reason(payload: &Value) -> Option<String> {
    first_choice(payload)
        .and_then(|choice| choice.get("finish_reason"))
        .and_then(Value::as_str)
        .map(ToString::to_string)
}

/// Content delta of a streaming chunk (empty when absent).
pub(crate) fn delta_content(chunk: &Value) -> String {
    first_choice(chunk)
        .and_then(|choice| choice.get("delta"))
        .and_then(|delta| delta.get("content"))
        .map(content_text)
        .unwrap_or_default()
}

/// `{error:{message}}` from an error body, or a status-based fallback.
pub(crate) fn parse_error_message(status: u16, payload: &Value) -> String {
    payload
        .get("error")
        .and_then(Value::as_object)
        .and_then(|error| error.get("message"))
        .and_then(Value::as_str)
        .map(ToString::to_string)
        .unwrap_or_else(|| format!("OpenRouter request failed with status {status}"))
}

/// The assistant message of a non-streaming response.
///
/// Tool calls missing an id get an empty one; the tool loop assigns ids.
pub(crate) fn parse_assistant_message(payload: &Value) -> Result<ChatMessage, ProviderError> {
    let choice = first_choice(payload)
        .ok_or_else(|| ProviderError::ResponseValidation("response has no choices".into()))?;
    let message = choice
        .get("message")
        .and_then(Value::as_object)
        .ok_or_else(|| ProviderError::ResponseValidation("choice has no message object".into()))?;

    let content = message.get("content").and_then(MessageContent::from_value);

    let tool_calls = match message.get("tool_calls") {
        None | Some(Value::Null) => Vec::new(),
        Some(Value::Array(calls)) => calls
            .iter()
            .enumerate()
            .map(|(index, call)| parse_tool_call(index, call))
            .collect::<Result<Vec<_>, _>>()?,
        Some(_) => {
            return Err(ProviderError::ResponseValidation(
                "tool_calls must be an array".into(),
            ));
        }
    };

    Ok(ChatMessage {
        role: Role::Assistant,
        content,
        name: None,
        tool_call_id: None,
        tool_calls,
    })
}

fn parse_tool_call(index: usize, call: &Value) -> Result<ToolCall, ProviderError> {
    let function = call.get("function").and_then(Value::as_object);
    let name = function
        .and_then(|function| function.get("name"))
        .and_then(Value::as_str)
        .map(str::trim)
        .filter(|name| !name.is_empty())
        .ok_or_else(|| {
            ProviderError::ResponseValidation(format!("tool call {index} has no function name"))
        })?;
    let arguments = match function.and_then(|function| function.get("arguments")) {
        None | Some(Value::Null) => String::new(),
        Some(Value::String(raw)) => raw.clone(),
        Some(other) => other.to_string(),
    };
    let id = call
        .get("id")
        .and_then(Value::as_str)
        .unwrap_or_default()
        .to_string();
    Ok(ToolCall::new(id, name, arguments))
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;

    #[test]
    fn usage_counters_are_independent() {
        let usage = parse_usage(&json!({"usage": {"prompt_tokens": 3, "total_tokens": "x"}}));
        assert_eq!(usage.prompt_tokens, Some(3));
        assert_eq!(usage.completion_tokens, None);
        assert_eq!(usage.total_tokens, None);
    }

    #[test]
    fn blank_model_is_ignored() {
        assert_eq!(parse_model(&json!({"model": "  "})), None);
        assert_eq!(parse_model(&json!({"model": "openai/gpt-4o"})).as_deref(), Some("openai/gpt-4o"));
    }

    #[test]
    fn error_message_falls_back_to_status() {
        let message = parse_error_message(401, &json!({"error": {"message": "No auth credentials found"}}));
        assert_eq!(message, "No auth credentials found");
        assert_eq!(
            parse_error_message(502, &Value::Null),
            "OpenRouter request failed with status 502"
        );
    }

    #[test]
    fn assistant_message_with_tool_calls() {
        let payload = json!({
            "choices": [{
                "message": {
                    "role": "assistant",
                    "content": null,
                    "tool_calls": [
                        {"id": "call_a", "type": "function", "function": {"name": "read_file", "arguments": "{\"path\":\"project.md\"}"}},
                        {"type": "function", "function": {"name": "list_dir", "arguments": {"path": "."}}}
                    ]
                },
                "finish_reason": "tool_calls"
            }]
        });
        let message = parse_assistant_message(&payload).unwrap();
        assert!(message.content.is_none());
        assert_eq!(message.tool_calls.len(), 2);
        assert_eq!(message.tool_calls[0].id, "call_a");
        assert_eq!(message.tool_calls[0].arguments, r#"{"path":"project.md"}"#);
        assert_eq!(message.tool_calls[1].id, "");
        assert_eq!(message.tool_calls[1].arguments, r#"{"path":"."}"#);
    }

    #[test]
    fn parts_content_is_preserved() {
        let payload = json!({"choices": [{"message": {"content": [{"type": "text", "text": "a"}, "b"]}}]});
        let message = parse_assistant_message(&payload).unwrap();
        assert_eq!(message.text(), "a\nb");
    }

    #[test]
    fn missing_choices_is_a_validation_error() {
        let err = parse_assistant_message(&json!({"id": "gen-1"})).unwrap_err();
        assert!(matches!(err, ProviderError::ResponseValidation(_)));
    }

    #[test]
    fn unnamed_tool_call_is_a_validation_error() {
        let payload = json!({"choices": [{"message": {"tool_calls": [{"id": "x", "function": {}}]}}]});
        assert!(parse_assistant_message(&payload).is_err());
    }
}
