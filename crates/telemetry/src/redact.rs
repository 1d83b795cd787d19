//! Secret redaction for logged payloads.

use serde_json::{Map, Value};

pub const REDACTED: &str = "[REDACTED]";

fn key_requires_redaction(key: &str) -> bool {
    let normalized = key.trim().to_ascii_lowercase();
    // Token counters (`max_tokens`, `prompt_tokens`, ...) are not secrets.
    if normalized.ends_with("tokens") {
        return false;
    }
    normalized == "authorization"
        || normalized == "cookie"
        || normalized == "set-cookie"
        || normalized == "key"
        || normalized.ends_with("_key")
        || normalized.contains("api_key")
        || normalized.contains("apikey")
        || normalized.contains("token")
        || normalized.contains("secret")
        || normalized.contains("password")
}

fn looks_like_credential(text: &str) -> bool {
    let normalized = text.trim().to_ascii_lowercase();
    normalized.starts_with("bearer ") || normalized.contains("sk-or-")
}

/// Copy of `value` with secret-looking keys and credential strings replaced
/// by `[REDACTED]`, recursively.
pub fn redact_json(value: &Value) -> Value {
    match value {
        Value::Object(map) => {
            let mut next = Map::new();
            for (key, item) in map {
                if key_requires_redaction(key) {
                    next.insert(key.clone(), Value::String(REDACTED.to_string()));
                } else {
                    next.insert(key.clone(), redact_json(item));
                }
            }
            Value::Object(next)
        }
        Value::Array(items) => Value::Array(items.iter().map(redact_json).collect()),
        Value::String(text) if looks_like_credential(text) => Value::String(REDACTED.to_string()),
        _ => value.clone(),
    }
}
