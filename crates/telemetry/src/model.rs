//! Data model for turn inspection events.

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use serde_json::Value;

use crate::redact::redact_json;

// ── Event kind ────────────────────────────────────────────────────────────

/// What an inspect event records.
#[derive(Debug, Clone, Copy, Serialize, Deserialize, PartialEq, Eq, Hash)]
#[serde(rename_all = "snake_case")]
pub enum InspectEventKind {
    /// A request payload is about to be sent.
    RequestStart,
    /// A response came back.
    RequestEnd,
    /// The request failed.
    RequestError,
    /// A tool call was handed to the gateway.
    ToolStart,
    /// The gateway produced the tool message content.
    ToolEnd,
}

impl std::fmt::Display for InspectEventKind {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            Self::RequestStart => write!(f, "request_start"),
            Self::RequestEnd => write!(f, "request_end"),
            Self::RequestError => write!(f, "request_error"),
            Self::ToolStart => write!(f, "tool_start"),
            Self::ToolEnd => write!(f, "tool_end"),
        }
    }
}

// ── Event ─────────────────────────────────────────────────────────────────

/// One inspection record. Payloads are redacted on construction.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
pub struct InspectEvent {
    pub timestamp: DateTime<Utc>,
    /// Ties every event of one user-visible turn together.
    pub correlation_id: String,
    pub kind: InspectEventKind,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub duration_ms: Option<u64>,
    /// One-line human summary.
    pub summary: String,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub payload: Option<Value>,
}

impl InspectEvent {
    pub fn new(correlation_id: impl Into<String>, kind: InspectEventKind, summary: impl Into<String>) -> Self {
        Self {
            timestamp: Utc::now(),
            correlation_id: correlation_id.into(),
            kind,
            duration_ms: None,
            summary: summary.into(),
            payload: None,
        }
    }

    pub fn with_duration_ms(mut self, duration_ms: u64) -> Self {
        self.duration_ms = Some(duration_ms);
        self
    }

    pub fn with_payload(mut self, payload: &Value) -> Self {
        self.payload = Some(redact_json(payload));
        self
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn kind_serializes_snake_case() {
        let json = serde_json::to_string(&InspectEventKind::RequestStart).unwrap();
        assert_eq!(json, r#""request_start""#);
        assert_eq!(InspectEventKind::ToolEnd.to_string(), "tool_end");
    }

    #[test]
    fn payload_is_redacted() {
        let event = InspectEvent::new("corr-1", InspectEventKind::RequestStart, "Sending")
            .with_payload(&serde_json::json!({"api_key": "sk-or-v1-x", "model": "m"}));
        let payload = event.payload.unwrap();
        assert_eq!(payload["api_key"], crate::redact::REDACTED);
        assert_eq!(payload["model"], "m");
    }
}
