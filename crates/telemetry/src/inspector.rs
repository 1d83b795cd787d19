//! Thread-safe inspect event recorder.

use std::fs::OpenOptions;
use std::io::Write;
use std::path::{Path, PathBuf};
use std::sync::RwLock;
use std::time::Duration;

use basecamp_core::error::ProviderError;
use basecamp_core::message::ToolCall;
use basecamp_core::provider::{ChatRequest, ChatResponse};
use serde_json::{Value, json};
use tracing::trace;

use crate::TelemetryError;
use crate::redact::redact_json;
use crate::model::{InspectEvent, InspectEventKind};
use crate::observer::TurnObserver;

/// Records an [`InspectEvent`] for every hook it receives.
///
/// Events are kept in memory and, when configured, appended to a JSON-lines
/// file. With a payload directory, the full request and response of each
/// turn are also written there as `turn_<correlation_id>_<kind>.json`; the
/// latest round wins. Payloads are redacted before they are stored anywhere.
#[derive(Default)]
pub struct TurnInspector {
    events: RwLock<Vec<InspectEvent>>,
    events_file: Option<PathBuf>,
    payload_dir: Option<PathBuf>,
}

impl TurnInspector {
    pub fn new() -> Self {
        Self::default()
    }

    /// Also append every event to `path` (created on first write).
    pub fn with_events_file(mut self, path: impl Into<PathBuf>) -> Self {
        self.events_file = Some(path.into());
        self
    }

    /// Capture full request/response payloads under `dir`.
    pub fn with_payload_dir(mut self, dir: impl Into<PathBuf>) -> Self {
        self.payload_dir = Some(dir.into());
        self
    }

    /// Where the `kind` payload of a turn is captured, if capture is on.
    pub fn payload_path(&self, correlation_id: &str, kind: &str) -> Option<PathBuf> {
        self.payload_dir
            .as_ref()
            .map(|dir| dir.join(format!("turn_{}_{kind}.json", file_safe(correlation_id))))
    }

    fn capture<T: serde::Serialize>(
        &self,
        correlation_id: &str,
        kind: &str,
        payload: &T,
    ) -> Result<(), TelemetryError> {
        let Some(path) = self.payload_path(correlation_id, kind) else {
            return Ok(());
        };
        if let Some(dir) = path.parent() {
            std::fs::create_dir_all(dir)?;
        }
        let value = redact_json(&serde_json::to_value(payload)?);
        std::fs::write(&path, serde_json::to_string_pretty(&value)?)?;
        trace!(correlation_id, kind, path = %path.display(), "Turn payload captured");
        Ok(())
    }

    pub fn events(&self) -> Vec<InspectEvent> {
        self.events
            .read()
            .unwrap_or_else(|e| e.into_inner())
            .clone()
    }

    /// Events of one turn, in recording order.
    pub fn events_for(&self, correlation_id: &str) -> Vec<InspectEvent> {
        self.events
            .read()
            .unwrap_or_else(|e| e.into_inner())
            .iter()
            .filter(|e| e.correlation_id == correlation_id)
            .cloned()
            .collect()
    }

    pub fn record(&self, event: InspectEvent) -> Result<(), TelemetryError> {
        if let Some(path) = &self.events_file {
            append_line(path, &event)?;
        }
        trace!(correlation_id = %event.correlation_id, kind = %event.kind, "Inspect event recorded");
        self.events
            .write()
            .unwrap_or_else(|e| e.into_inner())
            .push(event);
        Ok(())
    }
}

fn append_line(path: &Path, event: &InspectEvent) -> Result<(), TelemetryError> {
    if let Some(dir) = path.parent() {
        std::fs::create_dir_all(dir)?;
    }
    let mut line = serde_json::to_string(event)?;
    line.push('\n');
    let mut file = OpenOptions::new().create(true).append(true).open(path)?;
    file.write_all(line.as_bytes())?;
    Ok(())
}

fn file_safe(id: &str) -> String {
    id.chars()
        .map(|c| if c.is_ascii_alphanumeric() || c == '-' || c == '_' { c } else { '_' })
        .collect()
}

fn millis(elapsed: Duration) -> u64 {
    elapsed.as_millis() as u64
}

fn request_summary(request: &ChatRequest) -> Value {
    json!({
        "model": request.model,
        "messages": request.messages.len(),
        "tools": request.tools.as_ref().map_or(0, Vec::len),
        "temperature": request.temperature,
        "max_tokens": request.max_tokens,
        "stream": request.stream,
    })
}

impl TurnObserver for TurnInspector {
    fn request_started(
        &self,
        correlation_id: &str,
        round: u32,
        request: &ChatRequest,
    ) -> Result<(), TelemetryError> {
        self.capture(correlation_id, "request", request)?;
        self.record(
            InspectEvent::new(
                correlation_id,
                InspectEventKind::RequestStart,
                format!("Round {round}: sending request to {}", request.model),
            )
            .with_payload(&request_summary(request)),
        )
    }

    fn request_finished(
        &self,
        correlation_id: &str,
        round: u32,
        response: &ChatResponse,
        elapsed: Duration,
    ) -> Result<(), TelemetryError> {
        self.capture(correlation_id, "response", response)?;
        let payload = json!({
            "status": response.status,
            "model": response.model,
            "finish_reason": response.finish_reason,
            "usage": response.usage,
            "tool_calls": response.message.tool_calls.len(),
            "output_chars": response.message.text().chars().count(),
            "chunks": response.chunk_count,
        });
        self.record(
            InspectEvent::new(
                correlation_id,
                InspectEventKind::RequestEnd,
                format!("Round {round}: response {}", response.status),
            )
            .with_duration_ms(millis(elapsed))
            .with_payload(&payload),
        )
    }

    fn request_failed(
        &self,
        correlation_id: &str,
        round: u32,
        error: &ProviderError,
        elapsed: Duration,
    ) -> Result<(), TelemetryError> {
        let mut event = InspectEvent::new(
            correlation_id,
            InspectEventKind::RequestError,
            format!("Round {round}: {error}"),
        )
        .with_duration_ms(millis(elapsed));
        if let ProviderError::Http { status, payload, .. } = error {
            let body = json!({ "status": status, "body": payload });
            self.capture(correlation_id, "response", &body)?;
            event = event.with_payload(&body);
        }
        self.record(event)
    }

    fn tool_started(&self, correlation_id: &str, call: &ToolCall) -> Result<(), TelemetryError> {
        let arguments = serde_json::from_str::<Value>(&call.arguments)
            .unwrap_or_else(|_| Value::String(call.arguments.clone()));
        self.record(
            InspectEvent::new(
                correlation_id,
                InspectEventKind::ToolStart,
                format!("Tool {} ({})", call.name, call.id),
            )
            .with_payload(&json!({ "tool_call_id": call.id, "arguments": arguments })),
        )
    }

    fn tool_finished(
        &self,
        correlation_id: &str,
        call: &ToolCall,
        content: &str,
        elapsed: Duration,
    ) -> Result<(), TelemetryError> {
        let result = serde_json::from_str::<Value>(content)
            .unwrap_or_else(|_| Value::String(content.to_string()));
        let failed = result.get("error").is_some();
        self.record(
            InspectEvent::new(
                correlation_id,
                InspectEventKind::ToolEnd,
                format!(
                    "Tool {} {}",
                    call.name,
                    if failed { "failed" } else { "finished" }
                ),
            )
            .with_duration_ms(millis(elapsed))
            .with_payload(&json!({ "tool_call_id": call.id, "result": result })),
        )
    }
}
