//! Turn inspection for Basecamp.
//!
//! Provides correlation-id-tagged inspect events for every provider request
//! and tool call, secret redaction for anything that gets logged, and the
//! [`TurnObserver`] hook trait the tool loop reports through.

pub mod inspector;
pub mod model;
pub mod observer;
pub mod redact;

pub use inspector::TurnInspector;
pub use model::{InspectEvent, InspectEventKind};
pub use observer::{NoopObserver, TurnObserver};
pub use redact::redact_json;

/// Errors from the telemetry subsystem.
#[derive(Debug, thiserror::Error)]
pub enum TelemetryError {
    #[error("inspect sink error: {0}")]
    Sink(String),

    #[error("inspect I/O error: {0}")]
    Io(#[from] std::io::Error),

    #[error("serialization error: {0}")]
    SerdeError(#[from] serde_json::Error),
}
