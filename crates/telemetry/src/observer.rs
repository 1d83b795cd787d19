//! Hook trait for observing a turn as it runs.
//!
//! Hooks are fire-and-forget: the tool loop logs an `Err` and carries on, so
//! an observer can never change a turn's outcome.

use std::time::Duration;

use basecamp_core::error::ProviderError;
use basecamp_core::message::ToolCall;
use basecamp_core::provider::{ChatRequest, ChatResponse};

use crate::TelemetryError;

/// Receives request and tool-call lifecycle notifications.
///
/// Every method defaults to doing nothing.
pub trait TurnObserver: Send + Sync {
    fn request_started(
        &self,
        _correlation_id: &str,
        _round: u32,
        _request: &ChatRequest,
    ) -> Result<(), TelemetryError> {
        Ok(())
    }

    fn request_finished(
        &self,
        _correlation_id: &str,
        _round: u32,
        _response: &ChatResponse,
        _elapsed: Duration,
    ) -> Result<(), TelemetryError> {
        Ok(())
    }

    fn request_failed(
        &self,
        _correlation_id: &str,
        _round: u32,
        _error: &ProviderError,
        _elapsed: Duration,
    ) -> Result<(), TelemetryError> {
        Ok(())
    }

    fn tool_started(&self, _correlation_id: &str, _call: &ToolCall) -> Result<(), TelemetryError> {
        Ok(())
    }

    /// `content` is the tool message content, success or `{"error":...}`.
    fn tool_finished(
        &self,
        _correlation_id: &str,
        _call: &ToolCall,
        _content: &str,
        _elapsed: Duration,
    ) -> Result<(), TelemetryError> {
        Ok(())
    }
}

/// Observer that ignores everything.
#[derive(Debug, Clone, Copy, Default)]
pub struct NoopObserver;

impl TurnObserver for NoopObserver {}
