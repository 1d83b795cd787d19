//! Run state and the append-only run event log port.

use std::time::Duration;

use async_trait::async_trait;
use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use uuid::Uuid;

use crate::error::RunLogError;

/// Default number of tool rounds per turn.
pub const DEFAULT_MAX_ITERATIONS: u32 = 10;

/// Hard upper bound on tool rounds, whatever the configuration says.
pub const MAX_ITERATIONS_CEILING: u32 = 50;

/// Default per-tool-call deadline.
pub const DEFAULT_TOOL_TIMEOUT: Duration = Duration::from_secs(30);

/// Which tool calls must wait for a human decision.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "kebab-case")]
pub enum ApprovalPolicy {
    /// Every call waits for approval.
    #[default]
    Manual,
    /// Only mutating calls wait; read-only calls run immediately.
    AutoSafe,
}

impl ApprovalPolicy {
    pub fn as_str(&self) -> &'static str {
        match self {
            Self::Manual => "manual",
            Self::AutoSafe => "auto-safe",
        }
    }
}

impl std::fmt::Display for ApprovalPolicy {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.write_str(self.as_str())
    }
}

/// Settings for one tool-enabled turn.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct RunState {
    pub run_id: String,
    pub camp_id: String,
    max_iterations: u32,
    pub approval_policy: ApprovalPolicy,
    pub tool_timeout: Duration,
}

impl RunState {
    pub fn new(camp_id: impl Into<String>) -> Self {
        Self {
            run_id: Uuid::new_v4().to_string(),
            camp_id: camp_id.into(),
            max_iterations: DEFAULT_MAX_ITERATIONS,
            approval_policy: ApprovalPolicy::default(),
            tool_timeout: DEFAULT_TOOL_TIMEOUT,
        }
    }

    /// Set the round limit, clamped to `1..=MAX_ITERATIONS_CEILING`.
    pub fn with_max_iterations(mut self, max: u32) -> Self {
        self.max_iterations = max.clamp(1, MAX_ITERATIONS_CEILING);
        self
    }

    pub fn with_approval_policy(mut self, policy: ApprovalPolicy) -> Self {
        self.approval_policy = policy;
        self
    }

    pub fn with_tool_timeout(mut self, timeout: Duration) -> Self {
        self.tool_timeout = timeout;
        self
    }

    pub fn max_iterations(&self) -> u32 {
        self.max_iterations
    }

    /// Build an event stamped with this run's ids and the current time.
    pub fn event(&self, kind: RunEventKind) -> RunEvent {
        RunEvent {
            run_id: self.run_id.clone(),
            camp_id: self.camp_id.clone(),
            timestamp: Utc::now(),
            kind,
        }
    }
}

/// One immutable entry in the run log.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct RunEvent {
    pub run_id: String,
    pub camp_id: String,
    pub timestamp: DateTime<Utc>,
    #[serde(flatten)]
    pub kind: RunEventKind,
}

impl RunEvent {
    /// Whether this event ends the run.
    pub fn is_terminal(&self) -> bool {
        match &self.kind {
            RunEventKind::RunCompleted { .. } => true,
            RunEventKind::RunFailed { tool_call_id, .. } => tool_call_id.is_none(),
            _ => false,
        }
    }
}

/// Event payloads.
///
/// `run_failed` is tool-scoped when it carries a `tool_call_id` (the loop
/// continues) and run-level otherwise.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(tag = "type", rename_all = "snake_case")]
pub enum RunEventKind {
    RunStarted {
        max_iterations: u32,
        tool_timeout_ms: u64,
        approval_policy: ApprovalPolicy,
    },

    ToolExecuting {
        tool_call_id: String,
        tool_name: String,
        arguments: String,
    },

    ToolResult {
        tool_call_id: String,
        tool_name: String,
        result: String,
    },

    RunFailed {
        #[serde(default, skip_serializing_if = "Option::is_none")]
        tool_call_id: Option<String>,
        #[serde(default, skip_serializing_if = "Option::is_none")]
        tool_name: Option<String>,
        error: String,
    },

    RunCompleted {
        iterations: u32,
    },
}

impl RunEventKind {
    pub fn event_type(&self) -> &'static str {
        match self {
            Self::RunStarted { .. } => "run_started",
            Self::ToolExecuting { .. } => "tool_executing",
            Self::ToolResult { .. } => "tool_result",
            Self::RunFailed { .. } => "run_failed",
            Self::RunCompleted { .. } => "run_completed",
        }
    }
}

/// Append-only sink for run events. Must be safe under concurrent writers.
#[async_trait]
pub trait RunLog: Send + Sync {
    async fn append(&self, event: RunEvent) -> Result<(), RunLogError>;
}
