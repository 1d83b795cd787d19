//! Tool execution gateway.
//!
//! Wraps a [`ToolExecutor`] with the approval policy and the per-call
//! deadline, and turns every result into tool-message content. Callers
//! never see a tool failure as an `Err`.

use std::sync::Arc;
use std::time::{Duration, Instant};

use basecamp_core::error::ToolError;
use basecamp_core::message::ToolCall;
use basecamp_core::run::{ApprovalPolicy, RunState};
use basecamp_core::tool::{ToolEffect, ToolExecutor};
use serde_json::json;
use tokio_util::sync::CancellationToken;
use tracing::{debug, info, warn};

use crate::approval::{ApprovalBroker, ApprovalDecision, ApprovalRequest};

/// How a gated call ended.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ToolStatus {
    Succeeded,
    Failed,
    Rejected,
    TimedOut,
}

/// The normalized result of one tool call.
#[derive(Debug, Clone, PartialEq)]
pub struct ToolOutcome {
    pub status: ToolStatus,
    /// Tool message content: the JSON result, or `{"error": ...}`.
    pub content: String,
    pub error: Option<String>,
    pub elapsed: Duration,
}

impl ToolOutcome {
    pub fn is_success(&self) -> bool {
        self.status == ToolStatus::Succeeded
    }
}

/// `{"error": message}` as a compact JSON string.
pub fn error_content(message: &str) -> String {
    json!({ "error": message }).to_string()
}

/// Whether `policy` makes a call with `effect` wait for a decision.
pub fn requires_approval(policy: ApprovalPolicy, effect: ToolEffect) -> bool {
    match policy {
        ApprovalPolicy::Manual => true,
        ApprovalPolicy::AutoSafe => effect.is_mutating(),
    }
}

pub struct ToolGateway {
    executor: Arc<dyn ToolExecutor>,
    approvals: Arc<dyn ApprovalBroker>,
}

impl ToolGateway {
    pub fn new(executor: Arc<dyn ToolExecutor>, approvals: Arc<dyn ApprovalBroker>) -> Self {
        Self { executor, approvals }
    }

    pub fn executor(&self) -> &Arc<dyn ToolExecutor> {
        &self.executor
    }

    /// Forget approval decisions still held for `run`.
    pub fn release_run(&self, run: &RunState) {
        self.approvals.release_run(&run.run_id);
    }

    /// Run one call under `run`'s approval policy and timeout.
    pub async fn execute(&self, run: &RunState, call: &ToolCall) -> ToolOutcome {
        let started = Instant::now();
        let effect = self.executor.effect(&call.name);

        if requires_approval(run.approval_policy, effect) {
            let request = ApprovalRequest::new(run, call, effect);
            let decision = self.approvals.await_decision(request).await;
            debug!(tool_call_id = %call.id, tool = %call.name, ?decision, "Approval decided");
            if decision == ApprovalDecision::Reject {
                let err = ToolError::Rejected {
                    tool_name: call.name.clone(),
                };
                return outcome(ToolStatus::Rejected, Err(err), started);
            }
        }

        let cancel = CancellationToken::new();
        let deadline = run.tool_timeout;
        let run_call = self.executor.execute(&run.camp_id, call, cancel.clone());

        match tokio::time::timeout(deadline, run_call).await {
            Ok(Ok(value)) => {
                info!(tool_call_id = %call.id, tool = %call.name, "Tool call succeeded");
                outcome(ToolStatus::Succeeded, Ok(value.to_string()), started)
            }
            Ok(Err(err)) => {
                warn!(tool_call_id = %call.id, tool = %call.name, error = %err, "Tool call failed");
                outcome(ToolStatus::Failed, Err(err), started)
            }
            Err(_) => {
                cancel.cancel();
                let err = ToolError::Timeout {
                    tool_name: call.name.clone(),
                    timeout_ms: deadline.as_millis() as u64,
                };
                warn!(tool_call_id = %call.id, tool = %call.name, "Tool call timed out");
                outcome(ToolStatus::TimedOut, Err(err), started)
            }
        }
    }
}

fn outcome(status: ToolStatus, result: Result<String, ToolError>, started: Instant) -> ToolOutcome {
    let elapsed = started.elapsed();
    match result {
        Ok(content) => ToolOutcome {
            status,
            content,
            error: None,
            elapsed,
        },
        Err(err) => {
            let message = err.to_string();
            ToolOutcome {
                status,
                content: error_content(&message),
                error: Some(message),
                elapsed,
            }
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::approval::{ApprovalQueue, AutoApprove};
    use crate::test_helpers::{Behavior, ScriptedExecutor};
    use serde_json::Value;

    fn run(policy: ApprovalPolicy) -> RunState {
        RunState::new("camp-1").with_approval_policy(policy)
    }

    #[tokio::test]
    async fn success_is_json_encoded() {
        let executor = Arc::new(ScriptedExecutor::new().on("read_file", Behavior::Value(json!({"text": "hi"}))));
        let gateway = ToolGateway::new(executor.clone(), Arc::new(AutoApprove));
        let out = gateway
            .execute(&run(ApprovalPolicy::Manual), &ToolCall::new("c1", "read_file", "{}"))
            .await;
        assert!(out.is_success());
        assert_eq!(out.content, r#"{"text":"hi"}"#);
        assert_eq!(executor.calls().len(), 1);
    }

    #[tokio::test]
    async fn failure_becomes_error_object() {
        let executor = Arc::new(ScriptedExecutor::new().on("read_file", Behavior::Fail("no such file".into())));
        let gateway = ToolGateway::new(executor, Arc::new(AutoApprove));
        let out = gateway
            .execute(&run(ApprovalPolicy::Manual), &ToolCall::new("c1", "read_file", "{}"))
            .await;
        assert_eq!(out.status, ToolStatus::Failed);
        let content: Value = serde_json::from_str(&out.content).unwrap();
        assert!(content["error"].as_str().unwrap().contains("no such file"));
    }

    #[tokio::test]
    async fn rejection_skips_the_executor() {
        let executor = Arc::new(ScriptedExecutor::new().on("write_file", Behavior::Value(json!(true))));
        let queue = Arc::new(ApprovalQueue::new());
        let run = run(ApprovalPolicy::Manual);
        queue.submit_decision(&run.run_id, "c1", ApprovalDecision::Reject);
        let gateway = ToolGateway::new(executor.clone(), queue);

        let out = gateway.execute(&run, &ToolCall::new("c1", "write_file", "{}")).await;
        assert_eq!(out.status, ToolStatus::Rejected);
        assert_eq!(out.content, r#"{"error":"Tool call rejected by user."}"#);
        assert!(executor.calls().is_empty());
    }

    #[tokio::test]
    async fn auto_safe_runs_read_only_tools_without_waiting() {
        let executor = Arc::new(
            ScriptedExecutor::new()
                .on("read_file", Behavior::Value(json!("ok")))
                .read_only("read_file"),
        );
        let queue = Arc::new(ApprovalQueue::new());
        let gateway = ToolGateway::new(executor.clone(), queue.clone());

        let out = gateway
            .execute(&run(ApprovalPolicy::AutoSafe), &ToolCall::new("c1", "read_file", "{}"))
            .await;
        assert!(out.is_success());
        assert!(queue.pending().is_empty());
    }

    #[test]
    fn approval_matrix() {
        assert!(requires_approval(ApprovalPolicy::Manual, ToolEffect::ReadOnly));
        assert!(requires_approval(ApprovalPolicy::Manual, ToolEffect::Mutating));
        assert!(!requires_approval(ApprovalPolicy::AutoSafe, ToolEffect::ReadOnly));
        assert!(requires_approval(ApprovalPolicy::AutoSafe, ToolEffect::Mutating));
    }

    #[tokio::test(start_paused = true)]
    async fn slow_tool_is_cancelled_at_the_deadline() {
        let executor = Arc::new(ScriptedExecutor::new().on("slow", Behavior::Sleep(Duration::from_secs(60))));
        let gateway = ToolGateway::new(executor.clone(), Arc::new(AutoApprove));
        let run = run(ApprovalPolicy::Manual).with_tool_timeout(Duration::from_secs(1));

        let out = gateway.execute(&run, &ToolCall::new("c1", "slow", "{}")).await;
        assert_eq!(out.status, ToolStatus::TimedOut);
        let content: Value = serde_json::from_str(&out.content).unwrap();
        assert!(content["error"].as_str().unwrap().contains("timed out"));
        assert_eq!(executor.cancelled_tokens(), 1);
    }
}
