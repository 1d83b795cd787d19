//! Approval port for gated tool calls, plus the in-process queue.

use std::collections::HashMap;
use std::sync::Mutex;

use async_trait::async_trait;
use basecamp_core::message::ToolCall;
use basecamp_core::run::RunState;
use basecamp_core::tool::ToolEffect;
use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use tokio::sync::{broadcast, oneshot};
use tracing::debug;

/// A human decision on one tool call.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum ApprovalDecision {
    Approve,
    Reject,
}

/// A tool call waiting for a decision.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ApprovalRequest {
    pub run_id: String,
    pub camp_id: String,
    pub tool_call_id: String,
    pub tool_name: String,
    pub arguments: String,
    pub effect: ToolEffect,
    pub requested_at: DateTime<Utc>,
}

impl ApprovalRequest {
    pub fn new(run: &RunState, call: &ToolCall, effect: ToolEffect) -> Self {
        Self {
            run_id: run.run_id.clone(),
            camp_id: run.camp_id.clone(),
            tool_call_id: call.id.clone(),
            tool_name: call.name.clone(),
            arguments: call.arguments.clone(),
            effect,
            requested_at: Utc::now(),
        }
    }
}

/// Where gated tool calls wait. Decisions are keyed by run id and tool-call id.
#[async_trait]
pub trait ApprovalBroker: Send + Sync {
    /// Wait until a decision for `request` arrives. No deadline.
    async fn await_decision(&self, request: ApprovalRequest) -> ApprovalDecision;

    /// Record a decision. Returns `true` if a waiting call received it.
    fn submit_decision(&self, run_id: &str, tool_call_id: &str, decision: ApprovalDecision) -> bool;

    /// Drop anything still held for a finished run.
    fn release_run(&self, _run_id: &str) {}
}

/// Broker that approves everything immediately.
#[derive(Debug, Clone, Copy, Default)]
pub struct AutoApprove;

#[async_trait]
impl ApprovalBroker for AutoApprove {
    async fn await_decision(&self, _request: ApprovalRequest) -> ApprovalDecision {
        ApprovalDecision::Approve
    }

    fn submit_decision(&self, _run_id: &str, _tool_call_id: &str, _decision: ApprovalDecision) -> bool {
        false
    }
}

/// `(run_id, tool_call_id)`. Generated call ids repeat across runs.
type DecisionKey = (String, String);

fn decision_key(run_id: &str, tool_call_id: &str) -> DecisionKey {
    (run_id.to_string(), tool_call_id.to_string())
}

struct Waiting {
    request: ApprovalRequest,
    reply: oneshot::Sender<ApprovalDecision>,
    ticket: u64,
}

#[derive(Default)]
struct QueueState {
    waiting: HashMap<DecisionKey, Waiting>,
    /// Decisions submitted before anyone waited for them. Cleared per run.
    early: HashMap<DecisionKey, ApprovalDecision>,
    next_ticket: u64,
}

/// In-memory broker. New requests are broadcast to subscribers so a shell
/// can prompt the user; [`ApprovalQueue::pending`] lists what is waiting.
pub struct ApprovalQueue {
    state: Mutex<QueueState>,
    events: broadcast::Sender<ApprovalRequest>,
}

impl Default for ApprovalQueue {
    fn default() -> Self {
        Self::new()
    }
}

impl ApprovalQueue {
    pub fn new() -> Self {
        let (events, _) = broadcast::channel(64);
        Self {
            state: Mutex::new(QueueState::default()),
            events,
        }
    }

    /// Receive every request as it starts waiting.
    pub fn subscribe(&self) -> broadcast::Receiver<ApprovalRequest> {
        self.events.subscribe()
    }

    /// Requests currently waiting, oldest first.
    pub fn pending(&self) -> Vec<ApprovalRequest> {
        let state = self.state.lock().unwrap_or_else(|e| e.into_inner());
        let mut pending: Vec<ApprovalRequest> =
            state.waiting.values().map(|w| w.request.clone()).collect();
        pending.sort_by(|a, b| {
            a.requested_at
                .cmp(&b.requested_at)
                .then_with(|| a.run_id.cmp(&b.run_id))
                .then_with(|| a.tool_call_id.cmp(&b.tool_call_id))
        });
        pending
    }
}

/// Removes this wait's entry if the wait is abandoned.
struct WaitGuard<'a> {
    queue: &'a ApprovalQueue,
    key: DecisionKey,
    ticket: u64,
}

impl Drop for WaitGuard<'_> {
    fn drop(&mut self) {
        let mut state = self.queue.state.lock().unwrap_or_else(|e| e.into_inner());
        if state.waiting.get(&self.key).is_some_and(|w| w.ticket == self.ticket) {
            state.waiting.remove(&self.key);
        }
    }
}

#[async_trait]
impl ApprovalBroker for ApprovalQueue {
    async fn await_decision(&self, request: ApprovalRequest) -> ApprovalDecision {
        let key = decision_key(&request.run_id, &request.tool_call_id);
        let (receiver, ticket) = {
            let mut state = self.state.lock().unwrap_or_else(|e| e.into_inner());
            if let Some(decision) = state.early.remove(&key) {
                debug!(run_id = %key.0, tool_call_id = %key.1, ?decision, "Using decision submitted ahead of the wait");
                return decision;
            }
            let (reply, receiver) = oneshot::channel();
            state.next_ticket += 1;
            let ticket = state.next_ticket;
            state.waiting.insert(
                key.clone(),
                Waiting {
                    request: request.clone(),
                    reply,
                    ticket,
                },
            );
            (receiver, ticket)
        };
        let _guard = WaitGuard {
            queue: self,
            key: key.clone(),
            ticket,
        };

        // No subscribers is fine; `pending()` still lists the request.
        let _ = self.events.send(request);
        debug!(run_id = %key.0, tool_call_id = %key.1, "Waiting for approval");

        // A dropped sender means the entry was discarded; treat as rejection.
        receiver.await.unwrap_or(ApprovalDecision::Reject)
    }

    fn submit_decision(&self, run_id: &str, tool_call_id: &str, decision: ApprovalDecision) -> bool {
        let key = decision_key(run_id, tool_call_id);
        let mut state = self.state.lock().unwrap_or_else(|e| e.into_inner());
        match state.waiting.remove(&key) {
            Some(waiting) => waiting.reply.send(decision).is_ok(),
            None => {
                state.early.insert(key, decision);
                false
            }
        }
    }

    fn release_run(&self, run_id: &str) {
        let mut state = self.state.lock().unwrap_or_else(|e| e.into_inner());
        let before = state.early.len();
        state.early.retain(|(run, _), _| run != run_id);
        let dropped = before - state.early.len();
        if dropped > 0 {
            debug!(run_id, dropped, "Discarded unused approval decisions");
        }
    }
}
