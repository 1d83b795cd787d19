//! The Basecamp conversation engine.
//!
//! A turn follows a **Compose → Request → Act** cycle:
//!
//! 1. **Compose** a request from camp state ([`MessageComposer`])
//! 2. **Request** a completion from the provider
//! 3. **If tool calls**: run them through the [`ToolGateway`] (approval,
//!    deadline, normalization), append the results, loop back to step 2
//! 4. **If text**: return it and the messages to persist
//!
//! Without tools the turn is a single streaming request. Every tool-enabled
//! turn is recorded in the run log through a best-effort [`RunRecorder`].

pub mod approval;
pub mod composer;
pub mod gateway;
pub mod orchestrator;
pub mod run_log;
pub mod turn;

#[cfg(test)]
pub(crate) mod test_helpers;

pub use approval::{ApprovalBroker, ApprovalDecision, ApprovalQueue, ApprovalRequest, AutoApprove};
pub use composer::{
    ArtifactInclusion, ComposeInput, ComposedBreakdown, Composition, MessageComposer,
    TRUNCATION_MARKER, canonical_json,
};
pub use gateway::{ToolGateway, ToolOutcome, ToolStatus};
pub use orchestrator::{LoopContext, LoopResult, ToolLoop};
pub use run_log::{InMemoryRunLog, JsonlRunLog, RunRecorder};
pub use turn::{CampTurnRunner, TurnError, TurnOutcome, TurnRequest};
