//! # Basecamp Core
//!
//! Domain types, ports, and error definitions for the Basecamp conversation
//! runtime. This crate has **no transport dependencies**: it defines the
//! model every other crate implements against.
//!
//! ## Design Philosophy
//!
//! Every collaborator the engine talks to is a trait here:
//! - [`ChatProvider`]: the remote chat-completion API
//! - [`ToolExecutor`]: whatever actually runs tool calls
//! - [`CampStore`]: persistence of camps, transcripts and artifacts
//! - [`RunLog`]: the append-only run-state sink
//!
//! Implementations live in their respective crates, which keeps the
//! dependency graph pointing inward and makes every port easy to mock.

pub mod camp;
pub mod error;
pub mod message;
pub mod provider;
pub mod run;
pub mod tool;

// Re-export key types at crate root for ergonomics
pub use camp::{Artifact, Camp, CampConfig, CampMessage, CampStore};
pub use error::{Error, Result};
pub use message::{ChatMessage, MessageContent, Role, ToolCall};
pub use provider::{ChatProvider, ChatRequest, ChatResponse, TokenSink, ToolChoice, Usage};
pub use run::{ApprovalPolicy, RunEvent, RunEventKind, RunLog, RunState};
pub use tool::{Tool, ToolEffect, ToolExecutor, ToolRegistry, ToolSpec};
