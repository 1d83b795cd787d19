//! Error types for the Basecamp domain.
//!
//! Uses `thiserror` for ergonomic error definitions.
//! Each bounded context has its own error enum.

use thiserror::Error;

/// The top-level error type for all Basecamp operations.
#[derive(Debug, Error)]
pub enum Error {
    // --- Provider errors ---
    #[error("Provider error: {0}")]
    Provider(#[from] ProviderError),

    // --- Tool errors ---
    #[error("Tool error: {0}")]
    Tool(#[from] ToolError),

    // --- Persistence errors ---
    #[error("Store error: {0}")]
    Store(#[from] StoreError),

    // --- Run log errors ---
    #[error("Run log error: {0}")]
    RunLog(#[from] RunLogError),

    // --- Composition errors ---
    #[error("Compose error: {0}")]
    Compose(#[from] ComposeError),

    // --- Tool loop errors ---
    #[error("Tool loop error: {0}")]
    Loop(#[from] LoopError),

    // --- Serialization ---
    #[error("Serialization error: {0}")]
    Serialization(#[from] serde_json::Error),
}

/// Result type alias using our Error.
pub type Result<T> = std::result::Result<T, Error>;

// --- Bounded context errors ---

#[derive(Debug, Clone, Error)]
pub enum ProviderError {
    /// Non-2xx status. `payload` is the parsed error body (or `Null`).
    #[error("HTTP {status}: {message}")]
    Http {
        status: u16,
        message: String,
        payload: serde_json::Value,
    },

    #[error("Invalid provider response: {0}")]
    ResponseValidation(String),

    #[error("Response stream unavailable: {0}")]
    StreamUnavailable(String),

    #[error("Stream interrupted: {0}")]
    StreamInterrupted(String),

    #[error("Provider not configured: {0}")]
    NotConfigured(String),

    #[error("Request timed out: {0}")]
    Timeout(String),

    #[error("Network error: {0}")]
    Network(String),
}

#[derive(Debug, Clone, Error)]
pub enum ToolError {
    #[error("Tool not found: {0}")]
    NotFound(String),

    #[error("Tool execution failed: {tool_name}: {reason}")]
    ExecutionFailed { tool_name: String, reason: String },

    #[error("Tool call timed out after {timeout_ms}ms: {tool_name}")]
    Timeout { tool_name: String, timeout_ms: u64 },

    #[error("Tool call rejected by user.")]
    Rejected { tool_name: String },

    #[error("Invalid tool arguments for {tool_name}: {reason}")]
    InvalidArguments { tool_name: String, reason: String },

    #[error("Tool call cancelled: {0}")]
    Cancelled(String),
}

#[derive(Debug, Clone, Error)]
pub enum StoreError {
    #[error("{kind} not found: {id}")]
    NotFound { kind: &'static str, id: String },

    #[error("Invalid record: {0}")]
    Invalid(String),

    #[error("Storage error: {0}")]
    Storage(String),
}

#[derive(Debug, Error)]
pub enum RunLogError {
    #[error("Run log write failed: {0}")]
    Write(String),

    #[error("Run log I/O error: {0}")]
    Io(#[from] std::io::Error),

    #[error("Run log serialization error: {0}")]
    Serialization(#[from] serde_json::Error),
}

/// Precondition failures detected before any network call is made.
#[derive(Debug, Clone, PartialEq, Error)]
pub enum ComposeError {
    #[error("A model id is required")]
    EmptyModel,

    #[error("temperature must be between 0.0 and 2.0 (got {0})")]
    InvalidTemperature(f32),

    #[error("max_tokens must be greater than zero")]
    InvalidMaxTokens,

    #[error("Tools are enabled for this camp but no tool executor is configured")]
    MissingExecutor,
}

/// Failures that abort a tool-use loop. Tool-shaped failures never appear
/// here: the gateway turns them into tool-role messages.
#[derive(Debug, Clone, Error)]
pub enum LoopError {
    #[error(transparent)]
    Compose(#[from] ComposeError),

    #[error(transparent)]
    Provider(#[from] ProviderError),

    #[error("Tool loop exceeded the maximum of {max_iterations} iterations")]
    LoopExceeded { max_iterations: u32 },

    #[error("Model returned an empty response")]
    EmptyOutput,
}
