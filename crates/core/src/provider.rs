//! Provider trait: the abstraction over the remote chat-completion API.
//!
//! A provider knows how to send a composed request and get a response back,
//! either as one complete message or as a stream of tokens.

use async_trait::async_trait;
use serde::{Deserialize, Serialize};

use crate::error::ProviderError;
use crate::message::ChatMessage;
use crate::tool::ToolSpec;

/// Tool selection mode sent alongside advertised tools.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum ToolChoice {
    Auto,
}

/// A fully composed chat request.
///
/// `tools` and `tool_choice` are either both present (non-empty tools) or
/// both absent. An empty list is never sent.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ChatRequest {
    /// The model to use (e.g., "anthropic/claude-sonnet-4")
    pub model: String,

    /// The ordered outbound messages
    pub messages: Vec<ChatMessage>,

    /// Sampling temperature, 0.0 to 2.0
    pub temperature: f32,

    /// Maximum tokens to generate
    pub max_tokens: u32,

    /// Tools the model may call
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub tools: Option<Vec<ToolSpec>>,

    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub tool_choice: Option<ToolChoice>,

    /// Whether to stream the response
    #[serde(default)]
    pub stream: bool,
}

impl ChatRequest {
    /// Whether this request advertises at least one tool.
    pub fn has_tools(&self) -> bool {
        self.tools.as_ref().is_some_and(|tools| !tools.is_empty())
    }

    /// Copy of this request with a different message list.
    pub fn with_messages(&self, messages: Vec<ChatMessage>) -> Self {
        Self {
            messages,
            ..self.clone()
        }
    }
}

/// Token usage information. Each counter is independently optional.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct Usage {
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub prompt_tokens: Option<u64>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub completion_tokens: Option<u64>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub total_tokens: Option<u64>,
}

impl Usage {
    pub fn new(prompt_tokens: u64, completion_tokens: u64, total_tokens: u64) -> Self {
        Self {
            prompt_tokens: Some(prompt_tokens),
            completion_tokens: Some(completion_tokens),
            total_tokens: Some(total_tokens),
        }
    }

    /// Overwrite each counter that `next` carries, keeping the rest.
    pub fn overlay(&mut self, next: &Usage) {
        self.prompt_tokens = next.prompt_tokens.or(self.prompt_tokens);
        self.completion_tokens = next.completion_tokens.or(self.completion_tokens);
        self.total_tokens = next.total_tokens.or(self.total_tokens);
    }

    /// Add another round's usage to this running total.
    pub fn accumulate(&mut self, other: &Usage) {
        fn add(a: Option<u64>, b: Option<u64>) -> Option<u64> {
            match (a, b) {
                (Some(a), Some(b)) => Some(a + b),
                (a, b) => a.or(b),
            }
        }
        self.prompt_tokens = add(self.prompt_tokens, other.prompt_tokens);
        self.completion_tokens = add(self.completion_tokens, other.completion_tokens);
        self.total_tokens = add(self.total_tokens, other.total_tokens);
    }

    pub fn is_empty(&self) -> bool {
        self.prompt_tokens.is_none() && self.completion_tokens.is_none() && self.total_tokens.is_none()
    }
}

/// A complete response from a provider (streamed responses are aggregated).
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ChatResponse {
    /// The generated assistant message
    pub message: ChatMessage,

    /// Token usage statistics
    #[serde(default)]
    pub usage: Usage,

    /// Which model actually responded (may differ from requested)
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub model: Option<String>,

    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub finish_reason: Option<String>,

    /// HTTP status of the exchange
    pub status: u16,

    pub duration_ms: u64,

    /// Number of stream chunks parsed (0 for non-streaming responses)
    #[serde(default)]
    pub chunk_count: usize,
}

impl ChatResponse {
    /// The assistant text, trimmed.
    pub fn output_text(&self) -> String {
        self.message.text().trim().to_string()
    }
}

/// Receives streamed content deltas, one call per piece.
pub type TokenSink<'s> = dyn for<'t> FnMut(&'t str) + Send + 's;

/// The core provider trait.
///
/// The orchestrator calls `complete()` while tools are active and `stream()`
/// otherwise, without knowing which backend is behind it.
#[async_trait]
pub trait ChatProvider: Send + Sync {
    /// A human-readable name for this provider (e.g., "openrouter").
    fn name(&self) -> &str;

    /// Send a request and get a complete response.
    async fn complete(&self, request: &ChatRequest) -> Result<ChatResponse, ProviderError>;

    /// Send a request and forward every content delta to `on_token` as it
    /// arrives. Returns the aggregated response once the stream ends.
    ///
    /// Default implementation calls `complete()` and emits the whole text as
    /// a single token.
    async fn stream(
        &self,
        request: &ChatRequest,
        on_token: &mut TokenSink<'_>,
    ) -> Result<ChatResponse, ProviderError> {
        let response = self.complete(request).await?;
        let text = response.message.text();
        if !text.is_empty() {
            on_token(&text);
        }
        Ok(response)
    }
}
