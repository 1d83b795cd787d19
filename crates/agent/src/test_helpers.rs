//! Shared test helpers: scripted providers and executors.

use std::collections::{HashMap, HashSet, VecDeque};
use std::sync::Mutex;
use std::time::Duration;

use async_trait::async_trait;
use basecamp_core::error::{ProviderError, ToolError};
use basecamp_core::message::{ChatMessage, ToolCall};
use basecamp_core::provider::{ChatProvider, ChatRequest, ChatResponse, TokenSink, Usage};
use basecamp_core::tool::{ToolEffect, ToolExecutor, ToolSpec};
use serde_json::{Value, json};
use tokio_util::sync::CancellationToken;

/// A mock provider that returns a sequence of scripted responses.
///
/// Each call to `complete` or `stream` takes the next response in the queue
/// and records the request it was given.
pub struct SequentialMockProvider {
    responses: Mutex<VecDeque<Result<ChatResponse, ProviderError>>>,
    requests: Mutex<Vec<ChatRequest>>,
}

impl SequentialMockProvider {
    pub fn new(responses: Vec<ChatResponse>) -> Self {
        Self::scripted(responses.into_iter().map(Ok).collect())
    }

    pub fn scripted(responses: Vec<Result<ChatResponse, ProviderError>>) -> Self {
        Self {
            responses: Mutex::new(responses.into()),
            requests: Mutex::new(Vec::new()),
        }
    }

    /// A provider whose first `rounds` answers each request one `name` call.
    pub fn endless_tool_calls(name: &str, rounds: usize) -> Self {
        Self::new(
            (0..rounds)
                .map(|i| make_tool_call_response(vec![make_tool_call(&format!("call_{i}"), name, "{}")], ""))
                .collect(),
        )
    }

    pub fn requests(&self) -> Vec<ChatRequest> {
        self.requests.lock().unwrap().clone()
    }

    pub fn call_count(&self) -> usize {
        self.requests.lock().unwrap().len()
    }

    fn next(&self, request: &ChatRequest) -> Result<ChatResponse, ProviderError> {
        self.requests.lock().unwrap().push(request.clone());
        self.responses.lock().unwrap().pop_front().unwrap_or_else(|| {
            Err(ProviderError::ResponseValidation(
                "SequentialMockProvider: no more responses".into(),
            ))
        })
    }
}

#[async_trait]
impl ChatProvider for SequentialMockProvider {
    fn name(&self) -> &str {
        "sequential_mock"
    }

    async fn complete(&self, request: &ChatRequest) -> Result<ChatResponse, ProviderError> {
        self.next(request)
    }

    /// Emits the text word by word so callers see more than one token.
    async fn stream(
        &self,
        request: &ChatRequest,
        on_token: &mut TokenSink<'_>,
    ) -> Result<ChatResponse, ProviderError> {
        let response = self.next(request)?;
        let text = response.message.text();
        for piece in text.split_inclusive(' ') {
            on_token(piece);
        }
        Ok(response)
    }
}

/// A plain assistant answer with the given usage.
pub fn make_text_response_with_usage(text: &str, usage: Usage) -> ChatResponse {
    ChatResponse {
        message: ChatMessage::assistant(text),
        usage,
        model: Some("openai/gpt-4o-mini".into()),
        finish_reason: Some("stop".into()),
        status: 200,
        duration_ms: 1,
        chunk_count: 0,
    }
}

pub fn make_text_response(text: &str) -> ChatResponse {
    make_text_response_with_usage(text, Usage::new(10, 5, 15))
}

/// An assistant message requesting `tool_calls`.
pub fn make_tool_call_response(tool_calls: Vec<ToolCall>, thought: &str) -> ChatResponse {
    ChatResponse {
        message: ChatMessage::assistant_tool_calls(thought, tool_calls),
        finish_reason: Some("tool_calls".into()),
        ..make_text_response("")
    }
}

pub fn make_tool_call(id: &str, name: &str, args: &str) -> ToolCall {
    ToolCall::new(id, name, args)
}

/// What a scripted tool does when called.
#[derive(Debug, Clone)]
pub enum Behavior {
    Value(Value),
    Fail(String),
    Sleep(Duration),
}

/// A tool executor driven by per-name behaviors.
///
/// Unknown tools fail with `NotFound`. Every call and every cancellation
/// token handed in is recorded.
#[derive(Default)]
pub struct ScriptedExecutor {
    behaviors: HashMap<String, Behavior>,
    read_only: HashSet<String>,
    calls: Mutex<Vec<ToolCall>>,
    tokens: Mutex<Vec<CancellationToken>>,
}

impl ScriptedExecutor {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn on(mut self, name: &str, behavior: Behavior) -> Self {
        self.behaviors.insert(name.to_string(), behavior);
        self
    }

    pub fn read_only(mut self, name: &str) -> Self {
        self.read_only.insert(name.to_string());
        self
    }

    pub fn calls(&self) -> Vec<ToolCall> {
        self.calls.lock().unwrap().clone()
    }

    pub fn cancelled_tokens(&self) -> usize {
        self.tokens
            .lock()
            .unwrap()
            .iter()
            .filter(|t| t.is_cancelled())
            .count()
    }
}

#[async_trait]
impl ToolExecutor for ScriptedExecutor {
    fn specs(&self) -> Vec<ToolSpec> {
        let mut names: Vec<&String> = self.behaviors.keys().collect();
        names.sort();
        names
            .into_iter()
            .map(|name| ToolSpec::new(name.clone(), format!("Scripted {name}"), json!({"type": "object"})))
            .collect()
    }

    fn effect(&self, name: &str) -> ToolEffect {
        if self.read_only.contains(name) {
            ToolEffect::ReadOnly
        } else {
            ToolEffect::Mutating
        }
    }

    async fn execute(
        &self,
        _scope_id: &str,
        call: &ToolCall,
        cancel: CancellationToken,
    ) -> Result<Value, ToolError> {
        self.calls.lock().unwrap().push(call.clone());
        self.tokens.lock().unwrap().push(cancel.clone());
        match self.behaviors.get(&call.name) {
            Some(Behavior::Value(value)) => Ok(value.clone()),
            Some(Behavior::Fail(reason)) => Err(ToolError::ExecutionFailed {
                tool_name: call.name.clone(),
                reason: reason.clone(),
            }),
            Some(Behavior::Sleep(duration)) => {
                tokio::select! {
                    _ = tokio::time::sleep(*duration) => Ok(json!("slept")),
                    _ = cancel.cancelled() => Err(ToolError::Cancelled(call.id.clone())),
                }
            }
            None => Err(ToolError::NotFound(call.name.clone())),
        }
    }
}
