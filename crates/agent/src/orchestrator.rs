//! The tool-use loop.
//!
//! With tools active the loop alternates non-streaming requests and tool
//! execution until the model answers in plain text or the round ceiling is
//! hit. Without tools it makes a single streaming request.

use std::sync::Arc;
use std::time::Instant;

use basecamp_core::error::{LoopError, ProviderError};
use basecamp_core::message::{ChatMessage, ToolCall};
use basecamp_core::provider::{ChatProvider, ChatRequest, ChatResponse, TokenSink, Usage};
use basecamp_core::run::RunState;
use basecamp_telemetry::{NoopObserver, TelemetryError, TurnObserver};
use tracing::{debug, info, warn};

use crate::gateway::ToolGateway;
use crate::run_log::RunRecorder;

/// Inputs for one loop execution.
#[derive(Debug, Clone)]
pub struct LoopContext {
    pub camp_id: String,
    /// The composed first request. Tools are active iff it advertises any.
    pub request: ChatRequest,
    /// Run settings for the tool path; defaults are used when absent.
    pub run: Option<RunState>,
    pub correlation_id: String,
}

/// What a finished loop hands back.
#[derive(Debug, Clone, PartialEq)]
pub struct LoopResult {
    pub output_text: String,
    /// Every request payload issued, in order.
    pub requests: Vec<ChatRequest>,
    /// Messages to append to the camp transcript, in production order.
    pub new_messages: Vec<ChatMessage>,
    pub usage: Usage,
    /// Model id reported by the provider, if any.
    pub model: Option<String>,
    pub run_id: Option<String>,
    /// Tool rounds used (zero on the streaming path).
    pub rounds: u32,
}

pub struct ToolLoop {
    provider: Arc<dyn ChatProvider>,
    gateway: Option<ToolGateway>,
    recorder: RunRecorder,
    observer: Arc<dyn TurnObserver>,
}

impl ToolLoop {
    pub fn new(provider: Arc<dyn ChatProvider>) -> Self {
        Self {
            provider,
            gateway: None,
            recorder: RunRecorder::disabled(),
            observer: Arc::new(NoopObserver),
        }
    }

    pub fn with_gateway(mut self, gateway: ToolGateway) -> Self {
        self.gateway = Some(gateway);
        self
    }

    pub fn with_recorder(mut self, recorder: RunRecorder) -> Self {
        self.recorder = recorder;
        self
    }

    pub fn with_observer(mut self, observer: Arc<dyn TurnObserver>) -> Self {
        self.observer = observer;
        self
    }

    pub async fn run(
        &self,
        ctx: LoopContext,
        on_token: &mut TokenSink<'_>,
    ) -> Result<LoopResult, LoopError> {
        if ctx.request.has_tools() {
            let Some(gateway) = &self.gateway else {
                return Err(basecamp_core::error::ComposeError::MissingExecutor.into());
            };
            let run = ctx.run.clone().unwrap_or_else(|| RunState::new(ctx.camp_id.clone()));
            let result = self.run_tools(gateway, &run, ctx).await;
            gateway.release_run(&run);
            result
        } else {
            self.run_streaming(ctx, on_token).await
        }
    }

    async fn run_streaming(
        &self,
        ctx: LoopContext,
        on_token: &mut TokenSink<'_>,
    ) -> Result<LoopResult, LoopError> {
        let request = ChatRequest {
            stream: true,
            ..ctx.request
        };
        let cid = ctx.correlation_id.as_str();

        self.observe(self.observer.request_started(cid, 1, &request));
        let started = Instant::now();
        let response = match self.provider.stream(&request, on_token).await {
            Ok(response) => response,
            Err(e) => {
                self.observe(self.observer.request_failed(cid, 1, &e, started.elapsed()));
                return Err(e.into());
            }
        };
        self.observe(self.observer.request_finished(cid, 1, &response, started.elapsed()));

        let output_text = response.output_text();
        if output_text.is_empty() {
            return Err(LoopError::EmptyOutput);
        }
        debug!(correlation_id = cid, chars = output_text.len(), "Streaming turn finished");

        Ok(LoopResult {
            new_messages: vec![ChatMessage::assistant(output_text.clone())],
            output_text,
            requests: vec![request],
            usage: response.usage,
            model: response.model,
            run_id: None,
            rounds: 0,
        })
    }

    async fn run_tools(
        &self,
        gateway: &ToolGateway,
        run: &RunState,
        ctx: LoopContext,
    ) -> Result<LoopResult, LoopError> {
        let cid = ctx.correlation_id.as_str();
        let base = ChatRequest {
            stream: false,
            ..ctx.request
        };
        let mut transcript = base.messages.clone();
        let mut requests = Vec::new();
        let mut new_messages = Vec::new();
        let mut usage = Usage::default();
        let mut model = None;
        let mut rounds: u32 = 0;

        self.recorder.started(run).await;
        info!(
            run_id = %run.run_id,
            camp_id = %run.camp_id,
            max_iterations = run.max_iterations(),
            approval_policy = %run.approval_policy,
            "Tool run started"
        );

        loop {
            let request = base.with_messages(transcript.clone());
            requests.push(request.clone());
            let request_no = requests.len() as u32;

            let response = match self.request(cid, request_no, &request).await {
                Ok(response) => response,
                Err(e) => return Err(self.fail(run, e.into()).await),
            };
            usage.accumulate(&response.usage);
            if response.model.is_some() {
                model = response.model.clone();
            }

            if !response.message.has_tool_calls() {
                let output_text = response.output_text();
                if output_text.is_empty() {
                    return Err(self.fail(run, LoopError::EmptyOutput).await);
                }
                new_messages.push(ChatMessage::assistant(output_text.clone()));
                self.recorder.completed(run, rounds).await;
                info!(run_id = %run.run_id, rounds, "Tool run completed");
                return Ok(LoopResult {
                    output_text,
                    requests,
                    new_messages,
                    usage,
                    model,
                    run_id: Some(run.run_id.clone()),
                    rounds,
                });
            }

            rounds += 1;
            if rounds > run.max_iterations() {
                let err = LoopError::LoopExceeded {
                    max_iterations: run.max_iterations(),
                };
                return Err(self.fail(run, err).await);
            }

            let calls = assign_call_ids(rounds, &response.message.tool_calls);
            let assistant = ChatMessage::assistant_tool_calls(response.output_text(), calls.clone());
            transcript.push(assistant.clone());
            new_messages.push(assistant);
            debug!(run_id = %run.run_id, round = rounds, calls = calls.len(), "Executing tool calls");

            for call in &calls {
                self.observe(self.observer.tool_started(cid, call));
                self.recorder.tool_executing(run, call).await;

                let outcome = gateway.execute(run, call).await;
                self.recorder.tool_result(run, call, &outcome.content).await;
                if let Some(error) = &outcome.error {
                    self.recorder.tool_failed(run, call, error).await;
                }
                self.observe(
                    self.observer
                        .tool_finished(cid, call, &outcome.content, outcome.elapsed),
                );

                let message = ChatMessage::tool_result(&call.id, &call.name, outcome.content.trim());
                transcript.push(message.clone());
                new_messages.push(message);
            }
        }
    }

    async fn request(
        &self,
        cid: &str,
        round: u32,
        request: &ChatRequest,
    ) -> Result<ChatResponse, ProviderError> {
        self.observe(self.observer.request_started(cid, round, request));
        let started = Instant::now();
        match self.provider.complete(request).await {
            Ok(response) => {
                self.observe(self.observer.request_finished(cid, round, &response, started.elapsed()));
                Ok(response)
            }
            Err(e) => {
                self.observe(self.observer.request_failed(cid, round, &e, started.elapsed()));
                Err(e)
            }
        }
    }

    async fn fail(&self, run: &RunState, err: LoopError) -> LoopError {
        warn!(run_id = %run.run_id, error = %err, "Tool run failed");
        self.recorder.run_failed(run, &err.to_string()).await;
        err
    }

    fn observe(&self, result: Result<(), TelemetryError>) {
        if let Err(e) = result {
            warn!(error = %e, "Turn observer hook failed");
        }
    }
}

/// Trim model-supplied ids and fill in blank ones as `call_<round>_<index>`.
fn assign_call_ids(round: u32, calls: &[ToolCall]) -> Vec<ToolCall> {
    calls
        .iter()
        .enumerate()
        .map(|(index, call)| {
            let id = match call.id.trim() {
                "" => format!("call_{round}_{index}"),
                id => id.to_string(),
            };
            ToolCall { id, ..call.clone() }
        })
        .collect()
}
