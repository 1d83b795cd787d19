//! One user-visible turn in a camp, end to end.

use std::sync::Arc;

use basecamp_config::{ComposerBudgets, EngineConfig, ModelDefaults, ToolLoopConfig};
use basecamp_core::camp::{CampMessage, CampStore};
use basecamp_core::error::{ComposeError, LoopError, ProviderError, StoreError};
use basecamp_core::message::ChatMessage;
use basecamp_core::provider::{ChatProvider, ChatRequest, TokenSink, Usage};
use basecamp_core::run::RunLog;
use basecamp_core::tool::ToolExecutor;
use basecamp_providers::OpenRouterProvider;
use basecamp_telemetry::{NoopObserver, TurnObserver};
use thiserror::Error;
use tracing::{debug, info, warn};
use uuid::Uuid;

use crate::approval::{ApprovalBroker, ApprovalQueue};
use crate::composer::{ComposeInput, ComposedBreakdown, MessageComposer};
use crate::gateway::ToolGateway;
use crate::orchestrator::{LoopContext, ToolLoop};
use crate::run_log::{InMemoryRunLog, JsonlRunLog, RunRecorder};

/// A user message sent to a camp.
#[derive(Debug, Clone, Default)]
pub struct TurnRequest {
    pub camp_id: String,
    pub user_message: String,
    /// Artifacts to attach as reference context.
    pub artifact_ids: Vec<String>,
    /// Generated when absent.
    pub correlation_id: Option<String>,
}

impl TurnRequest {
    pub fn new(camp_id: impl Into<String>, user_message: impl Into<String>) -> Self {
        Self {
            camp_id: camp_id.into(),
            user_message: user_message.into(),
            ..Self::default()
        }
    }

    pub fn with_artifacts(mut self, ids: Vec<String>) -> Self {
        self.artifact_ids = ids;
        self
    }

    pub fn with_correlation_id(mut self, id: impl Into<String>) -> Self {
        self.correlation_id = Some(id.into());
        self
    }
}

#[derive(Debug, Clone)]
pub struct TurnOutcome {
    pub output_text: String,
    /// Model that answered, falling back to the requested one.
    pub model: String,
    pub usage: Usage,
    pub breakdown: ComposedBreakdown,
    pub requests: Vec<ChatRequest>,
    pub correlation_id: String,
    pub run_id: Option<String>,
    pub rounds: u32,
}

#[derive(Debug, Error)]
pub enum TurnError {
    #[error(transparent)]
    Store(#[from] StoreError),

    #[error(transparent)]
    Compose(#[from] ComposeError),

    #[error("{source}")]
    Loop { source: LoopError, model: String },
}

impl TurnError {
    /// Message for the end user. HTTP failures name the requested model.
    pub fn user_message(&self) -> String {
        match self {
            Self::Loop {
                source: LoopError::Provider(err @ ProviderError::Http { .. }),
                model,
            } => format!("{err} (model: {model})"),
            other => other.to_string(),
        }
    }
}

/// Loads a camp, composes, runs the tool loop and persists the results.
pub struct CampTurnRunner {
    store: Arc<dyn CampStore>,
    provider: Arc<dyn ChatProvider>,
    executor: Option<Arc<dyn ToolExecutor>>,
    approvals: Arc<dyn ApprovalBroker>,
    run_log: Option<Arc<dyn RunLog>>,
    observer: Arc<dyn TurnObserver>,
    composer: MessageComposer,
    tool_loop: ToolLoopConfig,
    model_defaults: Option<ModelDefaults>,
}

impl CampTurnRunner {
    pub fn new(store: Arc<dyn CampStore>, provider: Arc<dyn ChatProvider>) -> Self {
        Self {
            store,
            provider,
            executor: None,
            approvals: Arc::new(ApprovalQueue::new()),
            run_log: None,
            observer: Arc::new(NoopObserver),
            composer: MessageComposer::default(),
            tool_loop: ToolLoopConfig::default(),
            model_defaults: None,
        }
    }

    /// An OpenRouter-backed runner configured from `config`.
    pub fn from_config(config: &EngineConfig, store: Arc<dyn CampStore>) -> Result<Self, ProviderError> {
        let provider = OpenRouterProvider::from_settings(&config.provider)?;
        let run_log: Arc<dyn RunLog> = match &config.run_log.path {
            Some(path) => Arc::new(JsonlRunLog::new(path.clone())),
            None => Arc::new(InMemoryRunLog::new()),
        };
        Ok(Self::new(store, Arc::new(provider))
            .with_run_log(run_log)
            .with_budgets(config.composer)
            .with_tool_loop(config.tool_loop.clone())
            .with_model_defaults(config.model.clone()))
    }

    pub fn with_executor(mut self, executor: Arc<dyn ToolExecutor>) -> Self {
        self.executor = Some(executor);
        self
    }

    pub fn with_approvals(mut self, approvals: Arc<dyn ApprovalBroker>) -> Self {
        self.approvals = approvals;
        self
    }

    pub fn with_run_log(mut self, run_log: Arc<dyn RunLog>) -> Self {
        self.run_log = Some(run_log);
        self
    }

    pub fn with_observer(mut self, observer: Arc<dyn TurnObserver>) -> Self {
        self.observer = observer;
        self
    }

    pub fn with_budgets(mut self, budgets: ComposerBudgets) -> Self {
        self.composer = MessageComposer::new(budgets);
        self
    }

    pub fn with_tool_loop(mut self, tool_loop: ToolLoopConfig) -> Self {
        self.tool_loop = tool_loop;
        self
    }

    /// Fill a camp's blank model id or zero `max_tokens` from `defaults`.
    pub fn with_model_defaults(mut self, defaults: ModelDefaults) -> Self {
        self.model_defaults = Some(defaults);
        self
    }

    pub fn approvals(&self) -> &Arc<dyn ApprovalBroker> {
        &self.approvals
    }

    pub async fn run_turn(
        &self,
        request: TurnRequest,
        on_token: &mut TokenSink<'_>,
    ) -> Result<TurnOutcome, TurnError> {
        let camp_id = request.camp_id.as_str();
        let mut camp = self.store.load_camp(camp_id).await?;
        if let Some(defaults) = &self.model_defaults {
            if camp.config.model.trim().is_empty() {
                debug!(camp_id, model = %defaults.model, "Camp has no model; using the configured default");
                camp.config.model = defaults.model.clone();
            }
            if camp.config.max_tokens == 0 {
                camp.config.max_tokens = defaults.max_tokens;
            }
        }

        let executor = if camp.config.tools_enabled {
            Some(self.executor.clone().ok_or(ComposeError::MissingExecutor)?)
        } else {
            None
        };
        let specs = executor.as_ref().map(|e| e.specs()).unwrap_or_default();
        let artifacts = self.store.load_artifacts(camp_id, &request.artifact_ids).await?;

        let composition = self.composer.compose(ComposeInput {
            camp: &camp,
            artifacts: &artifacts,
            user_message: Some(request.user_message.as_str()),
            tools: &specs,
            stream: specs.is_empty(),
        })?;
        let requested_model = composition.request.model.clone();
        let breakdown = composition.breakdown;
        let correlation_id = request
            .correlation_id
            .clone()
            .unwrap_or_else(|| format!("corr-{}", Uuid::new_v4()));

        if let Some(text) = &breakdown.user_message {
            let message = CampMessage::from_chat(&ChatMessage::user(text.clone()))
                .with_artifacts(breakdown.included_artifact_ids());
            self.store.append_message(camp_id, message).await?;
        }

        let mut tool_loop = ToolLoop::new(self.provider.clone()).with_observer(self.observer.clone());
        if let Some(log) = &self.run_log {
            tool_loop = tool_loop.with_recorder(RunRecorder::new(log.clone()));
        }
        if let Some(executor) = executor {
            tool_loop = tool_loop.with_gateway(ToolGateway::new(executor, self.approvals.clone()));
        }

        let ctx = LoopContext {
            camp_id: camp_id.to_string(),
            request: composition.request,
            run: camp.config.tools_enabled.then(|| self.tool_loop.run_state(camp_id)),
            correlation_id: correlation_id.clone(),
        };
        let result = tool_loop
            .run(ctx, on_token)
            .await
            .map_err(|source| TurnError::Loop {
                source,
                model: requested_model.clone(),
            })?;

        for message in &result.new_messages {
            self.store
                .append_message(camp_id, CampMessage::from_chat(message))
                .await?;
        }
        for artifact in &breakdown.artifacts {
            if let Err(e) = self.store.increment_artifact_usage(camp_id, &artifact.id).await {
                warn!(camp_id, artifact_id = %artifact.id, error = %e, "Failed to bump artifact usage");
            }
        }

        info!(
            camp_id,
            correlation_id = %correlation_id,
            requests = result.requests.len(),
            rounds = result.rounds,
            "Turn completed"
        );

        Ok(TurnOutcome {
            output_text: result.output_text,
            model: result.model.unwrap_or(requested_model),
            usage: result.usage,
            breakdown,
            requests: result.requests,
            correlation_id,
            run_id: result.run_id,
            rounds: result.rounds,
        })
    }
}
