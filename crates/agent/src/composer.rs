//! Message composition: camp state in, one chat request out.
//!
//! Messages are emitted in a fixed order:
//!
//! 1. **System prompt**, when non-blank
//! 2. **Camp memory**, always, as key-sorted JSON
//! 3. **Reference artifacts**, sorted by `(title, id)`, character-budgeted
//! 4. **Transcript replay**, valid messages only, persisted system messages skipped
//! 5. **New user message**, when non-blank
//!
//! # Determinism
//!
//! Composition is a pure function of its input: no clock, no randomness,
//! no map iteration order leaks into the output.

use basecamp_config::ComposerBudgets;
use basecamp_core::camp::{Artifact, Camp, CampMessage};
use basecamp_core::error::ComposeError;
use basecamp_core::message::{ChatMessage, Role, ToolCall};
use basecamp_core::provider::{ChatRequest, ToolChoice};
use basecamp_core::tool::ToolSpec;
use serde::{Deserialize, Serialize};
use serde_json::Value;
use tracing::debug;

/// Appended to an artifact body that was cut to fit its budget.
pub const TRUNCATION_MARKER: &str = "[TRUNCATED]";

// ── Types ─────────────────────────────────────────────────────────────────

/// Everything the composer reads for one request.
#[derive(Debug, Clone, Copy)]
pub struct ComposeInput<'a> {
    pub camp: &'a Camp,
    /// Artifacts selected for this turn, in any order.
    pub artifacts: &'a [Artifact],
    /// The new user message, if any.
    pub user_message: Option<&'a str>,
    /// Tools to advertise; empty means no tool attachment.
    pub tools: &'a [ToolSpec],
    pub stream: bool,
}

/// How much of one artifact made it into the request.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct ArtifactInclusion {
    pub id: String,
    pub title: String,
    /// Body length in characters before truncation.
    pub original_chars: usize,
    /// Body characters sent, marker excluded.
    pub included_chars: usize,
    pub truncated: bool,
}

/// Audit record of a composition. Never sent anywhere.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ComposedBreakdown {
    pub system_prompt: Option<String>,
    /// Canonical JSON of the camp memory.
    pub memory: String,
    pub artifacts: Vec<ArtifactInclusion>,
    /// Selected artifacts dropped because the global budget ran out.
    pub omitted_artifact_ids: Vec<String>,
    pub transcript_total: usize,
    pub transcript_included: usize,
    pub user_message: Option<String>,
}

impl ComposedBreakdown {
    pub fn included_artifact_ids(&self) -> Vec<String> {
        self.artifacts.iter().map(|a| a.id.clone()).collect()
    }
}

/// A composed request plus its breakdown.
#[derive(Debug, Clone, PartialEq)]
pub struct Composition {
    pub request: ChatRequest,
    pub breakdown: ComposedBreakdown,
}

// ── Composer ──────────────────────────────────────────────────────────────

/// Builds chat requests from camp state.
#[derive(Debug, Clone, Copy, Default)]
pub struct MessageComposer {
    budgets: ComposerBudgets,
}

impl MessageComposer {
    pub fn new(budgets: ComposerBudgets) -> Self {
        Self { budgets }
    }

    pub fn budgets(&self) -> ComposerBudgets {
        self.budgets
    }

    pub fn compose(&self, input: ComposeInput<'_>) -> Result<Composition, ComposeError> {
        let config = &input.camp.config;
        let model = config.model.trim();
        if model.is_empty() {
            return Err(ComposeError::EmptyModel);
        }
        if !(0.0..=2.0).contains(&config.temperature) {
            return Err(ComposeError::InvalidTemperature(config.temperature));
        }
        if config.max_tokens == 0 {
            return Err(ComposeError::InvalidMaxTokens);
        }

        let mut messages = Vec::new();

        let system_prompt = non_blank(&input.camp.system_prompt);
        if let Some(prompt) = &system_prompt {
            messages.push(ChatMessage::system(prompt.clone()));
        }

        let memory = canonical_json(&memory_object(&input.camp.memory));
        messages.push(ChatMessage::system(format!("Camp memory (JSON):\n{memory}")));

        let (artifact_messages, inclusions, omitted) = self.artifact_messages(input.artifacts);
        messages.extend(artifact_messages);

        let transcript = &input.camp.transcript;
        let replayed: Vec<ChatMessage> = transcript.iter().filter_map(replay_message).collect();
        let transcript_included = replayed.len();
        messages.extend(replayed);

        let user_message = input.user_message.and_then(non_blank);
        if let Some(text) = &user_message {
            messages.push(ChatMessage::user(text.clone()));
        }

        let (tools, tool_choice) = if input.tools.is_empty() {
            (None, None)
        } else {
            (Some(input.tools.to_vec()), Some(ToolChoice::Auto))
        };

        debug!(
            camp_id = %config.id,
            messages = messages.len(),
            artifacts = inclusions.len(),
            omitted = omitted.len(),
            transcript_included,
            tools = input.tools.len(),
            "Composed request"
        );

        Ok(Composition {
            request: ChatRequest {
                model: model.to_string(),
                messages,
                temperature: config.temperature,
                max_tokens: config.max_tokens,
                tools,
                tool_choice,
                stream: input.stream,
            },
            breakdown: ComposedBreakdown {
                system_prompt,
                memory,
                artifacts: inclusions,
                omitted_artifact_ids: omitted,
                transcript_total: transcript.len(),
                transcript_included,
                user_message,
            },
        })
    }

    fn artifact_messages(
        &self,
        artifacts: &[Artifact],
    ) -> (Vec<ChatMessage>, Vec<ArtifactInclusion>, Vec<String>) {
        let mut sorted: Vec<&Artifact> = artifacts.iter().collect();
        sorted.sort_by(|a, b| (&a.title, &a.id).cmp(&(&b.title, &b.id)));

        let mut remaining = self.budgets.global_chars;
        let mut messages = Vec::new();
        let mut inclusions = Vec::new();
        let mut omitted = Vec::new();

        for artifact in sorted {
            if remaining == 0 {
                omitted.push(artifact.id.clone());
                continue;
            }
            let limit = self.budgets.per_artifact_chars.min(remaining);
            let original_chars = artifact.body.chars().count();
            let (body, included_chars, truncated) = if original_chars > limit {
                let cut: String = artifact.body.chars().take(limit).collect();
                (format!("{cut}\n{TRUNCATION_MARKER}"), limit, true)
            } else {
                (artifact.body.clone(), original_chars, false)
            };
            remaining -= included_chars;

            messages.push(ChatMessage::system(format!(
                "Reference artifact: {} (id: {})\n\n{body}",
                artifact.title, artifact.id
            )));
            inclusions.push(ArtifactInclusion {
                id: artifact.id.clone(),
                title: artifact.title.clone(),
                original_chars,
                included_chars,
                truncated,
            });
        }

        (messages, inclusions, omitted)
    }
}

// ── Helpers ───────────────────────────────────────────────────────────────

fn non_blank(text: &str) -> Option<String> {
    let trimmed = text.trim();
    (!trimmed.is_empty()).then(|| trimmed.to_string())
}

fn memory_object(memory: &Value) -> Value {
    match memory {
        Value::Null => Value::Object(Default::default()),
        other => other.clone(),
    }
}

/// Replay one persisted message, or `None` when it is not valid to send.
pub fn replay_message(message: &CampMessage) -> Option<ChatMessage> {
    let content = message.content.trim();
    match message.role {
        Role::System => None,
        Role::Tool => {
            let call_id = message.tool_call_id.as_deref().map(str::trim).unwrap_or_default();
            let name = message.name.as_deref().map(str::trim).unwrap_or_default();
            if call_id.is_empty() || name.is_empty() || content.is_empty() {
                return None;
            }
            Some(ChatMessage::tool_result(call_id, name, content))
        }
        Role::Assistant if !message.tool_calls.is_empty() => {
            let calls = message
                .tool_calls
                .iter()
                .map(|call| ToolCall {
                    id: call.id.trim().to_string(),
                    ..call.clone()
                })
                .collect();
            Some(ChatMessage::assistant_tool_calls(content, calls))
        }
        Role::Assistant if !content.is_empty() => Some(ChatMessage::assistant(content)),
        Role::User if !content.is_empty() => Some(ChatMessage::user(content)),
        Role::User | Role::Assistant => None,
    }
}

/// Compact JSON with object keys sorted at every depth.
pub fn canonical_json(value: &Value) -> String {
    let mut out = String::new();
    write_canonical(value, &mut out);
    out
}

fn write_canonical(value: &Value, out: &mut String) {
    match value {
        Value::Object(map) => {
            let mut keys: Vec<&String> = map.keys().collect();
            keys.sort();
            out.push('{');
            for (i, key) in keys.into_iter().enumerate() {
                if i > 0 {
                    out.push(',');
                }
                out.push_str(&Value::String(key.clone()).to_string());
                out.push(':');
                write_canonical(&map[key], out);
            }
            out.push('}');
        }
        Value::Array(items) => {
            out.push('[');
            for (i, item) in items.iter().enumerate() {
                if i > 0 {
                    out.push(',');
                }
                write_canonical(item, out);
            }
            out.push(']');
        }
        other => out.push_str(&other.to_string()),
    }
}
