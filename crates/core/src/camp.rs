//! Camp domain types and the persistence port.
//!
//! A camp is a persisted conversation workspace. The engine only reads and
//! appends through [`CampStore`]; the storage format belongs to the store.

use async_trait::async_trait;
use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use serde_json::Value;
use uuid::Uuid;

use crate::error::StoreError;
use crate::message::{ChatMessage, Role, ToolCall};

/// Per-camp model and tool settings.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct CampConfig {
    pub id: String,
    pub name: String,
    pub model: String,
    #[serde(default = "default_temperature")]
    pub temperature: f32,
    #[serde(default = "default_max_tokens")]
    pub max_tokens: u32,
    #[serde(default)]
    pub tools_enabled: bool,
    pub created_at: DateTime<Utc>,
    pub updated_at: DateTime<Utc>,
}

fn default_temperature() -> f32 {
    0.7
}

fn default_max_tokens() -> u32 {
    4096
}

impl CampConfig {
    pub fn new(name: impl Into<String>, model: impl Into<String>) -> Self {
        let now = Utc::now();
        Self {
            id: Uuid::new_v4().to_string(),
            name: name.into(),
            model: model.into(),
            temperature: default_temperature(),
            max_tokens: default_max_tokens(),
            tools_enabled: false,
            created_at: now,
            updated_at: now,
        }
    }

    pub fn with_tools(mut self, enabled: bool) -> Self {
        self.tools_enabled = enabled;
        self
    }
}

/// One persisted transcript entry.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct CampMessage {
    pub id: String,
    pub role: Role,
    #[serde(default)]
    pub content: String,
    pub created_at: DateTime<Utc>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub name: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub tool_call_id: Option<String>,
    #[serde(default, skip_serializing_if = "Vec::is_empty")]
    pub tool_calls: Vec<ToolCall>,
    /// Artifacts attached as reference context when this message was sent
    #[serde(default, skip_serializing_if = "Vec::is_empty")]
    pub included_artifact_ids: Vec<String>,
}

impl CampMessage {
    /// Wrap an outbound message for persistence with a fresh id and timestamp.
    pub fn from_chat(message: &ChatMessage) -> Self {
        Self {
            id: Uuid::new_v4().to_string(),
            role: message.role,
            content: message.text(),
            created_at: Utc::now(),
            name: message.name.clone(),
            tool_call_id: message.tool_call_id.clone(),
            tool_calls: message.tool_calls.clone(),
            included_artifact_ids: Vec::new(),
        }
    }

    pub fn with_artifacts(mut self, ids: Vec<String>) -> Self {
        self.included_artifact_ids = ids;
        self
    }
}

/// A titled, reusable content snippet.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Artifact {
    pub id: String,
    pub title: String,
    pub body: String,
    #[serde(default)]
    pub tags: Vec<String>,
    #[serde(default)]
    pub usage_count: u64,
    #[serde(default)]
    pub archived: bool,
}

impl Artifact {
    pub fn new(id: impl Into<String>, title: impl Into<String>, body: impl Into<String>) -> Self {
        Self {
            id: id.into(),
            title: title.into(),
            body: body.into(),
            tags: Vec::new(),
            usage_count: 0,
            archived: false,
        }
    }
}

/// Everything the composer needs from a camp.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Camp {
    pub config: CampConfig,
    #[serde(default)]
    pub system_prompt: String,
    /// Free-form structured memory
    #[serde(default)]
    pub memory: Value,
    #[serde(default)]
    pub transcript: Vec<CampMessage>,
}

impl Camp {
    pub fn new(config: CampConfig) -> Self {
        Self {
            config,
            system_prompt: String::new(),
            memory: Value::Object(Default::default()),
            transcript: Vec::new(),
        }
    }

    pub fn id(&self) -> &str {
        &self.config.id
    }
}

/// Persistence port.
#[async_trait]
pub trait CampStore: Send + Sync {
    async fn load_camp(&self, camp_id: &str) -> Result<Camp, StoreError>;

    /// Load the given artifacts. Unknown ids are skipped.
    async fn load_artifacts(&self, camp_id: &str, ids: &[String]) -> Result<Vec<Artifact>, StoreError>;

    async fn append_message(&self, camp_id: &str, message: CampMessage) -> Result<(), StoreError>;

    async fn update_config(&self, config: CampConfig) -> Result<(), StoreError>;

    async fn update_system_prompt(&self, camp_id: &str, prompt: &str) -> Result<(), StoreError>;

    async fn update_memory(&self, camp_id: &str, memory: Value) -> Result<(), StoreError>;

    async fn increment_artifact_usage(&self, camp_id: &str, artifact_id: &str) -> Result<(), StoreError>;
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn camp_message_keeps_tool_fields() {
        let chat = ChatMessage::tool_result("call_1", "read_file", "{\"ok\":true}");
        let stored = CampMessage::from_chat(&chat);
        assert_eq!(stored.role, Role::Tool);
        assert_eq!(stored.tool_call_id.as_deref(), Some("call_1"));
        assert_eq!(stored.name.as_deref(), Some("read_file"));
        assert_eq!(stored.content, "{\"ok\":true}");
    }

    #[test]
    fn new_camp_has_empty_object_memory() {
        let camp = Camp::new(CampConfig::new("notes", "openai/gpt-4o-mini"));
        assert!(camp.memory.as_object().is_some_and(|m| m.is_empty()));
        assert!(!camp.config.tools_enabled);
    }

    #[test]
    fn config_defaults_fill_missing_fields() {
        let json = serde_json::json!({
            "id": "c1",
            "name": "notes",
            "model": "m",
            "created_at": "2024-01-01T00:00:00Z",
            "updated_at": "2024-01-01T00:00:00Z"
        });
        let config: CampConfig = serde_json::from_value(json).unwrap();
        assert_eq!(config.max_tokens, 4096);
        assert!(!config.tools_enabled);
    }
}
