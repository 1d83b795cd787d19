//! In-memory camp store for tests and ephemeral sessions.

use std::collections::HashMap;
use std::sync::Arc;

use async_trait::async_trait;
use basecamp_core::camp::{Artifact, Camp, CampConfig, CampMessage, CampStore};
use basecamp_core::error::StoreError;
use chrono::Utc;
use serde_json::Value;
use tokio::sync::RwLock;
use tracing::debug;

#[derive(Default)]
struct Inner {
    camps: HashMap<String, Camp>,
    /// Artifacts per camp, keyed by artifact id
    artifacts: HashMap<String, HashMap<String, Artifact>>,
}

/// A camp store that keeps everything in process memory.
#[derive(Clone, Default)]
pub struct InMemoryCampStore {
    inner: Arc<RwLock<Inner>>,
}

impl InMemoryCampStore {
    pub fn new() -> Self {
        Self::default()
    }

    /// Insert or replace a camp.
    pub async fn insert_camp(&self, camp: Camp) {
        let id = camp.config.id.clone();
        self.inner.write().await.camps.insert(id, camp);
    }

    /// Insert or replace an artifact in `camp_id`.
    pub async fn insert_artifact(&self, camp_id: &str, artifact: Artifact) {
        self.inner
            .write()
            .await
            .artifacts
            .entry(camp_id.to_string())
            .or_default()
            .insert(artifact.id.clone(), artifact);
    }

    pub async fn artifact(&self, camp_id: &str, artifact_id: &str) -> Option<Artifact> {
        self.inner
            .read()
            .await
            .artifacts
            .get(camp_id)
            .and_then(|artifacts| artifacts.get(artifact_id))
            .cloned()
    }

    pub async fn transcript(&self, camp_id: &str) -> Vec<CampMessage> {
        self.inner
            .read()
            .await
            .camps
            .get(camp_id)
            .map(|camp| camp.transcript.clone())
            .unwrap_or_default()
    }
}

fn camp_not_found(camp_id: &str) -> StoreError {
    StoreError::NotFound {
        kind: "camp",
        id: camp_id.to_string(),
    }
}

fn camp_mut<'a>(inner: &'a mut Inner, camp_id: &str) -> Result<&'a mut Camp, StoreError> {
    inner.camps.get_mut(camp_id).ok_or_else(|| camp_not_found(camp_id))
}

#[async_trait]
impl CampStore for InMemoryCampStore {
    async fn load_camp(&self, camp_id: &str) -> Result<Camp, StoreError> {
        self.inner
            .read()
            .await
            .camps
            .get(camp_id)
            .cloned()
            .ok_or_else(|| camp_not_found(camp_id))
    }

    /// Artifacts come back in the requested order; unknown and archived ids
    /// are skipped.
    async fn load_artifacts(&self, camp_id: &str, ids: &[String]) -> Result<Vec<Artifact>, StoreError> {
        let inner = self.inner.read().await;
        let Some(artifacts) = inner.artifacts.get(camp_id) else {
            return Ok(Vec::new());
        };
        Ok(ids
            .iter()
            .filter_map(|id| artifacts.get(id))
            .filter(|artifact| !artifact.archived)
            .cloned()
            .collect())
    }

    async fn append_message(&self, camp_id: &str, message: CampMessage) -> Result<(), StoreError> {
        let mut inner = self.inner.write().await;
        let camp = camp_mut(&mut inner, camp_id)?;
        debug!(camp_id, role = %message.role, "Appending message");
        camp.transcript.push(message);
        camp.config.updated_at = Utc::now();
        Ok(())
    }

    async fn update_config(&self, config: CampConfig) -> Result<(), StoreError> {
        let mut inner = self.inner.write().await;
        let camp = camp_mut(&mut inner, &config.id)?;
        camp.config = CampConfig {
            updated_at: Utc::now(),
            ..config
        };
        Ok(())
    }

    async fn update_system_prompt(&self, camp_id: &str, prompt: &str) -> Result<(), StoreError> {
        let mut inner = self.inner.write().await;
        let camp = camp_mut(&mut inner, camp_id)?;
        camp.system_prompt = prompt.to_string();
        camp.config.updated_at = Utc::now();
        Ok(())
    }

    async fn update_memory(&self, camp_id: &str, memory: Value) -> Result<(), StoreError> {
        if !(memory.is_object() || memory.is_null()) {
            return Err(StoreError::Invalid("camp memory must be a JSON object".into()));
        }
        let mut inner = self.inner.write().await;
        let camp = camp_mut(&mut inner, camp_id)?;
        camp.memory = memory;
        camp.config.updated_at = Utc::now();
        Ok(())
    }

    async fn increment_artifact_usage(&self, camp_id: &str, artifact_id: &str) -> Result<(), StoreError> {
        let mut inner = self.inner.write().await;
        let artifact = inner
            .artifacts
            .get_mut(camp_id)
            .and_then(|artifacts| artifacts.get_mut(artifact_id))
            .ok_or_else(|| StoreError::NotFound {
                kind: "artifact",
                id: artifact_id.to_string(),
            })?;
        artifact.usage_count += 1;
        Ok(())
    }
}
