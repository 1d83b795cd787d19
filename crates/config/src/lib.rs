//! Configuration loading, validation, and management for Basecamp.
//!
//! Loads configuration from `~/.basecamp/config.toml` with environment
//! variable overrides. Validates all settings before the engine starts.

use basecamp_core::run::{
    ApprovalPolicy, DEFAULT_MAX_ITERATIONS, MAX_ITERATIONS_CEILING, RunState,
};
use serde::{Deserialize, Serialize};
use std::path::{Path, PathBuf};
use std::time::Duration;

/// The root configuration structure.
///
/// Maps directly to `~/.basecamp/config.toml`.
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct EngineConfig {
    /// Remote chat-completion endpoint
    #[serde(default)]
    pub provider: ProviderSettings,

    /// Request defaults for new camps
    #[serde(default)]
    pub model: ModelDefaults,

    /// Tool-use loop limits and approval policy
    #[serde(default)]
    pub tool_loop: ToolLoopConfig,

    /// Reference artifact budgets
    #[serde(default)]
    pub composer: ComposerBudgets,

    #[serde(default)]
    pub run_log: RunLogConfig,
}

#[derive(Clone, Serialize, Deserialize)]
pub struct ProviderSettings {
    #[serde(default = "default_base_url")]
    pub base_url: String,

    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub api_key: Option<String>,

    /// Sent as `HTTP-Referer` for OpenRouter attribution
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub referer: Option<String>,

    /// Sent as `X-Title`
    #[serde(default = "default_title")]
    pub title: String,

    #[serde(default = "default_request_timeout")]
    pub request_timeout_secs: u64,
}

fn default_base_url() -> String {
    "https://openrouter.ai/api/v1".into()
}
fn default_title() -> String {
    "Basecamp".into()
}
fn default_request_timeout() -> u64 {
    120
}

/// Redact a secret string for Debug output.
fn redact(s: &Option<String>) -> &'static str {
    match s {
        Some(_) => "[REDACTED]",
        None => "None",
    }
}

impl std::fmt::Debug for ProviderSettings {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("ProviderSettings")
            .field("base_url", &self.base_url)
            .field("api_key", &redact(&self.api_key))
            .field("referer", &self.referer)
            .field("title", &self.title)
            .field("request_timeout_secs", &self.request_timeout_secs)
            .finish()
    }
}

impl Default for ProviderSettings {
    fn default() -> Self {
        Self {
            base_url: default_base_url(),
            api_key: None,
            referer: None,
            title: default_title(),
            request_timeout_secs: default_request_timeout(),
        }
    }
}

impl ProviderSettings {
    pub fn request_timeout(&self) -> Duration {
        Duration::from_secs(self.request_timeout_secs)
    }
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ModelDefaults {
    #[serde(default = "default_model")]
    pub model: String,

    #[serde(default = "default_temperature")]
    pub temperature: f32,

    #[serde(default = "default_max_tokens")]
    pub max_tokens: u32,
}

fn default_model() -> String {
    "openai/gpt-4o-mini".into()
}
fn default_temperature() -> f32 {
    0.7
}
fn default_max_tokens() -> u32 {
    4096
}

impl Default for ModelDefaults {
    fn default() -> Self {
        Self {
            model: default_model(),
            temperature: default_temperature(),
            max_tokens: default_max_tokens(),
        }
    }
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ToolLoopConfig {
    #[serde(default = "default_max_iterations")]
    pub max_iterations: u32,

    #[serde(default = "default_tool_timeout")]
    pub tool_timeout_secs: u64,

    #[serde(default)]
    pub approval_policy: ApprovalPolicy,
}

fn default_max_iterations() -> u32 {
    DEFAULT_MAX_ITERATIONS
}
fn default_tool_timeout() -> u64 {
    30
}

impl Default for ToolLoopConfig {
    fn default() -> Self {
        Self {
            max_iterations: default_max_iterations(),
            tool_timeout_secs: default_tool_timeout(),
            approval_policy: ApprovalPolicy::default(),
        }
    }
}

impl ToolLoopConfig {
    pub fn tool_timeout(&self) -> Duration {
        Duration::from_secs(self.tool_timeout_secs)
    }

    /// Fresh run settings for one tool-enabled turn in `camp_id`.
    pub fn run_state(&self, camp_id: &str) -> RunState {
        RunState::new(camp_id)
            .with_max_iterations(self.max_iterations)
            .with_approval_policy(self.approval_policy)
            .with_tool_timeout(self.tool_timeout())
    }
}

/// Character budgets for reference artifacts (Unicode scalar values).
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub struct ComposerBudgets {
    #[serde(default = "default_global_budget")]
    pub global_chars: usize,

    #[serde(default = "default_artifact_cap")]
    pub per_artifact_chars: usize,
}

fn default_global_budget() -> usize {
    40_000
}
fn default_artifact_cap() -> usize {
    8_000
}

impl Default for ComposerBudgets {
    fn default() -> Self {
        Self {
            global_chars: default_global_budget(),
            per_artifact_chars: default_artifact_cap(),
        }
    }
}

#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct RunLogConfig {
    /// JSON-lines file for run events; in-memory when unset
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub path: Option<PathBuf>,
}

impl EngineConfig {
    /// Load configuration from the default path (~/.basecamp/config.toml).
    ///
    /// Environment variables take precedence over the file:
    /// - `BASECAMP_API_KEY`, then `OPENROUTER_API_KEY`
    /// - `BASECAMP_MODEL`
    /// - `BASECAMP_BASE_URL`
    pub fn load() -> Result<Self, ConfigError> {
        let config_path = Self::config_dir().join("config.toml");
        let mut config = Self::load_from(&config_path)?;
        config.apply_env_overrides(|key| std::env::var(key).ok());
        config.validate()?;
        Ok(config)
    }

    /// Load configuration from a specific file path.
    pub fn load_from(path: &Path) -> Result<Self, ConfigError> {
        if !path.exists() {
            tracing::info!("No config file found at {}, using defaults", path.display());
            return Ok(Self::default());
        }

        let content = std::fs::read_to_string(path).map_err(|e| ConfigError::ReadError {
            path: path.to_path_buf(),
            reason: e.to_string(),
        })?;

        let config: Self = toml::from_str(&content).map_err(|e| ConfigError::ParseError {
            path: path.to_path_buf(),
            reason: e.to_string(),
        })?;

        config.validate()?;
        Ok(config)
    }

    /// Apply overrides from an environment lookup.
    pub fn apply_env_overrides(&mut self, lookup: impl Fn(&str) -> Option<String>) {
        if let Some(key) = lookup("BASECAMP_API_KEY").or_else(|| lookup("OPENROUTER_API_KEY")) {
            self.provider.api_key = Some(key);
        }

        if let Some(model) = lookup("BASECAMP_MODEL") {
            self.model.model = model;
        }

        if let Some(url) = lookup("BASECAMP_BASE_URL") {
            self.provider.base_url = url;
        }
    }

    /// Get the configuration directory path.
    pub fn config_dir() -> PathBuf {
        dirs_home().join(".basecamp")
    }

    /// Validate the configuration.
    pub fn validate(&self) -> Result<(), ConfigError> {
        if self.provider.base_url.trim().is_empty() {
            return Err(ConfigError::ValidationError("provider.base_url must not be empty".into()));
        }

        if !(0.0..=2.0).contains(&self.model.temperature) {
            return Err(ConfigError::ValidationError(
                "model.temperature must be between 0.0 and 2.0".into(),
            ));
        }

        if self.model.max_tokens == 0 {
            return Err(ConfigError::ValidationError("model.max_tokens must be > 0".into()));
        }

        if !(1..=MAX_ITERATIONS_CEILING).contains(&self.tool_loop.max_iterations) {
            return Err(ConfigError::ValidationError(format!(
                "tool_loop.max_iterations must be between 1 and {MAX_ITERATIONS_CEILING}"
            )));
        }

        if self.tool_loop.tool_timeout_secs == 0 {
            return Err(ConfigError::ValidationError(
                "tool_loop.tool_timeout_secs must be > 0".into(),
            ));
        }

        if self.composer.global_chars == 0 || self.composer.per_artifact_chars == 0 {
            return Err(ConfigError::ValidationError("composer budgets must be > 0".into()));
        }

        Ok(())
    }

    /// Check if an API key is available (from config or environment).
    pub fn has_api_key(&self) -> bool {
        self.provider.api_key.as_deref().is_some_and(|k| !k.trim().is_empty())
    }

    /// Generate a default config TOML string.
    pub fn default_toml() -> String {
        let config = Self::default();
        toml::to_string_pretty(&config).unwrap_or_default()
    }
}

/// Get the user's home directory.
fn dirs_home() -> PathBuf {
    #[cfg(target_os = "windows")]
    {
        std::env::var("USERPROFILE")
            .map(PathBuf::from)
            .unwrap_or_else(|_| PathBuf::from("C:\\Users\\Default"))
    }
    #[cfg(not(target_os = "windows"))]
    {
        std::env::var("HOME")
            .map(PathBuf::from)
            .unwrap_or_else(|_| PathBuf::from("/tmp"))
    }
}

/// Configuration errors.
#[derive(Debug, thiserror::Error)]
pub enum ConfigError {
    #[error("Failed to read config file at {path}: {reason}")]
    ReadError { path: PathBuf, reason: String },

    #[error("Failed to parse config file at {path}: {reason}")]
    ParseError { path: PathBuf, reason: String },

    #[error("Configuration validation failed: {0}")]
    ValidationError(String),
}
