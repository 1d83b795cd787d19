//! Tool trait: the abstraction over camp capabilities.
//!
//! The engine never runs tools itself. It hands tool calls to a
//! [`ToolExecutor`]; [`ToolRegistry`] is the stock executor that dispatches
//! by name to registered [`Tool`] implementations.

use std::collections::BTreeMap;

use async_trait::async_trait;
use serde::{Deserialize, Serialize};
use serde_json::Value;
use tokio_util::sync::CancellationToken;

use crate::error::ToolError;
use crate::message::ToolCall;

/// Tool definition advertised to the model.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ToolSpec {
    pub name: String,
    pub description: String,
    /// JSON Schema for the tool's parameters
    pub parameters: Value,
}

impl ToolSpec {
    pub fn new(name: impl Into<String>, description: impl Into<String>, parameters: Value) -> Self {
        Self {
            name: name.into(),
            description: description.into(),
            parameters,
        }
    }
}

/// Whether a tool changes anything outside the conversation.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum ToolEffect {
    ReadOnly,
    Mutating,
}

impl ToolEffect {
    pub fn is_mutating(&self) -> bool {
        matches!(self, Self::Mutating)
    }
}

/// Port to whatever actually runs tool calls.
///
/// Implementations should observe `cancel` and stop work promptly once it
/// fires; the caller stops waiting either way.
#[async_trait]
pub trait ToolExecutor: Send + Sync {
    /// The tools to advertise, in a stable order.
    fn specs(&self) -> Vec<ToolSpec>;

    /// Classification used by the approval policy. Unknown tools are
    /// treated as mutating.
    fn effect(&self, _name: &str) -> ToolEffect {
        ToolEffect::Mutating
    }

    /// Run one call within `scope_id` (the camp the call belongs to).
    async fn execute(
        &self,
        scope_id: &str,
        call: &ToolCall,
        cancel: CancellationToken,
    ) -> Result<Value, ToolError>;
}

/// A single named tool.
#[async_trait]
pub trait Tool: Send + Sync {
    /// The unique name of this tool (e.g., "read_file").
    fn name(&self) -> &str;

    /// A description of what this tool does (sent to the model).
    fn description(&self) -> &str;

    /// JSON Schema describing this tool's parameters.
    fn parameters_schema(&self) -> Value;

    fn effect(&self) -> ToolEffect {
        ToolEffect::Mutating
    }

    /// Execute the tool with already-parsed arguments.
    async fn execute(
        &self,
        scope_id: &str,
        arguments: Value,
        cancel: CancellationToken,
    ) -> Result<Value, ToolError>;

    fn to_spec(&self) -> ToolSpec {
        ToolSpec::new(self.name(), self.description(), self.parameters_schema())
    }
}

/// A registry of available tools, ordered by name.
pub struct ToolRegistry {
    tools: BTreeMap<String, Box<dyn Tool>>,
}

impl ToolRegistry {
    pub fn new() -> Self {
        Self {
            tools: BTreeMap::new(),
        }
    }

    /// Register a tool. Replaces any existing tool with the same name.
    pub fn register(&mut self, tool: Box<dyn Tool>) {
        let name = tool.name().to_string();
        self.tools.insert(name, tool);
    }

    /// Builder-style registration.
    pub fn with_tool(mut self, tool: impl Tool + 'static) -> Self {
        self.register(Box::new(tool));
        self
    }

    pub fn get(&self, name: &str) -> Option<&dyn Tool> {
        self.tools.get(name).map(|t| t.as_ref())
    }

    pub fn names(&self) -> Vec<&str> {
        self.tools.keys().map(String::as_str).collect()
    }

    pub fn len(&self) -> usize {
        self.tools.len()
    }

    pub fn is_empty(&self) -> bool {
        self.tools.is_empty()
    }
}

impl Default for ToolRegistry {
    fn default() -> Self {
        Self::new()
    }
}

/// Parse raw model-produced arguments. Blank input means "no arguments".
fn parse_arguments(call: &ToolCall) -> Result<Value, ToolError> {
    if call.arguments.trim().is_empty() {
        return Ok(Value::Object(Default::default()));
    }
    serde_json::from_str(&call.arguments).map_err(|e| ToolError::InvalidArguments {
        tool_name: call.name.clone(),
        reason: e.to_string(),
    })
}

#[async_trait]
impl ToolExecutor for ToolRegistry {
    fn specs(&self) -> Vec<ToolSpec> {
        self.tools.values().map(|t| t.to_spec()).collect()
    }

    fn effect(&self, name: &str) -> ToolEffect {
        self.tools
            .get(name)
            .map(|t| t.effect())
            .unwrap_or(ToolEffect::Mutating)
    }

    async fn execute(
        &self,
        scope_id: &str,
        call: &ToolCall,
        cancel: CancellationToken,
    ) -> Result<Value, ToolError> {
        let tool = self
            .tools
            .get(&call.name)
            .ok_or_else(|| ToolError::NotFound(call.name.clone()))?;
        let arguments = parse_arguments(call)?;
        tool.execute(scope_id, arguments, cancel).await
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    /// A simple test tool for unit tests.
    struct EchoTool;

    #[async_trait]
    impl Tool for EchoTool {
        fn name(&self) -> &str {
            "echo"
        }
        fn description(&self) -> &str {
            "Echoes back the input"
        }
        fn parameters_schema(&self) -> Value {
            serde_json::json!({
                "type": "object",
                "properties": { "text": { "type": "string" } },
                "required": ["text"]
            })
        }
        fn effect(&self) -> ToolEffect {
            ToolEffect::ReadOnly
        }
        async fn execute(
            &self,
            scope_id: &str,
            arguments: Value,
            _cancel: CancellationToken,
        ) -> Result<Value, ToolError> {
            Ok(serde_json::json!({ "scope": scope_id, "text": arguments["text"] }))
        }
    }

    struct WriteTool;

    #[async_trait]
    impl Tool for WriteTool {
        fn name(&self) -> &str {
            "write_file"
        }
        fn description(&self) -> &str {
            "Writes a file"
        }
        fn parameters_schema(&self) -> Value {
            serde_json::json!({ "type": "object" })
        }
        async fn execute(&self, _: &str, _: Value, _: CancellationToken) -> Result<Value, ToolError> {
            Ok(Value::Null)
        }
    }

    #[test]
    fn specs_are_sorted_by_name() {
        let registry = ToolRegistry::new().with_tool(WriteTool).with_tool(EchoTool);
        let names: Vec<_> = registry.specs().into_iter().map(|s| s.name).collect();
        assert_eq!(names, vec!["echo", "write_file"]);
    }

    #[test]
    fn effect_lookup_defaults_to_mutating() {
        let registry = ToolRegistry::new().with_tool(EchoTool).with_tool(WriteTool);
        assert_eq!(ToolExecutor::effect(&registry, "echo"), ToolEffect::ReadOnly);
        assert_eq!(ToolExecutor::effect(&registry, "write_file"), ToolEffect::Mutating);
        assert_eq!(ToolExecutor::effect(&registry, "unknown"), ToolEffect::Mutating);
    }

    #[tokio::test]
    async fn execute_parses_arguments_and_dispatches() {
        let registry = ToolRegistry::new().with_tool(EchoTool);
        let call = ToolCall::new("call_1", "echo", r#"{"text":"hello"}"#);
        let value = ToolExecutor::execute(&registry, "camp-1", &call, CancellationToken::new())
            .await
            .unwrap();
        assert_eq!(value["text"], "hello");
        assert_eq!(value["scope"], "camp-1");
    }

    #[tokio::test]
    async fn blank_arguments_mean_empty_object() {
        let registry = ToolRegistry::new().with_tool(EchoTool);
        let call = ToolCall::new("call_1", "echo", "  ");
        let value = ToolExecutor::execute(&registry, "camp-1", &call, CancellationToken::new())
            .await
            .unwrap();
        assert!(value["text"].is_null());
    }

    #[tokio::test]
    async fn malformed_arguments_are_reported() {
        let registry = ToolRegistry::new().with_tool(EchoTool);
        let call = ToolCall::new("call_1", "echo", "{not json");
        let err = ToolExecutor::execute(&registry, "camp-1", &call, CancellationToken::new())
            .await
            .unwrap_err();
        assert!(matches!(err, ToolError::InvalidArguments { .. }));
    }

    #[tokio::test]
    async fn unknown_tool_is_not_found() {
        let registry = ToolRegistry::new();
        let call = ToolCall::new("call_1", "missing", "{}");
        let err = ToolExecutor::execute(&registry, "camp-1", &call, CancellationToken::new())
            .await
            .unwrap_err();
        assert!(matches!(err, ToolError::NotFound(name) if name == "missing"));
    }
}
