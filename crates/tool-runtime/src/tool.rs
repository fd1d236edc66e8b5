use async_trait::async_trait;
use serde::{Deserialize, Serialize};
use serde_json::Value;
use std::fmt;

/// Describes a tool's interface as published by a provider.
///
/// Immutable once discovered. The schema is kept verbatim so it can be
/// forwarded to a model runtime as documentation.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ToolDescriptor {
    /// Tool name, unique within a provider session (e.g., "reverse", "add")
    pub name: String,
    /// Human-readable description for the model
    #[serde(default)]
    pub description: String,
    /// JSON Schema describing the expected input
    #[serde(default)]
    pub input_schema: Value,
}

impl ToolDescriptor {
    pub fn new(
        name: impl Into<String>,
        description: impl Into<String>,
        input_schema: Value,
    ) -> Self {
        Self {
            name: name.into(),
            description: description.into(),
            input_schema,
        }
    }
}

impl fmt::Display for ToolDescriptor {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}({})", self.name, self.description)
    }
}

/// Arguments for one tool call, keyed by parameter name.
pub type ToolArguments = serde_json::Map<String, Value>;

/// A single request to run a remote tool. Built per call, never retained.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ToolInvocation {
    /// Tool name to execute
    pub tool_name: String,
    /// Arguments keyed by parameter name
    pub arguments: ToolArguments,
}

impl ToolInvocation {
    pub fn new(tool_name: impl Into<String>, arguments: ToolArguments) -> Self {
        Self {
            tool_name: tool_name.into(),
            arguments,
        }
    }
}

/// Value a provider returned for one invocation. Opaque to the bridge.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ToolResult {
    pub value: Value,
}

impl ToolResult {
    pub fn new(value: Value) -> Self {
        Self { value }
    }

    pub fn into_value(self) -> Value {
        self.value
    }
}

impl fmt::Display for ToolResult {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match &self.value {
            Value::String(s) => f.write_str(s),
            other => write!(f, "{}", other),
        }
    }
}

/// A locally implemented tool that a provider can serve.
///
/// Tools are object-safe, Send + Sync, and async.
#[async_trait]
pub trait Tool: Send + Sync {
    /// Returns the tool's descriptor (name, description, JSON Schema).
    fn definition(&self) -> ToolDescriptor;

    /// Execute the tool with the given JSON input.
    async fn execute(&self, input: Value) -> Result<Value, ToolError>;
}

#[derive(Debug, thiserror::Error)]
pub enum ToolError {
    #[error("Invalid input: {0}")]
    InvalidInput(String),
    #[error("Execution failed: {0}")]
    ExecutionFailed(String),
}
