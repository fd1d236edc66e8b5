//! Single-string text tools.

use async_trait::async_trait;
use serde_json::Value;
use tracing::debug;

use crate::tool::{Tool, ToolDescriptor, ToolError};

fn input_schema() -> Value {
    serde_json::json!({
        "type": "object",
        "properties": {
            "input": {
                "type": "string",
                "description": "The text to operate on"
            }
        },
        "required": ["input"]
    })
}

fn input_text(input: &Value) -> Result<&str, ToolError> {
    input
        .get("input")
        .and_then(|v| v.as_str())
        .ok_or_else(|| ToolError::InvalidInput("missing 'input' field".to_string()))
}

/// Echoes the input text.
pub struct EchoTool;

#[async_trait]
impl Tool for EchoTool {
    fn definition(&self) -> ToolDescriptor {
        ToolDescriptor::new("echo", "Echoes the input text.", input_schema())
    }

    async fn execute(&self, input: Value) -> Result<Value, ToolError> {
        Ok(Value::String(input_text(&input)?.to_string()))
    }
}

/// Reverses the input text by Unicode scalar value.
pub struct ReverseTool;

#[async_trait]
impl Tool for ReverseTool {
    fn definition(&self) -> ToolDescriptor {
        ToolDescriptor::new("reverse", "Reverses the input text.", input_schema())
    }

    async fn execute(&self, input: Value) -> Result<Value, ToolError> {
        let text = input_text(&input)?;
        debug!(len = text.len(), "reversing text");
        Ok(Value::String(text.chars().rev().collect()))
    }
}
