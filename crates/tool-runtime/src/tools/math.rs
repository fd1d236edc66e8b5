use async_trait::async_trait;
use serde_json::{Number, Value};

use crate::tool::{Tool, ToolDescriptor, ToolError};

/// Adds two numbers. Integer operands give an integer sum.
pub struct AddTool;

impl AddTool {
    fn operand<'a>(input: &'a Value, name: &str) -> Result<&'a Number, ToolError> {
        match input.get(name) {
            Some(Value::Number(n)) => Ok(n),
            Some(other) => Err(ToolError::InvalidInput(format!(
                "'{}' must be a number, got {}",
                name, other
            ))),
            None => Err(ToolError::InvalidInput(format!("missing '{}' field", name))),
        }
    }
}

#[async_trait]
impl Tool for AddTool {
    fn definition(&self) -> ToolDescriptor {
        ToolDescriptor::new(
            "add",
            "Adds two numbers.",
            serde_json::json!({
                "type": "object",
                "properties": {
                    "a": { "type": "number", "description": "First operand" },
                    "b": { "type": "number", "description": "Second operand" }
                },
                "required": ["a", "b"]
            }),
        )
    }

    async fn execute(&self, input: Value) -> Result<Value, ToolError> {
        let a = Self::operand(&input, "a")?;
        let b = Self::operand(&input, "b")?;

        if let (Some(x), Some(y)) = (a.as_i64(), b.as_i64()) {
            if let Some(sum) = x.checked_add(y) {
                return Ok(Value::from(sum));
            }
        }

        let (x, y) = match (a.as_f64(), b.as_f64()) {
            (Some(x), Some(y)) => (x, y),
            _ => return Err(ToolError::InvalidInput("operands are not finite numbers".to_string())),
        };
        Number::from_f64(x + y)
            .map(Value::Number)
            .ok_or_else(|| ToolError::ExecutionFailed("sum is not a finite number".to_string()))
    }
}
