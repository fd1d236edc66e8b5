//! Parameter lists derived from a tool's JSON input schema.
//!
//! A stub does not get a synthesized signature. It accepts a name → value
//! mapping and checks it against the `ParameterSchema` at call time.

use std::collections::{BTreeMap, BTreeSet};

use serde_json::Value;

use crate::error::BridgeError;
use crate::tool::ToolArguments;

/// Declared type hint for one parameter.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ParameterSpec {
    /// Accepted JSON types. Empty means any value is accepted.
    pub types: Vec<String>,
}

impl ParameterSpec {
    fn accepts(&self, value: &Value) -> bool {
        self.types.is_empty() || self.types.iter().any(|t| value_matches_type(value, t))
    }

    fn describe(&self) -> String {
        self.types.join(" | ")
    }
}

/// The named parameters a stub accepts, parsed once at registry build time.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct ParameterSchema {
    parameters: BTreeMap<String, ParameterSpec>,
    required: BTreeSet<String>,
}

impl ParameterSchema {
    /// Parse an MCP-style input schema.
    ///
    /// `null` means the tool declares no parameters. Anything else must be an
    /// object schema whose `properties` map names to type-hint objects.
    pub fn parse(tool: &str, schema: &Value) -> Result<Self, BridgeError> {
        let obj = match schema {
            Value::Null => return Ok(Self::default()),
            Value::Object(obj) => obj,
            other => {
                return Err(BridgeError::schema(
                    tool,
                    format!("input schema must be an object, got {}", json_type_name(other)),
                ))
            }
        };

        if let Some(schema_type) = obj.get("type") {
            if schema_type.as_str() != Some("object") {
                return Err(BridgeError::schema(
                    tool,
                    format!("input schema type must be \"object\", got {}", schema_type),
                ));
            }
        }

        let mut parameters = BTreeMap::new();
        match obj.get("properties") {
            None | Some(Value::Null) => {}
            Some(Value::Object(props)) => {
                for (name, hint) in props {
                    parameters.insert(name.clone(), parse_type_hint(tool, name, hint)?);
                }
            }
            Some(other) => {
                return Err(BridgeError::schema(
                    tool,
                    format!("'properties' must be an object, got {}", json_type_name(other)),
                ))
            }
        }

        let mut required = BTreeSet::new();
        match obj.get("required") {
            None | Some(Value::Null) => {}
            Some(Value::Array(names)) => {
                for name in names {
                    let name = name.as_str().ok_or_else(|| {
                        BridgeError::schema(tool, "'required' entries must be strings")
                    })?;
                    if !parameters.contains_key(name) {
                        return Err(BridgeError::schema(
                            tool,
                            format!("required parameter '{}' is not declared in 'properties'", name),
                        ));
                    }
                    required.insert(name.to_string());
                }
            }
            Some(other) => {
                return Err(BridgeError::schema(
                    tool,
                    format!("'required' must be an array, got {}", json_type_name(other)),
                ))
            }
        }

        Ok(Self {
            parameters,
            required,
        })
    }

    /// Declared parameter names, sorted.
    pub fn names(&self) -> impl Iterator<Item = &str> {
        self.parameters.keys().map(String::as_str)
    }

    pub fn is_empty(&self) -> bool {
        self.parameters.is_empty()
    }

    pub fn is_required(&self, name: &str) -> bool {
        self.required.contains(name)
    }

    pub fn get(&self, name: &str) -> Option<&ParameterSpec> {
        self.parameters.get(name)
    }

    /// Check supplied arguments and return them as a mapping.
    ///
    /// `null` is treated as an empty mapping. Undeclared names, missing
    /// required names and values contradicting a type hint are rejected.
    pub fn bind(&self, tool: &str, arguments: Value) -> Result<ToolArguments, BridgeError> {
        let args = match arguments {
            Value::Null => ToolArguments::new(),
            Value::Object(map) => map,
            other => {
                return Err(BridgeError::argument_mismatch(
                    tool,
                    format!("expected an argument mapping, got {}", json_type_name(&other)),
                ))
            }
        };

        for (name, value) in &args {
            let spec = self.parameters.get(name).ok_or_else(|| {
                BridgeError::argument_mismatch(tool, format!("unexpected argument '{}'", name))
            })?;
            if !spec.accepts(value) {
                return Err(BridgeError::argument_mismatch(
                    tool,
                    format!(
                        "argument '{}' expected type '{}', got {}",
                        name,
                        spec.describe(),
                        json_type_name(value)
                    ),
                ));
            }
        }

        if let Some(missing) = self.required.iter().find(|name| !args.contains_key(*name)) {
            return Err(BridgeError::argument_mismatch(
                tool,
                format!("missing required argument '{}'", missing),
            ));
        }

        Ok(args)
    }
}

fn parse_type_hint(tool: &str, name: &str, hint: &Value) -> Result<ParameterSpec, BridgeError> {
    let hint = hint.as_object().ok_or_else(|| {
        BridgeError::schema(
            tool,
            format!("type hint for '{}' must be an object, got {}", name, json_type_name(hint)),
        )
    })?;

    let types = match hint.get("type") {
        None | Some(Value::Null) => Vec::new(),
        Some(Value::String(t)) => vec![t.clone()],
        Some(Value::Array(ts)) => ts
            .iter()
            .map(|t| {
                t.as_str().map(str::to_string).ok_or_else(|| {
                    BridgeError::schema(tool, format!("type list for '{}' must hold strings", name))
                })
            })
            .collect::<Result<_, _>>()?,
        Some(other) => {
            return Err(BridgeError::schema(
                tool,
                format!("'type' for '{}' must be a string or array, got {}", name, json_type_name(other)),
            ))
        }
    };

    Ok(ParameterSpec { types })
}

fn value_matches_type(value: &Value, expected: &str) -> bool {
    match expected {
        "string" => value.is_string(),
        "number" => value.is_number(),
        "integer" => value.is_i64() || value.is_u64(),
        "boolean" => value.is_boolean(),
        "object" => value.is_object(),
        "array" => value.is_array(),
        "null" => value.is_null(),
        _ => true,
    }
}

fn json_type_name(value: &Value) -> &'static str {
    match value {
        Value::Null => "null",
        Value::Bool(_) => "boolean",
        Value::Number(_) => "number",
        Value::String(_) => "string",
        Value::Array(_) => "array",
        Value::Object(_) => "object",
    }
}
