//! Base tool contract

use async_trait::async_trait;
use orchat_common::ChatError;
use serde::{Deserialize, Serialize};
use serde_json::Value;
use std::fmt;

/// Failure of a single tool call
#[derive(Debug, Clone, PartialEq)]
pub enum ToolError {
    /// Arguments are not valid for the tool's input schema
    InvalidArguments(String),
    /// The tool ran and failed
    Execution(String),
}

impl fmt::Display for ToolError {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            ToolError::InvalidArguments(msg) => write!(f, "Invalid tool arguments: {}", msg),
            ToolError::Execution(msg) => write!(f, "Tool execution failed: {}", msg),
        }
    }
}

impl std::error::Error for ToolError {}

impl From<ToolError> for ChatError {
    fn from(err: ToolError) -> Self {
        ChatError::Tool(err.to_string())
    }
}

/// Provider-facing description of a tool
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ToolDefinition {
    pub name: String,
    pub description: String,
    /// JSON schema of the tool input
    pub parameters: Value,
}

/// A tool that can be used by the assistant
#[async_trait]
pub trait AiTool: Send + Sync {
    /// The name of the tool
    fn name(&self) -> &str;

    /// A description of what the tool does
    fn description(&self) -> &str;

    /// The JSON schema for the tool's parameters
    fn schema(&self) -> Value;

    /// Execute the tool with already-parsed parameters, returning raw text
    async fn execute(&self, params: Value) -> Result<String, ToolError>;

    /// Validate the parameters against the schema
    fn validate_params(&self, params: &Value) -> Result<(), ToolError> {
        validate_against_schema(&self.schema(), params)
    }

    fn to_definition(&self) -> ToolDefinition {
        ToolDefinition {
            name: self.name().to_string(),
            description: self.description().to_string(),
            parameters: self.schema(),
        }
    }
}

/// Shallow JSON-schema check: object shape, required keys and the primitive
/// type of each declared property. Unknown keywords are ignored.
pub fn validate_against_schema(schema: &Value, params: &Value) -> Result<(), ToolError> {
    if let Some(expected) = schema.get("type").and_then(Value::as_str) {
        if !matches_type(expected, params) {
            return Err(ToolError::InvalidArguments(format!(
                "expected {}, got {}",
                expected,
                type_name(params)
            )));
        }
    }

    let Some(object) = params.as_object() else {
        return Ok(());
    };

    if let Some(required) = schema.get("required").and_then(Value::as_array) {
        for key in required.iter().filter_map(Value::as_str) {
            if !object.contains_key(key) {
                return Err(ToolError::InvalidArguments(format!(
                    "missing required field '{}'",
                    key
                )));
            }
        }
    }

    if let Some(properties) = schema.get("properties").and_then(Value::as_object) {
        for (key, value) in object {
            let expected = properties
                .get(key)
                .and_then(|p| p.get("type"))
                .and_then(Value::as_str);
            if let Some(expected) = expected {
                if !matches_type(expected, value) {
                    return Err(ToolError::InvalidArguments(format!(
                        "field '{}' should be {}, got {}",
                        key,
                        expected,
                        type_name(value)
                    )));
                }
            }
        }
    }

    Ok(())
}

fn matches_type(expected: &str, value: &Value) -> bool {
    match expected {
        "object" => value.is_object(),
        "array" => value.is_array(),
        "string" => value.is_string(),
        "integer" => value.is_i64() || value.is_u64(),
        "number" => value.is_number(),
        "boolean" => value.is_boolean(),
        "null" => value.is_null(),
        _ => true,
    }
}

fn type_name(value: &Value) -> &'static str {
    match value {
        Value::Null => "null",
        Value::Bool(_) => "boolean",
        Value::Number(_) => "number",
        Value::String(_) => "string",
        Value::Array(_) => "array",
        Value::Object(_) => "object",
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;

    struct EchoTool;

    #[async_trait]
    impl AiTool for EchoTool {
        fn name(&self) -> &str {
            "echo"
        }

        fn description(&self) -> &str {
            "Echoes back the input text"
        }

        fn schema(&self) -> Value {
            json!({
                "type": "object",
                "properties": {
                    "text": { "type": "string", "description": "Text to echo back" },
                    "times": { "type": "integer" }
                },
                "required": ["text"]
            })
        }

        async fn execute(&self, params: Value) -> Result<String, ToolError> {
            params
                .get("text")
                .and_then(|t| t.as_str())
                .map(str::to_string)
                .ok_or_else(|| ToolError::InvalidArguments("Missing 'text' parameter".into()))
        }
    }

    #[tokio::test]
    async fn test_echo_tool() {
        let tool = EchoTool;
        let result = tool.execute(json!({"text": "Hello, world!"})).await.unwrap();
        assert_eq!(result, "Hello, world!");
    }

    #[test]
    fn test_validate_params() {
        let tool = EchoTool;
        assert!(tool.validate_params(&json!({"text": "hi"})).is_ok());
        assert!(tool.validate_params(&json!({"text": "hi", "times": 2})).is_ok());
        assert!(tool.validate_params(&json!({"text": "hi", "extra": true})).is_ok());

        let missing = tool.validate_params(&json!({})).unwrap_err();
        assert!(missing.to_string().contains("text"));
        assert!(tool.validate_params(&json!({"text": 5})).is_err());
        assert!(tool.validate_params(&json!({"text": "a", "times": 1.5})).is_err());
        assert!(tool.validate_params(&json!("text")).is_err());
    }

    #[test]
    fn test_definition_mirrors_tool() {
        let def = EchoTool.to_definition();
        assert_eq!(def.name, "echo");
        assert_eq!(def.parameters["required"][0], "text");
    }
}
