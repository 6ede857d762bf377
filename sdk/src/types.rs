//! Tool input/output types

use serde::{Deserialize, Serialize};
use std::collections::HashMap;

/// Input to a tool function
///
/// `params` is the JSON object the model supplied as the tool-use input.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ToolInput {
    pub tool: String,
    pub params: HashMap<String, serde_json::Value>,
}

impl ToolInput {
    /// Create a new ToolInput
    pub fn new(tool: impl Into<String>) -> Self {
        Self {
            tool: tool.into(),
            params: HashMap::new(),
        }
    }

    /// Build an input from a model-supplied JSON value.
    ///
    /// Non-object values are rejected: tool inputs are always keyword arguments.
    pub fn from_value(
        tool: impl Into<String>,
        value: serde_json::Value,
    ) -> Result<Self, ToolError> {
        match value {
            serde_json::Value::Object(map) => Ok(Self {
                tool: tool.into(),
                params: map.into_iter().collect(),
            }),
            serde_json::Value::Null => Ok(Self::new(tool)),
            other => Err(ToolError::InvalidParameter(format!(
                "tool input must be a JSON object, got {}",
                other
            ))),
        }
    }

    /// Add a parameter
    pub fn with_param(mut self, key: impl Into<String>, value: serde_json::Value) -> Self {
        self.params.insert(key.into(), value);
        self
    }

    /// Get a string parameter
    pub fn param_str(&self, key: &str) -> Result<String, ToolError> {
        self.params
            .get(key)
            .and_then(|v| v.as_str())
            .map(String::from)
            .ok_or_else(|| ToolError::MissingParameter(key.to_string()))
    }

    /// Get an i64 parameter
    pub fn param_i64(&self, key: &str) -> Result<i64, ToolError> {
        self.params
            .get(key)
            .and_then(|v| v.as_i64())
            .ok_or_else(|| ToolError::MissingParameter(key.to_string()))
    }

    /// Get an optional string parameter
    pub fn param_str_opt(&self, key: &str) -> Option<String> {
        self.params
            .get(key)
            .and_then(|v| v.as_str())
            .map(String::from)
    }

    /// Get an optional i64 parameter
    pub fn param_i64_opt(&self, key: &str) -> Option<i64> {
        self.params.get(key).and_then(|v| v.as_i64())
    }
}

/// Output from a tool function
///
/// Tools may return structured data; it is always coerced to text before it
/// is handed back to the model.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ToolOutput {
    pub data: serde_json::Value,
}

impl ToolOutput {
    /// Create an output holding plain text
    pub fn text(text: impl Into<String>) -> Self {
        Self {
            data: serde_json::Value::String(text.into()),
        }
    }

    /// Create an output holding JSON data
    pub fn json(data: serde_json::Value) -> Self {
        Self { data }
    }

    /// Create an empty output
    pub fn empty() -> Self {
        Self {
            data: serde_json::Value::Null,
        }
    }

    /// Coerce the output to the text fed back to the model
    pub fn into_text(self) -> String {
        match self.data {
            serde_json::Value::String(s) => s,
            serde_json::Value::Null => String::new(),
            other => other.to_string(),
        }
    }
}

/// Tool-specific errors
#[derive(Debug, thiserror::Error)]
pub enum ToolError {
    #[error("Missing parameter: {0}")]
    MissingParameter(String),

    #[error("Invalid parameter: {0}")]
    InvalidParameter(String),

    #[error("{0}")]
    Execution(String),

    #[error("Timed out after {0}s")]
    Timeout(u64),
}

impl From<std::io::Error> for ToolError {
    fn from(err: std::io::Error) -> Self {
        ToolError::Execution(err.to_string())
    }
}
