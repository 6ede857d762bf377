//! Tool handler trait and catalog metadata
//!
//! A tool is two things: a `ToolSpec` describing it to the model (name,
//! description, JSON input schema, approval requirement) and a `ToolHandler`
//! that executes it. The engine's registry pairs the two.

use async_trait::async_trait;
use serde::{Deserialize, Serialize};

use crate::types::{ToolError, ToolInput, ToolOutput};

/// Catalog entry advertised to the model
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ToolSpec {
    /// Unique tool name
    pub name: String,

    /// One-line description shown to the model
    pub description: String,

    /// JSON schema of the tool input
    pub input_schema: serde_json::Value,

    /// Whether a human must approve every invocation
    #[serde(default)]
    pub requires_hitl: bool,
}

impl ToolSpec {
    /// Create a spec with an empty object schema
    pub fn new(name: impl Into<String>, description: impl Into<String>) -> Self {
        Self {
            name: name.into(),
            description: description.into(),
            input_schema: serde_json::json!({"type": "object", "properties": {}}),
            requires_hitl: false,
        }
    }

    /// Set the input schema
    pub fn with_schema(mut self, schema: serde_json::Value) -> Self {
        self.input_schema = schema;
        self
    }

    /// Mark the tool as requiring human approval
    pub fn with_hitl(mut self) -> Self {
        self.requires_hitl = true;
        self
    }
}

/// Trait that all executable tools implement
#[async_trait]
pub trait ToolHandler: Send + Sync {
    /// Execute the tool with the given input
    async fn call(&self, input: ToolInput) -> Result<ToolOutput, ToolError>;
}

/// Adapter turning a synchronous closure into a `ToolHandler`
pub struct FnTool<F>(pub F);

#[async_trait]
impl<F> ToolHandler for FnTool<F>
where
    F: Fn(ToolInput) -> Result<ToolOutput, ToolError> + Send + Sync,
{
    async fn call(&self, input: ToolInput) -> Result<ToolOutput, ToolError> {
        (self.0)(input)
    }
}
