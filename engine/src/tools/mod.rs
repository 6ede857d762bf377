//! Tool registry
//!
//! Process-wide catalog of executable tools. It is filled once at startup and
//! then shared read-only behind an `Arc`; dispatch never mutates it.
//!
//! Dispatch is scoped by the caller's allowed set: a tool that exists but is
//! not in that set is a permission error, a name that was never registered is
//! a lookup error. Both come back as values so the execution loop can feed
//! them to the model as error results.

use sdk::errors::EngineError;
use sdk::{ToolHandler, ToolInput, ToolSpec};
use std::collections::HashMap;
use std::fmt;
use std::sync::Arc;
use tracing::{debug, warn};

pub mod filesystem;
pub mod terminal;

pub use filesystem::{
    DirectoryList, FileDelete, FileRead, FileRename, FileWrite, GrepSearch, Workspace,
};
pub use terminal::ShellExec;

use crate::config::ToolsConfig;

/// A registered tool: catalog entry plus behavior
#[derive(Clone)]
pub struct Tool {
    pub spec: ToolSpec,
    handler: Arc<dyn ToolHandler>,
}

impl fmt::Debug for Tool {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("Tool").field("spec", &self.spec).finish()
    }
}

/// Dispatch failure, rendered in-band as `"<Kind>: <message>"`
#[derive(Debug, Clone, PartialEq, Eq, thiserror::Error)]
pub enum DispatchError {
    #[error("Tool '{0}' is not in this agent's allowed tool list.")]
    Permission(String),

    #[error("Tool '{0}' is not registered.")]
    Lookup(String),

    #[error("{0}")]
    Argument(String),

    #[error("{0}")]
    Tool(String),
}

impl DispatchError {
    pub fn kind(&self) -> &'static str {
        match self {
            DispatchError::Permission(_) => "PermissionError",
            DispatchError::Lookup(_) => "LookupError",
            DispatchError::Argument(_) => "ArgumentError",
            DispatchError::Tool(_) => "ToolError",
        }
    }

    /// Text handed back to the model as an error tool result
    pub fn render(&self) -> String {
        format!("{}: {}", self.kind(), self)
    }
}

impl From<DispatchError> for EngineError {
    fn from(err: DispatchError) -> Self {
        match err {
            DispatchError::Permission(name) => EngineError::ToolPermissionDenied(name),
            DispatchError::Lookup(name) => EngineError::ToolNotFound(name),
            other => EngineError::ToolError(other.to_string()),
        }
    }
}

#[derive(Default)]
pub struct ToolRegistry {
    tools: HashMap<String, Tool>,
}

impl ToolRegistry {
    pub fn new() -> Self {
        Self::default()
    }

    /// Registry holding every built-in tool
    pub fn with_builtins(config: &ToolsConfig) -> Result<Self, EngineError> {
        let mut registry = Self::new();
        register_builtin_tools(&mut registry, config)?;
        Ok(registry)
    }

    /// Add a tool. Names are unique; registering a name twice is an error.
    pub fn register(
        &mut self,
        spec: ToolSpec,
        handler: Arc<dyn ToolHandler>,
    ) -> Result<(), EngineError> {
        if self.tools.contains_key(&spec.name) {
            return Err(EngineError::Config(format!(
                "Tool '{}' is already registered",
                spec.name
            )));
        }
        debug!("Registered tool '{}'", spec.name);
        self.tools.insert(spec.name.clone(), Tool { spec, handler });
        Ok(())
    }

    pub fn get(&self, name: &str) -> Option<&Tool> {
        self.tools.get(name)
    }

    /// Registered names, sorted
    pub fn names(&self) -> Vec<&str> {
        let mut names: Vec<&str> = self.tools.keys().map(String::as_str).collect();
        names.sort_unstable();
        names
    }

    /// Catalog entries for the allowed names that are registered, in the
    /// order of `allowed`
    pub fn catalog_for(&self, allowed: &[String]) -> Vec<ToolSpec> {
        allowed
            .iter()
            .filter_map(|name| self.tools.get(name))
            .map(|tool| tool.spec.clone())
            .collect()
    }

    /// Permission check first, then lookup
    pub fn authorize(&self, name: &str, allowed: &[String]) -> Result<&Tool, DispatchError> {
        if !allowed.iter().any(|a| a == name) {
            warn!(tool = name, "Tool outside the caller's allowed set");
            return Err(DispatchError::Permission(name.to_string()));
        }
        self.tools
            .get(name)
            .ok_or_else(|| DispatchError::Lookup(name.to_string()))
    }

    /// Run a tool on behalf of a caller and coerce its output to text
    pub async fn execute(
        &self,
        name: &str,
        allowed: &[String],
        input: serde_json::Value,
    ) -> Result<String, DispatchError> {
        let tool = self.authorize(name, allowed)?;
        let input = ToolInput::from_value(name, input)
            .map_err(|e| DispatchError::Argument(e.to_string()))?;

        debug!(tool = name, "Executing tool");
        match tool.handler.call(input).await {
            Ok(output) => Ok(output.into_text()),
            Err(
                e @ (sdk::ToolError::MissingParameter(_) | sdk::ToolError::InvalidParameter(_)),
            ) => Err(DispatchError::Argument(e.to_string())),
            Err(e) => Err(DispatchError::Tool(e.to_string())),
        }
    }
}

/// Register file and shell tools rooted at the configured workspace
pub fn register_builtin_tools(
    registry: &mut ToolRegistry,
    config: &ToolsConfig,
) -> Result<(), EngineError> {
    let workspace = Arc::new(Workspace::new(config.workspace.clone()));

    registry.register(FileRead::spec(), Arc::new(FileRead::new(Arc::clone(&workspace))))?;
    registry.register(FileWrite::spec(), Arc::new(FileWrite::new(Arc::clone(&workspace))))?;
    registry.register(FileDelete::spec(), Arc::new(FileDelete::new(Arc::clone(&workspace))))?;
    registry.register(FileRename::spec(), Arc::new(FileRename::new(Arc::clone(&workspace))))?;
    registry.register(
        DirectoryList::spec(),
        Arc::new(DirectoryList::new(Arc::clone(&workspace))),
    )?;
    registry.register(GrepSearch::spec(), Arc::new(GrepSearch::new(Arc::clone(&workspace))))?;
    registry.register(
        ShellExec::spec(),
        Arc::new(ShellExec::new(Arc::clone(&workspace), config.shell_timeout_secs)),
    )?;

    Ok(())
}
