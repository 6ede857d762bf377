//! Built-in file tools
//!
//! Relative paths resolve against the configured workspace; absolute paths
//! are used as given. Destructive tools (write, delete, rename) are flagged
//! for human approval in their catalog entry.

use async_trait::async_trait;
use regex::Regex;
use sdk::{ToolError, ToolHandler, ToolInput, ToolOutput, ToolSpec};
use serde_json::json;
use std::path::{Path, PathBuf};
use std::sync::Arc;
use tokio::fs;
use tracing::{debug, info};

/// Root directory relative tool paths resolve against
#[derive(Debug, Clone)]
pub struct Workspace {
    root: PathBuf,
}

impl Workspace {
    pub fn new(root: PathBuf) -> Self {
        Self { root }
    }

    pub fn root(&self) -> &Path {
        &self.root
    }

    pub fn resolve(&self, path: &str) -> PathBuf {
        let target = Path::new(path);
        if target.is_absolute() {
            target.to_path_buf()
        } else {
            self.root.join(target)
        }
    }
}

fn path_schema(description: &str) -> serde_json::Value {
    json!({
        "type": "object",
        "properties": {
            "path": {"type": "string", "description": description}
        },
        "required": ["path"]
    })
}

/// `file_read`: return a text file's contents
pub struct FileRead {
    workspace: Arc<Workspace>,
}

impl FileRead {
    pub fn new(workspace: Arc<Workspace>) -> Self {
        Self { workspace }
    }

    pub fn spec() -> ToolSpec {
        ToolSpec::new("file_read", "Read the contents of a text file")
            .with_schema(path_schema("Path of the file to read"))
    }
}

#[async_trait]
impl ToolHandler for FileRead {
    async fn call(&self, input: ToolInput) -> Result<ToolOutput, ToolError> {
        let path = self.workspace.resolve(&input.param_str("path")?);
        debug!("Reading file: {}", path.display());

        let content = fs::read_to_string(&path).await.map_err(|e| {
            ToolError::Execution(format!("Failed to read {}: {}", path.display(), e))
        })?;

        Ok(ToolOutput::text(content))
    }
}

/// `file_write`: create or overwrite a file, creating parent directories
pub struct FileWrite {
    workspace: Arc<Workspace>,
}

impl FileWrite {
    pub fn new(workspace: Arc<Workspace>) -> Self {
        Self { workspace }
    }

    pub fn spec() -> ToolSpec {
        ToolSpec::new(
            "file_write",
            "Write text to a file, replacing existing content",
        )
        .with_schema(json!({
            "type": "object",
            "properties": {
                "path": {"type": "string", "description": "Path of the file to write"},
                "content": {"type": "string", "description": "Full file content"}
            },
            "required": ["path", "content"]
        }))
        .with_hitl()
    }
}

#[async_trait]
impl ToolHandler for FileWrite {
    async fn call(&self, input: ToolInput) -> Result<ToolOutput, ToolError> {
        let path = self.workspace.resolve(&input.param_str("path")?);
        let content = input.param_str("content")?;

        if let Some(parent) = path.parent() {
            fs::create_dir_all(parent).await.map_err(|e| {
                ToolError::Execution(format!(
                    "Failed to create directories {}: {}",
                    parent.display(),
                    e
                ))
            })?;
        }

        fs::write(&path, &content).await.map_err(|e| {
            ToolError::Execution(format!("Failed to write {}: {}", path.display(), e))
        })?;

        info!("Wrote {} bytes to {}", content.len(), path.display());
        Ok(ToolOutput::text(format!(
            "Wrote {} bytes to {}",
            content.len(),
            path.display()
        )))
    }
}

/// `file_delete`: remove a single file
pub struct FileDelete {
    workspace: Arc<Workspace>,
}

impl FileDelete {
    pub fn new(workspace: Arc<Workspace>) -> Self {
        Self { workspace }
    }

    pub fn spec() -> ToolSpec {
        ToolSpec::new("file_delete", "Delete a file")
            .with_schema(path_schema("Path of the file to delete"))
            .with_hitl()
    }
}

#[async_trait]
impl ToolHandler for FileDelete {
    async fn call(&self, input: ToolInput) -> Result<ToolOutput, ToolError> {
        let path = self.workspace.resolve(&input.param_str("path")?);

        if path.is_dir() {
            return Err(ToolError::InvalidParameter(format!(
                "{} is a directory",
                path.display()
            )));
        }

        fs::remove_file(&path).await.map_err(|e| {
            ToolError::Execution(format!("Failed to delete {}: {}", path.display(), e))
        })?;

        info!("Deleted {}", path.display());
        Ok(ToolOutput::text(format!("Deleted {}", path.display())))
    }
}

/// `file_rename`: move a file or directory
pub struct FileRename {
    workspace: Arc<Workspace>,
}

impl FileRename {
    pub fn new(workspace: Arc<Workspace>) -> Self {
        Self { workspace }
    }

    pub fn spec() -> ToolSpec {
        ToolSpec::new("file_rename", "Rename or move a file or directory")
            .with_schema(json!({
                "type": "object",
                "properties": {
                    "source": {"type": "string", "description": "Existing path"},
                    "destination": {"type": "string", "description": "New path"}
                },
                "required": ["source", "destination"]
            }))
            .with_hitl()
    }
}

#[async_trait]
impl ToolHandler for FileRename {
    async fn call(&self, input: ToolInput) -> Result<ToolOutput, ToolError> {
        let source = self.workspace.resolve(&input.param_str("source")?);
        let destination = self.workspace.resolve(&input.param_str("destination")?);

        if fs::try_exists(&destination).await.unwrap_or(false) {
            return Err(ToolError::InvalidParameter(format!(
                "{} already exists",
                destination.display()
            )));
        }

        fs::rename(&source, &destination).await.map_err(|e| {
            ToolError::Execution(format!(
                "Failed to rename {} to {}: {}",
                source.display(),
                destination.display(),
                e
            ))
        })?;

        info!("Renamed {} -> {}", source.display(), destination.display());
        Ok(ToolOutput::text(format!(
            "Renamed {} to {}",
            source.display(),
            destination.display()
        )))
    }
}

/// `directory_list`: list entries with sizes, directories first
pub struct DirectoryList {
    workspace: Arc<Workspace>,
}

impl DirectoryList {
    pub fn new(workspace: Arc<Workspace>) -> Self {
        Self { workspace }
    }

    pub fn spec() -> ToolSpec {
        ToolSpec::new(
            "directory_list",
            "List directory contents with file sizes and types",
        )
        .with_schema(json!({
            "type": "object",
            "properties": {
                "path": {
                    "type": "string",
                    "description": "Directory to list (default: workspace root)"
                }
            },
            "required": []
        }))
    }
}

#[async_trait]
impl ToolHandler for DirectoryList {
    async fn call(&self, input: ToolInput) -> Result<ToolOutput, ToolError> {
        let raw = input.param_str_opt("path").unwrap_or_else(|| ".".to_string());
        let path = self.workspace.resolve(&raw);

        if !path.is_dir() {
            return Err(ToolError::InvalidParameter(format!(
                "not a directory: {}",
                path.display()
            )));
        }

        let mut entries = fs::read_dir(&path).await?;
        let mut dirs = Vec::new();
        let mut files = Vec::new();

        while let Some(entry) = entries.next_entry().await? {
            let name = entry.file_name().to_string_lossy().to_string();
            let file_type = entry.file_type().await?;
            if file_type.is_dir() {
                dirs.push(format!("[DIR]  {}/", name));
            } else {
                let size = entry.metadata().await.map(|m| m.len()).unwrap_or(0);
                files.push((name, size));
            }
        }

        dirs.sort();
        files.sort();

        if dirs.is_empty() && files.is_empty() {
            return Ok(ToolOutput::text(format!("Empty directory: {}", path.display())));
        }

        let mut out = dirs;
        out.extend(
            files
                .into_iter()
                .map(|(name, size)| format!("[FILE] {} ({} bytes)", name, size)),
        );
        Ok(ToolOutput::text(out.join("\n")))
    }
}

/// Stop `grep_search` after this many matching lines
const MAX_GREP_MATCHES: usize = 100;

/// Files larger than this are skipped by `grep_search`
const MAX_GREP_FILE_BYTES: u64 = 1024 * 1024;

/// `grep_search`: regex search over the text files under a directory
pub struct GrepSearch {
    workspace: Arc<Workspace>,
}

impl GrepSearch {
    pub fn new(workspace: Arc<Workspace>) -> Self {
        Self { workspace }
    }

    pub fn spec() -> ToolSpec {
        ToolSpec::new(
            "grep_search",
            "Search file contents under a directory with a regular expression",
        )
        .with_schema(json!({
            "type": "object",
            "properties": {
                "pattern": {"type": "string", "description": "Regular expression to match"},
                "path": {
                    "type": "string",
                    "description": "Directory to search (default: workspace root)"
                }
            },
            "required": ["pattern"]
        }))
    }
}

#[async_trait]
impl ToolHandler for GrepSearch {
    async fn call(&self, input: ToolInput) -> Result<ToolOutput, ToolError> {
        let pattern = input.param_str("pattern")?;
        let regex = Regex::new(&pattern)
            .map_err(|e| ToolError::InvalidParameter(format!("bad pattern: {}", e)))?;
        let raw = input.param_str_opt("path").unwrap_or_else(|| ".".to_string());
        let root = self.workspace.resolve(&raw);

        if !root.is_dir() {
            return Err(ToolError::InvalidParameter(format!(
                "not a directory: {}",
                root.display()
            )));
        }

        let mut pending = vec![root.clone()];
        let mut matches = Vec::new();

        'walk: while let Some(dir) = pending.pop() {
            let mut entries = fs::read_dir(&dir).await?;
            let mut children = Vec::new();
            while let Some(entry) = entries.next_entry().await? {
                children.push(entry);
            }
            children.sort_by_key(|e| e.file_name());

            for entry in children {
                let name = entry.file_name().to_string_lossy().to_string();
                if name.starts_with('.') || name == "target" {
                    continue;
                }
                let file_type = entry.file_type().await?;
                if file_type.is_dir() {
                    pending.push(entry.path());
                    continue;
                }
                let too_big = entry
                    .metadata()
                    .await
                    .map(|m| m.len() > MAX_GREP_FILE_BYTES)
                    .unwrap_or(true);
                if too_big {
                    continue;
                }
                // Binary and non-UTF-8 files are skipped
                let Ok(content) = fs::read_to_string(entry.path()).await else {
                    continue;
                };

                let path = entry.path();
                let shown = path.strip_prefix(&root).unwrap_or(&path).display().to_string();
                for (n, line) in content.lines().enumerate() {
                    if regex.is_match(line) {
                        matches.push(format!("{}:{}: {}", shown, n + 1, line.trim()));
                        if matches.len() >= MAX_GREP_MATCHES {
                            break 'walk;
                        }
                    }
                }
            }
        }

        debug!(pattern = %pattern, matches = matches.len(), "grep_search finished");

        if matches.is_empty() {
            return Ok(ToolOutput::text(format!("No matches for '{}'", pattern)));
        }
        Ok(ToolOutput::text(matches.join("\n")))
    }
}
