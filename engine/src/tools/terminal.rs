//! `shell_exec`: run a shell command in the workspace
//!
//! The command runs through the platform shell with a bounded timeout. On
//! timeout the child is killed and the call fails; a non-zero exit status is
//! not a failure, it is reported in the output for the model to read.

use async_trait::async_trait;
use sdk::{ToolError, ToolHandler, ToolInput, ToolOutput, ToolSpec};
use serde_json::json;
use std::process::Stdio;
use std::sync::Arc;
use std::time::Duration;
use tokio::process::Command;
use tracing::{info, warn};

use super::Workspace;

/// Upper bound for a caller-supplied timeout (seconds)
pub const MAX_TIMEOUT_SECS: u64 = 300;

pub struct ShellExec {
    workspace: Arc<Workspace>,
    default_timeout_secs: u64,
}

impl ShellExec {
    pub fn new(workspace: Arc<Workspace>, default_timeout_secs: u64) -> Self {
        Self {
            workspace,
            default_timeout_secs: default_timeout_secs.clamp(1, MAX_TIMEOUT_SECS),
        }
    }

    pub fn spec() -> ToolSpec {
        ToolSpec::new(
            "shell_exec",
            "Execute a shell command and return combined stdout and stderr",
        )
        .with_schema(json!({
            "type": "object",
            "properties": {
                "command": {"type": "string", "description": "Command line to run"},
                "timeout": {
                    "type": "integer",
                    "description": "Timeout in seconds (default 30, max 300)"
                }
            },
            "required": ["command"]
        }))
        .with_hitl()
    }

    fn timeout_for(&self, requested: Option<i64>) -> u64 {
        match requested {
            Some(secs) if secs > 0 => (secs as u64).min(MAX_TIMEOUT_SECS),
            _ => self.default_timeout_secs,
        }
    }

    fn command(line: &str) -> Command {
        #[cfg(windows)]
        {
            let mut cmd = Command::new("cmd");
            cmd.arg("/C").arg(line);
            cmd
        }
        #[cfg(not(windows))]
        {
            let mut cmd = Command::new("sh");
            cmd.arg("-c").arg(line);
            cmd
        }
    }
}

#[async_trait]
impl ToolHandler for ShellExec {
    async fn call(&self, input: ToolInput) -> Result<ToolOutput, ToolError> {
        let line = input.param_str("command")?;
        if line.trim().is_empty() {
            return Err(ToolError::InvalidParameter("Empty command".to_string()));
        }
        let timeout = self.timeout_for(input.param_i64_opt("timeout"));

        info!("Executing shell command: {}", line);

        let child = Self::command(&line)
            .current_dir(self.workspace.root())
            .stdin(Stdio::null())
            .stdout(Stdio::piped())
            .stderr(Stdio::piped())
            .kill_on_drop(true)
            .spawn()
            .map_err(|e| ToolError::Execution(format!("Failed to start command: {}", e)))?;

        let output =
            match tokio::time::timeout(Duration::from_secs(timeout), child.wait_with_output())
                .await
            {
                Ok(result) => result?,
                Err(_) => {
                    warn!("Command timed out after {}s", timeout);
                    return Err(ToolError::Timeout(timeout));
                }
            };

        let stdout = String::from_utf8_lossy(&output.stdout);
        let stderr = String::from_utf8_lossy(&output.stderr);

        let mut text = stdout.trim_end().to_string();
        if !stderr.trim().is_empty() {
            if !text.is_empty() {
                text.push('\n');
            }
            text.push_str(stderr.trim_end());
        }
        if !output.status.success() {
            if !text.is_empty() {
                text.push('\n');
            }
            match output.status.code() {
                Some(code) => text.push_str(&format!("(exit code {})", code)),
                None => text.push_str("(terminated by signal)"),
            }
        }
        if text.is_empty() {
            text = "(no output)".to_string();
        }

        Ok(ToolOutput::text(text))
    }
}
