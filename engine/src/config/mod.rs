//! Configuration management
//!
//! This module handles loading, validation, and management of the Cohort configuration.
//! Configuration is stored in TOML format at ~/.cohort/config.toml and is read once at
//! startup; nothing mutates it afterwards.
//!
//! # Configuration Sections
//!
//! - **core**: Log level, data directory
//! - **llm**: Provider endpoint, model identifiers per role, per-run output cap
//! - **budget**: Session token ceiling, max tool-use turns
//! - **security**: Action types that always require human approval
//! - **memory**: Compaction threshold and live message window
//! - **tools**: Workspace root and shell timeout for built-in tools
//!
//! # Examples
//!
//! ```no_run
//! use cohort_engine::config::Config;
//!
//! # fn main() -> Result<(), Box<dyn std::error::Error>> {
//! let config = Config::load_or_create()?;
//! println!("Session ceiling: {}", config.budget.max_tokens_per_session);
//! # Ok(())
//! # }
//! ```

use sdk::errors::EngineError;
use serde::{Deserialize, Serialize};
use std::collections::BTreeSet;
use std::fs;
use std::path::{Path, PathBuf};

/// Main configuration structure
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Config {
    /// Core engine settings
    pub core: CoreConfig,

    /// Model provider configuration
    pub llm: LLMConfig,

    /// Token budget settings
    #[serde(default)]
    pub budget: BudgetConfig,

    /// Security settings
    #[serde(default)]
    pub security: SecurityConfig,

    /// Memory configuration
    #[serde(default)]
    pub memory: MemoryConfig,

    /// Built-in tool settings
    #[serde(default)]
    pub tools: ToolsConfig,
}

/// Core engine configuration
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct CoreConfig {
    /// Log level (error, warn, info, debug, trace)
    #[serde(default = "default_log_level")]
    pub log_level: String,

    /// Data directory path (supports ~ expansion); holds the audit log and sessions
    #[serde(default = "default_data_dir")]
    pub data_dir: PathBuf,
}

/// Model provider configuration
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct LLMConfig {
    /// Base URL for the Anthropic Messages API
    #[serde(default = "default_anthropic_base_url")]
    pub base_url: String,

    /// Model used by the commander when it handles a task itself
    #[serde(default = "default_commander_model")]
    pub commander_model: String,

    /// Model used by every specialist agent
    #[serde(default = "default_specialist_model")]
    pub specialist_model: String,

    /// Model used for the routing classification call
    #[serde(default = "default_specialist_model")]
    pub router_model: String,

    /// Model used to summarize old conversation turns
    #[serde(default = "default_specialist_model")]
    pub summary_model: String,

    /// Max output tokens per model call
    #[serde(default = "default_max_tokens_per_run")]
    pub max_tokens_per_run: u32,

    /// Timeout for a single model call (seconds)
    #[serde(default = "default_request_timeout")]
    pub request_timeout_secs: u64,
    // Note: API key comes from ANTHROPIC_API_KEY or the OS keychain, never from config
}

impl Default for LLMConfig {
    fn default() -> Self {
        Self {
            base_url: default_anthropic_base_url(),
            commander_model: default_commander_model(),
            specialist_model: default_specialist_model(),
            router_model: default_specialist_model(),
            summary_model: default_specialist_model(),
            max_tokens_per_run: default_max_tokens_per_run(),
            request_timeout_secs: default_request_timeout(),
        }
    }
}

/// Token budget configuration
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct BudgetConfig {
    /// Cumulative token ceiling for one session
    #[serde(default = "default_max_tokens_per_session")]
    pub max_tokens_per_session: u64,

    /// Maximum tool-use turns inside a single run
    #[serde(default = "default_max_agent_turns")]
    pub max_agent_turns: usize,
}

impl Default for BudgetConfig {
    fn default() -> Self {
        Self {
            max_tokens_per_session: default_max_tokens_per_session(),
            max_agent_turns: default_max_agent_turns(),
        }
    }
}

/// Security configuration
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct SecurityConfig {
    /// Action types (tool names) that always require human approval
    #[serde(default = "default_hitl_actions")]
    pub hitl_required_actions: BTreeSet<String>,
}

impl Default for SecurityConfig {
    fn default() -> Self {
        Self {
            hitl_required_actions: default_hitl_actions(),
        }
    }
}

/// Memory system configuration
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct MemoryConfig {
    /// Estimated token count above which compaction runs
    #[serde(default = "default_compaction_threshold")]
    pub compaction_threshold_tokens: usize,

    /// Number of most recent messages kept in the live prompt window
    #[serde(default = "default_live_window")]
    pub live_window: usize,
}

impl Default for MemoryConfig {
    fn default() -> Self {
        Self {
            compaction_threshold_tokens: default_compaction_threshold(),
            live_window: default_live_window(),
        }
    }
}

/// Built-in tool configuration
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ToolsConfig {
    /// Directory relative tool paths resolve against (supports ~ expansion)
    #[serde(default = "default_workspace")]
    pub workspace: PathBuf,

    /// Default timeout for shell_exec (seconds)
    #[serde(default = "default_shell_timeout")]
    pub shell_timeout_secs: u64,
}

impl Default for ToolsConfig {
    fn default() -> Self {
        Self {
            workspace: default_workspace(),
            shell_timeout_secs: default_shell_timeout(),
        }
    }
}

// Default value functions
fn default_log_level() -> String {
    "info".to_string()
}

fn default_data_dir() -> PathBuf {
    PathBuf::from("~/.cohort")
}

fn default_anthropic_base_url() -> String {
    "https://api.anthropic.com/v1".to_string()
}

fn default_commander_model() -> String {
    "claude-opus-4-5".to_string()
}

fn default_specialist_model() -> String {
    "claude-sonnet-4-5".to_string()
}

fn default_max_tokens_per_run() -> u32 {
    8000
}

fn default_request_timeout() -> u64 {
    300
}

fn default_max_tokens_per_session() -> u64 {
    100_000
}

fn default_max_agent_turns() -> usize {
    10
}

fn default_hitl_actions() -> BTreeSet<String> {
    [
        "file_delete",
        "git_push",
        "shell_exec",
        "package_install",
        "file_rename",
    ]
    .into_iter()
    .map(String::from)
    .collect()
}

fn default_compaction_threshold() -> usize {
    15_000
}

fn default_live_window() -> usize {
    20
}

fn default_workspace() -> PathBuf {
    PathBuf::from(".")
}

fn default_shell_timeout() -> u64 {
    30
}

impl Default for Config {
    fn default() -> Self {
        Self {
            core: CoreConfig {
                log_level: default_log_level(),
                data_dir: default_data_dir(),
            },
            llm: LLMConfig::default(),
            budget: BudgetConfig::default(),
            security: SecurityConfig::default(),
            memory: MemoryConfig::default(),
            tools: ToolsConfig::default(),
        }
    }
}

impl Config {
    /// Load configuration from the default location (~/.cohort/config.toml)
    ///
    /// If the configuration file doesn't exist, creates a default configuration.
    ///
    /// # Errors
    ///
    /// Returns an error if the file cannot be read, TOML parsing fails, or
    /// validation fails.
    pub fn load_or_create() -> Result<Self, EngineError> {
        let config_path = Self::default_config_path()?;

        if config_path.exists() {
            Self::load_from_path(&config_path)
        } else {
            Self::create_default(&config_path)
        }
    }

    /// Load configuration from a specific path
    pub fn load_from_path(path: &Path) -> Result<Self, EngineError> {
        let contents = fs::read_to_string(path)
            .map_err(|e| EngineError::Config(format!("Failed to read config file: {}", e)))?;

        Self::from_toml_str(&contents)
    }

    /// Parse and validate configuration from TOML text
    pub fn from_toml_str(contents: &str) -> Result<Self, EngineError> {
        let mut config: Config = toml::from_str(contents)
            .map_err(|e| EngineError::Config(format!("Failed to parse config: {}", e)))?;

        config.validate_and_process()?;

        Ok(config)
    }

    /// Create default configuration and save to path
    fn create_default(path: &Path) -> Result<Self, EngineError> {
        if let Some(parent) = path.parent() {
            fs::create_dir_all(parent).map_err(|e| {
                EngineError::Config(format!("Failed to create config directory: {}", e))
            })?;
        }

        // Serialize before processing so the file keeps the portable ~ paths
        let config = Self::default();
        let toml_string = toml::to_string_pretty(&config)
            .map_err(|e| EngineError::Config(format!("Failed to serialize config: {}", e)))?;

        fs::write(path, toml_string)
            .map_err(|e| EngineError::Config(format!("Failed to write config file: {}", e)))?;

        let mut config = config;
        config.validate_and_process()?;
        Ok(config)
    }

    /// Get the default configuration file path (~/.cohort/config.toml)
    fn default_config_path() -> Result<PathBuf, EngineError> {
        let home = dirs::home_dir()
            .ok_or_else(|| EngineError::Config("Could not determine home directory".to_string()))?;

        Ok(home.join(".cohort").join("config.toml"))
    }

    /// Path of the SQLite audit database
    pub fn audit_db_path(&self) -> PathBuf {
        self.core.data_dir.join("audit.db")
    }

    /// Validate and process configuration
    ///
    /// - Validates log level, ceilings, and turn caps
    /// - Expands ~ in paths
    /// - Creates the data directory if it doesn't exist
    fn validate_and_process(&mut self) -> Result<(), EngineError> {
        let valid_log_levels = ["error", "warn", "info", "debug", "trace"];
        if !valid_log_levels.contains(&self.core.log_level.as_str()) {
            return Err(EngineError::Config(format!(
                "Invalid log level '{}'. Must be one of: {}",
                self.core.log_level,
                valid_log_levels.join(", ")
            )));
        }

        if self.budget.max_tokens_per_session == 0 {
            return Err(EngineError::Config(
                "max_tokens_per_session must be positive".to_string(),
            ));
        }
        if self.budget.max_agent_turns == 0 {
            return Err(EngineError::Config(
                "max_agent_turns must be at least 1".to_string(),
            ));
        }
        if self.llm.max_tokens_per_run == 0 {
            return Err(EngineError::Config(
                "max_tokens_per_run must be positive".to_string(),
            ));
        }
        if self.memory.live_window == 0 {
            return Err(EngineError::Config(
                "live_window must be at least 1".to_string(),
            ));
        }
        if self.tools.shell_timeout_secs == 0 || self.tools.shell_timeout_secs > 300 {
            return Err(EngineError::Config(
                "shell_timeout_secs must be between 1 and 300".to_string(),
            ));
        }

        self.core.data_dir = expand_path(&self.core.data_dir)?;
        self.tools.workspace = expand_path(&self.tools.workspace)?;

        if !self.core.data_dir.exists() {
            fs::create_dir_all(&self.core.data_dir).map_err(|e| {
                EngineError::Config(format!("Failed to create data directory: {}", e))
            })?;
        }

        Ok(())
    }
}

/// Expand ~ in path to user's home directory
fn expand_path(path: &Path) -> Result<PathBuf, EngineError> {
    let path_str = path
        .to_str()
        .ok_or_else(|| EngineError::Config("Invalid UTF-8 in path".to_string()))?;

    if let Some(rest) = path_str.strip_prefix("~/") {
        let home = dirs::home_dir()
            .ok_or_else(|| EngineError::Config("Could not determine home directory".to_string()))?;

        Ok(home.join(rest))
    } else if path_str == "~" {
        dirs::home_dir()
            .ok_or_else(|| EngineError::Config("Could not determine home directory".to_string()))
    } else {
        Ok(path.to_path_buf())
    }
}
