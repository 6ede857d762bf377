//! Error types and handling
//!
//! This module provides the error types used throughout the Cohort engine.
//! All errors implement the `EngineErrorExt` trait which provides user-friendly
//! hints and indicates whether errors are recoverable.
//!
//! # Security
//!
//! Error messages never carry API keys. Hints are static strings and are safe to
//! print to a terminal or store in the audit log.

use thiserror::Error;

/// Trait for engine error extensions
///
/// This trait provides additional context for errors, including user-friendly
/// hints and recoverability information. All engine errors implement this trait.
pub trait EngineErrorExt {
    /// Returns a user-friendly hint for the error
    fn user_hint(&self) -> &str;

    /// Returns whether the error is recoverable
    ///
    /// A recoverable error ends the current run but leaves the session usable.
    fn is_recoverable(&self) -> bool;
}

/// Main engine error type
///
/// # Error Categories
///
/// - **Configuration**: Invalid or missing configuration
/// - **Database**: Audit log (SQLite) failures
/// - **LLM Provider**: Transport and API failures
/// - **Security**: Blocked input
/// - **Budget**: Session token ceiling reached
/// - **Tool dispatch**: Unknown tool, capability violation, tool failure
/// - **Session**: Session persistence failures
///
/// # Examples
///
/// ```
/// use sdk::errors::{EngineError, EngineErrorExt};
///
/// let error = EngineError::BudgetExceeded { used: 100_000, ceiling: 100_000 };
/// println!("Hint: {}", error.user_hint());
/// assert!(error.is_recoverable());
///
/// let fatal_error = EngineError::Config("missing [llm] section".to_string());
/// assert!(!fatal_error.is_recoverable());
/// ```
#[derive(Debug, Error)]
pub enum EngineError {
    // Configuration errors
    #[error("Configuration error: {0}")]
    Config(String),

    // Database errors
    #[error("Database error: {0}")]
    Database(String),

    // LLM provider errors
    #[error("LLM provider error: {0}")]
    LLMProvider(String),

    // Security errors
    #[error("Potential prompt injection detected: '{0}'. Request blocked for security.")]
    SecurityBlocked(String),

    // Budget errors
    #[error("Session budget exceeded: {used}/{ceiling} tokens used.")]
    BudgetExceeded { used: u64, ceiling: u64 },

    // Tool errors
    #[error("Tool '{0}' is not registered.")]
    ToolNotFound(String),

    #[error("Tool '{0}' is not in this agent's allowed tool list.")]
    ToolPermissionDenied(String),

    #[error("Tool error: {0}")]
    ToolError(String),

    // Session persistence errors
    #[error("Session error: {0}")]
    Session(String),

    // Keyring errors
    #[error("Keyring error: {0}")]
    KeyringError(String),

    // Generic IO error
    #[error("IO error: {0}")]
    Io(#[from] std::io::Error),
}

impl EngineErrorExt for EngineError {
    fn user_hint(&self) -> &str {
        match self {
            Self::Config(_) => "Check your config.toml file for errors",
            Self::Database(_) => "Audit log unavailable. Check the data directory permissions",
            Self::LLMProvider(_) => "Model provider unavailable. Check your API key and network",
            Self::SecurityBlocked(_) => "Rephrase the request without instruction overrides",
            Self::BudgetExceeded { .. } => "Session token budget spent. Start a new session",
            Self::ToolNotFound(_) => "The requested tool is not available",
            Self::ToolPermissionDenied(_) => "This agent is not allowed to use that tool",
            Self::ToolError(_) => "Tool operation failed",
            Self::Session(_) => "Session could not be saved or restored",
            Self::KeyringError(_) => "Failed to access secure storage. Check system keychain",
            Self::Io(_) => "File system operation failed",
        }
    }

    fn is_recoverable(&self) -> bool {
        match self {
            // Non-recoverable errors
            Self::Config(_) | Self::Database(_) | Self::KeyringError(_) => false,

            // All other errors end the current run only
            _ => true,
        }
    }
}
