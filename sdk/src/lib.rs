//! Cohort SDK
//!
//! Shared library providing traits, types, and utilities for Cohort components.
//! This crate is used by the engine and by every tool implementation.

/// Tool handler trait and catalog metadata
pub mod tool;

/// Error types and handling
pub mod errors;

/// Tool input/output types
pub mod types;

// Re-export commonly used types
pub use errors::{EngineError, EngineErrorExt};
pub use tool::{ToolHandler, ToolSpec};
pub use types::{ToolError, ToolInput, ToolOutput};
