//! Cohort Engine Library
//!
//! Runtime for a small team of language-model agents under one commander.
//! Used by the `cohort` binary and by the integration tests.

/// Configuration management module
pub mod config;

/// Secret management module
pub mod secrets;

/// Append-only audit log
pub mod db;

/// Model-call boundary
pub mod llm;

/// Session token budget
pub mod budget;

/// Injection guard and human approval gate
pub mod security;

/// Conversational memory and compaction
pub mod memory;

/// Tool registry and built-in tools
pub mod tools;

/// Agent roster and execution loop
pub mod agent;

/// Request routing and dispatch
pub mod conductor;

/// Session persistence
pub mod session;

/// Telemetry and Observability
pub mod telemetry;

/// CLI interface module
pub mod cli;

/// Command handlers module
pub mod handlers;
