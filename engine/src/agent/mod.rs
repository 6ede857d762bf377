//! Agents
//!
//! Agent profiles (who an agent is and what it may do), the runtime context
//! they run in, and the shared execution loop.

pub mod context;
pub mod executor;
pub mod roster;

pub use context::RuntimeContext;
pub use executor::{build_prompt, AgentResult, ExecutionLoop};
pub use roster::{team, AgentKind, AgentProfile};
