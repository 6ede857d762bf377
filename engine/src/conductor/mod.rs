//! Conductor
//!
//! The commander routes each request to one specialist, compacts memory when
//! the live window grows past its threshold, and runs the chosen agent.

pub mod commander;
pub mod router;

pub use commander::{Commander, Dispatch};
pub use router::{parse_route, strip_code_fence, Route};
