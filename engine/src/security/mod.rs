//! Security gate
//!
//! Two concerns live here: the input filter that blocks known prompt-injection
//! phrases before any model call, and the human approval gate for sensitive
//! tool invocations (see [`approval`]).

use regex::Regex;
use sdk::errors::EngineError;

pub mod approval;

pub use approval::{ApprovalGate, ApprovalRequest, Approver, StaticApprover, TerminalApprover};

/// Phrases that mark an input as a prompt-injection attempt
pub const BLOCKED_PHRASES: &[&str] = &[
    "ignore previous",
    "ignore all previous",
    "disregard",
    "forget your instructions",
    "you are now",
    "act as",
    "pretend you are",
    "new instructions:",
    "system:",
    "jailbreak",
];

/// Input filter for user tasks
///
/// Matching is a case-insensitive substring test, so phrases are found
/// anywhere in the input including inside longer words.
pub struct InjectionGuard {
    patterns: Vec<(&'static str, Regex)>,
}

impl InjectionGuard {
    pub fn new() -> anyhow::Result<Self> {
        let patterns = BLOCKED_PHRASES
            .iter()
            .map(|phrase| Ok((*phrase, Regex::new(&format!("(?i){}", regex::escape(phrase)))?)))
            .collect::<anyhow::Result<Vec<_>>>()?;

        Ok(Self { patterns })
    }

    /// First blocked phrase found in `text`, if any
    pub fn scan(&self, text: &str) -> Option<&'static str> {
        self.patterns
            .iter()
            .find(|(_, pattern)| pattern.is_match(text))
            .map(|(phrase, _)| *phrase)
    }

    /// Pass clean input through, fail with `SecurityBlocked` on a match
    pub fn validate<'a>(&self, task: &'a str) -> Result<&'a str, EngineError> {
        match self.scan(task) {
            Some(phrase) => {
                tracing::warn!(phrase, "Blocked input matching injection pattern");
                Err(EngineError::SecurityBlocked(phrase.to_string()))
            }
            None => Ok(task),
        }
    }
}
