//! Conversational memory
//!
//! A session keeps every message it has ever seen (`history`) plus a live
//! window over the newest ones that is sent to the model. Trimming only moves
//! the window forward; the compactor later distills the messages that fell
//! out of it into the [`WorkingSet`].

use serde::{Deserialize, Serialize};
use std::collections::{BTreeMap, BTreeSet};

use crate::llm::{Message, MessageRole};

pub mod compactor;

pub use compactor::Compactor;

/// Rough token estimate: one token per four characters
const CHARS_PER_TOKEN: usize = 4;

/// Long-term memory distilled from old turns
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct WorkingSet {
    #[serde(default)]
    pub summary: String,
    #[serde(default)]
    pub pinned_facts: BTreeSet<String>,
    #[serde(default)]
    pub decisions: BTreeSet<String>,
    #[serde(default)]
    pub open_tasks: BTreeSet<String>,
    #[serde(default)]
    pub files_touched: BTreeSet<String>,
}

impl WorkingSet {
    pub fn is_empty(&self) -> bool {
        self.summary.is_empty()
            && self.pinned_facts.is_empty()
            && self.decisions.is_empty()
            && self.open_tasks.is_empty()
            && self.files_touched.is_empty()
    }

    /// Render as the context block handed to an agent
    pub fn render(&self) -> String {
        let mut out = String::new();
        if !self.summary.is_empty() {
            out.push_str("Summary of earlier conversation:\n");
            out.push_str(&self.summary);
            out.push('\n');
        }
        for (title, items) in [
            ("Known facts", &self.pinned_facts),
            ("Decisions", &self.decisions),
            ("Open tasks", &self.open_tasks),
            ("Files touched", &self.files_touched),
        ] {
            if items.is_empty() {
                continue;
            }
            if !out.is_empty() {
                out.push('\n');
            }
            out.push_str(title);
            out.push_str(":\n");
            for item in items {
                out.push_str("- ");
                out.push_str(item);
                out.push('\n');
            }
        }
        out.trim_end().to_string()
    }
}

/// Messages, working set and free-form context of one session
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct SessionMemory {
    session_id: String,
    history: Vec<Message>,
    /// Index into `history` where the live window starts
    live_from: usize,
    /// Index into `history` below which messages are already distilled
    compacted_upto: usize,
    context: BTreeMap<String, String>,
    working_set: WorkingSet,
}

impl SessionMemory {
    pub fn new(session_id: impl Into<String>) -> Self {
        Self {
            session_id: session_id.into(),
            ..Default::default()
        }
    }

    /// Rebuild from persisted parts
    pub fn from_parts(
        session_id: impl Into<String>,
        history: Vec<Message>,
        live_from: usize,
        compacted_upto: usize,
        context: BTreeMap<String, String>,
        working_set: WorkingSet,
    ) -> Self {
        let live_from = live_from.min(history.len());
        let compacted_upto = compacted_upto.min(history.len());
        Self {
            session_id: session_id.into(),
            history,
            live_from,
            compacted_upto,
            context,
            working_set,
        }
    }

    pub fn session_id(&self) -> &str {
        &self.session_id
    }

    pub fn append(&mut self, role: MessageRole, content: impl Into<String>) {
        self.history.push(Message {
            role,
            content: content.into(),
        });
    }

    /// Live window sent to the model, oldest first
    pub fn messages(&self) -> &[Message] {
        &self.history[self.live_from..]
    }

    /// Every message of the session, including those outside the live window
    pub fn history(&self) -> &[Message] {
        &self.history
    }

    pub fn live_from(&self) -> usize {
        self.live_from
    }

    pub fn compacted_upto(&self) -> usize {
        self.compacted_upto
    }

    /// Record that everything before `index` has been distilled.
    ///
    /// The cursor only moves forward and never past the end of the history.
    pub fn mark_compacted(&mut self, index: usize) {
        self.compacted_upto = self.compacted_upto.max(index.min(self.history.len()));
    }

    /// Keep only the newest `n` messages in the live window.
    ///
    /// Dropped messages never come back into the window.
    pub fn trim_to_last(&mut self, n: usize) {
        let len = self.history.len();
        self.live_from = self.live_from.max(len.saturating_sub(n));
    }

    /// Character count of the live window divided by four
    pub fn estimate_tokens(&self) -> usize {
        self.messages()
            .iter()
            .map(|m| m.content.chars().count())
            .sum::<usize>()
            / CHARS_PER_TOKEN
    }

    pub fn working_set(&self) -> &WorkingSet {
        &self.working_set
    }

    pub fn working_set_mut(&mut self) -> &mut WorkingSet {
        &mut self.working_set
    }

    pub fn set_context(&mut self, key: impl Into<String>, value: impl Into<String>) {
        self.context.insert(key.into(), value.into());
    }

    pub fn get_context(&self, key: &str) -> Option<&str> {
        self.context.get(key).map(String::as_str)
    }

    pub fn context(&self) -> &BTreeMap<String, String> {
        &self.context
    }

    /// Forget every message and all context; the working set is kept
    pub fn clear(&mut self) {
        self.history.clear();
        self.live_from = 0;
        self.compacted_upto = 0;
        self.context.clear();
    }
}
