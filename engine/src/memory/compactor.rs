//! Long-session compaction
//!
//! Messages that have fallen out of the live window are summarized with one
//! model call. Facts and decisions are pulled with plain string heuristics
//! out of the old messages no earlier pass has seen, then merged into the
//! working set by set union. The memory's compaction cursor is advanced
//! afterwards so the next pass starts where this one stopped.

use regex::Regex;
use std::collections::BTreeSet;
use std::sync::{Arc, OnceLock};

use super::SessionMemory;
use crate::llm::{LLMProvider, Message, ModelRequest};

/// Placeholder stored when the summary call fails
pub const SUMMARY_UNAVAILABLE: &str = "Summary unavailable due to API error.";

/// At most this many old messages go into the summary prompt
const MAX_SUMMARY_MESSAGES: usize = 50;

/// Per-message content cap inside the summary prompt
const MAX_SUMMARY_CHARS: usize = 500;

const SUMMARY_MAX_TOKENS: u32 = 1000;

const MAX_EXTRACTED: usize = 15;

const MAX_DECISION_CHARS: usize = 150;

const PATH_MARKERS: &[&str] = &["/users/", "/home/", "/tmp/"];

const PROJECT_MARKERS: &[&str] = &["project:", "repo:"];

const PACKAGE_MARKERS: &[&str] = &["package:", "library:", "dependency:"];

const DECISION_KEYWORDS: &[&str] = &[
    "decided",
    "chose",
    "using",
    "will use",
    "implemented",
    "created",
    "added",
    "renamed",
    "changed to",
    "switched to",
];

static PATH_PATTERN: OnceLock<Option<Regex>> = OnceLock::new();

fn path_pattern() -> Option<&'static Regex> {
    PATH_PATTERN
        .get_or_init(|| Regex::new(r#"/[^\s'"`]+"#).ok())
        .as_ref()
}

/// Outcome of one compaction pass
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct CompactionReport {
    /// Old messages distilled for the first time in this pass
    pub processed: usize,
    pub facts: usize,
    pub decisions: usize,
    /// False when the summary call failed and the placeholder was stored
    pub summarized: bool,
    /// Tokens spent on the summary call
    pub tokens_used: u64,
}

pub struct Compactor {
    provider: Arc<dyn LLMProvider>,
    model: String,
    threshold_tokens: usize,
    keep_recent: usize,
}

impl Compactor {
    pub fn new(
        provider: Arc<dyn LLMProvider>,
        model: impl Into<String>,
        threshold_tokens: usize,
        keep_recent: usize,
    ) -> Self {
        Self {
            provider,
            model: model.into(),
            threshold_tokens,
            keep_recent,
        }
    }

    pub fn should_compact(&self, memory: &SessionMemory) -> bool {
        memory.estimate_tokens() > self.threshold_tokens
    }

    /// Compact everything older than the newest `keep_recent` messages.
    ///
    /// Returns `None` when no message has aged out since the last pass. A
    /// failed or empty summary is not an error: the placeholder summary is
    /// stored and the extracted facts and decisions are still merged.
    pub async fn compact(&self, memory: &mut SessionMemory) -> Option<CompactionReport> {
        let history = memory.history();
        let old_end = history.len().saturating_sub(self.keep_recent);
        let fresh_from = memory.compacted_upto();
        if old_end <= fresh_from {
            tracing::debug!(
                messages = history.len(),
                compacted_upto = fresh_from,
                "Nothing new to compact"
            );
            return None;
        }

        let old = &history[..old_end];
        let fresh = &history[fresh_from..old_end];
        tracing::info!(
            session_id = %memory.session_id(),
            old_messages = old.len(),
            new_messages = fresh.len(),
            "Compacting conversation history"
        );

        let (summary, tokens_used) = match self.summarize(old).await {
            Ok((summary, tokens)) if !summary.is_empty() => (summary, tokens),
            Ok((_, tokens)) => {
                tracing::warn!("Summarization returned no text");
                (SUMMARY_UNAVAILABLE.to_string(), tokens)
            }
            Err(e) => {
                tracing::warn!("Summarization failed: {}", e);
                (SUMMARY_UNAVAILABLE.to_string(), 0)
            }
        };
        let summarized = summary != SUMMARY_UNAVAILABLE;

        let extracted = extract_facts(fresh);
        let decisions = extract_decisions(fresh);
        let report = CompactionReport {
            processed: fresh.len(),
            facts: extracted.facts.len(),
            decisions: decisions.len(),
            summarized,
            tokens_used,
        };

        let ws = memory.working_set_mut();
        ws.summary = summary;
        ws.pinned_facts.extend(extracted.facts);
        ws.files_touched.extend(extracted.paths);
        ws.decisions.extend(decisions);
        memory.mark_compacted(old_end);

        tracing::info!(
            facts = report.facts,
            decisions = report.decisions,
            compacted_upto = old_end,
            summarized,
            "Compaction finished"
        );

        Some(report)
    }

    async fn summarize(&self, old: &[Message]) -> crate::llm::Result<(String, u64)> {
        let window = &old[old.len().saturating_sub(MAX_SUMMARY_MESSAGES)..];
        let conversation = window
            .iter()
            .map(|m| {
                let content: String = m.content.chars().take(MAX_SUMMARY_CHARS).collect();
                format!("{}: {}", m.role, content)
            })
            .collect::<Vec<_>>()
            .join("\n\n");

        let prompt = format!(
            "Summarize this conversation in 3-5 sentences. Focus on:\n\
             - What the user is trying to accomplish (main goal/project)\n\
             - Key decisions made\n\
             - Important context for future work\n\
             - Current state/progress\n\n\
             Conversation:\n{}\n\n\
             Concise summary (3-5 sentences):",
            conversation
        );

        let request = ModelRequest::single_turn(&self.model, "", prompt, SUMMARY_MAX_TOKENS);
        let response = self.provider.complete(&request).await?;
        let summary = response.text().trim().to_string();

        Ok((summary, response.usage.total()))
    }
}

struct ExtractedFacts {
    facts: Vec<String>,
    paths: Vec<String>,
}

/// Keep first occurrences, drop repeats, cap the length
fn dedup_capped(items: Vec<String>, cap: usize) -> Vec<String> {
    let mut seen = BTreeSet::new();
    items
        .into_iter()
        .filter(|item| seen.insert(item.clone()))
        .take(cap)
        .collect()
}

fn lines_containing(content: &str, words: &[&str]) -> Vec<String> {
    content
        .lines()
        .filter(|line| {
            let lower = line.to_lowercase();
            words.iter().any(|w| lower.contains(w))
        })
        .map(|line| line.trim().to_string())
        .filter(|line| !line.is_empty())
        .take(2)
        .collect()
}

fn extract_facts(messages: &[Message]) -> ExtractedFacts {
    let mut facts = Vec::new();
    let mut paths = Vec::new();

    for msg in messages {
        let lower = msg.content.to_lowercase();

        if PATH_MARKERS.iter().any(|m| lower.contains(m)) {
            if let Some(pattern) = path_pattern() {
                for found in pattern.find_iter(&msg.content).take(3) {
                    let path = found.as_str();
                    if path.chars().count() > 10 {
                        facts.push(format!("File: {}", path));
                        paths.push(path.to_string());
                    }
                }
            }
        }

        if PROJECT_MARKERS.iter().any(|m| lower.contains(m)) {
            facts.extend(lines_containing(&msg.content, &["project", "repo"]));
        }

        if PACKAGE_MARKERS.iter().any(|m| lower.contains(m)) {
            facts.extend(lines_containing(
                &msg.content,
                &["package", "library", "dependency"],
            ));
        }
    }

    ExtractedFacts {
        facts: dedup_capped(facts, MAX_EXTRACTED),
        paths: dedup_capped(paths, MAX_EXTRACTED),
    }
}

fn extract_decisions(messages: &[Message]) -> Vec<String> {
    let mut decisions = Vec::new();

    for msg in messages {
        let lower = msg.content.to_lowercase();
        if !DECISION_KEYWORDS.iter().any(|k| lower.contains(k)) {
            continue;
        }

        let found = msg
            .content
            .split('.')
            .map(str::trim)
            .filter(|s| !s.is_empty())
            .filter(|s| {
                let lower = s.to_lowercase();
                DECISION_KEYWORDS.iter().any(|k| lower.contains(k))
                    && s.chars().count() < MAX_DECISION_CHARS
            })
            .take(2)
            .map(String::from);
        decisions.extend(found);
    }

    dedup_capped(decisions, MAX_EXTRACTED)
}
