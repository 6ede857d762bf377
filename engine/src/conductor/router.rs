//! Request routing
//!
//! The router model answers with a small JSON object naming the specialist.
//! Its output is parsed leniently: a markdown code fence is stripped first,
//! and anything that still fails to parse routes back to the commander.

use serde::{Deserialize, Serialize};

use crate::agent::AgentKind;

pub const ROUTING_SYSTEM: &str = "\
You are the Commander, the orchestrator of a team of AI specialists.

Your team:
- developer: writing code, reviewing changes, debugging, git operations
- researcher: web research, document analysis, fact-finding, summarization
- writer: blog posts, documentation, emails, creative content
- analyst: data analysis, metrics, business insights
- commander: coordination, planning, anything that needs several agents

Given a user request, respond ONLY with valid JSON:
{\"agent\": \"<agent_name>\", \"task\": \"<clear task description for that agent>\", \"reason\": \"<one-line explanation>\"}

Rules:
- If the task needs several agents, pick the most important one first
- Be specific in the task description; the agent sees only what you write
- Never pick an agent for a task it is not suited for";

/// Output cap for the routing call
pub const ROUTING_MAX_TOKENS: u32 = 300;

pub const PARSE_FALLBACK: &str = "fallback: could not parse routing";
pub const CALL_FALLBACK: &str = "fallback: routing call failed";

/// Where a request goes
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct Route {
    pub agent: String,
    pub task: String,
    pub reason: String,
}

impl Route {
    /// The commander handles the original input itself
    pub fn fallback(input: &str, reason: &str) -> Self {
        Self {
            agent: AgentKind::Commander.as_str().to_string(),
            task: input.to_string(),
            reason: reason.to_string(),
        }
    }
}

#[derive(Debug, Deserialize)]
struct RawRoute {
    agent: String,
    task: String,
    reason: String,
}

/// Strip a surrounding markdown code fence, with or without a language tag
pub fn strip_code_fence(text: &str) -> &str {
    let trimmed = text.trim();
    let Some(rest) = trimmed.strip_prefix("```") else {
        return trimmed;
    };

    // Drop the rest of the opening line (the language tag)
    let body = match rest.find('\n') {
        Some(idx) => &rest[idx + 1..],
        None => rest,
    };
    let body = body.trim_end();
    body.strip_suffix("```").unwrap_or(body).trim()
}

/// Parse the router's answer, falling back to the commander on bad output
pub fn parse_route(raw: &str, input: &str) -> Route {
    match serde_json::from_str::<RawRoute>(strip_code_fence(raw)) {
        Ok(parsed) if !parsed.agent.trim().is_empty() && !parsed.task.trim().is_empty() => Route {
            agent: parsed.agent.trim().to_lowercase(),
            task: parsed.task,
            reason: parsed.reason,
        },
        Ok(_) => {
            tracing::warn!("Routing answer has an empty agent or task");
            Route::fallback(input, PARSE_FALLBACK)
        }
        Err(e) => {
            tracing::warn!("Failed to parse routing answer: {}", e);
            Route::fallback(input, PARSE_FALLBACK)
        }
    }
}
