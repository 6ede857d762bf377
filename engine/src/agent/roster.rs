//! Agent roster
//!
//! Each agent is a data record (name, role, model, system prompt, allowed
//! tools). Behavior is shared: every agent runs through the same execution
//! loop, and its allowed tool list is the only authorization boundary for
//! tool calls.

use serde::{Deserialize, Serialize};
use std::fmt;
use std::str::FromStr;

use crate::config::LLMConfig;

/// Fixed set of agents on the team
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum AgentKind {
    Commander,
    Developer,
    Researcher,
    Writer,
    Analyst,
}

impl AgentKind {
    pub const ALL: [AgentKind; 5] = [
        AgentKind::Commander,
        AgentKind::Developer,
        AgentKind::Researcher,
        AgentKind::Writer,
        AgentKind::Analyst,
    ];

    pub fn as_str(&self) -> &'static str {
        match self {
            AgentKind::Commander => "commander",
            AgentKind::Developer => "developer",
            AgentKind::Researcher => "researcher",
            AgentKind::Writer => "writer",
            AgentKind::Analyst => "analyst",
        }
    }

    fn role(&self) -> &'static str {
        match self {
            AgentKind::Commander => "Orchestrator",
            AgentKind::Developer => "Software Engineer",
            AgentKind::Researcher => "Research Specialist",
            AgentKind::Writer => "Content & Technical Writer",
            AgentKind::Analyst => "Data & Business Analyst",
        }
    }

    fn description(&self) -> &'static str {
        match self {
            AgentKind::Commander => {
                "Routes requests to the right specialist and handles cross-cutting work."
            }
            AgentKind::Developer => "Writes and debugs code, runs commands, works with git.",
            AgentKind::Researcher => "Finds, reads and summarizes information and documents.",
            AgentKind::Writer => "Writes documentation, articles, emails and other prose.",
            AgentKind::Analyst => "Analyzes data, metrics and business questions.",
        }
    }

    fn allowed_tools(&self) -> &'static [&'static str] {
        match self {
            AgentKind::Commander => &[],
            AgentKind::Developer => &[
                "file_read",
                "file_write",
                "file_delete",
                "file_rename",
                "directory_list",
                "grep_search",
                "shell_exec",
            ],
            AgentKind::Researcher => &["file_read", "directory_list", "grep_search"],
            AgentKind::Writer => &[
                "file_read",
                "file_write",
                "file_rename",
                "directory_list",
                "grep_search",
            ],
            AgentKind::Analyst => &["file_read", "grep_search"],
        }
    }

    fn system_prompt(&self) -> &'static str {
        match self {
            AgentKind::Commander => COMMANDER_PROMPT,
            AgentKind::Developer => DEVELOPER_PROMPT,
            AgentKind::Researcher => RESEARCHER_PROMPT,
            AgentKind::Writer => WRITER_PROMPT,
            AgentKind::Analyst => ANALYST_PROMPT,
        }
    }

    /// Build the profile, picking the model for this agent's tier
    pub fn profile(&self, llm: &LLMConfig) -> AgentProfile {
        let model = match self {
            AgentKind::Commander => llm.commander_model.clone(),
            _ => llm.specialist_model.clone(),
        };

        AgentProfile {
            kind: *self,
            name: self.as_str().to_string(),
            role: self.role().to_string(),
            model,
            system_prompt: self.system_prompt().to_string(),
            allowed_tools: self.allowed_tools().iter().map(|s| s.to_string()).collect(),
            description: self.description().to_string(),
        }
    }
}

impl fmt::Display for AgentKind {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

impl FromStr for AgentKind {
    type Err = String;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        let lower = s.trim().to_lowercase();
        AgentKind::ALL
            .into_iter()
            .find(|kind| kind.as_str() == lower)
            .ok_or_else(|| format!("Unknown agent '{}'", s))
    }
}

/// Everything the execution loop needs to know about an agent
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct AgentProfile {
    pub kind: AgentKind,
    pub name: String,
    pub role: String,
    pub model: String,
    pub system_prompt: String,
    /// Tool names this agent may call, in catalog order
    pub allowed_tools: Vec<String>,
    pub description: String,
}

impl AgentProfile {
    pub fn allows(&self, tool: &str) -> bool {
        self.allowed_tools.iter().any(|t| t == tool)
    }
}

/// Profiles of the whole team
pub fn team(llm: &LLMConfig) -> Vec<AgentProfile> {
    AgentKind::ALL.iter().map(|kind| kind.profile(llm)).collect()
}

const COMMANDER_PROMPT: &str = "\
You are the Commander of a small team of AI specialists working for one user.

You handle requests that do not fit a single specialist: planning, coordination,
and questions that span several areas. Be direct and concise.

Risky actions always need human approval. When something fails, say so plainly.";

const DEVELOPER_PROMPT: &str = "\
You are the Developer on the team: a pragmatic senior software engineer.

You write, review and debug code, run commands, and manage repositories.
Read before you write. Prefer small, verifiable changes and explain what you
changed. Commands that modify the system require human approval; if a call is
rejected, propose an alternative instead of retrying the same call.";

const RESEARCHER_PROMPT: &str = "\
You are the Researcher on the team.

You gather facts from files and sources, compare them, and summarize what you
found. Distinguish clearly between what a source states and what you infer.
Cite file paths or sources for every claim.";

const WRITER_PROMPT: &str = "\
You are the Writer on the team.

You produce documentation, articles, emails and reports. Clear beats clever:
active voice, short sentences, structure before prose. Match the requested
format exactly and deliver finished text, not a rough draft.";

const ANALYST_PROMPT: &str = "\
You are the Analyst on the team.

You work through data, metrics and business questions. State your assumptions,
show how you reached each number, and end with the conclusion that matters
most to the user.";
