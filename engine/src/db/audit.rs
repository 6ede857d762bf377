//! Append-only audit log
//!
//! Every action an agent takes (model call, tool call, blocked input, human
//! decision) lands here as one row. Rows are never updated or deleted; a
//! session's history is read back ordered by timestamp.

use anyhow::{Context, Result};
use chrono::{SecondsFormat, Utc};
use serde::{Deserialize, Serialize};
use sqlx::{Row, SqlitePool};
use std::fmt;
use std::str::FromStr;

use crate::secrets;

/// Max characters kept from an action description
pub const ACTION_MAX_CHARS: usize = 200;

/// Max characters kept from a result text
pub const RESULT_MAX_CHARS: usize = 500;

/// Kind of audited action
#[derive(Debug, Clone, Copy, Serialize, Deserialize, PartialEq, Eq)]
#[serde(rename_all = "snake_case")]
pub enum ActionType {
    LlmCall,
    ToolCall,
    SecurityBlock,
    HitlApproval,
}

impl ActionType {
    pub fn as_str(&self) -> &'static str {
        match self {
            ActionType::LlmCall => "llm_call",
            ActionType::ToolCall => "tool_call",
            ActionType::SecurityBlock => "security_block",
            ActionType::HitlApproval => "hitl_approval",
        }
    }
}

impl fmt::Display for ActionType {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

impl FromStr for ActionType {
    type Err = anyhow::Error;

    fn from_str(s: &str) -> Result<Self> {
        match s {
            "llm_call" => Ok(ActionType::LlmCall),
            "tool_call" => Ok(ActionType::ToolCall),
            "security_block" => Ok(ActionType::SecurityBlock),
            "hitl_approval" => Ok(ActionType::HitlApproval),
            other => anyhow::bail!("Unknown audit action type '{}'", other),
        }
    }
}

/// A record about to be appended
#[derive(Debug, Clone)]
pub struct AuditEntry {
    pub session_id: String,
    pub agent: String,
    pub action_type: ActionType,
    pub action: String,
    /// `None` when approval does not apply
    pub approved: Option<bool>,
    pub result: String,
    pub tokens_used: u64,
}

impl AuditEntry {
    pub fn new(
        session_id: impl Into<String>,
        agent: impl Into<String>,
        action_type: ActionType,
        action: impl Into<String>,
    ) -> Self {
        Self {
            session_id: session_id.into(),
            agent: agent.into(),
            action_type,
            action: action.into(),
            approved: None,
            result: String::new(),
            tokens_used: 0,
        }
    }

    pub fn approved(mut self, approved: bool) -> Self {
        self.approved = Some(approved);
        self
    }

    pub fn result(mut self, result: impl Into<String>) -> Self {
        self.result = result.into();
        self
    }

    pub fn tokens(mut self, tokens: u64) -> Self {
        self.tokens_used = tokens;
        self
    }
}

/// A stored audit row
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
pub struct AuditRecord {
    pub id: i64,
    pub timestamp: String,
    pub session_id: String,
    pub agent: String,
    pub action_type: ActionType,
    pub action: String,
    pub approved: Option<bool>,
    pub result: String,
    pub tokens_used: u64,
}

/// Handle to the audit table; cheap to clone
#[derive(Clone)]
pub struct AuditLog {
    pool: SqlitePool,
}

fn truncate_chars(text: &str, max: usize) -> String {
    match text.char_indices().nth(max) {
        Some((idx, _)) => text[..idx].to_string(),
        None => text.to_string(),
    }
}

impl AuditLog {
    pub fn new(pool: SqlitePool) -> Self {
        Self { pool }
    }

    /// Append one record. Credentials are scrubbed before truncation.
    pub async fn log_action(&self, entry: AuditEntry) -> Result<i64> {
        let ts = Utc::now().to_rfc3339_opts(SecondsFormat::Micros, true);
        let action = truncate_chars(&secrets::scrub(&entry.action), ACTION_MAX_CHARS);
        let result = truncate_chars(&secrets::scrub(&entry.result), RESULT_MAX_CHARS);
        let tokens = i64::try_from(entry.tokens_used).unwrap_or(i64::MAX);

        let inserted = sqlx::query(
            r#"
            INSERT INTO audit_log (ts, session_id, agent, action_type, action, approved, result, tokens_used)
            VALUES (?, ?, ?, ?, ?, ?, ?, ?)
            "#,
        )
        .bind(&ts)
        .bind(&entry.session_id)
        .bind(&entry.agent)
        .bind(entry.action_type.as_str())
        .bind(&action)
        .bind(entry.approved)
        .bind(&result)
        .bind(tokens)
        .execute(&self.pool)
        .await
        .context("Failed to append audit record")?;

        let id = inserted.last_insert_rowid();

        tracing::debug!(
            session_id = %entry.session_id,
            agent = %entry.agent,
            action_type = %entry.action_type,
            approved = ?entry.approved,
            "Audit record {}",
            id
        );

        Ok(id)
    }

    /// All records of a session, oldest first
    pub async fn get_session_logs(&self, session_id: &str) -> Result<Vec<AuditRecord>> {
        let rows = sqlx::query(
            r#"
            SELECT id, ts, session_id, agent, action_type, action, approved, result, tokens_used
            FROM audit_log
            WHERE session_id = ?
            ORDER BY ts ASC, id ASC
            "#,
        )
        .bind(session_id)
        .fetch_all(&self.pool)
        .await
        .context("Failed to fetch audit records")?;

        rows.into_iter()
            .map(|row| {
                let action_type: String = row.get("action_type");
                let tokens: i64 = row.get("tokens_used");
                Ok(AuditRecord {
                    id: row.get("id"),
                    timestamp: row.get("ts"),
                    session_id: row.get("session_id"),
                    agent: row.get("agent"),
                    action_type: action_type.parse()?,
                    action: row.get("action"),
                    approved: row.get::<Option<bool>, _>("approved"),
                    result: row.get("result"),
                    tokens_used: u64::try_from(tokens).unwrap_or(0),
                })
            })
            .collect()
    }
}
