//! Human-in-the-loop approval
//!
//! Decisions are fail-closed: anything other than an explicit yes is a no.
//! Every decision is written to the audit log before it is returned.

use async_trait::async_trait;
use sdk::errors::EngineError;
use std::collections::BTreeSet;
use std::io::{self, BufRead, Write};
use std::sync::Arc;

use crate::db::{audit_error, ActionType, AuditEntry, AuditLog};

/// What the human is asked to approve
#[derive(Debug, Clone)]
pub struct ApprovalRequest {
    pub session_id: String,
    pub agent: String,
    /// Action type; for tool calls this is the tool name
    pub action_type: String,
    pub details: String,
}

/// Something that can answer an approval request
#[async_trait]
pub trait Approver: Send + Sync {
    async fn approve(&self, request: &ApprovalRequest) -> bool;
}

/// Asks on the controlling terminal
pub struct TerminalApprover;

fn is_yes(answer: &str) -> bool {
    matches!(answer.trim().to_lowercase().as_str(), "y" | "yes")
}

#[async_trait]
impl Approver for TerminalApprover {
    async fn approve(&self, request: &ApprovalRequest) -> bool {
        let prompt = format!(
            "\n[Approval required] {} wants to run '{}'\n  {}\nApprove? [y/N]: ",
            request.agent, request.action_type, request.details
        );

        let answer = tokio::task::spawn_blocking(move || {
            let mut stderr = io::stderr();
            let _ = stderr.write_all(prompt.as_bytes());
            let _ = stderr.flush();

            let mut line = String::new();
            match io::stdin().lock().read_line(&mut line) {
                Ok(_) => line,
                Err(_) => String::new(),
            }
        })
        .await;

        match answer {
            Ok(line) => is_yes(&line),
            Err(e) => {
                tracing::error!("Approval prompt failed: {}", e);
                false
            }
        }
    }
}

/// Fixed answer, used when no human is attached
pub struct StaticApprover(pub bool);

#[async_trait]
impl Approver for StaticApprover {
    async fn approve(&self, _request: &ApprovalRequest) -> bool {
        self.0
    }
}

/// Policy plus the approver that enforces it
pub struct ApprovalGate {
    required: BTreeSet<String>,
    approver: Arc<dyn Approver>,
}

impl ApprovalGate {
    pub fn new(required: BTreeSet<String>, approver: Arc<dyn Approver>) -> Self {
        Self { required, approver }
    }

    /// Whether `action_type` always needs a human decision
    pub fn requires_approval(&self, action_type: &str) -> bool {
        self.required.contains(action_type)
    }

    /// Ask for a decision and record it.
    ///
    /// The decision is known and audited before the caller proceeds.
    pub async fn request_approval(
        &self,
        audit: &AuditLog,
        request: &ApprovalRequest,
    ) -> Result<bool, EngineError> {
        let approved = self.approver.approve(request).await;

        tracing::info!(
            session_id = %request.session_id,
            agent = %request.agent,
            action = %request.action_type,
            approved,
            "Human approval decision"
        );

        audit
            .log_action(
                AuditEntry::new(
                    &request.session_id,
                    &request.agent,
                    ActionType::HitlApproval,
                    format!("{}: {}", request.action_type, request.details),
                )
                .approved(approved)
                .result(if approved { "approved" } else { "rejected_by_user" }),
            )
            .await
            .map_err(audit_error)?;

        Ok(approved)
    }
}
