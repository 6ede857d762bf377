//! Runtime context
//!
//! Everything an agent run needs that is not per-session state: config, tool
//! catalog, model provider, audit log and the security gate. Built once at
//! startup and shared read-only.

use std::sync::Arc;

use crate::config::Config;
use crate::db::AuditLog;
use crate::llm::LLMProvider;
use crate::security::{ApprovalGate, Approver, InjectionGuard};
use crate::tools::ToolRegistry;

pub struct RuntimeContext {
    pub config: Arc<Config>,
    pub tools: Arc<ToolRegistry>,
    pub provider: Arc<dyn LLMProvider>,
    pub audit: AuditLog,
    pub guard: InjectionGuard,
    pub approvals: ApprovalGate,
}

impl RuntimeContext {
    pub fn new(
        config: Arc<Config>,
        tools: Arc<ToolRegistry>,
        provider: Arc<dyn LLMProvider>,
        audit: AuditLog,
        approver: Arc<dyn Approver>,
    ) -> anyhow::Result<Self> {
        let approvals = ApprovalGate::new(config.security.hitl_required_actions.clone(), approver);

        Ok(Self {
            guard: InjectionGuard::new()?,
            approvals,
            config,
            tools,
            provider,
            audit,
        })
    }

    /// Whether a call to `tool` must be approved by a human first
    pub fn requires_hitl(&self, tool: &str) -> bool {
        let flagged = self
            .tools
            .get(tool)
            .map(|t| t.spec.requires_hitl)
            .unwrap_or(false);
        flagged || self.approvals.requires_approval(tool)
    }
}
