//! Commander
//!
//! Entry point for every user request in a session. Guards the raw input,
//! checks the budget, compacts memory when needed, routes and finally runs
//! the chosen agent with the working set as context.

use serde::Serialize;
use std::str::FromStr;
use std::sync::Arc;
use std::time::Duration;
use tokio::time::timeout;
use tracing::{info, warn};

use sdk::errors::EngineError;

use super::router::{parse_route, Route, CALL_FALLBACK, ROUTING_MAX_TOKENS, ROUTING_SYSTEM};
use crate::agent::executor::block_input;
use crate::agent::{team, AgentKind, AgentProfile, AgentResult, ExecutionLoop, RuntimeContext};
use crate::db::{audit_error, ActionType, AuditEntry};
use crate::llm::{LLMError, ModelRequest, ModelResponse};
use crate::memory::compactor::{CompactionReport, Compactor};
use crate::session::Session;

/// Agent name used for compaction records in the audit log
const COMPACTOR_AGENT: &str = "compactor";

/// Outcome of one dispatched request
#[derive(Debug, Clone, Serialize)]
pub struct Dispatch {
    /// `None` when the input was blocked before routing
    pub route: Option<Route>,
    pub result: AgentResult,
    #[serde(skip)]
    pub compaction: Option<CompactionReport>,
}

pub struct Commander {
    ctx: Arc<RuntimeContext>,
    commander: AgentProfile,
    specialists: Vec<AgentProfile>,
    compactor: Compactor,
}

impl Commander {
    pub fn new(ctx: Arc<RuntimeContext>) -> Self {
        let commander = AgentKind::Commander.profile(&ctx.config.llm);
        let specialists = team(&ctx.config.llm)
            .into_iter()
            .filter(|p| p.kind != AgentKind::Commander)
            .collect();

        let compactor = Compactor::new(
            Arc::clone(&ctx.provider),
            ctx.config.llm.summary_model.clone(),
            ctx.config.memory.compaction_threshold_tokens,
            ctx.config.memory.live_window,
        );

        Self {
            ctx,
            commander,
            specialists,
            compactor,
        }
    }

    pub fn context(&self) -> &RuntimeContext {
        &self.ctx
    }

    /// Commander first, then the specialists
    pub fn profiles(&self) -> impl Iterator<Item = &AgentProfile> {
        std::iter::once(&self.commander).chain(self.specialists.iter())
    }

    /// Profile for a routed agent name; unknown names get the commander
    pub fn profile_for(&self, name: &str) -> &AgentProfile {
        AgentKind::from_str(name)
            .ok()
            .and_then(|kind| self.specialists.iter().find(|p| p.kind == kind))
            .unwrap_or(&self.commander)
    }

    /// Classify a request. Never fails on bad model output; only audit
    /// failures surface as errors.
    pub async fn route(&self, session: &mut Session, input: &str) -> Result<Route, EngineError> {
        let request = ModelRequest::single_turn(
            self.ctx.config.llm.router_model.clone(),
            ROUTING_SYSTEM,
            input,
            ROUTING_MAX_TOKENS,
        );

        let response = match self.call(&request).await {
            Ok(response) => response,
            Err(e) => {
                warn!(session_id = %session.id, "Routing call failed: {}", e);
                return Ok(Route::fallback(input, CALL_FALLBACK));
            }
        };

        let tokens = response.usage.total();
        session.ledger.record(tokens);

        let raw = response.text();
        self.ctx
            .audit
            .log_action(
                AuditEntry::new(&session.id, &self.commander.name, ActionType::LlmCall, input)
                    .approved(true)
                    .result(raw.as_str())
                    .tokens(tokens),
            )
            .await
            .map_err(audit_error)?;

        Ok(parse_route(&raw, input))
    }

    /// Handle one user request end to end
    pub async fn dispatch(
        &self,
        session: &mut Session,
        input: &str,
    ) -> Result<Dispatch, EngineError> {
        // Blocked input must not reach any model, the router included
        let input = match self.ctx.guard.validate(input) {
            Ok(input) => input,
            Err(e) => {
                let result = block_input(
                    &self.ctx.audit,
                    &session.id,
                    &self.commander.name,
                    input,
                    e,
                )
                .await?;
                return Ok(Dispatch {
                    route: None,
                    result,
                    compaction: None,
                });
            }
        };

        session.ledger.check_run_budget(0)?;

        let compaction = if self.compactor.should_compact(&session.memory) {
            self.compact(session).await?
        } else {
            None
        };

        let route = self.route(session, input).await?;
        let profile = self.profile_for(&route.agent);
        info!(
            session_id = %session.id,
            agent = %profile.name,
            reason = %route.reason,
            "Routing request"
        );

        let context = session.memory.working_set().render();
        let result = ExecutionLoop::new(&self.ctx, profile)
            .run(session, &route.task, &context)
            .await?;

        Ok(Dispatch {
            route: Some(route),
            result,
            compaction,
        })
    }

    async fn compact(
        &self,
        session: &mut Session,
    ) -> Result<Option<CompactionReport>, EngineError> {
        let Some(report) = self.compactor.compact(&mut session.memory).await else {
            return Ok(None);
        };

        if report.tokens_used > 0 {
            session.ledger.record(report.tokens_used);
        }

        self.ctx
            .audit
            .log_action(
                AuditEntry::new(
                    &session.id,
                    COMPACTOR_AGENT,
                    ActionType::LlmCall,
                    format!("compact {} messages", report.processed),
                )
                .approved(report.summarized)
                .result(format!(
                    "{} facts, {} decisions extracted",
                    report.facts, report.decisions
                ))
                .tokens(report.tokens_used),
            )
            .await
            .map_err(audit_error)?;

        Ok(Some(report))
    }

    async fn call(&self, request: &ModelRequest) -> Result<ModelResponse, LLMError> {
        let secs = self.ctx.config.llm.request_timeout_secs;
        match timeout(Duration::from_secs(secs), self.ctx.provider.complete(request)).await {
            Ok(result) => result,
            Err(_) => Err(LLMError::Timeout(secs)),
        }
    }
}
