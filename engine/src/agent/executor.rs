//! Agent execution loop
//!
//! One run drives one agent from a submitted task to a final text answer:
//!
//! 1. Validate the task against the injection guard. A blocked task is
//!    audited and returned as a failure without any model call.
//! 2. Check the session budget.
//! 3. Call the model with the live memory window, the new prompt and the
//!    catalog of tools this agent may use.
//! 4. While the model asks for tools, and at most `max_agent_turns` times:
//!    run each requested call (permission check, human approval when
//!    required, execution), feed the results back, re-check the budget and
//!    call the model again.
//! 5. Store prompt and answer in memory, record the run's tokens and write
//!    one `llm_call` audit record.
//!
//! Tool failures never abort a run; they go back to the model as error
//! results. Budget exhaustion is returned as an error. A transport failure
//! ends the run with a failed [`AgentResult`] and is not retried.

use serde::Serialize;
use std::collections::BTreeMap;
use std::time::Duration;
use tokio::time::timeout;
use tracing::{debug, info, warn};

use sdk::errors::EngineError;
use sdk::ToolSpec;

use super::{AgentProfile, RuntimeContext};
use crate::db::{audit_error, ActionType, AuditEntry, AuditLog};
use crate::llm::{
    ChatMessage, ContentBlock, LLMError, Message, MessageRole, ModelRequest, ModelResponse,
};
use crate::security::ApprovalRequest;
use crate::session::Session;

/// Tool result fed back when a human refuses a call
pub const REJECTED_BY_HUMAN: &str = "Rejected by human approval gate.";

/// Final output when the model still wants tools after the last allowed turn
pub const TURN_CAP_REACHED: &str = "Stopped after reaching max tool-use turns.";

/// Final output when the model answered without any text
pub const NO_TEXT_RESPONSE: &str = "(no text response)";

/// Outcome of one agent run
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct AgentResult {
    pub success: bool,
    pub content: String,
    pub tokens_used: u64,
    pub metadata: BTreeMap<String, serde_json::Value>,
}

impl AgentResult {
    pub fn success(content: impl Into<String>, tokens_used: u64) -> Self {
        Self {
            success: true,
            content: content.into(),
            tokens_used,
            metadata: BTreeMap::new(),
        }
    }

    pub fn failure(content: impl Into<String>) -> Self {
        Self {
            success: false,
            content: content.into(),
            tokens_used: 0,
            metadata: BTreeMap::new(),
        }
    }

    pub fn with_meta(mut self, key: &str, value: impl Into<serde_json::Value>) -> Self {
        self.metadata.insert(key.to_string(), value.into());
        self
    }
}

/// Prompt sent for a task, prefixed with context when there is any
pub fn build_prompt(task: &str, context: &str) -> String {
    if context.is_empty() {
        task.to_string()
    } else {
        format!("Context:\n{}\n\nTask:\n{}", context, task)
    }
}

/// Audit a blocked input and build the failure result
pub(crate) async fn block_input(
    audit: &AuditLog,
    session_id: &str,
    agent: &str,
    task: &str,
    err: EngineError,
) -> Result<AgentResult, EngineError> {
    audit
        .log_action(
            AuditEntry::new(session_id, agent, ActionType::SecurityBlock, task)
                .approved(false)
                .result(err.to_string()),
        )
        .await
        .map_err(audit_error)?;

    Ok(AgentResult::failure(format!("[Security] {}", err)).with_meta("agent", agent))
}

/// Runs one agent profile against one session
pub struct ExecutionLoop<'a> {
    ctx: &'a RuntimeContext,
    profile: &'a AgentProfile,
}

impl<'a> ExecutionLoop<'a> {
    pub fn new(ctx: &'a RuntimeContext, profile: &'a AgentProfile) -> Self {
        Self { ctx, profile }
    }

    pub async fn run(
        &self,
        session: &mut Session,
        task: &str,
        context: &str,
    ) -> Result<AgentResult, EngineError> {
        let agent = self.profile.name.as_str();
        let session_id = session.id.clone();

        let safe_task = match self.ctx.guard.validate(task) {
            Ok(task) => task,
            Err(e) => return block_input(&self.ctx.audit, &session_id, agent, task, e).await,
        };

        session.ledger.check_run_budget(0)?;

        info!(session_id = %session_id, agent, "Starting run");

        let prompt = build_prompt(safe_task, context);
        let tools = self.ctx.tools.catalog_for(&self.profile.allowed_tools);
        let mut messages: Vec<ChatMessage> =
            session.memory.messages().iter().map(ChatMessage::from).collect();
        messages.push(ChatMessage::from(&Message::user(prompt.as_str())));

        let max_turns = self.ctx.config.budget.max_agent_turns;
        let mut total_tokens = 0u64;
        let mut turns = 0usize;

        let mut response = match self.call_model(&messages, &tools).await {
            Ok(response) => response,
            Err(e) => return self.transport_failure(session, safe_task, e, total_tokens).await,
        };
        total_tokens += response.usage.total();

        while response.wants_tools() && turns < max_turns {
            if response.tool_uses().next().is_none() {
                warn!(agent, "Model asked for tools without any tool_use block");
                break;
            }

            let results = self.run_tool_calls(&session_id, &response).await?;
            messages.push(ChatMessage::assistant_blocks(response.content.clone()));
            messages.push(ChatMessage::user_blocks(results));
            turns += 1;

            // The run's own usage is not in the ledger yet; count it here
            if let Err(e) = session.ledger.check_run_budget(total_tokens) {
                session.ledger.record(total_tokens);
                return Err(e);
            }

            response = match self.call_model(&messages, &tools).await {
                Ok(response) => response,
                Err(e) => {
                    return self
                        .transport_failure(session, safe_task, e, total_tokens)
                        .await
                }
            };
            total_tokens += response.usage.total();
        }

        let output = if response.wants_tools() && turns >= max_turns {
            TURN_CAP_REACHED.to_string()
        } else {
            let text = response.text();
            if text.trim().is_empty() {
                NO_TEXT_RESPONSE.to_string()
            } else {
                text
            }
        };

        session.memory.append(MessageRole::User, prompt);
        session.memory.append(MessageRole::Assistant, output.as_str());
        session
            .memory
            .trim_to_last(self.ctx.config.memory.live_window);
        session.ledger.record(total_tokens);

        self.ctx
            .audit
            .log_action(
                AuditEntry::new(&session_id, agent, ActionType::LlmCall, safe_task)
                    .approved(true)
                    .result(output.as_str())
                    .tokens(total_tokens),
            )
            .await
            .map_err(audit_error)?;

        info!(
            session_id = %session_id,
            agent,
            turns,
            tokens = total_tokens,
            "Run finished"
        );

        Ok(AgentResult::success(output, total_tokens)
            .with_meta("agent", agent)
            .with_meta("model", self.profile.model.as_str())
            .with_meta("turns", turns))
    }

    async fn call_model(
        &self,
        messages: &[ChatMessage],
        tools: &[ToolSpec],
    ) -> Result<ModelResponse, LLMError> {
        let request = ModelRequest {
            model: self.profile.model.clone(),
            system: self.profile.system_prompt.clone(),
            messages: messages.to_vec(),
            tools: tools.to_vec(),
            max_tokens: self.ctx.config.llm.max_tokens_per_run,
        };

        let secs = self.ctx.config.llm.request_timeout_secs;
        match timeout(Duration::from_secs(secs), self.ctx.provider.complete(&request)).await {
            Ok(result) => result,
            Err(_) => Err(LLMError::Timeout(secs)),
        }
    }

    async fn transport_failure(
        &self,
        session: &mut Session,
        task: &str,
        err: LLMError,
        tokens_so_far: u64,
    ) -> Result<AgentResult, EngineError> {
        warn!(agent = %self.profile.name, "Model call failed: {}", err);
        let content = format!("API error: {}", err);

        // Calls that already succeeded were paid for
        if tokens_so_far > 0 {
            session.ledger.record(tokens_so_far);
        }

        self.ctx
            .audit
            .log_action(
                AuditEntry::new(&session.id, &self.profile.name, ActionType::LlmCall, task)
                    .approved(false)
                    .result(content.as_str())
                    .tokens(tokens_so_far),
            )
            .await
            .map_err(audit_error)?;

        let mut result =
            AgentResult::failure(content).with_meta("agent", self.profile.name.as_str());
        result.tokens_used = tokens_so_far;
        Ok(result)
    }

    async fn run_tool_calls(
        &self,
        session_id: &str,
        response: &ModelResponse,
    ) -> Result<Vec<ContentBlock>, EngineError> {
        let mut results = Vec::new();
        for (id, name, input) in response.tool_uses() {
            let (content, is_error) = self.invoke_tool(session_id, name, input).await?;
            results.push(ContentBlock::tool_result(id, content, is_error));
        }
        Ok(results)
    }

    /// Returns the tool-result text and whether it is an error
    async fn invoke_tool(
        &self,
        session_id: &str,
        name: &str,
        input: &serde_json::Value,
    ) -> Result<(String, bool), EngineError> {
        let allowed = &self.profile.allowed_tools;

        // Refuse out-of-scope calls before bothering a human
        if let Err(e) = self.ctx.tools.authorize(name, allowed) {
            let text = e.render();
            self.audit_tool_call(session_id, name, input, false, &text).await?;
            return Ok((text, true));
        }

        if self.ctx.requires_hitl(name) {
            let request = ApprovalRequest {
                session_id: session_id.to_string(),
                agent: self.profile.name.clone(),
                action_type: name.to_string(),
                details: input.to_string(),
            };
            let approved = self
                .ctx
                .approvals
                .request_approval(&self.ctx.audit, &request)
                .await?;

            if !approved {
                self.audit_tool_call(session_id, name, input, false, REJECTED_BY_HUMAN)
                    .await?;
                return Ok((REJECTED_BY_HUMAN.to_string(), true));
            }
        }

        debug!(tool = name, "Dispatching tool call");
        let (text, is_error) = match self.ctx.tools.execute(name, allowed, input.clone()).await {
            Ok(text) => (text, false),
            Err(e) => (e.render(), true),
        };

        self.audit_tool_call(session_id, name, input, !is_error, &text)
            .await?;
        Ok((text, is_error))
    }

    async fn audit_tool_call(
        &self,
        session_id: &str,
        name: &str,
        input: &serde_json::Value,
        approved: bool,
        result: &str,
    ) -> Result<(), EngineError> {
        self.ctx
            .audit
            .log_action(
                AuditEntry::new(
                    session_id,
                    &self.profile.name,
                    ActionType::ToolCall,
                    format!("{}({})", name, input),
                )
                .approved(approved)
                .result(result),
            )
            .await
            .map_err(audit_error)?;
        Ok(())
    }
}
