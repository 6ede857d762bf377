//! Shared fixtures for the engine integration tests
#![allow(dead_code)]

use async_trait::async_trait;
use serde_json::Value;
use std::collections::VecDeque;
use std::sync::atomic::{AtomicUsize, Ordering};
use std::sync::{Arc, Mutex};
use tempfile::TempDir;

use cohort_engine::agent::{AgentKind, AgentProfile, RuntimeContext};
use cohort_engine::config::Config;
use cohort_engine::db::{AuditLog, Database};
use cohort_engine::llm::{
    ContentBlock, LLMError, LLMProvider, ModelRequest, ModelResponse, StopReason, Usage,
};
use cohort_engine::security::StaticApprover;
use cohort_engine::tools::ToolRegistry;
use sdk::tool::FnTool;
use sdk::{ToolError, ToolOutput, ToolSpec};

/// Plays back canned responses in order and remembers every request
pub struct ScriptedProvider {
    script: Mutex<VecDeque<Result<ModelResponse, LLMError>>>,
    requests: Mutex<Vec<ModelRequest>>,
}

impl ScriptedProvider {
    pub fn new(script: Vec<Result<ModelResponse, LLMError>>) -> Self {
        Self {
            script: Mutex::new(script.into()),
            requests: Mutex::new(Vec::new()),
        }
    }

    pub fn calls(&self) -> usize {
        self.requests.lock().unwrap().len()
    }

    pub fn requests(&self) -> Vec<ModelRequest> {
        self.requests.lock().unwrap().clone()
    }
}

#[async_trait]
impl LLMProvider for ScriptedProvider {
    fn name(&self) -> &str {
        "scripted"
    }

    async fn complete(&self, request: &ModelRequest) -> Result<ModelResponse, LLMError> {
        self.requests.lock().unwrap().push(request.clone());
        self.script
            .lock()
            .unwrap()
            .pop_front()
            .unwrap_or_else(|| Err(LLMError::InvalidRequest("script exhausted".to_string())))
    }
}

pub fn usage(input_tokens: u64, output_tokens: u64) -> Usage {
    Usage {
        input_tokens,
        output_tokens,
    }
}

pub fn text_response(text: &str, tokens: u64) -> Result<ModelResponse, LLMError> {
    Ok(ModelResponse {
        content: vec![ContentBlock::text(text)],
        stop_reason: StopReason::EndTurn,
        usage: usage(tokens / 2, tokens - tokens / 2),
    })
}

pub fn tool_use_response(
    id: &str,
    name: &str,
    input: Value,
    tokens: u64,
) -> Result<ModelResponse, LLMError> {
    Ok(ModelResponse {
        content: vec![ContentBlock::ToolUse {
            id: id.to_string(),
            name: name.to_string(),
            input,
        }],
        stop_reason: StopReason::ToolUse,
        usage: usage(tokens / 2, tokens - tokens / 2),
    })
}

/// Tool results sent back in the last user turn of a request
pub fn tool_results(request: &ModelRequest) -> Vec<(String, bool)> {
    request
        .messages
        .last()
        .map(|msg| {
            msg.content
                .iter()
                .filter_map(|block| match block {
                    ContentBlock::ToolResult {
                        content, is_error, ..
                    } => Some((content.clone(), *is_error)),
                    _ => None,
                })
                .collect()
        })
        .unwrap_or_default()
}

/// Text of the last user turn of a request
pub fn last_prompt(request: &ModelRequest) -> String {
    request
        .messages
        .last()
        .map(|msg| {
            msg.content
                .iter()
                .filter_map(|block| match block {
                    ContentBlock::Text { text } => Some(text.as_str()),
                    _ => None,
                })
                .collect::<Vec<_>>()
                .join("\n")
        })
        .unwrap_or_default()
}

pub fn test_config(dir: &TempDir) -> Config {
    let mut config = Config::default();
    config.core.data_dir = dir.path().to_path_buf();
    config.tools.workspace = dir.path().join("workspace");
    std::fs::create_dir_all(&config.tools.workspace).unwrap();
    config
}

/// Counts calls of the `sample` test tool
#[derive(Clone, Default)]
pub struct SampleCounter(Arc<AtomicUsize>);

impl SampleCounter {
    pub fn count(&self) -> usize {
        self.0.load(Ordering::SeqCst)
    }
}

/// Register `sample`, a tool that echoes its `value` parameter
pub fn register_sample(
    registry: &mut ToolRegistry,
    requires_hitl: bool,
    fail: bool,
) -> SampleCounter {
    let counter = SampleCounter::default();
    let seen = counter.clone();

    let mut spec = ToolSpec::new("sample", "Echo a value").with_schema(serde_json::json!({
        "type": "object",
        "properties": {"value": {"type": "string"}},
        "required": ["value"]
    }));
    if requires_hitl {
        spec = spec.with_hitl();
    }

    registry
        .register(
            spec,
            Arc::new(FnTool(move |input: sdk::ToolInput| {
                seen.0.fetch_add(1, Ordering::SeqCst);
                if fail {
                    return Err(ToolError::Execution("sample exploded".to_string()));
                }
                Ok(ToolOutput::text(format!("echo {}", input.param_str("value")?)))
            })),
        )
        .unwrap();
    counter
}

pub fn profile(allowed_tools: &[&str]) -> AgentProfile {
    AgentProfile {
        kind: AgentKind::Developer,
        name: "developer".to_string(),
        role: "Senior Software Engineer".to_string(),
        model: "test-specialist".to_string(),
        system_prompt: "You are a test agent.".to_string(),
        allowed_tools: allowed_tools.iter().map(|s| s.to_string()).collect(),
        description: "test profile".to_string(),
    }
}

pub struct Harness {
    pub dir: TempDir,
    pub provider: Arc<ScriptedProvider>,
    pub ctx: Arc<RuntimeContext>,
    pub audit: AuditLog,
    pub sample: SampleCounter,
}

pub struct HarnessOptions {
    pub approve: bool,
    pub sample_requires_hitl: bool,
    pub sample_fails: bool,
}

impl Default for HarnessOptions {
    fn default() -> Self {
        Self {
            approve: true,
            sample_requires_hitl: false,
            sample_fails: false,
        }
    }
}

pub async fn harness(script: Vec<Result<ModelResponse, LLMError>>) -> Harness {
    harness_with(script, HarnessOptions::default(), |_| {}).await
}

pub async fn harness_with(
    script: Vec<Result<ModelResponse, LLMError>>,
    options: HarnessOptions,
    tweak: impl FnOnce(&mut Config),
) -> Harness {
    let dir = TempDir::new().unwrap();
    let mut config = test_config(&dir);
    tweak(&mut config);

    let database = Database::new(&dir.path().join("audit.db")).await.unwrap();
    let audit = database.audit();

    let mut registry = ToolRegistry::with_builtins(&config.tools).unwrap();
    let sample = register_sample(
        &mut registry,
        options.sample_requires_hitl,
        options.sample_fails,
    );

    let provider = Arc::new(ScriptedProvider::new(script));
    let model: Arc<dyn LLMProvider> = provider.clone();
    let ctx = RuntimeContext::new(
        Arc::new(config),
        Arc::new(registry),
        model,
        audit.clone(),
        Arc::new(StaticApprover(options.approve)),
    )
    .unwrap();

    Harness {
        dir,
        provider,
        ctx: Arc::new(ctx),
        audit,
        sample,
    }
}
