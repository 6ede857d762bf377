//! Command handlers for CLI operations
//!
//! - ask: one request in a fresh session
//! - chat: interactive session with in-loop commands
//! - team: list agents
//! - logs: show the audit trail of a session
//! - sessions: list stored sessions
//! - auth: manage the stored API key

use anyhow::{Context, Result};
use serde_json::json;
use std::io::{IsTerminal, Write};
use std::sync::Arc;

use sdk::errors::{EngineError, EngineErrorExt};

use crate::agent::{team, AgentProfile, RuntimeContext};
use crate::cli::AuthAction;
use crate::conductor::{Commander, Dispatch};
use crate::config::Config;
use crate::db::{AuditRecord, Database};
use crate::llm::AnthropicProvider;
use crate::secrets::{SecretManager, SecretString, API_KEY_ENTRY, API_KEY_ENV};
use crate::security::{Approver, StaticApprover, TerminalApprover};
use crate::session::{FileSessionStore, Session, SessionMetadata, SessionStore};
use crate::tools::ToolRegistry;

/// Output format for command results
#[derive(Debug, Clone, Copy)]
pub enum OutputFormat {
    /// Human-readable text output
    Text,
    /// JSON output for machine consumption
    Json,
}

const CHAT_HELP: &str = "\
Commands:
  help     show this help
  team     list the agents
  budget   token usage of this session
  log      audit trail of this session
  clear    forget the conversation (the audit trail stays)
  exit     save and quit";

/// Wire the runtime together for commands that talk to the model
fn build_commander(config: &Arc<Config>, database: &Database) -> Result<Commander> {
    let api_key = SecretManager::default().resolve_api_key()?;
    let provider = AnthropicProvider::new(
        config.llm.base_url.clone(),
        api_key,
        config.llm.request_timeout_secs,
    )
    .context("Failed to create model client")?;

    let tools = ToolRegistry::with_builtins(&config.tools)?;

    // Nobody can answer a prompt without a terminal, so refuse everything
    let approver: Arc<dyn Approver> = if std::io::stdin().is_terminal() {
        Arc::new(TerminalApprover)
    } else {
        tracing::warn!("stdin is not a terminal; every approval request will be rejected");
        Arc::new(StaticApprover(false))
    };

    let ctx = RuntimeContext::new(
        Arc::clone(config),
        Arc::new(tools),
        Arc::new(provider),
        database.audit(),
        approver,
    )?;
    Ok(Commander::new(Arc::new(ctx)))
}

async fn save_session(store: &FileSessionStore, session: &Session) -> Result<()> {
    store
        .save(&session.id, &session.memory, &session.ledger_state())
        .await
        .context("Failed to save session")
}

fn print_dispatch(dispatch: &Dispatch, session: &Session, format: OutputFormat) -> Result<()> {
    match format {
        OutputFormat::Text => {
            if let Some(route) = &dispatch.route {
                eprintln!("-> {}: {}", route.agent, route.reason);
            }
            println!("{}", dispatch.result.content);
            eprintln!("[{}]", session.ledger.summary());
        }
        OutputFormat::Json => {
            let output = json!({
                "session_id": session.id,
                "route": dispatch.route,
                "result": dispatch.result,
                "budget": session.ledger,
            });
            println!("{}", serde_json::to_string_pretty(&output)?);
        }
    }
    Ok(())
}

fn print_run_error(err: &EngineError) {
    eprintln!("Error: {}", err);
    eprintln!("Hint: {}", err.user_hint());
}

/// Send one request in a fresh session
pub async fn handle_ask(task: String, config: Arc<Config>, format: OutputFormat) -> Result<()> {
    let database = Database::new(&config.audit_db_path())
        .await
        .context("Failed to open audit log")?;
    let commander = build_commander(&config, &database)?;
    let store = FileSessionStore::new(&config.core.data_dir);

    let mut session = Session::new("ask", config.budget.max_tokens_per_session);
    let outcome = commander.dispatch(&mut session, &task).await;
    save_session(&store, &session).await?;

    match outcome {
        Ok(dispatch) => print_dispatch(&dispatch, &session, format),
        Err(e) => {
            print_run_error(&e);
            Err(e.into())
        }
    }
}

async fn read_line() -> Result<Option<String>> {
    tokio::task::spawn_blocking(|| {
        let mut line = String::new();
        let read = std::io::stdin().read_line(&mut line)?;
        Ok::<_, std::io::Error>((read > 0).then_some(line))
    })
    .await
    .context("stdin reader panicked")?
    .context("Failed to read from stdin")
}

/// Interactive session
pub async fn handle_chat(
    new_session: bool,
    config: Arc<Config>,
    format: OutputFormat,
) -> Result<()> {
    let database = Database::new(&config.audit_db_path())
        .await
        .context("Failed to open audit log")?;
    let commander = build_commander(&config, &database)?;
    let store = FileSessionStore::new(&config.core.data_dir);
    let ceiling = config.budget.max_tokens_per_session;

    let resumed = if new_session {
        None
    } else {
        match store.last_session().await? {
            Some(id) => store.load(&id).await?,
            None => None,
        }
    };
    let mut session = match resumed {
        Some((memory, state)) => {
            let session = Session::from_parts(memory, state, ceiling);
            eprintln!(
                "Resumed session {} ({} messages)",
                session.id,
                session.memory.history().len()
            );
            session
        }
        None => {
            let session = Session::new("session", ceiling);
            eprintln!("Started session {}", session.id);
            session
        }
    };
    eprintln!("Type 'help' for commands.");

    loop {
        eprint!("> ");
        std::io::stderr().flush().ok();

        let Some(line) = read_line().await? else {
            break;
        };
        let input = line.trim();
        if input.is_empty() {
            continue;
        }

        match input {
            "exit" | "quit" => break,
            "help" => eprintln!("{}", CHAT_HELP),
            "team" => print_team(&commander.profiles().cloned().collect::<Vec<_>>(), format)?,
            "budget" => eprintln!("{}", session.ledger.summary()),
            "log" => {
                let records = database.audit().get_session_logs(&session.id).await?;
                print_logs(&session.id, &records, format)?;
            }
            "clear" => {
                session.memory.clear();
                save_session(&store, &session).await?;
                eprintln!("Conversation cleared.");
            }
            request => {
                match commander.dispatch(&mut session, request).await {
                    Ok(dispatch) => print_dispatch(&dispatch, &session, format)?,
                    Err(e) => print_run_error(&e),
                }
                save_session(&store, &session).await?;
            }
        }
    }

    save_session(&store, &session).await?;
    if let Err(e) = database.flush_wal().await {
        tracing::warn!("Failed to flush audit WAL: {}", e);
    }
    eprintln!("Session {} saved.", session.id);
    Ok(())
}

fn print_team(profiles: &[AgentProfile], format: OutputFormat) -> Result<()> {
    match format {
        OutputFormat::Text => {
            for profile in profiles {
                println!("{:<11} {:<28} {}", profile.name, profile.role, profile.model);
                println!("            {}", profile.description);
                if profile.allowed_tools.is_empty() {
                    println!("            tools: (none)");
                } else {
                    println!("            tools: {}", profile.allowed_tools.join(", "));
                }
            }
        }
        OutputFormat::Json => {
            println!("{}", serde_json::to_string_pretty(profiles)?);
        }
    }
    Ok(())
}

/// Show the agents
pub fn handle_team(config: &Config, format: OutputFormat) -> Result<()> {
    print_team(&team(&config.llm), format)
}

fn print_logs(session_id: &str, records: &[AuditRecord], format: OutputFormat) -> Result<()> {
    match format {
        OutputFormat::Text => {
            if records.is_empty() {
                println!("No audit records for session {}", session_id);
                return Ok(());
            }
            for record in records {
                let approved = match record.approved {
                    Some(true) => "yes",
                    Some(false) => "no",
                    None => "-",
                };
                println!(
                    "{}  {:<10} {:<13} {:<3} {:>6}  {}",
                    record.timestamp,
                    record.agent,
                    record.action_type,
                    approved,
                    record.tokens_used,
                    record.action
                );
                if !record.result.is_empty() {
                    println!("    -> {}", record.result);
                }
            }
        }
        OutputFormat::Json => {
            let output = json!({
                "session_id": session_id,
                "records": records,
            });
            println!("{}", serde_json::to_string_pretty(&output)?);
        }
    }
    Ok(())
}

/// Show the audit trail of a session
pub async fn handle_logs(session_id: &str, config: &Config, format: OutputFormat) -> Result<()> {
    let database = Database::new(&config.audit_db_path())
        .await
        .context("Failed to open audit log")?;
    let records = database.audit().get_session_logs(session_id).await?;
    print_logs(session_id, &records, format)
}

fn print_sessions(sessions: &[SessionMetadata], format: OutputFormat) -> Result<()> {
    match format {
        OutputFormat::Text => {
            if sessions.is_empty() {
                println!("No stored sessions");
                return Ok(());
            }
            for meta in sessions {
                println!(
                    "{:<24} updated {}  {:>4} messages  {:>8} tokens",
                    meta.session_id,
                    meta.last_updated.format("%Y-%m-%d %H:%M"),
                    meta.message_count,
                    meta.token_count
                );
            }
        }
        OutputFormat::Json => {
            println!("{}", serde_json::to_string_pretty(sessions)?);
        }
    }
    Ok(())
}

/// List stored sessions
pub async fn handle_sessions(config: &Config, format: OutputFormat) -> Result<()> {
    let store = FileSessionStore::new(&config.core.data_dir);
    let sessions = store.list_sessions().await?;
    print_sessions(&sessions, format)
}

/// Manage the stored API key
pub fn handle_auth(action: AuthAction, format: OutputFormat) -> Result<()> {
    let secrets = SecretManager::default();

    match action {
        AuthAction::Set => {
            let key = rpassword::prompt_password_stderr("Anthropic API key: ")
                .context("Failed to read API key")?;
            let key = SecretString::new(key.trim());
            secrets.set_secret(API_KEY_ENTRY, &key)?;
            println!("API key stored in the OS keychain.");
        }
        AuthAction::Clear => {
            secrets.delete_secret(API_KEY_ENTRY)?;
            println!("API key removed from the OS keychain.");
        }
        AuthAction::Status => {
            let from_env = std::env::var(API_KEY_ENV)
                .map(|v| !v.trim().is_empty())
                .unwrap_or(false);
            let in_keychain = secrets.has_secret(API_KEY_ENTRY);

            match format {
                OutputFormat::Text => {
                    let source = if from_env {
                        API_KEY_ENV
                    } else if in_keychain {
                        "OS keychain"
                    } else {
                        "not configured"
                    };
                    println!("API key: {}", source);
                }
                OutputFormat::Json => {
                    let output = json!({
                        "env": from_env,
                        "keychain": in_keychain,
                    });
                    println!("{}", serde_json::to_string_pretty(&output)?);
                }
            }
        }
    }
    Ok(())
}
