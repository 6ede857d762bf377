//! Session state and persistence
//!
//! A [`Session`] owns the memory and budget ledger of one conversation. It is
//! only ever touched by one request at a time. The [`SessionStore`] saves it
//! between process runs.

use async_trait::async_trait;
use chrono::{DateTime, Utc};
use sdk::errors::EngineError;
use serde::{Deserialize, Serialize};
use std::collections::BTreeMap;
use std::path::{Path, PathBuf};
use tokio::fs;
use tracing::{debug, info, warn};

use crate::budget::BudgetLedger;
use crate::llm::Message;
use crate::memory::{SessionMemory, WorkingSet};

/// Persisted ledger state
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct LedgerState {
    pub created_at: DateTime<Utc>,
    pub tokens_used: u64,
    pub runs: u64,
}

/// Listing entry for a stored session
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct SessionMetadata {
    pub session_id: String,
    pub created_at: DateTime<Utc>,
    pub last_updated: DateTime<Utc>,
    pub message_count: usize,
    pub token_count: u64,
}

/// Live state of one conversation
#[derive(Debug, Clone)]
pub struct Session {
    pub id: String,
    pub memory: SessionMemory,
    pub ledger: BudgetLedger,
    pub created_at: DateTime<Utc>,
}

impl Session {
    /// Fresh session with a generated id, e.g. `session-1a2b3c4d`
    pub fn new(prefix: &str, session_ceiling: u64) -> Self {
        let suffix: String = uuid::Uuid::new_v4().simple().to_string().chars().take(8).collect();
        Self::with_id(format!("{}-{}", prefix, suffix), session_ceiling)
    }

    pub fn with_id(id: impl Into<String>, session_ceiling: u64) -> Self {
        let id = id.into();
        Self {
            memory: SessionMemory::new(id.clone()),
            ledger: BudgetLedger::new(session_ceiling),
            created_at: Utc::now(),
            id,
        }
    }

    /// Rebuild from stored parts under the current ceiling
    pub fn from_parts(memory: SessionMemory, state: LedgerState, session_ceiling: u64) -> Self {
        Self {
            id: memory.session_id().to_string(),
            ledger: BudgetLedger::restore(state.tokens_used, state.runs, session_ceiling),
            created_at: state.created_at,
            memory,
        }
    }

    pub fn ledger_state(&self) -> LedgerState {
        LedgerState {
            created_at: self.created_at,
            tokens_used: self.ledger.tokens_used(),
            runs: self.ledger.runs(),
        }
    }
}

/// Persistence boundary for sessions
#[async_trait]
pub trait SessionStore: Send + Sync {
    async fn save(
        &self,
        session_id: &str,
        memory: &SessionMemory,
        state: &LedgerState,
    ) -> Result<(), EngineError>;

    async fn load(
        &self,
        session_id: &str,
    ) -> Result<Option<(SessionMemory, LedgerState)>, EngineError>;

    /// Metadata of every stored session, most recently updated first
    async fn list_sessions(&self) -> Result<Vec<SessionMetadata>, EngineError>;

    /// Id of the session saved last, if it still exists
    async fn last_session(&self) -> Result<Option<String>, EngineError>;
}

#[derive(Serialize, Deserialize)]
struct FullTranscript {
    messages: Vec<Message>,
    #[serde(default)]
    live_from: usize,
    #[serde(default)]
    compacted_upto: usize,
    #[serde(default)]
    context: BTreeMap<String, String>,
}

/// JSON files under `<data_dir>/sessions/<id>/`
pub struct FileSessionStore {
    base_dir: PathBuf,
}

fn session_error(action: &str, path: &Path, e: impl std::fmt::Display) -> EngineError {
    EngineError::Session(format!("Failed to {} {}: {}", action, path.display(), e))
}

/// Ids become directory names; keep them to a safe alphabet
fn validate_id(session_id: &str) -> Result<(), EngineError> {
    let valid = !session_id.is_empty()
        && session_id.len() <= 64
        && session_id
            .chars()
            .all(|c| c.is_ascii_alphanumeric() || c == '-' || c == '_');
    if valid {
        Ok(())
    } else {
        Err(EngineError::Session(format!(
            "Invalid session id '{}'",
            session_id
        )))
    }
}

impl FileSessionStore {
    pub fn new(base_dir: impl Into<PathBuf>) -> Self {
        Self {
            base_dir: base_dir.into(),
        }
    }

    fn sessions_dir(&self) -> PathBuf {
        self.base_dir.join("sessions")
    }

    fn pointer_path(&self) -> PathBuf {
        self.base_dir.join("current_session")
    }

    /// Write through a temp file so a crash never leaves half a file behind
    async fn write_json<T: Serialize>(path: &Path, value: &T) -> Result<(), EngineError> {
        let json =
            serde_json::to_vec_pretty(value).map_err(|e| session_error("serialize", path, e))?;
        let tmp = path.with_extension("json.tmp");
        fs::write(&tmp, json)
            .await
            .map_err(|e| session_error("write", &tmp, e))?;
        fs::rename(&tmp, path)
            .await
            .map_err(|e| session_error("write", path, e))
    }

    async fn read_json<T: for<'de> Deserialize<'de>>(path: &Path) -> Result<T, EngineError> {
        let bytes = fs::read(path)
            .await
            .map_err(|e| session_error("read", path, e))?;
        serde_json::from_slice(&bytes).map_err(|e| session_error("parse", path, e))
    }
}

#[async_trait]
impl SessionStore for FileSessionStore {
    async fn save(
        &self,
        session_id: &str,
        memory: &SessionMemory,
        state: &LedgerState,
    ) -> Result<(), EngineError> {
        validate_id(session_id)?;
        let dir = self.sessions_dir().join(session_id);
        fs::create_dir_all(&dir)
            .await
            .map_err(|e| session_error("create", &dir, e))?;

        let transcript = FullTranscript {
            messages: memory.history().to_vec(),
            live_from: memory.live_from(),
            compacted_upto: memory.compacted_upto(),
            context: memory.context().clone(),
        };
        Self::write_json(&dir.join("full.json"), &transcript).await?;
        Self::write_json(&dir.join("working.json"), memory.working_set()).await?;
        Self::write_json(&dir.join("state.json"), state).await?;

        let metadata = SessionMetadata {
            session_id: session_id.to_string(),
            created_at: state.created_at,
            last_updated: Utc::now(),
            message_count: memory.history().len(),
            token_count: state.tokens_used,
        };
        Self::write_json(&dir.join("metadata.json"), &metadata).await?;

        let pointer = self.pointer_path();
        fs::write(&pointer, session_id)
            .await
            .map_err(|e| session_error("write", &pointer, e))?;

        debug!(session_id, "Session saved");
        Ok(())
    }

    async fn load(
        &self,
        session_id: &str,
    ) -> Result<Option<(SessionMemory, LedgerState)>, EngineError> {
        validate_id(session_id)?;
        let dir = self.sessions_dir().join(session_id);
        if !fs::try_exists(&dir).await.unwrap_or(false) {
            return Ok(None);
        }

        let transcript: FullTranscript = Self::read_json(&dir.join("full.json")).await?;

        let working_path = dir.join("working.json");
        let working_set = if fs::try_exists(&working_path).await.unwrap_or(false) {
            Self::read_json::<WorkingSet>(&working_path).await?
        } else {
            WorkingSet::default()
        };

        let state: LedgerState = Self::read_json(&dir.join("state.json")).await?;

        let memory = SessionMemory::from_parts(
            session_id,
            transcript.messages,
            transcript.live_from,
            transcript.compacted_upto,
            transcript.context,
            working_set,
        );

        info!(
            session_id,
            messages = memory.history().len(),
            tokens = state.tokens_used,
            "Session loaded"
        );
        Ok(Some((memory, state)))
    }

    async fn list_sessions(&self) -> Result<Vec<SessionMetadata>, EngineError> {
        let dir = self.sessions_dir();
        if !fs::try_exists(&dir).await.unwrap_or(false) {
            return Ok(Vec::new());
        }

        let mut entries = fs::read_dir(&dir)
            .await
            .map_err(|e| session_error("list", &dir, e))?;
        let mut sessions = Vec::new();

        while let Some(entry) = entries
            .next_entry()
            .await
            .map_err(|e| session_error("list", &dir, e))?
        {
            let metadata_path = entry.path().join("metadata.json");
            if !fs::try_exists(&metadata_path).await.unwrap_or(false) {
                continue;
            }
            match Self::read_json::<SessionMetadata>(&metadata_path).await {
                Ok(metadata) => sessions.push(metadata),
                Err(e) => warn!("Skipping unreadable session metadata: {}", e),
            }
        }

        sessions.sort_by(|a, b| b.last_updated.cmp(&a.last_updated));
        Ok(sessions)
    }

    async fn last_session(&self) -> Result<Option<String>, EngineError> {
        let pointer = self.pointer_path();
        let id = match fs::read_to_string(&pointer).await {
            Ok(id) => id.trim().to_string(),
            Err(e) if e.kind() == std::io::ErrorKind::NotFound => return Ok(None),
            Err(e) => return Err(session_error("read", &pointer, e)),
        };

        if validate_id(&id).is_err() {
            return Ok(None);
        }
        let exists = fs::try_exists(self.sessions_dir().join(&id))
            .await
            .unwrap_or(false);
        Ok(exists.then_some(id))
    }
}
