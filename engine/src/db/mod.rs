//! SQLite persistence for the audit trail
//!
//! One database file per data directory, opened in WAL mode so several
//! sessions can append concurrently while readers never block writers.

use anyhow::{Context, Result};
use sqlx::sqlite::{SqliteConnectOptions, SqlitePool, SqlitePoolOptions};
use sqlx::{ConnectOptions, Executor};
use std::path::Path;
use std::str::FromStr;
use tracing::{debug, info};

pub mod audit;

pub use audit::{ActionType, AuditEntry, AuditLog, AuditRecord};

/// Database connection pool
pub struct Database {
    pool: SqlitePool,
}

impl Database {
    /// Open (or create) the database and run migrations.
    ///
    /// SQLite replays any leftover WAL on open, so an unclean shutdown needs no
    /// extra recovery step.
    pub async fn new(db_path: &Path) -> Result<Self> {
        info!("Initializing database at: {}", db_path.display());

        if let Some(parent) = db_path.parent() {
            tokio::fs::create_dir_all(parent)
                .await
                .context("Failed to create database directory")?;
        }

        let connection_string = format!("sqlite:{}", db_path.display());
        let options = SqliteConnectOptions::from_str(&connection_string)?
            .create_if_missing(true)
            .journal_mode(sqlx::sqlite::SqliteJournalMode::Wal)
            .synchronous(sqlx::sqlite::SqliteSynchronous::Normal)
            .busy_timeout(std::time::Duration::from_secs(5))
            .disable_statement_logging();

        let pool = SqlitePoolOptions::new()
            .max_connections(5)
            .connect_with(options)
            .await
            .context("Failed to connect to database")?;

        debug!("Database connection established");

        let db = Self { pool };
        db.run_migrations().await?;

        Ok(db)
    }

    /// Migrations are idempotent and run on every open.
    async fn run_migrations(&self) -> Result<()> {
        self.pool
            .execute(include_str!("../../migrations/001_audit.sql"))
            .await
            .context("Failed to execute migration 001_audit.sql")?;

        debug!("Database migrations completed");
        Ok(())
    }

    pub fn pool(&self) -> &SqlitePool {
        &self.pool
    }

    /// Checkpoint the WAL into the main database file
    pub async fn flush_wal(&self) -> Result<()> {
        sqlx::query("PRAGMA wal_checkpoint(TRUNCATE)")
            .execute(&self.pool)
            .await
            .context("Failed to flush WAL")?;

        debug!("WAL flushed successfully");
        Ok(())
    }

    /// Flush the WAL and close every pooled connection
    pub async fn close(self) -> Result<()> {
        self.flush_wal().await?;
        self.pool.close().await;

        info!("Database connection closed");
        Ok(())
    }

    /// Audit log handle sharing this pool
    pub fn audit(&self) -> AuditLog {
        AuditLog::new(self.pool.clone())
    }
}

/// Map an audit write failure into the engine's error taxonomy
pub(crate) fn audit_error(e: anyhow::Error) -> sdk::errors::EngineError {
    sdk::errors::EngineError::Database(format!("{:#}", e))
}
