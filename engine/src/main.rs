// Cohort agent team
// Main entry point for the cohort binary

use clap::Parser;
use std::sync::Arc;

use cohort_engine::cli::{Cli, Command};
use cohort_engine::config::Config;
use cohort_engine::handlers::{
    handle_ask, handle_auth, handle_chat, handle_logs, handle_sessions, handle_team, OutputFormat,
};
use cohort_engine::telemetry::init_telemetry_with_level;

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    let cli = Cli::parse();

    let format = if cli.json {
        OutputFormat::Json
    } else {
        OutputFormat::Text
    };

    let config = match &cli.config {
        Some(path) => Config::load_from_path(path)?,
        None => Config::load_or_create()?,
    };

    // --log wins over the config file; RUST_LOG wins over both
    let log_level = cli.log.as_deref().unwrap_or(&config.core.log_level);
    init_telemetry_with_level(log_level);

    tracing::debug!(
        "Cohort v{} ({} - {})",
        env!("CARGO_PKG_VERSION"),
        env!("GIT_COMMIT_HASH"),
        env!("BUILD_TIMESTAMP")
    );

    let config = Arc::new(config);

    match cli.command {
        Command::Ask { task } => handle_ask(task.join(" "), config, format).await,
        Command::Chat { new_session } => handle_chat(new_session, config, format).await,
        Command::Team => handle_team(&config, format),
        Command::Logs { session_id } => handle_logs(&session_id, &config, format).await,
        Command::Sessions => handle_sessions(&config, format).await,
        Command::Auth { action } => handle_auth(action, format),
    }
}
