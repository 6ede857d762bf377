//! CLI interface for Cohort
//!
//! Command-line interface built with clap's derive API.

use clap::{Parser, Subcommand};
use std::path::PathBuf;

/// Cohort: a small team of AI agents under one commander
///
/// Every tool call is permission-checked, sensitive actions wait for your
/// approval, token use is capped per session and every step is audited.
#[derive(Parser, Debug)]
#[command(name = "cohort")]
#[command(version, about, long_about = None)]
pub struct Cli {
    /// Output in JSON format
    #[arg(long, global = true)]
    pub json: bool,

    /// Set log level (error, warn, info, debug, trace)
    #[arg(long, global = true, value_name = "LEVEL")]
    pub log: Option<String>,

    /// Specify alternate configuration file
    #[arg(long, global = true, value_name = "PATH")]
    pub config: Option<PathBuf>,

    #[command(subcommand)]
    pub command: Command,
}

/// Available commands
#[derive(Subcommand, Debug)]
pub enum Command {
    /// Send one request to the team in a fresh session
    Ask {
        /// The request, words are joined with spaces
        #[arg(required = true, num_args = 1..)]
        task: Vec<String>,
    },

    /// Interactive session, resuming the last one by default
    Chat {
        /// Start a fresh session instead of resuming
        #[arg(long)]
        new_session: bool,
    },

    /// Show the agents, their models and tools
    Team,

    /// Show the audit log of a session
    Logs {
        /// Session id
        session_id: String,
    },

    /// List stored sessions, most recent first
    Sessions,

    /// Manage the stored API key
    Auth {
        #[command(subcommand)]
        action: AuthAction,
    },
}

/// API key management actions
#[derive(Subcommand, Debug)]
pub enum AuthAction {
    /// Store the API key in the OS keychain
    Set,

    /// Remove the API key from the OS keychain
    Clear,

    /// Show where the API key would be loaded from
    Status,
}
