//! CLI type definitions

use clap::{Parser, Subcommand};
use std::path::PathBuf;

use super::commands::agent::AgentArgs;
use super::commands::approval::ApprovalArgs;
use super::commands::config::ConfigArgs;
use super::commands::invoke::InvokeArgs;
use super::commands::metrics::MetricsArgs;

/// Command-line arguments.
#[derive(Parser, Debug)]
#[command(name = "agentry")]
#[command(about = "Agentry - agent dispatch, streaming and promotion runtime", long_about = None)]
#[command(version)]
pub struct Cli {
    /// Subcommand
    #[command(subcommand)]
    pub command: Commands,

    /// Output in JSON format
    #[arg(short, long, global = true)]
    pub json: bool,

    /// Load configuration from this file instead of .agentry/
    #[arg(short, long, global = true, env = "AGENTRY_CONFIG")]
    pub config: Option<PathBuf>,
}

/// Top-level subcommands
#[derive(Subcommand, Debug)]
pub enum Commands {
    /// Register, inspect and move agents through their lifecycle
    Agent(AgentArgs),
    /// Decide promotion approval requests
    Approval(ApprovalArgs),
    /// Send a message to an agent
    Invoke(InvokeArgs),
    /// Invoke agents and report per-transport latency and success rates
    Metrics(MetricsArgs),
    /// Inspect the effective configuration
    Config(ConfigArgs),
}
