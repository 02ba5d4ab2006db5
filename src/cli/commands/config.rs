//! Configuration CLI commands.

use anyhow::Result;
use clap::{Args, Subcommand};
use serde::Serialize;

use crate::cli::output::{output, CommandOutput};
use crate::domain::models::Config;

/// Inspect configuration
#[derive(Args, Debug)]
pub struct ConfigArgs {
    /// Subcommand
    #[command(subcommand)]
    pub command: ConfigCommands,
}

/// Configuration subcommands
#[derive(Subcommand, Debug)]
pub enum ConfigCommands {
    /// Print the merged configuration (API keys masked)
    Show,
}

/// Output of `config show`.
#[derive(Debug, Serialize)]
pub struct ConfigOutput {
    /// Merged configuration.
    #[serde(flatten)]
    pub config: Config,
}

impl ConfigOutput {
    /// Output with secrets masked.
    pub fn masked(mut config: Config) -> Self {
        if config.anthropic.api_key.is_some() {
            config.anthropic.api_key = Some(crate::services::redaction::MASK.to_string());
        }
        Self { config }
    }
}

impl CommandOutput for ConfigOutput {
    fn to_human(&self) -> String {
        serde_yaml::to_string(&self.config).unwrap_or_default()
    }
}

/// Run a config subcommand.
pub fn execute(args: &ConfigArgs, config: Config, json_mode: bool) -> Result<()> {
    match args.command {
        ConfigCommands::Show => output(&ConfigOutput::masked(config), json_mode),
    }
    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_show_masks_api_key() {
        let mut config = Config::default();
        config.anthropic.api_key = Some("sk-live-secret".into());

        let rendered = ConfigOutput::masked(config).to_human();
        assert!(!rendered.contains("sk-live-secret"));
        assert!(rendered.contains("[REDACTED]"));
        assert!(rendered.contains("api_timeout_ms"));
    }
}
