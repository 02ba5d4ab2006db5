//! Agentry CLI entry point.

use anyhow::Result;
use clap::Parser;

use agentry::cli::{self, commands, Cli, CliContext, Commands};
use agentry::infrastructure::logging::LoggerImpl;

async fn run(cli: Cli) -> Result<()> {
    let config = cli::load_config(cli.config.as_deref())?;
    let _logger = LoggerImpl::init(&config.logging)?;

    if let Commands::Config(args) = &cli.command {
        return commands::config::execute(args, config, cli.json);
    }

    let ctx = CliContext::open(config).await?;
    let poll = ctx.config.registry.poll_enabled && matches!(cli.command, Commands::Metrics(_));
    if poll {
        ctx.cache.start_poller().await;
    }

    let result = match cli.command {
        Commands::Agent(args) => commands::agent::execute(args, &ctx, cli.json).await,
        Commands::Approval(args) => commands::approval::execute(args, &ctx, cli.json).await,
        Commands::Invoke(args) => commands::invoke::execute(args, &ctx, cli.json).await,
        Commands::Metrics(args) => commands::metrics::execute(args, &ctx, cli.json).await,
        Commands::Config(_) => Ok(()),
    };

    if poll {
        ctx.cache.stop_poller().await;
    }
    result
}

#[tokio::main]
async fn main() {
    let cli = Cli::parse();
    let json = cli.json;

    if let Err(err) = run(cli).await {
        cli::handle_error(err, json);
    }
}
