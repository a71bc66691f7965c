//! Docbot CLI entry point.

use anyhow::{Context, Result};
use clap::Parser;

use docbot::application::AppContext;
use docbot::cli::commands::{consume, ingest, projects, search};
use docbot::cli::{handle_error, Cli, Commands};
use docbot::infrastructure::config::ConfigLoader;
use docbot::infrastructure::logging::{LogConfig, LoggerImpl};

#[tokio::main]
async fn main() {
    let cli = Cli::parse();
    let json = cli.json;
    if let Err(err) = run(cli).await {
        handle_error(err, json);
    }
}

async fn run(cli: Cli) -> Result<()> {
    let config = match &cli.config {
        Some(path) => ConfigLoader::load_from_file(path)?,
        None => ConfigLoader::load()?,
    };
    let _logger = LoggerImpl::init(&LogConfig::from(&config.logging))
        .context("Failed to initialize logging")?;

    let context = AppContext::build(config)
        .await
        .context("Failed to initialize services")?;

    match cli.command {
        Commands::Consume(args) => consume::execute(args, &context, cli.json).await,
        Commands::Ingest(args) => ingest::execute(args, &context, cli.json).await,
        Commands::Search(args) => search::execute(args, &context, cli.json).await,
        Commands::Projects(args) => projects::execute(args, &context, cli.json).await,
    }
}
