//! cnabtool - inspect and safely delete CNAB bundles in a container registry.

use std::process::ExitCode;

use anyhow::Result;
use clap::Parser;
use tracing_subscriber::{layer::SubscriberExt, util::SubscriberInitExt};

mod commands;
mod output;
mod settings;

use commands::{Cli, Commands, ContentCommands};
use settings::Settings;

#[tokio::main]
async fn main() -> Result<ExitCode> {
    let cli = Cli::parse();
    let settings = Settings::load(&cli.global)?;

    // RUST_LOG wins over the configured verbosity
    tracing_subscriber::registry()
        .with(
            tracing_subscriber::EnvFilter::try_from_default_env()
                .unwrap_or_else(|_| settings.log_filter().into()),
        )
        .with(tracing_subscriber::fmt::layer().with_writer(std::io::stderr))
        .init();

    if let Some(ref source) = settings.source {
        tracing::info!(path = %source.display(), "Using config file");
    }
    tracing::debug!(settings = ?settings, "Effective settings");

    match cli.command {
        Commands::Content(ContentCommands::Manifest(args)) => {
            commands::manifest::run(&settings, &args).await
        }
        Commands::Content(ContentCommands::Inspect(args)) => {
            commands::inspect::run(&settings, &args).await
        }
        Commands::Content(ContentCommands::Delete(args)) => {
            commands::delete::run(&settings, &args).await
        }
        Commands::Version => {
            println!("cnabtool {}", env!("CARGO_PKG_VERSION"));
            Ok(ExitCode::SUCCESS)
        }
    }
}
