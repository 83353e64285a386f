//! protopin - Version-pinned protoc build orchestrator
//!
//! CLI entry point that dispatches to subcommands.

use clap::Parser;
use console::style;
use protopin::cli::{Cli, Commands};
use protopin::error::ProtopinResult;
use protopin::store::ArtifactStore;
use std::process::ExitCode;
use tracing_subscriber::EnvFilter;

#[tokio::main]
async fn main() -> ExitCode {
    match run().await {
        Ok(()) => ExitCode::SUCCESS,
        Err(e) => {
            eprintln!("{} {}", style("Error:").red().bold(), e);
            if let Some(hint) = e.hint() {
                eprintln!("{} {}", style("Hint:").yellow(), hint);
            }
            ExitCode::FAILURE
        }
    }
}

async fn run() -> ProtopinResult<()> {
    let cli = Cli::parse();

    // Initialize logging: 0 = warn (progress bars only), 1 = info, 2+ = debug
    let filter = match cli.verbose {
        0 => EnvFilter::new("protopin=warn"),
        1 => EnvFilter::new("protopin=info"),
        _ => EnvFilter::new("protopin=debug"),
    };

    tracing_subscriber::fmt()
        .with_env_filter(filter)
        .with_target(false)
        .without_time()
        .init();

    let store = match cli.store {
        Some(root) => ArtifactStore::new(root),
        None => ArtifactStore::from_env(),
    };

    match cli.command {
        Commands::Build(args) => protopin::cli::commands::build(args, store).await,
        Commands::Tidy(args) => protopin::cli::commands::tidy(args, store).await,
    }
}
