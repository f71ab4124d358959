//! Toolbox CLI - preferences and pinned links from the terminal
//!
//! Every command restores the profile's session, performs one operation
//! through the shared sync core and exits.

mod auth;
mod cli;
mod commands;
mod error;
mod paths;

use clap::Parser;

use crate::cli::{Cli, Commands};
use crate::commands::{open_session, run_auth, run_links, run_prefs, run_sync};
use crate::error::CliError;

#[tokio::main]
async fn main() {
    if let Err(error) = run().await {
        eprintln!("Error: {error}");
        std::process::exit(1);
    }
}

async fn run() -> Result<(), CliError> {
    dotenvy::dotenv().ok();

    let mut filter = tracing_subscriber::EnvFilter::from_default_env();
    if let Ok(directive) = "toolbox=info".parse::<tracing_subscriber::filter::Directive>() {
        filter = filter.add_directive(directive);
    }
    tracing_subscriber::fmt()
        .with_env_filter(filter)
        .with_writer(std::io::stderr)
        .init();

    let cli = Cli::parse();
    let session = open_session(cli.config.as_deref(), cli.profile.as_deref()).await?;

    let result = match cli.command {
        Commands::Auth { command } => run_auth(command, &session).await,
        Commands::Prefs { command } => run_prefs(command, &session).await,
        Commands::Links { command } => run_links(command, &session).await,
        Commands::Sync { command } => run_sync(command, &session).await,
    };

    if let Some(controller) = session.controller() {
        controller.shutdown();
    }
    result
}
