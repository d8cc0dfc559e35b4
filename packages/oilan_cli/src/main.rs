use anyhow::{Context, Result};
use clap::{Parser, Subcommand};
use std::path::{Path, PathBuf};
use std::sync::Arc;
use tracing::info;
use tracing_subscriber::prelude::*;

mod cli;
mod config;

use crate::config::OilanConfig;

#[derive(Parser)]
#[command(name = "oilan")]
#[command(about = "Chat with Oilan from the terminal")]
struct Cli {
    #[command(subcommand)]
    command: Option<Commands>,

    /// Custom data directory (defaults to ~/.oilan)
    #[arg(long, global = true)]
    data_dir: Option<PathBuf>,

    /// Enable debug logging
    #[arg(short, long, global = true)]
    debug: bool,
}

#[derive(Subcommand)]
enum Commands {
    /// Open the interactive chat (the default)
    Chat(ChatArgs),

    /// List your dialogs
    List(ListArgs),

    /// Create a dialog and print its id
    New(NewArgs),
}

#[derive(Parser)]
struct ChatArgs {
    /// Dialog to open (default: most recent)
    #[arg(long)]
    dialog: Option<String>,
}

#[derive(Parser)]
struct ListArgs {
    /// Output as JSON
    #[arg(long)]
    json: bool,
}

#[derive(Parser)]
struct NewArgs {
    /// Dialog title (default: from config)
    #[arg(short, long)]
    title: Option<String>,
}

#[tokio::main]
async fn main() -> Result<()> {
    let cli = Cli::parse();

    let config = OilanConfig::new(cli.data_dir.clone())?;
    init_logging(&config.log_path(), cli.debug)?;
    info!("data directory: {}", config.data_dir.display());

    match cli.command {
        None => cli::chat_command(&config, None).await,
        Some(Commands::Chat(args)) => cli::chat_command(&config, args.dialog).await,
        Some(Commands::List(args)) => cli::list_command(&config, args.json).await,
        Some(Commands::New(args)) => cli::new_command(&config, args.title).await,
    }
}

/// Log to a file so tracing output never lands in the chat transcript.
fn init_logging(log_path: &Path, debug: bool) -> Result<()> {
    let default_directive = if debug {
        "oilan=debug,oilan_client=debug,info"
    } else {
        "oilan=info,oilan_client=info,warn"
    };
    let env_filter = tracing_subscriber::EnvFilter::try_from_default_env()
        .unwrap_or_else(|_| tracing_subscriber::EnvFilter::new(default_directive));

    let log_file = std::fs::OpenOptions::new()
        .create(true)
        .append(true)
        .open(log_path)
        .with_context(|| format!("Failed to open log file: {:?}", log_path))?;

    tracing_subscriber::registry()
        .with(
            tracing_subscriber::fmt::layer()
                .with_writer(Arc::new(log_file))
                .with_ansi(false),
        )
        .with(env_filter)
        .init();
    Ok(())
}
