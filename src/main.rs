//! Wallet Session - inspect and exercise wallet session state
//!
//! The real wallet agent lives in the browser; this binary works with the
//! persisted token store and replays scripted sessions against an
//! in-memory agent.

use std::path::PathBuf;

use anyhow::Result;
use clap::{Parser, Subcommand};
use tracing::error;

// Use the library crate
use wallet_session::cli::commands;
use wallet_session::config::Config;

/// Wallet Session - wallet connection and session token tooling
#[derive(Parser)]
#[command(name = "wallet-session")]
#[command(author, version, about, long_about = None)]
struct Cli {
    /// Path to config file
    #[arg(short, long, default_value = "wallet-session.toml")]
    config: String,

    #[command(subcommand)]
    command: Commands,
}

#[derive(Subcommand)]
enum Commands {
    /// Show current configuration
    Config,

    /// Check a network id against the expected network
    Validate {
        /// Network id as reported by the wallet (e.g. 0x1)
        network_id: String,
    },

    /// Session token management
    Token {
        #[command(subcommand)]
        action: TokenAction,
    },

    /// Replay a JSON session script against an in-memory wallet
    Simulate {
        /// Path to the script
        script: PathBuf,
    },
}

#[derive(Subcommand)]
enum TokenAction {
    /// Show the cached token
    Show,

    /// Remove the cached token
    Clear {
        /// Skip confirmation prompt
        #[arg(long)]
        force: bool,
    },
}

#[tokio::main]
async fn main() -> Result<()> {
    // Load environment variables from .env file
    dotenvy::dotenv().ok();

    // Initialize tracing
    tracing_subscriber::fmt()
        .with_env_filter(
            tracing_subscriber::EnvFilter::from_default_env()
                .add_directive("wallet_session=info".parse()?),
        )
        .with_target(true)
        .with_file(true)
        .with_line_number(true)
        .init();

    // Parse CLI arguments
    let cli = Cli::parse();

    // Load configuration
    let config = match Config::load(&cli.config) {
        Ok(cfg) => cfg,
        Err(e) => {
            error!("Failed to load configuration: {:#}", e);
            std::process::exit(1);
        }
    };

    // Execute command
    let result = match cli.command {
        Commands::Config => commands::show_config(&config),
        Commands::Validate { network_id } => commands::validate(&config, &network_id),
        Commands::Token { action } => match action {
            TokenAction::Show => commands::token_show(&config),
            TokenAction::Clear { force } => commands::token_clear(&config, force),
        },
        Commands::Simulate { script } => commands::simulate(&config, &script).await,
    };

    if let Err(e) = result {
        error!("Command failed: {:#}", e);
        std::process::exit(1);
    }

    Ok(())
}
