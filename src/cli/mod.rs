//! CLI module: command parsing and dispatch
//!
//! All CLI logic lives here. `main.rs` calls `cli::run()`.

pub mod agent;
pub mod common;
pub mod config;
pub mod history;

use std::path::PathBuf;

use anyhow::Result;
use clap::{CommandFactory, Parser, Subcommand};

#[derive(Parser)]
#[command(name = "vos-agent")]
#[command(version)]
#[command(about = "Notification-driven agent runtime with long-term memory", long_about = None)]
struct Cli {
    /// Config file (default: ~/.vos-agent/config.json)
    #[arg(long, global = true)]
    config: Option<PathBuf>,

    #[command(subcommand)]
    command: Option<Commands>,
}

#[derive(Subcommand)]
enum Commands {
    /// Run one agent, feeding it notifications from stdin
    Run {
        /// Agent id (also the broker queue name)
        #[arg(long)]
        agent: String,
    },
    /// Inspect configuration
    Config {
        #[command(subcommand)]
        action: ConfigAction,
    },
    /// Print an agent's stored conversation history
    History {
        /// Agent id
        #[arg(long)]
        agent: String,
        /// Only the most recent N turns (0 = all)
        #[arg(long, default_value_t = 0)]
        limit: usize,
    },
    /// Show version information
    Version,
}

#[derive(Subcommand)]
pub enum ConfigAction {
    /// Print the effective settings, optionally resolved for one agent
    Show {
        #[arg(long)]
        agent: Option<String>,
    },
    /// Validate the configuration file
    Check,
}

/// Entry point called from `main`.
pub async fn run() -> Result<()> {
    // A missing .env file is normal.
    dotenvy::dotenv().ok();

    let cli = Cli::parse();

    // Load config early so logging respects its settings; fall back to
    // defaults if the file is missing or unreadable.
    let logging_cfg = common::load_config(cli.config.as_deref())
        .map(|c| c.logging)
        .unwrap_or_default();
    if let Err(e) = vos_agent::utils::logging::init_logging(&logging_cfg) {
        eprintln!("Warning: {}", e);
    }

    match cli.command {
        None => {
            let mut cmd = Cli::command();
            cmd.print_help()?;
            println!();
        }
        Some(Commands::Run { agent }) => {
            agent::cmd_run(agent, cli.config).await?;
        }
        Some(Commands::Config { action }) => {
            config::cmd_config(action, cli.config).await?;
        }
        Some(Commands::History { agent, limit }) => {
            history::cmd_history(agent, limit, cli.config).await?;
        }
        Some(Commands::Version) => {
            println!("vos-agent {}", env!("CARGO_PKG_VERSION"));
        }
    }

    Ok(())
}
