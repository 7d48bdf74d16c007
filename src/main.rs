use anyhow::Result;
use clap::{Parser, Subcommand};
use std::path::PathBuf;

use taskboard::config::CliOverrides;

mod cmd;

#[derive(Parser)]
#[command(name = "taskboard")]
#[command(version, about = "Task board API server: boards of lists of tasks")]
pub struct Cli {
    /// Path to a taskboard.toml. Defaults to ./taskboard.toml when present.
    #[arg(long, global = true)]
    pub config: Option<PathBuf>,

    #[command(subcommand)]
    pub command: Commands,
}

#[derive(Subcommand)]
pub enum Commands {
    /// Start the HTTP API server
    Serve {
        /// Port to listen on
        #[arg(short, long)]
        port: Option<u16>,
        /// SQLite database path
        #[arg(long)]
        db_path: Option<PathBuf>,
        /// Dev mode: bind all interfaces and allow any CORS origin
        #[arg(long)]
        dev: bool,
        /// Create the "Test User" account on startup if missing
        #[arg(long)]
        seed_demo_user: bool,
        /// Emit logs as JSON
        #[arg(long)]
        log_json: bool,
    },
    /// Create the database and exit
    Init {
        /// SQLite database path
        #[arg(long)]
        db_path: Option<PathBuf>,
        /// Also create the "Test User" account
        #[arg(long)]
        seed_demo_user: bool,
    },
    /// Show or validate the resolved configuration
    Config {
        #[command(subcommand)]
        command: Option<ConfigCommands>,
    },
}

#[derive(Subcommand, Clone)]
pub enum ConfigCommands {
    /// Show the effective configuration
    Show,
    /// Validate configuration and show any warnings
    Validate,
}

#[tokio::main]
async fn main() -> Result<()> {
    let cli = Cli::parse();
    let config_path = cli.config.as_deref();

    match &cli.command {
        Commands::Serve {
            port,
            db_path,
            dev,
            seed_demo_user,
            log_json,
        } => {
            let overrides = CliOverrides {
                port: *port,
                db_path: db_path.clone(),
                dev: *dev,
                seed_demo_user: *seed_demo_user,
                log_json: *log_json,
            };
            cmd::cmd_serve(config_path, &overrides).await?;
        }
        Commands::Init {
            db_path,
            seed_demo_user,
        } => {
            let overrides = CliOverrides {
                db_path: db_path.clone(),
                seed_demo_user: *seed_demo_user,
                ..Default::default()
            };
            cmd::cmd_init(config_path, &overrides)?;
        }
        Commands::Config { command } => cmd::cmd_config(config_path, command.clone())?,
    }

    Ok(())
}
