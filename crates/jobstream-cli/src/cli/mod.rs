//! CLI entry and dispatch.

use std::path::PathBuf;

use anyhow::{Context, Result};
use clap::Parser;
use jobstream_core::{config, logging};

mod commands;

#[derive(Parser)]
#[command(name = "jobstream")]
#[command(version = "0.1")]
#[command(about = "Inspect recorded job streams offline")]
struct Cli {
    #[command(subcommand)]
    command: Commands,
}

#[derive(clap::Subcommand)]
enum Commands {
    /// Replay a recorded session (JSON lines) and print the transcript
    Replay {
        /// Session file with one record per line
        #[arg(value_name = "FILE")]
        file: PathBuf,

        /// Print the full view snapshot as JSON
        #[arg(long)]
        json: bool,
    },
    /// Split a terminal log into typed blocks
    Classify {
        #[arg(value_name = "FILE")]
        file: PathBuf,

        /// Print blocks as JSON
        #[arg(long)]
        json: bool,
    },
    /// Number the rows of a unified diff
    Diff {
        #[arg(value_name = "FILE")]
        file: PathBuf,

        /// Print rows as JSON
        #[arg(long)]
        json: bool,
    },
    /// Manage configuration
    Config {
        #[command(subcommand)]
        command: ConfigCommands,
    },
}

#[derive(clap::Subcommand)]
enum ConfigCommands {
    /// Show the path to the config file
    Path,
    /// Print the effective configuration
    Show,
}

pub fn run() -> Result<()> {
    let cli = Cli::parse();
    let config = config::Config::load().context("load config")?;
    let _log_guard = logging::init(&config.logging).context("init logging")?;

    match cli.command {
        Commands::Replay { file, json } => commands::replay::run(&file, &config, json),
        Commands::Classify { file, json } => commands::classify::run(&file, json),
        Commands::Diff { file, json } => commands::diff::run(&file, json),
        Commands::Config { command } => match command {
            ConfigCommands::Path => commands::config::path(),
            ConfigCommands::Show => commands::config::show(&config),
        },
    }
}
