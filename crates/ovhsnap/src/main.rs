// SPDX-FileCopyrightText: 2026 Ovhsnap Contributors
// SPDX-License-Identifier: MIT OR Apache-2.0

//! ovhsnap - acquisition engine for intermittently-available OVH inventory.
//!
//! Binary entry point: argument parsing and dispatch to the serve and
//! config subcommands.

#[cfg(not(target_env = "msvc"))]
use tikv_jemallocator::Jemalloc;

#[cfg(not(target_env = "msvc"))]
#[global_allocator]
static GLOBAL: Jemalloc = Jemalloc;

use std::path::PathBuf;

use clap::{Parser, Subcommand};

mod check;
mod serve;

/// ovhsnap - buy intermittently-available OVH servers the moment they restock.
#[derive(Parser, Debug)]
#[command(name = "ovhsnap", version, about, long_about = None)]
struct Cli {
    /// Path to the config file (defaults to ./ovhsnap.toml).
    #[arg(long, global = true)]
    config: Option<PathBuf>,

    #[command(subcommand)]
    command: Commands,
}

/// Available subcommands.
#[derive(Subcommand, Debug)]
enum Commands {
    /// Start the acquisition engine and control plane.
    Serve,
    /// Inspect and validate configuration.
    Config {
        #[command(subcommand)]
        command: ConfigCommands,
    },
}

#[derive(Subcommand, Debug)]
enum ConfigCommands {
    /// Load the configuration, validate it, and print a summary.
    Check,
}

fn load_config(path: Option<&PathBuf>) -> Result<ovhsnap_config::SnapConfig, String> {
    let loaded = match path {
        Some(path) => ovhsnap_config::load_config_from_path(path),
        None => ovhsnap_config::load_config(),
    };
    loaded.map_err(|e| e.to_string())
}

#[tokio::main]
async fn main() {
    let cli = Cli::parse();

    let config = match load_config(cli.config.as_ref()) {
        Ok(config) => config,
        Err(message) => {
            eprintln!("error: failed to load configuration: {message}");
            std::process::exit(1);
        }
    };

    match cli.command {
        Commands::Serve => {
            if let Err(e) = serve::run_serve(config).await {
                eprintln!("error: {e}");
                std::process::exit(1);
            }
        }
        Commands::Config { command } => match command {
            ConfigCommands::Check => {
                std::process::exit(check::run_check(&config));
            }
        },
    }
}
