//! study-tree CLI binary
//!
//! Offline inspection and editing of study trees kept in the snapshot store.

use anyhow::Context;
use clap::Parser;
use std::process;
use study_tree::cli::{map_error, Cli, RunContext};
use study_tree::config::ConfigLoader;
use study_tree::logging::{init_logging, LoggingConfig};
use tracing::{error, info};

fn main() {
    let cli = Cli::parse();

    let logging_config = build_logging_config(&cli);
    if let Err(e) = init_logging(Some(&logging_config)) {
        eprintln!("Failed to initialize logging: {}", e);
        process::exit(1);
    }

    if let Err(e) = run(cli) {
        error!("Command failed: {:#}", e);
        eprintln!("{:#}", e);
        process::exit(1);
    }
}

fn run(cli: Cli) -> anyhow::Result<()> {
    let context = RunContext::new(cli.workspace.clone(), cli.config.clone(), cli.store.clone())
        .map_err(|e| anyhow::anyhow!(map_error(&e)))
        .context("Failed to open the study store")?;
    info!(store = %context.store_path().display(), "CLI context initialized");

    let output = context
        .execute(&cli.command)
        .map_err(|e| anyhow::anyhow!(map_error(&e)))?;
    println!("{}", output);
    Ok(())
}

/// Logging config from the config file, then CLI flags.
fn build_logging_config(cli: &Cli) -> LoggingConfig {
    let loaded = match cli.config {
        Some(ref path) => ConfigLoader::load_from_file(path),
        None => ConfigLoader::load(&cli.workspace),
    };
    let mut config = loaded.map(|c| c.logging).unwrap_or_default();

    if cli.verbose {
        config.level = "debug".to_string();
    }
    if let Some(ref level) = cli.log_level {
        config.level = level.clone();
    }
    if let Some(ref format) = cli.log_format {
        config.format = format.clone();
    }
    config
}
