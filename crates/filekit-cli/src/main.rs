//! filekit: bulk file operations, duplicate detection, archives and search
//! from the command line.
//!
//! This binary sets up logging, loads the configuration and hands the
//! parsed subcommand to [`commands::run`].

mod args;
mod commands;
mod progress;

use std::path::PathBuf;

use anyhow::Context;
use clap::Parser;
use filekit_core::Config;
use tracing_subscriber::EnvFilter;

use crate::args::Args;

/// Returns `~/.config/filekit/config.toml`.
fn default_config_path() -> PathBuf {
    std::env::var("HOME")
        .map(PathBuf::from)
        .unwrap_or_else(|_| PathBuf::from("/"))
        .join(".config")
        .join("filekit")
        .join("config.toml")
}

/// An explicit `--config` must exist; the default location is optional.
fn load_config(explicit: Option<&PathBuf>) -> anyhow::Result<Config> {
    match explicit {
        Some(path) => Config::load(path)
            .with_context(|| format!("failed to load config from {}", path.display())),
        None => {
            let path = default_config_path();
            Config::load_or_default(&path)
                .with_context(|| format!("failed to load config from {}", path.display()))
        }
    }
}

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    // Logs go to stderr so `--json` output on stdout stays clean.
    tracing_subscriber::fmt()
        .with_env_filter(
            EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new("filekit=info")),
        )
        .with_writer(std::io::stderr)
        .init();

    let args = Args::parse();
    let config = load_config(args.config.as_ref())?;
    tracing::debug!(?config, "configuration loaded");

    commands::run(args.command, &config, args.json).await
}
