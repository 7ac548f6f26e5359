//! wfm-poller - Five9 agent state snapshot poller
//!
//! This is the main entry point for the `wfm-poller` binary.

use anyhow::Result;
use clap::Parser;
use tracing_subscriber::{EnvFilter, fmt, prelude::*};
use wp_cli::Cli;
use wp_config::GlobalConfig;

#[tokio::main]
async fn main() -> Result<()> {
    let cli = Cli::parse();

    // A broken config is reported by the command, after logging is up
    let loaded = cli.load_config();
    let global = loaded
        .as_ref()
        .map(|config| config.global.clone())
        .unwrap_or_default();
    init_logging(cli.verbose, &global);

    cli.run_with(loaded).await?;

    Ok(())
}

fn init_logging(verbose: bool, global: &GlobalConfig) {
    let filter = if verbose {
        EnvFilter::new("debug")
    } else {
        EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new(&global.log_level))
    };

    let registry = tracing_subscriber::registry().with(filter);
    if global.json_logs {
        registry.with(fmt::layer().json()).init();
    } else {
        registry.with(fmt::layer()).init();
    }
}
