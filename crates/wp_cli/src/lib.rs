//! `wp_cli` - CLI commands for wfm-poller
//!
//! This crate provides:
//! - clap-based command definitions
//! - Store and pipeline wiring from the loaded configuration
//! - All subcommands (serve, poll, daemon, purge, config)

use chrono::Utc;
use clap::{Parser, Subcommand, ValueEnum};
use serde::{Deserialize, Serialize};
use std::path::PathBuf;
use std::sync::Arc;
use std::time::Duration;
use thiserror::Error;
use tokio::time::MissedTickBehavior;
use tracing::{info, warn};
use wp_collect::{HttpSoapTransport, PollOutcome, RetentionPurger, SnapshotOrchestrator};
use wp_config::{StoreBackend, WpConfig};
use wp_store::{DuckStore, RestStore, SnapshotStore, format_snapshot_ts};
use wp_web::WebServer;

/// CLI errors
#[derive(Error, Debug)]
pub enum CliError {
    #[error("Command failed: {0}")]
    CommandFailed(String),

    #[error("Config error: {0}")]
    ConfigError(#[from] wp_config::ConfigError),

    #[error("Store error: {0}")]
    StoreError(#[from] wp_store::StoreError),

    #[error("Collect error: {0}")]
    CollectError(#[from] wp_collect::CollectError),

    #[error("Web error: {0}")]
    WebError(#[from] wp_web::WebError),

    #[error("IO error: {0}")]
    IoError(#[from] std::io::Error),
}

/// Output format for command results
#[derive(Debug, Clone, Copy, PartialEq, Eq, ValueEnum, Serialize, Deserialize)]
pub enum OutputFormat {
    /// Pretty-printed JSON
    Json,
    /// Human-readable text
    Text,
}

/// Main CLI application
#[derive(Parser, Debug)]
#[command(name = "wfm-poller")]
#[command(
    author,
    version,
    about = "Five9 agent state snapshot poller for interval analysis"
)]
pub struct Cli {
    /// Configuration file path
    #[arg(short, long, global = true)]
    pub config: Option<PathBuf>,

    /// Enable verbose logging
    #[arg(short, long, global = true)]
    pub verbose: bool,

    /// Output format for commands
    #[arg(long, global = true, default_value = "text")]
    pub format: OutputFormat,

    #[command(subcommand)]
    pub command: Commands,
}

/// Available commands
#[derive(Subcommand, Debug)]
pub enum Commands {
    /// Serve the HTTP trigger and health endpoints
    Serve {
        /// Port to listen on (overrides config and PORT)
        #[arg(short, long)]
        port: Option<u16>,

        /// Address to bind
        #[arg(long)]
        bind: Option<String>,
    },

    /// Run one poll and print its outcome
    Poll,

    /// Poll on a fixed interval until interrupted
    Daemon {
        /// Seconds between polls (overrides config)
        #[arg(short, long)]
        interval: Option<u64>,
    },

    /// Run the retention purge alone
    Purge,

    /// Configuration management
    Config {
        #[command(subcommand)]
        command: ConfigCommands,
    },
}

/// Config subcommands
#[derive(Subcommand, Debug)]
pub enum ConfigCommands {
    /// Print the effective configuration (secrets omitted)
    Show,

    /// List the config file search paths
    Paths,

    /// Load and validate the configuration
    Validate,
}

/// Result of a standalone purge
#[derive(Debug, Serialize)]
pub struct PurgeReport {
    pub store: String,
    pub cutoff: String,
    pub purged: usize,
}

/// One entry of `config paths`
#[derive(Debug, Serialize)]
pub struct ConfigPath {
    pub path: String,
    pub exists: bool,
}

impl Cli {
    /// Load the configuration named by `--config`, or discover one
    ///
    /// # Errors
    ///
    /// Returns [`CliError::ConfigError`] if loading or validation fails.
    pub fn load_config(&self) -> Result<WpConfig, CliError> {
        let config = match &self.config {
            Some(path) => WpConfig::load_with_env(path)?,
            None => WpConfig::discover_with_env()?,
        };
        Ok(config)
    }

    /// Load the configuration, then run the CLI
    ///
    /// # Errors
    ///
    /// See [`Cli::run_with`].
    pub async fn run(self) -> Result<(), CliError> {
        let loaded = self.load_config();
        self.run_with(loaded).await
    }

    /// Run the CLI against an already loaded configuration.
    ///
    /// A load failure is only reported by commands that need the config;
    /// `config paths` runs without one.
    ///
    /// # Errors
    ///
    /// Returns a [`CliError`] if the command fails; a failed poll is a
    /// [`CliError::CommandFailed`] carrying the poll's error.
    pub async fn run_with(self, loaded: Result<WpConfig, CliError>) -> Result<(), CliError> {
        match &self.command {
            Commands::Serve { port, bind } => {
                let mut config = loaded?;
                if let Some(port) = port {
                    config.web.port = *port;
                }
                if let Some(bind) = bind {
                    config.web.bind_address.clone_from(bind);
                }

                let poller = Arc::new(build_orchestrator(&config)?);
                WebServer::new(poller, config.web.clone()).run().await?;
            }
            Commands::Poll => {
                let config = loaded?;
                let poller = build_orchestrator(&config)?;
                let outcome = poller.run_poll().await;
                print_outcome(&outcome, self.format);
                if !outcome.ok {
                    return Err(CliError::CommandFailed(
                        outcome.error.unwrap_or_else(|| "poll failed".to_string()),
                    ));
                }
            }
            Commands::Daemon { interval } => {
                let config = loaded?;
                let every = interval.map_or_else(|| config.poll_interval(), Duration::from_secs);
                if every.is_zero() {
                    return Err(CliError::CommandFailed("interval must be > 0".to_string()));
                }

                let poller = Arc::new(build_orchestrator(&config)?);
                run_daemon(poller, every, self.format).await;
            }
            Commands::Purge => {
                let config = loaded?;
                let store = open_store(&config)?;
                let purger = RetentionPurger::new(store.clone(), config.retention.max_age_hours);

                let now = Utc::now();
                let purged = purger.purge(now).await?;
                let report = PurgeReport {
                    store: store.name().to_string(),
                    cutoff: format_snapshot_ts(&purger.cutoff(now)),
                    purged,
                };

                match self.format {
                    OutputFormat::Json => print_output(&report, OutputFormat::Json),
                    OutputFormat::Text => println!(
                        "Purged {} row(s) older than {} from {}",
                        report.purged, report.cutoff, report.store
                    ),
                }
            }
            Commands::Config { command } => match command {
                ConfigCommands::Show => {
                    let config = loaded?;
                    match self.format {
                        OutputFormat::Json => print_output(&config, OutputFormat::Json),
                        OutputFormat::Text => print!("{}", config.to_toml()?),
                    }
                }
                ConfigCommands::Paths => {
                    let paths: Vec<ConfigPath> = WpConfig::config_paths()
                        .into_iter()
                        .map(|p| ConfigPath {
                            exists: p.exists(),
                            path: p.display().to_string(),
                        })
                        .collect();

                    match self.format {
                        OutputFormat::Json => print_output(&paths, OutputFormat::Json),
                        OutputFormat::Text => {
                            for entry in &paths {
                                let marker = if entry.exists { "*" } else { " " };
                                println!("{marker} {}", entry.path);
                            }
                        }
                    }
                }
                ConfigCommands::Validate => {
                    let config = loaded?;
                    if config.store.backend == StoreBackend::Supabase && config.store.url.is_empty()
                    {
                        warn!("store.url is empty; the supabase backend will refuse to start");
                    }
                    println!("Configuration is valid");
                }
            },
        }

        Ok(())
    }
}

/// Open the configured store backend
///
/// # Errors
///
/// Returns [`CliError::StoreError`] if the backend cannot be opened.
pub fn open_store(config: &WpConfig) -> Result<Arc<dyn SnapshotStore>, CliError> {
    let store: Arc<dyn SnapshotStore> = match config.store.backend {
        StoreBackend::Supabase => Arc::new(RestStore::from_config(&config.store)?),
        StoreBackend::Duckdb => Arc::new(DuckStore::open(&config.store.db_path)?),
    };
    Ok(store)
}

/// Build the live pipeline: HTTP SOAP transport plus the configured store
///
/// # Errors
///
/// Returns a [`CliError`] if the transport or the store cannot be built.
pub fn build_orchestrator(config: &WpConfig) -> Result<SnapshotOrchestrator, CliError> {
    let transport = Arc::new(HttpSoapTransport::new(&config.five9)?);
    let store = open_store(config)?;
    info!(store = store.name(), "Snapshot pipeline ready");
    Ok(SnapshotOrchestrator::from_config(transport, store, config))
}

/// Poll every `every` until Ctrl-C. Each poll completes before the next tick.
async fn run_daemon(poller: Arc<SnapshotOrchestrator>, every: Duration, format: OutputFormat) {
    let mut ticker = tokio::time::interval(every);
    ticker.set_missed_tick_behavior(MissedTickBehavior::Delay);

    let shutdown = tokio::signal::ctrl_c();
    tokio::pin!(shutdown);

    info!(interval_secs = every.as_secs(), "Daemon started");
    loop {
        tokio::select! {
            _ = ticker.tick() => {
                let outcome = poller.run_poll().await;
                print_outcome(&outcome, format);
            }
            _ = &mut shutdown => {
                info!("Shutdown signal received");
                break;
            }
        }
    }
}

/// One-line summary of a poll
#[must_use]
pub fn format_outcome_text(outcome: &PollOutcome) -> String {
    if outcome.ok {
        let mut line = format!(
            "ok snapshot_ts={} agents_total={} agents_written={} purged={} elapsed_sec={:.2}",
            outcome.snapshot_ts,
            outcome.agents_total,
            outcome.agents_written,
            outcome.purged,
            outcome.elapsed_sec
        );
        if let Some(err) = &outcome.purge_error {
            line.push_str(&format!(" purge_error={err:?}"));
        }
        line
    } else {
        format!(
            "failed snapshot_ts={} stage={} error={:?}",
            outcome.snapshot_ts,
            outcome
                .failed_stage
                .map_or("unknown", wp_collect::PollStage::as_str),
            outcome.error.as_deref().unwrap_or_default()
        )
    }
}

fn print_outcome(outcome: &PollOutcome, format: OutputFormat) {
    match format {
        OutputFormat::Json => print_output(outcome, format),
        OutputFormat::Text => println!("{}", format_outcome_text(outcome)),
    }
}

fn print_output<T: Serialize>(value: &T, format: OutputFormat) {
    let json = match format {
        OutputFormat::Json => serde_json::to_string_pretty(value),
        OutputFormat::Text => serde_json::to_string(value),
    }
    .unwrap_or_else(|e| format!(r#"{{"error": "serialization failed: {e}"}}"#));
    println!("{json}");
}
