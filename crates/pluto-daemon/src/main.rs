//! Pluto Discovery Daemon - Main entry point
//!
//! Serves the discovery HTTP API, or runs a single discovery pass with
//! `--scan-once`.

mod api;
mod config;
mod server;
mod state;
mod ws;

use anyhow::Result;
use clap::Parser;
use pluto_discovery::DiscoveryFilter;
use std::path::PathBuf;
use tracing::{info, Level};
use tracing_subscriber::{EnvFilter, FmtSubscriber};

#[derive(Parser, Debug)]
#[command(name = "pluto")]
#[command(about = "ASIC miner discovery and validation daemon")]
#[command(version)]
struct Args {
    /// Path to configuration file
    #[arg(short, long, default_value = "pluto.toml")]
    config: PathBuf,

    /// Bind address for the HTTP API
    #[arg(short, long)]
    bind: Option<String>,

    /// Log level (trace, debug, info, warn, error); RUST_LOG takes precedence
    #[arg(short, long, default_value = "info")]
    log_level: String,

    /// Run a single discovery pass and exit
    #[arg(long)]
    scan_once: bool,
}

#[tokio::main]
async fn main() -> Result<()> {
    let args = Args::parse();

    // Initialize logging
    let level = match args.log_level.to_lowercase().as_str() {
        "trace" => Level::TRACE,
        "debug" => Level::DEBUG,
        "info" => Level::INFO,
        "warn" => Level::WARN,
        "error" => Level::ERROR,
        _ => Level::INFO,
    };
    let filter = EnvFilter::try_from_default_env()
        .unwrap_or_else(|_| EnvFilter::new(level.as_str().to_lowercase()));

    let subscriber = FmtSubscriber::builder()
        .with_env_filter(filter)
        .with_target(true)
        .finish();

    tracing::subscriber::set_global_default(subscriber)?;

    info!("Pluto discovery v{}", env!("CARGO_PKG_VERSION"));

    // Load configuration: file, then environment, then flags
    let mut config = config::load_config(&args.config)?;
    config.apply_env(|key| std::env::var(key).ok())?;
    if let Some(bind) = args.bind {
        config.daemon.bind = bind;
    }
    config.validate()?;

    info!(
        oracle = config.oracle.base_url.as_deref().unwrap_or_default(),
        interfaces = config.arp_scan.interfaces.as_deref().unwrap_or("auto"),
        mock = config.mock.enabled,
        "Configuration loaded"
    );

    let state = state::AppState::new(&config).await?;

    if args.scan_once {
        info!("Running single discovery pass");
        let report = state.orchestrator.discover(&DiscoveryFilter::default()).await?;
        println!(
            "Scanned {} interface(s), {} candidate(s), {} miner(s):",
            report.interfaces.len(),
            report.candidates + report.mock_candidates,
            report.miners.len()
        );
        for miner in &report.miners {
            println!("  - {} ({}) at {}", miner.miner_type, miner.mac, miner.ip);
            if let Some(hostname) = miner.hostname() {
                println!("    Hostname: {}", hostname);
            }
        }
        for failed in &report.failed_interfaces {
            println!("  ! {}: {}", failed.interface, failed.error);
        }
        for failed in &report.persistence_errors {
            println!("  ! not stored {}: {}", failed.mac, failed.error);
        }
    } else {
        server::run(state, &config.daemon.bind).await?;
    }

    Ok(())
}
