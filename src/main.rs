//! XRPL Watch
//!
//! Command line entry point: live dashboard, account and price lookups, and
//! offline replay of captured upstream logs.

#![deny(unused_imports)]
#![deny(unused_mut)]
#![deny(unused_variables)]
#![warn(unused_must_use)]

use std::path::{Path, PathBuf};
use std::sync::Arc;

use anyhow::{bail, Context, Result};
use chrono::Utc;
use clap::{Parser, Subcommand};
use tracing::{error, info, warn};
use tracing_subscriber::{layer::SubscriberExt, util::SubscriberInitExt};

use xrpl_watch::config::Config;
use xrpl_watch::dashboard::{self, format_xrp, FrameContext};
use xrpl_watch::endpoints;
use xrpl_watch::lookup::LookupClient;
use xrpl_watch::metrics::Metrics;
use xrpl_watch::monitor::LedgerMonitor;
use xrpl_watch::streaming::{ChannelConnector, StreamConnector, WebSocketConnector};

/// Command line arguments
#[derive(Parser, Debug)]
#[command(author, version, about, long_about = None)]
struct Args {
    /// Path to configuration file
    #[arg(short, long, default_value = "xrpl-watch.toml")]
    config: PathBuf,

    /// Enable verbose logging
    #[arg(short, long)]
    verbose: bool,

    /// Emit logs as JSON lines
    #[arg(long)]
    json_logs: bool,

    #[command(subcommand)]
    command: Option<Command>,
}

#[derive(Subcommand, Debug)]
enum Command {
    /// Live dashboard (default)
    Watch {
        /// Whale threshold in XRP, overrides the config file
        #[arg(long)]
        threshold: Option<u64>,

        /// Show only whales in the live feed
        #[arg(long)]
        whales_only: bool,
    },
    /// Look up an account's balance, sequence and flags
    Account {
        address: String,
    },
    /// Fetch the current XRP/USD price
    Price,
    /// Feed a captured JSON-lines upstream log through the pipeline
    Replay {
        file: PathBuf,
    },
}

#[tokio::main]
async fn main() -> Result<()> {
    let args = Args::parse();

    init_logging(args.verbose, args.json_logs)?;

    let config = Config::from_file_with_env(&args.config)
        .with_context(|| format!("Failed to load config from {}", args.config.display()))?;

    match args.command.unwrap_or(Command::Watch {
        threshold: None,
        whales_only: false,
    }) {
        Command::Watch {
            threshold,
            whales_only,
        } => {
            let mut config = config;
            if let Some(threshold) = threshold {
                config.monitor.whale_threshold = threshold;
            }
            config.display.whales_only |= whales_only;
            config.validate()?;
            run_watch(config).await
        }
        Command::Account { address } => run_account(&config, &address).await,
        Command::Price => run_price(&config).await,
        Command::Replay { file } => run_replay(&config, &file).await,
    }
}

/// Initialize logging subsystem. Logs go to stderr so the dashboard owns stdout.
fn init_logging(verbose: bool, json: bool) -> Result<()> {
    let env_filter = if verbose {
        "xrpl_watch=debug,info"
    } else {
        "xrpl_watch=info,warn"
    };
    let filter = tracing_subscriber::EnvFilter::try_from_default_env()
        .unwrap_or_else(|_| env_filter.into());

    let registry = tracing_subscriber::registry().with(filter);
    if json {
        registry
            .with(
                tracing_subscriber::fmt::layer()
                    .json()
                    .with_writer(std::io::stderr),
            )
            .try_init()?;
    } else {
        registry
            .with(
                tracing_subscriber::fmt::layer()
                    .with_target(true)
                    .with_writer(std::io::stderr),
            )
            .try_init()?;
    }

    Ok(())
}

async fn run_watch(config: Config) -> Result<()> {
    info!("Starting XRPL Watch");
    info!("Version: {}", env!("CARGO_PKG_VERSION"));

    let connector: Arc<dyn StreamConnector> = Arc::new(WebSocketConnector::new(&config.stream.url));
    let monitor = LedgerMonitor::new(&config.monitor, connector, config.stream.connect_timeout())?;

    let price_usd = if config.lookup.fetch_price {
        LookupClient::from_config(&config.lookup)?.xrp_price_or_zero().await
    } else {
        0.0
    };

    let metrics = Arc::new(Metrics::new()?);
    if config.monitoring.enable_metrics {
        let port = config.monitoring.metrics_port;
        let metrics = Arc::clone(&metrics);
        tokio::spawn(async move {
            if let Err(e) = endpoints::endpoint_server(port, metrics).await {
                error!(error = %e, "Metrics server error");
            }
        });
    }

    monitor.start().await;

    let result = watch_loop(&config, &monitor, &metrics, price_usd).await;
    monitor.shutdown().await;
    info!(telemetry = %monitor.telemetry().to_json(), "Monitor stopped");
    result
}

async fn watch_loop(
    config: &Config,
    monitor: &LedgerMonitor,
    metrics: &Metrics,
    price_usd: f64,
) -> Result<()> {
    let records = monitor.subscribe_records();
    let mut state_rx = monitor.watch_state();
    let mut ticker = tokio::time::interval(config.display.refresh_interval());
    let ctrl_c = tokio::signal::ctrl_c();
    tokio::pin!(ctrl_c);

    loop {
        tokio::select! {
            _ = &mut ctrl_c => {
                info!("Ctrl-C received, shutting down");
                return Ok(());
            }
            _ = ticker.tick() => {
                for record in records.drain() {
                    if record.is_whale {
                        info!(
                            amount = %format_xrp(record.amount()),
                            from = %record.source_account,
                            to = %record.destination_account,
                            "Whale alert"
                        );
                    }
                }
                draw(config, monitor, metrics, price_usd);
            }
            changed = state_rx.changed() => {
                if changed.is_err() {
                    return Ok(());
                }
                let state = state_rx.borrow_and_update().clone();
                if state.is_failed() {
                    draw(config, monitor, metrics, price_usd);
                    error!(%state, "Session failed, restart required");
                    bail!("session ended: {}", state);
                }
            }
        }
    }
}

fn draw(config: &Config, monitor: &LedgerMonitor, metrics: &Metrics, price_usd: f64) {
    let snapshot = monitor.snapshot();
    let now = Utc::now();
    let rate = snapshot.recent_rate(now, monitor.rate_window());
    let state = monitor.state();

    metrics.observe(&snapshot, rate, &monitor.telemetry().snapshot(), &state);

    let ctx = FrameContext {
        state,
        endpoint: monitor.endpoint(),
        price_usd,
        whale_threshold: monitor.whale_threshold(),
        rate,
        rate_window_secs: config.monitor.rate_window_secs,
        now,
    };
    print!("\x1B[2J\x1B[H{}", dashboard::render(&snapshot, &ctx, &config.display));
}

async fn run_account(config: &Config, address: &str) -> Result<()> {
    let client = LookupClient::from_config(&config.lookup)?;
    match client.account_info(address).await {
        Ok(info) => {
            println!("Account   {}", info.account);
            println!("Balance   {} XRP", format_xrp(info.balance));
            println!("Sequence  {}", info.sequence);
            println!("Flags     {:#x}", info.flags);
        }
        Err(e) => {
            warn!(address, error = %e, "Account lookup failed");
            println!("Account {} not found", address);
        }
    }
    Ok(())
}

async fn run_price(config: &Config) -> Result<()> {
    let client = LookupClient::from_config(&config.lookup)?;
    println!("XRP/USD {:.4}", client.xrp_price_or_zero().await);
    Ok(())
}

async fn run_replay(config: &Config, file: &Path) -> Result<()> {
    let content = tokio::fs::read_to_string(file)
        .await
        .with_context(|| format!("Failed to read {}", file.display()))?;
    let lines: Vec<String> = content
        .lines()
        .map(str::trim)
        .filter(|line| !line.is_empty())
        .map(str::to_owned)
        .collect();
    info!(frames = lines.len(), file = %file.display(), "Replaying capture");

    let connector: Arc<dyn StreamConnector> = Arc::new(ChannelConnector::from_lines(lines));
    let monitor = LedgerMonitor::new(&config.monitor, connector, config.stream.connect_timeout())?;

    monitor.start().await;
    // The in-memory stream ends after the last frame, which the session
    // reports as an upstream close
    monitor.wait_for_state(|state| !state.is_active()).await;
    monitor.shutdown().await;

    let snapshot = monitor.snapshot();
    let now = snapshot
        .recent
        .last()
        .map(|record| record.observed_at)
        .unwrap_or(snapshot.taken_at);
    let ctx = FrameContext {
        state: monitor.state(),
        endpoint: file.display().to_string(),
        price_usd: 0.0,
        whale_threshold: monitor.whale_threshold(),
        rate: snapshot.recent_rate(now, monitor.rate_window()),
        rate_window_secs: config.monitor.rate_window_secs,
        now,
    };
    print!("{}", dashboard::render(&snapshot, &ctx, &config.display));
    println!("\nTelemetry {}", monitor.telemetry().to_json());
    Ok(())
}
