//! Fee Report - Solana fee and compute-unit batch reporter
//!
//! Samples recent (or historical) blocks, drops voting transactions, and
//! publishes per-batch fee, compute-unit, throughput and reward statistics.
//!
//! ## Outputs
//!
//! - **Log**: human-readable report per batch
//! - **Storage**: CSV rows or an embedded store, per `storage.format`
//! - **HTTP**: `/data`, `/batches`, `/metrics` and `/health`

use anyhow::{Context, Result};
use clap::Parser;
use std::sync::Arc;
use tokio_util::sync::CancellationToken;
use tracing::{error, info, warn};
use tracing_subscriber::{layer::SubscriberExt, util::SubscriberInitExt};

use fee_report::analysis::{BatchAggregator, BlockAnalyzer};
use fee_report::config::{Config, StorageFormat};
use fee_report::endpoints::{self, ServerState};
use fee_report::ledger::SolanaLedgerClient;
use fee_report::observability::RunId;
use fee_report::poll_loop::{PollLoop, PollSettings};
use fee_report::price::CoinGeckoClient;
use fee_report::sinks::build_sinks;
use fee_report::structured_logging::PipelineLogger;
use fee_report::types::{FeeUnit, Slot};
use fee_report::window::SlidingWindow;

/// Command line arguments
#[derive(Parser, Debug)]
#[command(author, version, about, long_about = None)]
struct Args {
    /// Path to configuration file
    #[arg(short, long, default_value = "config.toml")]
    config: String,

    /// Number of batches to backfill before following the tip
    #[arg(short = 'n', long)]
    samples: Option<usize>,

    /// Blocks per batch (1-100)
    #[arg(short, long)]
    batch_size: Option<usize>,

    /// Delay between block fetches, in seconds
    #[arg(short, long)]
    delay: Option<f64>,

    /// Where batch reports are stored
    #[arg(short, long, value_enum)]
    storage: Option<StorageFormat>,

    /// First slot of a historical range
    #[arg(long)]
    start_slot: Option<Slot>,

    /// Last slot of a historical range
    #[arg(long)]
    end_slot: Option<Slot>,

    /// RPC endpoint URL
    #[arg(long)]
    rpc_url: Option<String>,

    /// Port of the data endpoint
    #[arg(long)]
    port: Option<u16>,

    /// Denomination of fee outputs
    #[arg(long, value_enum)]
    fee_unit: Option<FeeUnit>,

    /// Do not start the data endpoint
    #[arg(long)]
    no_server: bool,

    /// Enable verbose logging
    #[arg(short, long)]
    verbose: bool,

    /// Emit logs as JSON
    #[arg(long)]
    log_json: bool,
}

#[tokio::main]
async fn main() -> Result<()> {
    let args = Args::parse();

    init_logging(args.verbose, args.log_json)?;

    info!("Starting fee report");
    info!("Version: {}", env!("CARGO_PKG_VERSION"));

    let mut config = load_config(&args.config)?;
    apply_args(&mut config, &args);
    config.validate().context("Invalid configuration")?;

    let run_id = RunId::new();
    let logger = PipelineLogger::new(run_id.clone());
    info!(
        run_id = %run_id,
        rpc = %config.rpc.url,
        batch_size = config.sampling.batch_size,
        fee_unit = %config.sampling.fee_unit,
        "Configuration loaded"
    );

    let client = Arc::new(SolanaLedgerClient::new(
        &config.rpc.url,
        config.rpc_timeout(),
        config.commitment()?,
    ));
    let analyzer = BlockAnalyzer::new(
        config.retry_policy(),
        config.sampling.include_rewards,
        config.sampling.fee_unit,
        logger.clone(),
    );
    let aggregator = BatchAggregator::new(config.sampling.fee_unit, config.nominal_block_time());
    let sinks = build_sinks(&config.storage).context("Failed to open report storage")?;

    let state = ServerState {
        blocks: SlidingWindow::new(config.sampling.window_capacity),
        batches: SlidingWindow::new(config.sampling.batch_window_capacity),
    };

    let mut poll = PollLoop::new(
        PollSettings::from_config(&config),
        client,
        analyzer,
        aggregator,
        logger,
    )
    .with_sinks(sinks)
    .with_windows(state.blocks.clone(), state.batches.clone());

    if config.price.enabled {
        let price = CoinGeckoClient::from_config(&config.price)
            .context("Failed to build price client")?;
        poll = poll.with_price(Arc::new(price));
    }

    let cancel = CancellationToken::new();

    let server = if config.server.enabled {
        let bind = config.server.bind.clone();
        let port = config.server.port;
        let cancel = cancel.clone();
        Some(tokio::spawn(async move {
            if let Err(e) = endpoints::endpoint_server(&bind, port, state, cancel).await {
                error!("Data endpoint error: {}", e);
            }
        }))
    } else {
        None
    };

    {
        let cancel = cancel.clone();
        tokio::spawn(async move {
            match tokio::signal::ctrl_c().await {
                Ok(()) => info!("Received shutdown signal"),
                Err(e) => warn!("Failed to listen for shutdown signal: {}", e),
            }
            cancel.cancel();
        });
    }

    poll.run(cancel.clone()).await;

    if let Some(server) = server {
        if !cancel.is_cancelled() {
            info!("Sampling finished, still serving the final snapshot until shutdown");
        }
        cancel.cancelled().await;
        if let Err(e) = server.await {
            error!("Data endpoint task failed: {}", e);
        }
    }

    info!("Shutting down gracefully...");
    Ok(())
}

/// Initialize logging subsystem
fn init_logging(verbose: bool, json: bool) -> Result<()> {
    let env_filter = if verbose {
        "fee_report=debug,info"
    } else {
        "fee_report=info,warn"
    };

    let registry = tracing_subscriber::registry().with(
        tracing_subscriber::EnvFilter::try_from_default_env()
            .unwrap_or_else(|_| env_filter.into()),
    );

    if json {
        registry
            .with(tracing_subscriber::fmt::layer().json().with_target(true))
            .try_init()?;
    } else {
        registry
            .with(tracing_subscriber::fmt::layer().with_target(true))
            .try_init()?;
    }

    Ok(())
}

/// Load configuration from file with fallback to defaults
fn load_config(path: &str) -> Result<Config> {
    if std::path::Path::new(path).exists() {
        Config::from_file_with_env(path)
            .with_context(|| format!("Failed to load config from {}", path))
    } else {
        warn!("Config file '{}' not found, using defaults", path);
        dotenvy::dotenv().ok();
        let mut config = Config::default();
        config.apply_env();
        Ok(config)
    }
}

/// Command line flags win over file and environment values
fn apply_args(config: &mut Config, args: &Args) {
    let sampling = &mut config.sampling;
    if let Some(samples) = args.samples {
        sampling.samples = samples;
    }
    if let Some(batch_size) = args.batch_size {
        sampling.batch_size = batch_size;
    }
    if let Some(delay) = args.delay {
        sampling.delay_secs = delay;
    }
    if let Some(fee_unit) = args.fee_unit {
        sampling.fee_unit = fee_unit;
    }
    if args.start_slot.is_some() || args.end_slot.is_some() {
        sampling.start_slot = args.start_slot;
        sampling.end_slot = args.end_slot;
    }
    if let Some(format) = args.storage {
        config.storage.format = format;
    }
    if let Some(url) = &args.rpc_url {
        config.rpc.url = url.clone();
    }
    if let Some(port) = args.port {
        config.server.port = port;
    }
    if args.no_server {
        config.server.enabled = false;
    }
}
