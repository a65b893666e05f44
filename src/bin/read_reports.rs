//! Read Reports - prints batch reports persisted by the `db` storage format
//!
//! Reports are listed newest start slot first.

use anyhow::{Context, Result};
use clap::Parser;
use fee_report::sinks::{render_report, StoreSink};
use std::path::PathBuf;
use tracing::Level;
use tracing_subscriber::FmtSubscriber;

#[derive(Parser, Debug)]
#[command(author, version, about = "Print stored fee reports", long_about = None)]
struct Args {
    /// Store directory written by `fee-report --storage db`
    #[arg(default_value = "fee_report.db")]
    path: PathBuf,

    /// Print at most this many reports
    #[arg(short, long)]
    limit: Option<usize>,

    /// Print reports as JSON lines
    #[arg(long)]
    json: bool,

    /// Enable verbose logging
    #[arg(short, long)]
    verbose: bool,
}

fn main() -> Result<()> {
    let args = Args::parse();

    let level = if args.verbose { Level::DEBUG } else { Level::WARN };
    let subscriber = FmtSubscriber::builder().with_max_level(level).finish();
    tracing::subscriber::set_global_default(subscriber)?;

    let store = StoreSink::open(&args.path)
        .with_context(|| format!("Failed to open store at {}", args.path.display()))?;
    let reports = store.read_all_desc().context("Failed to read stored reports")?;

    if reports.is_empty() {
        println!("No reports found in {}", args.path.display());
        return Ok(());
    }

    let limit = args.limit.unwrap_or(reports.len());
    for report in reports.iter().take(limit) {
        if args.json {
            println!("{}", serde_json::to_string(report)?);
        } else {
            println!("{}\n", render_report(report));
        }
    }

    tracing::debug!(shown = limit.min(reports.len()), total = reports.len(), "Done");
    Ok(())
}
