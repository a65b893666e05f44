//! Append-only CSV output

use serde::Serialize;
use std::fs::OpenOptions;
use std::path::{Path, PathBuf};

use super::{ReportSink, SinkError};
use crate::types::{BatchReport, Slot};

/// Column schema. Append-only across runs, so columns are never reordered.
pub const CSV_HEADER: [&str; 18] = [
    "start_slot",
    "end_slot",
    "total_transactions",
    "average_tps",
    "max_fee",
    "average_fee",
    "median_fee",
    "max_cu",
    "average_cu",
    "median_cu",
    "average_success_cu",
    "cu_price",
    "cu_price_success",
    "block_rewards",
    "seigniorage",
    "total_supply",
    "inflation_rate",
    "price_usd",
];

#[derive(Debug, Serialize)]
struct CsvRow {
    start_slot: Slot,
    end_slot: Slot,
    total_transactions: u64,
    average_tps: f64,
    max_fee: f64,
    average_fee: f64,
    median_fee: f64,
    max_cu: f64,
    average_cu: f64,
    median_cu: f64,
    average_success_cu: f64,
    cu_price: f64,
    cu_price_success: f64,
    block_rewards: f64,
    seigniorage: f64,
    total_supply: Option<f64>,
    inflation_rate: Option<f64>,
    price_usd: Option<f64>,
}

impl From<&BatchReport> for CsvRow {
    fn from(r: &BatchReport) -> Self {
        Self {
            start_slot: r.start_slot,
            end_slot: r.end_slot,
            total_transactions: r.total_transactions,
            average_tps: r.average_tps,
            max_fee: r.fee.max,
            average_fee: r.fee.average,
            median_fee: r.fee.median,
            max_cu: r.compute_units.max,
            average_cu: r.compute_units.average,
            median_cu: r.compute_units.median,
            average_success_cu: r.average_success_cu,
            cu_price: r.cu_price,
            cu_price_success: r.cu_price_success,
            block_rewards: r.average_block_reward,
            seigniorage: r.average_seigniorage,
            total_supply: r.total_supply,
            inflation_rate: r.inflation_rate,
            price_usd: r.price,
        }
    }
}

/// Appends one row per report; the header is written only to a new or
/// empty file
#[derive(Debug, Clone)]
pub struct CsvSink {
    path: PathBuf,
}

impl CsvSink {
    pub fn new(path: impl AsRef<Path>) -> Self {
        Self {
            path: path.as_ref().to_path_buf(),
        }
    }

    pub fn path(&self) -> &Path {
        &self.path
    }
}

impl ReportSink for CsvSink {
    fn name(&self) -> &'static str {
        "csv"
    }

    fn publish(&self, report: &BatchReport) -> Result<(), SinkError> {
        let file = OpenOptions::new()
            .create(true)
            .append(true)
            .open(&self.path)?;
        let needs_header = file.metadata()?.len() == 0;

        let mut writer = csv::WriterBuilder::new()
            .has_headers(false)
            .from_writer(file);
        if needs_header {
            writer.write_record(CSV_HEADER)?;
        }
        writer.serialize(CsvRow::from(report))?;
        writer.flush()?;
        Ok(())
    }
}
