//! Output sinks for completed batch reports
//!
//! - `log_sink`: human-readable report through `tracing`
//! - `csv_sink`: append-only rows with a fixed header
//! - `store_sink`: embedded key-value store, read back by `read_reports`

use thiserror::Error;

use crate::config::{StorageConfig, StorageFormat};
use crate::types::BatchReport;

pub mod csv_sink;
pub mod log_sink;
pub mod store_sink;

pub use csv_sink::{CsvSink, CSV_HEADER};
pub use log_sink::{render_report, LogSink};
pub use store_sink::StoreSink;

#[derive(Debug, Error)]
pub enum SinkError {
    #[error("I/O error: {0}")]
    Io(#[from] std::io::Error),

    #[error("CSV error: {0}")]
    Csv(#[from] csv::Error),

    #[error("Store error: {0}")]
    Store(#[from] sled::Error),

    #[error("Serialization error: {0}")]
    Serialize(#[from] serde_json::Error),
}

/// Destination for batch reports
///
/// A failing sink must not stop the pipeline; callers log and count the
/// error and move on to the next batch.
pub trait ReportSink: Send + Sync {
    fn name(&self) -> &'static str;

    fn publish(&self, report: &BatchReport) -> Result<(), SinkError>;
}

/// Sinks for the configured storage format. The log sink is always present.
pub fn build_sinks(storage: &StorageConfig) -> Result<Vec<Box<dyn ReportSink>>, SinkError> {
    let mut sinks: Vec<Box<dyn ReportSink>> = vec![Box::new(LogSink)];
    match storage.format {
        StorageFormat::Csv => sinks.push(Box::new(CsvSink::new(&storage.csv_path))),
        StorageFormat::Db => sinks.push(Box::new(StoreSink::open(&storage.db_path)?)),
        StorageFormat::None => {}
    }
    Ok(sinks)
}
