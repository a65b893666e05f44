//! Embedded report store

use sled::{Db, Tree};
use std::path::Path;

use super::{ReportSink, SinkError};
use crate::types::BatchReport;

const BATCH_TREE: &str = "batch_reports";

/// Batch reports keyed by big-endian start slot, so key order is slot order
pub struct StoreSink {
    db: Db,
    batches: Tree,
}

impl StoreSink {
    pub fn open<P: AsRef<Path>>(path: P) -> Result<Self, SinkError> {
        let db = sled::open(path)?;
        let batches = db.open_tree(BATCH_TREE)?;
        Ok(Self { db, batches })
    }

    /// Every stored report, newest start slot first
    pub fn read_all_desc(&self) -> Result<Vec<BatchReport>, SinkError> {
        let mut reports = Vec::with_capacity(self.batches.len());
        for item in self.batches.iter().rev() {
            let (_, value) = item?;
            reports.push(serde_json::from_slice(&value)?);
        }
        Ok(reports)
    }

    pub fn len(&self) -> usize {
        self.batches.len()
    }

    pub fn is_empty(&self) -> bool {
        self.batches.is_empty()
    }
}

impl ReportSink for StoreSink {
    fn name(&self) -> &'static str {
        "store"
    }

    fn publish(&self, report: &BatchReport) -> Result<(), SinkError> {
        let value = serde_json::to_vec(report)?;
        self.batches
            .insert(report.start_slot.to_be_bytes().to_vec(), value)?;
        self.db.flush()?;
        Ok(())
    }
}
