//! Structured logging for pipeline events

use crate::analysis::SkippedSlot;
use crate::observability::RunId;
use crate::types::{BatchReport, PerBlockStats, Slot};

/// Structured logger for pipeline events
#[derive(Debug, Clone, Default)]
pub struct PipelineLogger {
    run_id: RunId,
}

impl PipelineLogger {
    pub fn new(run_id: RunId) -> Self {
        Self { run_id }
    }

    pub fn run_id(&self) -> &RunId {
        &self.run_id
    }

    pub fn log_block_analyzed(&self, stats: &PerBlockStats) {
        tracing::debug!(
            run_id = %self.run_id,
            slot = stats.slot,
            tx_count = stats.tx_count_all,
            tx_success = stats.tx_count_success,
            avg_fee = stats.avg_fee_all,
            cu_price = stats.cu_price_all,
            fee_unit = %stats.fee_unit,
            "Block analyzed"
        );
    }

    pub fn log_slot_skipped(&self, slot: Slot, attempts: u32, reason: &SkippedSlot) {
        match reason {
            SkippedSlot::MissingBlock | SkippedSlot::EmptyBlock => tracing::info!(
                run_id = %self.run_id,
                slot,
                attempts,
                reason = %reason,
                "Skipping slot"
            ),
            _ => tracing::warn!(
                run_id = %self.run_id,
                slot,
                attempts,
                reason = %reason,
                "Skipping slot after fetch failure"
            ),
        }
    }

    pub fn log_batch_emitted(&self, report: &BatchReport) {
        tracing::info!(
            run_id = %self.run_id,
            start_slot = report.start_slot,
            end_slot = report.end_slot,
            blocks = report.block_count,
            tx_count = report.total_transactions,
            average_tps = report.average_tps,
            "Batch emitted"
        );
    }

    pub fn log_batch_skipped(&self, start_slot: Slot, end_slot: Slot, reason: &str) {
        tracing::info!(
            run_id = %self.run_id,
            start_slot,
            end_slot,
            reason = %reason,
            "Batch skipped"
        );
    }

    pub fn log_price_unavailable(&self, start_slot: Slot) {
        tracing::warn!(
            run_id = %self.run_id,
            start_slot,
            "Price unavailable, fiat fields omitted for this batch"
        );
    }

    pub fn log_sink_failure(&self, sink: &str, error: &dyn std::fmt::Display) {
        tracing::error!(
            run_id = %self.run_id,
            sink = %sink,
            error = %error,
            "Sink write failed"
        );
    }

    pub fn warn(&self, message: &str) {
        tracing::warn!(
            run_id = %self.run_id,
            message = %message,
            "Warning"
        );
    }
}
