//! Poll loop: drives block analysis, batching and publication
//!
//! States run `Initializing -> Steady -> Stopped` in live mode and
//! `Initializing -> Stopped` for a historical range. Slots are fetched one at
//! a time, so window pushes follow processing order. Cancellation is observed
//! at every suspension point; a fetch abandoned by cancellation never reaches
//! a window.

use std::sync::atomic::{AtomicU8, Ordering};
use std::sync::Arc;
use std::time::Duration;
use tokio::time::{interval, sleep, MissedTickBehavior};
use tokio_util::sync::CancellationToken;
use tracing::{debug, info, warn};

use crate::analysis::{retry_with_backoff, BatchAggregator, BatchExtras, BlockAnalyzer, RetryOutcome};
use crate::config::Config;
use crate::ledger::{LedgerError, RemoteLedgerClient};
use crate::metrics::metrics;
use crate::price::PriceQuote;
use crate::sinks::ReportSink;
use crate::structured_logging::PipelineLogger;
use crate::types::{BatchReport, PerBlockStats, Slot};
use crate::window::SlidingWindow;

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
#[repr(u8)]
pub enum LoopState {
    Initializing = 0,
    Steady = 1,
    Stopped = 2,
}

impl LoopState {
    fn from_u8(value: u8) -> Self {
        match value {
            0 => LoopState::Initializing,
            1 => LoopState::Steady,
            _ => LoopState::Stopped,
        }
    }
}

/// Which slots the loop starts from
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum RunMode {
    /// Backfill `samples` batches below the tip, then follow the tip
    Live { samples: usize },
    /// Process `end` down to `start` (both inclusive), then stop
    Historical { start: Slot, end: Slot },
}

#[derive(Debug, Clone, PartialEq)]
pub struct PollSettings {
    pub mode: RunMode,
    pub batch_size: usize,
    /// Pause between block fetches while backfilling
    pub fetch_delay: Duration,
    /// Tip polling period in steady mode
    pub poll_interval: Duration,
    pub include_supply: bool,
    /// Asset to price each batch in; `None` disables the lookup
    pub price_asset: Option<String>,
}

impl PollSettings {
    pub fn from_config(config: &Config) -> Self {
        let mode = match config.slot_range() {
            Some((start, end)) => RunMode::Historical { start, end },
            None => RunMode::Live {
                samples: config.sampling.samples,
            },
        };
        Self {
            mode,
            batch_size: config.sampling.batch_size,
            fetch_delay: config.fetch_delay(),
            poll_interval: config.poll_interval(),
            include_supply: config.sampling.include_supply,
            price_asset: config
                .price
                .enabled
                .then(|| config.price.asset.clone()),
        }
    }
}

/// Records of the batch being filled. Skipped slots count toward the batch
/// boundary but contribute no record.
#[derive(Debug, Default)]
struct PendingBatch {
    first_slot: Option<Slot>,
    last_slot: Slot,
    attempted: usize,
    records: Vec<PerBlockStats>,
}

impl PendingBatch {
    fn note(&mut self, slot: Slot, record: Option<PerBlockStats>) {
        self.first_slot.get_or_insert(slot);
        self.last_slot = slot;
        self.attempted += 1;
        self.records.extend(record);
    }

    fn take(&mut self) -> Option<PendingBatch> {
        (self.attempted > 0).then(|| std::mem::take(self))
    }
}

/// The single writer of both windows
pub struct PollLoop {
    settings: PollSettings,
    client: Arc<dyn RemoteLedgerClient>,
    analyzer: BlockAnalyzer,
    aggregator: BatchAggregator,
    price: Option<Arc<dyn PriceQuote>>,
    sinks: Vec<Box<dyn ReportSink>>,
    blocks: SlidingWindow<PerBlockStats>,
    batches: SlidingWindow<BatchReport>,
    state: Arc<AtomicU8>,
    logger: PipelineLogger,
}

impl PollLoop {
    pub fn new(
        settings: PollSettings,
        client: Arc<dyn RemoteLedgerClient>,
        analyzer: BlockAnalyzer,
        aggregator: BatchAggregator,
        logger: PipelineLogger,
    ) -> Self {
        Self {
            settings,
            client,
            analyzer,
            aggregator,
            price: None,
            sinks: Vec::new(),
            blocks: SlidingWindow::new(100),
            batches: SlidingWindow::new(50),
            state: Arc::new(AtomicU8::new(LoopState::Initializing as u8)),
            logger,
        }
    }

    pub fn with_price(mut self, price: Arc<dyn PriceQuote>) -> Self {
        self.price = Some(price);
        self
    }

    pub fn with_sinks(mut self, sinks: Vec<Box<dyn ReportSink>>) -> Self {
        self.sinks = sinks;
        self
    }

    /// Use the given windows instead of the default-sized ones. Pass clones of
    /// windows held by readers.
    pub fn with_windows(
        mut self,
        blocks: SlidingWindow<PerBlockStats>,
        batches: SlidingWindow<BatchReport>,
    ) -> Self {
        self.blocks = blocks;
        self.batches = batches;
        self
    }

    pub fn blocks(&self) -> SlidingWindow<PerBlockStats> {
        self.blocks.clone()
    }

    pub fn batches(&self) -> SlidingWindow<BatchReport> {
        self.batches.clone()
    }

    pub fn state(&self) -> LoopState {
        LoopState::from_u8(self.state.load(Ordering::Acquire))
    }

    fn set_state(&self, state: LoopState) {
        self.state.store(state as u8, Ordering::Release);
        metrics().loop_state.set(state as i64);
        info!(run_id = %self.logger.run_id(), state = ?state, "Poll loop state changed");
    }

    /// Run until the configured work is done (historical mode) or `cancel`
    /// fires. The loop always ends in [`LoopState::Stopped`].
    pub async fn run(&self, cancel: CancellationToken) {
        self.set_state(LoopState::Initializing);

        match self.settings.mode {
            RunMode::Historical { start, end } => {
                info!(start, end, "Processing historical slot range");
                self.backfill((start..=end).rev(), &cancel).await;
            }
            RunMode::Live { samples } => {
                if let Some(tip) = self.wait_for_tip(&cancel).await {
                    let count = samples.max(1).saturating_mul(self.settings.batch_size.max(1));
                    let lowest = tip.saturating_sub(u64::try_from(count - 1).unwrap_or(u64::MAX));
                    info!(tip, lowest, "Backfilling below chain tip");

                    if self.backfill((lowest..=tip).rev(), &cancel).await {
                        self.set_state(LoopState::Steady);
                        self.follow_tip(tip, &cancel).await;
                    }
                }
            }
        }

        self.set_state(LoopState::Stopped);
    }

    /// Analyze `slots` in order, closing a batch every `batch_size` slots.
    /// Returns `false` when cancelled.
    async fn backfill(&self, slots: impl Iterator<Item = Slot>, cancel: &CancellationToken) -> bool {
        let mut pending = PendingBatch::default();

        for (i, slot) in slots.enumerate() {
            if i > 0 && !self.pause(self.settings.fetch_delay, cancel).await {
                return false;
            }
            let record = tokio::select! {
                biased;
                _ = cancel.cancelled() => return false,
                record = self.analyzer.analyze(self.client.as_ref(), slot) => record,
            };
            pending.note(slot, self.record_block(record));

            if pending.attempted >= self.settings.batch_size {
                if let Some(batch) = pending.take() {
                    self.finish_batch(batch, cancel).await;
                }
            }
        }

        if let Some(batch) = pending.take() {
            self.finish_batch(batch, cancel).await;
        }
        !cancel.is_cancelled()
    }

    /// Steady mode: analyze each new tip once, batching every `batch_size`
    /// analyzed blocks
    async fn follow_tip(&self, mut last_analyzed: Slot, cancel: &CancellationToken) {
        let mut ticker = interval(self.settings.poll_interval);
        ticker.set_missed_tick_behavior(MissedTickBehavior::Delay);
        let mut pending = PendingBatch::default();

        loop {
            tokio::select! {
                biased;
                _ = cancel.cancelled() => return,
                _ = ticker.tick() => {}
            }

            let tip = match self.client.current_slot().await {
                Ok(tip) => tip,
                Err(e) => {
                    warn!(error = %e, "Failed to resolve chain tip");
                    continue;
                }
            };
            if tip <= last_analyzed {
                debug!(tip, last_analyzed, "No new slot");
                continue;
            }
            last_analyzed = tip;

            let record = tokio::select! {
                biased;
                _ = cancel.cancelled() => return,
                record = self.analyzer.analyze(self.client.as_ref(), tip) => record,
            };
            if let Some(stats) = self.record_block(record) {
                pending.note(tip, Some(stats));
            }

            if pending.attempted >= self.settings.batch_size {
                if let Some(batch) = pending.take() {
                    self.finish_batch(batch, cancel).await;
                }
            }
        }
    }

    /// Resolve the chain tip, retrying until it succeeds or `cancel` fires
    async fn wait_for_tip(&self, cancel: &CancellationToken) -> Option<Slot> {
        loop {
            let outcome = tokio::select! {
                biased;
                _ = cancel.cancelled() => return None,
                outcome = retry_with_backoff(
                    "current_slot",
                    self.analyzer.retry_policy(),
                    LedgerError::is_retryable,
                    || self.client.current_slot(),
                ) => outcome,
            };

            match outcome {
                RetryOutcome::Success { value, .. } => return Some(value),
                RetryOutcome::Exhausted { attempts, last_error } => {
                    self.logger.warn(&format!(
                        "Could not resolve chain tip after {} attempts: {}",
                        attempts, last_error
                    ));
                    if !self.pause(self.settings.poll_interval, cancel).await {
                        return None;
                    }
                }
            }
        }
    }

    /// Push an analyzed block into the window
    fn record_block(&self, record: Option<PerBlockStats>) -> Option<PerBlockStats> {
        let stats = record?;
        metrics().last_slot.set(stats.slot as i64);
        self.blocks.push(stats.clone());
        metrics().window_len.set(self.blocks.len() as i64);
        Some(stats)
    }

    /// Aggregate and publish a closed batch. A batch whose extras fetch is
    /// cancelled is dropped unpublished.
    async fn finish_batch(&self, batch: PendingBatch, cancel: &CancellationToken) {
        let start_slot = batch.first_slot.unwrap_or(batch.last_slot);
        let end_slot = batch.last_slot;

        if batch.records.is_empty() {
            metrics().batches_skipped.inc();
            self.logger
                .log_batch_skipped(start_slot, end_slot, "every slot was skipped");
            return;
        }

        let extras = tokio::select! {
            biased;
            _ = cancel.cancelled() => {
                debug!(start_slot, end_slot, "Shutdown during extras fetch, batch dropped");
                return;
            }
            extras = self.fetch_extras(start_slot) => extras,
        };
        match self
            .aggregator
            .aggregate(&batch.records, start_slot, end_slot, &extras)
        {
            Ok(report) => self.publish(report),
            Err(e) => {
                metrics().batches_skipped.inc();
                self.logger
                    .log_batch_skipped(start_slot, end_slot, &e.to_string());
            }
        }
    }

    async fn fetch_extras(&self, start_slot: Slot) -> BatchExtras {
        let mut extras = BatchExtras::default();

        if let (Some(price), Some(asset)) = (&self.price, &self.settings.price_asset) {
            extras.price = price.current_price(asset).await;
            if extras.price.is_none() {
                metrics().price_unavailable.inc();
                self.logger.log_price_unavailable(start_slot);
            }
        }

        if self.settings.include_supply {
            extras.total_supply_lamports = match self.client.get_supply().await {
                Ok(supply) => Some(supply),
                Err(e) => {
                    warn!(start_slot, error = %e, "Supply unavailable");
                    None
                }
            };
            extras.inflation_rate = match self.client.get_inflation_rate().await {
                Ok(rate) => Some(rate),
                Err(e) => {
                    warn!(start_slot, error = %e, "Inflation rate unavailable");
                    None
                }
            };
        }

        extras
    }

    fn publish(&self, report: BatchReport) {
        metrics().batches_emitted.inc();
        self.logger.log_batch_emitted(&report);

        for sink in &self.sinks {
            if let Err(e) = sink.publish(&report) {
                metrics().sink_failures.inc();
                self.logger.log_sink_failure(sink.name(), &e);
            }
        }
        self.batches.push(report);
    }

    /// Sleep for `duration`; `false` when cancelled first
    async fn pause(&self, duration: Duration, cancel: &CancellationToken) -> bool {
        if duration.is_zero() {
            return !cancel.is_cancelled();
        }
        tokio::select! {
            biased;
            _ = cancel.cancelled() => false,
            _ = sleep(duration) => true,
        }
    }
}
