//! Per-block fetch and reduction

use chrono::{DateTime, Utc};
use std::fmt;
use std::time::Instant;

use super::classifier::is_voting;
use super::ratio;
use super::retry::{retry_with_backoff, RetryOutcome, RetryPolicy};
use crate::ledger::{LedgerError, RemoteLedgerClient};
use crate::metrics::metrics;
use crate::structured_logging::PipelineLogger;
use crate::types::{Block, FeeUnit, PerBlockStats, Slot, TxSample};

/// Why a slot produced no record
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum SkippedSlot {
    /// Still rate limited after every attempt
    RetriesExhausted { attempts: u32 },
    /// Non-retryable remote failure
    RemoteFailure { attempts: u32, message: String },
    /// Skipped slot or pruned block
    MissingBlock,
    /// Block present but without transactions
    EmptyBlock,
}

impl SkippedSlot {
    pub fn attempts(&self) -> u32 {
        match self {
            SkippedSlot::RetriesExhausted { attempts } => *attempts,
            SkippedSlot::RemoteFailure { attempts, .. } => *attempts,
            SkippedSlot::MissingBlock | SkippedSlot::EmptyBlock => 1,
        }
    }
}

impl fmt::Display for SkippedSlot {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::RetriesExhausted { attempts } => {
                write!(f, "rate limited after {} attempts", attempts)
            }
            Self::RemoteFailure { message, .. } => write!(f, "remote failure: {}", message),
            Self::MissingBlock => write!(f, "no block at slot"),
            Self::EmptyBlock => write!(f, "block has no transactions"),
        }
    }
}

/// Fetches one block with retry and reduces it to [`PerBlockStats`]
#[derive(Debug, Clone)]
pub struct BlockAnalyzer {
    retry: RetryPolicy,
    include_rewards: bool,
    fee_unit: FeeUnit,
    logger: PipelineLogger,
}

impl BlockAnalyzer {
    pub fn new(
        retry: RetryPolicy,
        include_rewards: bool,
        fee_unit: FeeUnit,
        logger: PipelineLogger,
    ) -> Self {
        Self {
            retry,
            include_rewards,
            fee_unit,
            logger,
        }
    }

    pub fn fee_unit(&self) -> FeeUnit {
        self.fee_unit
    }

    pub fn retry_policy(&self) -> &RetryPolicy {
        &self.retry
    }

    /// Analyze `slot`. `None` means "skip this slot"; the reason has already
    /// been logged and counted.
    pub async fn analyze<C>(&self, client: &C, slot: Slot) -> Option<PerBlockStats>
    where
        C: RemoteLedgerClient + ?Sized,
    {
        match self.try_analyze(client, slot).await {
            Ok(stats) => {
                metrics().blocks_analyzed.inc();
                self.logger.log_block_analyzed(&stats);
                Some(stats)
            }
            Err(reason) => {
                metrics().slots_skipped.inc();
                self.logger.log_slot_skipped(slot, reason.attempts(), &reason);
                None
            }
        }
    }

    /// Same as [`BlockAnalyzer::analyze`] but reports why a slot was skipped
    pub async fn try_analyze<C>(&self, client: &C, slot: Slot) -> Result<PerBlockStats, SkippedSlot>
    where
        C: RemoteLedgerClient + ?Sized,
    {
        let started = Instant::now();
        let include_rewards = self.include_rewards;

        let outcome = retry_with_backoff(
            "get_block",
            &self.retry,
            LedgerError::is_retryable,
            || client.get_block(slot, include_rewards),
        )
        .await;

        metrics()
            .fetch_latency
            .observe(started.elapsed().as_secs_f64());
        metrics()
            .fetch_retries
            .inc_by(u64::from(outcome.attempts().saturating_sub(1)));

        let block = match outcome {
            RetryOutcome::Success { value, .. } => value.ok_or(SkippedSlot::MissingBlock)?,
            RetryOutcome::Exhausted {
                attempts,
                last_error,
            } => {
                return Err(if last_error.is_retryable() {
                    SkippedSlot::RetriesExhausted { attempts }
                } else {
                    SkippedSlot::RemoteFailure {
                        attempts,
                        message: last_error.to_string(),
                    }
                });
            }
        };

        summarize_block(&block, self.fee_unit, Utc::now()).ok_or(SkippedSlot::EmptyBlock)
    }
}

/// Reduce a block's non-voting transactions in a single pass.
///
/// Returns `None` for a block without transactions. `now` stamps the record
/// when the block carries no timestamp of its own.
pub fn summarize_block(block: &Block, fee_unit: FeeUnit, now: DateTime<Utc>) -> Option<PerBlockStats> {
    if block.transactions.is_empty() {
        return None;
    }

    let mut acc = Accumulator::default();
    for tx in block.transactions.iter().filter(|tx| !is_voting(tx)) {
        let Some(fee) = tx.fee else {
            continue;
        };
        let success = tx.is_success();
        let priority = tx.priority_fee().unwrap_or(0);
        let units = tx.compute_units.unwrap_or(0);

        acc.count_all += 1;
        acc.fee_all += fee;
        acc.priority_all += priority;
        acc.units_all += units;
        if success {
            acc.count_success += 1;
            acc.fee_success += fee;
            acc.priority_success += priority;
            acc.units_success += units;
        }
        acc.samples.push(TxSample {
            fee,
            compute_units: tx.compute_units,
            success,
        });
    }

    let to_unit = |lamports: u64| fee_unit.convert(lamports as f64);
    let ledger_time = block
        .block_time
        .and_then(|secs| DateTime::<Utc>::from_timestamp(secs, 0).map(|at| (secs, at)));

    Some(PerBlockStats {
        slot: block.slot,
        tx_count_all: acc.count_all,
        tx_count_success: acc.count_success,
        tx_count_failed: acc.count_all - acc.count_success,
        total_fee_all: acc.fee_all,
        total_fee_success: acc.fee_success,
        total_compute_units_all: acc.units_all,
        total_compute_units_success: acc.units_success,
        total_priority_fee_all: acc.priority_all,
        total_priority_fee_success: acc.priority_success,
        avg_fee_all: ratio(to_unit(acc.fee_all), acc.count_all as f64),
        avg_fee_success: ratio(to_unit(acc.fee_success), acc.count_success as f64),
        avg_priority_fee_all: ratio(to_unit(acc.priority_all), acc.count_all as f64),
        avg_priority_fee_success: ratio(to_unit(acc.priority_success), acc.count_success as f64),
        cu_price_all: ratio(to_unit(acc.fee_all), acc.units_all as f64),
        cu_price_success: ratio(to_unit(acc.fee_success), acc.units_success as f64),
        fee_unit,
        timestamp: ledger_time.map(|(_, at)| at).unwrap_or(now),
        block_time: ledger_time.map(|(secs, _)| secs),
        samples: acc.samples,
        rewards: block.rewards.clone().unwrap_or_default(),
    })
}

#[derive(Default)]
struct Accumulator {
    count_all: u64,
    count_success: u64,
    fee_all: u64,
    fee_success: u64,
    priority_all: u64,
    priority_success: u64,
    units_all: u64,
    units_success: u64,
    samples: Vec<TxSample>,
}
