//! Batch aggregation over per-block records

use std::time::Duration;
use thiserror::Error;

use super::{distribution, mean, ratio};
use crate::types::{BatchReport, Distribution, FeeUnit, PerBlockStats, RewardEntry, Slot};

/// Default slot duration used when block timestamps cannot bound a batch
pub const NOMINAL_BLOCK_TIME: Duration = Duration::from_millis(400);

#[derive(Debug, Clone, Copy, PartialEq, Eq, Error)]
pub enum AggregateError {
    /// Caller passed no records; the batch should have been skipped upstream
    #[error("Cannot aggregate an empty batch")]
    EmptyBatch,
    /// Records exist but none carried a non-voting transaction
    #[error("Batch has no qualifying transactions")]
    NoTransactions,
}

/// Values fetched once per batch, next to the block records
#[derive(Debug, Clone, Copy, Default, PartialEq)]
pub struct BatchExtras {
    pub price: Option<f64>,
    pub total_supply_lamports: Option<u64>,
    pub inflation_rate: Option<f64>,
}

/// Combines a run of [`PerBlockStats`] into one [`BatchReport`]
#[derive(Debug, Clone, Copy)]
pub struct BatchAggregator {
    fee_unit: FeeUnit,
    nominal_block_time: Duration,
}

impl Default for BatchAggregator {
    fn default() -> Self {
        Self::new(FeeUnit::default(), NOMINAL_BLOCK_TIME)
    }
}

impl BatchAggregator {
    pub fn new(fee_unit: FeeUnit, nominal_block_time: Duration) -> Self {
        Self {
            fee_unit,
            nominal_block_time,
        }
    }

    /// Aggregate `records` (in processing order) into a report for
    /// `start_slot..end_slot`. Pure: the same input always yields the same report.
    pub fn aggregate(
        &self,
        records: &[PerBlockStats],
        start_slot: Slot,
        end_slot: Slot,
        extras: &BatchExtras,
    ) -> Result<BatchReport, AggregateError> {
        if records.is_empty() {
            return Err(AggregateError::EmptyBatch);
        }

        let samples: Vec<_> = records.iter().flat_map(|r| r.samples.iter()).collect();
        if samples.is_empty() {
            return Err(AggregateError::NoTransactions);
        }

        // Statistics run on exact lamport values and convert once at the end
        let mut fees: Vec<f64> = samples.iter().map(|s| s.fee as f64).collect();
        let mut units: Vec<f64> = samples
            .iter()
            .filter_map(|s| s.compute_units)
            .map(|u| u as f64)
            .collect();
        let success_units: Vec<f64> = samples
            .iter()
            .filter(|s| s.success)
            .filter_map(|s| s.compute_units)
            .map(|u| u as f64)
            .collect();

        let fee_lamports = distribution(&mut fees);
        let compute_units = distribution(&mut units);

        let (metered_fee, metered_units) = samples
            .iter()
            .filter_map(|s| s.compute_units.map(|u| (s.fee, u)))
            .fold((0u64, 0u64), |(f, u), (fee, units)| (f + fee, u + units));
        let (metered_fee_success, metered_units_success) = samples
            .iter()
            .filter(|s| s.success)
            .filter_map(|s| s.compute_units.map(|u| (s.fee, u)))
            .fold((0u64, 0u64), |(f, u), (fee, units)| (f + fee, u + units));

        let total_transactions: u64 = records.iter().map(|r| r.tx_count_all).sum();
        let elapsed_secs = self.elapsed_secs(records);

        let rewards: Vec<&RewardEntry> = records.iter().flat_map(|r| r.rewards.iter()).collect();
        let block_rewards: Vec<f64> = rewards
            .iter()
            .filter(|r| r.kind.is_some_and(|k| k.is_block_reward()))
            .map(|r| r.lamports as f64)
            .collect();
        let seigniorage: Vec<f64> = rewards
            .iter()
            .filter(|r| r.kind.is_some_and(|k| k.is_seigniorage()))
            .map(|r| r.lamports as f64)
            .collect();

        let unit = self.fee_unit;
        Ok(BatchReport {
            start_slot,
            end_slot,
            block_count: records.len(),
            total_transactions,
            elapsed_secs,
            average_tps: ratio(total_transactions as f64, elapsed_secs),
            fee: Distribution {
                max: unit.convert(fee_lamports.max),
                average: unit.convert(fee_lamports.average),
                median: unit.convert(fee_lamports.median),
            },
            compute_units,
            average_success_cu: mean(&success_units),
            cu_price: ratio(unit.convert(metered_fee as f64), metered_units as f64),
            cu_price_success: ratio(
                unit.convert(metered_fee_success as f64),
                metered_units_success as f64,
            ),
            average_block_reward: unit.convert(mean(&block_rewards)),
            average_seigniorage: unit.convert(mean(&seigniorage)),
            total_supply: extras.total_supply_lamports.map(|s| unit.convert(s as f64)),
            inflation_rate: extras.inflation_rate,
            price: extras.price,
            fee_unit: unit,
        })
    }

    /// Wall time covered by the batch. Ledger timestamps bound it when at
    /// least two records carry one and they differ; otherwise every record
    /// counts for one nominal block time. Never zero.
    fn elapsed_secs(&self, records: &[PerBlockStats]) -> f64 {
        let times: Vec<i64> = records.iter().filter_map(|r| r.block_time).collect();
        if times.len() >= 2 {
            let first = times.iter().min().copied().unwrap_or_default();
            let last = times.iter().max().copied().unwrap_or_default();
            if last > first {
                return (last - first) as f64;
            }
        }

        let nominal = self.nominal_block_time.as_secs_f64() * records.len() as f64;
        if nominal > 0.0 {
            nominal
        } else {
            NOMINAL_BLOCK_TIME.as_secs_f64() * records.len().max(1) as f64
        }
    }
}
