//! Aggregation over analyzed blocks

use chrono::{DateTime, Utc};

use crate::analysis::{summarize_block, BatchAggregator, BatchExtras, NOMINAL_BLOCK_TIME};
use crate::test_utils::{block_with, transfer};
use crate::types::{FeeUnit, PerBlockStats, Slot};
use crate::window::SlidingWindow;

fn sol_record(slot: Slot, fees: &[u64]) -> PerBlockStats {
    let now = DateTime::<Utc>::from_timestamp(1_700_000_000, 0).unwrap();
    let txs = fees.iter().map(|fee| transfer(*fee, Some(1_000), true)).collect();
    summarize_block(&block_with(slot, txs), FeeUnit::Sol, now).unwrap()
}

#[test]
fn test_batch_with_skipped_block_uses_present_block_only() {
    // Block B (slot 99) was skipped and produced no record
    let records = vec![sol_record(100, &[1_000_000, 2_000_000])];
    let report = BatchAggregator::new(FeeUnit::Sol, NOMINAL_BLOCK_TIME)
        .aggregate(&records, 100, 99, &BatchExtras::default())
        .unwrap();

    assert_eq!(report.total_transactions, 2);
    assert_eq!(report.fee.max, 0.002);
    assert_eq!(report.fee.average, 0.0015);
    assert_eq!(report.block_count, 1);
}

#[test]
fn test_aggregation_is_deterministic() {
    let records = vec![
        sol_record(12, &[5_000, 7_500, 120_000]),
        sol_record(11, &[9_000]),
        sol_record(10, &[5_000, 5_001, 6_000, 1_000_000]),
    ];
    let extras = BatchExtras {
        price: Some(142.17),
        ..Default::default()
    };
    let aggregator = BatchAggregator::default();

    let first = aggregator.aggregate(&records, 12, 10, &extras).unwrap();
    let second = aggregator.aggregate(&records, 12, 10, &extras).unwrap();

    assert_eq!(first, second);
    assert_eq!(first.fee.median.to_bits(), second.fee.median.to_bits());
    assert_eq!(first.average_tps.to_bits(), second.average_tps.to_bits());
    assert_eq!(first.cu_price.to_bits(), second.cu_price.to_bits());
}

#[test]
fn test_window_of_three_keeps_latest_records() {
    let window = SlidingWindow::new(3);
    for slot in [100, 99, 98, 97] {
        window.push(sol_record(slot, &[5_000]));
    }

    let slots: Vec<Slot> = window.snapshot().iter().map(|r| r.slot).collect();
    assert_eq!(slots, vec![99, 98, 97]);
}
