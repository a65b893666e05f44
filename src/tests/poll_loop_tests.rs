//! Poll loop scenarios against a scripted ledger

use async_trait::async_trait;
use std::sync::Arc;
use std::time::Duration;
use tokio::time::{sleep, Instant};
use tokio_util::sync::CancellationToken;

use crate::analysis::{BatchAggregator, BlockAnalyzer, RetryPolicy, NOMINAL_BLOCK_TIME};
use crate::poll_loop::{LoopState, PollLoop, PollSettings, RunMode};
use crate::price::PriceQuote;
use crate::sinks::ReportSink;
use crate::structured_logging::PipelineLogger;
use crate::test_utils::{
    block_with, rate_limited, transfer, FailingSink, FixedPrice, RecordingSink, ScriptedLedger,
};
use crate::types::{FeeUnit, Slot};
use crate::window::SlidingWindow;

fn settings(mode: RunMode, batch_size: usize) -> PollSettings {
    PollSettings {
        mode,
        batch_size,
        fetch_delay: Duration::ZERO,
        poll_interval: Duration::from_secs(1),
        include_supply: false,
        price_asset: None,
    }
}

fn poll_loop(ledger: &ScriptedLedger, settings: PollSettings, fee_unit: FeeUnit) -> PollLoop {
    let logger = PipelineLogger::default();
    PollLoop::new(
        settings,
        Arc::new(ledger.clone()),
        BlockAnalyzer::new(
            RetryPolicy::new(3, Duration::from_millis(100)),
            true,
            fee_unit,
            logger.clone(),
        ),
        BatchAggregator::new(fee_unit, NOMINAL_BLOCK_TIME),
        logger,
    )
}

/// Price source that answers after a fixed delay
struct SlowPrice(Duration);

#[async_trait]
impl PriceQuote for SlowPrice {
    async fn current_price(&self, _asset: &str) -> Option<f64> {
        sleep(self.0).await;
        Some(150.0)
    }
}

fn ledger_with_slots(slots: impl IntoIterator<Item = Slot>) -> ScriptedLedger {
    ScriptedLedger::new().with_blocks(
        slots
            .into_iter()
            .map(|slot| block_with(slot, vec![transfer(10_000, Some(500), true)])),
    )
}

#[tokio::test(start_paused = true)]
async fn test_historical_batch_skips_missing_block() {
    let ledger = ScriptedLedger::new().with_block(block_with(
        11,
        vec![
            transfer(1_000_000, Some(300), true),
            transfer(2_000_000, Some(300), true),
        ],
    ));
    let sink = RecordingSink::default();
    let poll = poll_loop(
        &ledger,
        settings(RunMode::Historical { start: 10, end: 11 }, 2),
        FeeUnit::Sol,
    )
    .with_sinks(vec![Box::new(sink.clone())]);

    poll.run(CancellationToken::new()).await;

    let reports = sink.reports();
    assert_eq!(reports.len(), 1);
    let report = &reports[0];
    assert_eq!((report.start_slot, report.end_slot), (11, 10));
    assert_eq!(report.total_transactions, 2);
    assert_eq!(report.fee.max, 0.002);
    assert_eq!(report.fee.average, 0.0015);
    assert_eq!(poll.state(), LoopState::Stopped);
    assert_eq!(ledger.fetched_slots(), vec![10, 11]);
}

#[tokio::test(start_paused = true)]
async fn test_historical_range_batches_and_stops() {
    let ledger = ledger_with_slots(1..=5);
    let sink = RecordingSink::default();
    let poll = poll_loop(
        &ledger,
        settings(RunMode::Historical { start: 1, end: 5 }, 2),
        FeeUnit::Lamports,
    )
    .with_sinks(vec![Box::new(sink.clone())]);

    poll.run(CancellationToken::new()).await;

    let bounds: Vec<(Slot, Slot)> = sink
        .reports()
        .iter()
        .map(|r| (r.start_slot, r.end_slot))
        .collect();
    assert_eq!(bounds, vec![(5, 4), (3, 2), (1, 1)]);

    let slots: Vec<Slot> = poll.blocks().snapshot().iter().map(|r| r.slot).collect();
    assert_eq!(slots, vec![5, 4, 3, 2, 1]);
    assert_eq!(poll.batches().len(), 3);
    assert_eq!(poll.state(), LoopState::Stopped);
    assert_eq!(ledger.tip_calls(), 0);
}

#[tokio::test(start_paused = true)]
async fn test_window_capacity_evicts_oldest_block() {
    let ledger = ledger_with_slots(97..=100);
    let poll = poll_loop(
        &ledger,
        settings(RunMode::Historical { start: 97, end: 100 }, 4),
        FeeUnit::Lamports,
    )
    .with_windows(SlidingWindow::new(3), SlidingWindow::new(3));

    poll.run(CancellationToken::new()).await;

    let slots: Vec<Slot> = poll.blocks().snapshot().iter().map(|r| r.slot).collect();
    assert_eq!(slots, vec![99, 98, 97]);
}

#[tokio::test(start_paused = true)]
async fn test_fully_skipped_batch_is_not_published() {
    let ledger = ledger_with_slots([4]).fail_always(2, rate_limited());
    let sink = RecordingSink::default();
    let poll = poll_loop(
        &ledger,
        settings(RunMode::Historical { start: 1, end: 4 }, 2),
        FeeUnit::Lamports,
    )
    .with_sinks(vec![Box::new(sink.clone())]);

    poll.run(CancellationToken::new()).await;

    // slots 2 and 1 produced nothing
    let reports = sink.reports();
    assert_eq!(reports.len(), 1);
    assert_eq!(reports[0].start_slot, 4);
    assert_eq!(ledger.calls(2), 3);
}

#[tokio::test(start_paused = true)]
async fn test_sink_failure_does_not_stop_other_sinks() {
    let ledger = ledger_with_slots(1..=2);
    let sink = RecordingSink::default();
    let sinks: Vec<Box<dyn ReportSink>> = vec![Box::new(FailingSink), Box::new(sink.clone())];
    let poll = poll_loop(
        &ledger,
        settings(RunMode::Historical { start: 1, end: 2 }, 1),
        FeeUnit::Lamports,
    )
    .with_sinks(sinks);

    poll.run(CancellationToken::new()).await;

    assert_eq!(sink.reports().len(), 2);
}

#[tokio::test(start_paused = true)]
async fn test_extras_are_attached_and_price_may_be_missing() {
    let ledger = ledger_with_slots(1..=2)
        .with_supply(500_000_000_000_000_000)
        .with_inflation(0.047);
    let sink = RecordingSink::default();
    let mut with_extras = settings(RunMode::Historical { start: 1, end: 2 }, 2);
    with_extras.include_supply = true;
    with_extras.price_asset = Some("solana".to_string());

    let poll = poll_loop(&ledger, with_extras.clone(), FeeUnit::Sol)
        .with_price(Arc::new(FixedPrice(Some(150.0))))
        .with_sinks(vec![Box::new(sink.clone())]);
    poll.run(CancellationToken::new()).await;

    let report = &sink.reports()[0];
    assert_eq!(report.price, Some(150.0));
    assert_eq!(report.total_supply, Some(500_000_000.0));
    assert_eq!(report.inflation_rate, Some(0.047));

    let sink = RecordingSink::default();
    let poll = poll_loop(&ledger, with_extras, FeeUnit::Sol)
        .with_price(Arc::new(FixedPrice(None)))
        .with_sinks(vec![Box::new(sink.clone())]);
    poll.run(CancellationToken::new()).await;

    let reports = sink.reports();
    assert_eq!(reports.len(), 1);
    assert_eq!(reports[0].price, None);
    assert_eq!(reports[0].fiat(1.0), None);
}

#[tokio::test(start_paused = true)]
async fn test_live_mode_backfills_then_follows_tip() {
    let ledger = ledger_with_slots(99..=102).with_tips([100, 100, 101, 102]);
    let sink = RecordingSink::default();
    let poll = poll_loop(&ledger, settings(RunMode::Live { samples: 1 }, 2), FeeUnit::Lamports)
        .with_sinks(vec![Box::new(sink.clone())]);

    let cancel = CancellationToken::new();
    let stopper = {
        let cancel = cancel.clone();
        async move {
            sleep(Duration::from_secs(10)).await;
            cancel.cancel();
        }
    };
    tokio::join!(poll.run(cancel.clone()), stopper);

    let bounds: Vec<(Slot, Slot)> = sink
        .reports()
        .iter()
        .map(|r| (r.start_slot, r.end_slot))
        .collect();
    assert_eq!(bounds, vec![(100, 99), (101, 102)]);
    assert_eq!(ledger.fetched_slots(), vec![99, 100, 101, 102]);
    // the tip is analyzed once even though it is polled repeatedly
    assert_eq!(ledger.calls(100), 1);
    assert_eq!(ledger.calls(102), 1);
    assert_eq!(poll.state(), LoopState::Stopped);
}

#[tokio::test(start_paused = true)]
async fn test_cancel_before_start_pushes_nothing() {
    let ledger = ledger_with_slots(1..=10).with_tips([10]);
    let poll = poll_loop(&ledger, settings(RunMode::Live { samples: 2 }, 5), FeeUnit::Lamports);

    let cancel = CancellationToken::new();
    cancel.cancel();
    poll.run(cancel).await;

    assert!(poll.blocks().is_empty());
    assert_eq!(ledger.total_calls(), 0);
    assert_eq!(poll.state(), LoopState::Stopped);
}

#[tokio::test(start_paused = true)]
async fn test_shutdown_during_price_fetch_drops_batch() {
    let ledger = ledger_with_slots(1..=2);
    let sink = RecordingSink::default();
    let mut with_price = settings(RunMode::Historical { start: 1, end: 2 }, 2);
    with_price.price_asset = Some("solana".to_string());
    let poll = poll_loop(&ledger, with_price, FeeUnit::Sol)
        .with_price(Arc::new(SlowPrice(Duration::from_secs(60))))
        .with_sinks(vec![Box::new(sink.clone())]);

    let cancel = CancellationToken::new();
    let stopper = {
        let cancel = cancel.clone();
        async move {
            sleep(Duration::from_secs(1)).await;
            cancel.cancel();
        }
    };
    let started = Instant::now();
    tokio::join!(poll.run(cancel.clone()), stopper);

    assert!(started.elapsed() < Duration::from_secs(60));
    assert!(sink.reports().is_empty());
    assert!(poll.batches().is_empty());
    assert_eq!(poll.blocks().len(), 2);
    assert_eq!(poll.state(), LoopState::Stopped);
}

#[tokio::test(start_paused = true)]
async fn test_huge_sample_count_backfills_to_genesis() {
    let ledger = ledger_with_slots(0..=1).with_tips([1]);
    let sink = RecordingSink::default();
    let poll = poll_loop(
        &ledger,
        settings(RunMode::Live { samples: usize::MAX / 2 }, 100),
        FeeUnit::Lamports,
    )
    .with_sinks(vec![Box::new(sink.clone())]);

    let cancel = CancellationToken::new();
    let stopper = {
        let cancel = cancel.clone();
        async move {
            sleep(Duration::from_secs(5)).await;
            cancel.cancel();
        }
    };
    tokio::join!(poll.run(cancel.clone()), stopper);

    let bounds: Vec<(Slot, Slot)> = sink
        .reports()
        .iter()
        .map(|r| (r.start_slot, r.end_slot))
        .collect();
    assert_eq!(bounds, vec![(1, 0)]);
    assert_eq!(ledger.fetched_slots(), vec![0, 1]);
}
