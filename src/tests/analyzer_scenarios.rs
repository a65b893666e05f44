//! Block analysis against a flaky ledger

use std::time::Duration;
use tokio::time::Instant;

use crate::analysis::{BlockAnalyzer, RetryPolicy, SkippedSlot};
use crate::structured_logging::PipelineLogger;
use crate::test_utils::{block_with, generic, rate_limited, transfer, vote, ScriptedLedger};
use crate::types::FeeUnit;

fn analyzer(max_retries: u32, initial_backoff_ms: u64) -> BlockAnalyzer {
    BlockAnalyzer::new(
        RetryPolicy::new(max_retries, Duration::from_millis(initial_backoff_ms)),
        true,
        FeeUnit::Lamports,
        PipelineLogger::default(),
    )
}

#[tokio::test(start_paused = true)]
async fn test_rate_limited_twice_then_success() {
    let ledger = ScriptedLedger::new()
        .with_block(block_with(500, vec![transfer(10_000, Some(200), true)]))
        .fail_times(500, 2, rate_limited());

    let started = Instant::now();
    let stats = analyzer(3, 100).analyze(&ledger, 500).await;

    assert!(started.elapsed() >= Duration::from_millis(300));
    assert_eq!(ledger.calls(500), 3);
    let stats = stats.expect("third attempt succeeds");
    assert_eq!(stats.slot, 500);
    assert_eq!(stats.tx_count_all, 1);
}

#[tokio::test(start_paused = true)]
async fn test_always_rate_limited_gives_up_after_max_retries() {
    let ledger = ScriptedLedger::new()
        .with_block(block_with(500, vec![transfer(10_000, Some(200), true)]))
        .fail_always(500, rate_limited());

    let analyzer = analyzer(3, 100);
    assert!(analyzer.analyze(&ledger, 500).await.is_none());
    assert_eq!(ledger.calls(500), 3);

    let reason = analyzer.try_analyze(&ledger, 500).await.unwrap_err();
    assert_eq!(reason, SkippedSlot::RetriesExhausted { attempts: 3 });
}

#[tokio::test(start_paused = true)]
async fn test_generic_failure_is_not_retried() {
    let ledger = ScriptedLedger::new().fail_always(42, generic("node is behind"));

    let started = Instant::now();
    let reason = analyzer(5, 100).try_analyze(&ledger, 42).await.unwrap_err();

    assert_eq!(ledger.calls(42), 1);
    assert_eq!(started.elapsed(), Duration::ZERO);
    assert!(matches!(reason, SkippedSlot::RemoteFailure { attempts: 1, .. }));
}

#[tokio::test(start_paused = true)]
async fn test_skipped_slot_and_empty_block_are_absent() {
    let ledger = ScriptedLedger::new().with_block(block_with(8, vec![]));
    let analyzer = analyzer(3, 100);

    assert_eq!(
        analyzer.try_analyze(&ledger, 7).await.unwrap_err(),
        SkippedSlot::MissingBlock
    );
    assert_eq!(
        analyzer.try_analyze(&ledger, 8).await.unwrap_err(),
        SkippedSlot::EmptyBlock
    );
    assert_eq!(ledger.calls(7), 1);
}

#[tokio::test(start_paused = true)]
async fn test_vote_only_block_yields_zeroed_record() {
    let ledger = ScriptedLedger::new().with_block(block_with(9, vec![vote(), vote()]));
    let stats = analyzer(3, 100).analyze(&ledger, 9).await.unwrap();

    assert_eq!(stats.tx_count_all, 0);
    assert_eq!(stats.avg_fee_all, 0.0);
    assert_eq!(stats.cu_price_all, 0.0);
}
