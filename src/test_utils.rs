//! Test Utilities Module
//!
//! Scripted collaborators and block builders for deterministic tests of the
//! pipeline without a network.
//!
//! These utilities are only compiled when running tests or when the
//! `test_utils` feature is enabled.

#![cfg(any(test, feature = "test_utils"))]

use async_trait::async_trait;
use std::collections::{HashMap, VecDeque};
use std::sync::{Arc, Mutex};

use crate::analysis::classifier::VOTE_PROGRAM_ID;
use crate::ledger::{LedgerError, RemoteLedgerClient};
use crate::price::PriceQuote;
use crate::sinks::{ReportSink, SinkError};
use crate::types::{BatchReport, Block, Slot, TransactionRecord};

const SYSTEM_PROGRAM_ID: &str = "11111111111111111111111111111111";

#[derive(Default)]
struct Script {
    tips: VecDeque<Slot>,
    blocks: HashMap<Slot, Block>,
    failures: HashMap<Slot, VecDeque<LedgerError>>,
    permanent: HashMap<Slot, LedgerError>,
    calls: HashMap<Slot, u32>,
    tip_calls: u32,
    supply: Option<u64>,
    inflation: Option<f64>,
}

/// In-memory ledger answering from a script
///
/// Per slot, queued failures are returned first, then the stored block (or
/// `Ok(None)` when no block was stored). A slot marked with
/// [`ScriptedLedger::fail_always`] never succeeds. Clones share the script.
#[derive(Clone, Default)]
pub struct ScriptedLedger {
    script: Arc<Mutex<Script>>,
}

impl ScriptedLedger {
    pub fn new() -> Self {
        Self::default()
    }

    /// Tips handed out by `current_slot`, in order; the last one repeats
    pub fn with_tips(self, tips: impl IntoIterator<Item = Slot>) -> Self {
        self.script.lock().unwrap().tips.extend(tips);
        self
    }

    pub fn with_block(self, block: Block) -> Self {
        self.script.lock().unwrap().blocks.insert(block.slot, block);
        self
    }

    pub fn with_blocks(self, blocks: impl IntoIterator<Item = Block>) -> Self {
        {
            let mut script = self.script.lock().unwrap();
            for block in blocks {
                script.blocks.insert(block.slot, block);
            }
        }
        self
    }

    /// Fail the next `times` fetches of `slot` with `error`
    pub fn fail_times(self, slot: Slot, times: usize, error: LedgerError) -> Self {
        self.script
            .lock()
            .unwrap()
            .failures
            .entry(slot)
            .or_default()
            .extend(std::iter::repeat(error).take(times));
        self
    }

    pub fn fail_always(self, slot: Slot, error: LedgerError) -> Self {
        self.script.lock().unwrap().permanent.insert(slot, error);
        self
    }

    pub fn with_supply(self, lamports: u64) -> Self {
        self.script.lock().unwrap().supply = Some(lamports);
        self
    }

    pub fn with_inflation(self, rate: f64) -> Self {
        self.script.lock().unwrap().inflation = Some(rate);
        self
    }

    /// Number of `get_block` calls made for `slot`
    pub fn calls(&self, slot: Slot) -> u32 {
        self.script
            .lock()
            .unwrap()
            .calls
            .get(&slot)
            .copied()
            .unwrap_or(0)
    }

    pub fn total_calls(&self) -> u32 {
        self.script.lock().unwrap().calls.values().sum()
    }

    /// Slots fetched at least once, ascending
    pub fn fetched_slots(&self) -> Vec<Slot> {
        let mut slots: Vec<Slot> = self.script.lock().unwrap().calls.keys().copied().collect();
        slots.sort_unstable();
        slots
    }

    pub fn tip_calls(&self) -> u32 {
        self.script.lock().unwrap().tip_calls
    }
}

#[async_trait]
impl RemoteLedgerClient for ScriptedLedger {
    async fn current_slot(&self) -> Result<Slot, LedgerError> {
        let mut script = self.script.lock().unwrap();
        script.tip_calls += 1;
        let tip = if script.tips.len() > 1 {
            script.tips.pop_front()
        } else {
            script.tips.front().copied()
        };
        tip.ok_or_else(|| generic("no tip scripted"))
    }

    async fn get_block(
        &self,
        slot: Slot,
        _include_rewards: bool,
    ) -> Result<Option<Block>, LedgerError> {
        let mut script = self.script.lock().unwrap();
        *script.calls.entry(slot).or_insert(0) += 1;

        if let Some(error) = script.permanent.get(&slot) {
            return Err(error.clone());
        }
        if let Some(error) = script.failures.get_mut(&slot).and_then(VecDeque::pop_front) {
            return Err(error);
        }
        Ok(script.blocks.get(&slot).cloned())
    }

    async fn get_supply(&self) -> Result<u64, LedgerError> {
        self.script
            .lock()
            .unwrap()
            .supply
            .ok_or_else(|| generic("no supply scripted"))
    }

    async fn get_inflation_rate(&self) -> Result<f64, LedgerError> {
        self.script
            .lock()
            .unwrap()
            .inflation
            .ok_or_else(|| generic("no inflation scripted"))
    }
}

pub fn rate_limited() -> LedgerError {
    LedgerError::RateLimited {
        endpoint: "scripted".to_string(),
    }
}

pub fn generic(message: &str) -> LedgerError {
    LedgerError::Generic {
        endpoint: "scripted".to_string(),
        message: message.to_string(),
    }
}

/// Price source returning a fixed answer
#[derive(Debug, Clone, Copy)]
pub struct FixedPrice(pub Option<f64>);

#[async_trait]
impl PriceQuote for FixedPrice {
    async fn current_price(&self, _asset: &str) -> Option<f64> {
        self.0
    }
}

/// Sink keeping every published report in memory
#[derive(Debug, Clone, Default)]
pub struct RecordingSink {
    reports: Arc<Mutex<Vec<BatchReport>>>,
}

impl RecordingSink {
    pub fn reports(&self) -> Vec<BatchReport> {
        self.reports.lock().unwrap().clone()
    }
}

impl ReportSink for RecordingSink {
    fn name(&self) -> &'static str {
        "recording"
    }

    fn publish(&self, report: &BatchReport) -> Result<(), SinkError> {
        self.reports.lock().unwrap().push(report.clone());
        Ok(())
    }
}

/// Sink that rejects every report
#[derive(Debug, Clone, Copy, Default)]
pub struct FailingSink;

impl ReportSink for FailingSink {
    fn name(&self) -> &'static str {
        "failing"
    }

    fn publish(&self, _report: &BatchReport) -> Result<(), SinkError> {
        Err(SinkError::Io(std::io::Error::new(
            std::io::ErrorKind::Other,
            "sink unavailable",
        )))
    }
}

/// Block at `slot` without timestamp or rewards
pub fn block_with(slot: Slot, transactions: Vec<TransactionRecord>) -> Block {
    Block {
        slot,
        parent_slot: slot.checked_sub(1),
        block_time: None,
        transactions,
        rewards: None,
    }
}

/// Single-signature non-voting transaction
pub fn transfer(fee: u64, compute_units: Option<u64>, success: bool) -> TransactionRecord {
    TransactionRecord {
        participants: Some(vec![
            "Payer1111111111111111111111111111111111111".to_string(),
            "Recipient11111111111111111111111111111111".to_string(),
            SYSTEM_PROGRAM_ID.to_string(),
        ]),
        fee: Some(fee),
        error: (!success).then(|| "InstructionError(0, Custom(1))".to_string()),
        compute_units,
        signature_count: 1,
    }
}

/// Validator vote, excluded from statistics
pub fn vote() -> TransactionRecord {
    TransactionRecord {
        participants: Some(vec![
            "Validator1111111111111111111111111111111111".to_string(),
            VOTE_PROGRAM_ID.to_string(),
        ]),
        fee: Some(5_000),
        error: None,
        compute_units: Some(2_100),
        signature_count: 1,
    }
}
