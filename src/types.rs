//! Common types used throughout the pipeline

use chrono::{DateTime, Utc};
use clap::ValueEnum;
use serde::{Deserialize, Serialize};
use solana_sdk::native_token::LAMPORTS_PER_SOL;
use std::fmt;

/// Position in the ledger's ordered block sequence
pub type Slot = u64;

/// Base fee charged per signature, in lamports
pub const BASE_FEE_LAMPORTS_PER_SIGNATURE: u64 = 5_000;

/// Denomination used for every fee-valued output of a run
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize, ValueEnum)]
#[serde(rename_all = "lowercase")]
pub enum FeeUnit {
    /// Smallest currency unit
    Lamports,
    /// Whole native asset
    Sol,
}

impl FeeUnit {
    /// Convert a lamport amount into this unit
    #[inline]
    pub fn convert(self, lamports: f64) -> f64 {
        match self {
            FeeUnit::Lamports => lamports,
            FeeUnit::Sol => lamports / LAMPORTS_PER_SOL as f64,
        }
    }

    pub fn label(self) -> &'static str {
        match self {
            FeeUnit::Lamports => "lamports",
            FeeUnit::Sol => "SOL",
        }
    }
}

impl Default for FeeUnit {
    fn default() -> Self {
        FeeUnit::Sol
    }
}

impl fmt::Display for FeeUnit {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.label())
    }
}

/// A fetched transaction, reduced to the fields the statistics need
#[derive(Debug, Clone, PartialEq, Eq, Default)]
pub struct TransactionRecord {
    /// Account identifiers touched by the transaction. `None` when the
    /// encoding did not expose a usable key list.
    pub participants: Option<Vec<String>>,
    /// Fee in lamports, absent when the status meta was missing
    pub fee: Option<u64>,
    /// Error description; `None` means the transaction succeeded
    pub error: Option<String>,
    pub compute_units: Option<u64>,
    pub signature_count: usize,
}

impl TransactionRecord {
    pub fn is_success(&self) -> bool {
        self.error.is_none()
    }

    /// Fee above the per-signature base fee
    pub fn priority_fee(&self) -> Option<u64> {
        let base = (self.signature_count.max(1) as u64) * BASE_FEE_LAMPORTS_PER_SIGNATURE;
        self.fee.map(|fee| fee.saturating_sub(base))
    }
}

/// Reward type tag as reported by the ledger
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum RewardKind {
    Fee,
    Rent,
    Staking,
    Voting,
}

impl RewardKind {
    /// Parse a ledger tag. Both the RPC spelling (`staking`, `voting`) and the
    /// short form (`stake`, `vote`) are accepted.
    pub fn from_tag(tag: &str) -> Option<Self> {
        match tag.to_ascii_lowercase().as_str() {
            "fee" => Some(RewardKind::Fee),
            "rent" => Some(RewardKind::Rent),
            "staking" | "stake" => Some(RewardKind::Staking),
            "voting" | "vote" => Some(RewardKind::Voting),
            _ => None,
        }
    }

    /// Fee and rent distributions
    pub fn is_block_reward(self) -> bool {
        matches!(self, RewardKind::Fee | RewardKind::Rent)
    }

    /// Stake and vote issuance
    pub fn is_seigniorage(self) -> bool {
        matches!(self, RewardKind::Staking | RewardKind::Voting)
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub struct RewardEntry {
    pub lamports: i64,
    pub kind: Option<RewardKind>,
}

/// Block contents at a slot
#[derive(Debug, Clone, Default)]
pub struct Block {
    pub slot: Slot,
    pub parent_slot: Option<Slot>,
    /// Unix timestamp in seconds
    pub block_time: Option<i64>,
    pub transactions: Vec<TransactionRecord>,
    pub rewards: Option<Vec<RewardEntry>>,
}

/// Transaction-level values retained for batch pooling
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct TxSample {
    pub fee: u64,
    pub compute_units: Option<u64>,
    pub success: bool,
}

/// Statistics for a single block's non-voting transactions
///
/// Lamport totals are kept exact; derived averages and prices are expressed
/// in `fee_unit`.
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct PerBlockStats {
    pub slot: Slot,
    pub tx_count_all: u64,
    pub tx_count_success: u64,
    pub tx_count_failed: u64,
    pub total_fee_all: u64,
    pub total_fee_success: u64,
    pub total_compute_units_all: u64,
    pub total_compute_units_success: u64,
    pub total_priority_fee_all: u64,
    pub total_priority_fee_success: u64,
    pub avg_fee_all: f64,
    pub avg_fee_success: f64,
    pub avg_priority_fee_all: f64,
    pub avg_priority_fee_success: f64,
    /// Fee per compute unit over all non-voting transactions
    pub cu_price_all: f64,
    pub cu_price_success: f64,
    pub fee_unit: FeeUnit,
    /// Ledger block time when known, otherwise the analysis wall clock
    pub timestamp: DateTime<Utc>,
    /// Ledger block time in seconds, `None` when `timestamp` is a wall-clock substitute
    pub block_time: Option<i64>,
    #[serde(skip)]
    pub samples: Vec<TxSample>,
    #[serde(skip)]
    pub rewards: Vec<RewardEntry>,
}

/// Max, mean and median of a pooled value set
#[derive(Debug, Clone, Copy, PartialEq, Default, Serialize, Deserialize)]
pub struct Distribution {
    pub max: f64,
    pub average: f64,
    pub median: f64,
}

/// Aggregate over one completed batch of blocks
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct BatchReport {
    pub start_slot: Slot,
    pub end_slot: Slot,
    /// Blocks that contributed records
    pub block_count: usize,
    pub total_transactions: u64,
    pub elapsed_secs: f64,
    pub average_tps: f64,
    pub fee: Distribution,
    pub compute_units: Distribution,
    pub average_success_cu: f64,
    pub cu_price: f64,
    pub cu_price_success: f64,
    pub average_block_reward: f64,
    pub average_seigniorage: f64,
    pub total_supply: Option<f64>,
    pub inflation_rate: Option<f64>,
    /// Native asset price in the configured fiat currency
    pub price: Option<f64>,
    pub fee_unit: FeeUnit,
}

impl BatchReport {
    /// Fiat value of an amount expressed in `fee_unit`, if a price is known
    pub fn fiat(&self, amount: f64) -> Option<f64> {
        let price = self.price?;
        let sol = match self.fee_unit {
            FeeUnit::Sol => amount,
            FeeUnit::Lamports => amount / LAMPORTS_PER_SOL as f64,
        };
        Some(sol * price)
    }
}
