//! Ledger access
//!
//! The pipeline only talks to the chain through [`RemoteLedgerClient`], so the
//! analysis code can run against the live RPC client or a scripted one.

use async_trait::async_trait;

use crate::types::{Block, Slot};

// Submodules
pub mod ledger_errors;
pub mod rpc_client;

// Re-exports for convenience
pub use ledger_errors::LedgerError;
pub use rpc_client::SolanaLedgerClient;

/// Fallible accessor for chain state
#[async_trait]
pub trait RemoteLedgerClient: Send + Sync {
    /// Current chain tip
    async fn current_slot(&self) -> Result<Slot, LedgerError>;

    /// Full block at `slot`. `Ok(None)` is a skipped or unavailable slot.
    async fn get_block(&self, slot: Slot, include_rewards: bool)
        -> Result<Option<Block>, LedgerError>;

    /// Total supply in lamports
    async fn get_supply(&self) -> Result<u64, LedgerError>;

    /// Current total annual inflation rate (0.05 = 5%)
    async fn get_inflation_rate(&self) -> Result<f64, LedgerError>;
}
