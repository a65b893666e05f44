//! Voting transaction filter

use crate::types::TransactionRecord;

/// Vote program ID
pub const VOTE_PROGRAM_ID: &str = "Vote111111111111111111111111111111111111111";

/// Stake program ID
pub const STAKE_PROGRAM_ID: &str = "Stake11111111111111111111111111111111111111";

/// Check if a transaction is consensus traffic (should be filtered)
///
/// A transaction without a participant list is counted as ordinary traffic.
#[inline]
pub fn is_voting(tx: &TransactionRecord) -> bool {
    tx.participants
        .as_deref()
        .map(touches_voting_program)
        .unwrap_or(false)
}

#[inline]
fn touches_voting_program(keys: &[String]) -> bool {
    keys.iter()
        .any(|key| key == VOTE_PROGRAM_ID || key == STAKE_PROGRAM_ID)
}
