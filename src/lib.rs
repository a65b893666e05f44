//! Fee Report - Solana fee and compute-unit batch reporting library
//!
//! This library exposes the pipeline modules for the binaries, for testing
//! and for integration purposes.

pub mod analysis;
pub mod config;
pub mod endpoints;
pub mod ledger;
pub mod metrics;
pub mod observability;
pub mod poll_loop;
pub mod price;
pub mod sinks;
pub mod structured_logging;
pub mod test_utils;
pub mod types;
pub mod window;

// Re-export commonly used types
pub use analysis::{BatchAggregator, BlockAnalyzer, RetryPolicy};
pub use config::{Config, ConfigError};
pub use ledger::{LedgerError, RemoteLedgerClient, SolanaLedgerClient};
pub use poll_loop::{LoopState, PollLoop, PollSettings, RunMode};
pub use types::{BatchReport, FeeUnit, PerBlockStats, Slot};
pub use window::SlidingWindow;

#[cfg(test)]
mod tests;
