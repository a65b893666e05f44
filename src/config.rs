//! Configuration module for the fee report pipeline
//!
//! This module handles configuration loading from TOML files and environment
//! variables, and validates the result before the pipeline starts.

use serde::{Deserialize, Serialize};
use solana_sdk::commitment_config::CommitmentConfig;
use std::path::{Path, PathBuf};
use std::time::Duration;
use thiserror::Error;

use crate::analysis::RetryPolicy;
use crate::types::{FeeUnit, Slot};

/// Environment variable overriding `rpc.url`
pub const RPC_URL_ENV: &str = "FEE_REPORT_RPC_URL";

/// Largest accepted batch size
pub const MAX_BATCH_SIZE: usize = 100;

#[derive(Debug, Error)]
pub enum ConfigError {
    #[error("Failed to read config file {path}: {source}")]
    Io {
        path: PathBuf,
        #[source]
        source: std::io::Error,
    },

    #[error("Failed to parse config file {path}: {source}")]
    Parse {
        path: PathBuf,
        #[source]
        source: toml::de::Error,
    },

    #[error("Invalid configuration: {0}")]
    Invalid(String),
}

/// Main application configuration
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct Config {
    #[serde(default)]
    pub rpc: RpcConfig,

    #[serde(default)]
    pub sampling: SamplingConfig,

    #[serde(default)]
    pub storage: StorageConfig,

    #[serde(default)]
    pub price: PriceConfig,

    #[serde(default)]
    pub server: ServerConfig,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct RpcConfig {
    #[serde(default = "default_rpc_url")]
    pub url: String,

    /// Request timeout in seconds
    #[serde(default = "default_rpc_timeout")]
    pub timeout_secs: u64,

    /// `processed`, `confirmed` or `finalized`
    #[serde(default = "default_commitment")]
    pub commitment: String,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct SamplingConfig {
    /// Number of batches to backfill in live mode
    #[serde(default = "default_samples")]
    pub samples: usize,

    #[serde(default = "default_batch_size")]
    pub batch_size: usize,

    /// Delay between block fetches during backfill, in seconds
    #[serde(default = "default_delay_secs")]
    pub delay_secs: f64,

    /// Tip polling period in steady mode, in seconds
    #[serde(default = "default_poll_interval_secs")]
    pub poll_interval_secs: f64,

    /// Attempts per block fetch, including the first
    #[serde(default = "default_max_retries")]
    pub max_retries: u32,

    #[serde(default = "default_initial_backoff_ms")]
    pub initial_backoff_ms: u64,

    /// Per-block duration used when block timestamps cannot bound a batch
    #[serde(default = "default_nominal_block_time_ms")]
    pub nominal_block_time_ms: u64,

    #[serde(default = "default_true")]
    pub include_rewards: bool,

    #[serde(default)]
    pub include_supply: bool,

    #[serde(default)]
    pub fee_unit: FeeUnit,

    /// Capacity of the per-block window served on `/data`
    #[serde(default = "default_window_capacity")]
    pub window_capacity: usize,

    /// Capacity of the batch window served on `/batches`
    #[serde(default = "default_batch_window_capacity")]
    pub batch_window_capacity: usize,

    /// Historical mode lower bound (inclusive)
    #[serde(default)]
    pub start_slot: Option<Slot>,

    /// Historical mode upper bound (inclusive)
    #[serde(default)]
    pub end_slot: Option<Slot>,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize, clap::ValueEnum)]
#[serde(rename_all = "lowercase")]
pub enum StorageFormat {
    /// Append rows to a CSV file
    Csv,
    /// Embedded key-value store
    Db,
    /// Log output only
    None,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct StorageConfig {
    #[serde(default = "default_storage_format")]
    pub format: StorageFormat,

    #[serde(default = "default_csv_path")]
    pub csv_path: PathBuf,

    #[serde(default = "default_db_path")]
    pub db_path: PathBuf,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct PriceConfig {
    #[serde(default = "default_true")]
    pub enabled: bool,

    /// Simple-price endpoint
    #[serde(default = "default_price_url")]
    pub url: String,

    #[serde(default = "default_price_asset")]
    pub asset: String,

    #[serde(default = "default_vs_currency")]
    pub vs_currency: String,

    /// Request timeout in seconds
    #[serde(default = "default_price_timeout")]
    pub timeout_secs: u64,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ServerConfig {
    #[serde(default = "default_true")]
    pub enabled: bool,

    #[serde(default = "default_bind")]
    pub bind: String,

    #[serde(default = "default_port")]
    pub port: u16,
}

// Default value functions
fn default_rpc_url() -> String { "https://api.mainnet-beta.solana.com".to_string() }
fn default_rpc_timeout() -> u64 { 30 }
fn default_commitment() -> String { "confirmed".to_string() }
fn default_samples() -> usize { 10 }
fn default_batch_size() -> usize { 10 }
fn default_delay_secs() -> f64 { 1.0 }
fn default_poll_interval_secs() -> f64 { 1.0 }
fn default_max_retries() -> u32 { 3 }
fn default_initial_backoff_ms() -> u64 { 1_000 }
fn default_nominal_block_time_ms() -> u64 { 400 }
fn default_window_capacity() -> usize { 100 }
fn default_batch_window_capacity() -> usize { 50 }
fn default_storage_format() -> StorageFormat { StorageFormat::Csv }
fn default_csv_path() -> PathBuf { PathBuf::from("fee_report.csv") }
fn default_db_path() -> PathBuf { PathBuf::from("fee_report.db") }
fn default_price_url() -> String { "https://api.coingecko.com/api/v3/simple/price".to_string() }
fn default_price_asset() -> String { "solana".to_string() }
fn default_vs_currency() -> String { "usd".to_string() }
fn default_price_timeout() -> u64 { 10 }
fn default_bind() -> String { "0.0.0.0".to_string() }
fn default_port() -> u16 { 3000 }
fn default_true() -> bool { true }

impl Default for RpcConfig {
    fn default() -> Self {
        Self {
            url: default_rpc_url(),
            timeout_secs: default_rpc_timeout(),
            commitment: default_commitment(),
        }
    }
}

impl Default for SamplingConfig {
    fn default() -> Self {
        Self {
            samples: default_samples(),
            batch_size: default_batch_size(),
            delay_secs: default_delay_secs(),
            poll_interval_secs: default_poll_interval_secs(),
            max_retries: default_max_retries(),
            initial_backoff_ms: default_initial_backoff_ms(),
            nominal_block_time_ms: default_nominal_block_time_ms(),
            include_rewards: default_true(),
            include_supply: false,
            fee_unit: FeeUnit::default(),
            window_capacity: default_window_capacity(),
            batch_window_capacity: default_batch_window_capacity(),
            start_slot: None,
            end_slot: None,
        }
    }
}

impl Default for StorageConfig {
    fn default() -> Self {
        Self {
            format: default_storage_format(),
            csv_path: default_csv_path(),
            db_path: default_db_path(),
        }
    }
}

impl Default for PriceConfig {
    fn default() -> Self {
        Self {
            enabled: default_true(),
            url: default_price_url(),
            asset: default_price_asset(),
            vs_currency: default_vs_currency(),
            timeout_secs: default_price_timeout(),
        }
    }
}

impl Default for ServerConfig {
    fn default() -> Self {
        Self {
            enabled: default_true(),
            bind: default_bind(),
            port: default_port(),
        }
    }
}

impl Config {
    /// Load configuration from TOML file
    pub fn from_file(path: impl AsRef<Path>) -> Result<Self, ConfigError> {
        let path = path.as_ref();
        let content = std::fs::read_to_string(path).map_err(|source| ConfigError::Io {
            path: path.to_path_buf(),
            source,
        })?;
        Self::from_toml_str(&content).map_err(|source| ConfigError::Parse {
            path: path.to_path_buf(),
            source,
        })
    }

    pub fn from_toml_str(content: &str) -> Result<Self, toml::de::Error> {
        toml::from_str(content)
    }

    /// Load configuration with environment variable overrides
    pub fn from_file_with_env(path: impl AsRef<Path>) -> Result<Self, ConfigError> {
        dotenvy::dotenv().ok();
        let mut config = Self::from_file(path)?;
        config.apply_env();
        Ok(config)
    }

    /// Apply `FEE_REPORT_RPC_URL` when set and non-empty
    pub fn apply_env(&mut self) {
        if let Ok(url) = std::env::var(RPC_URL_ENV) {
            if !url.trim().is_empty() {
                self.rpc.url = url;
            }
        }
    }

    /// Reject configurations the pipeline cannot run with
    pub fn validate(&self) -> Result<(), ConfigError> {
        let s = &self.sampling;

        if self.rpc.url.trim().is_empty() {
            return Err(ConfigError::Invalid("rpc.url must not be empty".into()));
        }
        self.commitment()?;

        if s.batch_size == 0 || s.batch_size > MAX_BATCH_SIZE {
            return Err(ConfigError::Invalid(format!(
                "batch_size must be between 1 and {}, got {}",
                MAX_BATCH_SIZE, s.batch_size
            )));
        }
        if s.window_capacity == 0 || s.batch_window_capacity == 0 {
            return Err(ConfigError::Invalid("window capacities must be at least 1".into()));
        }
        if s.max_retries == 0 {
            return Err(ConfigError::Invalid("max_retries must be at least 1".into()));
        }
        if !s.delay_secs.is_finite() || s.delay_secs < 0.0 {
            return Err(ConfigError::Invalid(format!(
                "delay_secs must be a non-negative number, got {}",
                s.delay_secs
            )));
        }
        if !s.poll_interval_secs.is_finite() || s.poll_interval_secs <= 0.0 {
            return Err(ConfigError::Invalid(format!(
                "poll_interval_secs must be positive, got {}",
                s.poll_interval_secs
            )));
        }

        match (s.start_slot, s.end_slot) {
            (Some(start), Some(end)) if start >= end => {
                return Err(ConfigError::Invalid(format!(
                    "start_slot ({}) must be lower than end_slot ({})",
                    start, end
                )));
            }
            (Some(_), None) | (None, Some(_)) => {
                return Err(ConfigError::Invalid(
                    "start_slot and end_slot must be given together".into(),
                ));
            }
            (None, None) if s.samples == 0 => {
                return Err(ConfigError::Invalid("samples must be at least 1".into()));
            }
            _ => {}
        }

        Ok(())
    }

    pub fn commitment(&self) -> Result<CommitmentConfig, ConfigError> {
        match self.rpc.commitment.to_ascii_lowercase().as_str() {
            "processed" => Ok(CommitmentConfig::processed()),
            "confirmed" => Ok(CommitmentConfig::confirmed()),
            "finalized" => Ok(CommitmentConfig::finalized()),
            other => Err(ConfigError::Invalid(format!("unknown commitment '{}'", other))),
        }
    }

    /// Explicit `(start, end)` range when running in historical mode
    pub fn slot_range(&self) -> Option<(Slot, Slot)> {
        self.sampling.start_slot.zip(self.sampling.end_slot)
    }

    pub fn retry_policy(&self) -> RetryPolicy {
        RetryPolicy::new(
            self.sampling.max_retries,
            Duration::from_millis(self.sampling.initial_backoff_ms),
        )
    }

    pub fn rpc_timeout(&self) -> Duration {
        Duration::from_secs(self.rpc.timeout_secs)
    }

    pub fn fetch_delay(&self) -> Duration {
        Duration::from_secs_f64(self.sampling.delay_secs.max(0.0))
    }

    pub fn poll_interval(&self) -> Duration {
        Duration::from_secs_f64(self.sampling.poll_interval_secs.max(0.0))
    }

    pub fn nominal_block_time(&self) -> Duration {
        Duration::from_millis(self.sampling.nominal_block_time_ms)
    }
}
