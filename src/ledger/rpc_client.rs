//! JSON-RPC backed ledger client

use async_trait::async_trait;
use solana_client::nonblocking::rpc_client::RpcClient;
use solana_rpc_client_api::config::RpcBlockConfig;
use solana_sdk::commitment_config::CommitmentConfig;
use solana_transaction_status::option_serializer::OptionSerializer;
use solana_transaction_status::{
    EncodedTransaction, EncodedTransactionWithStatusMeta, TransactionDetails, UiConfirmedBlock,
    UiMessage, UiTransactionEncoding,
};
use std::time::Duration;
use tracing::{debug, instrument};

use super::ledger_errors::{classify_message, Classified, LedgerError};
use super::RemoteLedgerClient;
use crate::types::{Block, RewardEntry, RewardKind, Slot, TransactionRecord};

/// [`RemoteLedgerClient`] over a Solana RPC endpoint
pub struct SolanaLedgerClient {
    rpc: RpcClient,
    endpoint: String,
    commitment: CommitmentConfig,
}

impl SolanaLedgerClient {
    pub fn new(url: &str, timeout: Duration, commitment: CommitmentConfig) -> Self {
        Self {
            rpc: RpcClient::new_with_timeout_and_commitment(url.to_string(), timeout, commitment),
            endpoint: url.to_string(),
            commitment,
        }
    }

    fn block_config(&self, include_rewards: bool) -> RpcBlockConfig {
        RpcBlockConfig {
            encoding: Some(UiTransactionEncoding::Json),
            transaction_details: Some(TransactionDetails::Full),
            rewards: Some(include_rewards),
            commitment: Some(self.commitment),
            max_supported_transaction_version: Some(0),
        }
    }
}

#[async_trait]
impl RemoteLedgerClient for SolanaLedgerClient {
    async fn current_slot(&self) -> Result<Slot, LedgerError> {
        self.rpc
            .get_slot()
            .await
            .map_err(|e| LedgerError::from_client_error(&e, &self.endpoint))
    }

    #[instrument(skip(self), fields(endpoint = %self.endpoint))]
    async fn get_block(
        &self,
        slot: Slot,
        include_rewards: bool,
    ) -> Result<Option<Block>, LedgerError> {
        match self
            .rpc
            .get_block_with_config(slot, self.block_config(include_rewards))
            .await
        {
            Ok(block) => Ok(Some(block_from_ui(slot, block))),
            Err(err) => match classify_message(&err.to_string(), &self.endpoint) {
                Classified::MissingBlock => {
                    debug!(slot, error = %err, "No block stored for slot");
                    Ok(None)
                }
                Classified::Error(e) => Err(e),
            },
        }
    }

    async fn get_supply(&self) -> Result<u64, LedgerError> {
        self.rpc
            .supply()
            .await
            .map(|response| response.value.total)
            .map_err(|e| LedgerError::from_client_error(&e, &self.endpoint))
    }

    async fn get_inflation_rate(&self) -> Result<f64, LedgerError> {
        self.rpc
            .get_inflation_rate()
            .await
            .map(|rate| rate.total)
            .map_err(|e| LedgerError::from_client_error(&e, &self.endpoint))
    }
}

fn block_from_ui(slot: Slot, block: UiConfirmedBlock) -> Block {
    let transactions = block
        .transactions
        .unwrap_or_default()
        .into_iter()
        .map(transaction_from_ui)
        .collect();

    let rewards = block.rewards.map(|rewards| {
        rewards
            .into_iter()
            .map(|reward| RewardEntry {
                lamports: reward.lamports,
                kind: reward
                    .reward_type
                    .and_then(|t| RewardKind::from_tag(&t.to_string())),
            })
            .collect()
    });

    Block {
        slot,
        parent_slot: Some(block.parent_slot),
        block_time: block.block_time,
        transactions,
        rewards,
    }
}

fn transaction_from_ui(tx: EncodedTransactionWithStatusMeta) -> TransactionRecord {
    let (participants, signature_count) = match &tx.transaction {
        EncodedTransaction::Json(ui) => {
            let keys = match &ui.message {
                UiMessage::Raw(raw) => raw.account_keys.clone(),
                UiMessage::Parsed(parsed) => parsed
                    .account_keys
                    .iter()
                    .map(|account| account.pubkey.clone())
                    .collect(),
            };
            (Some(keys), ui.signatures.len())
        }
        EncodedTransaction::Accounts(list) => (
            Some(list.account_keys.iter().map(|a| a.pubkey.clone()).collect()),
            list.signatures.len(),
        ),
        // Binary encodings are never requested; treat them as opaque
        _ => (None, 1),
    };

    let (fee, error, compute_units) = match &tx.meta {
        Some(meta) => {
            let compute_units = match &meta.compute_units_consumed {
                OptionSerializer::Some(units) => Some(*units),
                _ => None,
            };
            let error = meta.err.as_ref().map(|e| format!("{:?}", e));
            (Some(meta.fee), error, compute_units)
        }
        None => (None, None, None),
    };

    TransactionRecord {
        participants,
        fee,
        error,
        compute_units,
        signature_count,
    }
}
