//! Chain reads and submissions the app depends on, behind traits so the
//! readers and pipelines can run against in-memory chains in tests.

use alloy_primitives::{Address, Bytes, B256};
use anyhow::Context as _;
use async_trait::async_trait;
use services_common::{
    evm::rpc::{EvmRpcClient, JsonRpcError, TransactionReceipt},
    solana::pool::SolanaPool,
};
use solana_client::rpc_config::{RpcSendTransactionConfig, RpcSimulateTransactionConfig};
use solana_sdk::{
    commitment_config::{CommitmentConfig, CommitmentLevel},
    hash::Hash,
    pubkey::Pubkey,
    signature::Signature,
    transaction::{Transaction, TransactionError},
};

#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct SimulationOutcome {
    pub err: Option<TransactionError>,
    pub logs: Vec<String>,
    pub units_consumed: Option<u64>,
}

/// Nodes and programs spell a missing account several ways.
pub fn is_account_not_found(text: &str) -> bool {
    let text = text.to_lowercase();
    [
        "accountnotfound",
        "account not found",
        "could not find account",
        "accountnotinitialized",
        "account does not exist",
    ]
    .iter()
    .any(|pattern| text.contains(pattern))
}

#[async_trait]
pub trait SolanaRpc: Send + Sync {
    /// `None` when the account does not exist.
    async fn account_data(&self, address: &Pubkey) -> anyhow::Result<Option<Vec<u8>>>;

    /// Blockhash with the last block height it stays valid for.
    async fn latest_blockhash(&self) -> anyhow::Result<(Hash, u64)>;

    async fn block_height(&self) -> anyhow::Result<u64>;

    /// Recent per-slot prioritization fees in micro-lamports per compute unit.
    async fn recent_prioritization_fees(&self, accounts: &[Pubkey]) -> anyhow::Result<Vec<u64>>;

    async fn simulate(&self, tx: &Transaction) -> anyhow::Result<SimulationOutcome>;

    async fn send(&self, tx: &Transaction, skip_preflight: bool) -> anyhow::Result<Signature>;

    /// `None` while the cluster has not seen the signature yet.
    async fn signature_status(
        &self,
        signature: &Signature,
    ) -> anyhow::Result<Option<Result<(), TransactionError>>>;
}

#[async_trait]
impl SolanaRpc for SolanaPool {
    async fn account_data(&self, address: &Pubkey) -> anyhow::Result<Option<Vec<u8>>> {
        let response = self
            .rpc_client()
            .use_single()
            .await
            .get_account_with_commitment(address, CommitmentConfig::confirmed())
            .await
            .with_context(|| format!("get account {address}"))?;
        Ok(response.value.map(|account| account.data))
    }

    async fn latest_blockhash(&self) -> anyhow::Result<(Hash, u64)> {
        Ok(self
            .rpc_client()
            .use_single()
            .await
            .get_latest_blockhash_with_commitment(CommitmentConfig::confirmed())
            .await?)
    }

    async fn block_height(&self) -> anyhow::Result<u64> {
        Ok(self
            .rpc_client()
            .use_single()
            .await
            .get_block_height_with_commitment(CommitmentConfig::confirmed())
            .await?)
    }

    async fn recent_prioritization_fees(&self, accounts: &[Pubkey]) -> anyhow::Result<Vec<u64>> {
        let fees = self
            .rpc_client()
            .use_single()
            .await
            .get_recent_prioritization_fees(accounts)
            .await?;
        Ok(fees.into_iter().map(|fee| fee.prioritization_fee).collect())
    }

    async fn simulate(&self, tx: &Transaction) -> anyhow::Result<SimulationOutcome> {
        let config = RpcSimulateTransactionConfig {
            // the wallet signs later
            sig_verify: false,
            commitment: Some(CommitmentConfig::confirmed()),
            ..Default::default()
        };
        let result = self
            .rpc_client()
            .use_single()
            .await
            .simulate_transaction_with_config(tx, config)
            .await?
            .value;
        Ok(SimulationOutcome {
            err: result.err,
            logs: result.logs.unwrap_or_default(),
            units_consumed: result.units_consumed,
        })
    }

    async fn send(&self, tx: &Transaction, skip_preflight: bool) -> anyhow::Result<Signature> {
        let config = RpcSendTransactionConfig {
            skip_preflight,
            preflight_commitment: Some(CommitmentLevel::Confirmed),
            ..Default::default()
        };
        Ok(self
            .rpc_client()
            .use_single()
            .await
            .send_transaction_with_config(tx, config)
            .await?)
    }

    async fn signature_status(
        &self,
        signature: &Signature,
    ) -> anyhow::Result<Option<Result<(), TransactionError>>> {
        Ok(self
            .rpc_client()
            .use_single()
            .await
            .get_signature_status_with_commitment(signature, CommitmentConfig::confirmed())
            .await?)
    }
}

/// Whether an EVM call failed because the contract reverted, as opposed to
/// a transport or node failure.
pub fn is_execution_revert(err: &anyhow::Error) -> bool {
    err.downcast_ref::<JsonRpcError>()
        .is_some_and(JsonRpcError::is_revert)
}

#[async_trait]
pub trait EvmRpc: Send + Sync {
    async fn call(&self, to: Address, data: Bytes) -> anyhow::Result<Bytes>;

    async fn receipt(&self, hash: B256) -> anyhow::Result<Option<TransactionReceipt>>;
}

#[async_trait]
impl EvmRpc for EvmRpcClient {
    async fn call(&self, to: Address, data: Bytes) -> anyhow::Result<Bytes> {
        EvmRpcClient::call(self, to, data).await
    }

    async fn receipt(&self, hash: B256) -> anyhow::Result<Option<TransactionReceipt>> {
        self.transaction_receipt(hash).await
    }
}
