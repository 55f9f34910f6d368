use crate::{
    chain::{ChainId, ChainsConfig},
    connect::ConnectionConfig,
    contracts::EvmContracts,
    project::metadata::MetadataConfig,
    tx::{evm::EvmTxConfig, solana::SolanaTxConfig},
};
use serde::Deserialize;
use serde_with::{serde_as, DisplayFromStr};
use services_common::{
    evm::rpc::EvmRpcConfig, solana::pool::SolanaPoolConfig, utils::keypair::SaneKeypair,
};
use solana_sdk::pubkey::Pubkey;
use std::path::PathBuf;

#[derive(Deserialize, Debug, Clone)]
pub struct Config {
    #[serde(default)]
    pub chains: ChainsConfig,
    /// Polygon side, absent when only Solana projects are sold.
    #[serde(default)]
    pub evm: Option<EvmConfig>,
    #[serde(default)]
    pub solana: Option<SolanaConfig>,
    #[serde(default)]
    pub connection: ConnectionConfig,
    #[serde(default)]
    pub metadata: MetadataConfig,
    #[serde(default)]
    pub wallet_connect_project_id: Option<String>,
    /// Where wallet preferences survive restarts. In memory only when unset.
    #[serde(default)]
    pub preferences_path: Option<PathBuf>,
}

#[derive(Deserialize, Debug, Clone)]
pub struct EvmConfig {
    #[serde(default = "default_evm_chain")]
    pub chain: ChainId,
    #[serde(default)]
    pub rpc: EvmRpcConfig,
    pub contracts: EvmContracts,
    #[serde(default = "default_token_decimals")]
    pub token_decimals: u32,
    #[serde(default)]
    pub tx: EvmTxConfig,
}

fn default_evm_chain() -> ChainId {
    ChainId::Polygon
}

fn default_token_decimals() -> u32 {
    6
}

#[serde_as]
#[derive(Deserialize, Debug, Clone)]
pub struct SolanaConfig {
    #[serde(default = "default_solana_chain")]
    pub chain: ChainId,
    #[serde(default)]
    pub pool: SolanaPoolConfig,
    #[serde_as(as = "DisplayFromStr")]
    pub program_id: Pubkey,
    /// Decimals of the payment mint project prices are quoted in.
    #[serde(default = "default_token_decimals")]
    pub price_decimals: u32,
    #[serde(default)]
    pub tx: SolanaTxConfig,
}

fn default_solana_chain() -> ChainId {
    ChainId::SolanaDevnet
}

/// Operator keys used by the `invest` tool.
#[derive(Deserialize, Debug, Clone)]
pub struct KeysConfig {
    pub investor: SaneKeypair,
}
