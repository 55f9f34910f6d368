//! Static table of the chains the platform sells projects on.

use serde::{Deserialize, Serialize};
use std::collections::HashMap;

/// Execution model of a chain. Wallet state is tracked per family.
#[derive(
    Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize, derive_more::Display,
)]
pub enum ChainFamily {
    // the only evm deployment is polygon, records keep that name
    #[serde(rename = "polygon", alias = "evm")]
    #[display("EVM")]
    Evm,
    #[serde(rename = "solana")]
    #[display("Solana")]
    Solana,
}

impl ChainFamily {
    pub const ALL: [ChainFamily; 2] = [ChainFamily::Evm, ChainFamily::Solana];
}

#[derive(
    Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize, derive_more::Display,
)]
#[serde(rename_all = "kebab-case")]
pub enum ChainId {
    #[display("polygon")]
    Polygon,
    #[display("solana-mainnet")]
    SolanaMainnet,
    #[display("solana-devnet")]
    SolanaDevnet,
    #[display("solana-testnet")]
    SolanaTestnet,
}

impl ChainId {
    pub const ALL: [ChainId; 4] = [
        ChainId::Polygon,
        ChainId::SolanaMainnet,
        ChainId::SolanaDevnet,
        ChainId::SolanaTestnet,
    ];

    pub fn family(&self) -> ChainFamily {
        match self {
            ChainId::Polygon => ChainFamily::Evm,
            ChainId::SolanaMainnet | ChainId::SolanaDevnet | ChainId::SolanaTestnet => {
                ChainFamily::Solana
            }
        }
    }
}

const TX_PLACEHOLDER: &str = "{tx}";

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ChainDescriptor {
    pub id: ChainId,
    pub name: String,
    pub family: ChainFamily,
    pub is_testnet: bool,
    pub native_currency_symbol: String,
    pub rpc_endpoints: Vec<String>,
    /// Contains a `{tx}` placeholder for the transaction hash or signature.
    pub explorer_url_template: String,
    /// EIP-155 chain id, evm only.
    pub evm_chain_id: Option<u64>,
}

impl ChainDescriptor {
    fn builtin(id: ChainId) -> Self {
        let solana = |name: &str, cluster: &str, rpc: &str, is_testnet: bool| ChainDescriptor {
            id,
            name: name.into(),
            family: ChainFamily::Solana,
            is_testnet,
            native_currency_symbol: "SOL".into(),
            rpc_endpoints: vec![rpc.into()],
            explorer_url_template: match cluster {
                "mainnet-beta" => format!("https://explorer.solana.com/tx/{TX_PLACEHOLDER}"),
                cluster => {
                    format!("https://explorer.solana.com/tx/{TX_PLACEHOLDER}?cluster={cluster}")
                }
            },
            evm_chain_id: None,
        };
        match id {
            ChainId::Polygon => ChainDescriptor {
                id,
                name: "Polygon".into(),
                family: ChainFamily::Evm,
                is_testnet: false,
                native_currency_symbol: "POL".into(),
                rpc_endpoints: vec!["https://polygon-rpc.com".into()],
                explorer_url_template: format!("https://polygonscan.com/tx/{TX_PLACEHOLDER}"),
                evm_chain_id: Some(137),
            },
            ChainId::SolanaMainnet => solana(
                "Solana",
                "mainnet-beta",
                "https://api.mainnet-beta.solana.com",
                false,
            ),
            ChainId::SolanaDevnet => solana(
                "Solana Devnet",
                "devnet",
                "https://api.devnet.solana.com",
                true,
            ),
            ChainId::SolanaTestnet => solana(
                "Solana Testnet",
                "testnet",
                "https://api.testnet.solana.com",
                true,
            ),
        }
    }

    pub fn explorer_tx_url(&self, tx: &str) -> String {
        self.explorer_url_template.replace(TX_PLACEHOLDER, tx)
    }
}

#[derive(Debug, Clone, Default, Deserialize)]
pub struct ChainsConfig {
    /// Replaces the builtin public endpoints of a chain.
    #[serde(default)]
    pub rpc_overrides: HashMap<ChainId, Vec<String>>,
}

/// Immutable after construction; cheap lookups by [`ChainId`].
#[derive(Debug, Clone)]
pub struct ChainRegistry {
    chains: HashMap<ChainId, ChainDescriptor>,
}

impl ChainRegistry {
    pub fn new(cfg: &ChainsConfig) -> Self {
        let chains = ChainId::ALL
            .into_iter()
            .map(|id| {
                let mut descriptor = ChainDescriptor::builtin(id);
                if let Some(endpoints) = cfg.rpc_overrides.get(&id) {
                    if !endpoints.is_empty() {
                        descriptor.rpc_endpoints = endpoints.clone();
                    }
                }
                (id, descriptor)
            })
            .collect();
        Self { chains }
    }

    pub fn get(&self, id: ChainId) -> &ChainDescriptor {
        self.chains
            .get(&id)
            .expect("invariant: every chain id has a builtin descriptor")
    }

    pub fn by_family(&self, family: ChainFamily) -> impl Iterator<Item = &ChainDescriptor> {
        ChainId::ALL
            .into_iter()
            .filter(move |id| id.family() == family)
            .map(|id| self.get(id))
    }
}

impl Default for ChainRegistry {
    fn default() -> Self {
        Self::new(&ChainsConfig::default())
    }
}
