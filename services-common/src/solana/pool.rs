use crate::utils::limiter::{LimiterGuard, RateLimitConfig};
use anyhow::bail;
use derive_more::derive::Deref;
use serde::Deserialize;
use solana_client::nonblocking::rpc_client::RpcClient;
use solana_sdk::commitment_config::CommitmentConfig;
use std::sync::{atomic, Arc};

#[derive(Deserialize, Debug, Clone, Default)]
pub struct SolanaPoolConfig {
    #[serde(default)]
    pub rpc_clients: Vec<SolanaClientConfig>,
}

/// Round-robin set of rate limited rpc clients.
#[derive(Clone)]
pub struct SolanaPool {
    rpc_clients: Arc<Balancer<SolanaRpcClient>>,
}

impl SolanaPool {
    /// Builds the pool from explicit config, falling back to `default_endpoints`
    /// when no client is configured.
    pub fn from_cfg(cfg: SolanaPoolConfig, default_endpoints: &[String]) -> anyhow::Result<Self> {
        let mut client_cfgs = cfg.rpc_clients;
        if client_cfgs.is_empty() {
            client_cfgs = default_endpoints
                .iter()
                .map(|rpc_url| SolanaClientConfig {
                    limit: RateLimitConfig::default(),
                    node: NodeType::Any {
                        rpc_url: rpc_url.clone(),
                    },
                })
                .collect();
        }
        if client_cfgs.is_empty() {
            bail!("no solana rpc endpoints configured");
        }
        let rpc_clients = client_cfgs
            .into_iter()
            .map(SolanaRpcClient::new)
            .collect::<Vec<_>>();
        Ok(Self {
            rpc_clients: Arc::new(Balancer::new(rpc_clients)),
        })
    }

    pub fn rpc_client(&self) -> &SolanaRpcClient {
        self.rpc_clients.next()
    }
}

#[derive(Deref)]
pub struct SolanaRpcClient {
    rpc_client: LimiterGuard<RpcClient>,
}

impl SolanaRpcClient {
    pub fn new(config: SolanaClientConfig) -> Self {
        let rpc_client =
            RpcClient::new_with_commitment(config.node.rpc_url(), CommitmentConfig::confirmed());
        let rpc_client = LimiterGuard::new(rpc_client, config.limit.limiter());
        Self { rpc_client }
    }
}

#[derive(Deserialize, Debug, Clone)]
pub struct SolanaClientConfig {
    #[serde(default)]
    pub limit: RateLimitConfig,
    pub node: NodeType,
}

#[derive(Deserialize, Debug, Clone)]
#[serde(tag = "type")]
#[serde(rename_all = "lowercase")]
pub enum NodeType {
    Helius { api_key: String, cluster: String },
    Any { rpc_url: String },
}

impl NodeType {
    pub fn rpc_url(&self) -> String {
        match self {
            NodeType::Helius { api_key, cluster } => {
                format!("https://{cluster}.helius-rpc.com?api-key={api_key}")
            }
            NodeType::Any { rpc_url } => rpc_url.clone(),
        }
    }
}

struct Balancer<T> {
    data: Vec<T>,
    current_pos: atomic::AtomicUsize,
}

impl<T> Balancer<T> {
    fn new(data: Vec<T>) -> Self {
        Self {
            data,
            current_pos: atomic::AtomicUsize::default(),
        }
    }

    fn next(&self) -> &T {
        let pos = self.current_pos.fetch_add(1, atomic::Ordering::Relaxed) % self.data.len();
        &self.data[pos]
    }
}
