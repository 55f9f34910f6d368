//! Wires configured chains, readers, pipelines and wallet state together.

use crate::{
    cfg::Config,
    chain::{ChainFamily, ChainId, ChainRegistry},
    connect::{ConnectionConfig, ConnectionOrchestrator},
    project::{
        evm::EvmProjectSource, feed::ProjectFeed, metadata::HttpMetadata,
        solana::SolanaProjectSource, ProjectReader,
    },
    program::ProgramAddresses,
    rpc::{EvmRpc, SolanaRpc},
    tx::{evm::EvmPurchasePipeline, solana::SolanaPipeline},
    wallet::{
        detector::{InjectionScope, WalletDetector},
        preferences::PreferencesFile,
        store::WalletStore,
        WalletConnector, WalletKind,
    },
};
use anyhow::{ensure, Context as _};
use serde::Serialize;
use services_common::{evm::rpc::EvmRpcClient, solana::pool::SolanaPool};
use std::sync::Arc;
use tracing::info;

pub struct SolanaServices {
    pub chain: ChainId,
    pub source: Arc<SolanaProjectSource>,
    pub pipeline: SolanaPipeline,
}

pub struct EvmServices {
    pub chain: ChainId,
    pub source: Arc<EvmProjectSource>,
    pub purchases: EvmPurchasePipeline,
}

/// One entry of the wallet selection list.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct WalletChoice {
    pub wallet: WalletKind,
    pub installed: bool,
    pub install_url: Option<&'static str>,
}

pub struct App {
    pub chains: ChainRegistry,
    pub store: Arc<WalletStore>,
    pub reader: Arc<ProjectReader>,
    pub solana: Option<SolanaServices>,
    pub evm: Option<EvmServices>,
    connection: ConnectionConfig,
    wallet_connect_enabled: bool,
}

impl App {
    pub fn from_cfg(cfg: Config) -> anyhow::Result<Self> {
        let chains = ChainRegistry::new(&cfg.chains);

        let solana = cfg
            .solana
            .map(|solana| -> anyhow::Result<_> {
                let descriptor = chains.get(solana.chain);
                ensure!(
                    descriptor.family == ChainFamily::Solana,
                    "{} is not a solana chain",
                    solana.chain
                );
                let pool = SolanaPool::from_cfg(solana.pool, &descriptor.rpc_endpoints)
                    .context("build solana pool")?;
                let rpc: Arc<dyn SolanaRpc> = Arc::new(pool);
                let source = Arc::new(SolanaProjectSource::new(
                    rpc,
                    ProgramAddresses::new(solana.program_id),
                    solana.price_decimals,
                ));
                info!("solana projects on {} via program {}", solana.chain, solana.program_id);
                Ok(SolanaServices {
                    chain: solana.chain,
                    pipeline: SolanaPipeline::new(source.clone(), solana.tx),
                    source,
                })
            })
            .transpose()?;

        let evm = cfg
            .evm
            .map(|evm| -> anyhow::Result<_> {
                let descriptor = chains.get(evm.chain);
                ensure!(
                    descriptor.family == ChainFamily::Evm,
                    "{} is not an evm chain",
                    evm.chain
                );
                let url = match evm.rpc.rpc_url {
                    Some(url) => url,
                    None => descriptor
                        .rpc_endpoints
                        .first()
                        .cloned()
                        .with_context(|| format!("no rpc endpoint for {}", evm.chain))?,
                };
                let rpc: Arc<dyn EvmRpc> = Arc::new(EvmRpcClient::new(url, &evm.rpc.limit));
                let source = Arc::new(EvmProjectSource::new(rpc, evm.contracts, evm.token_decimals));
                info!(
                    "evm projects on {} via {}",
                    evm.chain, evm.contracts.project_admin
                );
                Ok(EvmServices {
                    chain: evm.chain,
                    purchases: EvmPurchasePipeline::new(source.clone(), evm.tx),
                    source,
                })
            })
            .transpose()?;

        let metadata = HttpMetadata::new(cfg.metadata.clone()).context("build metadata client")?;
        let reader = Arc::new(ProjectReader::new(
            evm.as_ref().map(|evm| evm.source.clone()),
            solana.as_ref().map(|solana| solana.source.clone()),
            Arc::new(metadata),
            cfg.metadata.fallback_image,
        ));
        let store = Arc::new(WalletStore::new(
            cfg.preferences_path.map(PreferencesFile::new),
        ));

        Ok(Self {
            chains,
            store,
            reader,
            solana,
            evm,
            connection: cfg.connection,
            wallet_connect_enabled: cfg.wallet_connect_project_id.is_some(),
        })
    }

    pub fn feed(&self) -> ProjectFeed {
        ProjectFeed::new(self.reader.clone())
    }

    pub fn detector(&self, scope: Arc<dyn InjectionScope>) -> WalletDetector {
        WalletDetector::new(scope, self.connection.detector.clone())
    }

    pub fn orchestrator(
        &self,
        connector: Arc<dyn WalletConnector>,
        scope: Arc<dyn InjectionScope>,
    ) -> ConnectionOrchestrator {
        ConnectionOrchestrator::new(
            connector,
            self.detector(scope),
            self.store.clone(),
            self.connection.clone(),
        )
    }

    /// Wallets to offer for `family`. Relay wallets need a WalletConnect
    /// project id.
    pub fn wallet_choices(&self, detector: &WalletDetector, family: ChainFamily) -> Vec<WalletChoice> {
        WalletKind::ALL
            .into_iter()
            .filter(|wallet| wallet.supports(family))
            .filter(|wallet| wallet.requires_injection() || self.wallet_connect_enabled)
            .map(|wallet| WalletChoice {
                wallet,
                installed: detector.detect_installed(wallet),
                install_url: wallet.install_url(),
            })
            .collect()
    }

    /// Explorer link for a transaction on the configured chain of `family`.
    pub fn explorer_url(&self, family: ChainFamily, tx: &str) -> Option<String> {
        let chain = match family {
            ChainFamily::Evm => self.evm.as_ref()?.chain,
            ChainFamily::Solana => self.solana.as_ref()?.chain,
        };
        Some(self.chains.get(chain).explorer_tx_url(tx))
    }
}
