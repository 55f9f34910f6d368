//! Normalized, chain-agnostic view of tokenized property projects.

pub mod evm;
pub mod feed;
pub mod metadata;
pub mod solana;

use crate::{chain::ChainFamily, wallet::WalletAddress};
use metadata::{MetadataAttribute, MetadataSource, ProjectMetadata};
use rust_decimal::Decimal;
use serde::Serialize;
use std::{
    collections::HashSet,
    sync::{Arc, Mutex},
};
use tracing::{debug, instrument, warn};

#[derive(thiserror::Error, Debug)]
pub enum ReadError {
    #[error("project {project_id} not found on {chain}")]
    NotFound { chain: ChainFamily, project_id: u64 },
    #[error("{0} reads are not configured")]
    ChainUnavailable(ChainFamily),
    #[error("{address} is not a {chain} address")]
    AddressMismatch {
        chain: ChainFamily,
        address: WalletAddress,
    },
    #[error("failed to decode project {project_id}: {reason}")]
    Decode { project_id: u64, reason: String },
    #[error(transparent)]
    Rpc(#[from] anyhow::Error),
}

impl ReadError {
    pub fn is_not_found(&self) -> bool {
        matches!(self, ReadError::NotFound { .. })
    }
}

#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize)]
pub struct ProjectFees {
    pub investor: u64,
    pub owner: u64,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct ProjectRecord {
    pub id: u64,
    pub chain: ChainFamily,
    /// `None` when the project has no metadata uri or the fetch failed.
    pub metadata: Option<ProjectMetadata>,
    /// Display name, synthesized from the id when metadata has none.
    pub name: String,
    /// Display image, the configured fallback when metadata has none.
    pub image: String,
    pub metadata_uri: String,
    /// Per share, in payment token units.
    pub price: Decimal,
    pub total_supply: u64,
    pub sold: u64,
    pub remaining: u64,
    pub is_active: bool,
    /// Only the EVM project admin tracks a crowdfunding phase.
    pub crowdfunding_phase: Option<bool>,
    pub is_passive: bool,
    pub profit: Decimal,
    pub fees: ProjectFees,
}

impl ProjectRecord {
    pub fn is_sold_out(&self) -> bool {
        self.remaining == 0
    }

    pub fn description(&self) -> &str {
        self.metadata
            .as_ref()
            .and_then(|metadata| metadata.description.as_deref())
            .unwrap_or_default()
    }

    pub fn attributes(&self) -> &[MetadataAttribute] {
        self.metadata
            .as_ref()
            .map(|metadata| metadata.attributes.as_slice())
            .unwrap_or_default()
    }
}

/// Project as read from chain, before metadata and supply normalization.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ChainProject {
    pub id: u64,
    pub chain: ChainFamily,
    pub price: Decimal,
    pub total_supply: u64,
    pub sold: u64,
    pub is_active: bool,
    pub crowdfunding_phase: Option<bool>,
    pub is_passive: bool,
    pub metadata_uri: String,
    pub profit: Decimal,
    pub fees: ProjectFees,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct InvestorPosition {
    pub project_id: u64,
    pub chain: ChainFamily,
    pub token_count: u64,
    pub investment: Decimal,
    pub profit: Decimal,
    pub has_investment: bool,
}

impl InvestorPosition {
    pub fn empty(project_id: u64, chain: ChainFamily) -> Self {
        Self {
            project_id,
            chain,
            token_count: 0,
            investment: Decimal::ZERO,
            profit: Decimal::ZERO,
            has_investment: false,
        }
    }
}

/// Converts a raw integer token amount into a decimal with `decimals` places.
pub fn scale_amount(raw: u128, decimals: u32) -> Result<Decimal, rust_decimal::Error> {
    let raw = i128::try_from(raw).map_err(|_| rust_decimal::Error::ExceedsMaximumPossibleValue)?;
    Ok(Decimal::try_from_i128_with_scale(raw, decimals)?.normalize())
}

/// Value of `shares` at `price` per share.
pub fn investment_value(shares: u64, price: Decimal) -> Decimal {
    (Decimal::from(shares) * price).normalize()
}

/// Sold can never exceed supply; inconsistent chain data is clamped.
fn clamp_supply(chain: ChainFamily, id: u64, total: u64, sold: u64) -> (u64, u64) {
    if sold > total {
        warn!("{chain} project {id} reports {sold} sold of {total}, clamping");
        (total, 0)
    } else {
        (sold, total - sold)
    }
}

pub(crate) fn build_record(
    project: ChainProject,
    metadata: Option<ProjectMetadata>,
    fallback_image: &str,
) -> ProjectRecord {
    let (sold, remaining) = clamp_supply(
        project.chain,
        project.id,
        project.total_supply,
        project.sold,
    );
    let name = metadata
        .as_ref()
        .and_then(|metadata| metadata.name.as_deref())
        .filter(|name| !name.trim().is_empty())
        .map(str::to_string)
        .unwrap_or_else(|| format!("Project #{}", project.id));
    let image = metadata
        .as_ref()
        .and_then(|metadata| metadata.image.as_deref())
        .filter(|image| !image.trim().is_empty())
        .unwrap_or(fallback_image)
        .to_string();
    ProjectRecord {
        id: project.id,
        chain: project.chain,
        metadata,
        name,
        image,
        metadata_uri: project.metadata_uri,
        price: project.price,
        total_supply: project.total_supply,
        sold,
        remaining,
        is_active: project.is_active,
        crowdfunding_phase: project.crowdfunding_phase,
        is_passive: project.is_passive,
        profit: project.profit,
        fees: project.fees,
    }
}

/// Reads projects from whichever chains are configured.
pub struct ProjectReader {
    evm: Option<Arc<evm::EvmProjectSource>>,
    solana: Option<Arc<solana::SolanaProjectSource>>,
    metadata: Arc<dyn MetadataSource>,
    fallback_image: String,
    /// Solana project ids known not to exist. Kept for the process lifetime.
    missing: Mutex<HashSet<u64>>,
}

impl ProjectReader {
    pub fn new(
        evm: Option<Arc<evm::EvmProjectSource>>,
        solana: Option<Arc<solana::SolanaProjectSource>>,
        metadata: Arc<dyn MetadataSource>,
        fallback_image: impl Into<String>,
    ) -> Self {
        Self {
            evm,
            solana,
            metadata,
            fallback_image: fallback_image.into(),
            missing: Default::default(),
        }
    }

    fn missing(&self) -> std::sync::MutexGuard<'_, HashSet<u64>> {
        self.missing
            .lock()
            .unwrap_or_else(|poisoned| poisoned.into_inner())
    }

    /// Drops remembered misses, e.g. after a new project was published.
    pub fn forget_missing(&self) {
        self.missing().clear();
    }

    async fn chain_project(&self, chain: ChainFamily, id: u64) -> Result<ChainProject, ReadError> {
        match chain {
            ChainFamily::Evm => {
                let source = self.evm.as_ref().ok_or(ReadError::ChainUnavailable(chain))?;
                source.project(id).await
            }
            ChainFamily::Solana => {
                let source = self
                    .solana
                    .as_ref()
                    .ok_or(ReadError::ChainUnavailable(chain))?;
                if self.missing().contains(&id) {
                    return Err(ReadError::NotFound {
                        chain,
                        project_id: id,
                    });
                }
                let result = source.project(id).await;
                if matches!(result, Err(ReadError::NotFound { .. })) {
                    self.missing().insert(id);
                }
                result
            }
        }
    }

    #[instrument(skip(self))]
    pub async fn project(&self, chain: ChainFamily, id: u64) -> Result<ProjectRecord, ReadError> {
        let project = self.chain_project(chain, id).await?;
        let metadata = if project.metadata_uri.trim().is_empty() {
            None
        } else {
            match self.metadata.fetch(&project.metadata_uri).await {
                Ok(metadata) => Some(metadata),
                Err(err) => {
                    debug!("metadata for {chain} project {id} unavailable: {err:#}");
                    None
                }
            }
        };
        Ok(build_record(project, metadata, &self.fallback_image))
    }

    /// Reads several projects, skipping the ones that do not exist.
    pub async fn projects(
        &self,
        chain: ChainFamily,
        ids: impl IntoIterator<Item = u64>,
    ) -> Result<Vec<ProjectRecord>, ReadError> {
        let mut records = Vec::new();
        for id in ids {
            match self.project(chain, id).await {
                Ok(record) => records.push(record),
                Err(err) if err.is_not_found() => continue,
                Err(err) => return Err(err),
            }
        }
        Ok(records)
    }

    #[instrument(skip(self))]
    pub async fn investor_position(
        &self,
        chain: ChainFamily,
        id: u64,
        owner: &WalletAddress,
    ) -> Result<InvestorPosition, ReadError> {
        let mismatch = || ReadError::AddressMismatch {
            chain,
            address: *owner,
        };
        match (chain, owner) {
            (ChainFamily::Evm, WalletAddress::Evm(owner)) => {
                let source = self.evm.as_ref().ok_or(ReadError::ChainUnavailable(chain))?;
                source.investor_position(id, *owner).await
            }
            (ChainFamily::Solana, WalletAddress::Solana(owner)) => {
                let source = self
                    .solana
                    .as_ref()
                    .ok_or(ReadError::ChainUnavailable(chain))?;
                source.investor_position(id, owner).await
            }
            _ => Err(mismatch()),
        }
    }
}
