use super::{investment_value, scale_amount, ChainProject, InvestorPosition, ProjectFees, ReadError};
use crate::{
    chain::ChainFamily,
    program::{InvestorAccount, ProgramAddresses, ProjectAccount},
    rpc::{is_account_not_found, SolanaRpc},
};
use solana_sdk::pubkey::Pubkey;
use std::sync::Arc;
use tracing::trace;

pub struct SolanaProjectSource {
    rpc: Arc<dyn SolanaRpc>,
    addresses: ProgramAddresses,
    decimals: u32,
}

impl SolanaProjectSource {
    pub fn new(rpc: Arc<dyn SolanaRpc>, addresses: ProgramAddresses, decimals: u32) -> Self {
        Self {
            rpc,
            addresses,
            decimals,
        }
    }

    pub fn rpc(&self) -> &Arc<dyn SolanaRpc> {
        &self.rpc
    }

    pub fn addresses(&self) -> &ProgramAddresses {
        &self.addresses
    }

    /// Account bytes, with "account not found" failures folded into `None`.
    async fn account_data(&self, address: &Pubkey) -> Result<Option<Vec<u8>>, ReadError> {
        match self.rpc.account_data(address).await {
            Ok(data) => Ok(data),
            Err(err) if is_account_not_found(&format!("{err:#}")) => Ok(None),
            Err(err) => Err(ReadError::Rpc(err)),
        }
    }

    pub async fn account(&self, id: u64) -> Result<ProjectAccount, ReadError> {
        let address = self.addresses.project(id);
        trace!("reading project {id} at {address}");
        let data = self
            .account_data(&address)
            .await?
            .ok_or(ReadError::NotFound {
                chain: ChainFamily::Solana,
                project_id: id,
            })?;
        ProjectAccount::decode(&data).map_err(|err| ReadError::Decode {
            project_id: id,
            reason: format!("{err:#}"),
        })
    }

    pub async fn project(&self, id: u64) -> Result<ChainProject, ReadError> {
        let account = self.account(id).await?;
        let scale = |raw: u64| {
            scale_amount(raw.into(), self.decimals).map_err(|err| ReadError::Decode {
                project_id: id,
                reason: err.to_string(),
            })
        };
        Ok(ChainProject {
            id,
            chain: ChainFamily::Solana,
            price: scale(account.price)?,
            total_supply: account.shares,
            sold: account.shares_sold,
            is_active: account.is_active,
            crowdfunding_phase: None,
            is_passive: account.is_pasive_project,
            metadata_uri: account.metadata_uri,
            profit: scale(account.gains)?,
            fees: ProjectFees {
                investor: account.fee_investor,
                owner: account.fee_project,
            },
        })
    }

    pub async fn investor_position(
        &self,
        id: u64,
        owner: &Pubkey,
    ) -> Result<InvestorPosition, ReadError> {
        let address = self.addresses.investor(owner, id);
        let Some(data) = self.account_data(&address).await? else {
            return Ok(InvestorPosition::empty(id, ChainFamily::Solana));
        };
        let investor = InvestorAccount::decode(&data).map_err(|err| ReadError::Decode {
            project_id: id,
            reason: format!("{err:#}"),
        })?;
        let project = self.project(id).await?;
        let decode = |err: rust_decimal::Error| ReadError::Decode {
            project_id: id,
            reason: err.to_string(),
        };
        Ok(InvestorPosition {
            project_id: id,
            chain: ChainFamily::Solana,
            token_count: investor.shares,
            investment: investment_value(investor.shares, project.price),
            profit: scale_amount(investor.amount_withdrawn.into(), self.decimals).map_err(decode)?,
            has_investment: investor.shares > 0,
        })
    }
}
