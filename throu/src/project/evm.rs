use super::{investment_value, scale_amount, ChainProject, InvestorPosition, ProjectFees, ReadError};
use crate::{
    chain::ChainFamily,
    contracts::{self, EvmContracts, IProjectAdmin},
    rpc::{is_execution_revert, EvmRpc},
};
use alloy_primitives::{Address, U256};
use alloy_sol_types::SolCall;
use rust_decimal::Decimal;
use std::sync::Arc;

pub struct EvmProjectSource {
    rpc: Arc<dyn EvmRpc>,
    contracts: EvmContracts,
    decimals: u32,
}

fn decode_error(project_id: u64, err: impl std::fmt::Display) -> ReadError {
    ReadError::Decode {
        project_id,
        reason: err.to_string(),
    }
}

fn to_u64(project_id: u64, value: U256) -> Result<u64, ReadError> {
    u64::try_from(value).map_err(|err| decode_error(project_id, err))
}

impl EvmProjectSource {
    pub fn new(rpc: Arc<dyn EvmRpc>, contracts: EvmContracts, decimals: u32) -> Self {
        Self {
            rpc,
            contracts,
            decimals,
        }
    }

    pub fn rpc(&self) -> &Arc<dyn EvmRpc> {
        &self.rpc
    }

    pub fn contracts(&self) -> &EvmContracts {
        &self.contracts
    }

    /// Decimals of the payment token.
    pub fn decimals(&self) -> u32 {
        self.decimals
    }

    fn scale(&self, project_id: u64, raw: U256) -> Result<Decimal, ReadError> {
        let raw = u128::try_from(raw).map_err(|err| decode_error(project_id, err))?;
        scale_amount(raw, self.decimals).map_err(|err| decode_error(project_id, err))
    }

    pub async fn raw_project(
        &self,
        id: u64,
    ) -> Result<IProjectAdmin::returnProjectReturn, ReadError> {
        let output = self
            .rpc
            .call(self.contracts.project_admin, contracts::return_project(id))
            .await
            .map_err(|err| {
                // the registry reverts for unknown ids
                if is_execution_revert(&err) {
                    ReadError::NotFound {
                        chain: ChainFamily::Evm,
                        project_id: id,
                    }
                } else {
                    ReadError::Rpc(err)
                }
            })?;
        let project = IProjectAdmin::returnProjectCall::abi_decode_returns(&output, true)
            .map_err(|err| decode_error(id, err))?;
        // unknown ids read back as zeroed structs on older deployments
        if project.totalSupply.is_zero() && project.price.is_zero() {
            return Err(ReadError::NotFound {
                chain: ChainFamily::Evm,
                project_id: id,
            });
        }
        Ok(project)
    }

    pub async fn project(&self, id: u64) -> Result<ChainProject, ReadError> {
        let project = self.raw_project(id).await?;
        Ok(ChainProject {
            id,
            chain: ChainFamily::Evm,
            price: self.scale(id, project.price)?,
            total_supply: to_u64(id, project.totalSupply)?,
            sold: to_u64(id, project.sales)?,
            is_active: project.active,
            crowdfunding_phase: Some(project.crowdfundingPhase),
            is_passive: project.isPassive,
            metadata_uri: project.uri,
            profit: self.scale(id, project.profit)?,
            fees: ProjectFees {
                investor: to_u64(id, project.investorFee)?,
                owner: to_u64(id, project.ownerFee)?,
            },
        })
    }

    pub async fn balance_of(&self, id: u64, owner: Address) -> Result<u64, ReadError> {
        let output = self
            .rpc
            .call(
                self.contracts.project_admin,
                contracts::balance_of(owner, id),
            )
            .await?;
        let balance = IProjectAdmin::balanceOfCall::abi_decode_returns(&output, true)
            .map_err(|err| decode_error(id, err))?
            ._0;
        to_u64(id, balance)
    }

    /// Profit is attributed pro rata to the share of supply held.
    pub async fn investor_position(
        &self,
        id: u64,
        owner: Address,
    ) -> Result<InvestorPosition, ReadError> {
        let project = self.project(id).await?;
        let tokens = self.balance_of(id, owner).await?;
        if tokens == 0 {
            return Ok(InvestorPosition::empty(id, ChainFamily::Evm));
        }
        let profit = if project.total_supply == 0 {
            Decimal::ZERO
        } else {
            (project.profit * Decimal::from(tokens) / Decimal::from(project.total_supply))
                .normalize()
        };
        Ok(InvestorPosition {
            project_id: id,
            chain: ChainFamily::Evm,
            token_count: tokens,
            investment: investment_value(tokens, project.price),
            profit,
            has_investment: true,
        })
    }
}
