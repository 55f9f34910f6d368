//! Polygon purchase: approve the payment token, wait for the approval to be
//! mined, then buy.

use super::{AttemptKind, PipelineError, TransactionAttempt};
use crate::{
    chain::ChainFamily,
    contracts::{self, IERC20},
    error::Failure,
    project::{evm::EvmProjectSource, ReadError},
    wallet::EvmWallet,
};
use alloy_primitives::{Address, Bytes, B256, U256};
use alloy_sol_types::SolCall;
use rust_decimal::{prelude::ToPrimitive, Decimal};
use serde::{Deserialize, Serialize};
use services_common::{
    evm::rpc::TransactionReceipt,
    utils::poll::{PollConfig, Poller},
};
use std::{sync::Arc, time::Duration};
use tokio::sync::watch;
use tracing::{debug, info, instrument, warn};

#[derive(Deserialize, Debug, Clone, serde_derive_default::Default)]
pub struct EvmTxConfig {
    /// Skip the approval when the current allowance already covers the amount.
    #[serde(default = "default_reuse_allowance")]
    pub reuse_allowance: bool,
    #[serde(default = "default_receipt_poll")]
    pub receipt: PollConfig,
}

fn default_reuse_allowance() -> bool {
    true
}

fn default_receipt_poll() -> PollConfig {
    PollConfig::new(Duration::from_secs(2), Duration::from_secs(120))
}

#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, derive_more::Display)]
#[serde(rename_all = "kebab-case")]
pub enum PurchaseStep {
    #[default]
    Idle,
    Approving,
    Investing,
    Completed,
    Failed,
}

impl PurchaseStep {
    pub fn can_advance_to(&self, next: PurchaseStep) -> bool {
        use PurchaseStep::*;
        matches!(
            (self, next),
            (Idle, Approving)
                | (Idle, Investing)
                | (Idle, Failed)
                | (Approving, Investing)
                | (Approving, Failed)
                | (Investing, Completed)
                | (Investing, Failed)
                | (Completed, Idle)
                | (Failed, Idle)
        )
    }

    pub fn is_terminal(&self) -> bool {
        matches!(self, PurchaseStep::Completed | PurchaseStep::Failed)
    }
}

#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize)]
pub struct PurchaseOutcome {
    pub step: PurchaseStep,
    /// `None` when an existing allowance was reused or the run stopped early.
    pub approval: Option<TransactionAttempt>,
    pub investment: Option<TransactionAttempt>,
    pub failure: Option<Failure>,
}

/// Scales a payment token amount into integer units. Amounts finer than the
/// token's precision are rejected rather than rounded.
pub fn to_token_units(amount: Decimal, decimals: u32) -> Result<U256, PipelineError> {
    if amount <= Decimal::ZERO {
        return Err(PipelineError::InvalidAmount(format!(
            "amount must be positive, got {amount}"
        )));
    }
    let scaled = 10u64
        .checked_pow(decimals)
        .and_then(|factor| amount.checked_mul(Decimal::from(factor)))
        .ok_or_else(|| PipelineError::InvalidAmount(format!("amount {amount} is too large")))?;
    if !scaled.fract().is_zero() {
        return Err(PipelineError::InvalidAmount(format!(
            "amount {amount} has more than {decimals} decimal places"
        )));
    }
    let units = scaled
        .to_u128()
        .ok_or_else(|| PipelineError::InvalidAmount(format!("amount {amount} is too large")))?;
    Ok(U256::from(units))
}

pub struct EvmPurchasePipeline {
    projects: Arc<EvmProjectSource>,
    config: EvmTxConfig,
    step: watch::Sender<PurchaseStep>,
}

impl EvmPurchasePipeline {
    pub fn new(projects: Arc<EvmProjectSource>, config: EvmTxConfig) -> Self {
        let (step, _) = watch::channel(PurchaseStep::Idle);
        Self {
            projects,
            config,
            step,
        }
    }

    pub fn subscribe(&self) -> watch::Receiver<PurchaseStep> {
        self.step.subscribe()
    }

    pub fn step(&self) -> PurchaseStep {
        *self.step.borrow()
    }

    fn advance(&self, next: PurchaseStep) {
        self.step.send_if_modified(|step| {
            if step.can_advance_to(next) {
                debug!("purchase {step} -> {next}");
                *step = next;
                true
            } else {
                warn!("ignoring purchase transition {step} -> {next}");
                false
            }
        });
    }

    /// Spends `amount` of the payment token on a project. Failures end up in
    /// the outcome, the returned step is always terminal.
    pub async fn purchase(
        &self,
        wallet: &dyn EvmWallet,
        project_id: u64,
        amount: Decimal,
    ) -> PurchaseOutcome {
        if self.step().is_terminal() {
            self.advance(PurchaseStep::Idle);
        }
        let mut outcome = PurchaseOutcome::default();
        match self.run(wallet, project_id, amount, &mut outcome).await {
            Ok(()) => self.advance(PurchaseStep::Completed),
            Err(err) => {
                warn!("purchase of project {project_id} failed: {err}");
                for attempt in [&mut outcome.approval, &mut outcome.investment]
                    .into_iter()
                    .flatten()
                {
                    attempt.fail(&err);
                }
                outcome.failure = Some(err.failure());
                self.advance(PurchaseStep::Failed);
            }
        }
        outcome.step = self.step();
        outcome
    }

    #[instrument(skip(self, wallet, outcome))]
    async fn run(
        &self,
        wallet: &dyn EvmWallet,
        project_id: u64,
        amount: Decimal,
        outcome: &mut PurchaseOutcome,
    ) -> Result<(), PipelineError> {
        let units = to_token_units(amount, self.projects.decimals())?;
        let project = self
            .projects
            .project(project_id)
            .await
            .map_err(|err| match err {
                ReadError::NotFound { .. } => PipelineError::ProjectNotFound(project_id),
                ReadError::Rpc(err) => PipelineError::Rpc(err),
                other => PipelineError::Rpc(other.into()),
            })?;
        if !project.is_active {
            return Err(PipelineError::ProjectInactive(project_id));
        }
        if project.crowdfunding_phase == Some(false) {
            return Err(PipelineError::CrowdfundingClosed(project_id));
        }

        let contracts = *self.projects.contracts();
        let owner = wallet.address();
        if self.needs_approval(owner, contracts.project_admin, units).await {
            self.advance(PurchaseStep::Approving);
            let approval = outcome.approval.insert(TransactionAttempt::new(
                AttemptKind::Approval,
                ChainFamily::Evm,
            ));
            self.submit(
                wallet,
                approval,
                contracts.payment_token,
                contracts::approve(contracts.project_admin, units),
            )
            .await?;
        }

        self.advance(PurchaseStep::Investing);
        let investment = outcome.investment.insert(TransactionAttempt::new(
            AttemptKind::Investment,
            ChainFamily::Evm,
        ));
        self.submit(
            wallet,
            investment,
            contracts.project_admin,
            contracts::buy_project(project_id, units),
        )
        .await
    }

    /// Unreadable allowances count as insufficient.
    async fn needs_approval(&self, owner: Address, spender: Address, units: U256) -> bool {
        if !self.config.reuse_allowance {
            return true;
        }
        let token = self.projects.contracts().payment_token;
        let allowance = match self
            .projects
            .rpc()
            .call(token, contracts::allowance(owner, spender))
            .await
        {
            Ok(output) => match IERC20::allowanceCall::abi_decode_returns(&output, true) {
                Ok(decoded) => decoded._0,
                Err(err) => {
                    warn!("undecodable allowance of {owner}: {err}");
                    return true;
                }
            },
            Err(err) => {
                warn!("allowance of {owner} unavailable: {err:#}");
                return true;
            }
        };
        debug!("allowance {allowance}, need {units}");
        allowance < units
    }

    async fn submit(
        &self,
        wallet: &dyn EvmWallet,
        attempt: &mut TransactionAttempt,
        to: Address,
        data: Bytes,
    ) -> Result<(), PipelineError> {
        let hash = wallet
            .send_transaction(to, data)
            .await
            .map_err(PipelineError::from_wallet)?;
        attempt.mark_submitted(hash.to_string());
        let receipt = self.wait_receipt(hash).await?;
        if !receipt.succeeded() {
            return Err(PipelineError::OnChainExecution(format!(
                "{} {hash} reverted",
                attempt.kind
            )));
        }
        info!("{} {hash} mined in block {:?}", attempt.kind, receipt.block_number);
        attempt.confirm();
        Ok(())
    }

    async fn wait_receipt(&self, hash: B256) -> Result<TransactionReceipt, PipelineError> {
        let rpc = self.projects.rpc().as_ref();
        Poller::new(self.config.receipt.clone())
            .until(move || async move {
                match rpc.receipt(hash).await {
                    Ok(receipt) => receipt,
                    Err(err) => {
                        warn!("receipt for {hash} unavailable: {err:#}");
                        None
                    }
                }
            })
            .await
            .map_err(|err| PipelineError::ConfirmationTimeout(format!("{hash}: {err}")))
    }
}
