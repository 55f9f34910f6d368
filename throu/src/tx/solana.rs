//! Solana investment and withdrawal: simulate, send, then confirm against the
//! blockhash validity window.

use super::{
    priority::{self, PriorityFeeConfig},
    AttemptKind, PipelineError, TransactionAttempt,
};
use crate::{
    chain::ChainFamily,
    program::{self, InvestorAccounts, ProgramAddresses, ProjectAccount},
    project::{solana::SolanaProjectSource, ReadError},
    rpc::{is_account_not_found, SimulationOutcome, SolanaRpc},
    wallet::SolanaWallet,
};
use serde::Deserialize;
use services_common::utils::poll::{PollConfig, Poller};
use solana_sdk::{
    instruction::Instruction,
    message::Message,
    signature::Signature,
    transaction::{Transaction, TransactionError},
};
use std::{sync::Arc, time::Duration};
use tracing::{debug, info, instrument, warn};

#[derive(Deserialize, Debug, Clone, serde_derive_default::Default)]
pub struct SolanaTxConfig {
    #[serde(default)]
    pub priority: PriorityFeeConfig,
    #[serde(default = "default_confirmation")]
    pub confirmation: PollConfig,
}

fn default_confirmation() -> PollConfig {
    PollConfig::new(Duration::from_millis(500), Duration::from_secs(90))
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
enum Operation {
    Invest { shares: u64 },
    Withdraw,
}

impl Operation {
    fn kind(&self) -> AttemptKind {
        match self {
            Operation::Invest { .. } => AttemptKind::Investment,
            Operation::Withdraw => AttemptKind::Withdrawal,
        }
    }

    /// The investor account is created by the first investment, so its
    /// absence during simulation is expected there and nowhere else.
    fn tolerates_missing_accounts(&self) -> bool {
        matches!(self, Operation::Invest { .. })
    }

    fn instruction(
        &self,
        addresses: &ProgramAddresses,
        accounts: &InvestorAccounts,
        project_id: u64,
    ) -> Instruction {
        match *self {
            Operation::Invest { shares } => {
                program::invest_project(addresses, accounts, project_id, shares)
            }
            Operation::Withdraw => program::withdraw_investor(addresses, accounts, project_id),
        }
    }
}

#[derive(Debug)]
enum Confirmation {
    Landed,
    Failed(TransactionError),
    Expired { height: u64 },
}

pub struct SolanaPipeline {
    projects: Arc<SolanaProjectSource>,
    config: SolanaTxConfig,
}

impl SolanaPipeline {
    pub fn new(projects: Arc<SolanaProjectSource>, config: SolanaTxConfig) -> Self {
        Self { projects, config }
    }

    fn rpc(&self) -> &dyn SolanaRpc {
        self.projects.rpc().as_ref()
    }

    /// Buys `shares` of a project. The returned attempt is always terminal.
    pub async fn invest(
        &self,
        wallet: &dyn SolanaWallet,
        project_id: u64,
        shares: u64,
    ) -> TransactionAttempt {
        self.execute(wallet, project_id, Operation::Invest { shares })
            .await
    }

    /// Withdraws the investor's accrued returns from a project.
    pub async fn withdraw(&self, wallet: &dyn SolanaWallet, project_id: u64) -> TransactionAttempt {
        self.execute(wallet, project_id, Operation::Withdraw).await
    }

    async fn execute(
        &self,
        wallet: &dyn SolanaWallet,
        project_id: u64,
        operation: Operation,
    ) -> TransactionAttempt {
        let mut attempt = TransactionAttempt::new(operation.kind(), ChainFamily::Solana);
        if let Err(err) = self.run(wallet, project_id, operation, &mut attempt).await {
            warn!(
                "{} {} for project {project_id} failed: {err}",
                attempt.kind, attempt.id
            );
            attempt.fail(&err);
        }
        attempt
    }

    async fn load_project(&self, project_id: u64) -> Result<ProjectAccount, PipelineError> {
        self.projects
            .account(project_id)
            .await
            .map_err(|err| match err {
                ReadError::NotFound { .. } => PipelineError::ProjectNotFound(project_id),
                ReadError::Rpc(err) => PipelineError::Rpc(err),
                other => PipelineError::Rpc(other.into()),
            })
    }

    #[instrument(skip_all, fields(project_id = project_id, kind = %attempt.kind, attempt = %attempt.id))]
    async fn run(
        &self,
        wallet: &dyn SolanaWallet,
        project_id: u64,
        operation: Operation,
        attempt: &mut TransactionAttempt,
    ) -> Result<(), PipelineError> {
        let project = self.load_project(project_id).await?;
        if let Operation::Invest { shares } = operation {
            if shares == 0 {
                return Err(PipelineError::InvalidAmount(
                    "share count must be positive".into(),
                ));
            }
            if !project.is_active {
                return Err(PipelineError::ProjectInactive(project_id));
            }
            let remaining = project.shares.saturating_sub(project.shares_sold);
            if shares > remaining {
                return Err(PipelineError::InvalidAmount(format!(
                    "{shares} shares requested, {remaining} available"
                )));
            }
        }

        let payer = wallet.pubkey();
        let capability = wallet.capability();
        let addresses = self.projects.addresses();
        let accounts = InvestorAccounts::derive(addresses, payer, project_id, &project);

        let mut instructions = Vec::with_capacity(3);
        if capability.supports_priority_fees {
            debug!("{} prices compute itself", capability.wallet_name);
        } else {
            let fee =
                priority::estimate(self.rpc(), &accounts.writable(), &self.config.priority).await;
            instructions.extend(fee.instructions());
        }
        instructions.push(operation.instruction(addresses, &accounts, project_id));

        let (blockhash, last_valid_block_height) = self.rpc().latest_blockhash().await?;
        let message = Message::new_with_blockhash(&instructions, Some(&payer), &blockhash);
        let tx = Transaction::new_unsigned(message);

        attempt.mark_simulating();
        self.simulate(&tx, operation).await?;

        let signature = if capability.can_sign_and_send {
            wallet
                .sign_and_send_transaction(tx)
                .await
                .map_err(PipelineError::from_wallet)?
        } else if capability.can_sign_transaction {
            let signed = wallet
                .sign_transaction(tx)
                .await
                .map_err(PipelineError::from_wallet)?;
            // simulated above
            self.rpc()
                .send(&signed, true)
                .await
                .map_err(|err| PipelineError::SendFailed(format!("{err:#}")))?
        } else {
            return Err(PipelineError::WalletUnavailable(format!(
                "{} cannot sign Solana transactions",
                capability.wallet_name
            )));
        };
        attempt.mark_submitted(signature.to_string());
        debug!("submitted {signature}, valid until height {last_valid_block_height}");

        match self.confirm(&signature, last_valid_block_height).await? {
            Confirmation::Landed => {
                info!("{} {signature} confirmed", attempt.kind);
                attempt.confirm();
                Ok(())
            }
            Confirmation::Failed(err) => Err(PipelineError::OnChainExecution(err.to_string())),
            Confirmation::Expired { height } => Err(PipelineError::ConfirmationTimeout(format!(
                "blockhash expired at height {height}, valid until {last_valid_block_height}"
            ))),
        }
    }

    async fn simulate(&self, tx: &Transaction, operation: Operation) -> Result<(), PipelineError> {
        let outcome = match self.rpc().simulate(tx).await {
            Ok(outcome) => outcome,
            Err(err) => {
                let text = format!("{err:#}");
                if is_account_not_found(&text) && operation.tolerates_missing_accounts() {
                    warn!("simulation could not load an account, continuing: {text}");
                    return Ok(());
                }
                return Err(PipelineError::SimulationFailed(text));
            }
        };
        let SimulationOutcome {
            err,
            logs,
            units_consumed,
        } = outcome;
        let Some(err) = err else {
            debug!("simulation ok, {units_consumed:?} units consumed");
            return Ok(());
        };
        let missing_account = matches!(
            err,
            TransactionError::AccountNotFound | TransactionError::ProgramAccountNotFound
        ) || is_account_not_found(&err.to_string())
            || logs.iter().any(|line| is_account_not_found(line));
        if missing_account && operation.tolerates_missing_accounts() {
            warn!("simulation could not load an account, continuing: {err}");
            return Ok(());
        }
        let detail = logs
            .iter()
            .rev()
            .find(|line| line.contains("Error") || line.contains("failed"));
        Err(PipelineError::SimulationFailed(match detail {
            Some(line) => format!("{err}: {line}"),
            None => err.to_string(),
        }))
    }

    /// Polls the signature until it lands, fails, or its blockhash expires.
    /// Transient status errors are retried until the poll window closes.
    async fn confirm(
        &self,
        signature: &Signature,
        last_valid_block_height: u64,
    ) -> Result<Confirmation, PipelineError> {
        let rpc = self.rpc();
        let poller = Poller::new(self.config.confirmation.clone());
        poller
            .until(move || async move {
                match rpc.signature_status(signature).await {
                    Ok(Some(Ok(()))) => return Some(Confirmation::Landed),
                    Ok(Some(Err(err))) => return Some(Confirmation::Failed(err)),
                    Ok(None) => {}
                    Err(err) => {
                        warn!("signature status for {signature} unavailable: {err:#}");
                        return None;
                    }
                }
                match rpc.block_height().await {
                    Ok(height) if height > last_valid_block_height => {
                        Some(Confirmation::Expired { height })
                    }
                    Ok(_) => None,
                    Err(err) => {
                        warn!("block height unavailable: {err:#}");
                        None
                    }
                }
            })
            .await
            .map_err(|err| PipelineError::ConfirmationTimeout(err.to_string()))
    }
}
