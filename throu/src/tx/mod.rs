//! Investment transactions: building, simulating, submitting and confirming.
//!
//! Every pipeline run yields a [`TransactionAttempt`]; failures are recorded
//! in it rather than returned, so callers always get something to display.

pub mod evm;
pub mod priority;
pub mod solana;

use crate::{
    chain::ChainFamily,
    error::{ErrorKind, Failure},
    wallet::WalletError,
    TZ,
};
use chrono::DateTime;
use serde::Serialize;
use uuid::Uuid;

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, derive_more::Display)]
#[serde(rename_all = "kebab-case")]
pub enum AttemptKind {
    Approval,
    Investment,
    Withdrawal,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, derive_more::Display)]
#[serde(rename_all = "kebab-case")]
pub enum AttemptStatus {
    Pending,
    Simulating,
    Submitted,
    Confirmed,
    Failed,
}

impl AttemptStatus {
    pub fn is_terminal(&self) -> bool {
        matches!(self, AttemptStatus::Confirmed | AttemptStatus::Failed)
    }
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct TransactionAttempt {
    pub id: Uuid,
    pub kind: AttemptKind,
    pub chain: ChainFamily,
    pub status: AttemptStatus,
    pub signature_or_hash: Option<String>,
    pub failure: Option<Failure>,
    pub created_at: DateTime<TZ>,
}

impl TransactionAttempt {
    pub fn new(kind: AttemptKind, chain: ChainFamily) -> Self {
        Self {
            id: Uuid::new_v4(),
            kind,
            chain,
            status: AttemptStatus::Pending,
            signature_or_hash: None,
            failure: None,
            created_at: TZ::now(),
        }
    }

    /// Terminal attempts never change again.
    fn advance(&mut self, status: AttemptStatus) -> bool {
        if self.status.is_terminal() {
            return false;
        }
        self.status = status;
        true
    }

    pub fn mark_simulating(&mut self) -> bool {
        self.advance(AttemptStatus::Simulating)
    }

    pub fn mark_submitted(&mut self, signature_or_hash: impl Into<String>) -> bool {
        let advanced = self.advance(AttemptStatus::Submitted);
        if advanced {
            self.signature_or_hash = Some(signature_or_hash.into());
        }
        advanced
    }

    pub fn confirm(&mut self) -> bool {
        self.advance(AttemptStatus::Confirmed)
    }

    pub fn fail(&mut self, err: &PipelineError) -> bool {
        let advanced = self.advance(AttemptStatus::Failed);
        if advanced {
            self.failure = Some(err.failure());
        }
        advanced
    }

    pub fn is_confirmed(&self) -> bool {
        self.status == AttemptStatus::Confirmed
    }
}

#[derive(thiserror::Error, Debug)]
pub enum PipelineError {
    #[error("transaction rejected in wallet: {0}")]
    UserRejected(String),
    #[error("wallet unavailable: {0}")]
    WalletUnavailable(String),
    #[error("invalid amount: {0}")]
    InvalidAmount(String),
    #[error("project {0} was not found")]
    ProjectNotFound(u64),
    #[error("project {0} is not accepting investments")]
    ProjectInactive(u64),
    #[error("crowdfunding for project {0} is closed")]
    CrowdfundingClosed(u64),
    #[error("transaction simulation failed: {0}")]
    SimulationFailed(String),
    #[error("failed to send transaction: {0}")]
    SendFailed(String),
    #[error("transaction was not confirmed: {0}")]
    ConfirmationTimeout(String),
    #[error("transaction failed on chain: {0}")]
    OnChainExecution(String),
    #[error(transparent)]
    Rpc(#[from] anyhow::Error),
}

impl PipelineError {
    /// Maps a wallet failure during signing or submission.
    pub fn from_wallet(err: WalletError) -> Self {
        match err.failure().kind {
            ErrorKind::UserRejected => PipelineError::UserRejected(err.message),
            ErrorKind::NotInstalled | ErrorKind::AccountLocked => {
                PipelineError::WalletUnavailable(err.message)
            }
            _ => PipelineError::SendFailed(err.message),
        }
    }

    pub fn kind(&self) -> ErrorKind {
        let classify_or = |message: &str, fallback: ErrorKind| match ErrorKind::classify(None, message) {
            ErrorKind::Unknown => fallback,
            kind => kind,
        };
        match self {
            PipelineError::UserRejected(_) => ErrorKind::UserRejected,
            PipelineError::WalletUnavailable(message) => {
                classify_or(message, ErrorKind::NotInstalled)
            }
            PipelineError::InvalidAmount(_)
            | PipelineError::ProjectNotFound(_)
            | PipelineError::ProjectInactive(_)
            | PipelineError::CrowdfundingClosed(_) => ErrorKind::Unknown,
            PipelineError::SimulationFailed(message) => {
                match ErrorKind::classify(None, message) {
                    ErrorKind::InsufficientFunds => ErrorKind::InsufficientFunds,
                    _ => ErrorKind::SimulationFailed,
                }
            }
            PipelineError::SendFailed(message) => classify_or(message, ErrorKind::NetworkError),
            PipelineError::ConfirmationTimeout(_) => ErrorKind::Timeout,
            PipelineError::OnChainExecution(_) => ErrorKind::OnChainExecutionError,
            PipelineError::Rpc(err) => classify_or(&format!("{err:#}"), ErrorKind::NetworkError),
        }
    }

    pub fn failure(&self) -> Failure {
        let message = match self {
            PipelineError::Rpc(err) => format!("{err:#}"),
            other => other.to_string(),
        };
        Failure::new(self.kind(), message)
    }
}
