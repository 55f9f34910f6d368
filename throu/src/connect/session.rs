//! State machine of a single connection flow.
//!
//! Transitions are plain methods on [`ConnectionSession`]; the orchestrator
//! owns the side effects. Every connect attempt gets a generation number and
//! results arriving for an older generation are dropped.

use crate::{
    chain::ChainFamily,
    error::Failure,
    wallet::{ConnectRoute, WalletAddress, WalletKind},
    TZ,
};
use chrono::DateTime;
use serde::Serialize;

#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, derive_more::Display)]
#[serde(rename_all = "kebab-case")]
pub enum FlowStep {
    #[default]
    Idle,
    ChainSelection,
    WalletSelection,
    Connecting,
    Connected,
    Signing,
    Success,
    Error,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
#[serde(rename_all = "kebab-case")]
pub enum ConnectionHint {
    /// The wallet popup has probably been closed or hidden.
    PopupLikelyDismissed,
}

#[derive(thiserror::Error, Debug, Clone, PartialEq, Eq)]
pub enum FlowError {
    #[error("cannot {action} while in {from} step")]
    InvalidTransition { from: FlowStep, action: &'static str },
    #[error("no chain selected")]
    NoChainSelected,
    #[error("{wallet} does not support {family}")]
    WalletNotSupported {
        wallet: WalletKind,
        family: ChainFamily,
    },
    #[error("a connection to {0} is already in progress")]
    AttemptInProgress(WalletKind),
}

#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct ConnectionSession {
    pub step: FlowStep,
    pub chain_family: Option<ChainFamily>,
    pub selected_wallet: Option<WalletKind>,
    pub route: Option<ConnectRoute>,
    pub address: Option<WalletAddress>,
    pub failure: Option<Failure>,
    pub hint: Option<ConnectionHint>,
    pub started_at: Option<DateTime<TZ>>,
    /// Address reported by the wallet adapter, held back until the user
    /// explicitly approves the connection.
    pub pending_address: Option<WalletAddress>,
    pub user_approved: bool,
    pub attempt: u64,
}

impl ConnectionSession {
    fn invalid(&self, action: &'static str) -> FlowError {
        FlowError::InvalidTransition {
            from: self.step,
            action,
        }
    }

    fn clear_attempt(&mut self) {
        self.route = None;
        self.address = None;
        self.failure = None;
        self.hint = None;
        self.started_at = None;
        self.pending_address = None;
        self.user_approved = false;
    }

    pub fn is_current(&self, attempt: u64) -> bool {
        self.attempt == attempt
    }

    /// Steps where the wallet host may hold a (partial) connection.
    pub fn holds_wallet(&self) -> bool {
        matches!(
            self.step,
            FlowStep::Connecting | FlowStep::Connected | FlowStep::Signing | FlowStep::Error
        ) && self.selected_wallet.is_some()
    }

    pub fn open(&mut self) -> Result<(), FlowError> {
        if self.step != FlowStep::Idle {
            return Err(self.invalid("open"));
        }
        self.step = FlowStep::ChainSelection;
        Ok(())
    }

    pub fn select_chain(&mut self, family: ChainFamily) -> Result<(), FlowError> {
        if !matches!(
            self.step,
            FlowStep::ChainSelection | FlowStep::WalletSelection
        ) {
            return Err(self.invalid("select a chain"));
        }
        self.chain_family = Some(family);
        self.selected_wallet = None;
        self.step = FlowStep::WalletSelection;
        Ok(())
    }

    /// Checks that `wallet` may be connected now. Selecting the wallet whose
    /// attempt is already running is rejected rather than restarted.
    pub fn check_wallet(&self, wallet: WalletKind) -> Result<ChainFamily, FlowError> {
        if self.step == FlowStep::Connecting && self.selected_wallet == Some(wallet) {
            return Err(FlowError::AttemptInProgress(wallet));
        }
        if !matches!(
            self.step,
            FlowStep::WalletSelection | FlowStep::Connecting | FlowStep::Error
        ) {
            return Err(self.invalid("select a wallet"));
        }
        let family = self.chain_family.ok_or(FlowError::NoChainSelected)?;
        if !wallet.supports(family) {
            return Err(FlowError::WalletNotSupported { wallet, family });
        }
        Ok(family)
    }

    /// Starts a new attempt and returns its generation.
    pub fn begin_connect(
        &mut self,
        wallet: WalletKind,
        route: ConnectRoute,
        now: DateTime<TZ>,
    ) -> Result<u64, FlowError> {
        self.check_wallet(wallet)?;
        self.clear_attempt();
        self.attempt += 1;
        self.selected_wallet = Some(wallet);
        self.route = Some(route);
        self.started_at = Some(now);
        self.step = FlowStep::Connecting;
        Ok(self.attempt)
    }

    /// Wallet reported an address. Adapter connections only advance once the
    /// user approved; returns whether the session moved to `Connected`.
    pub fn observe_address(&mut self, attempt: u64, address: WalletAddress) -> bool {
        if !self.is_current(attempt) || self.step != FlowStep::Connecting {
            return false;
        }
        match self.route {
            Some(ConnectRoute::SolanaAdapter) if !self.user_approved => {
                self.pending_address = Some(address);
                false
            }
            _ => {
                self.mark_connected(address);
                true
            }
        }
    }

    /// Explicit user approval of an adapter connection.
    pub fn approve(&mut self) -> Result<bool, FlowError> {
        if self.step != FlowStep::Connecting {
            return Err(self.invalid("approve the connection"));
        }
        self.user_approved = true;
        match self.pending_address.take() {
            Some(address) => {
                self.mark_connected(address);
                Ok(true)
            }
            None => Ok(false),
        }
    }

    fn mark_connected(&mut self, address: WalletAddress) {
        self.address = Some(address);
        self.pending_address = None;
        self.hint = None;
        self.step = FlowStep::Connected;
    }

    pub fn set_hint(&mut self, attempt: u64, hint: ConnectionHint) -> bool {
        if !self.is_current(attempt) || self.step != FlowStep::Connecting {
            return false;
        }
        self.hint = Some(hint);
        true
    }

    pub fn fail(&mut self, attempt: u64, failure: Failure) -> bool {
        if !self.is_current(attempt)
            || !matches!(
                self.step,
                FlowStep::Connecting | FlowStep::Connected | FlowStep::Signing
            )
        {
            return false;
        }
        self.failure = Some(failure);
        self.hint = None;
        self.pending_address = None;
        self.step = FlowStep::Error;
        true
    }

    pub fn begin_signing(&mut self) -> Result<(u64, WalletAddress), FlowError> {
        if self.step != FlowStep::Connected {
            return Err(self.invalid("request a signature"));
        }
        let address = self.address.ok_or_else(|| self.invalid("request a signature"))?;
        self.step = FlowStep::Signing;
        Ok((self.attempt, address))
    }

    pub fn complete(&mut self, attempt: u64) -> bool {
        if !self.is_current(attempt) || self.step != FlowStep::Signing {
            return false;
        }
        self.step = FlowStep::Success;
        true
    }

    /// Steps back one screen. Returns the family whose wallet connection must
    /// be torn down, if any.
    pub fn back(&mut self) -> Result<Option<ChainFamily>, FlowError> {
        match self.step {
            FlowStep::WalletSelection => {
                self.chain_family = None;
                self.selected_wallet = None;
                self.step = FlowStep::ChainSelection;
                Ok(None)
            }
            FlowStep::Connecting | FlowStep::Connected | FlowStep::Signing | FlowStep::Error => {
                let teardown = self.chain_family;
                self.attempt += 1;
                self.clear_attempt();
                self.selected_wallet = None;
                self.step = FlowStep::WalletSelection;
                Ok(teardown)
            }
            _ => Err(self.invalid("go back")),
        }
    }

    /// Destroys the session. Returns the previous state.
    pub fn reset(&mut self) -> ConnectionSession {
        let attempt = self.attempt + 1;
        std::mem::replace(
            self,
            ConnectionSession {
                attempt,
                ..Default::default()
            },
        )
    }
}
