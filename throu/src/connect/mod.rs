//! Connection flow: chain selection, wallet selection, connection and proof
//! of ownership, in that order.
//!
//! Failures of the wallet host never escape this module. They end up as a
//! classified [`Failure`] in the session and the store. [`FlowError`] only
//! reports calls made in the wrong step.

pub mod challenge;
pub mod session;

use crate::{
    chain::ChainFamily,
    error::{ErrorKind, Failure},
    wallet::{
        detector::{DetectorConfig, WalletDetector},
        store::{WalletStatus, WalletStore},
        ConnectRoute, WalletConnector, WalletKind,
    },
    TZ,
};
use challenge::Challenge;
use serde::Deserialize;
use session::{ConnectionHint, ConnectionSession, FlowStep};
use std::{sync::Arc, time::Duration};
use tokio::{sync::watch, time::Instant};
use tracing::{debug, info, instrument, warn};

pub use session::FlowError;

#[derive(Deserialize, Debug, Clone, serde_derive_default::Default)]
pub struct ConnectionConfig {
    #[serde(with = "humantime_serde", default = "default_evm_timeout")]
    pub evm_timeout: Duration,
    #[serde(with = "humantime_serde", default = "default_solana_timeout")]
    pub solana_timeout: Duration,
    #[serde(with = "humantime_serde", default = "default_popup_hint_after")]
    pub popup_hint_after: Duration,
    #[serde(with = "humantime_serde", default = "default_signature_timeout")]
    pub signature_timeout: Duration,
    /// How long to wait for a late extension before reporting it missing.
    #[serde(with = "humantime_serde", default = "default_injection_wait")]
    pub injection_wait: Duration,
    #[serde(default)]
    pub detector: DetectorConfig,
}

fn default_evm_timeout() -> Duration {
    Duration::from_secs(20)
}

fn default_solana_timeout() -> Duration {
    Duration::from_secs(30)
}

fn default_popup_hint_after() -> Duration {
    Duration::from_secs(5)
}

fn default_signature_timeout() -> Duration {
    Duration::from_secs(60)
}

fn default_injection_wait() -> Duration {
    Duration::from_secs(1)
}

impl ConnectionConfig {
    pub fn timeout_for(&self, family: ChainFamily) -> Duration {
        match family {
            ChainFamily::Evm => self.evm_timeout,
            ChainFamily::Solana => self.solana_timeout,
        }
    }
}

/// Drives a [`ConnectionSession`] against a wallet host. Cheap to clone,
/// clones share the session.
#[derive(Clone)]
pub struct ConnectionOrchestrator {
    connector: Arc<dyn WalletConnector>,
    detector: WalletDetector,
    store: Arc<WalletStore>,
    config: Arc<ConnectionConfig>,
    session: Arc<watch::Sender<ConnectionSession>>,
}

impl ConnectionOrchestrator {
    pub fn new(
        connector: Arc<dyn WalletConnector>,
        detector: WalletDetector,
        store: Arc<WalletStore>,
        config: ConnectionConfig,
    ) -> Self {
        let (session, _) = watch::channel(ConnectionSession::default());
        Self {
            connector,
            detector,
            store,
            config: Arc::new(config),
            session: Arc::new(session),
        }
    }

    pub fn session(&self) -> ConnectionSession {
        self.session.borrow().clone()
    }

    pub fn subscribe(&self) -> watch::Receiver<ConnectionSession> {
        self.session.subscribe()
    }

    pub fn store(&self) -> &Arc<WalletStore> {
        &self.store
    }

    fn update<R>(&self, transition: impl FnOnce(&mut ConnectionSession) -> R) -> R {
        let mut out = None;
        self.session
            .send_modify(|session| out = Some(transition(session)));
        out.expect("invariant: send_modify runs the transition")
    }

    pub fn open(&self) -> Result<(), FlowError> {
        self.update(|session| {
            if session.step != FlowStep::Idle {
                session.reset();
            }
            session.open()
        })
    }

    pub fn select_chain(&self, family: ChainFamily) -> Result<(), FlowError> {
        self.update(|session| session.select_chain(family))?;
        self.store.set_active_chain(family);
        Ok(())
    }

    fn route_for(&self, wallet: WalletKind, family: ChainFamily) -> ConnectRoute {
        match family {
            ChainFamily::Evm => ConnectRoute::EvmSdk,
            ChainFamily::Solana => match self.detector.resolve_provider(wallet, family) {
                Some(handle) if handle.supports_direct_connect => ConnectRoute::SolanaDirect,
                _ => ConnectRoute::SolanaAdapter,
            },
        }
    }

    /// Connects `wallet` on the selected chain. Resolves once the attempt has
    /// settled: connected, failed, timed out or superseded.
    #[instrument(skip(self))]
    pub async fn select_wallet(&self, wallet: WalletKind) -> Result<ConnectionSession, FlowError> {
        let previous = self.session();
        let family = previous.check_wallet(wallet)?;
        // a retry starts from a clean wallet host
        if previous.holds_wallet() {
            self.teardown(family).await;
        }

        if !self.detector.detect_installed(wallet) {
            let poller = self.detector.injection_poller(self.config.injection_wait);
            self.detector.wait_for_injection(wallet, &poller).await;
        }
        let route = self.route_for(wallet, family);
        let attempt = self.update(|session| session.begin_connect(wallet, route, TZ::now()))?;
        self.store.set_status(family, WalletStatus::Connecting);
        debug!(attempt, ?route, "connecting {wallet} on {family}");

        if !self.detector.detect_installed(wallet) {
            let failure = Failure::new(ErrorKind::NotInstalled, format!("{wallet} is not installed"));
            self.abandon(attempt, family, failure, false).await;
            return Ok(self.session());
        }

        if wallet.uses_blocking_popup() {
            self.spawn_popup_hint(attempt);
        }

        let window = self.config.timeout_for(family);
        let deadline = Instant::now() + window;
        match tokio::time::timeout_at(deadline, self.connector.connect(wallet, route)).await {
            Err(_) => {
                let failure = Failure::new(
                    ErrorKind::Timeout,
                    format!("{wallet} connection timed out after {window:?}"),
                );
                self.abandon(attempt, family, failure, true).await;
            }
            Ok(Err(err)) => {
                self.abandon(attempt, family, err.failure(), true).await;
            }
            Ok(Ok(address)) if address.family() != family => {
                let failure = Failure::new(
                    ErrorKind::WrongNetwork,
                    format!("{wallet} returned a {} address", address.family()),
                );
                self.abandon(attempt, family, failure, true).await;
            }
            Ok(Ok(address)) => {
                let connected = self.update(|session| session.observe_address(attempt, address));
                let current = self.session.borrow().is_current(attempt);
                if !current {
                    debug!(attempt, "connection resolved for an abandoned attempt");
                    self.teardown(family).await;
                } else if !connected {
                    self.await_approval(attempt, family, deadline).await;
                } else {
                    info!(%address, "{wallet} connected, awaiting signature");
                }
            }
        }
        Ok(self.session())
    }

    /// Wallet-adapter connections only count once the user confirmed them in
    /// the app, a reported address alone may be a silent auto-reconnect.
    async fn await_approval(&self, attempt: u64, family: ChainFamily, deadline: Instant) {
        let mut rx = self.session.subscribe();
        let settled = tokio::time::timeout_at(
            deadline,
            rx.wait_for(|session| {
                !session.is_current(attempt) || session.step != FlowStep::Connecting
            }),
        )
        .await
        .is_ok();
        if !settled {
            let failure = Failure::new(
                ErrorKind::Timeout,
                "connection was not approved before it timed out",
            );
            self.abandon(attempt, family, failure, true).await;
        }
    }

    pub fn approve_connection(&self) -> Result<(), FlowError> {
        let connected = self.update(|session| session.approve())?;
        debug!(connected, "connection approved by user");
        Ok(())
    }

    fn spawn_popup_hint(&self, attempt: u64) {
        let session = self.session.clone();
        let after = self.config.popup_hint_after;
        tokio::spawn(async move {
            tokio::time::sleep(after).await;
            session.send_if_modified(|session| {
                session.set_hint(attempt, ConnectionHint::PopupLikelyDismissed)
            });
        });
    }

    /// Asks the connected wallet to sign a challenge. The store only learns
    /// about the connection once the signature checks out.
    #[instrument(skip(self))]
    pub async fn sign_for_verification(&self) -> Result<ConnectionSession, FlowError> {
        let (attempt, address) = self.update(|session| session.begin_signing())?;
        let family = address.family();
        let wallet = self.session.borrow().selected_wallet;
        let challenge = Challenge::new(address, TZ::now());

        let signed = tokio::time::timeout(
            self.config.signature_timeout,
            self.connector
                .sign_message(family, challenge.message().as_bytes()),
        )
        .await;
        let failure = match signed {
            Err(_) => Some(Failure::new(
                ErrorKind::Timeout,
                "signature request timed out",
            )),
            Ok(Err(err)) => Some(err.failure()),
            Ok(Ok(signature)) => challenge
                .verify(&signature)
                .err()
                .map(|err| Failure::new(ErrorKind::Unknown, err.to_string())),
        };

        match failure {
            None => {
                if self.update(|session| session.complete(attempt)) {
                    self.store
                        .set_connection(family, true, Some(address), wallet);
                    if let Some(wallet) = wallet {
                        self.store.remember_wallet(family, wallet);
                    }
                    info!(%address, "wallet ownership verified");
                }
            }
            Some(failure) => self.abandon(attempt, family, failure, true).await,
        }
        Ok(self.session())
    }

    pub async fn back(&self) -> Result<ConnectionSession, FlowError> {
        if let Some(family) = self.update(|session| session.back())? {
            self.teardown(family).await;
        }
        Ok(self.session())
    }

    /// Closes the flow from any step.
    pub async fn close(&self) {
        let previous = self.update(|session| session.reset());
        if previous.holds_wallet() {
            if let Some(family) = previous.chain_family {
                self.teardown(family).await;
            }
        }
    }

    async fn abandon(&self, attempt: u64, family: ChainFamily, failure: Failure, teardown: bool) {
        warn!(attempt, "connection attempt failed: {failure}");
        if !self.update(|session| session.fail(attempt, failure.clone())) {
            return;
        }
        if !self.store.snapshot().family(family).connected {
            self.store.set_error(family, Some(&failure.message));
        }
        if teardown {
            self.disconnect_host(family).await;
        }
    }

    async fn teardown(&self, family: ChainFamily) {
        self.disconnect_host(family).await;
        if !self.store.snapshot().family(family).connected {
            self.store.set_error(family, None);
            self.store.set_status(family, WalletStatus::Disconnected);
        }
    }

    async fn disconnect_host(&self, family: ChainFamily) {
        if let Err(err) = self.connector.disconnect(family).await {
            warn!("best-effort {family} disconnect failed: {err}");
        }
    }
}
