//! Finds wallet providers injected by browser extensions.
//!
//! Providers show up either under a namespace owned by one wallet or under a
//! shared namespace several extensions compete for. Extensions inject late and
//! asynchronously, so detection can poll for a while.

use super::{WalletCapability, WalletKind};
use crate::chain::ChainFamily;
use serde::Deserialize;
use services_common::utils::poll::{PollConfig, Poller};
use std::{sync::Arc, time::Duration};
use tracing::{debug, trace};

/// Where a provider object was found.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum InjectionPoint {
    /// Namespace only the given wallet writes to.
    Dedicated(WalletKind, ChainFamily),
    /// Namespace any wallet of the family may claim.
    Shared(ChainFamily),
}

#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct ProviderFeatures {
    pub connect: bool,
    pub sign_transaction: bool,
    pub sign_and_send_transaction: bool,
    pub sign_all_transactions: bool,
    pub sign_message: bool,
}

/// Snapshot of an injected provider object.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct InjectedProvider {
    /// Wallets whose identity flag is set on the object. Several extensions
    /// set foreign flags to look compatible.
    pub claims: Vec<WalletKind>,
    pub features: ProviderFeatures,
}

/// Read access to whatever environment wallets inject into.
pub trait InjectionScope: Send + Sync {
    fn injected(&self, point: InjectionPoint) -> Option<InjectedProvider>;

    /// Name the multi-chain SDK reports for its active wallet, if any.
    fn sdk_wallet_name(&self) -> Option<String> {
        None
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ProviderIdentity {
    Known(WalletKind),
    /// Shared namespace with ambiguous ownership. Only generic submission is
    /// assumed to work.
    Generic,
}

/// Resolved provider tagged with its capabilities.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ProviderHandle {
    pub identity: ProviderIdentity,
    /// `None` for relay wallets which are never injected.
    pub source: Option<InjectionPoint>,
    pub capability: WalletCapability,
    /// The provider exposes its own `connect`, the flow may bypass the adapter.
    pub supports_direct_connect: bool,
}

#[derive(Deserialize, Debug, Clone, serde_derive_default::Default)]
pub struct DetectorConfig {
    #[serde(with = "humantime_serde", default = "default_poll_interval")]
    pub poll_interval: Duration,
}

fn default_poll_interval() -> Duration {
    Duration::from_millis(100)
}

#[derive(Clone)]
pub struct WalletDetector {
    scope: Arc<dyn InjectionScope>,
    config: DetectorConfig,
}

impl WalletDetector {
    pub fn new(scope: Arc<dyn InjectionScope>, config: DetectorConfig) -> Self {
        Self { scope, config }
    }

    pub fn detect_installed(&self, wallet: WalletKind) -> bool {
        if !wallet.requires_injection() {
            return true;
        }
        wallet.families().iter().any(|family| {
            self.scope
                .injected(InjectionPoint::Dedicated(wallet, *family))
                .is_some()
                || self
                    .scope
                    .injected(InjectionPoint::Shared(*family))
                    .is_some_and(|provider| provider.claims.contains(&wallet))
        })
    }

    pub fn installed_wallets(&self, family: ChainFamily) -> Vec<WalletKind> {
        WalletKind::ALL
            .into_iter()
            .filter(|wallet| wallet.supports(family) && self.detect_installed(*wallet))
            .collect()
    }

    /// Poller the caller can abort, e.g. when the selection dialog closes.
    pub fn injection_poller(&self, timeout: Duration) -> Poller {
        Poller::new(PollConfig::new(self.config.poll_interval, timeout))
    }

    /// Waits until the wallet is injected. Gives up quietly on timeout or abort.
    pub async fn wait_for_injection(&self, wallet: WalletKind, poller: &Poller) -> bool {
        let found = poller
            .until(|| async move { self.detect_installed(wallet).then_some(()) })
            .await;
        match found {
            Ok(()) => true,
            Err(err) => {
                debug!("{wallet} was not injected: {err}");
                false
            }
        }
    }

    /// Picks the provider to talk to for `wallet` on `family`.
    ///
    /// A wallet's dedicated namespace always wins. A shared namespace is only
    /// attributed to a wallet when that is the sole claimant or the SDK names
    /// it as active; otherwise a generic provider is returned.
    pub fn resolve_provider(
        &self,
        wallet: WalletKind,
        family: ChainFamily,
    ) -> Option<ProviderHandle> {
        if !wallet.supports(family) {
            return None;
        }
        if !wallet.requires_injection() {
            return Some(ProviderHandle {
                identity: ProviderIdentity::Known(wallet),
                source: None,
                capability: relay_capability(wallet, family),
                supports_direct_connect: false,
            });
        }

        let dedicated = InjectionPoint::Dedicated(wallet, family);
        if let Some(provider) = self.scope.injected(dedicated) {
            trace!("{wallet} resolved from dedicated namespace");
            return Some(known_handle(wallet, family, dedicated, &provider));
        }

        let shared = InjectionPoint::Shared(family);
        let provider = self.scope.injected(shared)?;
        if !provider.claims.contains(&wallet) {
            return None;
        }
        if provider.claims.len() == 1 {
            return Some(known_handle(wallet, family, shared, &provider));
        }
        match self
            .scope
            .sdk_wallet_name()
            .and_then(|name| WalletKind::from_sdk_name(&name))
        {
            Some(active) if active == wallet => {
                Some(known_handle(wallet, family, shared, &provider))
            }
            // the shared object belongs to another extension
            Some(active) if provider.claims.contains(&active) => None,
            _ => {
                debug!(
                    "shared {family} provider claimed by {:?}, falling back to generic",
                    provider.claims
                );
                Some(generic_handle(wallet, family, shared))
            }
        }
    }

    /// Capability as currently detectable, for display before connecting.
    pub fn capability(&self, wallet: WalletKind, family: ChainFamily) -> WalletCapability {
        self.resolve_provider(wallet, family)
            .map(|handle| handle.capability)
            .unwrap_or_else(|| WalletCapability::unavailable(wallet.to_string(), family))
    }
}

fn known_handle(
    wallet: WalletKind,
    family: ChainFamily,
    source: InjectionPoint,
    provider: &InjectedProvider,
) -> ProviderHandle {
    let features = &provider.features;
    ProviderHandle {
        identity: ProviderIdentity::Known(wallet),
        source: Some(source),
        capability: WalletCapability {
            wallet_name: wallet.to_string(),
            family,
            is_installed: true,
            can_sign_transaction: features.sign_transaction,
            can_sign_and_send: features.sign_and_send_transaction,
            can_batch_sign: features.sign_all_transactions,
            supports_priority_fees: family == ChainFamily::Solana
                && wallet.optimizes_priority_fees(),
        },
        supports_direct_connect: features.connect,
    }
}

fn generic_handle(wallet: WalletKind, family: ChainFamily, source: InjectionPoint) -> ProviderHandle {
    ProviderHandle {
        identity: ProviderIdentity::Generic,
        source: Some(source),
        capability: WalletCapability {
            wallet_name: wallet.to_string(),
            family,
            is_installed: true,
            can_sign_transaction: false,
            can_sign_and_send: true,
            can_batch_sign: false,
            supports_priority_fees: false,
        },
        supports_direct_connect: false,
    }
}

fn relay_capability(wallet: WalletKind, family: ChainFamily) -> WalletCapability {
    WalletCapability {
        wallet_name: wallet.to_string(),
        family,
        is_installed: true,
        can_sign_transaction: family == ChainFamily::Solana,
        can_sign_and_send: family == ChainFamily::Evm,
        can_batch_sign: false,
        supports_priority_fees: false,
    }
}
