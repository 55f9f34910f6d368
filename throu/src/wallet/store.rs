//! Unified view of wallet connections across chain families.
//!
//! One store instance is created by the composition root and shared by
//! reference. Readers subscribe to a watch channel; writers go through the
//! setters below so derived fields stay consistent.

use super::{
    preferences::{Preferences, PreferencesFile},
    WalletAddress, WalletKind,
};
use crate::{chain::ChainFamily, error::ErrorKind};
use serde::Serialize;
use std::sync::Mutex;
use tokio::sync::watch;
use tracing::{debug, warn};

#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize)]
#[serde(rename_all = "kebab-case")]
pub enum WalletStatus {
    #[default]
    Disconnected,
    Connecting,
    Connected,
    Rejected,
    Timeout,
    Error,
}

impl WalletStatus {
    fn is_error(&self) -> bool {
        matches!(
            self,
            WalletStatus::Rejected | WalletStatus::Timeout | WalletStatus::Error
        )
    }
}

#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct FamilyState {
    pub connected: bool,
    pub address: Option<WalletAddress>,
    pub wallet: Option<WalletKind>,
    pub status: WalletStatus,
    pub error: Option<String>,
}

#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct UnifiedWalletState {
    pub evm: FamilyState,
    pub solana: FamilyState,
    pub active_chain: Option<ChainFamily>,
}

impl UnifiedWalletState {
    pub fn family(&self, family: ChainFamily) -> &FamilyState {
        match family {
            ChainFamily::Evm => &self.evm,
            ChainFamily::Solana => &self.solana,
        }
    }

    fn family_mut(&mut self, family: ChainFamily) -> &mut FamilyState {
        match family {
            ChainFamily::Evm => &mut self.evm,
            ChainFamily::Solana => &mut self.solana,
        }
    }

    pub fn any_connected(&self) -> bool {
        self.evm.connected || self.solana.connected
    }

    /// Address of the active family, if it is connected.
    pub fn active_address(&self) -> Option<WalletAddress> {
        self.active_chain
            .map(|family| self.family(family))
            .filter(|state| state.connected)
            .and_then(|state| state.address)
    }

    fn pick_active(&mut self) {
        let keep = self
            .active_chain
            .is_some_and(|family| self.family(family).connected);
        if !keep {
            self.active_chain = ChainFamily::ALL
                .into_iter()
                .find(|family| self.family(*family).connected);
        }
    }
}

pub struct WalletStore {
    state: watch::Sender<UnifiedWalletState>,
    preferences: Mutex<Preferences>,
    persistence: Option<PreferencesFile>,
}

impl WalletStore {
    pub fn new(persistence: Option<PreferencesFile>) -> Self {
        let preferences = match persistence.as_ref().map(PreferencesFile::load) {
            Some(Ok(preferences)) => preferences,
            Some(Err(err)) => {
                warn!("ignoring unreadable wallet preferences: {err:#}");
                Preferences::default()
            }
            None => Preferences::default(),
        };
        let (state, _) = watch::channel(UnifiedWalletState::default());
        Self {
            state,
            preferences: Mutex::new(preferences),
            persistence,
        }
    }

    pub fn in_memory() -> Self {
        Self::new(None)
    }

    pub fn snapshot(&self) -> UnifiedWalletState {
        self.state.borrow().clone()
    }

    pub fn subscribe(&self) -> watch::Receiver<UnifiedWalletState> {
        self.state.subscribe()
    }

    /// Records a connection change. A connected family must carry an address.
    pub fn set_connection(
        &self,
        family: ChainFamily,
        connected: bool,
        address: Option<WalletAddress>,
        wallet: Option<WalletKind>,
    ) {
        let connected = connected && address.is_some();
        self.state.send_modify(|state| {
            let entry = state.family_mut(family);
            if connected {
                *entry = FamilyState {
                    connected: true,
                    address,
                    wallet,
                    status: WalletStatus::Connected,
                    error: None,
                };
            } else {
                entry.connected = false;
                entry.address = None;
                entry.wallet = None;
                if !entry.status.is_error() {
                    entry.status = WalletStatus::Disconnected;
                }
            }
            state.pick_active();
        });
        debug!("{family} wallet connected={connected}");
    }

    pub fn set_status(&self, family: ChainFamily, status: WalletStatus) {
        self.state.send_modify(|state| {
            let entry = state.family_mut(family);
            entry.status = status;
            if !status.is_error() {
                entry.error = None;
            }
        });
    }

    /// Stores an error and derives the status from its text. Clearing the
    /// error falls back to the connection status.
    pub fn set_error(&self, family: ChainFamily, error: Option<&str>) {
        self.state.send_modify(|state| {
            let entry = state.family_mut(family);
            match error {
                Some(message) => {
                    entry.status = match ErrorKind::classify(None, message) {
                        ErrorKind::UserRejected => WalletStatus::Rejected,
                        ErrorKind::Timeout => WalletStatus::Timeout,
                        _ => WalletStatus::Error,
                    };
                    entry.error = Some(message.to_string());
                }
                None => {
                    entry.error = None;
                    if entry.status.is_error() {
                        entry.status = if entry.connected {
                            WalletStatus::Connected
                        } else {
                            WalletStatus::Disconnected
                        };
                    }
                }
            }
        });
    }

    /// Switching to a family without a connection is allowed; the UI then
    /// prompts for one.
    pub fn set_active_chain(&self, family: ChainFamily) {
        self.state
            .send_modify(|state| state.active_chain = Some(family));
    }

    pub fn clear_errors(&self) {
        for family in ChainFamily::ALL {
            self.set_error(family, None);
        }
    }

    pub fn disconnect_all(&self) {
        self.state
            .send_modify(|state| *state = UnifiedWalletState::default());
        debug!("all wallets disconnected");
    }

    /// Drops every connection. Preferences survive.
    pub fn sign_out(&self) {
        self.disconnect_all();
    }

    pub fn preferences(&self) -> Preferences {
        self.lock_preferences().clone()
    }

    pub fn set_auto_connect(&self, auto_connect: bool) {
        self.update_preferences(|preferences| preferences.auto_connect = auto_connect);
    }

    pub fn remember_wallet(&self, family: ChainFamily, wallet: WalletKind) {
        self.update_preferences(|preferences| {
            preferences.preferred_wallet.insert(family, wallet);
        });
    }

    fn update_preferences(&self, update: impl FnOnce(&mut Preferences)) {
        let snapshot = {
            let mut preferences = self.lock_preferences();
            update(&mut preferences);
            preferences.clone()
        };
        if let Some(file) = &self.persistence {
            if let Err(err) = file.save(&snapshot) {
                warn!("failed to persist wallet preferences: {err:#}");
            }
        }
    }

    fn lock_preferences(&self) -> std::sync::MutexGuard<'_, Preferences> {
        self.preferences
            .lock()
            .unwrap_or_else(|poisoned| poisoned.into_inner())
    }
}

impl Default for WalletStore {
    fn default() -> Self {
        Self::in_memory()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use solana_sdk::pubkey::Pubkey;

    fn solana_address() -> WalletAddress {
        WalletAddress::Solana(Pubkey::new_unique())
    }

    fn evm_address() -> WalletAddress {
        WalletAddress::Evm(alloy_primitives::Address::repeat_byte(0x11))
    }

    #[test]
    fn test_connection_picks_active_family() {
        let store = WalletStore::in_memory();
        let address = solana_address();
        store.set_connection(
            ChainFamily::Solana,
            true,
            Some(address),
            Some(WalletKind::Phantom),
        );
        let state = store.snapshot();
        assert!(state.solana.connected);
        assert_eq!(state.solana.status, WalletStatus::Connected);
        assert_eq!(state.active_chain, Some(ChainFamily::Solana));
        assert_eq!(state.active_address(), Some(address));

        store.set_connection(ChainFamily::Evm, true, Some(evm_address()), Some(WalletKind::MetaMask));
        assert_eq!(store.snapshot().active_chain, Some(ChainFamily::Solana));

        store.set_connection(ChainFamily::Solana, false, None, None);
        let state = store.snapshot();
        assert!(!state.solana.connected);
        assert_eq!(state.solana.address, None);
        assert_eq!(state.active_chain, Some(ChainFamily::Evm));
    }

    #[test]
    fn test_connected_requires_address() {
        let store = WalletStore::in_memory();
        store.set_connection(ChainFamily::Evm, true, None, Some(WalletKind::MetaMask));
        let state = store.snapshot();
        assert!(!state.evm.connected);
        assert_eq!(state.active_chain, None);
    }

    #[test]
    fn test_error_status_classification() {
        let store = WalletStore::in_memory();
        store.set_error(ChainFamily::Solana, Some("User rejected the request."));
        assert_eq!(store.snapshot().solana.status, WalletStatus::Rejected);

        store.set_error(ChainFamily::Solana, Some("Connection timed out"));
        assert_eq!(store.snapshot().solana.status, WalletStatus::Timeout);

        store.set_error(ChainFamily::Solana, Some("boom"));
        let state = store.snapshot();
        assert_eq!(state.solana.status, WalletStatus::Error);
        assert_eq!(state.solana.error.as_deref(), Some("boom"));
        assert_eq!(state.evm.status, WalletStatus::Disconnected);

        store.clear_errors();
        let state = store.snapshot();
        assert_eq!(state.solana.status, WalletStatus::Disconnected);
        assert_eq!(state.solana.error, None);
    }

    #[test]
    fn test_disconnect_all() {
        let store = WalletStore::in_memory();
        store.set_connection(ChainFamily::Evm, true, Some(evm_address()), Some(WalletKind::MetaMask));
        store.set_connection(ChainFamily::Solana, true, Some(solana_address()), Some(WalletKind::Phantom));
        store.remember_wallet(ChainFamily::Evm, WalletKind::MetaMask);
        store.sign_out();

        assert_eq!(store.snapshot(), UnifiedWalletState::default());
        assert_eq!(
            store.preferences().preferred_wallet.get(&ChainFamily::Evm),
            Some(&WalletKind::MetaMask)
        );
    }

    #[test]
    fn test_preferences_survive_restart_but_connections_do_not() -> anyhow::Result<()> {
        let path = std::env::temp_dir()
            .join(format!("throu-store-{}", uuid::Uuid::new_v4()))
            .join("prefs.json");
        let store = WalletStore::new(Some(PreferencesFile::new(&path)));
        store.set_connection(ChainFamily::Solana, true, Some(solana_address()), Some(WalletKind::Solflare));
        store.remember_wallet(ChainFamily::Solana, WalletKind::Solflare);
        store.set_auto_connect(true);
        drop(store);

        let restored = WalletStore::new(Some(PreferencesFile::new(&path)));
        assert!(!restored.snapshot().any_connected());
        let preferences = restored.preferences();
        assert!(preferences.auto_connect);
        assert_eq!(
            preferences.preferred_wallet.get(&ChainFamily::Solana),
            Some(&WalletKind::Solflare)
        );
        Ok(())
    }

    #[tokio::test]
    async fn test_subscribers_see_changes() {
        let store = WalletStore::in_memory();
        let mut rx = store.subscribe();
        store.set_status(ChainFamily::Evm, WalletStatus::Connecting);
        rx.changed().await.expect("sender alive");
        assert_eq!(rx.borrow().evm.status, WalletStatus::Connecting);
    }
}
