//! Wallet vocabulary shared by detection, connection and signing.
//!
//! The actual wallet host (browser extension, SDK modal, local keypair) lives
//! behind the [`WalletConnector`], [`SolanaWallet`] and [`EvmWallet`] traits.

pub mod detector;
pub mod keypair;
pub mod preferences;
pub mod store;

use crate::{
    chain::ChainFamily,
    error::{Failure, USER_REJECTED_CODE},
};
use alloy_primitives::{Address, Bytes, B256};
use async_trait::async_trait;
use serde::{Deserialize, Serialize};
use solana_sdk::{pubkey::Pubkey, signature::Signature, transaction::Transaction};

#[derive(
    Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize, derive_more::Display,
)]
#[serde(rename_all = "kebab-case")]
pub enum WalletKind {
    #[display("Phantom")]
    Phantom,
    #[display("Solflare")]
    Solflare,
    #[display("Backpack")]
    Backpack,
    #[display("Trust Wallet")]
    Trust,
    #[display("MetaMask")]
    MetaMask,
    #[display("Coinbase Wallet")]
    Coinbase,
    /// Remote wallets paired through the WalletConnect relay.
    #[display("WalletConnect")]
    WalletConnect,
}

impl WalletKind {
    pub const ALL: [WalletKind; 7] = [
        WalletKind::Phantom,
        WalletKind::Solflare,
        WalletKind::Backpack,
        WalletKind::Trust,
        WalletKind::MetaMask,
        WalletKind::Coinbase,
        WalletKind::WalletConnect,
    ];

    pub fn families(&self) -> &'static [ChainFamily] {
        match self {
            WalletKind::Solflare | WalletKind::Backpack => &[ChainFamily::Solana],
            WalletKind::MetaMask => &[ChainFamily::Evm],
            WalletKind::Phantom
            | WalletKind::Trust
            | WalletKind::Coinbase
            | WalletKind::WalletConnect => &[ChainFamily::Evm, ChainFamily::Solana],
        }
    }

    pub fn supports(&self, family: ChainFamily) -> bool {
        self.families().contains(&family)
    }

    pub fn install_url(&self) -> Option<&'static str> {
        match self {
            WalletKind::Phantom => Some("https://phantom.app/download"),
            WalletKind::Solflare => Some("https://solflare.com/download"),
            WalletKind::Backpack => Some("https://backpack.app/download"),
            WalletKind::Trust => Some("https://trustwallet.com/download"),
            WalletKind::MetaMask => Some("https://metamask.io/download"),
            WalletKind::Coinbase => Some("https://www.coinbase.com/wallet/downloads"),
            WalletKind::WalletConnect => None,
        }
    }

    /// Remote wallets are reached through a relay and never injected.
    pub fn requires_injection(&self) -> bool {
        !matches!(self, WalletKind::WalletConnect)
    }

    /// Wallets which add their own compute budget instructions to Solana
    /// transactions before signing.
    pub fn optimizes_priority_fees(&self) -> bool {
        matches!(
            self,
            WalletKind::Phantom | WalletKind::Solflare | WalletKind::Backpack
        )
    }

    /// Wallets whose connect popup tends to get lost behind the page; the
    /// connection flow shows a dismissal hint for them.
    pub fn uses_blocking_popup(&self) -> bool {
        matches!(
            self,
            WalletKind::Solflare | WalletKind::Trust | WalletKind::Coinbase
        )
    }

    /// Matches the free-form names wallet SDKs report for the active wallet.
    pub fn from_sdk_name(name: &str) -> Option<Self> {
        let name = name.to_lowercase();
        let matches = |needle: &str| name.contains(needle);
        if matches("phantom") {
            Some(WalletKind::Phantom)
        } else if matches("solflare") {
            Some(WalletKind::Solflare)
        } else if matches("backpack") {
            Some(WalletKind::Backpack)
        } else if matches("trust") {
            Some(WalletKind::Trust)
        } else if matches("metamask") {
            Some(WalletKind::MetaMask)
        } else if matches("coinbase") {
            Some(WalletKind::Coinbase)
        } else if matches("walletconnect") {
            Some(WalletKind::WalletConnect)
        } else {
            None
        }
    }
}

/// Address on one of the supported chain families.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, derive_more::Display)]
pub enum WalletAddress {
    #[display("{_0}")]
    Evm(Address),
    #[display("{_0}")]
    Solana(Pubkey),
}

impl WalletAddress {
    pub fn family(&self) -> ChainFamily {
        match self {
            WalletAddress::Evm(_) => ChainFamily::Evm,
            WalletAddress::Solana(_) => ChainFamily::Solana,
        }
    }

    /// Parses an address in the encoding native to `family`.
    pub fn parse(family: ChainFamily, raw: &str) -> anyhow::Result<Self> {
        Ok(match family {
            ChainFamily::Evm => WalletAddress::Evm(raw.parse()?),
            ChainFamily::Solana => WalletAddress::Solana(raw.parse()?),
        })
    }
}

/// Failure reported by the wallet host. Codes follow EIP-1193 where the
/// host provides one.
#[derive(thiserror::Error, Debug, Clone, PartialEq, Eq)]
#[error("{message}")]
pub struct WalletError {
    pub code: Option<i64>,
    pub message: String,
}

impl WalletError {
    pub fn new(message: impl Into<String>) -> Self {
        Self {
            code: None,
            message: message.into(),
        }
    }

    pub fn with_code(code: i64, message: impl Into<String>) -> Self {
        Self {
            code: Some(code),
            message: message.into(),
        }
    }

    pub fn rejected() -> Self {
        Self::with_code(USER_REJECTED_CODE, "User rejected the request.")
    }

    pub fn unsupported(method: &str) -> Self {
        Self::new(format!("wallet does not support {method}"))
    }

    pub fn failure(&self) -> Failure {
        Failure::classify(self.code, self.message.clone())
    }
}

/// What a resolved wallet provider can do on one chain family.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct WalletCapability {
    pub wallet_name: String,
    pub family: ChainFamily,
    pub is_installed: bool,
    pub can_sign_transaction: bool,
    pub can_sign_and_send: bool,
    pub can_batch_sign: bool,
    /// Wallet adds its own priority fee instructions, the app must not.
    pub supports_priority_fees: bool,
}

impl WalletCapability {
    pub fn unavailable(wallet_name: impl Into<String>, family: ChainFamily) -> Self {
        Self {
            wallet_name: wallet_name.into(),
            family,
            is_installed: false,
            can_sign_transaction: false,
            can_sign_and_send: false,
            can_batch_sign: false,
            supports_priority_fees: false,
        }
    }
}

/// Path a connection takes through the wallet host.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
#[serde(rename_all = "kebab-case")]
pub enum ConnectRoute {
    /// Multi-chain SDK modal, used for every EVM wallet.
    EvmSdk,
    /// The wallet's own injected Solana provider.
    SolanaDirect,
    /// Wallet-adapter selection. The adapter may report an address before
    /// the user approved anything (silent auto-reconnect).
    SolanaAdapter,
}

/// Wallet host as seen by the connection flow.
#[async_trait]
pub trait WalletConnector: Send + Sync + 'static {
    async fn connect(
        &self,
        wallet: WalletKind,
        route: ConnectRoute,
    ) -> Result<WalletAddress, WalletError>;

    async fn sign_message(
        &self,
        family: ChainFamily,
        message: &[u8],
    ) -> Result<Vec<u8>, WalletError>;

    async fn disconnect(&self, family: ChainFamily) -> Result<(), WalletError>;
}

/// Connected Solana wallet used by the transaction pipeline.
#[async_trait]
pub trait SolanaWallet: Send + Sync {
    fn pubkey(&self) -> Pubkey;

    fn capability(&self) -> WalletCapability;

    async fn sign_transaction(&self, tx: Transaction) -> Result<Transaction, WalletError>;

    async fn sign_and_send_transaction(&self, _tx: Transaction) -> Result<Signature, WalletError> {
        Err(WalletError::unsupported("signAndSendTransaction"))
    }
}

/// Connected EVM wallet. It signs and broadcasts on its own.
#[async_trait]
pub trait EvmWallet: Send + Sync {
    fn address(&self) -> Address;

    async fn send_transaction(&self, to: Address, data: Bytes) -> Result<B256, WalletError>;
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::error::ErrorKind;

    #[test]
    fn test_wallet_families() {
        assert!(WalletKind::Phantom.supports(ChainFamily::Evm));
        assert!(WalletKind::Phantom.supports(ChainFamily::Solana));
        assert!(!WalletKind::MetaMask.supports(ChainFamily::Solana));
        assert!(!WalletKind::Solflare.supports(ChainFamily::Evm));
        for wallet in WalletKind::ALL {
            assert!(!wallet.families().is_empty());
            assert_eq!(wallet.install_url().is_some(), wallet.requires_injection());
        }
    }

    #[test]
    fn test_sdk_names() {
        assert_eq!(WalletKind::from_sdk_name("Phantom"), Some(WalletKind::Phantom));
        assert_eq!(WalletKind::from_sdk_name("Trust Wallet"), Some(WalletKind::Trust));
        assert_eq!(
            WalletKind::from_sdk_name("io.metamask"),
            Some(WalletKind::MetaMask)
        );
        assert_eq!(WalletKind::from_sdk_name("Glow"), None);
    }

    #[test]
    fn test_address_parse() -> anyhow::Result<()> {
        let solana = WalletAddress::parse(
            ChainFamily::Solana,
            "11111111111111111111111111111111",
        )?;
        assert_eq!(solana.family(), ChainFamily::Solana);
        let evm = WalletAddress::parse(
            ChainFamily::Evm,
            "0x0000000000000000000000000000000000000001",
        )?;
        assert_eq!(evm.family(), ChainFamily::Evm);
        assert!(WalletAddress::parse(ChainFamily::Evm, "not an address").is_err());
        Ok(())
    }

    #[test]
    fn test_rejected_error_classifies() {
        assert_eq!(WalletError::rejected().failure().kind, ErrorKind::UserRejected);
        assert_eq!(
            WalletError::new("Request timed out").failure().kind,
            ErrorKind::Timeout
        );
    }
}
