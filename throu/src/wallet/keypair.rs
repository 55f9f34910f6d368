//! Local keypair acting as a Solana wallet, for command line tooling.

use super::{
    ConnectRoute, SolanaWallet, WalletAddress, WalletCapability, WalletConnector, WalletError,
    WalletKind,
};
use crate::chain::ChainFamily;
use async_trait::async_trait;
use services_common::utils::keypair::SaneKeypair;
use solana_sdk::{pubkey::Pubkey, signer::Signer, transaction::Transaction};

#[derive(Clone, Debug)]
pub struct KeypairWallet {
    keypair: SaneKeypair,
}

impl KeypairWallet {
    pub fn new(keypair: SaneKeypair) -> Self {
        Self { keypair }
    }
}

#[async_trait]
impl SolanaWallet for KeypairWallet {
    fn pubkey(&self) -> Pubkey {
        self.keypair.pubkey()
    }

    fn capability(&self) -> WalletCapability {
        WalletCapability {
            wallet_name: "Keypair".into(),
            family: ChainFamily::Solana,
            is_installed: true,
            can_sign_transaction: true,
            can_sign_and_send: false,
            can_batch_sign: true,
            supports_priority_fees: false,
        }
    }

    async fn sign_transaction(&self, mut tx: Transaction) -> Result<Transaction, WalletError> {
        let blockhash = tx.message.recent_blockhash;
        tx.try_sign(&[&*self.keypair], blockhash)
            .map_err(|err| WalletError::new(format!("failed to sign transaction: {err}")))?;
        Ok(tx)
    }
}

/// Connector which always yields the keypair, no prompt involved.
#[async_trait]
impl WalletConnector for KeypairWallet {
    async fn connect(
        &self,
        _wallet: WalletKind,
        route: ConnectRoute,
    ) -> Result<WalletAddress, WalletError> {
        match route {
            ConnectRoute::EvmSdk => Err(WalletError::unsupported("evm connections")),
            ConnectRoute::SolanaDirect | ConnectRoute::SolanaAdapter => {
                Ok(WalletAddress::Solana(self.keypair.pubkey()))
            }
        }
    }

    async fn sign_message(
        &self,
        family: ChainFamily,
        message: &[u8],
    ) -> Result<Vec<u8>, WalletError> {
        match family {
            ChainFamily::Solana => Ok(self.keypair.sign_message(message).as_ref().to_vec()),
            ChainFamily::Evm => Err(WalletError::unsupported("evm message signing")),
        }
    }

    async fn disconnect(&self, _family: ChainFamily) -> Result<(), WalletError> {
        Ok(())
    }
}
