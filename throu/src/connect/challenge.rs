use crate::{wallet::WalletAddress, TZ};
use chrono::DateTime;

#[derive(thiserror::Error, Debug, Clone, PartialEq, Eq)]
pub enum VerifyError {
    #[error("malformed signature: {0}")]
    Malformed(String),
    #[error("signature was not produced by {0}")]
    WrongSigner(WalletAddress),
}

/// Message a freshly connected wallet signs to prove it controls the address.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Challenge {
    address: WalletAddress,
    message: String,
}

impl Challenge {
    pub fn new(address: WalletAddress, issued_at: DateTime<TZ>) -> Self {
        let message = format!(
            "Welcome to Throu!\n\n\
             Sign this message to verify you own this wallet.\n\n\
             Wallet: {address}\n\
             Issued at: {issued}\n\n\
             This request will not trigger a blockchain transaction or cost any fees.",
            issued = issued_at.to_rfc3339_opts(chrono::SecondsFormat::Millis, true),
        );
        Self { address, message }
    }

    pub fn message(&self) -> &str {
        &self.message
    }

    pub fn verify(&self, signature: &[u8]) -> Result<(), VerifyError> {
        let valid = match self.address {
            WalletAddress::Solana(pubkey) => {
                let signature = solana_sdk::signature::Signature::try_from(signature)
                    .map_err(|err| VerifyError::Malformed(err.to_string()))?;
                signature.verify(pubkey.as_ref(), self.message.as_bytes())
            }
            // personal_sign: EIP-191 prefixed, 65 byte r || s || v
            WalletAddress::Evm(address) => {
                let signature = alloy_primitives::Signature::try_from(signature)
                    .map_err(|err| VerifyError::Malformed(err.to_string()))?;
                signature
                    .recover_address_from_msg(self.message.as_bytes())
                    .map_err(|err| VerifyError::Malformed(err.to_string()))?
                    == address
            }
        };
        if valid {
            Ok(())
        } else {
            Err(VerifyError::WrongSigner(self.address))
        }
    }
}
