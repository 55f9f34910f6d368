//! Shared failure taxonomy. Wallet hosts and RPC nodes report failures as
//! loosely structured codes and messages; everything user facing goes
//! through [`ErrorKind::classify`] first.

use crate::wallet::WalletKind;
use serde::{Deserialize, Serialize};

/// EIP-1193 "user rejected request".
pub const USER_REJECTED_CODE: i64 = 4001;
/// EIP-1193 "unauthorized", returned while the wallet is locked.
pub const UNAUTHORIZED_CODE: i64 = 4100;
/// Wallet does not know the requested chain.
pub const UNRECOGNIZED_CHAIN_CODE: i64 = 4902;
/// JSON-RPC "limit exceeded".
pub const LIMIT_EXCEEDED_CODE: i64 = -32005;

#[derive(
    Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize, derive_more::Display,
)]
pub enum ErrorKind {
    UserRejected,
    NotInstalled,
    Timeout,
    NetworkError,
    InsufficientFunds,
    AccountLocked,
    WrongNetwork,
    RateLimited,
    SimulationFailed,
    OnChainExecutionError,
    Unknown,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "kebab-case")]
pub enum SuggestedAction {
    Retry,
    ChooseDifferentWallet,
    InstallWallet,
    GetHelp,
    Close,
}

const REJECTION_PATTERNS: &[&str] = &[
    "rejected",
    "denied",
    "declined",
    "user cancel",
    "cancelled by user",
    "canceled by user",
    "closed by user",
    "popup closed",
    "dismissed",
];
const TIMEOUT_PATTERNS: &[&str] = &["timeout", "timed out", "expired", "took too long"];

impl ErrorKind {
    pub fn classify(code: Option<i64>, message: &str) -> Self {
        let message = message.to_lowercase();
        let has = |patterns: &[&str]| patterns.iter().any(|p| message.contains(p));

        match code {
            Some(USER_REJECTED_CODE) => return ErrorKind::UserRejected,
            Some(UNAUTHORIZED_CODE) => return ErrorKind::AccountLocked,
            Some(UNRECOGNIZED_CHAIN_CODE) => return ErrorKind::WrongNetwork,
            Some(LIMIT_EXCEEDED_CODE) | Some(429) => return ErrorKind::RateLimited,
            _ => {}
        }

        if has(REJECTION_PATTERNS) {
            ErrorKind::UserRejected
        } else if has(&["not installed", "no provider", "provider not found", "wallet not found"]) {
            ErrorKind::NotInstalled
        } else if has(&["locked", "unauthorized"]) {
            ErrorKind::AccountLocked
        } else if has(&["wrong network", "unrecognized chain", "chain mismatch", "switch chain"]) {
            ErrorKind::WrongNetwork
        } else if has(&["rate limit", "too many requests", "429"]) {
            ErrorKind::RateLimited
        } else if has(&["insufficient funds", "insufficient balance", "insufficient lamports"]) {
            ErrorKind::InsufficientFunds
        } else if has(TIMEOUT_PATTERNS) {
            ErrorKind::Timeout
        } else if has(&["simulation failed", "simulate"]) {
            ErrorKind::SimulationFailed
        } else if has(&["custom program error", "execution reverted", "instruction error"]) {
            ErrorKind::OnChainExecutionError
        } else if has(&["network", "failed to fetch", "connection", "unreachable", "dns"]) {
            ErrorKind::NetworkError
        } else {
            ErrorKind::Unknown
        }
    }

    /// A missing wallet stays missing no matter how often the user retries.
    pub fn is_retryable(&self) -> bool {
        !matches!(self, ErrorKind::NotInstalled)
    }

    pub fn user_message(&self) -> &'static str {
        match self {
            ErrorKind::UserRejected => "The request was rejected in your wallet.",
            ErrorKind::NotInstalled => "This wallet is not installed in your browser.",
            ErrorKind::Timeout => "The wallet did not respond in time.",
            ErrorKind::NetworkError => "Network error. Check your connection and try again.",
            ErrorKind::InsufficientFunds => "Your wallet does not have enough funds.",
            ErrorKind::AccountLocked => "Your wallet is locked. Unlock it and try again.",
            ErrorKind::WrongNetwork => "Your wallet is connected to a different network.",
            ErrorKind::RateLimited => "Too many requests. Wait a moment and try again.",
            ErrorKind::SimulationFailed => "The transaction would fail and was not sent.",
            ErrorKind::OnChainExecutionError => "The transaction failed on chain.",
            ErrorKind::Unknown => "Something went wrong.",
        }
    }

    pub fn suggested_actions(&self) -> &'static [SuggestedAction] {
        use SuggestedAction::*;
        match self {
            ErrorKind::NotInstalled => &[InstallWallet, ChooseDifferentWallet, Close],
            ErrorKind::UserRejected | ErrorKind::Timeout => {
                &[Retry, ChooseDifferentWallet, Close]
            }
            ErrorKind::AccountLocked | ErrorKind::WrongNetwork => {
                &[Retry, ChooseDifferentWallet, GetHelp, Close]
            }
            ErrorKind::NetworkError | ErrorKind::RateLimited | ErrorKind::InsufficientFunds => {
                &[Retry, Close]
            }
            ErrorKind::SimulationFailed | ErrorKind::OnChainExecutionError | ErrorKind::Unknown => {
                &[Retry, GetHelp, Close]
            }
        }
    }
}

/// A classified failure, ready to be stored in session or attempt state.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Failure {
    pub kind: ErrorKind,
    pub message: String,
}

impl Failure {
    pub fn new(kind: ErrorKind, message: impl Into<String>) -> Self {
        Self {
            kind,
            message: message.into(),
        }
    }

    pub fn classify(code: Option<i64>, message: impl Into<String>) -> Self {
        let message = message.into();
        Self {
            kind: ErrorKind::classify(code, &message),
            message,
        }
    }

    pub fn is_retryable(&self) -> bool {
        self.kind.is_retryable()
    }

    pub fn present(&self, wallet: Option<WalletKind>) -> ErrorPresentation {
        ErrorPresentation {
            kind: self.kind,
            message: self.kind.user_message(),
            detail: self.message.clone(),
            actions: self.kind.suggested_actions(),
            install_url: match self.kind {
                ErrorKind::NotInstalled => wallet.and_then(|wallet| wallet.install_url()),
                _ => None,
            },
        }
    }
}

impl std::fmt::Display for Failure {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "{}: {}", self.kind, self.message)
    }
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct ErrorPresentation {
    pub kind: ErrorKind,
    pub message: &'static str,
    pub detail: String,
    pub actions: &'static [SuggestedAction],
    pub install_url: Option<&'static str>,
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_rejection_code() {
        let failure = Failure::classify(Some(4001), "MetaMask Tx Signature: whatever");
        assert_eq!(failure.kind, ErrorKind::UserRejected);
        assert!(failure.is_retryable());
    }

    #[test]
    fn test_message_patterns() {
        let cases = [
            ("User rejected the request.", ErrorKind::UserRejected),
            ("Approval Denied", ErrorKind::UserRejected),
            ("Phantom is not installed", ErrorKind::NotInstalled),
            ("Connection request timed out", ErrorKind::Timeout),
            ("insufficient funds for gas * price + value", ErrorKind::InsufficientFunds),
            ("Wallet is locked", ErrorKind::AccountLocked),
            ("Unrecognized chain ID 0x89", ErrorKind::WrongNetwork),
            ("429 Too Many Requests", ErrorKind::RateLimited),
            ("Transaction simulation failed: Blockhash not found", ErrorKind::SimulationFailed),
            ("custom program error: 0x1771", ErrorKind::OnChainExecutionError),
            ("Failed to fetch", ErrorKind::NetworkError),
            ("something odd", ErrorKind::Unknown),
        ];
        for (message, expected) in cases {
            assert_eq!(ErrorKind::classify(None, message), expected, "{message}");
        }
    }

    #[test]
    fn test_codes_take_priority() {
        assert_eq!(ErrorKind::classify(Some(4100), "x"), ErrorKind::AccountLocked);
        assert_eq!(ErrorKind::classify(Some(4902), "x"), ErrorKind::WrongNetwork);
        assert_eq!(ErrorKind::classify(Some(-32005), "x"), ErrorKind::RateLimited);
    }

    #[test]
    fn test_not_installed_presentation() {
        let failure = Failure::new(ErrorKind::NotInstalled, "missing");
        assert!(!failure.is_retryable());
        let presentation = failure.present(Some(WalletKind::Phantom));
        assert_eq!(presentation.install_url, Some("https://phantom.app/download"));
        assert!(presentation.actions.contains(&SuggestedAction::InstallWallet));
        assert!(!presentation.actions.contains(&SuggestedAction::Retry));

        let timeout = Failure::new(ErrorKind::Timeout, "slow").present(Some(WalletKind::Phantom));
        assert_eq!(timeout.install_url, None);
        assert!(timeout.actions.contains(&SuggestedAction::Retry));
    }
}
