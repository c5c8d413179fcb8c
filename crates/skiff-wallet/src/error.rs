//! Wallet error types.

use skiff_core::error::{CryptoError, TransactionError};
use thiserror::Error;

/// Errors reported to the caller of a wallet operation.
#[derive(Error, Debug, Clone, PartialEq, Eq)]
pub enum WalletError {
    /// The send amount is below what the network relays.
    #[error("amount below dust threshold: {amount} < {min}")]
    AmountBelowDust { amount: u64, min: u64 },

    /// Spendable outputs cannot cover the amount plus fee.
    #[error("insufficient funds: have {have}, need {need}")]
    InsufficientFunds {
        /// Spendable value at the requested confirmation threshold.
        have: u64,
        /// Amount plus fee.
        need: u64,
    },

    #[error("invalid address: {0}")]
    InvalidAddress(String),

    /// No signing key for an address we tried to spend from.
    #[error("key not found: {0}")]
    KeyNotFound(String),

    /// A produced signature does not satisfy the output it spends.
    #[error("unlocking data does not satisfy input {0}")]
    ScriptMismatch(usize),

    /// Fee re-estimation kept raising the fee.
    #[error("fee did not converge after {attempts} attempts")]
    FeeNotConverged { attempts: usize },

    #[error(transparent)]
    Crypto(#[from] CryptoError),

    #[error(transparent)]
    Transaction(#[from] TransactionError),
}
