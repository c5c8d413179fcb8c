//! Client-level error type.

use skiff_core::error::AddressError;
use skiff_wallet::WalletError;
use thiserror::Error;

#[derive(Error, Debug)]
pub enum ClientError {
    #[error("configuration: {0}")]
    Config(#[from] config::ConfigError),
    #[error("data directory: {0}")]
    Io(#[from] std::io::Error),
    #[error("invalid recipient address {input:?}: {source}")]
    InvalidAddress { input: String, source: AddressError },
    #[error("no ready peer to broadcast to")]
    NoPeers,
    #[error(transparent)]
    Wallet(#[from] WalletError),
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn messages() {
        assert_eq!(ClientError::NoPeers.to_string(), "no ready peer to broadcast to");
        let e = ClientError::InvalidAddress {
            input: "xyz".into(),
            source: AddressError::InvalidChecksum,
        };
        assert_eq!(e.to_string(), "invalid recipient address \"xyz\": invalid checksum");
    }

    #[test]
    fn wallet_errors_are_transparent() {
        let e: ClientError = WalletError::InsufficientFunds { have: 1, need: 2 }.into();
        assert_eq!(e.to_string(), WalletError::InsufficientFunds { have: 1, need: 2 }.to_string());
    }
}
