//! Error types for the Skiff protocol layer.
use thiserror::Error;

#[derive(Error, Debug, Clone, PartialEq, Eq)]
pub enum TransactionError {
    #[error("empty inputs or outputs")] EmptyInputsOrOutputs,
    #[error("zero-value output at index {0}")] ZeroValueOutput(usize),
    #[error("value overflow")] ValueOverflow,
    #[error("oversized: {size} > {max}")] OversizedTransaction { size: usize, max: usize },
    #[error("duplicate input: {0}")] DuplicateInput(String),
    #[error("null outpoint in non-coinbase input {0}")] NullOutpointInRegularTx(usize),
    #[error("malformed unlocking data on input {0}")] MalformedUnlock(usize),
    #[error("invalid coinbase: {0}")] InvalidCoinbase(String),
    #[error("serialization: {0}")] Serialization(String),
}

#[derive(Error, Debug, Clone, PartialEq, Eq)]
pub enum BlockError {
    #[error("invalid PoW")] InvalidPoW,
    #[error("timestamp too far in the future: {0}")] TimestampTooFar(u64),
    #[error("invalid merkle root")] InvalidMerkleRoot,
    #[error("no coinbase")] NoCoinbase,
    #[error("first transaction is not coinbase")] FirstTxNotCoinbase,
    #[error("multiple coinbase transactions")] MultipleCoinbase,
    #[error("tx error in {index}: {source}")] TransactionError { index: usize, source: TransactionError },
}

#[derive(Error, Debug, Clone, PartialEq, Eq)]
pub enum CryptoError {
    #[error("invalid public key bytes")] InvalidPublicKey,
    #[error("invalid signature bytes")] InvalidSignature,
    #[error("signature verification failed")] VerificationFailed,
    #[error("pubkey hash does not match expected")] PubkeyHashMismatch,
    #[error("input index out of bounds: {index} >= {len}")] InputIndexOutOfBounds { index: usize, len: usize },
}

#[derive(Error, Debug, Clone, PartialEq, Eq)]
pub enum AddressError {
    #[error("invalid base58: {0}")] InvalidBase58(String),
    #[error("invalid length: {0}")] InvalidLength(usize),
    #[error("invalid checksum")] InvalidChecksum,
    #[error("unknown version byte: {0}")] UnknownVersion(u8),
    #[error("address belongs to another network")] WrongNetwork,
}

/// Header-chain consistency and append failures.
#[derive(Error, Debug, Clone, PartialEq, Eq)]
pub enum ChainError {
    #[error("locator ancestor missing from index: {0}")] MissingAncestor(String),
    #[error("reorg split point not in index: {0}")] ReorgSplitPointUnknown(String),
    #[error("reorg orphan not in index: {0}")] ReorgOrphanUnknown(String),
    #[error("reorg removed {removed} entries, expected {expected}")] ReorgCountMismatch { removed: usize, expected: usize },
    #[error("header parent unknown: {0}")] OrphanHeader(String),
    #[error("header batch does not connect to the known chain")] NotConnected,
    #[error("invalid header: {0}")] InvalidHeader(BlockError),
    #[error("invalid block: {0}")] InvalidBlock(BlockError),
}

#[derive(Error, Debug, Clone, PartialEq, Eq)]
pub enum NetworkError {
    #[error("peer disconnected: {0}")] PeerDisconnected(String),
    #[error("message too large: {size}")] MessageTooLarge { size: usize },
    #[error("{what} exceeds limit: {size} > {max}")] LimitExceeded { what: &'static str, size: usize, max: usize },
    #[error("invalid magic")] InvalidMagic,
    #[error("invalid payload checksum")] InvalidChecksum,
    #[error("codec: {0}")] Codec(String),
    #[error("connect failed: {0}")] ConnectFailed(String),
    #[error("timeout")] Timeout,
}

#[derive(Error, Debug)]
pub enum SkiffError {
    #[error(transparent)] Transaction(#[from] TransactionError),
    #[error(transparent)] Block(#[from] BlockError),
    #[error(transparent)] Crypto(#[from] CryptoError),
    #[error(transparent)] Address(#[from] AddressError),
    #[error(transparent)] Chain(#[from] ChainError),
    #[error(transparent)] Network(#[from] NetworkError),
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn chain_error_messages() {
        let e = ChainError::ReorgCountMismatch { removed: 2, expected: 3 };
        assert_eq!(e.to_string(), "reorg removed 2 entries, expected 3");
        let e = ChainError::InvalidBlock(BlockError::InvalidMerkleRoot);
        assert_eq!(e.to_string(), "invalid block: invalid merkle root");
    }

    #[test]
    fn skiff_error_is_transparent() {
        let e: SkiffError = NetworkError::Timeout.into();
        assert_eq!(e.to_string(), "timeout");
        let e: SkiffError = AddressError::InvalidChecksum.into();
        assert!(matches!(e, SkiffError::Address(AddressError::InvalidChecksum)));
    }
}
