//! Context-free verification of transactions, headers and blocks.
//!
//! A light client holds no UTXO set, so everything here is structural:
//! well-formedness, proof-of-work against the header's own target, timestamp
//! drift and the merkle commitment.

use std::collections::HashSet;

use crate::constants::{MAX_FUTURE_BLOCK_TIME, MAX_TX_SIZE};
use crate::error::{BlockError, TransactionError};
use crate::merkle;
use crate::types::{Block, BlockHeader, Transaction};

/// Check that a transaction is well formed.
///
/// Applies to every transaction:
/// - non-empty inputs and outputs
/// - no zero-value outputs and no overflow of the output sum
/// - encoded size within [`MAX_TX_SIZE`]
///
/// Non-coinbase transactions additionally need distinct, non-null outpoints
/// and a 64-byte signature plus 32-byte public key on every input.
pub fn validate_transaction_structure(tx: &Transaction) -> Result<(), TransactionError> {
    if tx.inputs.is_empty() || tx.outputs.is_empty() {
        return Err(TransactionError::EmptyInputsOrOutputs);
    }

    if let Some(i) = tx.outputs.iter().position(|out| out.value == 0) {
        return Err(TransactionError::ZeroValueOutput(i));
    }

    if tx.total_output_value().is_none() {
        return Err(TransactionError::ValueOverflow);
    }

    let size = tx.serialized_size()?;
    if size > MAX_TX_SIZE {
        return Err(TransactionError::OversizedTransaction {
            size,
            max: MAX_TX_SIZE,
        });
    }

    if tx.is_coinbase() {
        return Ok(());
    }

    let mut seen = HashSet::with_capacity(tx.inputs.len());
    for (i, input) in tx.inputs.iter().enumerate() {
        if input.previous_output.is_null() {
            return Err(TransactionError::NullOutpointInRegularTx(i));
        }
        if !seen.insert(input.previous_output) {
            return Err(TransactionError::DuplicateInput(
                input.previous_output.to_string(),
            ));
        }
        if input.signature.len() != 64 || input.public_key.len() != 32 {
            return Err(TransactionError::MalformedUnlock(i));
        }
    }

    Ok(())
}

/// Whether the header hash satisfies its own difficulty target.
///
/// The first 8 bytes of the hash, read little-endian, must not exceed
/// `difficulty_target`. `u64::MAX` accepts every hash.
pub fn check_pow(header: &BlockHeader) -> bool {
    let hash = header.hash();
    let mut prefix = [0u8; 8];
    prefix.copy_from_slice(&hash.as_bytes()[..8]);
    u64::from_le_bytes(prefix) <= header.difficulty_target
}

/// Proof-of-work and timestamp drift. `now` is Unix seconds.
pub fn verify_header(header: &BlockHeader, now: u64) -> Result<(), BlockError> {
    if !check_pow(header) {
        return Err(BlockError::InvalidPoW);
    }
    if header.timestamp > now.saturating_add(MAX_FUTURE_BLOCK_TIME) {
        return Err(BlockError::TimestampTooFar(header.timestamp));
    }
    Ok(())
}

/// Full structural verification of a delivered block.
pub fn verify_block(block: &Block, now: u64) -> Result<(), BlockError> {
    let coinbase = block.transactions.first().ok_or(BlockError::NoCoinbase)?;
    if !coinbase.is_coinbase() {
        return Err(BlockError::FirstTxNotCoinbase);
    }
    if block.transactions.iter().skip(1).any(Transaction::is_coinbase) {
        return Err(BlockError::MultipleCoinbase);
    }

    for (index, tx) in block.transactions.iter().enumerate() {
        validate_transaction_structure(tx)
            .map_err(|source| BlockError::TransactionError { index, source })?;
    }

    let root = merkle::transactions_root(&block.transactions)
        .map_err(|source| BlockError::TransactionError { index: 0, source })?;
    if root != block.header.merkle_root {
        return Err(BlockError::InvalidMerkleRoot);
    }

    verify_header(&block.header, now)
}
