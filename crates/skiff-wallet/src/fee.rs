//! Fixed fee policy.
//!
//! A transaction pays a fee when any output is below 0.01 coin, when it is
//! larger than 1000 bytes, or when its priority does not exceed
//! [`PRIORITY_THRESHOLD`]. The fee is the minimum fee for every started
//! 1000 bytes.

use skiff_core::constants::{FEE_FREE_OUTPUT_MIN, FREE_TX_MAX_SIZE, PRIORITY_THRESHOLD};
use skiff_core::error::TransactionError;
use skiff_core::types::Transaction;

/// Σ value × confirmations of the inputs, per byte of transaction.
pub fn priority(inputs: &[(u64, u64)], size: usize) -> u128 {
    if size == 0 {
        return 0;
    }
    let weight: u128 = inputs
        .iter()
        .map(|(value, confirmations)| u128::from(*value) * u128::from(*confirmations))
        .sum();
    weight / size as u128
}

/// Whether `tx`, spending `inputs` as (value, confirmations), must pay a fee.
pub fn fee_required(tx: &Transaction, inputs: &[(u64, u64)]) -> Result<bool, TransactionError> {
    if tx.outputs.iter().any(|o| o.value < FEE_FREE_OUTPUT_MIN) {
        return Ok(true);
    }
    let size = tx.serialized_size()?;
    if size > FREE_TX_MAX_SIZE {
        return Ok(true);
    }
    Ok(priority(inputs, size) <= u128::from(PRIORITY_THRESHOLD))
}

/// `min_fee` for every started 1000 bytes.
pub fn required_fee(size: usize, min_fee: u64) -> u64 {
    let units = size.div_ceil(1_000) as u64;
    units.saturating_mul(min_fee)
}

/// The fee policy's minimum for `tx`: zero when no fee is required.
pub fn minimum_fee(tx: &Transaction, inputs: &[(u64, u64)], min_fee: u64) -> Result<u64, TransactionError> {
    if !fee_required(tx, inputs)? {
        return Ok(0);
    }
    Ok(required_fee(tx.serialized_size()?, min_fee))
}
