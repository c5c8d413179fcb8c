//! Largest-first coin selection.
//!
//! Candidates are consumed in descending value order until their sum covers
//! the target. Ties keep the caller's order, so the same candidate list
//! always yields the same selection.

use skiff_core::address::Address;
use skiff_core::types::OutPoint;

use crate::error::WalletError;
use crate::tracker::OutInfo;

/// A spendable output offered to the selector.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Candidate {
    pub outpoint: OutPoint,
    pub address: Address,
    pub value: u64,
    /// Output confirmations, used for the priority estimate.
    pub confirmations: u64,
}

impl Candidate {
    /// Build from a located record. Returns None for placeholders.
    pub fn from_record(record: &OutInfo) -> Option<Self> {
        let output = record.output()?;
        Some(Self {
            outpoint: output.outpoint,
            address: *record.address(),
            value: output.value,
            confirmations: record.output_confirmations(),
        })
    }
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Selection {
    pub selected: Vec<Candidate>,
    /// Sum of the selected values.
    pub total: u64,
}

/// Pick the largest candidates until their sum reaches `target`.
pub fn select_largest_first(candidates: &[Candidate], target: u64) -> Result<Selection, WalletError> {
    let mut sorted: Vec<&Candidate> = candidates.iter().collect();
    sorted.sort_by(|a, b| b.value.cmp(&a.value));

    let mut selected = Vec::new();
    let mut total: u64 = 0;
    for candidate in sorted {
        if total >= target && !selected.is_empty() {
            break;
        }
        total = total.saturating_add(candidate.value);
        selected.push(candidate.clone());
    }

    if total < target || selected.is_empty() {
        return Err(WalletError::InsufficientFunds {
            have: total,
            need: target,
        });
    }
    Ok(Selection { selected, total })
}
