//! Transaction construction: coin selection, signing and fee re-estimation.
//!
//! [`TransactionBuilder::build`] produces a signed transaction without
//! touching the tracker. [`TransactionBuilder::commit`] then marks the
//! selected outputs spent and starts tracking any output paying us.
//!
//! Each build attempt assumes a fee. If the finished transaction needs more
//! under the fee policy, the attempt is discarded and rebuilt with the higher
//! fee, up to `max_fee_attempts` times.

use skiff_core::address::Address;
use skiff_core::constants::{DUST_THRESHOLD, MIN_NONDUST_OUTPUT};
use skiff_core::crypto;
use skiff_core::traits::KeyStore;
use skiff_core::types::{Hash256, OutPoint, Transaction, TxInput, TxOutput};
use skiff_core::validation;
use tracing::{debug, info};

use crate::coin_selection::{self, Candidate};
use crate::config::WalletConfig;
use crate::error::WalletError;
use crate::fee;
use crate::tracker::{InputRef, OutInfo, OutputTracker};

/// A signed transaction ready to be committed and broadcast.
#[derive(Debug, Clone)]
pub struct BuiltTransaction {
    pub tx: Transaction,
    pub txid: Hash256,
    /// Fee actually paid: inputs minus outputs.
    pub fee: u64,
    /// Outputs consumed, in input order.
    pub spent: Vec<OutPoint>,
    /// Recipient output, when it pays one of our addresses.
    pub local_payee: Option<Address>,
    /// Change address and value, if change was worth an output.
    pub change: Option<(Address, u64)>,
    /// Build rounds needed for the fee to settle.
    pub attempts: usize,
}

/// Builds single-recipient payments from tracked outputs.
pub struct TransactionBuilder<'a> {
    keys: &'a dyn KeyStore,
    min_fee: u64,
    max_attempts: usize,
}

impl<'a> TransactionBuilder<'a> {
    pub fn new(keys: &'a dyn KeyStore, config: &WalletConfig) -> Self {
        Self {
            keys,
            min_fee: config.min_fee,
            max_attempts: config.max_fee_attempts.max(1),
        }
    }

    /// Build, sign and commit a payment of `amount` to `recipient`.
    ///
    /// `fee` is the initial fee assumption. Only outputs with at least
    /// `threshold` confirmations are spent.
    pub fn create_transaction(
        &self,
        tracker: &mut OutputTracker,
        recipient: &Address,
        amount: u64,
        fee: u64,
        threshold: u64,
    ) -> Result<Transaction, WalletError> {
        let built = self.build(tracker, recipient, amount, fee, threshold)?;
        self.commit(tracker, &built);
        Ok(built.tx)
    }

    /// Build and sign without changing the tracker.
    pub fn build(
        &self,
        tracker: &OutputTracker,
        recipient: &Address,
        amount: u64,
        fee: u64,
        threshold: u64,
    ) -> Result<BuiltTransaction, WalletError> {
        if amount < MIN_NONDUST_OUTPUT {
            return Err(WalletError::AmountBelowDust {
                amount,
                min: MIN_NONDUST_OUTPUT,
            });
        }

        let candidates: Vec<Candidate> = tracker
            .records()
            .iter()
            .filter(|r| r.is_spendable(threshold))
            .filter_map(Candidate::from_record)
            .collect();

        let mut fee = fee;
        for attempt in 1..=self.max_attempts {
            let mut built = self.attempt(&candidates, recipient, amount, fee)?;
            built.attempts = attempt;

            let inputs: Vec<(u64, u64)> = built
                .spent
                .iter()
                .filter_map(|op| candidates.iter().find(|c| c.outpoint == *op))
                .map(|c| (c.value, c.confirmations))
                .collect();
            let required = fee::minimum_fee(&built.tx, &inputs, self.min_fee)?;
            if required <= fee {
                debug!(txid = %built.txid, fee = built.fee, attempt, "transaction built");
                return Ok(built);
            }

            debug!(assumed = fee, required, attempt, "fee too low, rebuilding");
            self.discard(&built);
            fee = required;
        }

        Err(WalletError::FeeNotConverged {
            attempts: self.max_attempts,
        })
    }

    /// One build round at a fixed fee.
    fn attempt(
        &self,
        candidates: &[Candidate],
        recipient: &Address,
        amount: u64,
        fee: u64,
    ) -> Result<BuiltTransaction, WalletError> {
        let need = amount.saturating_add(fee);
        let selection = coin_selection::select_largest_first(candidates, need)?;

        let mut outputs = vec![TxOutput {
            value: amount,
            pubkey_hash: recipient.pubkey_hash(),
        }];
        let local_payee = self.keys.is_local(recipient).then_some(*recipient);

        let change_value = selection.total - need;
        let change = if change_value > DUST_THRESHOLD {
            let address = self
                .keys
                .create_addresses(1)
                .into_iter()
                .next()
                .ok_or_else(|| WalletError::KeyNotFound("no change address available".into()))?;
            outputs.push(TxOutput {
                value: change_value,
                pubkey_hash: address.pubkey_hash(),
            });
            Some((address, change_value))
        } else {
            None
        };

        let mut tx = Transaction {
            version: 1,
            inputs: selection
                .selected
                .iter()
                .map(|c| TxInput {
                    previous_output: c.outpoint,
                    signature: vec![],
                    public_key: vec![],
                })
                .collect(),
            outputs,
            lock_time: 0,
        };

        let signed = self.sign(&mut tx, &selection.selected).and_then(|()| {
            validation::validate_transaction_structure(&tx)?;
            Ok(tx.txid()?)
        });
        let txid = match signed {
            Ok(txid) => txid,
            Err(e) => {
                if let Some((address, _)) = &change {
                    self.keys.remove_address(address);
                }
                return Err(e);
            }
        };

        let paid_out = amount + change.map_or(0, |(_, v)| v);
        Ok(BuiltTransaction {
            tx,
            txid,
            fee: selection.total - paid_out,
            spent: selection.selected.iter().map(|c| c.outpoint).collect(),
            local_payee,
            change,
            attempts: 1,
        })
    }

    fn sign(&self, tx: &mut Transaction, selected: &[Candidate]) -> Result<(), WalletError> {
        for (i, candidate) in selected.iter().enumerate() {
            let key = self
                .keys
                .signing_key_for(&candidate.address)
                .ok_or_else(|| WalletError::KeyNotFound(candidate.address.to_string()))?;
            crypto::sign_transaction_input(tx, i, &key)?;
        }
        for (i, candidate) in selected.iter().enumerate() {
            crypto::verify_transaction_input(tx, i, &candidate.address.pubkey_hash())
                .map_err(|_| WalletError::ScriptMismatch(i))?;
        }
        Ok(())
    }

    /// Release what a discarded attempt reserved.
    fn discard(&self, built: &BuiltTransaction) {
        if let Some((address, _)) = &built.change {
            self.keys.remove_address(address);
        }
    }

    /// Mark inputs spent and track outputs paying us.
    pub fn commit(&self, tracker: &mut OutputTracker, built: &BuiltTransaction) {
        for (index, outpoint) in built.spent.iter().enumerate() {
            tracker.mark_spent(
                outpoint,
                InputRef {
                    txid: built.txid,
                    index: index as u32,
                },
            );
        }
        for (index, output) in built.tx.outputs.iter().enumerate() {
            let address = match (&built.local_payee, &built.change) {
                (Some(payee), _) if index == 0 => *payee,
                (_, Some((change, _))) if index == 1 => *change,
                _ => continue,
            };
            let outpoint = OutPoint {
                txid: built.txid,
                index: index as u32,
            };
            tracker.insert(OutInfo::new(address, outpoint, output.value));
        }
        info!(txid = %built.txid, inputs = built.spent.len(), fee = built.fee, "transaction committed");
    }
}
