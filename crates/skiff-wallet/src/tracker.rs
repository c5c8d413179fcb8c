//! Relevant output records.
//!
//! The tracker holds one [`OutInfo`] per output that pays a local address,
//! keyed by `(parent txid, output index)`. A record becomes spent when one of
//! our transactions consumes it and goes back to unspent if the network
//! rejects that transaction. Confirmation depths for both sides are refreshed
//! from every delivered block.

use std::collections::HashMap;
use std::sync::Arc;

use skiff_core::address::Address;
use skiff_core::crypto;
use skiff_core::error::TransactionError;
use skiff_core::header_chain::HeaderChain;
use skiff_core::traits::KeyStore;
use skiff_core::types::{Block, Hash256, OutPoint, Transaction};
use skiff_core::validation;
use tracing::{debug, info};

/// The input of one of our transactions that consumed a tracked output.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub struct InputRef {
    pub txid: Hash256,
    pub index: u32,
}

/// A located output: where it is and what it is worth.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct TrackedOutput {
    pub outpoint: OutPoint,
    pub value: u64,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
enum Side {
    Output,
    Input,
}

/// One output owned by a local address, plus the input that spent it.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct OutInfo {
    address: Address,
    parent_txid: Hash256,
    output: Option<TrackedOutput>,
    input: Option<InputRef>,
    output_depth: u64,
    input_depth: u64,
    output_block: Option<Hash256>,
    input_block: Option<Hash256>,
}

impl OutInfo {
    /// A located, unconfirmed, unspent output.
    pub fn new(address: Address, outpoint: OutPoint, value: u64) -> Self {
        Self {
            address,
            parent_txid: outpoint.txid,
            output: Some(TrackedOutput { outpoint, value }),
            input: None,
            output_depth: 0,
            input_depth: 0,
            output_block: None,
            input_block: None,
        }
    }

    /// A record that only knows which transaction pays `address`.
    pub fn placeholder(parent_txid: Hash256, address: Address) -> Self {
        Self {
            address,
            parent_txid,
            output: None,
            input: None,
            output_depth: 0,
            input_depth: 0,
            output_block: None,
            input_block: None,
        }
    }

    pub fn address(&self) -> &Address {
        &self.address
    }

    pub fn parent_txid(&self) -> Hash256 {
        self.parent_txid
    }

    pub fn output(&self) -> Option<&TrackedOutput> {
        self.output.as_ref()
    }

    pub fn outpoint(&self) -> Option<OutPoint> {
        self.output.map(|o| o.outpoint)
    }

    /// Output value, zero while the record is a placeholder.
    pub fn value(&self) -> u64 {
        self.output.map_or(0, |o| o.value)
    }

    pub fn input(&self) -> Option<&InputRef> {
        self.input.as_ref()
    }

    pub fn is_placeholder(&self) -> bool {
        self.output.is_none()
    }

    pub fn is_spent(&self) -> bool {
        self.input.is_some()
    }

    pub fn output_confirmations(&self) -> u64 {
        self.output_depth
    }

    pub fn input_confirmations(&self) -> u64 {
        self.input_depth
    }

    pub fn output_block(&self) -> Option<Hash256> {
        self.output_block
    }

    pub fn input_block(&self) -> Option<Hash256> {
        self.input_block
    }

    /// Unspent, located and at least `threshold` deep.
    pub fn is_spendable(&self, threshold: u64) -> bool {
        !self.is_spent() && !self.is_placeholder() && self.output_depth >= threshold
    }

    fn side_txid(&self, side: Side) -> Option<Hash256> {
        match side {
            Side::Output => self.output.map(|o| o.outpoint.txid),
            Side::Input => self.input.map(|i| i.txid),
        }
    }

    fn block(&self, side: Side) -> Option<Hash256> {
        match side {
            Side::Output => self.output_block,
            Side::Input => self.input_block,
        }
    }

    fn set_position(&mut self, side: Side, depth: u64, block: Option<Hash256>) {
        match side {
            Side::Output => {
                self.output_depth = depth;
                self.output_block = block;
            }
            Side::Input => {
                self.input_depth = depth;
                self.input_block = block;
            }
        }
    }
}

/// The set of relevant outputs.
pub struct OutputTracker {
    keys: Arc<dyn KeyStore>,
    records: Vec<OutInfo>,
}

impl std::fmt::Debug for OutputTracker {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("OutputTracker")
            .field("records", &self.records.len())
            .finish_non_exhaustive()
    }
}

/// Check structure and that every input's signature matches its own key.
///
/// Without the spent outputs this cannot prove ownership, only that the
/// unlocking data is self-consistent.
fn check_well_formed(tx: &Transaction) -> Result<(), TransactionError> {
    validation::validate_transaction_structure(tx)?;
    if tx.is_coinbase() {
        return Ok(());
    }
    for (i, input) in tx.inputs.iter().enumerate() {
        let key: [u8; 32] = input
            .public_key
            .as_slice()
            .try_into()
            .map_err(|_| TransactionError::MalformedUnlock(i))?;
        crypto::verify_transaction_input(tx, i, &crypto::pubkey_hash(&key))
            .map_err(|_| TransactionError::MalformedUnlock(i))?;
    }
    Ok(())
}

impl OutputTracker {
    pub fn new(keys: Arc<dyn KeyStore>) -> Self {
        Self {
            keys,
            records: Vec::new(),
        }
    }

    pub fn keys(&self) -> &Arc<dyn KeyStore> {
        &self.keys
    }

    pub fn records(&self) -> &[OutInfo] {
        &self.records
    }

    pub fn len(&self) -> usize {
        self.records.len()
    }

    pub fn is_empty(&self) -> bool {
        self.records.is_empty()
    }

    fn find(&self, outpoint: &OutPoint) -> Option<usize> {
        self.records
            .iter()
            .position(|r| r.outpoint().as_ref() == Some(outpoint))
    }

    pub fn get(&self, outpoint: &OutPoint) -> Option<&OutInfo> {
        self.find(outpoint).map(|i| &self.records[i])
    }

    /// Track a new record. Returns false if its output is already tracked.
    pub fn insert(&mut self, record: OutInfo) -> bool {
        if let Some(outpoint) = record.outpoint() {
            if self.find(&outpoint).is_some() {
                return false;
            }
        }
        self.records.push(record);
        true
    }

    /// Record a placeholder for `address` paid by `parent_txid`.
    ///
    /// Returns false if that transaction is already tracked for the address.
    pub fn import_placeholder(&mut self, parent_txid: Hash256, address: Address) -> bool {
        if self
            .records
            .iter()
            .any(|r| r.parent_txid == parent_txid && r.address == address)
        {
            return false;
        }
        self.records.push(OutInfo::placeholder(parent_txid, address));
        true
    }

    /// Track every output of `tx` paying a local address.
    ///
    /// Malformed transactions are dropped and outputs already tracked are
    /// skipped. A placeholder for the transaction and address is located by
    /// the first matching output. Returns the records created or located.
    pub fn filter_transaction(&mut self, tx: &Transaction) -> Vec<OutInfo> {
        let txid = match tx.txid() {
            Ok(txid) => txid,
            Err(e) => {
                debug!(error = %e, "dropping unencodable transaction");
                return Vec::new();
            }
        };
        if let Err(e) = check_well_formed(tx) {
            debug!(%txid, error = %e, "dropping malformed transaction");
            return Vec::new();
        }

        let mut created = Vec::new();
        for (index, output) in tx.outputs.iter().enumerate() {
            let Some(address) = self.keys.address_for_pubkey_hash(&output.pubkey_hash) else {
                continue;
            };
            let outpoint = OutPoint {
                txid,
                index: index as u32,
            };
            if self.find(&outpoint).is_some() {
                continue;
            }
            let tracked = TrackedOutput {
                outpoint,
                value: output.value,
            };
            if let Some(placeholder) = self
                .records
                .iter_mut()
                .find(|r| r.is_placeholder() && r.parent_txid == txid && r.address == address)
            {
                placeholder.output = Some(tracked);
                info!(%address, value = output.value, %txid, "located placeholder");
                created.push(placeholder.clone());
                continue;
            }
            let record = OutInfo::new(address, outpoint, output.value);
            info!(%address, value = output.value, %txid, "received funds");
            self.records.push(record.clone());
            created.push(record);
        }
        created
    }

    /// Refresh placeholders and confirmation depths from a verified block.
    pub fn update_confirmations(&mut self, block: &Block, chain: &HeaderChain) {
        let block_hash = block.hash();
        let txs: HashMap<Hash256, &Transaction> = block
            .transactions
            .iter()
            .filter_map(|tx| tx.txid().ok().map(|id| (id, tx)))
            .collect();
        let in_best = chain.is_in_best_chain(&block_hash);
        self.fill_placeholders(&txs);

        for record in &mut self.records {
            if record.is_placeholder() {
                continue;
            }

            for side in [Side::Output, Side::Input] {
                let Some(txid) = record.side_txid(side) else {
                    continue;
                };
                if txs.contains_key(&txid) {
                    if in_best {
                        let depth = chain.depth(&block_hash).unwrap_or(0);
                        record.set_position(side, depth, Some(block_hash));
                    } else {
                        record.set_position(side, 0, None);
                    }
                } else if let Some(known) = record.block(side) {
                    match chain.depth(&known) {
                        Some(depth) if chain.is_in_best_chain(&known) => {
                            record.set_position(side, depth, Some(known));
                        }
                        _ => record.set_position(side, 0, None),
                    }
                }
            }
        }
    }

    /// Locate placeholders whose parent is among `txs`.
    ///
    /// The first untracked output paying the placeholder's address fills it
    /// and every further one gets a record of its own. A placeholder whose
    /// outputs are all tracked already is dropped.
    fn fill_placeholders(&mut self, txs: &HashMap<Hash256, &Transaction>) {
        let mut i = 0;
        while i < self.records.len() {
            let record = &self.records[i];
            let parent = match txs.get(&record.parent_txid) {
                Some(tx) if record.is_placeholder() => *tx,
                _ => {
                    i += 1;
                    continue;
                }
            };
            let (address, txid) = (record.address, record.parent_txid);
            let target = address.pubkey_hash();
            let paying: Vec<TrackedOutput> = parent
                .outputs
                .iter()
                .enumerate()
                .filter(|(_, o)| o.pubkey_hash == target)
                .map(|(index, o)| TrackedOutput {
                    outpoint: OutPoint {
                        txid,
                        index: index as u32,
                    },
                    value: o.value,
                })
                .collect();
            if paying.is_empty() {
                i += 1;
                continue;
            }
            let untracked: Vec<TrackedOutput> = paying
                .into_iter()
                .filter(|o| self.find(&o.outpoint).is_none())
                .collect();

            let Some((first, rest)) = untracked.split_first() else {
                debug!(%address, %txid, "dropping redundant placeholder");
                self.records.remove(i);
                continue;
            };
            self.records[i].output = Some(*first);
            for extra in rest {
                self.records.push(OutInfo::new(address, extra.outpoint, extra.value));
            }
            debug!(%address, %txid, outputs = untracked.len(), "filled placeholder");
            i += 1;
        }
    }

    /// Mark the record for `outpoint` as consumed by `input`.
    pub fn mark_spent(&mut self, outpoint: &OutPoint, input: InputRef) -> bool {
        match self.find(outpoint) {
            Some(i) => {
                let record = &mut self.records[i];
                record.input = Some(input);
                record.input_depth = 0;
                record.input_block = None;
                true
            }
            None => false,
        }
    }

    /// Undo the effects of a rejected transaction.
    ///
    /// Records for outputs it created are dropped and records it spent become
    /// spendable again. Returns the released `(address, value)` pairs.
    pub fn reset_spent_outputs(&mut self, txid: &Hash256) -> Vec<(Address, u64)> {
        let before = self.records.len();
        self.records.retain(|r| r.parent_txid != *txid);
        let removed = before - self.records.len();

        let mut released = Vec::new();
        for record in &mut self.records {
            if record.input.is_some_and(|i| i.txid == *txid) {
                record.input = None;
                record.input_depth = 0;
                record.input_block = None;
                released.push((record.address, record.value()));
            }
        }
        if removed > 0 || !released.is_empty() {
            info!(%txid, removed, released = released.len(), "rolled back rejected transaction");
        }
        released
    }

    /// Spendable value at `threshold` confirmations over all addresses.
    pub fn balance(&self, threshold: u64) -> u64 {
        self.records
            .iter()
            .filter(|r| r.is_spendable(threshold))
            .map(OutInfo::value)
            .sum()
    }

    pub fn balance_for(&self, address: &Address, threshold: u64) -> u64 {
        self.records
            .iter()
            .filter(|r| r.address == *address && r.is_spendable(threshold))
            .map(OutInfo::value)
            .sum()
    }

    /// Every record for `address`, placeholders included.
    pub fn outputs_by_address(&self, address: &Address) -> Vec<OutInfo> {
        self.records
            .iter()
            .filter(|r| r.address == *address)
            .cloned()
            .collect()
    }

    /// Located records at least `n` deep, spent or not, shallowest first.
    pub fn outputs_by_confirmations(&self, n: u64) -> Vec<OutInfo> {
        let mut out: Vec<OutInfo> = self
            .records
            .iter()
            .filter(|r| !r.is_placeholder() && r.output_depth >= n)
            .cloned()
            .collect();
        out.sort_by_key(|r| r.output_depth);
        out
    }
}

#[cfg(test)]
pub(crate) mod tests {
    use super::*;
    use crate::keys::{KeyChain, Seed};
    use skiff_core::constants::{COIN, NetworkType};
    use skiff_core::crypto::KeyPair;
    use skiff_core::genesis::GENESIS_TIMESTAMP;
    use skiff_core::merkle;
    use skiff_core::types::{BlockHeader, TxInput, TxOutput};

    pub(crate) const NOW: u64 = GENESIS_TIMESTAMP + 1_000_000;

    pub(crate) fn keychain() -> Arc<KeyChain> {
        Arc::new(KeyChain::new(Seed::from_bytes([1; 32]), NetworkType::Regtest))
    }

    /// A signed transaction from an outside key paying `outputs`.
    pub(crate) fn payment(outputs: Vec<(Hash256, u64)>, salt: u8) -> Transaction {
        let sender = KeyPair::from_secret_bytes([200; 32]);
        let mut tx = Transaction {
            version: 1,
            inputs: vec![TxInput {
                previous_output: OutPoint {
                    txid: Hash256([salt; 32]),
                    index: 0,
                },
                signature: vec![],
                public_key: vec![],
            }],
            outputs: outputs
                .into_iter()
                .map(|(pubkey_hash, value)| TxOutput { value, pubkey_hash })
                .collect(),
            lock_time: 0,
        };
        crypto::sign_transaction_input(&mut tx, 0, &sender).unwrap();
        tx
    }

    pub(crate) fn coinbase(tag: u8) -> Transaction {
        Transaction {
            version: 1,
            inputs: vec![TxInput {
                previous_output: OutPoint::null(),
                signature: vec![tag],
                public_key: vec![],
            }],
            outputs: vec![TxOutput {
                value: 50 * COIN,
                pubkey_hash: Hash256([tag; 32]),
            }],
            lock_time: 0,
        }
    }

    /// A valid block on `prev` carrying `txs` after a coinbase.
    pub(crate) fn block_with(prev: Hash256, tag: u8, txs: Vec<Transaction>) -> Block {
        let mut transactions = vec![coinbase(tag)];
        transactions.extend(txs);
        let merkle_root = merkle::transactions_root(&transactions).unwrap();
        Block {
            header: BlockHeader {
                version: 1,
                prev_hash: prev,
                merkle_root,
                timestamp: GENESIS_TIMESTAMP + u64::from(tag),
                difficulty_target: u64::MAX,
                nonce: u64::from(tag),
            },
            transactions,
        }
    }

    /// Append `count` empty blocks to `chain`.
    pub(crate) fn extend(chain: &mut HeaderChain, count: u8, salt: u8) {
        for i in 0..count {
            let block = block_with(chain.head(), salt.wrapping_add(i), vec![]);
            chain.add_block(&block, NOW).unwrap();
        }
    }

    pub(crate) fn set_output_depth(tracker: &mut OutputTracker, index: usize, depth: u64) {
        tracker.records[index].output_depth = depth;
    }

    fn setup() -> (OutputTracker, Arc<KeyChain>, Address) {
        let keys = keychain();
        let addr = keys.next_address();
        (OutputTracker::new(keys.clone()), keys, addr)
    }

    // --- Filtering ---

    #[test]
    fn payment_to_local_address_creates_record() {
        let (mut tracker, _, addr) = setup();
        let tx = payment(vec![(addr.pubkey_hash(), 2 * COIN / 100)], 1);
        let created = tracker.filter_transaction(&tx);

        assert_eq!(created.len(), 1);
        let record = &tracker.records()[0];
        assert_eq!(record.address(), &addr);
        assert_eq!(record.value(), 2_000_000);
        assert!(record.input().is_none());
        assert_eq!(record.output_confirmations(), 0);
    }

    #[test]
    fn foreign_payment_ignored() {
        let (mut tracker, _, _) = setup();
        let tx = payment(vec![(Hash256([9; 32]), COIN)], 1);
        assert!(tracker.filter_transaction(&tx).is_empty());
        assert!(tracker.is_empty());
    }

    #[test]
    fn same_transaction_tracked_once() {
        let (mut tracker, _, addr) = setup();
        let tx = payment(vec![(addr.pubkey_hash(), COIN)], 1);
        tracker.filter_transaction(&tx);
        assert!(tracker.filter_transaction(&tx).is_empty());
        assert_eq!(tracker.len(), 1);
    }

    #[test]
    fn two_outputs_to_same_address_two_records() {
        let (mut tracker, _, addr) = setup();
        let tx = payment(vec![(addr.pubkey_hash(), COIN), (addr.pubkey_hash(), 2 * COIN)], 1);
        assert_eq!(tracker.filter_transaction(&tx).len(), 2);
        assert_eq!(tracker.balance(0), 3 * COIN);
    }

    #[test]
    fn forged_signature_dropped() {
        let (mut tracker, _, addr) = setup();
        let mut tx = payment(vec![(addr.pubkey_hash(), COIN)], 1);
        tx.inputs[0].signature[0] ^= 0xFF;
        assert!(tracker.filter_transaction(&tx).is_empty());
    }

    #[test]
    fn unsigned_transaction_dropped() {
        let (mut tracker, _, addr) = setup();
        let mut tx = payment(vec![(addr.pubkey_hash(), COIN)], 1);
        tx.inputs[0].public_key.clear();
        assert!(tracker.filter_transaction(&tx).is_empty());
    }

    // --- Confirmations ---

    #[test]
    fn block_sets_depth_and_later_blocks_deepen_it() {
        let (mut tracker, _, addr) = setup();
        let mut chain = HeaderChain::new(NetworkType::Regtest);
        let tx = payment(vec![(addr.pubkey_hash(), COIN)], 1);
        tracker.filter_transaction(&tx);

        let block = block_with(chain.head(), 1, vec![tx]);
        chain.add_block(&block, NOW).unwrap();
        tracker.update_confirmations(&block, &chain);
        assert_eq!(tracker.records()[0].output_confirmations(), 1);
        assert_eq!(tracker.records()[0].output_block(), Some(block.hash()));

        extend(&mut chain, 2, 50);
        let tip = block_with(chain.head(), 60, vec![]);
        chain.add_block(&tip, NOW).unwrap();
        tracker.update_confirmations(&tip, &chain);
        assert_eq!(tracker.records()[0].output_confirmations(), 4);
    }

    #[test]
    fn side_branch_block_resets_depth() {
        let (mut tracker, _, addr) = setup();
        let mut chain = HeaderChain::new(NetworkType::Regtest);
        let genesis = chain.head();
        let tx = payment(vec![(addr.pubkey_hash(), COIN)], 1);
        tracker.filter_transaction(&tx);

        let main = block_with(genesis, 1, vec![]);
        chain.add_block(&main, NOW).unwrap();
        let side = block_with(genesis, 2, vec![tx]);
        chain.add_block(&side, NOW).unwrap();
        assert!(!chain.is_in_best_chain(&side.hash()));

        tracker.update_confirmations(&side, &chain);
        assert_eq!(tracker.records()[0].output_confirmations(), 0);
        assert_eq!(tracker.records()[0].output_block(), None);
    }

    #[test]
    fn reorged_out_block_drops_depth() {
        let (mut tracker, _, addr) = setup();
        let mut chain = HeaderChain::new(NetworkType::Regtest);
        let genesis = chain.head();
        let tx = payment(vec![(addr.pubkey_hash(), COIN)], 1);
        tracker.filter_transaction(&tx);

        let confirmed = block_with(genesis, 1, vec![tx]);
        chain.add_block(&confirmed, NOW).unwrap();
        tracker.update_confirmations(&confirmed, &chain);
        assert_eq!(tracker.records()[0].output_confirmations(), 1);

        // A heavier competing branch replaces the block.
        let a = block_with(genesis, 10, vec![]);
        let b = block_with(a.hash(), 11, vec![]);
        chain.add_block(&a, NOW).unwrap();
        chain.add_block(&b, NOW).unwrap();
        assert!(!chain.is_in_best_chain(&confirmed.hash()));

        tracker.update_confirmations(&b, &chain);
        assert_eq!(tracker.records()[0].output_confirmations(), 0);
        assert_eq!(tracker.records()[0].output_block(), None);
    }

    #[test]
    fn placeholder_filled_from_block() {
        let (mut tracker, _, addr) = setup();
        let mut chain = HeaderChain::new(NetworkType::Regtest);
        let tx = payment(vec![(Hash256([4; 32]), 5), (addr.pubkey_hash(), COIN)], 1);
        let txid = tx.txid().unwrap();
        assert!(tracker.import_placeholder(txid, addr));
        assert!(!tracker.import_placeholder(txid, addr));
        assert_eq!(tracker.balance(0), 0);

        let block = block_with(chain.head(), 1, vec![tx.clone()]);
        chain.add_block(&block, NOW).unwrap();
        tracker.update_confirmations(&block, &chain);

        let record = &tracker.records()[0];
        assert_eq!(record.outpoint(), Some(OutPoint { txid, index: 1 }));
        assert_eq!(record.output_confirmations(), 1);
        assert_eq!(tracker.balance(1), COIN);
        assert!(tracker.filter_transaction(&tx).is_empty());
    }

    #[test]
    fn placeholder_parent_paying_twice_tracks_both_outputs() {
        let (mut tracker, _, addr) = setup();
        let mut chain = HeaderChain::new(NetworkType::Regtest);
        let tx = payment(vec![(addr.pubkey_hash(), COIN), (addr.pubkey_hash(), 2 * COIN)], 1);
        let txid = tx.txid().unwrap();
        tracker.import_placeholder(txid, addr);

        let block = block_with(chain.head(), 1, vec![tx.clone()]);
        chain.add_block(&block, NOW).unwrap();
        tracker.update_confirmations(&block, &chain);

        assert_eq!(tracker.len(), 2);
        let indexes: Vec<u32> = tracker.records().iter().filter_map(|r| r.outpoint()).map(|o| o.index).collect();
        assert_eq!(indexes, vec![0, 1]);
        assert!(tracker.records().iter().all(|r| r.output_confirmations() == 1));
        assert_eq!(tracker.balance(1), 3 * COIN);
        assert!(tracker.filter_transaction(&tx).is_empty());
    }

    #[test]
    fn relayed_parent_locates_placeholder_and_adds_second_output() {
        let (mut tracker, _, addr) = setup();
        let mut chain = HeaderChain::new(NetworkType::Regtest);
        let tx = payment(vec![(addr.pubkey_hash(), COIN), (addr.pubkey_hash(), 2 * COIN)], 1);
        let txid = tx.txid().unwrap();
        tracker.import_placeholder(txid, addr);

        let created = tracker.filter_transaction(&tx);
        assert_eq!(created.len(), 2);
        assert_eq!(tracker.len(), 2);
        assert!(tracker.records().iter().all(|r| !r.is_placeholder()));

        let block = block_with(chain.head(), 1, vec![tx]);
        chain.add_block(&block, NOW).unwrap();
        tracker.update_confirmations(&block, &chain);
        assert_eq!(tracker.len(), 2);
        assert_eq!(tracker.balance(1), 3 * COIN);
    }

    #[test]
    fn placeholder_for_tracked_outputs_is_dropped() {
        let (mut tracker, _, addr) = setup();
        let mut chain = HeaderChain::new(NetworkType::Regtest);
        let tx = payment(vec![(addr.pubkey_hash(), COIN)], 1);
        let txid = tx.txid().unwrap();
        tracker.records.push(OutInfo::placeholder(txid, addr));
        tracker.insert(OutInfo::new(addr, OutPoint { txid, index: 0 }, COIN));

        let block = block_with(chain.head(), 1, vec![tx]);
        chain.add_block(&block, NOW).unwrap();
        tracker.update_confirmations(&block, &chain);
        assert_eq!(tracker.len(), 1);
        assert!(!tracker.records()[0].is_placeholder());
        assert_eq!(tracker.balance(1), COIN);
    }

    #[test]
    fn spent_side_tracked_separately() {
        let (mut tracker, _, addr) = setup();
        let mut chain = HeaderChain::new(NetworkType::Regtest);
        let tx = payment(vec![(addr.pubkey_hash(), COIN)], 1);
        tracker.filter_transaction(&tx);
        let first = block_with(chain.head(), 1, vec![tx.clone()]);
        chain.add_block(&first, NOW).unwrap();
        tracker.update_confirmations(&first, &chain);

        let outpoint = tracker.records()[0].outpoint().unwrap();
        let spend = payment(vec![(Hash256([8; 32]), COIN / 2)], 2);
        let spend_id = spend.txid().unwrap();
        tracker.mark_spent(&outpoint, InputRef { txid: spend_id, index: 0 });

        let second = block_with(chain.head(), 2, vec![spend]);
        chain.add_block(&second, NOW).unwrap();
        tracker.update_confirmations(&second, &chain);

        let record = &tracker.records()[0];
        assert_eq!(record.output_confirmations(), 2);
        assert_eq!(record.input_confirmations(), 1);
        assert_eq!(record.input_block(), Some(second.hash()));
    }

    // --- Balance and queries ---

    #[test]
    fn balance_respects_threshold_and_spent_state() {
        let (mut tracker, keys, addr) = setup();
        let other = keys.next_address();
        tracker.insert(OutInfo::new(addr, OutPoint { txid: Hash256([1; 32]), index: 0 }, 100));
        tracker.insert(OutInfo::new(other, OutPoint { txid: Hash256([2; 32]), index: 0 }, 50));
        tracker.records[0].output_depth = 3;

        assert_eq!(tracker.balance(0), 150);
        assert_eq!(tracker.balance(1), 100);
        assert_eq!(tracker.balance_for(&other, 0), 50);

        tracker.mark_spent(
            &OutPoint { txid: Hash256([1; 32]), index: 0 },
            InputRef { txid: Hash256([3; 32]), index: 0 },
        );
        assert_eq!(tracker.balance(0), 50);
    }

    #[test]
    fn insert_rejects_duplicate_outpoint() {
        let (mut tracker, _, addr) = setup();
        let op = OutPoint { txid: Hash256([1; 32]), index: 0 };
        assert!(tracker.insert(OutInfo::new(addr, op, 1)));
        assert!(!tracker.insert(OutInfo::new(addr, op, 1)));
    }

    #[test]
    fn outputs_by_confirmations_sorted_ascending() {
        let (mut tracker, _, addr) = setup();
        for (i, depth) in [5u64, 1, 3].into_iter().enumerate() {
            tracker.insert(OutInfo::new(addr, OutPoint { txid: Hash256([i as u8; 32]), index: 0 }, 10));
            tracker.records[i].output_depth = depth;
        }
        tracker.import_placeholder(Hash256([9; 32]), addr);

        let depths: Vec<u64> = tracker
            .outputs_by_confirmations(2)
            .iter()
            .map(OutInfo::output_confirmations)
            .collect();
        assert_eq!(depths, vec![3, 5]);
        assert_eq!(tracker.outputs_by_address(&addr).len(), 4);
    }

    // --- Rejection rollback ---

    #[test]
    fn rejection_removes_created_and_releases_spent() {
        let (mut tracker, keys, addr) = setup();
        let funding = OutPoint { txid: Hash256([1; 32]), index: 0 };
        tracker.insert(OutInfo::new(addr, funding, 700));

        let rejected = Hash256([7; 32]);
        let change = keys.next_address();
        tracker.mark_spent(&funding, InputRef { txid: rejected, index: 0 });
        tracker.insert(OutInfo::new(change, OutPoint { txid: rejected, index: 1 }, 300));
        assert_eq!(tracker.balance(0), 300);

        let released = tracker.reset_spent_outputs(&rejected);
        assert_eq!(released, vec![(addr, 700)]);
        assert_eq!(tracker.len(), 1);
        assert!(!tracker.records()[0].is_spent());
        assert_eq!(tracker.balance(0), 700);
    }

    #[test]
    fn rejection_of_unknown_tx_is_noop() {
        let (mut tracker, _, addr) = setup();
        tracker.insert(OutInfo::new(addr, OutPoint { txid: Hash256([1; 32]), index: 0 }, 1));
        assert!(tracker.reset_spent_outputs(&Hash256([2; 32])).is_empty());
        assert_eq!(tracker.len(), 1);
    }
}
