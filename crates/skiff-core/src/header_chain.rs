//! Best-header index, side branches, reorganization and locators.
//!
//! [`HeaderChain`] keeps exactly one authoritative map of the best chain
//! (hash → [`HeaderRecord`]) from the network's genesis to the current head.
//! A height lookup window over the most recent [`RECENT_WINDOW`] heights is
//! derived from that map and rebuilt whenever the best chain is rewritten.
//!
//! Headers that do not extend the head are parked as side-branch records.
//! Once a side branch carries more cumulative work than the best chain, the
//! chain switches to it through [`HeaderChain::reorganize`].
//!
//! The chain does not own the block request ledger. Mutating operations
//! return a [`ChainUpdate`] listing the hashes whose block contents must be
//! fetched again, and the caller queues them under its own lock.

use std::collections::{HashMap, VecDeque};

use tracing::{debug, error, info, warn};

use crate::constants::{NetworkType, RECENT_WINDOW};
use crate::error::ChainError;
use crate::genesis;
use crate::types::{Block, BlockHeader, Hash256};
use crate::validation;

/// Side-branch records further than this below the head are discarded.
const SIDE_BRANCH_DEPTH: u64 = RECENT_WINDOW as u64;

/// Number of single steps before the locator starts doubling.
const LOCATOR_DENSE_STEPS: usize = 10;

/// One header together with its position in the chain.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct HeaderRecord {
    pub hash: Hash256,
    pub prev_hash: Hash256,
    pub height: u64,
    /// Sum of [`BlockHeader::work`] from genesis up to and including this header.
    pub chain_work: u128,
    pub header: BlockHeader,
}

/// Outcome of an append.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct ChainUpdate {
    /// Hashes that joined the best chain, in ascending height.
    pub extended: Vec<Hash256>,
    /// True if the best chain switched branches.
    pub reorganized: bool,
    /// Block hashes whose contents should be fetched again.
    pub refetch: Vec<Hash256>,
}

impl ChainUpdate {
    pub fn is_empty(&self) -> bool {
        self.extended.is_empty() && !self.reorganized && self.refetch.is_empty()
    }

    fn merge(&mut self, other: ChainUpdate) {
        self.extended.extend(other.extended);
        self.reorganized |= other.reorganized;
        self.refetch.extend(other.refetch);
    }
}

/// The locally known best header chain.
#[derive(Debug)]
pub struct HeaderChain {
    genesis_hash: Hash256,
    /// Best chain only: every record's parent is also present, down to genesis.
    index: HashMap<Hash256, HeaderRecord>,
    /// Best-chain hashes for heights `recent_base..=best_height`.
    recent: VecDeque<Hash256>,
    recent_base: u64,
    /// Known headers that are not on the best chain.
    side: HashMap<Hash256, HeaderRecord>,
    head: Hash256,
    synced: bool,
    headers_pending: bool,
}

impl HeaderChain {
    /// A chain holding only `network`'s genesis header.
    pub fn new(network: NetworkType) -> Self {
        let header = genesis::genesis_block(network).header.clone();
        let hash = header.hash();
        let record = HeaderRecord {
            hash,
            prev_hash: header.prev_hash,
            height: 0,
            chain_work: header.work(),
            header,
        };

        let mut index = HashMap::new();
        index.insert(hash, record);

        Self {
            genesis_hash: hash,
            index,
            recent: VecDeque::from([hash]),
            recent_base: 0,
            side: HashMap::new(),
            head: hash,
            synced: false,
            headers_pending: false,
        }
    }

    // --- Queries ---

    pub fn head(&self) -> Hash256 {
        self.head
    }

    pub fn genesis_hash(&self) -> Hash256 {
        self.genesis_hash
    }

    pub fn best_height(&self) -> u64 {
        self.head_record().map_or(0, |r| r.height)
    }

    fn head_record(&self) -> Option<&HeaderRecord> {
        self.index.get(&self.head)
    }

    fn head_work(&self) -> u128 {
        self.head_record().map_or(0, |r| r.chain_work)
    }

    /// Whether `hash` is known at all, on the best chain or a side branch.
    pub fn contains(&self, hash: &Hash256) -> bool {
        self.index.contains_key(hash) || self.side.contains_key(hash)
    }

    pub fn is_in_best_chain(&self, hash: &Hash256) -> bool {
        self.index.contains_key(hash)
    }

    /// Best-chain record for `hash`.
    pub fn get(&self, hash: &Hash256) -> Option<&HeaderRecord> {
        self.index.get(hash)
    }

    /// Best-chain hash at `height`, if the height lies in the recent window.
    pub fn hash_at_height(&self, height: u64) -> Option<Hash256> {
        let offset = height.checked_sub(self.recent_base)?;
        self.recent.get(usize::try_from(offset).ok()?).copied()
    }

    /// Confirmation depth: `best_height - height + 1` on the best chain, else `None`.
    pub fn depth(&self, hash: &Hash256) -> Option<u64> {
        let record = self.index.get(hash)?;
        Some(self.best_height() - record.height + 1)
    }

    /// Number of records on the best chain, genesis included.
    pub fn len(&self) -> usize {
        self.index.len()
    }

    pub fn is_empty(&self) -> bool {
        self.index.is_empty()
    }

    pub fn side_branch_count(&self) -> usize {
        self.side.len()
    }

    pub fn is_synced(&self) -> bool {
        self.synced
    }

    pub fn set_synced(&mut self, synced: bool) {
        if synced && !self.synced {
            info!(height = self.best_height(), "header chain synced");
        }
        self.synced = synced;
    }

    /// Whether a headers request is outstanding somewhere in the pool.
    pub fn headers_pending(&self) -> bool {
        self.headers_pending
    }

    pub fn set_headers_pending(&mut self, pending: bool) {
        self.headers_pending = pending;
    }

    // --- Appending ---

    /// Verify and append one header.
    ///
    /// A header whose parent is the head extends the best chain. Any other
    /// header with a known parent is stored on a side branch, and the chain
    /// reorganizes onto that branch if it now carries more work. Headers that
    /// are already known are accepted with an empty update.
    pub fn add_header(&mut self, header: &BlockHeader, now: u64) -> Result<ChainUpdate, ChainError> {
        let hash = header.hash();
        if self.contains(&hash) {
            return Ok(ChainUpdate::default());
        }

        validation::verify_header(header, now).map_err(ChainError::InvalidHeader)?;

        let parent = self
            .index
            .get(&header.prev_hash)
            .or_else(|| self.side.get(&header.prev_hash))
            .ok_or_else(|| ChainError::OrphanHeader(header.prev_hash.to_string()))?;

        let record = HeaderRecord {
            hash,
            prev_hash: header.prev_hash,
            height: parent.height + 1,
            chain_work: parent.chain_work + header.work(),
            header: header.clone(),
        };

        if record.prev_hash == self.head {
            self.push_best(record);
            return Ok(ChainUpdate {
                extended: vec![hash],
                ..ChainUpdate::default()
            });
        }

        debug!(%hash, height = record.height, "header stored on side branch");
        let heavier = record.chain_work > self.head_work();
        self.side.insert(hash, record);
        if !heavier {
            return Ok(ChainUpdate::default());
        }

        self.switch_to_branch(hash)
    }

    /// Append a batch of headers received from a peer.
    ///
    /// Clears the pending-headers flag. Stops at the first header that fails;
    /// that error is returned only if nothing in the batch was applied. When
    /// the chain was already synced, every newly appended hash is also queued
    /// for a block fetch so confirmation depths stay current.
    pub fn add_headers(
        &mut self,
        headers: &[BlockHeader],
        now: u64,
    ) -> Result<ChainUpdate, ChainError> {
        self.headers_pending = false;

        let Some(first) = headers.first() else {
            return Ok(ChainUpdate::default());
        };
        if !self.contains(&first.prev_hash) {
            return Err(ChainError::NotConnected);
        }

        let was_synced = self.synced;
        let mut update = ChainUpdate::default();
        for header in headers {
            match self.add_header(header, now) {
                Ok(step) => update.merge(step),
                Err(e) if update.is_empty() => return Err(e),
                Err(e) => {
                    warn!(error = %e, applied = update.extended.len(), "header batch cut short");
                    break;
                }
            }
        }

        if was_synced {
            let extended = update.extended.clone();
            update.refetch.extend(extended);
        }
        Ok(update)
    }

    /// Verify a delivered block and append its header.
    pub fn add_block(&mut self, block: &Block, now: u64) -> Result<ChainUpdate, ChainError> {
        if self.contains(&block.hash()) {
            return Ok(ChainUpdate::default());
        }
        validation::verify_block(block, now).map_err(ChainError::InvalidBlock)?;
        self.add_header(&block.header, now)
    }

    fn push_best(&mut self, record: HeaderRecord) {
        let hash = record.hash;
        let height = record.height;
        self.index.insert(hash, record);
        self.head = hash;

        self.recent.push_back(hash);
        while self.recent.len() > RECENT_WINDOW {
            self.recent.pop_front();
            self.recent_base += 1;
        }

        if height % SIDE_BRANCH_DEPTH == 0 {
            self.prune_side_branches();
        }
    }

    fn prune_side_branches(&mut self) {
        let floor = self.best_height().saturating_sub(SIDE_BRANCH_DEPTH);
        let before = self.side.len();
        self.side.retain(|_, r| r.height >= floor);
        let pruned = before - self.side.len();
        if pruned > 0 {
            debug!(pruned, "pruned stale side-branch headers");
        }
    }

    fn rebuild_recent(&mut self) {
        self.recent.clear();
        let mut cursor = self.index.get(&self.head);
        while let Some(record) = cursor {
            self.recent.push_front(record.hash);
            self.recent_base = record.height;
            if self.recent.len() == RECENT_WINDOW || record.height == 0 {
                break;
            }
            cursor = self.index.get(&record.prev_hash);
        }
    }

    /// Collect the side branch ending at `tip` and switch the best chain to it.
    fn switch_to_branch(&mut self, tip: Hash256) -> Result<ChainUpdate, ChainError> {
        let mut new_branch = Vec::new();
        let mut cursor = tip;
        while let Some(record) = self.side.get(&cursor) {
            new_branch.push(record.header.clone());
            cursor = record.prev_hash;
        }
        new_branch.reverse();
        let split_point = cursor;

        let mut orphaned = Vec::new();
        let mut walk = self.head;
        while walk != split_point {
            let Some(record) = self.index.get(&walk) else {
                break;
            };
            orphaned.push(walk);
            walk = record.prev_hash;
        }

        let refetch = self.reorganize(split_point, &orphaned, &new_branch)?;
        let extended = refetch[orphaned.len()..].to_vec();
        Ok(ChainUpdate {
            extended,
            reorganized: true,
            refetch,
        })
    }

    /// Replace the best chain above `split_point` with `new_headers`.
    ///
    /// `orphaned` must list exactly the best-chain hashes above the split
    /// point. Any inconsistency aborts before anything is modified. The
    /// orphaned records move to the side branches so the chain can switch
    /// back later. Returns the orphaned hashes followed by the new ones.
    pub fn reorganize(
        &mut self,
        split_point: Hash256,
        orphaned: &[Hash256],
        new_headers: &[BlockHeader],
    ) -> Result<Vec<Hash256>, ChainError> {
        let Some(split) = self.index.get(&split_point).cloned() else {
            error!(%split_point, "reorg split point missing from index");
            return Err(ChainError::ReorgSplitPointUnknown(split_point.to_string()));
        };
        if let Some(missing) = orphaned.iter().find(|h| !self.index.contains_key(*h)) {
            error!(hash = %missing, "reorg orphan missing from index");
            return Err(ChainError::ReorgOrphanUnknown(missing.to_string()));
        }

        // Dry-run the rollback so a mismatch leaves the index untouched.
        let mut doomed = Vec::new();
        let mut walk = self.head;
        while walk != split_point {
            let Some(record) = self.index.get(&walk) else {
                error!(%walk, "best chain broken during reorg walk");
                return Err(ChainError::ReorgSplitPointUnknown(split_point.to_string()));
            };
            doomed.push(walk);
            walk = record.prev_hash;
        }
        if doomed.len() != orphaned.len() {
            error!(
                removed = doomed.len(),
                expected = orphaned.len(),
                "reorg bookkeeping mismatch"
            );
            return Err(ChainError::ReorgCountMismatch {
                removed: doomed.len(),
                expected: orphaned.len(),
            });
        }

        let mut prev = split.hash;
        for header in new_headers {
            if header.prev_hash != prev {
                error!(hash = %header.hash(), "reorg branch is not contiguous");
                return Err(ChainError::NotConnected);
            }
            prev = header.hash();
        }

        for hash in &doomed {
            if let Some(record) = self.index.remove(hash) {
                self.side.insert(*hash, record);
            }
        }
        self.head = split.hash;

        let mut parent = split;
        let mut added = Vec::with_capacity(new_headers.len());
        for header in new_headers {
            let hash = header.hash();
            self.side.remove(&hash);
            let record = HeaderRecord {
                hash,
                prev_hash: header.prev_hash,
                height: parent.height + 1,
                chain_work: parent.chain_work + header.work(),
                header: header.clone(),
            };
            self.index.insert(hash, record.clone());
            self.head = hash;
            added.push(hash);
            parent = record;
        }
        self.rebuild_recent();

        warn!(
            %split_point,
            orphaned = orphaned.len(),
            adopted = added.len(),
            height = self.best_height(),
            "chain reorganized"
        );

        let mut refetch = orphaned.to_vec();
        refetch.extend(added);
        Ok(refetch)
    }

    // --- Locator ---

    /// Sparse list of best-chain hashes from the head back to genesis.
    ///
    /// The first ten heights below the head are dense, after which the step
    /// doubles each time. The genesis hash is always last.
    pub fn locator(&self) -> Result<Vec<Hash256>, ChainError> {
        let mut targets = locator_heights(self.best_height());
        targets.reverse();

        let mut locator = Vec::with_capacity(targets.len());
        let mut cursor = self
            .head_record()
            .ok_or_else(|| ChainError::MissingAncestor(self.head.to_string()))?;

        while let Some(&target) = targets.last() {
            if target == 0 {
                locator.push(self.genesis_hash);
                break;
            }
            if cursor.height == target {
                locator.push(cursor.hash);
                targets.pop();
            }
            cursor = self
                .index
                .get(&cursor.prev_hash)
                .ok_or_else(|| ChainError::MissingAncestor(cursor.prev_hash.to_string()))?;
        }

        Ok(locator)
    }
}

/// Heights a locator samples below `head_height`, highest first, ending at 0.
pub fn locator_heights(head_height: u64) -> Vec<u64> {
    let mut heights = Vec::new();
    let mut height = head_height;
    let mut step = 1u64;
    loop {
        heights.push(height);
        if height == 0 {
            break;
        }
        if heights.len() >= LOCATOR_DENSE_STEPS {
            step = step.saturating_mul(2);
        }
        height = height.saturating_sub(step);
    }
    heights
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::constants::MAX_LOCATOR_SIZE;
    use crate::genesis::GENESIS_TIMESTAMP;
    use crate::merkle;
    use crate::types::{OutPoint, Transaction, TxInput, TxOutput};
    use proptest::prelude::*;

    const NET: NetworkType = NetworkType::Regtest;
    const NOW: u64 = GENESIS_TIMESTAMP + 10_000_000;

    fn child(prev: Hash256, nonce: u64) -> BlockHeader {
        BlockHeader {
            version: 1,
            prev_hash: prev,
            merkle_root: Hash256::ZERO,
            timestamp: GENESIS_TIMESTAMP + nonce,
            difficulty_target: u64::MAX,
            nonce,
        }
    }

    /// `n` headers extending `from`, nonces offset by `salt` to fork distinct branches.
    fn branch(from: Hash256, n: usize, salt: u64) -> Vec<BlockHeader> {
        let mut headers = Vec::with_capacity(n);
        let mut prev = from;
        for i in 0..n {
            let h = child(prev, salt + i as u64);
            prev = h.hash();
            headers.push(h);
        }
        headers
    }

    fn chain_of(n: usize) -> (HeaderChain, Vec<BlockHeader>) {
        let mut chain = HeaderChain::new(NET);
        let headers = branch(chain.head(), n, 1);
        chain.add_headers(&headers, NOW).unwrap();
        (chain, headers)
    }

    fn assert_unbroken(chain: &HeaderChain) {
        for record in chain.index.values() {
            if record.height > 0 {
                let parent = chain.index.get(&record.prev_hash).expect("dangling record");
                assert_eq!(parent.height + 1, record.height);
            }
        }
    }

    // --- Construction ---

    #[test]
    fn new_chain_holds_genesis() {
        let chain = HeaderChain::new(NET);
        assert_eq!(chain.best_height(), 0);
        assert_eq!(chain.head(), genesis::genesis_hash(NET));
        assert_eq!(chain.hash_at_height(0), Some(chain.head()));
        assert_eq!(chain.depth(&chain.head()), Some(1));
        assert!(!chain.is_synced());
        assert!(!chain.headers_pending());
    }

    // --- Appending ---

    #[test]
    fn headers_extend_best_chain() {
        let (chain, headers) = chain_of(5);
        assert_eq!(chain.best_height(), 5);
        assert_eq!(chain.head(), headers[4].hash());
        assert_eq!(chain.hash_at_height(3), Some(headers[2].hash()));
        assert_eq!(chain.depth(&headers[0].hash()), Some(5));
        assert_eq!(chain.depth(&headers[4].hash()), Some(1));
        assert_unbroken(&chain);
    }

    #[test]
    fn known_header_is_noop() {
        let (mut chain, headers) = chain_of(2);
        let update = chain.add_header(&headers[1], NOW).unwrap();
        assert!(update.is_empty());
        assert_eq!(chain.best_height(), 2);
    }

    #[test]
    fn orphan_header_rejected() {
        let mut chain = HeaderChain::new(NET);
        let err = chain.add_header(&child(Hash256([9; 32]), 1), NOW).unwrap_err();
        assert!(matches!(err, ChainError::OrphanHeader(_)));
    }

    #[test]
    fn disconnected_batch_rejected() {
        let mut chain = HeaderChain::new(NET);
        chain.set_headers_pending(true);
        let batch = branch(Hash256([9; 32]), 3, 1);
        assert_eq!(chain.add_headers(&batch, NOW), Err(ChainError::NotConnected));
        assert!(!chain.headers_pending());
    }

    #[test]
    fn invalid_pow_header_rejected() {
        let mut chain = HeaderChain::new(NET);
        let mut header = child(chain.head(), 1);
        header.difficulty_target = 0;
        assert!(matches!(
            chain.add_header(&header, NOW),
            Err(ChainError::InvalidHeader(_))
        ));
    }

    #[test]
    fn batch_stops_at_first_bad_header() {
        let mut chain = HeaderChain::new(NET);
        let mut batch = branch(chain.head(), 4, 1);
        batch[2].timestamp = NOW + 1_000_000;
        let update = chain.add_headers(&batch, NOW).unwrap();
        assert_eq!(update.extended.len(), 2);
        assert_eq!(chain.best_height(), 2);
    }

    #[test]
    fn synced_chain_queues_refetch_for_new_headers() {
        let (mut chain, headers) = chain_of(3);
        chain.set_synced(true);
        let more = branch(headers[2].hash(), 2, 100);
        let update = chain.add_headers(&more, NOW).unwrap();
        assert_eq!(update.refetch, vec![more[0].hash(), more[1].hash()]);
    }

    #[test]
    fn unsynced_chain_does_not_refetch() {
        let mut chain = HeaderChain::new(NET);
        let batch = branch(chain.head(), 3, 1);
        let update = chain.add_headers(&batch, NOW).unwrap();
        assert!(update.refetch.is_empty());
        assert_eq!(update.extended.len(), 3);
    }

    #[test]
    fn add_block_verifies_then_appends() {
        let mut chain = HeaderChain::new(NET);
        let coinbase = Transaction {
            version: 1,
            inputs: vec![TxInput {
                previous_output: OutPoint::null(),
                signature: b"h1".to_vec(),
                public_key: vec![],
            }],
            outputs: vec![TxOutput { value: 1, pubkey_hash: Hash256([1; 32]) }],
            lock_time: 0,
        };
        let mut header = child(chain.head(), 1);
        header.merkle_root = merkle::transactions_root(std::slice::from_ref(&coinbase)).unwrap();
        let block = Block { header, transactions: vec![coinbase] };

        let update = chain.add_block(&block, NOW).unwrap();
        assert_eq!(update.extended, vec![block.hash()]);
        assert!(chain.add_block(&block, NOW).unwrap().is_empty());

        let mut bad = block.clone();
        bad.header.prev_hash = block.hash();
        bad.header.merkle_root = Hash256::ZERO;
        assert!(matches!(chain.add_block(&bad, NOW), Err(ChainError::InvalidBlock(_))));
    }

    // --- Side branches and reorg ---

    #[test]
    fn shorter_fork_stays_on_side() {
        let (mut chain, headers) = chain_of(4);
        let fork = branch(headers[1].hash(), 2, 500);
        let update = chain.add_headers(&fork, NOW).unwrap();
        assert!(!update.reorganized);
        assert_eq!(chain.head(), headers[3].hash());
        assert_eq!(chain.side_branch_count(), 2);
        assert!(chain.contains(&fork[1].hash()));
        assert!(!chain.is_in_best_chain(&fork[1].hash()));
        assert_eq!(chain.depth(&fork[1].hash()), None);
    }

    #[test]
    fn heavier_fork_triggers_reorg() {
        let (mut chain, headers) = chain_of(4);
        let fork = branch(headers[1].hash(), 3, 500);
        let update = chain.add_headers(&fork, NOW).unwrap();

        assert!(update.reorganized);
        assert_eq!(chain.head(), fork[2].hash());
        assert_eq!(chain.best_height(), 5);
        for old in &headers[2..] {
            assert!(!chain.is_in_best_chain(&old.hash()));
            assert!(update.refetch.contains(&old.hash()));
        }
        for new in &fork {
            assert!(chain.is_in_best_chain(&new.hash()));
            assert!(update.refetch.contains(&new.hash()));
        }
        assert_eq!(chain.hash_at_height(3), Some(fork[0].hash()));
        assert_unbroken(&chain);
    }

    #[test]
    fn chain_can_switch_back() {
        let (mut chain, headers) = chain_of(3);
        let fork = branch(headers[0].hash(), 3, 500);
        chain.add_headers(&fork, NOW).unwrap();
        assert_eq!(chain.head(), fork[2].hash());

        let extra = branch(headers[2].hash(), 2, 900);
        let update = chain.add_headers(&extra, NOW).unwrap();
        assert!(update.reorganized);
        assert_eq!(chain.head(), extra[1].hash());
        assert!(chain.is_in_best_chain(&headers[1].hash()));
        assert_unbroken(&chain);
    }

    #[test]
    fn reorg_rejects_unknown_split_point() {
        let (mut chain, headers) = chain_of(2);
        let head = chain.head();
        let err = chain
            .reorganize(Hash256([7; 32]), &[headers[1].hash()], &[])
            .unwrap_err();
        assert!(matches!(err, ChainError::ReorgSplitPointUnknown(_)));
        assert_eq!(chain.head(), head);
    }

    #[test]
    fn reorg_rejects_unknown_orphan() {
        let (mut chain, headers) = chain_of(2);
        let err = chain
            .reorganize(headers[0].hash(), &[Hash256([7; 32])], &[])
            .unwrap_err();
        assert!(matches!(err, ChainError::ReorgOrphanUnknown(_)));
        assert_eq!(chain.best_height(), 2);
    }

    #[test]
    fn reorg_count_mismatch_leaves_state_unchanged() {
        let (mut chain, headers) = chain_of(4);
        let new = branch(headers[1].hash(), 3, 500);
        let err = chain
            .reorganize(headers[1].hash(), &[headers[3].hash()], &new)
            .unwrap_err();
        assert_eq!(err, ChainError::ReorgCountMismatch { removed: 2, expected: 1 });
        assert_eq!(chain.head(), headers[3].hash());
        assert_eq!(chain.len(), 5);
    }

    #[test]
    fn explicit_reorg_returns_old_then_new() {
        let (mut chain, headers) = chain_of(3);
        let new = branch(headers[0].hash(), 2, 500);
        let orphaned = [headers[2].hash(), headers[1].hash()];
        let refetch = chain.reorganize(headers[0].hash(), &orphaned, &new).unwrap();
        assert_eq!(
            refetch,
            vec![headers[2].hash(), headers[1].hash(), new[0].hash(), new[1].hash()]
        );
        assert_eq!(chain.head(), new[1].hash());
    }

    // --- Locator ---

    #[test]
    fn locator_at_genesis_is_genesis_only() {
        let chain = HeaderChain::new(NET);
        assert_eq!(chain.locator().unwrap(), vec![chain.genesis_hash()]);
    }

    #[test]
    fn locator_is_dense_then_sparse() {
        assert_eq!(locator_heights(5), vec![5, 4, 3, 2, 1, 0]);
        let heights = locator_heights(100);
        assert_eq!(&heights[..10], &[100, 99, 98, 97, 96, 95, 94, 93, 92, 91]);
        assert_eq!(heights[10], 89);
        assert_eq!(heights[11], 85);
        assert_eq!(*heights.last().unwrap(), 0);
    }

    #[test]
    fn locator_hashes_match_heights() {
        let (chain, headers) = chain_of(30);
        let locator = chain.locator().unwrap();
        assert_eq!(locator[0], chain.head());
        assert_eq!(locator[1], headers[28].hash());
        assert_eq!(*locator.last().unwrap(), chain.genesis_hash());
        assert_eq!(locator.len(), locator_heights(30).len());
    }

    #[test]
    fn locator_fails_on_missing_ancestor() {
        let (mut chain, headers) = chain_of(5);
        chain.index.remove(&headers[1].hash());
        assert!(matches!(chain.locator(), Err(ChainError::MissingAncestor(_))));
    }

    // --- Properties ---

    proptest! {
        #![proptest_config(ProptestConfig::with_cases(24))]

        #[test]
        fn batches_build_unbroken_chain(sizes in proptest::collection::vec(1usize..40, 1..6)) {
            let mut chain = HeaderChain::new(NET);
            let mut applied = 0usize;
            for (i, n) in sizes.iter().enumerate() {
                let batch = branch(chain.head(), *n, (i as u64) * 1_000);
                chain.add_headers(&batch, NOW).unwrap();
                applied += n;
            }
            prop_assert_eq!(chain.best_height(), applied as u64);
            prop_assert_eq!(chain.len(), applied + 1);
            assert_unbroken(&chain);
        }

        #[test]
        fn locator_ends_at_genesis(height in 0usize..300) {
            let (chain, _) = chain_of(height);
            let locator = chain.locator().unwrap();
            prop_assert_eq!(*locator.last().unwrap(), chain.genesis_hash());
            prop_assert_eq!(locator[0], chain.head());
            prop_assert!(locator.len() <= MAX_LOCATOR_SIZE);
        }

        #[test]
        fn reorg_replaces_suffix(len in 2usize..20, fork_at in 0usize..10, extra in 1usize..5) {
            let fork_at = fork_at.min(len - 1);
            let (mut chain, headers) = chain_of(len);
            let split = if fork_at == 0 { chain.genesis_hash() } else { headers[fork_at - 1].hash() };
            let new_len = len - fork_at + extra;
            let fork = branch(split, new_len, 10_000);
            chain.add_headers(&fork, NOW).unwrap();

            prop_assert_eq!(chain.head(), fork[new_len - 1].hash());
            for old in &headers[fork_at..] {
                prop_assert!(!chain.is_in_best_chain(&old.hash()));
            }
            for new in &fork {
                prop_assert!(chain.is_in_best_chain(&new.hash()));
            }
            assert_unbroken(&chain);
        }
    }
}
