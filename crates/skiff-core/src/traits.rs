//! Seams between the Skiff crates.
//!
//! - [`KeyStore`]: key and address service (skiff-wallet implements)
//! - [`WalletFeed`]: where peers hand over wallet-relevant data (skiff-wallet implements)

use crate::address::Address;
use crate::crypto::KeyPair;
use crate::types::{Block, Hash256, Transaction};

/// Key and address management.
///
/// The light client never persists keys itself; implementations decide where
/// keys come from and how long they live.
pub trait KeyStore: Send + Sync {
    /// Generate `n` fresh receiving addresses and start watching them.
    fn create_addresses(&self, n: usize) -> Vec<Address>;

    /// The local address an output locked to `pubkey_hash` pays, if any.
    fn address_for_pubkey_hash(&self, pubkey_hash: &Hash256) -> Option<Address>;

    /// Signing key for a local address.
    fn signing_key_for(&self, address: &Address) -> Option<KeyPair>;

    /// Whether `s` is a well-formed address on this store's network.
    fn is_valid_address(&self, s: &str) -> bool;

    /// Stop watching an address and forget its key. Returns false if unknown.
    fn remove_address(&self, address: &Address) -> bool;

    /// All watched addresses.
    fn addresses(&self) -> Vec<Address>;

    fn is_local(&self, address: &Address) -> bool {
        self.address_for_pubkey_hash(&address.pubkey_hash()).is_some()
    }
}

/// Inbound data a peer connection forwards to the wallet.
///
/// Calls must return quickly: implementations enqueue and process later.
pub trait WalletFeed: Send + Sync {
    /// A transaction arrived; filter it for relevance.
    fn queue_transaction(&self, tx: Transaction);

    /// A block arrived; update confirmation depths from it.
    fn queue_block(&self, block: Block);

    /// The network rejected a transaction we broadcast; undo its effects.
    fn transaction_rejected(&self, txid: Hash256);
}

/// A feed that discards everything, for running the network layer alone.
#[derive(Debug, Default, Clone, Copy)]
pub struct NullWalletFeed;

impl WalletFeed for NullWalletFeed {
    fn queue_transaction(&self, _tx: Transaction) {}
    fn queue_block(&self, _block: Block) {}
    fn transaction_rejected(&self, _txid: Hash256) {}
}
