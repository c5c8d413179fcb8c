//! In-memory key chain.
//!
//! Keys are derived from a random per-process seed with BLAKE3's keyed
//! derivation, one child per index. Nothing is persisted: a restart starts
//! from a fresh seed.

use parking_lot::RwLock;
use std::collections::HashMap;
use std::fmt;
use tracing::debug;
use zeroize::{Zeroize, ZeroizeOnDrop};

use skiff_core::address::{self, Address};
use skiff_core::constants::NetworkType;
use skiff_core::crypto::KeyPair;
use skiff_core::traits::KeyStore;
use skiff_core::types::Hash256;

/// BLAKE3 KDF context for child key derivation.
const KDF_CONTEXT: &str = "skiff-wallet-key-derivation-v1";

/// A 32-byte master seed, zeroized on drop.
#[derive(Zeroize, ZeroizeOnDrop)]
pub struct Seed {
    bytes: [u8; 32],
}

impl Seed {
    pub fn generate() -> Self {
        use rand::RngCore;
        let mut bytes = [0u8; 32];
        rand::rngs::OsRng.fill_bytes(&mut bytes);
        Self { bytes }
    }

    pub fn from_bytes(bytes: [u8; 32]) -> Self {
        Self { bytes }
    }

    fn derive(&self, index: u32) -> KeyPair {
        let mut ikm = [0u8; 36];
        ikm[..32].copy_from_slice(&self.bytes);
        ikm[32..].copy_from_slice(&index.to_le_bytes());
        let derived = blake3::derive_key(KDF_CONTEXT, &ikm);
        ikm.zeroize();
        KeyPair::from_secret_bytes(derived)
    }
}

impl fmt::Debug for Seed {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("Seed").field("bytes", &"[REDACTED]").finish()
    }
}

#[derive(Default)]
struct Keys {
    next_index: u32,
    by_hash: HashMap<Hash256, (Address, KeyPair)>,
    /// Creation order, for stable listings.
    order: Vec<Hash256>,
}

/// Thread-safe key store used by the wallet and the client API.
pub struct KeyChain {
    seed: Seed,
    network: NetworkType,
    keys: RwLock<Keys>,
}

impl KeyChain {
    pub fn new(seed: Seed, network: NetworkType) -> Self {
        Self {
            seed,
            network,
            keys: RwLock::new(Keys::default()),
        }
    }

    /// A key chain with a fresh random seed.
    pub fn generate(network: NetworkType) -> Self {
        Self::new(Seed::generate(), network)
    }

    pub fn network(&self) -> NetworkType {
        self.network
    }

    /// Create one new address.
    pub fn next_address(&self) -> Address {
        let mut keys = self.keys.write();
        let index = keys.next_index;
        keys.next_index = keys.next_index.saturating_add(1);
        let kp = self.seed.derive(index);
        let address = Address::from_public_key(&kp.public_key(), self.network);
        let pkh = address.pubkey_hash();
        if keys.by_hash.insert(pkh, (address, kp)).is_none() {
            keys.order.push(pkh);
        }
        debug!(%address, index, "created address");
        address
    }

    pub fn len(&self) -> usize {
        self.keys.read().order.len()
    }

    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }
}

impl KeyStore for KeyChain {
    fn create_addresses(&self, n: usize) -> Vec<Address> {
        (0..n).map(|_| self.next_address()).collect()
    }

    fn address_for_pubkey_hash(&self, pubkey_hash: &Hash256) -> Option<Address> {
        self.keys.read().by_hash.get(pubkey_hash).map(|(a, _)| *a)
    }

    fn signing_key_for(&self, address: &Address) -> Option<KeyPair> {
        self.keys
            .read()
            .by_hash
            .get(&address.pubkey_hash())
            .filter(|(a, _)| a == address)
            .map(|(_, kp)| kp.clone())
    }

    fn is_valid_address(&self, s: &str) -> bool {
        address::is_valid_address(s, self.network)
    }

    fn remove_address(&self, address: &Address) -> bool {
        let mut keys = self.keys.write();
        let pkh = address.pubkey_hash();
        if keys.by_hash.remove(&pkh).is_none() {
            return false;
        }
        keys.order.retain(|h| *h != pkh);
        debug!(%address, "removed address");
        true
    }

    fn addresses(&self) -> Vec<Address> {
        let keys = self.keys.read();
        keys.order
            .iter()
            .filter_map(|h| keys.by_hash.get(h).map(|(a, _)| *a))
            .collect()
    }
}

impl fmt::Debug for KeyChain {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("KeyChain")
            .field("network", &self.network)
            .field("addresses", &self.len())
            .finish()
    }
}
