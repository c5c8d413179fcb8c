//! Base58Check addresses.
//!
//! An address encodes `version || pubkey_hash || checksum`, where the version
//! byte selects the network and the checksum is the first four bytes of the
//! double SHA-256 of the preceding 33 bytes.

use sha2::{Digest, Sha256};
use std::fmt;
use std::str::FromStr;

use crate::constants::NetworkType;
use crate::crypto::PublicKey;
use crate::error::AddressError;
use crate::types::Hash256;

/// Decoded payload length: version byte, 32-byte hash, 4-byte checksum.
const PAYLOAD_LEN: usize = 1 + 32 + 4;

/// A pay-to-pubkey-hash destination on a specific network.
#[derive(Clone, Copy, Debug, PartialEq, Eq, Hash)]
pub struct Address {
    network: NetworkType,
    pubkey_hash: Hash256,
}

impl Address {
    pub fn from_pubkey_hash(pubkey_hash: Hash256, network: NetworkType) -> Self {
        Self { network, pubkey_hash }
    }

    pub fn from_public_key(public_key: &PublicKey, network: NetworkType) -> Self {
        Self::from_pubkey_hash(public_key.pubkey_hash(), network)
    }

    pub fn pubkey_hash(&self) -> Hash256 {
        self.pubkey_hash
    }

    pub fn network(&self) -> NetworkType {
        self.network
    }

    pub fn encode(&self) -> String {
        let mut payload = Vec::with_capacity(PAYLOAD_LEN);
        payload.push(self.network.address_version());
        payload.extend_from_slice(self.pubkey_hash.as_bytes());
        let check = checksum(&payload);
        payload.extend_from_slice(&check);
        bs58::encode(payload).into_string()
    }

    /// Decode any network's address.
    pub fn decode(s: &str) -> Result<Self, AddressError> {
        let payload = bs58::decode(s)
            .into_vec()
            .map_err(|e| AddressError::InvalidBase58(e.to_string()))?;
        if payload.len() != PAYLOAD_LEN {
            return Err(AddressError::InvalidLength(payload.len()));
        }

        let (body, check) = payload.split_at(PAYLOAD_LEN - 4);
        if checksum(body) != check {
            return Err(AddressError::InvalidChecksum);
        }

        let network = NetworkType::from_address_version(body[0])
            .ok_or(AddressError::UnknownVersion(body[0]))?;
        let mut hash = [0u8; 32];
        hash.copy_from_slice(&body[1..]);

        Ok(Self {
            network,
            pubkey_hash: Hash256(hash),
        })
    }

    /// Decode and require the address to belong to `network`.
    pub fn decode_for(s: &str, network: NetworkType) -> Result<Self, AddressError> {
        let addr = Self::decode(s)?;
        if addr.network != network {
            return Err(AddressError::WrongNetwork);
        }
        Ok(addr)
    }
}

/// Whether `s` is a well-formed address for `network`.
pub fn is_valid_address(s: &str, network: NetworkType) -> bool {
    Address::decode_for(s, network).is_ok()
}

fn checksum(data: &[u8]) -> [u8; 4] {
    let first = Sha256::digest(data);
    let second = Sha256::digest(first);
    let mut out = [0u8; 4];
    out.copy_from_slice(&second[..4]);
    out
}

impl fmt::Display for Address {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(&self.encode())
    }
}

impl FromStr for Address {
    type Err = AddressError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        Self::decode(s)
    }
}
