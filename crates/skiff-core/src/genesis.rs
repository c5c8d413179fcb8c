//! Per-network genesis blocks.
//!
//! Every client builds the identical genesis block for a network from the
//! constants here. The genesis header anchors the header chain and is never
//! run through header verification.

use std::sync::LazyLock;

use crate::constants::{COIN, NetworkType};
use crate::merkle;
use crate::types::{Block, BlockHeader, Hash256, OutPoint, Transaction, TxInput, TxOutput};

/// 2026-01-01T00:00:00Z.
pub const GENESIS_TIMESTAMP: u64 = 1_767_225_600;

pub const GENESIS_MESSAGE: &[u8] = b"skiff genesis: light boats float on deep water";

struct Genesis {
    block: Block,
    hash: Hash256,
}

static GENESIS: LazyLock<[Genesis; 3]> = LazyLock::new(|| {
    [
        build(NetworkType::Mainnet),
        build(NetworkType::Testnet),
        build(NetworkType::Regtest),
    ]
});

fn slot(network: NetworkType) -> usize {
    match network {
        NetworkType::Mainnet => 0,
        NetworkType::Testnet => 1,
        NetworkType::Regtest => 2,
    }
}

fn build(network: NetworkType) -> Genesis {
    let coinbase = Transaction {
        version: 1,
        inputs: vec![TxInput {
            previous_output: OutPoint::null(),
            signature: GENESIS_MESSAGE.to_vec(),
            public_key: vec![],
        }],
        outputs: vec![TxOutput {
            value: 50 * COIN,
            pubkey_hash: Hash256(blake3::hash(b"skiff genesis unspendable").into()),
        }],
        lock_time: 0,
    };
    // Encoding a fixed in-memory transaction does not fail.
    let merkle_root = merkle::transactions_root(std::slice::from_ref(&coinbase))
        .unwrap_or(Hash256::ZERO);

    let block = Block {
        header: BlockHeader {
            version: 1,
            prev_hash: Hash256::ZERO,
            merkle_root,
            timestamp: GENESIS_TIMESTAMP,
            difficulty_target: network.genesis_target(),
            nonce: u64::from(network.address_version()),
        },
        transactions: vec![coinbase],
    };
    let hash = block.hash();
    Genesis { block, hash }
}

pub fn genesis_block(network: NetworkType) -> &'static Block {
    &GENESIS[slot(network)].block
}

pub fn genesis_hash(network: NetworkType) -> Hash256 {
    GENESIS[slot(network)].hash
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn genesis_is_deterministic() {
        assert_eq!(build(NetworkType::Testnet).hash, genesis_hash(NetworkType::Testnet));
    }

    #[test]
    fn networks_have_distinct_genesis() {
        let m = genesis_hash(NetworkType::Mainnet);
        let t = genesis_hash(NetworkType::Testnet);
        let r = genesis_hash(NetworkType::Regtest);
        assert_ne!(m, t);
        assert_ne!(t, r);
        assert_ne!(m, r);
    }

    #[test]
    fn genesis_block_shape() {
        let block = genesis_block(NetworkType::Regtest);
        assert!(block.header.prev_hash.is_zero());
        assert_eq!(block.transactions.len(), 1);
        assert!(block.transactions[0].is_coinbase());
        assert_eq!(block.header.difficulty_target, u64::MAX);
        assert_eq!(
            block.header.merkle_root,
            merkle::transactions_root(&block.transactions).unwrap()
        );
    }
}
