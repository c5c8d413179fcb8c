//! Merkle commitment over a block's transaction ids.
//!
//! Leaves are hashed as `BLAKE3(0x00 || txid)` and interior nodes as
//! `BLAKE3(0x01 || left || right)`. A layer with an odd count pairs its last
//! node with itself. The root of an empty list is [`Hash256::ZERO`].

use crate::error::TransactionError;
use crate::types::{Hash256, Transaction};

const LEAF_TAG: u8 = 0x00;
const NODE_TAG: u8 = 0x01;

fn hash_leaf(txid: &Hash256) -> Hash256 {
    let mut hasher = blake3::Hasher::new();
    hasher.update(&[LEAF_TAG]);
    hasher.update(txid.as_bytes());
    Hash256(hasher.finalize().into())
}

fn hash_pair(left: &Hash256, right: &Hash256) -> Hash256 {
    let mut hasher = blake3::Hasher::new();
    hasher.update(&[NODE_TAG]);
    hasher.update(left.as_bytes());
    hasher.update(right.as_bytes());
    Hash256(hasher.finalize().into())
}

/// Root over an ordered list of transaction ids.
pub fn merkle_root(txids: &[Hash256]) -> Hash256 {
    let mut layer: Vec<Hash256> = txids.iter().map(hash_leaf).collect();
    while layer.len() > 1 {
        layer = layer
            .chunks(2)
            .map(|pair| hash_pair(&pair[0], pair.get(1).unwrap_or(&pair[0])))
            .collect();
    }
    layer.first().copied().unwrap_or(Hash256::ZERO)
}

/// Root over the ids of `transactions`, in block order.
pub fn transactions_root(transactions: &[Transaction]) -> Result<Hash256, TransactionError> {
    let txids = transactions
        .iter()
        .map(Transaction::txid)
        .collect::<Result<Vec<_>, _>>()?;
    Ok(merkle_root(&txids))
}
