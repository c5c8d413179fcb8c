//! Events posted from the client core to the presentation layer.
//!
//! Delivery is fire-and-forget over an unbounded channel. A closed receiver
//! is ignored.

use std::net::SocketAddr;

use crate::address::Address;
use crate::types::Hash256;

#[derive(Debug, Clone, PartialEq, Eq)]
pub enum ClientEvent {
    /// A peer finished the handshake.
    PeerConnected { addr: SocketAddr, height: u64 },
    PeerDisconnected { addr: SocketAddr },
    /// The best header height changed while syncing.
    SyncProgress { height: u64 },
    /// Every connected peer has no more headers to offer.
    Synced,
    /// A transaction paid one of our addresses.
    FundsReceived {
        address: Address,
        value: u64,
        txid: Hash256,
    },
    /// A rejected spend released an output back to the spendable set.
    FundsReturned { address: Address, value: u64 },
    /// A peer refused a transaction we broadcast.
    TransactionRejected {
        txid: Hash256,
        code: u8,
        reason: String,
    },
}

pub type EventSender = tokio::sync::mpsc::UnboundedSender<ClientEvent>;
pub type EventReceiver = tokio::sync::mpsc::UnboundedReceiver<ClientEvent>;
