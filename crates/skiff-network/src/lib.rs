//! # skiff-network: peer pool for the Skiff light client.
//!
//! Speaks a framed, bincode-encoded wire protocol over plain TCP. A
//! [`Scheduler`] keeps a small pool of outbound connections busy with
//! one request each: headers first, then announced transactions, then blocks.
//!
//! The main entry point is [`NetworkService::start`], which spawns the
//! scheduler loop against a [`SyncContext`] shared with the wallet.

pub mod address_book;
pub mod config;
pub mod peer;
pub mod protocol;
pub mod scheduler;
pub mod service;

pub use address_book::AddressBook;
pub use config::NetworkConfig;
pub use peer::{ConnectionState, PeerConnection, PeerHandle, PendingRequest, PoolEvent, RequestKind};
pub use protocol::{InvItem, InvKind, Message, RejectInfo, VersionInfo};
pub use scheduler::Scheduler;
pub use service::{NetworkService, SyncContext, unix_now};
