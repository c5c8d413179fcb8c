//! # skiff-wallet: output tracking and payments for the Skiff light client.
//!
//! Derives receiving keys from a seed, watches relayed transactions and
//! blocks for outputs paying those keys, and builds signed payments from the
//! spendable set with the relay fee policy applied.
//!
//! # Modules
//!
//! - [`error`]: `WalletError` enum
//! - [`keys`]: Seed, KeyChain, BLAKE3-based key derivation
//! - [`tracker`]: One record per received output, with confirmation depths
//! - [`coin_selection`]: Largest-first selection over spendable outputs
//! - [`fee`]: Priority and minimum-fee rules
//! - [`builder`]: Bounded fee loop, signing and commit
//! - [`worker`]: `WalletService` and its filter/confirmation workers

pub mod builder;
pub mod coin_selection;
pub mod config;
pub mod error;
pub mod fee;
pub mod keys;
pub mod tracker;
pub mod worker;

pub use builder::{BuiltTransaction, TransactionBuilder};
pub use coin_selection::{Candidate, Selection, select_largest_first};
pub use config::WalletConfig;
pub use error::WalletError;
pub use keys::{KeyChain, Seed};
pub use tracker::{InputRef, OutInfo, OutputTracker, TrackedOutput};
pub use worker::WalletService;
