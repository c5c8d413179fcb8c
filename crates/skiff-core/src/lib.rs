//! # skiff-core
//! Protocol primitives, request tracking and the header chain for the Skiff
//! light client.

pub mod address;
pub mod constants;
pub mod crypto;
pub mod error;
pub mod events;
pub mod genesis;
pub mod header_chain;
pub mod merkle;
pub mod request_ledger;
pub mod traits;
pub mod types;
pub mod validation;
