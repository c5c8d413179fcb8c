//! # skiff-node: Skiff light client composition.
//!
//! - [`client::Client`]: wires chain, wallet and peer pool together
//! - [`config::ClientConfig`]: layered file/environment configuration
//! - [`error::ClientError`]: failures reported to the presentation layer

pub mod client;
pub mod config;
pub mod error;

pub use client::Client;
pub use crate::config::ClientConfig;
pub use error::ClientError;
