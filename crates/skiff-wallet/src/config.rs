//! Wallet policy configuration.

use skiff_core::constants::{DEFAULT_MIN_FEE, NetworkType};
use std::time::Duration;

#[derive(Debug, Clone)]
pub struct WalletConfig {
    pub network: NetworkType,
    /// Fee per started 1000 bytes when a fee is required.
    pub min_fee: u64,
    /// Default confirmation threshold for balances and spends.
    pub min_confirmations: u64,
    /// Polling period of the filter and confirmation workers.
    pub worker_interval: Duration,
    /// Upper bound on fee re-estimation rounds per transaction.
    pub max_fee_attempts: usize,
    /// Receiving addresses generated at startup.
    pub initial_addresses: usize,
}

impl Default for WalletConfig {
    fn default() -> Self {
        Self::for_network(NetworkType::default())
    }
}

impl WalletConfig {
    pub fn for_network(network: NetworkType) -> Self {
        Self {
            network,
            min_fee: DEFAULT_MIN_FEE,
            min_confirmations: 1,
            worker_interval: Duration::from_millis(500),
            max_fee_attempts: 5,
            initial_addresses: 1,
        }
    }
}
