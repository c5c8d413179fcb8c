//! Network configuration for the Skiff peer pool.

use skiff_core::constants::NetworkType;
use std::net::SocketAddr;
use std::time::Duration;

/// Configuration for the peer pool and its connections.
#[derive(Debug, Clone)]
pub struct NetworkConfig {
    pub network: NetworkType,
    /// Remote port used for DNS-seeded addresses.
    pub port: u16,
    /// Hostnames resolved when the address book runs dry.
    pub dns_seeds: Vec<String>,
    /// Addresses dialled before any DNS seeding.
    pub bootstrap_peers: Vec<SocketAddr>,
    /// Target number of simultaneous connections.
    pub max_peers: usize,
    /// A dispatched request is requeued after this long without an answer.
    pub request_timeout: Duration,
    /// Scheduler polling period.
    pub tick_interval: Duration,
    /// Timeout for outbound TCP connects.
    pub connect_timeout: Duration,
    /// Minimum time between two DNS re-seeds.
    pub reseed_interval: Duration,
    pub user_agent: String,
}

impl Default for NetworkConfig {
    fn default() -> Self {
        Self::for_network(NetworkType::default())
    }
}

impl NetworkConfig {
    /// Defaults for `network`: port and seeds follow the network parameters.
    pub fn for_network(network: NetworkType) -> Self {
        Self {
            network,
            port: network.default_port(),
            dns_seeds: network.dns_seeds().iter().map(|s| s.to_string()).collect(),
            bootstrap_peers: Vec::new(),
            max_peers: 5,
            request_timeout: Duration::from_secs(10),
            tick_interval: Duration::from_millis(100),
            connect_timeout: Duration::from_secs(10),
            reseed_interval: Duration::from_secs(30),
            user_agent: format!("/skiff:{}/", env!("CARGO_PKG_VERSION")),
        }
    }

    pub fn testnet() -> Self {
        Self::for_network(NetworkType::Testnet)
    }

    /// Local regtest preset: no DNS seeds, peers come from `bootstrap_peers`.
    pub fn regtest() -> Self {
        Self::for_network(NetworkType::Regtest)
    }

    pub fn magic(&self) -> [u8; 4] {
        self.network.magic_bytes()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn default_is_testnet_pool_of_five() {
        let cfg = NetworkConfig::default();
        assert_eq!(cfg.network, NetworkType::Testnet);
        assert_eq!(cfg.max_peers, 5);
        assert_eq!(cfg.request_timeout, Duration::from_secs(10));
        assert_eq!(cfg.tick_interval, Duration::from_millis(100));
    }

    #[test]
    fn port_and_seeds_follow_network() {
        let cfg = NetworkConfig::for_network(NetworkType::Mainnet);
        assert_eq!(cfg.port, NetworkType::Mainnet.default_port());
        assert_eq!(cfg.dns_seeds.len(), NetworkType::Mainnet.dns_seeds().len());
        assert_eq!(cfg.magic(), *b"SKFM");
    }

    #[test]
    fn regtest_has_no_seeds() {
        let cfg = NetworkConfig::regtest();
        assert!(cfg.dns_seeds.is_empty());
        assert!(cfg.bootstrap_peers.is_empty());
    }

    #[test]
    fn user_agent_carries_version() {
        assert!(NetworkConfig::testnet().user_agent.starts_with("/skiff:"));
    }
}
