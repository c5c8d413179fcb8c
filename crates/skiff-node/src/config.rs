//! Client configuration for the Skiff light client.
//!
//! [`ClientConfig`] composes the peer-pool and wallet settings with a data
//! directory and log level. [`ClientConfig::load`] layers an optional TOML
//! file and `SKIFF_*` environment variables over the network defaults.

use std::net::SocketAddr;
use std::path::{Path, PathBuf};
use std::time::Duration;

use serde::Deserialize;
use skiff_core::constants::NetworkType;
use skiff_network::NetworkConfig;
use skiff_wallet::WalletConfig;

use crate::error::ClientError;

/// File looked up in the data directory when no path is given.
pub const CONFIG_FILE_NAME: &str = "skiff.toml";

/// Prefix for environment overrides, e.g. `SKIFF_MAX_PEERS=8`.
pub const ENV_PREFIX: &str = "SKIFF";

/// Configuration for a client instance.
#[derive(Debug, Clone)]
pub struct ClientConfig {
    /// Peer-pool configuration.
    pub network: NetworkConfig,
    /// Fee and confirmation policy.
    pub wallet: WalletConfig,
    /// Root directory for the config file. Nothing else is written there.
    pub data_dir: PathBuf,
    /// Log level filter string (e.g. "info", "skiff_network=debug").
    pub log_level: String,
}

impl Default for ClientConfig {
    fn default() -> Self {
        Self::for_network(NetworkType::default())
    }
}

impl ClientConfig {
    pub fn for_network(network: NetworkType) -> Self {
        Self {
            network: NetworkConfig::for_network(network),
            wallet: WalletConfig::for_network(network),
            data_dir: default_data_dir(network),
            log_level: "info".to_string(),
        }
    }

    pub fn testnet() -> Self {
        Self::for_network(NetworkType::Testnet)
    }

    pub fn regtest() -> Self {
        Self::for_network(NetworkType::Regtest)
    }

    pub fn network_type(&self) -> NetworkType {
        self.network.network
    }

    pub fn config_path(&self) -> PathBuf {
        self.data_dir.join(CONFIG_FILE_NAME)
    }

    /// Load configuration from `path` (required when given) or from the
    /// default data directory (optional), then apply `SKIFF_*` overrides.
    pub fn load(path: Option<&Path>) -> Result<Self, ClientError> {
        let mut builder = config::Config::builder();
        builder = match path {
            Some(path) => builder.add_source(config::File::from(path).format(config::FileFormat::Toml)),
            None => {
                let fallback = default_data_dir(NetworkType::default()).join(CONFIG_FILE_NAME);
                builder.add_source(
                    config::File::from(fallback)
                        .format(config::FileFormat::Toml)
                        .required(false),
                )
            }
        };
        builder = builder.add_source(
            config::Environment::with_prefix(ENV_PREFIX)
                .try_parsing(true)
                .list_separator(",")
                .with_list_parse_key("bootstrap_peers")
                .with_list_parse_key("dns_seeds"),
        );

        let settings: Settings = builder.build()?.try_deserialize()?;
        Ok(settings.into_config())
    }
}

/// Platform data directory, e.g. `~/.local/share/skiff/testnet`.
pub fn default_data_dir(network: NetworkType) -> PathBuf {
    dirs::data_dir()
        .unwrap_or_else(|| PathBuf::from("."))
        .join("skiff")
        .join(network.data_dir_suffix())
}

/// Flat on-disk shape. Absent keys fall back to the network's defaults.
#[derive(Debug, Default, Deserialize)]
#[serde(default)]
struct Settings {
    network: NetworkType,
    data_dir: Option<PathBuf>,
    log_level: Option<String>,
    port: Option<u16>,
    dns_seeds: Option<Vec<String>>,
    bootstrap_peers: Vec<SocketAddr>,
    max_peers: Option<usize>,
    request_timeout_ms: Option<u64>,
    tick_interval_ms: Option<u64>,
    connect_timeout_ms: Option<u64>,
    min_fee: Option<u64>,
    min_confirmations: Option<u64>,
    worker_interval_ms: Option<u64>,
    max_fee_attempts: Option<usize>,
}

impl Settings {
    fn into_config(self) -> ClientConfig {
        let mut cfg = ClientConfig::for_network(self.network);
        let net = &mut cfg.network;
        if let Some(port) = self.port {
            net.port = port;
        }
        if let Some(seeds) = self.dns_seeds {
            net.dns_seeds = seeds;
        }
        net.bootstrap_peers = self.bootstrap_peers;
        if let Some(n) = self.max_peers {
            net.max_peers = n;
        }
        if let Some(ms) = self.request_timeout_ms {
            net.request_timeout = Duration::from_millis(ms);
        }
        if let Some(ms) = self.tick_interval_ms {
            net.tick_interval = Duration::from_millis(ms);
        }
        if let Some(ms) = self.connect_timeout_ms {
            net.connect_timeout = Duration::from_millis(ms);
        }

        let wallet = &mut cfg.wallet;
        if let Some(fee) = self.min_fee {
            wallet.min_fee = fee;
        }
        if let Some(n) = self.min_confirmations {
            wallet.min_confirmations = n;
        }
        if let Some(ms) = self.worker_interval_ms {
            wallet.worker_interval = Duration::from_millis(ms);
        }
        if let Some(n) = self.max_fee_attempts {
            wallet.max_fee_attempts = n;
        }

        if let Some(dir) = self.data_dir {
            cfg.data_dir = dir;
        }
        if let Some(level) = self.log_level {
            cfg.log_level = level;
        }
        cfg
    }
}
