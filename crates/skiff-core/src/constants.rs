//! Protocol constants and per-network parameters. Values in base units.

/// Base units per coin.
pub const COIN: u64 = 100_000_000;

/// Smallest amount a payment may send; relay policy rejects anything lower.
pub const MIN_NONDUST_OUTPUT: u64 = 546;

/// Change at or below this value is not worth an output and is left as fee.
pub const DUST_THRESHOLD: u64 = 1_000;

/// Default minimum fee per started 1000 bytes (0.0001 coin).
pub const DEFAULT_MIN_FEE: u64 = 10_000;

/// Outputs below this value (0.01 coin) make a fee mandatory.
pub const FEE_FREE_OUTPUT_MIN: u64 = COIN / 100;

/// Transactions above this many bytes must pay a fee.
pub const FREE_TX_MAX_SIZE: usize = 1_000;

/// Priority at or below which a transaction must pay a fee.
pub const PRIORITY_THRESHOLD: u64 = 57_600_000;

/// Maximum serialized transaction size in bytes.
pub const MAX_TX_SIZE: usize = 100_000;

/// Blocks may be timestamped at most this many seconds ahead of local time.
pub const MAX_FUTURE_BLOCK_TIME: u64 = 2 * 60 * 60;

/// Upper bound on headers in a single `Headers` message.
pub const MAX_HEADERS_PER_MESSAGE: usize = 2_000;

/// Upper bound on hashes in a block locator.
pub const MAX_LOCATOR_SIZE: usize = 101;

/// Upper bound on entries in one inventory announcement or data request.
pub const MAX_INV_ENTRIES: usize = 50_000;

/// Upper bound on addresses in one `Addr` message.
pub const MAX_ADDR_ENTRIES: usize = 1_000;

/// Number of recent best-chain heights kept for height lookups.
pub const RECENT_WINDOW: usize = 5_000;

/// Wire protocol version announced in the handshake.
pub const PROTOCOL_VERSION: u32 = 70_002;

/// Network selection.
///
/// Controls magic bytes, default port, DNS seeds, address version and genesis.
///
/// # Examples
///
/// ```
/// use skiff_core::constants::NetworkType;
/// let net = NetworkType::default();
/// assert_eq!(net, NetworkType::Testnet);
/// assert_eq!(net.magic_bytes(), *b"SKFT");
/// ```
#[derive(
    Debug, Clone, Copy, PartialEq, Eq, Hash, Default, serde::Serialize, serde::Deserialize,
)]
#[serde(rename_all = "lowercase")]
pub enum NetworkType {
    Mainnet,
    /// Public test network. The default, as spending real coins from a light client is opt-in.
    #[default]
    Testnet,
    /// Local network with trivial proof-of-work.
    Regtest,
}

impl NetworkType {
    /// Four-byte identifier prefixed to every wire frame.
    pub fn magic_bytes(&self) -> [u8; 4] {
        match self {
            Self::Mainnet => *b"SKFM",
            Self::Testnet => *b"SKFT",
            Self::Regtest => *b"SKFR",
        }
    }

    /// Default TCP port for P2P connections.
    ///
    /// ```
    /// use skiff_core::constants::NetworkType;
    /// assert_eq!(NetworkType::Mainnet.default_port(), 8533);
    /// ```
    pub fn default_port(&self) -> u16 {
        match self {
            Self::Mainnet => 8533,
            Self::Testnet => 18533,
            Self::Regtest => 28533,
        }
    }

    /// Bootstrap DNS names resolving to reachable peers.
    pub fn dns_seeds(&self) -> &'static [&'static str] {
        match self {
            Self::Mainnet => &["seed.skiff-spv.org", "seed2.skiff-spv.org"],
            Self::Testnet => &["testnet-seed.skiff-spv.org"],
            Self::Regtest => &[],
        }
    }

    /// Version byte prefixed to the pubkey hash in encoded addresses.
    pub fn address_version(&self) -> u8 {
        match self {
            Self::Mainnet => 0x1C,
            Self::Testnet => 0x6F,
            Self::Regtest => 0x7A,
        }
    }

    pub fn from_address_version(version: u8) -> Option<Self> {
        [Self::Mainnet, Self::Testnet, Self::Regtest]
            .into_iter()
            .find(|n| n.address_version() == version)
    }

    /// Subdirectory name appended to the base data directory.
    ///
    /// ```
    /// use skiff_core::constants::NetworkType;
    /// assert_eq!(NetworkType::Regtest.data_dir_suffix(), "regtest");
    /// ```
    pub fn data_dir_suffix(&self) -> &'static str {
        match self {
            Self::Mainnet => "mainnet",
            Self::Testnet => "testnet",
            Self::Regtest => "regtest",
        }
    }

    /// Difficulty target carried by this network's genesis header.
    pub fn genesis_target(&self) -> u64 {
        match self {
            Self::Mainnet => 0x0000_ffff_ffff_ffff,
            Self::Testnet => 0x00ff_ffff_ffff_ffff,
            Self::Regtest => u64::MAX,
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn fee_constants_match_policy() {
        assert_eq!(DEFAULT_MIN_FEE, 10_000);
        assert_eq!(FEE_FREE_OUTPUT_MIN, 1_000_000);
        assert!(MIN_NONDUST_OUTPUT < DUST_THRESHOLD);
    }

    #[test]
    fn networks_are_distinct() {
        let nets = [NetworkType::Mainnet, NetworkType::Testnet, NetworkType::Regtest];
        for a in nets {
            for b in nets {
                if a != b {
                    assert_ne!(a.magic_bytes(), b.magic_bytes());
                    assert_ne!(a.default_port(), b.default_port());
                    assert_ne!(a.address_version(), b.address_version());
                }
            }
        }
    }

    #[test]
    fn address_version_round_trip() {
        for net in [NetworkType::Mainnet, NetworkType::Testnet, NetworkType::Regtest] {
            assert_eq!(NetworkType::from_address_version(net.address_version()), Some(net));
        }
        assert_eq!(NetworkType::from_address_version(0xFF), None);
    }

    #[test]
    fn regtest_has_no_dns_seeds() {
        assert!(NetworkType::Regtest.dns_seeds().is_empty());
        assert!(!NetworkType::Testnet.dns_seeds().is_empty());
    }

    #[test]
    fn network_type_serde_lowercase() {
        let json = serde_json::to_string(&NetworkType::Regtest).unwrap();
        assert_eq!(json, "\"regtest\"");
    }
}
