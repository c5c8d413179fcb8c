//! Client composition.
//!
//! [`Client`] wires the header chain, the block ledger shared between the
//! peer pool and the confirmation worker, the wallet service and the peer
//! pool into one running light client. Everything the presentation layer
//! needs goes through its methods; progress arrives on the event channel
//! returned by [`Client::start`].

use std::sync::Arc;

use parking_lot::{Mutex, RwLock};
use tokio::sync::mpsc;
use tracing::{info, warn};

use skiff_core::address::Address;
use skiff_core::events::EventReceiver;
use skiff_core::header_chain::HeaderChain;
use skiff_core::request_ledger::RequestLedger;
use skiff_core::traits::{KeyStore, WalletFeed};
use skiff_core::types::Transaction;
use skiff_network::{NetworkService, SyncContext};
use skiff_wallet::{KeyChain, OutInfo, WalletService};

use crate::config::ClientConfig;
use crate::error::ClientError;

/// A running light client.
pub struct Client {
    config: ClientConfig,
    keys: Arc<KeyChain>,
    chain: Arc<RwLock<HeaderChain>>,
    wallet: Arc<WalletService>,
    network: NetworkService,
}

impl std::fmt::Debug for Client {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("Client")
            .field("network", &self.config.network_type())
            .field("best_height", &self.best_height())
            .field("peers", &self.peer_count())
            .finish_non_exhaustive()
    }
}

impl Client {
    /// Start the wallet workers and the peer pool.
    ///
    /// Must be called inside a tokio runtime. Keys are generated fresh for
    /// each run.
    pub fn start(config: ClientConfig) -> Result<(Self, EventReceiver), ClientError> {
        std::fs::create_dir_all(&config.data_dir)?;

        let network_type = config.network_type();
        let (events, event_rx) = mpsc::unbounded_channel();
        let keys = Arc::new(KeyChain::generate(network_type));
        let chain = Arc::new(RwLock::new(HeaderChain::new(network_type)));
        let block_ledger = Arc::new(Mutex::new(RequestLedger::new()));

        let wallet = WalletService::start(
            config.wallet.clone(),
            Arc::clone(&keys) as Arc<dyn KeyStore>,
            Arc::clone(&chain),
            Arc::clone(&block_ledger),
            events.clone(),
        );

        let ctx = SyncContext::new(
            config.network.clone(),
            Arc::clone(&chain),
            block_ledger,
            Arc::clone(&wallet) as Arc<dyn WalletFeed>,
            events,
        );
        let network = NetworkService::start(ctx);

        info!(
            network = ?network_type,
            data_dir = %config.data_dir.display(),
            "client started"
        );

        Ok((
            Self {
                config,
                keys,
                chain,
                wallet,
                network,
            },
            event_rx,
        ))
    }

    pub fn config(&self) -> &ClientConfig {
        &self.config
    }

    /// Sum of unspent outputs with at least `threshold` confirmations.
    pub fn get_balance(&self, threshold: u64) -> u64 {
        self.wallet.balance(threshold)
    }

    /// Every record paying `address`, placeholders included.
    pub fn get_outputs_by_address(&self, address: &str) -> Result<Vec<OutInfo>, ClientError> {
        let address = self.parse_address(address)?;
        Ok(self.wallet.outputs_by_address(&address))
    }

    /// Located outputs at least `n` deep, spent or not, shallowest first.
    pub fn get_outputs_by_confirmations(&self, n: u64) -> Vec<OutInfo> {
        self.wallet.outputs_by_confirmations(n)
    }

    /// Build and sign a payment of `amount` to `recipient`.
    ///
    /// The spent outputs are marked immediately. Hand the result to
    /// [`Client::broadcast`]; a peer rejection releases them again.
    pub fn create_transaction(
        &self,
        recipient: &str,
        amount: u64,
        fee: u64,
        threshold: u64,
    ) -> Result<Transaction, ClientError> {
        let recipient = self.parse_address(recipient)?;
        Ok(self.wallet.create_transaction(&recipient, amount, fee, threshold)?)
    }

    /// Relay `tx` to every ready peer. Returns how many were reached.
    pub fn broadcast(&self, tx: Transaction) -> Result<usize, ClientError> {
        match self.network.broadcast_transaction(tx) {
            0 => {
                warn!("broadcast reached no peers");
                Err(ClientError::NoPeers)
            }
            n => Ok(n),
        }
    }

    pub fn is_synced(&self) -> bool {
        self.network.is_synced()
    }

    pub fn peer_count(&self) -> usize {
        self.network.peer_count()
    }

    pub fn best_height(&self) -> u64 {
        self.chain.read().best_height()
    }

    pub fn addresses(&self) -> Vec<Address> {
        self.keys.addresses()
    }

    /// Create one more receiving address.
    pub fn new_address(&self) -> Address {
        self.keys.next_address()
    }

    /// Stop the peer pool, then the wallet workers.
    pub async fn shutdown(&self) {
        self.network.shutdown().await;
        self.wallet.shutdown().await;
        info!("client stopped");
    }

    fn parse_address(&self, s: &str) -> Result<Address, ClientError> {
        Address::decode_for(s, self.config.network_type()).map_err(|source| {
            ClientError::InvalidAddress {
                input: s.to_string(),
                source,
            }
        })
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use skiff_core::constants::{COIN, NetworkType};
    use skiff_core::error::AddressError;
    use skiff_core::types::Hash256;
    use skiff_wallet::WalletError;

    fn regtest_config(dir: &std::path::Path) -> ClientConfig {
        let mut cfg = ClientConfig::regtest();
        cfg.data_dir = dir.join("data");
        cfg
    }

    // --- Startup ---

    #[tokio::test]
    async fn start_creates_data_dir_and_address() {
        let dir = tempfile::tempdir().unwrap();
        let (client, _rx) = Client::start(regtest_config(dir.path())).unwrap();
        assert!(dir.path().join("data").is_dir());
        assert_eq!(client.addresses().len(), 1);
        assert_eq!(client.best_height(), 0);
        assert_eq!(client.get_balance(0), 0);
        assert!(!client.is_synced());
        client.shutdown().await;
    }

    #[tokio::test]
    async fn new_address_extends_key_set() {
        let dir = tempfile::tempdir().unwrap();
        let (client, _rx) = Client::start(regtest_config(dir.path())).unwrap();
        let addr = client.new_address();
        assert_eq!(addr.network(), NetworkType::Regtest);
        assert!(client.addresses().contains(&addr));
        client.shutdown().await;
    }

    // --- Payments ---

    #[tokio::test]
    async fn invalid_recipient_reported() {
        let dir = tempfile::tempdir().unwrap();
        let (client, _rx) = Client::start(regtest_config(dir.path())).unwrap();
        let err = client.create_transaction("not-an-address", COIN, 0, 1).unwrap_err();
        assert!(matches!(err, ClientError::InvalidAddress { .. }));

        let testnet = Address::from_pubkey_hash(Hash256([1; 32]), NetworkType::Testnet);
        let err = client
            .create_transaction(&testnet.to_string(), COIN, 0, 1)
            .unwrap_err();
        assert!(matches!(
            err,
            ClientError::InvalidAddress { source: AddressError::WrongNetwork, .. }
        ));
        client.shutdown().await;
    }

    #[tokio::test]
    async fn empty_wallet_cannot_pay() {
        let dir = tempfile::tempdir().unwrap();
        let (client, _rx) = Client::start(regtest_config(dir.path())).unwrap();
        let recipient = Address::from_pubkey_hash(Hash256([1; 32]), NetworkType::Regtest);
        let err = client
            .create_transaction(&recipient.to_string(), COIN, 0, 1)
            .unwrap_err();
        assert!(matches!(err, ClientError::Wallet(WalletError::InsufficientFunds { .. })));
        client.shutdown().await;
    }

    #[tokio::test]
    async fn broadcast_without_peers_fails() {
        let dir = tempfile::tempdir().unwrap();
        let (client, _rx) = Client::start(regtest_config(dir.path())).unwrap();
        let tx = Transaction {
            version: 1,
            inputs: vec![],
            outputs: vec![],
            lock_time: 0,
        };
        assert!(matches!(client.broadcast(tx), Err(ClientError::NoPeers)));
        client.shutdown().await;
    }

    #[tokio::test]
    async fn outputs_by_address_validates_input() {
        let dir = tempfile::tempdir().unwrap();
        let (client, _rx) = Client::start(regtest_config(dir.path())).unwrap();
        let own = client.addresses()[0].to_string();
        assert!(client.get_outputs_by_address(&own).unwrap().is_empty());
        assert!(client.get_outputs_by_address("bogus").is_err());
        assert!(client.get_outputs_by_confirmations(0).is_empty());
        client.shutdown().await;
    }
}
