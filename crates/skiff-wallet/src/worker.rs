//! Wallet service and its two background workers.
//!
//! Peers hand transactions and blocks to [`WalletService`] through the
//! [`WalletFeed`] seam. Both go onto unbounded queues drained by separate
//! tasks: the filter worker looks for payments to us, the confirmation
//! worker refreshes depths. Rejections are applied immediately.

use parking_lot::{Mutex, RwLock};
use std::sync::Arc;
use std::time::Duration;
use tokio::sync::{mpsc, watch};
use tokio::task::JoinHandle;
use tracing::{debug, info, warn};

use skiff_core::address::Address;
use skiff_core::events::{ClientEvent, EventSender};
use skiff_core::header_chain::HeaderChain;
use skiff_core::request_ledger::RequestLedger;
use skiff_core::traits::{KeyStore, WalletFeed};
use skiff_core::types::{Block, Hash256, Transaction};
use skiff_core::validation;

use crate::builder::TransactionBuilder;
use crate::config::WalletConfig;
use crate::error::WalletError;
use crate::tracker::{OutInfo, OutputTracker};

fn unix_now() -> u64 {
    u64::try_from(chrono::Utc::now().timestamp()).unwrap_or(0)
}

/// Filter one transaction and announce any funds it brings.
pub fn process_transaction(tracker: &Mutex<OutputTracker>, tx: &Transaction, events: &EventSender) -> usize {
    let created = tracker.lock().filter_transaction(tx);
    for record in &created {
        let _ = events.send(ClientEvent::FundsReceived {
            address: *record.address(),
            value: record.value(),
            txid: record.parent_txid(),
        });
    }
    created.len()
}

/// Verify a block and refresh confirmations from it.
///
/// A block failing verification is queued for another fetch; a skewed local
/// clock is the usual cause. Returns whether the block was applied.
pub fn process_block(
    tracker: &Mutex<OutputTracker>,
    chain: &RwLock<HeaderChain>,
    block_ledger: &Mutex<RequestLedger>,
    block: &Block,
    now: u64,
) -> bool {
    let hash = block.hash();
    if let Err(e) = validation::verify_block(block, now) {
        warn!(%hash, error = %e, "block failed verification, refetching");
        block_ledger.lock().requeue(hash);
        return false;
    }
    let chain = chain.read();
    tracker.lock().update_confirmations(block, &chain);
    debug!(%hash, "confirmations updated");
    true
}

async fn run_queue<T, F>(
    name: &'static str,
    mut rx: mpsc::UnboundedReceiver<T>,
    interval: Duration,
    mut shutdown: watch::Receiver<bool>,
    mut handle: F,
) where
    F: FnMut(T),
{
    let mut ticker = tokio::time::interval(interval);
    ticker.set_missed_tick_behavior(tokio::time::MissedTickBehavior::Skip);
    loop {
        tokio::select! {
            _ = ticker.tick() => {
                // One item at a time; a closed queue ends the worker.
                loop {
                    match rx.try_recv() {
                        Ok(item) => handle(item),
                        Err(mpsc::error::TryRecvError::Empty) => break,
                        Err(mpsc::error::TryRecvError::Disconnected) => {
                            debug!(worker = name, "queue closed");
                            return;
                        }
                    }
                }
            }
            changed = shutdown.changed() => {
                if changed.is_err() || *shutdown.borrow() {
                    break;
                }
            }
        }
    }
    debug!(worker = name, "stopped");
}

/// Drain the transaction queue into the relevance filter.
pub async fn run_filter_worker(
    tracker: Arc<Mutex<OutputTracker>>,
    rx: mpsc::UnboundedReceiver<Transaction>,
    events: EventSender,
    interval: Duration,
    shutdown: watch::Receiver<bool>,
) {
    run_queue("filter", rx, interval, shutdown, move |tx| {
        process_transaction(&tracker, &tx, &events);
    })
    .await;
}

/// Drain the block queue into the confirmation update.
pub async fn run_confirmation_worker(
    tracker: Arc<Mutex<OutputTracker>>,
    chain: Arc<RwLock<HeaderChain>>,
    block_ledger: Arc<Mutex<RequestLedger>>,
    rx: mpsc::UnboundedReceiver<Block>,
    interval: Duration,
    shutdown: watch::Receiver<bool>,
) {
    run_queue("confirmation", rx, interval, shutdown, move |block| {
        process_block(&tracker, &chain, &block_ledger, &block, unix_now());
    })
    .await;
}

/// The wallet: key store, output tracker and worker tasks.
pub struct WalletService {
    config: WalletConfig,
    keys: Arc<dyn KeyStore>,
    tracker: Arc<Mutex<OutputTracker>>,
    tx_queue: mpsc::UnboundedSender<Transaction>,
    block_queue: mpsc::UnboundedSender<Block>,
    events: EventSender,
    shutdown_tx: watch::Sender<bool>,
    tasks: Mutex<Vec<JoinHandle<()>>>,
}

impl std::fmt::Debug for WalletService {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("WalletService")
            .field("network", &self.config.network)
            .field("records", &self.tracker.lock().len())
            .finish_non_exhaustive()
    }
}

impl WalletService {
    /// Create the initial addresses and spawn both workers.
    ///
    /// Must be called inside a tokio runtime.
    pub fn start(
        config: WalletConfig,
        keys: Arc<dyn KeyStore>,
        chain: Arc<RwLock<HeaderChain>>,
        block_ledger: Arc<Mutex<RequestLedger>>,
        events: EventSender,
    ) -> Arc<Self> {
        if keys.addresses().is_empty() {
            for address in keys.create_addresses(config.initial_addresses) {
                info!(%address, "receiving address");
            }
        }

        let tracker = Arc::new(Mutex::new(OutputTracker::new(Arc::clone(&keys))));
        let (tx_queue, tx_rx) = mpsc::unbounded_channel();
        let (block_queue, block_rx) = mpsc::unbounded_channel();
        let (shutdown_tx, shutdown_rx) = watch::channel(false);

        let filter = tokio::spawn(run_filter_worker(
            Arc::clone(&tracker),
            tx_rx,
            events.clone(),
            config.worker_interval,
            shutdown_rx.clone(),
        ));
        let confirm = tokio::spawn(run_confirmation_worker(
            Arc::clone(&tracker),
            chain,
            block_ledger,
            block_rx,
            config.worker_interval,
            shutdown_rx,
        ));

        Arc::new(Self {
            config,
            keys,
            tracker,
            tx_queue,
            block_queue,
            events,
            shutdown_tx,
            tasks: Mutex::new(vec![filter, confirm]),
        })
    }

    pub fn config(&self) -> &WalletConfig {
        &self.config
    }

    pub fn keys(&self) -> &Arc<dyn KeyStore> {
        &self.keys
    }

    pub fn tracker(&self) -> &Arc<Mutex<OutputTracker>> {
        &self.tracker
    }

    pub fn balance(&self, threshold: u64) -> u64 {
        self.tracker.lock().balance(threshold)
    }

    pub fn outputs_by_address(&self, address: &Address) -> Vec<OutInfo> {
        self.tracker.lock().outputs_by_address(address)
    }

    pub fn outputs_by_confirmations(&self, n: u64) -> Vec<OutInfo> {
        self.tracker.lock().outputs_by_confirmations(n)
    }

    /// Build, sign and commit a payment.
    pub fn create_transaction(
        &self,
        recipient: &Address,
        amount: u64,
        fee: u64,
        threshold: u64,
    ) -> Result<Transaction, WalletError> {
        let mut tracker = self.tracker.lock();
        TransactionBuilder::new(self.keys.as_ref(), &self.config)
            .create_transaction(&mut tracker, recipient, amount, fee, threshold)
    }

    /// Stop both workers.
    pub async fn shutdown(&self) {
        let _ = self.shutdown_tx.send(true);
        let tasks: Vec<_> = self.tasks.lock().drain(..).collect();
        for task in tasks {
            if let Err(e) = task.await {
                warn!(error = %e, "wallet worker ended abnormally");
            }
        }
    }
}

impl WalletFeed for WalletService {
    fn queue_transaction(&self, tx: Transaction) {
        if self.tx_queue.send(tx).is_err() {
            debug!("filter worker stopped, transaction dropped");
        }
    }

    fn queue_block(&self, block: Block) {
        if self.block_queue.send(block).is_err() {
            debug!("confirmation worker stopped, block dropped");
        }
    }

    fn transaction_rejected(&self, txid: Hash256) {
        let released = self.tracker.lock().reset_spent_outputs(&txid);
        for (address, value) in released {
            let _ = self.events.send(ClientEvent::FundsReturned { address, value });
        }
    }
}
