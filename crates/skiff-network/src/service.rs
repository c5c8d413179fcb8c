//! Shared sync state and the network service handle.
//!
//! [`SyncContext`] bundles the explicitly shared structures every peer task
//! and the scheduler work against. Each structure has its own lock and no
//! lock is held across an `.await`. Lock order, where nested: peer, chain,
//! ledgers, address book.
//!
//! [`NetworkService::start`] spawns the scheduler loop and returns a handle
//! used by the client to broadcast and to query pool status.

use crate::address_book::AddressBook;
use crate::config::NetworkConfig;
use crate::protocol::{InvItem, InvKind, Message};
use crate::scheduler::Scheduler;
use parking_lot::{Mutex, RwLock};
use skiff_core::error::ChainError;
use skiff_core::events::{ClientEvent, EventSender};
use skiff_core::header_chain::{ChainUpdate, HeaderChain};
use skiff_core::request_ledger::RequestLedger;
use skiff_core::traits::WalletFeed;
use skiff_core::types::{Block, BlockHeader, Transaction};
use std::sync::Arc;
use tokio::sync::watch;
use tokio::task::JoinHandle;
use tracing::{debug, info, warn};

/// Current Unix time in seconds.
pub fn unix_now() -> u64 {
    u64::try_from(chrono::Utc::now().timestamp()).unwrap_or(0)
}

/// Handles to all state shared between peers, the scheduler and the wallet.
#[derive(Clone)]
pub struct SyncContext {
    pub config: Arc<NetworkConfig>,
    pub chain: Arc<RwLock<HeaderChain>>,
    pub tx_ledger: Arc<Mutex<RequestLedger>>,
    pub block_ledger: Arc<Mutex<RequestLedger>>,
    pub wallet: Arc<dyn WalletFeed>,
    pub events: EventSender,
    pub address_book: Arc<Mutex<AddressBook>>,
}

impl std::fmt::Debug for SyncContext {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("SyncContext")
            .field("network", &self.config.network)
            .field("best_height", &self.chain.read().best_height())
            .finish_non_exhaustive()
    }
}

impl SyncContext {
    /// Fresh ledgers and an address book holding the configured bootstrap peers.
    pub fn new(
        config: NetworkConfig,
        chain: Arc<RwLock<HeaderChain>>,
        block_ledger: Arc<Mutex<RequestLedger>>,
        wallet: Arc<dyn WalletFeed>,
        events: EventSender,
    ) -> Self {
        let mut book = AddressBook::new();
        book.insert_many(config.bootstrap_peers.iter().copied());
        Self {
            config: Arc::new(config),
            chain,
            tx_ledger: Arc::new(Mutex::new(RequestLedger::new())),
            block_ledger,
            wallet,
            events,
            address_book: Arc::new(Mutex::new(book)),
        }
    }

    /// Post an event to the presentation layer. A closed receiver is ignored.
    pub fn emit(&self, event: ClientEvent) {
        let _ = self.events.send(event);
    }

    fn queue_refetch(&self, hashes: &[skiff_core::types::Hash256]) {
        if hashes.is_empty() {
            return;
        }
        let mut ledger = self.block_ledger.lock();
        for hash in hashes {
            ledger.requeue(*hash);
        }
        debug!(count = hashes.len(), "queued blocks for refetch");
    }

    fn after_update(&self, update: &ChainUpdate, height_before: u64, height_after: u64, synced: bool) {
        self.queue_refetch(&update.refetch);
        if !synced && height_after != height_before {
            self.emit(ClientEvent::SyncProgress { height: height_after });
        }
    }

    /// Append a headers batch and queue any refetches it causes.
    pub fn ingest_headers(&self, headers: &[BlockHeader], now: u64) -> Result<ChainUpdate, ChainError> {
        let (result, before, after, synced) = {
            let mut chain = self.chain.write();
            let before = chain.best_height();
            let result = chain.add_headers(headers, now);
            (result, before, chain.best_height(), chain.is_synced())
        };

        match &result {
            Ok(update) => {
                debug!(received = headers.len(), applied = update.extended.len(), height = after, "ingested headers");
                self.after_update(update, before, after, synced);
            }
            Err(e) => warn!(error = %e, received = headers.len(), "headers batch rejected"),
        }
        result
    }

    /// Verify a block and append its header.
    pub fn ingest_block(&self, block: &Block, now: u64) -> Result<ChainUpdate, ChainError> {
        let (result, before, after, synced) = {
            let mut chain = self.chain.write();
            let before = chain.best_height();
            let result = chain.add_block(block, now);
            (result, before, chain.best_height(), chain.is_synced())
        };
        if let Ok(update) = &result {
            self.after_update(update, before, after, synced);
        }
        result
    }

    /// Register announced items in the matching ledger. Returns how many were new.
    pub fn announce_inventory(&self, items: &[InvItem]) -> usize {
        let mut added = 0;
        {
            let mut txs = self.tx_ledger.lock();
            added += items
                .iter()
                .filter(|i| i.kind == InvKind::Tx)
                .filter(|i| txs.add_hash(i.hash))
                .count();
        }
        {
            let mut blocks = self.block_ledger.lock();
            added += items
                .iter()
                .filter(|i| i.kind == InvKind::Block)
                .filter(|i| blocks.add_hash(i.hash))
                .count();
        }
        added
    }
}

/// Running peer pool.
pub struct NetworkService {
    scheduler: Arc<Scheduler>,
    shutdown_tx: watch::Sender<bool>,
    task: Mutex<Option<JoinHandle<()>>>,
}

impl std::fmt::Debug for NetworkService {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("NetworkService")
            .field("peer_count", &self.scheduler.peer_count())
            .field("synced", &self.scheduler.is_synced())
            .finish()
    }
}

impl NetworkService {
    /// Spawn the scheduler loop. Must be called inside a tokio runtime.
    pub fn start(ctx: SyncContext) -> Self {
        info!(network = ?ctx.config.network, max_peers = ctx.config.max_peers, "starting peer pool");
        let (scheduler, pool_rx) = Scheduler::new(ctx);
        let scheduler = Arc::new(scheduler);
        let (shutdown_tx, shutdown_rx) = watch::channel(false);
        let task = tokio::spawn(Arc::clone(&scheduler).run(pool_rx, shutdown_rx));
        Self {
            scheduler,
            shutdown_tx,
            task: Mutex::new(Some(task)),
        }
    }

    /// Send `tx` to every ready peer. Returns the number reached.
    pub fn broadcast_transaction(&self, tx: Transaction) -> usize {
        let reached = self.scheduler.broadcast(Message::Tx(tx));
        info!(reached, "broadcast transaction");
        reached
    }

    pub fn peer_count(&self) -> usize {
        self.scheduler.peer_count()
    }

    pub fn is_synced(&self) -> bool {
        self.scheduler.is_synced()
    }

    pub fn scheduler(&self) -> &Arc<Scheduler> {
        &self.scheduler
    }

    /// Stop the scheduler and close every connection.
    pub async fn shutdown(&self) {
        let _ = self.shutdown_tx.send(true);
        let task = self.task.lock().take();
        if let Some(task) = task {
            if let Err(e) = task.await {
                warn!(error = %e, "scheduler task ended abnormally");
            }
        }
        self.scheduler.disconnect_all();
        info!("peer pool stopped");
    }
}
