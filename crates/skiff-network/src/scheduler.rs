//! Peer-pool scheduler.
//!
//! Each tick expires overdue requests, prunes dead connections, hands every
//! idle ready peer at most one request and tops the pool back up. Priority is
//! strict: headers while the chain is not synced, then transactions, then
//! blocks.

use crate::address_book;
use crate::peer::{self, PeerHandle, PoolEvent, RequestKind};
use crate::protocol::{InvItem, Message};
use crate::service::SyncContext;
use parking_lot::Mutex;
use skiff_core::events::ClientEvent;
use std::collections::HashMap;
use std::net::SocketAddr;
use std::sync::Arc;
use std::sync::atomic::{AtomicBool, Ordering};
use std::time::Instant;
use tokio::sync::{mpsc, watch};
use tokio::time::MissedTickBehavior;
use tracing::{debug, info, warn};

pub struct Scheduler {
    ctx: SyncContext,
    peers: Mutex<HashMap<SocketAddr, PeerHandle>>,
    pool_tx: mpsc::UnboundedSender<PoolEvent>,
    last_reseed: Mutex<Option<Instant>>,
    reseeding: Arc<AtomicBool>,
}

impl std::fmt::Debug for Scheduler {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("Scheduler")
            .field("connections", &self.peers.lock().len())
            .finish_non_exhaustive()
    }
}

impl Scheduler {
    /// A scheduler and the receiver its connections report to.
    pub fn new(ctx: SyncContext) -> (Self, mpsc::UnboundedReceiver<PoolEvent>) {
        let (pool_tx, pool_rx) = mpsc::unbounded_channel();
        let scheduler = Self {
            ctx,
            peers: Mutex::new(HashMap::new()),
            pool_tx,
            last_reseed: Mutex::new(None),
            reseeding: Arc::new(AtomicBool::new(false)),
        };
        (scheduler, pool_rx)
    }

    pub fn context(&self) -> &SyncContext {
        &self.ctx
    }

    fn handles(&self) -> Vec<PeerHandle> {
        self.peers.lock().values().cloned().collect()
    }

    /// Run one scheduling round.
    pub fn tick(&self, now: Instant) {
        let handles = self.handles();
        self.expire_requests(&handles, now);
        self.prune();
        self.assign_work(&handles, now);
        self.replenish();
    }

    fn expire_requests(&self, handles: &[PeerHandle], now: Instant) {
        let timeout = self.ctx.config.request_timeout;
        for handle in handles {
            let mut conn = handle.connection().lock();
            let overdue = conn
                .pending()
                .is_some_and(|p| now.saturating_duration_since(p.issued_at) >= timeout);
            if !overdue {
                continue;
            }
            let Some(request) = conn.clear_pending() else {
                continue;
            };
            debug!(addr = %handle.addr(), kind = ?request.kind, hash = %request.hash, "request timed out");
            match request.kind {
                RequestKind::Headers => self.ctx.chain.write().set_headers_pending(false),
                RequestKind::Transaction => {
                    self.ctx.tx_ledger.lock().mark_failed(&request.hash);
                }
                RequestKind::Block => {
                    self.ctx.block_ledger.lock().mark_failed(&request.hash);
                }
            }
        }
    }

    /// Drop closed connections whose requests have been returned.
    fn prune(&self) {
        self.peers.lock().retain(|addr, handle| {
            let conn = handle.connection().lock();
            let keep = conn.is_active() || conn.pending().is_some();
            if !keep {
                debug!(%addr, "pruned connection");
            }
            keep
        });
    }

    fn assign_work(&self, handles: &[PeerHandle], now: Instant) {
        let mut ready = 0usize;
        let mut complete = 0usize;

        for handle in handles {
            let mut conn = handle.connection().lock();
            if !conn.is_ready() {
                continue;
            }
            ready += 1;

            if !self.ctx.chain.read().is_synced() && !conn.sync_complete() {
                if conn.pending().is_some() {
                    continue;
                }
                let mut chain = self.ctx.chain.write();
                if conn.height() <= chain.best_height() {
                    conn.set_sync_complete(true);
                    debug!(addr = %handle.addr(), height = conn.height(), "peer has no more headers");
                } else {
                    if !chain.headers_pending() {
                        match conn.request_headers(&mut chain, now) {
                            Ok(msg) => {
                                debug!(addr = %handle.addr(), from = chain.best_height(), "requesting headers");
                                handle.send(msg);
                            }
                            Err(e) => warn!(error = %e, "cannot build locator"),
                        }
                    }
                    continue;
                }
            }
            if conn.sync_complete() {
                complete += 1;
            }

            // Content waits until every ready peer has run out of headers.
            if conn.pending().is_some() || !self.ctx.chain.read().is_synced() {
                continue;
            }
            let next = self
                .ctx
                .tx_ledger
                .lock()
                .next_hash()
                .map(InvItem::tx)
                .or_else(|| self.ctx.block_ledger.lock().next_hash().map(InvItem::block));
            if let Some(item) = next {
                debug!(addr = %handle.addr(), kind = ?item.kind, hash = %item.hash, "dispatching request");
                handle.send(conn.request_item(item, now));
            }
        }

        if ready > 0 && complete == ready {
            let mut chain = self.ctx.chain.write();
            if !chain.is_synced() {
                chain.set_synced(true);
                let height = chain.best_height();
                drop(chain);
                info!(height, peers = ready, "header chain synced");
                self.ctx.emit(ClientEvent::Synced);
            }
        }
    }

    /// Dial candidates until the pool is full or the address book is empty.
    pub fn replenish(&self) {
        let mut peers = self.peers.lock();
        let mut active = peers
            .values()
            .filter(|h| h.connection().lock().is_active())
            .count();

        while active < self.ctx.config.max_peers {
            let Some(addr) = self.ctx.address_book.lock().pop() else {
                drop(peers);
                self.maybe_reseed();
                return;
            };
            if peers.contains_key(&addr) {
                continue;
            }
            debug!(%addr, "dialing");
            let handle = peer::spawn_connection(addr, self.ctx.clone(), self.pool_tx.clone());
            peers.insert(addr, handle);
            active += 1;
        }
    }

    /// Refill the address book from DNS, at most once per reseed interval.
    fn maybe_reseed(&self) {
        if self.ctx.config.dns_seeds.is_empty() && self.ctx.config.bootstrap_peers.is_empty() {
            return;
        }
        {
            let mut last = self.last_reseed.lock();
            if (*last).is_some_and(|t| t.elapsed() < self.ctx.config.reseed_interval) {
                return;
            }
            if self.reseeding.swap(true, Ordering::AcqRel) {
                return;
            }
            *last = Some(Instant::now());
        }

        let book = Arc::clone(&self.ctx.address_book);
        let config = Arc::clone(&self.ctx.config);
        let reseeding = Arc::clone(&self.reseeding);
        tokio::spawn(async move {
            let added = address_book::seed_from_dns(
                &book,
                &config.dns_seeds,
                config.port,
                &config.bootstrap_peers,
            )
            .await;
            info!(added, "reseeded address book");
            reseeding.store(false, Ordering::Release);
        });
    }

    /// A connection finished its handshake: fill any remaining capacity.
    pub fn register_ready(&self, addr: SocketAddr) {
        debug!(%addr, "peer registered");
        self.replenish();
    }

    /// Queue `msg` on every ready connection. Returns the number reached.
    pub fn broadcast(&self, msg: Message) -> usize {
        self.handles()
            .iter()
            .filter(|h| h.connection().lock().is_ready())
            .filter(|h| h.send(msg.clone()))
            .count()
    }

    /// Number of connections that completed the handshake.
    pub fn peer_count(&self) -> usize {
        self.handles()
            .iter()
            .filter(|h| h.connection().lock().is_ready())
            .count()
    }

    pub fn is_synced(&self) -> bool {
        self.ctx.chain.read().is_synced()
    }

    /// Close every connection by dropping its handle.
    pub fn disconnect_all(&self) {
        let drained: Vec<_> = self.peers.lock().drain().collect();
        for (_, handle) in drained {
            handle.connection().lock().mark_disconnected();
        }
    }

    #[cfg(test)]
    fn insert_peer(&self, handle: PeerHandle) {
        self.peers.lock().insert(handle.addr(), handle);
    }

    /// Tick until `shutdown` flips to true.
    pub async fn run(
        self: Arc<Self>,
        mut pool_rx: mpsc::UnboundedReceiver<PoolEvent>,
        mut shutdown: watch::Receiver<bool>,
    ) {
        if self.ctx.address_book.lock().is_empty() {
            address_book::seed_from_dns(
                &self.ctx.address_book,
                &self.ctx.config.dns_seeds,
                self.ctx.config.port,
                &self.ctx.config.bootstrap_peers,
            )
            .await;
            *self.last_reseed.lock() = Some(Instant::now());
        }
        self.replenish();

        let mut ticker = tokio::time::interval(self.ctx.config.tick_interval);
        ticker.set_missed_tick_behavior(MissedTickBehavior::Skip);

        loop {
            tokio::select! {
                _ = ticker.tick() => self.tick(Instant::now()),
                Some(event) = pool_rx.recv() => match event {
                    PoolEvent::Ready(addr) => self.register_ready(addr),
                    PoolEvent::Closed(addr) => {
                        debug!(%addr, "connection closed");
                        self.replenish();
                    }
                },
                changed = shutdown.changed() => {
                    if changed.is_err() || *shutdown.borrow() {
                        break;
                    }
                }
            }
        }
        debug!("scheduler loop stopped");
    }
}
