//! Peer connection: handshake, per-message reactions and socket I/O.
//!
//! [`PeerConnection`] is the pure protocol state machine. It sits behind a
//! lock shared by the connection's I/O task, which feeds it inbound messages,
//! and the scheduler, which assigns it requests. [`spawn_connection`] runs the
//! socket: one task reads and reacts, one task drains the outbound queue.

use crate::protocol::{self, InvItem, InvKind, Message, VersionInfo};
use crate::service::{SyncContext, unix_now};
use parking_lot::Mutex;
use skiff_core::constants::PROTOCOL_VERSION;
use skiff_core::error::ChainError;
use skiff_core::events::ClientEvent;
use skiff_core::header_chain::HeaderChain;
use skiff_core::types::Hash256;
use std::net::SocketAddr;
use std::sync::Arc;
use std::time::Instant;
use tokio::net::TcpStream;
use tokio::sync::mpsc;
use tracing::{debug, info, warn};

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ConnectionState {
    Connecting,
    Handshaking,
    Ready,
    Disconnected,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum RequestKind {
    Transaction,
    Block,
    Headers,
}

impl From<InvKind> for RequestKind {
    fn from(kind: InvKind) -> Self {
        match kind {
            InvKind::Tx => RequestKind::Transaction,
            InvKind::Block => RequestKind::Block,
        }
    }
}

/// The single outstanding request of a connection.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct PendingRequest {
    /// Requested item, or for headers the local head at dispatch time.
    pub hash: Hash256,
    pub kind: RequestKind,
    pub issued_at: Instant,
}

/// What the I/O task must do after a message was handled.
#[derive(Debug, Default)]
pub struct Reaction {
    pub replies: Vec<Message>,
    /// The handshake just completed.
    pub became_ready: bool,
    /// Close the socket.
    pub disconnect: bool,
}

/// Per-peer protocol state.
#[derive(Debug)]
pub struct PeerConnection {
    addr: SocketAddr,
    state: ConnectionState,
    height: u64,
    user_agent: String,
    local_nonce: u64,
    version_received: bool,
    verack_received: bool,
    sync_complete: bool,
    pending: Option<PendingRequest>,
}

impl PeerConnection {
    pub fn new(addr: SocketAddr) -> Self {
        Self {
            addr,
            state: ConnectionState::Connecting,
            height: 0,
            user_agent: String::new(),
            local_nonce: rand::random(),
            version_received: false,
            verack_received: false,
            sync_complete: false,
            pending: None,
        }
    }

    pub fn addr(&self) -> SocketAddr {
        self.addr
    }

    pub fn state(&self) -> ConnectionState {
        self.state
    }

    pub fn is_ready(&self) -> bool {
        self.state == ConnectionState::Ready
    }

    /// Counts toward pool capacity.
    pub fn is_active(&self) -> bool {
        self.state != ConnectionState::Disconnected
    }

    /// Height the peer advertised in its version message.
    pub fn height(&self) -> u64 {
        self.height
    }

    pub fn user_agent(&self) -> &str {
        &self.user_agent
    }

    pub fn sync_complete(&self) -> bool {
        self.sync_complete
    }

    pub fn set_sync_complete(&mut self, complete: bool) {
        self.sync_complete = complete;
    }

    pub fn pending(&self) -> Option<&PendingRequest> {
        self.pending.as_ref()
    }

    pub fn set_pending(&mut self, request: PendingRequest) {
        self.pending = Some(request);
    }

    pub fn clear_pending(&mut self) -> Option<PendingRequest> {
        self.pending.take()
    }

    pub fn mark_disconnected(&mut self) {
        self.state = ConnectionState::Disconnected;
    }

    /// Socket established: move to handshaking and build our version.
    pub fn on_connected(&mut self, ctx: &SyncContext) -> Message {
        self.state = ConnectionState::Handshaking;
        Message::Version(VersionInfo {
            version: PROTOCOL_VERSION,
            user_agent: ctx.config.user_agent.clone(),
            start_height: ctx.chain.read().best_height(),
            nonce: self.local_nonce,
            timestamp: unix_now(),
        })
    }

    /// Ask this peer for the headers after our locator.
    ///
    /// Marks the pool-wide headers flag and records the current head as the
    /// pending target. Fails without side effects if the locator cannot be built.
    pub fn request_headers(
        &mut self,
        chain: &mut HeaderChain,
        now: Instant,
    ) -> Result<Message, ChainError> {
        let locator = chain.locator()?;
        chain.set_headers_pending(true);
        self.pending = Some(PendingRequest {
            hash: chain.head(),
            kind: RequestKind::Headers,
            issued_at: now,
        });
        Ok(Message::GetHeaders {
            locator,
            stop_hash: Hash256::ZERO,
        })
    }

    /// Ask this peer for one transaction or block.
    pub fn request_item(&mut self, item: InvItem, now: Instant) -> Message {
        self.pending = Some(PendingRequest {
            hash: item.hash,
            kind: item.kind.into(),
            issued_at: now,
        });
        Message::GetData(vec![item])
    }

    fn pending_matches(&self, kind: RequestKind, hash: &Hash256) -> bool {
        self.pending
            .is_some_and(|p| p.kind == kind && p.hash == *hash)
    }

    fn try_complete_handshake(&mut self, ctx: &SyncContext, reaction: &mut Reaction) {
        if self.state != ConnectionState::Handshaking || !(self.version_received && self.verack_received) {
            return;
        }
        self.state = ConnectionState::Ready;
        reaction.became_ready = true;
        reaction.replies.push(Message::GetAddr);
        info!(addr = %self.addr, height = self.height, agent = %self.user_agent, "peer ready");
        ctx.emit(ClientEvent::PeerConnected {
            addr: self.addr,
            height: self.height,
        });
    }

    /// React to one inbound message. `now` is Unix seconds for header checks.
    pub fn handle_message(&mut self, msg: Message, ctx: &SyncContext, now: u64) -> Reaction {
        let mut reaction = Reaction::default();

        match msg {
            Message::Version(info) => {
                if info.nonce == self.local_nonce {
                    warn!(addr = %self.addr, "connected to self");
                    reaction.disconnect = true;
                    return reaction;
                }
                self.height = info.start_height;
                self.user_agent = info.user_agent;
                self.version_received = true;
                reaction.replies.push(Message::Verack);
                self.try_complete_handshake(ctx, &mut reaction);
            }
            Message::Verack => {
                self.verack_received = true;
                self.try_complete_handshake(ctx, &mut reaction);
            }
            Message::Ping(nonce) => reaction.replies.push(Message::Pong(nonce)),
            Message::Pong(_) | Message::GetAddr | Message::GetData(_) | Message::GetHeaders { .. } => {
                debug!(addr = %self.addr, command = msg.command(), "ignored request");
            }
            Message::Addr(addrs) => {
                let added = ctx
                    .address_book
                    .lock()
                    .insert_many(addrs.into_iter().map(SocketAddr::from));
                debug!(addr = %self.addr, added, "received addresses");
            }
            Message::Headers(headers) => self.on_headers(&headers, ctx, now),
            Message::Tx(tx) => match tx.txid() {
                Ok(txid) => {
                    if self.pending_matches(RequestKind::Transaction, &txid) {
                        ctx.tx_ledger.lock().mark_done(&txid);
                        self.pending = None;
                    }
                    ctx.wallet.queue_transaction(tx);
                }
                Err(e) => warn!(addr = %self.addr, error = %e, "undecodable transaction"),
            },
            Message::Block(block) => {
                if let Some(reply) = self.on_block(block, ctx, now) {
                    reaction.replies.push(reply);
                }
            }
            Message::Inv(items) => {
                let added = ctx.announce_inventory(&items);
                debug!(addr = %self.addr, announced = items.len(), added, "inventory");
            }
            Message::Reject(info) => {
                if info.message == "tx" {
                    warn!(addr = %self.addr, txid = %info.hash, code = info.code, reason = %info.reason, "transaction rejected");
                    ctx.emit(ClientEvent::TransactionRejected {
                        txid: info.hash,
                        code: info.code,
                        reason: info.reason,
                    });
                    ctx.wallet.transaction_rejected(info.hash);
                } else {
                    debug!(addr = %self.addr, message = %info.message, reason = %info.reason, "peer rejected message");
                }
            }
        }

        reaction
    }

    fn on_headers(&mut self, headers: &[skiff_core::types::BlockHeader], ctx: &SyncContext, now: u64) {
        if let Some(pending) = self.pending.filter(|p| p.kind == RequestKind::Headers) {
            match headers.first() {
                Some(first) if first.prev_hash == pending.hash => self.pending = None,
                None => {
                    // An empty answer means the peer has nothing past our locator.
                    self.pending = None;
                    self.sync_complete = true;
                    ctx.chain.write().set_headers_pending(false);
                    return;
                }
                Some(_) => {}
            }
        }
        if headers.is_empty() {
            return;
        }
        if ctx.ingest_headers(headers, now).is_ok() {
            let best = ctx.chain.read().best_height();
            self.height = self.height.max(best);
        }
    }

    fn on_block(&mut self, block: skiff_core::types::Block, ctx: &SyncContext, now: u64) -> Option<Message> {
        let hash = block.hash();
        if self.pending_matches(RequestKind::Block, &hash) {
            ctx.block_ledger.lock().mark_done(&hash);
            self.pending = None;
        }

        let prev_hash = block.header.prev_hash;
        let header_known = ctx.chain.read().contains(&hash);
        let appended = if header_known {
            Ok(Default::default())
        } else {
            ctx.ingest_block(&block, now)
        };
        // Queue after appending so the confirmation worker sees the new depth.
        ctx.wallet.queue_block(block);
        let err = appended.err()?;
        let mut chain = ctx.chain.write();
        if prev_hash == chain.head() || chain.headers_pending() || self.pending.is_some() {
            debug!(addr = %self.addr, %hash, error = %err, "block not appended");
            return None;
        }

        info!(addr = %self.addr, %hash, "block does not connect, requesting headers");
        match self.request_headers(&mut chain, Instant::now()) {
            Ok(msg) => Some(msg),
            Err(e) => {
                warn!(error = %e, "cannot build locator");
                None
            }
        }
    }
}

/// Scheduler-side handle to a connection.
#[derive(Debug, Clone)]
pub struct PeerHandle {
    addr: SocketAddr,
    conn: Arc<Mutex<PeerConnection>>,
    outbound: mpsc::UnboundedSender<Message>,
}

impl PeerHandle {
    /// A handle and the receiving end of its outbound queue.
    pub fn new(addr: SocketAddr) -> (Self, mpsc::UnboundedReceiver<Message>) {
        let (outbound, rx) = mpsc::unbounded_channel();
        let handle = Self {
            addr,
            conn: Arc::new(Mutex::new(PeerConnection::new(addr))),
            outbound,
        };
        (handle, rx)
    }

    pub fn addr(&self) -> SocketAddr {
        self.addr
    }

    pub fn connection(&self) -> &Arc<Mutex<PeerConnection>> {
        &self.conn
    }

    /// Queue a message for sending. Returns false if the connection is gone.
    pub fn send(&self, msg: Message) -> bool {
        self.outbound.send(msg).is_ok()
    }
}

/// Pool notifications from connection tasks to the scheduler.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum PoolEvent {
    Ready(SocketAddr),
    Closed(SocketAddr),
}

/// Dial `addr` and run the connection until either side closes it.
pub fn spawn_connection(
    addr: SocketAddr,
    ctx: SyncContext,
    pool_tx: mpsc::UnboundedSender<PoolEvent>,
) -> PeerHandle {
    let (handle, outbound_rx) = PeerHandle::new(addr);
    tokio::spawn(run_connection(handle.clone(), outbound_rx, ctx, pool_tx));
    handle
}

async fn run_connection(
    handle: PeerHandle,
    mut outbound_rx: mpsc::UnboundedReceiver<Message>,
    ctx: SyncContext,
    pool_tx: mpsc::UnboundedSender<PoolEvent>,
) {
    let addr = handle.addr;
    let magic = ctx.config.magic();

    let stream = match tokio::time::timeout(ctx.config.connect_timeout, TcpStream::connect(addr)).await {
        Ok(Ok(stream)) => stream,
        Ok(Err(e)) => {
            debug!(%addr, error = %e, "connect failed");
            handle.conn.lock().mark_disconnected();
            let _ = pool_tx.send(PoolEvent::Closed(addr));
            return;
        }
        Err(_) => {
            debug!(%addr, "connect timed out");
            handle.conn.lock().mark_disconnected();
            let _ = pool_tx.send(PoolEvent::Closed(addr));
            return;
        }
    };

    let version = handle.conn.lock().on_connected(&ctx);
    handle.send(version);
    let (mut reader, mut writer) = stream.into_split();

    let mut write_task = tokio::spawn(async move {
        while let Some(msg) = outbound_rx.recv().await {
            if let Err(e) = protocol::write_message(&mut writer, magic, &msg).await {
                debug!(%addr, error = %e, "write failed");
                break;
            }
        }
    });

    let read_handle = handle.clone();
    let read_ctx = ctx.clone();
    let read_pool = pool_tx.clone();
    let mut read_task = tokio::spawn(async move {
        loop {
            let msg = match protocol::read_message(&mut reader, magic).await {
                Ok(msg) => msg,
                Err(e) => {
                    debug!(%addr, error = %e, "read ended");
                    break;
                }
            };
            let reaction = read_handle
                .conn
                .lock()
                .handle_message(msg, &read_ctx, unix_now());
            for reply in reaction.replies {
                read_handle.send(reply);
            }
            if reaction.became_ready {
                let _ = read_pool.send(PoolEvent::Ready(addr));
            }
            if reaction.disconnect {
                break;
            }
        }
    });

    tokio::select! {
        _ = &mut read_task => write_task.abort(),
        _ = &mut write_task => read_task.abort(),
    }

    let was_ready = {
        let mut conn = handle.conn.lock();
        let was_ready = conn.is_ready();
        conn.mark_disconnected();
        was_ready
    };
    if was_ready {
        info!(%addr, "peer disconnected");
        ctx.emit(ClientEvent::PeerDisconnected { addr });
    }
    let _ = pool_tx.send(PoolEvent::Closed(addr));
}
