//! Wire messages and framing for the Skiff peer protocol.
//!
//! Every frame is `magic(4) || payload length (u32 BE) || checksum(4) ||
//! payload`, where the checksum is the first four bytes of the payload's
//! double SHA-256 and the payload is the bincode encoding of a [`Message`].

use sha2::{Digest, Sha256};
use skiff_core::constants::{
    MAX_ADDR_ENTRIES, MAX_HEADERS_PER_MESSAGE, MAX_INV_ENTRIES, MAX_LOCATOR_SIZE,
};
use skiff_core::error::NetworkError;
use skiff_core::types::{Block, BlockHeader, Hash256, Transaction};
use std::net::{IpAddr, Ipv6Addr, SocketAddr};
use tokio::io::{AsyncRead, AsyncReadExt, AsyncWrite, AsyncWriteExt};

/// Largest accepted payload.
pub const MAX_MESSAGE_SIZE: usize = 4 * 1024 * 1024;

/// Bytes before the payload: magic, length, checksum.
pub const FRAME_HEADER_SIZE: usize = 12;

/// Reject reason codes, matching the reference network.
pub mod reject_code {
    pub const MALFORMED: u8 = 0x01;
    pub const INVALID: u8 = 0x10;
    pub const DUPLICATE: u8 = 0x12;
    pub const NONSTANDARD: u8 = 0x40;
    pub const DUST: u8 = 0x41;
    pub const INSUFFICIENT_FEE: u8 = 0x42;
}

fn wire_config() -> impl bincode::config::Config {
    bincode::config::standard().with_limit::<{ MAX_MESSAGE_SIZE }>()
}

/// Handshake announcement.
#[derive(Debug, Clone, PartialEq, Eq, bincode::Encode, bincode::Decode)]
pub struct VersionInfo {
    pub version: u32,
    pub user_agent: String,
    /// Best chain height of the sender.
    pub start_height: u64,
    /// Random value for self-connection detection.
    pub nonce: u64,
    /// Sender's clock, Unix seconds.
    pub timestamp: u64,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, bincode::Encode, bincode::Decode)]
pub enum InvKind {
    Tx,
    Block,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, bincode::Encode, bincode::Decode)]
pub struct InvItem {
    pub kind: InvKind,
    pub hash: Hash256,
}

impl InvItem {
    pub fn tx(hash: Hash256) -> Self {
        Self { kind: InvKind::Tx, hash }
    }

    pub fn block(hash: Hash256) -> Self {
        Self { kind: InvKind::Block, hash }
    }
}

/// A peer refusing something we sent.
#[derive(Debug, Clone, PartialEq, Eq, bincode::Encode, bincode::Decode)]
pub struct RejectInfo {
    /// Command of the refused message, e.g. `"tx"`.
    pub message: String,
    pub code: u8,
    pub reason: String,
    /// Hash of the refused item, zero if not applicable.
    pub hash: Hash256,
}

/// A peer address as carried on the wire: IPv6 or IPv4-mapped, plus port.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, bincode::Encode, bincode::Decode)]
pub struct PeerAddress {
    pub ip: [u8; 16],
    pub port: u16,
}

impl From<SocketAddr> for PeerAddress {
    fn from(addr: SocketAddr) -> Self {
        let ip = match addr.ip() {
            IpAddr::V4(v4) => v4.to_ipv6_mapped(),
            IpAddr::V6(v6) => v6,
        };
        Self {
            ip: ip.octets(),
            port: addr.port(),
        }
    }
}

impl From<PeerAddress> for SocketAddr {
    fn from(addr: PeerAddress) -> Self {
        let v6 = Ipv6Addr::from(addr.ip);
        let ip = match v6.to_ipv4_mapped() {
            Some(v4) => IpAddr::V4(v4),
            None => IpAddr::V6(v6),
        };
        SocketAddr::new(ip, addr.port)
    }
}

/// Every message a Skiff peer can send or receive.
#[derive(Debug, Clone, PartialEq, Eq, bincode::Encode, bincode::Decode)]
pub enum Message {
    Version(VersionInfo),
    Verack,
    Ping(u64),
    Pong(u64),
    GetAddr,
    Addr(Vec<PeerAddress>),
    Inv(Vec<InvItem>),
    GetData(Vec<InvItem>),
    /// Ask for headers following the first locator hash the peer knows.
    GetHeaders {
        locator: Vec<Hash256>,
        /// Zero for "as many as allowed".
        stop_hash: Hash256,
    },
    Headers(Vec<BlockHeader>),
    Tx(Transaction),
    Block(Block),
    Reject(RejectInfo),
}

impl Message {
    /// Short command name for logs and reject notices.
    pub fn command(&self) -> &'static str {
        match self {
            Message::Version(_) => "version",
            Message::Verack => "verack",
            Message::Ping(_) => "ping",
            Message::Pong(_) => "pong",
            Message::GetAddr => "getaddr",
            Message::Addr(_) => "addr",
            Message::Inv(_) => "inv",
            Message::GetData(_) => "getdata",
            Message::GetHeaders { .. } => "getheaders",
            Message::Headers(_) => "headers",
            Message::Tx(_) => "tx",
            Message::Block(_) => "block",
            Message::Reject(_) => "reject",
        }
    }

    /// Enforce per-message list limits.
    pub fn validate(&self) -> Result<(), NetworkError> {
        let (what, size, max) = match self {
            Message::GetHeaders { locator, .. } => ("locator", locator.len(), MAX_LOCATOR_SIZE),
            Message::Headers(h) => ("headers", h.len(), MAX_HEADERS_PER_MESSAGE),
            Message::Inv(items) => ("inv", items.len(), MAX_INV_ENTRIES),
            Message::GetData(items) => ("getdata", items.len(), MAX_INV_ENTRIES),
            Message::Addr(addrs) => ("addr", addrs.len(), MAX_ADDR_ENTRIES),
            _ => return Ok(()),
        };
        if size > max {
            return Err(NetworkError::LimitExceeded { what, size, max });
        }
        Ok(())
    }
}

fn checksum(payload: &[u8]) -> [u8; 4] {
    let digest = Sha256::digest(Sha256::digest(payload));
    let mut out = [0u8; 4];
    out.copy_from_slice(&digest[..4]);
    out
}

/// Encode `msg` into a complete frame.
pub fn encode_frame(msg: &Message, magic: [u8; 4]) -> Result<Vec<u8>, NetworkError> {
    msg.validate()?;
    let payload = bincode::encode_to_vec(msg, wire_config())
        .map_err(|e| NetworkError::Codec(e.to_string()))?;
    if payload.len() > MAX_MESSAGE_SIZE {
        return Err(NetworkError::MessageTooLarge { size: payload.len() });
    }

    let mut frame = Vec::with_capacity(FRAME_HEADER_SIZE + payload.len());
    frame.extend_from_slice(&magic);
    frame.extend_from_slice(&(payload.len() as u32).to_be_bytes());
    frame.extend_from_slice(&checksum(&payload));
    frame.extend_from_slice(&payload);
    Ok(frame)
}

/// Split a frame header into payload length and checksum.
fn parse_header(
    header: &[u8; FRAME_HEADER_SIZE],
    magic: [u8; 4],
) -> Result<(usize, [u8; 4]), NetworkError> {
    if header[..4] != magic {
        return Err(NetworkError::InvalidMagic);
    }
    let len = u32::from_be_bytes([header[4], header[5], header[6], header[7]]) as usize;
    if len > MAX_MESSAGE_SIZE {
        return Err(NetworkError::MessageTooLarge { size: len });
    }
    Ok((len, [header[8], header[9], header[10], header[11]]))
}

fn decode_payload(payload: &[u8], expected: [u8; 4]) -> Result<Message, NetworkError> {
    if checksum(payload) != expected {
        return Err(NetworkError::InvalidChecksum);
    }
    let (msg, _): (Message, usize) = bincode::decode_from_slice(payload, wire_config())
        .map_err(|e| NetworkError::Codec(e.to_string()))?;
    msg.validate()?;
    Ok(msg)
}

/// Decode one complete frame. Trailing bytes are an error.
pub fn decode_frame(frame: &[u8], magic: [u8; 4]) -> Result<Message, NetworkError> {
    let header: &[u8; FRAME_HEADER_SIZE] = frame
        .get(..FRAME_HEADER_SIZE)
        .and_then(|h| h.try_into().ok())
        .ok_or_else(|| NetworkError::Codec("truncated frame header".into()))?;
    let (len, expected) = parse_header(header, magic)?;
    let payload = &frame[FRAME_HEADER_SIZE..];
    if payload.len() != len {
        return Err(NetworkError::Codec(format!(
            "payload length {} does not match header {len}",
            payload.len()
        )));
    }
    decode_payload(payload, expected)
}

/// Read one framed message. Not cancel-safe.
pub async fn read_message<R>(reader: &mut R, magic: [u8; 4]) -> Result<Message, NetworkError>
where
    R: AsyncRead + Unpin,
{
    let mut header = [0u8; FRAME_HEADER_SIZE];
    reader
        .read_exact(&mut header)
        .await
        .map_err(|e| NetworkError::PeerDisconnected(e.to_string()))?;
    let (len, expected) = parse_header(&header, magic)?;

    let mut payload = vec![0u8; len];
    reader
        .read_exact(&mut payload)
        .await
        .map_err(|e| NetworkError::PeerDisconnected(e.to_string()))?;
    decode_payload(&payload, expected)
}

/// Write one framed message and flush.
pub async fn write_message<W>(
    writer: &mut W,
    magic: [u8; 4],
    msg: &Message,
) -> Result<(), NetworkError>
where
    W: AsyncWrite + Unpin,
{
    let frame = encode_frame(msg, magic)?;
    writer
        .write_all(&frame)
        .await
        .map_err(|e| NetworkError::PeerDisconnected(e.to_string()))?;
    writer
        .flush()
        .await
        .map_err(|e| NetworkError::PeerDisconnected(e.to_string()))
}
