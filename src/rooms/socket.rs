//! Peer sockets as seen by a room.
//!
//! # Responsibilities
//! - Identify each accepted socket
//! - Carry opaque message payloads without interpreting them
//! - Store the per-socket attachment blob that survives hibernation
//!
//! # Design Decisions
//! - Sockets are compared by id, never by content
//! - `send` never blocks; a failed send is final for that socket

use std::fmt;
use std::sync::atomic::{AtomicU64, Ordering};
use std::time::{SystemTime, UNIX_EPOCH};

use axum::body::Bytes;
use serde::{Deserialize, Serialize};
use thiserror::Error;

/// Global counter for socket ids.
/// Relaxed ordering is enough since only uniqueness matters.
static SOCKET_ID_COUNTER: AtomicU64 = AtomicU64::new(1);

/// Unique identifier for an accepted socket.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord)]
pub struct SocketId(u64);

impl SocketId {
    pub fn new() -> Self {
        Self(SOCKET_ID_COUNTER.fetch_add(1, Ordering::Relaxed))
    }

    pub fn as_u64(&self) -> u64 {
        self.0
    }
}

impl Default for SocketId {
    fn default() -> Self {
        Self::new()
    }
}

impl fmt::Display for SocketId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "ws-{}", self.0)
    }
}

/// A relayed message. Never parsed or rewritten.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Payload {
    Text(String),
    Binary(Bytes),
}

impl Payload {
    pub fn len(&self) -> usize {
        match self {
            Payload::Text(text) => text.len(),
            Payload::Binary(bytes) => bytes.len(),
        }
    }

    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }
}

impl From<&str> for Payload {
    fn from(text: &str) -> Self {
        Payload::Text(text.to_string())
    }
}

impl From<Vec<u8>> for Payload {
    fn from(bytes: Vec<u8>) -> Self {
        Payload::Binary(Bytes::from(bytes))
    }
}

/// Delivery to a peer failed.
#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum SendError {
    #[error("socket {0} is closed")]
    Closed(SocketId),
    #[error("socket {0} has too many undelivered frames")]
    Backlogged(SocketId),
}

/// Per-session record stored on the socket itself.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct SessionAttachment {
    /// Set once the session is being torn down.
    #[serde(default)]
    pub quit: bool,
    /// Seconds since the unix epoch at which the session joined.
    #[serde(default)]
    pub joined_at: u64,
    /// Client address, when the transport knows it.
    #[serde(default)]
    pub peer: Option<String>,
}

impl SessionAttachment {
    pub fn new(peer: Option<String>) -> Self {
        let joined_at = SystemTime::now()
            .duration_since(UNIX_EPOCH)
            .unwrap_or_default()
            .as_secs();
        Self {
            quit: false,
            joined_at,
            peer,
        }
    }

    pub fn to_blob(&self) -> Vec<u8> {
        // A struct of plain fields always serializes.
        serde_json::to_vec(self).unwrap_or_default()
    }

    /// Decode a blob written by [`SessionAttachment::to_blob`].
    pub fn from_blob(blob: &[u8]) -> Option<Self> {
        serde_json::from_slice(blob).ok()
    }
}

/// A transport socket a room can relay to.
pub trait PeerSocket: Send + Sync + fmt::Debug {
    fn id(&self) -> SocketId;

    /// Enqueue `payload` for delivery. Fails once the socket is gone.
    fn send(&self, payload: Payload) -> Result<(), SendError>;

    /// Close the socket. Closing twice is a no-op.
    fn close(&self);

    /// Store the attachment blob on the socket.
    fn serialize_attachment(&self, blob: Vec<u8>);

    /// The blob last stored with `serialize_attachment`, if any.
    fn deserialize_attachment(&self) -> Option<Vec<u8>>;
}
