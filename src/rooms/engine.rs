//! Room session engine.
//!
//! # Responsibilities
//! - Own the live-session set of one room
//! - Accept new peers (Pending → Active)
//! - Relay each inbound message to every other active peer
//! - Close peers on close/error notifications and failed sends (Active → Closed)
//! - Rebuild the session set from the host after hibernation
//!
//! # Session States
//! ```text
//! Pending ──accept──▶ Active ──close / error / failed send──▶ Closed
//! ```
//!
//! # Design Decisions
//! - Not thread-safe on purpose: exactly one room actor owns an engine
//! - The sender is excluded by socket id, never by comparing content
//! - One failed peer never stops delivery to the rest
//! - Closing is idempotent; absent sessions are a no-op

use std::collections::{HashMap, HashSet};
use std::fmt;
use std::sync::Arc;

use crate::observability::metrics;
use crate::rooms::host::SocketHost;
use crate::rooms::id::RoomId;
use crate::rooms::socket::{Payload, PeerSocket, SessionAttachment, SocketId};

/// Why a session left the room.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum CloseReason {
    /// The transport reported the socket closed.
    Closed,
    /// The transport reported an error on the socket.
    Errored,
    /// A broadcast could not be delivered to the socket.
    DeliveryFailed,
}

impl CloseReason {
    pub fn as_str(&self) -> &'static str {
        match self {
            CloseReason::Closed => "closed",
            CloseReason::Errored => "error",
            CloseReason::DeliveryFailed => "delivery_failed",
        }
    }
}

impl fmt::Display for CloseReason {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

/// One connected peer's membership record.
#[derive(Debug)]
pub struct Session {
    socket: Arc<dyn PeerSocket>,
    attachment: SessionAttachment,
}

impl Session {
    pub fn id(&self) -> SocketId {
        self.socket.id()
    }

    pub fn quit(&self) -> bool {
        self.attachment.quit
    }

    pub fn attachment(&self) -> &SessionAttachment {
        &self.attachment
    }
}

/// Outcome of one broadcast.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct BroadcastReport {
    pub delivered: usize,
    pub failed: Vec<SocketId>,
}

/// The live-session set of a single room.
#[derive(Debug)]
pub struct SessionEngine {
    room: RoomId,
    host: Arc<dyn SocketHost>,
    sessions: HashMap<SocketId, Session>,
}

impl SessionEngine {
    /// Create an engine for a room and rebuild its sessions from the host.
    ///
    /// A host reporting no open sockets yields an empty room.
    pub fn resume(room: RoomId, host: Arc<dyn SocketHost>) -> Self {
        let mut engine = Self {
            room,
            host,
            sessions: HashMap::new(),
        };
        let revived = engine.rehydrate();
        if revived > 0 {
            tracing::info!(room_id = %engine.room, sessions = revived, "Room resumed");
        }
        engine
    }

    /// Reconcile the session set with the sockets the host still reports open.
    ///
    /// Sockets the host no longer reports are dropped without close logic.
    /// Newly reported sockets become active with their stored attachment,
    /// unless that attachment already records `quit`. Returns the number of
    /// sessions added.
    pub fn rehydrate(&mut self) -> usize {
        let open = self.host.open_sockets();
        let open_ids: HashSet<SocketId> = open.iter().map(|s| s.id()).collect();

        let before = self.sessions.len();
        self.sessions.retain(|id, _| open_ids.contains(id));
        let dropped = before - self.sessions.len();
        if dropped > 0 {
            tracing::debug!(room_id = %self.room, dropped, "Dropped sessions no longer open");
        }

        let mut added = 0;
        for socket in open {
            let id = socket.id();
            if self.sessions.contains_key(&id) {
                continue;
            }

            let attachment = socket
                .deserialize_attachment()
                .and_then(|blob| SessionAttachment::from_blob(&blob))
                .unwrap_or_default();
            if attachment.quit {
                continue;
            }

            self.sessions.insert(id, Session { socket, attachment });
            added += 1;
        }
        added
    }

    /// Register an accepted socket as an active session.
    pub fn accept(&mut self, socket: Arc<dyn PeerSocket>, peer: Option<String>) {
        let id = socket.id();
        if self.sessions.contains_key(&id) {
            tracing::debug!(room_id = %self.room, socket_id = %id, "Socket already active");
            return;
        }

        let attachment = SessionAttachment::new(peer);
        socket.serialize_attachment(attachment.to_blob());
        self.host.accept(socket.clone());
        self.sessions.insert(id, Session { socket, attachment });

        metrics::record_session_opened();
        tracing::info!(
            room_id = %self.room,
            socket_id = %id,
            sessions = self.sessions.len(),
            "Session joined"
        );
    }

    /// Deliver `payload` to every active session except `from`.
    ///
    /// Peers whose delivery fails are closed; the rest still receive it.
    pub fn broadcast(&mut self, from: SocketId, payload: &Payload) -> BroadcastReport {
        let mut report = BroadcastReport::default();

        for (id, session) in &self.sessions {
            if *id == from {
                continue;
            }
            match session.socket.send(payload.clone()) {
                Ok(()) => report.delivered += 1,
                Err(e) => {
                    tracing::debug!(room_id = %self.room, socket_id = %id, error = %e, "Delivery failed");
                    report.failed.push(*id);
                }
            }
        }

        for id in &report.failed {
            self.close(*id, CloseReason::DeliveryFailed);
        }

        metrics::record_broadcast(report.delivered, report.failed.len());
        report
    }

    /// Move a session to Closed: mark `quit`, persist it, release the socket
    /// and remove it from the set. Returns false if it was not active.
    pub fn close(&mut self, id: SocketId, reason: CloseReason) -> bool {
        let Some(mut session) = self.sessions.remove(&id) else {
            return false;
        };

        session.attachment.quit = true;
        session.socket.serialize_attachment(session.attachment.to_blob());
        session.socket.close();
        self.host.release(id);

        metrics::record_session_closed(reason.as_str());
        tracing::info!(
            room_id = %self.room,
            socket_id = %id,
            reason = %reason,
            sessions = self.sessions.len(),
            "Session left"
        );
        true
    }

    pub fn contains(&self, id: SocketId) -> bool {
        self.sessions.contains_key(&id)
    }

    pub fn len(&self) -> usize {
        self.sessions.len()
    }

    pub fn is_empty(&self) -> bool {
        self.sessions.is_empty()
    }

    /// Ids of all active sessions, sorted.
    pub fn session_ids(&self) -> Vec<SocketId> {
        let mut ids: Vec<_> = self.sessions.keys().copied().collect();
        ids.sort();
        ids
    }

    pub fn room(&self) -> &RoomId {
        &self.room
    }
}
