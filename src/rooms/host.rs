//! Socket tracking for a room.
//!
//! The host is the part of the transport that outlives a room's in-memory
//! state: it remembers every accepted socket until the connection ends or the
//! room closes it, so a hibernated room can be rebuilt from it.

use std::fmt;
use std::sync::Arc;

use dashmap::DashMap;

use crate::rooms::socket::{PeerSocket, SocketId};

/// Accept-and-track contract a room relies on.
pub trait SocketHost: Send + Sync + fmt::Debug {
    /// Start tracking an accepted socket.
    fn accept(&self, socket: Arc<dyn PeerSocket>);

    /// Sockets that are still open.
    fn open_sockets(&self) -> Vec<Arc<dyn PeerSocket>>;

    /// Stop tracking a socket. Unknown ids are ignored.
    fn release(&self, id: SocketId);
}

/// In-process host backed by a concurrent map.
#[derive(Debug, Default)]
pub struct TrackedSockets {
    sockets: DashMap<SocketId, Arc<dyn PeerSocket>>,
}

impl TrackedSockets {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn len(&self) -> usize {
        self.sockets.len()
    }

    pub fn is_empty(&self) -> bool {
        self.sockets.is_empty()
    }
}

impl SocketHost for TrackedSockets {
    fn accept(&self, socket: Arc<dyn PeerSocket>) {
        self.sockets.insert(socket.id(), socket);
    }

    fn open_sockets(&self) -> Vec<Arc<dyn PeerSocket>> {
        self.sockets.iter().map(|entry| entry.value().clone()).collect()
    }

    fn release(&self, id: SocketId) {
        self.sockets.remove(&id);
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::rooms::testing::MemorySocket;

    #[test]
    fn accept_and_release() {
        let host = TrackedSockets::new();
        let a = MemorySocket::new();
        let b = MemorySocket::new();

        host.accept(a.clone());
        host.accept(b.clone());
        host.accept(a.clone());
        assert_eq!(host.len(), 2);

        host.release(a.id());
        host.release(a.id());
        let open: Vec<_> = host.open_sockets().iter().map(|s| s.id()).collect();
        assert_eq!(open, vec![b.id()]);
    }
}
