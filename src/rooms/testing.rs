//! In-memory sockets for room tests.

use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::{Arc, Mutex};

use crate::rooms::socket::{Payload, PeerSocket, SendError, SocketId};

#[derive(Debug, Default)]
pub struct MemorySocket {
    id: SocketId,
    received: Mutex<Vec<Payload>>,
    attempts: Mutex<usize>,
    failing: AtomicBool,
    closed: AtomicBool,
    attachment: Mutex<Option<Vec<u8>>>,
}

impl MemorySocket {
    pub fn new() -> Arc<Self> {
        Arc::new(Self::default())
    }

    /// Make every later send fail.
    pub fn fail_sends(&self) {
        self.failing.store(true, Ordering::SeqCst);
    }

    pub fn received(&self) -> Vec<Payload> {
        self.received.lock().unwrap().clone()
    }

    /// Number of send calls, successful or not.
    pub fn attempts(&self) -> usize {
        *self.attempts.lock().unwrap()
    }

    pub fn is_closed(&self) -> bool {
        self.closed.load(Ordering::SeqCst)
    }
}

impl PeerSocket for MemorySocket {
    fn id(&self) -> SocketId {
        self.id
    }

    fn send(&self, payload: Payload) -> Result<(), SendError> {
        *self.attempts.lock().unwrap() += 1;
        if self.failing.load(Ordering::SeqCst) || self.is_closed() {
            return Err(SendError::Closed(self.id));
        }
        self.received.lock().unwrap().push(payload);
        Ok(())
    }

    fn close(&self) {
        self.closed.store(true, Ordering::SeqCst);
    }

    fn serialize_attachment(&self, blob: Vec<u8>) {
        *self.attachment.lock().unwrap() = Some(blob);
    }

    fn deserialize_attachment(&self) -> Option<Vec<u8>> {
        self.attachment.lock().unwrap().clone()
    }
}
