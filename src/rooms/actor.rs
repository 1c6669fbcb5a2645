//! Room actor.
//!
//! # Responsibilities
//! - Run one task per room that owns the room's [`SessionEngine`]
//! - Serialize joins, messages and close/error notifications
//! - Hibernate after an idle window and rehydrate on the next event
//!
//! # Data Flow
//! ```text
//! websocket reader tasks ──RoomEvent──▶ mpsc ──▶ RoomActor ──▶ SessionEngine
//!                                                              │
//!                                             PeerSocket::send ◀┘
//! ```
//!
//! # Design Decisions
//! - All mutation happens on the actor task; rooms never share locks
//! - The engine is rebuilt from the host after hibernation and reconciled
//!   with it before every join
//! - Dropping every handle, or the shutdown signal, stops the actor

use std::sync::Arc;
use std::time::Duration;

use axum::body::Body;
use axum::http::Request;
use axum::response::Response;
use thiserror::Error;
use tokio::sync::{broadcast, mpsc, oneshot};

use crate::config::RoomConfig;
use crate::http::websocket;
use crate::rooms::engine::{CloseReason, SessionEngine};
use crate::rooms::host::TrackedSockets;
use crate::rooms::id::RoomId;
use crate::rooms::socket::{Payload, PeerSocket, SocketId};

/// Outbound frames queued per peer when no capacity is configured.
pub const DEFAULT_QUEUE_CAPACITY: usize = 256;
use crate::security::OriginPolicy;

/// Error returned when a room can no longer take events.
#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum RoomError {
    #[error("room {0} is no longer running")]
    Stopped(RoomId),
}

/// Events processed by a room actor, in arrival order.
#[derive(Debug)]
pub enum RoomEvent {
    Join {
        socket: Arc<dyn PeerSocket>,
        peer: Option<String>,
    },
    Message {
        from: SocketId,
        payload: Payload,
    },
    Closed {
        socket: SocketId,
    },
    Errored {
        socket: SocketId,
        error: String,
    },
    Sessions {
        reply: oneshot::Sender<Vec<SocketId>>,
    },
}

/// Cloneable address of a running room.
#[derive(Debug, Clone)]
pub struct RoomHandle {
    id: RoomId,
    tx: mpsc::UnboundedSender<RoomEvent>,
    host: Arc<TrackedSockets>,
    queue_capacity: usize,
    /// Counts live clones of this handle.
    refs: Arc<()>,
}

impl RoomHandle {
    /// Spawn the actor for `id` on the current runtime.
    pub fn spawn(id: RoomId, config: &RoomConfig, shutdown: broadcast::Receiver<()>) -> Self {
        let (tx, rx) = mpsc::unbounded_channel();
        let host = Arc::new(TrackedSockets::new());

        let hibernate_after = match config.hibernate_after_secs {
            0 => None,
            secs => Some(Duration::from_secs(secs)),
        };

        let actor = RoomActor {
            id: id.clone(),
            host: host.clone(),
            engine: None,
            rx,
            shutdown,
            hibernate_after,
        };
        tokio::spawn(actor.run());

        let queue_capacity = match config.peer_queue_capacity {
            0 => DEFAULT_QUEUE_CAPACITY,
            capacity => capacity,
        };

        Self {
            id,
            tx,
            host,
            queue_capacity,
            refs: Arc::new(()),
        }
    }

    pub fn id(&self) -> &RoomId {
        &self.id
    }

    /// The socket host shared with this room's connections.
    pub fn host(&self) -> &Arc<TrackedSockets> {
        &self.host
    }

    /// Outbound frames each peer may have queued.
    pub fn queue_capacity(&self) -> usize {
        self.queue_capacity
    }

    /// Whether any clone of this handle other than `self` is alive.
    pub fn is_shared(&self) -> bool {
        Arc::strong_count(&self.refs) > 1
    }

    /// Connection entry point: upgrade the request and join the room.
    ///
    /// Requests that are not websocket upgrades get a 400.
    pub async fn fetch(&self, req: Request<Body>, policy: &OriginPolicy) -> Response {
        websocket::upgrade(self.clone(), req, policy).await
    }

    fn send(&self, event: RoomEvent) -> Result<(), RoomError> {
        self.tx
            .send(event)
            .map_err(|_| RoomError::Stopped(self.id.clone()))
    }

    pub fn join(&self, socket: Arc<dyn PeerSocket>, peer: Option<String>) -> Result<(), RoomError> {
        self.send(RoomEvent::Join { socket, peer })
    }

    pub fn message(&self, from: SocketId, payload: Payload) -> Result<(), RoomError> {
        self.send(RoomEvent::Message { from, payload })
    }

    pub fn closed(&self, socket: SocketId) -> Result<(), RoomError> {
        self.send(RoomEvent::Closed { socket })
    }

    pub fn errored(&self, socket: SocketId, error: impl Into<String>) -> Result<(), RoomError> {
        self.send(RoomEvent::Errored {
            socket,
            error: error.into(),
        })
    }

    /// Ids of the room's active sessions, once all earlier events are applied.
    pub async fn sessions(&self) -> Result<Vec<SocketId>, RoomError> {
        let (reply, rx) = oneshot::channel();
        self.send(RoomEvent::Sessions { reply })?;
        rx.await.map_err(|_| RoomError::Stopped(self.id.clone()))
    }
}

struct RoomActor {
    id: RoomId,
    host: Arc<TrackedSockets>,
    /// `None` while hibernating.
    engine: Option<SessionEngine>,
    rx: mpsc::UnboundedReceiver<RoomEvent>,
    shutdown: broadcast::Receiver<()>,
    hibernate_after: Option<Duration>,
}

impl RoomActor {
    async fn run(mut self) {
        tracing::debug!(room_id = %self.id, "Room actor started");

        loop {
            let idle = self.hibernate_after.filter(|_| self.engine.is_some());

            tokio::select! {
                event = self.rx.recv() => match event {
                    Some(event) => self.handle(event),
                    None => break,
                },
                _ = self.shutdown.recv() => {
                    tracing::debug!(room_id = %self.id, "Room actor received shutdown signal");
                    break;
                }
                _ = sleep_or_pending(idle) => self.hibernate(),
            }
        }

        tracing::debug!(room_id = %self.id, "Room actor stopped");
    }

    /// The live engine, resumed from the host if the room was hibernating.
    fn engine(&mut self) -> &mut SessionEngine {
        let (id, host) = (&self.id, &self.host);
        self.engine
            .get_or_insert_with(|| SessionEngine::resume(id.clone(), host.clone()))
    }

    fn handle(&mut self, event: RoomEvent) {
        match event {
            RoomEvent::Join { socket, peer } => {
                let engine = self.engine();
                engine.rehydrate();
                engine.accept(socket, peer);
            }
            RoomEvent::Message { from, payload } => {
                let engine = self.engine();
                if !engine.contains(from) {
                    tracing::debug!(room_id = %engine.room(), socket_id = %from, "Dropping message from inactive socket");
                    return;
                }
                let report = engine.broadcast(from, &payload);
                tracing::trace!(
                    room_id = %engine.room(),
                    socket_id = %from,
                    bytes = payload.len(),
                    delivered = report.delivered,
                    failed = report.failed.len(),
                    "Message relayed"
                );
            }
            RoomEvent::Closed { socket } => {
                self.engine().close(socket, CloseReason::Closed);
            }
            RoomEvent::Errored { socket, error } => {
                tracing::debug!(room_id = %self.id, socket_id = %socket, error = %error, "Socket error");
                self.engine().close(socket, CloseReason::Errored);
            }
            RoomEvent::Sessions { reply } => {
                let _ = reply.send(self.engine().session_ids());
            }
        }
    }

    fn hibernate(&mut self) {
        if let Some(engine) = self.engine.take() {
            tracing::info!(room_id = %self.id, sessions = engine.len(), "Room hibernating");
        }
    }
}

async fn sleep_or_pending(duration: Option<Duration>) {
    match duration {
        Some(duration) => tokio::time::sleep(duration).await,
        None => std::future::pending().await,
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::rooms::host::SocketHost;
    use crate::rooms::socket::SessionAttachment;
    use crate::rooms::testing::MemorySocket;

    fn spawn(hibernate_after_secs: u64) -> (RoomHandle, broadcast::Sender<()>) {
        let (shutdown, rx) = broadcast::channel(1);
        let config = RoomConfig {
            hibernate_after_secs,
            ..RoomConfig::default()
        };
        (RoomHandle::spawn(RoomId::generate(), &config, rx), shutdown)
    }

    #[tokio::test]
    async fn test_join_relay_leave() {
        let (room, _shutdown) = spawn(0);
        let a = MemorySocket::new();
        let b = MemorySocket::new();

        room.join(a.clone(), None).unwrap();
        room.join(b.clone(), None).unwrap();
        room.message(a.id(), Payload::from("hello")).unwrap();
        assert_eq!(room.sessions().await.unwrap().len(), 2);

        assert_eq!(b.received(), vec![Payload::from("hello")]);
        assert!(a.received().is_empty());

        room.closed(b.id()).unwrap();
        room.errored(b.id(), "reset").unwrap();
        room.message(a.id(), Payload::from("again")).unwrap();
        assert_eq!(room.sessions().await.unwrap(), vec![a.id()]);
        assert_eq!(b.received().len(), 1);
        assert!(a.received().is_empty());
    }

    #[tokio::test]
    async fn test_close_after_transport_release_marks_quit() {
        let (room, _shutdown) = spawn(0);
        let a = MemorySocket::new();
        let b = MemorySocket::new();
        room.join(a.clone(), None).unwrap();
        room.join(b.clone(), None).unwrap();
        room.sessions().await.unwrap();

        room.host().release(b.id());
        room.closed(b.id()).unwrap();
        assert_eq!(room.sessions().await.unwrap(), vec![a.id()]);

        assert!(b.is_closed());
        let blob = b.deserialize_attachment().unwrap();
        assert!(SessionAttachment::from_blob(&blob).unwrap().quit);
    }

    #[tokio::test(start_paused = true)]
    async fn test_disconnect_while_hibernating_marks_quit() {
        let (room, _shutdown) = spawn(5);
        let a = MemorySocket::new();
        room.join(a.clone(), None).unwrap();
        room.sessions().await.unwrap();

        tokio::time::sleep(Duration::from_secs(10)).await;

        room.errored(a.id(), "reset").unwrap();
        assert!(room.sessions().await.unwrap().is_empty());
        assert!(a.is_closed());
        assert!(room.host().is_empty());
    }

    #[tokio::test]
    async fn test_handle_clones_counted() {
        let (room, _shutdown) = spawn(0);
        assert!(!room.is_shared());
        let clone = room.clone();
        assert!(room.is_shared());
        drop(clone);
        assert!(!room.is_shared());
        assert_eq!(room.queue_capacity(), DEFAULT_QUEUE_CAPACITY);
    }

    #[tokio::test]
    async fn test_message_from_closed_socket_dropped() {
        let (room, _shutdown) = spawn(0);
        let a = MemorySocket::new();
        let b = MemorySocket::new();
        room.join(a.clone(), None).unwrap();
        room.join(b.clone(), None).unwrap();

        room.closed(a.id()).unwrap();
        room.message(a.id(), Payload::from("late")).unwrap();
        room.sessions().await.unwrap();
        assert!(b.received().is_empty());
    }

    #[tokio::test(start_paused = true)]
    async fn test_hibernate_and_resume() {
        let (room, _shutdown) = spawn(5);
        let a = MemorySocket::new();
        let b = MemorySocket::new();
        room.join(a.clone(), None).unwrap();
        room.join(b.clone(), None).unwrap();
        room.sessions().await.unwrap();

        tokio::time::sleep(Duration::from_secs(10)).await;

        room.message(b.id(), Payload::from("woke")).unwrap();
        let mut expected = vec![a.id(), b.id()];
        expected.sort();
        assert_eq!(room.sessions().await.unwrap(), expected);
        assert_eq!(a.received(), vec![Payload::from("woke")]);
    }

    #[tokio::test]
    async fn test_shutdown_stops_actor() {
        let (room, shutdown) = spawn(0);
        shutdown.send(()).unwrap();

        let mut stopped = false;
        for _ in 0..50 {
            if room.sessions().await.is_err() {
                stopped = true;
                break;
            }
            tokio::task::yield_now().await;
        }
        assert!(stopped);
    }
}
