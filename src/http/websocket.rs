//! WebSocket handling for room connections.
//!
//! # Responsibilities
//! - Detect and complete websocket upgrade requests
//! - Register each accepted socket with its room
//! - Forward inbound frames to the room actor
//! - Write relayed frames back to the client
//!
//! # Data Flow
//! ```text
//! Client ──frames──▶ reader task ──RoomEvent──▶ room actor
//! Client ◀──frames── writer task ◀──mpsc────── WsPeer::send
//! ```
//!
//! # Design Decisions
//! - Frame-level forwarding; text and binary are relayed as-is
//! - Ping/pong handled by the websocket layer, never relayed
//! - `send` is a non-blocking enqueue into a bounded queue; it fails once the
//!   writer is gone or the queue is full, so a peer that stops reading is
//!   closed like any other failed delivery
//! - The socket stays tracked by the host until the room closes it

use std::net::SocketAddr;
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::{Arc, Mutex};

use axum::body::Body;
use axum::extract::connect_info::ConnectInfo;
use axum::extract::ws::{Message, WebSocket, WebSocketUpgrade};
use axum::extract::FromRequestParts;
use axum::http::{HeaderMap, Request, StatusCode};
use axum::response::Response;
use futures_util::{SinkExt, StreamExt};
use tokio::sync::mpsc::{self, error::TrySendError};
use tokio::sync::watch;

use crate::http::request::declared_origin;
use crate::http::response::{self, ErrorBody, ResponseOptions};
use crate::rooms::{Payload, PeerSocket, RoomHandle, SendError, SocketId};
use crate::security::OriginPolicy;

/// Server side of one accepted websocket.
#[derive(Debug)]
pub struct WsPeer {
    id: SocketId,
    tx: mpsc::Sender<Message>,
    /// Set when the connection must be dropped without a close handshake.
    abort: watch::Sender<bool>,
    closed: AtomicBool,
    attachment: Mutex<Option<Vec<u8>>>,
}

impl WsPeer {
    pub fn new(tx: mpsc::Sender<Message>, abort: watch::Sender<bool>) -> Self {
        Self {
            id: SocketId::new(),
            tx,
            abort,
            closed: AtomicBool::new(false),
            attachment: Mutex::new(None),
        }
    }
}

impl PeerSocket for WsPeer {
    fn id(&self) -> SocketId {
        self.id
    }

    fn send(&self, payload: Payload) -> Result<(), SendError> {
        if self.closed.load(Ordering::Acquire) {
            return Err(SendError::Closed(self.id));
        }

        let message = match payload {
            Payload::Text(text) => Message::Text(text.into()),
            Payload::Binary(bytes) => Message::Binary(bytes),
        };
        self.tx.try_send(message).map_err(|e| match e {
            TrySendError::Full(_) => SendError::Backlogged(self.id),
            TrySendError::Closed(_) => SendError::Closed(self.id),
        })
    }

    fn close(&self) {
        if self.closed.swap(true, Ordering::AcqRel) {
            return;
        }
        // A peer too far behind to take the close frame is cut off instead.
        if let Err(TrySendError::Full(_)) = self.tx.try_send(Message::Close(None)) {
            self.abort.send_replace(true);
        }
    }

    fn serialize_attachment(&self, blob: Vec<u8>) {
        *self.attachment.lock().expect("attachment mutex poisoned") = Some(blob);
    }

    fn deserialize_attachment(&self) -> Option<Vec<u8>> {
        self.attachment.lock().expect("attachment mutex poisoned").clone()
    }
}

/// Upgrade `req` and attach the socket to `room`.
///
/// Anything that is not a valid websocket upgrade is answered with a 400 and
/// never reaches the room.
pub async fn upgrade(room: RoomHandle, req: Request<Body>, policy: &OriginPolicy) -> Response {
    let origin = declared_origin(req.headers());
    let peer = req
        .extensions()
        .get::<ConnectInfo<SocketAddr>>()
        .map(|ConnectInfo(addr)| addr.to_string());

    let (mut parts, _body) = req.into_parts();
    let ws = match WebSocketUpgrade::from_request_parts(&mut parts, &()).await {
        Ok(ws) => ws,
        Err(rejection) => {
            tracing::debug!(room_id = %room.id(), reason = %rejection, "Rejected non-upgrade join");
            return response::json(
                policy,
                &ErrorBody::EXPECTED_WEBSOCKET,
                ResponseOptions::new(StatusCode::BAD_REQUEST).origin(origin.as_deref()),
            );
        }
    };

    let upgraded = ws.on_upgrade(move |socket| serve_socket(room, socket, peer));
    response::decorate(policy, upgraded, origin.as_deref(), HeaderMap::new())
}

/// Pump one socket until either side goes away.
async fn serve_socket(room: RoomHandle, socket: WebSocket, peer: Option<String>) {
    let (mut sink, mut stream) = socket.split();
    let (tx, mut rx) = mpsc::channel::<Message>(room.queue_capacity());
    let (abort, aborted) = watch::channel(false);

    let ws_peer = Arc::new(WsPeer::new(tx, abort));
    let id = ws_peer.id();

    if let Err(e) = room.join(ws_peer, peer) {
        tracing::warn!(socket_id = %id, error = %e, "Room unavailable, dropping socket");
        return;
    }

    let mut writer_aborted = aborted.clone();
    let writer = tokio::spawn(async move {
        loop {
            let message = tokio::select! {
                message = rx.recv() => match message {
                    Some(message) => message,
                    None => break,
                },
                Ok(()) = writer_aborted.changed() => return,
            };

            let closing = matches!(message, Message::Close(_));
            tokio::select! {
                sent = sink.send(message) => {
                    if sent.is_err() || closing {
                        break;
                    }
                }
                Ok(()) = writer_aborted.changed() => return,
            }
        }
        let _ = sink.close().await;
    });

    let mut reader_aborted = aborted;
    let mut failure = None;
    loop {
        let frame = tokio::select! {
            frame = stream.next() => frame,
            Ok(()) = reader_aborted.changed() => {
                tracing::debug!(socket_id = %id, "Dropping connection of backlogged peer");
                break;
            }
        };

        let payload = match frame {
            Some(Ok(Message::Text(text))) => Payload::Text(text.as_str().to_owned()),
            Some(Ok(Message::Binary(bytes))) => Payload::Binary(bytes),
            Some(Ok(Message::Close(_))) | None => break,
            Some(Ok(_)) => continue,
            Some(Err(e)) => {
                failure = Some(e.to_string());
                break;
            }
        };

        if room.message(id, payload).is_err() {
            break;
        }
    }

    // The room closes the session, which also releases it from the host.
    let notified = match failure {
        Some(error) => room.errored(id, error),
        None => room.closed(id),
    };
    if notified.is_err() {
        tracing::debug!(socket_id = %id, "Room stopped before close notification");
    }

    // The writer exits once the room drops its handle to the socket.
    drop(writer);
}

#[cfg(test)]
mod tests {
    use super::*;

    fn peer(capacity: usize) -> (WsPeer, mpsc::Receiver<Message>, watch::Receiver<bool>) {
        let (tx, rx) = mpsc::channel(capacity);
        let (abort, aborted) = watch::channel(false);
        (WsPeer::new(tx, abort), rx, aborted)
    }

    #[test]
    fn test_full_queue_fails_send() {
        let (peer, mut rx, _aborted) = peer(2);
        assert!(peer.send(Payload::from("a")).is_ok());
        assert!(peer.send(Payload::from("b")).is_ok());
        assert_eq!(
            peer.send(Payload::from("c")),
            Err(SendError::Backlogged(peer.id()))
        );

        assert!(matches!(rx.try_recv(), Ok(Message::Text(t)) if t.as_str() == "a"));
        assert!(peer.send(Payload::from("d")).is_ok());
    }

    #[test]
    fn test_close_backlogged_peer_aborts() {
        let (peer, _rx, aborted) = peer(1);
        peer.send(Payload::from("stuck")).unwrap();

        peer.close();
        assert!(*aborted.borrow());
        assert_eq!(peer.send(Payload::from("x")), Err(SendError::Closed(peer.id())));
    }

    #[test]
    fn test_close_queues_close_frame() {
        let (peer, mut rx, aborted) = peer(4);
        peer.close();
        peer.close();

        assert!(matches!(rx.try_recv(), Ok(Message::Close(None))));
        assert!(rx.try_recv().is_err());
        assert!(!*aborted.borrow());
    }

    #[test]
    fn test_send_after_writer_gone() {
        let (peer, rx, _aborted) = peer(4);
        drop(rx);
        assert_eq!(peer.send(Payload::from("x")), Err(SendError::Closed(peer.id())));
    }
}
