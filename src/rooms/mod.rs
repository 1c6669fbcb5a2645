//! Rooms subsystem.
//!
//! # Data Flow
//! ```text
//! POST /room      → directory.rs (allocate id)
//! GET /room/:id   → id.rs (format check)
//!                 → directory.rs (resolve → RoomHandle, spawn actor lazily)
//!                 → actor.rs (fetch: upgrade, join)
//!
//! Per socket:
//!     frames → actor.rs (serialized event loop)
//!            → engine.rs (relay to every other session)
//!            → socket.rs (PeerSocket::send)
//!
//! Hibernation:
//!     idle window → actor drops engine
//!     next event  → engine.rs resumes from host.rs (open sockets + attachments)
//! ```
//!
//! # Design Decisions
//! - One actor task per room; rooms share no state
//! - The host, not the engine, is the source of truth for open sockets
//! - Message content is opaque end to end

pub mod actor;
pub mod directory;
pub mod engine;
pub mod host;
pub mod id;
pub mod socket;

#[cfg(test)]
pub(crate) mod testing;

pub use actor::{RoomError, RoomEvent, RoomHandle};
pub use directory::{LocalDirectory, RoomDirectory};
pub use engine::{BroadcastReport, CloseReason, Session, SessionEngine};
pub use host::{SocketHost, TrackedSockets};
pub use id::{RoomId, RoomIdError, ROOM_ID_LEN};
pub use socket::{Payload, PeerSocket, SendError, SessionAttachment, SocketId};
