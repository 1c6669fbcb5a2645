//! HTTP protocol handling subsystem.
//!
//! # Data Flow
//! ```text
//! TCP connection
//!     → server.rs (Axum setup, middleware, relay route chain)
//!     → request.rs (request ID, declared origin)
//!     → routing (POST /room, GET /room/:id, fallback)
//!     → websocket.rs (upgrade, hand socket to the room)
//!     → response.rs (JSON body, cross-origin headers)
//!     → Send to client
//! ```

pub mod request;
pub mod response;
pub mod server;
pub mod websocket;

pub use request::{declared_origin, X_REQUEST_ID};
pub use response::{ErrorBody, ResponseOptions, JSON_CONTENT_TYPE};
pub use server::{relay_routes, AppState, CreatedRoom, HttpServer};
pub use websocket::WsPeer;
