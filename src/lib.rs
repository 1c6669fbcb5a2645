//! Collaborative room relay library.
//!
//! Clients create a room over HTTP, then join it over a websocket. Every
//! message a member sends is relayed verbatim to every other member.

pub mod config;
pub mod http;
pub mod lifecycle;
pub mod observability;
pub mod rooms;
pub mod routing;
pub mod security;

pub use config::schema::RelayConfig;
pub use http::HttpServer;
pub use lifecycle::Shutdown;
