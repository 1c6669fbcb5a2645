//! Routing subsystem.
//!
//! # Data Flow
//! ```text
//! Incoming Request (method, path)
//!     → router.rs (ordered route scan)
//!     → matcher.rs (segment-by-segment pattern match)
//!     → first matching handler, or the fallback
//!
//! Route Compilation (at startup):
//!     "/room/:id"
//!     → split into literal / capture segments
//!     → Freeze as immutable Router
//! ```
//!
//! # Design Decisions
//! - Routes compiled at startup, immutable at runtime
//! - No regex in hot path
//! - Deterministic: same input always matches same route
//! - First match wins (registration order)

pub mod matcher;
pub mod router;

pub use matcher::{Params, PathPattern, Segment};
pub use router::Router;
