//! Security subsystem.
//!
//! # Data Flow
//! ```text
//! Incoming request:
//!     → Origin header read once per request
//!     → origin.rs (allow-list check)
//!     → http/response.rs attaches cross-origin headers when allowed
//! ```
//!
//! # Design Decisions
//! - Origin checking is the only access control the relay performs
//! - Fail closed: absent or malformed origins never get cross-origin headers
//! - Policy is immutable; reloads swap in a whole new policy

pub mod origin;

pub use origin::{OriginPattern, OriginPatternError, OriginPolicy, DEFAULT_ALLOWED_ORIGINS};
