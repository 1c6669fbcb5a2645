//! Observability subsystem.
//!
//! # Data Flow
//! ```text
//! All subsystems produce:
//!     → logging.rs (structured log events)
//!     → metrics.rs (counters, histograms)
//!
//! Consumers:
//!     → Log aggregation (stdout)
//!     → Metrics endpoint (Prometheus scrape)
//! ```
//!
//! # Design Decisions
//! - Structured fields: room_id, socket_id, request_id
//! - Request ID flows from the HTTP layer into handler logs
//! - Metrics are cheap (atomic increments)

pub mod logging;
pub mod metrics;
