//! Observability subsystem.
//!
//! # Data Flow
//! ```text
//! All subsystems produce:
//!     → tracing events with structured fields
//!     → TraceLayer spans per request (tower-http)
//!     → middleware::logging access events (kind, operation, status, latency)
//!
//! Consumers:
//!     → logging.rs subscriber (stdout, filtered by RUST_LOG or --log-level)
//! ```
//!
//! # Design Decisions
//! - The library only emits events; installing a subscriber is the binary's job
//! - `RUST_LOG` wins over the configured default level

pub mod logging;
