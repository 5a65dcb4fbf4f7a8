//! HTTP transport layer.
//!
//! Serves HTTP requests through a two-level middleware chain, a
//! request-scoped transport record and pooled per-request contexts.
//!
//! # Architecture Overview
//!
//! ```text
//!     Client Request
//!     ──────────────▶ net (listener, TLS)
//!                      │
//!                      ▼
//!                 http::filter (scope + timeout, Transport record)
//!                      │   global filters
//!                      ▼
//!                 dispatch engine (method + path)
//!                      │   router mw → route mw → selector mw
//!                      ▼
//!                 http::pool → Context → route handler
//!                      │
//!     Client Response  ▼
//!     ◀────────────── http::codec (reply or error encoding)
//!
//!     Cross-cutting: config, error, observability, transport::cancel
//! ```

pub mod config;
pub mod error;
pub mod http;
pub mod middleware;
pub mod net;
pub mod observability;
pub mod transport;

pub use config::ServerConfig;
pub use error::{Error, Result};
pub use http::{Context, Router, Server, ServerBuilder};
pub use middleware::{Handler, Middleware};
pub use transport::{Cancellation, Transport};
