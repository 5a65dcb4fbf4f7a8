//! HTTP serving subsystem.
//!
//! # Data Flow
//! ```text
//! TCP/TLS connection (axum-server)
//!     → TraceLayer (request span)
//!     → filter.rs server_filter (request scope + timeout, Transport record)
//!     → global filters (server options)
//!     → dispatch engine (method + path → route, or strict-slash fallback)
//!     → filter.rs dispatch (path vars, operation = route template)
//!     → router.rs chain: router mw → route mw → selector mw → invoke
//!     → pool.rs checkout → context.rs handed to the route handler
//!     → codec.rs encodes the reply or the error onto writer.rs
//!     ← context released to the pool, response flows back out
//! ```
//!
//! # Design Decisions
//! - Every middleware level shares one `Handler`/`Middleware` shape
//! - A response written before an error is kept and sent as is; errors
//!   never produce a second encoding
//! - Contexts are pooled per router

pub mod codec;
pub mod context;
pub mod filter;
pub mod path;
pub mod pool;
pub mod router;
pub mod server;
pub mod writer;

pub use codec::{Codecs, DecodeInput, DecodeRequestFunc, Document, EncodeErrorFunc, EncodeResponseFunc};
pub use context::Context;
pub use pool::{ContextPool, PooledContext};
pub use router::Router;
pub use server::{RouteInfo, Server, ServerBuilder};
pub use writer::ResponseWriter;
