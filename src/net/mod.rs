//! Network layer subsystem.
//!
//! # Data Flow
//! ```text
//! ServerBuilder (network + address, or a pre-bound listener)
//!     → listener.rs (normalize address, bind std listener)
//!     → host.rs (resolve the externally reachable host for the endpoint)
//!     → tls.rs (optional rustls config from PEM files)
//!     → Hand off to axum-server
//! ```
//!
//! # Design Decisions
//! - Binding is synchronous so `Server::endpoint` can resolve it on demand
//! - Unspecified hosts are reported as the outbound interface address

pub mod host;
pub mod listener;
pub mod tls;

use std::fmt;
use std::str::FromStr;

use crate::error::Error;

/// Stream network a server listens on.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Network {
    /// IPv4 or IPv6, whichever the address resolves to first.
    Tcp,
    Tcp4,
    Tcp6,
}

impl FromStr for Network {
    type Err = Error;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s {
            "tcp" => Ok(Network::Tcp),
            "tcp4" => Ok(Network::Tcp4),
            "tcp6" => Ok(Network::Tcp6),
            other => Err(Error::InvalidOption(format!("unsupported network: {other}"))),
        }
    }
}

impl fmt::Display for Network {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(match self {
            Network::Tcp => "tcp",
            Network::Tcp4 => "tcp4",
            Network::Tcp6 => "tcp6",
        })
    }
}
