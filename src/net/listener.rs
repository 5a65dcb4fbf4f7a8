//! TCP listener binding.
//!
//! # Responsibilities
//! - Normalize listen addresses (`":8000"` means every interface)
//! - Resolve host names and filter by network family
//! - Bind a non-blocking std listener for axum-server

use std::net::{SocketAddr, TcpListener, ToSocketAddrs};

use crate::error::{Error, Result};
use crate::net::Network;

/// Expand a bare `":port"` into the unspecified address of `network`.
pub fn normalize_address(network: Network, address: &str) -> String {
    match address.strip_prefix(':') {
        Some(port) if network == Network::Tcp6 => format!("[::]:{port}"),
        Some(port) => format!("0.0.0.0:{port}"),
        None => address.to_string(),
    }
}

fn resolve(network: Network, address: &str) -> Result<SocketAddr> {
    let normalized = normalize_address(network, address);
    let invalid = |reason: String| Error::Listen {
        address: address.to_string(),
        source: std::io::Error::new(std::io::ErrorKind::InvalidInput, reason),
    };

    let mut candidates = normalized
        .to_socket_addrs()
        .map_err(|e| invalid(e.to_string()))?;
    candidates
        .find(|addr| match network {
            Network::Tcp => true,
            Network::Tcp4 => addr.is_ipv4(),
            Network::Tcp6 => addr.is_ipv6(),
        })
        .ok_or_else(|| invalid(format!("no {network} address for {normalized}")))
}

/// Bind `address` on `network`.
pub fn bind(network: Network, address: &str) -> Result<TcpListener> {
    let addr = resolve(network, address)?;
    let listen_err = |source| Error::Listen {
        address: address.to_string(),
        source,
    };

    let listener = TcpListener::bind(addr).map_err(listen_err)?;
    listener.set_nonblocking(true).map_err(listen_err)?;

    tracing::debug!(
        network = %network,
        address = %addr,
        "listener bound"
    );
    Ok(listener)
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_normalize_address() {
        assert_eq!(normalize_address(Network::Tcp, ":8000"), "0.0.0.0:8000");
        assert_eq!(normalize_address(Network::Tcp4, ":0"), "0.0.0.0:0");
        assert_eq!(normalize_address(Network::Tcp6, ":8000"), "[::]:8000");
        assert_eq!(normalize_address(Network::Tcp, "127.0.0.1:80"), "127.0.0.1:80");
    }

    #[test]
    fn test_bind_ephemeral_port() {
        let listener = bind(Network::Tcp4, "127.0.0.1:0").unwrap();
        assert_ne!(listener.local_addr().unwrap().port(), 0);
    }

    #[test]
    fn test_family_mismatch_is_rejected() {
        let err = bind(Network::Tcp6, "127.0.0.1:0").unwrap_err();
        assert!(matches!(err, Error::Listen { .. }));
    }

    #[test]
    fn test_port_in_use() {
        let first = bind(Network::Tcp, "127.0.0.1:0").unwrap();
        let addr = first.local_addr().unwrap().to_string();
        assert!(bind(Network::Tcp, &addr).is_err());
    }
}
