//! Endpoint host extraction.

use std::net::{IpAddr, Ipv4Addr, Ipv6Addr, SocketAddr, UdpSocket};

use url::Url;

use crate::error::{Error, Result};

/// The address clients should use to reach a listener bound to `addr`.
///
/// Unspecified hosts (`0.0.0.0`, `::`) become the address of the interface
/// that routes outbound traffic, or loopback when there is none.
pub fn extract(addr: SocketAddr) -> SocketAddr {
    if !addr.ip().is_unspecified() {
        return addr;
    }
    let ip = outbound_ip(addr.is_ipv6()).unwrap_or(if addr.is_ipv6() {
        IpAddr::V6(Ipv6Addr::LOCALHOST)
    } else {
        IpAddr::V4(Ipv4Addr::LOCALHOST)
    });
    SocketAddr::new(ip, addr.port())
}

/// Local address the kernel picks for outbound traffic. Connecting a UDP
/// socket sends nothing.
fn outbound_ip(v6: bool) -> Option<IpAddr> {
    let (bind, probe) = if v6 {
        ("[::]:0", "[2001:4860:4860::8888]:80")
    } else {
        ("0.0.0.0:0", "8.8.8.8:80")
    };
    let socket = UdpSocket::bind(bind).ok()?;
    socket.connect(probe).ok()?;
    let ip = socket.local_addr().ok()?.ip();
    (!ip.is_unspecified()).then_some(ip)
}

/// `scheme://host:port` for a listener bound to `addr`.
pub fn endpoint_url(scheme: &str, addr: SocketAddr) -> Result<Url> {
    let host = extract(addr);
    Url::parse(&format!("{scheme}://{host}"))
        .map_err(|e| Error::InvalidOption(format!("endpoint {scheme}://{host}: {e}")))
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_specified_host_is_kept() {
        let addr: SocketAddr = "127.0.0.1:8080".parse().unwrap();
        assert_eq!(extract(addr), addr);
    }

    #[test]
    fn test_unspecified_host_is_replaced() {
        let addr: SocketAddr = "0.0.0.0:8080".parse().unwrap();
        let resolved = extract(addr);
        assert!(!resolved.ip().is_unspecified());
        assert_eq!(resolved.port(), 8080);
    }

    #[test]
    fn test_endpoint_url() {
        let url = endpoint_url("https", "127.0.0.1:8443".parse().unwrap()).unwrap();
        assert_eq!(url.scheme(), "https");
        assert_eq!(url.port(), Some(8443));

        let url = endpoint_url("http", "[::1]:9000".parse().unwrap()).unwrap();
        assert_eq!(url.host_str(), Some("[::1]"));
    }
}
