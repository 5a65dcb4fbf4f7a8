//! Configuration schema definitions.
//!
//! All types derive Serde traits for deserialization from config files.

use std::path::PathBuf;

use serde::{Deserialize, Serialize};

use crate::http::server::DEFAULT_BODY_LIMIT;

/// Root configuration for one HTTP server.
#[derive(Debug, Clone, Deserialize, Serialize, PartialEq)]
#[serde(default)]
pub struct ServerConfig {
    /// `tcp`, `tcp4` or `tcp6`.
    pub network: String,

    /// Listen address (e.g., "0.0.0.0:8000" or ":8000").
    pub address: String,

    /// Per-request timeout in milliseconds. Zero disables it.
    pub timeout_ms: u64,

    /// Redirect between `/path` and `/path/` when only one is routed.
    pub strict_slash: bool,

    /// Largest request body read by `Context::bind`, in bytes.
    pub body_limit: usize,

    /// Optional TLS configuration.
    pub tls: Option<TlsConfig>,
}

impl Default for ServerConfig {
    fn default() -> Self {
        Self {
            network: "tcp".to_string(),
            address: ":0".to_string(),
            timeout_ms: 1_000,
            strict_slash: true,
            body_limit: DEFAULT_BODY_LIMIT,
            tls: None,
        }
    }
}

/// TLS configuration for the listener.
#[derive(Debug, Clone, Deserialize, Serialize, PartialEq)]
pub struct TlsConfig {
    /// Path to certificate file (PEM).
    pub cert_path: PathBuf,

    /// Path to private key file (PEM).
    pub key_path: PathBuf,
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_empty_document_uses_defaults() {
        let config: ServerConfig = toml::from_str("").unwrap();
        assert_eq!(config, ServerConfig::default());
        assert_eq!(config.timeout_ms, 1_000);
        assert!(config.strict_slash);
    }

    #[test]
    fn test_partial_document() {
        let config: ServerConfig = toml::from_str(
            r#"
            address = "127.0.0.1:8000"
            timeout_ms = 0

            [tls]
            cert_path = "certs/server.pem"
            key_path = "certs/server.key"
            "#,
        )
        .unwrap();
        assert_eq!(config.network, "tcp");
        assert_eq!(config.address, "127.0.0.1:8000");
        assert_eq!(config.timeout_ms, 0);
        assert_eq!(config.tls.unwrap().key_path, PathBuf::from("certs/server.key"));
    }
}
