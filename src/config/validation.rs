//! Configuration validation.
//!
//! # Responsibilities
//! - Semantic validation (serde handles syntactic)
//! - Validate value ranges (network names, address shape, body limit)
//! - Check TLS material paths are set in pairs
//!
//! # Design Decisions
//! - Returns all validation errors, not just first
//! - Validation is pure function: ServerConfig → Result<(), Vec<ValidationError>>
//! - Files are not opened here; missing TLS files surface when loading them

use thiserror::Error;

use crate::config::schema::ServerConfig;
use crate::net::Network;

/// A single semantic problem in a config.
#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum ValidationError {
    #[error("unknown network '{0}' (expected tcp, tcp4 or tcp6)")]
    Network(String),

    #[error("address must not be empty")]
    EmptyAddress,

    #[error("address '{0}' has no valid port")]
    Port(String),

    #[error("body_limit must be greater than zero")]
    BodyLimit,

    #[error("tls.{0} must not be empty")]
    TlsPath(&'static str),
}

/// Check `config`, collecting every problem found.
pub fn validate_config(config: &ServerConfig) -> Result<(), Vec<ValidationError>> {
    let mut errors = Vec::new();

    if config.network.parse::<Network>().is_err() {
        errors.push(ValidationError::Network(config.network.clone()));
    }

    if config.address.trim().is_empty() {
        errors.push(ValidationError::EmptyAddress);
    } else {
        let port = config.address.rsplit_once(':').map(|(_, port)| port);
        if port.and_then(|p| p.parse::<u16>().ok()).is_none() {
            errors.push(ValidationError::Port(config.address.clone()));
        }
    }

    if config.body_limit == 0 {
        errors.push(ValidationError::BodyLimit);
    }

    if let Some(tls) = &config.tls {
        if tls.cert_path.as_os_str().is_empty() {
            errors.push(ValidationError::TlsPath("cert_path"));
        }
        if tls.key_path.as_os_str().is_empty() {
            errors.push(ValidationError::TlsPath("key_path"));
        }
    }

    if errors.is_empty() {
        Ok(())
    } else {
        Err(errors)
    }
}
