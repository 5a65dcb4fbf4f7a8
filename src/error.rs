//! Crate-wide error type.
//!
//! # Responsibilities
//! - Carry business errors returned by route handlers (status + reason + message)
//! - Carry decode/encode failures from the codec slots
//! - Carry listener, serve and shutdown failures from the server lifecycle
//! - Map every error to the HTTP status the error encoder writes
//!
//! # Design Decisions
//! - One enum for the whole crate; handlers and middleware share it
//! - Status errors synthesized from a response code use an empty reason

use std::time::Duration;

use axum::http::StatusCode;
use thiserror::Error;

/// Reason attached to errors that only know their status code.
pub const UNKNOWN_REASON: &str = "";

/// Result alias used across the crate.
pub type Result<T, E = Error> = std::result::Result<T, E>;

/// Errors produced while serving HTTP requests.
#[derive(Debug, Error)]
pub enum Error {
    /// Business error with an explicit status, returned by handlers and middleware.
    #[error("error: code = {} reason = {reason} message = {message}", .code.as_u16())]
    Status {
        code: StatusCode,
        reason: String,
        message: String,
    },

    /// Request input could not be decoded into the target type.
    #[error("decode error: {0}")]
    Decode(String),

    /// Request body uses a content type no decoder understands.
    #[error("unsupported content type: {0}")]
    UnsupportedMediaType(String),

    /// Reply value could not be encoded.
    #[error("encode error: {0}")]
    Encode(String),

    /// Reading the request body failed.
    #[error("body error: {0}")]
    Body(String),

    /// Request body is larger than the configured limit.
    #[error("request body exceeds {0} bytes")]
    PayloadTooLarge(usize),

    /// The request scope was cancelled.
    #[error("context canceled")]
    Canceled,

    /// The request scope outlived its deadline.
    #[error("context deadline exceeded")]
    DeadlineExceeded,

    /// A handler panicked and the recovery middleware caught it.
    #[error("handler panicked: {0}")]
    Panic(String),

    /// Server option is not usable (unknown network, malformed address, ...).
    #[error("invalid option: {0}")]
    InvalidOption(String),

    /// Binding the listener failed.
    #[error("failed to listen on {address}: {source}")]
    Listen {
        address: String,
        #[source]
        source: std::io::Error,
    },

    /// Serving connections failed after the listener was bound.
    #[error("serve error: {0}")]
    Serve(#[source] std::io::Error),

    /// In-flight requests did not drain within the shutdown grace period.
    #[error("shutdown did not complete within {0:?}")]
    ShutdownTimeout(Duration),

    /// TLS material could not be loaded.
    #[error("tls error: {0}")]
    Tls(#[source] std::io::Error),
}

impl Error {
    /// Create a business error.
    pub fn new(code: StatusCode, reason: impl Into<String>, message: impl Into<String>) -> Self {
        Error::Status {
            code,
            reason: reason.into(),
            message: message.into(),
        }
    }

    /// Create a coarse error that only knows the response status.
    pub fn from_status(code: StatusCode) -> Self {
        Error::Status {
            code,
            reason: UNKNOWN_REASON.to_string(),
            message: UNKNOWN_REASON.to_string(),
        }
    }

    pub fn bad_request(reason: impl Into<String>, message: impl Into<String>) -> Self {
        Self::new(StatusCode::BAD_REQUEST, reason, message)
    }

    pub fn unauthorized(reason: impl Into<String>, message: impl Into<String>) -> Self {
        Self::new(StatusCode::UNAUTHORIZED, reason, message)
    }

    pub fn forbidden(reason: impl Into<String>, message: impl Into<String>) -> Self {
        Self::new(StatusCode::FORBIDDEN, reason, message)
    }

    pub fn not_found(reason: impl Into<String>, message: impl Into<String>) -> Self {
        Self::new(StatusCode::NOT_FOUND, reason, message)
    }

    pub fn internal(reason: impl Into<String>, message: impl Into<String>) -> Self {
        Self::new(StatusCode::INTERNAL_SERVER_ERROR, reason, message)
    }

    /// HTTP status the error encoder writes for this error.
    pub fn status_code(&self) -> StatusCode {
        match self {
            Error::Status { code, .. } => *code,
            Error::Decode(_) | Error::Body(_) => StatusCode::BAD_REQUEST,
            Error::UnsupportedMediaType(_) => StatusCode::UNSUPPORTED_MEDIA_TYPE,
            Error::PayloadTooLarge(_) => StatusCode::PAYLOAD_TOO_LARGE,
            Error::DeadlineExceeded => StatusCode::GATEWAY_TIMEOUT,
            Error::Canceled => StatusCode::SERVICE_UNAVAILABLE,
            Error::Encode(_)
            | Error::Panic(_)
            | Error::InvalidOption(_)
            | Error::Listen { .. }
            | Error::Serve(_)
            | Error::ShutdownTimeout(_)
            | Error::Tls(_) => StatusCode::INTERNAL_SERVER_ERROR,
        }
    }

    /// Machine-readable reason, empty when unknown.
    pub fn reason(&self) -> &str {
        match self {
            Error::Status { reason, .. } => reason,
            Error::Decode(_) | Error::Body(_) => "CODEC",
            Error::UnsupportedMediaType(_) => "UNSUPPORTED_MEDIA_TYPE",
            Error::PayloadTooLarge(_) => "PAYLOAD_TOO_LARGE",
            Error::Canceled => "CANCELED",
            Error::DeadlineExceeded => "DEADLINE_EXCEEDED",
            Error::Panic(_) => "PANIC",
            _ => UNKNOWN_REASON,
        }
    }

    /// Human-readable message for the wire.
    pub fn message(&self) -> String {
        match self {
            Error::Status { message, .. } => message.clone(),
            other => other.to_string(),
        }
    }
}

impl From<serde_json::Error> for Error {
    fn from(err: serde_json::Error) -> Self {
        Error::Encode(err.to_string())
    }
}
