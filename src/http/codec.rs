//! Request decoding and response encoding slots.
//!
//! # Responsibilities
//! - Turn path variables, query strings and bodies into a [`Document`]
//! - Deserialize a [`Document`] into any `serde` target
//! - Encode successful replies and errors onto a [`ResponseWriter`]
//!
//! # Design Decisions
//! - Decoders produce an intermediate document instead of filling a target,
//!   so the slots stay object-safe and replaceable per server
//! - JSON and urlencoded forms are the only wire formats understood
//! - The error encoder cannot fail: it is the last word on the response

use std::sync::Arc;

use axum::body::Bytes;
use axum::http::header::CONTENT_TYPE;
use axum::http::request::Parts;
use serde::de::DeserializeOwned;
use serde::Serialize;

use crate::error::{Error, Result};
use crate::http::writer::ResponseWriter;

pub const CONTENT_TYPE_JSON: &str = "application/json";
pub const CONTENT_TYPE_FORM: &str = "application/x-www-form-urlencoded";

/// Raw input of a decoder call.
#[derive(Debug, Clone, Copy)]
pub struct DecodeInput<'a> {
    pub head: &'a Parts,
    pub vars: &'a [(String, String)],
    pub body: &'a Bytes,
}

/// A decoded, still untyped, request payload.
#[derive(Debug, Clone, PartialEq)]
pub enum Document {
    Json(Bytes),
    Form(String),
}

impl Document {
    /// Deserialize the document into `T`.
    pub fn deserialize<T: DeserializeOwned>(&self) -> Result<T> {
        match self {
            Document::Json(bytes) => {
                serde_json::from_slice(bytes).map_err(|e| Error::Decode(e.to_string()))
            }
            Document::Form(encoded) => {
                serde_urlencoded::from_str(encoded).map_err(|e| Error::Decode(e.to_string()))
            }
        }
    }
}

/// Decodes one part of a request into a [`Document`].
pub type DecodeRequestFunc = Arc<dyn Fn(&DecodeInput<'_>) -> Result<Document> + Send + Sync>;

/// Encodes a successful reply. The value has already been serialized.
pub type EncodeResponseFunc =
    Arc<dyn Fn(&mut ResponseWriter, &Parts, &serde_json::Value) -> Result<()> + Send + Sync>;

/// Encodes a failed request.
pub type EncodeErrorFunc = Arc<dyn Fn(&mut ResponseWriter, &Parts, &Error) + Send + Sync>;

/// The codec slots a server dispatches through.
#[derive(Clone)]
pub struct Codecs {
    pub vars: DecodeRequestFunc,
    pub query: DecodeRequestFunc,
    pub body: DecodeRequestFunc,
    pub response: EncodeResponseFunc,
    pub error: EncodeErrorFunc,
}

impl Default for Codecs {
    fn default() -> Self {
        Self {
            vars: Arc::new(default_vars_decoder),
            query: Arc::new(default_query_decoder),
            body: Arc::new(default_request_decoder),
            response: Arc::new(default_response_encoder),
            error: Arc::new(default_error_encoder),
        }
    }
}

impl std::fmt::Debug for Codecs {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.write_str("Codecs")
    }
}

/// Path variables as an urlencoded form.
pub fn default_vars_decoder(input: &DecodeInput<'_>) -> Result<Document> {
    serde_urlencoded::to_string(input.vars)
        .map(Document::Form)
        .map_err(|e| Error::Decode(e.to_string()))
}

/// The raw query string.
pub fn default_query_decoder(input: &DecodeInput<'_>) -> Result<Document> {
    Ok(Document::Form(input.head.uri.query().unwrap_or_default().to_string()))
}

/// Body decoder keyed on `Content-Type`.
///
/// An empty body decodes as an empty form, which fills targets whose fields
/// are all optional or defaulted.
pub fn default_request_decoder(input: &DecodeInput<'_>) -> Result<Document> {
    if input.body.is_empty() {
        return Ok(Document::Form(String::new()));
    }

    let content_type = input
        .head
        .headers
        .get(CONTENT_TYPE)
        .and_then(|v| v.to_str().ok())
        .map(|v| v.split(';').next().unwrap_or_default().trim().to_ascii_lowercase());

    match content_type.as_deref() {
        Some(ct) if ct == CONTENT_TYPE_JSON || ct.ends_with("+json") => {
            Ok(Document::Json(input.body.clone()))
        }
        Some(CONTENT_TYPE_FORM) => std::str::from_utf8(input.body)
            .map(|s| Document::Form(s.to_string()))
            .map_err(|e| Error::Decode(e.to_string())),
        Some(ct) if !ct.is_empty() => Err(Error::UnsupportedMediaType(ct.to_string())),
        _ => {
            let first = input.body.iter().find(|b| !b.is_ascii_whitespace());
            match first {
                Some(b'{') | Some(b'[') => Ok(Document::Json(input.body.clone())),
                _ => Err(Error::UnsupportedMediaType("missing content type".to_string())),
            }
        }
    }
}

/// JSON encoder. A `null` reply writes nothing.
pub fn default_response_encoder(
    w: &mut ResponseWriter,
    _head: &Parts,
    value: &serde_json::Value,
) -> Result<()> {
    if value.is_null() {
        return Ok(());
    }
    let body = serde_json::to_vec(value)?;
    w.set_content_type(CONTENT_TYPE_JSON);
    w.write(&body);
    Ok(())
}

#[derive(Serialize)]
struct ErrorBody<'a> {
    code: u16,
    reason: &'a str,
    message: String,
}

/// Writes `{code, reason, message}` with the error's status.
pub fn default_error_encoder(w: &mut ResponseWriter, _head: &Parts, err: &Error) {
    let code = err.status_code();
    let body = ErrorBody {
        code: code.as_u16(),
        reason: err.reason(),
        message: err.message(),
    };
    w.set_content_type(CONTENT_TYPE_JSON);
    w.write_header(code);
    match serde_json::to_vec(&body) {
        Ok(bytes) => w.write(&bytes),
        Err(e) => tracing::warn!(error = %e, "failed to encode error body"),
    }
}
