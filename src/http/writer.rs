//! Deferred response writer.
//!
//! # Responsibilities
//! - Buffer the status until the first body write commits it
//! - Collect headers and body bytes (or a body stream) for one response
//! - Produce the final `Response<Body>` once the handler is done
//!
//! # Design Decisions
//! - Status must precede body bytes: a status change after commit is ignored
//! - Nothing written means `200 OK` with an empty body

use axum::body::{Body, Bytes};
use axum::http::{HeaderMap, HeaderValue, Response, StatusCode};
use axum::http::header::CONTENT_TYPE;

#[derive(Debug, Default)]
enum Payload {
    #[default]
    Empty,
    Buffered(Vec<u8>),
    Stream(Body),
}

/// Per-request response buffer handed to handlers and encoders.
#[derive(Debug, Default)]
pub struct ResponseWriter {
    status: Option<StatusCode>,
    headers: HeaderMap,
    payload: Payload,
    committed: bool,
}

impl ResponseWriter {
    pub fn new() -> Self {
        Self::default()
    }

    /// Response headers; mutable until the response is built.
    pub fn headers_mut(&mut self) -> &mut HeaderMap {
        &mut self.headers
    }

    pub fn headers(&self) -> &HeaderMap {
        &self.headers
    }

    /// Record the status to send. Ignored once body bytes were written.
    pub fn write_header(&mut self, status: StatusCode) {
        if self.committed {
            tracing::warn!(
                status = status.as_u16(),
                committed = self.status().as_u16(),
                "superfluous write_header after body write"
            );
            return;
        }
        self.status = Some(status);
    }

    /// Status that will be sent.
    pub fn status(&self) -> StatusCode {
        self.status.unwrap_or(StatusCode::OK)
    }

    /// Set the `Content-Type` header.
    pub fn set_content_type(&mut self, content_type: &str) {
        match HeaderValue::from_str(content_type) {
            Ok(value) => {
                self.headers.insert(CONTENT_TYPE, value);
            }
            Err(_) => tracing::warn!(content_type, "invalid content type ignored"),
        }
    }

    /// Append body bytes, committing the status.
    pub fn write(&mut self, data: &[u8]) {
        self.committed = true;
        match &mut self.payload {
            Payload::Buffered(buf) => buf.extend_from_slice(data),
            // Bytes written after a stream replace it.
            _ => self.payload = Payload::Buffered(data.to_vec()),
        }
    }

    /// Use `body` as the response body, committing the status.
    pub fn write_stream(&mut self, body: Body) {
        self.committed = true;
        self.payload = Payload::Stream(body);
    }

    /// Returns true once body bytes or a stream were written.
    pub fn is_committed(&self) -> bool {
        self.committed
    }

    /// Drop everything written so far.
    pub fn reset(&mut self) {
        *self = Self::default();
    }

    /// Take the buffered response, leaving the writer empty.
    pub fn take_response(&mut self) -> Response<Body> {
        let writer = std::mem::take(self);
        let body = match writer.payload {
            Payload::Empty => Body::empty(),
            Payload::Buffered(buf) => Body::from(Bytes::from(buf)),
            Payload::Stream(body) => body,
        };
        let mut response = Response::new(body);
        *response.status_mut() = writer.status.unwrap_or(StatusCode::OK);
        *response.headers_mut() = writer.headers;
        response
    }
}
