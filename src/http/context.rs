//! Pooled per-request context handed to route handlers.
//!
//! # Responsibilities
//! - Expose the request head, path variables, query and body
//! - Bind request input into typed values through the server's decoders
//! - Write replies through the server's encoders or raw helpers
//! - Surface the request's transport record and cancellation scope
//!
//! # Design Decisions
//! - One instance serves one request at a time; the pool hands out
//!   exclusive ownership and `reset` clears every request reference
//! - The body is read lazily, at most once, and kept for later binds

use std::sync::{Arc, OnceLock};

use axum::body::{Body, Bytes};
use axum::http::header::CONTENT_LENGTH;
use axum::http::request::Parts;
use axum::http::{HeaderMap, Request, StatusCode};
use futures_util::StreamExt;
use serde::de::DeserializeOwned;
use serde::Serialize;
use tokio::time::Instant;

use crate::error::{Error, Result};
use crate::http::codec::{DecodeInput, Document, CONTENT_TYPE_FORM, CONTENT_TYPE_JSON};
use crate::http::router::{RouterInner, SelectedOperation};
use crate::http::writer::ResponseWriter;
use crate::middleware::{compose, Handler};
use crate::transport::{self, Cancellation, Transport};

#[derive(Debug, Default)]
enum RequestBody {
    #[default]
    Empty,
    Pending(Body),
    Buffered(Bytes),
}

/// Request context passed to route handlers.
#[derive(Default)]
pub struct Context {
    router: Option<Arc<RouterInner>>,
    head: Option<Parts>,
    body: RequestBody,
    vars: Vec<(String, String)>,
    writer: ResponseWriter,
}

fn empty_headers() -> &'static HeaderMap {
    static EMPTY: OnceLock<HeaderMap> = OnceLock::new();
    EMPTY.get_or_init(HeaderMap::new)
}

/// Collect `body`, failing as soon as it grows past `limit` bytes.
async fn read_limited(body: Body, limit: usize) -> Result<Bytes> {
    let mut stream = body.into_data_stream();
    let mut buf = Vec::new();
    while let Some(chunk) = stream.next().await {
        let chunk = chunk.map_err(|e| Error::Body(e.to_string()))?;
        if buf.len() + chunk.len() > limit {
            return Err(Error::PayloadTooLarge(limit));
        }
        buf.extend_from_slice(&chunk);
    }
    Ok(Bytes::from(buf))
}

fn empty_head() -> Parts {
    Request::new(()).into_parts().0
}

impl Context {
    /// Bind the context to a live request.
    pub(crate) fn attach(
        &mut self,
        router: Option<Arc<RouterInner>>,
        head: Parts,
        body: Body,
        vars: Vec<(String, String)>,
    ) {
        self.reset();
        self.router = router;
        self.head = Some(head);
        self.body = RequestBody::Pending(body);
        self.vars = vars;
    }

    /// Drop every reference to the current request and response.
    pub fn reset(&mut self) {
        self.router = None;
        self.head = None;
        self.body = RequestBody::Empty;
        self.vars.clear();
        self.writer.reset();
    }

    /// Returns true when no request is bound.
    pub fn is_empty(&self) -> bool {
        self.router.is_none() && self.head.is_none() && self.vars.is_empty() && !self.writer.is_committed()
    }

    /// Path variables in template order.
    pub fn vars(&self) -> &[(String, String)] {
        &self.vars
    }

    /// A single path variable.
    pub fn var(&self, name: &str) -> Option<&str> {
        self.vars
            .iter()
            .find(|(k, _)| k == name)
            .map(|(_, v)| v.as_str())
    }

    /// Parsed query pairs. Malformed queries yield no pairs.
    pub fn query(&self) -> Vec<(String, String)> {
        self.raw_query()
            .and_then(|q| serde_urlencoded::from_str(q).ok())
            .unwrap_or_default()
    }

    fn raw_query(&self) -> Option<&str> {
        self.head.as_ref().and_then(|h| h.uri.query())
    }

    /// Urlencoded body pairs followed by query pairs.
    pub async fn form(&mut self) -> Result<Vec<(String, String)>> {
        let mut pairs: Vec<(String, String)> = match self.form_body().await? {
            Some(body) => serde_urlencoded::from_str(&body).map_err(|e| Error::Decode(e.to_string()))?,
            None => Vec::new(),
        };
        pairs.extend(self.query());
        Ok(pairs)
    }

    async fn form_body(&mut self) -> Result<Option<String>> {
        let is_form = self
            .header()
            .get(axum::http::header::CONTENT_TYPE)
            .and_then(|v| v.to_str().ok())
            .is_some_and(|ct| ct.starts_with(CONTENT_TYPE_FORM));
        if !is_form {
            return Ok(None);
        }
        let body = self.body().await?;
        String::from_utf8(body.to_vec())
            .map(Some)
            .map_err(|e| Error::Decode(e.to_string()))
    }

    /// Request headers. Empty when no request is bound.
    pub fn header(&self) -> &HeaderMap {
        self.head.as_ref().map(|h| &h.headers).unwrap_or_else(|| empty_headers())
    }

    /// The request head.
    pub fn request(&self) -> Option<&Parts> {
        self.head.as_ref()
    }

    /// The response under construction.
    pub fn response(&mut self) -> &mut ResponseWriter {
        &mut self.writer
    }

    /// Transport record attached by the server filter.
    pub fn transport(&self) -> Option<Arc<Transport>> {
        self.head
            .as_ref()
            .and_then(|h| transport::from_extensions(&h.extensions))
    }

    /// The operation selector middleware are matched against.
    pub fn operation(&self) -> String {
        match self.transport() {
            Some(tr) => tr.operation().to_string(),
            None => self
                .head
                .as_ref()
                .map(|h| h.uri.path().to_string())
                .unwrap_or_default(),
        }
    }

    /// Wrap `h` with the selector middleware registered for this request's
    /// operation.
    ///
    /// Route handlers already run inside the chain of the operation they were
    /// dispatched for, so `h` is returned unwrapped until the operation is
    /// changed (see [`Transport::set_operation`]).
    pub fn middleware(&self, h: Handler) -> Handler {
        let Some(router) = &self.router else {
            return h;
        };
        let operation = self.operation();
        let applied = self
            .head
            .as_ref()
            .and_then(|head| head.extensions.get::<SelectedOperation>())
            .is_some_and(|selected| selected.0 == operation);
        if applied {
            h
        } else {
            compose(&router.server.matches(&operation), h)
        }
    }

    /// Read the whole request body, once.
    pub async fn body(&mut self) -> Result<Bytes> {
        let limit = self
            .router
            .as_ref()
            .map(|r| r.server.body_limit)
            .unwrap_or(usize::MAX);
        match std::mem::take(&mut self.body) {
            RequestBody::Pending(body) => {
                let declared = self
                    .head
                    .as_ref()
                    .and_then(|h| h.headers.get(CONTENT_LENGTH))
                    .and_then(|v| v.to_str().ok())
                    .and_then(|v| v.parse::<usize>().ok());
                if declared.is_some_and(|len| len > limit) {
                    return Err(Error::PayloadTooLarge(limit));
                }
                let bytes = read_limited(body, limit).await?;
                self.body = RequestBody::Buffered(bytes.clone());
                Ok(bytes)
            }
            RequestBody::Buffered(bytes) => {
                self.body = RequestBody::Buffered(bytes.clone());
                Ok(bytes)
            }
            RequestBody::Empty => Ok(Bytes::new()),
        }
    }

    fn decode(&self, slot: Slot, body: &Bytes) -> Result<Document> {
        let Some(router) = &self.router else {
            return Err(Error::Decode("context is not bound to a router".to_string()));
        };
        let fallback;
        let head = match &self.head {
            Some(head) => head,
            None => {
                fallback = empty_head();
                &fallback
            }
        };
        let input = DecodeInput { head, vars: &self.vars, body };
        let codecs = &router.server.codecs;
        match slot {
            Slot::Vars => (codecs.vars)(&input),
            Slot::Query => (codecs.query)(&input),
            Slot::Body => (codecs.body)(&input),
        }
    }

    /// Decode the request body into `T`.
    pub async fn bind<T: DeserializeOwned>(&mut self) -> Result<T> {
        let body = self.body().await?;
        self.decode(Slot::Body, &body)?.deserialize()
    }

    /// Decode the urlencoded body and query together into `T`.
    pub async fn bind_form<T: DeserializeOwned>(&mut self) -> Result<T> {
        let pairs = self.form().await?;
        let encoded = serde_urlencoded::to_string(&pairs).map_err(|e| Error::Decode(e.to_string()))?;
        Document::Form(encoded).deserialize()
    }

    /// Decode the path variables into `T`.
    pub fn bind_vars<T: DeserializeOwned>(&self) -> Result<T> {
        self.decode(Slot::Vars, &Bytes::new())?.deserialize()
    }

    /// Decode the query string into `T`.
    pub fn bind_query<T: DeserializeOwned>(&self) -> Result<T> {
        self.decode(Slot::Query, &Bytes::new())?.deserialize()
    }

    /// Encode `value` with the response encoder, or pass `Err` through.
    pub fn returns<T: Serialize>(&mut self, value: Result<T>) -> Result<()> {
        let value = value?;
        self.encode(&value)
    }

    /// Set `code` and encode `value` with the response encoder.
    pub fn result<T: Serialize>(&mut self, code: StatusCode, value: &T) -> Result<()> {
        self.writer.write_header(code);
        self.encode(value)
    }

    fn encode<T: Serialize>(&mut self, value: &T) -> Result<()> {
        let value = serde_json::to_value(value)?;
        let Some(router) = self.router.clone() else {
            return Err(Error::Encode("context is not bound to a router".to_string()));
        };
        let fallback;
        let head = match &self.head {
            Some(head) => head,
            None => {
                fallback = empty_head();
                &fallback
            }
        };
        (router.server.codecs.response)(&mut self.writer, head, &value)
    }

    /// Run the error encoder on a fresh writer.
    pub(crate) fn encode_error(&mut self, err: &Error) {
        self.writer.reset();
        let Some(router) = self.router.clone() else {
            self.writer.write_header(err.status_code());
            return;
        };
        let fallback;
        let head = match &self.head {
            Some(head) => head,
            None => {
                fallback = empty_head();
                &fallback
            }
        };
        (router.server.codecs.error)(&mut self.writer, head, err);
    }

    /// Write `value` as JSON.
    pub fn json<T: Serialize>(&mut self, code: StatusCode, value: &T) -> Result<()> {
        let body = serde_json::to_vec(value)?;
        self.blob(code, CONTENT_TYPE_JSON, &body)
    }

    /// Write plain text.
    pub fn string(&mut self, code: StatusCode, text: &str) -> Result<()> {
        self.blob(code, "text/plain; charset=utf-8", text.as_bytes())
    }

    /// Write raw bytes with the given content type.
    pub fn blob(&mut self, code: StatusCode, content_type: &str, data: &[u8]) -> Result<()> {
        self.writer.set_content_type(content_type);
        self.writer.write_header(code);
        self.writer.write(data);
        Ok(())
    }

    /// Stream `body` as the response.
    pub fn stream(&mut self, code: StatusCode, content_type: &str, body: Body) -> Result<()> {
        self.writer.set_content_type(content_type);
        self.writer.write_header(code);
        self.writer.write_stream(body);
        Ok(())
    }

    fn scope(&self) -> Cancellation {
        self.head
            .as_ref()
            .and_then(|h| h.extensions.get::<Cancellation>().cloned())
            .unwrap_or_default()
    }

    /// Deadline of the request scope, if one was set.
    pub fn deadline(&self) -> Option<Instant> {
        self.scope().deadline()
    }

    /// Resolves once the request scope is cancelled or times out.
    pub fn cancelled(&self) -> impl std::future::Future<Output = ()> + Send + 'static {
        let scope = self.scope();
        async move { scope.cancelled().await }
    }

    pub fn is_cancelled(&self) -> bool {
        self.scope().is_cancelled()
    }

    /// Why the request scope ended, `None` while it is live.
    pub fn err(&self) -> Option<Error> {
        self.scope().err()
    }

    /// Take the built response, leaving the writer empty.
    pub(crate) fn take_response(&mut self) -> axum::http::Response<Body> {
        self.writer.take_response()
    }
}

#[derive(Debug, Clone, Copy)]
enum Slot {
    Vars,
    Query,
    Body,
}

impl std::fmt::Debug for Context {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("Context")
            .field("bound", &self.head.is_some())
            .field("uri", &self.head.as_ref().map(|h| &h.uri))
            .field("vars", &self.vars)
            .field("status", &self.writer.status())
            .finish()
    }
}
