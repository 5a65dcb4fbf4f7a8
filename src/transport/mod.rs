//! Transport context subsystem.
//!
//! # Data Flow
//! ```text
//! Server filter (per request)
//!     → cancel.rs (derive scope: base + timeout, guard cancels on exit)
//!     → Transport::new (operation = best-known path, endpoint, header snapshot)
//!     → with_transport (attach to request extensions)
//!     → router sets the resolved route template via set_operation
//!     → selector middleware, handlers and encoders read from_extensions
//! ```
//!
//! # Design Decisions
//! - One record per request, shared through `Arc`; mutation happens in place
//! - Only operation and path template change after creation
//! - Typed fields instead of an open key/value store

pub mod cancel;

use std::fmt;
use std::sync::{Arc, Mutex, PoisonError};

use arc_swap::ArcSwap;
use axum::http::header::{HeaderName, HeaderValue};
use axum::http::request::Parts;
use axum::http::{Extensions, HeaderMap, Request};

pub use cancel::{CancelGuard, CancelSource, Cancellation};

/// Transport kind, used for observability tags.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum Kind {
    Http,
}

impl fmt::Display for Kind {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Kind::Http => f.write_str("http"),
        }
    }
}

/// Request-scoped transport metadata.
pub struct Transport {
    kind: Kind,
    endpoint: String,
    operation: ArcSwap<String>,
    path_template: ArcSwap<String>,
    request: Parts,
    reply_header: Mutex<HeaderMap>,
}

impl Transport {
    /// Build the record for an inbound request.
    ///
    /// The request head (method, uri, version, headers) is snapshotted; the
    /// request's extensions are not carried over.
    pub fn new<B>(operation: impl Into<String>, endpoint: impl Into<String>, req: &Request<B>) -> Self {
        let operation = operation.into();
        let request = snapshot(req);

        Self {
            kind: Kind::Http,
            endpoint: endpoint.into(),
            operation: ArcSwap::from_pointee(operation.clone()),
            path_template: ArcSwap::from_pointee(operation),
            request,
            reply_header: Mutex::new(HeaderMap::new()),
        }
    }

    pub fn kind(&self) -> Kind {
        self.kind
    }

    /// Externally reachable server URL, empty before the listener is resolved.
    pub fn endpoint(&self) -> &str {
        &self.endpoint
    }

    /// Logical route identifier used for selector matching.
    pub fn operation(&self) -> Arc<String> {
        self.operation.load_full()
    }

    /// Replace the operation on this record.
    pub fn set_operation(&self, operation: impl Into<String>) {
        self.operation.store(Arc::new(operation.into()));
    }

    /// Registered path template of the matched route.
    pub fn path_template(&self) -> Arc<String> {
        self.path_template.load_full()
    }

    pub fn set_path_template(&self, template: impl Into<String>) {
        self.path_template.store(Arc::new(template.into()));
    }

    /// Snapshot of the inbound request head.
    pub fn request(&self) -> &Parts {
        &self.request
    }

    /// Inbound request headers.
    pub fn request_header(&self) -> &HeaderMap {
        &self.request.headers
    }

    /// Set a header to be added to the outgoing response.
    pub fn set_reply_header(&self, name: HeaderName, value: HeaderValue) {
        self.reply_header
            .lock()
            .unwrap_or_else(PoisonError::into_inner)
            .insert(name, value);
    }

    /// Headers queued for the outgoing response.
    pub fn reply_header(&self) -> HeaderMap {
        self.reply_header
            .lock()
            .unwrap_or_else(PoisonError::into_inner)
            .clone()
    }

    /// Move the queued reply headers onto `headers`, overriding existing values.
    pub fn merge_reply_header(&self, headers: &mut HeaderMap) {
        let mut queued = self.reply_header.lock().unwrap_or_else(PoisonError::into_inner);
        for (name, value) in queued.drain().filter_map(|(n, v)| n.map(|n| (n, v))) {
            headers.insert(name, value);
        }
    }
}

impl fmt::Debug for Transport {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("Transport")
            .field("kind", &self.kind)
            .field("endpoint", &self.endpoint)
            .field("operation", &self.operation())
            .field("path_template", &self.path_template())
            .field("method", &self.request.method)
            .field("uri", &self.request.uri)
            .finish()
    }
}

/// Copy of the request head without its extensions.
pub fn snapshot<B>(req: &Request<B>) -> Parts {
    let mut head = Request::new(());
    *head.method_mut() = req.method().clone();
    *head.uri_mut() = req.uri().clone();
    *head.version_mut() = req.version();
    *head.headers_mut() = req.headers().clone();
    head.into_parts().0
}

/// Attach the transport record to a request's extensions.
pub fn with_transport(extensions: &mut Extensions, tr: Arc<Transport>) {
    extensions.insert(tr);
}

/// The transport record attached to `extensions`, if any.
pub fn from_extensions(extensions: &Extensions) -> Option<Arc<Transport>> {
    extensions.get::<Arc<Transport>>().cloned()
}

/// The transport record attached to `req`, if any.
pub fn from_request<B>(req: &Request<B>) -> Option<Arc<Transport>> {
    from_extensions(req.extensions())
}

/// Update the operation of the record attached to `extensions`.
///
/// Returns false when no record is attached.
pub fn set_operation(extensions: &Extensions, operation: &str) -> bool {
    match extensions.get::<Arc<Transport>>() {
        Some(tr) => {
            tr.set_operation(operation);
            true
        }
        None => false,
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use axum::http::header;

    fn request() -> Request<()> {
        Request::builder()
            .method("POST")
            .uri("/users/42?verbose=1")
            .header(header::USER_AGENT, "test")
            .body(())
            .unwrap()
    }

    #[test]
    fn test_snapshot_of_request_head() {
        let req = request();
        let tr = Transport::new("/users/42", "http://127.0.0.1:8000", &req);
        assert_eq!(tr.kind(), Kind::Http);
        assert_eq!(tr.endpoint(), "http://127.0.0.1:8000");
        assert_eq!(tr.request().method, "POST");
        assert_eq!(tr.request().uri.path(), "/users/42");
        assert_eq!(tr.request_header().get(header::USER_AGENT).unwrap(), "test");
        assert_eq!(tr.operation().as_str(), "/users/42");
        assert_eq!(tr.path_template().as_str(), "/users/42");
    }

    #[test]
    fn test_set_operation_updates_the_same_record() {
        let mut req = request();
        let tr = Arc::new(Transport::new("/users/42", "", &req));
        with_transport(req.extensions_mut(), Arc::clone(&tr));

        assert!(set_operation(req.extensions(), "/users/{id}"));

        let seen = from_request(&req).unwrap();
        assert!(Arc::ptr_eq(&seen, &tr));
        assert_eq!(tr.operation().as_str(), "/users/{id}");
        // Endpoint and headers are fixed at creation.
        assert_eq!(seen.endpoint(), "");
        assert_eq!(seen.request_header().len(), 1);
    }

    #[test]
    fn test_set_operation_without_record() {
        let req = request();
        assert!(!set_operation(req.extensions(), "/x"));
        assert!(from_request(&req).is_none());
    }

    #[test]
    fn test_reply_headers_merge() {
        let tr = Transport::new("/", "", &request());
        tr.set_reply_header(
            HeaderName::from_static("x-trace-id"),
            HeaderValue::from_static("abc"),
        );
        assert_eq!(tr.reply_header().len(), 1);

        let mut headers = HeaderMap::new();
        headers.insert("x-trace-id", HeaderValue::from_static("old"));
        tr.merge_reply_header(&mut headers);
        assert_eq!(headers.get("x-trace-id").unwrap(), "abc");
        assert!(tr.reply_header().is_empty());
    }
}
