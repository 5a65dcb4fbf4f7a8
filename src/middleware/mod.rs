//! Middleware subsystem.
//!
//! # Data Flow
//! ```text
//! Request<Body>
//!     → m1 (outermost, sees the call first)
//!     → m2
//!     → ...
//!     → terminal Handler
//!     ← Result<Response<Body>, Error> unwinds back through mN ... m1
//! ```
//!
//! # Design Decisions
//! - One middleware shape for every level: server filters, router and route
//!   middleware, and selector middleware resolved by operation
//! - Request-scoped data travels in `http::Extensions`, not in extra arguments
//! - Composition is a pure function; chains are rebuilt cheaply per request

pub mod logging;
pub mod recovery;
pub mod selector;

use std::fmt;
use std::future::Future;
use std::sync::Arc;

use axum::body::Body;
use axum::http::{Request, Response};
use futures_util::future::BoxFuture;

use crate::error::Error;

pub use selector::{Matcher, Selector};

/// Outcome of a handler call.
pub type Reply = Result<Response<Body>, Error>;

type HandlerFn = dyn Fn(Request<Body>) -> BoxFuture<'static, Reply> + Send + Sync;
type MiddlewareFn = dyn Fn(Handler) -> Handler + Send + Sync;

/// A type-erased asynchronous request handler.
#[derive(Clone)]
pub struct Handler {
    inner: Arc<HandlerFn>,
}

impl Handler {
    /// Wrap an async function as a handler.
    pub fn new<F, Fut>(f: F) -> Self
    where
        F: Fn(Request<Body>) -> Fut + Send + Sync + 'static,
        Fut: Future<Output = Reply> + Send + 'static,
    {
        let inner: Arc<HandlerFn> =
            Arc::new(move |req: Request<Body>| -> BoxFuture<'static, Reply> { Box::pin(f(req)) });
        Self { inner }
    }

    /// Invoke the handler.
    pub fn call(&self, req: Request<Body>) -> BoxFuture<'static, Reply> {
        (self.inner)(req)
    }
}

impl fmt::Debug for Handler {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str("Handler")
    }
}

/// Wraps a handler into another handler with the same signature.
#[derive(Clone)]
pub struct Middleware {
    inner: Arc<MiddlewareFn>,
}

impl Middleware {
    /// Create a middleware from a handler transformer.
    pub fn new<F>(f: F) -> Self
    where
        F: Fn(Handler) -> Handler + Send + Sync + 'static,
    {
        Self { inner: Arc::new(f) }
    }

    /// Create a middleware from an async function receiving the request and
    /// the next handler.
    ///
    /// ```ignore
    /// let auth = Middleware::from_fn(|req, next| async move {
    ///     if req.headers().contains_key("authorization") {
    ///         next.call(req).await
    ///     } else {
    ///         Err(Error::unauthorized("MISSING_TOKEN", "authorization required"))
    ///     }
    /// });
    /// ```
    pub fn from_fn<F, Fut>(f: F) -> Self
    where
        F: Fn(Request<Body>, Handler) -> Fut + Send + Sync + 'static,
        Fut: Future<Output = Reply> + Send + 'static,
    {
        let f = Arc::new(f);
        Self::new(move |next| {
            let f = Arc::clone(&f);
            Handler::new(move |req| (*f)(req, next.clone()))
        })
    }

    /// Wrap `next` with this middleware.
    pub fn wrap(&self, next: Handler) -> Handler {
        (self.inner)(next)
    }
}

impl fmt::Debug for Middleware {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str("Middleware")
    }
}

/// Compose `middleware` around `terminal`.
///
/// `[m1, m2, m3]` yields `m1(m2(m3(terminal)))`: `m1` observes the call first.
pub fn compose(middleware: &[Middleware], terminal: Handler) -> Handler {
    middleware
        .iter()
        .rev()
        .fold(terminal, |next, m| m.wrap(next))
}

/// Collapse an ordered list of middleware into a single middleware.
pub fn chain(middleware: &[Middleware]) -> Middleware {
    let middleware: Arc<[Middleware]> = middleware.to_vec().into();
    Middleware::new(move |next| compose(&middleware, next))
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::sync::Mutex;

    fn traced(name: &'static str, trace: Arc<Mutex<Vec<String>>>) -> Middleware {
        Middleware::from_fn(move |req, next| {
            let trace = Arc::clone(&trace);
            async move {
                trace.lock().unwrap().push(format!("{name}:in"));
                let reply = next.call(req).await;
                trace.lock().unwrap().push(format!("{name}:out"));
                reply
            }
        })
    }

    fn terminal(trace: Arc<Mutex<Vec<String>>>) -> Handler {
        Handler::new(move |_req| {
            let trace = Arc::clone(&trace);
            async move {
                trace.lock().unwrap().push("h".to_string());
                Ok(Response::new(Body::empty()))
            }
        })
    }

    #[tokio::test]
    async fn compose_runs_in_registration_order() {
        let trace = Arc::new(Mutex::new(Vec::new()));
        let mws = vec![
            traced("m1", Arc::clone(&trace)),
            traced("m2", Arc::clone(&trace)),
            traced("m3", Arc::clone(&trace)),
        ];

        let handler = compose(&mws, terminal(Arc::clone(&trace)));
        handler.call(Request::new(Body::empty())).await.unwrap();

        assert_eq!(
            *trace.lock().unwrap(),
            vec!["m1:in", "m2:in", "m3:in", "h", "m3:out", "m2:out", "m1:out"]
        );
    }

    #[tokio::test]
    async fn compose_without_middleware_is_terminal() {
        let trace = Arc::new(Mutex::new(Vec::new()));
        let handler = compose(&[], terminal(Arc::clone(&trace)));
        handler.call(Request::new(Body::empty())).await.unwrap();
        assert_eq!(*trace.lock().unwrap(), vec!["h"]);
    }

    #[tokio::test]
    async fn chain_matches_compose() {
        let trace = Arc::new(Mutex::new(Vec::new()));
        let chained = chain(&[traced("a", Arc::clone(&trace)), traced("b", Arc::clone(&trace))]);
        let outer = traced("outer", Arc::clone(&trace));

        let handler = compose(&[outer, chained], terminal(Arc::clone(&trace)));
        handler.call(Request::new(Body::empty())).await.unwrap();

        assert_eq!(
            *trace.lock().unwrap(),
            vec!["outer:in", "a:in", "b:in", "h", "b:out", "a:out", "outer:out"]
        );
    }

    #[tokio::test]
    async fn short_circuit_skips_inner_handlers() {
        let trace = Arc::new(Mutex::new(Vec::new()));
        let deny = Middleware::from_fn(|_req, _next| async move {
            Err(Error::unauthorized("DENIED", "no"))
        });

        let handler = compose(&[deny], terminal(Arc::clone(&trace)));
        let err = handler.call(Request::new(Body::empty())).await.unwrap_err();

        assert_eq!(err.reason(), "DENIED");
        assert!(trace.lock().unwrap().is_empty());
    }
}
