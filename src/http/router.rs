//! Route registration with inherited middleware.
//!
//! # Responsibilities
//! - Join group prefixes and normalize route templates
//! - Accumulate middleware down a group tree (parent first)
//! - Build the per-route chain: router middleware, route middleware,
//!   selector middleware, then the pooled-context invoke step
//!
//! # Design Decisions
//! - Groups never mutate their parent
//! - Selector middleware is resolved per request from the transport
//!   operation, not fixed at registration
//! - Handler failures are encoded here; the error still propagates so
//!   outer middleware can observe it

use std::sync::Arc;

use axum::body::Body;
use axum::http::{Method, Request};
use futures_util::future::BoxFuture;

use crate::error::Result;
use crate::http::context::Context;
use crate::http::filter::{PathVars, ReplySlot};
use crate::http::path::{join_paths, normalize_template};
use crate::http::pool::ContextPool;
use crate::http::server::{RouteInfo, RouteTable, ServerCore};
use crate::middleware::{compose, Handler, Middleware};
use crate::transport;

type RouteFn = dyn for<'a> Fn(&'a mut Context) -> BoxFuture<'a, Result<()>> + Send + Sync;

pub(crate) struct RouterInner {
    prefix: String,
    pub(crate) server: Arc<ServerCore>,
    middleware: Vec<Middleware>,
    pool: Arc<ContextPool>,
}

/// Registers routes under a shared prefix and middleware list.
#[derive(Clone)]
pub struct Router {
    inner: Arc<RouterInner>,
    table: Arc<RouteTable>,
}

macro_rules! method_routes {
    ($($name:ident => $method:ident),* $(,)?) => {
        $(
            #[doc = concat!("Register a `", stringify!($method), "` route.")]
            pub fn $name<H>(&self, path: &str, h: H, mw: impl IntoIterator<Item = Middleware>)
            where
                H: for<'a> Fn(&'a mut Context) -> BoxFuture<'a, Result<()>> + Send + Sync + 'static,
            {
                self.handle(Method::$method, path, h, mw)
            }
        )*
    };
}

impl Router {
    pub(crate) fn new(
        prefix: &str,
        server: Arc<ServerCore>,
        table: Arc<RouteTable>,
        middleware: Vec<Middleware>,
    ) -> Self {
        Self {
            inner: Arc::new(RouterInner {
                prefix: join_paths(prefix, ""),
                server,
                middleware,
                pool: Arc::new(ContextPool::new()),
            }),
            table,
        }
    }

    /// Joined path prefix of this router.
    pub fn prefix(&self) -> &str {
        &self.inner.prefix
    }

    /// Middleware every route of this router runs, outermost first.
    pub fn middleware(&self) -> &[Middleware] {
        &self.inner.middleware
    }

    /// Context pool backing this router's routes.
    pub fn pool(&self) -> &Arc<ContextPool> {
        &self.inner.pool
    }

    /// A child router under `prefix` that runs this router's middleware
    /// followed by `mw`.
    pub fn group(&self, prefix: &str, mw: impl IntoIterator<Item = Middleware>) -> Router {
        let mut middleware = self.inner.middleware.clone();
        middleware.extend(mw);
        Router::new(
            &join_paths(&self.inner.prefix, prefix),
            Arc::clone(&self.inner.server),
            Arc::clone(&self.table),
            middleware,
        )
    }

    /// Register `h` for `method` at `path`, wrapped by this router's
    /// middleware and then `mw`.
    ///
    /// ```ignore
    /// router.get("/users/:id", |ctx| Box::pin(async move {
    ///     let id = ctx.var("id").unwrap_or_default().to_string();
    ///     ctx.result(StatusCode::OK, &id)
    /// }), []);
    /// ```
    pub fn handle<H>(&self, method: Method, path: &str, h: H, mw: impl IntoIterator<Item = Middleware>)
    where
        H: for<'a> Fn(&'a mut Context) -> BoxFuture<'a, Result<()>> + Send + Sync + 'static,
    {
        let template = normalize_template(&join_paths(&self.inner.prefix, path));
        let mut middleware = self.inner.middleware.clone();
        middleware.extend(mw);

        let h: Arc<RouteFn> = Arc::new(h);
        let terminal = select(Arc::clone(&self.inner.server), invoke(Arc::clone(&self.inner), h));
        let chain = compose(&middleware, terminal);

        tracing::debug!(
            method = %method,
            path = %template,
            middleware = middleware.len(),
            "route registered"
        );
        self.table.add(Some(method), template, chain, true);
    }

    method_routes! {
        get => GET,
        post => POST,
        put => PUT,
        patch => PATCH,
        delete => DELETE,
        head => HEAD,
        options => OPTIONS,
        connect => CONNECT,
        trace => TRACE,
    }

    /// Visit every registered (method, path) pair of the server.
    pub fn walk_route<F>(&self, f: F) -> Result<()>
    where
        F: FnMut(RouteInfo) -> Result<()>,
    {
        self.table.walk(f)
    }
}

impl std::fmt::Debug for Router {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("Router")
            .field("prefix", &self.inner.prefix)
            .field("middleware", &self.inner.middleware.len())
            .finish()
    }
}

/// Operation whose selector middleware already wraps the request.
#[derive(Debug, Clone)]
pub(crate) struct SelectedOperation(pub(crate) String);

/// Runs the selector middleware matched for the request's operation.
fn select(server: Arc<ServerCore>, next: Handler) -> Handler {
    Handler::new(move |mut req: Request<Body>| {
        let operation = match transport::from_request(&req) {
            Some(tr) => tr.operation().to_string(),
            None => req.uri().path().to_string(),
        };
        let selected = server.matches(&operation);
        req.extensions_mut().insert(SelectedOperation(operation));
        compose(&selected, next.clone()).call(req)
    })
}

/// Checks out a context, runs the route handler and builds the reply.
fn invoke(router: Arc<RouterInner>, h: Arc<RouteFn>) -> Handler {
    Handler::new(move |req: Request<Body>| {
        let router = Arc::clone(&router);
        let h = Arc::clone(&h);
        async move {
            let (mut head, body) = req.into_parts();
            let vars = head
                .extensions
                .remove::<PathVars>()
                .map(|v| v.0)
                .unwrap_or_default();
            let slot = head.extensions.get::<ReplySlot>().cloned();

            let mut ctx = router.pool.checkout();
            ctx.attach(Some(Arc::clone(&router)), head, body, vars);

            let outcome = h(&mut *ctx).await;
            match outcome {
                Ok(()) => Ok(ctx.take_response()),
                Err(err) => {
                    ctx.encode_error(&err);
                    if let Some(slot) = slot {
                        slot.fill(ctx.take_response());
                    }
                    Err(err)
                }
            }
        }
    })
}
