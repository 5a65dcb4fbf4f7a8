//! HTTP server: options, dispatch engine and lifecycle.
//!
//! # Responsibilities
//! - Collect server options (network, address, timeout, filters, selector
//!   middleware, codec slots, TLS, strict slash, pre-bound listener)
//! - Own the route table shared by every router
//! - Build the axum service: trace layer → server filter → dispatch engine
//! - Resolve the listener and endpoint lazily, serve, and shut down gracefully

use std::net::TcpListener;
use std::sync::{Arc, Mutex, OnceLock, PoisonError, RwLock};
use std::time::Duration;

use axum::extract::rejection::RawPathParamsRejection;
use axum::extract::{RawPathParams, Request};
use axum::http::Method;
use axum::routing::{MethodFilter, MethodRouter};
use axum_server::tls_rustls::RustlsConfig;
use axum_server::Handle;
use tower_http::trace::TraceLayer;
use url::Url;

use crate::config::ServerConfig;
use crate::error::{Error, Result};
use crate::http::codec::{Codecs, DecodeRequestFunc, EncodeErrorFunc, EncodeResponseFunc};
use crate::http::filter::{dispatch, not_found, server_filter, RouteProbe};
use crate::http::path::{join_paths, normalize_template};
use crate::http::router::Router;
use crate::middleware::{Handler, Matcher, Middleware};
use crate::net::{self, Network};
use crate::transport::{CancelSource, Cancellation};

/// Default request body limit for `Context::bind`.
pub const DEFAULT_BODY_LIMIT: usize = 4 * 1024 * 1024;

/// A registered (method, path) pair.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct RouteInfo {
    pub method: Method,
    pub path: String,
}

/// Request-time state reachable from every route.
pub(crate) struct ServerCore {
    pub(crate) codecs: Codecs,
    pub(crate) body_limit: usize,
    matcher: RwLock<Matcher<Middleware>>,
}

impl ServerCore {
    /// Selector middleware for `operation`, general to specific.
    pub(crate) fn matches(&self, operation: &str) -> Vec<Middleware> {
        self.matcher
            .read()
            .unwrap_or_else(PoisonError::into_inner)
            .matches(operation)
    }
}

#[derive(Clone)]
struct RouteEntry {
    /// `None` answers every method and is not listed by `walk_route`.
    method: Option<Method>,
    path: String,
    handler: Handler,
    rewrite_operation: bool,
}

/// Routes of one server, in registration order.
#[derive(Default)]
pub(crate) struct RouteTable {
    entries: Mutex<Vec<RouteEntry>>,
}

impl RouteTable {
    pub(crate) fn add(&self, method: Option<Method>, path: String, handler: Handler, rewrite_operation: bool) {
        let mut entries = self.entries.lock().unwrap_or_else(PoisonError::into_inner);
        let entry = RouteEntry { method, path, handler, rewrite_operation };
        match entries
            .iter_mut()
            .find(|e| e.method == entry.method && e.path == entry.path)
        {
            Some(existing) => {
                tracing::warn!(
                    method = ?entry.method,
                    path = %entry.path,
                    "route registered twice, replacing"
                );
                *existing = entry;
            }
            None => entries.push(entry),
        }
    }

    pub(crate) fn walk<F>(&self, mut f: F) -> Result<()>
    where
        F: FnMut(RouteInfo) -> Result<()>,
    {
        let routes: Vec<RouteInfo> = self
            .entries
            .lock()
            .unwrap_or_else(PoisonError::into_inner)
            .iter()
            .filter_map(|e| {
                e.method.clone().map(|method| RouteInfo {
                    method,
                    path: e.path.clone(),
                })
            })
            .collect();
        routes.into_iter().try_for_each(&mut f)
    }

    fn entries(&self) -> Vec<RouteEntry> {
        self.entries
            .lock()
            .unwrap_or_else(PoisonError::into_inner)
            .clone()
    }
}

pub(crate) struct ServerShared {
    pub(crate) core: Arc<ServerCore>,
    table: Arc<RouteTable>,
    network: String,
    address: String,
    pub(crate) timeout: Duration,
    pub(crate) filters: Vec<Middleware>,
    tls: Option<RustlsConfig>,
    strict_slash: bool,
    listener: Mutex<Option<TcpListener>>,
    endpoint: OnceLock<Url>,
    root: CancelSource,
    base: Mutex<Cancellation>,
    handle: Handle,
}

impl ServerShared {
    /// Scope every request scope derives from.
    pub(crate) fn base(&self) -> Cancellation {
        self.base.lock().unwrap_or_else(PoisonError::into_inner).clone()
    }

    /// `scheme://host:port`, empty before the endpoint is resolved.
    pub(crate) fn endpoint_str(&self) -> &str {
        self.endpoint
            .get()
            .map(|url| url.as_str().trim_end_matches('/'))
            .unwrap_or_default()
    }
}

/// Builder for [`Server`].
pub struct ServerBuilder {
    network: String,
    address: String,
    timeout: Duration,
    filters: Vec<Middleware>,
    matcher: Matcher<Middleware>,
    codecs: Codecs,
    tls: Option<RustlsConfig>,
    strict_slash: bool,
    listener: Option<TcpListener>,
    body_limit: usize,
}

impl Default for ServerBuilder {
    fn default() -> Self {
        Self {
            network: "tcp".to_string(),
            address: ":0".to_string(),
            timeout: Duration::from_secs(1),
            filters: Vec::new(),
            matcher: Matcher::new(),
            codecs: Codecs::default(),
            tls: None,
            strict_slash: true,
            listener: None,
            body_limit: DEFAULT_BODY_LIMIT,
        }
    }
}

impl ServerBuilder {
    /// Options from a loaded config file. TLS material is read from disk.
    pub async fn from_config(config: &ServerConfig) -> Result<Self> {
        let mut builder = Server::builder()
            .network(&config.network)
            .address(&config.address)
            .timeout(Duration::from_millis(config.timeout_ms))
            .strict_slash(config.strict_slash)
            .body_limit(config.body_limit);
        if let Some(tls) = &config.tls {
            let tls = net::tls::load_tls_config(&tls.cert_path, &tls.key_path)
                .await
                .map_err(Error::Tls)?;
            builder = builder.tls_config(tls);
        }
        Ok(builder)
    }

    /// `tcp`, `tcp4` or `tcp6`.
    pub fn network(mut self, network: &str) -> Self {
        self.network = network.to_string();
        self
    }

    /// Listen address. `":8000"` listens on every interface.
    pub fn address(mut self, address: &str) -> Self {
        self.address = address.to_string();
        self
    }

    /// Per-request timeout. Zero disables it.
    pub fn timeout(mut self, timeout: Duration) -> Self {
        self.timeout = timeout;
        self
    }

    /// Append global filters, run around the whole dispatch engine.
    pub fn filter(mut self, filters: impl IntoIterator<Item = Middleware>) -> Self {
        self.filters.extend(filters);
        self
    }

    /// Register selector middleware for operations matching `selector`.
    pub fn middleware(mut self, selector: &str, mw: impl IntoIterator<Item = Middleware>) -> Self {
        self.matcher.add(selector, mw);
        self
    }

    pub fn request_vars_decoder(mut self, dec: DecodeRequestFunc) -> Self {
        self.codecs.vars = dec;
        self
    }

    pub fn request_query_decoder(mut self, dec: DecodeRequestFunc) -> Self {
        self.codecs.query = dec;
        self
    }

    pub fn request_decoder(mut self, dec: DecodeRequestFunc) -> Self {
        self.codecs.body = dec;
        self
    }

    pub fn response_encoder(mut self, enc: EncodeResponseFunc) -> Self {
        self.codecs.response = enc;
        self
    }

    pub fn error_encoder(mut self, enc: EncodeErrorFunc) -> Self {
        self.codecs.error = enc;
        self
    }

    /// Serve HTTPS with the given rustls config.
    pub fn tls_config(mut self, tls: RustlsConfig) -> Self {
        self.tls = Some(tls);
        self
    }

    /// Redirect `/a/` to `/a` (and back) when only the other form is routed.
    pub fn strict_slash(mut self, strict_slash: bool) -> Self {
        self.strict_slash = strict_slash;
        self
    }

    /// Serve on an already bound listener instead of binding `address`.
    pub fn listener(mut self, listener: TcpListener) -> Self {
        self.listener = Some(listener);
        self
    }

    /// Largest request body `Context::bind` reads.
    pub fn body_limit(mut self, limit: usize) -> Self {
        self.body_limit = limit;
        self
    }

    pub fn build(self) -> Server {
        let root = CancelSource::new();
        let base = Mutex::new(root.token());
        let core = Arc::new(ServerCore {
            codecs: self.codecs,
            body_limit: self.body_limit,
            matcher: RwLock::new(self.matcher),
        });
        Server {
            shared: Arc::new(ServerShared {
                core,
                table: Arc::new(RouteTable::default()),
                network: self.network,
                address: self.address,
                timeout: self.timeout,
                filters: self.filters,
                tls: self.tls,
                strict_slash: self.strict_slash,
                listener: Mutex::new(self.listener),
                endpoint: OnceLock::new(),
                root,
                base,
                handle: Handle::new(),
            }),
        }
    }
}

/// An HTTP server.
#[derive(Clone)]
pub struct Server {
    shared: Arc<ServerShared>,
}

impl Server {
    pub fn builder() -> ServerBuilder {
        ServerBuilder::default()
    }

    /// Add selector middleware after construction. Register before serving.
    pub fn use_middleware(&self, selector: &str, mw: impl IntoIterator<Item = Middleware>) {
        self.shared
            .core
            .matcher
            .write()
            .unwrap_or_else(PoisonError::into_inner)
            .add(selector, mw);
    }

    /// A router rooted at `prefix` running `mw` around each of its routes.
    pub fn route(&self, prefix: &str, mw: impl IntoIterator<Item = Middleware>) -> Router {
        Router::new(
            prefix,
            Arc::clone(&self.shared.core),
            Arc::clone(&self.shared.table),
            mw.into_iter().collect(),
        )
    }

    /// Serve `path` with a raw handler for every method.
    pub fn handle(&self, path: &str, h: Handler) {
        let path = normalize_template(&join_paths("/", path));
        self.shared.table.add(None, path, h, false);
    }

    /// Serve `prefix` and everything below it with a raw handler.
    pub fn handle_prefix(&self, prefix: &str, h: Handler) {
        let prefix = join_paths("/", prefix);
        let below = join_paths(&prefix, "{*path}");
        self.shared.table.add(None, prefix, h.clone(), false);
        self.shared.table.add(None, below, h, false);
    }

    /// Visit every registered (method, path) pair, stopping at the first error.
    /// Raw handlers without a method are skipped.
    pub fn walk_route<F>(&self, f: F) -> Result<()>
    where
        F: FnMut(RouteInfo) -> Result<()>,
    {
        self.shared.table.walk(f)
    }

    /// The full request stack as an axum router.
    pub fn service(&self) -> axum::Router {
        axum::Router::new()
            .fallback_service(self.engine())
            .layer(axum::middleware::from_fn_with_state(
                Arc::clone(&self.shared),
                server_filter,
            ))
            .layer(TraceLayer::new_for_http())
    }

    /// Dispatch engine over the current route table.
    fn engine(&self) -> axum::Router {
        // `templates` rejects conflicting paths; `probe` records which
        // methods each path answers.
        let mut templates = matchit::Router::new();
        let mut probe = RouteProbe::default();
        let mut paths: Vec<(String, MethodRouter, bool)> = Vec::new();

        for entry in self.shared.table.entries() {
            let index = match paths.iter().position(|(p, _, _)| *p == entry.path) {
                Some(index) => index,
                None => {
                    if let Err(err) = check_template(&entry.path).and_then(|()| {
                        templates
                            .insert(entry.path.as_str(), ())
                            .map_err(|e| Error::InvalidOption(e.to_string()))
                    }) {
                        tracing::error!(path = %entry.path, error = %err, "route rejected");
                        continue;
                    }
                    paths.push((entry.path.clone(), MethodRouter::new(), false));
                    paths.len() - 1
                }
            };

            let core = Arc::clone(&self.shared.core);
            let template: Arc<str> = entry.path.as_str().into();
            let chain = entry.handler;
            let rewrite = entry.rewrite_operation;
            let handler = move |params: std::result::Result<RawPathParams, RawPathParamsRejection>,
                                req: Request| {
                dispatch(
                    Arc::clone(&core),
                    Arc::clone(&template),
                    chain.clone(),
                    rewrite,
                    params,
                    req,
                )
            };

            let (path, method_router, any_method) = &mut paths[index];
            let current = std::mem::replace(method_router, MethodRouter::new());
            let routed = match &entry.method {
                None => {
                    *any_method = true;
                    *method_router = current.fallback(handler);
                    true
                }
                Some(method) => match MethodFilter::try_from(method.clone()) {
                    Ok(filter) => {
                        *method_router = current.on(filter, handler);
                        true
                    }
                    Err(_) => {
                        tracing::error!(method = %method, path = %path, "unsupported method, route skipped");
                        *method_router = current;
                        false
                    }
                },
            };
            if routed {
                if let Err(err) = probe.insert(entry.method.as_ref(), path) {
                    tracing::warn!(path = %path, error = %err, "route missing from redirect probe");
                }
            }
        }

        let probe = Arc::new(probe);
        let strict_slash = self.shared.strict_slash;
        let unmatched = move |req: Request| not_found(Arc::clone(&probe), strict_slash, req);
        paths
            .into_iter()
            .fold(axum::Router::new(), |router, (path, method_router, any_method)| {
                // Wrong method on a routed path answers like an unknown path.
                let method_router = if any_method {
                    method_router
                } else {
                    method_router.fallback(unmatched.clone())
                };
                router.route(&path, method_router)
            })
            .fallback(unmatched)
    }

    /// Externally reachable URL. Binds the listener on first call.
    pub fn endpoint(&self) -> Result<Url> {
        let mut listener = self
            .shared
            .listener
            .lock()
            .unwrap_or_else(PoisonError::into_inner);
        if let Some(url) = self.shared.endpoint.get() {
            return Ok(url.clone());
        }

        let bound = match listener.take() {
            Some(bound) => bound,
            None => {
                let network: Network = self.shared.network.parse()?;
                net::listener::bind(network, &self.shared.address)?
            }
        };
        let local = bound.local_addr().map_err(|source| Error::Listen {
            address: self.shared.address.clone(),
            source,
        })?;
        let scheme = if self.shared.tls.is_some() { "https" } else { "http" };
        let url = net::host::endpoint_url(scheme, local)?;

        *listener = Some(bound);
        let _ = self.shared.endpoint.set(url.clone());
        Ok(url)
    }

    /// Serve until `base` is cancelled or [`Server::stop`] is called.
    ///
    /// A graceful shutdown ends with `Ok`.
    pub async fn start(&self, base: Cancellation) -> Result<()> {
        let endpoint = self.endpoint()?;
        let listener = self
            .shared
            .listener
            .lock()
            .unwrap_or_else(PoisonError::into_inner)
            .take()
            .ok_or_else(|| Error::InvalidOption("server already started".to_string()))?;

        *self.shared.base.lock().unwrap_or_else(PoisonError::into_inner) =
            base.join(&self.shared.root.token());

        let handle = self.shared.handle.clone();
        let watcher = {
            let handle = handle.clone();
            tokio::spawn(async move {
                base.cancelled().await;
                handle.graceful_shutdown(None);
            })
        };

        tracing::info!(
            endpoint = %endpoint,
            tls = self.shared.tls.is_some(),
            "[HTTP] server listening"
        );

        let app = self.service().into_make_service();
        let served = match &self.shared.tls {
            Some(tls) => {
                axum_server::from_tcp_rustls(listener, tls.clone())
                    .handle(handle)
                    .serve(app)
                    .await
            }
            None => axum_server::from_tcp(listener).handle(handle).serve(app).await,
        };
        watcher.abort();

        tracing::info!(endpoint = %endpoint, "[HTTP] server stopped");
        served.map_err(Error::Serve)
    }

    /// Stop accepting, cancel in-flight request scopes and wait up to `grace`
    /// for open connections to finish.
    pub async fn stop(&self, grace: Duration) -> Result<()> {
        tracing::info!(grace_ms = grace.as_millis() as u64, "[HTTP] server stopping");
        self.shared.handle.graceful_shutdown(Some(grace));
        self.shared.root.cancel();

        let handle = self.shared.handle.clone();
        let drained = tokio::time::timeout(grace, async move {
            while handle.connection_count() > 0 {
                tokio::time::sleep(Duration::from_millis(10)).await;
            }
        })
        .await;
        drained.map_err(|_| Error::ShutdownTimeout(grace))
    }
}

impl std::fmt::Debug for Server {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("Server")
            .field("network", &self.shared.network)
            .field("address", &self.shared.address)
            .field("timeout", &self.shared.timeout)
            .field("tls", &self.shared.tls.is_some())
            .field("endpoint", &self.shared.endpoint.get())
            .finish()
    }
}

/// Reject templates the dispatch engine would refuse at registration.
fn check_template(path: &str) -> Result<()> {
    if !path.starts_with('/') {
        return Err(Error::InvalidOption(format!("path must start with '/': {path}")));
    }
    if path.split('/').any(|s| s.starts_with(':') || s.starts_with('*')) {
        return Err(Error::InvalidOption(format!("unnamed path parameter in {path}")));
    }
    Ok(())
}
