//! Request entry and route dispatch glue.
//!
//! # Responsibilities
//! - Derive the request scope (base scope plus timeout) and attach the
//!   transport record before anything else runs
//! - Run the global filters around the dispatch engine
//! - Turn a `>= 400` engine response into a coarse error for the filters
//! - Bind path variables and the route template for matched routes
//! - Answer unmatched paths and methods (trailing-slash redirect or 404)

use std::collections::HashMap;
use std::sync::{Arc, Mutex, PoisonError};

use axum::body::Body;
use axum::extract::rejection::RawPathParamsRejection;
use axum::extract::{RawPathParams, Request, State};
use axum::http::header::LOCATION;
use axum::http::request::Parts;
use axum::http::{HeaderValue, Method, Response, StatusCode};
use axum::middleware::Next;
use axum::response::IntoResponse;

use crate::error::Error;
use crate::http::path::toggle_trailing_slash;
use crate::http::server::{ServerCore, ServerShared};
use crate::http::writer::ResponseWriter;
use crate::middleware::{compose, Handler, Reply};
use crate::transport::{self, Transport};

/// Path variables of the matched route, in template order.
#[derive(Debug, Clone, Default)]
pub(crate) struct PathVars(pub(crate) Vec<(String, String)>);

/// Holds a response that was already written when an error is propagated
/// past the code that wrote it.
#[derive(Clone, Default)]
pub(crate) struct ReplySlot(Arc<Mutex<Option<Response<Body>>>>);

impl ReplySlot {
    pub(crate) fn fill(&self, response: Response<Body>) {
        *self.0.lock().unwrap_or_else(PoisonError::into_inner) = Some(response);
    }

    pub(crate) fn take(&self) -> Option<Response<Body>> {
        self.0.lock().unwrap_or_else(PoisonError::into_inner).take()
    }
}

impl std::fmt::Debug for ReplySlot {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.write_str("ReplySlot")
    }
}

/// Run the server's error encoder on a fresh writer.
pub(crate) fn encode_error(core: &ServerCore, head: &Parts, err: &Error) -> Response<Body> {
    let mut w = ResponseWriter::new();
    (core.codecs.error)(&mut w, head, err);
    w.take_response()
}

/// Server-level entry point for every request.
pub(crate) async fn server_filter(
    State(shared): State<Arc<ServerShared>>,
    mut req: Request,
    next: Next,
) -> Response<Body> {
    // The guard cancels the request scope on every exit path.
    let (scope, guard) = shared.base().child(shared.timeout);
    let tr = Arc::new(Transport::new(
        req.uri().path(),
        shared.endpoint_str(),
        &req,
    ));
    transport::with_transport(req.extensions_mut(), Arc::clone(&tr));
    req.extensions_mut().insert(scope);

    let slot = ReplySlot::default();
    let terminal = {
        let slot = slot.clone();
        let next = Arc::new(Mutex::new(Some(next)));
        Handler::new(move |req: Request| {
            let next = next.lock().unwrap_or_else(PoisonError::into_inner).take();
            let slot = slot.clone();
            async move {
                let Some(next) = next else {
                    return Err(Error::internal("DISPATCH", "request already dispatched"));
                };
                translate_status(next.run(req).await, &slot)
            }
        })
    };

    let outcome = compose(&shared.filters, terminal).call(req).await;
    let mut response = match outcome {
        Ok(response) => response,
        Err(err) => slot
            .take()
            .unwrap_or_else(|| encode_error(&shared.core, tr.request(), &err)),
    };
    tr.merge_reply_header(response.headers_mut());
    drop(guard);
    response
}

/// A failed engine response becomes a status-only error. The response itself
/// is kept and still sent.
fn translate_status(response: Response<Body>, slot: &ReplySlot) -> Reply {
    let status = response.status();
    if status.as_u16() >= 400 {
        slot.fill(response);
        Err(Error::from_status(status))
    } else {
        Ok(response)
    }
}

/// Dispatch a matched route to its composed chain.
pub(crate) async fn dispatch(
    core: Arc<ServerCore>,
    template: Arc<str>,
    chain: Handler,
    rewrite_operation: bool,
    params: Result<RawPathParams, RawPathParamsRejection>,
    mut req: Request,
) -> Response<Body> {
    let vars = params
        .map(|params| {
            params
                .iter()
                .map(|(k, v)| (k.to_string(), v.to_string()))
                .collect()
        })
        .unwrap_or_default();

    let tr = transport::from_request(&req);
    if rewrite_operation {
        if let Some(tr) = &tr {
            tr.set_operation(&*template);
            tr.set_path_template(&*template);
        }
    }
    let head = match &tr {
        Some(_) => None,
        None => Some(transport::snapshot(&req)),
    };

    let slot = ReplySlot::default();
    req.extensions_mut().insert(PathVars(vars));
    req.extensions_mut().insert(slot.clone());

    match chain.call(req).await {
        Ok(response) => response,
        Err(err) => match slot.take() {
            Some(response) => response,
            None => match &tr {
                Some(tr) => encode_error(&core, tr.request(), &err),
                None => {
                    let head = head.unwrap_or_else(|| transport::snapshot(&Request::new(Body::empty())));
                    encode_error(&core, &head, &err)
                }
            },
        },
    }
}

/// Registered templates per method, consulted for trailing-slash redirects.
#[derive(Default)]
pub(crate) struct RouteProbe {
    by_method: HashMap<Method, matchit::Router<()>>,
    any: matchit::Router<()>,
}

impl RouteProbe {
    /// Record `path` for `method`; `None` serves every method.
    pub(crate) fn insert(&mut self, method: Option<&Method>, path: &str) -> Result<(), matchit::InsertError> {
        match method {
            Some(method) => self.by_method.entry(method.clone()).or_default().insert(path, ()),
            None => self.any.insert(path, ()),
        }
    }

    /// Whether a route answers `method` at `path`.
    pub(crate) fn has(&self, method: &Method, path: &str) -> bool {
        self.any.at(path).is_ok()
            || self
                .by_method
                .get(method)
                .is_some_and(|router| router.at(path).is_ok())
    }
}

/// Unmatched paths and methods: redirect to the slash-toggled path if it is
/// routed for the same method, otherwise 404.
pub(crate) async fn not_found(
    probe: Arc<RouteProbe>,
    strict_slash: bool,
    req: Request,
) -> Response<Body> {
    if strict_slash {
        if let Some(alternate) = toggle_trailing_slash(req.uri().path()) {
            if probe.has(req.method(), &alternate) {
                let location = match req.uri().query() {
                    Some(query) => format!("{alternate}?{query}"),
                    None => alternate,
                };
                let status = if req.method() == Method::GET {
                    StatusCode::MOVED_PERMANENTLY
                } else {
                    StatusCode::TEMPORARY_REDIRECT
                };
                if let Ok(location) = HeaderValue::from_str(&location) {
                    return (status, [(LOCATION, location)]).into_response();
                }
            }
        }
    }
    (StatusCode::NOT_FOUND, "404 page not found").into_response()
}
