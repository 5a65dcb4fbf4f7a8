//! Access logging middleware.

use std::time::Instant;

use super::{Handler, Middleware, Reply};
use crate::transport::{self, Kind};

/// Emit one structured event per request: kind, operation, status, latency.
///
/// Failed requests log at `warn` with the error reason.
pub fn server() -> Middleware {
    Middleware::from_fn(|req, next: Handler| async move {
        let started = Instant::now();
        let method = req.method().clone();
        let path = req.uri().path().to_string();
        let tr = transport::from_request(&req);
        let kind = tr.as_ref().map_or(Kind::Http, |tr| tr.kind());

        let reply: Reply = next.call(req).await;

        // Read after the call: routing may have refined the operation.
        let operation = tr.map_or(path, |tr| tr.operation().to_string());
        let latency_ms = started.elapsed().as_secs_f64() * 1000.0;
        match &reply {
            Ok(response) => tracing::info!(
                kind = %kind,
                method = %method,
                operation = %operation,
                status = response.status().as_u16(),
                latency_ms,
                "request served"
            ),
            Err(err) => tracing::warn!(
                kind = %kind,
                method = %method,
                operation = %operation,
                status = err.status_code().as_u16(),
                reason = err.reason(),
                error = %err,
                latency_ms,
                "request failed"
            ),
        }
        reply
    })
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::error::Error;
    use crate::middleware::compose;
    use axum::body::Body;
    use axum::http::{Request, Response, StatusCode};

    #[tokio::test]
    async fn test_passes_replies_through() {
        let ok = Handler::new(|_req| async { Ok(Response::new(Body::from("fine"))) });
        let reply = compose(&[server()], ok).call(Request::new(Body::empty())).await;
        assert_eq!(reply.unwrap().status(), StatusCode::OK);

        let failing = Handler::new(|_req| async { Err(Error::forbidden("NOPE", "no access")) });
        let err = compose(&[server()], failing)
            .call(Request::new(Body::empty()))
            .await
            .unwrap_err();
        assert_eq!(err.reason(), "NOPE");
    }
}
