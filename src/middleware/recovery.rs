//! Panic recovery middleware.
//!
//! # Responsibilities
//! - Catch panics raised while polling the inner chain
//! - Turn them into a 500 `Error::Panic` the error encoder can write
//!
//! # Design Decisions
//! - Install as the outermost filter so every layer below is covered
//! - Pooled contexts are still released: their guards drop with the
//!   abandoned future

use std::any::Any;
use std::panic::AssertUnwindSafe;

use futures_util::FutureExt;

use super::{Handler, Middleware};
use crate::error::Error;

/// Convert a panic in the wrapped chain into an error reply.
pub fn recovery() -> Middleware {
    Middleware::from_fn(|req, next: Handler| async move {
        let path = req.uri().path().to_string();
        match AssertUnwindSafe(next.call(req)).catch_unwind().await {
            Ok(reply) => reply,
            Err(payload) => {
                let message = panic_message(payload.as_ref());
                tracing::error!(path = %path, panic = %message, "handler panicked");
                Err(Error::Panic(message))
            }
        }
    })
}

fn panic_message(payload: &(dyn Any + Send)) -> String {
    if let Some(s) = payload.downcast_ref::<&str>() {
        (*s).to_string()
    } else if let Some(s) = payload.downcast_ref::<String>() {
        s.clone()
    } else {
        "unknown panic".to_string()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::middleware::compose;
    use axum::body::Body;
    use axum::http::{Request, StatusCode};

    #[tokio::test]
    async fn test_panic_becomes_error() {
        let boom = Handler::new(|_req| async {
            if true {
                panic!("database on fire");
            }
            Ok(axum::http::Response::new(Body::empty()))
        });

        let err = compose(&[recovery()], boom)
            .call(Request::new(Body::empty()))
            .await
            .unwrap_err();
        assert_eq!(err.status_code(), StatusCode::INTERNAL_SERVER_ERROR);
        assert!(err.to_string().contains("database on fire"));
    }

    #[test]
    fn test_panic_message_kinds() {
        assert_eq!(panic_message(&"static"), "static");
        assert_eq!(panic_message(&String::from("owned")), "owned");
        assert_eq!(panic_message(&42u8), "unknown panic");
    }
}
