//! Server lifecycle tests over real sockets.

use std::time::Duration;

use axum::http::StatusCode;
use http_transport::middleware::logging;
use http_transport::transport::CancelSource;
use http_transport::{Error, Server};

mod common;

fn ping_routes(server: &Server) {
    server.route("/", []).get(
        "/ping",
        |ctx| Box::pin(async move { ctx.result(StatusCode::OK, &"pong") }),
        [],
    );
}

#[tokio::test]
async fn test_serves_and_stops() {
    let running = common::start_server(
        Server::builder().filter([logging::server()]),
        ping_routes,
    )
    .await;

    let resp = common::client().get(running.url("/ping")).send().await.unwrap();
    assert_eq!(resp.status(), 200);
    assert_eq!(
        resp.headers().get("content-type").unwrap(),
        "application/json"
    );
    assert_eq!(resp.text().await.unwrap(), "\"pong\"");

    running.stop().await.unwrap();
}

#[tokio::test]
async fn test_base_cancellation_ends_start_gracefully() {
    let running = common::start_server(Server::builder(), ping_routes).await;
    let resp = common::client().get(running.url("/ping")).send().await.unwrap();
    assert_eq!(resp.status(), 200);

    running.shutdown.cancel();
    let result = tokio::time::timeout(Duration::from_secs(2), running.task)
        .await
        .expect("start returned")
        .unwrap();
    assert!(result.is_ok());
}

#[tokio::test]
async fn test_stop_cancels_in_flight_requests() {
    let running = common::start_server(
        Server::builder().timeout(Duration::ZERO),
        |server| {
            server.route("/", []).get(
                "/wait",
                |ctx| {
                    Box::pin(async move {
                        tokio::select! {
                            _ = ctx.cancelled() => {}
                            _ = tokio::time::sleep(Duration::from_secs(5)) => {}
                        }
                        let reason = ctx.err().map(|e| e.reason().to_string()).unwrap_or_default();
                        ctx.string(StatusCode::OK, &reason)
                    })
                },
                [],
            );
        },
    )
    .await;

    let url = running.url("/wait");
    let request = tokio::spawn(async move { common::client().get(url).send().await });
    tokio::time::sleep(Duration::from_millis(100)).await;

    running.server.stop(Duration::from_secs(2)).await.unwrap();

    let resp = request.await.unwrap().unwrap();
    assert_eq!(resp.status(), 200);
    assert_eq!(resp.text().await.unwrap(), "CANCELED");
    assert!(running.task.await.unwrap().is_ok());
}

#[tokio::test]
async fn test_endpoint_stable_across_start() {
    let running = common::start_server(Server::builder(), ping_routes).await;
    let before = running.server.endpoint().unwrap();
    assert_eq!(before.as_str().trim_end_matches('/'), running.base_url);

    // Once a request is served the listener belongs to the running server.
    let resp = common::client().get(running.url("/ping")).send().await.unwrap();
    assert_eq!(resp.status(), 200);
    assert_eq!(running.server.endpoint().unwrap(), before);

    let second = running.server.start(CancelSource::new().token()).await;
    assert!(matches!(second, Err(Error::InvalidOption(_))));

    running.stop().await.unwrap();
}

#[tokio::test]
async fn test_pre_bound_listener() {
    let listener = std::net::TcpListener::bind("127.0.0.1:0").unwrap();
    listener.set_nonblocking(true).unwrap();
    let addr = listener.local_addr().unwrap();

    let server = Server::builder().listener(listener).build();
    ping_routes(&server);
    let endpoint = server.endpoint().unwrap();
    assert_eq!(endpoint.port(), Some(addr.port()));

    let shutdown = CancelSource::new();
    let task = {
        let server = server.clone();
        let base = shutdown.token();
        tokio::spawn(async move { server.start(base).await })
    };

    let resp = common::client()
        .get(format!("http://{addr}/ping"))
        .send()
        .await
        .unwrap();
    assert_eq!(resp.status(), 200);

    shutdown.cancel();
    assert!(task.await.unwrap().is_ok());
}

#[tokio::test]
async fn test_bind_failure_is_reported() {
    let taken = std::net::TcpListener::bind("127.0.0.1:0").unwrap();
    let address = taken.local_addr().unwrap().to_string();

    let server = Server::builder().address(&address).build();
    let err = server.endpoint().unwrap_err();
    assert!(matches!(err, Error::Listen { .. }));

    let err = server.start(CancelSource::new().token()).await.unwrap_err();
    assert!(matches!(err, Error::Listen { .. }));
}

#[tokio::test]
async fn test_unknown_network_is_rejected() {
    let server = Server::builder().network("udp").build();
    assert!(matches!(server.endpoint(), Err(Error::InvalidOption(_))));
}
