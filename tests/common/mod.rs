//! Shared utilities for integration tests.

#![allow(dead_code)]

use std::time::Duration;

use http_transport::transport::CancelSource;
use http_transport::{Result, Server, ServerBuilder};
use tokio::task::JoinHandle;

/// A server serving on an ephemeral loopback port.
pub struct RunningServer {
    pub server: Server,
    pub base_url: String,
    pub shutdown: CancelSource,
    pub task: JoinHandle<Result<()>>,
}

impl RunningServer {
    pub fn url(&self, path: &str) -> String {
        format!("{}{}", self.base_url, path)
    }

    /// Stop gracefully and wait for `start` to return.
    pub async fn stop(self) -> Result<()> {
        self.server.stop(Duration::from_secs(2)).await?;
        tokio::time::timeout(Duration::from_secs(2), self.task)
            .await
            .expect("server task did not finish")
            .expect("server task panicked")
    }
}

/// Build the server from `builder`, let `routes` register handlers, then serve.
pub async fn start_server<F>(builder: ServerBuilder, routes: F) -> RunningServer
where
    F: FnOnce(&Server),
{
    let server = builder.address("127.0.0.1:0").build();
    routes(&server);

    // Binding happens here, so requests queue in the backlog until serve runs.
    let endpoint = server.endpoint().expect("bind listener");
    let base_url = endpoint.as_str().trim_end_matches('/').to_string();

    let shutdown = CancelSource::new();
    let task = {
        let server = server.clone();
        let base = shutdown.token();
        tokio::spawn(async move { server.start(base).await })
    };

    RunningServer {
        server,
        base_url,
        shutdown,
        task,
    }
}

/// Client that never follows redirects or uses system proxies.
pub fn client() -> reqwest::Client {
    reqwest::Client::builder()
        .no_proxy()
        .redirect(reqwest::redirect::Policy::none())
        .timeout(Duration::from_secs(5))
        .build()
        .unwrap()
}
