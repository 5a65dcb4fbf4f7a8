use std::path::PathBuf;
use std::time::Duration;

use axum::http::StatusCode;
use clap::Parser;
use serde::{Deserialize, Serialize};

use http_transport::config::{load_config, ServerConfig};
use http_transport::middleware::{logging, recovery};
use http_transport::observability;
use http_transport::transport::CancelSource;
use http_transport::{Error, Server, ServerBuilder};

/// Demo HTTP server.
#[derive(Parser, Debug)]
#[command(name = "http-transport", version, about)]
struct Args {
    /// Path to a TOML config file.
    #[arg(short, long)]
    config: Option<PathBuf>,

    /// Listen address, overrides the config file.
    #[arg(short, long)]
    address: Option<String>,

    /// Default log level when RUST_LOG is unset.
    #[arg(long, default_value = "info")]
    log_level: String,
}

#[derive(Debug, Deserialize)]
struct UserPath {
    id: u64,
}

#[derive(Debug, Deserialize)]
struct UserQuery {
    verbose: Option<bool>,
}

#[derive(Debug, Serialize)]
struct User {
    id: u64,
    name: String,
    #[serde(skip_serializing_if = "Option::is_none")]
    email: Option<String>,
}

#[tokio::main]
async fn main() -> Result<(), Box<dyn std::error::Error>> {
    let args = Args::parse();
    observability::logging::init(&args.log_level)?;

    let mut config = match &args.config {
        Some(path) => load_config(path)?,
        None => ServerConfig::default(),
    };
    if let Some(address) = args.address {
        config.address = address;
    }

    tracing::info!(
        network = %config.network,
        address = %config.address,
        timeout_ms = config.timeout_ms,
        tls = config.tls.is_some(),
        "Configuration loaded"
    );

    let server = ServerBuilder::from_config(&config)
        .await?
        .filter([recovery::recovery(), logging::server()])
        .build();

    let api = server.route("/", []);
    api.get(
        "/ping",
        |ctx| Box::pin(async move { ctx.result(StatusCode::OK, &"pong") }),
        [],
    );

    let users = api.group("/users", []);
    users.get(
        "/:id",
        |ctx| {
            Box::pin(async move {
                let path: UserPath = ctx.bind_vars()?;
                let query: UserQuery = ctx.bind_query()?;
                if path.id == 0 {
                    return Err(Error::not_found("USER_NOT_FOUND", "user 0 does not exist"));
                }
                ctx.returns(Ok(User {
                    id: path.id,
                    name: format!("user-{}", path.id),
                    email: query
                        .verbose
                        .unwrap_or(false)
                        .then(|| format!("user-{}@example.com", path.id)),
                }))
            })
        },
        [],
    );
    api.get(
        "/fail",
        |_ctx| {
            Box::pin(async move {
                Err(Error::internal("DEMO_FAILURE", "this route always fails"))
            })
        },
        [],
    );

    let endpoint = server.endpoint()?;
    tracing::info!(endpoint = %endpoint, "demo routes ready");

    let shutdown = CancelSource::new();
    let serving = {
        let server: Server = server.clone();
        let base = shutdown.token();
        tokio::spawn(async move { server.start(base).await })
    };

    tokio::signal::ctrl_c().await?;
    tracing::info!("Shutdown signal received");
    server.stop(Duration::from_secs(5)).await?;
    shutdown.cancel();
    serving.await??;

    tracing::info!("Shutdown complete");
    Ok(())
}
