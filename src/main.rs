//! REST gateway server.
//!
//! # Architecture Overview
//!
//! ```text
//!     Client Request
//!     ──────────────▶ http::server (axum, request id, timeout, body limit)
//!                         │ spawn_blocking
//!                         ▼
//!                     Gateway::handle
//!                         │ routing tree lookup → request translation
//!                         ▼
//!                     RPC runtime (demo service on LocalRuntime)
//!                         │ reply
//!                         ▼
//!     Client Response ◀── response translation, or a streamed body fed
//!                         by the stream control thread
//! ```

use std::path::PathBuf;
use std::sync::Arc;

use clap::Parser;

use rest_gateway::config::{load_config, GatewayConfig};
use rest_gateway::demo;
use rest_gateway::lifecycle::{self, signals, Shutdown};
use rest_gateway::observability::init_tracing;
use rest_gateway::rpc::local::LocalRuntime;
use rest_gateway::rpc::RpcRuntime;

#[derive(Parser)]
#[command(name = "rest-gateway")]
#[command(about = "REST to RPC gateway", long_about = None)]
struct Cli {
    /// Path to the TOML configuration file. Defaults apply when omitted.
    #[arg(short, long)]
    config: Option<PathBuf>,

    /// Override the listener bind address.
    #[arg(short, long)]
    bind: Option<String>,
}

#[tokio::main]
async fn main() -> Result<(), Box<dyn std::error::Error>> {
    let cli = Cli::parse();

    let mut config = match &cli.config {
        Some(path) => load_config(path)?,
        None => GatewayConfig::default(),
    };
    if let Some(bind) = cli.bind {
        config.listener.bind_address = bind;
    }

    init_tracing(&config.observability)?;
    tracing::info!(version = env!("CARGO_PKG_VERSION"), "rest-gateway starting");
    tracing::info!(
        bind_address = %config.listener.bind_address,
        max_body_size = config.listener.max_body_size,
        request_timeout_secs = config.timeouts.request_secs,
        sibling_policy = ?config.routing.sibling_policy,
        unknown_params = ?config.routing.unknown_params,
        "Configuration loaded"
    );

    let runtime = Arc::new(LocalRuntime::new());
    let rpc: Arc<dyn RpcRuntime> = runtime.clone();
    let prepared = lifecycle::prepare(config, rpc, |builder| builder.routes(demo::routes())).await?;
    demo::install(&runtime, prepared.server.gateway().stream_controller());

    tracing::info!(address = %prepared.local_addr, "Listening for connections");

    let shutdown = Arc::new(Shutdown::new());
    let receiver = shutdown.subscribe();
    signals::spawn_signal_listener(Arc::clone(&shutdown));

    prepared.server.run(prepared.listener, receiver).await?;

    tracing::info!("Shutdown complete");
    Ok(())
}
