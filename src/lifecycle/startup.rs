//! Startup orchestration.
//!
//! # Responsibilities
//! - Build the gateway with the HTTP stream sink attached
//! - Bind the listener last, so traffic arrives only when ready
//!
//! # Design Decisions
//! - Fail fast: any startup error is fatal

use std::net::SocketAddr;
use std::sync::Arc;

use thiserror::Error;
use tokio::net::TcpListener;

use crate::config::GatewayConfig;
use crate::gateway::{Gateway, GatewayBuildError, GatewayBuilder};
use crate::http::{ChannelSink, HttpServer};
use crate::rpc::RpcRuntime;

#[derive(Debug, Error)]
pub enum StartupError {
    #[error(transparent)]
    Build(#[from] GatewayBuildError),

    #[error("failed to bind {address}: {source}")]
    Bind {
        address: String,
        #[source]
        source: std::io::Error,
    },
}

/// A built server with its bound listener, ready to run.
pub struct Prepared {
    pub server: HttpServer,
    pub listener: TcpListener,
    pub local_addr: SocketAddr,
}

/// Build the gateway (via `customize`) and bind the configured address.
pub async fn prepare<F>(
    config: GatewayConfig,
    runtime: Arc<dyn RpcRuntime>,
    customize: F,
) -> Result<Prepared, StartupError>
where
    F: FnOnce(GatewayBuilder) -> GatewayBuilder,
{
    let sink = Arc::new(ChannelSink::new());
    let address = config.listener.bind_address.clone();

    let builder = Gateway::builder(runtime).config(config).stream_sink(sink.clone());
    let gateway = Arc::new(customize(builder).build()?);

    tracing::info!(routes = gateway.routes().len(), "Gateway built");

    let listener = TcpListener::bind(&address)
        .await
        .map_err(|source| StartupError::Bind {
            address: address.clone(),
            source,
        })?;
    let local_addr = listener
        .local_addr()
        .map_err(|source| StartupError::Bind { address, source })?;

    Ok(Prepared {
        server: HttpServer::new(gateway, sink),
        listener,
        local_addr,
    })
}
