//! Shared utilities for integration tests.

use std::net::SocketAddr;
use std::sync::Arc;
use std::time::Duration;

use rest_gateway::config::GatewayConfig;
use rest_gateway::demo;
use rest_gateway::lifecycle::{self, Shutdown};
use rest_gateway::rpc::local::LocalRuntime;
use rest_gateway::rpc::RpcRuntime;
use rest_gateway::Gateway;
use tokio::task::JoinHandle;

/// A gateway serving the demo service on a loopback port.
pub struct TestGateway {
    pub addr: SocketAddr,
    pub client: reqwest::Client,
    pub gateway: Arc<Gateway>,
    shutdown: Shutdown,
    handle: JoinHandle<std::io::Result<()>>,
}

impl TestGateway {
    pub async fn start() -> Self {
        Self::start_with(GatewayConfig::default()).await
    }

    pub async fn start_with(mut config: GatewayConfig) -> Self {
        config.listener.bind_address = "127.0.0.1:0".to_string();

        let runtime = Arc::new(LocalRuntime::new());
        let rpc: Arc<dyn RpcRuntime> = runtime.clone();
        let prepared = lifecycle::prepare(config, rpc, |builder| builder.routes(demo::routes()))
            .await
            .unwrap();
        demo::install(&runtime, prepared.server.gateway().stream_controller());

        let gateway = Arc::clone(prepared.server.gateway());
        let shutdown = Shutdown::new();
        let receiver = shutdown.subscribe();
        let handle = tokio::spawn(prepared.server.run(prepared.listener, receiver));

        let client = reqwest::Client::builder()
            .timeout(Duration::from_secs(10))
            .build()
            .unwrap();

        Self {
            addr: prepared.local_addr,
            client,
            gateway,
            shutdown,
            handle,
        }
    }

    pub fn url(&self, path: &str) -> String {
        format!("http://{}{}", self.addr, path)
    }

    pub async fn get(&self, path: &str) -> reqwest::Response {
        self.client.get(self.url(path)).send().await.unwrap()
    }

    pub async fn post(&self, path: &str, body: &str) -> reqwest::Response {
        self.client
            .post(self.url(path))
            .header("content-type", "application/json")
            .body(body.to_string())
            .send()
            .await
            .unwrap()
    }

    /// Trigger graceful shutdown and wait for the server to stop.
    pub async fn stop(self) {
        self.shutdown.trigger();
        let result = tokio::time::timeout(Duration::from_secs(15), self.handle).await;
        assert!(matches!(result, Ok(Ok(Ok(())))), "server did not stop cleanly");
    }
}

/// Poll `check` until it holds or `deadline` passes.
#[allow(dead_code)]
pub async fn eventually<F: Fn() -> bool>(deadline: Duration, check: F) -> bool {
    let start = std::time::Instant::now();
    while start.elapsed() < deadline {
        if check() {
            return true;
        }
        tokio::time::sleep(Duration::from_millis(10)).await;
    }
    check()
}
