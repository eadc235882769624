//! Client registry: one cached connection per backend service.
//!
//! # Responsibilities
//! - Create a connection on first use of a service
//! - Hand out the cached handle afterwards
//! - Release every connection at shutdown
//!
//! # Design Decisions
//! - Connection failures are logged and not cached; the next call retries
//! - Creation happens under the map's entry lock so concurrent first calls
//!   for one service produce a single connection

use std::sync::Arc;

use dashmap::mapref::entry::Entry;
use dashmap::DashMap;

use crate::rpc::{ClientHandle, RpcRuntime};

pub struct ClientRegistry {
    runtime: Arc<dyn RpcRuntime>,
    clients: DashMap<String, ClientHandle>,
}

impl ClientRegistry {
    pub fn new(runtime: Arc<dyn RpcRuntime>) -> Self {
        Self {
            runtime,
            clients: DashMap::new(),
        }
    }

    /// Cached handle for `service`, connecting on a miss.
    pub fn get_or_create(&self, service: &str) -> Option<ClientHandle> {
        if let Some(client) = self.clients.get(service) {
            return Some(client.clone());
        }

        match self.clients.entry(service.to_string()) {
            Entry::Occupied(entry) => Some(entry.get().clone()),
            Entry::Vacant(entry) => match self.runtime.connect(service) {
                Ok(connection) => {
                    tracing::info!(service = %service, "RPC client connected");
                    let client = ClientHandle::new(service, connection);
                    entry.insert(client.clone());
                    Some(client)
                }
                Err(e) => {
                    tracing::warn!(service = %service, error = %e, "RPC client connection failed");
                    None
                }
            },
        }
    }

    pub fn contains(&self, service: &str) -> bool {
        self.clients.contains_key(service)
    }

    pub fn len(&self) -> usize {
        self.clients.len()
    }

    pub fn is_empty(&self) -> bool {
        self.clients.is_empty()
    }

    /// Release and forget every cached connection.
    pub fn shutdown(&self) {
        let services: Vec<String> = self.clients.iter().map(|c| c.key().clone()).collect();
        for service in services {
            if let Some((_, client)) = self.clients.remove(&service) {
                client.release();
                tracing::debug!(service = %service, "RPC client released");
            }
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::rpc::local::LocalRuntime;

    #[test]
    fn caches_connections() {
        let runtime = Arc::new(LocalRuntime::new());
        runtime.add_service("svc");
        let registry = ClientRegistry::new(runtime.clone());

        assert!(registry.get_or_create("svc").is_some());
        assert!(registry.get_or_create("svc").is_some());
        assert_eq!(runtime.connect_count("svc"), 1);
        assert_eq!(registry.len(), 1);
    }

    #[test]
    fn failures_are_not_cached() {
        let runtime = Arc::new(LocalRuntime::new());
        runtime.add_service("svc");
        runtime.set_reachable("svc", false);
        let registry = ClientRegistry::new(runtime.clone());

        assert!(registry.get_or_create("svc").is_none());
        assert!(!registry.contains("svc"));

        runtime.set_reachable("svc", true);
        assert!(registry.get_or_create("svc").is_some());
        assert_eq!(runtime.connect_count("svc"), 2);
    }

    #[test]
    fn unknown_service_is_none() {
        let registry = ClientRegistry::new(Arc::new(LocalRuntime::new()));
        assert!(registry.get_or_create("nope").is_none());
    }

    #[test]
    fn shutdown_releases_everything() {
        let runtime = Arc::new(LocalRuntime::new());
        runtime.add_service("a");
        runtime.add_service("b");
        let registry = ClientRegistry::new(runtime.clone());
        registry.get_or_create("a");
        registry.get_or_create("b");

        registry.shutdown();
        assert!(registry.is_empty());
        assert_eq!(runtime.release_count("a"), 1);
        assert_eq!(runtime.release_count("b"), 1);
    }
}
