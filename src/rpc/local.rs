//! In-process RPC runtime.
//!
//! Services are sets of closures keyed by method name. Used by the server
//! binary's built-in demo service and by tests; a service can be marked
//! unreachable to exercise connection failures.

use std::sync::atomic::{AtomicBool, AtomicUsize, Ordering};
use std::sync::Arc;

use dashmap::DashMap;

use crate::error::ResultCode;
use crate::rpc::{MethodDescriptor, RpcConnection, RpcError, RpcRuntime, RpcStatus};
use crate::schema::Message;

pub type Handler = Arc<dyn Fn(Option<Message>) -> Result<Option<Message>, RpcStatus> + Send + Sync>;

#[derive(Default)]
struct LocalService {
    methods: DashMap<String, Handler>,
    unreachable: AtomicBool,
    connects: AtomicUsize,
    releases: AtomicUsize,
}

#[derive(Default)]
pub struct LocalRuntime {
    services: DashMap<String, Arc<LocalService>>,
}

impl LocalRuntime {
    pub fn new() -> Self {
        Self::default()
    }

    fn service(&self, name: &str) -> Arc<LocalService> {
        self.services.entry(name.to_string()).or_default().clone()
    }

    /// Declare a service with no methods yet.
    pub fn add_service(&self, service: &str) {
        self.service(service);
    }

    /// Register (or replace) a method implementation.
    pub fn register<F>(&self, service: &str, method: &str, handler: F)
    where
        F: Fn(Option<Message>) -> Result<Option<Message>, RpcStatus> + Send + Sync + 'static,
    {
        self.service(service)
            .methods
            .insert(method.to_string(), Arc::new(handler));
    }

    pub fn set_reachable(&self, service: &str, reachable: bool) {
        self.service(service)
            .unreachable
            .store(!reachable, Ordering::SeqCst);
    }

    /// Connection attempts made for `service`, failed ones included.
    pub fn connect_count(&self, service: &str) -> usize {
        self.services
            .get(service)
            .map(|s| s.connects.load(Ordering::SeqCst))
            .unwrap_or(0)
    }

    pub fn release_count(&self, service: &str) -> usize {
        self.services
            .get(service)
            .map(|s| s.releases.load(Ordering::SeqCst))
            .unwrap_or(0)
    }
}

impl RpcRuntime for LocalRuntime {
    fn connect(&self, service: &str) -> Result<Arc<dyn RpcConnection>, RpcError> {
        let Some(svc) = self.services.get(service).map(|s| s.clone()) else {
            return Err(RpcError {
                service: service.to_string(),
                reason: "unknown service".to_string(),
            });
        };
        svc.connects.fetch_add(1, Ordering::SeqCst);
        if svc.unreachable.load(Ordering::SeqCst) {
            return Err(RpcError {
                service: service.to_string(),
                reason: "service unreachable".to_string(),
            });
        }
        Ok(Arc::new(LocalConnection { service: svc }))
    }
}

struct LocalConnection {
    service: Arc<LocalService>,
}

impl RpcConnection for LocalConnection {
    fn invoke(&self, method: &MethodDescriptor, input: Option<Message>) -> Result<Option<Message>, RpcStatus> {
        // Clone out so the handler runs without holding the map shard.
        let handler = self
            .service
            .methods
            .get(&method.name)
            .map(|h| h.clone())
            .ok_or_else(|| RpcStatus::new(ResultCode::Unimplemented, format!("method {method} not implemented")))?;
        handler(input)
    }

    fn release(&self) {
        self.service.releases.fetch_add(1, Ordering::SeqCst);
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::schema::{FieldType, MessageDescriptor, Value};

    #[test]
    fn invokes_registered_handler() {
        let out = MessageDescriptor::builder("t.Out").field("ok", FieldType::Bool).build();
        let method = MethodDescriptor::new("svc", "Ping", MessageDescriptor::empty(), out.clone());

        let runtime = LocalRuntime::new();
        runtime.register("svc", "Ping", move |_| {
            Ok(Some(Message::new(out.clone()).with("ok", Value::Bool(true)).unwrap()))
        });

        let conn = runtime.connect("svc").unwrap();
        let reply = conn.invoke(&method, None).unwrap().unwrap();
        assert_eq!(reply.get("ok"), Some(&Value::Bool(true)));
    }

    #[test]
    fn missing_method_is_unimplemented() {
        let runtime = LocalRuntime::new();
        runtime.add_service("svc");
        let method = MethodDescriptor::new("svc", "Nope", MessageDescriptor::empty(), MessageDescriptor::empty());
        let err = runtime.connect("svc").unwrap().invoke(&method, None).unwrap_err();
        assert_eq!(err.code, ResultCode::Unimplemented);
    }
}
