//! The gateway instance: route tree, clients, streams and the request
//! pipeline behind one handle.
//!
//! # Data Flow
//! ```text
//! GatewayRequest
//!     → discovery path? → route listing
//!     → RequestTranslator (tree snapshot, clients, streams, authorizer)
//!     → ClientHandle::invoke (blocking)
//!     → translate_response
//!     → GatewayResponse
//! ```
//!
//! # Design Decisions
//! - The tree is read through `ArcSwap`: requests never lock; plugin
//!   (un)registration rebuilds a fresh tree and swaps it in
//! - `handle` is synchronous; async servers call it on a blocking worker

use std::sync::Arc;

use arc_swap::ArcSwap;
use axum::http::{Method, StatusCode};
use parking_lot::Mutex;
use thiserror::Error;

use crate::config::GatewayConfig;
use crate::discovery;
use crate::routing::{RoutePlugin, RouteSummary, RouteTable, RoutingTree};
use crate::rpc::registry::ClientRegistry;
use crate::rpc::RpcRuntime;
use crate::streaming::{ControlChannel, NullSink, StreamController, StreamManager, StreamSink};
use crate::translate::{translate_response, GatewayRequest, GatewayResponse, RequestAuthorizer, RequestTranslator};

#[derive(Debug, Error)]
pub enum GatewayBuildError {
    #[error("failed to start stream control thread: {0}")]
    ControlThread(#[from] std::io::Error),
}

pub struct GatewayBuilder {
    runtime: Arc<dyn RpcRuntime>,
    config: GatewayConfig,
    routes: RouteTable,
    plugins: Vec<Arc<dyn RoutePlugin>>,
    authorizer: Option<Arc<dyn RequestAuthorizer>>,
    sink: Option<Arc<dyn StreamSink>>,
}

impl GatewayBuilder {
    pub fn config(mut self, config: GatewayConfig) -> Self {
        self.config = config;
        self
    }

    /// Statically linked routes, inserted before any plugin.
    pub fn routes(mut self, table: RouteTable) -> Self {
        self.routes.extend(table);
        self
    }

    pub fn plugin(mut self, plugin: Arc<dyn RoutePlugin>) -> Self {
        self.plugins.push(plugin);
        self
    }

    pub fn authorizer(mut self, authorizer: Arc<dyn RequestAuthorizer>) -> Self {
        self.authorizer = Some(authorizer);
        self
    }

    pub fn stream_sink(mut self, sink: Arc<dyn StreamSink>) -> Self {
        self.sink = Some(sink);
        self
    }

    pub fn build(self) -> Result<Gateway, GatewayBuildError> {
        let sink = self.sink.unwrap_or_else(|| Arc::new(NullSink));
        let streams = Arc::new(StreamManager::new(sink));
        let control = ControlChannel::spawn(Arc::clone(&streams), &self.config.streaming.control_thread_name)?;
        let controller = control.controller();

        let plugins: Vec<(String, RouteTable)> = self
            .plugins
            .iter()
            .map(|p| (p.name().to_string(), p.routes()))
            .collect();
        let tree = build_tree(&self.config, &self.routes, &plugins);
        tracing::info!(
            routes = self.routes.len(),
            plugins = plugins.len(),
            nodes = tree.node_count(),
            "Gateway routes loaded"
        );

        Ok(Gateway {
            clients: ClientRegistry::new(self.runtime),
            tree: ArcSwap::from_pointee(tree),
            base_routes: self.routes,
            plugins: Mutex::new(plugins),
            streams,
            control: Mutex::new(control),
            controller,
            authorizer: self.authorizer,
            config: self.config,
        })
    }
}

fn build_tree(config: &GatewayConfig, base: &RouteTable, plugins: &[(String, RouteTable)]) -> RoutingTree {
    let all = base
        .iter()
        .chain(plugins.iter().flat_map(|(_, table)| table.iter()))
        .cloned();
    RoutingTree::from_bindings(config.routing.sibling_policy, all)
}

pub struct Gateway {
    config: GatewayConfig,
    tree: ArcSwap<RoutingTree>,
    base_routes: RouteTable,
    /// Registered plugin tables, in registration order. Also serializes rebuilds.
    plugins: Mutex<Vec<(String, RouteTable)>>,
    clients: ClientRegistry,
    streams: Arc<StreamManager>,
    control: Mutex<ControlChannel>,
    controller: StreamController,
    authorizer: Option<Arc<dyn RequestAuthorizer>>,
}

impl Gateway {
    pub fn builder(runtime: Arc<dyn RpcRuntime>) -> GatewayBuilder {
        GatewayBuilder {
            runtime,
            config: GatewayConfig::default(),
            routes: Vec::new(),
            plugins: Vec::new(),
            authorizer: None,
            sink: None,
        }
    }

    pub fn config(&self) -> &GatewayConfig {
        &self.config
    }

    /// Current route tree snapshot.
    pub fn tree(&self) -> Arc<RoutingTree> {
        self.tree.load_full()
    }

    pub fn routes(&self) -> Vec<RouteSummary> {
        self.tree.load().discover()
    }

    pub fn clients(&self) -> &ClientRegistry {
        &self.clients
    }

    pub fn streams(&self) -> &Arc<StreamManager> {
        &self.streams
    }

    /// Handle for backends to drive streams through the control thread.
    pub fn stream_controller(&self) -> StreamController {
        self.controller.clone()
    }

    /// Add (or replace, by name) a plugin's routes on the running gateway.
    pub fn register_plugin(&self, plugin: &dyn RoutePlugin) {
        let mut plugins = self.plugins.lock();
        let table = plugin.routes();
        let count = table.len();
        match plugins.iter_mut().find(|(name, _)| name == plugin.name()) {
            Some(entry) => entry.1 = table,
            None => plugins.push((plugin.name().to_string(), table)),
        }
        self.tree.store(Arc::new(build_tree(&self.config, &self.base_routes, &plugins)));
        tracing::info!(plugin = plugin.name(), routes = count, "Plugin registered");
    }

    /// Remove a plugin's routes. Returns false if it was not registered.
    pub fn unregister_plugin(&self, name: &str) -> bool {
        let mut plugins = self.plugins.lock();
        let before = plugins.len();
        plugins.retain(|(n, _)| n != name);
        if plugins.len() == before {
            return false;
        }
        self.tree.store(Arc::new(build_tree(&self.config, &self.base_routes, &plugins)));
        tracing::info!(plugin = name, "Plugin unregistered");
        true
    }

    fn is_discovery(&self, req: &GatewayRequest) -> bool {
        let discovery = &self.config.discovery;
        discovery.enabled && req.method == Method::GET && req.path == discovery.path
    }

    /// Run one request through the pipeline. Blocks while the RPC runs.
    pub fn handle(&self, req: GatewayRequest) -> GatewayResponse {
        if self.is_discovery(&req) {
            let search = discovery::search_filter(req.query.as_deref());
            let listing = discovery::listing(&self.tree.load(), &self.config.discovery.base_path, search.as_deref());
            return match serde_json::to_value(&listing) {
                Ok(json) => GatewayResponse::json(StatusCode::OK, &json),
                Err(e) => GatewayResponse::error(&crate::error::GatewayError::Internal(e.to_string())),
            };
        }

        let tree = self.tree.load();
        let translator = RequestTranslator {
            tree: &tree,
            clients: &self.clients,
            streams: &self.streams,
            authorizer: self.authorizer.as_deref(),
            unknown_params: self.config.routing.unknown_params,
        };

        let (context, input) = match translator.translate(&req) {
            Ok(translated) => translated,
            Err(e) => {
                tracing::debug!(method = %req.method, path = %req.path, error = %e, "Request rejected");
                return GatewayResponse::error(&e);
            }
        };

        tracing::debug!(
            method = %context.binding.method,
            stream_id = ?context.stream_id(),
            "Invoking RPC"
        );
        let outcome = context.client.invoke(&context.binding.method, input);
        translate_response(context, outcome)
    }

    /// Stop the control thread, close open streams and release clients.
    pub fn shutdown(&self) {
        self.control.lock().shutdown();
        let closed = self.streams.close_all();
        self.clients.shutdown();
        tracing::info!(streams_closed = closed, "Gateway shut down");
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::error::{ErrorEnvelope, ResultCode};
    use crate::routing::{HttpVerb, RouteBinding};
    use crate::rpc::local::LocalRuntime;
    use crate::rpc::{MethodDescriptor, RpcStatus};
    use crate::schema::{FieldType, Message, MessageDescriptor, ReservedField, Value};
    use serde_json::json;

    const SVC: &str = "demo.Items";

    fn item_out() -> MessageDescriptor {
        MessageDescriptor::builder("demo.Item")
            .field("id", FieldType::UInt32)
            .field("name", FieldType::String)
            .reserved(ReservedField::Result)
            .build()
    }

    fn id_in() -> MessageDescriptor {
        MessageDescriptor::builder("demo.ItemId")
            .field("id", FieldType::UInt32)
            .build()
    }

    fn get_item() -> RouteBinding {
        RouteBinding::new(
            MethodDescriptor::new(SVC, "Get", id_in(), item_out()),
            HttpVerb::Get,
            "/v1/items/{id}",
            "",
        )
    }

    fn runtime() -> Arc<LocalRuntime> {
        let runtime = Arc::new(LocalRuntime::new());
        runtime.register(SVC, "Get", |input| {
            let id = match input.as_ref().and_then(|m| m.get("id")) {
                Some(Value::U32(id)) => *id,
                _ => 0,
            };
            let mut out = Message::new(item_out());
            if id == 0 {
                let env = ErrorEnvelope::new(ResultCode::NotFound, "no such item");
                out.set("_result", Value::Message(env.to_message())).ok();
                return Ok(Some(out));
            }
            out.set("id", Value::U32(id)).ok();
            out.set("name", Value::String(format!("item-{id}"))).ok();
            out.set(
                "_result",
                Value::Message(ErrorEnvelope::new(ResultCode::Ok, "").to_message()),
            )
            .ok();
            Ok(Some(out))
        });
        runtime.register(SVC, "Fail", |_| Err(RpcStatus::new(ResultCode::Unavailable, "backend down")));
        runtime
    }

    fn gateway() -> Gateway {
        Gateway::builder(runtime()).routes(vec![get_item()]).build().unwrap()
    }

    fn body_json(resp: &GatewayResponse) -> serde_json::Value {
        serde_json::from_slice(&resp.body).unwrap()
    }

    #[test]
    fn get_clears_envelope() {
        let gw = gateway();
        let resp = gw.handle(GatewayRequest::new(Method::GET, "/v1/items/7"));
        assert_eq!(resp.status, StatusCode::OK);
        assert_eq!(body_json(&resp), json!({"id": 7, "name": "item-7"}));
    }

    #[test]
    fn error_code_maps_to_status_and_envelope() {
        let gw = gateway();
        let resp = gw.handle(GatewayRequest::new(Method::GET, "/v1/items/0"));
        assert_eq!(resp.status, StatusCode::NOT_FOUND);
        assert_eq!(
            body_json(&resp),
            json!({"code": "ANT_CODE_NOT_FOUND", "message": "no such item"})
        );
    }

    #[test]
    fn unknown_route_is_501() {
        let gw = gateway();
        let resp = gw.handle(GatewayRequest::new(Method::GET, "/v2/nothing"));
        assert_eq!(resp.status, StatusCode::NOT_IMPLEMENTED);
        assert_eq!(body_json(&resp)["code"], "ANT_CODE_UNIMPLEMENTED");
    }

    #[test]
    fn rpc_failure_is_internal() {
        let fail = RouteBinding::new(
            MethodDescriptor::new(SVC, "Fail", id_in(), item_out()),
            HttpVerb::Post,
            "/v1/fail",
            "*",
        );
        let gw = Gateway::builder(runtime()).routes(vec![fail]).build().unwrap();
        let resp = gw.handle(GatewayRequest::new(Method::POST, "/v1/fail").with_body("1"));
        assert_eq!(resp.status, StatusCode::INTERNAL_SERVER_ERROR);
        assert!(body_json(&resp)["message"].as_str().unwrap().contains("backend down"));
    }

    #[test]
    fn discovery_lists_routes() {
        let gw = gateway();
        let resp = gw.handle(GatewayRequest::new(Method::GET, "/_routes?search_string=items"));
        assert_eq!(resp.status, StatusCode::OK);
        assert_eq!(
            body_json(&resp),
            json!({"basepath": "/", "paths": [{"path": "/v1/items/{id}", "methods": ["GET"]}]})
        );
    }

    struct Extra;

    impl RoutePlugin for Extra {
        fn name(&self) -> &str {
            "extra"
        }

        fn routes(&self) -> RouteTable {
            vec![RouteBinding::new(
                MethodDescriptor::new(SVC, "Get", id_in(), item_out()),
                HttpVerb::Get,
                "/v1/extra/{id}",
                "",
            )]
        }
    }

    #[test]
    fn plugins_register_and_unregister_live() {
        let gw = gateway();
        assert_eq!(
            gw.handle(GatewayRequest::new(Method::GET, "/v1/extra/3")).status,
            StatusCode::NOT_IMPLEMENTED
        );

        let before = gw.tree();
        gw.register_plugin(&Extra);
        assert_eq!(gw.handle(GatewayRequest::new(Method::GET, "/v1/extra/3")).status, StatusCode::OK);
        // Earlier snapshots are unaffected.
        assert!(before.lookup(HttpVerb::Get, "/v1/extra/3").is_err());

        assert!(gw.unregister_plugin("extra"));
        assert!(!gw.unregister_plugin("extra"));
        assert_eq!(
            gw.handle(GatewayRequest::new(Method::GET, "/v1/extra/3")).status,
            StatusCode::NOT_IMPLEMENTED
        );
    }

    #[test]
    fn shutdown_releases_clients() {
        let rt = runtime();
        let gw = Gateway::builder(rt.clone()).routes(vec![get_item()]).build().unwrap();
        gw.handle(GatewayRequest::new(Method::GET, "/v1/items/1"));
        assert_eq!(gw.clients().len(), 1);
        gw.shutdown();
        assert!(gw.clients().is_empty());
        assert_eq!(rt.release_count(SVC), 1);
    }
}
