//! Built-in demo service so the server binary runs without a backend.
//!
//! Routes (service `demo.Test`):
//! ```text
//! GET  /v1/test/query_param/{key_a}/{key_b}   echo of key_a/key_b/key_c
//! GET  /v1/test/enabled                       single bool field → `true`
//! POST /v1/test/echo                          body "*", echoes text/count and caller ip
//! GET  /v1/test/items/{id}                    id 1 exists, others → NOT_FOUND envelope
//! GET  /v1/test/greeting/{name}               plaintext body
//! GET  /v1/test/ticks/{count}                 streams `count` ticks, then closes
//! ```

use std::sync::Arc;
use std::thread;

use crate::error::{ErrorEnvelope, ResultCode};
use crate::routing::{HttpVerb, RouteBinding, RoutePlugin, RouteTable};
use crate::rpc::local::LocalRuntime;
use crate::rpc::{MethodDescriptor, RpcStatus};
use crate::schema::{FieldType, Message, MessageDescriptor, ReservedField, Value};
use crate::streaming::{StreamContent, StreamController, StreamReply};

pub const SERVICE: &str = "demo.Test";

/// Upper bound on ticks per stream.
const MAX_TICKS: u32 = 1000;

fn query_params_in() -> MessageDescriptor {
    MessageDescriptor::builder("demo.QueryParams")
        .field("key_a", FieldType::String)
        .field("key_b", FieldType::String)
        .field("key_c", FieldType::String)
        .build()
}

fn query_params_out() -> MessageDescriptor {
    MessageDescriptor::builder("demo.QueryParamsReply")
        .field("key_a", FieldType::String)
        .field("key_b", FieldType::String)
        .field("key_c", FieldType::String)
        .reserved(ReservedField::Result)
        .build()
}

fn enabled_out() -> MessageDescriptor {
    MessageDescriptor::builder("demo.Enabled")
        .field("enabled", FieldType::Bool)
        .reserved(ReservedField::Result)
        .build()
}

fn echo_in() -> MessageDescriptor {
    MessageDescriptor::builder("demo.EchoRequest")
        .field("text", FieldType::String)
        .field("count", FieldType::UInt32)
        .reserved(ReservedField::CallerIp)
        .build()
}

fn echo_out() -> MessageDescriptor {
    MessageDescriptor::builder("demo.EchoReply")
        .field("text", FieldType::String)
        .field("count", FieldType::UInt32)
        .field("caller_ip", FieldType::String)
        .reserved(ReservedField::Result)
        .build()
}

fn item_in() -> MessageDescriptor {
    MessageDescriptor::builder("demo.ItemId")
        .field("id", FieldType::UInt32)
        .build()
}

fn item_out() -> MessageDescriptor {
    MessageDescriptor::builder("demo.Item")
        .field("id", FieldType::UInt32)
        .field("name", FieldType::String)
        .reserved(ReservedField::Result)
        .build()
}

fn greeting_in() -> MessageDescriptor {
    MessageDescriptor::builder("demo.GreetingRequest")
        .field("name", FieldType::String)
        .build()
}

fn greeting_out() -> MessageDescriptor {
    MessageDescriptor::builder("demo.Greeting")
        .reserved(ReservedField::Plaintext)
        .reserved(ReservedField::Result)
        .build()
}

fn ticks_in() -> MessageDescriptor {
    MessageDescriptor::builder("demo.TicksRequest")
        .field("count", FieldType::UInt32)
        .reserved(ReservedField::StreamId)
        .build()
}

fn tick() -> MessageDescriptor {
    MessageDescriptor::builder("demo.Tick")
        .field("index", FieldType::UInt32)
        .field("stream_id", FieldType::UInt64)
        .reserved(ReservedField::Result)
        .build()
}

fn method(name: &str, input: MessageDescriptor, output: MessageDescriptor) -> MethodDescriptor {
    MethodDescriptor::new(SERVICE, name, input, output)
}

/// Route table of the demo service.
pub fn routes() -> RouteTable {
    let empty = MessageDescriptor::empty;
    vec![
        RouteBinding::new(
            method("QueryParam", query_params_in(), query_params_out()),
            HttpVerb::Get,
            "/v1/test/query_param/{key_a}/{key_b}",
            "",
        ),
        RouteBinding::new(method("Enabled", empty(), enabled_out()), HttpVerb::Get, "/v1/test/enabled", ""),
        RouteBinding::new(method("Echo", echo_in(), echo_out()), HttpVerb::Post, "/v1/test/echo", "*"),
        RouteBinding::new(method("GetItem", item_in(), item_out()), HttpVerb::Get, "/v1/test/items/{id}", ""),
        RouteBinding::new(
            method("Greeting", greeting_in(), greeting_out()),
            HttpVerb::Get,
            "/v1/test/greeting/{name}",
            "",
        ),
        RouteBinding::new(method("Ticks", ticks_in(), tick()), HttpVerb::Get, "/v1/test/ticks/{count}", ""),
    ]
}

/// The demo routes as a plugin.
pub struct DemoPlugin;

impl RoutePlugin for DemoPlugin {
    fn name(&self) -> &str {
        SERVICE
    }

    fn routes(&self) -> RouteTable {
        routes()
    }
}

fn copy_str(from: Option<&Message>, to: &mut Message, name: &str) -> Result<(), RpcStatus> {
    if let Some(value) = from.and_then(|m| m.get_str(name)) {
        to.set(name, Value::String(value.to_string()))
            .map_err(|e| RpcStatus::new(ResultCode::Internal, e.to_string()))?;
    }
    Ok(())
}

fn set(msg: &mut Message, name: &str, value: Value) -> Result<(), RpcStatus> {
    msg.set(name, value)
        .map_err(|e| RpcStatus::new(ResultCode::Internal, e.to_string()))
}

fn get_u32(msg: Option<&Message>, name: &str) -> u32 {
    match msg.and_then(|m| m.get(name)) {
        Some(Value::U32(n)) => *n,
        _ => 0,
    }
}

/// Register the demo handlers. Streamed replies are driven through `controller`.
pub fn install(runtime: &LocalRuntime, controller: StreamController) {
    runtime.register(SERVICE, "QueryParam", |input| {
        let mut out = Message::new(query_params_out());
        for key in ["key_a", "key_b", "key_c"] {
            copy_str(input.as_ref(), &mut out, key)?;
        }
        Ok(Some(out))
    });

    runtime.register(SERVICE, "Enabled", |_| {
        let mut out = Message::new(enabled_out());
        set(&mut out, "enabled", Value::Bool(true))?;
        Ok(Some(out))
    });

    runtime.register(SERVICE, "Echo", |input| {
        let input = input.as_ref();
        let mut out = Message::new(echo_out());
        copy_str(input, &mut out, "text")?;
        set(&mut out, "count", Value::U32(get_u32(input, "count")))?;
        if let Some(ip) = input.and_then(|m| m.get_str(ReservedField::CallerIp.name())) {
            set(&mut out, "caller_ip", Value::String(ip.to_string()))?;
        }
        Ok(Some(out))
    });

    runtime.register(SERVICE, "GetItem", |input| {
        let id = get_u32(input.as_ref(), "id");
        let mut out = Message::new(item_out());
        if id != 1 {
            let envelope = ErrorEnvelope::new(ResultCode::NotFound, format!("Item {id} not found"));
            set(&mut out, "_result", Value::Message(envelope.to_message()))?;
            return Ok(Some(out));
        }
        set(&mut out, "id", Value::U32(id))?;
        set(&mut out, "name", Value::String("first".to_string()))?;
        Ok(Some(out))
    });

    runtime.register(SERVICE, "Greeting", |input| {
        let name = input.as_ref().and_then(|m| m.get_str("name")).unwrap_or("world");
        let mut out = Message::new(greeting_out());
        set(
            &mut out,
            ReservedField::Plaintext.name(),
            Value::String(format!("Hello, {name}!")),
        )?;
        Ok(Some(out))
    });

    let controller = Arc::new(controller);
    runtime.register(SERVICE, "Ticks", move |input| {
        let input = input.as_ref();
        let count = get_u32(input, "count").min(MAX_TICKS);
        let Some(id) = input.and_then(|m| m.get_u64(ReservedField::StreamId.name())) else {
            return Err(RpcStatus::new(ResultCode::Internal, "stream id missing"));
        };

        let controller = Arc::clone(&controller);
        thread::Builder::new()
            .name(format!("demo-ticks-{id}"))
            .spawn(move || emit_ticks(&controller, id, count))
            .map_err(|e| RpcStatus::new(ResultCode::Unavailable, e.to_string()))?;

        Ok(Some(Message::new(tick())))
    });
}

fn emit_ticks(controller: &StreamController, id: u64, count: u32) {
    if !matches!(controller.set_headers(id, StreamContent::Json), Ok(StreamReply::Delivered)) {
        return;
    }
    for index in 0..count {
        let mut msg = Message::new(tick());
        if msg.set("index", Value::U32(index)).is_err() || msg.set("stream_id", Value::U64(id)).is_err() {
            break;
        }
        match controller.send_data(id, msg) {
            Ok(StreamReply::Delivered) => {}
            reply => {
                tracing::debug!(stream_id = id, ?reply, "Tick stream stopped");
                return;
            }
        }
    }
    let _ = controller.close(id);
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::config::SiblingPolicy;
    use crate::routing::RoutingTree;

    #[test]
    fn demo_routes_build_a_tree() {
        let tree = RoutingTree::from_bindings(SiblingPolicy::Strict, routes());
        let listing = tree.discover();
        assert_eq!(listing.len(), routes().len());
        assert!(tree.lookup(HttpVerb::Get, "/v1/test/query_param/a/b").is_ok());
        assert!(tree.lookup(HttpVerb::Post, "/v1/test/echo").is_ok());
    }

    #[test]
    fn plugin_exposes_demo_routes() {
        assert_eq!(DemoPlugin.name(), SERVICE);
        assert_eq!(DemoPlugin.routes().len(), routes().len());
    }
}
