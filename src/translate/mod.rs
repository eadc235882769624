//! HTTP ⇄ RPC translation.
//!
//! # Data Flow
//! ```text
//! GatewayRequest (verb, path, query, body, caller, upload, connection)
//!     → request.rs (route lookup, auth hook, body rules, params, reserved fields)
//!     → RequestContext + Option<Message>
//!     → [RPC invocation]
//!     → status.rs (locate envelope, read result code)
//!     → response.rs (status mapping, body selection, streaming hand-off)
//!     → GatewayResponse
//! ```
//!
//! # Design Decisions
//! - Translation is synchronous and runs on the caller's thread
//! - Every failure becomes a [`GatewayError`](crate::error::GatewayError)
//!   rendered as the shared envelope
//! - Resources taken during translation (stream reservations) are owned by
//!   the context and released on drop unless the response commits them

pub mod params;
pub mod request;
pub mod response;
pub mod status;

use std::net::IpAddr;

use axum::http::{HeaderMap, Method, StatusCode};
use bytes::Bytes;

use crate::net::connection::ConnectionHandle;
use crate::routing::{HttpVerb, RouteBinding};
use crate::rpc::ClientHandle;
use crate::streaming::StreamGuard;

pub use request::RequestTranslator;
pub use response::translate_response;

/// Who is calling, as reported by the HTTP layer.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct CallerIdentity {
    pub ip: Option<IpAddr>,
    pub username: Option<String>,
}

/// Metadata of an uploaded file carried in the body.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct UploadMeta {
    pub filename: String,
    pub content_type: Option<String>,
}

/// One HTTP request as handed over by the server.
#[derive(Debug, Clone)]
pub struct GatewayRequest {
    pub method: Method,
    pub path: String,
    pub query: Option<String>,
    pub body: Bytes,
    pub caller: CallerIdentity,
    pub upload: Option<UploadMeta>,
    pub connection: ConnectionHandle,
}

impl GatewayRequest {
    /// Request with an empty body and a fresh connection handle.
    pub fn new(method: Method, uri: &str) -> Self {
        let (path, query) = match uri.split_once('?') {
            Some((p, q)) => (p.to_string(), Some(q.to_string())),
            None => (uri.to_string(), None),
        };
        Self {
            method,
            path,
            query,
            body: Bytes::new(),
            caller: CallerIdentity::default(),
            upload: None,
            connection: ConnectionHandle::next(),
        }
    }

    pub fn with_body(mut self, body: impl Into<Bytes>) -> Self {
        self.body = body.into();
        self
    }

    pub fn with_caller(mut self, caller: CallerIdentity) -> Self {
        self.caller = caller;
        self
    }

    pub fn with_upload(mut self, upload: UploadMeta) -> Self {
        self.upload = Some(upload);
        self
    }
}

/// What the HTTP server should send back.
#[derive(Debug, Clone)]
pub struct GatewayResponse {
    pub status: StatusCode,
    pub body: Bytes,
    pub mime_type: &'static str,
    pub headers: HeaderMap,
    /// Body will arrive later through the stream sink.
    pub streaming: bool,
}

impl GatewayResponse {
    pub fn json(status: StatusCode, value: &serde_json::Value) -> Self {
        Self {
            status,
            body: Bytes::from(value.to_string()),
            mime_type: response::MIME_JSON,
            headers: HeaderMap::new(),
            streaming: false,
        }
    }

    pub fn error(err: &crate::error::GatewayError) -> Self {
        Self::json(err.status(), &err.envelope().to_json())
    }

    pub fn streaming() -> Self {
        Self {
            status: StatusCode::OK,
            body: Bytes::new(),
            mime_type: response::MIME_JSON,
            headers: HeaderMap::new(),
            streaming: true,
        }
    }

    /// Body as UTF-8 text (lossy), mostly for tests and logs.
    pub fn text(&self) -> String {
        String::from_utf8_lossy(&self.body).into_owned()
    }
}

/// State threaded from request translation to response translation.
#[derive(Debug)]
pub struct RequestContext {
    pub verb: HttpVerb,
    pub binding: std::sync::Arc<RouteBinding>,
    pub client: ClientHandle,
    pub raw_file_input: bool,
    pub stream: Option<StreamGuard>,
}

impl RequestContext {
    pub fn stream_id(&self) -> Option<u64> {
        self.stream.as_ref().map(StreamGuard::id)
    }
}

/// What an authorization hook gets to see.
#[derive(Debug)]
pub struct AuthRequest<'a> {
    pub path: &'a str,
    pub binding: &'a RouteBinding,
    pub caller: &'a CallerIdentity,
}

/// Pre-invocation authorization hook. `Err` carries the message returned
/// to the caller.
pub trait RequestAuthorizer: Send + Sync {
    fn authorize(&self, verb: HttpVerb, request: &AuthRequest<'_>) -> Result<(), String>;
}
