//! RPC runtime collaborator interfaces.
//!
//! # Data Flow
//! ```text
//! RouteBinding.method (MethodDescriptor)
//!     → registry.rs (service name → cached ClientHandle)
//!     → RpcConnection::invoke (blocks until the reply)
//!     → Result<Option<Message>, RpcStatus>
//! ```
//!
//! # Design Decisions
//! - Transport, framing and retries belong to the runtime, not to the gateway
//! - A method's call shape (input and/or output present) is fixed when the
//!   descriptor is built; the empty-message sentinel becomes `None`
//! - `local.rs` provides an in-process runtime for embedding and tests

pub mod local;
pub mod registry;

use std::fmt;
use std::sync::Arc;

use thiserror::Error;

use crate::error::ResultCode;
use crate::schema::{Message, MessageDescriptor};

/// A backend RPC method with its resolved call shape.
#[derive(Debug, Clone)]
pub struct MethodDescriptor {
    pub service: String,
    pub name: String,
    pub input: Option<MessageDescriptor>,
    pub output: Option<MessageDescriptor>,
}

impl MethodDescriptor {
    pub fn new(
        service: impl Into<String>,
        name: impl Into<String>,
        input: MessageDescriptor,
        output: MessageDescriptor,
    ) -> Self {
        let shape = |d: MessageDescriptor| (!d.is_empty_sentinel()).then_some(d);
        Self {
            service: service.into(),
            name: name.into(),
            input: shape(input),
            output: shape(output),
        }
    }
}

impl fmt::Display for MethodDescriptor {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}/{}", self.service, self.name)
    }
}

/// Failure to establish a connection to a service.
#[derive(Debug, Clone, Error)]
#[error("cannot connect to service {service}: {reason}")]
pub struct RpcError {
    pub service: String,
    pub reason: String,
}

/// Failure status returned by an invocation.
#[derive(Debug, Clone, PartialEq, Eq, Error)]
#[error("{code}: {message}")]
pub struct RpcStatus {
    pub code: ResultCode,
    pub message: String,
}

impl RpcStatus {
    pub fn new(code: ResultCode, message: impl Into<String>) -> Self {
        Self {
            code,
            message: message.into(),
        }
    }
}

/// Creates connections to backend services.
pub trait RpcRuntime: Send + Sync {
    fn connect(&self, service: &str) -> Result<Arc<dyn RpcConnection>, RpcError>;
}

/// An established connection to one service.
pub trait RpcConnection: Send + Sync {
    /// Invoke `method`, blocking the calling thread until the reply.
    fn invoke(&self, method: &MethodDescriptor, input: Option<Message>) -> Result<Option<Message>, RpcStatus>;

    /// Called once when the registry tears the connection down.
    fn release(&self) {}
}

/// A cached connection for one service.
#[derive(Clone)]
pub struct ClientHandle {
    service: Arc<str>,
    connection: Arc<dyn RpcConnection>,
}

impl ClientHandle {
    pub fn new(service: &str, connection: Arc<dyn RpcConnection>) -> Self {
        Self {
            service: Arc::from(service),
            connection,
        }
    }

    pub fn service(&self) -> &str {
        &self.service
    }

    pub fn invoke(&self, method: &MethodDescriptor, input: Option<Message>) -> Result<Option<Message>, RpcStatus> {
        self.connection.invoke(method, input)
    }

    pub(crate) fn release(&self) {
        self.connection.release();
    }
}

impl fmt::Debug for ClientHandle {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("ClientHandle")
            .field("service", &self.service)
            .finish_non_exhaustive()
    }
}
