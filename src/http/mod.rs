//! HTTP protocol handling subsystem.
//!
//! # Data Flow
//! ```text
//! TCP connection
//!     → server.rs (Axum setup, middleware, catch-all handler)
//!     → request.rs (request ID, caller identity, upload metadata)
//!     → Gateway::handle on the blocking pool
//!     → plain response, or stream_sink.rs (channel-backed streamed body)
//!     → Send to client
//! ```

pub mod request;
pub mod server;
pub mod stream_sink;

pub use request::{MakeRequestUuidV4, X_REQUEST_ID};
pub use server::{AppState, HttpServer};
pub use stream_sink::{ChannelSink, SinkEvent};
