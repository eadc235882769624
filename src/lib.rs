//! REST-to-RPC gateway library.
//!
//! Maps HTTP requests onto backend RPC methods through a route tree built
//! from generated route tables, translates JSON and URL parameters into
//! structured messages, and turns replies (or long-lived streams) back into
//! HTTP responses.

pub mod config;
pub mod demo;
pub mod discovery;
pub mod error;
pub mod gateway;
pub mod http;
pub mod lifecycle;
pub mod net;
pub mod observability;
pub mod routing;
pub mod rpc;
pub mod schema;
pub mod streaming;
pub mod translate;

pub use config::GatewayConfig;
pub use error::{GatewayError, ResultCode};
pub use gateway::{Gateway, GatewayBuilder};
pub use http::HttpServer;
pub use lifecycle::Shutdown;
