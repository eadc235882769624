//! Observability subsystem.
//!
//! # Data Flow
//! ```text
//! All subsystems emit tracing events with key/value fields
//!     → logging.rs (EnvFilter + fmt or JSON layer)
//!     → stdout
//! HTTP requests additionally get a TraceLayer span and an x-request-id.
//! ```
//!
//! # Design Decisions
//! - Structured logging (JSON) for machine parsing
//! - `RUST_LOG` overrides the configured level

pub mod logging;

pub use logging::init_tracing;
