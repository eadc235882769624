//! Streaming responses.
//!
//! # Data Flow
//! ```text
//! request translation: input declares `_stream_id`
//!     → manager.rs (allocate id, StreamGuard held by the request context)
//!     → response translation: OK → commit, else guard drop → release
//!
//! backend: StreamController (control.rs)
//!     → control thread → StreamManager::apply
//!     → connection.rs (Idle/Busy/Closing, deferred teardown)
//!     → StreamSink (sink.rs) → HTTP connection
//!
//! HTTP connection gone → StreamController::timeout → stream expired
//! ```
//!
//! # Design Decisions
//! - All backend-driven operations are serialized on one dedicated thread
//! - A close that arrives mid-send runs when the send completes
//! - Stream ids come from a per-manager counter, never reused

pub mod connection;
pub mod control;
pub mod manager;
pub mod sink;

pub use connection::{StreamConnection, StreamId, StreamPhase, Teardown};
pub use control::{ControlChannel, ControlClosed, StreamCommand, StreamController};
pub use manager::{StreamGuard, StreamManager, StreamReply};
pub use sink::{NullSink, StreamContent, StreamSink};
