//! Bridges stream output onto axum response bodies.
//!
//! Each HTTP connection gets an unbounded channel of [`SinkEvent`]s, opened
//! before the request reaches the gateway and forgotten once the handler
//! is done with it. The stream can emit before the handler subscribes, in
//! which case events wait in the channel. Events for connections that were
//! never opened, or already forgotten, are dropped.

use std::convert::Infallible;
use std::sync::Arc;

use axum::body::Body;
use axum::http::HeaderMap;
use bytes::Bytes;
use dashmap::DashMap;
use futures_util::stream;
use tokio::sync::mpsc;

use crate::net::ConnectionHandle;
use crate::streaming::{StreamController, StreamSink};

#[derive(Debug, Clone, PartialEq)]
pub enum SinkEvent {
    Headers(HeaderMap),
    Data(Bytes),
    Close,
}

struct Slot {
    tx: mpsc::UnboundedSender<SinkEvent>,
    rx: Option<mpsc::UnboundedReceiver<SinkEvent>>,
    closed: bool,
}

impl Slot {
    fn new() -> Self {
        let (tx, rx) = mpsc::unbounded_channel();
        Self {
            tx,
            rx: Some(rx),
            closed: false,
        }
    }
}

#[derive(Default)]
pub struct ChannelSink {
    slots: DashMap<ConnectionHandle, Slot>,
}

impl ChannelSink {
    pub fn new() -> Self {
        Self::default()
    }

    /// Start buffering events for `connection`.
    pub fn open(&self, connection: ConnectionHandle) {
        self.slots.entry(connection).or_insert_with(Slot::new);
    }

    fn push(&self, connection: ConnectionHandle, event: SinkEvent) {
        let Some(slot) = self.slots.get(&connection) else {
            tracing::debug!(%connection, "Event for unknown connection dropped");
            return;
        };
        if slot.closed {
            tracing::debug!(%connection, "Event after close dropped");
            return;
        }
        // A dropped receiver means the client is gone; timeout handles cleanup.
        let _ = slot.tx.send(event);
    }

    /// Take the event receiver for `connection`. An unknown connection
    /// yields a receiver that is already finished.
    pub fn subscribe(&self, connection: ConnectionHandle) -> mpsc::UnboundedReceiver<SinkEvent> {
        let Some(mut slot) = self.slots.get_mut(&connection) else {
            tracing::warn!(%connection, "Subscribe to unknown connection");
            let (_, rx) = mpsc::unbounded_channel();
            return rx;
        };
        let rx = match slot.rx.take() {
            Some(rx) => rx,
            None => {
                tracing::warn!(%connection, "Stream subscribed twice");
                let (_, rx) = mpsc::unbounded_channel();
                rx
            }
        };
        let closed = slot.closed;
        drop(slot);
        if closed {
            self.slots.remove(&connection);
        }
        rx
    }

    /// Drop all state for `connection`.
    pub fn forget(&self, connection: ConnectionHandle) {
        self.slots.remove(&connection);
    }

    pub fn len(&self) -> usize {
        self.slots.len()
    }

    pub fn is_empty(&self) -> bool {
        self.slots.is_empty()
    }
}

impl StreamSink for ChannelSink {
    fn send(&self, connection: ConnectionHandle, data: Bytes) {
        self.push(connection, SinkEvent::Data(data));
    }

    fn set_headers(&self, connection: ConnectionHandle, headers: HeaderMap) {
        self.push(connection, SinkEvent::Headers(headers));
    }

    fn close(&self, connection: ConnectionHandle) {
        self.push(connection, SinkEvent::Close);
        let subscribed = match self.slots.get_mut(&connection) {
            Some(mut slot) => {
                slot.closed = true;
                slot.rx.is_none()
            }
            None => false,
        };
        if subscribed {
            self.slots.remove(&connection);
        }
    }
}

/// Reports the HTTP side of a stream as gone when dropped, unless disarmed.
pub struct ConnectionGuard {
    connection: ConnectionHandle,
    controller: StreamController,
    sink: Arc<ChannelSink>,
    armed: bool,
}

impl ConnectionGuard {
    /// Opens `connection` on `sink`.
    pub fn new(connection: ConnectionHandle, controller: StreamController, sink: Arc<ChannelSink>) -> Self {
        sink.open(connection);
        Self {
            connection,
            controller,
            sink,
            armed: true,
        }
    }

    pub fn disarm(&mut self) {
        self.armed = false;
    }
}

impl Drop for ConnectionGuard {
    fn drop(&mut self) {
        if !self.armed {
            return;
        }
        if self.controller.timeout(self.connection).is_err() {
            tracing::debug!(connection = %self.connection, "Control channel closed before timeout");
        }
        self.sink.forget(self.connection);
    }
}

struct BodyState {
    first: Option<Bytes>,
    rx: mpsc::UnboundedReceiver<SinkEvent>,
    finished: bool,
    _guard: ConnectionGuard,
}

/// Wait for the stream's headers, then build a body that yields its data
/// until the backend closes it. Dropping the body expires the stream.
pub async fn streamed_body(sink: &ChannelSink, guard: ConnectionGuard) -> (HeaderMap, Body) {
    let mut rx = sink.subscribe(guard.connection);
    let mut headers = HeaderMap::new();

    let first = loop {
        match rx.recv().await {
            Some(SinkEvent::Headers(h)) => headers.extend(h),
            Some(SinkEvent::Data(data)) => break Some(data),
            Some(SinkEvent::Close) | None => break None,
        }
    };

    let state = BodyState {
        finished: first.is_none(),
        first,
        rx,
        _guard: guard,
    };

    let body = stream::unfold(state, |mut st| async move {
        if let Some(data) = st.first.take() {
            return Some((Ok::<Bytes, Infallible>(data), st));
        }
        if st.finished {
            return None;
        }
        loop {
            match st.rx.recv().await {
                Some(SinkEvent::Data(data)) => return Some((Ok(data), st)),
                Some(SinkEvent::Headers(_)) => {
                    tracing::debug!("Stream headers after body start ignored");
                }
                Some(SinkEvent::Close) | None => return None,
            }
        }
    });

    (headers, Body::from_stream(body))
}
