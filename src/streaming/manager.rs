//! Stream registry and the operations backends drive it with.

use std::collections::HashMap;
use std::fmt;
use std::sync::Arc;

use bytes::{BufMut, Bytes, BytesMut};
use parking_lot::Mutex;

use crate::net::ConnectionHandle;
use crate::schema::{Message, MessageDescriptor};
use crate::streaming::connection::{StreamConnection, StreamId, Teardown};
use crate::streaming::control::StreamCommand;
use crate::streaming::sink::{StreamContent, StreamSink};
use crate::translate::response::render_body;

/// Outcome of one stream operation.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum StreamReply {
    /// Carried out, or scheduled behind an in-flight operation.
    Delivered,
    /// No such stream, or it is already closing.
    NotFound,
    /// Payload type differs from the stream's output type.
    SchemaMismatch,
}

pub struct StreamManager {
    streams: Mutex<HashMap<StreamId, Arc<StreamConnection>>>,
    next_id: Mutex<StreamId>,
    sink: Arc<dyn StreamSink>,
}

impl fmt::Debug for StreamManager {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("StreamManager")
            .field("streams", &self.len())
            .finish_non_exhaustive()
    }
}

/// Ends an operation on drop, finalizing a deferred teardown.
struct Busy<'a> {
    manager: &'a StreamManager,
    conn: &'a StreamConnection,
}

impl Drop for Busy<'_> {
    fn drop(&mut self) {
        if let Some(kind) = self.conn.end() {
            tracing::debug!(stream_id = self.conn.id(), ?kind, "Running deferred stream teardown");
            self.manager.finalize(self.conn, kind);
        }
    }
}

impl StreamManager {
    pub fn new(sink: Arc<dyn StreamSink>) -> Self {
        Self {
            streams: Mutex::new(HashMap::new()),
            next_id: Mutex::new(0),
            sink,
        }
    }

    /// Register a stream for `http`. Ids are unique and strictly increasing.
    pub fn allocate(&self, http: ConnectionHandle, output: Option<MessageDescriptor>) -> StreamId {
        let id = {
            let mut next = self.next_id.lock();
            *next += 1;
            *next
        };
        self.streams
            .lock()
            .insert(id, Arc::new(StreamConnection::new(id, http, output)));
        tracing::debug!(stream_id = id, connection = %http, "Stream allocated");
        id
    }

    /// Allocate a stream that is released again unless committed.
    pub fn reserve(self: &Arc<Self>, http: ConnectionHandle, output: Option<MessageDescriptor>) -> StreamGuard {
        StreamGuard {
            id: self.allocate(http, output),
            manager: Arc::clone(self),
            armed: true,
        }
    }

    pub fn get(&self, id: StreamId) -> Option<Arc<StreamConnection>> {
        self.streams.lock().get(&id).cloned()
    }

    pub fn contains(&self, id: StreamId) -> bool {
        self.streams.lock().contains_key(&id)
    }

    pub fn len(&self) -> usize {
        self.streams.lock().len()
    }

    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }

    fn run<F>(&self, id: StreamId, op: &'static str, f: F) -> StreamReply
    where
        F: FnOnce(&StreamConnection) -> StreamReply,
    {
        let Some(conn) = self.get(id) else {
            tracing::debug!(stream_id = id, op, "Operation on unknown stream");
            return StreamReply::NotFound;
        };
        if !conn.begin() {
            tracing::debug!(stream_id = id, op, "Operation on closing stream");
            return StreamReply::NotFound;
        }
        let conn: &StreamConnection = &conn;
        let _busy = Busy { manager: self, conn };
        f(conn)
    }

    /// Render `payload` like a unary reply body (plaintext, raw file, then
    /// JSON) and forward it, newline-terminated.
    pub fn send_data(&self, id: StreamId, payload: &Message) -> StreamReply {
        self.run(id, "send_data", |conn| {
            if let Some(expected) = conn.output() {
                if payload.descriptor() != expected {
                    tracing::warn!(
                        stream_id = id,
                        expected = expected.full_name(),
                        actual = payload.descriptor().full_name(),
                        "Stream payload has the wrong type"
                    );
                    return StreamReply::SchemaMismatch;
                }
            }
            let body = render_body(payload).body;
            let mut frame = BytesMut::with_capacity(body.len() + 1);
            frame.put_slice(&body);
            frame.put_u8(b'\n');
            self.sink.send(conn.http(), frame.freeze());
            StreamReply::Delivered
        })
    }

    /// Forward raw bytes unframed.
    pub fn send_file_data(&self, id: StreamId, data: Bytes) -> StreamReply {
        self.run(id, "send_file_data", |conn| {
            self.sink.send_file(conn.http(), data);
            StreamReply::Delivered
        })
    }

    pub fn set_headers(&self, id: StreamId, content: &StreamContent) -> StreamReply {
        self.run(id, "set_headers", |conn| {
            self.sink.set_headers(conn.http(), content.headers());
            StreamReply::Delivered
        })
    }

    /// Close the HTTP connection and forget the stream. Deferred while an
    /// operation is in flight.
    pub fn close(&self, id: StreamId) -> StreamReply {
        self.teardown(id, Teardown::Close)
    }

    /// Forget a stream without notifying the HTTP side.
    pub fn release(&self, id: StreamId) -> StreamReply {
        self.teardown(id, Teardown::Expire)
    }

    /// The HTTP connection went away: expire its stream, if any.
    pub fn timeout(&self, http: ConnectionHandle) -> StreamReply {
        let conn = self
            .streams
            .lock()
            .values()
            .find(|c| c.http() == http)
            .cloned();
        match conn {
            Some(conn) => self.teardown(conn.id(), Teardown::Expire),
            None => StreamReply::NotFound,
        }
    }

    fn teardown(&self, id: StreamId, kind: Teardown) -> StreamReply {
        let Some(conn) = self.get(id) else {
            return StreamReply::NotFound;
        };
        match conn.request_teardown(kind) {
            Some(kind) => self.finalize(&conn, kind),
            None => tracing::debug!(stream_id = id, ?kind, "Stream teardown deferred"),
        }
        StreamReply::Delivered
    }

    fn finalize(&self, conn: &StreamConnection, kind: Teardown) {
        self.streams.lock().remove(&conn.id());
        if kind == Teardown::Close {
            self.sink.close(conn.http());
        }
        tracing::debug!(stream_id = conn.id(), connection = %conn.http(), ?kind, "Stream finished");
    }

    /// Close every stream. Returns how many were open.
    pub fn close_all(&self) -> usize {
        let ids: Vec<StreamId> = self.streams.lock().keys().copied().collect();
        for id in &ids {
            self.close(*id);
        }
        ids.len()
    }

    /// Execute a control-channel command.
    pub fn apply(&self, command: StreamCommand) -> StreamReply {
        match command {
            StreamCommand::SendData { id, payload } => self.send_data(id, &payload),
            StreamCommand::SendFileData { id, data } => self.send_file_data(id, data),
            StreamCommand::SetHeaders { id, content } => self.set_headers(id, &content),
            StreamCommand::Close { id } => self.close(id),
            StreamCommand::Timeout { connection } => self.timeout(connection),
        }
    }
}

/// A stream taken during request translation.
///
/// Dropping the guard releases the stream; [`commit`](Self::commit) hands
/// it over to the backend.
pub struct StreamGuard {
    id: StreamId,
    manager: Arc<StreamManager>,
    armed: bool,
}

impl StreamGuard {
    pub fn id(&self) -> StreamId {
        self.id
    }

    pub fn commit(mut self) -> StreamId {
        self.armed = false;
        self.id
    }
}

impl Drop for StreamGuard {
    fn drop(&mut self) {
        if self.armed {
            tracing::debug!(stream_id = self.id, "Releasing uncommitted stream");
            self.manager.release(self.id);
        }
    }
}

impl fmt::Debug for StreamGuard {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("StreamGuard")
            .field("id", &self.id)
            .field("armed", &self.armed)
            .finish()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::schema::{FieldType, ReservedField, Value};
    use axum::http::HeaderMap;
    use std::sync::mpsc;
    use std::thread;
    use std::time::Duration;

    #[derive(Debug, Clone, PartialEq)]
    enum Event {
        Data(ConnectionHandle, Bytes),
        File(ConnectionHandle, Bytes),
        Headers(ConnectionHandle, usize),
        Close(ConnectionHandle),
    }

    #[derive(Default)]
    struct RecordingSink {
        events: Mutex<Vec<Event>>,
        /// When set, `send` blocks until a unit arrives.
        gate: Mutex<Option<mpsc::Receiver<()>>>,
        entered: Mutex<Option<mpsc::Sender<()>>>,
    }

    impl StreamSink for RecordingSink {
        fn send(&self, connection: ConnectionHandle, data: Bytes) {
            if let Some(tx) = self.entered.lock().take() {
                let _ = tx.send(());
            }
            let gate = self.gate.lock().take();
            if let Some(gate) = gate {
                let _ = gate.recv();
            }
            self.events.lock().push(Event::Data(connection, data));
        }

        fn send_file(&self, connection: ConnectionHandle, data: Bytes) {
            self.events.lock().push(Event::File(connection, data));
        }

        fn set_headers(&self, connection: ConnectionHandle, headers: HeaderMap) {
            self.events.lock().push(Event::Headers(connection, headers.len()));
        }

        fn close(&self, connection: ConnectionHandle) {
            self.events.lock().push(Event::Close(connection));
        }
    }

    fn item() -> MessageDescriptor {
        MessageDescriptor::builder("t.Item")
            .field("id", FieldType::UInt32)
            .field("name", FieldType::String)
            .reserved(ReservedField::Result)
            .build()
    }

    fn setup() -> (Arc<RecordingSink>, Arc<StreamManager>) {
        let sink = Arc::new(RecordingSink::default());
        let manager = Arc::new(StreamManager::new(sink.clone()));
        (sink, manager)
    }

    #[test]
    fn ids_strictly_increase() {
        let (_, m) = setup();
        let a = m.allocate(ConnectionHandle::next(), None);
        let b = m.allocate(ConnectionHandle::next(), None);
        assert!(b > a);
        assert_eq!(m.len(), 2);
    }

    #[test]
    fn data_is_newline_framed() {
        let (sink, m) = setup();
        let http = ConnectionHandle::next();
        let id = m.allocate(http, Some(item()));
        let payload = Message::new(item())
            .with("id", Value::U32(1))
            .unwrap()
            .with("name", Value::String("a".into()))
            .unwrap();

        assert_eq!(m.send_data(id, &payload), StreamReply::Delivered);
        assert_eq!(
            sink.events.lock()[0],
            Event::Data(http, Bytes::from_static(b"{\"id\":1,\"name\":\"a\"}\n"))
        );
    }

    #[test]
    fn plaintext_chunk_sent_as_text() {
        let (sink, m) = setup();
        let http = ConnectionHandle::next();
        let line = MessageDescriptor::builder("t.Line")
            .field("line", FieldType::String)
            .reserved(ReservedField::Plaintext)
            .build();
        let id = m.allocate(http, Some(line.clone()));
        let payload = Message::new(line)
            .with("_plaintext", Value::String("hello".into()))
            .unwrap();

        assert_eq!(m.send_data(id, &payload), StreamReply::Delivered);
        assert_eq!(
            sink.events.lock()[0],
            Event::Data(http, Bytes::from_static(b"hello\n"))
        );
    }

    #[test]
    fn raw_file_chunk_sent_as_bytes() {
        let (sink, m) = setup();
        let http = ConnectionHandle::next();
        let blob = MessageDescriptor::builder("t.Blob")
            .field("size", FieldType::UInt32)
            .reserved(ReservedField::RawFile)
            .build();
        let id = m.allocate(http, Some(blob.clone()));
        let payload = Message::new(blob)
            .with("_raw_file", Value::Bytes(Bytes::from_static(b"\x01\x02")))
            .unwrap();

        assert_eq!(m.send_data(id, &payload), StreamReply::Delivered);
        assert_eq!(
            sink.events.lock()[0],
            Event::Data(http, Bytes::from_static(b"\x01\x02\n"))
        );
    }

    #[test]
    fn wrong_payload_type_rejected() {
        let (sink, m) = setup();
        let id = m.allocate(ConnectionHandle::next(), Some(item()));
        let other = Message::new(MessageDescriptor::builder("t.Other").build());
        assert_eq!(m.send_data(id, &other), StreamReply::SchemaMismatch);
        assert!(sink.events.lock().is_empty());
        assert!(m.contains(id));
    }

    #[test]
    fn file_data_and_headers_pass_through() {
        let (sink, m) = setup();
        let http = ConnectionHandle::next();
        let id = m.allocate(http, None);
        m.set_headers(
            id,
            &StreamContent::File {
                filename: "x.bin".into(),
                size: None,
            },
        );
        m.send_file_data(id, Bytes::from_static(b"\x00raw"));
        let events = sink.events.lock();
        assert_eq!(events[0], Event::Headers(http, 3));
        assert_eq!(events[1], Event::File(http, Bytes::from_static(b"\x00raw")));
    }

    #[test]
    fn close_notifies_and_forgets() {
        let (sink, m) = setup();
        let http = ConnectionHandle::next();
        let id = m.allocate(http, None);
        assert_eq!(m.close(id), StreamReply::Delivered);
        assert!(!m.contains(id));
        assert_eq!(*sink.events.lock(), vec![Event::Close(http)]);
        assert_eq!(m.close(id), StreamReply::NotFound);
        assert_eq!(m.send_file_data(id, Bytes::new()), StreamReply::NotFound);
    }

    #[test]
    fn timeout_expires_silently() {
        let (sink, m) = setup();
        let http = ConnectionHandle::next();
        let id = m.allocate(http, None);
        assert_eq!(m.timeout(http), StreamReply::Delivered);
        assert!(!m.contains(id));
        assert!(sink.events.lock().is_empty());
        assert_eq!(m.timeout(http), StreamReply::NotFound);
    }

    #[test]
    fn guard_releases_unless_committed() {
        let (sink, m) = setup();
        let dropped = m.reserve(ConnectionHandle::next(), None);
        let dropped_id = dropped.id();
        drop(dropped);
        assert!(!m.contains(dropped_id));

        let kept = m.reserve(ConnectionHandle::next(), None);
        let kept_id = kept.commit();
        assert!(m.contains(kept_id));
        assert!(sink.events.lock().is_empty());
    }

    #[test]
    fn close_during_send_is_deferred() {
        let (sink, m) = setup();
        let (release_tx, release_rx) = mpsc::channel();
        let (entered_tx, entered_rx) = mpsc::channel();
        *sink.gate.lock() = Some(release_rx);
        *sink.entered.lock() = Some(entered_tx);

        let http = ConnectionHandle::next();
        let id = m.allocate(http, None);

        let sender = {
            let m = Arc::clone(&m);
            thread::spawn(move || {
                let payload = Message::new(MessageDescriptor::builder("t.Any").build());
                m.send_data(id, &payload)
            })
        };

        entered_rx.recv_timeout(Duration::from_secs(5)).unwrap();
        assert_eq!(m.close(id), StreamReply::Delivered);
        assert!(m.contains(id), "close must wait for the in-flight send");

        release_tx.send(()).unwrap();
        assert_eq!(sender.join().unwrap(), StreamReply::Delivered);
        assert!(!m.contains(id));

        let events = sink.events.lock();
        assert!(matches!(events[0], Event::Data(..)));
        assert_eq!(events[1], Event::Close(http));
    }

    #[test]
    fn timeout_during_send_is_deferred() {
        let (sink, m) = setup();
        let (release_tx, release_rx) = mpsc::channel();
        let (entered_tx, entered_rx) = mpsc::channel();
        *sink.gate.lock() = Some(release_rx);
        *sink.entered.lock() = Some(entered_tx);

        let http = ConnectionHandle::next();
        let id = m.allocate(http, None);

        let sender = {
            let m = Arc::clone(&m);
            thread::spawn(move || {
                let payload = Message::new(MessageDescriptor::builder("t.Any").build());
                m.send_data(id, &payload)
            })
        };

        entered_rx.recv_timeout(Duration::from_secs(5)).unwrap();
        assert_eq!(m.timeout(http), StreamReply::Delivered);
        assert!(m.contains(id), "timeout must wait for the in-flight send");
        assert_eq!(m.send_file_data(id, Bytes::new()), StreamReply::NotFound);

        release_tx.send(()).unwrap();
        assert_eq!(sender.join().unwrap(), StreamReply::Delivered);
        assert!(!m.contains(id));

        let events = sink.events.lock();
        assert_eq!(events.len(), 1);
        assert!(matches!(events[0], Event::Data(..)));
    }

    #[test]
    fn close_all_empties_registry() {
        let (sink, m) = setup();
        m.allocate(ConnectionHandle::next(), None);
        m.allocate(ConnectionHandle::next(), None);
        assert_eq!(m.close_all(), 2);
        assert!(m.is_empty());
        assert_eq!(sink.events.lock().len(), 2);
    }
}
