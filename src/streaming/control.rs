//! The stream control channel.
//!
//! Backends and the HTTP layer post [`StreamCommand`]s; one dedicated
//! thread drains the queue and applies them to the [`StreamManager`] in
//! arrival order. Callers either fire and forget ([`StreamController::submit`])
//! or wait for the [`StreamReply`].

use std::sync::Arc;
use std::thread::{self, JoinHandle};

use bytes::Bytes;
use thiserror::Error;
use tokio::sync::{mpsc, oneshot};

use crate::net::ConnectionHandle;
use crate::schema::Message;
use crate::streaming::connection::StreamId;
use crate::streaming::manager::{StreamManager, StreamReply};
use crate::streaming::sink::StreamContent;

#[derive(Debug, Clone)]
pub enum StreamCommand {
    SendData { id: StreamId, payload: Message },
    SendFileData { id: StreamId, data: Bytes },
    SetHeaders { id: StreamId, content: StreamContent },
    Close { id: StreamId },
    Timeout { connection: ConnectionHandle },
}

#[derive(Debug)]
enum ControlMessage {
    Command {
        command: StreamCommand,
        reply: Option<oneshot::Sender<StreamReply>>,
    },
    Shutdown,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Error)]
#[error("stream control channel is closed")]
pub struct ControlClosed;

/// Cloneable handle for posting commands.
#[derive(Debug, Clone)]
pub struct StreamController {
    tx: mpsc::UnboundedSender<ControlMessage>,
}

impl StreamController {
    pub fn submit(&self, command: StreamCommand) -> Result<(), ControlClosed> {
        self.tx
            .send(ControlMessage::Command { command, reply: None })
            .map_err(|_| ControlClosed)
    }

    fn post(&self, command: StreamCommand) -> Result<oneshot::Receiver<StreamReply>, ControlClosed> {
        let (reply, rx) = oneshot::channel();
        self.tx
            .send(ControlMessage::Command {
                command,
                reply: Some(reply),
            })
            .map_err(|_| ControlClosed)?;
        Ok(rx)
    }

    /// Post and block until the command has been applied.
    ///
    /// Must not be called from async code; use [`call_async`](Self::call_async) there.
    pub fn call(&self, command: StreamCommand) -> Result<StreamReply, ControlClosed> {
        self.post(command)?.blocking_recv().map_err(|_| ControlClosed)
    }

    pub async fn call_async(&self, command: StreamCommand) -> Result<StreamReply, ControlClosed> {
        self.post(command)?.await.map_err(|_| ControlClosed)
    }

    pub fn send_data(&self, id: StreamId, payload: Message) -> Result<StreamReply, ControlClosed> {
        self.call(StreamCommand::SendData { id, payload })
    }

    pub fn send_file_data(&self, id: StreamId, data: Bytes) -> Result<StreamReply, ControlClosed> {
        self.call(StreamCommand::SendFileData { id, data })
    }

    pub fn set_headers(&self, id: StreamId, content: StreamContent) -> Result<StreamReply, ControlClosed> {
        self.call(StreamCommand::SetHeaders { id, content })
    }

    pub fn close(&self, id: StreamId) -> Result<StreamReply, ControlClosed> {
        self.call(StreamCommand::Close { id })
    }

    /// Report that the HTTP side of `connection` is gone. Never blocks.
    pub fn timeout(&self, connection: ConnectionHandle) -> Result<(), ControlClosed> {
        self.submit(StreamCommand::Timeout { connection })
    }
}

/// Owns the control thread.
#[derive(Debug)]
pub struct ControlChannel {
    controller: StreamController,
    worker: Option<JoinHandle<()>>,
}

impl ControlChannel {
    pub fn spawn(manager: Arc<StreamManager>, thread_name: &str) -> std::io::Result<Self> {
        let (tx, mut rx) = mpsc::unbounded_channel();
        let worker = thread::Builder::new()
            .name(thread_name.to_string())
            .spawn(move || {
                tracing::debug!("Stream control thread started");
                while let Some(message) = rx.blocking_recv() {
                    match message {
                        ControlMessage::Command { command, reply } => {
                            let result = manager.apply(command);
                            if let Some(reply) = reply {
                                let _ = reply.send(result);
                            }
                        }
                        ControlMessage::Shutdown => break,
                    }
                }
                tracing::debug!("Stream control thread stopped");
            })?;

        Ok(Self {
            controller: StreamController { tx },
            worker: Some(worker),
        })
    }

    pub fn controller(&self) -> StreamController {
        self.controller.clone()
    }

    /// Stop the thread after the commands already queued. Idempotent.
    pub fn shutdown(&mut self) {
        let Some(worker) = self.worker.take() else {
            return;
        };
        let _ = self.controller.tx.send(ControlMessage::Shutdown);
        if worker.join().is_err() {
            tracing::error!("Stream control thread panicked");
        }
    }
}

impl Drop for ControlChannel {
    fn drop(&mut self) {
        self.shutdown();
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::streaming::sink::NullSink;
    use crate::schema::MessageDescriptor;

    fn channel() -> (Arc<StreamManager>, ControlChannel) {
        let manager = Arc::new(StreamManager::new(Arc::new(NullSink)));
        let channel = ControlChannel::spawn(Arc::clone(&manager), "test-stream-control").unwrap();
        (manager, channel)
    }

    #[test]
    fn blocking_call_applies_command() {
        let (manager, channel) = channel();
        let id = manager.allocate(ConnectionHandle::next(), None);
        let controller = channel.controller();

        let payload = Message::new(MessageDescriptor::builder("t.Any").build());
        assert_eq!(controller.send_data(id, payload), Ok(StreamReply::Delivered));
        assert_eq!(controller.close(id), Ok(StreamReply::Delivered));
        assert!(!manager.contains(id));
        assert_eq!(controller.close(id), Ok(StreamReply::NotFound));
    }

    #[test]
    fn submitted_commands_run_in_order() {
        let (manager, channel) = channel();
        let http = ConnectionHandle::next();
        let id = manager.allocate(http, None);
        let controller = channel.controller();

        controller.timeout(http).unwrap();
        // Replies come back in queue order, so the timeout ran first.
        assert_eq!(
            controller.send_file_data(id, Bytes::from_static(b"x")),
            Ok(StreamReply::NotFound)
        );
    }

    #[test]
    fn closed_after_shutdown() {
        let (_manager, mut channel) = channel();
        let controller = channel.controller();
        channel.shutdown();
        assert_eq!(controller.close(1), Err(ControlClosed));
        channel.shutdown();
    }

    #[tokio::test]
    async fn async_call() {
        let (manager, channel) = channel();
        let id = manager.allocate(ConnectionHandle::next(), None);
        let reply = channel
            .controller()
            .call_async(StreamCommand::Close { id })
            .await;
        assert_eq!(reply, Ok(StreamReply::Delivered));
    }
}
