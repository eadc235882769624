//! One long-lived streaming response.
//!
//! # State Machine
//! ```text
//! Idle ──begin──▶ Busy ──end──▶ Idle
//!  │               │
//!  │ teardown      │ teardown (deferred)
//!  ▼               ▼
//! Finalized ◀──end── Closing
//! ```
//! A teardown requested while an operation is in flight is recorded and
//! carried out by whoever ends that operation. Exactly one caller ever
//! finalizes a connection.

use parking_lot::{Condvar, Mutex};

use crate::net::ConnectionHandle;
use crate::schema::MessageDescriptor;

pub type StreamId = u64;

/// How a stream ends.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Teardown {
    /// Backend closed it; the HTTP connection is closed too.
    Close,
    /// HTTP side went away; nothing left to notify.
    Expire,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum StreamPhase {
    Idle,
    Busy,
    Closing,
    Finalized,
}

#[derive(Debug, Default)]
struct StreamState {
    in_use: bool,
    teardown: Option<Teardown>,
    finalized: bool,
}

#[derive(Debug)]
pub struct StreamConnection {
    id: StreamId,
    http: ConnectionHandle,
    output: Option<MessageDescriptor>,
    state: Mutex<StreamState>,
    idle: Condvar,
}

impl StreamConnection {
    pub fn new(id: StreamId, http: ConnectionHandle, output: Option<MessageDescriptor>) -> Self {
        Self {
            id,
            http,
            output,
            state: Mutex::new(StreamState::default()),
            idle: Condvar::new(),
        }
    }

    pub fn id(&self) -> StreamId {
        self.id
    }

    pub fn http(&self) -> ConnectionHandle {
        self.http
    }

    /// Output type the backend's payloads must have.
    pub fn output(&self) -> Option<&MessageDescriptor> {
        self.output.as_ref()
    }

    pub fn phase(&self) -> StreamPhase {
        let st = self.state.lock();
        match (st.finalized, st.teardown, st.in_use) {
            (true, _, _) => StreamPhase::Finalized,
            (false, Some(_), _) => StreamPhase::Closing,
            (false, None, true) => StreamPhase::Busy,
            (false, None, false) => StreamPhase::Idle,
        }
    }

    /// Mark the stream busy, waiting for a concurrent operation to end.
    /// Returns false once a teardown has been requested.
    pub fn begin(&self) -> bool {
        let mut st = self.state.lock();
        while st.in_use && st.teardown.is_none() {
            self.idle.wait(&mut st);
        }
        if st.teardown.is_some() {
            return false;
        }
        st.in_use = true;
        true
    }

    /// End the current operation. Returns a deferred teardown the caller
    /// must now carry out.
    pub fn end(&self) -> Option<Teardown> {
        let mut st = self.state.lock();
        st.in_use = false;
        let pending = match st.teardown {
            Some(kind) if !st.finalized => {
                st.finalized = true;
                Some(kind)
            }
            _ => None,
        };
        self.idle.notify_all();
        pending
    }

    /// Request a teardown. Returns the teardown if the caller must carry it
    /// out now; `None` if it is deferred or was already requested.
    pub fn request_teardown(&self, kind: Teardown) -> Option<Teardown> {
        let mut st = self.state.lock();
        if st.teardown.is_some() {
            return None;
        }
        st.teardown = Some(kind);
        self.idle.notify_all();
        if st.in_use {
            None
        } else {
            st.finalized = true;
            Some(kind)
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn conn() -> StreamConnection {
        StreamConnection::new(1, ConnectionHandle::next(), None)
    }

    #[test]
    fn idle_teardown_is_immediate() {
        let c = conn();
        assert_eq!(c.request_teardown(Teardown::Close), Some(Teardown::Close));
        assert_eq!(c.phase(), StreamPhase::Finalized);
        assert!(!c.begin());
    }

    #[test]
    fn busy_teardown_is_deferred_to_end() {
        let c = conn();
        assert!(c.begin());
        assert_eq!(c.phase(), StreamPhase::Busy);

        assert_eq!(c.request_teardown(Teardown::Close), None);
        assert_eq!(c.phase(), StreamPhase::Closing);

        assert_eq!(c.end(), Some(Teardown::Close));
        assert_eq!(c.phase(), StreamPhase::Finalized);
        assert_eq!(c.end(), None);
    }

    #[test]
    fn second_teardown_is_ignored() {
        let c = conn();
        assert!(c.begin());
        assert_eq!(c.request_teardown(Teardown::Expire), None);
        assert_eq!(c.request_teardown(Teardown::Close), None);
        assert_eq!(c.end(), Some(Teardown::Expire));
    }

    #[test]
    fn operations_serialize() {
        use std::sync::Arc;
        use std::thread;
        use std::time::Duration;

        let c = Arc::new(conn());
        assert!(c.begin());

        let waiter = {
            let c = Arc::clone(&c);
            thread::spawn(move || {
                let ok = c.begin();
                c.end();
                ok
            })
        };
        thread::sleep(Duration::from_millis(20));
        assert_eq!(c.phase(), StreamPhase::Busy);
        assert_eq!(c.end(), None);
        assert!(waiter.join().unwrap());
    }
}
