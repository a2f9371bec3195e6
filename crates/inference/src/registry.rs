//! Session registry — per-session delivery channels for in-flight
//! inferences, plus the end-user → engine-session map.
//!
//! A delivery channel exists exactly while an `infer` call is awaiting
//! frames for that session. Only mutating operations hold the lock;
//! holding a returned receiver outside the critical section is safe.

use std::collections::HashMap;

use jota_protocol::EngineFrame;
use parking_lot::Mutex;
use tokio::sync::mpsc;

/// One queued item for a session's `infer` caller.
/// `None` is the connection-loss sentinel.
pub(crate) type DeliveryItem = Option<EngineFrame>;
pub(crate) type DeliveryReceiver = mpsc::UnboundedReceiver<DeliveryItem>;

#[derive(Default)]
pub(crate) struct SessionRegistry {
    channels: Mutex<HashMap<String, mpsc::UnboundedSender<DeliveryItem>>>,
    users: Mutex<HashMap<String, String>>,
}

impl SessionRegistry {
    /// Create the delivery channel for a session and return its receiver.
    ///
    /// Replacing a stale entry disconnects any previous receiver, which
    /// then observes its channel as closed.
    pub(crate) fn attach(&self, session_id: &str) -> DeliveryReceiver {
        let (tx, rx) = mpsc::unbounded_channel();
        self.channels.lock().insert(session_id.to_owned(), tx);
        rx
    }

    /// Remove a session's channel. Safe if absent.
    pub(crate) fn detach(&self, session_id: &str) {
        self.channels.lock().remove(session_id);
    }

    /// Enqueue a frame for a session. Returns `false` if no caller is
    /// waiting on that session.
    pub(crate) fn route(&self, session_id: &str, frame: EngineFrame) -> bool {
        match self.channels.lock().get(session_id) {
            Some(tx) => tx.send(Some(frame)).is_ok(),
            None => false,
        }
    }

    /// Deliver the loss sentinel to every waiting caller and clear the map.
    pub(crate) fn close_all(&self) {
        let mut channels = self.channels.lock();
        for (_, tx) in channels.drain() {
            let _ = tx.send(None);
        }
    }

    pub(crate) fn remember_user(&self, user_id: &str, session_id: &str) {
        self.users
            .lock()
            .insert(user_id.to_owned(), session_id.to_owned());
    }

    pub(crate) fn lookup_user(&self, user_id: &str) -> Option<String> {
        self.users.lock().get(user_id).cloned()
    }
}
