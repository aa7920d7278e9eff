//! Feed connection trait.
//!
//! The seam between the view layer and the connection manager, so the board
//! can be driven by a scripted connection in tests.

use crate::connection::ConnectionManager;
use crate::error::{WsError, WsResult};
use parking_lot::Mutex;
use pricestream_core::ConnectionState;
use std::sync::atomic::{AtomicBool, AtomicUsize, Ordering};
use std::sync::Arc;
use tokio::sync::{broadcast, watch};

/// A reconnecting text-message feed.
pub trait FeedConnection: Send + Sync {
    /// Start connecting. Returns the live state observable.
    fn connect(&self) -> watch::Receiver<ConnectionState>;

    /// Subscribe to inbound text messages.
    fn observe_messages(&self) -> broadcast::Receiver<String>;

    /// Fire-and-forget write. `false` if it could not be handed to a transport.
    fn send(&self, payload: &str) -> bool;

    /// Close and suppress reconnects until the next `connect`.
    fn disconnect(&self) -> WsResult<()>;

    /// Current connection state.
    fn state(&self) -> ConnectionState;
}

/// Arc wrapper for FeedConnection trait objects.
pub type DynFeedConnection = Arc<dyn FeedConnection>;

impl FeedConnection for ConnectionManager {
    fn connect(&self) -> watch::Receiver<ConnectionState> {
        ConnectionManager::connect(self)
    }

    fn observe_messages(&self) -> broadcast::Receiver<String> {
        ConnectionManager::observe_messages(self)
    }

    fn send(&self, payload: &str) -> bool {
        ConnectionManager::send(self, payload)
    }

    fn disconnect(&self) -> WsResult<()> {
        ConnectionManager::disconnect(self)
    }

    fn state(&self) -> ConnectionState {
        ConnectionManager::state(self)
    }
}

/// Scripted feed connection for testing.
///
/// Never changes state on its own: tests drive it with `set_state` and
/// `push_message`.
pub struct MockFeedConnection {
    state_tx: watch::Sender<ConnectionState>,
    message_tx: broadcast::Sender<String>,
    sent: Mutex<Vec<String>>,
    connect_calls: AtomicUsize,
    disconnect_calls: AtomicUsize,
    accept_sends: AtomicBool,
    fail_disconnect: AtomicBool,
}

impl Default for MockFeedConnection {
    fn default() -> Self {
        Self::new()
    }
}

impl MockFeedConnection {
    /// Create a new mock connection in the Disconnected state.
    pub fn new() -> Self {
        let (state_tx, _) = watch::channel(ConnectionState::Disconnected);
        let (message_tx, _) = broadcast::channel(64);
        Self {
            state_tx,
            message_tx,
            sent: Mutex::new(Vec::new()),
            connect_calls: AtomicUsize::new(0),
            disconnect_calls: AtomicUsize::new(0),
            accept_sends: AtomicBool::new(true),
            fail_disconnect: AtomicBool::new(false),
        }
    }

    /// Publish a connection state.
    pub fn set_state(&self, state: ConnectionState) {
        self.state_tx.send_replace(state);
    }

    /// Deliver an inbound message. Returns the number of receivers.
    pub fn push_message(&self, text: impl Into<String>) -> usize {
        self.message_tx.send(text.into()).unwrap_or(0)
    }

    /// Make `send` refuse (or accept again).
    pub fn set_accept_sends(&self, accept: bool) {
        self.accept_sends.store(accept, Ordering::SeqCst);
    }

    /// Make `disconnect` report a failed close.
    pub fn set_fail_disconnect(&self, fail: bool) {
        self.fail_disconnect.store(fail, Ordering::SeqCst);
    }

    /// Payloads accepted by `send`.
    pub fn sent(&self) -> Vec<String> {
        self.sent.lock().clone()
    }

    /// Number of `connect` calls.
    pub fn connect_count(&self) -> usize {
        self.connect_calls.load(Ordering::SeqCst)
    }

    /// Number of `disconnect` calls.
    pub fn disconnect_count(&self) -> usize {
        self.disconnect_calls.load(Ordering::SeqCst)
    }
}

impl FeedConnection for MockFeedConnection {
    fn connect(&self) -> watch::Receiver<ConnectionState> {
        self.connect_calls.fetch_add(1, Ordering::SeqCst);
        self.state_tx.subscribe()
    }

    fn observe_messages(&self) -> broadcast::Receiver<String> {
        self.message_tx.subscribe()
    }

    fn send(&self, payload: &str) -> bool {
        if !self.accept_sends.load(Ordering::SeqCst) {
            return false;
        }
        self.sent.lock().push(payload.to_string());
        true
    }

    fn disconnect(&self) -> WsResult<()> {
        self.disconnect_calls.fetch_add(1, Ordering::SeqCst);
        self.set_state(ConnectionState::Disconnected);
        if self.fail_disconnect.load(Ordering::SeqCst) {
            return Err(WsError::CloseFailed("mock close refused".to_string()));
        }
        Ok(())
    }

    fn state(&self) -> ConnectionState {
        *self.state_tx.borrow()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::connection::ConnectionConfig;
    use crate::mock::MockTransport;

    #[tokio::test]
    async fn test_manager_behind_trait_object() {
        let transport = MockTransport::new();
        let feed: DynFeedConnection = Arc::new(ConnectionManager::new(
            ConnectionConfig::default(),
            transport.clone(),
        ));

        let state = feed.connect();
        assert_eq!(*state.borrow(), ConnectionState::Connecting);
        transport.listener(0).unwrap().on_opened();
        assert_eq!(feed.state(), ConnectionState::Connected);
        assert!(feed.send("hello"));

        feed.disconnect().unwrap();
        assert_eq!(feed.state(), ConnectionState::Disconnected);
    }

    #[tokio::test]
    async fn test_mock_feed_records_calls() {
        let feed = MockFeedConnection::new();
        let mut messages = feed.observe_messages();

        let state = feed.connect();
        feed.set_state(ConnectionState::Connected);
        assert_eq!(*state.borrow(), ConnectionState::Connected);

        assert_eq!(feed.push_message("tick"), 1);
        assert_eq!(messages.recv().await.unwrap(), "tick");

        assert!(feed.send("a"));
        feed.set_accept_sends(false);
        assert!(!feed.send("b"));
        assert_eq!(feed.sent(), vec!["a".to_string()]);

        feed.set_fail_disconnect(true);
        assert!(feed.disconnect().is_err());
        assert_eq!(feed.connect_count(), 1);
        assert_eq!(feed.disconnect_count(), 1);
        assert_eq!(feed.state(), ConnectionState::Disconnected);
    }
}
