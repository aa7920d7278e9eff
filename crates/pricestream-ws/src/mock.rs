//! Scripted transport for testing.
//!
//! `MockTransport` records every `open` call and hands back the listener so
//! a test can fire transport callbacks in whatever order it needs.

use crate::transport::{Transport, TransportHandle, TransportListener};
use parking_lot::Mutex;
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::Arc;

/// One recorded `open` call.
struct OpenedStream {
    url: String,
    listener: Arc<dyn TransportListener>,
    handle: Arc<MockHandle>,
}

/// Transport that never touches the network.
#[derive(Default)]
pub struct MockTransport {
    opened: Mutex<Vec<OpenedStream>>,
}

impl MockTransport {
    /// Create a new mock transport.
    pub fn new() -> Arc<Self> {
        Arc::new(Self::default())
    }

    /// Number of streams opened so far.
    pub fn open_count(&self) -> usize {
        self.opened.lock().len()
    }

    /// URL passed to the `index`-th open.
    pub fn url(&self, index: usize) -> Option<String> {
        self.opened.lock().get(index).map(|o| o.url.clone())
    }

    /// Listener of the `index`-th stream.
    pub fn listener(&self, index: usize) -> Option<Arc<dyn TransportListener>> {
        self.opened.lock().get(index).map(|o| o.listener.clone())
    }

    /// Listener of the most recently opened stream.
    pub fn last_listener(&self) -> Option<Arc<dyn TransportListener>> {
        self.opened.lock().last().map(|o| o.listener.clone())
    }

    /// Handle of the `index`-th stream.
    pub fn handle(&self, index: usize) -> Option<Arc<MockHandle>> {
        self.opened.lock().get(index).map(|o| o.handle.clone())
    }

    /// Handle of the most recently opened stream.
    pub fn last_handle(&self) -> Option<Arc<MockHandle>> {
        self.opened.lock().last().map(|o| o.handle.clone())
    }
}

impl Transport for MockTransport {
    fn open(&self, url: &str, listener: Arc<dyn TransportListener>) -> Box<dyn TransportHandle> {
        let handle = Arc::new(MockHandle::new());
        self.opened.lock().push(OpenedStream {
            url: url.to_string(),
            listener,
            handle: handle.clone(),
        });
        Box::new(SharedMockHandle(handle))
    }
}

/// Recorded state of one mock stream.
#[derive(Debug)]
pub struct MockHandle {
    sent: Mutex<Vec<String>>,
    close_requests: Mutex<Vec<(u16, String)>>,
    accepting: AtomicBool,
}

impl MockHandle {
    fn new() -> Self {
        Self {
            sent: Mutex::new(Vec::new()),
            close_requests: Mutex::new(Vec::new()),
            accepting: AtomicBool::new(true),
        }
    }

    /// Frames accepted so far.
    pub fn sent(&self) -> Vec<String> {
        self.sent.lock().clone()
    }

    /// Close requests received, as `(code, reason)`.
    pub fn close_requests(&self) -> Vec<(u16, String)> {
        self.close_requests.lock().clone()
    }

    /// Make `send` and `close` refuse (or accept again).
    pub fn set_accepting(&self, accepting: bool) {
        self.accepting.store(accepting, Ordering::SeqCst);
    }

    fn is_accepting(&self) -> bool {
        self.accepting.load(Ordering::SeqCst)
    }
}

/// The boxed handle given to the connection manager.
struct SharedMockHandle(Arc<MockHandle>);

impl TransportHandle for SharedMockHandle {
    fn send(&self, text: &str) -> bool {
        if !self.0.is_accepting() {
            return false;
        }
        self.0.sent.lock().push(text.to_string());
        true
    }

    fn close(&self, code: u16, reason: &str) -> bool {
        if !self.0.is_accepting() {
            return false;
        }
        self.0
            .close_requests
            .lock()
            .push((code, reason.to_string()));
        true
    }
}
