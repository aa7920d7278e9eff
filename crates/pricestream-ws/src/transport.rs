//! Transport capability contract.
//!
//! The connection manager only depends on these traits. A transport opens
//! one bidirectional text stream per `open` call and reports its lifecycle
//! through the listener it was given.

use crate::error::WsError;
use std::sync::Arc;

/// Close code for a graceful, client-initiated close.
pub const NORMAL_CLOSURE: u16 = 1000;

/// Close code reported when the stream ends without a close frame.
pub const ABNORMAL_CLOSURE: u16 = 1006;

/// Callbacks fired by a transport for one opened stream.
///
/// Callbacks may run on any task, concurrently with user commands.
pub trait TransportListener: Send + Sync {
    /// The handshake completed and the stream is open.
    fn on_opened(&self);

    /// A text frame arrived.
    fn on_message(&self, text: String);

    /// The peer started the closing handshake.
    fn on_closing(&self, code: u16, reason: &str);

    /// The stream is fully closed.
    fn on_closed(&self, code: u16, reason: &str);

    /// The stream failed (handshake error, I/O error, keep-alive timeout).
    fn on_failure(&self, error: WsError);
}

/// Handle to one opened stream.
pub trait TransportHandle: Send + Sync {
    /// Queue a text frame. Returns `false` if the stream refused it
    /// (closed, closing, or outbound buffer full). Never blocks.
    fn send(&self, text: &str) -> bool;

    /// Start a graceful close. Returns `false` if the request could not be
    /// delivered to the stream.
    fn close(&self, code: u16, reason: &str) -> bool;
}

/// Factory for streams.
pub trait Transport: Send + Sync {
    /// Open a stream to `url`.
    ///
    /// Returns immediately; the handshake runs in the background and its
    /// outcome is reported through `listener`. Implementations must not call
    /// the listener from within `open` itself.
    fn open(&self, url: &str, listener: Arc<dyn TransportListener>) -> Box<dyn TransportHandle>;
}
