//! WebSocket client for the pricestream price feed.
//!
//! Provides a persistent streaming connection with:
//! - Automatic reconnection with capped exponential backoff
//! - Observable connection state (latest-value watch channel)
//! - Bounded, non-blocking fan-out of inbound messages
//! - Serialized, fire-and-forget outbound sends
//! - Transport keep-alive (ping interval, pong timeout)

pub mod backoff;
pub mod connection;
pub mod error;
pub mod feed;
pub mod keepalive;
pub mod mock;
pub mod transport;
pub mod ws_transport;

pub use backoff::{reconnect_delay, Backoff};
pub use connection::{ConnectionConfig, ConnectionManager, DEFAULT_URL};
pub use error::{WsError, WsResult};
pub use feed::{DynFeedConnection, FeedConnection, MockFeedConnection};
pub use mock::{MockHandle, MockTransport};
pub use pricestream_core::ConnectionState;
pub use transport::{
    Transport, TransportHandle, TransportListener, ABNORMAL_CLOSURE, NORMAL_CLOSURE,
};
pub use ws_transport::{WsTransport, WsTransportConfig};
