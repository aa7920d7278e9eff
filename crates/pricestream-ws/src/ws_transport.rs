//! `Transport` implementation on top of tokio-tungstenite.
//!
//! Each `open` spawns one socket task that owns the stream. The returned
//! handle talks to that task through a bounded channel, so `send` and
//! `close` never wait on network I/O.

use crate::error::WsError;
use crate::keepalive::KeepAlive;
use crate::transport::{
    Transport, TransportHandle, TransportListener, ABNORMAL_CLOSURE, NORMAL_CLOSURE,
};
use futures_util::{SinkExt, StreamExt};
use std::sync::Arc;
use std::time::Duration;
use tokio::sync::mpsc;
use tokio::time::MissedTickBehavior;
use tokio_tungstenite::connect_async_tls_with_config;
use tokio_tungstenite::tungstenite::protocol::frame::coding::CloseCode;
use tokio_tungstenite::tungstenite::protocol::CloseFrame;
use tokio_tungstenite::tungstenite::Message;
use tracing::{debug, info, warn};

/// Socket-level configuration.
#[derive(Debug, Clone)]
pub struct WsTransportConfig {
    /// Capacity of the per-socket outbound queue.
    pub outbound_buffer: usize,
    /// Handshake timeout.
    pub connect_timeout_ms: u64,
    /// Idle time before a keep-alive ping.
    pub ping_interval_ms: u64,
    /// Pong deadline after a keep-alive ping.
    pub pong_timeout_ms: u64,
}

impl Default for WsTransportConfig {
    fn default() -> Self {
        Self {
            outbound_buffer: 256,
            connect_timeout_ms: 10_000,
            ping_interval_ms: 15_000,
            pong_timeout_ms: 10_000,
        }
    }
}

/// Outbound request from a handle to its socket task.
#[derive(Debug)]
enum Outbound {
    Text(String),
    Close { code: u16, reason: String },
}

/// WebSocket transport.
#[derive(Debug, Clone, Default)]
pub struct WsTransport {
    config: WsTransportConfig,
}

impl WsTransport {
    pub fn new(config: WsTransportConfig) -> Self {
        Self { config }
    }
}

impl Transport for WsTransport {
    fn open(&self, url: &str, listener: Arc<dyn TransportListener>) -> Box<dyn TransportHandle> {
        let (tx, rx) = mpsc::channel(self.config.outbound_buffer.max(1));
        tokio::spawn(run_socket(
            url.to_string(),
            self.config.clone(),
            rx,
            listener,
        ));
        Box::new(WsTransportHandle { tx })
    }
}

/// Handle to a socket task. Dropping it closes the socket.
struct WsTransportHandle {
    tx: mpsc::Sender<Outbound>,
}

impl TransportHandle for WsTransportHandle {
    fn send(&self, text: &str) -> bool {
        self.tx.try_send(Outbound::Text(text.to_string())).is_ok()
    }

    fn close(&self, code: u16, reason: &str) -> bool {
        self.tx
            .try_send(Outbound::Close {
                code,
                reason: reason.to_string(),
            })
            .is_ok()
    }
}

async fn run_socket(
    url: String,
    config: WsTransportConfig,
    mut outbound_rx: mpsc::Receiver<Outbound>,
    listener: Arc<dyn TransportListener>,
) {
    info!(url = %url, "Connecting to WebSocket");

    // TCP_NODELAY: updates are small and latency-sensitive
    let connect = connect_async_tls_with_config(url.as_str(), None, true, None);
    let ws_stream =
        match tokio::time::timeout(Duration::from_millis(config.connect_timeout_ms), connect).await
        {
            Ok(Ok((ws_stream, _response))) => ws_stream,
            Ok(Err(e)) => {
                warn!(error = %e, "WebSocket handshake failed");
                listener.on_failure(e.into());
                return;
            }
            Err(_) => {
                warn!(
                    timeout_ms = config.connect_timeout_ms,
                    "WebSocket handshake timed out"
                );
                listener.on_failure(WsError::ConnectionFailed(
                    "handshake timed out".to_string(),
                ));
                return;
            }
        };

    let (mut write, mut read) = ws_stream.split();
    let mut keepalive = KeepAlive::new(config.ping_interval_ms, config.pong_timeout_ms);
    keepalive.reset();
    let mut keepalive_tick = tokio::time::interval(keepalive.check_interval());
    keepalive_tick.set_missed_tick_behavior(MissedTickBehavior::Delay);

    // Whether handles can still reach us, and whether we sent a close frame.
    let mut outbound_open = true;
    let mut close_sent = false;

    debug!("WebSocket connected");
    listener.on_opened();

    loop {
        tokio::select! {
            msg = read.next() => {
                match msg {
                    Some(Ok(Message::Text(text))) => {
                        keepalive.record_activity();
                        listener.on_message(text);
                    }
                    Some(Ok(Message::Ping(data))) => {
                        keepalive.record_activity();
                        if let Err(e) = write.send(Message::Pong(data)).await {
                            warn!(error = %e, "Failed to answer ping");
                            listener.on_failure(e.into());
                            return;
                        }
                    }
                    Some(Ok(Message::Pong(_))) => {
                        keepalive.record_pong();
                    }
                    Some(Ok(Message::Close(frame))) => {
                        let (code, reason) = frame
                            .map(|f| (f.code.into(), f.reason.to_string()))
                            .unwrap_or((NORMAL_CLOSURE, String::new()));
                        debug!(code, %reason, "WebSocket closing");
                        listener.on_closing(code, &reason);
                        // Flushes tungstenite's close reply; the peer may already be gone.
                        let _ = write.close().await;
                        listener.on_closed(code, &reason);
                        return;
                    }
                    Some(Ok(_)) => {
                        keepalive.record_activity();
                    }
                    Some(Err(e)) => {
                        warn!(error = %e, "WebSocket read error");
                        listener.on_failure(e.into());
                        return;
                    }
                    None => {
                        warn!("WebSocket stream ended");
                        listener.on_closed(ABNORMAL_CLOSURE, "stream ended");
                        return;
                    }
                }
            }

            outbound = outbound_rx.recv(), if outbound_open => {
                match outbound {
                    Some(Outbound::Text(text)) if !close_sent => {
                        if let Err(e) = write.send(Message::Text(text)).await {
                            warn!(error = %e, "WebSocket write failed");
                            listener.on_failure(WsError::SendFailed(e.to_string()));
                            return;
                        }
                    }
                    Some(Outbound::Close { code, reason }) if !close_sent => {
                        debug!(code, %reason, "Sending close frame");
                        let frame = CloseFrame {
                            code: CloseCode::from(code),
                            reason: reason.into(),
                        };
                        close_sent = true;
                        if let Err(e) = write.send(Message::Close(Some(frame))).await {
                            listener.on_failure(e.into());
                            return;
                        }
                    }
                    Some(Outbound::Text(_)) | Some(Outbound::Close { .. }) => {
                        debug!("Socket is closing, dropping outbound request");
                    }
                    None => {
                        // Every handle is gone: close and wait for the peer's reply.
                        outbound_open = false;
                        if !close_sent {
                            close_sent = true;
                            if write.send(Message::Close(None)).await.is_err() {
                                return;
                            }
                        }
                    }
                }
            }

            _ = keepalive_tick.tick() => {
                if keepalive.is_timed_out() {
                    warn!(timeout_ms = config.pong_timeout_ms, "Keep-alive timeout");
                    listener.on_failure(WsError::KeepAliveTimeout);
                    return;
                }

                if keepalive.should_ping() {
                    if let Err(e) = write.send(Message::Ping(Vec::new())).await {
                        listener.on_failure(e.into());
                        return;
                    }
                    keepalive.record_ping();
                    debug!("Sent keep-alive ping");
                }
            }
        }
    }
}
