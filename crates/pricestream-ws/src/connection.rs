//! WebSocket connection manager.
//!
//! Owns the single live transport, the connection state and the reconnect
//! scheduler. All mutations of the shared core (live handle, manual-close
//! flag, retry counter, pending reconnect) go through one mutex, whether
//! they come from user commands or from transport callbacks.
//!
//! Every opened transport is tagged with an attempt id. Callbacks carrying
//! an id other than the live one are ignored, and the first terminal
//! callback (closed or failure) retires the id. This keeps at most one
//! transport live and at most one reconnect pending, even when a transport
//! reports both `closed` and `failure` for the same stream.

use crate::backoff::{Backoff, DEFAULT_BASE_DELAY_MS, DEFAULT_MAX_DELAY_MS, DEFAULT_MAX_EXPONENT};
use crate::error::{WsError, WsResult};
use crate::transport::{Transport, TransportHandle, TransportListener, NORMAL_CLOSURE};
use parking_lot::Mutex;
use pricestream_core::ConnectionState;
use pricestream_telemetry::Metrics;
use std::sync::{Arc, Weak};
use tokio::sync::{broadcast, watch};
use tokio_util::sync::CancellationToken;
use tracing::{debug, info, trace, warn};

/// Default feed endpoint (public echo server).
pub const DEFAULT_URL: &str = "wss://ws.postman-echo.com/raw";

/// Connection configuration.
#[derive(Debug, Clone)]
pub struct ConnectionConfig {
    /// WebSocket URL.
    pub url: String,
    /// Base delay for exponential backoff.
    pub reconnect_base_delay_ms: u64,
    /// Maximum delay for exponential backoff.
    pub reconnect_max_delay_ms: u64,
    /// Retry counter ceiling.
    pub max_backoff_exponent: u32,
    /// Capacity of the inbound message broadcast.
    pub message_buffer: usize,
}

impl Default for ConnectionConfig {
    fn default() -> Self {
        Self {
            url: DEFAULT_URL.to_string(),
            reconnect_base_delay_ms: DEFAULT_BASE_DELAY_MS,
            reconnect_max_delay_ms: DEFAULT_MAX_DELAY_MS,
            max_backoff_exponent: DEFAULT_MAX_EXPONENT,
            message_buffer: 64,
        }
    }
}

/// The transport currently considered live.
struct LiveTransport {
    attempt: u64,
    handle: Box<dyn TransportHandle>,
}

/// Mutable core guarded by the manager's mutex.
struct Core {
    live: Option<LiveTransport>,
    next_attempt: u64,
    /// Set by `disconnect()`, cleared by `connect()`.
    manual_close: bool,
    backoff: Backoff,
    /// Cancels the pending reconnect, if any.
    reconnect: Option<CancellationToken>,
}

impl Core {
    fn is_live(&self, attempt: u64) -> bool {
        self.live.as_ref().is_some_and(|l| l.attempt == attempt)
    }

    fn cancel_reconnect(&mut self) {
        if let Some(token) = self.reconnect.take() {
            token.cancel();
        }
    }
}

impl Drop for Core {
    fn drop(&mut self) {
        self.cancel_reconnect();
    }
}

/// Why a live transport went away.
enum Termination {
    Closed { code: u16, reason: String },
    Failed(WsError),
}

impl Termination {
    fn label(&self) -> &'static str {
        match self {
            Self::Closed { .. } => "closed",
            Self::Failed(_) => "failure",
        }
    }
}

struct Shared {
    config: ConnectionConfig,
    transport: Arc<dyn Transport>,
    state_tx: watch::Sender<ConnectionState>,
    message_tx: broadcast::Sender<String>,
    core: Mutex<Core>,
}

impl Shared {
    fn state(&self) -> ConnectionState {
        *self.state_tx.borrow()
    }

    /// Publish a state change. Callers hold the core lock, so subscribers
    /// see transitions in the order they were applied.
    fn set_state(&self, state: ConnectionState) {
        let changed = self.state_tx.send_if_modified(|current| {
            if *current == state {
                return false;
            }
            *current = state;
            true
        });
        if changed {
            Metrics::ws_state_set(state);
            debug!(%state, "Connection state changed");
        }
    }

    fn open_transport(self: &Arc<Self>, core: &mut Core) {
        core.next_attempt += 1;
        let attempt = core.next_attempt;
        let listener: Arc<dyn TransportListener> = Arc::new(AttemptListener {
            attempt,
            shared: Arc::downgrade(self),
        });

        info!(attempt, url = %self.config.url, "Opening transport");
        let handle = self.transport.open(&self.config.url, listener);

        if let Some(previous) = core.live.replace(LiveTransport { attempt, handle }) {
            debug!(attempt = previous.attempt, "Closing superseded transport");
            previous.handle.close(NORMAL_CLOSURE, "superseded");
        }
    }

    fn handle_opened(&self, attempt: u64) {
        let mut core = self.core.lock();
        if !core.is_live(attempt) {
            debug!(attempt, "Ignoring open from retired transport");
            return;
        }
        core.backoff.reset();
        self.set_state(ConnectionState::Connected);
        info!(attempt, "WebSocket connected");
    }

    fn handle_message(&self, attempt: u64, text: String) {
        if !self.core.lock().is_live(attempt) {
            trace!(attempt, "Dropping message from retired transport");
            return;
        }
        Metrics::message_received();
        // Never blocks: lagging subscribers lose their oldest messages.
        if self.message_tx.send(text).is_err() {
            Metrics::message_dropped();
            trace!("No message subscribers");
        }
    }

    fn handle_closing(&self, attempt: u64, code: u16, reason: &str) {
        let core = self.core.lock();
        if !core.is_live(attempt) {
            return;
        }
        info!(attempt, code, %reason, "WebSocket closing");
        self.set_state(ConnectionState::Disconnected);
    }

    fn handle_terminated(self: &Arc<Self>, attempt: u64, termination: Termination) {
        let mut core = self.core.lock();
        if !core.is_live(attempt) {
            debug!(
                attempt,
                cause = termination.label(),
                "Ignoring callback from retired transport"
            );
            return;
        }

        match &termination {
            Termination::Closed { code, reason } => {
                info!(attempt, code, %reason, "WebSocket closed");
            }
            Termination::Failed(error) => {
                warn!(attempt, error = %error, "WebSocket failure");
            }
        }

        core.live = None;
        self.set_state(ConnectionState::Disconnected);

        if core.manual_close {
            debug!("Manually closed, not reconnecting");
            return;
        }
        self.schedule_reconnect(&mut core, termination.label());
    }

    /// Cancel-and-replace the pending reconnect.
    fn schedule_reconnect(self: &Arc<Self>, core: &mut Core, cause: &'static str) {
        core.cancel_reconnect();

        let retry = core.backoff.attempt();
        let delay = core.backoff.next_delay();
        let token = CancellationToken::new();
        core.reconnect = Some(token.clone());

        Metrics::ws_reconnect(cause);
        warn!(
            retry,
            delay_ms = delay.as_millis() as u64,
            cause,
            "Scheduling reconnect"
        );

        let shared = Arc::downgrade(self);
        tokio::spawn(async move {
            tokio::select! {
                () = tokio::time::sleep(delay) => {}
                () = token.cancelled() => {
                    debug!("Scheduled reconnect cancelled");
                    return;
                }
            }
            if let Some(shared) = shared.upgrade() {
                shared.fire_reconnect(&token);
            }
        });
    }

    fn fire_reconnect(self: &Arc<Self>, token: &CancellationToken) {
        let mut core = self.core.lock();
        // Cancellation happens under this lock, so the check is race-free.
        if token.is_cancelled() || core.manual_close {
            debug!("Reconnect superseded");
            return;
        }
        core.reconnect = None;

        info!(retry = core.backoff.attempt(), "Reconnecting");
        self.set_state(ConnectionState::Connecting);
        self.open_transport(&mut core);
    }
}

/// Listener bound to one transport attempt.
struct AttemptListener {
    attempt: u64,
    shared: Weak<Shared>,
}

impl TransportListener for AttemptListener {
    fn on_opened(&self) {
        if let Some(shared) = self.shared.upgrade() {
            shared.handle_opened(self.attempt);
        }
    }

    fn on_message(&self, text: String) {
        if let Some(shared) = self.shared.upgrade() {
            shared.handle_message(self.attempt, text);
        }
    }

    fn on_closing(&self, code: u16, reason: &str) {
        if let Some(shared) = self.shared.upgrade() {
            shared.handle_closing(self.attempt, code, reason);
        }
    }

    fn on_closed(&self, code: u16, reason: &str) {
        if let Some(shared) = self.shared.upgrade() {
            shared.handle_terminated(
                self.attempt,
                Termination::Closed {
                    code,
                    reason: reason.to_string(),
                },
            );
        }
    }

    fn on_failure(&self, error: WsError) {
        if let Some(shared) = self.shared.upgrade() {
            shared.handle_terminated(self.attempt, Termination::Failed(error));
        }
    }
}

/// WebSocket connection manager.
pub struct ConnectionManager {
    shared: Arc<Shared>,
}

impl ConnectionManager {
    /// Create a new connection manager. Starts Disconnected.
    pub fn new(config: ConnectionConfig, transport: Arc<dyn Transport>) -> Self {
        let (state_tx, _) = watch::channel(ConnectionState::Disconnected);
        let (message_tx, _) = broadcast::channel(config.message_buffer.max(1));
        let backoff = Backoff::new(
            config.reconnect_base_delay_ms,
            config.reconnect_max_delay_ms,
            config.max_backoff_exponent,
        );

        Self {
            shared: Arc::new(Shared {
                config,
                transport,
                state_tx,
                message_tx,
                core: Mutex::new(Core {
                    live: None,
                    next_attempt: 0,
                    manual_close: false,
                    backoff,
                    reconnect: None,
                }),
            }),
        }
    }

    /// Connect (or make sure a connection is under way).
    ///
    /// No-op while Connecting or Connected. Otherwise clears the manual-close
    /// flag, cancels any pending reconnect, moves to Connecting and opens a
    /// transport. Never blocks on the network; must be called from within a
    /// tokio runtime.
    ///
    /// Returns the live state observable.
    pub fn connect(&self) -> watch::Receiver<ConnectionState> {
        {
            let mut core = self.shared.core.lock();
            let state = self.shared.state();
            if state.is_active() {
                debug!(%state, "Already connecting or connected");
            } else {
                core.manual_close = false;
                core.cancel_reconnect();
                self.shared.set_state(ConnectionState::Connecting);
                self.shared.open_transport(&mut core);
            }
        }
        self.shared.state_tx.subscribe()
    }

    /// Subscribe to inbound text messages.
    ///
    /// Best-effort: a receiver that falls more than `message_buffer` messages
    /// behind loses the oldest ones (`RecvError::Lagged`).
    pub fn observe_messages(&self) -> broadcast::Receiver<String> {
        self.shared.message_tx.subscribe()
    }

    /// Write `payload` to the live transport.
    ///
    /// Returns `false` when no transport is open or it refused the frame.
    /// Nothing is queued across disconnects.
    pub fn send(&self, payload: &str) -> bool {
        let core = self.shared.core.lock();
        match core.live.as_ref() {
            Some(live) => {
                let accepted = live.handle.send(payload);
                Metrics::send(if accepted { "accepted" } else { "rejected" });
                accepted
            }
            None => {
                Metrics::send("no_transport");
                false
            }
        }
    }

    /// Close the connection and stop reconnecting until the next `connect()`.
    ///
    /// The state is Disconnected afterwards even when an error is returned;
    /// the error only reports that the close frame could not be queued.
    pub fn disconnect(&self) -> WsResult<()> {
        let mut core = self.shared.core.lock();
        core.manual_close = true;
        core.backoff.reset();
        core.cancel_reconnect();

        let close_queued = match core.live.take() {
            Some(live) => live.handle.close(NORMAL_CLOSURE, "client disconnect"),
            None => true,
        };
        self.shared.set_state(ConnectionState::Disconnected);
        info!("Disconnected by request");

        if close_queued {
            Ok(())
        } else {
            Err(WsError::CloseFailed(
                "transport refused the close request".to_string(),
            ))
        }
    }

    /// Current connection state.
    pub fn state(&self) -> ConnectionState {
        self.shared.state()
    }

    /// Observe state without connecting.
    pub fn subscribe_state(&self) -> watch::Receiver<ConnectionState> {
        self.shared.state_tx.subscribe()
    }

    /// Current retry counter.
    pub fn retry_attempt(&self) -> u32 {
        self.shared.core.lock().backoff.attempt()
    }

    /// Whether `disconnect()` was called since the last `connect()`.
    pub fn is_manually_closed(&self) -> bool {
        self.shared.core.lock().manual_close
    }

    /// Whether a reconnect is scheduled and not yet fired.
    pub fn has_pending_reconnect(&self) -> bool {
        self.shared
            .core
            .lock()
            .reconnect
            .as_ref()
            .is_some_and(|token| !token.is_cancelled())
    }

    /// Configured endpoint.
    pub fn url(&self) -> &str {
        &self.shared.config.url
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::mock::MockTransport;
    use std::time::Duration;

    fn manager(transport: &Arc<MockTransport>) -> ConnectionManager {
        let config = ConnectionConfig {
            url: "ws://feed.test/stream".to_string(),
            ..Default::default()
        };
        ConnectionManager::new(config, transport.clone())
    }

    fn failure() -> WsError {
        WsError::ConnectionFailed("boom".to_string())
    }

    async fn advance_ms(ms: u64) {
        tokio::time::sleep(Duration::from_millis(ms)).await;
    }

    #[test]
    fn test_default_config() {
        let config = ConnectionConfig::default();
        assert_eq!(config.url, DEFAULT_URL);
        assert_eq!(config.reconnect_base_delay_ms, 1_000);
        assert_eq!(config.reconnect_max_delay_ms, 32_000);
        assert_eq!(config.max_backoff_exponent, 6);
        assert_eq!(config.message_buffer, 64);
    }

    #[tokio::test]
    async fn test_initial_state() {
        let transport = MockTransport::new();
        let manager = manager(&transport);

        assert_eq!(manager.state(), ConnectionState::Disconnected);
        assert_eq!(manager.retry_attempt(), 0);
        assert!(!manager.is_manually_closed());
        assert!(!manager.has_pending_reconnect());
        assert_eq!(transport.open_count(), 0);
    }

    #[tokio::test]
    async fn test_connect_is_idempotent() {
        let transport = MockTransport::new();
        let manager = manager(&transport);

        let state = manager.connect();
        assert_eq!(*state.borrow(), ConnectionState::Connecting);
        assert_eq!(transport.open_count(), 1);
        assert_eq!(transport.url(0).as_deref(), Some("ws://feed.test/stream"));

        // Connecting: no second transport
        manager.connect();
        assert_eq!(transport.open_count(), 1);

        // Connected: no second transport
        transport.listener(0).unwrap().on_opened();
        manager.connect();
        assert_eq!(transport.open_count(), 1);
        assert_eq!(manager.state(), ConnectionState::Connected);
    }

    #[tokio::test]
    async fn test_state_sequence_on_open() {
        let transport = MockTransport::new();
        let manager = manager(&transport);

        let mut rx = manager.subscribe_state();
        let mut observed = vec![*rx.borrow_and_update()];

        manager.connect();
        rx.changed().await.unwrap();
        observed.push(*rx.borrow_and_update());

        transport.listener(0).unwrap().on_opened();
        rx.changed().await.unwrap();
        observed.push(*rx.borrow_and_update());

        assert_eq!(
            observed,
            vec![
                ConnectionState::Disconnected,
                ConnectionState::Connecting,
                ConnectionState::Connected,
            ]
        );
    }

    #[tokio::test(start_paused = true)]
    async fn test_failure_schedules_reconnect_after_one_second() {
        let transport = MockTransport::new();
        let manager = manager(&transport);

        manager.connect();
        transport.listener(0).unwrap().on_opened();
        transport.listener(0).unwrap().on_failure(failure());

        assert_eq!(manager.state(), ConnectionState::Disconnected);
        assert!(manager.has_pending_reconnect());
        assert_eq!(manager.retry_attempt(), 1);

        advance_ms(999).await;
        assert_eq!(transport.open_count(), 1, "must not fire before 1s");

        advance_ms(2).await;
        assert_eq!(transport.open_count(), 2);
        assert_eq!(manager.state(), ConnectionState::Connecting);
        assert!(!manager.has_pending_reconnect());
    }

    #[tokio::test(start_paused = true)]
    async fn test_backoff_sequence_across_failures() {
        let transport = MockTransport::new();
        let manager = manager(&transport);
        manager.connect();

        for (i, expected_secs) in [1u64, 2, 4, 8, 16, 32, 32, 32].iter().enumerate() {
            let opened = transport.open_count();
            transport.last_listener().unwrap().on_failure(failure());

            advance_ms(expected_secs * 1_000 - 1).await;
            assert_eq!(transport.open_count(), opened, "attempt {i} fired early");

            advance_ms(2).await;
            assert_eq!(transport.open_count(), opened + 1, "attempt {i} did not fire");
        }
        assert_eq!(manager.retry_attempt(), 6);
    }

    #[tokio::test(start_paused = true)]
    async fn test_open_resets_retry_counter() {
        let transport = MockTransport::new();
        let manager = manager(&transport);

        manager.connect();
        transport.last_listener().unwrap().on_failure(failure());
        advance_ms(1_001).await;
        transport.last_listener().unwrap().on_failure(failure());
        advance_ms(2_001).await;
        assert_eq!(manager.retry_attempt(), 2);

        transport.last_listener().unwrap().on_opened();
        assert_eq!(manager.state(), ConnectionState::Connected);
        assert_eq!(manager.retry_attempt(), 0);
    }

    #[tokio::test(start_paused = true)]
    async fn test_disconnect_cancels_pending_reconnect() {
        let transport = MockTransport::new();
        let manager = manager(&transport);

        manager.connect();
        transport.listener(0).unwrap().on_opened();
        transport.listener(0).unwrap().on_failure(failure());
        assert!(manager.has_pending_reconnect());

        tokio_test::assert_ok!(manager.disconnect());
        assert_eq!(manager.state(), ConnectionState::Disconnected);
        assert!(manager.is_manually_closed());
        assert!(!manager.has_pending_reconnect());
        assert_eq!(manager.retry_attempt(), 0);

        advance_ms(60_000).await;
        assert_eq!(transport.open_count(), 1);
    }

    #[tokio::test(start_paused = true)]
    async fn test_disconnect_closes_live_transport() {
        let transport = MockTransport::new();
        let manager = manager(&transport);

        manager.connect();
        transport.listener(0).unwrap().on_opened();
        tokio_test::assert_ok!(manager.disconnect());

        let handle = transport.handle(0).unwrap();
        assert_eq!(handle.close_requests().len(), 1);
        assert_eq!(handle.close_requests()[0].0, NORMAL_CLOSURE);
        assert!(!manager.send("late"), "no transport after disconnect");

        // The close handshake completing must not trigger a reconnect.
        transport.listener(0).unwrap().on_closed(NORMAL_CLOSURE, "bye");
        assert!(!manager.has_pending_reconnect());
        advance_ms(60_000).await;
        assert_eq!(transport.open_count(), 1);
    }

    #[tokio::test]
    async fn test_disconnect_reports_refused_close() {
        let transport = MockTransport::new();
        let manager = manager(&transport);

        manager.connect();
        transport.handle(0).unwrap().set_accepting(false);

        let result = manager.disconnect();
        assert!(matches!(result, Err(WsError::CloseFailed(_))));
        assert_eq!(manager.state(), ConnectionState::Disconnected);
        assert!(manager.is_manually_closed());
    }

    #[tokio::test]
    async fn test_connect_after_disconnect_clears_manual_flag() {
        let transport = MockTransport::new();
        let manager = manager(&transport);

        manager.connect();
        manager.disconnect().unwrap();
        assert!(manager.is_manually_closed());

        manager.connect();
        assert!(!manager.is_manually_closed());
        assert_eq!(transport.open_count(), 2);
        assert_eq!(manager.state(), ConnectionState::Connecting);
    }

    #[tokio::test(start_paused = true)]
    async fn test_closed_after_failure_schedules_once() {
        let transport = MockTransport::new();
        let manager = manager(&transport);

        manager.connect();
        transport.listener(0).unwrap().on_opened();
        let listener = transport.listener(0).unwrap();
        listener.on_failure(failure());
        listener.on_closed(1006, "abnormal");

        assert_eq!(manager.retry_attempt(), 1);

        advance_ms(60_000).await;
        assert_eq!(transport.open_count(), 2, "exactly one reconnect");
    }

    #[tokio::test(start_paused = true)]
    async fn test_closing_then_closed() {
        let transport = MockTransport::new();
        let manager = manager(&transport);

        manager.connect();
        transport.listener(0).unwrap().on_opened();

        transport.listener(0).unwrap().on_closing(1001, "going away");
        assert_eq!(manager.state(), ConnectionState::Disconnected);
        assert!(!manager.has_pending_reconnect());

        transport.listener(0).unwrap().on_closed(1001, "going away");
        assert!(manager.has_pending_reconnect());
    }

    #[tokio::test(start_paused = true)]
    async fn test_stale_callbacks_ignored() {
        let transport = MockTransport::new();
        let manager = manager(&transport);

        manager.connect();
        transport.listener(0).unwrap().on_failure(failure());
        advance_ms(1_001).await;
        assert_eq!(transport.open_count(), 2);

        let mut messages = manager.observe_messages();

        // Old stream speaks up after being replaced
        let stale = transport.listener(0).unwrap();
        stale.on_opened();
        stale.on_message("stale".to_string());
        stale.on_failure(failure());
        assert_eq!(manager.state(), ConnectionState::Connecting);
        assert!(!manager.has_pending_reconnect());
        assert!(messages.try_recv().is_err());

        transport.listener(1).unwrap().on_opened();
        assert_eq!(manager.state(), ConnectionState::Connected);
    }

    #[tokio::test]
    async fn test_messages_fan_out_to_all_subscribers() {
        let transport = MockTransport::new();
        let manager = manager(&transport);

        let mut first = manager.observe_messages();
        let mut second = manager.observe_messages();

        manager.connect();
        let listener = transport.listener(0).unwrap();
        listener.on_opened();
        listener.on_message("hello".to_string());

        assert_eq!(first.recv().await.unwrap(), "hello");
        assert_eq!(second.recv().await.unwrap(), "hello");
    }

    #[tokio::test]
    async fn test_slow_subscriber_never_blocks_transport() {
        let transport = MockTransport::new();
        let config = ConnectionConfig {
            message_buffer: 4,
            ..Default::default()
        };
        let manager = ConnectionManager::new(config, transport.clone());
        let mut slow = manager.observe_messages();

        manager.connect();
        let listener = transport.listener(0).unwrap();
        listener.on_opened();
        for i in 0..10 {
            listener.on_message(format!("m{i}"));
        }

        // Oldest messages were dropped for the lagging receiver
        assert!(matches!(
            slow.recv().await,
            Err(broadcast::error::RecvError::Lagged(6))
        ));
        assert_eq!(slow.recv().await.unwrap(), "m6");
    }

    #[tokio::test]
    async fn test_send_uses_live_transport() {
        let transport = MockTransport::new();
        let manager = manager(&transport);

        assert!(!manager.send("ping"), "no transport yet");

        manager.connect();
        transport.listener(0).unwrap().on_opened();
        assert!(manager.send("ping"));
        assert_eq!(transport.handle(0).unwrap().sent(), vec!["ping".to_string()]);

        transport.handle(0).unwrap().set_accepting(false);
        assert!(!manager.send("pong"));
    }

    #[tokio::test(flavor = "multi_thread", worker_threads = 4)]
    async fn test_concurrent_connect_and_send_open_one_transport() {
        let transport = MockTransport::new();
        let manager = Arc::new(manager(&transport));
        assert_eq!(manager.url(), "ws://feed.test/stream");

        let tasks: Vec<_> = (0..16)
            .map(|_| {
                let manager = manager.clone();
                tokio::spawn(async move {
                    manager.connect();
                })
            })
            .collect();
        for task in tasks {
            task.await.unwrap();
        }
        assert_eq!(transport.open_count(), 1);
        assert_eq!(manager.state(), ConnectionState::Connecting);

        transport.last_listener().unwrap().on_opened();

        let tasks: Vec<_> = (0..16)
            .map(|i| {
                let manager = manager.clone();
                tokio::spawn(async move {
                    manager.connect();
                    manager.send(&format!("m{i}"))
                })
            })
            .collect();
        for task in tasks {
            assert!(task.await.unwrap());
        }

        assert_eq!(transport.open_count(), 1);
        assert_eq!(manager.state(), ConnectionState::Connected);
        let mut sent = transport.last_handle().unwrap().sent();
        sent.sort();
        let mut expected: Vec<String> = (0..16).map(|i| format!("m{i}")).collect();
        expected.sort();
        assert_eq!(sent, expected);
    }
}
