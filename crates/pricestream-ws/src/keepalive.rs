//! Keep-alive tracking for a WebSocket stream.
//!
//! Owned by the socket task. Sends a ping once the stream has been idle for
//! the ping interval and fails the stream when the matching pong does not
//! arrive within the pong timeout. Any inbound frame counts as activity.

use std::time::Duration;
use tokio::time::Instant;
use tracing::debug;

/// Keep-alive state for one stream.
#[derive(Debug)]
pub struct KeepAlive {
    /// Idle time before a ping is sent.
    ping_interval: Duration,
    /// How long to wait for the pong.
    pong_timeout: Duration,
    /// Last ping sent.
    last_ping: Option<Instant>,
    /// Last inbound frame of any kind.
    last_activity: Instant,
    /// Whether we're waiting for a pong.
    waiting_for_pong: bool,
}

impl KeepAlive {
    pub fn new(ping_interval_ms: u64, pong_timeout_ms: u64) -> Self {
        Self {
            ping_interval: Duration::from_millis(ping_interval_ms),
            pong_timeout: Duration::from_millis(pong_timeout_ms),
            last_ping: None,
            last_activity: Instant::now(),
            waiting_for_pong: false,
        }
    }

    /// Reset state (called when the stream opens).
    pub fn reset(&mut self) {
        self.last_ping = None;
        self.last_activity = Instant::now();
        self.waiting_for_pong = false;
    }

    /// Record that a ping was sent.
    pub fn record_ping(&mut self) {
        self.last_ping = Some(Instant::now());
        self.waiting_for_pong = true;
    }

    /// Record a pong. Also counts as activity.
    pub fn record_pong(&mut self) {
        let now = Instant::now();
        if let Some(ping) = self.last_ping {
            debug!(rtt_ms = now.duration_since(ping).as_millis() as u64, "Received pong");
        }
        self.waiting_for_pong = false;
        self.last_activity = now;
    }

    /// Record any inbound frame.
    pub fn record_activity(&mut self) {
        self.last_activity = Instant::now();
    }

    /// Whether the outstanding ping went unanswered for too long.
    pub fn is_timed_out(&self) -> bool {
        if !self.waiting_for_pong {
            return false;
        }
        self.last_ping
            .is_some_and(|ping| ping.elapsed() > self.pong_timeout)
    }

    /// Whether the stream has been idle long enough to ping.
    pub fn should_ping(&self) -> bool {
        !self.waiting_for_pong && self.last_activity.elapsed() >= self.ping_interval
    }

    /// How often the socket task should evaluate the keep-alive.
    pub fn check_interval(&self) -> Duration {
        let half = self.ping_interval.min(self.pong_timeout) / 2;
        half.max(Duration::from_millis(10))
    }
}
