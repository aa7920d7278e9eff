//! Reconnect backoff policy.
//!
//! Delay before attempt `n` is `min(base * 2^min(n, ceiling), max)`.
//! With the defaults (1s base, 32s max, ceiling 6) consecutive failures
//! wait 1s, 2s, 4s, 8s, 16s, 32s, 32s, ...

use std::time::Duration;

/// Default base delay.
pub const DEFAULT_BASE_DELAY_MS: u64 = 1_000;

/// Default maximum delay.
pub const DEFAULT_MAX_DELAY_MS: u64 = 32_000;

/// Default attempt ceiling. The counter stops increasing here.
pub const DEFAULT_MAX_EXPONENT: u32 = 6;

/// Delay before reconnect attempt `attempt`.
pub fn reconnect_delay(attempt: u32, base_ms: u64, max_ms: u64, max_exponent: u32) -> Duration {
    let exponent = attempt.min(max_exponent).min(62);
    let delay = base_ms.saturating_mul(1u64 << exponent);
    Duration::from_millis(delay.min(max_ms))
}

/// Retry counter with capped exponential delay.
#[derive(Debug, Clone)]
pub struct Backoff {
    attempt: u32,
    base_ms: u64,
    max_ms: u64,
    max_exponent: u32,
}

impl Backoff {
    /// Create a backoff starting at attempt 0.
    pub fn new(base_ms: u64, max_ms: u64, max_exponent: u32) -> Self {
        Self {
            attempt: 0,
            base_ms,
            max_ms,
            max_exponent,
        }
    }

    /// Delay for the current attempt; advances the counter (saturating at
    /// the ceiling).
    pub fn next_delay(&mut self) -> Duration {
        let delay = reconnect_delay(self.attempt, self.base_ms, self.max_ms, self.max_exponent);
        if self.attempt < self.max_exponent {
            self.attempt += 1;
        }
        delay
    }

    /// Back to attempt 0 (after a successful open or a manual disconnect).
    pub fn reset(&mut self) {
        self.attempt = 0;
    }

    /// Current attempt counter.
    pub fn attempt(&self) -> u32 {
        self.attempt
    }
}

impl Default for Backoff {
    fn default() -> Self {
        Self::new(
            DEFAULT_BASE_DELAY_MS,
            DEFAULT_MAX_DELAY_MS,
            DEFAULT_MAX_EXPONENT,
        )
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_default_sequence() {
        let mut backoff = Backoff::default();
        let secs: Vec<u64> = (0..9).map(|_| backoff.next_delay().as_secs()).collect();
        assert_eq!(secs, vec![1, 2, 4, 8, 16, 32, 32, 32, 32]);
    }

    #[test]
    fn test_attempt_saturates_at_ceiling() {
        let mut backoff = Backoff::default();
        for _ in 0..20 {
            backoff.next_delay();
        }
        assert_eq!(backoff.attempt(), DEFAULT_MAX_EXPONENT);
    }

    #[test]
    fn test_reset() {
        let mut backoff = Backoff::default();
        backoff.next_delay();
        backoff.next_delay();
        assert_eq!(backoff.attempt(), 2);

        backoff.reset();
        assert_eq!(backoff.attempt(), 0);
        assert_eq!(backoff.next_delay(), Duration::from_secs(1));
    }

    #[test]
    fn test_reconnect_delay_never_exceeds_max() {
        for attempt in 0..100 {
            let delay = reconnect_delay(attempt, 1_000, 32_000, 6);
            assert!(delay <= Duration::from_secs(32));
        }
        // Huge exponents must not overflow.
        assert_eq!(
            reconnect_delay(u32::MAX, u64::MAX, u64::MAX, u32::MAX),
            Duration::from_millis(u64::MAX)
        );
    }
}
