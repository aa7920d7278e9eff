//! Outbound update sources for the board's ticker.

use pricestream_core::{PriceUpdate, TrackedSymbol};
use std::sync::Arc;

/// Supplies the updates the board sends on every tick.
pub trait UpdateSource: Send + Sync {
    /// Updates to send, given the symbols of the latest snapshot.
    fn next_updates(&self, symbols: &[TrackedSymbol], now_ms: i64) -> Vec<PriceUpdate>;
}

/// Arc wrapper for UpdateSource trait objects.
pub type DynUpdateSource = Arc<dyn UpdateSource>;

/// Source for consumers that only listen.
#[derive(Debug, Clone, Copy, Default)]
pub struct NoUpdates;

impl UpdateSource for NoUpdates {
    fn next_updates(&self, _symbols: &[TrackedSymbol], _now_ms: i64) -> Vec<PriceUpdate> {
        Vec::new()
    }
}
