//! Random-walk price simulator.
//!
//! Drives the demo: seeds the board with random prices and, on every tick,
//! moves each symbol up or down by a random percentage. The updates are sent
//! to the echo server and come back through the normal message path.

use crate::config::SimulatorConfig;
use parking_lot::Mutex;
use pricestream_core::{sort_by_price_desc, PriceUpdate, TrackedSymbol};
use pricestream_view::UpdateSource;
use rand::rngs::StdRng;
use rand::{Rng, SeedableRng};

/// Create the initial board with prices drawn from `[min_price, max_price]`.
pub fn seed_symbols(
    symbols: &[String],
    min_price: f64,
    max_price: f64,
    now_ms: i64,
) -> Vec<TrackedSymbol> {
    seed_symbols_with(&mut rand::thread_rng(), symbols, min_price, max_price, now_ms)
}

/// `seed_symbols` with a caller-supplied RNG.
pub fn seed_symbols_with<R: Rng + ?Sized>(
    rng: &mut R,
    symbols: &[String],
    min_price: f64,
    max_price: f64,
    now_ms: i64,
) -> Vec<TrackedSymbol> {
    let mut seeded: Vec<_> = symbols
        .iter()
        .map(|symbol| {
            let price = rng.gen_range(min_price..=max_price);
            TrackedSymbol::new(symbol.clone(), price, now_ms)
        })
        .collect();
    sort_by_price_desc(&mut seeded);
    seeded
}

/// Moves every symbol by ±[min_move_pct, max_move_pct] per tick.
#[derive(Debug)]
pub struct RandomWalk {
    min_move_pct: f64,
    max_move_pct: f64,
    floor_price: f64,
    rng: Mutex<StdRng>,
}

impl RandomWalk {
    pub fn new(config: &SimulatorConfig) -> Self {
        Self::with_rng(config, StdRng::from_entropy())
    }

    /// Deterministic walk for tests.
    pub fn with_seed(config: &SimulatorConfig, seed: u64) -> Self {
        Self::with_rng(config, StdRng::seed_from_u64(seed))
    }

    fn with_rng(config: &SimulatorConfig, rng: StdRng) -> Self {
        Self {
            min_move_pct: config.min_move_pct,
            max_move_pct: config.max_move_pct,
            floor_price: config.floor_price,
            rng: Mutex::new(rng),
        }
    }

    /// Next price for `current`.
    pub fn step(&self, current: f64) -> f64 {
        let mut rng = self.rng.lock();
        let magnitude = rng.gen_range(self.min_move_pct..=self.max_move_pct);
        let delta = if rng.gen_bool(0.5) { magnitude } else { -magnitude };
        (current * (1.0 + delta)).max(self.floor_price)
    }
}

impl UpdateSource for RandomWalk {
    fn next_updates(&self, symbols: &[TrackedSymbol], now_ms: i64) -> Vec<PriceUpdate> {
        symbols
            .iter()
            .map(|s| PriceUpdate::new(s.symbol.clone(), self.step(s.current_price), now_ms))
            .collect()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn names(list: &[&str]) -> Vec<String> {
        list.iter().map(|s| s.to_string()).collect()
    }

    #[test]
    fn test_seed_symbols_in_range_and_sorted() {
        let mut rng = StdRng::seed_from_u64(7);
        let symbols = names(&["AAPL", "TSLA", "AMD", "ZM"]);
        let seeded = seed_symbols_with(&mut rng, &symbols, 50.0, 500.0, 42);

        assert_eq!(seeded.len(), 4);
        for symbol in &seeded {
            assert!((50.0..=500.0).contains(&symbol.current_price));
            assert_eq!(symbol.previous_price, symbol.current_price);
            assert_eq!(symbol.last_updated, 42);
        }
        assert!(seeded
            .windows(2)
            .all(|w| w[0].current_price >= w[1].current_price));
    }

    #[test]
    fn test_step_stays_within_bounds() {
        let walk = RandomWalk::with_seed(&SimulatorConfig::default(), 1);
        for _ in 0..1_000 {
            let next = walk.step(100.0);
            let moved = (next - 100.0).abs() / 100.0;
            assert!(moved >= 0.005 - 1e-9 && moved <= 0.03 + 1e-9, "moved {moved}");
        }
    }

    #[test]
    fn test_step_respects_floor() {
        let walk = RandomWalk::with_seed(&SimulatorConfig::default(), 3);
        for _ in 0..100 {
            assert!(walk.step(0.01) >= 0.01);
        }
    }

    #[test]
    fn test_next_updates_covers_every_symbol() {
        let walk = RandomWalk::with_seed(&SimulatorConfig::default(), 9);
        let symbols = vec![
            TrackedSymbol::new("AAPL", 100.0, 0),
            TrackedSymbol::new("MSFT", 200.0, 0),
        ];

        let updates = walk.next_updates(&symbols, 1_234);
        assert_eq!(updates.len(), 2);
        assert_eq!(updates[0].symbol, "AAPL");
        assert_eq!(updates[1].symbol, "MSFT");
        assert!(updates.iter().all(|u| u.timestamp == 1_234));
    }
}
