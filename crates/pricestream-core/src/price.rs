//! Price records exchanged over the feed and the symbols they update.

use crate::error::{CoreError, CoreResult};
use chrono::Utc;
use serde::{Deserialize, Serialize};

/// Current wall-clock time in Unix milliseconds.
pub fn now_ms() -> i64 {
    Utc::now().timestamp_millis()
}

/// A single price change for one symbol.
///
/// Wire format: `{"symbol": "AAPL", "price": 187.3, "timestamp": 1700000000000}`.
/// The decoder also accepts `identifier` and `value` for the first two
/// fields; when both spellings are present, `identifier` and `value` win.
/// Unknown keys are ignored so newer producers stay compatible; a missing
/// key is a parse failure.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(try_from = "RawPriceUpdate")]
pub struct PriceUpdate {
    /// Ticker symbol.
    pub symbol: String,
    /// New price.
    pub price: f64,
    /// Event time (Unix ms).
    pub timestamp: i64,
}

/// Decoding shape accepting both field spellings.
#[derive(Deserialize)]
struct RawPriceUpdate {
    identifier: Option<String>,
    symbol: Option<String>,
    value: Option<f64>,
    price: Option<f64>,
    timestamp: i64,
}

impl TryFrom<RawPriceUpdate> for PriceUpdate {
    type Error = CoreError;

    fn try_from(raw: RawPriceUpdate) -> CoreResult<Self> {
        let symbol = raw
            .identifier
            .or(raw.symbol)
            .ok_or_else(|| {
                CoreError::Parse("missing field `identifier` (or `symbol`)".to_string())
            })?;
        let price = raw
            .value
            .or(raw.price)
            .ok_or_else(|| CoreError::Parse("missing field `value` (or `price`)".to_string()))?;
        Ok(Self {
            symbol,
            price,
            timestamp: raw.timestamp,
        })
    }
}

impl PriceUpdate {
    /// Create a new price update.
    pub fn new(symbol: impl Into<String>, price: f64, timestamp: i64) -> Self {
        Self {
            symbol: symbol.into(),
            price,
            timestamp,
        }
    }

    /// Decode a price update from a JSON text frame.
    pub fn parse(text: &str) -> CoreResult<Self> {
        Ok(serde_json::from_str(text)?)
    }

    /// Encode as a JSON text frame.
    pub fn to_json(&self) -> CoreResult<String> {
        Ok(serde_json::to_string(self)?)
    }
}

/// A symbol whose latest and previous prices are tracked.
///
/// `previous_price` is always the `current_price` immediately before the
/// latest applied update.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct TrackedSymbol {
    pub symbol: String,
    pub current_price: f64,
    pub previous_price: f64,
    /// Timestamp of the last applied update (Unix ms).
    pub last_updated: i64,
}

impl TrackedSymbol {
    /// Create a symbol with no price history (previous == current).
    pub fn new(symbol: impl Into<String>, price: f64, timestamp: i64) -> Self {
        Self {
            symbol: symbol.into(),
            current_price: price,
            previous_price: price,
            last_updated: timestamp,
        }
    }

    /// Return a copy with `update` applied.
    #[must_use]
    pub fn apply(&self, update: &PriceUpdate) -> Self {
        Self {
            symbol: self.symbol.clone(),
            current_price: update.price,
            previous_price: self.current_price,
            last_updated: update.timestamp,
        }
    }

    /// Difference between the current and the previous price.
    pub fn price_change(&self) -> f64 {
        self.current_price - self.previous_price
    }

    /// Whether the last update moved the price up.
    pub fn is_increasing(&self) -> bool {
        self.price_change() > 0.0
    }
}

/// Sort symbols by current price, highest first.
///
/// The sort is stable: symbols with equal prices keep their relative order.
pub fn sort_by_price_desc(symbols: &mut [TrackedSymbol]) {
    symbols.sort_by(|a, b| b.current_price.total_cmp(&a.current_price));
}
