//! Core domain types for the pricestream price feed.
//!
//! This crate provides the types shared by the connection layer and the
//! view-model reducer:
//! - `ConnectionState`: Transport liveness as seen by consumers
//! - `PriceUpdate`: Wire record for a single price change
//! - `TrackedSymbol`: A symbol whose current and previous prices are kept
//! - `DEFAULT_SYMBOLS`: The ticker list the application tracks by default

pub mod error;
pub mod price;
pub mod state;
pub mod symbols;

pub use error::{CoreError, CoreResult};
pub use price::{now_ms, sort_by_price_desc, PriceUpdate, TrackedSymbol};
pub use state::ConnectionState;
pub use symbols::DEFAULT_SYMBOLS;
