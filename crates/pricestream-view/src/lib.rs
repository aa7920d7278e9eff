//! View-model layer for the pricestream price feed.
//!
//! Turns the connection manager's output into an immutable snapshot:
//! - `reduce`: Pure transition function from (snapshot, event) to snapshot
//! - `PriceBoard`: Single-writer actor that owns the snapshot and the
//!   periodic outbound ticker
//! - `UpdateSource`: Hook supplying the ticker's outbound updates

pub mod board;
pub mod error;
pub mod reducer;
pub mod source;

pub use board::{BoardCommand, BoardConfig, PriceBoard, PriceBoardHandle};
pub use error::{ViewError, ViewResult};
pub use reducer::{reduce, BoardEvent, UiSnapshot};
pub use source::{DynUpdateSource, NoUpdates, UpdateSource};
