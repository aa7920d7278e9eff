//! Snapshot reducer.
//!
//! `reduce` is the only way a snapshot changes. It is deterministic and
//! never mutates its input; the board actor applies it to one event at a
//! time and publishes the result.

use pricestream_core::{sort_by_price_desc, ConnectionState, PriceUpdate, TrackedSymbol};
use pricestream_telemetry::Metrics;
use serde::Serialize;
use tracing::debug;

/// Immutable view of the board.
#[derive(Debug, Clone, Default, PartialEq, Serialize)]
pub struct UiSnapshot {
    /// Tracked symbols, highest current price first.
    pub symbols: Vec<TrackedSymbol>,
    pub connection: ConnectionState,
    /// Whether the feed has been started by the user.
    pub active: bool,
    /// Last parse or send error, until cleared.
    pub error: Option<String>,
}

impl UiSnapshot {
    /// Initial snapshot for `symbols`: Disconnected, inactive, no error.
    pub fn new(mut symbols: Vec<TrackedSymbol>) -> Self {
        sort_by_price_desc(&mut symbols);
        Self {
            symbols,
            ..Default::default()
        }
    }

    /// Look up a tracked symbol by name.
    pub fn symbol(&self, name: &str) -> Option<&TrackedSymbol> {
        self.symbols.iter().find(|s| s.symbol == name)
    }

    fn with_error(&self, error: String) -> Option<Self> {
        if self.error.as_deref() == Some(error.as_str()) {
            return None;
        }
        Some(Self {
            error: Some(error),
            ..self.clone()
        })
    }
}

/// Inputs to the reducer.
#[derive(Debug, Clone, PartialEq)]
pub enum BoardEvent {
    /// The connection manager published a new state.
    ConnectionChanged(ConnectionState),
    /// Raw inbound text frame.
    Message(String),
    /// The board was started or stopped.
    ActiveChanged(bool),
    /// User dismissed the error.
    ClearError,
    /// The ticker could not hand an update for this symbol to the transport.
    SendFailed(String),
}

/// Apply `event` to `snapshot`.
///
/// Returns `None` when the event leaves the snapshot unchanged.
pub fn reduce(snapshot: &UiSnapshot, event: &BoardEvent) -> Option<UiSnapshot> {
    match event {
        BoardEvent::ConnectionChanged(state) => {
            (snapshot.connection != *state).then(|| UiSnapshot {
                connection: *state,
                ..snapshot.clone()
            })
        }
        BoardEvent::Message(text) => match PriceUpdate::parse(text) {
            Ok(update) => merge_update(snapshot, &update),
            Err(e) => {
                Metrics::parse_error();
                debug!(error = %e, "Unparseable message");
                snapshot.with_error(e.to_string())
            }
        },
        BoardEvent::ActiveChanged(active) => (snapshot.active != *active).then(|| UiSnapshot {
            active: *active,
            ..snapshot.clone()
        }),
        BoardEvent::ClearError => snapshot.error.is_some().then(|| UiSnapshot {
            error: None,
            ..snapshot.clone()
        }),
        BoardEvent::SendFailed(symbol) => {
            snapshot.with_error(format!("failed to send update for {symbol}"))
        }
    }
}

/// Merge `update` into the matching symbol and re-sort.
///
/// Updates for symbols that are not tracked are ignored.
fn merge_update(snapshot: &UiSnapshot, update: &PriceUpdate) -> Option<UiSnapshot> {
    let index = snapshot
        .symbols
        .iter()
        .position(|s| s.symbol == update.symbol)?;

    let mut symbols = snapshot.symbols.clone();
    symbols[index] = symbols[index].apply(update);
    sort_by_price_desc(&mut symbols);

    Some(UiSnapshot {
        symbols,
        ..snapshot.clone()
    })
}
