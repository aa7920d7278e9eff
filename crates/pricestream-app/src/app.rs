//! Application wiring and main loop.

use crate::config::AppConfig;
use crate::error::AppResult;
use crate::simulator::{seed_symbols, RandomWalk};
use pricestream_core::{now_ms, ConnectionState};
use pricestream_view::{PriceBoard, UiSnapshot};
use pricestream_ws::{ConnectionManager, DynFeedConnection, WsTransport};
use std::sync::Arc;
use std::time::Duration;
use tracing::{info, warn};

/// Symbols shown per snapshot log line.
const LOG_TOP_N: usize = 5;

/// Main application.
pub struct Application {
    config: AppConfig,
}

impl Application {
    /// Create a new application instance.
    pub fn new(config: AppConfig) -> AppResult<Self> {
        config.validate()?;
        Ok(Self { config })
    }

    /// Validated configuration this instance runs with.
    pub fn config(&self) -> &AppConfig {
        &self.config
    }

    /// Run the board until Ctrl-C or until `duration` elapses.
    ///
    /// Returns the last snapshot.
    pub async fn run(&self, duration: Option<Duration>) -> AppResult<Arc<UiSnapshot>> {
        let transport = Arc::new(WsTransport::new(self.config.transport_config()));
        let feed: DynFeedConnection = Arc::new(ConnectionManager::new(
            self.config.connection_config(),
            transport,
        ));

        let board_cfg = &self.config.board;
        let symbols = seed_symbols(
            &board_cfg.symbols,
            board_cfg.min_seed_price,
            board_cfg.max_seed_price,
            now_ms(),
        );
        let source = Arc::new(RandomWalk::new(&self.config.simulator));

        info!(
            url = %self.config.feed.url,
            symbols = symbols.len(),
            tick_interval_ms = board_cfg.tick_interval_ms,
            "Starting price board"
        );
        let (board, join) =
            PriceBoard::spawn(feed, symbols, source, self.config.board_config());
        let mut snapshots = board.subscribe();
        board.start().await?;

        let deadline = async {
            match duration {
                Some(d) => tokio::time::sleep(d).await,
                None => std::future::pending().await,
            }
        };
        tokio::pin!(deadline);
        let ctrl_c = tokio::signal::ctrl_c();
        tokio::pin!(ctrl_c);

        let mut last_connection = ConnectionState::Disconnected;
        loop {
            tokio::select! {
                result = &mut ctrl_c => {
                    result?;
                    info!("Ctrl-C received, shutting down");
                    break;
                }
                () = &mut deadline => {
                    info!("Run duration elapsed, shutting down");
                    break;
                }
                changed = snapshots.changed() => {
                    if changed.is_err() {
                        warn!("Board stopped unexpectedly");
                        break;
                    }
                    let snapshot = snapshots.borrow_and_update().clone();
                    log_snapshot(&snapshot, &mut last_connection);
                }
            }
        }

        board.shutdown().await;
        if let Err(e) = join.await {
            warn!(error = %e, "Board task ended abnormally");
        }
        Ok(board.snapshot())
    }
}

/// Headless presentation: one log line per snapshot.
fn log_snapshot(snapshot: &UiSnapshot, last_connection: &mut ConnectionState) {
    if snapshot.connection != *last_connection {
        info!(from = %last_connection, to = %snapshot.connection, "Connection");
        *last_connection = snapshot.connection;
    }

    if let Some(error) = &snapshot.error {
        warn!(%error, "Board error");
    }

    let top = snapshot
        .symbols
        .iter()
        .take(LOG_TOP_N)
        .map(|s| format!("{} {:.2} ({:+.2})", s.symbol, s.current_price, s.price_change()))
        .collect::<Vec<_>>()
        .join(", ");
    info!(active = snapshot.active, %top, "Board");
}
