//! Price board actor.
//!
//! A single task owns the snapshot. User commands arrive through
//! `PriceBoardHandle`; connection states, inbound messages and ticker
//! failures arrive as `BoardEvent`s from helper tasks. Each event is run
//! through `reduce` and the result published on a watch channel, so
//! observers always see the latest complete snapshot.

use crate::error::{ViewError, ViewResult};
use crate::reducer::{reduce, BoardEvent, UiSnapshot};
use crate::source::DynUpdateSource;
use pricestream_core::{now_ms, ConnectionState, TrackedSymbol};
use pricestream_ws::DynFeedConnection;
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::Arc;
use std::time::Duration;
use tokio::sync::{broadcast, mpsc, watch};
use tokio::task::JoinHandle;
use tokio::time::{interval_at, Instant, MissedTickBehavior};
use tokio_util::sync::CancellationToken;
use tracing::{debug, info, trace, warn};

/// Board configuration.
#[derive(Debug, Clone)]
pub struct BoardConfig {
    /// Period of the outbound ticker.
    pub tick_interval_ms: u64,
    /// Capacity of the command queue.
    pub command_buffer: usize,
    /// Capacity of the internal event queue.
    pub event_buffer: usize,
}

impl Default for BoardConfig {
    fn default() -> Self {
        Self {
            tick_interval_ms: 2_000,
            command_buffer: 32,
            event_buffer: 256,
        }
    }
}

/// User commands.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum BoardCommand {
    /// Connect and start the ticker. No-op if already active.
    Start,
    /// Stop the ticker and disconnect. No-op if not active.
    Stop,
    /// Stop if active, otherwise start.
    Toggle,
    /// Dismiss the current error.
    ClearError,
    /// Stop, then end the actor.
    Shutdown,
}

/// Price board actor task.
struct BoardTask {
    feed: DynFeedConnection,
    source: DynUpdateSource,
    config: BoardConfig,
    commands: mpsc::Receiver<BoardCommand>,
    events_tx: mpsc::Sender<BoardEvent>,
    events_rx: mpsc::Receiver<BoardEvent>,
    snapshot_tx: watch::Sender<Arc<UiSnapshot>>,
    /// Feed subscriptions are set up on the first start only.
    subscribed: AtomicBool,
    /// Cancels the feed forwarders when the actor ends.
    lifetime: CancellationToken,
    /// Cancels the running ticker.
    ticker: Option<CancellationToken>,
}

impl BoardTask {
    async fn run(mut self) {
        debug!("PriceBoard started");

        loop {
            tokio::select! {
                command = self.commands.recv() => match command {
                    Some(BoardCommand::Shutdown) | None => {
                        self.stop();
                        break;
                    }
                    Some(command) => self.handle_command(command),
                },
                Some(event) = self.events_rx.recv() => self.apply(event),
            }
        }

        self.lifetime.cancel();
        debug!("PriceBoard terminated");
    }

    fn handle_command(&mut self, command: BoardCommand) {
        trace!(?command, "Board command");
        match command {
            BoardCommand::Start => self.start(),
            BoardCommand::Stop => self.stop(),
            BoardCommand::Toggle => {
                if self.is_active() {
                    self.stop();
                } else {
                    self.start();
                }
            }
            BoardCommand::ClearError => self.apply(BoardEvent::ClearError),
            BoardCommand::Shutdown => {}
        }
    }

    fn is_active(&self) -> bool {
        self.snapshot_tx.borrow().active
    }

    fn apply(&self, event: BoardEvent) {
        let current = self.snapshot_tx.borrow().clone();
        if let Some(next) = reduce(&current, &event) {
            self.snapshot_tx.send_replace(Arc::new(next));
        }
    }

    fn start(&mut self) {
        if self.is_active() {
            debug!("Board already active");
            return;
        }

        if self
            .subscribed
            .compare_exchange(false, true, Ordering::SeqCst, Ordering::SeqCst)
            .is_ok()
        {
            // Subscribe to messages before connecting so nothing is missed.
            let messages = self.feed.observe_messages();
            let states = self.feed.connect();
            tokio::spawn(forward_messages(
                messages,
                self.events_tx.clone(),
                self.lifetime.clone(),
            ));
            tokio::spawn(forward_states(
                states,
                self.events_tx.clone(),
                self.lifetime.clone(),
            ));
        } else {
            self.feed.connect();
        }

        self.restart_ticker();
        info!("Board started");
        self.apply(BoardEvent::ActiveChanged(true));
    }

    fn stop(&mut self) {
        if !self.is_active() {
            debug!("Board not active");
            return;
        }

        if let Some(ticker) = self.ticker.take() {
            ticker.cancel();
        }
        if let Err(e) = self.feed.disconnect() {
            debug!(error = %e, "Disconnect reported an error");
        }
        info!("Board stopped");
        self.apply(BoardEvent::ActiveChanged(false));
    }

    fn restart_ticker(&mut self) {
        if let Some(previous) = self.ticker.take() {
            previous.cancel();
        }
        let token = self.lifetime.child_token();
        self.ticker = Some(token.clone());

        tokio::spawn(run_ticker(
            Ticker {
                feed: self.feed.clone(),
                source: self.source.clone(),
                snapshots: self.snapshot_tx.subscribe(),
                events: self.events_tx.clone(),
            },
            Duration::from_millis(self.config.tick_interval_ms.max(1)),
            token,
        ));
    }
}

async fn forward_messages(
    mut messages: broadcast::Receiver<String>,
    events: mpsc::Sender<BoardEvent>,
    lifetime: CancellationToken,
) {
    loop {
        let received = tokio::select! {
            () = lifetime.cancelled() => break,
            received = messages.recv() => received,
        };
        match received {
            Ok(text) => {
                if events.send(BoardEvent::Message(text)).await.is_err() {
                    break;
                }
            }
            Err(broadcast::error::RecvError::Lagged(skipped)) => {
                warn!(skipped, "Board fell behind the message stream");
            }
            Err(broadcast::error::RecvError::Closed) => break,
        }
    }
    trace!("Message forwarder finished");
}

async fn forward_states(
    mut states: watch::Receiver<ConnectionState>,
    events: mpsc::Sender<BoardEvent>,
    lifetime: CancellationToken,
) {
    loop {
        let state = *states.borrow_and_update();
        if events
            .send(BoardEvent::ConnectionChanged(state))
            .await
            .is_err()
        {
            break;
        }
        tokio::select! {
            () = lifetime.cancelled() => break,
            changed = states.changed() => {
                if changed.is_err() {
                    break;
                }
            }
        }
    }
    trace!("State forwarder finished");
}

/// Everything one ticker run needs.
struct Ticker {
    feed: DynFeedConnection,
    source: DynUpdateSource,
    snapshots: watch::Receiver<Arc<UiSnapshot>>,
    events: mpsc::Sender<BoardEvent>,
}

impl Ticker {
    async fn tick(&self) -> ViewResult<()> {
        let snapshot = self.snapshots.borrow().clone();
        if snapshot.connection != ConnectionState::Connected {
            trace!(state = %snapshot.connection, "Not connected, skipping tick");
            return Ok(());
        }

        for update in self.source.next_updates(&snapshot.symbols, now_ms()) {
            let payload = update.to_json()?;
            if !self.feed.send(&payload) {
                debug!(symbol = %update.symbol, "Send refused");
                self.events
                    .send(BoardEvent::SendFailed(update.symbol))
                    .await
                    .map_err(|_| ViewError::BoardClosed)?;
            }
        }
        Ok(())
    }
}

async fn run_ticker(ticker: Ticker, period: Duration, token: CancellationToken) {
    let mut interval = interval_at(Instant::now() + period, period);
    interval.set_missed_tick_behavior(MissedTickBehavior::Delay);

    loop {
        tokio::select! {
            () = token.cancelled() => break,
            _ = interval.tick() => {
                match ticker.tick().await {
                    Ok(()) => {}
                    Err(ViewError::BoardClosed) => break,
                    Err(e) => warn!(error = %e, "Ticker failed to encode update"),
                }
            }
        }
    }
    trace!("Ticker finished");
}

/// Spawns the board actor.
pub struct PriceBoard;

impl PriceBoard {
    /// Spawn a board tracking `symbols`.
    ///
    /// Returns a handle for interaction and a join handle for the task.
    #[must_use]
    pub fn spawn(
        feed: DynFeedConnection,
        symbols: Vec<TrackedSymbol>,
        source: DynUpdateSource,
        config: BoardConfig,
    ) -> (PriceBoardHandle, JoinHandle<()>) {
        let (command_tx, commands) = mpsc::channel(config.command_buffer.max(1));
        let (events_tx, events_rx) = mpsc::channel(config.event_buffer.max(1));
        let (snapshot_tx, snapshot_rx) = watch::channel(Arc::new(UiSnapshot::new(symbols)));

        let task = BoardTask {
            feed,
            source,
            config,
            commands,
            events_tx,
            events_rx,
            snapshot_tx,
            subscribed: AtomicBool::new(false),
            lifetime: CancellationToken::new(),
            ticker: None,
        };

        let handle = PriceBoardHandle {
            tx: command_tx,
            snapshot_rx,
        };
        let join_handle = tokio::spawn(task.run());

        (handle, join_handle)
    }
}

/// Handle for interacting with the board actor.
#[derive(Clone)]
pub struct PriceBoardHandle {
    tx: mpsc::Sender<BoardCommand>,
    snapshot_rx: watch::Receiver<Arc<UiSnapshot>>,
}

impl PriceBoardHandle {
    /// Queue a command for the actor.
    pub async fn dispatch(&self, command: BoardCommand) -> ViewResult<()> {
        self.tx
            .send(command)
            .await
            .map_err(|_| ViewError::BoardClosed)
    }

    pub async fn start(&self) -> ViewResult<()> {
        self.dispatch(BoardCommand::Start).await
    }

    pub async fn stop(&self) -> ViewResult<()> {
        self.dispatch(BoardCommand::Stop).await
    }

    pub async fn toggle(&self) -> ViewResult<()> {
        self.dispatch(BoardCommand::Toggle).await
    }

    pub async fn clear_error(&self) -> ViewResult<()> {
        self.dispatch(BoardCommand::ClearError).await
    }

    /// Stop the board and end the actor.
    pub async fn shutdown(&self) {
        let _ = self.tx.send(BoardCommand::Shutdown).await;
    }

    /// Observe snapshots. The receiver starts at the current one.
    pub fn subscribe(&self) -> watch::Receiver<Arc<UiSnapshot>> {
        self.snapshot_rx.clone()
    }

    /// Latest snapshot.
    pub fn snapshot(&self) -> Arc<UiSnapshot> {
        self.snapshot_rx.borrow().clone()
    }
}
