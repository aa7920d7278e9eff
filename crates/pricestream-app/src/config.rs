//! Application configuration.

use crate::error::{AppError, AppResult};
use pricestream_core::DEFAULT_SYMBOLS;
use pricestream_view::BoardConfig;
use pricestream_ws::{ConnectionConfig, WsTransportConfig, DEFAULT_URL};
use serde::{Deserialize, Serialize};
use std::path::Path;
use tracing::info;

/// Environment variable naming the config file.
pub const CONFIG_ENV: &str = "PRICESTREAM_CONFIG";

/// Config file used when `PRICESTREAM_CONFIG` is not set.
pub const DEFAULT_CONFIG_PATH: &str = "config/default.toml";

/// Feed endpoint.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct FeedConfig {
    /// WebSocket URL. Default: the public Postman echo server.
    #[serde(default = "default_url")]
    pub url: String,
}

fn default_url() -> String {
    DEFAULT_URL.to_string()
}

impl Default for FeedConfig {
    fn default() -> Self {
        Self { url: default_url() }
    }
}

/// Connection and socket tuning.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct WebSocketConfig {
    /// First reconnect delay (ms). Default: 1,000.
    #[serde(default = "default_reconnect_base_delay_ms")]
    pub reconnect_base_delay_ms: u64,
    /// Reconnect delay cap (ms). Default: 32,000.
    #[serde(default = "default_reconnect_max_delay_ms")]
    pub reconnect_max_delay_ms: u64,
    /// Retry counter ceiling. Default: 6.
    #[serde(default = "default_max_backoff_exponent")]
    pub max_backoff_exponent: u32,
    /// Inbound broadcast capacity. Default: 64.
    #[serde(default = "default_message_buffer")]
    pub message_buffer: usize,
    /// Per-socket outbound queue. Default: 256.
    #[serde(default = "default_outbound_buffer")]
    pub outbound_buffer: usize,
    /// Idle time before a keep-alive ping (ms). Default: 15,000.
    #[serde(default = "default_ping_interval_ms")]
    pub ping_interval_ms: u64,
    /// Pong deadline (ms). Default: 10,000.
    #[serde(default = "default_pong_timeout_ms")]
    pub pong_timeout_ms: u64,
}

fn default_reconnect_base_delay_ms() -> u64 {
    1_000
}

fn default_reconnect_max_delay_ms() -> u64 {
    32_000
}

fn default_max_backoff_exponent() -> u32 {
    6
}

fn default_message_buffer() -> usize {
    64
}

fn default_outbound_buffer() -> usize {
    256
}

fn default_ping_interval_ms() -> u64 {
    15_000
}

fn default_pong_timeout_ms() -> u64 {
    10_000
}

impl Default for WebSocketConfig {
    fn default() -> Self {
        Self {
            reconnect_base_delay_ms: default_reconnect_base_delay_ms(),
            reconnect_max_delay_ms: default_reconnect_max_delay_ms(),
            max_backoff_exponent: default_max_backoff_exponent(),
            message_buffer: default_message_buffer(),
            outbound_buffer: default_outbound_buffer(),
            ping_interval_ms: default_ping_interval_ms(),
            pong_timeout_ms: default_pong_timeout_ms(),
        }
    }
}

/// Tracked symbols and the outbound ticker.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct BoardSection {
    /// Ticker period (ms). Default: 2,000.
    #[serde(default = "default_tick_interval_ms")]
    pub tick_interval_ms: u64,
    /// Symbols to track.
    #[serde(default = "default_symbols")]
    pub symbols: Vec<String>,
    /// Lower bound of the random seed price. Default: 50.
    #[serde(default = "default_min_seed_price")]
    pub min_seed_price: f64,
    /// Upper bound of the random seed price. Default: 500.
    #[serde(default = "default_max_seed_price")]
    pub max_seed_price: f64,
}

fn default_tick_interval_ms() -> u64 {
    2_000
}

fn default_symbols() -> Vec<String> {
    DEFAULT_SYMBOLS.iter().map(|s| s.to_string()).collect()
}

fn default_min_seed_price() -> f64 {
    50.0
}

fn default_max_seed_price() -> f64 {
    500.0
}

impl Default for BoardSection {
    fn default() -> Self {
        Self {
            tick_interval_ms: default_tick_interval_ms(),
            symbols: default_symbols(),
            min_seed_price: default_min_seed_price(),
            max_seed_price: default_max_seed_price(),
        }
    }
}

/// Random-walk parameters for the demo driver.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct SimulatorConfig {
    /// Smallest relative move per tick. Default: 0.005 (0.5%).
    #[serde(default = "default_min_move_pct")]
    pub min_move_pct: f64,
    /// Largest relative move per tick. Default: 0.03 (3%).
    #[serde(default = "default_max_move_pct")]
    pub max_move_pct: f64,
    /// Prices never fall below this. Default: 0.01.
    #[serde(default = "default_floor_price")]
    pub floor_price: f64,
}

fn default_min_move_pct() -> f64 {
    0.005
}

fn default_max_move_pct() -> f64 {
    0.03
}

fn default_floor_price() -> f64 {
    0.01
}

impl Default for SimulatorConfig {
    fn default() -> Self {
        Self {
            min_move_pct: default_min_move_pct(),
            max_move_pct: default_max_move_pct(),
            floor_price: default_floor_price(),
        }
    }
}

/// Application configuration.
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct AppConfig {
    #[serde(default)]
    pub feed: FeedConfig,
    #[serde(default)]
    pub websocket: WebSocketConfig,
    #[serde(default)]
    pub board: BoardSection,
    #[serde(default)]
    pub simulator: SimulatorConfig,
}

impl AppConfig {
    /// Load configuration from a TOML file.
    pub fn from_file(path: &str) -> AppResult<Self> {
        let content = std::fs::read_to_string(path)
            .map_err(|e| AppError::Config(format!("Failed to read config: {e}")))?;

        let config: Self = toml::from_str(&content)
            .map_err(|e| AppError::Config(format!("Failed to parse config: {e}")))?;
        config.validate()?;
        Ok(config)
    }

    /// Load from `path`, or use defaults when the file does not exist.
    pub fn load_or_default(path: &str) -> AppResult<Self> {
        if !Path::new(path).exists() {
            info!(path, "Config file not found, using defaults");
            return Ok(Self::default());
        }
        Self::from_file(path)
    }

    /// Load from `PRICESTREAM_CONFIG`, falling back to `config/default.toml`.
    pub fn load() -> AppResult<Self> {
        let path =
            std::env::var(CONFIG_ENV).unwrap_or_else(|_| DEFAULT_CONFIG_PATH.to_string());
        Self::load_or_default(&path)
    }

    /// Reject settings the components cannot run with.
    pub fn validate(&self) -> AppResult<()> {
        let ws = &self.websocket;
        if ws.reconnect_base_delay_ms == 0 || ws.reconnect_base_delay_ms > ws.reconnect_max_delay_ms
        {
            return Err(AppError::Config(format!(
                "reconnect delays must satisfy 0 < base ({}) <= max ({})",
                ws.reconnect_base_delay_ms, ws.reconnect_max_delay_ms
            )));
        }
        if self.board.symbols.is_empty() {
            return Err(AppError::Config("board.symbols is empty".to_string()));
        }
        if self.board.tick_interval_ms == 0 {
            return Err(AppError::Config(
                "board.tick_interval_ms must be positive".to_string(),
            ));
        }
        let finite = [
            ("board.min_seed_price", self.board.min_seed_price),
            ("board.max_seed_price", self.board.max_seed_price),
            ("simulator.min_move_pct", self.simulator.min_move_pct),
            ("simulator.max_move_pct", self.simulator.max_move_pct),
            ("simulator.floor_price", self.simulator.floor_price),
        ];
        if let Some((name, value)) = finite.iter().find(|(_, v)| !v.is_finite()) {
            return Err(AppError::Config(format!("{name} must be finite, got {value}")));
        }
        if !(0.0 < self.board.min_seed_price && self.board.min_seed_price <= self.board.max_seed_price)
        {
            return Err(AppError::Config(format!(
                "seed prices must satisfy 0 < min ({}) <= max ({})",
                self.board.min_seed_price, self.board.max_seed_price
            )));
        }
        let sim = &self.simulator;
        if !(0.0 <= sim.min_move_pct && sim.min_move_pct <= sim.max_move_pct) {
            return Err(AppError::Config(format!(
                "moves must satisfy 0 <= min ({}) <= max ({})",
                sim.min_move_pct, sim.max_move_pct
            )));
        }
        if sim.floor_price <= 0.0 {
            return Err(AppError::Config(
                "simulator.floor_price must be positive".to_string(),
            ));
        }
        Ok(())
    }

    /// Connection manager settings.
    pub fn connection_config(&self) -> ConnectionConfig {
        ConnectionConfig {
            url: self.feed.url.clone(),
            reconnect_base_delay_ms: self.websocket.reconnect_base_delay_ms,
            reconnect_max_delay_ms: self.websocket.reconnect_max_delay_ms,
            max_backoff_exponent: self.websocket.max_backoff_exponent,
            message_buffer: self.websocket.message_buffer,
        }
    }

    /// Socket settings.
    pub fn transport_config(&self) -> WsTransportConfig {
        WsTransportConfig {
            outbound_buffer: self.websocket.outbound_buffer,
            ping_interval_ms: self.websocket.ping_interval_ms,
            pong_timeout_ms: self.websocket.pong_timeout_ms,
            ..Default::default()
        }
    }

    /// Board actor settings.
    pub fn board_config(&self) -> BoardConfig {
        BoardConfig {
            tick_interval_ms: self.board.tick_interval_ms,
            ..Default::default()
        }
    }
}
