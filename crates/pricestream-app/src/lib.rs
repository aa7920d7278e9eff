//! pricestream application.
//!
//! Wires the pieces into a headless price board:
//! - WebSocket connection manager over tokio-tungstenite
//! - Board actor reducing the feed into snapshots
//! - Random-walk simulator producing the outbound updates
//! - Snapshot logger standing in for a presentation layer

pub mod app;
pub mod config;
pub mod error;
pub mod simulator;

pub use app::Application;
pub use config::AppConfig;
pub use error::{AppError, AppResult};
