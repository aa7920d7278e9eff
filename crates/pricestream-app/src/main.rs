//! pricestream - Entry Point
//!
//! Connects to the configured feed, runs the price board with the
//! random-walk simulator and logs every snapshot.

use anyhow::Result;
use clap::Parser;
use pricestream_app::{AppConfig, Application};
use pricestream_telemetry::Metrics;
use std::time::Duration;
use tracing::info;

/// Real-time price board over a reconnecting WebSocket feed
#[derive(Parser, Debug)]
#[command(version, about, long_about = None)]
struct Args {
    /// Configuration file path (can also be set via PRICESTREAM_CONFIG env var)
    #[arg(short, long)]
    config: Option<String>,

    /// Override the feed URL
    #[arg(long)]
    url: Option<String>,

    /// Stop after this many seconds (0 = run until Ctrl-C)
    #[arg(long, default_value_t = 0)]
    duration_secs: u64,
}

#[tokio::main]
async fn main() -> Result<()> {
    let args = Args::parse();

    pricestream_telemetry::init_logging()?;

    info!("Starting pricestream v{}", env!("CARGO_PKG_VERSION"));

    let mut config = match &args.config {
        Some(path) => {
            info!(config_path = %path, "Loading configuration");
            AppConfig::from_file(path)?
        }
        None => AppConfig::load()?,
    };
    if let Some(url) = args.url {
        config.feed.url = url;
    }
    info!(url = %config.feed.url, "Configuration loaded");

    let app = Application::new(config)?;
    let duration = (args.duration_secs > 0).then(|| Duration::from_secs(args.duration_secs));
    let snapshot = app.run(duration).await?;

    println!("{}", serde_json::to_string_pretty(&*snapshot)?);
    print!("{}", Metrics::gather_text()?);

    Ok(())
}
