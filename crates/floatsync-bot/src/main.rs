//! floatsync - marketplace sales to Steam trade offers.

use anyhow::Result;
use clap::Parser;
use tracing::info;

/// Sends, confirms and withdraws Steam trade offers for marketplace sales
#[derive(Parser, Debug)]
#[command(version, about, long_about = None)]
struct Args {
    /// Configuration file path (can also be set via FLOATSYNC_CONFIG env var)
    #[arg(short, long)]
    config: Option<String>,
}

#[tokio::main]
async fn main() -> Result<()> {
    // Credentials usually live in .env
    dotenvy::dotenv().ok();

    let args = Args::parse();

    floatsync_telemetry::init_logging()?;

    info!("Starting floatsync v{}", env!("CARGO_PKG_VERSION"));

    // CLI arg > FLOATSYNC_CONFIG env var > default
    let config_path = args
        .config
        .or_else(|| std::env::var("FLOATSYNC_CONFIG").ok())
        .unwrap_or_else(|| "config/default.toml".to_string());

    info!(config_path = %config_path, "Loading configuration");

    let mut config = floatsync_bot::AppConfig::from_file(&config_path)?;
    config.apply_env_overrides()?;
    info!(
        market = %config.market.base_url,
        poll_interval_secs = config.reconciler.poll_interval_secs,
        "Configuration loaded"
    );

    let app = floatsync_bot::Application::new(config)?;
    app.run().await?;

    Ok(())
}
