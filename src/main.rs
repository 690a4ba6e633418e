use std::sync::Arc;

use clap::Parser;
use tokio_util::sync::CancellationToken;

use quantbot::api::SignedApiClient;
use quantbot::config::Settings;
use quantbot::engine::TradingEngine;
use quantbot::execution::{OrderLifecycleManager, PositionManager};
use quantbot::indicators::IndicatorConfig;
use quantbot::market::MarketDataFeed;
use quantbot::Result;

#[derive(Parser)]
#[command(name = "quantbot", about = "Automated crypto-exchange trading client")]
struct Args {
    /// Settings file (TOML); environment variables override it
    #[arg(short, long)]
    config: Option<String>,

    /// Validate API credentials and exit
    #[arg(long)]
    check_keys: bool,
}

#[tokio::main]
async fn main() -> Result<()> {
    dotenvy::dotenv().ok();
    setup_logging();

    let args = Args::parse();
    let settings = Settings::load(args.config.as_deref())?;

    tracing::info!("🚀 QuantBot starting");
    tracing::info!("📊 Configuration:");
    tracing::info!("  Strategy: {:?}", settings.strategy);
    tracing::info!("  Mode: {:?}", settings.trading_mode);
    tracing::info!("  Scan interval: {}ms", settings.scan_interval_ms);
    tracing::info!(
        "  Trading: {}",
        if settings.trading_enabled {
            "ENABLED"
        } else {
            "dry-run"
        }
    );
    for (symbol, exchange) in settings.trading_pairs() {
        tracing::info!("  Pair: {} on {}", symbol, exchange);
    }

    let client = Arc::new(SignedApiClient::new(&settings));

    if args.check_keys {
        let body = client.validate_keys().await?;
        tracing::info!("Key validation response: {}", body);
        return Ok(());
    }

    let feed = Arc::new(MarketDataFeed::new(
        client.clone(),
        IndicatorConfig::from(&settings),
        settings.trading_mode,
    ));
    let orders = Arc::new(OrderLifecycleManager::new(client.clone(), settings.clone()));
    let positions = Arc::new(PositionManager::new(client.clone(), settings.clone()));

    let engine = TradingEngine::new(settings, feed, orders, positions);
    let cancel = CancellationToken::new();
    let handles = engine.spawn_loops(&cancel);

    tracing::info!("✅ {} scan loops running; press Ctrl+C to stop", handles.len());

    tokio::signal::ctrl_c().await?;
    tracing::info!("⚠️  Received Ctrl+C, shutting down...");
    cancel.cancel();

    // Best-effort: loops finish their current phase and exit
    for handle in handles {
        let _ = handle.await;
    }

    tracing::info!("👋 QuantBot stopped");
    Ok(())
}

fn setup_logging() {
    tracing_subscriber::fmt()
        .with_env_filter(
            tracing_subscriber::EnvFilter::try_from_default_env()
                .unwrap_or_else(|_| "quantbot=info".into()),
        )
        .init();
}
