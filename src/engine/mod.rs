use std::sync::Arc;
use std::time::{Duration, Instant};

use chrono::Utc;
use tokio::task::JoinHandle;
use tokio_util::sync::CancellationToken;

use crate::config::{Settings, TradingMode};
use crate::execution::{OrderLifecycleManager, PositionManager};
use crate::market::MarketDataFeed;
use crate::strategy::{build_strategy, ScanContext, Strategy};

/// Sync the tracked-order set against the exchange every N scan ticks
const ORDER_SYNC_EVERY: u64 = 10;

/// Owns one independent scan loop per (symbol, exchange) pair.
///
/// Each loop runs fetch -> indicate -> evaluate -> act -> sleep, checks
/// its cancellation token before every network phase, and catches every
/// per-iteration failure so one pair never halts the others.
pub struct TradingEngine {
    settings: Settings,
    feed: Arc<MarketDataFeed>,
    orders: Arc<OrderLifecycleManager>,
    positions: Arc<PositionManager>,
}

impl TradingEngine {
    pub fn new(
        settings: Settings,
        feed: Arc<MarketDataFeed>,
        orders: Arc<OrderLifecycleManager>,
        positions: Arc<PositionManager>,
    ) -> Self {
        Self {
            settings,
            feed,
            orders,
            positions,
        }
    }

    /// Spawn all scan loops as fire-and-forget tasks tied to `cancel`
    pub fn spawn_loops(&self, cancel: &CancellationToken) -> Vec<JoinHandle<()>> {
        self.settings
            .trading_pairs()
            .into_iter()
            .map(|(symbol, exchange)| {
                let settings = self.settings.clone();
                let feed = self.feed.clone();
                let orders = self.orders.clone();
                let positions = self.positions.clone();
                let cancel = cancel.child_token();
                tokio::spawn(async move {
                    scan_loop(symbol, exchange, settings, feed, orders, positions, cancel).await;
                })
            })
            .collect()
    }
}

#[allow(clippy::too_many_arguments)]
async fn scan_loop(
    symbol: String,
    exchange: String,
    settings: Settings,
    feed: Arc<MarketDataFeed>,
    orders: Arc<OrderLifecycleManager>,
    positions: Arc<PositionManager>,
    cancel: CancellationToken,
) {
    let mut strategy = build_strategy(settings.strategy, &settings);
    let interval_minutes: u32 = settings.candle_interval.parse().unwrap_or(60);
    let scan_interval = Duration::from_millis(settings.scan_interval_ms);
    let candle_refresh = Duration::from_secs(u64::from(interval_minutes) * 60);
    let mut last_refresh: Option<Instant> = None;
    let mut tick: u64 = 0;

    tracing::info!(
        "Scan loop started for {} on {} ({} strategy, every {:?})",
        symbol,
        exchange,
        strategy.name(),
        scan_interval
    );

    while !cancel.is_cancelled() {
        // A fresh candle interval invalidates the cached window
        if last_refresh.map_or(true, |at| at.elapsed() >= candle_refresh) {
            feed.invalidate(&symbol, &exchange, interval_minutes);
            last_refresh = Some(Instant::now());
        }

        let depth = feed.depth(&symbol, &exchange).await;
        if cancel.is_cancelled() {
            break;
        }
        let candles = feed
            .candles(&symbol, &exchange, interval_minutes, settings.candle_limit)
            .await;
        if cancel.is_cancelled() {
            break;
        }

        if let Some(depth) = depth {
            let last_trades = orders.last_trades(&symbol, &exchange);
            let ctx = ScanContext {
                symbol: &symbol,
                exchange: &exchange,
                candles: &candles,
                depth: &depth,
                last_buy_price: last_trades.buy,
                last_sell_price: last_trades.sell,
                now: Utc::now(),
            };

            let signal = strategy.evaluate(&ctx);
            if cancel.is_cancelled() {
                break;
            }

            if tick % ORDER_SYNC_EVERY == 0 {
                orders.sync_open_orders(&symbol, &exchange).await;
            }

            orders
                .sweep(
                    &symbol,
                    &exchange,
                    signal.as_ref().map(|s| s.kind),
                    depth.bid,
                    depth.ask,
                )
                .await;
            if cancel.is_cancelled() {
                break;
            }

            let signal_kind = signal.as_ref().map(|s| s.kind);
            if let Some(signal) = signal {
                match settings.trading_mode {
                    TradingMode::Spot => {
                        if let Err(err) = orders.place_for_signal(&signal, &symbol, &exchange).await
                        {
                            tracing::error!(
                                "Order placement failed for {} on {}: {}",
                                symbol,
                                exchange,
                                err
                            );
                        }
                    }
                    TradingMode::Futures => {
                        let balance = match orders.futures_balance(&settings.quote_currency).await
                        {
                            Ok(balance) => balance,
                            Err(err) => {
                                tracing::error!(
                                    "Balance lookup failed for {} on {}: {}",
                                    symbol,
                                    exchange,
                                    err
                                );
                                rust_decimal::Decimal::ZERO
                            }
                        };
                        if let Err(err) = positions
                            .open_from_signal(&signal, &symbol, &exchange, balance)
                            .await
                        {
                            tracing::error!(
                                "Futures entry failed for {} on {}: {}",
                                symbol,
                                exchange,
                                err
                            );
                        }
                    }
                }
            }

            if settings.trading_mode == TradingMode::Futures && !cancel.is_cancelled() {
                positions.check(&symbol, &exchange, signal_kind).await;
            }
        } else {
            tracing::debug!("No depth for {} on {}; skipping tick", symbol, exchange);
        }

        tick += 1;

        tokio::select! {
            _ = cancel.cancelled() => break,
            _ = tokio::time::sleep(scan_interval) => {}
        }
    }

    tracing::info!("Scan loop stopped for {} on {}", symbol, exchange);
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::api::SignedApiClient;
    use crate::config::StrategyKind;
    use crate::indicators::IndicatorConfig;

    fn engine_for(server: &mockito::Server, settings: Settings) -> TradingEngine {
        let client = Arc::new(SignedApiClient::with_base_url(&settings, server.url()));
        let feed = Arc::new(MarketDataFeed::new(
            client.clone(),
            IndicatorConfig::from(&settings),
            settings.trading_mode,
        ));
        let orders = Arc::new(OrderLifecycleManager::new(client.clone(), settings.clone()));
        let positions = Arc::new(PositionManager::new(client, settings.clone()));
        TradingEngine::new(settings, feed, orders, positions)
    }

    #[tokio::test]
    async fn test_loops_stop_on_cancellation() {
        let mut server = mockito::Server::new_async().await;
        // Empty-but-valid payloads keep every fetch on the fast path
        let _any = server
            .mock("GET", mockito::Matcher::Regex(".*".to_string()))
            .with_body(r#"{"data":{"bids":[],"asks":[],"orders":[]}}"#)
            .create_async()
            .await;

        let settings = Settings {
            api_key: "k".into(),
            secret_key: "9d61b19deffd5a60ba844af492ec2cc44449c5697b326919703bac031cae7f60"
                .into(),
            symbols: vec!["BTC/INR".into()],
            exchanges: vec!["COINSWITCHX".into()],
            strategy: StrategyKind::Scalping,
            scan_interval_ms: 50,
            ..Default::default()
        };

        let engine = engine_for(&server, settings);
        let cancel = CancellationToken::new();
        let handles = engine.spawn_loops(&cancel);
        assert_eq!(handles.len(), 1);

        // Let a few ticks run, then ask for shutdown
        tokio::time::sleep(Duration::from_millis(120)).await;
        cancel.cancel();

        for handle in handles {
            tokio::time::timeout(Duration::from_secs(5), handle)
                .await
                .expect("loop must stop after cancellation")
                .unwrap();
        }
    }

    #[tokio::test]
    async fn test_one_loop_per_pair() {
        let mut server = mockito::Server::new_async().await;
        let _any = server
            .mock("GET", mockito::Matcher::Regex(".*".to_string()))
            .with_body(r#"{"data":{"bids":[],"asks":[],"orders":[]}}"#)
            .create_async()
            .await;
        let settings = Settings {
            api_key: "k".into(),
            secret_key: "9d61b19deffd5a60ba844af492ec2cc44449c5697b326919703bac031cae7f60"
                .into(),
            symbols: vec!["BTC/INR".into(), "ETH/INR".into()],
            exchanges: vec!["COINSWITCHX".into(), "WAZIRX".into()],
            ..Default::default()
        };

        let engine = engine_for(&server, settings);
        let cancel = CancellationToken::new();
        let handles = engine.spawn_loops(&cancel);
        assert_eq!(handles.len(), 4);

        cancel.cancel();
        for handle in handles {
            tokio::time::timeout(Duration::from_secs(5), handle)
                .await
                .expect("loop must stop after cancellation")
                .unwrap();
        }
    }
}
