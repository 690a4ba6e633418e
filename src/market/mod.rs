use std::collections::HashMap;
use std::str::FromStr;
use std::sync::{Arc, RwLock};

use chrono::{DateTime, Utc};
use rust_decimal::Decimal;
use serde::Deserialize;

use crate::api::SignedApiClient;
use crate::config::TradingMode;
use crate::indicators::{annotate, IndicatorConfig};
use crate::models::{Candle, DepthSnapshot};

/// Order book levels per side folded into the VWAP proxy
const VWAP_DEPTH_LEVELS: usize = 10;

#[derive(Debug, Deserialize)]
struct DepthResponse {
    data: Option<DepthData>,
}

#[derive(Debug, Deserialize)]
struct DepthData {
    #[serde(default)]
    bids: Vec<(Decimal, Decimal)>,
    #[serde(default)]
    asks: Vec<(Decimal, Decimal)>,
}

#[derive(Debug, Deserialize)]
struct CandleResponse {
    data: Option<Vec<RawCandle>>,
}

/// Wire candle; the exchange transmits numerics as strings
#[derive(Debug, Deserialize)]
struct RawCandle {
    start_time: i64,
    close_time: i64,
    o: Decimal,
    h: Decimal,
    l: Decimal,
    c: Decimal,
    volume: Decimal,
}

/// Fetches and caches market data, annotating candle windows with
/// indicators before anything downstream sees them.
///
/// Candles are cached per (symbol, exchange, timeframe) until explicitly
/// invalidated; depth snapshots are never cached. Malformed or empty
/// upstream responses degrade to empty results, never errors.
pub struct MarketDataFeed {
    client: Arc<SignedApiClient>,
    indicator_config: IndicatorConfig,
    mode: TradingMode,
    cache: RwLock<HashMap<String, Vec<Candle>>>,
}

impl MarketDataFeed {
    pub fn new(
        client: Arc<SignedApiClient>,
        indicator_config: IndicatorConfig,
        mode: TradingMode,
    ) -> Self {
        Self {
            client,
            indicator_config,
            mode,
            cache: RwLock::new(HashMap::new()),
        }
    }

    fn cache_key(symbol: &str, exchange: &str, interval_minutes: u32) -> String {
        format!("{}_{}_{}", symbol, exchange, interval_minutes)
    }

    /// Current order book summary, or `None` when unavailable
    pub async fn depth(&self, symbol: &str, exchange: &str) -> Option<DepthSnapshot> {
        let body = match self.client.depth(symbol, exchange).await {
            Ok(body) => body,
            Err(err) => {
                tracing::warn!("Depth fetch failed for {} on {}: {}", symbol, exchange, err);
                return None;
            }
        };
        parse_depth(&body)
    }

    /// Annotated candle window, oldest first. Serves the cache until
    /// `invalidate` is called for the key.
    pub async fn candles(
        &self,
        symbol: &str,
        exchange: &str,
        interval_minutes: u32,
        limit: u32,
    ) -> Vec<Candle> {
        let key = Self::cache_key(symbol, exchange, interval_minutes);
        if let Some(cached) = self.cache.read().unwrap().get(&key) {
            return cached.clone();
        }

        let fetched = match self.mode {
            TradingMode::Spot => {
                self.client
                    .candles(symbol, exchange, interval_minutes, limit)
                    .await
            }
            TradingMode::Futures => {
                self.client
                    .futures_klines(symbol, exchange, interval_minutes, limit)
                    .await
            }
        };

        let body = match fetched {
            Ok(body) => body,
            Err(err) => {
                tracing::warn!(
                    "Candle fetch failed for {} on {}: {}",
                    symbol,
                    exchange,
                    err
                );
                return Vec::new();
            }
        };

        let mut candles = parse_candles(&body);
        if candles.is_empty() {
            return candles;
        }

        annotate(&mut candles, &self.indicator_config);
        self.cache.write().unwrap().insert(key, candles.clone());
        candles
    }

    /// Latest futures mark price from the ticker endpoint
    pub async fn futures_mark_price(&self, symbol: &str, exchange: &str) -> Option<Decimal> {
        let body = match self.client.futures_ticker(symbol, exchange).await {
            Ok(body) => body,
            Err(err) => {
                tracing::warn!(
                    "Ticker fetch failed for {} on {}: {}",
                    symbol,
                    exchange,
                    err
                );
                return None;
            }
        };
        parse_last_price(&body, exchange, "last_price")
    }

    pub fn invalidate(&self, symbol: &str, exchange: &str, interval_minutes: u32) {
        let key = Self::cache_key(symbol, exchange, interval_minutes);
        self.cache.write().unwrap().remove(&key);
    }

    pub fn clear(&self) {
        self.cache.write().unwrap().clear();
    }
}

fn parse_depth(body: &str) -> Option<DepthSnapshot> {
    let response: DepthResponse = serde_json::from_str(body).ok()?;
    let data = response.data?;

    let &(bid, bid_volume) = data.bids.first()?;
    let &(ask, ask_volume) = data.asks.first()?;

    // Volume-weighted average over the top levels of both sides
    let mut weighted = Decimal::ZERO;
    let mut total_volume = Decimal::ZERO;
    for &(price, volume) in data
        .bids
        .iter()
        .take(VWAP_DEPTH_LEVELS)
        .chain(data.asks.iter().take(VWAP_DEPTH_LEVELS))
    {
        weighted += price * volume;
        total_volume += volume;
    }

    let vwap = if total_volume.is_zero() {
        (bid + ask) / Decimal::from(2)
    } else {
        weighted / total_volume
    };

    Some(DepthSnapshot {
        bid,
        ask,
        bid_volume,
        ask_volume,
        vwap,
        timestamp: Utc::now(),
    })
}

fn parse_candles(body: &str) -> Vec<Candle> {
    let response: CandleResponse = match serde_json::from_str::<CandleResponse>(body) {
        Ok(response) => response,
        Err(err) => {
            tracing::warn!("Unparseable candle payload: {}", err);
            return Vec::new();
        }
    };

    let mut raw = match response.data {
        Some(raw) => raw,
        None => return Vec::new(),
    };
    raw.sort_by_key(|c| c.start_time);

    raw.into_iter()
        .filter_map(|c| {
            let open_time = millis_to_datetime(c.start_time)?;
            let close_time = millis_to_datetime(c.close_time)?;
            Some(Candle::new(
                open_time, close_time, c.o, c.h, c.l, c.c, c.volume,
            ))
        })
        .collect()
}

fn millis_to_datetime(millis: i64) -> Option<DateTime<Utc>> {
    DateTime::from_timestamp_millis(millis)
}

/// Pull `data.<exchange>.<field>` out of a ticker payload, trying the
/// exchange key as sent, uppercased and lowercased.
fn parse_last_price(body: &str, exchange: &str, field: &str) -> Option<Decimal> {
    let value: serde_json::Value = serde_json::from_str(body).ok()?;
    let data = value.get("data")?;

    let entry = data
        .get(exchange)
        .or_else(|| data.get(exchange.to_uppercase()))
        .or_else(|| data.get(exchange.to_lowercase()))?;

    match entry.get(field)? {
        serde_json::Value::String(s) => Decimal::from_str(s).ok(),
        serde_json::Value::Number(n) => Decimal::from_str(&n.to_string()).ok(),
        _ => None,
    }
}
