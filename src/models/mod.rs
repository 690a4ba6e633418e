use chrono::{DateTime, Utc};
use rust_decimal::Decimal;
use serde::{Deserialize, Serialize};

/// Key used for every per-pair map in the engine
pub fn pair_key(symbol: &str, exchange: &str) -> String {
    format!("{}_{}", symbol, exchange)
}

/// OHLCV candlestick with optional derived indicator fields
///
/// Closed candles are immutable; the in-progress candle may be replaced
/// in place by the market feed. Indicator fields are filled by
/// `indicators::annotate` over the whole window.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Candle {
    pub open_time: DateTime<Utc>,
    pub close_time: DateTime<Utc>,
    pub open: Decimal,
    pub high: Decimal,
    pub low: Decimal,
    pub close: Decimal,
    pub volume: Decimal,

    pub sma: Option<Decimal>,
    pub ema_fast: Option<Decimal>,
    pub ema_slow: Option<Decimal>,
    pub rsi: Option<Decimal>,
    pub macd: Option<Decimal>,
    pub macd_signal: Option<Decimal>,
    pub macd_histogram: Option<Decimal>,
}

impl Candle {
    /// Bare candle with no derived fields
    pub fn new(
        open_time: DateTime<Utc>,
        close_time: DateTime<Utc>,
        open: Decimal,
        high: Decimal,
        low: Decimal,
        close: Decimal,
        volume: Decimal,
    ) -> Self {
        Self {
            open_time,
            close_time,
            open,
            high,
            low,
            close,
            volume,
            sma: None,
            ema_fast: None,
            ema_slow: None,
            rsi: None,
            macd: None,
            macd_signal: None,
            macd_histogram: None,
        }
    }
}

/// Point-in-time order book summary for a symbol on one exchange
///
/// `vwap` is the volume-weighted average over the top levels of both
/// sides, used as a smoothed "current price" proxy. Not persisted.
#[derive(Debug, Clone, PartialEq)]
pub struct DepthSnapshot {
    pub bid: Decimal,
    pub ask: Decimal,
    pub bid_volume: Decimal,
    pub ask_volume: Decimal,
    pub vwap: Decimal,
    pub timestamp: DateTime<Utc>,
}

impl DepthSnapshot {
    /// Best-ask-over-best-bid spread as a fraction of the bid
    pub fn spread(&self) -> Decimal {
        if self.bid.is_zero() {
            return Decimal::ZERO;
        }
        (self.ask - self.bid) / self.bid
    }
}

/// What a strategy wants done
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub enum SignalKind {
    Buy,
    Sell,
    Exit,
}

/// Produced by a strategy, consumed exactly once by the order lifecycle
#[derive(Debug, Clone, PartialEq)]
pub struct TradingSignal {
    pub timestamp: DateTime<Utc>,
    pub kind: SignalKind,
    pub price: Decimal,
    pub symbol: String,
    pub stop_level: Option<Decimal>,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum Side {
    Buy,
    Sell,
}

impl Side {
    pub fn as_str(&self) -> &'static str {
        match self {
            Side::Buy => "buy",
            Side::Sell => "sell",
        }
    }

    pub fn opposes(&self, kind: SignalKind) -> bool {
        matches!(
            (self, kind),
            (Side::Buy, SignalKind::Sell) | (Side::Sell, SignalKind::Buy)
        )
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum OrderStatus {
    Open,
    Filled,
    Canceled,
}

impl OrderStatus {
    /// Map the exchange's status strings; anything unrecognized stays Open
    /// so it keeps being polled rather than silently dropped.
    pub fn from_wire(status: &str) -> Self {
        match status.to_ascii_lowercase().as_str() {
            "filled" | "executed" => OrderStatus::Filled,
            "canceled" | "cancelled" => OrderStatus::Canceled,
            _ => OrderStatus::Open,
        }
    }
}

/// One tracked exchange order
///
/// Created on successful placement, mutated only by status polling,
/// removed from the tracked set once Filled or Canceled.
#[derive(Debug, Clone, PartialEq)]
pub struct OrderRecord {
    pub order_id: String,
    pub symbol: String,
    pub exchange: String,
    pub side: Side,
    pub price: Decimal,
    pub quantity: Decimal,
    pub status: OrderStatus,
    pub created_at: DateTime<Utc>,
}

impl OrderRecord {
    pub fn age_minutes(&self, now: DateTime<Utc>) -> i64 {
        (now - self.created_at).num_minutes()
    }
}

/// Lifecycle of a position from first fill to full close
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum PositionState {
    Opening,
    Open,
    Closing,
    Closed,
}

/// An open position, spot or leveraged
///
/// `current_stop_loss` only ever moves in the position's favor; the
/// position manager enforces the ratchet.
#[derive(Debug, Clone)]
pub struct Position {
    pub symbol: String,
    pub entry_price: Decimal,
    pub quantity: Decimal,
    pub is_long: bool,
    pub current_stop_loss: Option<Decimal>,
    pub pnl: Decimal,
    pub entry_time: DateTime<Utc>,
    pub state: PositionState,
    pub mark_price: Decimal,
    pub position_margin: Decimal,
    pub maint_margin: Decimal,
}

impl Position {
    /// Maintenance margin as a fraction of the posted position margin.
    /// Approaches 1 as the position nears liquidation.
    pub fn margin_ratio(&self) -> Decimal {
        if self.position_margin.is_zero() {
            return Decimal::ZERO;
        }
        self.maint_margin / self.position_margin
    }

    /// True when the mark price has crossed the stop level
    pub fn stop_breached(&self, mark_price: Decimal) -> bool {
        match self.current_stop_loss {
            Some(stop) if self.is_long => mark_price <= stop,
            Some(stop) => mark_price >= stop,
            None => false,
        }
    }
}
