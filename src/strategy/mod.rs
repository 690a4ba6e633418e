// Trading strategy module
pub mod chandelier;
pub mod combined;
pub mod ma_crossover;
pub mod scalping;
pub mod stochastic;
pub mod trend_follow;

use chrono::{DateTime, Utc};
use rust_decimal::Decimal;

use crate::config::{Settings, StrategyKind};
use crate::models::{Candle, DepthSnapshot, TradingSignal};

/// Everything a strategy sees for one (symbol, exchange) scan tick
pub struct ScanContext<'a> {
    pub symbol: &'a str,
    pub exchange: &'a str,
    /// Annotated candle window, oldest first
    pub candles: &'a [Candle],
    pub depth: &'a DepthSnapshot,
    /// Price of the pair's last filled buy order, if any
    pub last_buy_price: Option<Decimal>,
    /// Price of the pair's last filled sell order, if any
    pub last_sell_price: Option<Decimal>,
    pub now: DateTime<Utc>,
}

/// Base trait for all trading strategies
///
/// A strategy emits at most one signal per scan tick; the order
/// lifecycle manager consumes it exactly once.
pub trait Strategy: Send {
    /// Strategy name for logging
    fn name(&self) -> &str;

    /// Minimum candle window before evaluation makes sense
    fn min_history(&self) -> usize;

    /// Inspect the current market view and maybe emit a signal
    fn evaluate(&mut self, ctx: &ScanContext) -> Option<TradingSignal>;
}

/// The single dispatch point from configuration to implementation
pub fn build_strategy(kind: StrategyKind, settings: &Settings) -> Box<dyn Strategy> {
    match kind {
        StrategyKind::TrendFollow => Box::new(trend_follow::TrendFollowStrategy::new(settings)),
        StrategyKind::Scalping => Box::new(scalping::ScalpingStrategy::new(settings)),
        StrategyKind::Stochastic => Box::new(stochastic::StochasticStrategy::new(settings)),
        StrategyKind::MaCrossover => Box::new(ma_crossover::MaCrossoverStrategy::new(settings)),
        StrategyKind::Combined => Box::new(combined::CombinedStrategy::new(settings)),
        StrategyKind::ChandelierExit => Box::new(chandelier::ChandelierStrategy::new(settings)),
    }
}

/// Rolling tick-price history for strategies that work off the order
/// book rather than candle closes
pub(crate) struct PriceHistory {
    prices: Vec<Decimal>,
    cap: usize,
}

impl PriceHistory {
    pub fn new(cap: usize) -> Self {
        Self {
            prices: Vec::new(),
            cap,
        }
    }

    pub fn push(&mut self, price: Decimal) {
        self.prices.push(price);
        if self.prices.len() > self.cap {
            let excess = self.prices.len() - self.cap;
            self.prices.drain(..excess);
        }
    }

    pub fn as_slice(&self) -> &[Decimal] {
        &self.prices
    }

    pub fn len(&self) -> usize {
        self.prices.len()
    }
}
