use chrono::{DateTime, Utc};
use rust_decimal::Decimal;

use crate::indicators::atr::calculate_atr;
use crate::models::{Candle, SignalKind};

#[derive(Debug, Clone)]
pub struct ChandelierSettings {
    pub atr_period: usize,
    pub atr_multiplier: Decimal,
    /// Extremes from closes instead of highs/lows
    pub use_close_extremes: bool,
    /// Suppress signals from a candle that has not closed yet
    pub await_bar_confirmation: bool,
}

impl Default for ChandelierSettings {
    fn default() -> Self {
        Self {
            atr_period: 22,
            atr_multiplier: Decimal::from(3),
            use_close_extremes: true,
            await_bar_confirmation: true,
        }
    }
}

/// A flipped direction with its protective stop level
#[derive(Debug, Clone, PartialEq)]
pub struct ChandelierFlip {
    pub kind: SignalKind,
    pub price: Decimal,
    pub stop_level: Decimal,
    pub timestamp: DateTime<Utc>,
}

/// Chandelier Exit: volatility-trailed stop lines with ratcheting.
///
/// `long_stop = highest(period) - mult * ATR`, `short_stop = lowest(period)
/// + mult * ATR`. While the previous close holds above the previous long
/// stop the long stop never decreases; the short stop mirrors that. A
/// close crossing the opposite stop flips direction and yields exactly
/// one signal per crossing.
pub struct ChandelierExit {
    settings: ChandelierSettings,
    history: Vec<Candle>,
    long_stop: Option<Decimal>,
    short_stop: Option<Decimal>,
    long_stop_prev: Option<Decimal>,
    short_stop_prev: Option<Decimal>,
    direction: i8,
    initialized: bool,
}

impl ChandelierExit {
    pub fn new(settings: ChandelierSettings) -> Self {
        Self {
            settings,
            history: Vec::new(),
            long_stop: None,
            short_stop: None,
            long_stop_prev: None,
            short_stop_prev: None,
            direction: 0,
            initialized: false,
        }
    }

    pub fn update_settings(&mut self, settings: ChandelierSettings) {
        self.settings = settings;
        if self.history.len() >= self.settings.atr_period {
            self.recalculate();
        }
    }

    /// Current (long_stop, short_stop)
    pub fn stops(&self) -> (Option<Decimal>, Option<Decimal>) {
        (self.long_stop, self.short_stop)
    }

    pub fn direction(&self) -> i8 {
        self.direction
    }

    /// Feed the next candle and recompute the stop lines
    pub fn push(&mut self, candle: Candle) {
        self.history.push(candle);

        // Bounded history: three ATR windows is plenty for the extremes
        let max_len = self.settings.atr_period * 3;
        if self.history.len() > max_len {
            let excess = self.history.len() - max_len;
            self.history.drain(..excess);
        }

        if self.history.len() >= self.settings.atr_period {
            self.recalculate();

            if self.direction == 0 {
                if let Some(short_stop) = self.short_stop {
                    let last_close = self.history.last().map(|c| c.close);
                    let long_stop = self.long_stop.unwrap_or(Decimal::MIN);
                    self.direction = match last_close {
                        Some(close) if close > short_stop => 1,
                        Some(close) if close < long_stop => -1,
                        _ => 1,
                    };
                    self.initialized = true;
                }
            }
        }
    }

    /// One signal per direction flip; a still-forming candle (close time
    /// in the future) yields nothing while bar confirmation is on.
    pub fn signal(&mut self, now: DateTime<Utc>) -> Option<ChandelierFlip> {
        if !self.initialized || self.history.len() < self.settings.atr_period + 1 {
            return None;
        }

        let candle = self.history.last()?.clone();
        if self.settings.await_bar_confirmation && candle.close_time > now {
            return None;
        }

        let short_stop_prev = self.short_stop_prev?;
        let long_stop_prev = self.long_stop_prev?;

        let new_direction = if candle.close > short_stop_prev {
            1
        } else if candle.close < long_stop_prev {
            -1
        } else {
            self.direction
        };

        let flipped = match (self.direction, new_direction) {
            (-1, 1) => Some(ChandelierFlip {
                kind: SignalKind::Buy,
                price: candle.close,
                stop_level: self.long_stop?,
                timestamp: candle.close_time,
            }),
            (1, -1) => Some(ChandelierFlip {
                kind: SignalKind::Sell,
                price: candle.close,
                stop_level: self.short_stop?,
                timestamp: candle.close_time,
            }),
            _ => None,
        };

        self.direction = new_direction;
        flipped
    }

    fn recalculate(&mut self) {
        let Some(atr) = calculate_atr(&self.history, self.settings.atr_period) else {
            return;
        };
        let band = atr * self.settings.atr_multiplier;
        if band.is_zero() {
            return;
        }

        let window_start = self.history.len().saturating_sub(self.settings.atr_period);
        let window = &self.history[window_start..];

        let (highest, lowest) = if self.settings.use_close_extremes {
            let highest = window.iter().map(|c| c.close).max().unwrap();
            let lowest = window.iter().map(|c| c.close).min().unwrap();
            (highest, lowest)
        } else {
            let highest = window.iter().map(|c| c.high).max().unwrap();
            let lowest = window.iter().map(|c| c.low).min().unwrap();
            (highest, lowest)
        };

        self.long_stop_prev = Some(self.long_stop.unwrap_or(highest - band));
        self.short_stop_prev = Some(self.short_stop.unwrap_or(lowest + band));

        let mut long_stop = highest - band;
        let mut short_stop = lowest + band;

        // Ratchet: only trail in the trend's favor while the previous
        // close holds the line
        if self.history.len() > 1 {
            let prev_close = self.history[self.history.len() - 2].close;
            if let Some(prev) = self.long_stop_prev {
                if prev_close > prev {
                    long_stop = long_stop.max(prev);
                }
            }
            if let Some(prev) = self.short_stop_prev {
                if prev_close < prev {
                    short_stop = short_stop.min(prev);
                }
            }
        }

        self.long_stop = Some(long_stop);
        self.short_stop = Some(short_stop);
    }
}
