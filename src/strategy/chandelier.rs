use chrono::{DateTime, Utc};

use crate::config::Settings;
use crate::indicators::{ChandelierExit, ChandelierSettings};
use crate::models::{TradingSignal, SignalKind};
use crate::strategy::{ScanContext, Strategy};

/// Chandelier-exit strategy: feeds closed candles into the ratcheted
/// stop-flip state machine and forwards its direction flips.
///
/// The emitted signal carries the protective stop level so the position
/// manager can seed the exchange-side stop order.
pub struct ChandelierStrategy {
    exit: ChandelierExit,
    atr_period: usize,
    last_fed: Option<DateTime<Utc>>,
}

impl ChandelierStrategy {
    pub fn new(settings: &Settings) -> Self {
        let exit = ChandelierExit::new(ChandelierSettings {
            atr_period: settings.atr_period,
            atr_multiplier: settings.atr_multiplier,
            use_close_extremes: settings.use_close_extremes,
            await_bar_confirmation: settings.await_bar_confirmation,
        });
        Self {
            exit,
            atr_period: settings.atr_period,
            last_fed: None,
        }
    }
}

impl Strategy for ChandelierStrategy {
    fn name(&self) -> &str {
        "chandelier_exit"
    }

    fn min_history(&self) -> usize {
        self.atr_period + 1
    }

    fn evaluate(&mut self, ctx: &ScanContext) -> Option<TradingSignal> {
        // Feed only candles newer than what the state machine has seen;
        // the newest flip wins if several arrive in one refresh.
        let mut flip = None;
        for candle in ctx.candles {
            if self.last_fed.is_some_and(|seen| candle.close_time <= seen) {
                continue;
            }
            self.last_fed = Some(candle.close_time);
            self.exit.push(candle.clone());
            if let Some(new_flip) = self.exit.signal(ctx.now) {
                flip = Some(new_flip);
            }
        }

        let flip = flip?;
        tracing::info!(
            "Chandelier {} flip on {} at {} (stop {})",
            match flip.kind {
                SignalKind::Buy => "buy",
                SignalKind::Sell => "sell",
                SignalKind::Exit => "exit",
            },
            ctx.symbol,
            flip.price,
            flip.stop_level
        );

        Some(TradingSignal {
            timestamp: flip.timestamp,
            kind: flip.kind,
            price: flip.price,
            symbol: ctx.symbol.to_string(),
            stop_level: Some(flip.stop_level),
        })
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::models::Candle;
    use crate::strategy::testutil;
    use chrono::Duration;
    use rust_decimal::Decimal;
    use rust_decimal_macros::dec;

    fn settings() -> Settings {
        Settings {
            atr_period: 3,
            atr_multiplier: Decimal::ONE,
            use_close_extremes: true,
            await_bar_confirmation: false,
            ..Default::default()
        }
    }

    fn candles(closes: &[i64]) -> Vec<Candle> {
        let start = Utc::now() - Duration::hours(100);
        closes
            .iter()
            .enumerate()
            .map(|(i, &close)| {
                let close = Decimal::from(close);
                Candle::new(
                    start + Duration::hours(i as i64),
                    start + Duration::hours(i as i64 + 1),
                    close,
                    close + dec!(1),
                    close - dec!(1),
                    close,
                    dec!(1000),
                )
            })
            .collect()
    }

    #[test]
    fn test_crash_flip_emits_sell_with_stop() {
        let mut strategy = ChandelierStrategy::new(&settings());
        let window = candles(&[100, 101, 102, 103, 104, 105, 95, 94]);
        let depth = testutil::depth(dec!(94), dec!(94.2));

        let signal = strategy.evaluate(&testutil::context(&window, &depth)).unwrap();
        assert_eq!(signal.kind, SignalKind::Sell);
        assert!(signal.stop_level.is_some());
    }

    #[test]
    fn test_candles_are_not_fed_twice() {
        let mut strategy = ChandelierStrategy::new(&settings());
        let window = candles(&[100, 101, 102, 103, 104, 105, 95, 94]);
        let depth = testutil::depth(dec!(94), dec!(94.2));

        assert!(strategy.evaluate(&testutil::context(&window, &depth)).is_some());
        // Same window again: nothing new to process, no duplicate signal
        assert!(strategy.evaluate(&testutil::context(&window, &depth)).is_none());
    }

    #[test]
    fn test_steady_trend_never_flips() {
        let mut strategy = ChandelierStrategy::new(&settings());
        let window = candles(&[100, 101, 102, 103, 104, 105, 106, 107]);
        let depth = testutil::depth(dec!(107), dec!(107.2));

        assert!(strategy.evaluate(&testutil::context(&window, &depth)).is_none());
    }
}
