use rust_decimal::Decimal;

use crate::config::Settings;
use crate::indicators::{calculate_sma, calculate_stochastic};
use crate::models::{SignalKind, TradingSignal};
use crate::strategy::{PriceHistory, ScanContext, Strategy};

/// Moving-average crossover AND stochastic crossover, in agreement.
///
/// Both indicator families run over the same tick-price history; a
/// signal fires only when they flip the same way on the same tick.
pub struct CombinedStrategy {
    fast_period: usize,
    slow_period: usize,
    k_period: usize,
    d_period: usize,
    slowing: usize,
    history: PriceHistory,
}

impl CombinedStrategy {
    pub fn new(settings: &Settings) -> Self {
        let cap = 100usize.max(settings.slow_ma_period.max(settings.stochastic_k_period) * 2);
        Self {
            fast_period: settings.fast_ma_period,
            slow_period: settings.slow_ma_period,
            k_period: settings.stochastic_k_period,
            d_period: settings.stochastic_d_period,
            slowing: settings.stochastic_slowing,
            history: PriceHistory::new(cap),
        }
    }

    fn ma_signal(&self) -> Option<SignalKind> {
        let prices = self.history.as_slice();
        if prices.len() < self.slow_period + 1 {
            return None;
        }

        let fast = calculate_sma(prices, self.fast_period)?;
        let slow = calculate_sma(prices, self.slow_period)?;
        let previous = &prices[..prices.len() - 1];
        let prev_fast = calculate_sma(previous, self.fast_period)?;
        let prev_slow = calculate_sma(previous, self.slow_period)?;

        if prev_fast <= prev_slow && fast > slow {
            Some(SignalKind::Buy)
        } else if prev_fast >= prev_slow && fast < slow {
            Some(SignalKind::Sell)
        } else {
            None
        }
    }

    fn stochastic_signal(&self) -> Option<SignalKind> {
        let prices = self.history.as_slice();
        if prices.len() < 2 {
            return None;
        }

        let (k, d) = calculate_stochastic(prices, self.k_period, self.d_period, self.slowing)?;
        let (prev_k, prev_d) = calculate_stochastic(
            &prices[..prices.len() - 1],
            self.k_period,
            self.d_period,
            self.slowing,
        )?;

        let oversold = Decimal::from(20);
        let overbought = Decimal::from(80);

        if k < oversold && d < oversold && prev_k < prev_d && k > d {
            Some(SignalKind::Buy)
        } else if k > overbought && d > overbought && prev_k > prev_d && k < d {
            Some(SignalKind::Sell)
        } else {
            None
        }
    }
}

impl Strategy for CombinedStrategy {
    fn name(&self) -> &str {
        "combined"
    }

    fn min_history(&self) -> usize {
        (self.slow_period + 1).max(self.k_period + self.d_period)
    }

    fn evaluate(&mut self, ctx: &ScanContext) -> Option<TradingSignal> {
        self.history.push(ctx.depth.vwap);

        let ma = self.ma_signal();
        let stochastic = self.stochastic_signal();

        match (ma, stochastic) {
            (Some(SignalKind::Buy), Some(SignalKind::Buy)) => {
                tracing::info!("Combined buy on {}: MA and stochastic aligned", ctx.symbol);
                Some(TradingSignal {
                    timestamp: ctx.now,
                    kind: SignalKind::Buy,
                    price: ctx.depth.ask,
                    symbol: ctx.symbol.to_string(),
                    stop_level: None,
                })
            }
            (Some(SignalKind::Sell), Some(SignalKind::Sell)) => {
                tracing::info!("Combined sell on {}: MA and stochastic aligned", ctx.symbol);
                Some(TradingSignal {
                    timestamp: ctx.now,
                    kind: SignalKind::Sell,
                    price: ctx.depth.bid,
                    symbol: ctx.symbol.to_string(),
                    stop_level: None,
                })
            }
            _ => None,
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::strategy::testutil;
    use rust_decimal_macros::dec;

    fn strategy() -> CombinedStrategy {
        CombinedStrategy::new(&Settings {
            fast_ma_period: 2,
            slow_ma_period: 3,
            stochastic_k_period: 3,
            stochastic_d_period: 2,
            stochastic_slowing: 1,
            ..Default::default()
        })
    }

    fn drive(strategy: &mut CombinedStrategy, vwaps: &[Decimal]) -> Option<TradingSignal> {
        let mut last = None;
        for &vwap in vwaps {
            let depth = testutil::depth(vwap - dec!(0.05), vwap + dec!(0.05));
            let candles = Vec::new();
            last = strategy.evaluate(&testutil::context(&candles, &depth));
        }
        last
    }

    #[test]
    fn test_agreement_buys() {
        // Decline into the oversold band, then a pop that golden-crosses
        // the MAs while %K crosses back above %D
        let mut strategy = strategy();
        let signal = drive(
            &mut strategy,
            &[dec!(100), dec!(90), dec!(80), dec!(80.5), dec!(80.05)],
        )
        .unwrap();
        assert_eq!(signal.kind, SignalKind::Buy);
    }

    #[test]
    fn test_stochastic_alone_is_not_enough() {
        // Fires the stochastic oversold crossover without an MA cross
        let mut strategy = strategy();
        let signal = drive(
            &mut strategy,
            &[dec!(100), dec!(80), dec!(82), dec!(80.1), dec!(80.385)],
        );
        assert!(signal.is_none());
    }

    #[test]
    fn test_ma_alone_is_not_enough() {
        // Clean golden cross but %K nowhere near the oversold band
        let mut strategy = strategy();
        let signal = drive(&mut strategy, &[dec!(10), dec!(10), dec!(10), dec!(16)]);
        assert!(signal.is_none());
    }
}
