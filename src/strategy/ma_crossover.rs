use crate::config::Settings;
use crate::indicators::calculate_sma;
use crate::models::{SignalKind, TradingSignal};
use crate::strategy::{PriceHistory, ScanContext, Strategy};

/// Fast/slow simple moving average crossover on the tick-price history
pub struct MaCrossoverStrategy {
    fast_period: usize,
    slow_period: usize,
    history: PriceHistory,
}

impl MaCrossoverStrategy {
    pub fn new(settings: &Settings) -> Self {
        Self {
            fast_period: settings.fast_ma_period,
            slow_period: settings.slow_ma_period,
            history: PriceHistory::new(100usize.max(settings.slow_ma_period * 2)),
        }
    }

    fn crossover(&self) -> Option<SignalKind> {
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
            tracing::info!("MA buy: fast({}) crossed above slow({})", fast, slow);
            return Some(SignalKind::Buy);
        }
        if prev_fast >= prev_slow && fast < slow {
            tracing::info!("MA sell: fast({}) crossed below slow({})", fast, slow);
            return Some(SignalKind::Sell);
        }
        None
    }
}

impl Strategy for MaCrossoverStrategy {
    fn name(&self) -> &str {
        "ma_crossover"
    }

    fn min_history(&self) -> usize {
        self.slow_period + 1
    }

    fn evaluate(&mut self, ctx: &ScanContext) -> Option<TradingSignal> {
        self.history.push(ctx.depth.vwap);

        match self.crossover()? {
            SignalKind::Buy => Some(TradingSignal {
                timestamp: ctx.now,
                kind: SignalKind::Buy,
                price: ctx.depth.ask,
                symbol: ctx.symbol.to_string(),
                stop_level: None,
            }),
            SignalKind::Sell => Some(TradingSignal {
                timestamp: ctx.now,
                kind: SignalKind::Sell,
                price: ctx.depth.bid,
                symbol: ctx.symbol.to_string(),
                stop_level: None,
            }),
            SignalKind::Exit => None,
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::strategy::testutil;
    use rust_decimal::Decimal;
    use rust_decimal_macros::dec;

    fn strategy() -> MaCrossoverStrategy {
        MaCrossoverStrategy::new(&Settings {
            fast_ma_period: 2,
            slow_ma_period: 3,
            ..Default::default()
        })
    }

    fn drive(strategy: &mut MaCrossoverStrategy, vwaps: &[Decimal]) -> Option<TradingSignal> {
        let mut last = None;
        for &vwap in vwaps {
            let depth = testutil::depth(vwap - dec!(0.05), vwap + dec!(0.05));
            let candles = Vec::new();
            last = strategy.evaluate(&testutil::context(&candles, &depth));
        }
        last
    }

    #[test]
    fn test_golden_cross_buys() {
        let mut strategy = strategy();
        let signal = drive(&mut strategy, &[dec!(10), dec!(10), dec!(10), dec!(16)]).unwrap();
        assert_eq!(signal.kind, SignalKind::Buy);
    }

    #[test]
    fn test_death_cross_sells() {
        let mut strategy = strategy();
        let signal = drive(&mut strategy, &[dec!(10), dec!(10), dec!(10), dec!(4)]).unwrap();
        assert_eq!(signal.kind, SignalKind::Sell);
    }

    #[test]
    fn test_no_repeat_signal_while_spread_apart() {
        let mut strategy = strategy();
        // Cross once, then keep trending: the second tick must be silent
        drive(&mut strategy, &[dec!(10), dec!(10), dec!(10), dec!(16)]);
        let repeat = drive(&mut strategy, &[dec!(17)]);
        assert!(repeat.is_none());
    }

    #[test]
    fn test_insufficient_history_is_silent() {
        let mut strategy = strategy();
        assert!(drive(&mut strategy, &[dec!(10), dec!(10), dec!(10)]).is_none());
    }
}
