use rust_decimal::Decimal;

use crate::config::Settings;
use crate::indicators::calculate_stochastic;
use crate::models::{SignalKind, TradingSignal};
use crate::strategy::{PriceHistory, ScanContext, Strategy};

/// Stochastic %K/%D crossover on the tick-price history.
///
/// Buys when %K crosses above %D with both in the oversold band (< 20),
/// sells when %K crosses below %D with both overbought (> 80). The
/// "previous" pair comes from the same history minus its newest sample.
pub struct StochasticStrategy {
    k_period: usize,
    d_period: usize,
    slowing: usize,
    history: PriceHistory,
}

impl StochasticStrategy {
    pub fn new(settings: &Settings) -> Self {
        let cap = 100usize.max(settings.stochastic_k_period * 2 + settings.stochastic_slowing);
        Self {
            k_period: settings.stochastic_k_period,
            d_period: settings.stochastic_d_period,
            slowing: settings.stochastic_slowing,
            history: PriceHistory::new(cap),
        }
    }

    fn crossover(&self) -> Option<SignalKind> {
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
            tracing::info!(
                "Stochastic buy: K({}) crossed above D({}) in oversold region",
                k,
                d
            );
            return Some(SignalKind::Buy);
        }
        if k > overbought && d > overbought && prev_k > prev_d && k < d {
            tracing::info!(
                "Stochastic sell: K({}) crossed below D({}) in overbought region",
                k,
                d
            );
            return Some(SignalKind::Sell);
        }
        None
    }
}

impl Strategy for StochasticStrategy {
    fn name(&self) -> &str {
        "stochastic"
    }

    fn min_history(&self) -> usize {
        self.k_period + self.d_period
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
    use rust_decimal_macros::dec;

    fn strategy() -> StochasticStrategy {
        StochasticStrategy::new(&Settings {
            stochastic_k_period: 3,
            stochastic_d_period: 2,
            stochastic_slowing: 1,
            ..Default::default()
        })
    }

    fn drive(strategy: &mut StochasticStrategy, vwaps: &[Decimal]) -> Option<TradingSignal> {
        let mut last = None;
        for &vwap in vwaps {
            let depth = testutil::depth(vwap - dec!(0.05), vwap + dec!(0.05));
            // testutil keeps vwap at the mid
            let candles = Vec::new();
            last = strategy.evaluate(&testutil::context(&candles, &depth));
        }
        last
    }

    #[test]
    fn test_oversold_crossover_buys() {
        // Raw %K walks 10 -> 5 -> 15 deep in the oversold band: the dip
        // and recovery crosses %K back above %D
        let mut strategy = strategy();
        let signal = drive(
            &mut strategy,
            &[dec!(100), dec!(80), dec!(82), dec!(80.1), dec!(80.385)],
        )
        .unwrap();
        assert_eq!(signal.kind, SignalKind::Buy);
    }

    #[test]
    fn test_overbought_crossover_sells() {
        // Mirror image at the top of the band: %K 90 -> 95 -> 85
        let mut strategy = strategy();
        let signal = drive(
            &mut strategy,
            &[dec!(60), dec!(80), dec!(78), dec!(79.9), dec!(79.615)],
        )
        .unwrap();
        assert_eq!(signal.kind, SignalKind::Sell);
    }

    #[test]
    fn test_flat_band_is_silent() {
        let mut strategy = strategy();
        let flat = vec![dec!(100); 20];
        assert!(drive(&mut strategy, &flat).is_none());
    }

    #[test]
    fn test_crossover_outside_bands_is_ignored() {
        // Same dip/recovery shape but mid-band (%K around 40-67)
        let mut strategy = strategy();
        let signal = drive(
            &mut strategy,
            &[dec!(100), dec!(60), dec!(65), dec!(62), dec!(64)],
        );
        assert!(signal.is_none());
    }
}
