// Technical indicator module
pub mod atr;
pub mod chandelier;
pub mod macd;
pub mod moving_average;
pub mod rsi;
pub mod stochastic;

pub use atr::calculate_atr;
pub use chandelier::{ChandelierExit, ChandelierFlip, ChandelierSettings};
pub use macd::calculate_macd;
pub use moving_average::{calculate_ema, calculate_sma};
pub use rsi::calculate_rsi;
pub use stochastic::calculate_stochastic;

use rust_decimal::Decimal;

use crate::config::Settings;
use crate::models::Candle;

/// Periods used when annotating a candle window
#[derive(Debug, Clone)]
pub struct IndicatorConfig {
    pub sma_period: usize,
    pub ema_fast_period: usize,
    pub ema_slow_period: usize,
    pub rsi_period: usize,
    pub macd_short_period: usize,
    pub macd_long_period: usize,
    pub macd_signal_period: usize,
}

impl From<&Settings> for IndicatorConfig {
    fn from(settings: &Settings) -> Self {
        Self {
            sma_period: settings.sma_period,
            ema_fast_period: settings.ema_period,
            ema_slow_period: settings.long_ema_period,
            rsi_period: settings.rsi_period,
            macd_short_period: settings.macd_short_period,
            macd_long_period: settings.macd_long_period,
            macd_signal_period: settings.macd_signal_period,
        }
    }
}

/// Fill the derived fields of a candle window in one pass.
///
/// Each series is aligned with the candles; early candles keep `None`
/// until their window fills.
pub fn annotate(candles: &mut [Candle], config: &IndicatorConfig) {
    let closes: Vec<Decimal> = candles.iter().map(|c| c.close).collect();

    let sma = moving_average::sma_series(&closes, config.sma_period);
    let ema_fast = moving_average::ema_series(&closes, config.ema_fast_period);
    let ema_slow = moving_average::ema_series(&closes, config.ema_slow_period);
    let rsi = rsi::rsi_series(&closes, config.rsi_period);
    let macd = macd::macd_series(
        &closes,
        config.macd_short_period,
        config.macd_long_period,
        config.macd_signal_period,
    );

    for (i, candle) in candles.iter_mut().enumerate() {
        candle.sma = sma[i];
        candle.ema_fast = ema_fast[i];
        candle.ema_slow = ema_slow[i];
        candle.rsi = rsi[i];
        candle.macd = macd.macd[i];
        candle.macd_signal = macd.signal[i];
        candle.macd_histogram = macd.histogram[i];
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use chrono::{Duration, Utc};
    use rust_decimal_macros::dec;

    fn window(closes: &[i64]) -> Vec<Candle> {
        let start = Utc::now() - Duration::hours(200);
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
    fn test_annotate_fills_all_columns() {
        let closes: Vec<i64> = (0..60).map(|i| 100 + i % 5).collect();
        let mut candles = window(&closes);

        let config = IndicatorConfig::from(&Settings::default());
        annotate(&mut candles, &config);

        let last = candles.last().unwrap();
        assert!(last.sma.is_some());
        assert!(last.ema_fast.is_some());
        assert!(last.ema_slow.is_some());
        assert!(last.rsi.is_some());
        assert!(last.macd.is_some());
        assert!(last.macd_signal.is_some());
        assert!(last.macd_histogram.is_some());

        // Early candles have no full window yet
        assert!(candles[0].sma.is_none());
        assert!(candles[0].rsi.is_none());
    }

    #[test]
    fn test_annotate_histogram_consistency() {
        let closes: Vec<i64> = (0..60).map(|i| 100 + i).collect();
        let mut candles = window(&closes);
        annotate(&mut candles, &IndicatorConfig::from(&Settings::default()));

        let last = candles.last().unwrap();
        assert_eq!(
            last.macd_histogram.unwrap(),
            last.macd.unwrap() - last.macd_signal.unwrap()
        );
    }
}
