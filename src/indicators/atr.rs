use rust_decimal::Decimal;

use crate::models::Candle;

/// True range of one bar against the previous close
pub fn true_range(current: &Candle, previous: &Candle) -> Decimal {
    let high_low = current.high - current.low;
    let high_close = (current.high - previous.close).abs();
    let low_close = (current.low - previous.close).abs();
    high_low.max(high_close).max(low_close)
}

/// Average True Range: simple moving average of the true range over the
/// most recent `period` bars
pub fn calculate_atr(candles: &[Candle], period: usize) -> Option<Decimal> {
    if period == 0 || candles.len() < period + 1 {
        return None;
    }

    let mut true_ranges = Vec::with_capacity(candles.len() - 1);
    for i in 1..candles.len() {
        true_ranges.push(true_range(&candles[i], &candles[i - 1]));
    }

    let recent: Decimal = true_ranges.iter().rev().take(period).sum();
    Some(recent / Decimal::from(period))
}

#[cfg(test)]
mod tests {
    use super::*;
    use chrono::{Duration, Utc};
    use rust_decimal_macros::dec;

    fn candles_from(bars: &[(Decimal, Decimal, Decimal, Decimal)]) -> Vec<Candle> {
        let start = Utc::now();
        bars.iter()
            .enumerate()
            .map(|(i, &(open, high, low, close))| {
                Candle::new(
                    start + Duration::hours(i as i64),
                    start + Duration::hours(i as i64 + 1),
                    open,
                    high,
                    low,
                    close,
                    dec!(1000),
                )
            })
            .collect()
    }

    #[test]
    fn test_atr_of_constant_range() {
        let bars = vec![(dec!(100), dec!(101), dec!(99), dec!(100)); 10];
        let candles = candles_from(&bars);
        assert_eq!(calculate_atr(&candles, 5), Some(dec!(2)));
    }

    #[test]
    fn test_true_range_uses_gap_from_previous_close() {
        let candles = candles_from(&[
            (dec!(100), dec!(101), dec!(99), dec!(100)),
            // Gapped open: range vs previous close dominates
            (dec!(110), dec!(111), dec!(109), dec!(110)),
        ]);
        assert_eq!(true_range(&candles[1], &candles[0]), dec!(11));
    }

    #[test]
    fn test_atr_insufficient_data() {
        let bars = vec![(dec!(100), dec!(101), dec!(99), dec!(100)); 5];
        let candles = candles_from(&bars);
        assert!(calculate_atr(&candles, 5).is_none());
        assert!(calculate_atr(&candles, 0).is_none());
    }
}
