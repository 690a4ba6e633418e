use rust_decimal::Decimal;

use crate::indicators::moving_average::ema_series;

/// MACD line, signal line and histogram, aligned with the input.
///
/// `macd = EMA(short) - EMA(long)`; the signal line is an EMA of the
/// macd values themselves (SMA-seeded like every other EMA here);
/// histogram is their difference.
pub struct MacdSeries {
    pub macd: Vec<Option<Decimal>>,
    pub signal: Vec<Option<Decimal>>,
    pub histogram: Vec<Option<Decimal>>,
}

pub fn macd_series(
    prices: &[Decimal],
    short_period: usize,
    long_period: usize,
    signal_period: usize,
) -> MacdSeries {
    let len = prices.len();
    let short_ema = ema_series(prices, short_period);
    let long_ema = ema_series(prices, long_period);

    let mut macd = vec![None; len];
    for i in 0..len {
        if let (Some(short), Some(long)) = (short_ema[i], long_ema[i]) {
            macd[i] = Some(short - long);
        }
    }

    // Run the signal EMA over the contiguous tail of defined macd values
    let first_defined = macd.iter().position(|v| v.is_some());
    let mut signal = vec![None; len];
    if let Some(start) = first_defined {
        let tail: Vec<Decimal> = macd[start..].iter().map(|v| v.unwrap()).collect();
        for (offset, value) in ema_series(&tail, signal_period).into_iter().enumerate() {
            signal[start + offset] = value;
        }
    }

    let mut histogram = vec![None; len];
    for i in 0..len {
        if let (Some(m), Some(s)) = (macd[i], signal[i]) {
            histogram[i] = Some(m - s);
        }
    }

    MacdSeries {
        macd,
        signal,
        histogram,
    }
}

/// Latest (macd, signal, histogram), if the window is long enough
pub fn calculate_macd(
    prices: &[Decimal],
    short_period: usize,
    long_period: usize,
    signal_period: usize,
) -> Option<(Decimal, Decimal, Decimal)> {
    let series = macd_series(prices, short_period, long_period, signal_period);
    match (
        series.macd.last().copied().flatten(),
        series.signal.last().copied().flatten(),
        series.histogram.last().copied().flatten(),
    ) {
        (Some(m), Some(s), Some(h)) => Some((m, s, h)),
        _ => None,
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use rust_decimal_macros::dec;

    #[test]
    fn test_macd_flat_series_is_zero() {
        let prices = vec![dec!(50); 60];
        let (macd, signal, histogram) = calculate_macd(&prices, 12, 26, 9).unwrap();
        assert_eq!(macd, Decimal::ZERO);
        assert_eq!(signal, Decimal::ZERO);
        assert_eq!(histogram, Decimal::ZERO);
    }

    #[test]
    fn test_macd_positive_in_uptrend() {
        let prices: Vec<Decimal> = (0..60).map(|i| Decimal::from(100 + i)).collect();
        let (macd, _, _) = calculate_macd(&prices, 12, 26, 9).unwrap();
        assert!(macd > Decimal::ZERO);
    }

    #[test]
    fn test_macd_negative_in_downtrend() {
        let prices: Vec<Decimal> = (0..60).map(|i| Decimal::from(300 - i)).collect();
        let (macd, _, _) = calculate_macd(&prices, 12, 26, 9).unwrap();
        assert!(macd < Decimal::ZERO);
    }

    #[test]
    fn test_macd_insufficient_data() {
        let prices: Vec<Decimal> = (0..20).map(Decimal::from).collect();
        assert!(calculate_macd(&prices, 12, 26, 9).is_none());
    }

    #[test]
    fn test_macd_alignment() {
        let prices: Vec<Decimal> = (0..60).map(|i| Decimal::from(100 + i % 7)).collect();
        let series = macd_series(&prices, 12, 26, 9);
        // macd defined from the long EMA seed onward
        assert!(series.macd[24].is_none());
        assert!(series.macd[25].is_some());
        // signal needs `signal_period` macd samples on top of that
        assert!(series.signal[32].is_none());
        assert!(series.signal[33].is_some());
        assert_eq!(series.macd.len(), prices.len());
    }
}
