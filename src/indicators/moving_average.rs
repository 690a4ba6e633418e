use rust_decimal::Decimal;

/// Calculate Simple Moving Average (SMA) over the most recent `period` values
pub fn calculate_sma(prices: &[Decimal], period: usize) -> Option<Decimal> {
    if period == 0 || prices.len() < period {
        return None;
    }

    let sum: Decimal = prices.iter().rev().take(period).sum();
    Some(sum / Decimal::from(period))
}

/// Calculate Exponential Moving Average (EMA)
///
/// Seeded with the SMA of the first `period` values, then
/// `ema = (price - ema) * k + ema` with `k = 2 / (period + 1)`.
pub fn calculate_ema(prices: &[Decimal], period: usize) -> Option<Decimal> {
    ema_series(prices, period).last().copied().flatten()
}

/// SMA aligned with the input: `None` until a full window exists
pub fn sma_series(prices: &[Decimal], period: usize) -> Vec<Option<Decimal>> {
    let mut series = vec![None; prices.len()];
    if period == 0 || prices.len() < period {
        return series;
    }

    for i in (period - 1)..prices.len() {
        let window: Decimal = prices[i + 1 - period..=i].iter().sum();
        series[i] = Some(window / Decimal::from(period));
    }
    series
}

/// EMA aligned with the input: `None` before the seed index
pub fn ema_series(prices: &[Decimal], period: usize) -> Vec<Option<Decimal>> {
    let mut series = vec![None; prices.len()];
    if period == 0 || prices.len() < period {
        return series;
    }

    let k = Decimal::from(2) / Decimal::from(period + 1);
    let seed: Decimal = prices[..period].iter().sum::<Decimal>() / Decimal::from(period);

    let mut ema = seed;
    series[period - 1] = Some(ema);
    for i in period..prices.len() {
        ema = (prices[i] - ema) * k + ema;
        series[i] = Some(ema);
    }
    series
}
