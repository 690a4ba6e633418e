use rust_decimal::Decimal;

/// Calculate Relative Strength Index (RSI) with Wilder's smoothing
///
/// Seed averages come from the first `period` deltas; subsequent values
/// use `avg = (avg * (period - 1) + current) / period` applied to gains
/// and losses separately. All losses zero yields 100.
pub fn calculate_rsi(prices: &[Decimal], period: usize) -> Option<Decimal> {
    rsi_series(prices, period).last().copied().flatten()
}

/// RSI aligned with the input: `None` until `period` deltas exist
pub fn rsi_series(prices: &[Decimal], period: usize) -> Vec<Option<Decimal>> {
    let mut series = vec![None; prices.len()];
    if period == 0 || prices.len() < period + 1 {
        return series;
    }

    let hundred = Decimal::from(100);
    let p = Decimal::from(period);
    let p_minus_one = Decimal::from(period - 1);

    let mut avg_gain = Decimal::ZERO;
    let mut avg_loss = Decimal::ZERO;
    for i in 1..=period {
        let change = prices[i] - prices[i - 1];
        if change >= Decimal::ZERO {
            avg_gain += change;
        } else {
            avg_loss -= change;
        }
    }
    avg_gain /= p;
    avg_loss /= p;

    series[period] = Some(rsi_from_averages(avg_gain, avg_loss, hundred));

    for i in (period + 1)..prices.len() {
        let change = prices[i] - prices[i - 1];
        let gain = change.max(Decimal::ZERO);
        let loss = (-change).max(Decimal::ZERO);

        avg_gain = (avg_gain * p_minus_one + gain) / p;
        avg_loss = (avg_loss * p_minus_one + loss) / p;

        series[i] = Some(rsi_from_averages(avg_gain, avg_loss, hundred));
    }

    series
}

fn rsi_from_averages(avg_gain: Decimal, avg_loss: Decimal, hundred: Decimal) -> Decimal {
    if avg_loss.is_zero() {
        return hundred;
    }
    let rs = avg_gain / avg_loss;
    hundred - hundred / (Decimal::ONE + rs)
}

#[cfg(test)]
mod tests {
    use super::*;
    use rust_decimal_macros::dec;

    #[test]
    fn test_rsi_stays_in_bounds() {
        let prices = vec![
            dec!(44.0), dec!(44.25), dec!(44.5), dec!(43.75), dec!(44.0),
            dec!(44.5), dec!(45.0), dec!(45.5), dec!(45.25), dec!(45.5),
            dec!(46.0), dec!(46.5), dec!(46.25), dec!(46.0), dec!(46.5),
        ];
        let rsi = calculate_rsi(&prices, 14).unwrap();
        assert!(rsi > Decimal::ZERO && rsi < dec!(100));
    }

    #[test]
    fn test_rsi_all_gains_is_100() {
        let prices: Vec<Decimal> = (0..12).map(|i| Decimal::from(100 + i)).collect();
        assert_eq!(calculate_rsi(&prices, 5), Some(dec!(100)));
    }

    #[test]
    fn test_rsi_all_losses_is_0() {
        let prices: Vec<Decimal> = (0..12).map(|i| Decimal::from(200 - i)).collect();
        assert_eq!(calculate_rsi(&prices, 5), Some(dec!(0)));
    }

    #[test]
    fn test_rsi_insufficient_data() {
        let prices = vec![dec!(100), dec!(102), dec!(101)];
        assert!(calculate_rsi(&prices, 14).is_none());
    }

    #[test]
    fn test_rsi_series_starts_at_period_index() {
        let prices: Vec<Decimal> = (0..10).map(Decimal::from).collect();
        let series = rsi_series(&prices, 5);
        assert!(series[4].is_none());
        assert!(series[5].is_some());
        assert_eq!(series.last().copied().flatten(), calculate_rsi(&prices, 5));
    }
}
