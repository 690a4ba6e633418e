use rust_decimal::Decimal;

/// Stochastic oscillator %K/%D over a plain price series.
///
/// Raw %K = (last - lowest(k)) / (highest(k) - lowest(k)) * 100, with a
/// zero-range window defaulting to the neutral 50. `slowing > 1`
/// averages that many consecutive raw %K samples; %D is the simple
/// average of `d_period` raw %K samples.
pub fn calculate_stochastic(
    prices: &[Decimal],
    k_period: usize,
    d_period: usize,
    slowing: usize,
) -> Option<(Decimal, Decimal)> {
    if k_period == 0 || prices.len() < k_period.max(d_period) {
        return None;
    }

    let mut k = raw_k(prices, k_period, 0)?;

    if slowing > 1 && prices.len() >= k_period + slowing - 1 {
        let mut sum = Decimal::ZERO;
        for offset in 0..slowing {
            sum += raw_k(prices, k_period, offset)?;
        }
        k = sum / Decimal::from(slowing);
    }

    let mut d = Decimal::from(50);
    if prices.len() >= k_period + d_period {
        let mut sum = Decimal::ZERO;
        for offset in 0..d_period {
            sum += raw_k(prices, k_period, offset)?;
        }
        d = sum / Decimal::from(d_period);
    }

    Some((k, d))
}

/// Raw %K for the window ending `offset` samples before the latest
fn raw_k(prices: &[Decimal], k_period: usize, offset: usize) -> Option<Decimal> {
    let end = prices.len().checked_sub(offset)?;
    let start = end.checked_sub(k_period)?;
    let window = &prices[start..end];

    let high = window.iter().copied().max()?;
    let low = window.iter().copied().min()?;
    let current = *window.last()?;

    if high == low {
        return Some(Decimal::from(50));
    }

    Some((current - low) / (high - low) * Decimal::from(100))
}

#[cfg(test)]
mod tests {
    use super::*;
    use rust_decimal_macros::dec;

    #[test]
    fn test_k_is_100_at_window_high() {
        let prices = vec![dec!(10), dec!(11), dec!(12), dec!(13), dec!(14)];
        let (k, _) = calculate_stochastic(&prices, 5, 3, 1).unwrap();
        assert_eq!(k, dec!(100));
    }

    #[test]
    fn test_k_is_0_at_window_low() {
        let prices = vec![dec!(14), dec!(13), dec!(12), dec!(11), dec!(10)];
        let (k, _) = calculate_stochastic(&prices, 5, 3, 1).unwrap();
        assert_eq!(k, dec!(0));
    }

    #[test]
    fn test_zero_range_defaults_to_neutral() {
        let prices = vec![dec!(10); 8];
        let (k, d) = calculate_stochastic(&prices, 5, 3, 1).unwrap();
        assert_eq!(k, dec!(50));
        assert_eq!(d, dec!(50));
    }

    #[test]
    fn test_slowing_smooths_k() {
        // Spike on the last sample: raw %K is 100, the slowed value
        // averages in the two earlier flat windows.
        let mut prices = vec![dec!(10); 10];
        prices.push(dec!(20));

        let (raw, _) = calculate_stochastic(&prices, 5, 3, 1).unwrap();
        let (slowed, _) = calculate_stochastic(&prices, 5, 3, 3).unwrap();
        assert_eq!(raw, dec!(100));
        assert!(slowed < raw);
    }

    #[test]
    fn test_insufficient_data() {
        let prices = vec![dec!(10), dec!(11)];
        assert!(calculate_stochastic(&prices, 5, 3, 3).is_none());
    }
}
