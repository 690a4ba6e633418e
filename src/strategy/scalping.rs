use rust_decimal::Decimal;

use crate::config::Settings;
use crate::models::{SignalKind, TradingSignal};
use crate::strategy::{ScanContext, Strategy};

/// Spread-capture scalping.
///
/// The bid/ask spread must clear the profit threshold plus the full
/// round-trip cost (two fee legs and TDS when enabled), and the maker
/// round trip (enter at the bid, unwind at the ask) simulated on the
/// minimum tradable size must stay profitable after those deductions.
pub struct ScalpingStrategy {
    profit_threshold: Decimal,
    fee_rate: Decimal,
    tds_rate: Decimal,
    apply_tds: bool,
    min_order_value: Decimal,
}

impl ScalpingStrategy {
    pub fn new(settings: &Settings) -> Self {
        Self {
            profit_threshold: settings.profit_threshold,
            fee_rate: settings.trading_fee_rate,
            tds_rate: settings.tds_rate,
            apply_tds: settings.apply_tds_adjustment,
            min_order_value: settings.min_order_value,
        }
    }

    /// Spread the book must pay before a trade is worth entering
    pub fn required_spread(&self) -> Decimal {
        let tds = if self.apply_tds {
            self.tds_rate
        } else {
            Decimal::ZERO
        };
        self.profit_threshold + Decimal::from(2) * self.fee_rate + tds
    }

    /// Net profit of buying the minimum size at the bid and unwinding at
    /// the ask, after both fee legs and TDS on the sell proceeds
    fn net_profit_on_min_size(&self, bid: Decimal, ask: Decimal) -> Decimal {
        let buy_value = self.min_order_value;
        let quantity = buy_value / bid;
        let sell_value = quantity * ask;

        let gross = sell_value - buy_value;
        let fees = (buy_value + sell_value) * self.fee_rate;
        let tds = if self.apply_tds {
            sell_value * self.tds_rate
        } else {
            Decimal::ZERO
        };

        gross - fees - tds
    }
}

impl Strategy for ScalpingStrategy {
    fn name(&self) -> &str {
        "scalping"
    }

    fn min_history(&self) -> usize {
        1
    }

    fn evaluate(&mut self, ctx: &ScanContext) -> Option<TradingSignal> {
        let depth = ctx.depth;
        if depth.bid.is_zero() || depth.ask.is_zero() {
            return None;
        }

        let spread = depth.spread();
        let required = self.required_spread();
        if spread <= required {
            tracing::debug!(
                "{} on {}: spread {} below required {}",
                ctx.symbol,
                ctx.exchange,
                spread,
                required
            );
            return None;
        }

        let net_profit = self.net_profit_on_min_size(depth.bid, depth.ask);
        if net_profit <= Decimal::ZERO {
            return None;
        }

        tracing::info!(
            "Scalping opportunity on {} ({}): spread {}, est. profit {}",
            ctx.symbol,
            ctx.exchange,
            spread,
            net_profit
        );

        Some(TradingSignal {
            timestamp: ctx.now,
            kind: SignalKind::Buy,
            price: depth.bid,
            symbol: ctx.symbol.to_string(),
            stop_level: None,
        })
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::strategy::testutil;
    use rust_decimal_macros::dec;

    fn settings() -> Settings {
        Settings {
            trading_fee_rate: dec!(0.002),
            tds_rate: dec!(0.01),
            apply_tds_adjustment: true,
            profit_threshold: dec!(0.005),
            ..Default::default()
        }
    }

    #[test]
    fn test_required_spread_sums_all_costs() {
        let strategy = ScalpingStrategy::new(&settings());
        // 0.005 + 2*0.002 + 0.01
        assert_eq!(strategy.required_spread(), dec!(0.019));

        let without_tds = ScalpingStrategy::new(&Settings {
            apply_tds_adjustment: false,
            ..settings()
        });
        assert_eq!(without_tds.required_spread(), dec!(0.009));
    }

    #[test]
    fn test_thin_spread_is_rejected() {
        // bid 100 / ask 100.3 is a 0.3% spread against a 1.9% requirement
        let mut strategy = ScalpingStrategy::new(&settings());
        let depth = testutil::depth(dec!(100), dec!(100.3));
        let candles = Vec::new();

        assert!(strategy.evaluate(&testutil::context(&candles, &depth)).is_none());
    }

    #[test]
    fn test_wide_spread_with_positive_net_signals() {
        let mut strategy = ScalpingStrategy::new(&settings());
        // 3% spread clears the 1.9% requirement with profit to spare
        let depth = testutil::depth(dec!(100), dec!(103));
        let candles = Vec::new();

        let signal = strategy.evaluate(&testutil::context(&candles, &depth)).unwrap();
        assert_eq!(signal.kind, SignalKind::Buy);
        // Maker entry at the bid
        assert_eq!(signal.price, dec!(100));
    }

    #[test]
    fn test_net_profit_simulation_on_min_size() {
        let strategy = ScalpingStrategy::new(&settings());

        // 3% spread: 150 buys 1.5 units at 100, selling at 103 grosses
        // 4.5; fees (150 + 154.5) * 0.002 and TDS 154.5 * 0.01 remain
        let net = strategy.net_profit_on_min_size(dec!(100), dec!(103));
        let expected = dec!(4.5) - dec!(304.5) * dec!(0.002) - dec!(154.5) * dec!(0.01);
        assert_eq!(net, expected);
        assert!(net > Decimal::ZERO);

        // A 1.4% spread is inside the cost stack and nets out negative
        let marginal = strategy.net_profit_on_min_size(dec!(100), dec!(101.4));
        assert!(marginal < Decimal::ZERO);
    }
}
