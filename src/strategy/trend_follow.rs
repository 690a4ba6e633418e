use rust_decimal::Decimal;

use crate::config::Settings;
use crate::models::{SignalKind, TradingSignal};
use crate::strategy::{ScanContext, Strategy};

/// Trend-following over annotated candles.
///
/// Buys when the fast EMA is above the SMA with MACD confirmation and a
/// depressed RSI, or on raw trend strength with a looser RSI gate; sells
/// on the mirror conditions. Once a fill price is known, a move of
/// `min_profit_percent` in the pair's favor overrides the indicators and
/// takes the profit.
pub struct TrendFollowStrategy {
    min_history: usize,
    min_profit_percent: Decimal,
}

const STRONG_TREND_PERCENT: Decimal = Decimal::from_parts(15, 0, 0, false, 1); // 1.5

impl TrendFollowStrategy {
    pub fn new(settings: &Settings) -> Self {
        Self {
            min_history: settings
                .sma_period
                .max(settings.macd_long_period + settings.macd_signal_period),
            min_profit_percent: settings.min_profit_percent,
        }
    }
}

impl Strategy for TrendFollowStrategy {
    fn name(&self) -> &str {
        "trend_follow"
    }

    fn min_history(&self) -> usize {
        self.min_history
    }

    fn evaluate(&mut self, ctx: &ScanContext) -> Option<TradingSignal> {
        let candle = ctx.candles.last()?;
        let sma = candle.sma?;
        let ema = candle.ema_fast?;
        let rsi = candle.rsi?;
        let macd = candle.macd?;
        let macd_signal = candle.macd_signal?;

        if sma.is_zero() {
            return None;
        }

        let hundred = Decimal::from(100);
        let trend_strength = (ema - sma).abs() / sma * hundred;
        let strong_trend = trend_strength > STRONG_TREND_PERCENT;

        let mut buy_signal = (ema > sma && macd > macd_signal && rsi < Decimal::from(40))
            || (strong_trend && ema > sma && rsi < Decimal::from(45));
        let mut sell_signal = (ema < sma && macd < macd_signal && rsi > Decimal::from(65))
            || (strong_trend && ema < sma && rsi > Decimal::from(60));

        // Profit targeting overrides the indicators once a fill is known
        if let Some(last_buy) = ctx.last_buy_price {
            if last_buy > Decimal::ZERO && ctx.depth.ask > Decimal::ZERO {
                let potential = (ctx.depth.ask / last_buy - Decimal::ONE) * hundred;
                if potential >= self.min_profit_percent {
                    tracing::info!(
                        "Profit target reached on {}: {:.2}% above last buy",
                        ctx.symbol,
                        potential
                    );
                    sell_signal = true;
                }
            }
        }
        if let Some(last_sell) = ctx.last_sell_price {
            if last_sell > Decimal::ZERO && ctx.depth.bid > Decimal::ZERO {
                let potential = (Decimal::ONE - ctx.depth.bid / last_sell) * hundred;
                if potential >= self.min_profit_percent {
                    tracing::info!(
                        "Profit target reached on {}: {:.2}% below last sell",
                        ctx.symbol,
                        potential
                    );
                    buy_signal = true;
                }
            }
        }

        tracing::debug!(
            "{} on {}: RSI={} SMA={} EMA={} MACD={} Signal={} Trend={}%",
            ctx.symbol,
            ctx.exchange,
            rsi,
            sma,
            ema,
            macd,
            macd_signal,
            trend_strength
        );

        match (buy_signal, sell_signal) {
            (true, false) => Some(TradingSignal {
                timestamp: ctx.now,
                kind: SignalKind::Buy,
                price: ctx.depth.bid,
                symbol: ctx.symbol.to_string(),
                stop_level: None,
            }),
            (false, true) => Some(TradingSignal {
                timestamp: ctx.now,
                kind: SignalKind::Sell,
                price: ctx.depth.ask,
                symbol: ctx.symbol.to_string(),
                stop_level: None,
            }),
            // Conflicting or absent conditions produce nothing
            _ => None,
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::models::Candle;
    use crate::strategy::testutil;
    use chrono::{Duration, Utc};
    use rust_decimal_macros::dec;

    fn annotated_candle(
        sma: Decimal,
        ema_fast: Decimal,
        rsi: Decimal,
        macd: Decimal,
        macd_signal: Decimal,
    ) -> Candle {
        let now = Utc::now();
        let mut candle = Candle::new(
            now - Duration::hours(1),
            now,
            dec!(100),
            dec!(101),
            dec!(99),
            dec!(100),
            dec!(1000),
        );
        candle.sma = Some(sma);
        candle.ema_fast = Some(ema_fast);
        candle.rsi = Some(rsi);
        candle.macd = Some(macd);
        candle.macd_signal = Some(macd_signal);
        candle
    }

    #[test]
    fn test_buy_on_aligned_indicators() {
        let mut strategy = TrendFollowStrategy::new(&Settings::default());
        let candles = vec![annotated_candle(dec!(100), dec!(102), dec!(35), dec!(1), dec!(0.5))];
        let depth = testutil::depth(dec!(100), dec!(100.3));

        let signal = strategy.evaluate(&testutil::context(&candles, &depth)).unwrap();
        assert_eq!(signal.kind, SignalKind::Buy);
        assert_eq!(signal.price, dec!(100));
    }

    #[test]
    fn test_strong_trend_loosens_rsi_gate() {
        let mut strategy = TrendFollowStrategy::new(&Settings::default());
        // MACD disagrees, but |ema-sma|/sma = 2% > 1.5% and RSI < 45
        let candles = vec![annotated_candle(dec!(100), dec!(102), dec!(43), dec!(0), dec!(1))];
        let depth = testutil::depth(dec!(100), dec!(100.3));

        let signal = strategy.evaluate(&testutil::context(&candles, &depth)).unwrap();
        assert_eq!(signal.kind, SignalKind::Buy);
    }

    #[test]
    fn test_sell_on_mirrored_conditions() {
        let mut strategy = TrendFollowStrategy::new(&Settings::default());
        let candles = vec![annotated_candle(dec!(100), dec!(98), dec!(70), dec!(-1), dec!(-0.5))];
        let depth = testutil::depth(dec!(100), dec!(100.3));

        let signal = strategy.evaluate(&testutil::context(&candles, &depth)).unwrap();
        assert_eq!(signal.kind, SignalKind::Sell);
        assert_eq!(signal.price, dec!(100.3));
    }

    #[test]
    fn test_neutral_market_is_silent() {
        let mut strategy = TrendFollowStrategy::new(&Settings::default());
        let candles = vec![annotated_candle(dec!(100), dec!(100.1), dec!(50), dec!(0.1), dec!(0.2))];
        let depth = testutil::depth(dec!(100), dec!(100.3));

        assert!(strategy.evaluate(&testutil::context(&candles, &depth)).is_none());
    }

    #[test]
    fn test_profit_target_forces_sell() {
        let mut strategy = TrendFollowStrategy::new(&Settings::default());
        // Indicators neutral, but the ask is 0.5% above the last buy
        let candles = vec![annotated_candle(dec!(100), dec!(100.1), dec!(50), dec!(0.1), dec!(0.2))];
        let depth = testutil::depth(dec!(100.2), dec!(100.5));

        let mut ctx = testutil::context(&candles, &depth);
        ctx.last_buy_price = Some(dec!(100));

        let signal = strategy.evaluate(&ctx).unwrap();
        assert_eq!(signal.kind, SignalKind::Sell);
    }

    #[test]
    fn test_unannotated_candles_are_skipped() {
        let mut strategy = TrendFollowStrategy::new(&Settings::default());
        let now = Utc::now();
        let candles = vec![Candle::new(
            now - Duration::hours(1),
            now,
            dec!(100),
            dec!(101),
            dec!(99),
            dec!(100),
            dec!(1000),
        )];
        let depth = testutil::depth(dec!(100), dec!(100.3));

        assert!(strategy.evaluate(&testutil::context(&candles, &depth)).is_none());
    }
}
