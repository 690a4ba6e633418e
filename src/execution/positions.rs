use std::collections::HashMap;
use std::str::FromStr;
use std::sync::{Arc, Mutex};

use chrono::{DateTime, Utc};
use rust_decimal::Decimal;
use serde_json::json;

use crate::api::SignedApiClient;
use crate::config::Settings;
use crate::models::{Position, PositionState, SignalKind, TradingSignal};

/// Tracks leveraged positions and their protective stops.
///
/// Stops only ever tighten toward profit, and the exchange-side stop
/// order is only replaced once the level has moved enough to justify the
/// churn. A margin-ratio breach force-closes regardless of strategy.
pub struct PositionManager {
    client: Arc<SignedApiClient>,
    settings: Settings,
    /// Stop level last placed at the exchange, per symbol
    placed_stops: Mutex<HashMap<String, Decimal>>,
    states: Mutex<HashMap<String, PositionState>>,
}

impl PositionManager {
    pub fn new(client: Arc<SignedApiClient>, settings: Settings) -> Self {
        Self {
            client,
            settings,
            placed_stops: Mutex::new(HashMap::new()),
            states: Mutex::new(HashMap::new()),
        }
    }

    // ------------------------------------------------------------------
    // Stop arithmetic
    // ------------------------------------------------------------------

    /// Next stop level for a position marked at `mark_price`. Longs only
    /// ratchet up, shorts only ratchet down.
    pub fn next_trailing_stop(
        &self,
        current: Option<Decimal>,
        mark_price: Decimal,
        is_long: bool,
    ) -> Decimal {
        let trail = self.settings.trailing_stop_percent / Decimal::from(100);
        if is_long {
            let trailing = mark_price * (Decimal::ONE - trail);
            current.map_or(trailing, |c| c.max(trailing))
        } else {
            let trailing = mark_price * (Decimal::ONE + trail);
            current.map_or(trailing, |c| c.min(trailing))
        }
    }

    /// Replace the exchange stop only when none exists yet or the level
    /// moved more than the churn bound (0.5% by default)
    pub fn should_replace_stop(&self, placed: Option<Decimal>, new_stop: Decimal) -> bool {
        match placed {
            None => true,
            Some(placed) if placed.is_zero() => true,
            Some(placed) => {
                (new_stop / placed - Decimal::ONE).abs() > self.settings.stop_replace_threshold
            }
        }
    }

    /// Margin-ratio liquidation guard
    pub fn needs_force_close(&self, position: &Position) -> bool {
        position.margin_ratio() > self.settings.margin_ratio_threshold
    }

    /// Risk-based entry size: risk a fraction of the balance over the
    /// trailing-stop distance
    pub fn entry_quantity(&self, price: Decimal, available_balance: Decimal) -> Option<Decimal> {
        if price <= Decimal::ZERO {
            return None;
        }
        let stop_fraction = self.settings.trailing_stop_percent / Decimal::from(100);
        if stop_fraction.is_zero() {
            return None;
        }
        let risked = available_balance * self.settings.risk_percent;
        let quantity = risked / (price * stop_fraction);
        (quantity > Decimal::ZERO).then_some(quantity)
    }

    // ------------------------------------------------------------------
    // Exchange state
    // ------------------------------------------------------------------

    /// Live positions for the pair, annotated with the locally tracked
    /// stop level and lifecycle state
    pub async fn positions(&self, symbol: &str, exchange: &str) -> anyhow::Result<Vec<Position>> {
        let body = self.client.futures_positions(symbol, exchange).await?;
        let mut positions = parse_positions(&body);

        {
            let placed = self.placed_stops.lock().unwrap();
            let mut states = self.states.lock().unwrap();
            for position in &mut positions {
                position.current_stop_loss = placed.get(&position.symbol).copied();

                let state = states
                    .entry(position.symbol.clone())
                    .or_insert(PositionState::Open);
                if *state == PositionState::Opening {
                    tracing::info!("Position on {} is now open", position.symbol);
                    *state = PositionState::Open;
                }
                position.state = *state;
            }
        }

        Ok(positions)
    }

    /// Run the per-tick position checks: liquidation guard, stop breach,
    /// reversal exit, then trailing-stop advancement.
    pub async fn check(&self, symbol: &str, exchange: &str, reversal: Option<SignalKind>) {
        let positions = match self.positions(symbol, exchange).await {
            Ok(positions) => positions,
            Err(err) => {
                tracing::warn!(
                    "Position check failed for {} on {}: {}",
                    symbol,
                    exchange,
                    err
                );
                return;
            }
        };

        if positions.is_empty() {
            self.reap_closed(symbol);
            return;
        }

        for position in &positions {
            if self.needs_force_close(position) {
                tracing::warn!(
                    "Liquidation risk on {} (margin ratio {}); force closing",
                    position.symbol,
                    position.margin_ratio()
                );
                self.close(position, exchange, "liquidation risk").await;
                continue;
            }

            if position.stop_breached(position.mark_price) {
                tracing::info!(
                    "Stop breached on {} at mark {}; closing",
                    position.symbol,
                    position.mark_price
                );
                self.close(position, exchange, "stop breach").await;
                continue;
            }

            let reversed = reversal.is_some_and(|kind| match kind {
                SignalKind::Buy => !position.is_long,
                SignalKind::Sell => position.is_long,
                SignalKind::Exit => true,
            });
            if reversed && self.settings.exit_on_signal_reversal {
                tracing::info!("Reversal signal against {}; closing", position.symbol);
                self.close(position, exchange, "signal reversal").await;
                continue;
            }

            self.update_trailing_stop(position, exchange).await;
        }
    }

    /// Advance the trailing stop and replace the exchange stop order
    /// when it moved past the churn bound
    pub async fn update_trailing_stop(&self, position: &Position, exchange: &str) {
        let new_stop = self.next_trailing_stop(
            position.current_stop_loss,
            position.mark_price,
            position.is_long,
        );

        if !self.should_replace_stop(position.current_stop_loss, new_stop) {
            return;
        }

        if !self.settings.trading_enabled {
            tracing::info!(
                "[dry-run] Would move stop on {} from {:?} to {}",
                position.symbol,
                position.current_stop_loss,
                new_stop
            );
            return;
        }

        self.cancel_stop_orders(&position.symbol, exchange).await;

        let payload = json!({
            "symbol": position.symbol.to_lowercase(),
            "exchange": exchange,
            "price": new_stop,
            "side": if position.is_long { "SELL" } else { "BUY" },
            "order_type": "STOP_MARKET",
            "quantity": position.quantity.abs(),
            "trigger_price": new_stop,
            "reduce_only": true,
        });

        match self.client.create_futures_order(&payload).await {
            Ok(_) => {
                tracing::info!(
                    "Moved stop on {} from {:?} to {}",
                    position.symbol,
                    position.current_stop_loss,
                    new_stop
                );
                self.placed_stops
                    .lock()
                    .unwrap()
                    .insert(position.symbol.clone(), new_stop);
            }
            Err(err) => {
                tracing::warn!("Stop replacement failed for {}: {}", position.symbol, err);
            }
        }
    }

    /// Cancel existing stop orders for the symbol; failures are logged
    /// and the replacement proceeds regardless
    async fn cancel_stop_orders(&self, symbol: &str, exchange: &str) {
        let body = match self.client.futures_open_orders(symbol, exchange).await {
            Ok(body) => body,
            Err(err) => {
                tracing::warn!("Open stop-order lookup failed for {}: {}", symbol, err);
                return;
            }
        };

        for order_id in parse_stop_order_ids(&body, symbol) {
            let payload = json!({
                "symbol": symbol.to_lowercase(),
                "exchange": exchange,
                "order_id": order_id,
            });
            match self.client.cancel_futures_order(&payload).await {
                Ok(_) => tracing::info!("Cancelled stop order {} for {}", order_id, symbol),
                Err(err) => {
                    tracing::warn!("Failed to cancel stop order {} for {}: {}", order_id, symbol, err)
                }
            }
        }
    }

    /// Reduce-only market order against the position
    pub async fn close(&self, position: &Position, exchange: &str, reason: &str) {
        if !self.settings.trading_enabled {
            tracing::info!(
                "[dry-run] Would close {} ({}): {}",
                position.symbol,
                if position.is_long { "long" } else { "short" },
                reason
            );
            return;
        }

        self.states
            .lock()
            .unwrap()
            .insert(position.symbol.clone(), PositionState::Closing);

        let payload = json!({
            "symbol": position.symbol.to_lowercase(),
            "exchange": exchange,
            "price": Decimal::ZERO,
            "side": if position.is_long { "SELL" } else { "BUY" },
            "order_type": "MARKET",
            "quantity": position.quantity.abs(),
            "reduce_only": true,
        });

        match self.client.create_futures_order(&payload).await {
            Ok(_) => tracing::info!("Closed position on {} ({})", position.symbol, reason),
            Err(err) => {
                tracing::warn!(
                    "Close failed for {} ({}); reconciling next tick: {}",
                    position.symbol,
                    reason,
                    err
                );
            }
        }
    }

    /// Open a position from a chandelier-style entry signal, closing any
    /// opposing position first when reversal exits are enabled
    pub async fn open_from_signal(
        &self,
        signal: &TradingSignal,
        symbol: &str,
        exchange: &str,
        available_balance: Decimal,
    ) -> anyhow::Result<()> {
        let side = match signal.kind {
            SignalKind::Buy => "BUY",
            SignalKind::Sell => "SELL",
            SignalKind::Exit => {
                if let Ok(positions) = self.positions(symbol, exchange).await {
                    for position in &positions {
                        self.close(position, exchange, "exit signal").await;
                    }
                }
                return Ok(());
            }
        };

        if self.settings.exit_on_signal_reversal {
            if let Ok(positions) = self.positions(symbol, exchange).await {
                for position in &positions {
                    self.close(position, exchange, "entry reversal").await;
                }
            }
        }

        let Some(quantity) = self.entry_quantity(signal.price, available_balance) else {
            tracing::info!("Entry on {} skipped: no viable size", symbol);
            return Ok(());
        };

        if !self.settings.trading_enabled {
            tracing::info!(
                "[dry-run] Would open {} {} {} at {}",
                side,
                quantity,
                symbol,
                signal.price
            );
            return Ok(());
        }

        let payload = json!({
            "symbol": symbol.to_lowercase(),
            "exchange": exchange,
            "price": signal.price,
            "side": side,
            "order_type": "MARKET",
            "quantity": quantity,
            "reduce_only": false,
        });

        self.client.create_futures_order(&payload).await?;
        self.states
            .lock()
            .unwrap()
            .insert(symbol.to_string(), PositionState::Opening);

        // Seed the stop from the signal's chandelier level when present
        if let Some(stop) = signal.stop_level {
            self.placed_stops
                .lock()
                .unwrap()
                .insert(symbol.to_string(), stop);
        }

        tracing::info!("Opened {} {} {} at {}", side, quantity, symbol, signal.price);
        Ok(())
    }

    /// Closing positions that have disappeared from the exchange are done
    fn reap_closed(&self, symbol: &str) {
        let mut states = self.states.lock().unwrap();
        if states.get(symbol) == Some(&PositionState::Closing) {
            tracing::info!("Position on {} fully closed", symbol);
            states.insert(symbol.to_string(), PositionState::Closed);
            self.placed_stops.lock().unwrap().remove(symbol);
        }
    }

    #[cfg(test)]
    fn state_of(&self, symbol: &str) -> Option<PositionState> {
        self.states.lock().unwrap().get(symbol).copied()
    }
}

fn decimal_field(value: &serde_json::Value, field: &str) -> Option<Decimal> {
    match value.get(field)? {
        serde_json::Value::String(s) => Decimal::from_str(s).ok(),
        serde_json::Value::Number(n) => Decimal::from_str(&n.to_string()).ok(),
        _ => None,
    }
}

fn parse_positions(body: &str) -> Vec<Position> {
    let Ok(value) = serde_json::from_str::<serde_json::Value>(body) else {
        return Vec::new();
    };
    if value.get("message").is_some() {
        return Vec::new();
    }
    let Some(entries) = value.get("data").and_then(|d| d.as_array()) else {
        return Vec::new();
    };

    entries
        .iter()
        .filter_map(|entry| {
            let symbol = entry.get("symbol")?.as_str()?.to_string();
            let entry_price = decimal_field(entry, "avg_entry_price")?;
            let quantity = decimal_field(entry, "position_size")?.abs();
            if quantity.is_zero() {
                return None;
            }
            let is_long = entry
                .get("position_side")
                .and_then(|s| s.as_str())
                .is_some_and(|s| s.eq_ignore_ascii_case("LONG"));
            let entry_time = entry
                .get("created_at")
                .and_then(|v| v.as_i64())
                .and_then(DateTime::from_timestamp_millis)
                .unwrap_or_else(Utc::now);

            Some(Position {
                symbol,
                entry_price,
                quantity,
                is_long,
                current_stop_loss: None,
                pnl: decimal_field(entry, "unrealised_pnl").unwrap_or(Decimal::ZERO),
                entry_time,
                state: PositionState::Open,
                mark_price: decimal_field(entry, "mark_price").unwrap_or(entry_price),
                position_margin: decimal_field(entry, "position_margin").unwrap_or(Decimal::ZERO),
                maint_margin: decimal_field(entry, "maint_margin").unwrap_or(Decimal::ZERO),
            })
        })
        .collect()
}

fn parse_stop_order_ids(body: &str, symbol: &str) -> Vec<String> {
    let Ok(value) = serde_json::from_str::<serde_json::Value>(body) else {
        return Vec::new();
    };
    let Some(orders) = value.get("data").and_then(|d| d.as_array()) else {
        return Vec::new();
    };

    let symbol_lower = symbol.to_lowercase();
    orders
        .iter()
        .filter_map(|order| {
            let order_type = order.get("order_type")?.as_str()?;
            if order_type != "STOP_MARKET" && order_type != "STOP_LIMIT" {
                return None;
            }
            let order_symbol = order.get("symbol")?.as_str()?;
            if order_symbol.to_lowercase() != symbol_lower {
                return None;
            }
            match order.get("order_id")? {
                serde_json::Value::String(s) => Some(s.clone()),
                serde_json::Value::Number(n) => Some(n.to_string()),
                _ => None,
            }
        })
        .collect()
}
