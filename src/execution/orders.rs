use std::collections::HashMap;
use std::str::FromStr;
use std::sync::{Arc, Mutex};

use chrono::{DateTime, Utc};
use rust_decimal::Decimal;

use crate::api::{is_invalid_keys_payload, SignedApiClient};
use crate::config::Settings;
use crate::models::{pair_key, OrderRecord, OrderStatus, Side, SignalKind, TradingSignal};

/// Last observed fill prices for one (symbol, exchange) pair
#[derive(Debug, Clone, Copy, Default)]
pub struct LastTrades {
    pub buy: Option<Decimal>,
    pub sell: Option<Decimal>,
}

/// Sizes, places, tracks and reaps exchange orders.
///
/// Tracked orders and last-trade prices live in mutex-guarded maps keyed
/// `"{symbol}_{exchange}"`; scan loops for different pairs share one
/// manager. Locks are never held across awaits.
pub struct OrderLifecycleManager {
    client: Arc<SignedApiClient>,
    settings: Settings,
    orders: Mutex<HashMap<String, Vec<OrderRecord>>>,
    last_trades: Mutex<HashMap<String, LastTrades>>,
}

impl OrderLifecycleManager {
    pub fn new(client: Arc<SignedApiClient>, settings: Settings) -> Self {
        Self {
            client,
            settings,
            orders: Mutex::new(HashMap::new()),
            last_trades: Mutex::new(HashMap::new()),
        }
    }

    // ------------------------------------------------------------------
    // Sizing
    // ------------------------------------------------------------------

    /// Buy quantity for the configured trade size, reduced by the fee
    /// rate so the net filled value matches the intended notional.
    /// `None` when the order would fall below the exchange minimum.
    pub fn size_buy(&self, price: Decimal, available_balance: Decimal) -> Option<Decimal> {
        if price <= Decimal::ZERO {
            return None;
        }

        let trade_size = self.settings.max_trade_size.min(available_balance);
        let quantity = trade_size / price;
        if quantity * price < self.settings.min_order_value {
            return None;
        }

        Some(self.adjust_buy_quantity(quantity, price))
    }

    /// Sell quantity for the configured trade size, scaled up so the
    /// post-fee/TDS proceeds still meet the intended notional, clamped
    /// to what is actually held. `None` below the exchange minimum.
    pub fn size_sell(&self, price: Decimal, asset_balance: Decimal) -> Option<Decimal> {
        if price <= Decimal::ZERO || asset_balance <= Decimal::ZERO {
            return None;
        }

        let quantity = (self.settings.max_trade_size / price).min(asset_balance);
        if quantity * price < self.settings.min_order_value {
            return None;
        }

        Some(self.adjust_sell_quantity(quantity, asset_balance))
    }

    fn adjust_buy_quantity(&self, quantity: Decimal, price: Decimal) -> Decimal {
        let total_cost = quantity * price;
        let fee = total_cost * self.settings.trading_fee_rate;
        (total_cost - fee) / price
    }

    fn adjust_sell_quantity(&self, quantity: Decimal, available: Decimal) -> Decimal {
        let deductions = self.settings.trading_fee_rate + self.tds_rate();
        if deductions >= Decimal::ONE {
            return quantity.min(available);
        }
        let adjusted = quantity / (Decimal::ONE - deductions);
        adjusted.min(available)
    }

    fn tds_rate(&self) -> Decimal {
        if self.settings.apply_tds_adjustment {
            self.settings.tds_rate
        } else {
            Decimal::ZERO
        }
    }

    // ------------------------------------------------------------------
    // Balances
    // ------------------------------------------------------------------

    /// Main balance for a currency from the spot portfolio
    pub async fn spot_balance(&self, currency: &str) -> anyhow::Result<Decimal> {
        let body = self.client.portfolio().await?;
        let value: serde_json::Value = serde_json::from_str(&body)?;

        let entries = value
            .get("data")
            .and_then(|d| d.as_array())
            .ok_or_else(|| anyhow::anyhow!("portfolio payload missing data"))?;

        let wanted = currency.to_uppercase();
        for entry in entries {
            let matches = entry
                .get("currency")
                .and_then(|c| c.as_str())
                .is_some_and(|c| c.to_uppercase() == wanted);
            if matches {
                return Ok(entry
                    .get("main_balance")
                    .and_then(decimal_from_value)
                    .unwrap_or(Decimal::ZERO));
            }
        }
        Ok(Decimal::ZERO)
    }

    /// Available balance for a base asset from the futures wallet
    pub async fn futures_balance(&self, asset: &str) -> anyhow::Result<Decimal> {
        let body = self.client.futures_wallet_balance().await?;
        let value: serde_json::Value = serde_json::from_str(&body)?;

        let entries = value
            .get("data")
            .and_then(|d| d.get("base_asset_balances"))
            .and_then(|d| d.as_array())
            .ok_or_else(|| anyhow::anyhow!("wallet payload missing balances"))?;

        for entry in entries {
            let matches = entry
                .get("base_asset")
                .and_then(|a| a.as_str())
                .is_some_and(|a| a.eq_ignore_ascii_case(asset));
            if matches {
                return Ok(entry
                    .get("balances")
                    .and_then(|b| b.get("total_available_balance"))
                    .and_then(decimal_from_value)
                    .unwrap_or(Decimal::ZERO));
            }
        }
        Ok(Decimal::ZERO)
    }

    // ------------------------------------------------------------------
    // Placement
    // ------------------------------------------------------------------

    /// Turn a strategy signal into at most one exchange order.
    ///
    /// Returns the tracked record, or `None` when sizing rejected the
    /// trade, trading is disabled, or the placement outcome is unknown.
    pub async fn place_for_signal(
        &self,
        signal: &TradingSignal,
        symbol: &str,
        exchange: &str,
    ) -> anyhow::Result<Option<OrderRecord>> {
        let (side, quantity) = match signal.kind {
            SignalKind::Buy => {
                let balance = self.spot_balance(&self.settings.quote_currency).await?;
                match self.size_buy(signal.price, balance) {
                    Some(quantity) => (Side::Buy, quantity),
                    None => {
                        tracing::info!(
                            "Buy on {} skipped: below minimum notional (balance {})",
                            symbol,
                            balance
                        );
                        return Ok(None);
                    }
                }
            }
            SignalKind::Sell | SignalKind::Exit => {
                let base_asset = symbol.split('/').next().unwrap_or(symbol);
                let balance = self.spot_balance(base_asset).await?;
                match self.size_sell(signal.price, balance) {
                    Some(quantity) => (Side::Sell, quantity),
                    None => {
                        tracing::info!(
                            "Sell on {} skipped: nothing to sell above minimum (held {})",
                            symbol,
                            balance
                        );
                        return Ok(None);
                    }
                }
            }
        };

        if !self.settings.trading_enabled {
            tracing::info!(
                "[dry-run] Would {} {} {} at {}",
                side.as_str(),
                quantity,
                symbol,
                signal.price
            );
            return Ok(None);
        }

        let body = self
            .client
            .create_order(side, symbol, exchange, signal.price, quantity)
            .await?;

        if is_invalid_keys_payload(&body) {
            anyhow::bail!("order rejected: invalid API credentials");
        }

        let Some(order_id) = parse_order_id(&body) else {
            // State unknown: the open-orders sync adopts it if it exists
            tracing::warn!(
                "Placement response for {} had no order id; reconciling on next sync: {}",
                symbol,
                body
            );
            return Ok(None);
        };

        let record = OrderRecord {
            order_id,
            symbol: symbol.to_string(),
            exchange: exchange.to_string(),
            side,
            price: signal.price,
            quantity,
            status: OrderStatus::Open,
            created_at: Utc::now(),
        };

        tracing::info!(
            "{} {} {} at {} (order {})",
            side.as_str().to_uppercase(),
            quantity,
            symbol,
            signal.price,
            record.order_id
        );
        self.track(record.clone());
        Ok(Some(record))
    }

    pub fn track(&self, record: OrderRecord) {
        let key = pair_key(&record.symbol, &record.exchange);
        self.orders.lock().unwrap().entry(key).or_default().push(record);
    }

    pub fn tracked(&self, symbol: &str, exchange: &str) -> Vec<OrderRecord> {
        let key = pair_key(symbol, exchange);
        self.orders
            .lock()
            .unwrap()
            .get(&key)
            .cloned()
            .unwrap_or_default()
    }

    pub fn last_trades(&self, symbol: &str, exchange: &str) -> LastTrades {
        let key = pair_key(symbol, exchange);
        self.last_trades
            .lock()
            .unwrap()
            .get(&key)
            .copied()
            .unwrap_or_default()
    }

    // ------------------------------------------------------------------
    // Cancellation sweep and reconciliation
    // ------------------------------------------------------------------

    /// Whether an open order should be cancelled this tick: it opposes
    /// the fresh signal, drifted too far from the touch, or went stale.
    /// Staleness alone is sufficient regardless of price deviation.
    pub fn should_cancel(
        &self,
        order: &OrderRecord,
        signal: Option<SignalKind>,
        best_bid: Decimal,
        best_ask: Decimal,
        now: DateTime<Utc>,
    ) -> bool {
        if signal.is_some_and(|kind| order.side.opposes(kind)) {
            return true;
        }

        let hundred = Decimal::from(100);
        let deviation = match order.side {
            Side::Buy if best_bid > Decimal::ZERO => (order.price / best_bid - Decimal::ONE) * hundred,
            Side::Sell if best_ask > Decimal::ZERO => (Decimal::ONE - order.price / best_ask) * hundred,
            _ => Decimal::ZERO,
        };
        if deviation > self.settings.price_deviation_percent {
            return true;
        }

        order.age_minutes(now) > self.settings.stale_order_minutes
    }

    /// Poll every tracked order for the pair: reconcile fills and
    /// cancellations, then cancel whatever `should_cancel` flags.
    /// Individual failures are logged and never abort the sweep.
    pub async fn sweep(
        &self,
        symbol: &str,
        exchange: &str,
        signal: Option<SignalKind>,
        best_bid: Decimal,
        best_ask: Decimal,
    ) {
        let key = pair_key(symbol, exchange);
        let snapshot = self.tracked(symbol, exchange);
        if snapshot.is_empty() {
            return;
        }

        let now = Utc::now();
        let mut to_remove = Vec::new();

        for order in &snapshot {
            let polled = match self.client.order_status(&order.order_id).await {
                Ok(body) => parse_order_poll(&body),
                Err(err) => {
                    tracing::warn!(
                        "Status poll failed for order {} on {}: {}",
                        order.order_id,
                        symbol,
                        err
                    );
                    continue;
                }
            };

            let Some(poll) = polled else {
                tracing::warn!(
                    "Unparseable status for order {} on {}; keeping for next sweep",
                    order.order_id,
                    symbol
                );
                continue;
            };

            match poll.status {
                OrderStatus::Filled => {
                    let price = poll.price.unwrap_or(order.price);
                    self.record_fill(&key, poll.side.unwrap_or(order.side), price);
                    tracing::info!(
                        "{} order {} filled at {} for {}",
                        order.side.as_str().to_uppercase(),
                        order.order_id,
                        price,
                        symbol
                    );
                    to_remove.push(order.order_id.clone());
                }
                OrderStatus::Canceled => {
                    to_remove.push(order.order_id.clone());
                }
                OrderStatus::Open => {
                    if self.should_cancel(order, signal, best_bid, best_ask, now) {
                        match self.client.cancel_order(&order.order_id).await {
                            Ok(_) => {
                                tracing::info!(
                                    "Cancelled {} order {} for {}",
                                    order.side.as_str(),
                                    order.order_id,
                                    symbol
                                );
                                to_remove.push(order.order_id.clone());
                            }
                            Err(err) => {
                                // State unknown; poll again next tick
                                tracing::warn!(
                                    "Cancel failed for order {} on {}: {}",
                                    order.order_id,
                                    symbol,
                                    err
                                );
                            }
                        }
                    }
                }
            }
        }

        if !to_remove.is_empty() {
            let mut orders = self.orders.lock().unwrap();
            if let Some(list) = orders.get_mut(&key) {
                list.retain(|o| !to_remove.contains(&o.order_id));
            }
        }
    }

    /// Adopt exchange-reported open orders missing from the tracked set
    /// (covers placements whose response was lost).
    pub async fn sync_open_orders(&self, symbol: &str, exchange: &str) {
        let key = pair_key(symbol, exchange);

        for side in [Side::Buy, Side::Sell] {
            let body = match self.client.open_orders(symbol, exchange, side).await {
                Ok(body) => body,
                Err(err) => {
                    tracing::warn!("Open-orders sync failed for {}: {}", symbol, err);
                    return;
                }
            };

            for remote in parse_open_orders(&body, symbol, exchange, side) {
                let mut orders = self.orders.lock().unwrap();
                let list = orders.entry(key.clone()).or_default();
                if !list.iter().any(|o| o.order_id == remote.order_id) {
                    tracing::info!(
                        "Adopted untracked {} order {} for {}",
                        side.as_str(),
                        remote.order_id,
                        symbol
                    );
                    list.push(remote);
                }
            }
        }
    }

    fn record_fill(&self, key: &str, side: Side, price: Decimal) {
        let mut trades = self.last_trades.lock().unwrap();
        let entry = trades.entry(key.to_string()).or_default();
        match side {
            Side::Buy => entry.buy = Some(price),
            Side::Sell => entry.sell = Some(price),
        }
    }
}

struct OrderPoll {
    status: OrderStatus,
    price: Option<Decimal>,
    side: Option<Side>,
}

fn decimal_from_value(value: &serde_json::Value) -> Option<Decimal> {
    match value {
        serde_json::Value::String(s) => Decimal::from_str(s).ok(),
        serde_json::Value::Number(n) => Decimal::from_str(&n.to_string()).ok(),
        _ => None,
    }
}

fn parse_order_id(body: &str) -> Option<String> {
    let value: serde_json::Value = serde_json::from_str(body).ok()?;
    let id = value.get("data")?.get("order_id")?;
    match id {
        serde_json::Value::String(s) => Some(s.clone()),
        serde_json::Value::Number(n) => Some(n.to_string()),
        _ => None,
    }
}

fn parse_order_poll(body: &str) -> Option<OrderPoll> {
    let value: serde_json::Value = serde_json::from_str(body).ok()?;
    let data = value.get("data")?;

    let status = data
        .get("status")
        .and_then(|s| s.as_str())
        .map(OrderStatus::from_wire)?;
    let price = data.get("price").and_then(decimal_from_value);
    let side = data
        .get("side")
        .and_then(|s| s.as_str())
        .and_then(|s| match s.to_ascii_lowercase().as_str() {
            "buy" => Some(Side::Buy),
            "sell" => Some(Side::Sell),
            _ => None,
        });

    Some(OrderPoll {
        status,
        price,
        side,
    })
}

fn parse_open_orders(body: &str, symbol: &str, exchange: &str, side: Side) -> Vec<OrderRecord> {
    let Ok(value) = serde_json::from_str::<serde_json::Value>(body) else {
        return Vec::new();
    };
    let Some(orders) = value
        .get("data")
        .and_then(|d| d.get("orders"))
        .and_then(|o| o.as_array())
    else {
        return Vec::new();
    };

    orders
        .iter()
        .filter_map(|order| {
            let order_id = match order.get("order_id").or_else(|| order.get("id"))? {
                serde_json::Value::String(s) => s.clone(),
                serde_json::Value::Number(n) => n.to_string(),
                _ => return None,
            };
            let price = order.get("price").and_then(decimal_from_value)?;
            let quantity = order
                .get("quantity")
                .and_then(decimal_from_value)
                .unwrap_or(Decimal::ZERO);
            let created_at = order
                .get("created_time")
                .or_else(|| order.get("created_at"))
                .and_then(|v| v.as_i64())
                .and_then(DateTime::from_timestamp_millis)
                .unwrap_or_else(Utc::now);

            Some(OrderRecord {
                order_id,
                symbol: symbol.to_string(),
                exchange: exchange.to_string(),
                side,
                price,
                quantity,
                status: OrderStatus::Open,
                created_at,
            })
        })
        .collect()
}
