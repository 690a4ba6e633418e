use rust_decimal::Decimal;
use serde::{Deserialize, Serialize};

/// Which strategy a scan loop runs. Closed set: adding a variant means
/// touching `strategy::build_strategy` and nothing else.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum StrategyKind {
    TrendFollow,
    Scalping,
    Stochastic,
    MaCrossover,
    Combined,
    ChandelierExit,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum SigningScheme {
    Ed25519,
    HmacSha256,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum TradingMode {
    Spot,
    Futures,
}

/// All tunables in one place. Loaded once at startup from an optional
/// TOML file layered under `QUANTBOT__*` environment variables; never
/// mutated by the engine, only replaced wholesale.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct Settings {
    // API access
    pub base_url: String,
    pub api_key: String,
    pub secret_key: String,
    pub signing_scheme: SigningScheme,

    // What to trade
    pub symbols: Vec<String>,
    pub exchanges: Vec<String>,
    pub quote_currency: String,
    pub trading_mode: TradingMode,
    pub strategy: StrategyKind,
    pub trading_enabled: bool,

    // Scan cadence
    pub scan_interval_ms: u64,
    pub candle_interval: String,
    pub candle_limit: u32,

    // Fees and taxes
    pub trading_fee_rate: Decimal,
    pub tds_rate: Decimal,
    pub apply_tds_adjustment: bool,

    // Sizing
    pub max_trade_size: Decimal,
    pub min_order_value: Decimal,
    pub profit_threshold: Decimal,
    pub min_profit_percent: Decimal,
    pub risk_percent: Decimal,

    // Indicator periods
    pub sma_period: usize,
    pub ema_period: usize,
    pub long_ema_period: usize,
    pub rsi_period: usize,
    pub macd_short_period: usize,
    pub macd_long_period: usize,
    pub macd_signal_period: usize,
    pub stochastic_k_period: usize,
    pub stochastic_d_period: usize,
    pub stochastic_slowing: usize,
    pub fast_ma_period: usize,
    pub slow_ma_period: usize,

    // Chandelier exit
    pub atr_period: usize,
    pub atr_multiplier: Decimal,
    pub use_close_extremes: bool,
    pub await_bar_confirmation: bool,
    pub exit_on_signal_reversal: bool,
    pub trailing_stop_percent: Decimal,

    // Order lifecycle
    pub stale_order_minutes: i64,
    pub price_deviation_percent: Decimal,
    pub stop_replace_threshold: Decimal,
    pub margin_ratio_threshold: Decimal,
}

impl Default for Settings {
    fn default() -> Self {
        Self {
            base_url: "https://coinswitch.co".to_string(),
            api_key: String::new(),
            secret_key: String::new(),
            signing_scheme: SigningScheme::Ed25519,

            symbols: vec!["BTC/INR".to_string()],
            exchanges: vec!["COINSWITCHX".to_string()],
            quote_currency: "INR".to_string(),
            trading_mode: TradingMode::Spot,
            strategy: StrategyKind::TrendFollow,
            trading_enabled: false,

            scan_interval_ms: 2000,
            candle_interval: "60".to_string(),
            candle_limit: 100,

            trading_fee_rate: Decimal::new(2, 3),  // 0.2%
            tds_rate: Decimal::new(1, 2),          // 1%
            apply_tds_adjustment: true,

            max_trade_size: Decimal::new(1000, 0),
            min_order_value: Decimal::new(150, 0),
            profit_threshold: Decimal::new(5, 3),  // 0.5%
            min_profit_percent: Decimal::new(25, 2), // 0.25%
            risk_percent: Decimal::new(2, 2),      // 2%

            sma_period: 14,
            ema_period: 14,
            long_ema_period: 26,
            rsi_period: 14,
            macd_short_period: 12,
            macd_long_period: 26,
            macd_signal_period: 9,
            stochastic_k_period: 14,
            stochastic_d_period: 3,
            stochastic_slowing: 3,
            fast_ma_period: 20,
            slow_ma_period: 50,

            atr_period: 22,
            atr_multiplier: Decimal::new(3, 0),
            use_close_extremes: true,
            await_bar_confirmation: true,
            exit_on_signal_reversal: true,
            trailing_stop_percent: Decimal::new(5, 0),

            stale_order_minutes: 5,
            price_deviation_percent: Decimal::new(1, 0),
            stop_replace_threshold: Decimal::new(5, 3), // 0.5%
            margin_ratio_threshold: Decimal::new(5, 1), // 50%
        }
    }
}

impl Settings {
    /// Load settings from an optional TOML file with environment overrides
    /// (`QUANTBOT_API_KEY` style).
    pub fn load(path: Option<&str>) -> Result<Self, config::ConfigError> {
        config::Config::builder()
            .add_source(config::File::with_name(path.unwrap_or("quantbot")).required(false))
            .add_source(config::Environment::with_prefix("QUANTBOT").separator("__"))
            .build()?
            .try_deserialize()
    }

    /// All (symbol, exchange) pairs the engine scans
    pub fn trading_pairs(&self) -> Vec<(String, String)> {
        let mut pairs = Vec::new();
        for symbol in &self.symbols {
            for exchange in &self.exchanges {
                pairs.push((symbol.clone(), exchange.clone()));
            }
        }
        pairs
    }
}
