use rust_decimal::Decimal;
use rust_decimal_macros::dec;

/// Executor selection.
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub enum TradingMode {
    Paper,
    Live,
}

impl TradingMode {
    pub fn from_str(s: &str) -> Self {
        match s.to_lowercase().as_str() {
            "live" => TradingMode::Live,
            _ => TradingMode::Paper,
        }
    }

    pub fn label(&self) -> &'static str {
        match self {
            TradingMode::Paper => "paper",
            TradingMode::Live => "live",
        }
    }
}

/// Configuration loaded from environment variables.
///
/// Constructed once in `main` and passed to component constructors; there is
/// no process-wide singleton.
#[derive(Clone, Debug)]
pub struct Config {
    // Mode
    pub trading_mode: TradingMode,
    pub initial_balance: Decimal,

    // Exchange API
    pub api_base_url: String,
    pub ws_url: String,
    pub api_key_id: String,

    // Subscriptions
    pub market_slugs: Vec<String>,
    pub allow_in_game: bool,

    // Kelly sizing
    pub kelly_fraction: Decimal,
    pub min_edge: Decimal,

    // Exposure limits
    pub max_position_per_market: Decimal,
    pub max_portfolio_exposure: Decimal,
    pub max_correlated_exposure: Decimal,
    pub max_positions: usize,
    pub max_portfolio_exposure_pct: Decimal,

    // Circuit breaker
    pub max_daily_loss: Decimal,
    pub max_drawdown_pct: Decimal,
    pub max_total_pnl_drawdown_pct_for_new_buys: Decimal,

    // Trade floors & fees
    pub min_trade_size: Decimal,
    pub taker_fee_bps: Decimal,

    // Paper fill model
    pub maker_fill_fraction: Decimal,
    pub liquidation_discount: Decimal,

    // Cadence
    pub tick_interval_ms: u64,
    pub sports_feed_interval_ms: u64,
    pub odds_feed_interval_ms: u64,
    pub book_poll_interval_ms: u64,
    pub request_timeout_ms: u64,
    pub feed_stale_after_secs: i64,
}

fn env_str(key: &str, default: &str) -> String {
    std::env::var(key).unwrap_or_else(|_| default.into())
}

fn env_decimal(key: &str, default: Decimal) -> Decimal {
    std::env::var(key)
        .ok()
        .and_then(|s| s.parse().ok())
        .unwrap_or(default)
}

fn env_parse<T: std::str::FromStr>(key: &str, default: T) -> T {
    std::env::var(key)
        .ok()
        .and_then(|s| s.parse().ok())
        .unwrap_or(default)
}

fn env_bool(key: &str, default: bool) -> bool {
    std::env::var(key)
        .map(|v| v == "1" || v.to_lowercase() == "true")
        .unwrap_or(default)
}

impl Config {
    pub fn from_env() -> Self {
        let market_slugs: Vec<String> = std::env::var("MARKET_SLUGS")
            .unwrap_or_default()
            .split(',')
            .map(str::trim)
            .filter(|s| !s.is_empty())
            .map(String::from)
            .collect();

        Self {
            trading_mode: TradingMode::from_str(&env_str("TRADING_MODE", "paper")),
            initial_balance: env_decimal("INITIAL_BALANCE", dec!(1000)),

            api_base_url: env_str("PM_BASE_URL", "https://api.polymarket.us"),
            ws_url: env_str("PM_WS_URL", "wss://api.polymarket.us/v1/ws"),
            api_key_id: env_str("PM_API_KEY_ID", ""),

            market_slugs,
            allow_in_game: env_bool("ALLOW_IN_GAME", true),

            kelly_fraction: env_decimal("KELLY_FRACTION", dec!(0.25)),
            min_edge: env_decimal("MIN_EDGE", dec!(0.02)),

            max_position_per_market: env_decimal("MAX_POSITION_PER_MARKET", dec!(50)),
            max_portfolio_exposure: env_decimal("MAX_PORTFOLIO_EXPOSURE", dec!(250)),
            max_correlated_exposure: env_decimal("MAX_CORRELATED_EXPOSURE", dec!(125)),
            max_positions: env_parse("MAX_POSITIONS", 10),
            max_portfolio_exposure_pct: env_decimal("MAX_PORTFOLIO_EXPOSURE_PCT", dec!(0.35)),

            max_daily_loss: env_decimal("MAX_DAILY_LOSS", dec!(25)),
            max_drawdown_pct: env_decimal("MAX_DRAWDOWN_PCT", dec!(0.15)),
            max_total_pnl_drawdown_pct_for_new_buys: env_decimal(
                "MAX_TOTAL_PNL_DRAWDOWN_PCT_FOR_NEW_BUYS",
                dec!(0.05),
            ),

            min_trade_size: env_decimal("MIN_TRADE_SIZE", dec!(1)),
            taker_fee_bps: env_decimal("TAKER_FEE_BPS", dec!(0)),

            maker_fill_fraction: env_decimal("MAKER_FILL_FRACTION", dec!(0.02)),
            liquidation_discount: env_decimal("LIQUIDATION_DISCOUNT", dec!(0.9)),

            tick_interval_ms: env_parse("TICK_INTERVAL_MS", 500),
            sports_feed_interval_ms: env_parse("SPORTS_FEED_INTERVAL_MS", 2_000),
            odds_feed_interval_ms: env_parse("ODDS_FEED_INTERVAL_MS", 3_000),
            book_poll_interval_ms: env_parse("BOOK_POLL_INTERVAL_MS", 5_000),
            request_timeout_ms: env_parse("REQUEST_TIMEOUT_MS", 5_000),
            feed_stale_after_secs: env_parse("FEED_STALE_AFTER_SECS", 60),
        }
    }
}

impl Default for Config {
    /// Paper-mode defaults, used heavily by tests.
    fn default() -> Self {
        Self {
            trading_mode: TradingMode::Paper,
            initial_balance: dec!(1000),
            api_base_url: "https://api.polymarket.us".into(),
            ws_url: "wss://api.polymarket.us/v1/ws".into(),
            api_key_id: String::new(),
            market_slugs: Vec::new(),
            allow_in_game: true,
            kelly_fraction: dec!(0.25),
            min_edge: dec!(0.02),
            max_position_per_market: dec!(50),
            max_portfolio_exposure: dec!(250),
            max_correlated_exposure: dec!(125),
            max_positions: 10,
            max_portfolio_exposure_pct: dec!(0.35),
            max_daily_loss: dec!(25),
            max_drawdown_pct: dec!(0.15),
            max_total_pnl_drawdown_pct_for_new_buys: dec!(0.05),
            min_trade_size: dec!(1),
            taker_fee_bps: dec!(0),
            maker_fill_fraction: dec!(0.02),
            liquidation_discount: dec!(0.9),
            tick_interval_ms: 500,
            sports_feed_interval_ms: 2_000,
            odds_feed_interval_ms: 3_000,
            book_poll_interval_ms: 5_000,
            request_timeout_ms: 5_000,
            feed_stale_after_secs: 60,
        }
    }
}
