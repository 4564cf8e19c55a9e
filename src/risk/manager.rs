//! Risk manager: Kelly sizing + exposure monitoring + circuit breaker,
//! composed into a single signal gate between the engine and the executor.

use std::sync::Arc;

use chrono::{DateTime, Utc};
use rust_decimal::prelude::ToPrimitive;
use rust_decimal::Decimal;
use rust_decimal_macros::dec;
use tracing::{info, warn};

use super::breaker::CircuitBreaker;
use super::exposure::{ExposureConfig, ExposureMonitor};
use super::sizer::{EdgeEstimate, KellyPositionSizer};
use super::RiskError;
use crate::config::Config;
use crate::data::orderbook::OrderBookTracker;
use crate::execution::liquidation_value;
use crate::state::StateManager;
use crate::types::Signal;

/// Fraction of cash considered spendable when capping buy quantity.
const CASH_BUFFER: Decimal = dec!(0.98);

#[derive(Clone, Debug)]
pub struct RiskConfig {
    pub kelly_fraction: Decimal,
    pub min_edge: Decimal,

    pub max_position_per_market: Decimal,
    pub max_portfolio_exposure: Decimal,
    pub max_correlated_exposure: Decimal,
    pub max_positions: usize,
    pub max_portfolio_exposure_pct: Decimal,

    pub max_daily_loss: Decimal,
    pub max_drawdown_pct: Decimal,
    pub max_total_pnl_drawdown_pct_for_new_buys: Decimal,

    pub min_trade_size: Decimal,
    pub liquidation_discount: Decimal,
}

impl RiskConfig {
    pub fn from_config(config: &Config) -> Self {
        Self {
            kelly_fraction: config.kelly_fraction,
            min_edge: config.min_edge,
            max_position_per_market: config.max_position_per_market,
            max_portfolio_exposure: config.max_portfolio_exposure,
            max_correlated_exposure: config.max_correlated_exposure,
            max_positions: config.max_positions,
            max_portfolio_exposure_pct: config.max_portfolio_exposure_pct,
            max_daily_loss: config.max_daily_loss,
            max_drawdown_pct: config.max_drawdown_pct,
            max_total_pnl_drawdown_pct_for_new_buys: config
                .max_total_pnl_drawdown_pct_for_new_buys,
            min_trade_size: config.min_trade_size,
            liquidation_discount: config.liquidation_discount,
        }
    }
}

/// Details of any resizing applied while evaluating a signal.
#[derive(Clone, Debug, Default, PartialEq)]
pub struct SizingInfo {
    pub reduced_for_cash: bool,
    pub max_affordable_qty: Option<u64>,
    pub kelly_contracts: Option<u64>,
    pub kelly_notional: Option<Decimal>,
    pub edge: Option<Decimal>,
    pub reduced_for_exposure: bool,
    pub max_additional_exposure: Option<Decimal>,
}

impl SizingInfo {
    fn is_empty(&self) -> bool {
        *self == SizingInfo::default()
    }
}

/// Decision returned for each evaluated signal. When approved, `signal` is
/// the (possibly resized) signal to execute.
#[derive(Clone, Debug)]
pub struct RiskDecision {
    pub approved: bool,
    pub signal: Option<Signal>,
    pub reason: String,
    pub sizing: Option<SizingInfo>,
}

impl RiskDecision {
    fn approve(signal: Signal, reason: impl Into<String>, sizing: Option<SizingInfo>) -> Self {
        Self {
            approved: true,
            signal: Some(signal),
            reason: reason.into(),
            sizing,
        }
    }

    fn reject(reason: impl Into<String>) -> Self {
        Self {
            approved: false,
            signal: None,
            reason: reason.into(),
            sizing: None,
        }
    }
}

/// Complete risk management system.
///
/// Engine contract: call `evaluate_signal` before execution and execute the
/// returned signal when approved; call `on_state_update` after fills so the
/// breaker sees post-tick equity.
pub struct RiskManager {
    config: RiskConfig,
    state: Arc<StateManager>,
    tracker: Arc<OrderBookTracker>,
    sizer: KellyPositionSizer,
    exposure: ExposureMonitor,
    breaker: CircuitBreaker,
    starting_equity: Decimal,
}

impl RiskManager {
    pub fn new(
        config: RiskConfig,
        state: Arc<StateManager>,
        tracker: Arc<OrderBookTracker>,
        now: DateTime<Utc>,
    ) -> Result<Self, RiskError> {
        // The sizer's own clamp is left wide open; absolute dollar caps are
        // enforced by the exposure monitor afterwards.
        let sizer = KellyPositionSizer::new(config.kelly_fraction, Decimal::ONE, config.min_edge)?;
        let exposure = ExposureMonitor::new(ExposureConfig {
            max_position_per_market: config.max_position_per_market,
            max_portfolio_exposure: config.max_portfolio_exposure,
            max_correlated_exposure: config.max_correlated_exposure,
            max_positions: config.max_positions,
        });
        let mut breaker = CircuitBreaker::new(config.max_daily_loss, config.max_drawdown_pct, now)?;

        let starting_equity = equity_of(&state, &tracker, config.liquidation_discount);
        breaker.initialize(starting_equity, now)?;

        info!(
            starting_equity = %starting_equity,
            kelly_fraction = %config.kelly_fraction,
            max_daily_loss = %config.max_daily_loss,
            max_portfolio_exposure = %config.max_portfolio_exposure,
            "risk manager initialized"
        );

        Ok(Self {
            config,
            state,
            tracker,
            sizer,
            exposure,
            breaker,
            starting_equity,
        })
    }

    // ── Public surface ──

    pub fn set_correlation_group(&mut self, group_name: &str, markets: &[String]) {
        self.exposure.set_correlation_group(group_name, markets);
    }

    pub fn breaker(&self) -> &CircuitBreaker {
        &self.breaker
    }

    pub fn breaker_mut(&mut self) -> &mut CircuitBreaker {
        &mut self.breaker
    }

    pub fn current_equity(&self) -> Decimal {
        equity_of(&self.state, &self.tracker, self.config.liquidation_discount)
    }

    /// Update the circuit breaker from latest equity.
    pub fn on_state_update(&mut self, now: DateTime<Utc>) {
        self.breaker.update(self.current_equity(), now);
    }

    /// Re-baseline starting equity, e.g. after a live startup sync populates
    /// real balance and positions.
    pub fn reset_starting_equity(&mut self, now: DateTime<Utc>) -> Result<(), RiskError> {
        self.starting_equity = self.current_equity();
        self.breaker.initialize(self.starting_equity, now)?;
        info!(starting_equity = %self.starting_equity, "risk baseline reset");
        Ok(())
    }

    /// Validate and possibly resize a signal.
    pub fn evaluate_signal(&mut self, signal: &Signal, now: DateTime<Utc>) -> RiskDecision {
        // Cancels always pass: they only ever reduce risk.
        if signal.action.is_cancel() {
            return RiskDecision::approve(signal.clone(), "Approved: cancel", None);
        }

        self.on_state_update(now);
        let (can_trade, trip_reason) = {
            let (ok, reason) = self.breaker.can_trade();
            (ok, reason.map(str::to_string))
        };
        if !can_trade {
            if signal.action.is_sell() {
                return RiskDecision::approve(
                    signal.clone(),
                    "Approved: circuit breaker allows exits",
                    None,
                );
            }
            return RiskDecision::reject(format!(
                "Circuit breaker: {}",
                trip_reason.as_deref().unwrap_or("tripped")
            ));
        }

        let mut qty = signal.quantity;
        if qty == 0 {
            return RiskDecision::reject("Rejected: non-positive quantity");
        }

        let mut sizing = SizingInfo::default();

        if signal.action.is_buy() {
            let Some(price) = signal.price.filter(|p| *p > Decimal::ZERO) else {
                return RiskDecision::reject("Rejected: buy signal without price");
            };

            // Cap by spendable cash.
            let available_cash = self.state.get_balance();
            let max_affordable_qty = ((available_cash * CASH_BUFFER) / price)
                .floor()
                .to_u64()
                .unwrap_or(0);
            if max_affordable_qty == 0 {
                return RiskDecision::reject("Rejected: insufficient available cash");
            }
            if qty > max_affordable_qty {
                qty = max_affordable_qty;
                sizing.reduced_for_cash = true;
                sizing.max_affordable_qty = Some(max_affordable_qty);
            }

            // Kelly sizing only when the strategy supplied a probability hint.
            if let Some(prob) = signal.true_probability() {
                if prob < Decimal::ZERO || prob > Decimal::ONE {
                    warn!(
                        market_slug = %signal.market_slug,
                        strategy = signal.strategy_name,
                        probability = %prob,
                        "out-of-range true probability hint ignored"
                    );
                } else {
                    let confidence = signal.confidence.clamp(Decimal::ZERO, Decimal::ONE);
                    let edge = match EdgeEstimate::new(prob, confidence) {
                        Ok(e) => e,
                        Err(e) => return RiskDecision::reject(format!("Rejected: {e}")),
                    };
                    let bankroll = self.current_equity();
                    if bankroll <= Decimal::ZERO {
                        return RiskDecision::reject("Rejected: no equity to size against");
                    }
                    match self.sizer.calculate_position_size(bankroll, price, edge) {
                        Ok(Some(result)) => {
                            qty = qty.min(result.contracts);
                            sizing.kelly_contracts = Some(result.contracts);
                            sizing.kelly_notional = Some(result.notional);
                            sizing.edge = Some(result.edge);
                        }
                        Ok(None) => {
                            return RiskDecision::reject("Rejected: insufficient edge/confidence")
                        }
                        Err(e) => return RiskDecision::reject(format!("Rejected: {e}")),
                    }
                }
            }
        }

        // Minimum trade size.
        if let Some(price) = signal.price {
            let notional = price * Decimal::from(qty);
            if notional < self.config.min_trade_size {
                return RiskDecision::reject(format!(
                    "Rejected: below min trade size ${notional:.2}"
                ));
            }
        }

        // Exposure limits bind BUY signals only; sells reduce exposure.
        if signal.action.is_buy() {
            if self.new_buy_blocked_by_drawdown() {
                return RiskDecision::reject("Rejected: portfolio drawdown blocks new buys");
            }

            let price = signal.price.unwrap_or_default();
            let mut notional = price * Decimal::from(qty);
            let check = match self
                .exposure
                .can_add_exposure(&self.state, &signal.market_slug, notional)
            {
                Ok(c) => c,
                Err(e) => return RiskDecision::reject(format!("Rejected: {e}")),
            };

            let mut max_additional = check.max_additional_exposure;
            let mut limit_reason = if check.allowed {
                "Exposure limits reached".to_string()
            } else {
                check.reason.clone()
            };
            if self.config.max_portfolio_exposure_pct > Decimal::ZERO {
                let current_total = self.exposure.total_exposure(&self.state, None);
                let max_by_pct = (self.current_equity() * self.config.max_portfolio_exposure_pct
                    - current_total)
                    .max(Decimal::ZERO);
                if max_by_pct < max_additional {
                    max_additional = max_by_pct;
                    limit_reason = "Portfolio exposure percent limit reached".to_string();
                }
            }

            if !check.allowed && max_additional <= Decimal::ZERO {
                return RiskDecision::reject(format!("Rejected: {}", check.reason));
            }

            if notional > max_additional {
                if max_additional >= self.config.min_trade_size {
                    let reduced_qty = (max_additional / price).floor().to_u64().unwrap_or(0);
                    if reduced_qty == 0 {
                        return RiskDecision::reject("Rejected: exposure limits");
                    }
                    qty = qty.min(reduced_qty);
                    notional = price * Decimal::from(qty);
                    sizing.reduced_for_exposure = true;
                    sizing.max_additional_exposure = Some(max_additional);
                } else {
                    return RiskDecision::reject(format!("Rejected: {limit_reason}"));
                }
            }

            if notional < self.config.min_trade_size {
                return RiskDecision::reject(format!(
                    "Rejected: below min trade size ${notional:.2}"
                ));
            }
        }

        let sizing = if sizing.is_empty() { None } else { Some(sizing) };
        if qty != signal.quantity {
            let mut resized = signal.clone();
            resized.quantity = qty;
            info!(
                market_slug = %signal.market_slug,
                strategy = signal.strategy_name,
                requested = signal.quantity,
                approved = qty,
                "signal resized"
            );
            return RiskDecision::approve(resized, "Approved: resized", sizing);
        }
        RiskDecision::approve(signal.clone(), "Approved", sizing)
    }

    fn new_buy_blocked_by_drawdown(&self) -> bool {
        if self.config.max_total_pnl_drawdown_pct_for_new_buys <= Decimal::ZERO {
            return false;
        }
        if self.starting_equity <= Decimal::ZERO {
            return false;
        }
        let drawdown_pct =
            (self.starting_equity - self.current_equity()) / self.starting_equity;
        drawdown_pct >= self.config.max_total_pnl_drawdown_pct_for_new_buys
    }
}

fn equity_of(state: &StateManager, tracker: &OrderBookTracker, discount: Decimal) -> Decimal {
    state.total_equity(|pos| liquidation_value(pos, tracker.get(&pos.market_slug).as_ref(), discount))
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::types::{SignalAction, SignalHint, Urgency};
    use chrono::TimeZone;

    fn at(day: u32, hour: u32) -> DateTime<Utc> {
        Utc.with_ymd_and_hms(2026, 1, day, hour, 0, 0).unwrap()
    }

    fn wide_open_config() -> RiskConfig {
        RiskConfig {
            kelly_fraction: dec!(0.25),
            min_edge: dec!(0.02),
            max_position_per_market: dec!(1000),
            max_portfolio_exposure: dec!(1000),
            max_correlated_exposure: dec!(1000),
            max_positions: 10,
            max_portfolio_exposure_pct: Decimal::ZERO,
            max_daily_loss: dec!(1000),
            max_drawdown_pct: dec!(1.0),
            max_total_pnl_drawdown_pct_for_new_buys: Decimal::ZERO,
            min_trade_size: dec!(1),
            liquidation_discount: dec!(0.9),
        }
    }

    fn manager(config: RiskConfig) -> RiskManager {
        let state = Arc::new(StateManager::new(dec!(1000)));
        let tracker = Arc::new(OrderBookTracker::new());
        RiskManager::new(config, state, tracker, at(26, 9)).unwrap()
    }

    fn buy_signal(qty: u64, hint: Option<SignalHint>) -> Signal {
        Signal {
            market_slug: "m1".into(),
            action: SignalAction::BuyYes,
            price: Some(dec!(0.50)),
            quantity: qty,
            urgency: Urgency::Low,
            confidence: dec!(0.8),
            strategy_name: "test",
            reason: String::new(),
            hint,
            order_id: None,
        }
    }

    fn sell_signal(qty: u64) -> Signal {
        Signal {
            market_slug: "m1".into(),
            action: SignalAction::SellYes,
            price: Some(dec!(0.50)),
            quantity: qty,
            urgency: Urgency::Low,
            confidence: dec!(0.5),
            strategy_name: "test",
            reason: String::new(),
            hint: None,
            order_id: None,
        }
    }

    /// Kelly golden case through the full pipeline: a huge requested quantity
    /// is cut to the 80 contracts quarter-Kelly allows.
    #[test]
    fn test_kelly_resizes_buy_signal() {
        let mut rm = manager(wide_open_config());
        let sig = buy_signal(10_000, Some(SignalHint::TrueProbability(dec!(0.60))));
        let decision = rm.evaluate_signal(&sig, at(26, 10));
        assert!(decision.approved, "{}", decision.reason);
        assert_eq!(decision.signal.unwrap().quantity, 80);
        let sizing = decision.sizing.unwrap();
        assert_eq!(sizing.kelly_contracts, Some(80));
    }

    /// Scenario: no probability hint, exposure caps at $50.
    /// Expected: $500 request reduced to 100 contracts ($50 at 0.50).
    #[test]
    fn test_exposure_reduces_signal_without_hint() {
        let mut config = wide_open_config();
        config.max_position_per_market = dec!(50);
        config.max_portfolio_exposure = dec!(50);
        config.min_edge = Decimal::ZERO;
        let mut rm = manager(config);

        let sig = buy_signal(1000, None);
        let decision = rm.evaluate_signal(&sig, at(26, 10));
        assert!(decision.approved, "{}", decision.reason);
        assert_eq!(decision.signal.unwrap().quantity, 100);
        assert!(decision.sizing.unwrap().reduced_for_exposure);
    }

    /// Scenario: cap $50, existing $40 held, incoming $50 notional.
    /// Expected: resized to $10 (20 contracts at 0.50). With min_trade_size
    /// above $10 the same signal is rejected instead.
    #[test]
    fn test_exposure_resize_then_min_trade_reject() {
        let mut config = wide_open_config();
        config.max_position_per_market = dec!(50);
        let mut rm = manager(config);
        rm.state.set_position("m1", crate::types::Side::Yes, 80, dec!(0.50)); // $40

        let sig = buy_signal(100, None); // $50 notional
        let decision = rm.evaluate_signal(&sig, at(26, 10));
        assert!(decision.approved, "{}", decision.reason);
        assert_eq!(decision.signal.unwrap().quantity, 20);

        let mut config = wide_open_config();
        config.max_position_per_market = dec!(50);
        config.min_trade_size = dec!(15);
        let mut rm = manager(config);
        rm.state.set_position("m1", crate::types::Side::Yes, 80, dec!(0.50));
        let decision = rm.evaluate_signal(&buy_signal(100, None), at(26, 10));
        assert!(!decision.approved);
    }

    /// Emergency stop blocks buys but lets exits through.
    #[test]
    fn test_breaker_blocks_buys_allows_sells() {
        let mut rm = manager(wide_open_config());
        rm.breaker_mut().emergency_stop("test", at(26, 10));

        let buy = rm.evaluate_signal(&buy_signal(10, None), at(26, 10));
        assert!(!buy.approved);
        assert!(buy.reason.contains("Circuit breaker"));

        let sell = rm.evaluate_signal(&sell_signal(10), at(26, 10));
        assert!(sell.approved);
    }

    /// Scenario: day start 1000, limit 25. Equity 980 still trades;
    /// 970 trips; afterwards BUY is rejected and SELL allowed.
    #[test]
    fn test_daily_loss_pipeline() {
        let mut config = wide_open_config();
        config.max_daily_loss = dec!(25);
        let mut rm = manager(config);

        rm.state.set_balance(dec!(980));
        assert!(rm.evaluate_signal(&buy_signal(10, None), at(26, 10)).approved);

        rm.state.set_balance(dec!(970));
        let buy = rm.evaluate_signal(&buy_signal(10, None), at(26, 11));
        assert!(!buy.approved);
        let sell = rm.evaluate_signal(&sell_signal(10), at(26, 11));
        assert!(sell.approved);
    }

    /// Cancels are approved unchanged even when tripped.
    #[test]
    fn test_cancel_always_passes() {
        let mut rm = manager(wide_open_config());
        rm.breaker_mut().emergency_stop("test", at(26, 10));
        let cancel = Signal {
            market_slug: "m1".into(),
            action: SignalAction::Cancel,
            price: None,
            quantity: 1,
            urgency: Urgency::High,
            confidence: Decimal::ONE,
            strategy_name: "test",
            reason: String::new(),
            hint: None,
            order_id: Some("o1".into()),
        };
        assert!(rm.evaluate_signal(&cancel, at(26, 10)).approved);
    }

    /// Scenario: quantity beyond what cash affords at the buffered balance.
    /// Expected: reduced to ⌊cash × 0.98 / price⌋ contracts.
    #[test]
    fn test_cash_cap_reduces() {
        let mut config = wide_open_config();
        config.max_position_per_market = dec!(10_000);
        config.max_portfolio_exposure = dec!(10_000);
        let mut rm = manager(config);
        rm.state.set_balance(dec!(100));

        let decision = rm.evaluate_signal(&buy_signal(500, None), at(26, 10));
        assert!(decision.approved, "{}", decision.reason);
        // 100 × 0.98 / 0.50 = 196
        assert_eq!(decision.signal.unwrap().quantity, 196);
        assert!(decision.sizing.unwrap().reduced_for_cash);
    }

    #[test]
    fn test_no_cash_rejects() {
        let mut rm = manager(wide_open_config());
        rm.state.set_balance(Decimal::ZERO);
        let decision = rm.evaluate_signal(&buy_signal(10, None), at(26, 10));
        assert!(!decision.approved);
        assert!(decision.reason.contains("insufficient available cash"));
    }

    /// Startup drawdown lockout: equity 5% below the baseline blocks new
    /// buys while sells still pass.
    #[test]
    fn test_total_drawdown_blocks_new_buys() {
        let mut config = wide_open_config();
        config.max_total_pnl_drawdown_pct_for_new_buys = dec!(0.05);
        let mut rm = manager(config);

        rm.state.set_balance(dec!(950));
        let buy = rm.evaluate_signal(&buy_signal(10, None), at(26, 10));
        assert!(!buy.approved);
        assert!(buy.reason.contains("drawdown blocks new buys"));
        assert!(rm.evaluate_signal(&sell_signal(10), at(26, 10)).approved);
    }

    /// Equity-relative portfolio cap binds tighter than the absolute cap.
    #[test]
    fn test_portfolio_pct_cap() {
        let mut config = wide_open_config();
        config.max_portfolio_exposure_pct = dec!(0.10);
        let mut rm = manager(config);

        // Equity 1000 → pct cap $100. Request $200.
        let decision = rm.evaluate_signal(&buy_signal(400, None), at(26, 10));
        assert!(decision.approved, "{}", decision.reason);
        assert_eq!(decision.signal.unwrap().quantity, 200);
    }

    #[test]
    fn test_zero_quantity_rejected() {
        let mut rm = manager(wide_open_config());
        let decision = rm.evaluate_signal(&buy_signal(0, None), at(26, 10));
        assert!(!decision.approved);
    }

    /// Insufficient edge from the hint rejects rather than resizing.
    #[test]
    fn test_insufficient_edge_rejects() {
        let mut rm = manager(wide_open_config());
        let sig = buy_signal(100, Some(SignalHint::TrueProbability(dec!(0.51))));
        let decision = rm.evaluate_signal(&sig, at(26, 10));
        assert!(!decision.approved);
        assert!(decision.reason.contains("insufficient edge"));
    }
}
