//! Exposure monitoring and limits.
//!
//! Exposure is USD notional committed: position cost basis plus
//! `limit_price × remaining_quantity` over open orders.

use std::collections::{HashMap, HashSet};

use rust_decimal::Decimal;
use tracing::{debug, info};

use super::RiskError;
use crate::state::StateManager;

/// Risk limit configuration.
#[derive(Clone, Debug)]
pub struct ExposureConfig {
    pub max_position_per_market: Decimal,
    pub max_portfolio_exposure: Decimal,
    pub max_correlated_exposure: Decimal,
    pub max_positions: usize,
}

/// Result of an exposure check. `max_additional_exposure` is the tightest
/// binding constraint across all limits; the risk manager uses it to reduce
/// quantity instead of rejecting outright where possible.
#[derive(Clone, Debug, PartialEq)]
pub struct ExposureCheck {
    pub allowed: bool,
    pub reason: String,
    pub max_additional_exposure: Decimal,
}

pub struct ExposureMonitor {
    config: ExposureConfig,
    groups: HashMap<String, HashSet<String>>,
    market_to_groups: HashMap<String, HashSet<String>>,
}

impl ExposureMonitor {
    pub fn new(config: ExposureConfig) -> Self {
        info!(
            max_position_per_market = %config.max_position_per_market,
            max_portfolio_exposure = %config.max_portfolio_exposure,
            max_correlated_exposure = %config.max_correlated_exposure,
            max_positions = config.max_positions,
            "exposure monitor initialized"
        );
        Self {
            config,
            groups: HashMap::new(),
            market_to_groups: HashMap::new(),
        }
    }

    // ── Correlation groups (operator input) ──

    /// Define or replace a correlation group.
    pub fn set_correlation_group(&mut self, group_name: &str, markets: &[String]) {
        let market_set: HashSet<String> = markets.iter().cloned().collect();
        for m in &market_set {
            self.market_to_groups
                .entry(m.clone())
                .or_default()
                .insert(group_name.to_string());
        }
        debug!(group = group_name, markets = market_set.len(), "correlation group set");
        self.groups.insert(group_name.to_string(), market_set);
    }

    pub fn correlation_groups(&self, market_slug: &str) -> HashSet<String> {
        self.market_to_groups
            .get(market_slug)
            .cloned()
            .unwrap_or_default()
    }

    // ── Exposure computations ──

    pub fn positions_exposure(&self, state: &StateManager, market_slug: Option<&str>) -> Decimal {
        state.exposure(market_slug)
    }

    pub fn open_orders_exposure(&self, state: &StateManager, market_slug: Option<&str>) -> Decimal {
        state.open_orders_exposure(market_slug)
    }

    /// Positions + open orders.
    pub fn total_exposure(&self, state: &StateManager, market_slug: Option<&str>) -> Decimal {
        self.positions_exposure(state, market_slug) + self.open_orders_exposure(state, market_slug)
    }

    fn correlated_exposure(&self, state: &StateManager, group_name: &str) -> Decimal {
        let Some(markets) = self.groups.get(group_name) else {
            return Decimal::ZERO;
        };
        markets
            .iter()
            .map(|m| self.total_exposure(state, Some(m)))
            .sum()
    }

    // ── Checks ──

    /// Whether `additional_exposure` USD can be added in a market, and how
    /// much would fit under the tightest limit.
    pub fn can_add_exposure(
        &self,
        state: &StateManager,
        market_slug: &str,
        additional_exposure: Decimal,
    ) -> Result<ExposureCheck, RiskError> {
        if additional_exposure < Decimal::ZERO {
            return Err(RiskError::InvalidInput("additional_exposure must be >= 0"));
        }
        if additional_exposure == Decimal::ZERO {
            return Ok(ExposureCheck {
                allowed: true,
                reason: "OK".into(),
                max_additional_exposure: Decimal::ZERO,
            });
        }

        // Position count only binds when a new market would be opened.
        let has_position = state.get_position(market_slug).is_some();
        if !has_position && state.position_count() >= self.config.max_positions {
            return Ok(ExposureCheck {
                allowed: false,
                reason: format!("Max positions reached: {}", self.config.max_positions),
                max_additional_exposure: Decimal::ZERO,
            });
        }

        let current_market = self.total_exposure(state, Some(market_slug));
        let current_total = self.total_exposure(state, None);

        let mut max_additional = self.config.max_portfolio_exposure - current_total;
        max_additional =
            max_additional.min(self.config.max_position_per_market - current_market);
        for group in self.correlation_groups(market_slug) {
            let current_group = self.correlated_exposure(state, &group);
            max_additional =
                max_additional.min(self.config.max_correlated_exposure - current_group);
        }

        if max_additional <= Decimal::ZERO {
            return Ok(ExposureCheck {
                allowed: false,
                reason: "Exposure limits reached".into(),
                max_additional_exposure: Decimal::ZERO,
            });
        }
        if additional_exposure > max_additional {
            return Ok(ExposureCheck {
                allowed: false,
                reason: "Proposed exposure exceeds limits; reduce size".into(),
                max_additional_exposure: max_additional,
            });
        }
        Ok(ExposureCheck {
            allowed: true,
            reason: "OK".into(),
            max_additional_exposure: max_additional,
        })
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::state::OrderState;
    use crate::types::{OrderIntent, OrderStatus, Side};
    use chrono::Utc;
    use rust_decimal_macros::dec;

    fn monitor(per_market: Decimal, portfolio: Decimal, correlated: Decimal) -> ExposureMonitor {
        ExposureMonitor::new(ExposureConfig {
            max_position_per_market: per_market,
            max_portfolio_exposure: portfolio,
            max_correlated_exposure: correlated,
            max_positions: 10,
        })
    }

    /// Scenario: $50 position exposure and a 40 × 0.50 open order in m1.
    /// Expected: total exposure combines both ($70).
    #[test]
    fn test_exposure_includes_open_orders() {
        let state = StateManager::new(dec!(1000));
        state.set_position("m1", Side::Yes, 100, dec!(0.50));
        state.add_order(OrderState {
            order_id: "o1".into(),
            market_slug: "m1".into(),
            intent: OrderIntent::BuyLong,
            price: dec!(0.50),
            quantity: 40,
            filled_quantity: 0,
            status: OrderStatus::Open,
            created_at: Utc::now(),
        });

        let m = monitor(dec!(1000), dec!(1000), dec!(1000));
        assert_eq!(m.positions_exposure(&state, Some("m1")), dec!(50));
        assert_eq!(m.open_orders_exposure(&state, Some("m1")), dec!(20));
        assert_eq!(m.total_exposure(&state, Some("m1")), dec!(70));
    }

    /// Scenario: $40 held in m1 with a $50 per-market cap; propose $20 more.
    /// Expected: not allowed, but the check reports $10 of remaining room.
    #[test]
    fn test_per_market_limit_reports_room() {
        let state = StateManager::new(dec!(1000));
        state.set_position("m1", Side::Yes, 80, dec!(0.50));

        let m = monitor(dec!(50), dec!(1000), dec!(1000));
        let check = m.can_add_exposure(&state, "m1", dec!(20)).unwrap();
        assert!(!check.allowed);
        assert_eq!(check.max_additional_exposure, dec!(10));
    }

    /// Scenario: two $50 positions in one correlation group capped at $80.
    /// Expected: even $1 more in a grouped market is blocked.
    #[test]
    fn test_correlation_limit() {
        let state = StateManager::new(dec!(1000));
        state.set_position("m1", Side::Yes, 100, dec!(0.50));
        state.set_position("m2", Side::Yes, 100, dec!(0.50));

        let mut m = monitor(dec!(1000), dec!(1000), dec!(80));
        m.set_correlation_group("nba-sunday", &["m1".into(), "m2".into()]);

        let check = m.can_add_exposure(&state, "m1", dec!(1)).unwrap();
        assert!(!check.allowed);
        assert_eq!(check.max_additional_exposure, Decimal::ZERO);
    }

    /// Scenario: max_positions = 1 with one position already held.
    /// Expected: a new market is blocked, but adding to the held market is not
    /// gated by the position count.
    #[test]
    fn test_max_positions_binds_new_markets_only() {
        let state = StateManager::new(dec!(1000));
        state.set_position("m1", Side::Yes, 10, dec!(0.50));

        let m = ExposureMonitor::new(ExposureConfig {
            max_position_per_market: dec!(1000),
            max_portfolio_exposure: dec!(1000),
            max_correlated_exposure: dec!(1000),
            max_positions: 1,
        });

        let new_market = m.can_add_exposure(&state, "m2", dec!(5)).unwrap();
        assert!(!new_market.allowed);
        assert!(new_market.reason.contains("Max positions"));

        let same_market = m.can_add_exposure(&state, "m1", dec!(5)).unwrap();
        assert!(same_market.allowed);
    }

    #[test]
    fn test_zero_additional_is_trivially_allowed() {
        let state = StateManager::new(dec!(1000));
        let m = monitor(dec!(50), dec!(250), dec!(125));
        let check = m.can_add_exposure(&state, "m1", Decimal::ZERO).unwrap();
        assert!(check.allowed);
    }

    #[test]
    fn test_negative_additional_is_an_error() {
        let state = StateManager::new(dec!(1000));
        let m = monitor(dec!(50), dec!(250), dec!(125));
        assert!(m.can_add_exposure(&state, "m1", dec!(-1)).is_err());
    }

    /// The portfolio cap is the tightest constraint when per-market room is
    /// larger than what the whole book allows.
    #[test]
    fn test_portfolio_cap_is_tightest() {
        let state = StateManager::new(dec!(1000));
        state.set_position("m1", Side::Yes, 100, dec!(0.50)); // 50
        state.set_position("m2", Side::Yes, 100, dec!(0.50)); // 50

        let m = monitor(dec!(80), dec!(110), dec!(1000));
        let check = m.can_add_exposure(&state, "m1", dec!(40)).unwrap();
        assert!(!check.allowed);
        // Portfolio: 110 − 100 = 10; per-market: 80 − 50 = 30.
        assert_eq!(check.max_additional_exposure, dec!(10));
    }
}
