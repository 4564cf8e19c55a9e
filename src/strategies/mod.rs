pub mod live_arbitrage;
pub mod market_maker;
pub mod statistical_edge;

#[cfg(test)]
pub mod test_helpers;

use std::sync::Arc;

use chrono::{DateTime, Utc};
use rust_decimal::prelude::ToPrimitive;
use rust_decimal::Decimal;
use rust_decimal_macros::dec;

use crate::data::orderbook::OrderBookTracker;
use crate::state::{MarketState, StateManager};
use crate::types::Signal;

/// Read-through access to shared state for strategies. Strategies never
/// mutate shared state and never hold locks across awaits — every accessor
/// here returns owned snapshots.
#[derive(Clone)]
pub struct StrategyContext {
    pub state: Arc<StateManager>,
    pub tracker: Arc<OrderBookTracker>,
}

/// A pluggable trading strategy driven by the engine tick.
pub trait Strategy: Send {
    fn name(&self) -> &'static str;

    /// Called once per engine tick; bus-fed strategies drain their
    /// subscriptions here.
    fn on_tick(&mut self, ctx: &StrategyContext, now: DateTime<Utc>) -> Vec<Signal>;

    /// Called for each market whose quote changed since the prior tick.
    fn on_market_update(
        &mut self,
        _ctx: &StrategyContext,
        _market: &MarketState,
        _now: DateTime<Utc>,
    ) -> Vec<Signal> {
        Vec::new()
    }

    /// Fill-driven invalidation: any cached quote state for the market is
    /// stale and must be rebuilt next tick.
    fn on_fill(&mut self, _market_slug: &str) {}
}

/// Clamp a price into the quotable band.
pub fn clamp_price(price: Decimal) -> Decimal {
    price.clamp(dec!(0.01), dec!(0.99))
}

/// Whole contracts purchasable with `notional` USD at `price`.
pub fn contracts_for(notional: Decimal, price: Decimal) -> u64 {
    if price <= Decimal::ZERO {
        return 0;
    }
    (notional / price).floor().to_u64().unwrap_or(0)
}
