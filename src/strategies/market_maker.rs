//! Two-sided market making around the YES mid.
//!
//! Quotes a bid and an ask a half-spread away from the mid, skewed against
//! current inventory. Quotes are cached per market and only re-issued when
//! the target prices move or a fill invalidates the cache.

use std::collections::HashMap;

use chrono::{DateTime, Utc};
use rust_decimal::Decimal;
use rust_decimal_macros::dec;
use tracing::debug;

use super::{clamp_price, contracts_for, Strategy, StrategyContext};
use crate::types::{Side, Signal, SignalAction, Urgency};

pub const NAME: &str = "market_maker";

#[derive(Clone, Debug)]
pub struct MarketMakerConfig {
    /// Distance from mid to each quote.
    pub half_spread: Decimal,
    /// Target USD notional per quote.
    pub order_size: Decimal,
    /// Price shift per held contract, leaning quotes against inventory.
    pub inventory_skew: Decimal,
    /// Stop quoting the bid side once inventory reaches this many contracts.
    pub max_inventory: u64,
}

impl Default for MarketMakerConfig {
    fn default() -> Self {
        Self {
            half_spread: dec!(0.02),
            order_size: dec!(10.00),
            inventory_skew: dec!(0.001),
            max_inventory: 200,
        }
    }
}

#[derive(Clone, Copy, Debug, PartialEq)]
struct QuotePair {
    bid: Decimal,
    ask: Decimal,
}

pub struct MarketMaker {
    config: MarketMakerConfig,
    quotes: HashMap<String, QuotePair>,
}

impl MarketMaker {
    pub fn new(config: MarketMakerConfig) -> Self {
        Self {
            config,
            quotes: HashMap::new(),
        }
    }

    /// Compute target quotes for one market and diff them against the cache.
    fn quote_market(&mut self, ctx: &StrategyContext, market_slug: &str) -> Vec<Signal> {
        let Some(mid) = ctx.tracker.mid(market_slug, Side::Yes) else {
            return Vec::new();
        };

        // Lean quotes against inventory so fills mean-revert the position.
        let (inventory, inventory_side) = match ctx.state.get_position(market_slug) {
            Some(pos) => (pos.quantity, Some(pos.side)),
            None => (0, None),
        };
        let skew = match inventory_side {
            Some(Side::Yes) => -self.config.inventory_skew * Decimal::from(inventory),
            Some(Side::No) => self.config.inventory_skew * Decimal::from(inventory),
            None => Decimal::ZERO,
        };
        let center = mid + skew;

        let target = QuotePair {
            bid: clamp_price(center - self.config.half_spread),
            ask: clamp_price(center + self.config.half_spread),
        };
        if target.bid >= target.ask {
            return Vec::new();
        }
        if self.quotes.get(market_slug) == Some(&target) {
            return Vec::new();
        }

        let mut signals = Vec::new();

        // Pull stale quotes before placing the new pair.
        for order in ctx.state.get_open_orders(Some(market_slug)) {
            if order.price != target.bid && order.price != target.ask {
                signals.push(Signal {
                    market_slug: market_slug.to_string(),
                    action: SignalAction::Cancel,
                    price: None,
                    quantity: order.remaining_quantity().max(1),
                    urgency: Urgency::Low,
                    confidence: dec!(0.5),
                    strategy_name: NAME,
                    reason: "requote".into(),
                    hint: None,
                    order_id: Some(order.order_id.clone()),
                });
            }
        }

        // Bid side: accumulate YES inventory until the cap.
        let long_inventory = if inventory_side == Some(Side::Yes) { inventory } else { 0 };
        if long_inventory < self.config.max_inventory {
            let quantity = contracts_for(self.config.order_size, target.bid);
            if quantity > 0 {
                signals.push(Signal {
                    market_slug: market_slug.to_string(),
                    action: SignalAction::BuyYes,
                    price: Some(target.bid),
                    quantity,
                    urgency: Urgency::Low,
                    confidence: dec!(0.5),
                    strategy_name: NAME,
                    reason: format!("quote bid around mid {mid:.2}"),
                    hint: None,
                    order_id: None,
                });
            }
        }

        // Ask side: sell held YES when there is inventory, otherwise provide
        // the offer through the complement (buying NO at 1 − ask).
        if long_inventory > 0 {
            let quantity = contracts_for(self.config.order_size, target.ask).min(long_inventory);
            if quantity > 0 {
                signals.push(Signal {
                    market_slug: market_slug.to_string(),
                    action: SignalAction::SellYes,
                    price: Some(target.ask),
                    quantity,
                    urgency: Urgency::Low,
                    confidence: dec!(0.5),
                    strategy_name: NAME,
                    reason: format!("quote ask around mid {mid:.2}"),
                    hint: None,
                    order_id: None,
                });
            }
        } else {
            let no_price = clamp_price(Decimal::ONE - target.ask);
            let quantity = contracts_for(self.config.order_size, no_price);
            if quantity > 0 {
                signals.push(Signal {
                    market_slug: market_slug.to_string(),
                    action: SignalAction::BuyNo,
                    price: Some(no_price),
                    quantity,
                    urgency: Urgency::Low,
                    confidence: dec!(0.5),
                    strategy_name: NAME,
                    reason: format!("quote offer via complement around mid {mid:.2}"),
                    hint: None,
                    order_id: None,
                });
            }
        }

        if !signals.is_empty() {
            debug!(market_slug, bid = %target.bid, ask = %target.ask, "requoting");
            self.quotes.insert(market_slug.to_string(), target);
        }
        signals
    }
}

impl Strategy for MarketMaker {
    fn name(&self) -> &'static str {
        NAME
    }

    /// Re-quote any market without a live cached quote (first sight or
    /// fill-invalidated).
    fn on_tick(&mut self, ctx: &StrategyContext, _now: DateTime<Utc>) -> Vec<Signal> {
        let mut signals = Vec::new();
        for market in ctx.state.all_markets() {
            if !self.quotes.contains_key(&market.market_slug) {
                signals.extend(self.quote_market(ctx, &market.market_slug));
            }
        }
        signals
    }

    /// Book moved: recompute targets, emitting only on a change.
    fn on_market_update(
        &mut self,
        ctx: &StrategyContext,
        market: &crate::state::MarketState,
        _now: DateTime<Utc>,
    ) -> Vec<Signal> {
        self.quote_market(ctx, &market.market_slug)
    }

    fn on_fill(&mut self, market_slug: &str) {
        self.quotes.remove(market_slug);
    }
}
