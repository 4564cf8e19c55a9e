//! Centralized, thread-safe container for markets, positions, open orders,
//! and the cash balance. All mutations serialize on a single lock; nothing
//! here suspends while holding it.

use std::collections::HashMap;

use chrono::{DateTime, Utc};
use parking_lot::Mutex;
use rust_decimal::Decimal;
use thiserror::Error;
use tracing::debug;

use crate::types::{OrderIntent, OrderStatus, Side};

#[derive(Debug, Error, PartialEq)]
pub enum StateError {
    #[error("price must be between 0 and 1 (exclusive): {0}")]
    InvalidPrice(Decimal),
    #[error("quantity must be > 0")]
    InvalidQuantity,
    #[error("crossed quote for {market_slug}: bid {bid} > ask {ask}")]
    CrossedQuote {
        market_slug: String,
        bid: Decimal,
        ask: Decimal,
    },
    #[error("insufficient cash: required {required}, available {available}")]
    InsufficientCash {
        required: Decimal,
        available: Decimal,
    },
    #[error("no position in {0}")]
    NoPosition(String),
    #[error("position side mismatch in {market_slug}: held {held}, fill {fill}")]
    SideMismatch {
        market_slug: String,
        held: Side,
        fill: Side,
    },
    #[error("fill of {requested} exceeds position quantity {held}")]
    ExceedsPosition { requested: u64, held: u64 },
    #[error("order not found: {0}")]
    OrderNotFound(String),
    #[error("fill of {fill} exceeds order remainder {remaining}")]
    ExceedsOrder { fill: u64, remaining: u64 },
}

// ─── Entities ───

/// Best bid/ask view of one market, per contract side.
#[derive(Clone, Debug)]
pub struct MarketState {
    pub market_slug: String,
    pub yes_bid: Option<Decimal>,
    pub yes_ask: Option<Decimal>,
    pub no_bid: Option<Decimal>,
    pub no_ask: Option<Decimal>,
    pub last_update: DateTime<Utc>,
}

/// An open position. Quantity is strictly positive; reaching zero removes
/// the entity.
#[derive(Clone, Debug, PartialEq)]
pub struct PositionState {
    pub market_slug: String,
    pub side: Side,
    pub quantity: u64,
    pub avg_price: Decimal,
}

impl PositionState {
    /// USD notional committed: avg_price × quantity.
    #[inline]
    pub fn cost_basis(&self) -> Decimal {
        self.avg_price * Decimal::from(self.quantity)
    }
}

/// An order known to the engine. Terminal orders are removed from the table.
#[derive(Clone, Debug)]
pub struct OrderState {
    pub order_id: String,
    pub market_slug: String,
    pub intent: OrderIntent,
    pub price: Decimal,
    pub quantity: u64,
    pub filled_quantity: u64,
    pub status: OrderStatus,
    pub created_at: DateTime<Utc>,
}

impl OrderState {
    #[inline]
    pub fn remaining_quantity(&self) -> u64 {
        self.quantity.saturating_sub(self.filled_quantity)
    }

    pub fn is_open(&self) -> bool {
        !self.status.is_terminal()
    }
}

// ─── Manager ───

struct Inner {
    markets: HashMap<String, MarketState>,
    positions: HashMap<String, PositionState>,
    orders: HashMap<String, OrderState>,
    cash: Decimal,
    realized_pnl: Decimal,
}

pub struct StateManager {
    inner: Mutex<Inner>,
}

impl StateManager {
    pub fn new(initial_balance: Decimal) -> Self {
        Self {
            inner: Mutex::new(Inner {
                markets: HashMap::new(),
                positions: HashMap::new(),
                orders: HashMap::new(),
                cash: initial_balance,
                realized_pnl: Decimal::ZERO,
            }),
        }
    }

    // ── Markets ──

    pub fn update_market(
        &self,
        market_slug: &str,
        yes_bid: Option<Decimal>,
        yes_ask: Option<Decimal>,
        no_bid: Option<Decimal>,
        no_ask: Option<Decimal>,
        now: DateTime<Utc>,
    ) -> Result<(), StateError> {
        for (bid, ask) in [(yes_bid, yes_ask), (no_bid, no_ask)] {
            if let (Some(b), Some(a)) = (bid, ask) {
                if b > a {
                    return Err(StateError::CrossedQuote {
                        market_slug: market_slug.to_string(),
                        bid: b,
                        ask: a,
                    });
                }
            }
        }
        let mut inner = self.inner.lock();
        inner.markets.insert(
            market_slug.to_string(),
            MarketState {
                market_slug: market_slug.to_string(),
                yes_bid,
                yes_ask,
                no_bid,
                no_ask,
                last_update: now,
            },
        );
        Ok(())
    }

    pub fn get_market(&self, market_slug: &str) -> Option<MarketState> {
        self.inner.lock().markets.get(market_slug).cloned()
    }

    pub fn all_markets(&self) -> Vec<MarketState> {
        self.inner.lock().markets.values().cloned().collect()
    }

    // ── Balance ──

    pub fn get_balance(&self) -> Decimal {
        self.inner.lock().cash
    }

    /// Apply a signed cash delta. Paper mode never lets cash go negative.
    pub fn adjust_balance(&self, delta: Decimal) -> Result<Decimal, StateError> {
        let mut inner = self.inner.lock();
        let next = inner.cash + delta;
        if next < Decimal::ZERO {
            return Err(StateError::InsufficientCash {
                required: -delta,
                available: inner.cash,
            });
        }
        inner.cash = next;
        Ok(next)
    }

    /// Overwrite the balance (live reconciliation only).
    pub fn set_balance(&self, cash: Decimal) {
        self.inner.lock().cash = cash;
    }

    pub fn realized_pnl(&self) -> Decimal {
        self.inner.lock().realized_pnl
    }

    // ── Positions ──

    pub fn get_position(&self, market_slug: &str) -> Option<PositionState> {
        self.inner.lock().positions.get(market_slug).cloned()
    }

    pub fn all_positions(&self) -> Vec<PositionState> {
        self.inner.lock().positions.values().cloned().collect()
    }

    pub fn position_count(&self) -> usize {
        self.inner.lock().positions.len()
    }

    /// Fill that adds to (or opens) a position on `side`. Same-side fills
    /// recompute avg_price as the weighted average of prior cost basis and
    /// the new fill. Opposite-side fills are a caller error: the executor
    /// closes the existing position first on a side flip.
    pub fn apply_buy_fill(
        &self,
        market_slug: &str,
        side: Side,
        quantity: u64,
        price: Decimal,
    ) -> Result<PositionState, StateError> {
        validate_fill(quantity, price)?;
        let mut inner = self.inner.lock();
        if let Some(pos) = inner.positions.get_mut(market_slug) {
            if pos.side != side {
                return Err(StateError::SideMismatch {
                    market_slug: market_slug.to_string(),
                    held: pos.side,
                    fill: side,
                });
            }
            let prior = pos.cost_basis();
            let added = price * Decimal::from(quantity);
            pos.quantity += quantity;
            pos.avg_price = (prior + added) / Decimal::from(pos.quantity);
            return Ok(pos.clone());
        }
        let pos = PositionState {
            market_slug: market_slug.to_string(),
            side,
            quantity,
            avg_price: price,
        };
        inner.positions.insert(market_slug.to_string(), pos.clone());
        Ok(pos)
    }

    /// Fill that reduces the position, realizing `(exit − avg) × closed` at
    /// an unchanged avg price. Reaching zero removes the position. Returns
    /// the realized PnL of the reduction.
    pub fn apply_sell_fill(
        &self,
        market_slug: &str,
        quantity: u64,
        price: Decimal,
    ) -> Result<Decimal, StateError> {
        validate_fill(quantity, price)?;
        let mut inner = self.inner.lock();
        let pos = inner
            .positions
            .get_mut(market_slug)
            .ok_or_else(|| StateError::NoPosition(market_slug.to_string()))?;
        if quantity > pos.quantity {
            return Err(StateError::ExceedsPosition {
                requested: quantity,
                held: pos.quantity,
            });
        }
        let realized = (price - pos.avg_price) * Decimal::from(quantity);
        pos.quantity -= quantity;
        let emptied = pos.quantity == 0;
        if emptied {
            inner.positions.remove(market_slug);
            debug!(market_slug, "position closed");
        }
        inner.realized_pnl += realized;
        Ok(realized)
    }

    /// Overwrite a position outright (reconciliation and tests).
    pub fn set_position(&self, market_slug: &str, side: Side, quantity: u64, avg_price: Decimal) {
        let mut inner = self.inner.lock();
        if quantity == 0 {
            inner.positions.remove(market_slug);
            return;
        }
        inner.positions.insert(
            market_slug.to_string(),
            PositionState {
                market_slug: market_slug.to_string(),
                side,
                quantity,
                avg_price,
            },
        );
    }

    pub fn remove_position(&self, market_slug: &str) {
        self.inner.lock().positions.remove(market_slug);
    }

    // ── Orders ──

    /// Track an order. Terminal orders are not stored.
    pub fn add_order(&self, order: OrderState) {
        if order.status.is_terminal() {
            return;
        }
        self.inner.lock().orders.insert(order.order_id.clone(), order);
    }

    pub fn get_order(&self, order_id: &str) -> Option<OrderState> {
        self.inner.lock().orders.get(order_id).cloned()
    }

    pub fn get_open_orders(&self, market_slug: Option<&str>) -> Vec<OrderState> {
        let inner = self.inner.lock();
        let mut orders: Vec<OrderState> = inner
            .orders
            .values()
            .filter(|o| o.is_open())
            .filter(|o| market_slug.map_or(true, |m| o.market_slug == m))
            .cloned()
            .collect();
        orders.sort_by(|a, b| a.order_id.cmp(&b.order_id));
        orders
    }

    /// Record a fill against an order, advancing it to PARTIALLY_FILLED or
    /// FILLED. Fully filled orders leave the table.
    pub fn apply_order_fill(&self, order_id: &str, fill: u64) -> Result<OrderState, StateError> {
        let mut inner = self.inner.lock();
        let order = inner
            .orders
            .get_mut(order_id)
            .ok_or_else(|| StateError::OrderNotFound(order_id.to_string()))?;
        let remaining = order.remaining_quantity();
        if fill > remaining {
            return Err(StateError::ExceedsOrder { fill, remaining });
        }
        order.filled_quantity += fill;
        order.status = if order.remaining_quantity() == 0 {
            OrderStatus::Filled
        } else {
            OrderStatus::PartiallyFilled
        };
        let snapshot = order.clone();
        if snapshot.status.is_terminal() {
            inner.orders.remove(order_id);
        }
        Ok(snapshot)
    }

    /// Set an order's status; terminal statuses remove it from the table.
    pub fn set_order_status(&self, order_id: &str, status: OrderStatus) -> Result<(), StateError> {
        let mut inner = self.inner.lock();
        let order = inner
            .orders
            .get_mut(order_id)
            .ok_or_else(|| StateError::OrderNotFound(order_id.to_string()))?;
        order.status = status;
        if status.is_terminal() {
            inner.orders.remove(order_id);
        }
        Ok(())
    }

    // ── Derived quantities ──

    /// Cost basis of positions, portfolio-wide or for one market.
    pub fn exposure(&self, market_slug: Option<&str>) -> Decimal {
        let inner = self.inner.lock();
        inner
            .positions
            .values()
            .filter(|p| market_slug.map_or(true, |m| p.market_slug == m))
            .map(|p| p.cost_basis())
            .sum()
    }

    /// Σ price × remaining quantity over open orders.
    pub fn open_orders_exposure(&self, market_slug: Option<&str>) -> Decimal {
        let inner = self.inner.lock();
        inner
            .orders
            .values()
            .filter(|o| o.is_open())
            .filter(|o| market_slug.map_or(true, |m| o.market_slug == m))
            .map(|o| o.price * Decimal::from(o.remaining_quantity()))
            .sum()
    }

    /// cash + Σ position mark-to-market under the supplied valuation.
    ///
    /// Positions are snapshotted before valuation so the valuation function
    /// may consult the book tracker without holding this lock.
    pub fn total_equity<F>(&self, value_position: F) -> Decimal
    where
        F: Fn(&PositionState) -> Decimal,
    {
        let (cash, positions) = {
            let inner = self.inner.lock();
            (
                inner.cash,
                inner.positions.values().cloned().collect::<Vec<_>>(),
            )
        };
        cash + positions.iter().map(&value_position).sum::<Decimal>()
    }
}

fn validate_fill(quantity: u64, price: Decimal) -> Result<(), StateError> {
    if quantity == 0 {
        return Err(StateError::InvalidQuantity);
    }
    if price <= Decimal::ZERO || price >= Decimal::ONE {
        return Err(StateError::InvalidPrice(price));
    }
    Ok(())
}
