//! Paper trading executor.
//!
//! Simulates fills deterministically against the local order book: taker
//! orders walk the opposing ladder for a VWAP fill, non-crossing limits rest,
//! and resting orders fill gradually once crossed, capped by visible depth
//! and by inventory for sells.

use std::sync::atomic::{AtomicU64, Ordering};
use std::sync::Arc;

use async_trait::async_trait;
use chrono::Utc;
use parking_lot::Mutex;
use rust_decimal::prelude::ToPrimitive;
use rust_decimal::Decimal;
use tracing::{debug, info, warn};

use super::{
    liquidation_value, ExecutionError, ExecutionResult, Executor, FillListener, OrderRequest,
    PerformanceReport,
};
use crate::config::Config;
use crate::data::orderbook::{OrderBookTracker, TradeDirection};
use crate::state::{OrderState, StateManager};
use crate::types::{OrderIntent, OrderStatus, OrderType};

#[derive(Clone, Debug)]
pub struct PaperConfig {
    /// Taker fee in basis points on notional, deducted from cash on buys.
    pub taker_fee_bps: Decimal,
    /// Fraction of an order's remainder filled per resting-order check.
    pub maker_fill_fraction: Decimal,
    /// Haircut applied to residual size beyond visible depth when valuing
    /// liquidations.
    pub liquidation_discount: Decimal,
}

impl PaperConfig {
    pub fn from_config(config: &Config) -> Self {
        Self {
            taker_fee_bps: config.taker_fee_bps,
            maker_fill_fraction: config.maker_fill_fraction,
            liquidation_discount: config.liquidation_discount,
        }
    }
}

impl Default for PaperConfig {
    fn default() -> Self {
        use rust_decimal_macros::dec;
        Self {
            taker_fee_bps: Decimal::ZERO,
            maker_fill_fraction: dec!(0.02),
            liquidation_discount: dec!(0.9),
        }
    }
}

pub struct PaperExecutor {
    state: Arc<StateManager>,
    tracker: Arc<OrderBookTracker>,
    config: PaperConfig,
    next_order_id: AtomicU64,
    fill_listeners: Mutex<Vec<FillListener>>,
    total_trades: AtomicU64,
    successful_trades: AtomicU64,
    failed_trades: AtomicU64,
}

impl PaperExecutor {
    pub fn new(
        state: Arc<StateManager>,
        tracker: Arc<OrderBookTracker>,
        config: PaperConfig,
    ) -> Self {
        info!(
            maker_fill_fraction = %config.maker_fill_fraction,
            liquidation_discount = %config.liquidation_discount,
            taker_fee_bps = %config.taker_fee_bps,
            "paper executor initialized"
        );
        Self {
            state,
            tracker,
            config,
            next_order_id: AtomicU64::new(1),
            fill_listeners: Mutex::new(Vec::new()),
            total_trades: AtomicU64::new(0),
            successful_trades: AtomicU64::new(0),
            failed_trades: AtomicU64::new(0),
        }
    }

    fn next_id(&self) -> String {
        format!("paper-{:06}", self.next_order_id.fetch_add(1, Ordering::Relaxed))
    }

    fn notify_fill(&self, market_slug: &str) {
        let listeners = self.fill_listeners.lock();
        for listener in listeners.iter() {
            listener(market_slug);
        }
    }

    fn taker_fee(&self, notional: Decimal) -> Decimal {
        notional * self.config.taker_fee_bps / Decimal::from(10_000)
    }

    fn rejected(&self, order: &OrderRequest, order_id: String, reason: &str) -> ExecutionResult {
        self.failed_trades.fetch_add(1, Ordering::Relaxed);
        debug!(market_slug = %order.market_slug, reason, "paper order rejected");
        ExecutionResult {
            order_id,
            market_slug: order.market_slug.clone(),
            intent: order.intent,
            status: OrderStatus::Rejected,
            filled_quantity: 0,
            avg_fill_price: None,
            fees: Decimal::ZERO,
            reason: Some(reason.to_string()),
            timestamp: Utc::now(),
        }
    }

    /// Close the full position in a market at liquidation value (side-flip
    /// path). Returns the realized PnL, or a rejection reason.
    fn close_position_at_liquidation(&self, market_slug: &str) -> Result<Decimal, String> {
        let Some(position) = self.state.get_position(market_slug) else {
            return Ok(Decimal::ZERO);
        };
        let book = self.tracker.get(market_slug);
        let proceeds =
            liquidation_value(&position, book.as_ref(), self.config.liquidation_discount);
        if proceeds <= Decimal::ZERO {
            return Err("no depth to close existing position".into());
        }
        let mut effective = proceeds / Decimal::from(position.quantity);
        if effective >= Decimal::ONE {
            effective = Decimal::ONE - Decimal::new(1, 4);
        }
        let realized = self
            .state
            .apply_sell_fill(market_slug, position.quantity, effective)
            .map_err(|e| e.to_string())?;
        self.state
            .adjust_balance(proceeds)
            .map_err(|e| e.to_string())?;
        info!(
            market_slug,
            side = %position.side,
            quantity = position.quantity,
            proceeds = %proceeds,
            realized = %realized,
            "position closed for side flip"
        );
        Ok(realized)
    }
}

#[async_trait]
impl Executor for PaperExecutor {
    async fn execute_order(&self, order: OrderRequest) -> Result<ExecutionResult, ExecutionError> {
        // Synchronous input validation; these are caller bugs, not fills.
        if order.quantity == 0 {
            return Err(ExecutionError::InvalidOrder("quantity must be > 0"));
        }
        if let Some(price) = order.price {
            if price <= Decimal::ZERO || price >= Decimal::ONE {
                return Err(ExecutionError::InvalidOrder(
                    "price must be between 0 and 1 (exclusive)",
                ));
            }
        }
        if order.order_type == OrderType::Limit && order.price.is_none() {
            return Err(ExecutionError::InvalidOrder("limit order requires a price"));
        }

        self.total_trades.fetch_add(1, Ordering::Relaxed);
        let order_id = self.next_id();

        if self.tracker.get(&order.market_slug).is_none() {
            return Ok(self.rejected(&order, order_id, "market not found"));
        }

        // A sell with no matching position is rewritten into the equivalent
        // buy on the opposite side at the complement price.
        let mut order = order;
        if !order.intent.is_buy() && self.state.get_position(&order.market_slug).map_or(
            true,
            |p| p.side != order.intent.side(),
        ) {
            let rewritten = OrderIntent::buy(order.intent.side().opposite());
            debug!(
                market_slug = %order.market_slug,
                from = %order.intent,
                to = %rewritten,
                "sell without position rewritten to complement buy"
            );
            order.intent = rewritten;
            order.price = order.price.map(|p| Decimal::ONE - p);
        }

        let side = order.intent.side();

        if order.intent.is_buy() {
            // Side flip: a buy opposite an existing position closes it first.
            if let Some(pos) = self.state.get_position(&order.market_slug) {
                if pos.side != side {
                    if let Err(reason) = self.close_position_at_liquidation(&order.market_slug) {
                        return Ok(self.rejected(&order, order_id, &reason));
                    }
                }
            }
            return Ok(self.execute_buy(order, order_id));
        }

        Ok(self.execute_sell(order, order_id))
    }

    async fn cancel_order(&self, order_id: &str) -> Result<bool, ExecutionError> {
        match self.state.get_order(order_id) {
            Some(order) if order.is_open() => {
                self.state
                    .set_order_status(order_id, OrderStatus::Cancelled)?;
                info!(order_id, market_slug = %order.market_slug, "order cancelled");
                Ok(true)
            }
            _ => Ok(false),
        }
    }

    async fn cancel_all_orders(&self, market_slug: Option<&str>) -> Result<usize, ExecutionError> {
        let open = self.state.get_open_orders(market_slug);
        let mut cancelled = 0;
        for order in open {
            if self
                .state
                .set_order_status(&order.order_id, OrderStatus::Cancelled)
                .is_ok()
            {
                cancelled += 1;
            }
        }
        Ok(cancelled)
    }

    async fn check_resting_orders(&self) -> Result<Vec<ExecutionResult>, ExecutionError> {
        let mut fills = Vec::new();
        let mut filled_markets: Vec<String> = Vec::new();

        for order in self.state.get_open_orders(None) {
            let Some(book) = self.tracker.get(&order.market_slug) else {
                continue;
            };
            let ladder = book.side(order.intent.side());
            let remaining = order.remaining_quantity();
            if remaining == 0 {
                continue;
            }

            let fill = if order.intent.is_buy() {
                let crossed = ladder.best_ask().is_some_and(|ask| ask <= order.price);
                if !crossed {
                    continue;
                }
                self.fill_resting_buy(&order, remaining, ladder)
            } else {
                let crossed = ladder.best_bid().is_some_and(|bid| bid >= order.price);
                if !crossed {
                    continue;
                }
                self.fill_resting_sell(&order, remaining, ladder)
            };

            if let Some(result) = fill {
                filled_markets.push(result.market_slug.clone());
                fills.push(result);
            }
        }

        for slug in filled_markets {
            self.notify_fill(&slug);
        }
        Ok(fills)
    }

    fn add_fill_listener(&self, listener: FillListener) {
        self.fill_listeners.lock().push(listener);
    }

    fn performance(&self) -> PerformanceReport {
        super::build_performance_report(
            &self.state,
            &self.tracker,
            self.config.maker_fill_fraction,
            self.config.liquidation_discount,
            (
                self.total_trades.load(Ordering::Relaxed),
                self.successful_trades.load(Ordering::Relaxed),
                self.failed_trades.load(Ordering::Relaxed),
            ),
        )
    }
}

impl PaperExecutor {
    fn execute_buy(&self, order: OrderRequest, order_id: String) -> ExecutionResult {
        let side = order.intent.side();
        let walk = self
            .tracker
            .walk(&order.market_slug, side, TradeDirection::Buy, order.quantity, order.price);

        match walk {
            Some(fill) => {
                let notional = fill.vwap * Decimal::from(fill.filled);
                let fee = self.taker_fee(notional);
                if self.state.get_balance() < notional + fee {
                    return self.rejected(&order, order_id, "insufficient balance");
                }
                if let Err(e) = self.state.adjust_balance(-(notional + fee)) {
                    return self.rejected(&order, order_id, &e.to_string());
                }
                if let Err(e) =
                    self.state
                        .apply_buy_fill(&order.market_slug, side, fill.filled, fill.vwap)
                {
                    // Roll the cash back; the order did not happen.
                    let _ = self.state.adjust_balance(notional + fee);
                    return self.rejected(&order, order_id, &e.to_string());
                }
                self.successful_trades.fetch_add(1, Ordering::Relaxed);

                let status = if fill.filled == order.quantity {
                    OrderStatus::Filled
                } else if order.order_type == OrderType::Limit {
                    // Rest the remainder at the limit price.
                    self.state.add_order(OrderState {
                        order_id: order_id.clone(),
                        market_slug: order.market_slug.clone(),
                        intent: order.intent,
                        price: order.price.unwrap_or(fill.vwap),
                        quantity: order.quantity,
                        filled_quantity: fill.filled,
                        status: OrderStatus::PartiallyFilled,
                        created_at: Utc::now(),
                    });
                    OrderStatus::PartiallyFilled
                } else {
                    OrderStatus::PartiallyFilled
                };

                debug!(
                    market_slug = %order.market_slug,
                    intent = %order.intent,
                    filled = fill.filled,
                    vwap = %fill.vwap,
                    ?status,
                    "taker buy"
                );
                self.notify_fill(&order.market_slug);
                ExecutionResult {
                    order_id,
                    market_slug: order.market_slug,
                    intent: order.intent,
                    status,
                    filled_quantity: fill.filled,
                    avg_fill_price: Some(fill.vwap),
                    fees: fee,
                    reason: None,
                    timestamp: Utc::now(),
                }
            }
            None => {
                if order.order_type == OrderType::Market {
                    return self.rejected(&order, order_id, "no depth available");
                }
                self.rest_maker(order, order_id)
            }
        }
    }

    fn execute_sell(&self, order: OrderRequest, order_id: String) -> ExecutionResult {
        let side = order.intent.side();
        // The rewrite above guarantees a matching position exists here.
        let Some(position) = self.state.get_position(&order.market_slug) else {
            return self.rejected(&order, order_id, "no position to sell");
        };
        // The immediate walk is inventory-safe; any remainder beyond the
        // position still rests and fills as inventory allows.
        let sellable = order.quantity.min(position.quantity);

        let walk = self
            .tracker
            .walk(&order.market_slug, side, TradeDirection::Sell, sellable, order.price);

        match walk {
            Some(fill) => {
                let proceeds = fill.vwap * Decimal::from(fill.filled);
                let realized = match self
                    .state
                    .apply_sell_fill(&order.market_slug, fill.filled, fill.vwap)
                {
                    Ok(r) => r,
                    Err(e) => return self.rejected(&order, order_id, &e.to_string()),
                };
                if let Err(e) = self.state.adjust_balance(proceeds) {
                    return self.rejected(&order, order_id, &e.to_string());
                }
                self.successful_trades.fetch_add(1, Ordering::Relaxed);

                let status = if fill.filled == order.quantity {
                    OrderStatus::Filled
                } else if order.order_type == OrderType::Limit {
                    self.state.add_order(OrderState {
                        order_id: order_id.clone(),
                        market_slug: order.market_slug.clone(),
                        intent: order.intent,
                        price: order.price.unwrap_or(fill.vwap),
                        quantity: order.quantity,
                        filled_quantity: fill.filled,
                        status: OrderStatus::PartiallyFilled,
                        created_at: Utc::now(),
                    });
                    OrderStatus::PartiallyFilled
                } else {
                    OrderStatus::PartiallyFilled
                };

                debug!(
                    market_slug = %order.market_slug,
                    intent = %order.intent,
                    filled = fill.filled,
                    vwap = %fill.vwap,
                    realized = %realized,
                    "taker sell"
                );
                self.notify_fill(&order.market_slug);
                ExecutionResult {
                    order_id,
                    market_slug: order.market_slug,
                    intent: order.intent,
                    status,
                    filled_quantity: fill.filled,
                    avg_fill_price: Some(fill.vwap),
                    fees: Decimal::ZERO,
                    reason: None,
                    timestamp: Utc::now(),
                }
            }
            None => {
                if order.order_type == OrderType::Market {
                    return self.rejected(&order, order_id, "no depth available");
                }
                self.rest_maker(order, order_id)
            }
        }
    }

    /// Rest a non-crossing limit order in the open-order table.
    fn rest_maker(&self, order: OrderRequest, order_id: String) -> ExecutionResult {
        let mut price = match order.price {
            Some(price) => price,
            None => return self.rejected(&order, order_id, "limit order without price"),
        };
        if order.post_only {
            // Approximate post-only by clamping to the opposite top-of-book.
            let (bid, ask) = self.tracker.best(&order.market_slug, order.intent.side());
            if order.intent.is_buy() {
                if let Some(ask) = ask {
                    price = price.min(ask);
                }
            } else if let Some(bid) = bid {
                price = price.max(bid);
            }
        }
        self.state.add_order(OrderState {
            order_id: order_id.clone(),
            market_slug: order.market_slug.clone(),
            intent: order.intent,
            price,
            quantity: order.quantity,
            filled_quantity: 0,
            status: OrderStatus::Open,
            created_at: Utc::now(),
        });
        self.successful_trades.fetch_add(1, Ordering::Relaxed);
        debug!(
            market_slug = %order.market_slug,
            intent = %order.intent,
            price = %price,
            quantity = order.quantity,
            "order resting"
        );
        ExecutionResult {
            order_id,
            market_slug: order.market_slug,
            intent: order.intent,
            status: OrderStatus::Open,
            filled_quantity: 0,
            avg_fill_price: None,
            fees: Decimal::ZERO,
            reason: None,
            timestamp: Utc::now(),
        }
    }

    /// Per-tick maker fill size: max(1, ⌈remaining × maker_fill_fraction⌉).
    fn maker_fill_size(&self, remaining: u64) -> u64 {
        (Decimal::from(remaining) * self.config.maker_fill_fraction)
            .ceil()
            .to_u64()
            .unwrap_or(1)
            .max(1)
    }

    fn fill_resting_buy(
        &self,
        order: &OrderState,
        remaining: u64,
        ladder: &crate::data::orderbook::BookSide,
    ) -> Option<ExecutionResult> {
        let depth = ladder.eligible_depth(TradeDirection::Buy, Some(order.price));
        let fill_qty = self.maker_fill_size(remaining).min(depth).min(remaining);
        if fill_qty == 0 {
            return None;
        }

        // Side flips can also happen through resting orders.
        if let Some(pos) = self.state.get_position(&order.market_slug) {
            if pos.side != order.intent.side()
                && self.close_position_at_liquidation(&order.market_slug).is_err()
            {
                return None;
            }
        }

        let notional = order.price * Decimal::from(fill_qty);
        if self.state.get_balance() < notional {
            warn!(order_id = %order.order_id, "resting buy unaffordable, left in book");
            return None;
        }
        self.state.adjust_balance(-notional).ok()?;
        if self
            .state
            .apply_buy_fill(&order.market_slug, order.intent.side(), fill_qty, order.price)
            .is_err()
        {
            let _ = self.state.adjust_balance(notional);
            return None;
        }
        let updated = self.state.apply_order_fill(&order.order_id, fill_qty).ok()?;

        debug!(
            order_id = %order.order_id,
            market_slug = %order.market_slug,
            fill_qty,
            remaining = updated.remaining_quantity(),
            "maker buy fill"
        );
        Some(ExecutionResult {
            order_id: order.order_id.clone(),
            market_slug: order.market_slug.clone(),
            intent: order.intent,
            status: updated.status,
            filled_quantity: fill_qty,
            avg_fill_price: Some(order.price),
            fees: Decimal::ZERO,
            reason: None,
            timestamp: Utc::now(),
        })
    }

    fn fill_resting_sell(
        &self,
        order: &OrderState,
        remaining: u64,
        ladder: &crate::data::orderbook::BookSide,
    ) -> Option<ExecutionResult> {
        let depth = ladder.eligible_depth(TradeDirection::Sell, Some(order.price));
        // Inventory-safe: never sell more than the position holds.
        let inventory = self
            .state
            .get_position(&order.market_slug)
            .filter(|p| p.side == order.intent.side())
            .map_or(0, |p| p.quantity);
        let fill_qty = self
            .maker_fill_size(remaining)
            .min(depth)
            .min(inventory)
            .min(remaining);
        if fill_qty == 0 {
            return None;
        }

        let proceeds = order.price * Decimal::from(fill_qty);
        self.state
            .apply_sell_fill(&order.market_slug, fill_qty, order.price)
            .ok()?;
        self.state.adjust_balance(proceeds).ok()?;
        let updated = self.state.apply_order_fill(&order.order_id, fill_qty).ok()?;

        debug!(
            order_id = %order.order_id,
            market_slug = %order.market_slug,
            fill_qty,
            remaining = updated.remaining_quantity(),
            "maker sell fill"
        );
        Some(ExecutionResult {
            order_id: order.order_id.clone(),
            market_slug: order.market_slug.clone(),
            intent: order.intent,
            status: updated.status,
            filled_quantity: fill_qty,
            avg_fill_price: Some(order.price),
            fees: Decimal::ZERO,
            reason: None,
            timestamp: Utc::now(),
        })
    }
}
