pub mod live;
pub mod paper;

use async_trait::async_trait;
use chrono::{DateTime, Utc};
use rust_decimal::Decimal;
use serde::Serialize;
use thiserror::Error;

use crate::data::orderbook::{OrderBook, TradeDirection};
use crate::state::PositionState;
use crate::types::{OrderIntent, OrderStatus, OrderType};

#[derive(Debug, Error)]
pub enum ExecutionError {
    #[error("invalid order: {0}")]
    InvalidOrder(&'static str),
    #[error(transparent)]
    State(#[from] crate::state::StateError),
    #[error("exchange transport: {0}")]
    Transport(String),
}

// ─── Executor contract ───

/// Order request accepted by both executors.
#[derive(Clone, Debug)]
pub struct OrderRequest {
    pub market_slug: String,
    pub intent: OrderIntent,
    pub quantity: u64,
    /// Limit price; `None` submits a market order.
    pub price: Option<Decimal>,
    pub order_type: OrderType,
    /// Clamp the limit to the opposite top-of-book instead of crossing.
    pub post_only: bool,
}

impl OrderRequest {
    pub fn limit(market_slug: &str, intent: OrderIntent, quantity: u64, price: Decimal) -> Self {
        Self {
            market_slug: market_slug.to_string(),
            intent,
            quantity,
            price: Some(price),
            order_type: OrderType::Limit,
            post_only: false,
        }
    }

    pub fn market(market_slug: &str, intent: OrderIntent, quantity: u64) -> Self {
        Self {
            market_slug: market_slug.to_string(),
            intent,
            quantity,
            price: None,
            order_type: OrderType::Market,
            post_only: false,
        }
    }
}

/// Outcome of a submission or a resting-order check.
#[derive(Clone, Debug)]
pub struct ExecutionResult {
    pub order_id: String,
    pub market_slug: String,
    pub intent: OrderIntent,
    pub status: OrderStatus,
    pub filled_quantity: u64,
    pub avg_fill_price: Option<Decimal>,
    pub fees: Decimal,
    pub reason: Option<String>,
    pub timestamp: DateTime<Utc>,
}

impl ExecutionResult {
    pub fn is_success(&self) -> bool {
        !matches!(self.status, OrderStatus::Rejected)
    }
}

/// Listener invoked with the market slug after a fill commits to state.
pub type FillListener = Box<dyn Fn(&str) + Send + Sync>;

/// Async contract shared by the paper and live executors so the engine
/// operates identically across modes.
#[async_trait]
pub trait Executor: Send + Sync {
    async fn execute_order(&self, order: OrderRequest) -> Result<ExecutionResult, ExecutionError>;

    async fn cancel_order(&self, order_id: &str) -> Result<bool, ExecutionError>;

    async fn cancel_all_orders(&self, market_slug: Option<&str>) -> Result<usize, ExecutionError>;

    /// Advance deterministic maker fills (paper) or poll reconciliation
    /// (live). Returns any fill events produced.
    async fn check_resting_orders(&self) -> Result<Vec<ExecutionResult>, ExecutionError>;

    /// Register a fill listener; used by the engine for quote invalidation.
    fn add_fill_listener(&self, listener: FillListener);

    fn performance(&self) -> PerformanceReport;
}

// ─── Mark-to-market valuation ───

/// Valuation flavor for position mark-to-market.
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub enum Valuation {
    BestBid,
    Liquidation,
    EntryBasis,
}

/// Value a position at the top of its side's bid ladder.
pub fn best_bid_value(position: &PositionState, book: Option<&OrderBook>) -> Decimal {
    let Some(bid) = book.and_then(|b| b.side(position.side).best_bid()) else {
        return Decimal::ZERO;
    };
    bid * Decimal::from(position.quantity)
}

/// Proceeds from walking the position's own bid ladder now. Residual
/// quantity beyond visible depth is valued at the worst visible price times
/// a conservative discount.
pub fn liquidation_value(
    position: &PositionState,
    book: Option<&OrderBook>,
    discount: Decimal,
) -> Decimal {
    let Some(book) = book else {
        return Decimal::ZERO;
    };
    let ladder = book.side(position.side);
    let Some(walk) = ladder.walk(TradeDirection::Sell, position.quantity, None) else {
        return Decimal::ZERO;
    };
    let mut value = walk.vwap * Decimal::from(walk.filled);
    let residual = position.quantity - walk.filled;
    if residual > 0 {
        if let Some(worst) = ladder.worst_visible(TradeDirection::Sell) {
            value += worst * discount * Decimal::from(residual);
        }
    }
    value
}

pub fn position_value(
    position: &PositionState,
    book: Option<&OrderBook>,
    valuation: Valuation,
    discount: Decimal,
) -> Decimal {
    match valuation {
        Valuation::BestBid => best_bid_value(position, book),
        Valuation::Liquidation => liquidation_value(position, book, discount),
        Valuation::EntryBasis => position.cost_basis(),
    }
}

// ─── Performance reporting ───

/// Executor health snapshot: cash, mark-to-market under each valuation, and
/// trade counters. The tunable fill-model parameters are surfaced so reports
/// are self-describing.
#[derive(Clone, Debug, Serialize)]
pub struct PerformanceReport {
    pub cash: Decimal,
    pub position_value_best_bid: Decimal,
    pub position_value_liquidation: Decimal,
    pub position_value_entry: Decimal,
    pub unrealized_pnl_best_bid: Decimal,
    pub unrealized_pnl_liquidation: Decimal,
    pub realized_pnl: Decimal,
    pub total_equity: Decimal,
    pub open_orders: usize,
    pub open_positions: usize,
    pub total_trades: u64,
    pub successful_trades: u64,
    pub failed_trades: u64,
    pub maker_fill_fraction: Decimal,
    pub liquidation_discount: Decimal,
}

/// Assemble a performance report from current state and books; shared by
/// both executors.
pub fn build_performance_report(
    state: &crate::state::StateManager,
    tracker: &crate::data::orderbook::OrderBookTracker,
    maker_fill_fraction: Decimal,
    liquidation_discount: Decimal,
    trade_counts: (u64, u64, u64),
) -> PerformanceReport {
    let positions = state.all_positions();
    let mut value_best_bid = Decimal::ZERO;
    let mut value_liquidation = Decimal::ZERO;
    let mut value_entry = Decimal::ZERO;
    for pos in &positions {
        let book = tracker.get(&pos.market_slug);
        value_best_bid += best_bid_value(pos, book.as_ref());
        value_liquidation += liquidation_value(pos, book.as_ref(), liquidation_discount);
        value_entry += pos.cost_basis();
    }
    let cash = state.get_balance();
    let (total_trades, successful_trades, failed_trades) = trade_counts;
    PerformanceReport {
        cash,
        position_value_best_bid: value_best_bid,
        position_value_liquidation: value_liquidation,
        position_value_entry: value_entry,
        unrealized_pnl_best_bid: value_best_bid - value_entry,
        unrealized_pnl_liquidation: value_liquidation - value_entry,
        realized_pnl: state.realized_pnl(),
        total_equity: cash + value_best_bid,
        open_orders: state.get_open_orders(None).len(),
        open_positions: positions.len(),
        total_trades,
        successful_trades,
        failed_trades,
        maker_fill_fraction,
        liquidation_discount,
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::data::orderbook::{BookFrame, LadderFrame, OrderBookTracker};
    use crate::types::Side;
    use rust_decimal_macros::dec;

    fn tracked_book(yes_bids: Vec<(Decimal, u64)>) -> OrderBook {
        let tracker = OrderBookTracker::new();
        tracker.update(
            "m1",
            BookFrame {
                yes: LadderFrame {
                    bids: yes_bids,
                    asks: vec![(dec!(0.49), 5)],
                },
                no: LadderFrame::default(),
                timestamp: Utc::now(),
            },
        );
        tracker.get("m1").unwrap()
    }

    fn yes_position(quantity: u64, avg: Decimal) -> PositionState {
        PositionState {
            market_slug: "m1".into(),
            side: Side::Yes,
            quantity,
            avg_price: avg,
        }
    }

    /// Scenario: 20-contract position against bids [(0.47, 5), (0.46, 5)].
    /// Expected: best-bid value assumes full size at 0.47; liquidation walks
    /// 10 contracts and values the 10-contract residual at 0.46 × 0.9.
    #[test]
    fn test_valuations_disagree_when_depth_is_thin() {
        let book = tracked_book(vec![(dec!(0.47), 5), (dec!(0.46), 5)]);
        let pos = yes_position(20, dec!(0.40));

        assert_eq!(best_bid_value(&pos, Some(&book)), dec!(9.40));

        let liq = liquidation_value(&pos, Some(&book), dec!(0.9));
        let walked = dec!(0.47) * dec!(5) + dec!(0.46) * dec!(5);
        let residual = dec!(0.46) * dec!(0.9) * dec!(10);
        assert_eq!(liq, walked + residual);

        assert_eq!(
            position_value(&pos, Some(&book), Valuation::EntryBasis, dec!(0.9)),
            dec!(8.00)
        );
    }

    /// Scenario: bid depth covers the full position.
    /// Expected: liquidation equals the plain walk with no residual term.
    #[test]
    fn test_liquidation_without_residual() {
        let book = tracked_book(vec![(dec!(0.47), 5), (dec!(0.46), 5)]);
        let pos = yes_position(10, dec!(0.40));
        let liq = liquidation_value(&pos, Some(&book), dec!(0.9));
        assert_eq!(liq, dec!(0.47) * dec!(5) + dec!(0.46) * dec!(5));
    }

    /// Missing books and empty ladders value to zero.
    #[test]
    fn test_valuation_degenerate_cases() {
        let pos = yes_position(10, dec!(0.40));
        assert_eq!(best_bid_value(&pos, None), Decimal::ZERO);
        assert_eq!(liquidation_value(&pos, None, dec!(0.9)), Decimal::ZERO);

        let empty = tracked_book(vec![]);
        assert_eq!(best_bid_value(&pos, Some(&empty)), Decimal::ZERO);
        assert_eq!(liquidation_value(&pos, Some(&empty), dec!(0.9)), Decimal::ZERO);
    }
}
