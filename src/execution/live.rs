//! Live executor.
//!
//! Same contract as the paper executor, driven by the exchange instead of a
//! simulation: order ids come from the exchange, fills arrive asynchronously
//! over the private stream, and a throttled REST reconciliation pass closes
//! any gaps by diffing open orders, positions, and balance into the state
//! manager.

use std::collections::{HashMap, HashSet};
use std::sync::atomic::{AtomicU64, Ordering};
use std::sync::Arc;
use std::time::{Duration, Instant};

use async_trait::async_trait;
use chrono::Utc;
use parking_lot::Mutex;
use rust_decimal::Decimal;
use tracing::{debug, info, warn};

use super::{
    ExecutionError, ExecutionResult, Executor, FillListener, OrderRequest, PerformanceReport,
};
use crate::api::client::ExchangeClient;
use crate::api::types::{ApiOrder, ApiPosition, CreateOrderRequest};
use crate::api::ws::PrivateFrame;
use crate::data::orderbook::OrderBookTracker;
use crate::state::{OrderState, StateManager};
use crate::types::OrderStatus;

/// Floor between REST reconciliation passes.
pub const MIN_RECONCILE_INTERVAL: Duration = Duration::from_secs(1);

pub struct LiveExecutor {
    client: Arc<dyn ExchangeClient>,
    state: Arc<StateManager>,
    tracker: Arc<OrderBookTracker>,
    liquidation_discount: Decimal,
    min_reconcile_interval: Duration,

    fill_listeners: Mutex<Vec<FillListener>>,
    /// Last filled quantity seen per exchange order id, for fill-delta
    /// detection across frames and reconciliation.
    last_filled: Mutex<HashMap<String, u64>>,
    last_reconcile: Mutex<Option<Instant>>,

    total_trades: AtomicU64,
    successful_trades: AtomicU64,
    failed_trades: AtomicU64,
}

impl LiveExecutor {
    pub fn new(
        client: Arc<dyn ExchangeClient>,
        state: Arc<StateManager>,
        tracker: Arc<OrderBookTracker>,
        liquidation_discount: Decimal,
    ) -> Self {
        Self::with_reconcile_interval(client, state, tracker, liquidation_discount, MIN_RECONCILE_INTERVAL)
    }

    pub fn with_reconcile_interval(
        client: Arc<dyn ExchangeClient>,
        state: Arc<StateManager>,
        tracker: Arc<OrderBookTracker>,
        liquidation_discount: Decimal,
        min_reconcile_interval: Duration,
    ) -> Self {
        info!("live executor initialized");
        Self {
            client,
            state,
            tracker,
            liquidation_discount,
            min_reconcile_interval,
            fill_listeners: Mutex::new(Vec::new()),
            last_filled: Mutex::new(HashMap::new()),
            last_reconcile: Mutex::new(None),
            total_trades: AtomicU64::new(0),
            successful_trades: AtomicU64::new(0),
            failed_trades: AtomicU64::new(0),
        }
    }

    fn notify_fill(&self, market_slug: &str) {
        let listeners = self.fill_listeners.lock();
        for listener in listeners.iter() {
            listener(market_slug);
        }
    }

    /// Apply a private-stream frame. Idempotent: replaying a frame produces
    /// no second fill delta and no state change.
    pub fn apply_private_frame(&self, frame: PrivateFrame) {
        match frame {
            PrivateFrame::Order(order) => {
                if self.apply_order_snapshot(&order) > 0 {
                    self.notify_fill(&order.market_slug);
                }
            }
            PrivateFrame::Position(position) => self.apply_position_snapshot(&position),
            PrivateFrame::Balance(cash) => self.state.set_balance(cash),
        }
    }

    /// Sync one exchange order snapshot into local state, returning the
    /// newly observed fill delta.
    fn apply_order_snapshot(&self, order: &ApiOrder) -> u64 {
        let delta = {
            let mut last = self.last_filled.lock();
            let seen = last.entry(order.order_id.clone()).or_insert(0);
            let delta = order.filled_quantity.saturating_sub(*seen);
            *seen = (*seen).max(order.filled_quantity);
            delta
        };

        if order.status.is_terminal() {
            let _ = self.state.set_order_status(&order.order_id, order.status);
            self.last_filled.lock().remove(&order.order_id);
        } else {
            self.state.add_order(OrderState {
                order_id: order.order_id.clone(),
                market_slug: order.market_slug.clone(),
                intent: order.intent,
                price: order.price,
                quantity: order.quantity,
                filled_quantity: order.filled_quantity,
                status: order.status,
                created_at: Utc::now(),
            });
        }

        if delta > 0 {
            debug!(
                order_id = %order.order_id,
                market_slug = %order.market_slug,
                delta,
                "fill observed"
            );
        }
        delta
    }

    fn apply_position_snapshot(&self, position: &ApiPosition) {
        self.state.set_position(
            &position.market_slug,
            position.side,
            position.quantity,
            position.avg_price,
        );
    }

    fn result_from(&self, order: &ApiOrder, delta: u64) -> ExecutionResult {
        ExecutionResult {
            order_id: order.order_id.clone(),
            market_slug: order.market_slug.clone(),
            intent: order.intent,
            status: order.status,
            filled_quantity: delta,
            avg_fill_price: order.avg_fill_price,
            fees: Decimal::ZERO,
            reason: None,
            timestamp: Utc::now(),
        }
    }

    /// Throttled REST reconciliation: open orders, positions, balance.
    async fn reconcile(&self) -> Result<Vec<ExecutionResult>, ExecutionError> {
        {
            let mut last = self.last_reconcile.lock();
            if let Some(at) = *last {
                if at.elapsed() < self.min_reconcile_interval {
                    return Ok(Vec::new());
                }
            }
            *last = Some(Instant::now());
        }

        let open_orders = match self.client.get_open_orders().await {
            Ok(orders) => orders,
            Err(e) => {
                warn!(error = %e, "reconcile: open orders fetch failed");
                return Ok(Vec::new());
            }
        };

        let mut fills = Vec::new();
        let mut fill_markets = Vec::new();
        let exchange_ids: HashSet<String> =
            open_orders.iter().map(|o| o.order_id.clone()).collect();

        for order in &open_orders {
            let delta = self.apply_order_snapshot(order);
            if delta > 0 {
                fill_markets.push(order.market_slug.clone());
                fills.push(self.result_from(order, delta));
            }
        }

        // Local opens the exchange no longer reports: fetch individually to
        // learn their terminal state.
        for local in self.state.get_open_orders(None) {
            if exchange_ids.contains(&local.order_id) {
                continue;
            }
            match self.client.get_order(&local.order_id).await {
                Ok(Some(order)) => {
                    let delta = self.apply_order_snapshot(&order);
                    if delta > 0 {
                        fill_markets.push(order.market_slug.clone());
                        fills.push(self.result_from(&order, delta));
                    }
                    if !order.status.is_terminal() {
                        // Exchange disagrees with its own listing; trust the
                        // per-order answer and keep it tracked.
                        continue;
                    }
                }
                Ok(None) => {
                    let _ = self
                        .state
                        .set_order_status(&local.order_id, OrderStatus::Cancelled);
                    self.last_filled.lock().remove(&local.order_id);
                }
                Err(e) => {
                    warn!(order_id = %local.order_id, error = %e, "reconcile: order fetch failed");
                }
            }
        }

        match self.client.get_positions().await {
            Ok(positions) => {
                let reported: HashSet<String> =
                    positions.iter().map(|p| p.market_slug.clone()).collect();
                for position in &positions {
                    self.apply_position_snapshot(position);
                }
                for local in self.state.all_positions() {
                    if !reported.contains(&local.market_slug) {
                        self.state.remove_position(&local.market_slug);
                    }
                }
            }
            Err(e) => warn!(error = %e, "reconcile: positions fetch failed"),
        }

        match self.client.get_balances().await {
            Ok(balance) => self.state.set_balance(balance.cash),
            Err(e) => warn!(error = %e, "reconcile: balance fetch failed"),
        }

        for slug in fill_markets {
            self.notify_fill(&slug);
        }
        Ok(fills)
    }
}

#[async_trait]
impl Executor for LiveExecutor {
    async fn execute_order(&self, order: OrderRequest) -> Result<ExecutionResult, ExecutionError> {
        if order.quantity == 0 {
            return Err(ExecutionError::InvalidOrder("quantity must be > 0"));
        }
        self.total_trades.fetch_add(1, Ordering::Relaxed);

        // Post-only approximation: clamp the limit to the opposite
        // top-of-book so the order cannot cross.
        let mut price = order.price;
        if order.post_only {
            let (bid, ask) = self.tracker.best(&order.market_slug, order.intent.side());
            price = price.map(|p| {
                if order.intent.is_buy() {
                    ask.map_or(p, |a| p.min(a))
                } else {
                    bid.map_or(p, |b| p.max(b))
                }
            });
        }

        let request = CreateOrderRequest {
            market_slug: order.market_slug.clone(),
            intent: order.intent,
            quantity: order.quantity,
            price,
            order_type: order.order_type,
            post_only: order.post_only,
        };

        match self.client.place_order(&request).await {
            Ok(placed) => {
                self.successful_trades.fetch_add(1, Ordering::Relaxed);
                let delta = self.apply_order_snapshot(&placed);
                if delta > 0 {
                    self.notify_fill(&placed.market_slug);
                }
                Ok(self.result_from(&placed, delta))
            }
            Err(e) => {
                // Transport problems are not surfaced as exceptions; the
                // next reconciliation pass resolves the true order state.
                self.failed_trades.fetch_add(1, Ordering::Relaxed);
                warn!(market_slug = %order.market_slug, error = %e, "order placement failed");
                Ok(ExecutionResult {
                    order_id: String::new(),
                    market_slug: order.market_slug,
                    intent: order.intent,
                    status: OrderStatus::Rejected,
                    filled_quantity: 0,
                    avg_fill_price: None,
                    fees: Decimal::ZERO,
                    reason: Some(e.to_string()),
                    timestamp: Utc::now(),
                })
            }
        }
    }

    async fn cancel_order(&self, order_id: &str) -> Result<bool, ExecutionError> {
        match self.client.cancel_order(order_id).await {
            Ok(true) => {
                let _ = self.state.set_order_status(order_id, OrderStatus::Cancelled);
                self.last_filled.lock().remove(order_id);
                Ok(true)
            }
            Ok(false) => Ok(false),
            Err(e) => {
                warn!(order_id, error = %e, "cancel failed");
                Ok(false)
            }
        }
    }

    async fn cancel_all_orders(&self, market_slug: Option<&str>) -> Result<usize, ExecutionError> {
        match self.client.cancel_all_orders(market_slug).await {
            Ok(count) => {
                for order in self.state.get_open_orders(market_slug) {
                    let _ = self
                        .state
                        .set_order_status(&order.order_id, OrderStatus::Cancelled);
                    self.last_filled.lock().remove(&order.order_id);
                }
                Ok(count)
            }
            Err(e) => {
                warn!(error = %e, "cancel-all failed");
                Ok(0)
            }
        }
    }

    async fn check_resting_orders(&self) -> Result<Vec<ExecutionResult>, ExecutionError> {
        self.reconcile().await
    }

    fn add_fill_listener(&self, listener: FillListener) {
        self.fill_listeners.lock().push(listener);
    }

    fn performance(&self) -> PerformanceReport {
        super::build_performance_report(
            &self.state,
            &self.tracker,
            Decimal::ZERO,
            self.liquidation_discount,
            (
                self.total_trades.load(Ordering::Relaxed),
                self.successful_trades.load(Ordering::Relaxed),
                self.failed_trades.load(Ordering::Relaxed),
            ),
        )
    }
}
