//! Strategy engine: the deterministic tick loop binding strategies, risk,
//! and execution together.

use std::collections::{HashMap, HashSet};
use std::sync::Arc;

use chrono::{DateTime, Utc};
use parking_lot::Mutex;
use tokio::sync::watch;
use tracing::{debug, info, warn};

use super::pipeline::aggregate_signals;
use crate::execution::{Executor, OrderRequest};
use crate::market::time::is_tradeable_slug;
use crate::monitor::metrics::MetricsRegistry;
use crate::risk::manager::RiskManager;
use crate::strategies::{Strategy, StrategyContext};
use crate::types::{OrderType, Signal};

/// Per-tick accounting, surfaced for tests and diagnostics.
#[derive(Clone, Copy, Debug, Default)]
pub struct TickReport {
    pub raw_signals: usize,
    pub aggregated: usize,
    pub approved: usize,
    pub rejected: usize,
    pub executed: usize,
    pub resting_fills: usize,
}

pub struct StrategyEngine {
    ctx: StrategyContext,
    executor: Arc<dyn Executor>,
    risk: RiskManager,
    strategies: Vec<Box<dyn Strategy>>,
    /// Markets touched by fills since the last tick; drained into strategy
    /// quote invalidation at tick start.
    invalidated: Arc<Mutex<HashSet<String>>>,
    /// Last seen `last_update` per market, for change detection.
    market_clock: HashMap<String, DateTime<Utc>>,
    allow_in_game: bool,
    metrics: Arc<MetricsRegistry>,
}

impl StrategyEngine {
    pub fn new(
        ctx: StrategyContext,
        executor: Arc<dyn Executor>,
        risk: RiskManager,
        allow_in_game: bool,
        metrics: Arc<MetricsRegistry>,
    ) -> Self {
        let invalidated: Arc<Mutex<HashSet<String>>> = Arc::new(Mutex::new(HashSet::new()));
        let listener_set = invalidated.clone();
        executor.add_fill_listener(Box::new(move |market_slug| {
            listener_set.lock().insert(market_slug.to_string());
        }));

        Self {
            ctx,
            executor,
            risk,
            strategies: Vec::new(),
            invalidated,
            market_clock: HashMap::new(),
            allow_in_game,
            metrics,
        }
    }

    pub fn register_strategy(&mut self, strategy: Box<dyn Strategy>) {
        info!(strategy = strategy.name(), "strategy registered");
        self.strategies.push(strategy);
    }

    pub fn risk_mut(&mut self) -> &mut RiskManager {
        &mut self.risk
    }

    /// One deterministic pipeline iteration.
    pub async fn tick(&mut self, now: DateTime<Utc>) -> TickReport {
        let mut report = TickReport::default();

        // 1. Fill-driven invalidation from the previous tick's executions.
        let stale: Vec<String> = {
            let mut set = self.invalidated.lock();
            set.drain().collect()
        };
        for market_slug in &stale {
            for strategy in &mut self.strategies {
                strategy.on_fill(market_slug);
            }
        }

        // 2. Tick fan-out.
        let mut signals: Vec<Signal> = Vec::new();
        for strategy in &mut self.strategies {
            signals.extend(strategy.on_tick(&self.ctx, now));
        }

        // 3. Market-update fan-out for markets that changed since last tick.
        let mut changed = Vec::new();
        for market in self.ctx.state.all_markets() {
            let seen = self.market_clock.get(&market.market_slug);
            if seen.map_or(true, |at| market.last_update > *at) {
                self.market_clock
                    .insert(market.market_slug.clone(), market.last_update);
                changed.push(market);
            }
        }
        for market in &changed {
            for strategy in &mut self.strategies {
                signals.extend(strategy.on_market_update(&self.ctx, market, now));
            }
        }
        report.raw_signals = signals.len();

        // 4. Aggregate and gate on slug tradability. Exits and cancels stay
        // allowed on stale markets; only new risk is blocked.
        let mut batch = aggregate_signals(signals);
        batch.retain(|signal| {
            if !signal.action.is_buy() {
                return true;
            }
            let tradeable = is_tradeable_slug(&signal.market_slug, now, self.allow_in_game);
            if !tradeable {
                debug!(market_slug = %signal.market_slug, "buy dropped: market not tradeable");
            }
            tradeable
        });
        report.aggregated = batch.len();

        // 5–6. Risk evaluation and sequential execution in deterministic
        // (market, strategy) order.
        for signal in batch {
            let decision = self.risk.evaluate_signal(&signal, now);
            if !decision.approved {
                report.rejected += 1;
                debug!(
                    market_slug = %signal.market_slug,
                    strategy = signal.strategy_name,
                    reason = %decision.reason,
                    "signal rejected"
                );
                continue;
            }
            report.approved += 1;
            let Some(approved) = decision.signal else {
                continue;
            };
            if self.submit(approved).await {
                report.executed += 1;
            }
        }

        // 7. Deterministic maker fills / live reconciliation.
        match self.executor.check_resting_orders().await {
            Ok(fills) => report.resting_fills = fills.len(),
            Err(e) => warn!(error = %e, "resting order check failed"),
        }

        // 8. Breaker sees post-tick equity.
        self.risk.on_state_update(now);

        self.metrics.increment("engine_ticks", 1);
        self.metrics
            .increment("signals_generated", report.raw_signals as u64);
        self.metrics
            .increment("signals_executed", report.executed as u64);
        self.metrics.set_gauge(
            "equity",
            self.risk.current_equity().to_string(),
        );
        report
    }

    async fn submit(&self, signal: Signal) -> bool {
        if signal.action.is_cancel() {
            let Some(order_id) = &signal.order_id else {
                warn!(strategy = signal.strategy_name, "cancel signal without order id");
                return false;
            };
            return match self.executor.cancel_order(order_id).await {
                Ok(cancelled) => cancelled,
                Err(e) => {
                    warn!(order_id = %order_id, error = %e, "cancel failed");
                    false
                }
            };
        }

        let Some(intent) = signal.action.intent() else {
            return false;
        };
        let order = OrderRequest {
            market_slug: signal.market_slug.clone(),
            intent,
            quantity: signal.quantity,
            price: signal.price,
            order_type: if signal.price.is_some() {
                OrderType::Limit
            } else {
                OrderType::Market
            },
            post_only: false,
        };
        match self.executor.execute_order(order).await {
            Ok(result) => {
                debug!(
                    market_slug = %signal.market_slug,
                    strategy = signal.strategy_name,
                    order_id = %result.order_id,
                    ?result.status,
                    filled = result.filled_quantity,
                    "order submitted"
                );
                result.is_success()
            }
            Err(e) => {
                warn!(
                    market_slug = %signal.market_slug,
                    strategy = signal.strategy_name,
                    error = %e,
                    "order submission failed"
                );
                false
            }
        }
    }

    /// Drive ticks until shutdown.
    pub async fn run(&mut self, tick_interval_ms: u64, mut shutdown: watch::Receiver<bool>) {
        info!(
            tick_interval_ms,
            strategies = self.strategies.len(),
            "strategy engine running"
        );
        let mut interval =
            tokio::time::interval(tokio::time::Duration::from_millis(tick_interval_ms.max(10)));
        loop {
            tokio::select! {
                _ = interval.tick() => {
                    let report = self.tick(Utc::now()).await;
                    if report.executed > 0 || report.resting_fills > 0 {
                        info!(
                            executed = report.executed,
                            resting_fills = report.resting_fills,
                            "tick complete"
                        );
                    }
                }
                _ = shutdown.changed() => {
                    info!("strategy engine stopped");
                    return;
                }
            }
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::data::orderbook::{BookFrame, LadderFrame, OrderBookTracker};
    use crate::execution::paper::{PaperConfig, PaperExecutor};
    use crate::risk::manager::{RiskConfig, RiskManager};
    use crate::state::StateManager;
    use crate::strategies::test_helpers::ctx as empty_ctx;
    use crate::types::{SignalAction, Urgency};
    use rust_decimal::Decimal;
    use rust_decimal_macros::dec;

    struct Probe {
        emit: Option<Signal>,
        fills: Vec<String>,
        market_updates: usize,
    }

    /// Scripted strategy sharing its observations with the test body.
    struct TestStrategy {
        probe: Arc<Mutex<Probe>>,
    }

    impl Strategy for TestStrategy {
        fn name(&self) -> &'static str {
            "test_strategy"
        }
        fn on_tick(&mut self, _ctx: &StrategyContext, _now: DateTime<Utc>) -> Vec<Signal> {
            self.probe.lock().emit.take().into_iter().collect()
        }
        fn on_market_update(
            &mut self,
            _ctx: &StrategyContext,
            _market: &crate::state::MarketState,
            _now: DateTime<Utc>,
        ) -> Vec<Signal> {
            self.probe.lock().market_updates += 1;
            Vec::new()
        }
        fn on_fill(&mut self, market_slug: &str) {
            self.probe.lock().fills.push(market_slug.to_string());
        }
    }

    fn wide_open_risk(ctx: &StrategyContext) -> RiskManager {
        RiskManager::new(
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
            },
            ctx.state.clone(),
            ctx.tracker.clone(),
            Utc::now(),
        )
        .unwrap()
    }

    fn seed_book(tracker: &OrderBookTracker, slug: &str) {
        tracker.update(
            slug,
            BookFrame {
                yes: LadderFrame {
                    bids: vec![(dec!(0.48), 100)],
                    asks: vec![(dec!(0.50), 100)],
                },
                no: LadderFrame {
                    bids: vec![(dec!(0.50), 100)],
                    asks: vec![(dec!(0.52), 100)],
                },
                timestamp: Utc::now(),
            },
        );
    }

    fn engine_with_probe(
        ctx: StrategyContext,
        emit: Option<Signal>,
    ) -> (StrategyEngine, Arc<Mutex<Probe>>) {
        let executor = Arc::new(PaperExecutor::new(
            ctx.state.clone(),
            ctx.tracker.clone(),
            PaperConfig::default(),
        ));
        let risk = wide_open_risk(&ctx);
        let metrics = Arc::new(MetricsRegistry::new());
        let mut engine = StrategyEngine::new(ctx, executor, risk, true, metrics);
        let probe = Arc::new(Mutex::new(Probe {
            emit,
            fills: Vec::new(),
            market_updates: 0,
        }));
        engine.register_strategy(Box::new(TestStrategy {
            probe: probe.clone(),
        }));
        (engine, probe)
    }

    fn buy_signal(slug: &str) -> Signal {
        Signal {
            market_slug: slug.into(),
            action: SignalAction::BuyYes,
            price: Some(dec!(0.50)),
            quantity: 10,
            urgency: Urgency::Medium,
            confidence: dec!(0.8),
            strategy_name: "test_strategy",
            reason: String::new(),
            hint: None,
            order_id: None,
        }
    }

    /// End-to-end tick: strategy signal → risk approval → taker execution →
    /// position in state, and the fill invalidates quotes on the next tick.
    #[tokio::test]
    async fn test_tick_executes_and_invalidates() {
        let ctx = empty_ctx();
        seed_book(&ctx.tracker, "aec-nba-dal-mil-2099-01-01");
        let (mut engine, probe) =
            engine_with_probe(ctx.clone(), Some(buy_signal("aec-nba-dal-mil-2099-01-01")));

        let report = engine.tick(Utc::now()).await;
        assert_eq!(report.approved, 1);
        assert_eq!(report.executed, 1);
        let pos = ctx.state.get_position("aec-nba-dal-mil-2099-01-01").unwrap();
        assert_eq!(pos.quantity, 10);

        // The fill listener fires during execution; the next tick drains it
        // into strategy invalidation.
        engine.tick(Utc::now()).await;
        assert_eq!(
            probe.lock().fills,
            vec!["aec-nba-dal-mil-2099-01-01".to_string()]
        );
    }

    /// Buys on a market whose slug date is in the past are dropped before
    /// the risk manager sees them.
    #[tokio::test]
    async fn test_stale_market_buys_dropped() {
        let ctx = empty_ctx();
        seed_book(&ctx.tracker, "aec-nba-dal-mil-2020-01-01");
        let (mut engine, _probe) =
            engine_with_probe(ctx.clone(), Some(buy_signal("aec-nba-dal-mil-2020-01-01")));

        let report = engine.tick(Utc::now()).await;
        assert_eq!(report.raw_signals, 1);
        assert_eq!(report.aggregated, 0);
        assert_eq!(report.executed, 0);
        assert!(ctx.state.get_position("aec-nba-dal-mil-2020-01-01").is_none());
    }

    /// on_market_update fires only for markets whose quote changed since the
    /// prior tick.
    #[tokio::test]
    async fn test_market_update_change_detection() {
        let ctx = empty_ctx();
        let (mut engine, probe) = engine_with_probe(ctx.clone(), None);

        ctx.state
            .update_market("m1", Some(dec!(0.48)), Some(dec!(0.50)), None, None, Utc::now())
            .unwrap();
        engine.tick(Utc::now()).await;
        assert_eq!(probe.lock().market_updates, 1);

        // No change: no second fan-out.
        engine.tick(Utc::now()).await;
        assert_eq!(probe.lock().market_updates, 1);

        // Fresh quote: fan-out again.
        ctx.state
            .update_market(
                "m1",
                Some(dec!(0.47)),
                Some(dec!(0.49)),
                None,
                None,
                Utc::now() + chrono::Duration::milliseconds(5),
            )
            .unwrap();
        engine.tick(Utc::now()).await;
        assert_eq!(probe.lock().market_updates, 2);
    }

    /// A tripped breaker rejects the buy at the risk stage; the tick keeps
    /// running.
    #[tokio::test]
    async fn test_breaker_rejection_counted() {
        let ctx = empty_ctx();
        seed_book(&ctx.tracker, "aec-nba-dal-mil-2099-01-01");
        let (mut engine, _probe) =
            engine_with_probe(ctx.clone(), Some(buy_signal("aec-nba-dal-mil-2099-01-01")));
        engine
            .risk_mut()
            .breaker_mut()
            .emergency_stop("test", Utc::now());

        let report = engine.tick(Utc::now()).await;
        assert_eq!(report.rejected, 1);
        assert_eq!(report.executed, 0);
    }
}
