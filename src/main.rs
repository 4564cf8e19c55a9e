use std::sync::Arc;
use std::time::Duration;

use anyhow::Context;
use chrono::Utc;
use tokio::sync::{mpsc, watch};
use tracing::{info, warn};

use polymarket_sports::api::client::{ExchangeClient, HttpExchangeClient, Signer, StaticTokenSigner};
use polymarket_sports::api::ws::{run_ws_consumer, PrivateFrame};
use polymarket_sports::config::{Config, TradingMode};
use polymarket_sports::data::event_bus::{EventBus, DEFAULT_QUEUE_CAPACITY};
use polymarket_sports::data::orderbook::OrderBookTracker;
use polymarket_sports::engine::runner::StrategyEngine;
use polymarket_sports::execution::live::LiveExecutor;
use polymarket_sports::execution::paper::{PaperConfig, PaperExecutor};
use polymarket_sports::execution::Executor;
use polymarket_sports::feeds::book_poller::RestBookPoller;
use polymarket_sports::feeds::odds::{run_mock_odds_feed, MockOddsFeed};
use polymarket_sports::feeds::sports::{run_mock_sports_feed, MockSportsFeed};
use polymarket_sports::monitor::health::build_health_report;
use polymarket_sports::monitor::metrics::{FeedMonitor, MetricsRegistry};
use polymarket_sports::risk::manager::{RiskConfig, RiskManager};
use polymarket_sports::state::StateManager;
use polymarket_sports::strategies::live_arbitrage::{LiveArbitrage, LiveArbitrageConfig};
use polymarket_sports::strategies::market_maker::{MarketMaker, MarketMakerConfig};
use polymarket_sports::strategies::statistical_edge::{StatisticalEdge, StatisticalEdgeConfig};
use polymarket_sports::strategies::StrategyContext;

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    dotenvy::dotenv().ok();
    tracing_subscriber::fmt()
        .with_env_filter(
            tracing_subscriber::EnvFilter::try_from_default_env()
                .unwrap_or_else(|_| tracing_subscriber::EnvFilter::new("info")),
        )
        .init();

    let config = Config::from_env();
    info!(
        mode = config.trading_mode.label(),
        initial_balance = %config.initial_balance,
        markets = config.market_slugs.len(),
        kelly_fraction = %config.kelly_fraction,
        max_daily_loss = %config.max_daily_loss,
        "polymarket sports bot starting"
    );
    if config.market_slugs.is_empty() {
        warn!("MARKET_SLUGS is empty; nothing will be quoted");
    }

    // ── Shared core ──
    let state = Arc::new(StateManager::new(config.initial_balance));
    let tracker = Arc::new(OrderBookTracker::new());
    let bus = Arc::new(EventBus::new());
    let metrics = Arc::new(MetricsRegistry::new());
    let feed_monitor = Arc::new(FeedMonitor::new(config.feed_stale_after_secs));

    // Cooperative shutdown: feeds and the engine exit their loops when this
    // flips to true.
    let (shutdown_tx, shutdown_rx) = watch::channel(false);
    tokio::spawn(async move {
        if tokio::signal::ctrl_c().await.is_ok() {
            info!("shutdown signal received");
            let _ = shutdown_tx.send(true);
        }
    });

    let request_timeout = Duration::from_millis(config.request_timeout_ms);

    // ── Executor (mode switch) ──
    let mut private_tx: Option<mpsc::Sender<PrivateFrame>> = None;
    let (executor, client): (Arc<dyn Executor>, Arc<dyn ExchangeClient>) =
        match config.trading_mode {
            TradingMode::Paper => {
                let executor = Arc::new(PaperExecutor::new(
                    state.clone(),
                    tracker.clone(),
                    PaperConfig::from_config(&config),
                ));
                // Public market data needs no credentials.
                let client = Arc::new(
                    HttpExchangeClient::new(&config.api_base_url, None, request_timeout)
                        .context("building public api client")?,
                );
                (
                    executor as Arc<dyn Executor>,
                    client as Arc<dyn ExchangeClient>,
                )
            }
            TradingMode::Live => {
                let token = std::env::var("PM_SIGNING_TOKEN")
                    .context("live mode requires PM_SIGNING_TOKEN")?;
                let signer =
                    Arc::new(StaticTokenSigner::new(config.api_key_id.clone(), token)) as Arc<dyn Signer>;
                let client = Arc::new(
                    HttpExchangeClient::new(&config.api_base_url, Some(signer), request_timeout)
                        .context("building signed api client")?,
                );
                let live = Arc::new(LiveExecutor::new(
                    client.clone() as Arc<dyn ExchangeClient>,
                    state.clone(),
                    tracker.clone(),
                    config.liquidation_discount,
                ));

                // Private stream → executor frame application.
                let (tx, mut rx) = mpsc::channel::<PrivateFrame>(1024);
                private_tx = Some(tx);
                let frame_sink = live.clone();
                tokio::spawn(async move {
                    while let Some(frame) = rx.recv().await {
                        frame_sink.apply_private_frame(frame);
                    }
                });

                (live as Arc<dyn Executor>, client as Arc<dyn ExchangeClient>)
            }
        };

    // ── Feeds ──
    tokio::spawn(run_ws_consumer(
        config.ws_url.clone(),
        config.market_slugs.clone(),
        tracker.clone(),
        state.clone(),
        private_tx,
        shutdown_rx.clone(),
    ));

    let poller = RestBookPoller {
        client: client.clone(),
        tracker: tracker.clone(),
        state: state.clone(),
        market_slugs: config.market_slugs.clone(),
        interval_ms: config.book_poll_interval_ms,
        max_markets: 50,
        concurrency: 5,
    };
    tokio::spawn(poller.run(
        feed_monitor.clone(),
        metrics.clone(),
        shutdown_rx.clone(),
    ));

    if config.trading_mode == TradingMode::Paper {
        // Deterministic game/odds feeds drive the event-bus strategies in
        // paper mode; live provider integrations publish at the same seam.
        tokio::spawn(run_mock_sports_feed(
            MockSportsFeed::new(config.market_slugs.clone()),
            bus.clone(),
            feed_monitor.clone(),
            metrics.clone(),
            config.sports_feed_interval_ms,
            shutdown_rx.clone(),
        ));
        tokio::spawn(run_mock_odds_feed(
            MockOddsFeed::new(config.market_slugs.clone()),
            bus.clone(),
            feed_monitor.clone(),
            metrics.clone(),
            config.odds_feed_interval_ms,
            shutdown_rx.clone(),
        ));
    }

    // ── Risk ──
    let mut risk = RiskManager::new(
        RiskConfig::from_config(&config),
        state.clone(),
        tracker.clone(),
        Utc::now(),
    )?;
    for (group, markets) in parse_correlation_groups(
        &std::env::var("CORRELATION_GROUPS").unwrap_or_default(),
    ) {
        risk.set_correlation_group(&group, &markets);
    }

    if config.trading_mode == TradingMode::Live {
        // Initial sync so the breaker baseline reflects real balance and
        // positions rather than the paper default.
        if let Err(e) = executor.check_resting_orders().await {
            warn!(error = %e, "initial live reconciliation failed");
        }
        risk.reset_starting_equity(Utc::now())?;
    }

    // ── Engine ──
    let ctx = StrategyContext {
        state: state.clone(),
        tracker: tracker.clone(),
    };
    let mut engine = StrategyEngine::new(
        ctx,
        executor.clone(),
        risk,
        config.allow_in_game,
        metrics.clone(),
    );
    engine.register_strategy(Box::new(MarketMaker::new(MarketMakerConfig::default())));
    engine.register_strategy(Box::new(LiveArbitrage::new(
        LiveArbitrageConfig::default(),
        bus.game_state.subscribe(DEFAULT_QUEUE_CAPACITY),
    )));
    engine.register_strategy(Box::new(StatisticalEdge::new(
        StatisticalEdgeConfig::default(),
        bus.odds_snapshot.subscribe(DEFAULT_QUEUE_CAPACITY),
    )));

    engine.run(config.tick_interval_ms, shutdown_rx).await;

    // Final health snapshot on the way out.
    let health = build_health_report(
        config.trading_mode.label(),
        &feed_monitor,
        &metrics,
        engine.risk_mut().breaker().status(),
        executor.performance(),
        Utc::now(),
    );
    info!(
        cash = %health.performance.cash,
        realized_pnl = %health.performance.realized_pnl,
        total_equity = %health.performance.total_equity,
        breaker = ?health.circuit_breaker.state,
        "bot stopped"
    );
    Ok(())
}

/// Parse `name=slug1|slug2;name2=slug3` into correlation groups.
fn parse_correlation_groups(raw: &str) -> Vec<(String, Vec<String>)> {
    raw.split(';')
        .filter_map(|entry| {
            let (name, slugs) = entry.split_once('=')?;
            let markets: Vec<String> = slugs
                .split('|')
                .map(str::trim)
                .filter(|s| !s.is_empty())
                .map(String::from)
                .collect();
            if name.trim().is_empty() || markets.is_empty() {
                return None;
            }
            Some((name.trim().to_string(), markets))
        })
        .collect()
}
