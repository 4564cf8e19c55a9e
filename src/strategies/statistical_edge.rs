//! Statistical edge strategy: sportsbook implied probabilities vs market
//! prices. Buys the side the sportsbooks say is underpriced.

use std::collections::{HashMap, HashSet};

use chrono::{DateTime, Duration, Utc};
use rust_decimal::Decimal;
use rust_decimal_macros::dec;
use tokio::sync::mpsc;
use tracing::debug;

use super::{clamp_price, contracts_for, Strategy, StrategyContext};
use crate::state::MarketState;
use crate::types::{OddsSnapshot, Signal, SignalAction, SignalHint, Urgency};

pub const NAME: &str = "statistical_edge";

#[derive(Clone, Debug)]
pub struct StatisticalEdgeConfig {
    pub min_edge: Decimal,
    pub order_size: Decimal,
    pub cooldown_secs: i64,
    pub enabled_markets: Vec<String>,
}

impl Default for StatisticalEdgeConfig {
    fn default() -> Self {
        Self {
            min_edge: dec!(0.02),
            order_size: dec!(10.00),
            cooldown_secs: 10,
            enabled_markets: Vec::new(),
        }
    }
}

pub struct StatisticalEdge {
    config: StatisticalEdgeConfig,
    odds_rx: mpsc::Receiver<OddsSnapshot>,
    latest: HashMap<String, OddsSnapshot>,
    pending: HashSet<String>,
    last_signal_at: HashMap<String, DateTime<Utc>>,
}

impl StatisticalEdge {
    pub fn new(config: StatisticalEdgeConfig, odds_rx: mpsc::Receiver<OddsSnapshot>) -> Self {
        Self {
            config,
            odds_rx,
            latest: HashMap::new(),
            pending: HashSet::new(),
            last_signal_at: HashMap::new(),
        }
    }

    pub fn ingest_odds_snapshot(&mut self, snapshot: OddsSnapshot) {
        let key = snapshot
            .market_slug
            .clone()
            .unwrap_or_else(|| snapshot.event_id.clone());
        self.latest.insert(key.clone(), snapshot);
        self.pending.insert(key);
    }

    fn resolve_market_slug(&self, ctx: &StrategyContext, snapshot: &OddsSnapshot) -> Option<String> {
        if let Some(slug) = &snapshot.market_slug {
            return Some(slug.clone());
        }
        ctx.state
            .all_markets()
            .into_iter()
            .map(|m| m.market_slug)
            .find(|slug| slug.contains(&snapshot.event_id))
    }

    fn market_enabled(&self, market_slug: &str) -> bool {
        self.config.enabled_markets.is_empty()
            || self
                .config
                .enabled_markets
                .iter()
                .any(|pattern| market_slug.contains(pattern))
    }

    fn generate_signal(&self, market: &MarketState, snapshot: &OddsSnapshot) -> Option<Signal> {
        if market.yes_ask.is_none() && market.no_ask.is_none() {
            return None;
        }
        let fair_yes = snapshot.yes_probability;
        let mut best_edge = Decimal::ZERO;
        let mut best: Option<Signal> = None;

        if let Some(yes_ask) = market.yes_ask {
            let edge = fair_yes - yes_ask;
            if edge >= self.config.min_edge && edge > best_edge {
                let price = clamp_price(yes_ask);
                let quantity = contracts_for(self.config.order_size, price);
                if quantity > 0 {
                    best_edge = edge;
                    best = Some(Signal {
                        market_slug: market.market_slug.clone(),
                        action: SignalAction::BuyYes,
                        price: Some(price),
                        quantity,
                        urgency: Urgency::Medium,
                        confidence: snapshot.confidence,
                        strategy_name: NAME,
                        reason: format!("Odds edge {edge:.3} vs {}", snapshot.provider),
                        hint: Some(SignalHint::TrueProbability(fair_yes)),
                        order_id: None,
                    });
                }
            }
        }

        let no_ask = market
            .no_ask
            .or_else(|| market.yes_bid.map(|b| Decimal::ONE - b));
        if let Some(no_ask) = no_ask {
            let fair_no = snapshot.no_probability();
            let edge = fair_no - no_ask;
            if edge >= self.config.min_edge && edge > best_edge {
                let price = clamp_price(no_ask);
                let quantity = contracts_for(self.config.order_size, price);
                if quantity > 0 {
                    best = Some(Signal {
                        market_slug: market.market_slug.clone(),
                        action: SignalAction::BuyNo,
                        price: Some(price),
                        quantity,
                        urgency: Urgency::Medium,
                        confidence: snapshot.confidence,
                        strategy_name: NAME,
                        reason: format!("Odds edge {edge:.3} vs {}", snapshot.provider),
                        hint: Some(SignalHint::TrueProbability(fair_no)),
                        order_id: None,
                    });
                }
            }
        }

        best
    }
}

impl Strategy for StatisticalEdge {
    fn name(&self) -> &'static str {
        NAME
    }

    fn on_tick(&mut self, ctx: &StrategyContext, now: DateTime<Utc>) -> Vec<Signal> {
        while let Ok(snapshot) = self.odds_rx.try_recv() {
            self.ingest_odds_snapshot(snapshot);
        }

        let pending: Vec<String> = self.pending.drain().collect();
        let mut signals = Vec::new();

        for key in pending {
            let Some(snapshot) = self.latest.get(&key) else {
                continue;
            };
            let Some(market_slug) = self.resolve_market_slug(ctx, snapshot) else {
                continue;
            };
            if !self.market_enabled(&market_slug) {
                continue;
            }
            if let Some(last) = self.last_signal_at.get(&market_slug) {
                if now - *last < Duration::seconds(self.config.cooldown_secs) {
                    continue;
                }
            }
            let Some(market) = ctx.state.get_market(&market_slug) else {
                continue;
            };
            if let Some(signal) = self.generate_signal(&market, snapshot) {
                debug!(market_slug = %market_slug, reason = %signal.reason, "statistical edge signal");
                signals.push(signal);
                self.last_signal_at.insert(market_slug, now);
            }
        }
        signals
    }
}
