//! Live arbitrage strategy: reacts to score changes faster than the market.
//!
//! Consumes `GameState` snapshots from the event bus, estimates a fair YES
//! probability from the score lead, and buys whichever side the market still
//! prices below fair.

use std::collections::{HashMap, HashSet};

use chrono::{DateTime, Duration, Utc};
use rust_decimal::Decimal;
use rust_decimal_macros::dec;
use tokio::sync::mpsc;
use tracing::debug;

use super::{clamp_price, contracts_for, Strategy, StrategyContext};
use crate::state::MarketState;
use crate::types::{GameState, Signal, SignalAction, SignalHint, Urgency};

pub const NAME: &str = "live_arbitrage";

const PROB_FLOOR: Decimal = dec!(0.05);
const PROB_CEIL: Decimal = dec!(0.95);

#[derive(Clone, Debug)]
pub struct LiveArbitrageConfig {
    pub min_edge: Decimal,
    pub order_size: Decimal,
    /// Probability shift per point of score lead.
    pub lead_multiplier: Decimal,
    /// Cap on the total lead-driven shift away from 0.50.
    pub max_prob_shift: Decimal,
    pub cooldown_secs: i64,
    /// Slug substrings this strategy trades; empty means all.
    pub enabled_markets: Vec<String>,
}

impl Default for LiveArbitrageConfig {
    fn default() -> Self {
        Self {
            min_edge: dec!(0.03),
            order_size: dec!(10.00),
            lead_multiplier: dec!(0.02),
            max_prob_shift: dec!(0.25),
            cooldown_secs: 5,
            enabled_markets: Vec::new(),
        }
    }
}

pub struct LiveArbitrage {
    config: LiveArbitrageConfig,
    game_rx: mpsc::Receiver<GameState>,
    latest: HashMap<String, GameState>,
    pending: HashSet<String>,
    last_signal_at: HashMap<String, DateTime<Utc>>,
}

impl LiveArbitrage {
    pub fn new(config: LiveArbitrageConfig, game_rx: mpsc::Receiver<GameState>) -> Self {
        Self {
            config,
            game_rx,
            latest: HashMap::new(),
            pending: HashSet::new(),
            last_signal_at: HashMap::new(),
        }
    }

    pub fn ingest_game_state(&mut self, state: GameState) {
        self.pending.insert(state.event_id.clone());
        self.latest.insert(state.event_id.clone(), state);
    }

    /// Fair YES probability from the score lead: 0.50 shifted by
    /// `lead_multiplier` per point, capped, flipped when the home team is
    /// not the YES outcome, and clamped into the publishable band.
    fn estimate_yes_probability(&self, state: &GameState) -> Decimal {
        let lead = Decimal::from(state.score_diff().abs());
        let shift = (self.config.lead_multiplier * lead).min(self.config.max_prob_shift);
        let mut prob = if state.score_diff() >= 0 {
            dec!(0.5) + shift
        } else {
            dec!(0.5) - shift
        };
        if !state.home_is_yes {
            prob = Decimal::ONE - prob;
        }
        prob.clamp(PROB_FLOOR, PROB_CEIL)
    }

    fn resolve_market_slug(&self, ctx: &StrategyContext, state: &GameState) -> Option<String> {
        if let Some(slug) = &state.market_slug {
            return Some(slug.clone());
        }
        ctx.state
            .all_markets()
            .into_iter()
            .map(|m| m.market_slug)
            .find(|slug| slug.contains(&state.event_id))
    }

    fn market_enabled(&self, market_slug: &str) -> bool {
        self.config.enabled_markets.is_empty()
            || self
                .config
                .enabled_markets
                .iter()
                .any(|pattern| market_slug.contains(pattern))
    }

    fn generate_signal(&self, market: &MarketState, state: &GameState) -> Option<Signal> {
        if market.yes_ask.is_none() && market.no_ask.is_none() {
            return None;
        }
        let fair_yes = self.estimate_yes_probability(state);
        let lead = Decimal::from(state.score_diff().abs());
        let confidence = (dec!(0.55) + lead * dec!(0.05)).min(dec!(0.9));

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
                        urgency: Urgency::High,
                        confidence,
                        strategy_name: NAME,
                        reason: format!("Live edge {edge:.3} on score update"),
                        hint: Some(SignalHint::TrueProbability(fair_yes)),
                        order_id: None,
                    });
                }
            }
        }

        // Derive a NO ask from the YES bid when the venue omits one.
        let no_ask = market
            .no_ask
            .or_else(|| market.yes_bid.map(|b| Decimal::ONE - b));
        if let Some(no_ask) = no_ask {
            let fair_no = Decimal::ONE - fair_yes;
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
                        urgency: Urgency::High,
                        confidence,
                        strategy_name: NAME,
                        reason: format!("Live edge {edge:.3} on score update"),
                        hint: Some(SignalHint::TrueProbability(fair_no)),
                        order_id: None,
                    });
                }
            }
        }

        best
    }
}

impl Strategy for LiveArbitrage {
    fn name(&self) -> &'static str {
        NAME
    }

    fn on_tick(&mut self, ctx: &StrategyContext, now: DateTime<Utc>) -> Vec<Signal> {
        while let Ok(state) = self.game_rx.try_recv() {
            self.ingest_game_state(state);
        }

        let pending: Vec<String> = self.pending.drain().collect();
        let mut signals = Vec::new();

        for event_id in pending {
            let Some(state) = self.latest.get(&event_id) else {
                continue;
            };
            let Some(market_slug) = self.resolve_market_slug(ctx, state) else {
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
            if let Some(signal) = self.generate_signal(&market, state) {
                debug!(market_slug = %market_slug, reason = %signal.reason, "live arbitrage signal");
                signals.push(signal);
                self.last_signal_at.insert(market_slug, now);
            }
        }
        signals
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::strategies::test_helpers::{ctx_with_market, game_state};

    fn strategy(config: LiveArbitrageConfig) -> LiveArbitrage {
        let (_tx, rx) = mpsc::channel(8);
        LiveArbitrage::new(config, rx)
    }

    /// Lead of 3 shifts fair probability by 3 × 0.02 toward the leader.
    #[test]
    fn test_probability_estimate_from_lead() {
        let strat = strategy(LiveArbitrageConfig::default());
        let gs = game_state("nba-dal-mil-2026-01", 10, 7, true);
        assert_eq!(strat.estimate_yes_probability(&gs), dec!(0.56));

        let trailing = game_state("nba-dal-mil-2026-01", 7, 10, true);
        assert_eq!(strat.estimate_yes_probability(&trailing), dec!(0.44));
    }

    /// When the away team is the YES outcome the estimate flips.
    #[test]
    fn test_probability_flips_for_away_yes() {
        let strat = strategy(LiveArbitrageConfig::default());
        let gs = game_state("nba-dal-mil-2026-01", 10, 7, false);
        assert_eq!(strat.estimate_yes_probability(&gs), dec!(0.44));
    }

    /// A blowout lead caps at max_prob_shift and the clamp band.
    #[test]
    fn test_probability_shift_capped() {
        let strat = strategy(LiveArbitrageConfig::default());
        let gs = game_state("nba-dal-mil-2026-01", 60, 0, true);
        assert_eq!(strat.estimate_yes_probability(&gs), dec!(0.75));
    }

    /// Scenario: fair 0.56 against a 0.50 ask (edge 0.06 ≥ min 0.03).
    /// Expected: BuyYes with a true-probability hint and scaled confidence.
    #[test]
    fn test_signal_on_score_edge() {
        let ctx = ctx_with_market("aec-nba-dal-mil-2026-01-25", dec!(0.49), dec!(0.50));
        let mut strat = strategy(LiveArbitrageConfig::default());
        let mut gs = game_state("nba-dal-mil-2026-01", 10, 7, true);
        gs.market_slug = Some("aec-nba-dal-mil-2026-01-25".into());
        strat.ingest_game_state(gs);

        let signals = strat.on_tick(&ctx, Utc::now());
        assert_eq!(signals.len(), 1);
        let sig = &signals[0];
        assert_eq!(sig.action, SignalAction::BuyYes);
        assert_eq!(sig.price, Some(dec!(0.50)));
        assert_eq!(sig.quantity, 20);
        assert_eq!(sig.urgency, Urgency::High);
        assert_eq!(sig.hint, Some(SignalHint::TrueProbability(dec!(0.56))));
        assert_eq!(sig.confidence, dec!(0.70));
    }

    /// Within the cooldown window a second score update stays quiet.
    #[test]
    fn test_cooldown_suppresses_repeat() {
        let ctx = ctx_with_market("aec-nba-dal-mil-2026-01-25", dec!(0.49), dec!(0.50));
        let mut strat = strategy(LiveArbitrageConfig::default());
        let now = Utc::now();

        let mut gs = game_state("nba-dal-mil-2026-01", 10, 7, true);
        gs.market_slug = Some("aec-nba-dal-mil-2026-01-25".into());
        strat.ingest_game_state(gs.clone());
        assert_eq!(strat.on_tick(&ctx, now).len(), 1);

        gs.home_score = 12;
        strat.ingest_game_state(gs.clone());
        assert!(strat.on_tick(&ctx, now + Duration::seconds(2)).is_empty());

        strat.ingest_game_state(gs);
        assert_eq!(strat.on_tick(&ctx, now + Duration::seconds(6)).len(), 1);
    }

    /// Tight market with no edge emits nothing.
    #[test]
    fn test_no_edge_no_signal() {
        let ctx = ctx_with_market("aec-nba-dal-mil-2026-01-25", dec!(0.55), dec!(0.56));
        let mut strat = strategy(LiveArbitrageConfig::default());
        let mut gs = game_state("nba-dal-mil-2026-01", 8, 7, true);
        gs.market_slug = Some("aec-nba-dal-mil-2026-01-25".into());
        strat.ingest_game_state(gs);
        assert!(strat.on_tick(&ctx, Utc::now()).is_empty());
    }

    /// The enabled-markets filter gates signal generation by substring.
    #[test]
    fn test_enabled_markets_filter() {
        let ctx = ctx_with_market("aec-nba-dal-mil-2026-01-25", dec!(0.49), dec!(0.50));
        let mut strat = strategy(LiveArbitrageConfig {
            enabled_markets: vec!["nfl".into()],
            ..LiveArbitrageConfig::default()
        });
        let mut gs = game_state("nba-dal-mil-2026-01", 10, 7, true);
        gs.market_slug = Some("aec-nba-dal-mil-2026-01-25".into());
        strat.ingest_game_state(gs);
        assert!(strat.on_tick(&ctx, Utc::now()).is_empty());
    }
}
