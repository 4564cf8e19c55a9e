//! Shared fixtures for strategy and engine tests.

use std::sync::Arc;

use chrono::Utc;
use rust_decimal::Decimal;
use rust_decimal_macros::dec;

use super::StrategyContext;
use crate::data::orderbook::{BookFrame, LadderFrame, OrderBookTracker};
use crate::state::StateManager;
use crate::types::{GameState, GameStatus, OddsSnapshot};

pub fn ctx() -> StrategyContext {
    StrategyContext {
        state: Arc::new(StateManager::new(dec!(1000))),
        tracker: Arc::new(OrderBookTracker::new()),
    }
}

/// Context with a market quoted at the given YES bid/ask (no book depth).
pub fn ctx_with_market(slug: &str, yes_bid: Decimal, yes_ask: Decimal) -> StrategyContext {
    let ctx = ctx();
    ctx.state
        .update_market(slug, Some(yes_bid), Some(yes_ask), None, None, Utc::now())
        .unwrap();
    ctx
}

/// Context with YES book depth; market state is refreshed from the book.
pub fn ctx_with_book(
    slug: &str,
    yes_bids: Vec<(Decimal, u64)>,
    yes_asks: Vec<(Decimal, u64)>,
) -> StrategyContext {
    let ctx = ctx();
    ctx.tracker.update(
        slug,
        BookFrame {
            yes: LadderFrame {
                bids: yes_bids,
                asks: yes_asks,
            },
            no: LadderFrame::default(),
            timestamp: Utc::now(),
        },
    );
    let book = ctx.tracker.get(slug).unwrap();
    ctx.state
        .update_market(
            slug,
            book.yes.best_bid(),
            book.yes.best_ask(),
            book.no.best_bid(),
            book.no.best_ask(),
            Utc::now(),
        )
        .unwrap();
    ctx
}

pub fn game_state(event_id: &str, home_score: u32, away_score: u32, home_is_yes: bool) -> GameState {
    GameState {
        event_id: event_id.to_string(),
        home_team: "MIL".into(),
        away_team: "DAL".into(),
        home_score,
        away_score,
        period: Some("Q3".into()),
        clock: Some("4:12".into()),
        status: GameStatus::InProgress,
        market_slug: None,
        home_is_yes,
        updated_at: Utc::now(),
    }
}

pub fn odds_snapshot(slug: &str, yes_probability: Decimal, confidence: Decimal) -> OddsSnapshot {
    OddsSnapshot {
        event_id: slug.to_string(),
        provider: "mock".into(),
        yes_probability,
        market_slug: Some(slug.to_string()),
        confidence,
        updated_at: Utc::now(),
    }
}
