//! Sports feed: publishes live game snapshots onto the event bus.
//!
//! The deterministic mock implementation drives paper trading and tests;
//! a real provider integration plugs in at the same publish seam.

use std::collections::HashMap;
use std::sync::Arc;

use chrono::{DateTime, Utc};
use tokio::sync::watch;
use tracing::info;

use crate::data::event_bus::EventBus;
use crate::monitor::metrics::{FeedMonitor, MetricsRegistry};
use crate::types::{GameState, GameStatus};

pub const FEED_NAME: &str = "sports_feed";

/// Event id from a sports slug like `aec-nba-dal-mil-2026-01-25`:
/// the league/team/date segments after the venue prefix.
pub fn event_id_from_slug(slug: &str) -> String {
    let parts: Vec<&str> = slug.split('-').collect();
    if parts.len() >= 6 {
        parts[1..6].join("-")
    } else if parts.len() >= 2 {
        parts[1..].join("-")
    } else {
        slug.to_string()
    }
}

/// (home, away) team codes from a sports slug; slugs order away before home.
pub fn teams_from_slug(slug: &str) -> (String, String) {
    let parts: Vec<&str> = slug.split('-').collect();
    if parts.len() >= 4 {
        (parts[3].to_uppercase(), parts[2].to_uppercase())
    } else {
        ("HOME".into(), "AWAY".into())
    }
}

/// Deterministic sports feed: alternates score increments between home and
/// away each tick, so scores stay monotone and games stay close.
pub struct MockSportsFeed {
    market_slugs: Vec<String>,
    tick: u64,
    states: HashMap<String, GameState>,
}

impl MockSportsFeed {
    pub fn new(market_slugs: Vec<String>) -> Self {
        Self {
            market_slugs,
            tick: 0,
            states: HashMap::new(),
        }
    }

    /// Produce the next snapshot per market.
    pub fn emit_once(&mut self, now: DateTime<Utc>) -> Vec<GameState> {
        if self.market_slugs.is_empty() {
            return Vec::new();
        }
        self.tick += 1;
        let mut out = Vec::with_capacity(self.market_slugs.len());
        for slug in &self.market_slugs {
            let event_id = event_id_from_slug(slug);
            let entry = self.states.entry(event_id.clone()).or_insert_with(|| {
                let (home, away) = teams_from_slug(slug);
                GameState {
                    event_id,
                    home_team: home,
                    away_team: away,
                    home_score: 0,
                    away_score: 0,
                    period: Some("Q1".into()),
                    clock: Some("12:00".into()),
                    status: GameStatus::InProgress,
                    market_slug: Some(slug.clone()),
                    home_is_yes: true,
                    updated_at: now,
                }
            });
            if self.tick % 2 == 0 {
                entry.home_score += 1;
            } else {
                entry.away_score += 1;
            }
            entry.updated_at = now;
            out.push(entry.clone());
        }
        out
    }
}

/// Run the mock feed until shutdown, publishing each snapshot and marking
/// feed liveness.
pub async fn run_mock_sports_feed(
    mut feed: MockSportsFeed,
    bus: Arc<EventBus>,
    feed_monitor: Arc<FeedMonitor>,
    metrics: Arc<MetricsRegistry>,
    interval_ms: u64,
    mut shutdown: watch::Receiver<bool>,
) {
    info!(markets = feed.market_slugs.len(), "mock sports feed started");
    let mut interval = tokio::time::interval(tokio::time::Duration::from_millis(interval_ms.max(1)));
    loop {
        tokio::select! {
            _ = interval.tick() => {
                let now = Utc::now();
                for state in feed.emit_once(now) {
                    bus.game_state.publish(state);
                    metrics.increment("sports_feed_updates", 1);
                }
                feed_monitor.mark_update(FEED_NAME, now);
            }
            _ = shutdown.changed() => {
                info!("mock sports feed stopped");
                return;
            }
        }
    }
}
