use std::sync::atomic::{AtomicU64, Ordering};

use parking_lot::Mutex;
use tokio::sync::mpsc;
use tracing::warn;

use crate::types::{GameState, OddsSnapshot};

pub const DEFAULT_QUEUE_CAPACITY: usize = 256;

/// One pub/sub topic delivering payloads over bounded per-subscriber queues.
///
/// Publish never blocks: a full queue drops the payload for that subscriber
/// and bumps the drop counter instead of back-pressuring the producer.
/// Delivery order per subscriber matches publish order; there is no ordering
/// guarantee across subscribers. Unsubscribing is dropping the receiver —
/// closed queues are pruned on the next publish, so repeated drops are
/// naturally idempotent.
pub struct Topic<T> {
    name: &'static str,
    subscribers: Mutex<Vec<mpsc::Sender<T>>>,
    dropped: AtomicU64,
}

impl<T: Clone> Topic<T> {
    fn new(name: &'static str) -> Self {
        Self {
            name,
            subscribers: Mutex::new(Vec::new()),
            dropped: AtomicU64::new(0),
        }
    }

    pub fn subscribe(&self, capacity: usize) -> mpsc::Receiver<T> {
        let (tx, rx) = mpsc::channel(capacity.max(1));
        self.subscribers.lock().push(tx);
        rx
    }

    /// Deliver a payload to every live subscriber. Returns the delivered count.
    pub fn publish(&self, payload: T) -> usize {
        let mut subs = self.subscribers.lock();
        subs.retain(|tx| !tx.is_closed());
        let mut delivered = 0;
        for tx in subs.iter() {
            match tx.try_send(payload.clone()) {
                Ok(()) => delivered += 1,
                Err(mpsc::error::TrySendError::Full(_)) => {
                    self.dropped.fetch_add(1, Ordering::Relaxed);
                    warn!(topic = self.name, "event bus queue full, dropping payload");
                }
                Err(mpsc::error::TrySendError::Closed(_)) => {}
            }
        }
        delivered
    }

    pub fn subscriber_count(&self) -> usize {
        let mut subs = self.subscribers.lock();
        subs.retain(|tx| !tx.is_closed());
        subs.len()
    }

    pub fn dropped(&self) -> u64 {
        self.dropped.load(Ordering::Relaxed)
    }
}

/// Typed topics consumed by the core: live game state and sportsbook odds.
pub struct EventBus {
    pub game_state: Topic<GameState>,
    pub odds_snapshot: Topic<OddsSnapshot>,
}

impl Default for EventBus {
    fn default() -> Self {
        Self::new()
    }
}

impl EventBus {
    pub fn new() -> Self {
        Self {
            game_state: Topic::new("game_state"),
            odds_snapshot: Topic::new("odds_snapshot"),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::types::GameStatus;
    use chrono::Utc;
    use rust_decimal_macros::dec;

    fn game_state(home_score: u32) -> GameState {
        GameState {
            event_id: "nba-dal-mil".into(),
            home_team: "MIL".into(),
            away_team: "DAL".into(),
            home_score,
            away_score: 0,
            period: None,
            clock: None,
            status: GameStatus::InProgress,
            market_slug: None,
            home_is_yes: true,
            updated_at: Utc::now(),
        }
    }

    /// Scenario: two subscribers, three publishes.
    /// Expected: each subscriber receives all payloads in publish order.
    #[tokio::test]
    async fn test_fifo_delivery_per_subscriber() {
        let bus = EventBus::new();
        let mut a = bus.game_state.subscribe(8);
        let mut b = bus.game_state.subscribe(8);

        for score in [1, 2, 3] {
            assert_eq!(bus.game_state.publish(game_state(score)), 2);
        }
        for rx in [&mut a, &mut b] {
            for expected in [1, 2, 3] {
                assert_eq!(rx.recv().await.unwrap().home_score, expected);
            }
        }
    }

    /// Scenario: subscriber queue of capacity 1 receives two publishes without
    /// draining.
    /// Expected: second publish is dropped for that subscriber and counted.
    #[tokio::test]
    async fn test_drop_on_full_queue() {
        let bus = EventBus::new();
        let mut rx = bus.game_state.subscribe(1);

        assert_eq!(bus.game_state.publish(game_state(1)), 1);
        assert_eq!(bus.game_state.publish(game_state(2)), 0);
        assert_eq!(bus.game_state.dropped(), 1);

        // The first payload is still delivered intact.
        assert_eq!(rx.recv().await.unwrap().home_score, 1);
    }

    /// Scenario: a subscriber drops its receiver.
    /// Expected: the queue is pruned and the count reflects live subscribers
    /// only; dropping twice is a no-op.
    #[tokio::test]
    async fn test_unsubscribe_by_drop_is_idempotent() {
        let bus = EventBus::new();
        let rx1 = bus.odds_snapshot.subscribe(4);
        let _rx2 = bus.odds_snapshot.subscribe(4);
        assert_eq!(bus.odds_snapshot.subscriber_count(), 2);

        drop(rx1);
        assert_eq!(bus.odds_snapshot.subscriber_count(), 1);
        assert_eq!(bus.odds_snapshot.subscriber_count(), 1);

        let snap = OddsSnapshot {
            event_id: "e".into(),
            provider: "mock".into(),
            yes_probability: dec!(0.55),
            market_slug: None,
            confidence: dec!(0.6),
            updated_at: Utc::now(),
        };
        assert_eq!(bus.odds_snapshot.publish(snap), 1);
    }
}
