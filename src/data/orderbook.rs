use std::collections::HashMap;

use chrono::{DateTime, Utc};
use parking_lot::Mutex;
use rust_decimal::Decimal;
use tracing::debug;

use crate::types::Side;

// ─── Book primitives ───

/// One price level of a ladder. A zero quantity removes the level.
#[derive(Clone, Copy, Debug, PartialEq)]
pub struct PriceLevel {
    pub price: Decimal,
    pub quantity: u64,
}

/// Direction of a taker walk.
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub enum TradeDirection {
    Buy,
    Sell,
}

/// Result of walking the book: achievable size and its volume-weighted price.
#[derive(Clone, Copy, Debug, PartialEq)]
pub struct WalkFill {
    pub filled: u64,
    pub vwap: Decimal,
}

/// Sorted ladders for one contract side: bids descending, asks ascending.
#[derive(Clone, Debug, Default)]
pub struct BookSide {
    pub bids: Vec<PriceLevel>,
    pub asks: Vec<PriceLevel>,
}

fn normalize_ladder(raw: Vec<(Decimal, u64)>, descending: bool) -> Vec<PriceLevel> {
    let mut levels: Vec<PriceLevel> = raw
        .into_iter()
        .filter(|(_, q)| *q > 0)
        .map(|(price, quantity)| PriceLevel { price, quantity })
        .collect();
    if descending {
        levels.sort_unstable_by(|a, b| b.price.cmp(&a.price));
    } else {
        levels.sort_unstable_by(|a, b| a.price.cmp(&b.price));
    }
    // Collapse duplicate prices so every level sits at a distinct price.
    let mut out: Vec<PriceLevel> = Vec::with_capacity(levels.len());
    for lvl in levels {
        match out.last_mut() {
            Some(prev) if prev.price == lvl.price => prev.quantity += lvl.quantity,
            _ => out.push(lvl),
        }
    }
    out
}

impl BookSide {
    /// Replace both ladders from a snapshot frame. Zero-quantity levels are
    /// pruned and the ladders re-sorted; walk and depth calculations depend
    /// on correct ordering.
    pub fn apply_snapshot(&mut self, bids: Vec<(Decimal, u64)>, asks: Vec<(Decimal, u64)>) {
        self.bids = normalize_ladder(bids, true);
        self.asks = normalize_ladder(asks, false);
    }

    #[inline]
    pub fn best_bid(&self) -> Option<Decimal> {
        self.bids.first().map(|l| l.price)
    }

    #[inline]
    pub fn best_ask(&self) -> Option<Decimal> {
        self.asks.first().map(|l| l.price)
    }

    /// Two-sided midpoint; None when either ladder is empty.
    pub fn mid(&self) -> Option<Decimal> {
        match (self.best_bid(), self.best_ask()) {
            (Some(b), Some(a)) => Some((b + a) / Decimal::TWO),
            _ => None,
        }
    }

    pub fn spread(&self) -> Option<Decimal> {
        match (self.best_bid(), self.best_ask()) {
            (Some(b), Some(a)) => Some(a - b),
            _ => None,
        }
    }

    /// Walk the ladder a taker would consume: asks ascending for buys, bids
    /// descending for sells. `limit` bounds acceptable prices (max for buys,
    /// min for sells); `None` takes any visible price.
    ///
    /// Returns the achievable quantity and its VWAP. When the request exceeds
    /// eligible depth, the result carries what is fillable and the caller
    /// decides partial-fill handling. `None` when nothing is fillable.
    pub fn walk(
        &self,
        direction: TradeDirection,
        quantity: u64,
        limit: Option<Decimal>,
    ) -> Option<WalkFill> {
        if quantity == 0 {
            return None;
        }
        let mut remaining = quantity;
        let mut cost = Decimal::ZERO;
        let mut filled: u64 = 0;

        let levels: &[PriceLevel] = match direction {
            TradeDirection::Buy => &self.asks,
            TradeDirection::Sell => &self.bids,
        };
        for lvl in levels {
            let eligible = match (direction, limit) {
                (TradeDirection::Buy, Some(max)) => lvl.price <= max,
                (TradeDirection::Sell, Some(min)) => lvl.price >= min,
                (_, None) => true,
            };
            if !eligible {
                break;
            }
            let take = remaining.min(lvl.quantity);
            cost += lvl.price * Decimal::from(take);
            filled += take;
            remaining -= take;
            if remaining == 0 {
                break;
            }
        }

        if filled == 0 {
            return None;
        }
        Some(WalkFill {
            filled,
            vwap: cost / Decimal::from(filled),
        })
    }

    /// Total quantity at prices a taker walk would accept.
    pub fn eligible_depth(&self, direction: TradeDirection, limit: Option<Decimal>) -> u64 {
        let levels: &[PriceLevel] = match direction {
            TradeDirection::Buy => &self.asks,
            TradeDirection::Sell => &self.bids,
        };
        levels
            .iter()
            .take_while(|lvl| match (direction, limit) {
                (TradeDirection::Buy, Some(max)) => lvl.price <= max,
                (TradeDirection::Sell, Some(min)) => lvl.price >= min,
                (_, None) => true,
            })
            .map(|lvl| lvl.quantity)
            .sum()
    }

    /// Worst (last) visible price in the walk direction, used for valuing
    /// residual quantity beyond depth.
    pub fn worst_visible(&self, direction: TradeDirection) -> Option<Decimal> {
        match direction {
            TradeDirection::Buy => self.asks.last().map(|l| l.price),
            TradeDirection::Sell => self.bids.last().map(|l| l.price),
        }
    }
}

/// Full two-sided book for one market.
#[derive(Clone, Debug)]
pub struct OrderBook {
    pub market_slug: String,
    pub yes: BookSide,
    pub no: BookSide,
    pub updated_at: DateTime<Utc>,
}

impl OrderBook {
    pub fn side(&self, side: Side) -> &BookSide {
        match side {
            Side::Yes => &self.yes,
            Side::No => &self.no,
        }
    }
}

// ─── Snapshot frames ───

/// Raw ladders for one side as carried by a MARKET_DATA frame or a REST
/// sides snapshot.
#[derive(Clone, Debug, Default)]
pub struct LadderFrame {
    pub bids: Vec<(Decimal, u64)>,
    pub asks: Vec<(Decimal, u64)>,
}

/// Full depth snapshot for a market. Frames replace the corresponding book
/// sides wholesale; there are no incremental deltas.
#[derive(Clone, Debug)]
pub struct BookFrame {
    pub yes: LadderFrame,
    pub no: LadderFrame,
    pub timestamp: DateTime<Utc>,
}

// ─── Tracker ───

/// Owns per-market books reconstructed from snapshot frames.
///
/// All operations serialize on one internal mutex; critical sections never
/// suspend. Books are created on first frame and persist for the process
/// lifetime.
pub struct OrderBookTracker {
    books: Mutex<HashMap<String, OrderBook>>,
}

impl Default for OrderBookTracker {
    fn default() -> Self {
        Self::new()
    }
}

impl OrderBookTracker {
    pub fn new() -> Self {
        Self {
            books: Mutex::new(HashMap::new()),
        }
    }

    /// Apply a snapshot frame. Frames older than the book's `updated_at` are
    /// discarded (snapshot-latest wins). Returns whether the frame was applied.
    pub fn update(&self, slug: &str, frame: BookFrame) -> bool {
        let mut books = self.books.lock();
        let book = books.entry(slug.to_string()).or_insert_with(|| OrderBook {
            market_slug: slug.to_string(),
            yes: BookSide::default(),
            no: BookSide::default(),
            updated_at: frame.timestamp,
        });
        if frame.timestamp < book.updated_at {
            debug!(market_slug = slug, "stale book frame discarded");
            return false;
        }
        book.yes.apply_snapshot(frame.yes.bids, frame.yes.asks);
        book.no.apply_snapshot(frame.no.bids, frame.no.asks);
        book.updated_at = frame.timestamp;
        true
    }

    pub fn get(&self, slug: &str) -> Option<OrderBook> {
        self.books.lock().get(slug).cloned()
    }

    /// Best bid and ask for one contract side of a market.
    pub fn best(&self, slug: &str, side: Side) -> (Option<Decimal>, Option<Decimal>) {
        let books = self.books.lock();
        match books.get(slug) {
            Some(book) => {
                let s = book.side(side);
                (s.best_bid(), s.best_ask())
            }
            None => (None, None),
        }
    }

    pub fn mid(&self, slug: &str, side: Side) -> Option<Decimal> {
        self.books.lock().get(slug).and_then(|b| b.side(side).mid())
    }

    /// Taker-priced walk over one side of a market's book.
    pub fn walk(
        &self,
        slug: &str,
        side: Side,
        direction: TradeDirection,
        quantity: u64,
        limit: Option<Decimal>,
    ) -> Option<WalkFill> {
        self.books
            .lock()
            .get(slug)
            .and_then(|b| b.side(side).walk(direction, quantity, limit))
    }

    pub fn market_slugs(&self) -> Vec<String> {
        self.books.lock().keys().cloned().collect()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use rust_decimal_macros::dec;

    fn frame(yes_bids: Vec<(Decimal, u64)>, yes_asks: Vec<(Decimal, u64)>) -> BookFrame {
        BookFrame {
            yes: LadderFrame {
                bids: yes_bids,
                asks: yes_asks,
            },
            no: LadderFrame::default(),
            timestamp: Utc::now(),
        }
    }

    /// Scenario: frame arrives with unsorted ladders and a zero-quantity level.
    /// Expected: bids sorted descending, asks ascending, zero level pruned.
    #[test]
    fn test_snapshot_sorts_and_prunes() {
        let tracker = OrderBookTracker::new();
        tracker.update(
            "m1",
            frame(
                vec![(dec!(0.44), 10), (dec!(0.48), 20), (dec!(0.46), 0)],
                vec![(dec!(0.55), 10), (dec!(0.52), 20)],
            ),
        );
        let book = tracker.get("m1").unwrap();
        assert_eq!(book.yes.best_bid(), Some(dec!(0.48)));
        assert_eq!(book.yes.best_ask(), Some(dec!(0.52)));
        assert_eq!(book.yes.bids.len(), 2);
    }

    /// Scenario: frame carries the same price twice on one ladder.
    /// Expected: levels collapse into one entry at that price with summed size.
    #[test]
    fn test_duplicate_prices_collapse() {
        let tracker = OrderBookTracker::new();
        tracker.update(
            "m1",
            frame(vec![(dec!(0.48), 10), (dec!(0.48), 15)], vec![(dec!(0.52), 5)]),
        );
        let book = tracker.get("m1").unwrap();
        assert_eq!(book.yes.bids.len(), 1);
        assert_eq!(book.yes.bids[0].quantity, 25);
    }

    /// Scenario: YES asks [(0.49, 10), (0.50, 10)], buy walk for 15 bounded
    /// at 0.50.
    /// Expected: full 15 filled at VWAP (0.49*10 + 0.50*5)/15.
    #[test]
    fn test_walk_buy_vwap() {
        let tracker = OrderBookTracker::new();
        tracker.update(
            "m1",
            frame(
                vec![(dec!(0.48), 100)],
                vec![(dec!(0.49), 10), (dec!(0.50), 10)],
            ),
        );
        let fill = tracker
            .walk("m1", Side::Yes, TradeDirection::Buy, 15, Some(dec!(0.50)))
            .unwrap();
        assert_eq!(fill.filled, 15);
        let expected = (dec!(0.49) * dec!(10) + dec!(0.50) * dec!(5)) / dec!(15);
        assert_eq!(fill.vwap, expected);
    }

    /// Scenario: asks [(0.49, 10), (0.51, 10)] with a 0.50 limit; 15 requested.
    /// Expected: only the 0.49 level is eligible; 10 filled at 0.49.
    #[test]
    fn test_walk_buy_respects_limit() {
        let tracker = OrderBookTracker::new();
        tracker.update(
            "m1",
            frame(
                vec![(dec!(0.48), 100)],
                vec![(dec!(0.49), 10), (dec!(0.51), 10)],
            ),
        );
        let fill = tracker
            .walk("m1", Side::Yes, TradeDirection::Buy, 15, Some(dec!(0.50)))
            .unwrap();
        assert_eq!(fill.filled, 10);
        assert_eq!(fill.vwap, dec!(0.49));
    }

    /// Scenario: sell walk over bids [(0.47, 5), (0.46, 5)] for 20 contracts.
    /// Expected: achievable quantity 10, VWAP across both consumed levels.
    #[test]
    fn test_walk_sell_partial_depth() {
        let tracker = OrderBookTracker::new();
        tracker.update(
            "m1",
            frame(vec![(dec!(0.47), 5), (dec!(0.46), 5)], vec![(dec!(0.49), 5)]),
        );
        let fill = tracker
            .walk("m1", Side::Yes, TradeDirection::Sell, 20, None)
            .unwrap();
        assert_eq!(fill.filled, 10);
        let expected = (dec!(0.47) * dec!(5) + dec!(0.46) * dec!(5)) / dec!(10);
        assert_eq!(fill.vwap, expected);
    }

    /// Scenario: walk against an empty ladder, and a zero-quantity request.
    /// Expected: both return None.
    #[test]
    fn test_walk_empty_and_zero() {
        let tracker = OrderBookTracker::new();
        tracker.update("m1", frame(vec![], vec![]));
        assert!(tracker
            .walk("m1", Side::Yes, TradeDirection::Buy, 10, None)
            .is_none());
        tracker.update("m1", frame(vec![], vec![(dec!(0.50), 10)]));
        assert!(tracker
            .walk("m1", Side::Yes, TradeDirection::Buy, 0, None)
            .is_none());
    }

    /// Applying the same frame twice yields the same book (update idempotence).
    #[test]
    fn test_update_idempotent() {
        let tracker = OrderBookTracker::new();
        let f = frame(
            vec![(dec!(0.48), 10), (dec!(0.47), 5)],
            vec![(dec!(0.52), 7)],
        );
        assert!(tracker.update("m1", f.clone()));
        let first = tracker.get("m1").unwrap();
        assert!(tracker.update("m1", f));
        let second = tracker.get("m1").unwrap();
        assert_eq!(first.yes.bids, second.yes.bids);
        assert_eq!(first.yes.asks, second.yes.asks);
        assert_eq!(first.updated_at, second.updated_at);
    }

    /// Scenario: a frame older than the book's updated_at arrives.
    /// Expected: discarded; the newer book stays intact.
    #[test]
    fn test_stale_frame_discarded() {
        let tracker = OrderBookTracker::new();
        let mut newer = frame(vec![(dec!(0.48), 10)], vec![(dec!(0.52), 10)]);
        newer.timestamp = Utc::now();
        let mut older = frame(vec![(dec!(0.40), 10)], vec![(dec!(0.60), 10)]);
        older.timestamp = newer.timestamp - chrono::Duration::seconds(5);

        assert!(tracker.update("m1", newer));
        assert!(!tracker.update("m1", older));
        let book = tracker.get("m1").unwrap();
        assert_eq!(book.yes.best_bid(), Some(dec!(0.48)));
    }

    #[test]
    fn test_best_and_mid() {
        let tracker = OrderBookTracker::new();
        tracker.update("m1", frame(vec![(dec!(0.48), 10)], vec![(dec!(0.52), 10)]));
        assert_eq!(
            tracker.best("m1", Side::Yes),
            (Some(dec!(0.48)), Some(dec!(0.52)))
        );
        assert_eq!(tracker.mid("m1", Side::Yes), Some(dec!(0.50)));
        assert_eq!(tracker.best("missing", Side::Yes), (None, None));
        assert_eq!(tracker.mid("m1", Side::No), None);
    }

    /// Every bid sits below every ask on a well-formed side.
    #[test]
    fn test_bid_below_ask_invariant() {
        let tracker = OrderBookTracker::new();
        tracker.update(
            "m1",
            frame(
                vec![(dec!(0.48), 10), (dec!(0.44), 4)],
                vec![(dec!(0.52), 10), (dec!(0.58), 3)],
            ),
        );
        let book = tracker.get("m1").unwrap();
        let max_bid = book.yes.bids.iter().map(|l| l.price).max().unwrap();
        let min_ask = book.yes.asks.iter().map(|l| l.price).min().unwrap();
        assert!(max_bid < min_ask);
    }

    #[test]
    fn test_eligible_depth_and_worst_visible() {
        let side = {
            let mut s = BookSide::default();
            s.apply_snapshot(
                vec![(dec!(0.47), 5), (dec!(0.46), 5)],
                vec![(dec!(0.49), 10), (dec!(0.51), 10)],
            );
            s
        };
        assert_eq!(side.eligible_depth(TradeDirection::Buy, Some(dec!(0.50))), 10);
        assert_eq!(side.eligible_depth(TradeDirection::Buy, None), 20);
        assert_eq!(side.eligible_depth(TradeDirection::Sell, Some(dec!(0.47))), 5);
        assert_eq!(side.worst_visible(TradeDirection::Sell), Some(dec!(0.46)));
        assert_eq!(side.worst_visible(TradeDirection::Buy), Some(dec!(0.51)));
    }
}
