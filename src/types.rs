use chrono::{DateTime, Utc};
use rust_decimal::Decimal;
use serde::{Deserialize, Serialize};

// ─── Contract sides & order intents ───

/// Outcome side of a binary contract.
#[derive(Clone, Copy, Debug, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub enum Side {
    Yes,
    No,
}

impl Side {
    #[inline]
    pub fn opposite(self) -> Side {
        match self {
            Side::Yes => Side::No,
            Side::No => Side::Yes,
        }
    }
}

impl std::fmt::Display for Side {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            Side::Yes => write!(f, "YES"),
            Side::No => write!(f, "NO"),
        }
    }
}

/// Order intent. Long intents operate on YES contracts, short intents on NO.
#[derive(Clone, Copy, Debug, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub enum OrderIntent {
    BuyLong,
    BuyShort,
    SellLong,
    SellShort,
}

impl OrderIntent {
    /// The contract side this intent trades.
    #[inline]
    pub fn side(self) -> Side {
        match self {
            OrderIntent::BuyLong | OrderIntent::SellLong => Side::Yes,
            OrderIntent::BuyShort | OrderIntent::SellShort => Side::No,
        }
    }

    #[inline]
    pub fn is_buy(self) -> bool {
        matches!(self, OrderIntent::BuyLong | OrderIntent::BuyShort)
    }

    /// Buy intent for a side.
    #[inline]
    pub fn buy(side: Side) -> OrderIntent {
        match side {
            Side::Yes => OrderIntent::BuyLong,
            Side::No => OrderIntent::BuyShort,
        }
    }

    /// Sell intent for a side.
    #[inline]
    pub fn sell(side: Side) -> OrderIntent {
        match side {
            Side::Yes => OrderIntent::SellLong,
            Side::No => OrderIntent::SellShort,
        }
    }
}

impl std::fmt::Display for OrderIntent {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        let s = match self {
            OrderIntent::BuyLong => "BUY_LONG",
            OrderIntent::BuyShort => "BUY_SHORT",
            OrderIntent::SellLong => "SELL_LONG",
            OrderIntent::SellShort => "SELL_SHORT",
        };
        write!(f, "{s}")
    }
}

#[derive(Clone, Copy, Debug, PartialEq, Eq, Serialize, Deserialize)]
pub enum OrderType {
    Limit,
    Market,
}

#[derive(Clone, Copy, Debug, PartialEq, Eq, Serialize, Deserialize)]
pub enum OrderStatus {
    Open,
    PartiallyFilled,
    Filled,
    Cancelled,
    Rejected,
}

impl OrderStatus {
    /// Terminal orders are removed from the open-order table.
    #[inline]
    pub fn is_terminal(self) -> bool {
        matches!(
            self,
            OrderStatus::Filled | OrderStatus::Cancelled | OrderStatus::Rejected
        )
    }
}

// ─── Strategy signals ───

#[derive(Clone, Copy, Debug, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize)]
pub enum Urgency {
    Low,
    Medium,
    High,
}

#[derive(Clone, Copy, Debug, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub enum SignalAction {
    BuyYes,
    BuyNo,
    SellYes,
    SellNo,
    Cancel,
}

impl SignalAction {
    #[inline]
    pub fn is_buy(self) -> bool {
        matches!(self, SignalAction::BuyYes | SignalAction::BuyNo)
    }

    #[inline]
    pub fn is_sell(self) -> bool {
        matches!(self, SignalAction::SellYes | SignalAction::SellNo)
    }

    #[inline]
    pub fn is_cancel(self) -> bool {
        matches!(self, SignalAction::Cancel)
    }

    /// Contract side the action trades (None for cancels).
    pub fn side(self) -> Option<Side> {
        match self {
            SignalAction::BuyYes | SignalAction::SellYes => Some(Side::Yes),
            SignalAction::BuyNo | SignalAction::SellNo => Some(Side::No),
            SignalAction::Cancel => None,
        }
    }

    /// Executor intent for the action (None for cancels).
    pub fn intent(self) -> Option<OrderIntent> {
        match self {
            SignalAction::BuyYes => Some(OrderIntent::BuyLong),
            SignalAction::BuyNo => Some(OrderIntent::BuyShort),
            SignalAction::SellYes => Some(OrderIntent::SellLong),
            SignalAction::SellNo => Some(OrderIntent::SellShort),
            SignalAction::Cancel => None,
        }
    }
}

/// Structured sizing hint attached to a signal.
///
/// Absent means Kelly sizing is skipped and the requested quantity is only
/// bounded by cash and exposure limits.
#[derive(Clone, Copy, Debug, PartialEq, Serialize, Deserialize)]
pub enum SignalHint {
    TrueProbability(Decimal),
}

/// Immutable trade intent emitted by a strategy.
///
/// Signals pass by value through the engine, risk manager, and executor;
/// the risk manager may return a resized copy.
#[derive(Clone, Debug, PartialEq)]
pub struct Signal {
    pub market_slug: String,
    pub action: SignalAction,
    /// Limit price. Required (> 0) for buy actions.
    pub price: Option<Decimal>,
    pub quantity: u64,
    pub urgency: Urgency,
    /// Confidence in [0, 1]; scales Kelly sizing.
    pub confidence: Decimal,
    pub strategy_name: &'static str,
    pub reason: String,
    pub hint: Option<SignalHint>,
    /// Target order for `SignalAction::Cancel`.
    pub order_id: Option<String>,
}

impl Signal {
    pub fn true_probability(&self) -> Option<Decimal> {
        match self.hint {
            Some(SignalHint::TrueProbability(p)) => Some(p),
            None => None,
        }
    }
}

// ─── Live game state ───

#[derive(Clone, Copy, Debug, PartialEq, Eq, Serialize, Deserialize)]
pub enum GameStatus {
    Scheduled,
    InProgress,
    Final,
}

/// Snapshot of a live sports game, published on the `game_state` topic.
#[derive(Clone, Debug, Serialize, Deserialize)]
pub struct GameState {
    pub event_id: String,
    pub home_team: String,
    pub away_team: String,
    pub home_score: u32,
    pub away_score: u32,
    pub period: Option<String>,
    pub clock: Option<String>,
    pub status: GameStatus,
    pub market_slug: Option<String>,
    /// Whether the YES outcome maps to the home team winning.
    pub home_is_yes: bool,
    pub updated_at: DateTime<Utc>,
}

impl GameState {
    /// Score difference, home minus away.
    #[inline]
    pub fn score_diff(&self) -> i64 {
        self.home_score as i64 - self.away_score as i64
    }

    #[inline]
    pub fn is_final(&self) -> bool {
        self.status == GameStatus::Final
    }
}

// ─── Sportsbook odds ───

/// Sportsbook odds translated to an implied probability, published on the
/// `odds_snapshot` topic.
#[derive(Clone, Debug, Serialize, Deserialize)]
pub struct OddsSnapshot {
    pub event_id: String,
    pub provider: String,
    /// Implied YES probability, clamped to [0.05, 0.95] by the feed.
    pub yes_probability: Decimal,
    pub market_slug: Option<String>,
    pub confidence: Decimal,
    pub updated_at: DateTime<Utc>,
}

impl OddsSnapshot {
    #[inline]
    pub fn no_probability(&self) -> Decimal {
        Decimal::ONE - self.yes_probability
    }
}
