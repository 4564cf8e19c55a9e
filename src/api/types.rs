//! Wire DTOs for the exchange REST and websocket surface.
//!
//! Prices and quantities arrive as strings on the wire; conversion helpers
//! turn ladders into tracker frames.

use chrono::{DateTime, Utc};
use rust_decimal::prelude::ToPrimitive;
use rust_decimal::Decimal;
use serde::{Deserialize, Serialize};

use crate::data::orderbook::{BookFrame, LadderFrame};
use crate::types::{OrderIntent, OrderStatus, OrderType, Side};

#[derive(Clone, Debug, Deserialize)]
pub struct ApiMarket {
    pub slug: String,
    #[serde(default)]
    pub title: Option<String>,
    #[serde(default)]
    pub active: bool,
}

/// One side's ladders as `[price, quantity]` string pairs.
#[derive(Clone, Debug, Default, Serialize, Deserialize)]
pub struct ApiLadder {
    #[serde(default)]
    pub bids: Vec<[String; 2]>,
    #[serde(default)]
    pub asks: Vec<[String; 2]>,
}

/// Depth snapshot returned by `GET /market/{slug}/sides` and carried by
/// MARKET_DATA frames.
#[derive(Clone, Debug, Default, Serialize, Deserialize)]
pub struct ApiSides {
    pub yes: ApiLadder,
    pub no: ApiLadder,
}

fn parse_level(pair: &[String; 2]) -> Option<(Decimal, u64)> {
    let price: Decimal = pair[0].parse().ok()?;
    let quantity: Decimal = pair[1].parse().ok()?;
    Some((price, quantity.floor().to_u64()?))
}

fn parse_ladder(ladder: &ApiLadder) -> LadderFrame {
    LadderFrame {
        bids: ladder.bids.iter().filter_map(parse_level).collect(),
        asks: ladder.asks.iter().filter_map(parse_level).collect(),
    }
}

impl ApiSides {
    pub fn to_frame(&self, timestamp: DateTime<Utc>) -> BookFrame {
        BookFrame {
            yes: parse_ladder(&self.yes),
            no: parse_ladder(&self.no),
            timestamp,
        }
    }
}

#[derive(Clone, Debug, Serialize)]
pub struct CreateOrderRequest {
    #[serde(rename = "marketSlug")]
    pub market_slug: String,
    pub intent: OrderIntent,
    pub quantity: u64,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub price: Option<Decimal>,
    #[serde(rename = "orderType")]
    pub order_type: OrderType,
    #[serde(rename = "postOnly")]
    pub post_only: bool,
}

#[derive(Clone, Debug, Serialize, Deserialize)]
pub struct ApiOrder {
    #[serde(rename = "orderId")]
    pub order_id: String,
    #[serde(rename = "marketSlug")]
    pub market_slug: String,
    pub intent: OrderIntent,
    pub price: Decimal,
    pub quantity: u64,
    #[serde(rename = "filledQuantity", default)]
    pub filled_quantity: u64,
    pub status: OrderStatus,
    #[serde(rename = "avgFillPrice", default)]
    pub avg_fill_price: Option<Decimal>,
}

#[derive(Clone, Debug, Serialize, Deserialize)]
pub struct ApiPosition {
    #[serde(rename = "marketSlug")]
    pub market_slug: String,
    pub side: Side,
    pub quantity: u64,
    #[serde(rename = "avgPrice")]
    pub avg_price: Decimal,
}

#[derive(Clone, Debug, Serialize, Deserialize)]
pub struct ApiBalance {
    pub cash: Decimal,
}

#[derive(Clone, Debug, Deserialize)]
pub struct CancelAllResponse {
    #[serde(default)]
    pub cancelled: usize,
}

// ─── Websocket frames ───

/// Frames consumed from the exchange websocket. Handlers must stay
/// idempotent against replays.
#[derive(Clone, Debug, Deserialize)]
#[serde(tag = "type")]
pub enum WsFrame {
    #[serde(rename = "MARKET_DATA")]
    MarketData {
        #[serde(rename = "marketSlug")]
        market_slug: String,
        timestamp: DateTime<Utc>,
        #[serde(flatten)]
        sides: ApiSides,
    },
    #[serde(rename = "ORDER_UPDATE")]
    OrderUpdate {
        #[serde(flatten)]
        order: ApiOrder,
    },
    #[serde(rename = "POSITION_UPDATE")]
    PositionUpdate {
        #[serde(flatten)]
        position: ApiPosition,
    },
    #[serde(rename = "ACCOUNT_BALANCE_UPDATE")]
    BalanceUpdate { cash: Decimal },
}

pub fn parse_ws_frame(text: &str) -> Option<WsFrame> {
    serde_json::from_str(text).ok()
}
