//! Exchange websocket consumer.
//!
//! Connects, subscribes, and routes frames: MARKET_DATA snapshots go into
//! the orderbook tracker (and refresh the market's best bid/ask), private
//! frames are forwarded to the live executor over a channel. Reconnects with
//! exponential backoff; handlers stay idempotent against replays.

use std::sync::Arc;

use chrono::Utc;
use futures_util::{SinkExt, StreamExt};
use tokio::sync::{mpsc, watch};
use tokio_tungstenite::connect_async;
use tokio_tungstenite::tungstenite::Message;
use tracing::{info, warn};

use super::types::{parse_ws_frame, WsFrame};
use crate::data::orderbook::OrderBookTracker;
use crate::state::StateManager;

/// Private-stream frames forwarded to the live executor.
#[derive(Clone, Debug)]
pub enum PrivateFrame {
    Order(super::types::ApiOrder),
    Position(super::types::ApiPosition),
    Balance(rust_decimal::Decimal),
}

/// Apply a depth snapshot: book into the tracker plus a best bid/ask
/// refresh in the state manager. Safe to call for replays — stale frames
/// are discarded by timestamp. Shared by the websocket path and the REST
/// poller fallback.
pub fn apply_book_frame(
    tracker: &OrderBookTracker,
    state: &StateManager,
    market_slug: &str,
    frame: crate::data::orderbook::BookFrame,
) -> bool {
    let timestamp = frame.timestamp;
    if !tracker.update(market_slug, frame) {
        return false;
    }
    if let Some(book) = tracker.get(market_slug) {
        let _ = state.update_market(
            market_slug,
            book.yes.best_bid(),
            book.yes.best_ask(),
            book.no.best_bid(),
            book.no.best_ask(),
            timestamp,
        );
    }
    true
}

/// Apply a MARKET_DATA websocket frame.
pub fn apply_market_data(
    tracker: &OrderBookTracker,
    state: &StateManager,
    market_slug: &str,
    sides: &super::types::ApiSides,
    timestamp: chrono::DateTime<Utc>,
) {
    apply_book_frame(tracker, state, market_slug, sides.to_frame(timestamp));
}

/// Run the websocket consumer until shutdown. `private_tx` is `None` in
/// paper mode, where only market data is consumed.
pub async fn run_ws_consumer(
    ws_url: String,
    market_slugs: Vec<String>,
    tracker: Arc<OrderBookTracker>,
    state: Arc<StateManager>,
    private_tx: Option<mpsc::Sender<PrivateFrame>>,
    mut shutdown: watch::Receiver<bool>,
) {
    let mut backoff_ms: u64 = 1_000;

    loop {
        if *shutdown.borrow() {
            return;
        }
        info!(url = %ws_url, "connecting exchange websocket");

        let ws = match connect_async(&ws_url).await {
            Ok((ws, _)) => {
                info!("exchange websocket connected");
                backoff_ms = 1_000;
                ws
            }
            Err(e) => {
                warn!(error = %e, backoff_ms, "websocket connect failed");
                tokio::select! {
                    _ = tokio::time::sleep(tokio::time::Duration::from_millis(backoff_ms)) => {}
                    _ = shutdown.changed() => return,
                }
                backoff_ms = (backoff_ms * 2).min(10_000);
                continue;
            }
        };

        let (mut write, mut read) = ws.split();

        let subscribe = serde_json::json!({
            "type": "SUBSCRIBE",
            "markets": market_slugs,
        });
        if let Err(e) = write.send(Message::Text(subscribe.to_string())).await {
            warn!(error = %e, "websocket subscribe failed, reconnecting");
            continue;
        }

        let mut ping_interval = tokio::time::interval(tokio::time::Duration::from_secs(10));

        loop {
            tokio::select! {
                msg = read.next() => {
                    let msg = match msg {
                        Some(Ok(m)) => m,
                        Some(Err(e)) => {
                            warn!(error = %e, "websocket error, reconnecting");
                            break;
                        }
                        None => {
                            warn!("websocket stream ended, reconnecting");
                            break;
                        }
                    };
                    if let Message::Text(text) = msg {
                        let Some(frame) = parse_ws_frame(&text) else {
                            continue;
                        };
                        match frame {
                            WsFrame::MarketData { market_slug, timestamp, sides } => {
                                apply_market_data(&tracker, &state, &market_slug, &sides, timestamp);
                            }
                            WsFrame::OrderUpdate { order } => {
                                if let Some(tx) = &private_tx {
                                    let _ = tx.try_send(PrivateFrame::Order(order));
                                }
                            }
                            WsFrame::PositionUpdate { position } => {
                                if let Some(tx) = &private_tx {
                                    let _ = tx.try_send(PrivateFrame::Position(position));
                                }
                            }
                            WsFrame::BalanceUpdate { cash } => {
                                if let Some(tx) = &private_tx {
                                    let _ = tx.try_send(PrivateFrame::Balance(cash));
                                }
                            }
                        }
                    }
                }
                _ = ping_interval.tick() => {
                    let _ = write.send(Message::Ping(Vec::new())).await;
                }
                _ = shutdown.changed() => {
                    info!("websocket consumer shutting down");
                    return;
                }
            }
        }

        tokio::select! {
            _ = tokio::time::sleep(tokio::time::Duration::from_millis(backoff_ms)) => {}
            _ = shutdown.changed() => return,
        }
        backoff_ms = (backoff_ms * 2).min(10_000);
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::types::Side;
    use rust_decimal_macros::dec;

    /// MARKET_DATA application is idempotent: replaying the identical frame
    /// leaves the tracker and market state unchanged.
    #[test]
    fn test_apply_market_data_idempotent() {
        let tracker = OrderBookTracker::new();
        let state = StateManager::new(dec!(1000));
        let sides: super::super::types::ApiSides = serde_json::from_str(
            r#"{"yes":{"bids":[["0.48","100"]],"asks":[["0.50","50"]]},
                "no":{"bids":[["0.50","60"]],"asks":[["0.52","70"]]}}"#,
        )
        .unwrap();
        let ts = Utc::now();

        apply_market_data(&tracker, &state, "m1", &sides, ts);
        apply_market_data(&tracker, &state, "m1", &sides, ts);

        assert_eq!(tracker.best("m1", Side::Yes), (Some(dec!(0.48)), Some(dec!(0.50))));
        let market = state.get_market("m1").unwrap();
        assert_eq!(market.no_ask, Some(dec!(0.52)));
    }

    /// A stale replay (older timestamp) does not clobber newer state.
    #[test]
    fn test_apply_market_data_discards_stale() {
        let tracker = OrderBookTracker::new();
        let state = StateManager::new(dec!(1000));
        let newer: super::super::types::ApiSides = serde_json::from_str(
            r#"{"yes":{"bids":[["0.48","100"]],"asks":[["0.50","50"]]},"no":{}}"#,
        )
        .unwrap();
        let older: super::super::types::ApiSides = serde_json::from_str(
            r#"{"yes":{"bids":[["0.10","1"]],"asks":[["0.90","1"]]},"no":{}}"#,
        )
        .unwrap();
        let ts = Utc::now();

        apply_market_data(&tracker, &state, "m1", &newer, ts);
        apply_market_data(&tracker, &state, "m1", &older, ts - chrono::Duration::seconds(10));

        assert_eq!(tracker.best("m1", Side::Yes), (Some(dec!(0.48)), Some(dec!(0.50))));
    }
}
