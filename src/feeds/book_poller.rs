//! REST orderbook polling fallback.
//!
//! Safety net for a quiet or unavailable market-data websocket: polls the
//! depth-snapshot endpoint for the subscription set and pushes frames down
//! the same tracker path the websocket uses.

use std::sync::Arc;

use chrono::Utc;
use tokio::sync::{watch, Semaphore};
use tracing::{debug, info, warn};

use crate::api::client::ExchangeClient;
use crate::api::ws::apply_book_frame;
use crate::data::orderbook::OrderBookTracker;
use crate::monitor::metrics::{FeedMonitor, MetricsRegistry};
use crate::state::StateManager;

pub const FEED_NAME: &str = "book_poller";

pub struct RestBookPoller {
    pub client: Arc<dyn ExchangeClient>,
    pub tracker: Arc<OrderBookTracker>,
    pub state: Arc<StateManager>,
    pub market_slugs: Vec<String>,
    pub interval_ms: u64,
    pub max_markets: usize,
    pub concurrency: usize,
}

impl RestBookPoller {
    async fn poll_one(&self, slug: &str, sem: &Semaphore) {
        let _permit = sem.acquire().await;
        match self.client.get_market_sides(slug).await {
            Ok(frame) => {
                apply_book_frame(&self.tracker, &self.state, slug, frame);
            }
            Err(e) => {
                debug!(market_slug = slug, error = %e, "book poll failed");
            }
        }
    }

    pub async fn run(
        self,
        feed_monitor: Arc<FeedMonitor>,
        metrics: Arc<MetricsRegistry>,
        mut shutdown: watch::Receiver<bool>,
    ) {
        let interval_ms = self.interval_ms.max(1);
        let max_markets = if self.max_markets == 0 { 50 } else { self.max_markets };
        let concurrency = if self.concurrency == 0 { 5 } else { self.concurrency };
        let sem = Semaphore::new(concurrency);

        info!(
            interval_ms,
            max_markets,
            concurrency,
            markets = self.market_slugs.len(),
            "rest book poller started"
        );
        if self.market_slugs.is_empty() {
            warn!("rest book poller has no markets to poll");
        }

        let mut interval = tokio::time::interval(tokio::time::Duration::from_millis(interval_ms));
        loop {
            tokio::select! {
                _ = interval.tick() => {
                    let slugs: Vec<&String> = self.market_slugs.iter().take(max_markets).collect();
                    for slug in slugs {
                        self.poll_one(slug, &sem).await;
                        metrics.increment("book_polls", 1);
                    }
                    feed_monitor.mark_update(FEED_NAME, Utc::now());
                }
                _ = shutdown.changed() => {
                    info!("rest book poller stopped");
                    return;
                }
            }
        }
    }
}
