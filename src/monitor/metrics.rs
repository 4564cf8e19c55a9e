//! Lightweight in-memory metrics and feed liveness tracking.

use std::collections::HashMap;

use chrono::{DateTime, Utc};
use parking_lot::Mutex;
use serde::Serialize;

/// Simple counter/gauge store snapshotted into health reports.
#[derive(Default)]
pub struct MetricsRegistry {
    counters: Mutex<HashMap<&'static str, u64>>,
    gauges: Mutex<HashMap<&'static str, serde_json::Value>>,
}

#[derive(Clone, Debug, Serialize)]
pub struct MetricsSnapshot {
    pub counters: HashMap<&'static str, u64>,
    pub gauges: HashMap<&'static str, serde_json::Value>,
}

impl MetricsRegistry {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn increment(&self, name: &'static str, value: u64) {
        *self.counters.lock().entry(name).or_insert(0) += value;
    }

    pub fn set_gauge(&self, name: &'static str, value: impl Into<serde_json::Value>) {
        self.gauges.lock().insert(name, value.into());
    }

    pub fn snapshot(&self) -> MetricsSnapshot {
        MetricsSnapshot {
            counters: self.counters.lock().clone(),
            gauges: self.gauges.lock().clone(),
        }
    }
}

/// Tracks feed liveness timestamps for health checks. Staleness is reported,
/// not enforced.
pub struct FeedMonitor {
    stale_after_secs: i64,
    feeds: Mutex<HashMap<&'static str, DateTime<Utc>>>,
}

#[derive(Clone, Debug, Serialize)]
pub struct FeedStatus {
    pub last_update: DateTime<Utc>,
    pub age_seconds: i64,
    pub stale: bool,
}

impl FeedMonitor {
    pub fn new(stale_after_secs: i64) -> Self {
        Self {
            stale_after_secs,
            feeds: Mutex::new(HashMap::new()),
        }
    }

    pub fn mark_update(&self, feed_name: &'static str, timestamp: DateTime<Utc>) {
        self.feeds.lock().insert(feed_name, timestamp);
    }

    pub fn snapshot(&self, now: DateTime<Utc>) -> HashMap<&'static str, FeedStatus> {
        let feeds = self.feeds.lock();
        feeds
            .iter()
            .map(|(name, last)| {
                let age = (now - *last).num_seconds();
                (
                    *name,
                    FeedStatus {
                        last_update: *last,
                        age_seconds: age,
                        stale: age > self.stale_after_secs,
                    },
                )
            })
            .collect()
    }
}
