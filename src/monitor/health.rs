//! Component health snapshot.
//!
//! Aggregates feed staleness, metrics, breaker state, and executor
//! performance into one serializable report. Serving it over HTTP is a
//! deployment concern outside this crate.

use std::collections::HashMap;

use chrono::{DateTime, Utc};
use serde::Serialize;

use super::metrics::{FeedMonitor, FeedStatus, MetricsRegistry, MetricsSnapshot};
use crate::execution::PerformanceReport;
use crate::risk::breaker::CircuitBreakerStatus;

#[derive(Clone, Debug, Serialize)]
pub struct HealthReport {
    pub status: &'static str,
    pub timestamp: DateTime<Utc>,
    pub trading_mode: &'static str,
    pub feeds: HashMap<&'static str, FeedStatus>,
    pub metrics: MetricsSnapshot,
    pub circuit_breaker: CircuitBreakerStatus,
    pub performance: PerformanceReport,
}

pub fn build_health_report(
    trading_mode: &'static str,
    feed_monitor: &FeedMonitor,
    metrics: &MetricsRegistry,
    breaker: CircuitBreakerStatus,
    performance: PerformanceReport,
    now: DateTime<Utc>,
) -> HealthReport {
    let feeds = feed_monitor.snapshot(now);
    let degraded = feeds.values().any(|f| f.stale);
    HealthReport {
        status: if degraded { "degraded" } else { "ok" },
        timestamp: now,
        trading_mode,
        feeds,
        metrics: metrics.snapshot(),
        circuit_breaker: breaker,
        performance,
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::data::orderbook::OrderBookTracker;
    use crate::execution::build_performance_report;
    use crate::risk::breaker::CircuitBreaker;
    use crate::state::StateManager;
    use chrono::Duration;
    use rust_decimal_macros::dec;

    #[test]
    fn test_report_reflects_stale_feeds_and_serializes() {
        let now = Utc::now();
        let feed_monitor = FeedMonitor::new(60);
        feed_monitor.mark_update("sports_feed", now - Duration::seconds(300));
        let metrics = MetricsRegistry::new();
        metrics.increment("ticks", 7);

        let mut breaker = CircuitBreaker::new(dec!(25), dec!(0.15), now).unwrap();
        breaker.initialize(dec!(1000), now).unwrap();

        let state = StateManager::new(dec!(1000));
        let tracker = OrderBookTracker::new();
        let perf = build_performance_report(&state, &tracker, dec!(0.02), dec!(0.9), (0, 0, 0));

        let report = build_health_report("paper", &feed_monitor, &metrics, breaker.status(), perf, now);
        assert_eq!(report.status, "degraded");
        assert_eq!(report.metrics.counters["ticks"], 7);

        let json = serde_json::to_string(&report).unwrap();
        assert!(json.contains("\"trading_mode\":\"paper\""));
        assert!(json.contains("circuit_breaker"));
    }
}
