//! Signal aggregation.
//!
//! Collapses one tick's raw signals into an executable batch: opposing
//! directions on the same market resolve to the higher-confidence side,
//! duplicate actions keep a single best signal, and the output is ordered
//! deterministically so sequential execution cannot double-spend cash.

use std::collections::HashMap;

use tracing::debug;

use crate::types::{Signal, SignalAction};

/// Market direction a signal pushes toward: buying YES and selling NO are
/// the same bullish view, buying NO and selling YES the bearish one.
#[derive(Clone, Copy, Debug, PartialEq, Eq, Hash)]
enum Direction {
    Bullish,
    Bearish,
}

fn direction(action: SignalAction) -> Option<Direction> {
    match action {
        SignalAction::BuyYes | SignalAction::SellNo => Some(Direction::Bullish),
        SignalAction::BuyNo | SignalAction::SellYes => Some(Direction::Bearish),
        SignalAction::Cancel => None,
    }
}

/// Resolve one tick's signals into the batch handed to the risk manager.
///
/// Cancels always pass through. Directional signals are grouped per market:
/// when both directions are present, the side holding the single
/// highest-confidence signal survives and the other is dropped; duplicate
/// actions collapse to the best by urgency, then confidence. The result is
/// sorted by (market slug, strategy name).
pub fn aggregate_signals(signals: Vec<Signal>) -> Vec<Signal> {
    let mut out: Vec<Signal> = Vec::with_capacity(signals.len());
    let mut directional: HashMap<String, Vec<Signal>> = HashMap::new();

    for signal in signals {
        match direction(signal.action) {
            None => out.push(signal),
            Some(_) => directional
                .entry(signal.market_slug.clone())
                .or_default()
                .push(signal),
        }
    }

    for (market_slug, mut group) in directional {
        // Deterministic base order before any tie-break.
        group.sort_by(|a, b| a.strategy_name.cmp(b.strategy_name));

        // Deconfliction is cross-strategy: a single strategy quoting both
        // sides (the market maker) is coherent and passes untouched.
        let winner = group
            .iter()
            .max_by(|a, b| {
                a.confidence
                    .cmp(&b.confidence)
                    .then(a.urgency.cmp(&b.urgency))
            })
            .map(|s| (direction(s.action), s.strategy_name));

        let (kept, dropped): (Vec<Signal>, Vec<Signal>) = group.into_iter().partition(|s| {
            winner.map_or(true, |(win_direction, win_strategy)| {
                direction(s.action) == win_direction || s.strategy_name == win_strategy
            })
        });
        for signal in dropped {
            debug!(
                market_slug = %market_slug,
                strategy = signal.strategy_name,
                ?signal.action,
                "opposing signal dropped by higher-confidence side"
            );
        }

        // One signal per action: highest urgency wins, then confidence.
        let mut best_per_action: HashMap<SignalAction, Signal> = HashMap::new();
        for signal in kept {
            match best_per_action.get(&signal.action) {
                Some(current)
                    if (current.urgency, current.confidence)
                        >= (signal.urgency, signal.confidence) => {}
                _ => {
                    best_per_action.insert(signal.action, signal);
                }
            }
        }
        out.extend(best_per_action.into_values());
    }

    out.sort_by(|a, b| {
        a.market_slug
            .cmp(&b.market_slug)
            .then(a.strategy_name.cmp(b.strategy_name))
    });
    out
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::types::{SignalHint, Urgency};
    use rust_decimal::Decimal;
    use rust_decimal_macros::dec;

    fn signal(
        slug: &str,
        action: SignalAction,
        strategy: &'static str,
        urgency: Urgency,
        confidence: Decimal,
    ) -> Signal {
        Signal {
            market_slug: slug.into(),
            action,
            price: Some(dec!(0.50)),
            quantity: 10,
            urgency,
            confidence,
            strategy_name: strategy,
            reason: String::new(),
            hint: None,
            order_id: None,
        }
    }

    /// Opposing directions on one market: the higher-confidence side wins.
    #[test]
    fn test_opposing_actions_resolve_by_confidence() {
        let out = aggregate_signals(vec![
            signal("m1", SignalAction::BuyYes, "live_arbitrage", Urgency::High, dec!(0.8)),
            signal("m1", SignalAction::BuyNo, "statistical_edge", Urgency::Medium, dec!(0.6)),
        ]);
        assert_eq!(out.len(), 1);
        assert_eq!(out[0].action, SignalAction::BuyYes);
        assert_eq!(out[0].strategy_name, "live_arbitrage");
    }

    /// SellYes opposes BuyYes (bearish vs bullish) even though both touch
    /// the YES ladder.
    #[test]
    fn test_sell_yes_opposes_buy_yes() {
        let out = aggregate_signals(vec![
            signal("m1", SignalAction::BuyYes, "a", Urgency::Low, dec!(0.9)),
            signal("m1", SignalAction::SellYes, "b", Urgency::High, dec!(0.4)),
        ]);
        assert_eq!(out.len(), 1);
        assert_eq!(out[0].action, SignalAction::BuyYes);
    }

    /// Duplicate actions keep one signal: urgency first, then confidence.
    #[test]
    fn test_duplicates_prefer_urgency_then_confidence() {
        let out = aggregate_signals(vec![
            signal("m1", SignalAction::BuyYes, "a", Urgency::Low, dec!(0.9)),
            signal("m1", SignalAction::BuyYes, "b", Urgency::High, dec!(0.6)),
        ]);
        assert_eq!(out.len(), 1);
        assert_eq!(out[0].strategy_name, "b");

        let out = aggregate_signals(vec![
            signal("m1", SignalAction::BuyYes, "a", Urgency::High, dec!(0.6)),
            signal("m1", SignalAction::BuyYes, "b", Urgency::High, dec!(0.9)),
        ]);
        assert_eq!(out.len(), 1);
        assert_eq!(out[0].strategy_name, "b");
    }

    /// A single strategy quoting both sides of a market (the market maker)
    /// is coherent; deconfliction only applies across strategies.
    #[test]
    fn test_two_sided_quotes_from_one_strategy_survive() {
        let out = aggregate_signals(vec![
            signal("m1", SignalAction::BuyYes, "market_maker", Urgency::Low, dec!(0.5)),
            signal("m1", SignalAction::SellYes, "market_maker", Urgency::Low, dec!(0.5)),
        ]);
        assert_eq!(out.len(), 2);
    }

    /// Same-direction signals on one market coexist (e.g. BuyYes + SellNo),
    /// and cancels always survive aggregation.
    #[test]
    fn test_same_direction_and_cancels_pass() {
        let mut cancel = signal("m1", SignalAction::Cancel, "market_maker", Urgency::Low, dec!(0.5));
        cancel.order_id = Some("o1".into());
        let out = aggregate_signals(vec![
            signal("m1", SignalAction::BuyYes, "a", Urgency::Low, dec!(0.6)),
            signal("m1", SignalAction::SellNo, "b", Urgency::Low, dec!(0.5)),
            cancel,
        ]);
        assert_eq!(out.len(), 3);
    }

    /// Output ordering is (market slug, strategy name), the sequential
    /// execution order.
    #[test]
    fn test_deterministic_ordering() {
        let out = aggregate_signals(vec![
            signal("m2", SignalAction::BuyYes, "b", Urgency::Low, dec!(0.6)),
            signal("m1", SignalAction::BuyYes, "z", Urgency::Low, dec!(0.6)),
            signal("m1", SignalAction::SellNo, "a", Urgency::Low, dec!(0.6)),
        ]);
        let order: Vec<(&str, &str)> = out
            .iter()
            .map(|s| (s.market_slug.as_str(), s.strategy_name))
            .collect();
        assert_eq!(order, vec![("m1", "a"), ("m1", "z"), ("m2", "b")]);
    }

    /// Aggregation keeps signal contents intact (hints included).
    #[test]
    fn test_signal_contents_preserved() {
        let mut sig = signal("m1", SignalAction::BuyYes, "a", Urgency::High, dec!(0.8));
        sig.hint = Some(SignalHint::TrueProbability(dec!(0.6)));
        let out = aggregate_signals(vec![sig.clone()]);
        assert_eq!(out, vec![sig]);
    }
}
