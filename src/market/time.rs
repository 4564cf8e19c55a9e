//! Helpers for reasoning about sports market time windows.
//!
//! Sports market slugs embed a trailing date like `aec-nba-dal-mil-2026-01-25`.
//! The date is a conservative guardrail against trading stale markets.

use chrono::{DateTime, NaiveDate, Utc};

/// Parse a trailing `YYYY-MM-DD` date from a market slug.
///
/// Returns `None` when the slug doesn't end with a date.
pub fn parse_slug_date(slug: &str) -> Option<NaiveDate> {
    let tail: &str = slug.get(slug.len().checked_sub(10)?..)?;
    let bytes = tail.as_bytes();
    if bytes[4] != b'-' || bytes[7] != b'-' {
        return None;
    }
    // The date must be a suffix, separated from the rest of the slug.
    if slug.len() > 10 && !slug[..slug.len() - 10].ends_with('-') {
        return None;
    }
    NaiveDate::parse_from_str(tail, "%Y-%m-%d").ok()
}

/// Decide if a market should be tradeable based on its slug date.
///
/// - No parseable date: allow (unknown or non-sports slug format).
/// - Date before today (UTC): block.
/// - Date equal to today (UTC): allow only when in-game trading is enabled.
/// - Date after today (UTC): allow.
pub fn is_tradeable_slug(slug: &str, now_utc: DateTime<Utc>, allow_in_game: bool) -> bool {
    let Some(slug_date) = parse_slug_date(slug) else {
        return true;
    };
    let today = now_utc.date_naive();
    if slug_date < today {
        return false;
    }
    if slug_date == today {
        return allow_in_game;
    }
    true
}

#[cfg(test)]
mod tests {
    use super::*;
    use chrono::TimeZone;

    fn at(y: i32, m: u32, d: u32) -> DateTime<Utc> {
        Utc.with_ymd_and_hms(y, m, d, 12, 0, 0).unwrap()
    }

    #[test]
    fn test_parse_slug_date() {
        assert_eq!(
            parse_slug_date("aec-nba-dal-mil-2026-01-25"),
            Some(NaiveDate::from_ymd_opt(2026, 1, 25).unwrap())
        );
        assert_eq!(parse_slug_date("2026-01-25"), NaiveDate::from_ymd_opt(2026, 1, 25));
        assert_eq!(parse_slug_date("btc-above-100k"), None);
        assert_eq!(parse_slug_date(""), None);
        // Malformed tails are not dates.
        assert_eq!(parse_slug_date("aec-nba-dal-mil-2026-13-45"), None);
        assert_eq!(parse_slug_date("aec-nba-dal-mil-20260125"), None);
    }

    /// Scenario: slug dated 2026-01-25, evaluated on 2026-02-01.
    /// Expected: blocked regardless of the in-game flag.
    #[test]
    fn test_past_date_blocked() {
        let now = at(2026, 2, 1);
        assert!(!is_tradeable_slug("aec-nba-dal-mil-2026-01-25", now, true));
        assert!(!is_tradeable_slug("aec-nba-dal-mil-2026-01-25", now, false));
    }

    /// Scenario: slug dated today.
    /// Expected: tradeable only when in-game trading is enabled.
    #[test]
    fn test_today_gated_by_in_game_flag() {
        let now = at(2026, 1, 25);
        assert!(is_tradeable_slug("aec-nba-dal-mil-2026-01-25", now, true));
        assert!(!is_tradeable_slug("aec-nba-dal-mil-2026-01-25", now, false));
    }

    #[test]
    fn test_future_date_allowed() {
        let now = at(2026, 1, 20);
        assert!(is_tradeable_slug("aec-nba-dal-mil-2026-01-25", now, false));
    }

    #[test]
    fn test_dateless_slug_allowed() {
        let now = at(2026, 1, 25);
        assert!(is_tradeable_slug("btc-above-100k", now, false));
    }
}
