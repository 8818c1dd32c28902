//! Feed Derivation Engine
//!
//! Pure functions over a record set ordered newest first. Nothing here
//! reads the clock: every function takes `now`, so the same inputs always
//! give the same output and a UI can recompute on its own tick.
//!
//! - **latest / elapsed / next feed / alert level**: the two timers
//! - **summary**: daily totals, recency filter, timeline gaps

pub mod summary;

pub use summary::{daily_totals, recent, timeline, DailyTotal, DayLabel, TimelineEntry};

use chrono::{DateTime, Duration, Utc};
use serde::Serialize;
use std::fmt;

use crate::storage::FeedRecord;

/// Elapsed-time boundaries for the alert colours (inclusive)
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct AlertThresholds {
    pub warning: Duration,
    pub danger: Duration,
}

impl Default for AlertThresholds {
    fn default() -> Self {
        Self {
            warning: Duration::hours(2) + Duration::minutes(45),
            danger: Duration::hours(4),
        }
    }
}

/// Everything the derivations need to know about the feeding plan
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct Schedule {
    /// Expected time between feeds
    pub interval: Duration,
    pub thresholds: AlertThresholds,
    /// Amount for the seed record of an empty log
    pub default_amount: u32,
    /// Timeline reach
    pub recent_window: Duration,
    /// Days in the daily summary
    pub summary_days: u32,
}

impl Default for Schedule {
    fn default() -> Self {
        Self {
            interval: Duration::hours(4),
            thresholds: AlertThresholds::default(),
            default_amount: 120,
            recent_window: Duration::hours(48),
            summary_days: 3,
        }
    }
}

/// How urgent the next feed is
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Serialize)]
#[serde(rename_all = "lowercase")]
pub enum AlertLevel {
    Normal,
    Warning,
    Danger,
}

impl fmt::Display for AlertLevel {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            AlertLevel::Normal => write!(f, "normal"),
            AlertLevel::Warning => write!(f, "warning"),
            AlertLevel::Danger => write!(f, "danger"),
        }
    }
}

/// Countdown to the next expected feed
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct NextFeed {
    pub due_at: DateTime<Utc>,
    /// Pinned at zero once overdue
    pub remaining: Duration,
    pub overdue: bool,
}

/// First element of a newest-first sequence
pub fn latest(records: &[FeedRecord]) -> Option<&FeedRecord> {
    records.first()
}

/// Time since `record`, never negative
pub fn elapsed_since(record: &FeedRecord, now: DateTime<Utc>) -> Duration {
    (now - record.time).max(Duration::zero())
}

/// When the next feed is due after `record`
pub fn next_feed_eta(record: &FeedRecord, now: DateTime<Utc>, interval: Duration) -> NextFeed {
    let due_at = record.time + interval;
    let remaining = due_at - now;

    if remaining <= Duration::zero() {
        NextFeed {
            due_at,
            remaining: Duration::zero(),
            overdue: true,
        }
    } else {
        NextFeed {
            due_at,
            remaining,
            overdue: false,
        }
    }
}

/// Classify an elapsed time against the thresholds
pub fn alert_level(elapsed: Duration, thresholds: &AlertThresholds) -> AlertLevel {
    if elapsed >= thresholds.danger {
        AlertLevel::Danger
    } else if elapsed >= thresholds.warning {
        AlertLevel::Warning
    } else {
        AlertLevel::Normal
    }
}

/// Display values for one clock tick
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct FeedStatus {
    pub latest: Option<FeedRecord>,
    pub elapsed: Option<Duration>,
    pub next: Option<NextFeed>,
    pub alert: AlertLevel,
}

impl FeedStatus {
    /// Derive timer state from a newest-first record set
    pub fn compute(records: &[FeedRecord], now: DateTime<Utc>, schedule: &Schedule) -> Self {
        match latest(records) {
            Some(record) => {
                let elapsed = elapsed_since(record, now);
                Self {
                    latest: Some(record.clone()),
                    elapsed: Some(elapsed),
                    next: Some(next_feed_eta(record, now, schedule.interval)),
                    alert: alert_level(elapsed, &schedule.thresholds),
                }
            }
            None => Self {
                latest: None,
                elapsed: None,
                next: None,
                alert: AlertLevel::Normal,
            },
        }
    }
}

/// `HH:MM:SS`; hours are not wrapped at 24
pub fn format_hms(duration: Duration) -> String {
    let total = duration.num_seconds().max(0);
    format!(
        "{:02}:{:02}:{:02}",
        total / 3600,
        (total % 3600) / 60,
        total % 60
    )
}

/// `2h 05m` or `45m`
pub fn format_hm(duration: Duration) -> String {
    let minutes = duration.num_minutes().max(0);
    let hours = minutes / 60;
    if hours == 0 {
        format!("{}m", minutes)
    } else {
        format!("{}h {:02}m", hours, minutes % 60)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use chrono::TimeZone;

    fn at(h: u32, m: u32) -> DateTime<Utc> {
        Utc.with_ymd_and_hms(2024, 5, 1, h, m, 0).unwrap()
    }

    #[test]
    fn test_latest_is_first() {
        let records = vec![
            FeedRecord::with_id("a", at(10, 0), 120),
            FeedRecord::with_id("b", at(9, 0), 90),
        ];
        assert_eq!(latest(&records).unwrap().id, "a");
        assert!(latest(&[]).is_none());
    }

    #[test]
    fn test_elapsed_clamps_clock_skew() {
        let record = FeedRecord::with_id("a", at(10, 0), 120);
        assert_eq!(elapsed_since(&record, at(9, 0)), Duration::zero());
        assert_eq!(elapsed_since(&record, at(11, 30)), Duration::minutes(90));
    }

    #[test]
    fn test_next_feed_counts_down_then_pins() {
        let record = FeedRecord::with_id("a", at(10, 0), 120);

        let next = next_feed_eta(&record, at(12, 30), Duration::hours(4));
        assert_eq!(next.remaining, Duration::minutes(90));
        assert!(!next.overdue);
        assert_eq!(next.due_at, at(14, 0));

        let due = next_feed_eta(&record, at(14, 0), Duration::hours(4));
        assert!(due.overdue);
        assert_eq!(due.remaining, Duration::zero());

        let late = next_feed_eta(&record, at(15, 0), Duration::hours(4));
        assert!(late.overdue);
        assert_eq!(late.remaining, Duration::zero());
    }

    #[test]
    fn test_alert_boundaries_inclusive() {
        let t = AlertThresholds::default();
        let warn = Duration::hours(2) + Duration::minutes(45);

        assert_eq!(alert_level(warn - Duration::seconds(1), &t), AlertLevel::Normal);
        assert_eq!(alert_level(warn, &t), AlertLevel::Warning);
        assert_eq!(
            alert_level(Duration::hours(4) - Duration::milliseconds(1), &t),
            AlertLevel::Warning
        );
        assert_eq!(alert_level(Duration::hours(4), &t), AlertLevel::Danger);
    }

    #[test]
    fn test_custom_thresholds() {
        let t = AlertThresholds {
            warning: Duration::hours(1),
            danger: Duration::hours(2),
        };
        assert_eq!(alert_level(Duration::minutes(61), &t), AlertLevel::Warning);
    }

    #[test]
    fn test_status_for_empty_log() {
        let status = FeedStatus::compute(&[], at(10, 0), &Schedule::default());
        assert!(status.latest.is_none());
        assert_eq!(status.alert, AlertLevel::Normal);
    }

    #[test]
    fn test_status_does_not_mutate_input() {
        let records = vec![
            FeedRecord::with_id("a", at(6, 0), 120),
            FeedRecord::with_id("b", at(5, 0), 90),
        ];
        let before = records.clone();
        let status = FeedStatus::compute(&records, at(10, 30), &Schedule::default());

        assert_eq!(records, before);
        assert_eq!(status.alert, AlertLevel::Danger);
        assert_eq!(status.elapsed, Some(Duration::minutes(270)));
        assert!(status.next.unwrap().overdue);
    }

    #[test]
    fn test_format_hms() {
        assert_eq!(format_hms(Duration::seconds(3 * 3600 + 5 * 60 + 9)), "03:05:09");
        assert_eq!(format_hms(Duration::hours(27)), "27:00:00");
        assert_eq!(format_hms(Duration::seconds(-5)), "00:00:00");
    }

    #[test]
    fn test_format_hm() {
        assert_eq!(format_hm(Duration::minutes(45)), "45m");
        assert_eq!(format_hm(Duration::minutes(125)), "2h 05m");
    }
}
