//! Chart and timeline views
//!
//! Calendar-day grouping takes an explicit time zone so callers decide what
//! "today" means (`chrono::Local` in the CLI, fixed offsets in tests).

use chrono::{DateTime, Duration, NaiveDate, TimeZone, Utc};
use serde::Serialize;
use std::fmt;

use crate::storage::{sort_newest_first, FeedRecord};

/// Intake for one calendar day
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct DailyTotal {
    pub date: NaiveDate,
    pub total_ml: u64,
    pub count: usize,
}

/// Human label for the day a feed fell on, relative to today
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum DayLabel {
    Today,
    Yesterday,
    DaysAgo(i64),
}

impl fmt::Display for DayLabel {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            DayLabel::Today => write!(f, "today"),
            DayLabel::Yesterday => write!(f, "yesterday"),
            DayLabel::DaysAgo(n) => write!(f, "{} days ago", n),
        }
    }
}

/// One row of the timeline
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct TimelineEntry {
    pub record: FeedRecord,
    pub day: DayLabel,
    /// Gap to the next-older feed inside the window
    pub since_previous: Option<Duration>,
}

/// Per-day totals for the `days` calendar days ending today, oldest first.
/// Days without feeds are present with zero totals.
pub fn daily_totals<Tz: TimeZone>(
    records: &[FeedRecord],
    now: DateTime<Utc>,
    tz: &Tz,
    days: u32,
) -> Vec<DailyTotal> {
    let today = now.with_timezone(tz).date_naive();
    let span = i64::from(days.max(1));

    let mut totals: Vec<DailyTotal> = (0..span)
        .rev()
        .map(|back| DailyTotal {
            date: today - Duration::days(back),
            total_ml: 0,
            count: 0,
        })
        .collect();

    let first = totals[0].date;
    for record in records {
        let day = record.time.with_timezone(tz).date_naive();
        if day < first || day > today {
            continue;
        }
        let slot = &mut totals[(day - first).num_days() as usize];
        slot.total_ml += u64::from(record.amount);
        slot.count += 1;
    }

    totals
}

/// Records newer than `now - window`, newest first
pub fn recent(records: &[FeedRecord], now: DateTime<Utc>, window: Duration) -> Vec<FeedRecord> {
    let cutoff = now - window;
    let mut hits: Vec<FeedRecord> = records
        .iter()
        .filter(|record| record.time > cutoff)
        .cloned()
        .collect();
    sort_newest_first(&mut hits);
    hits
}

/// Recent records labelled by day and annotated with the gap before each
pub fn timeline<Tz: TimeZone>(
    records: &[FeedRecord],
    now: DateTime<Utc>,
    tz: &Tz,
    window: Duration,
) -> Vec<TimelineEntry> {
    let today = now.with_timezone(tz).date_naive();
    let recent = recent(records, now, window);

    recent
        .iter()
        .enumerate()
        .map(|(index, record)| {
            let day = record.time.with_timezone(tz).date_naive();
            let label = match (today - day).num_days() {
                n if n <= 0 => DayLabel::Today,
                1 => DayLabel::Yesterday,
                n => DayLabel::DaysAgo(n),
            };

            TimelineEntry {
                record: record.clone(),
                day: label,
                since_previous: recent.get(index + 1).map(|older| record.time - older.time),
            }
        })
        .collect()
}
