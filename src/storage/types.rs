//! Core data types for the feed store
//!
//! - `FeedRecord`: one recorded feeding
//! - `FeedRecordUpdate`: partial change to an existing record
//! - `BackendKind`: which store implementation is in use
//! - Serde helpers that pin `time` to a transport-stable form

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use std::fmt;
use std::str::FromStr;

/// A single feeding event
///
/// `time` is always held at millisecond precision so that every backend
/// round-trips it exactly.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq, Eq)]
pub struct FeedRecord {
    /// Opaque client-generated identifier
    pub id: String,
    /// When the feed happened
    #[serde(with = "epoch_millis")]
    pub time: DateTime<Utc>,
    /// Volume in milliliters
    pub amount: u32,
}

impl FeedRecord {
    /// Create a record for a feed happening now
    pub fn new(amount: u32) -> Self {
        Self::at(amount, Utc::now())
    }

    /// Create a record for a feed at a specific time
    pub fn at(amount: u32, time: DateTime<Utc>) -> Self {
        Self {
            id: generate_id(),
            time: truncate_millis(time),
            amount,
        }
    }

    /// Create a record with every field supplied (imports, tests)
    pub fn with_id(id: impl Into<String>, time: DateTime<Utc>, amount: u32) -> Self {
        Self {
            id: id.into(),
            time: truncate_millis(time),
            amount,
        }
    }

    /// Epoch milliseconds of `time`
    pub fn time_millis(&self) -> i64 {
        self.time.timestamp_millis()
    }
}

/// Partial update over `{time, amount}`; `id` is immutable
#[derive(Debug, Clone, Default, Serialize, Deserialize, PartialEq, Eq)]
pub struct FeedRecordUpdate {
    #[serde(
        default,
        with = "epoch_millis::option",
        skip_serializing_if = "Option::is_none"
    )]
    pub time: Option<DateTime<Utc>>,

    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub amount: Option<u32>,
}

impl FeedRecordUpdate {
    /// Update that changes nothing
    pub fn new() -> Self {
        Self::default()
    }

    /// Builder method: set the new time
    pub fn time(mut self, time: DateTime<Utc>) -> Self {
        self.time = Some(truncate_millis(time));
        self
    }

    /// Builder method: set the new amount
    pub fn amount(mut self, amount: u32) -> Self {
        self.amount = Some(amount);
        self
    }

    /// True when no field is set; such updates never reach a backend
    pub fn is_empty(&self) -> bool {
        self.time.is_none() && self.amount.is_none()
    }

    /// Merge the supplied fields into `record`
    pub fn apply_to(&self, record: &mut FeedRecord) {
        if let Some(time) = self.time {
            record.time = truncate_millis(time);
        }
        if let Some(amount) = self.amount {
            record.amount = amount;
        }
    }
}

/// Store implementation selected at composition time
#[derive(Debug, Clone, Copy, Serialize, Deserialize, PartialEq, Eq, Hash)]
#[serde(rename_all = "lowercase")]
pub enum BackendKind {
    /// In-process keyed table
    Memory,
    /// Single JSON file holding the whole array
    Blob,
    /// Embedded transactional key-value table
    Kv,
    /// Relational table behind a connection
    Sql,
    /// Remote HTTP feed API
    Http,
}

impl BackendKind {
    /// Get all backends for iteration
    pub fn all() -> &'static [BackendKind] {
        &[
            BackendKind::Memory,
            BackendKind::Blob,
            BackendKind::Kv,
            BackendKind::Sql,
            BackendKind::Http,
        ]
    }
}

impl fmt::Display for BackendKind {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            BackendKind::Memory => write!(f, "memory"),
            BackendKind::Blob => write!(f, "blob"),
            BackendKind::Kv => write!(f, "kv"),
            BackendKind::Sql => write!(f, "sql"),
            BackendKind::Http => write!(f, "http"),
        }
    }
}

impl FromStr for BackendKind {
    type Err = String;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s.trim().to_lowercase().as_str() {
            "memory" => Ok(BackendKind::Memory),
            "blob" | "json" => Ok(BackendKind::Blob),
            "kv" => Ok(BackendKind::Kv),
            "sql" | "sqlite" => Ok(BackendKind::Sql),
            "http" | "remote" => Ok(BackendKind::Http),
            other => Err(format!("unknown backend: {}", other)),
        }
    }
}

/// Generate a fresh record id from a high-entropy source
pub fn generate_id() -> String {
    uuid::Uuid::new_v4().to_string()
}

/// Drop sub-millisecond precision
pub fn truncate_millis(time: DateTime<Utc>) -> DateTime<Utc> {
    DateTime::from_timestamp_millis(time.timestamp_millis()).unwrap_or(time)
}

/// Convert epoch milliseconds into an instant
pub fn from_epoch_millis(millis: i64) -> Option<DateTime<Utc>> {
    DateTime::from_timestamp_millis(millis)
}

/// Sort most recent first; equal times keep their relative order
pub fn sort_newest_first(records: &mut [FeedRecord]) {
    records.sort_by(|a, b| b.time.cmp(&a.time));
}

/// Reject persisted records that break the model invariants
pub(crate) fn check_persisted(record: &FeedRecord) -> Result<(), String> {
    if record.id.is_empty() {
        return Err("record with empty id".to_string());
    }
    if record.amount == 0 {
        return Err(format!("record {} has zero amount", record.id));
    }
    Ok(())
}

/// `time` on the wire: written as epoch milliseconds, read from either
/// epoch milliseconds or an ISO-8601 string
#[derive(Deserialize)]
#[serde(untagged)]
enum WireTime {
    Millis(i64),
    Text(String),
}

impl WireTime {
    fn into_datetime(self) -> Result<DateTime<Utc>, String> {
        match self {
            WireTime::Millis(ms) => {
                from_epoch_millis(ms).ok_or_else(|| format!("time out of range: {}", ms))
            }
            WireTime::Text(s) => DateTime::parse_from_rfc3339(&s)
                .map(|dt| truncate_millis(dt.with_timezone(&Utc)))
                .map_err(|e| format!("invalid time '{}': {}", s, e)),
        }
    }
}

/// Serde adapter storing `time` as epoch milliseconds
pub mod epoch_millis {
    use super::WireTime;
    use chrono::{DateTime, Utc};
    use serde::{de, Deserialize, Deserializer, Serializer};

    pub fn serialize<S: Serializer>(time: &DateTime<Utc>, s: S) -> Result<S::Ok, S::Error> {
        s.serialize_i64(time.timestamp_millis())
    }

    pub fn deserialize<'de, D: Deserializer<'de>>(d: D) -> Result<DateTime<Utc>, D::Error> {
        WireTime::deserialize(d)?
            .into_datetime()
            .map_err(de::Error::custom)
    }

    pub mod option {
        use super::super::WireTime;
        use chrono::{DateTime, Utc};
        use serde::{de, Deserialize, Deserializer, Serializer};

        pub fn serialize<S: Serializer>(
            time: &Option<DateTime<Utc>>,
            s: S,
        ) -> Result<S::Ok, S::Error> {
            match time {
                Some(t) => s.serialize_some(&t.timestamp_millis()),
                None => s.serialize_none(),
            }
        }

        pub fn deserialize<'de, D: Deserializer<'de>>(
            d: D,
        ) -> Result<Option<DateTime<Utc>>, D::Error> {
            match Option::<WireTime>::deserialize(d)? {
                Some(wire) => wire.into_datetime().map(Some).map_err(de::Error::custom),
                None => Ok(None),
            }
        }
    }
}

/// Serde adapter storing `time` as an RFC 3339 string with millisecond precision
pub mod iso8601 {
    use super::WireTime;
    use chrono::{DateTime, SecondsFormat, Utc};
    use serde::{de, Deserialize, Deserializer, Serializer};

    pub fn serialize<S: Serializer>(time: &DateTime<Utc>, s: S) -> Result<S::Ok, S::Error> {
        s.serialize_str(&time.to_rfc3339_opts(SecondsFormat::Millis, true))
    }

    pub fn deserialize<'de, D: Deserializer<'de>>(d: D) -> Result<DateTime<Utc>, D::Error> {
        WireTime::deserialize(d)?
            .into_datetime()
            .map_err(de::Error::custom)
    }
}
