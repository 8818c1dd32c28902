//! Snapshot export and import
//!
//! The snapshot format is a JSON array of `{id, time, amount}` objects,
//! newest first, with `time` in epoch milliseconds. Import also accepts
//! ISO-8601 strings for `time`. CSV is export-only.

use chrono::{DateTime, SecondsFormat, Utc};
use serde::Serialize;
use serde_json::Value;
use std::collections::HashSet;
use thiserror::Error;
use tracing::info;

use crate::storage::{
    from_epoch_millis, sort_newest_first, truncate_millis, FeedRecord, FeedStore, StorageError,
};

/// Transfer errors
#[derive(Error, Debug)]
pub enum TransferError {
    #[error("Invalid record at index {index}: {reason}")]
    Malformed { index: usize, reason: String },

    #[error("Invalid snapshot: {0}")]
    Json(#[from] serde_json::Error),

    #[error("CSV error: {0}")]
    Csv(#[from] csv::Error),

    #[error("Storage error: {0}")]
    Storage(#[from] StorageError),
}

pub type TransferResult<T> = std::result::Result<T, TransferError>;

/// Export format
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub enum ExportFormat {
    #[default]
    Json,
    Csv,
}

impl ExportFormat {
    pub fn content_type(&self) -> &'static str {
        match self {
            ExportFormat::Json => "application/json",
            ExportFormat::Csv => "text/csv",
        }
    }

    pub fn extension(&self) -> &'static str {
        match self {
            ExportFormat::Json => "json",
            ExportFormat::Csv => "csv",
        }
    }
}

impl std::str::FromStr for ExportFormat {
    type Err = String;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s.to_ascii_lowercase().as_str() {
            "json" => Ok(ExportFormat::Json),
            "csv" => Ok(ExportFormat::Csv),
            other => Err(format!("unknown export format '{}' (expected json or csv)", other)),
        }
    }
}

/// Outcome of an import
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize)]
pub struct ImportReport {
    pub imported: usize,
    /// Records whose id was already present
    pub skipped: usize,
}

/// Pretty JSON array, newest first
pub fn export_json(records: &[FeedRecord]) -> TransferResult<String> {
    let mut sorted = records.to_vec();
    sort_newest_first(&mut sorted);
    Ok(serde_json::to_string_pretty(&sorted)?)
}

#[derive(Serialize)]
struct CsvRow<'a> {
    id: &'a str,
    time: String,
    amount: u32,
}

/// `id,time,amount` with RFC 3339 times, newest first
pub fn export_csv(records: &[FeedRecord]) -> TransferResult<String> {
    let mut sorted = records.to_vec();
    sort_newest_first(&mut sorted);

    let mut writer = csv::Writer::from_writer(Vec::new());
    for record in &sorted {
        writer.serialize(CsvRow {
            id: &record.id,
            time: record.time.to_rfc3339_opts(SecondsFormat::Millis, true),
            amount: record.amount,
        })?;
    }
    // Header row even when empty
    if sorted.is_empty() {
        writer.write_record(["id", "time", "amount"])?;
    }

    let bytes = writer
        .into_inner()
        .map_err(|e| TransferError::Csv(e.into_error().into()))?;
    Ok(String::from_utf8_lossy(&bytes).into_owned())
}

pub fn export(records: &[FeedRecord], format: ExportFormat) -> TransferResult<String> {
    match format {
        ExportFormat::Json => export_json(records),
        ExportFormat::Csv => export_csv(records),
    }
}

/// Parse and validate a whole snapshot. The first bad element fails the lot.
pub fn parse_snapshot(input: &str) -> TransferResult<Vec<FeedRecord>> {
    let value: Value = serde_json::from_str(input)?;
    let Value::Array(items) = value else {
        return Err(TransferError::Malformed {
            index: 0,
            reason: "snapshot must be a JSON array".to_string(),
        });
    };

    items
        .iter()
        .enumerate()
        .map(|(index, item)| {
            parse_element(item).map_err(|reason| TransferError::Malformed { index, reason })
        })
        .collect()
}

fn parse_element(item: &Value) -> Result<FeedRecord, String> {
    let object = item.as_object().ok_or("element is not an object")?;

    let id = match object.get("id") {
        Some(Value::String(id)) if !id.trim().is_empty() => id.clone(),
        Some(Value::String(_)) => return Err("id is empty".to_string()),
        Some(_) => return Err("id must be a string".to_string()),
        None => return Err("missing id".to_string()),
    };

    let time = match object.get("time") {
        Some(value) => parse_time(value)?,
        None => return Err("missing time".to_string()),
    };

    let amount = match object.get("amount") {
        Some(Value::Number(n)) => n
            .as_u64()
            .filter(|amount| *amount > 0)
            .and_then(|amount| u32::try_from(amount).ok())
            .ok_or_else(|| format!("amount {} is not a positive whole number", n))?,
        Some(_) => return Err("amount must be a number".to_string()),
        None => return Err("missing amount".to_string()),
    };

    Ok(FeedRecord { id, time, amount })
}

fn parse_time(value: &Value) -> Result<DateTime<Utc>, String> {
    match value {
        Value::Number(n) => n
            .as_i64()
            .and_then(from_epoch_millis)
            .ok_or_else(|| format!("time {} is not a valid epoch millisecond value", n)),
        Value::String(s) => DateTime::parse_from_rfc3339(s)
            .map(|t| truncate_millis(t.with_timezone(&Utc)))
            .map_err(|e| format!("time {:?} is not ISO-8601: {}", s, e)),
        _ => Err("time must be a number or string".to_string()),
    }
}

/// Merge a snapshot into `store`, skipping ids it already holds.
///
/// Validation covers the whole input before anything is written.
pub async fn import_json(store: &dyn FeedStore, input: &str) -> TransferResult<ImportReport> {
    let records = parse_snapshot(input)?;
    import_records(store, records).await
}

pub async fn import_records(
    store: &dyn FeedStore,
    records: Vec<FeedRecord>,
) -> TransferResult<ImportReport> {
    let mut seen: HashSet<String> = store
        .get_all()
        .await?
        .into_iter()
        .map(|record| record.id)
        .collect();

    let mut report = ImportReport::default();
    for record in records {
        if !seen.insert(record.id.clone()) {
            report.skipped += 1;
            continue;
        }
        store.add(record).await?;
        report.imported += 1;
    }

    info!(
        backend = %store.backend(),
        imported = report.imported,
        skipped = report.skipped,
        "Snapshot imported"
    );
    Ok(report)
}
