//! Input checks that run before anything reaches a store

use chrono::{DateTime, Utc};
use thiserror::Error;

use crate::storage::FeedRecordUpdate;

/// Bad user input; reported inline, never persisted
#[derive(Error, Debug, Clone, PartialEq, Eq)]
pub enum ValidationError {
    #[error("Invalid amount: {0} ml (must be a positive whole number)")]
    InvalidAmount(i64),

    #[error("Amount is not a number: {0:?}")]
    NotANumber(String),

    #[error("Feed time {0} is in the future")]
    FutureTime(DateTime<Utc>),
}

/// Accept a strictly positive amount that fits the record type
pub fn validate_amount(amount: i64) -> Result<u32, ValidationError> {
    if amount <= 0 {
        return Err(ValidationError::InvalidAmount(amount));
    }
    u32::try_from(amount).map_err(|_| ValidationError::InvalidAmount(amount))
}

/// Parse free-form input such as a text box value
pub fn parse_amount(input: &str) -> Result<u32, ValidationError> {
    let trimmed = input.trim();
    let value: i64 = trimmed
        .parse()
        .map_err(|_| ValidationError::NotANumber(trimmed.to_string()))?;
    validate_amount(value)
}

/// Reject times strictly after `now`
pub fn validate_time(time: DateTime<Utc>, now: DateTime<Utc>) -> Result<DateTime<Utc>, ValidationError> {
    if time > now {
        return Err(ValidationError::FutureTime(time));
    }
    Ok(time)
}

/// Check whichever fields an update carries
pub fn validate_update(updates: &FeedRecordUpdate, now: DateTime<Utc>) -> Result<(), ValidationError> {
    if let Some(amount) = updates.amount {
        validate_amount(i64::from(amount))?;
    }
    if let Some(time) = updates.time {
        validate_time(time, now)?;
    }
    Ok(())
}
