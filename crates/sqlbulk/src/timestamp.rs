//! Created/updated timestamp handling.
//!
//! Every bulk call captures one instant up front and stamps it on every row
//! that lacks an explicit value, so all rows of a batch agree. Explicit
//! values are re-parsed into a canonical `Value::Timestamp`; a value that
//! cannot be read as a date/time fails the call instead of being replaced.

use chrono::{DateTime, NaiveDate, NaiveDateTime, NaiveTime, TimeZone, Utc};
use sqlbulk_core::{Error, Result, TimestampError, TypeError, Value};

/// Default name of the creation timestamp column.
pub const DEFAULT_CREATED_AT: &str = "created_at";

/// Default name of the update timestamp column.
pub const DEFAULT_UPDATED_AT: &str = "updated_at";

const MICROS_PER_SECOND: i64 = 1_000_000;

/// Text layouts accepted for naive (zone-less) date/times, tried in order.
const NAIVE_LAYOUTS: &[&str] = &[
    "%Y-%m-%d %H:%M:%S%.f",
    "%Y-%m-%dT%H:%M:%S%.f",
    "%Y-%m-%d %H:%M",
    "%Y-%m-%dT%H:%M",
];

/// Names of the creation and update timestamp columns.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct TimestampColumns {
    created_at: String,
    updated_at: String,
}

impl TimestampColumns {
    /// Use custom column names.
    pub fn new(created_at: impl Into<String>, updated_at: impl Into<String>) -> Self {
        Self {
            created_at: created_at.into(),
            updated_at: updated_at.into(),
        }
    }

    /// The creation timestamp column.
    pub fn created_at(&self) -> &str {
        &self.created_at
    }

    /// The update timestamp column.
    pub fn updated_at(&self) -> &str {
        &self.updated_at
    }

    /// Both column names, creation first.
    pub fn names(&self) -> [&str; 2] {
        [&self.created_at, &self.updated_at]
    }
}

impl Default for TimestampColumns {
    fn default() -> Self {
        Self::new(DEFAULT_CREATED_AT, DEFAULT_UPDATED_AT)
    }
}

/// Convert an instant into the value stamped on rows.
pub fn instant_value(instant: DateTime<Utc>) -> Value {
    Value::Timestamp(instant.timestamp_micros())
}

/// Re-parse an explicit timestamp value.
///
/// Accepts `Timestamp`, `TimestampTz`, `Date`, and text in RFC 3339,
/// `YYYY-MM-DD HH:MM:SS[.f]` (also with `T`), `YYYY-MM-DD HH:MM` or
/// `YYYY-MM-DD` form. Zone-less text is taken as UTC. Anything else is a
/// [`TimestampError`] naming the column.
pub fn parse_timestamp(column: &str, value: &Value) -> Result<Value> {
    let fail = |message: &str| {
        Error::Timestamp(TimestampError {
            column: column.to_string(),
            value: format!("{value:?}"),
            message: message.to_string(),
        })
    };

    match value {
        Value::Timestamp(micros) | Value::TimestampTz(micros) => Ok(Value::Timestamp(*micros)),
        Value::Date(days) => date_from_days(*days)
            .and_then(|date| date.and_hms_opt(0, 0, 0))
            .map(|naive| instant_value(Utc.from_utc_datetime(&naive)))
            .ok_or_else(|| fail("date out of range")),
        Value::Text(text) => parse_text(text.trim())
            .map(instant_value)
            .ok_or_else(|| fail("unrecognized date/time format")),
        other => Err(fail(&format!(
            "{} values cannot be read as a date/time",
            other.type_name()
        ))),
    }
}

fn parse_text(text: &str) -> Option<DateTime<Utc>> {
    if let Ok(with_offset) = DateTime::parse_from_rfc3339(text) {
        return Some(with_offset.with_timezone(&Utc));
    }
    for layout in NAIVE_LAYOUTS {
        if let Ok(naive) = NaiveDateTime::parse_from_str(text, layout) {
            return Some(Utc.from_utc_datetime(&naive));
        }
    }
    NaiveDate::parse_from_str(text, "%Y-%m-%d")
        .ok()
        .and_then(|date| date.and_hms_opt(0, 0, 0))
        .map(|naive| Utc.from_utc_datetime(&naive))
}

fn date_from_days(days: i32) -> Option<NaiveDate> {
    NaiveDate::from_ymd_opt(1970, 1, 1)?
        .checked_add_signed(chrono::Duration::days(i64::from(days)))
}

fn out_of_range(expected: &'static str, actual: String) -> Error {
    Error::Type(TypeError {
        expected,
        actual,
        column: None,
    })
}

/// Format microseconds since the epoch as `YYYY-MM-DD HH:MM:SS`.
pub(crate) fn format_timestamp(micros: i64) -> Result<String> {
    let secs = micros.div_euclid(MICROS_PER_SECOND);
    let sub_micros = micros.rem_euclid(MICROS_PER_SECOND);
    #[allow(clippy::cast_possible_truncation)]
    let nanos = (sub_micros * 1_000) as u32;
    DateTime::from_timestamp(secs, nanos)
        .map(|dt| dt.format("%Y-%m-%d %H:%M:%S").to_string())
        .ok_or_else(|| out_of_range("timestamp in range", format!("{micros} microseconds")))
}

/// Format days since the epoch as `YYYY-MM-DD`.
pub(crate) fn format_date(days: i32) -> Result<String> {
    date_from_days(days)
        .map(|date| date.format("%Y-%m-%d").to_string())
        .ok_or_else(|| out_of_range("date in range", format!("{days} days")))
}

/// Format microseconds since midnight as `HH:MM:SS[.ffffff]`.
pub(crate) fn format_time(micros: i64) -> Result<String> {
    let secs = u32::try_from(micros.div_euclid(MICROS_PER_SECOND)).ok();
    #[allow(clippy::cast_possible_truncation)]
    let nanos = (micros.rem_euclid(MICROS_PER_SECOND) * 1_000) as u32;
    secs.and_then(|secs| NaiveTime::from_num_seconds_from_midnight_opt(secs, nanos))
        .map(|time| {
            if nanos == 0 {
                time.format("%H:%M:%S").to_string()
            } else {
                time.format("%H:%M:%S%.6f").to_string()
            }
        })
        .ok_or_else(|| out_of_range("time of day", format!("{micros} microseconds")))
}
