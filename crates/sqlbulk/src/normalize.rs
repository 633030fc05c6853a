//! Row normalization.
//!
//! Turns heterogeneous [`BulkRow`]s into flat records before any SQL is
//! built. Entity state (dirty flags, fillable/guarded lists) is read exactly
//! once here; later stages only see records.

use crate::entity::{BulkRow, Entity};
use crate::record::Record;
use crate::timestamp::{TimestampColumns, instant_value, parse_timestamp};
use chrono::{DateTime, Utc};
use sqlbulk_core::{Result, Value};
use std::collections::HashSet;

/// Which present columns of a row may be written by an update.
#[derive(Debug, Clone, PartialEq, Eq)]
pub(crate) enum Eligibility {
    /// Plain records: every present column.
    All,
    /// Entities: only the columns that were dirty.
    Dirty(HashSet<String>),
}

/// A row ready for update SQL generation.
#[derive(Debug, Clone)]
pub(crate) struct UpdateRow {
    pub(crate) record: Record,
    eligibility: Eligibility,
}

impl UpdateRow {
    /// The value this row assigns to `column`, if it assigns one.
    pub(crate) fn assignment(&self, column: &str) -> Option<&Value> {
        let value = self.record.get(column)?;
        match &self.eligibility {
            Eligibility::All => Some(value),
            Eligibility::Dirty(dirty) => dirty.contains(column).then_some(value),
        }
    }
}

fn present(record: &Record, column: &str) -> Option<Value> {
    record.get(column).filter(|v| !v.is_null()).cloned()
}

/// Normalize rows for a bulk update, stamping `updated_at` when configured.
pub(crate) fn update_rows(
    rows: &[BulkRow],
    updated_at: Option<&str>,
    now: DateTime<Utc>,
) -> Result<Vec<UpdateRow>> {
    rows.iter()
        .map(|row| match row {
            BulkRow::Plain(record) => plain_update_row(record, updated_at, now),
            BulkRow::Entity(entity) => entity_update_row(entity.as_ref(), updated_at, now),
        })
        .collect()
}

fn plain_update_row(
    record: &Record,
    updated_at: Option<&str>,
    now: DateTime<Utc>,
) -> Result<UpdateRow> {
    let mut record = record.clone();
    if let Some(column) = updated_at {
        let stamp = match present(&record, column) {
            Some(value) => parse_timestamp(column, &value)?,
            None => instant_value(now),
        };
        record.insert(column, stamp);
    }
    Ok(UpdateRow {
        record,
        eligibility: Eligibility::All,
    })
}

fn entity_update_row(
    entity: &dyn Entity,
    updated_at: Option<&str>,
    now: DateTime<Utc>,
) -> Result<UpdateRow> {
    let mut record = entity.attributes();
    let mut dirty: HashSet<String> = record
        .names()
        .filter(|name| entity.is_dirty(name))
        .map(str::to_string)
        .collect();

    if let Some(column) = updated_at {
        match present(&record, column) {
            Some(value) => record.insert(column, parse_timestamp(column, &value)?),
            None => {
                record.insert(column, instant_value(now));
                dirty.insert(column.to_string());
            }
        }
    }

    Ok(UpdateRow {
        record,
        eligibility: Eligibility::Dirty(dirty),
    })
}

/// Normalize rows for a bulk insert.
///
/// `timestamps` is `None` when timestamp handling is disabled for the call.
pub(crate) fn insert_rows(
    rows: &[BulkRow],
    timestamps: Option<&TimestampColumns>,
    now: DateTime<Utc>,
) -> Result<Vec<Record>> {
    rows.iter()
        .map(|row| match row {
            BulkRow::Plain(record) => plain_insert_row(record, timestamps, now),
            BulkRow::Entity(entity) => Ok(entity_insert_row(
                entity.as_ref(),
                timestamps.is_some(),
                now,
            )),
        })
        .collect()
}

fn plain_insert_row(
    record: &Record,
    timestamps: Option<&TimestampColumns>,
    now: DateTime<Utc>,
) -> Result<Record> {
    let mut record = record.clone();
    if let Some(columns) = timestamps {
        for column in columns.names() {
            let stamp = match present(&record, column) {
                Some(value) => parse_timestamp(column, &value)?,
                None => instant_value(now),
            };
            record.insert(column, stamp);
        }
    }
    Ok(record)
}

fn entity_insert_row(entity: &dyn Entity, timestamps: bool, now: DateTime<Utc>) -> Record {
    let mut record = entity.attributes();
    let mut stamped: Vec<String> = Vec::new();

    if let Some(columns) = entity.timestamp_columns().filter(|_| timestamps) {
        for column in columns.names() {
            if present(&record, column).is_none() {
                record.insert(column, instant_value(now));
            }
            stamped.push(column.to_string());
        }
    }

    let fillable = entity.fillable();
    if fillable.is_empty() {
        let guarded = entity.guarded();
        record.retain(|name| !guarded.iter().any(|g| g == name));
    } else {
        record.retain(|name| {
            fillable.iter().any(|f| f == name) || stamped.iter().any(|s| s == name)
        });
    }
    record
}
