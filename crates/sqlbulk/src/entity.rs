//! Entity rows with dirty tracking.
//!
//! An entity is a stateful row object: besides its current attributes it
//! knows which of them changed since it was loaded, and which of them may be
//! written in a mass insert. [`TrackedEntity`] keeps a snapshot of the loaded
//! attributes and compares against it.

use crate::record::Record;
use crate::timestamp::TimestampColumns;
use sqlbulk_core::Value;
use std::fmt;

/// A row object that tracks its own changes.
pub trait Entity: Send + Sync + fmt::Debug {
    /// Current attributes as a flat record.
    fn attributes(&self) -> Record;

    /// Whether `field` changed since the entity was loaded.
    fn is_dirty(&self, field: &str) -> bool;

    /// Allow-list for mass inserts. Empty means "everything not guarded".
    fn fillable(&self) -> &[String] {
        &[]
    }

    /// Deny-list for mass inserts, used when [`fillable`](Self::fillable) is empty.
    fn guarded(&self) -> &[String] {
        &[]
    }

    /// Timestamp columns, if this entity maintains them.
    fn timestamp_columns(&self) -> Option<TimestampColumns> {
        Some(TimestampColumns::default())
    }
}

/// Snapshot-based [`Entity`] implementation.
///
/// A field is dirty when its current value differs from the snapshot or the
/// snapshot does not have it.
#[derive(Debug, Clone)]
pub struct TrackedEntity {
    attributes: Record,
    original: Record,
    fillable: Vec<String>,
    guarded: Vec<String>,
    timestamps: Option<TimestampColumns>,
}

impl TrackedEntity {
    /// An entity loaded from storage: the snapshot equals the attributes, so
    /// nothing is dirty yet.
    #[must_use]
    pub fn loaded(attributes: Record) -> Self {
        Self {
            original: attributes.clone(),
            attributes,
            fillable: Vec::new(),
            guarded: Vec::new(),
            timestamps: Some(TimestampColumns::default()),
        }
    }

    /// A new entity with no snapshot; every attribute is dirty.
    #[must_use]
    pub fn fresh(attributes: Record) -> Self {
        Self {
            original: Record::new(),
            ..Self::loaded(attributes)
        }
    }

    #[must_use]
    pub fn with_fillable<I, S>(mut self, columns: I) -> Self
    where
        I: IntoIterator<Item = S>,
        S: Into<String>,
    {
        self.fillable = columns.into_iter().map(Into::into).collect();
        self
    }

    #[must_use]
    pub fn with_guarded<I, S>(mut self, columns: I) -> Self
    where
        I: IntoIterator<Item = S>,
        S: Into<String>,
    {
        self.guarded = columns.into_iter().map(Into::into).collect();
        self
    }

    /// Set or clear the timestamp columns this entity maintains.
    #[must_use]
    pub fn with_timestamps(mut self, timestamps: Option<TimestampColumns>) -> Self {
        self.timestamps = timestamps;
        self
    }

    /// Assign an attribute.
    pub fn set(&mut self, name: impl Into<String>, value: impl Into<Value>) {
        self.attributes.insert(name, value);
    }

    /// Read an attribute.
    pub fn get(&self, name: &str) -> Option<&Value> {
        self.attributes.get(name)
    }

    /// The snapshot taken at load time.
    pub fn original(&self) -> &Record {
        &self.original
    }

    /// Names of all dirty attributes, in attribute order.
    pub fn dirty_fields(&self) -> Vec<&str> {
        self.attributes
            .names()
            .filter(|name| self.is_dirty(name))
            .collect()
    }

    /// Accept the current attributes as the new snapshot.
    pub fn sync_original(&mut self) {
        self.original = self.attributes.clone();
    }
}

impl Entity for TrackedEntity {
    fn attributes(&self) -> Record {
        self.attributes.clone()
    }

    fn is_dirty(&self, field: &str) -> bool {
        match (self.attributes.get(field), self.original.get(field)) {
            (Some(current), Some(original)) => current != original,
            (Some(_), None) => true,
            (None, _) => false,
        }
    }

    fn fillable(&self) -> &[String] {
        &self.fillable
    }

    fn guarded(&self) -> &[String] {
        &self.guarded
    }

    fn timestamp_columns(&self) -> Option<TimestampColumns> {
        self.timestamps.clone()
    }
}

/// One input row of a bulk call.
#[derive(Debug)]
pub enum BulkRow {
    /// A plain column map; every present column is written.
    Plain(Record),
    /// An entity; updates only write its dirty columns.
    Entity(Box<dyn Entity>),
}

impl BulkRow {
    /// Flat attribute map of the row.
    pub fn attributes(&self) -> Record {
        match self {
            BulkRow::Plain(record) => record.clone(),
            BulkRow::Entity(entity) => entity.attributes(),
        }
    }

    /// Whether this row is an entity.
    pub fn is_entity(&self) -> bool {
        matches!(self, BulkRow::Entity(_))
    }
}

impl From<Record> for BulkRow {
    fn from(record: Record) -> Self {
        BulkRow::Plain(record)
    }
}

impl From<TrackedEntity> for BulkRow {
    fn from(entity: TrackedEntity) -> Self {
        BulkRow::Entity(Box::new(entity))
    }
}

impl From<Box<dyn Entity>> for BulkRow {
    fn from(entity: Box<dyn Entity>) -> Self {
        BulkRow::Entity(entity)
    }
}
