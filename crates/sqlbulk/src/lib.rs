//! sqlbulk - bulk writes for SQL databases with a minimal number of statements.
//!
//! Two operations turn many in-memory rows into few statements:
//!
//! - [`BulkUpdate`] writes different values to many rows with one
//!   `UPDATE ... SET col = CASE WHEN <key> THEN <value> ... END` per chunk.
//! - [`BulkInsert`] writes one multi-row `INSERT` per chunk and can read the
//!   inserted rows back.
//!
//! Rows are plain [`Record`]s or [`Entity`] objects (see [`TrackedEntity`]);
//! entity updates only write dirty columns. Created/updated timestamps are
//! filled from one instant captured per call, and every chunk of a call runs
//! inside one transaction: either all rows are written or none are.
//!
//! # Quick Start
//!
//! ```ignore
//! use sqlbulk::prelude::*;
//!
//! async fn example(cx: &Cx, conn: &impl Connection) {
//!     let rows = vec![
//!         Record::new().with("id", 1_i64).with("name", "Alice"),
//!         Record::new().with("id", 2_i64).with("name", "Bob"),
//!     ];
//!     let report = BulkUpdate::new("users").execute(cx, conn, rows).await;
//!
//!     let new_rows = vec![Record::new().with("name", "Carol")];
//!     let inserted = BulkInsert::new("users")
//!         .returning("id")
//!         .execute(cx, conn, new_rows)
//!         .await;
//! }
//! ```
//!
//! SQL is built as text with inline literals; every value goes through
//! [`render_literal`] and every identifier through [`quote_ident`]. The pure
//! `build` methods expose the exact statements for a given instant.

pub mod chunk;
pub mod columns;
pub mod entity;
pub mod insert;
pub mod key;
pub mod literal;
mod normalize;
pub mod record;
pub mod timestamp;
mod transaction;
pub mod update;

pub use sqlbulk_core::{
    ConfigError, Connection, ConnectionError, ConnectionErrorKind, Cx, Error, Outcome,
    QueryError, QueryErrorKind, Result, Row, StatementError, TimestampError, TransactionError,
    TransactionErrorKind, TransactionOps, TypeError, Value, quote_ident, quote_qualified,
};

pub use chunk::{ChunkSize, DEFAULT_CHUNK_SIZE};
pub use columns::ColumnSet;
pub use entity::{BulkRow, Entity, TrackedEntity};
pub use insert::{BulkInsert, InsertOutput};
pub use key::{DEFAULT_KEY, KeySpec};
pub use literal::{escape_str, render_literal};
pub use record::Record;
pub use timestamp::{TimestampColumns, instant_value, parse_timestamp};
pub use update::{BulkUpdate, UpdateReport};

/// Everything needed for typical bulk writes.
pub mod prelude {
    pub use crate::{
        BulkInsert, BulkRow, BulkUpdate, Connection, Cx, Entity, Error, InsertOutput, KeySpec,
        Outcome, Record, Result, Row, TimestampColumns, TrackedEntity, UpdateReport, Value,
    };
}
