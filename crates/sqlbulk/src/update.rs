//! Bulk `UPDATE ... CASE WHEN` statements.
//!
//! Many rows are updated with one statement per chunk: every written column
//! gets a `CASE` expression with one `WHEN <key match> THEN <value>` branch
//! per row, falling back to the column's current value.
//!
//! ```text
//! UPDATE `users` SET
//!     `name` = CASE WHEN `id` = '1' THEN 'a' WHEN `id` = '2' THEN 'b' ELSE `name` END
//! WHERE `id` IN ('1','2')
//! ```

use crate::chunk::ChunkSize;
use crate::columns::ColumnSet;
use crate::entity::BulkRow;
use crate::key::KeySpec;
use crate::literal::render_literal;
use crate::normalize::{self, UpdateRow};
use crate::timestamp::DEFAULT_UPDATED_AT;
use crate::transaction;
use asupersync::{Cx, Outcome};
use chrono::{DateTime, Utc};
use serde::Serialize;
use sqlbulk_core::{Connection, Error, Result, quote_ident, quote_qualified};
use std::collections::HashSet;

/// Summary of a bulk update.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize)]
pub struct UpdateReport {
    /// Input rows.
    pub rows: usize,
    /// Chunks the input was split into.
    pub chunks: usize,
    /// Statements issued (chunks minus skipped chunks).
    pub statements: usize,
    /// Chunks with nothing to write.
    pub skipped_chunks: usize,
    /// Rows the driver reported as affected.
    pub affected: u64,
}

/// Statements for one call, plus how the input was chunked.
#[derive(Debug)]
struct UpdatePlan {
    statements: Vec<String>,
    chunks: usize,
}

/// Builder for bulk updates of one table.
#[derive(Debug, Clone)]
pub struct BulkUpdate {
    table: String,
    key: KeySpec,
    columns: Option<ColumnSet>,
    updated_at: Option<String>,
    chunk_size: usize,
}

impl BulkUpdate {
    /// Update rows of `table`, keyed by `id`, stamping `updated_at`.
    pub fn new(table: impl Into<String>) -> Self {
        Self {
            table: table.into(),
            key: KeySpec::default(),
            columns: None,
            updated_at: Some(DEFAULT_UPDATED_AT.to_string()),
            chunk_size: ChunkSize::default().get(),
        }
    }

    /// Set the key column(s) used to match rows.
    pub fn key(mut self, key: impl Into<KeySpec>) -> Self {
        self.key = key.into();
        self
    }

    /// Only write these columns. An empty list means "infer from the rows".
    pub fn columns<I, S>(mut self, columns: I) -> Self
    where
        I: IntoIterator<Item = S>,
        S: Into<String>,
    {
        let columns = ColumnSet::explicit(columns);
        self.columns = (!columns.is_empty()).then_some(columns);
        self
    }

    /// Set the update timestamp column, or disable stamping with `None`.
    pub fn updated_at_column(mut self, column: Option<&str>) -> Self {
        self.updated_at = column.map(str::to_string);
        self
    }

    /// Maximum rows per statement.
    pub fn chunk_size(mut self, rows: usize) -> Self {
        self.chunk_size = rows;
        self
    }

    pub fn table(&self) -> &str {
        &self.table
    }

    #[allow(clippy::result_large_err)]
    fn validate(&self) -> Result<ChunkSize> {
        if self.table.is_empty() {
            return Err(Error::config("bulk update needs a table name"));
        }
        self.key.validate()?;
        if self.updated_at.as_deref() == Some("") {
            return Err(Error::config("updated-at column name must not be empty"));
        }
        ChunkSize::new(self.chunk_size)
    }

    /// The columns this update may write for `rows`.
    ///
    /// Either the explicit list or the union of every row's columns, with the
    /// updated-at column appended when stamping is on. Key columns are part of
    /// the set but never assigned.
    pub fn resolve_columns(&self, rows: &[BulkRow]) -> ColumnSet {
        let columns = match &self.columns {
            Some(columns) => columns.clone(),
            None => {
                let records: Vec<_> = rows.iter().map(BulkRow::attributes).collect();
                ColumnSet::infer(&records)
            }
        };
        match &self.updated_at {
            Some(column) => columns.with_column(column.as_str()),
            None => columns,
        }
    }

    /// Generate the statements for `rows`, stamping with `now`.
    ///
    /// Pure: the same rows and instant always give the same SQL. Chunks with
    /// nothing to write produce no statement.
    #[allow(clippy::result_large_err)]
    pub fn build(&self, rows: &[BulkRow], now: DateTime<Utc>) -> Result<Vec<String>> {
        self.plan(rows, now).map(|plan| plan.statements)
    }

    #[allow(clippy::result_large_err)]
    fn plan(&self, rows: &[BulkRow], now: DateTime<Utc>) -> Result<UpdatePlan> {
        let chunk_size = self.validate()?;
        if rows.is_empty() {
            return Ok(UpdatePlan {
                statements: Vec::new(),
                chunks: 0,
            });
        }

        let columns = self.resolve_columns(rows);
        let normalized = normalize::update_rows(rows, self.updated_at.as_deref(), now)?;

        let mut statements = Vec::new();
        let mut chunks = 0;
        for (index, chunk) in chunk_size.split(&normalized).enumerate() {
            chunks += 1;
            match self.chunk_sql(&columns, chunk)? {
                Some(sql) => statements.push(sql),
                None => tracing::warn!(
                    table = %self.table,
                    chunk = index + 1,
                    rows = chunk.len(),
                    "Skipping update chunk with nothing to write"
                ),
            }
        }

        Ok(UpdatePlan { statements, chunks })
    }

    #[allow(clippy::result_large_err)]
    fn chunk_sql(&self, columns: &ColumnSet, chunk: &[UpdateRow]) -> Result<Option<String>> {
        let predicates = chunk
            .iter()
            .map(|row| self.key.predicate(&row.record))
            .collect::<Result<Vec<_>>>()?;

        let mut assignments = Vec::new();
        for column in columns.iter().filter(|c| !self.key.contains(c)) {
            let mut branches = Vec::new();
            for (row, predicate) in chunk.iter().zip(&predicates) {
                let (Some(value), Some(predicate)) = (row.assignment(column), predicate) else {
                    continue;
                };
                branches.push(format!("WHEN {} THEN {}", predicate, render_literal(value)?));
            }
            if branches.is_empty() {
                continue;
            }
            let ident = quote_ident(column);
            assignments.push(format!(
                "{} = CASE {} ELSE {} END",
                ident,
                branches.join(" "),
                ident
            ));
        }

        if assignments.is_empty() {
            return Ok(None);
        }

        let first_key = self.key.first();
        let mut seen = HashSet::with_capacity(chunk.len());
        let mut keys: Vec<String> = Vec::with_capacity(chunk.len());
        for row in chunk {
            if let Some(value) = row.record.get(first_key).filter(|v| !v.is_null()) {
                let literal = render_literal(value)?;
                if seen.insert(literal.clone()) {
                    keys.push(literal);
                }
            }
        }

        Ok(Some(format!(
            "UPDATE {} SET {} WHERE {} IN ({})",
            quote_qualified(&self.table),
            assignments.join(", "),
            quote_ident(first_key),
            keys.join(",")
        )))
    }

    /// Update `rows` through `conn` in one transaction.
    ///
    /// The instant used for `updated_at` is captured once. All SQL is built
    /// before the transaction opens, so invalid input (for example an
    /// unparseable timestamp) fails without touching the database. Empty input
    /// is a successful no-op.
    #[tracing::instrument(level = "debug", skip(self, cx, conn, rows), fields(table = %self.table))]
    pub async fn execute<C, I>(self, cx: &Cx, conn: &C, rows: I) -> Outcome<UpdateReport, Error>
    where
        C: Connection,
        I: IntoIterator,
        I::Item: Into<BulkRow>,
    {
        let rows: Vec<BulkRow> = rows.into_iter().map(Into::into).collect();
        let start = std::time::Instant::now();
        tracing::info!(table = %self.table, rows = rows.len(), "Starting bulk update");

        let plan = match self.plan(&rows, Utc::now()) {
            Ok(plan) => plan,
            Err(e) => return Outcome::Err(e),
        };

        let mut report = UpdateReport {
            rows: rows.len(),
            chunks: plan.chunks,
            statements: plan.statements.len(),
            skipped_chunks: plan.chunks - plan.statements.len(),
            affected: 0,
        };

        if plan.statements.is_empty() {
            tracing::info!(table = %self.table, "Bulk update has nothing to write");
            return Outcome::Ok(report);
        }

        let tx = match conn.begin(cx).await {
            Outcome::Ok(tx) => tx,
            Outcome::Err(e) => return Outcome::Err(e),
            Outcome::Cancelled(r) => return Outcome::Cancelled(r),
            Outcome::Panicked(p) => return Outcome::Panicked(p),
        };

        let outcome = transaction::execute_all(cx, &tx, &plan.statements).await;
        match transaction::finish(cx, tx, outcome).await {
            Outcome::Ok(affected) => report.affected = affected,
            Outcome::Err(e) => return Outcome::Err(e),
            Outcome::Cancelled(r) => return Outcome::Cancelled(r),
            Outcome::Panicked(p) => return Outcome::Panicked(p),
        }

        tracing::info!(
            table = %self.table,
            statements = report.statements,
            affected = report.affected,
            elapsed_ms = start.elapsed().as_millis(),
            "Bulk update complete"
        );
        Outcome::Ok(report)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::entity::TrackedEntity;
    use crate::record::Record;
    use chrono::TimeZone;
    use sqlbulk_core::Value;

    fn now() -> DateTime<Utc> {
        Utc.with_ymd_and_hms(2024, 1, 2, 3, 4, 5).unwrap()
    }

    fn plain(rows: Vec<Record>) -> Vec<BulkRow> {
        rows.into_iter().map(BulkRow::from).collect()
    }

    #[test]
    fn single_key_statement() {
        let rows = plain(vec![
            Record::new().with("id", 1_i64).with("name", "a"),
            Record::new().with("id", 2_i64).with("name", "b"),
        ]);
        let sql = BulkUpdate::new("users")
            .updated_at_column(None)
            .build(&rows, now())
            .unwrap();

        assert_eq!(
            sql,
            vec![
                "UPDATE `users` SET `name` = CASE WHEN `id` = '1' THEN 'a' \
                 WHEN `id` = '2' THEN 'b' ELSE `name` END WHERE `id` IN ('1','2')"
                    .to_string()
            ]
        );
    }

    #[test]
    fn updated_at_is_appended_and_stamped() {
        let rows = plain(vec![Record::new().with("id", 1_i64).with("name", "a")]);
        let sql = BulkUpdate::new("users").build(&rows, now()).unwrap();
        assert_eq!(
            sql[0],
            "UPDATE `users` SET `name` = CASE WHEN `id` = '1' THEN 'a' ELSE `name` END, \
             `updated_at` = CASE WHEN `id` = '1' THEN '2024-01-02 03:04:05' ELSE `updated_at` END \
             WHERE `id` IN ('1')"
        );
    }

    #[test]
    fn composite_key_branches() {
        let rows = plain(vec![
            Record::new().with("a", 1_i64).with("b", 1_i64).with("v", "x"),
            Record::new().with("a", 1_i64).with("b", 2_i64).with("v", "y"),
        ]);
        let sql = BulkUpdate::new("pairs")
            .key(KeySpec::composite(["a", "b"]).unwrap())
            .updated_at_column(None)
            .build(&rows, now())
            .unwrap();
        assert_eq!(
            sql[0],
            "UPDATE `pairs` SET `v` = CASE WHEN `a` = '1' AND `b` = '1' THEN 'x' \
             WHEN `a` = '1' AND `b` = '2' THEN 'y' ELSE `v` END WHERE `a` IN ('1')"
        );
    }

    #[test]
    fn where_keys_are_distinct_in_first_seen_order() {
        let rows = plain(vec![
            Record::new().with("g", 3_i64).with("n", 5_i64).with("v", "a"),
            Record::new().with("g", 1_i64).with("n", 6_i64).with("v", "b"),
            Record::new().with("g", 3_i64).with("n", 7_i64).with("v", "c"),
            Record::new().with("g", 1_i64).with("n", 8_i64).with("v", "d"),
        ]);
        let sql = BulkUpdate::new("t")
            .key(KeySpec::composite(["g", "n"]).unwrap())
            .updated_at_column(None)
            .build(&rows, now())
            .unwrap();
        assert!(sql[0].ends_with("WHERE `g` IN ('3','1')"), "{}", sql[0]);
    }

    #[test]
    fn null_renders_bare() {
        let rows = plain(vec![
            Record::new().with("id", 1_i64).with("deleted_at", Value::Null),
        ]);
        let sql = BulkUpdate::new("t")
            .updated_at_column(None)
            .build(&rows, now())
            .unwrap();
        assert!(sql[0].contains("THEN NULL ELSE"));
        assert!(!sql[0].contains("'NULL'"));
    }

    #[test]
    fn row_without_key_is_left_out() {
        let rows = plain(vec![
            Record::new().with("id", 1_i64).with("name", "a"),
            Record::new().with("name", "orphan"),
            Record::new().with("id", Value::Null).with("name", "null key"),
        ]);
        let sql = BulkUpdate::new("t")
            .updated_at_column(None)
            .build(&rows, now())
            .unwrap();
        assert!(!sql[0].contains("orphan"));
        assert!(!sql[0].contains("null key"));
        assert!(sql[0].ends_with("WHERE `id` IN ('1')"));
    }

    #[test]
    fn explicit_columns_limit_the_set() {
        let rows = plain(vec![
            Record::new()
                .with("id", 1_i64)
                .with("name", "a")
                .with("email", "e"),
        ]);
        let update = BulkUpdate::new("t").columns(["email"]);
        assert_eq!(
            update.resolve_columns(&rows).iter().collect::<Vec<_>>(),
            vec!["email", "updated_at"]
        );
        let sql = update.build(&rows, now()).unwrap();
        assert!(!sql[0].contains("`name`"));
    }

    #[test]
    fn clean_entity_fields_are_not_written() {
        let mut entity = TrackedEntity::loaded(
            Record::new()
                .with("id", 1_i64)
                .with("name", "a")
                .with("email", "e")
                .with("updated_at", "2023-01-01 00:00:00"),
        );
        entity.set("name", "b");

        let sql = BulkUpdate::new("users")
            .build(&[BulkRow::from(entity)], now())
            .unwrap();
        assert_eq!(
            sql[0],
            "UPDATE `users` SET `name` = CASE WHEN `id` = '1' THEN 'b' ELSE `name` END \
             WHERE `id` IN ('1')"
        );
    }

    #[test]
    fn chunk_with_nothing_to_write_is_skipped() {
        let entity = TrackedEntity::loaded(
            Record::new()
                .with("id", 1_i64)
                .with("name", "a")
                .with("updated_at", "2023-01-01 00:00:00"),
        );
        let plan = BulkUpdate::new("users")
            .plan(&[BulkRow::from(entity)], now())
            .unwrap();
        assert!(plan.statements.is_empty());
        assert_eq!(plan.chunks, 1);
    }

    #[test]
    fn chunking_splits_statements() {
        let rows = plain(
            (0..5_i64)
                .map(|i| Record::new().with("id", i).with("n", i))
                .collect(),
        );
        let sql = BulkUpdate::new("t")
            .updated_at_column(None)
            .chunk_size(2)
            .build(&rows, now())
            .unwrap();
        assert_eq!(sql.len(), 3);
        assert!(sql[2].ends_with("WHERE `id` IN ('4')"));
    }

    #[test]
    fn same_input_gives_same_sql() {
        let rows = plain(vec![Record::new().with("id", 1_i64).with("name", "a")]);
        let update = BulkUpdate::new("t");
        assert_eq!(update.build(&rows, now()).unwrap(), update.build(&rows, now()).unwrap());
    }

    #[test]
    fn invalid_configuration() {
        let rows = plain(vec![Record::new().with("id", 1_i64)]);
        assert!(BulkUpdate::new("").build(&rows, now()).is_err());
        assert!(BulkUpdate::new("t").chunk_size(0).build(&rows, now()).is_err());
        assert!(BulkUpdate::new("t").key("").build(&rows, now()).is_err());
        assert!(
            BulkUpdate::new("t")
                .updated_at_column(Some(""))
                .build(&rows, now())
                .is_err()
        );
    }

    #[test]
    fn empty_input_builds_nothing() {
        assert!(BulkUpdate::new("t").build(&[], now()).unwrap().is_empty());
    }

    #[test]
    fn qualified_table_name() {
        let rows = plain(vec![Record::new().with("id", 1_i64).with("n", 1_i64)]);
        let sql = BulkUpdate::new("app.users")
            .updated_at_column(None)
            .build(&rows, now())
            .unwrap();
        assert!(sql[0].starts_with("UPDATE `app`.`users` SET"));
    }
}
