//! Chunked multi-row `INSERT` statements.

use crate::chunk::ChunkSize;
use crate::columns::ColumnSet;
use crate::entity::BulkRow;
use crate::key::DEFAULT_KEY;
use crate::literal::render_literal;
use crate::normalize;
use crate::record::Record;
use crate::timestamp::TimestampColumns;
use crate::transaction;
use asupersync::{Cx, Outcome};
use chrono::{DateTime, Utc};
use sqlbulk_core::{
    Connection, Error, Result, Row, TransactionOps, Value, quote_ident, quote_qualified,
};

/// Column alias of the `MAX(key)` probe.
const AGGREGATE: &str = "aggregate";

/// Result of a bulk insert.
#[derive(Debug, Clone)]
pub enum InsertOutput {
    /// Number of rows inserted.
    Count(u64),
    /// The inserted rows, read back in key order.
    Rows(Vec<Row>),
}

impl InsertOutput {
    /// Number of rows this output describes.
    pub fn len(&self) -> u64 {
        match self {
            InsertOutput::Count(n) => *n,
            InsertOutput::Rows(rows) => rows.len() as u64,
        }
    }

    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }

    /// The returned rows, when the insert was asked to return them.
    pub fn into_rows(self) -> Option<Vec<Row>> {
        match self {
            InsertOutput::Rows(rows) => Some(rows),
            InsertOutput::Count(_) => None,
        }
    }
}

/// Builder for bulk inserts into one table.
///
/// By default the configured `created_at`/`updated_at` columns are filled in
/// and the call returns the number of rows inserted.
///
/// # Returning inserted rows
///
/// With [`returning`](Self::returning) the call reads `MAX(key)` before
/// inserting and selects every row with a greater key afterwards, all inside
/// the same transaction. This is only correct when the key is a monotonically
/// increasing surrogate key and no other writer inserts into the table
/// between the probe and the final select.
#[derive(Debug, Clone)]
pub struct BulkInsert {
    table: String,
    returning: Option<String>,
    timestamps: bool,
    timestamp_columns: TimestampColumns,
    chunk_size: usize,
}

impl BulkInsert {
    pub fn new(table: impl Into<String>) -> Self {
        Self {
            table: table.into(),
            returning: None,
            timestamps: true,
            timestamp_columns: TimestampColumns::default(),
            chunk_size: ChunkSize::default().get(),
        }
    }

    /// Return the inserted rows, identified through `key` (usually `id`).
    pub fn returning(mut self, key: impl Into<String>) -> Self {
        self.returning = Some(key.into());
        self
    }

    /// Return the inserted rows, identified through `id`.
    pub fn returning_rows(self) -> Self {
        self.returning(DEFAULT_KEY)
    }

    /// Enable or disable created/updated timestamp handling.
    pub fn timestamps(mut self, enabled: bool) -> Self {
        self.timestamps = enabled;
        self
    }

    /// Column names stamped on plain records.
    pub fn timestamp_columns(mut self, columns: TimestampColumns) -> Self {
        self.timestamp_columns = columns;
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
            return Err(Error::config("bulk insert needs a table name"));
        }
        if self.returning.as_deref() == Some("") {
            return Err(Error::config("returning key column must not be empty"));
        }
        if self.timestamps && self.timestamp_columns.names().iter().any(|c| c.is_empty()) {
            return Err(Error::config("timestamp column names must not be empty"));
        }
        ChunkSize::new(self.chunk_size)
    }

    /// Flatten `rows` into the records that will be inserted.
    ///
    /// Entities contribute their fillable attributes; timestamps are filled
    /// with `now` unless a row already carries them.
    #[allow(clippy::result_large_err)]
    pub fn normalize(&self, rows: &[BulkRow], now: DateTime<Utc>) -> Result<Vec<Record>> {
        let timestamps = self.timestamps.then_some(&self.timestamp_columns);
        normalize::insert_rows(rows, timestamps, now)
    }

    /// Generate the `INSERT` statements for `rows`, stamping with `now`.
    ///
    /// Every statement uses the same column list: the union of all normalized
    /// rows' columns. A row without one of them inserts `DEFAULT` there.
    #[allow(clippy::result_large_err)]
    pub fn build(&self, rows: &[BulkRow], now: DateTime<Utc>) -> Result<Vec<String>> {
        let chunk_size = self.validate()?;
        let records = self.normalize(rows, now)?;
        self.statements(&records, chunk_size)
    }

    #[allow(clippy::result_large_err)]
    fn statements(&self, records: &[Record], chunk_size: ChunkSize) -> Result<Vec<String>> {
        if records.is_empty() {
            return Ok(Vec::new());
        }

        let columns = ColumnSet::infer(records);
        let column_list = columns
            .iter()
            .map(quote_ident)
            .collect::<Vec<_>>()
            .join(", ");
        let table = quote_qualified(&self.table);

        chunk_size
            .split(records)
            .map(|chunk| {
                let tuples = chunk
                    .iter()
                    .map(|record| {
                        let values = columns
                            .iter()
                            .map(|column| match record.get(column) {
                                Some(value) => render_literal(value),
                                None => Ok("DEFAULT".to_string()),
                            })
                            .collect::<Result<Vec<_>>>()?;
                        Ok(format!("({})", values.join(", ")))
                    })
                    .collect::<Result<Vec<_>>>()?;
                Ok(format!(
                    "INSERT INTO {} ({}) VALUES {}",
                    table,
                    column_list,
                    tuples.join(", ")
                ))
            })
            .collect()
    }

    fn max_key_sql(&self, key: &str) -> String {
        format!(
            "SELECT MAX({}) AS {} FROM {}",
            quote_ident(key),
            quote_ident(AGGREGATE),
            quote_qualified(&self.table)
        )
    }

    #[allow(clippy::result_large_err)]
    fn inserted_rows_sql(&self, key: &str, after: &Value) -> Result<String> {
        let key = quote_ident(key);
        Ok(format!(
            "SELECT * FROM {} WHERE {} > {} ORDER BY {} ASC",
            quote_qualified(&self.table),
            key,
            render_literal(after)?,
            key
        ))
    }

    /// Insert `rows` through `conn` in one transaction.
    ///
    /// All rows are normalized and all SQL is built before the transaction
    /// opens. Empty input issues no statement.
    #[tracing::instrument(level = "debug", skip(self, cx, conn, rows), fields(table = %self.table))]
    pub async fn execute<C, I>(self, cx: &Cx, conn: &C, rows: I) -> Outcome<InsertOutput, Error>
    where
        C: Connection,
        I: IntoIterator,
        I::Item: Into<BulkRow>,
    {
        let rows: Vec<BulkRow> = rows.into_iter().map(Into::into).collect();
        let start = std::time::Instant::now();
        tracing::info!(
            table = %self.table,
            rows = rows.len(),
            returning = self.returning.is_some(),
            "Starting bulk insert"
        );

        let statements = match self.build(&rows, Utc::now()) {
            Ok(statements) => statements,
            Err(e) => return Outcome::Err(e),
        };

        if statements.is_empty() {
            tracing::info!(table = %self.table, "Bulk insert has nothing to write");
            return Outcome::Ok(match self.returning {
                Some(_) => InsertOutput::Rows(Vec::new()),
                None => InsertOutput::Count(0),
            });
        }

        let tx = match conn.begin(cx).await {
            Outcome::Ok(tx) => tx,
            Outcome::Err(e) => return Outcome::Err(e),
            Outcome::Cancelled(r) => return Outcome::Cancelled(r),
            Outcome::Panicked(p) => return Outcome::Panicked(p),
        };

        let outcome = self.run(cx, &tx, &statements, rows.len() as u64).await;
        let output = match transaction::finish(cx, tx, outcome).await {
            Outcome::Ok(output) => output,
            Outcome::Err(e) => return Outcome::Err(e),
            Outcome::Cancelled(r) => return Outcome::Cancelled(r),
            Outcome::Panicked(p) => return Outcome::Panicked(p),
        };

        tracing::info!(
            table = %self.table,
            statements = statements.len(),
            inserted = rows.len(),
            elapsed_ms = start.elapsed().as_millis(),
            "Bulk insert complete"
        );
        Outcome::Ok(output)
    }

    async fn run<T: TransactionOps>(
        &self,
        cx: &Cx,
        tx: &T,
        statements: &[String],
        inserted: u64,
    ) -> Outcome<InsertOutput, Error> {
        let Some(key) = self.returning.as_deref() else {
            return match transaction::execute_all(cx, tx, statements).await {
                Outcome::Ok(_) => Outcome::Ok(InsertOutput::Count(inserted)),
                Outcome::Err(e) => Outcome::Err(e),
                Outcome::Cancelled(r) => Outcome::Cancelled(r),
                Outcome::Panicked(p) => Outcome::Panicked(p),
            };
        };

        let last_key = match transaction::query(cx, tx, &self.max_key_sql(key)).await {
            Outcome::Ok(rows) => rows
                .first()
                .and_then(|row| row.get_by_name(AGGREGATE).or_else(|| row.get(0)))
                .filter(|value| !value.is_null())
                .cloned()
                .unwrap_or(Value::BigInt(0)),
            Outcome::Err(e) => return Outcome::Err(e),
            Outcome::Cancelled(r) => return Outcome::Cancelled(r),
            Outcome::Panicked(p) => return Outcome::Panicked(p),
        };
        tracing::debug!(key, last_key = ?last_key, "Captured key before insert");

        match transaction::execute_all(cx, tx, statements).await {
            Outcome::Ok(_) => {}
            Outcome::Err(e) => return Outcome::Err(e),
            Outcome::Cancelled(r) => return Outcome::Cancelled(r),
            Outcome::Panicked(p) => return Outcome::Panicked(p),
        }

        let select = match self.inserted_rows_sql(key, &last_key) {
            Ok(sql) => sql,
            Err(e) => return Outcome::Err(e),
        };
        match transaction::query(cx, tx, &select).await {
            Outcome::Ok(rows) => Outcome::Ok(InsertOutput::Rows(rows)),
            Outcome::Err(e) => Outcome::Err(e),
            Outcome::Cancelled(r) => Outcome::Cancelled(r),
            Outcome::Panicked(p) => Outcome::Panicked(p),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::entity::TrackedEntity;
    use chrono::TimeZone;

    fn now() -> DateTime<Utc> {
        Utc.with_ymd_and_hms(2024, 1, 2, 3, 4, 5).unwrap()
    }

    fn plain(rows: Vec<Record>) -> Vec<BulkRow> {
        rows.into_iter().map(BulkRow::from).collect()
    }

    #[test]
    fn missing_columns_insert_default() {
        let rows = plain(vec![
            Record::new().with("a", 1_i64).with("b", "x"),
            Record::new().with("a", 2_i64),
        ]);
        let sql = BulkInsert::new("t")
            .timestamps(false)
            .build(&rows, now())
            .unwrap();
        assert_eq!(
            sql,
            vec!["INSERT INTO `t` (`a`, `b`) VALUES ('1', 'x'), ('2', DEFAULT)".to_string()]
        );
    }

    #[test]
    fn timestamps_are_filled() {
        let rows = plain(vec![Record::new().with("name", "a")]);
        let sql = BulkInsert::new("t").build(&rows, now()).unwrap();
        assert_eq!(
            sql[0],
            "INSERT INTO `t` (`name`, `created_at`, `updated_at`) \
             VALUES ('a', '2024-01-02 03:04:05', '2024-01-02 03:04:05')"
        );
    }

    #[test]
    fn custom_timestamp_columns() {
        let rows = plain(vec![Record::new().with("name", "a")]);
        let sql = BulkInsert::new("t")
            .timestamp_columns(TimestampColumns::new("made_at", "changed_at"))
            .build(&rows, now())
            .unwrap();
        assert!(sql[0].starts_with("INSERT INTO `t` (`name`, `made_at`, `changed_at`)"));
    }

    #[test]
    fn disabled_timestamps_never_mention_timestamp_columns() {
        let rows = plain(vec![Record::new().with("name", "a")]);
        let sql = BulkInsert::new("t")
            .timestamps(false)
            .build(&rows, now())
            .unwrap();
        assert!(!sql[0].contains("created_at"));
        assert!(!sql[0].contains("updated_at"));
    }

    #[test]
    fn unparseable_timestamp_fails_build() {
        let rows = plain(vec![Record::new().with("created_at", "soon")]);
        match BulkInsert::new("t").build(&rows, now()) {
            Err(Error::Timestamp(e)) => assert_eq!(e.column, "created_at"),
            other => panic!("expected timestamp error, got {other:?}"),
        }
    }

    #[test]
    fn entities_and_records_mix() {
        let entity = TrackedEntity::fresh(Record::new().with("name", "e").with("secret", "s"))
            .with_fillable(["name"])
            .with_timestamps(None);
        let rows = vec![
            BulkRow::from(entity),
            BulkRow::from(Record::new().with("name", "p").with("age", 3_i64)),
        ];
        let sql = BulkInsert::new("t")
            .timestamps(false)
            .build(&rows, now())
            .unwrap();
        assert_eq!(
            sql[0],
            "INSERT INTO `t` (`name`, `age`) VALUES ('e', DEFAULT), ('p', '3')"
        );
    }

    #[test]
    fn chunks_share_one_column_list() {
        let rows = plain(vec![
            Record::new().with("a", 1_i64),
            Record::new().with("b", 2_i64),
            Record::new().with("a", 3_i64),
        ]);
        let sql = BulkInsert::new("t")
            .timestamps(false)
            .chunk_size(2)
            .build(&rows, now())
            .unwrap();
        assert_eq!(sql.len(), 2);
        assert_eq!(sql[1], "INSERT INTO `t` (`a`, `b`) VALUES ('3', DEFAULT)");
    }

    #[test]
    fn returning_queries() {
        let insert = BulkInsert::new("users").returning_rows();
        assert_eq!(
            insert.max_key_sql("id"),
            "SELECT MAX(`id`) AS `aggregate` FROM `users`"
        );
        assert_eq!(
            insert.inserted_rows_sql("id", &Value::BigInt(0)).unwrap(),
            "SELECT * FROM `users` WHERE `id` > '0' ORDER BY `id` ASC"
        );
    }

    #[test]
    fn invalid_configuration() {
        let rows = plain(vec![Record::new().with("a", 1_i64)]);
        assert!(BulkInsert::new("").build(&rows, now()).is_err());
        assert!(BulkInsert::new("t").chunk_size(0).build(&rows, now()).is_err());
        assert!(BulkInsert::new("t").returning("").build(&rows, now()).is_err());
    }

    #[test]
    fn output_helpers() {
        assert_eq!(InsertOutput::Count(3).len(), 3);
        assert!(InsertOutput::Rows(Vec::new()).is_empty());
        assert!(InsertOutput::Count(1).into_rows().is_none());
    }
}
