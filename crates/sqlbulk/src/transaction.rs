//! Statement execution inside one transaction.
//!
//! A bulk call opens exactly one transaction, issues its chunk statements in
//! order, and commits only if every one of them succeeded. Any other outcome
//! (error, cancellation, panic) rolls the whole call back.

use asupersync::{Cx, Outcome};
use sqlbulk_core::{Error, Row, StatementError, TransactionOps};

/// Wrap a driver error with the position and text of the failing statement.
pub(crate) fn statement_error(index: usize, total: usize, sql: &str, source: Error) -> Error {
    Error::Statement(StatementError {
        index: index + 1,
        total,
        sql: sql.to_string(),
        source: Box::new(source),
    })
}

/// Execute `statements` sequentially, summing affected rows.
///
/// Stops at the first statement that does not succeed.
#[tracing::instrument(level = "debug", skip(cx, tx, statements))]
pub(crate) async fn execute_all<T: TransactionOps>(
    cx: &Cx,
    tx: &T,
    statements: &[String],
) -> Outcome<u64, Error> {
    let total = statements.len();
    let mut affected = 0_u64;

    for (index, sql) in statements.iter().enumerate() {
        tracing::debug!(statement = index + 1, total, "Executing chunk statement");
        tracing::trace!(sql = %sql, "Chunk SQL");

        match tx.execute(cx, sql, &[]).await {
            Outcome::Ok(count) => affected += count,
            Outcome::Err(e) => {
                tracing::debug!(statement = index + 1, error = %e, "Chunk statement failed");
                return Outcome::Err(statement_error(index, total, sql, e));
            }
            Outcome::Cancelled(r) => return Outcome::Cancelled(r),
            Outcome::Panicked(p) => return Outcome::Panicked(p),
        }
    }

    Outcome::Ok(affected)
}

/// Run a query inside the transaction.
pub(crate) async fn query<T: TransactionOps>(
    cx: &Cx,
    tx: &T,
    sql: &str,
) -> Outcome<Vec<Row>, Error> {
    tracing::trace!(sql = %sql, "Bulk query");
    tx.query(cx, sql, &[]).await
}

/// Commit if `outcome` succeeded, otherwise roll back and hand the outcome on.
pub(crate) async fn finish<T: TransactionOps, R>(
    cx: &Cx,
    tx: T,
    outcome: Outcome<R, Error>,
) -> Outcome<R, Error> {
    match outcome {
        Outcome::Ok(value) => match tx.commit(cx).await {
            Outcome::Ok(()) => {
                tracing::debug!("Bulk transaction committed");
                Outcome::Ok(value)
            }
            Outcome::Err(e) => Outcome::Err(e),
            Outcome::Cancelled(r) => Outcome::Cancelled(r),
            Outcome::Panicked(p) => Outcome::Panicked(p),
        },
        failed => {
            rollback(cx, tx).await;
            failed
        }
    }
}

async fn rollback<T: TransactionOps>(cx: &Cx, tx: T) {
    match tx.rollback(cx).await {
        Outcome::Ok(()) => tracing::debug!("Bulk transaction rolled back"),
        Outcome::Err(e) => tracing::warn!(error = %e, "Rollback after failed bulk write failed"),
        Outcome::Cancelled(_) => tracing::warn!("Rollback after failed bulk write was cancelled"),
        Outcome::Panicked(_) => tracing::warn!("Rollback after failed bulk write panicked"),
    }
}
