//! Key columns identifying the rows of a bulk update.

use crate::literal::render_literal;
use crate::record::Record;
use sqlbulk_core::{Error, Result, quote_ident};

/// Default key column.
pub const DEFAULT_KEY: &str = "id";

/// One or more key columns.
///
/// A single key matches rows with `` `k` = 'v' ``; a composite key joins one
/// equality per column with `AND`.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct KeySpec {
    columns: Vec<String>,
}

impl KeySpec {
    /// A single-column key.
    pub fn single(column: impl Into<String>) -> Self {
        Self {
            columns: vec![column.into()],
        }
    }

    /// A composite key. Fails when no column is given.
    #[allow(clippy::result_large_err)]
    pub fn composite<I, S>(columns: I) -> Result<Self>
    where
        I: IntoIterator<Item = S>,
        S: Into<String>,
    {
        let columns: Vec<String> = columns.into_iter().map(Into::into).collect();
        if columns.is_empty() {
            return Err(Error::config("key must name at least one column"));
        }
        Ok(Self { columns })
    }

    /// All key columns in order.
    pub fn columns(&self) -> &[String] {
        &self.columns
    }

    /// The first key column; the only one used in `WHERE ... IN`.
    pub fn first(&self) -> &str {
        self.columns.first().map_or("", String::as_str)
    }

    pub fn is_composite(&self) -> bool {
        self.columns.len() > 1
    }

    pub fn contains(&self, column: &str) -> bool {
        self.columns.iter().any(|c| c == column)
    }

    #[allow(clippy::result_large_err)]
    pub(crate) fn validate(&self) -> Result<()> {
        if self.columns.is_empty() {
            return Err(Error::config("key must name at least one column"));
        }
        if self.columns.iter().any(String::is_empty) {
            return Err(Error::config("key column names must not be empty"));
        }
        Ok(())
    }

    /// Render the match predicate for `row`.
    ///
    /// Returns `None` when the row lacks a key column or holds NULL in one;
    /// such a row cannot be matched and is left out of the statement.
    #[allow(clippy::result_large_err)]
    pub fn predicate(&self, row: &Record) -> Result<Option<String>> {
        let mut parts = Vec::with_capacity(self.columns.len());
        for column in &self.columns {
            match row.get(column) {
                Some(value) if !value.is_null() => {
                    parts.push(format!("{} = {}", quote_ident(column), render_literal(value)?));
                }
                _ => return Ok(None),
            }
        }
        Ok(Some(parts.join(" AND ")))
    }
}

impl Default for KeySpec {
    fn default() -> Self {
        Self::single(DEFAULT_KEY)
    }
}

impl From<&str> for KeySpec {
    fn from(column: &str) -> Self {
        Self::single(column)
    }
}

impl From<String> for KeySpec {
    fn from(column: String) -> Self {
        Self::single(column)
    }
}
