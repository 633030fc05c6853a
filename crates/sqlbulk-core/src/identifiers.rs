//! SQL identifier quoting.
//!
//! Bulk statements use a single quoting convention: MySQL-style backticks
//! around every table and column name.

/// Quote a SQL identifier with backticks.
///
/// Embedded backticks are escaped by doubling them (`` ` `` → ``` `` ```).
/// This function is safe against SQL injection for any input string.
///
/// # Examples
///
/// ```
/// use sqlbulk_core::quote_ident;
///
/// assert_eq!(quote_ident("users"), "`users`");
/// assert_eq!(quote_ident("user`name"), "`user``name`");
/// ```
#[inline]
pub fn quote_ident(name: &str) -> String {
    format!("`{}`", name.replace('`', "``"))
}

/// Quote a possibly schema-qualified table name (`schema.table`).
///
/// Each dot-separated segment is quoted on its own, so `app.users`
/// becomes `` `app`.`users` ``. Names without a dot quote exactly like
/// [`quote_ident`].
pub fn quote_qualified(name: &str) -> String {
    name.split('.')
        .map(quote_ident)
        .collect::<Vec<_>>()
        .join(".")
}
