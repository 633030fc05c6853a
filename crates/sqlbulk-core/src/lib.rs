//! Core types and traits for sqlbulk.
//!
//! `sqlbulk-core` is the **foundation layer** of the bulk-write engine. It defines the
//! data types and the driver contract the engine is written against.
//!
//! # Role In The Architecture
//!
//! - **Contract layer**: `Connection` and `TransactionOps` are the only capabilities
//!   the engine needs from a database driver: run a statement, run a query, and
//!   scope both inside a transaction.
//! - **Data model**: `Value` and `Row` represent statement inputs and query outputs.
//! - **Structured concurrency**: re-exports `Cx` and `Outcome` from asupersync so every
//!   database round-trip is cancel-correct and budget-aware.
//!
//! Most applications should use the `sqlbulk` crate, which re-exports everything here.

// Re-export asupersync primitives for structured concurrency
pub use asupersync::{Cx, Outcome};

pub mod connection;
pub mod error;
pub mod identifiers;
pub mod row;
pub mod value;

pub use connection::{Connection, TransactionOps};
pub use error::{
    ConfigError, ConnectionError, ConnectionErrorKind, Error, QueryError, QueryErrorKind, Result,
    StatementError, TimestampError, TransactionError, TransactionErrorKind, TypeError,
};
pub use identifiers::{quote_ident, quote_qualified};
pub use row::Row;
pub use value::Value;
