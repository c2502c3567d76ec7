//! Connection provider boundary.
//!
//! The engine only needs a handful of operations from a database: a row
//! cursor, a one-shot execute, and a transaction that can prepare a
//! statement and run it repeatedly. They are split across:
//! - `mod.rs` - the `Connection` / `Transaction` traits
//! - `backend.rs` - `SqlxConnection`, chosen by URL scheme
//! - `postgres.rs` / `sqlite.rs` - native sqlx pools, binding and decoding
//! - `codec.rs` - conversions both backends share

mod backend;
mod codec;
mod postgres;
mod sqlite;

pub use backend::SqlxConnection;
pub use postgres::{PostgresBackend, PostgresTransaction};
pub use sqlite::{SqliteBackend, SqliteTransaction};

use crate::column::ColumnType;
use crate::dialect::Dialect;
use crate::error::RowmapResult;
use crate::value::Value;
use async_trait::async_trait;
use futures::stream::BoxStream;

/// Stream of decoded rows, one `Value` per selected column.
pub type RowStream<'a> = BoxStream<'a, RowmapResult<Vec<Value>>>;

/// Outcome of an executed statement.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct ExecResult {
    pub rows_affected: u64,
    pub last_insert_id: Option<i64>,
}

/// Handle to a statement prepared inside a [`Transaction`].
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Prepared {
    id: usize,
    sql: String,
}

impl Prepared {
    pub fn new(id: usize, sql: impl Into<String>) -> Self {
        Self { id, sql: sql.into() }
    }

    /// Position of the statement within its transaction.
    pub fn id(&self) -> usize {
        self.id
    }

    pub fn sql(&self) -> &str {
        &self.sql
    }
}

/// A live database connection (or pool).
#[async_trait]
pub trait Connection: Send + Sync {
    /// Dialect used to resolve column types for DDL.
    fn dialect(&self) -> Dialect;

    /// Run a query and stream its rows, decoding column `i` as `types[i]`.
    fn query<'a>(&'a self, sql: &'a str, args: &'a [Value], types: &'a [ColumnType]) -> RowStream<'a>;

    /// Execute a statement that returns no rows.
    async fn execute(&self, sql: &str, args: &[Value]) -> RowmapResult<ExecResult>;

    /// Open a transaction.
    async fn begin(&self) -> RowmapResult<Box<dyn Transaction>>;
}

/// An open transaction.
///
/// Dropping it without `commit` leaves the outcome to the driver
/// (sqlx rolls back).
#[async_trait]
pub trait Transaction: Send {
    /// Prepare `sql` once for repeated execution.
    async fn prepare(&mut self, sql: &str) -> RowmapResult<Prepared>;

    /// Execute a prepared statement with one set of parameters.
    async fn execute_prepared(&mut self, stmt: &Prepared, args: &[Value]) -> RowmapResult<ExecResult>;

    async fn commit(self: Box<Self>) -> RowmapResult<()>;

    async fn rollback(self: Box<Self>) -> RowmapResult<()>;
}
