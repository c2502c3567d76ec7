//! `Connection` over a native sqlx `SqlitePool`.
//!
//! Storage classes used per column type:
//! - every integer width as INTEGER (`u64` shares the `i64` bits)
//! - timestamps as INTEGER epoch nanoseconds
//! - dates, datetimes and decimals as TEXT, so decimal scale survives
//! - floats as REAL, booleans as INTEGER 0/1

use super::codec;
use super::{Connection, ExecResult, Prepared, RowStream, Transaction};
use crate::column::ColumnType;
use crate::dialect::Dialect;
use crate::error::{RowmapError, RowmapResult};
use crate::value::{DATE_FORMAT, DATETIME_FORMAT, Value};
use async_trait::async_trait;
use futures::StreamExt;
use rust_decimal::Decimal;
use sqlx::query::Query;
use sqlx::sqlite::{SqliteArguments, SqlitePool, SqlitePoolOptions, SqliteQueryResult, SqliteRow, SqliteStatement};
use sqlx::{Executor, Row, Sqlite, Statement, ValueRef};

type SqliteQuery<'q> = Query<'q, Sqlite, SqliteArguments<'q>>;

#[derive(Clone)]
pub struct SqliteBackend {
    pool: SqlitePool,
}

impl SqliteBackend {
    pub async fn connect(url: &str, max_connections: u32) -> RowmapResult<Self> {
        let mut options = SqlitePoolOptions::new().max_connections(max_connections.max(1));
        // Each in-memory SQLite connection is its own database; pin a single one.
        if url.contains(":memory:") {
            options = options
                .max_connections(1)
                .min_connections(1)
                .idle_timeout(None)
                .max_lifetime(None);
        }
        let pool = options.connect(url).await?;
        Ok(Self { pool })
    }

    pub fn from_pool(pool: SqlitePool) -> Self {
        Self { pool }
    }

    pub fn pool(&self) -> &SqlitePool {
        &self.pool
    }
}

#[async_trait]
impl Connection for SqliteBackend {
    fn dialect(&self) -> Dialect {
        Dialect::Sqlite
    }

    fn query<'a>(&'a self, sql: &'a str, args: &'a [Value], types: &'a [ColumnType]) -> RowStream<'a> {
        match bind_all(sqlx::query(sql), args) {
            Ok(query) => query
                .fetch(&self.pool)
                .map(move |row| decode_row(&row?, types))
                .boxed(),
            Err(e) => futures::stream::once(async move { Err(e) }).boxed(),
        }
    }

    async fn execute(&self, sql: &str, args: &[Value]) -> RowmapResult<ExecResult> {
        let result = bind_all(sqlx::query(sql), args)?.execute(&self.pool).await?;
        Ok(exec_result(&result))
    }

    async fn begin(&self) -> RowmapResult<Box<dyn Transaction>> {
        let tx = self.pool.begin().await?;
        Ok(Box::new(SqliteTransaction {
            tx,
            statements: Vec::new(),
        }))
    }
}

/// An open SQLite transaction and the statements prepared in it.
pub struct SqliteTransaction {
    tx: sqlx::Transaction<'static, Sqlite>,
    statements: Vec<SqliteStatement<'static>>,
}

#[async_trait]
impl Transaction for SqliteTransaction {
    async fn prepare(&mut self, sql: &str) -> RowmapResult<Prepared> {
        let stmt = (&mut *self.tx).prepare(sql).await?;
        self.statements.push(Statement::to_owned(&stmt));
        Ok(Prepared::new(self.statements.len() - 1, sql))
    }

    async fn execute_prepared(&mut self, stmt: &Prepared, args: &[Value]) -> RowmapResult<ExecResult> {
        let prepared = self
            .statements
            .get(stmt.id())
            .ok_or_else(|| RowmapError::Execution(format!("statement not prepared: {}", stmt.sql())))?;
        let result = bind_all(prepared.query(), args)?.execute(&mut *self.tx).await?;
        Ok(exec_result(&result))
    }

    async fn commit(self: Box<Self>) -> RowmapResult<()> {
        self.tx.commit().await?;
        Ok(())
    }

    async fn rollback(self: Box<Self>) -> RowmapResult<()> {
        self.tx.rollback().await?;
        Ok(())
    }
}

fn exec_result(result: &SqliteQueryResult) -> ExecResult {
    ExecResult {
        rows_affected: result.rows_affected(),
        last_insert_id: Some(result.last_insert_rowid()),
    }
}

fn bind_value<'q>(query: SqliteQuery<'q>, value: &Value) -> RowmapResult<SqliteQuery<'q>> {
    Ok(match value {
        Value::Null => query.bind(None::<i64>),
        Value::Blob(v) => query.bind(v.clone()),
        Value::String(v) => query.bind(v.clone()),
        Value::TinyUint(v) => query.bind(i64::from(*v)),
        Value::Uint(v) => query.bind(i64::from(*v)),
        Value::BigUint(v) => query.bind(codec::biguint_to_i64(*v)),
        Value::TinyInt(v) => query.bind(i64::from(*v)),
        Value::Int(v) => query.bind(i64::from(*v)),
        Value::BigInt(v) => query.bind(*v),
        Value::Timestamp(v) => query.bind(codec::timestamp_to_nanos(v)?),
        Value::Datetime(v) => query.bind(v.format(DATETIME_FORMAT).to_string()),
        Value::Date(v) => query.bind(v.format(DATE_FORMAT).to_string()),
        Value::Single(v) => query.bind(f64::from(*v)),
        Value::Double(v) => query.bind(*v),
        Value::Decimal(v) => query.bind(v.to_string()),
        Value::Boolean(v) => query.bind(*v),
    })
}

fn bind_all<'q>(mut query: SqliteQuery<'q>, args: &[Value]) -> RowmapResult<SqliteQuery<'q>> {
    for value in args {
        query = bind_value(query, value)?;
    }
    Ok(query)
}

fn decode_row(row: &SqliteRow, types: &[ColumnType]) -> RowmapResult<Vec<Value>> {
    codec::check_width(row.len(), types.len())?;
    types
        .iter()
        .enumerate()
        .map(|(idx, ty)| decode_value(row, idx, *ty))
        .collect()
}

fn decode_value(row: &SqliteRow, idx: usize, ty: ColumnType) -> RowmapResult<Value> {
    if row.try_get_raw(idx)?.is_null() {
        return Ok(Value::Null);
    }

    Ok(match ty {
        ColumnType::Blob => Value::Blob(row.try_get(idx)?),
        ColumnType::String => Value::String(row.try_get(idx)?),
        ColumnType::TinyUint => Value::TinyUint(codec::narrow(ty, row.try_get(idx)?)?),
        ColumnType::Uint => Value::Uint(codec::narrow(ty, row.try_get(idx)?)?),
        ColumnType::BigUint => Value::BigUint(codec::biguint_from_i64(row.try_get(idx)?)),
        ColumnType::TinyInt => Value::TinyInt(codec::narrow(ty, row.try_get(idx)?)?),
        ColumnType::Int => Value::Int(codec::narrow(ty, row.try_get(idx)?)?),
        ColumnType::BigInt => Value::BigInt(row.try_get(idx)?),
        ColumnType::Timestamp => Value::Timestamp(codec::timestamp_from_nanos(row.try_get(idx)?)),
        ColumnType::Datetime => Value::Datetime(codec::parse_datetime(&row.try_get::<String, _>(idx)?)?),
        ColumnType::Date => Value::Date(codec::parse_date(&row.try_get::<String, _>(idx)?)?),
        ColumnType::Single => Value::Single(row.try_get::<f64, _>(idx)? as f32),
        ColumnType::Double => Value::Double(row.try_get(idx)?),
        ColumnType::Decimal => Value::Decimal(decode_decimal(row, idx)?),
        ColumnType::Boolean => Value::Boolean(row.try_get(idx)?),
    })
}

// Decimals are written as TEXT. An INTEGER is still exact; a REAL is not.
fn decode_decimal(row: &SqliteRow, idx: usize) -> RowmapResult<Decimal> {
    if let Ok(text) = row.try_get::<String, _>(idx) {
        return codec::parse_decimal(&text);
    }
    match row.try_get::<i64, _>(idx) {
        Ok(v) => Ok(Decimal::from(v)),
        Err(_) => Err(RowmapError::mismatch(ColumnType::Decimal, "floating-point value")),
    }
}
