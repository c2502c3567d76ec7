//! `Connection` over a native sqlx `PgPool`.
//!
//! Every value is bound with the Rust type matching the column type the
//! Postgres dialect declares for it, so a statement prepared once keeps
//! accepting the same parameters. Timestamps are BIGINT epoch nanoseconds;
//! datetimes are TIMESTAMP and keep microsecond precision.

use super::codec;
use super::{Connection, ExecResult, Prepared, RowStream, Transaction};
use crate::column::ColumnType;
use crate::dialect::Dialect;
use crate::error::{RowmapError, RowmapResult};
use crate::value::Value;
use async_trait::async_trait;
use futures::StreamExt;
use sqlx::encode::IsNull;
use sqlx::postgres::types::Oid;
use sqlx::postgres::{
    PgArgumentBuffer, PgArguments, PgPool, PgPoolOptions, PgQueryResult, PgRow, PgStatement, PgTypeInfo,
};
use sqlx::query::Query;
use sqlx::{Encode, Executor, Postgres, Row, Statement, Type, ValueRef};

type PgQuery<'q> = Query<'q, Postgres, PgArguments>;

/// NULL sent with an unspecified type, so the server infers it from context.
struct UntypedNull;

impl Type<Postgres> for UntypedNull {
    fn type_info() -> PgTypeInfo {
        PgTypeInfo::with_oid(Oid(0))
    }
}

impl Encode<'_, Postgres> for UntypedNull {
    fn encode_by_ref(&self, _buf: &mut PgArgumentBuffer) -> IsNull {
        IsNull::Yes
    }
}

#[derive(Clone)]
pub struct PostgresBackend {
    pool: PgPool,
}

impl PostgresBackend {
    pub async fn connect(url: &str, max_connections: u32) -> RowmapResult<Self> {
        let pool = PgPoolOptions::new()
            .max_connections(max_connections.max(1))
            .connect(url)
            .await?;
        Ok(Self { pool })
    }

    pub fn from_pool(pool: PgPool) -> Self {
        Self { pool }
    }

    pub fn pool(&self) -> &PgPool {
        &self.pool
    }
}

#[async_trait]
impl Connection for PostgresBackend {
    fn dialect(&self) -> Dialect {
        Dialect::Postgres
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
        Ok(Box::new(PostgresTransaction {
            tx,
            statements: Vec::new(),
        }))
    }
}

/// An open Postgres transaction and the statements prepared in it.
pub struct PostgresTransaction {
    tx: sqlx::Transaction<'static, Postgres>,
    statements: Vec<PgStatement<'static>>,
}

#[async_trait]
impl Transaction for PostgresTransaction {
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

// Postgres has no insert id outside RETURNING.
fn exec_result(result: &PgQueryResult) -> ExecResult {
    ExecResult {
        rows_affected: result.rows_affected(),
        last_insert_id: None,
    }
}

fn bind_value<'q>(query: PgQuery<'q>, value: &Value) -> RowmapResult<PgQuery<'q>> {
    Ok(match value {
        Value::Null => query.bind(UntypedNull),
        Value::Blob(v) => query.bind(v.clone()),
        Value::String(v) => query.bind(v.clone()),
        Value::TinyUint(v) => query.bind(i16::from(*v)),
        Value::Uint(v) => query.bind(i64::from(*v)),
        Value::BigUint(v) => query.bind(codec::biguint_to_i64(*v)),
        Value::TinyInt(v) => query.bind(i16::from(*v)),
        Value::Int(v) => query.bind(*v),
        Value::BigInt(v) => query.bind(*v),
        Value::Timestamp(v) => query.bind(codec::timestamp_to_nanos(v)?),
        Value::Datetime(v) => query.bind(*v),
        Value::Date(v) => query.bind(*v),
        Value::Single(v) => query.bind(*v),
        Value::Double(v) => query.bind(*v),
        Value::Decimal(v) => query.bind(*v),
        Value::Boolean(v) => query.bind(*v),
    })
}

fn bind_all<'q>(mut query: PgQuery<'q>, args: &[Value]) -> RowmapResult<PgQuery<'q>> {
    for value in args {
        query = bind_value(query, value)?;
    }
    Ok(query)
}

fn decode_row(row: &PgRow, types: &[ColumnType]) -> RowmapResult<Vec<Value>> {
    codec::check_width(row.len(), types.len())?;
    types
        .iter()
        .enumerate()
        .map(|(idx, ty)| decode_value(row, idx, *ty))
        .collect()
}

fn decode_value(row: &PgRow, idx: usize, ty: ColumnType) -> RowmapResult<Value> {
    if row.try_get_raw(idx)?.is_null() {
        return Ok(Value::Null);
    }

    Ok(match ty {
        ColumnType::Blob => Value::Blob(row.try_get(idx)?),
        ColumnType::String => Value::String(row.try_get(idx)?),
        ColumnType::TinyUint => Value::TinyUint(codec::narrow(ty, row.try_get::<i16, _>(idx)?.into())?),
        ColumnType::Uint => Value::Uint(codec::narrow(ty, row.try_get(idx)?)?),
        ColumnType::BigUint => Value::BigUint(codec::biguint_from_i64(row.try_get(idx)?)),
        ColumnType::TinyInt => Value::TinyInt(codec::narrow(ty, row.try_get::<i16, _>(idx)?.into())?),
        ColumnType::Int => Value::Int(row.try_get(idx)?),
        ColumnType::BigInt => Value::BigInt(row.try_get(idx)?),
        ColumnType::Timestamp => Value::Timestamp(codec::timestamp_from_nanos(row.try_get(idx)?)),
        ColumnType::Datetime => Value::Datetime(row.try_get(idx)?),
        ColumnType::Date => Value::Date(row.try_get(idx)?),
        ColumnType::Single => Value::Single(row.try_get(idx)?),
        ColumnType::Double => Value::Double(row.try_get(idx)?),
        ColumnType::Decimal => Value::Decimal(row.try_get(idx)?),
        ColumnType::Boolean => Value::Boolean(row.try_get(idx)?),
    })
}
