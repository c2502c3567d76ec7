//! Compiled execution engine.
//!
//! A [`Database`] binds table descriptors to a live [`Connection`]. Each
//! `compile_*` call renders its SQL once and returns a reusable operation
//! holding the text, the binder and the connection.
//!
//! The connection is captured when an operation is compiled. Operations
//! compiled from a `Database` keep using that connection even after
//! [`Database::with_connection`] produced a handle to a new one; recompile
//! them against the new handle to follow the swap.

use crate::binder::Binder;
use crate::column::ColumnType;
use crate::config::Config;
use crate::dialect::Dialect;
use crate::driver::{Connection, ExecResult, SqlxConnection, Transaction};
use crate::error::{RowmapError, RowmapResult};
use crate::filter::Filter;
use crate::registry::Registry;
use crate::table::{Record, TableDescriptor};
use crate::transpiler::{Template, build_create_table, build_drop_table, build_insert, build_select};
use crate::value::Value;
use futures::StreamExt;
use std::future::Future;
use std::sync::Arc;
use std::time::Duration;

/// Handle to a connection plus the descriptor registry.
#[derive(Clone)]
pub struct Database {
    conn: Arc<dyn Connection>,
    registry: Arc<Registry>,
    statement_timeout: Option<Duration>,
}

impl Database {
    /// Wrap a connection, sharing the process-wide registry.
    pub fn new(conn: Arc<dyn Connection>) -> Self {
        Self {
            conn,
            registry: Registry::global(),
            statement_timeout: None,
        }
    }

    /// Connect with default settings.
    ///
    /// # Example
    ///
    /// ```rust,ignore
    /// let db = Database::connect("sqlite::memory:").await?;
    /// ```
    pub async fn connect(url: &str) -> RowmapResult<Self> {
        let config = Config {
            database_url: Some(url.to_string()),
            ..Config::default()
        };
        Self::from_config(&config).await
    }

    /// Connect using a loaded [`Config`]. Fails with `NotInitialized` when no
    /// URL is configured.
    pub async fn from_config(config: &Config) -> RowmapResult<Self> {
        let url = config.require_url()?;
        let conn = SqlxConnection::connect(url, config.max_connections).await?;
        Ok(Self::with_config(Arc::new(conn), config))
    }

    /// Wrap a connection with the registry and deadline `config` selects.
    /// `shared_registry = false` gives this handle a private registry
    /// bounded by `pool_max_idle`.
    pub fn with_config(conn: Arc<dyn Connection>, config: &Config) -> Self {
        Self {
            conn,
            registry: config.registry(),
            statement_timeout: config.statement_timeout(),
        }
    }

    /// Use a dedicated descriptor registry.
    pub fn with_registry(mut self, registry: Arc<Registry>) -> Self {
        self.registry = registry;
        self
    }

    /// Deadline applied to every operation compiled afterwards.
    pub fn with_statement_timeout(mut self, timeout: Option<Duration>) -> Self {
        self.statement_timeout = timeout;
        self
    }

    /// A handle to another connection. Already compiled operations are not
    /// affected.
    pub fn with_connection(&self, conn: Arc<dyn Connection>) -> Self {
        Self {
            conn,
            registry: self.registry.clone(),
            statement_timeout: self.statement_timeout,
        }
    }

    pub fn registry(&self) -> Arc<Registry> {
        self.registry.clone()
    }

    pub fn connection(&self) -> Arc<dyn Connection> {
        self.conn.clone()
    }

    pub fn dialect(&self) -> Dialect {
        self.conn.dialect()
    }

    /// Descriptor of `T`, built on first use.
    pub fn table<T: Record>(&self) -> RowmapResult<Arc<TableDescriptor<T>>> {
        self.registry.table::<T>()
    }

    /// Compile a select of `columns` (empty = all) filtered by `filters`.
    pub fn compile_query<T: Record>(&self, filters: &[Filter], columns: &[&str]) -> RowmapResult<CompiledQuery<T>> {
        Ok(self.compile_query_with(self.table::<T>()?, filters, columns))
    }

    /// Compile an insert of `columns` (empty = all).
    pub fn compile_insert<T: Record>(&self, columns: &[&str]) -> RowmapResult<CompiledInsert<T>> {
        Ok(self.compile_insert_with(self.table::<T>()?, columns))
    }

    /// Compile a transactional multi-row insert of `columns` (empty = all).
    pub fn compile_batch_insert<T: Record>(&self, columns: &[&str]) -> RowmapResult<CompiledBatchInsert<T>> {
        Ok(self.compile_batch_insert_with(self.table::<T>()?, columns))
    }

    /// `compile_query` against an explicit descriptor.
    pub fn compile_query_with<T>(
        &self,
        table: Arc<TableDescriptor<T>>,
        filters: &[Filter],
        columns: &[&str],
    ) -> CompiledQuery<T> {
        let template = build_select(&table, filters, columns);
        let binder = Binder::for_template(&template);
        CompiledQuery {
            conn: self.conn.clone(),
            args: template.filter_values(),
            types: binder.column_types(),
            table,
            template,
            binder,
            timeout: self.statement_timeout,
        }
    }

    /// `compile_insert` against an explicit descriptor.
    pub fn compile_insert_with<T>(&self, table: Arc<TableDescriptor<T>>, columns: &[&str]) -> CompiledInsert<T> {
        let template = build_insert(&table, columns);
        CompiledInsert {
            conn: self.conn.clone(),
            binder: Binder::for_template(&template),
            template,
            timeout: self.statement_timeout,
        }
    }

    /// `compile_batch_insert` against an explicit descriptor.
    pub fn compile_batch_insert_with<T>(
        &self,
        table: Arc<TableDescriptor<T>>,
        columns: &[&str],
    ) -> CompiledBatchInsert<T> {
        let template = build_insert(&table, columns);
        CompiledBatchInsert {
            conn: self.conn.clone(),
            binder: Binder::for_template(&template),
            template,
            timeout: self.statement_timeout,
        }
    }

    /// `CREATE TABLE IF NOT EXISTS` for `T`.
    pub async fn create_table<T: Record>(&self) -> RowmapResult<ExecResult> {
        self.create_table_with(&*self.table::<T>()?).await
    }

    /// `DROP TABLE IF EXISTS` for `T`.
    pub async fn drop_table<T: Record>(&self) -> RowmapResult<ExecResult> {
        self.drop_table_with(&*self.table::<T>()?).await
    }

    pub async fn create_table_with<T>(&self, table: &TableDescriptor<T>) -> RowmapResult<ExecResult> {
        let template = build_create_table(table, self.dialect());
        self.execute_template(&template).await
    }

    pub async fn drop_table_with<T>(&self, table: &TableDescriptor<T>) -> RowmapResult<ExecResult> {
        let template = build_drop_table(table);
        self.execute_template(&template).await
    }

    async fn execute_template<T>(&self, template: &Template<T>) -> RowmapResult<ExecResult> {
        let sql = template.sql();
        with_deadline(self.statement_timeout, async move {
            tracing::debug!(sql, "executing sql");
            self.conn.execute(sql, &[]).await
        })
        .await
    }
}

/// A compiled select.
pub struct CompiledQuery<T> {
    conn: Arc<dyn Connection>,
    table: Arc<TableDescriptor<T>>,
    template: Template<T>,
    binder: Binder<T>,
    args: Vec<Value>,
    types: Vec<ColumnType>,
    timeout: Option<Duration>,
}

impl<T: Default> CompiledQuery<T> {
    pub fn sql(&self) -> &str {
        self.template.sql()
    }

    pub fn template(&self) -> &Template<T> {
        &self.template
    }

    /// Run the query and scan every row into a pooled record.
    ///
    /// A failed query or row scan fails the whole call; records scanned
    /// before the failure go back to the pool.
    pub async fn run(&self) -> RowmapResult<Vec<T>> {
        with_deadline(self.timeout, self.fetch()).await
    }

    async fn fetch(&self) -> RowmapResult<Vec<T>> {
        let sql = self.template.sql();
        tracing::debug!(sql, args = ?self.args, "executing sql");

        let mut rows = self.conn.query(sql, &self.args, &self.types);
        let mut results = Vec::new();

        while let Some(row) = rows.next().await {
            if let Err(e) = self.scan_into(&mut results, row) {
                self.table.pool().release_all(results);
                return Err(e);
            }
        }

        Ok(results)
    }

    fn scan_into(&self, results: &mut Vec<T>, row: RowmapResult<Vec<Value>>) -> RowmapResult<()> {
        let row = row?;
        let mut record = self.table.pool().acquire();
        if let Err(e) = self.binder.scan_targets(Some(&mut record)).scan(row) {
            self.table.pool().release(record);
            return Err(e);
        }
        results.push(record);
        Ok(())
    }
}

/// A compiled single-row insert.
pub struct CompiledInsert<T> {
    conn: Arc<dyn Connection>,
    template: Template<T>,
    binder: Binder<T>,
    timeout: Option<Duration>,
}

impl<T> CompiledInsert<T> {
    pub fn sql(&self) -> &str {
        self.template.sql()
    }

    /// Insert one record.
    pub async fn run(&self, record: &T) -> RowmapResult<ExecResult> {
        let sql = self.template.sql();
        let values = self.binder.values(Some(record));
        with_deadline(self.timeout, async move {
            tracing::debug!(sql, args = ?values, "executing sql");
            self.conn.execute(sql, &values).await
        })
        .await
    }
}

/// A compiled all-or-nothing multi-row insert.
pub struct CompiledBatchInsert<T> {
    conn: Arc<dyn Connection>,
    template: Template<T>,
    binder: Binder<T>,
    timeout: Option<Duration>,
}

impl<T> CompiledBatchInsert<T> {
    pub fn sql(&self) -> &str {
        self.template.sql()
    }

    /// Insert `records` in order inside one transaction.
    ///
    /// The statement is prepared once. The first failing row rolls the
    /// transaction back and no later row is executed; nothing is returned
    /// but the error (combined with the rollback error if that failed too).
    /// When every row succeeds the transaction is committed and the
    /// per-row results come back in input order.
    pub async fn run(&self, records: &[T]) -> RowmapResult<Vec<ExecResult>> {
        with_deadline(self.timeout, self.insert_all(records)).await
    }

    async fn insert_all(&self, records: &[T]) -> RowmapResult<Vec<ExecResult>> {
        let sql = self.template.sql();
        let mut tx = self.conn.begin().await?;
        tracing::debug!(sql, rows = records.len(), "begin batch insert");

        let stmt = match tx.prepare(sql).await {
            Ok(stmt) => stmt,
            Err(e) => return Err(abort(tx, e).await),
        };

        let mut results = Vec::with_capacity(records.len());
        for (idx, record) in records.iter().enumerate() {
            let values = self.binder.values(Some(record));
            tracing::debug!(sql, args = ?values, "executing sql");

            match tx.execute_prepared(&stmt, &values).await {
                Ok(result) => results.push(result),
                Err(e) => {
                    tracing::debug!(row = idx, error = %e, "batch row failed, rolling back");
                    return Err(abort(tx, e).await);
                }
            }
        }

        tx.commit().await?;
        tracing::debug!(rows = results.len(), "batch insert committed");
        Ok(results)
    }
}

/// Roll back after `cause`; a failed rollback is reported alongside it.
async fn abort(tx: Box<dyn Transaction>, cause: RowmapError) -> RowmapError {
    match tx.rollback().await {
        Ok(()) => cause,
        Err(rollback) => {
            tracing::warn!(error = %rollback, "rollback failed");
            RowmapError::rollback(cause, rollback)
        }
    }
}

async fn with_deadline<F, R>(timeout: Option<Duration>, fut: F) -> RowmapResult<R>
where
    F: Future<Output = RowmapResult<R>>,
{
    match timeout {
        Some(limit) => tokio::time::timeout(limit, fut)
            .await
            .map_err(|_| RowmapError::Timeout(limit.as_millis() as u64))?,
        None => fut.await,
    }
}
