//! Table descriptors and the record trait.

use crate::column::{ColumnDef, ColumnDescriptor, build_columns};
use crate::error::{RowmapError, RowmapResult};
use std::sync::{Arc, Mutex};

/// Default number of idle records a table keeps for reuse.
pub const DEFAULT_POOL_MAX_IDLE: usize = 64;

/// A record type mapped to one table.
///
/// # Example
///
/// ```
/// use rowmap::prelude::*;
///
/// #[derive(Debug, Default, Clone, PartialEq)]
/// struct Trade {
///     id: u64,
///     symbol: String,
///     price: f64,
/// }
///
/// impl Record for Trade {
///     const SCHEMA: Option<&'static str> = Some("market");
///     const TABLE: &'static str = "trades";
///
///     fn columns() -> Vec<ColumnDef<Self>> {
///         vec![
///             rowmap::column!(Trade, id, "id", ColumnType::BigUint).primary_key(),
///             rowmap::column!(Trade, symbol, "symbol", ColumnType::String).indexed(),
///             rowmap::column!(Trade, price, "price", ColumnType::Double),
///         ]
///     }
/// }
///
/// let table = TableDescriptor::<Trade>::for_record().unwrap();
/// assert_eq!(table.qualified_name(), "market.trades");
/// ```
pub trait Record: Default + Send + Sync + 'static {
    /// Optional schema qualifying the table name.
    const SCHEMA: Option<&'static str> = None;

    /// Table name.
    const TABLE: &'static str;

    /// Column declarations, in table order.
    fn columns() -> Vec<ColumnDef<Self>>;
}

/// Columns, identity and result pool of one table.
///
/// Never mutated after it is built; every template compiled against it
/// stays valid for the life of the process.
pub struct TableDescriptor<T> {
    schema: Option<String>,
    name: String,
    columns: Vec<Arc<ColumnDescriptor<T>>>,
    pool: RecordPool<T>,
}

impl<T: Default> TableDescriptor<T> {
    /// Build a descriptor from explicit column declarations.
    pub fn build(schema: Option<&str>, name: &str, defs: Vec<ColumnDef<T>>) -> RowmapResult<Self> {
        let columns = build_columns(name, defs)?;
        Ok(Self {
            schema: schema.filter(|s| !s.is_empty()).map(str::to_string),
            name: name.to_string(),
            columns,
            pool: RecordPool::new(DEFAULT_POOL_MAX_IDLE),
        })
    }

    /// Build the descriptor declared by a [`Record`] implementation.
    pub fn for_record() -> RowmapResult<Self>
    where
        T: Record,
    {
        Self::build(T::SCHEMA, T::TABLE, T::columns())
    }

    /// Replace the result pool with one holding at most `max_idle` records.
    pub fn with_pool_max_idle(mut self, max_idle: usize) -> Self {
        self.pool = RecordPool::new(max_idle);
        self
    }
}

impl<T> TableDescriptor<T> {
    pub fn schema(&self) -> Option<&str> {
        self.schema.as_deref()
    }

    pub fn name(&self) -> &str {
        &self.name
    }

    /// `schema.table`, or just `table` without a schema.
    pub fn qualified_name(&self) -> String {
        match &self.schema {
            Some(schema) => format!("{}.{}", schema, self.name),
            None => self.name.clone(),
        }
    }

    pub fn columns(&self) -> &[Arc<ColumnDescriptor<T>>] {
        &self.columns
    }

    pub fn column(&self, name: &str) -> Option<&Arc<ColumnDescriptor<T>>> {
        self.columns.iter().find(|c| c.name() == name)
    }

    pub fn pool(&self) -> &RecordPool<T> {
        &self.pool
    }

    /// Resolve a column subset. An empty subset selects every column in
    /// table order; names that match no column are skipped.
    pub fn select_columns(&self, names: &[&str]) -> Vec<Arc<ColumnDescriptor<T>>> {
        if names.is_empty() {
            return self.columns.clone();
        }

        names
            .iter()
            .filter_map(|name| self.column(name).cloned())
            .collect()
    }

    /// Like [`select_columns`](Self::select_columns), but an unknown name is
    /// an error.
    pub fn select_columns_strict(&self, names: &[&str]) -> RowmapResult<Vec<Arc<ColumnDescriptor<T>>>> {
        if names.is_empty() {
            return Ok(self.columns.clone());
        }

        names
            .iter()
            .map(|name| {
                self.column(name).cloned().ok_or_else(|| RowmapError::UnknownColumn {
                    table: self.qualified_name(),
                    column: name.to_string(),
                })
            })
            .collect()
    }
}

/// Recycles zero-valued records that receive query results.
///
/// Safe to share between tasks; released records are reset to
/// `T::default()` before they can be handed out again.
pub struct RecordPool<T> {
    idle: Mutex<Vec<T>>,
    max_idle: usize,
}

impl<T: Default> RecordPool<T> {
    pub fn new(max_idle: usize) -> Self {
        Self {
            idle: Mutex::new(Vec::new()),
            max_idle,
        }
    }

    /// Take a zero-valued record, reusing an idle one when available.
    pub fn acquire(&self) -> T {
        self.lock().pop().unwrap_or_default()
    }

    /// Return a record for reuse. The record is reset to `T::default()` in
    /// place and kept; once the pool holds `max_idle` it is dropped instead.
    pub fn release(&self, mut record: T) {
        let mut idle = self.lock();
        if idle.len() < self.max_idle {
            reset(&mut record);
            idle.push(record);
        }
    }

    /// Return many records at once.
    pub fn release_all(&self, records: impl IntoIterator<Item = T>) {
        for record in records {
            self.release(record);
        }
    }

    /// Number of records waiting for reuse.
    pub fn idle(&self) -> usize {
        self.lock().len()
    }

    fn lock(&self) -> std::sync::MutexGuard<'_, Vec<T>> {
        self.idle.lock().unwrap_or_else(|poisoned| poisoned.into_inner())
    }
}

fn reset<T: Default>(record: &mut T) {
    *record = T::default();
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::column::ColumnType;

    #[derive(Debug, Default, PartialEq)]
    struct Quote {
        symbol: String,
        bid: f64,
        ask: f64,
    }

    impl Record for Quote {
        const TABLE: &'static str = "quotes";

        fn columns() -> Vec<ColumnDef<Self>> {
            vec![
                crate::column!(Quote, symbol, "symbol", ColumnType::String).primary_key(),
                crate::column!(Quote, bid, "bid", ColumnType::Double),
                crate::column!(Quote, ask, "ask", ColumnType::Double),
            ]
        }
    }

    #[test]
    fn test_for_record() {
        let table = TableDescriptor::<Quote>::for_record().unwrap();
        assert_eq!(table.qualified_name(), "quotes");
        let names: Vec<&str> = table.columns().iter().map(|c| c.name()).collect();
        assert_eq!(names, ["symbol", "bid", "ask"]);
    }

    #[test]
    fn test_select_columns_permissive() {
        let table = TableDescriptor::<Quote>::for_record().unwrap();
        let cols = table.select_columns(&["ask", "nope", "symbol"]);
        let names: Vec<&str> = cols.iter().map(|c| c.name()).collect();
        assert_eq!(names, ["ask", "symbol"]);
    }

    #[test]
    fn test_select_columns_strict() {
        let table = TableDescriptor::<Quote>::for_record().unwrap();
        assert!(matches!(
            table.select_columns_strict(&["ask", "nope"]),
            Err(RowmapError::UnknownColumn { .. })
        ));
        assert_eq!(table.select_columns_strict(&[]).unwrap().len(), 3);
    }

    #[test]
    fn test_empty_schema_is_none() {
        let table = TableDescriptor::<Quote>::build(Some(""), "quotes", Quote::columns()).unwrap();
        assert_eq!(table.schema(), None);
    }

    #[test]
    fn test_pool_resets_records() {
        let pool = RecordPool::<Quote>::new(2);
        let mut q = pool.acquire();
        q.symbol = "AAPL".into();
        q.bid = 1.5;
        pool.release(q);
        assert_eq!(pool.idle(), 1);
        assert_eq!(pool.acquire(), Quote::default());
        assert_eq!(pool.idle(), 0);
    }

    #[test]
    fn test_pool_full_drops_without_reset() {
        use std::sync::atomic::{AtomicUsize, Ordering};

        static DEFAULTS: AtomicUsize = AtomicUsize::new(0);

        struct Counted(u32);

        impl Default for Counted {
            fn default() -> Self {
                DEFAULTS.fetch_add(1, Ordering::SeqCst);
                Counted(0)
            }
        }

        let pool = RecordPool::<Counted>::new(1);
        pool.release(Counted(7));
        assert_eq!(DEFAULTS.load(Ordering::SeqCst), 1);
        pool.release(Counted(8));
        assert_eq!(DEFAULTS.load(Ordering::SeqCst), 1);
        assert_eq!(pool.idle(), 1);

        let reused = pool.acquire();
        assert_eq!(reused.0, 0);
        assert_eq!(DEFAULTS.load(Ordering::SeqCst), 1);
    }

    #[test]
    fn test_pool_bounded() {
        let pool = RecordPool::<Quote>::new(1);
        pool.release_all([Quote::default(), Quote::default(), Quote::default()]);
        assert_eq!(pool.idle(), 1);
    }
}
