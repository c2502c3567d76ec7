//! Process-wide cache of table descriptors keyed by record type.
//!
//! A descriptor is built once, published, and only read afterwards. Two
//! callers racing on the first build both build, but only the first publish
//! is kept, so every caller ends up sharing the same `Arc`.

use crate::error::RowmapResult;
use crate::table::{DEFAULT_POOL_MAX_IDLE, Record, TableDescriptor};
use dashmap::DashMap;
use once_cell::sync::Lazy;
use std::any::{Any, TypeId};
use std::sync::Arc;

static GLOBAL: Lazy<Arc<Registry>> = Lazy::new(|| Arc::new(Registry::new()));

/// Descriptor registry.
pub struct Registry {
    tables: DashMap<TypeId, Arc<dyn Any + Send + Sync>>,
    pool_max_idle: usize,
}

impl Default for Registry {
    fn default() -> Self {
        Self::new()
    }
}

impl Registry {
    pub fn new() -> Self {
        Self::with_pool_max_idle(DEFAULT_POOL_MAX_IDLE)
    }

    /// A registry whose tables keep at most `max_idle` pooled records.
    pub fn with_pool_max_idle(max_idle: usize) -> Self {
        Self {
            tables: DashMap::new(),
            pool_max_idle: max_idle,
        }
    }

    /// The registry shared by the whole process.
    pub fn global() -> Arc<Registry> {
        GLOBAL.clone()
    }

    /// Descriptor for `T`, building it on first use.
    pub fn table<T: Record>(&self) -> RowmapResult<Arc<TableDescriptor<T>>> {
        let key = TypeId::of::<T>();

        if let Some(found) = self.tables.get(&key).and_then(|e| downcast::<T>(e.value())) {
            return Ok(found);
        }

        let table = TableDescriptor::<T>::for_record()?.with_pool_max_idle(self.pool_max_idle);
        let built: Arc<dyn Any + Send + Sync> = Arc::new(table);
        tracing::debug!(table = T::TABLE, "registered table descriptor");

        let published = self.tables.entry(key).or_insert(built).value().clone();
        // The entry is keyed by `TypeId::of::<T>()`, so the downcast holds.
        Ok(downcast::<T>(&published).unwrap_or_else(|| unreachable!("registry entry type mismatch")))
    }

    /// Number of registered record types.
    pub fn len(&self) -> usize {
        self.tables.len()
    }

    pub fn is_empty(&self) -> bool {
        self.tables.is_empty()
    }
}

fn downcast<T: Record>(entry: &Arc<dyn Any + Send + Sync>) -> Option<Arc<TableDescriptor<T>>> {
    entry.clone().downcast::<TableDescriptor<T>>().ok()
}
