//! Column descriptors: one record field mapped to one database column.

use crate::error::{RowmapError, RowmapResult};
use crate::value::{FieldValue, Value};
use serde::{Deserialize, Serialize};
use std::collections::HashSet;
use std::fmt;
use std::sync::Arc;

/// Dialect-independent classification of a column's data.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum ColumnType {
    Blob,
    String,
    TinyUint,
    Uint,
    BigUint,
    TinyInt,
    Int,
    BigInt,
    Timestamp,
    Datetime,
    Date,
    Single,
    Double,
    Decimal,
    Boolean,
}

impl ColumnType {
    /// Every abstract column type, in declaration order.
    pub const ALL: [ColumnType; 15] = [
        ColumnType::Blob,
        ColumnType::String,
        ColumnType::TinyUint,
        ColumnType::Uint,
        ColumnType::BigUint,
        ColumnType::TinyInt,
        ColumnType::Int,
        ColumnType::BigInt,
        ColumnType::Timestamp,
        ColumnType::Datetime,
        ColumnType::Date,
        ColumnType::Single,
        ColumnType::Double,
        ColumnType::Decimal,
        ColumnType::Boolean,
    ];
}

type Reader<T> = Arc<dyn Fn(&T) -> Value + Send + Sync>;
type Writer<T> = Arc<dyn Fn(&mut T, Value) -> RowmapResult<()> + Send + Sync>;

/// Declaration of a column, as written by a [`Record`](crate::table::Record).
///
/// # Example
///
/// ```
/// use rowmap::prelude::*;
///
/// #[derive(Default)]
/// struct User {
///     id: i64,
///     name: String,
/// }
///
/// let id = ColumnDef::new("id", ColumnType::BigInt, |u: &User| &u.id, |u: &mut User| &mut u.id)
///     .primary_key();
/// assert_eq!(id.name(), "id");
/// ```
pub struct ColumnDef<T> {
    name: String,
    column_type: ColumnType,
    field_type: &'static str,
    supported: bool,
    is_primary: bool,
    is_index: bool,
    is_unique: bool,
    reader: Reader<T>,
    writer: Writer<T>,
}

impl<T: 'static> ColumnDef<T> {
    /// Bind a column to a typed field through a pair of accessors.
    pub fn new<F, G, M>(name: impl Into<String>, column_type: ColumnType, get: G, get_mut: M) -> Self
    where
        F: FieldValue,
        G: for<'a> Fn(&'a T) -> &'a F + Send + Sync + 'static,
        M: for<'a> Fn(&'a mut T) -> &'a mut F + Send + Sync + 'static,
    {
        Self {
            name: name.into(),
            column_type,
            field_type: std::any::type_name::<F>(),
            supported: F::accepts(column_type),
            is_primary: false,
            is_index: false,
            is_unique: false,
            reader: Arc::new(move |record: &T| get(record).to_value()),
            writer: Arc::new(move |record: &mut T, value: Value| {
                *get_mut(record) = F::from_value(value)?;
                Ok(())
            }),
        }
    }

    /// Bind a column through raw value accessors, for records without
    /// statically typed fields.
    pub fn with_accessors<R, W>(name: impl Into<String>, column_type: ColumnType, reader: R, writer: W) -> Self
    where
        R: Fn(&T) -> Value + Send + Sync + 'static,
        W: Fn(&mut T, Value) -> RowmapResult<()> + Send + Sync + 'static,
    {
        Self {
            name: name.into(),
            column_type,
            field_type: "Value",
            supported: true,
            is_primary: false,
            is_index: false,
            is_unique: false,
            reader: Arc::new(reader),
            writer: Arc::new(writer),
        }
    }
}

impl<T> ColumnDef<T> {
    pub fn name(&self) -> &str {
        &self.name
    }

    pub fn primary_key(mut self) -> Self {
        self.is_primary = true;
        self
    }

    pub fn indexed(mut self) -> Self {
        self.is_index = true;
        self
    }

    pub fn unique(mut self) -> Self {
        self.is_unique = true;
        self
    }
}

/// Immutable metadata for one column of a built table.
///
/// Shared read-only by every template and binder compiled for the table.
pub struct ColumnDescriptor<T> {
    name: String,
    column_type: ColumnType,
    is_primary: bool,
    is_index: bool,
    is_unique: bool,
    reader: Reader<T>,
    writer: Writer<T>,
}

impl<T> ColumnDescriptor<T> {
    /// Validate a declaration into a descriptor.
    pub fn build(def: ColumnDef<T>) -> RowmapResult<Self> {
        if !def.supported {
            return Err(RowmapError::UnsupportedFieldType {
                column: def.name,
                column_type: def.column_type,
                field_type: def.field_type,
            });
        }

        Ok(Self {
            name: def.name,
            column_type: def.column_type,
            is_primary: def.is_primary,
            is_index: def.is_index,
            is_unique: def.is_unique,
            reader: def.reader,
            writer: def.writer,
        })
    }

    pub fn name(&self) -> &str {
        &self.name
    }

    pub fn column_type(&self) -> ColumnType {
        self.column_type
    }

    pub fn is_primary(&self) -> bool {
        self.is_primary
    }

    pub fn is_index(&self) -> bool {
        self.is_index
    }

    pub fn is_unique(&self) -> bool {
        self.is_unique
    }

    /// Read this column's field out of `record`.
    pub fn read(&self, record: &T) -> Value {
        (self.reader)(record)
    }

    /// Store `value` into this column's field of `record`.
    pub fn write(&self, record: &mut T, value: Value) -> RowmapResult<()> {
        (self.writer)(record, value)
    }
}

impl<T> fmt::Debug for ColumnDescriptor<T> {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("ColumnDescriptor")
            .field("name", &self.name)
            .field("column_type", &self.column_type)
            .field("is_primary", &self.is_primary)
            .field("is_index", &self.is_index)
            .field("is_unique", &self.is_unique)
            .finish()
    }
}

/// Build the descriptors for one table, rejecting duplicate column names.
pub fn build_columns<T>(table: &str, defs: Vec<ColumnDef<T>>) -> RowmapResult<Vec<Arc<ColumnDescriptor<T>>>> {
    let mut seen = HashSet::with_capacity(defs.len());
    let mut columns = Vec::with_capacity(defs.len());

    for def in defs {
        if !seen.insert(def.name.clone()) {
            return Err(RowmapError::DuplicateColumn {
                table: table.to_string(),
                column: def.name,
            });
        }
        columns.push(Arc::new(ColumnDescriptor::build(def)?));
    }

    Ok(columns)
}

/// Declare a column bound to a named field.
///
/// ```
/// use rowmap::prelude::*;
///
/// #[derive(Default)]
/// struct Tick {
///     price: f64,
/// }
///
/// let def = rowmap::column!(Tick, price, "price", ColumnType::Double).indexed();
/// assert_eq!(def.name(), "price");
/// ```
#[macro_export]
macro_rules! column {
    ($record:ty, $field:ident, $name:expr, $ty:expr) => {
        $crate::column::ColumnDef::<$record>::new(
            $name,
            $ty,
            |r: &$record| &r.$field,
            |r: &mut $record| &mut r.$field,
        )
    };
}

#[cfg(test)]
mod tests {
    use super::*;

    #[derive(Default)]
    struct Order {
        id: u64,
        qty: i32,
        note: Option<String>,
    }

    #[test]
    fn test_read_write() {
        let col = ColumnDescriptor::build(crate::column!(Order, qty, "qty", ColumnType::Int)).unwrap();
        let mut order = Order::default();
        col.write(&mut order, Value::Int(12)).unwrap();
        assert_eq!(order.qty, 12);
        assert_eq!(col.read(&order), Value::Int(12));
    }

    #[test]
    fn test_nullable_field() {
        let col = ColumnDescriptor::build(crate::column!(Order, note, "note", ColumnType::String)).unwrap();
        let mut order = Order::default();
        assert_eq!(col.read(&order), Value::Null);
        col.write(&mut order, Value::String("rush".into())).unwrap();
        assert_eq!(order.note.as_deref(), Some("rush"));
    }

    #[test]
    fn test_unsupported_field_type() {
        let def = crate::column!(Order, id, "id", ColumnType::BigInt);
        let err = ColumnDescriptor::build(def).unwrap_err();
        assert!(matches!(
            err,
            RowmapError::UnsupportedFieldType {
                column_type: ColumnType::BigInt,
                ..
            }
        ));
    }

    #[test]
    fn test_duplicate_column() {
        let defs = vec![
            crate::column!(Order, id, "id", ColumnType::BigUint).primary_key(),
            crate::column!(Order, qty, "id", ColumnType::Int),
        ];
        let err = build_columns("orders", defs).unwrap_err();
        assert_eq!(err.to_string(), "Duplicate column 'id' in table 'orders'");
    }

    #[test]
    fn test_flags() {
        let col = ColumnDescriptor::build(
            crate::column!(Order, id, "id", ColumnType::BigUint)
                .primary_key()
                .unique(),
        )
        .unwrap();
        assert!(col.is_primary());
        assert!(col.is_unique());
        assert!(!col.is_index());
    }
}
