//! Value binding between records and flat parameter / scan lists.
//!
//! A [`Binder`] resolves its columns once; binding a record afterwards walks
//! the captured accessors in column order with no name lookup, and the same
//! binder serves any number of records.

use crate::column::{ColumnDescriptor, ColumnType};
use crate::error::{RowmapError, RowmapResult};
use crate::table::TableDescriptor;
use crate::transpiler::Template;
use crate::value::Value;
use std::sync::Arc;

/// Reusable read/write binding for a fixed column list.
pub struct Binder<T> {
    columns: Vec<Arc<ColumnDescriptor<T>>>,
}

impl<T> Clone for Binder<T> {
    fn clone(&self) -> Self {
        Self {
            columns: self.columns.clone(),
        }
    }
}

impl<T> Binder<T> {
    /// Bind the given column subset (empty = every column).
    pub fn new(table: &TableDescriptor<T>, columns: &[&str]) -> Self {
        Self {
            columns: table.select_columns(columns),
        }
    }

    /// Bind exactly the columns a template was compiled with.
    pub fn for_template(template: &Template<T>) -> Self {
        Self {
            columns: template.columns().to_vec(),
        }
    }

    pub fn len(&self) -> usize {
        self.columns.len()
    }

    pub fn is_empty(&self) -> bool {
        self.columns.is_empty()
    }

    pub fn column_types(&self) -> Vec<ColumnType> {
        self.columns.iter().map(|c| c.column_type()).collect()
    }

    /// Field values of `record` in column order, for statement parameters.
    /// An absent record yields no values.
    pub fn values(&self, record: Option<&T>) -> Vec<Value> {
        match record {
            Some(record) => self.columns.iter().map(|c| c.read(record)).collect(),
            None => Vec::new(),
        }
    }

    /// Writable targets over `record` in column order, for scanning a result
    /// row. An absent record yields no targets.
    pub fn scan_targets<'a>(&'a self, record: Option<&'a mut T>) -> ScanTargets<'a, T> {
        ScanTargets {
            columns: &self.columns,
            record,
        }
    }
}

/// The fields of one record, addressable by column position.
pub struct ScanTargets<'a, T> {
    columns: &'a [Arc<ColumnDescriptor<T>>],
    record: Option<&'a mut T>,
}

impl<T> ScanTargets<'_, T> {
    pub fn len(&self) -> usize {
        if self.record.is_some() { self.columns.len() } else { 0 }
    }

    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }

    /// Type each target expects, so a driver can decode the matching column.
    pub fn column_types(&self) -> Vec<ColumnType> {
        match self.record {
            Some(_) => self.columns.iter().map(|c| c.column_type()).collect(),
            None => Vec::new(),
        }
    }

    /// Store `value` into the field at position `idx`.
    pub fn set(&mut self, idx: usize, value: Value) -> RowmapResult<()> {
        let Some(record) = self.record.as_deref_mut() else {
            return Ok(());
        };
        let column = self.columns.get(idx).ok_or(RowmapError::ColumnCount {
            expected: self.columns.len(),
            found: idx + 1,
        })?;
        column.write(record, value)
    }

    /// Store a whole driver row, one value per target.
    pub fn scan(&mut self, row: Vec<Value>) -> RowmapResult<()> {
        if self.is_empty() {
            return Ok(());
        }
        if row.len() != self.columns.len() {
            return Err(RowmapError::ColumnCount {
                expected: self.columns.len(),
                found: row.len(),
            });
        }
        for (idx, value) in row.into_iter().enumerate() {
            self.set(idx, value)?;
        }
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::column::ColumnDef;
    use crate::table::Record;
    use chrono::{DateTime, NaiveDate, NaiveDateTime, Utc};
    use rust_decimal::Decimal;
    use std::str::FromStr;

    #[derive(Debug, Default, Clone, PartialEq)]
    struct Everything {
        blob: Vec<u8>,
        text: String,
        tiny_uint: u8,
        uint: u32,
        big_uint: u64,
        tiny_int: i8,
        int: i32,
        big_int: i64,
        timestamp: DateTime<Utc>,
        datetime: NaiveDateTime,
        date: NaiveDate,
        single: f32,
        double: f64,
        decimal: Decimal,
        boolean: bool,
        maybe: Option<i64>,
    }

    impl Record for Everything {
        const TABLE: &'static str = "everything";

        fn columns() -> Vec<ColumnDef<Self>> {
            vec![
                crate::column!(Everything, blob, "blob", ColumnType::Blob),
                crate::column!(Everything, text, "text", ColumnType::String),
                crate::column!(Everything, tiny_uint, "tiny_uint", ColumnType::TinyUint),
                crate::column!(Everything, uint, "uint", ColumnType::Uint),
                crate::column!(Everything, big_uint, "big_uint", ColumnType::BigUint),
                crate::column!(Everything, tiny_int, "tiny_int", ColumnType::TinyInt),
                crate::column!(Everything, int, "int", ColumnType::Int),
                crate::column!(Everything, big_int, "big_int", ColumnType::BigInt),
                crate::column!(Everything, timestamp, "timestamp", ColumnType::Timestamp),
                crate::column!(Everything, datetime, "datetime", ColumnType::Datetime),
                crate::column!(Everything, date, "date", ColumnType::Date),
                crate::column!(Everything, single, "single", ColumnType::Single),
                crate::column!(Everything, double, "double", ColumnType::Double),
                crate::column!(Everything, decimal, "decimal", ColumnType::Decimal),
                crate::column!(Everything, boolean, "boolean", ColumnType::Boolean),
                crate::column!(Everything, maybe, "maybe", ColumnType::BigInt),
            ]
        }
    }

    fn sample_row() -> Vec<Value> {
        vec![
            Value::Blob(vec![0, 159, 146, 150]),
            Value::String("héllo".into()),
            Value::TinyUint(u8::MAX),
            Value::Uint(u32::MAX),
            Value::BigUint(u64::MAX),
            Value::TinyInt(i8::MIN),
            Value::Int(-42),
            Value::BigInt(i64::MIN),
            Value::Timestamp(DateTime::from_timestamp(1_700_000_000, 123_456_789).unwrap()),
            Value::Datetime(
                NaiveDate::from_ymd_opt(2023, 11, 14)
                    .unwrap()
                    .and_hms_micro_opt(22, 13, 20, 5)
                    .unwrap(),
            ),
            Value::Date(NaiveDate::from_ymd_opt(1999, 12, 31).unwrap()),
            Value::Single(f32::MIN_POSITIVE),
            Value::Double(-0.0),
            Value::Decimal(Decimal::from_str("12345.6789").unwrap()),
            Value::Boolean(true),
            Value::Null,
        ]
    }

    #[test]
    fn test_scan_then_write_round_trip() {
        let table = TableDescriptor::<Everything>::for_record().unwrap();
        let binder = Binder::new(&table, &[]);
        let row = sample_row();

        let mut record = table.pool().acquire();
        binder.scan_targets(Some(&mut record)).scan(row.clone()).unwrap();
        let written = binder.values(Some(&record));

        assert_eq!(written.len(), row.len());
        for (got, want) in written.iter().zip(&row) {
            match (got, want) {
                (Value::Double(a), Value::Double(b)) => assert_eq!(a.to_bits(), b.to_bits()),
                (Value::Single(a), Value::Single(b)) => assert_eq!(a.to_bits(), b.to_bits()),
                _ => assert_eq!(got, want),
            }
        }
    }

    #[test]
    fn test_subset_order_matches() {
        let table = TableDescriptor::<Everything>::for_record().unwrap();
        let binder = Binder::new(&table, &["int", "text"]);
        let record = Everything {
            int: 9,
            text: "x".into(),
            ..Default::default()
        };
        assert_eq!(
            binder.values(Some(&record)),
            vec![Value::Int(9), Value::String("x".into())]
        );
        assert_eq!(binder.column_types(), vec![ColumnType::Int, ColumnType::String]);
    }

    #[test]
    fn test_absent_record_is_empty() {
        let table = TableDescriptor::<Everything>::for_record().unwrap();
        let binder = Binder::new(&table, &[]);
        assert!(binder.values(None).is_empty());

        let mut targets = binder.scan_targets(None);
        assert!(targets.is_empty());
        assert!(targets.column_types().is_empty());
        targets.scan(sample_row()).unwrap();
    }

    #[test]
    fn test_scan_wrong_width() {
        let table = TableDescriptor::<Everything>::for_record().unwrap();
        let binder = Binder::new(&table, &["int"]);
        let mut record = Everything::default();
        let err = binder
            .scan_targets(Some(&mut record))
            .scan(vec![Value::Int(1), Value::Int(2)])
            .unwrap_err();
        assert!(matches!(err, RowmapError::ColumnCount { expected: 1, found: 2 }));
    }

    #[test]
    fn test_scan_type_mismatch() {
        let table = TableDescriptor::<Everything>::for_record().unwrap();
        let binder = Binder::new(&table, &["int"]);
        let mut record = Everything::default();
        let err = binder
            .scan_targets(Some(&mut record))
            .scan(vec![Value::String("1".into())])
            .unwrap_err();
        assert!(matches!(err, RowmapError::TypeMismatch { .. }));
    }
}
