//! Tables declared at runtime.
//!
//! A [`TableDef`] is read from TOML and produces a descriptor over
//! [`DynamicRow`], a positional list of values. Used by the CLI and by
//! callers whose tables are not known at compile time.
//!
//! ```toml
//! schema = "shop"
//! name = "orders"
//!
//! [[columns]]
//! name = "id"
//! type = "big_int"
//! primary_key = true
//!
//! [[columns]]
//! name = "total"
//! type = "double"
//! ```

use crate::column::{ColumnDef, ColumnType};
use crate::error::{RowmapError, RowmapResult};
use crate::table::TableDescriptor;
use crate::value::Value;
use serde::{Deserialize, Serialize};
use std::path::Path;

/// One row of a runtime table; `values[i]` belongs to column `i`.
#[derive(Debug, Clone, Default, PartialEq)]
pub struct DynamicRow {
    pub values: Vec<Value>,
}

impl DynamicRow {
    pub fn new(values: Vec<Value>) -> Self {
        Self { values }
    }

    /// Value at `idx`, NULL when the row is shorter.
    pub fn get(&self, idx: usize) -> &Value {
        self.values.get(idx).unwrap_or(&Value::Null)
    }

    /// Store `value` at `idx`, growing the row with NULLs as needed.
    pub fn set(&mut self, idx: usize, value: Value) {
        if self.values.len() <= idx {
            self.values.resize(idx + 1, Value::Null);
        }
        self.values[idx] = value;
    }
}

/// Column declaration in a table file.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(deny_unknown_fields)]
pub struct ColumnSpec {
    pub name: String,
    #[serde(rename = "type")]
    pub column_type: ColumnType,
    #[serde(default)]
    pub primary_key: bool,
    #[serde(default)]
    pub indexed: bool,
    #[serde(default)]
    pub unique: bool,
}

/// Table declaration in a table file.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(deny_unknown_fields)]
pub struct TableDef {
    #[serde(default)]
    pub schema: Option<String>,
    pub name: String,
    pub columns: Vec<ColumnSpec>,
}

impl TableDef {
    pub fn from_toml(text: &str) -> RowmapResult<Self> {
        let def: TableDef = toml::from_str(text)?;
        if def.name.trim().is_empty() {
            return Err(RowmapError::Config("table name must not be empty".into()));
        }
        Ok(def)
    }

    pub fn load(path: impl AsRef<Path>) -> RowmapResult<Self> {
        let text = std::fs::read_to_string(path.as_ref())?;
        Self::from_toml(&text)
    }

    /// Position of a column by name.
    pub fn position(&self, name: &str) -> Option<usize> {
        self.columns.iter().position(|c| c.name == name)
    }

    pub fn column_type(&self, name: &str) -> Option<ColumnType> {
        self.columns.iter().find(|c| c.name == name).map(|c| c.column_type)
    }

    /// Build a descriptor whose columns read and write `DynamicRow`
    /// positions. Values written must carry the column's type or be NULL.
    pub fn to_descriptor(&self) -> RowmapResult<TableDescriptor<DynamicRow>> {
        let defs = self
            .columns
            .iter()
            .enumerate()
            .map(|(idx, spec)| column_def(idx, spec))
            .collect();
        TableDescriptor::build(self.schema.as_deref(), &self.name, defs)
    }

    /// Parse `name=value` pairs into a row laid out in column order.
    pub fn row_from_pairs<'a>(&self, pairs: impl IntoIterator<Item = (&'a str, &'a str)>) -> RowmapResult<DynamicRow> {
        let mut row = DynamicRow::new(vec![Value::Null; self.columns.len()]);
        for (name, text) in pairs {
            let idx = self.position(name).ok_or_else(|| RowmapError::UnknownColumn {
                table: self.name.clone(),
                column: name.to_string(),
            })?;
            row.set(idx, Value::parse_as(text, self.columns[idx].column_type)?);
        }
        Ok(row)
    }
}

fn column_def(idx: usize, spec: &ColumnSpec) -> ColumnDef<DynamicRow> {
    let ty = spec.column_type;
    let mut def = ColumnDef::with_accessors(
        spec.name.clone(),
        ty,
        move |row: &DynamicRow| row.get(idx).clone(),
        move |row: &mut DynamicRow, value: Value| {
            if value.column_type().is_some_and(|found| found != ty) {
                return Err(RowmapError::mismatch(ty, value.kind()));
            }
            row.set(idx, value);
            Ok(())
        },
    );
    if spec.primary_key {
        def = def.primary_key();
    }
    if spec.indexed {
        def = def.indexed();
    }
    if spec.unique {
        def = def.unique();
    }
    def
}
