//! # rowmap
//!
//! Declare a record's columns once, get compiled SQL and typed binding.
//!
//! A [`Record`](table::Record) lists its columns with accessors into its
//! fields. From that description the crate renders `SELECT`, `INSERT`,
//! `CREATE TABLE` and `DROP TABLE` statements, binds record fields as
//! parameters and scans result rows back into records.
//!
//! ## Quick Example
//!
//! ```rust,ignore
//! use rowmap::prelude::*;
//!
//! #[derive(Debug, Default)]
//! struct User {
//!     id: i64,
//!     email: String,
//!     active: bool,
//! }
//!
//! impl Record for User {
//!     const TABLE: &'static str = "users";
//!
//!     fn columns() -> Vec<ColumnDef<Self>> {
//!         vec![
//!             rowmap::column!(User, id, "id", ColumnType::BigInt).primary_key(),
//!             rowmap::column!(User, email, "email", ColumnType::String).unique(),
//!             rowmap::column!(User, active, "active", ColumnType::Boolean),
//!         ]
//!     }
//! }
//!
//! let db = Database::connect("sqlite::memory:").await?;
//! db.create_table::<User>().await?;
//!
//! let insert = db.compile_insert::<User>(&[])?;
//! insert.run(&User { id: 1, email: "a@b.c".into(), active: true }).await?;
//!
//! let active = db.compile_query::<User>(&[Filter::eq("active", true)], &["id", "email"])?;
//! // => "SELECT id,email FROM users WHERE active = $1;"
//! let users = active.run().await?;
//! ```
//!
//! ## Layout
//!
//! | Module         | Role                                         |
//! |----------------|----------------------------------------------|
//! | [`column`]     | Column types and descriptors                 |
//! | [`dialect`]    | Abstract type to SQL type resolution         |
//! | [`table`]      | Table descriptors and the record pool        |
//! | [`registry`]   | Build-once descriptor cache                  |
//! | [`transpiler`] | Statement templates                          |
//! | [`binder`]     | Parameter lists and scan targets             |
//! | [`driver`]     | Connection boundary and the sqlx backend     |
//! | [`engine`]     | Compiled query, insert and batch insert      |
//! | [`dynamic`]    | Tables declared at runtime                   |

pub mod binder;
pub mod column;
pub mod config;
pub mod dialect;
pub mod driver;
pub mod dynamic;
pub mod engine;
pub mod error;
pub mod filter;
pub mod registry;
pub mod table;
pub mod transpiler;
pub mod value;

pub mod prelude {
    pub use crate::binder::{Binder, ScanTargets};
    pub use crate::column::{ColumnDef, ColumnDescriptor, ColumnType};
    pub use crate::config::Config;
    pub use crate::dialect::Dialect;
    pub use crate::driver::{Connection, ExecResult, SqlxConnection, Transaction};
    pub use crate::dynamic::{ColumnSpec, DynamicRow, TableDef};
    pub use crate::engine::{CompiledBatchInsert, CompiledInsert, CompiledQuery, Database};
    pub use crate::error::*;
    pub use crate::filter::{Filter, FilterOp};
    pub use crate::registry::Registry;
    pub use crate::table::{Record, RecordPool, TableDescriptor};
    pub use crate::transpiler::{Template, build_create_table, build_drop_table, build_insert, build_select};
    pub use crate::value::{FieldValue, Value};
}
