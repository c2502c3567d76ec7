//! Error types for rowmap.

use crate::column::ColumnType;
use thiserror::Error;

/// The main error type for rowmap operations.
#[derive(Debug, Error)]
pub enum RowmapError {
    /// Two fields of one record declared the same column name.
    #[error("Duplicate column '{column}' in table '{table}'")]
    DuplicateColumn { table: String, column: String },

    /// The Rust field type cannot carry the declared column type.
    #[error("Column '{column}': field type {field_type} cannot hold {column_type:?}")]
    UnsupportedFieldType {
        column: String,
        column_type: ColumnType,
        field_type: &'static str,
    },

    /// A requested column is not part of the table.
    #[error("Unknown column '{column}' in table '{table}'")]
    UnknownColumn { table: String, column: String },

    /// A value of the wrong variant was handed to a field.
    #[error("Type mismatch: expected {expected:?}, found {found}")]
    TypeMismatch {
        expected: ColumnType,
        found: &'static str,
    },

    /// NULL was scanned into a field that cannot be absent.
    #[error("Unexpected NULL for {0:?} field")]
    UnexpectedNull(ColumnType),

    /// A driver row does not line up with the scan targets.
    #[error("Row has {found} values, expected {expected}")]
    ColumnCount { expected: usize, found: usize },

    /// No connection has been configured yet.
    #[error("Database not initialized")]
    NotInitialized,

    /// Unknown database mode / dialect name.
    #[error("Invalid db mode: '{0}'")]
    InvalidMode(String),

    /// Connection string is not `<proto>://<value>`.
    #[error("Invalid db conn string: '{0}'")]
    InvalidConnString(String),

    /// Error reported by sqlx.
    #[error("Database error: {0}")]
    Database(#[from] sqlx::Error),

    /// Execution error from a non-sqlx connection.
    #[error("Execution error: {0}")]
    Execution(String),

    /// The statement deadline elapsed.
    #[error("Statement timed out after {0} ms")]
    Timeout(u64),

    /// A batch row failed and the rollback failed too.
    #[error("{cause} & rollback failed due to: {rollback}")]
    Rollback {
        cause: Box<RowmapError>,
        rollback: Box<RowmapError>,
    },

    /// Configuration error.
    #[error("Configuration error: {0}")]
    Config(String),

    /// TOML decode error.
    #[error("TOML error: {0}")]
    Toml(#[from] toml::de::Error),

    /// IO error.
    #[error("IO error: {0}")]
    Io(#[from] std::io::Error),
}

impl RowmapError {
    /// Create a type mismatch error.
    pub fn mismatch(expected: ColumnType, found: &'static str) -> Self {
        Self::TypeMismatch { expected, found }
    }

    /// Combine a row failure with the failure of the rollback that followed it.
    pub fn rollback(cause: RowmapError, rollback: RowmapError) -> Self {
        Self::Rollback {
            cause: Box::new(cause),
            rollback: Box::new(rollback),
        }
    }

    /// True for the configuration sentinels (`NotInitialized`, `InvalidMode`,
    /// `InvalidConnString`), as opposed to I/O or driver failures.
    pub fn is_configuration(&self) -> bool {
        matches!(
            self,
            Self::NotInitialized | Self::InvalidMode(_) | Self::InvalidConnString(_)
        )
    }
}

/// Result type alias for rowmap operations.
pub type RowmapResult<T> = Result<T, RowmapError>;
