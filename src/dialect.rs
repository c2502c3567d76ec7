//! SQL dialects and the abstract-type → SQL-type resolver.

use crate::column::ColumnType;
use crate::error::{RowmapError, RowmapResult};
use serde::{Deserialize, Serialize};
use std::fmt;
use std::str::FromStr;

/// Supported SQL backend families.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Default, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum Dialect {
    #[default]
    Postgres,
    Sqlite,
}

impl Dialect {
    /// SQL type text for `ty` in this dialect. Total over every column type.
    pub fn resolve(&self, ty: ColumnType) -> &'static str {
        match self {
            Dialect::Sqlite => sqlite_type(ty),
            Dialect::Postgres => postgres_type(ty),
        }
    }

    /// Detect the dialect from a connection URL scheme.
    ///
    /// Accepts the driver names and their aliases: `postgres`, `postgresql`,
    /// `pg`, `pgx`, `sqlite`, `sqlite3`.
    pub fn from_url(url: &str) -> RowmapResult<Self> {
        let (proto, rest) = url
            .split_once(':')
            .ok_or_else(|| RowmapError::InvalidConnString(url.to_string()))?;
        if rest.is_empty() {
            return Err(RowmapError::InvalidConnString(url.to_string()));
        }
        proto.parse()
    }

    /// Rewrite an aliased URL into the scheme sqlx expects.
    pub fn normalize_url(&self, url: &str) -> String {
        let rest = url.split_once(':').map(|(_, rest)| rest).unwrap_or(url);
        match self {
            Dialect::Postgres => format!("postgres:{}", rest),
            Dialect::Sqlite => format!("sqlite:{}", rest),
        }
    }
}

impl FromStr for Dialect {
    type Err = RowmapError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s.to_ascii_lowercase().as_str() {
            "postgres" | "postgresql" | "pg" | "pgx" => Ok(Dialect::Postgres),
            "sqlite" | "sqlite3" => Ok(Dialect::Sqlite),
            other => Err(RowmapError::InvalidMode(other.to_string())),
        }
    }
}

impl fmt::Display for Dialect {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Dialect::Postgres => write!(f, "postgres"),
            Dialect::Sqlite => write!(f, "sqlite"),
        }
    }
}

fn sqlite_type(ty: ColumnType) -> &'static str {
    match ty {
        ColumnType::Blob => "BLOB",
        ColumnType::String => "TEXT",
        ColumnType::TinyUint
        | ColumnType::Uint
        | ColumnType::BigUint
        | ColumnType::TinyInt
        | ColumnType::Int
        | ColumnType::BigInt => "INTEGER",
        ColumnType::Timestamp => "INTEGER",
        ColumnType::Date | ColumnType::Datetime | ColumnType::Decimal => "TEXT",
        ColumnType::Single | ColumnType::Double => "REAL",
        ColumnType::Boolean => "INTEGER",
    }
}

// Timestamps are epoch nanoseconds, past what TIMESTAMP can hold.
fn postgres_type(ty: ColumnType) -> &'static str {
    match ty {
        ColumnType::Blob => "BYTEA",
        ColumnType::String => "TEXT",
        ColumnType::TinyUint | ColumnType::TinyInt => "SMALLINT",
        ColumnType::Int => "INTEGER",
        ColumnType::Uint | ColumnType::BigUint | ColumnType::BigInt => "BIGINT",
        ColumnType::Timestamp => "BIGINT",
        ColumnType::Date => "DATE",
        ColumnType::Datetime => "TIMESTAMP",
        ColumnType::Decimal => "NUMERIC",
        ColumnType::Single => "REAL",
        ColumnType::Double => "DOUBLE PRECISION",
        ColumnType::Boolean => "BOOLEAN",
    }
}
