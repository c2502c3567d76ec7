//! Filter predicates for compiled selects.
//!
//! Filters are joined with `AND` and numbered positionally (`$1`, `$2`, ...)
//! in list order.

use crate::value::Value;
use std::fmt;

/// Comparison operator of a filter.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub enum FilterOp {
    #[default]
    Eq,
}

impl FilterOp {
    pub fn as_sql(&self) -> &'static str {
        match self {
            FilterOp::Eq => "=",
        }
    }
}

/// A `(column, operator, value)` predicate.
#[derive(Debug, Clone, PartialEq)]
pub struct Filter {
    pub column: String,
    pub op: FilterOp,
    pub value: Value,
}

impl Filter {
    pub fn new(column: impl Into<String>, op: FilterOp, value: impl Into<Value>) -> Self {
        Self {
            column: column.into(),
            op,
            value: value.into(),
        }
    }

    /// Shorthand for an equality filter.
    pub fn eq(column: impl Into<String>, value: impl Into<Value>) -> Self {
        Self::new(column, FilterOp::Eq, value)
    }

    /// Render as `<column> <op> $<position>`.
    pub fn to_sql(&self, position: usize) -> String {
        format!("{} {} ${}", self.column, self.op.as_sql(), position)
    }
}

impl fmt::Display for Filter {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{} {} {}", self.column, self.op.as_sql(), self.value)
    }
}
