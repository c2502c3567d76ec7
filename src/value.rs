//! Tagged values moved between records and the driver.
//!
//! Every abstract [`ColumnType`] has exactly one [`Value`] variant, so binding
//! a parameter or scanning a result is an exhaustive match instead of a
//! type-erased cast.

use crate::column::ColumnType;
use crate::error::{RowmapError, RowmapResult};
use chrono::{DateTime, NaiveDate, NaiveDateTime, Utc};
use rust_decimal::Decimal;
use std::fmt;

/// Dynamic value for parameters and scan results.
#[derive(Debug, Clone, PartialEq)]
pub enum Value {
    Null,
    Blob(Vec<u8>),
    String(String),
    TinyUint(u8),
    Uint(u32),
    BigUint(u64),
    TinyInt(i8),
    Int(i32),
    BigInt(i64),
    Timestamp(DateTime<Utc>),
    Datetime(NaiveDateTime),
    Date(NaiveDate),
    Single(f32),
    Double(f64),
    Decimal(Decimal),
    Boolean(bool),
}

impl Value {
    /// The abstract column type this value carries, `None` for NULL.
    pub fn column_type(&self) -> Option<ColumnType> {
        Some(match self {
            Value::Null => return None,
            Value::Blob(_) => ColumnType::Blob,
            Value::String(_) => ColumnType::String,
            Value::TinyUint(_) => ColumnType::TinyUint,
            Value::Uint(_) => ColumnType::Uint,
            Value::BigUint(_) => ColumnType::BigUint,
            Value::TinyInt(_) => ColumnType::TinyInt,
            Value::Int(_) => ColumnType::Int,
            Value::BigInt(_) => ColumnType::BigInt,
            Value::Timestamp(_) => ColumnType::Timestamp,
            Value::Datetime(_) => ColumnType::Datetime,
            Value::Date(_) => ColumnType::Date,
            Value::Single(_) => ColumnType::Single,
            Value::Double(_) => ColumnType::Double,
            Value::Decimal(_) => ColumnType::Decimal,
            Value::Boolean(_) => ColumnType::Boolean,
        })
    }

    /// Short variant name, used in mismatch errors.
    pub fn kind(&self) -> &'static str {
        match self {
            Value::Null => "null",
            Value::Blob(_) => "blob",
            Value::String(_) => "string",
            Value::TinyUint(_) => "tiny_uint",
            Value::Uint(_) => "uint",
            Value::BigUint(_) => "big_uint",
            Value::TinyInt(_) => "tiny_int",
            Value::Int(_) => "int",
            Value::BigInt(_) => "big_int",
            Value::Timestamp(_) => "timestamp",
            Value::Datetime(_) => "datetime",
            Value::Date(_) => "date",
            Value::Single(_) => "single",
            Value::Double(_) => "double",
            Value::Decimal(_) => "decimal",
            Value::Boolean(_) => "boolean",
        }
    }

    pub fn is_null(&self) -> bool {
        matches!(self, Value::Null)
    }

    /// Parse user-supplied text (CLI bindings, TOML defaults) as `ty`.
    pub fn parse_as(text: &str, ty: ColumnType) -> RowmapResult<Value> {
        let bad = || RowmapError::mismatch(ty, "unparsable text");
        Ok(match ty {
            ColumnType::Blob => Value::Blob(text.as_bytes().to_vec()),
            ColumnType::String => Value::String(text.to_string()),
            ColumnType::TinyUint => Value::TinyUint(text.parse().map_err(|_| bad())?),
            ColumnType::Uint => Value::Uint(text.parse().map_err(|_| bad())?),
            ColumnType::BigUint => Value::BigUint(text.parse().map_err(|_| bad())?),
            ColumnType::TinyInt => Value::TinyInt(text.parse().map_err(|_| bad())?),
            ColumnType::Int => Value::Int(text.parse().map_err(|_| bad())?),
            ColumnType::BigInt => Value::BigInt(text.parse().map_err(|_| bad())?),
            ColumnType::Timestamp => Value::Timestamp(
                DateTime::parse_from_rfc3339(text)
                    .map_err(|_| bad())?
                    .with_timezone(&Utc),
            ),
            ColumnType::Datetime => Value::Datetime(
                NaiveDateTime::parse_from_str(text, DATETIME_FORMAT).map_err(|_| bad())?,
            ),
            ColumnType::Date => {
                Value::Date(NaiveDate::parse_from_str(text, DATE_FORMAT).map_err(|_| bad())?)
            }
            ColumnType::Single => Value::Single(text.parse().map_err(|_| bad())?),
            ColumnType::Double => Value::Double(text.parse().map_err(|_| bad())?),
            ColumnType::Decimal => Value::Decimal(text.parse().map_err(|_| bad())?),
            ColumnType::Boolean => match text {
                "true" | "1" => Value::Boolean(true),
                "false" | "0" => Value::Boolean(false),
                _ => return Err(bad()),
            },
        })
    }
}

/// Text layout for `Datetime` values stored as text.
pub const DATETIME_FORMAT: &str = "%Y-%m-%d %H:%M:%S%.f";
/// Text layout for `Date` values stored as text.
pub const DATE_FORMAT: &str = "%Y-%m-%d";

impl fmt::Display for Value {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Value::Null => write!(f, "NULL"),
            Value::Blob(b) => write!(f, "<{} bytes>", b.len()),
            Value::String(s) => write!(f, "'{}'", s),
            Value::TinyUint(v) => write!(f, "{}", v),
            Value::Uint(v) => write!(f, "{}", v),
            Value::BigUint(v) => write!(f, "{}", v),
            Value::TinyInt(v) => write!(f, "{}", v),
            Value::Int(v) => write!(f, "{}", v),
            Value::BigInt(v) => write!(f, "{}", v),
            Value::Timestamp(v) => write!(f, "{}", v.to_rfc3339()),
            Value::Datetime(v) => write!(f, "{}", v.format(DATETIME_FORMAT)),
            Value::Date(v) => write!(f, "{}", v.format(DATE_FORMAT)),
            Value::Single(v) => write!(f, "{}", v),
            Value::Double(v) => write!(f, "{}", v),
            Value::Decimal(v) => write!(f, "{}", v),
            Value::Boolean(v) => write!(f, "{}", v),
        }
    }
}

/// A Rust field type that can be stored in a column.
///
/// `accepts` is checked once, when the table descriptor is built; after that
/// the conversions run without any name lookup.
pub trait FieldValue: Sized + Send + Sync + 'static {
    /// Whether this field type can hold a column of type `ty`.
    fn accepts(ty: ColumnType) -> bool;

    fn to_value(&self) -> Value;

    fn from_value(value: Value) -> RowmapResult<Self>;
}

macro_rules! impl_field_value {
    ($rust:ty, $variant:ident) => {
        impl FieldValue for $rust {
            fn accepts(ty: ColumnType) -> bool {
                ty == ColumnType::$variant
            }

            fn to_value(&self) -> Value {
                Value::$variant(self.clone())
            }

            fn from_value(value: Value) -> RowmapResult<Self> {
                match value {
                    Value::$variant(v) => Ok(v),
                    Value::Null => Err(RowmapError::UnexpectedNull(ColumnType::$variant)),
                    other => Err(RowmapError::mismatch(ColumnType::$variant, other.kind())),
                }
            }
        }
    };
}

impl_field_value!(Vec<u8>, Blob);
impl_field_value!(String, String);
impl_field_value!(u8, TinyUint);
impl_field_value!(u32, Uint);
impl_field_value!(u64, BigUint);
impl_field_value!(i8, TinyInt);
impl_field_value!(i32, Int);
impl_field_value!(i64, BigInt);
impl_field_value!(DateTime<Utc>, Timestamp);
impl_field_value!(NaiveDateTime, Datetime);
impl_field_value!(NaiveDate, Date);
impl_field_value!(f32, Single);
impl_field_value!(f64, Double);
impl_field_value!(Decimal, Decimal);
impl_field_value!(bool, Boolean);

/// Nullable columns.
impl<F: FieldValue> FieldValue for Option<F> {
    fn accepts(ty: ColumnType) -> bool {
        F::accepts(ty)
    }

    fn to_value(&self) -> Value {
        match self {
            Some(v) => v.to_value(),
            None => Value::Null,
        }
    }

    fn from_value(value: Value) -> RowmapResult<Self> {
        match value {
            Value::Null => Ok(None),
            other => F::from_value(other).map(Some),
        }
    }
}

// Conversions for call sites building filters and bindings.
impl From<bool> for Value {
    fn from(v: bool) -> Self {
        Value::Boolean(v)
    }
}

impl From<i32> for Value {
    fn from(v: i32) -> Self {
        Value::Int(v)
    }
}

impl From<i64> for Value {
    fn from(v: i64) -> Self {
        Value::BigInt(v)
    }
}

impl From<u64> for Value {
    fn from(v: u64) -> Self {
        Value::BigUint(v)
    }
}

impl From<f64> for Value {
    fn from(v: f64) -> Self {
        Value::Double(v)
    }
}

impl From<&str> for Value {
    fn from(v: &str) -> Self {
        Value::String(v.to_string())
    }
}

impl From<String> for Value {
    fn from(v: String) -> Self {
        Value::String(v)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_value_from() {
        assert_eq!(Value::from(true), Value::Boolean(true));
        assert_eq!(Value::from(42i64), Value::BigInt(42));
        assert_eq!(Value::from("alice"), Value::String("alice".into()));
    }

    #[test]
    fn test_field_value_mismatch() {
        let err = i64::from_value(Value::String("x".into())).unwrap_err();
        assert!(matches!(
            err,
            RowmapError::TypeMismatch {
                expected: ColumnType::BigInt,
                found: "string"
            }
        ));
    }

    #[test]
    fn test_option_null() {
        assert_eq!(Option::<i32>::from_value(Value::Null).unwrap(), None);
        assert_eq!(Option::<i32>::from_value(Value::Int(3)).unwrap(), Some(3));
        assert!(matches!(
            i32::from_value(Value::Null),
            Err(RowmapError::UnexpectedNull(ColumnType::Int))
        ));
    }

    #[test]
    fn test_accepts() {
        assert!(u64::accepts(ColumnType::BigUint));
        assert!(!u64::accepts(ColumnType::BigInt));
        assert!(Option::<String>::accepts(ColumnType::String));
    }

    #[test]
    fn test_parse_as() {
        assert_eq!(Value::parse_as("7", ColumnType::TinyUint).unwrap(), Value::TinyUint(7));
        assert_eq!(Value::parse_as("true", ColumnType::Boolean).unwrap(), Value::Boolean(true));
        assert_eq!(
            Value::parse_as("2024-02-29", ColumnType::Date).unwrap(),
            Value::Date(NaiveDate::from_ymd_opt(2024, 2, 29).unwrap())
        );
        assert!(Value::parse_as("-1", ColumnType::Uint).is_err());
    }
}
