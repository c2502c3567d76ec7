//! Conversions shared by the native backends.

use crate::column::ColumnType;
use crate::error::{RowmapError, RowmapResult};
use crate::value::{DATE_FORMAT, DATETIME_FORMAT};
use chrono::{DateTime, NaiveDate, NaiveDateTime, TimeZone, Utc};
use rust_decimal::Decimal;

/// Timestamps are stored as signed epoch nanoseconds, which covers the years
/// 1677 through 2262.
pub(crate) fn timestamp_to_nanos(ts: &DateTime<Utc>) -> RowmapResult<i64> {
    ts.timestamp_nanos_opt()
        .ok_or_else(|| RowmapError::mismatch(ColumnType::Timestamp, "timestamp outside the nanosecond range"))
}

pub(crate) fn timestamp_from_nanos(nanos: i64) -> DateTime<Utc> {
    Utc.timestamp_nanos(nanos)
}

/// `u64` shares the 64 bits of an `i64` column; `u64::MAX` is stored as `-1`.
pub(crate) fn biguint_to_i64(v: u64) -> i64 {
    v as i64
}

pub(crate) fn biguint_from_i64(v: i64) -> u64 {
    v as u64
}

/// Narrow a stored integer into the column's width.
pub(crate) fn narrow<N: TryFrom<i64>>(ty: ColumnType, v: i64) -> RowmapResult<N> {
    N::try_from(v).map_err(|_| RowmapError::mismatch(ty, "out-of-range integer"))
}

pub(crate) fn parse_datetime(text: &str) -> RowmapResult<NaiveDateTime> {
    NaiveDateTime::parse_from_str(text, DATETIME_FORMAT)
        .map_err(|_| RowmapError::mismatch(ColumnType::Datetime, "unparsable text"))
}

pub(crate) fn parse_date(text: &str) -> RowmapResult<NaiveDate> {
    NaiveDate::parse_from_str(text, DATE_FORMAT).map_err(|_| RowmapError::mismatch(ColumnType::Date, "unparsable text"))
}

/// Exact parse; scale is kept (`"12.60"` stays `12.60`).
pub(crate) fn parse_decimal(text: &str) -> RowmapResult<Decimal> {
    text.parse::<Decimal>()
        .map_err(|_| RowmapError::mismatch(ColumnType::Decimal, "unparsable text"))
}

pub(crate) fn check_width(found: usize, expected: usize) -> RowmapResult<()> {
    if found != expected {
        return Err(RowmapError::ColumnCount { expected, found });
    }
    Ok(())
}
