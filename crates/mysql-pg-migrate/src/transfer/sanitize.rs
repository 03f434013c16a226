//! Per-value cleanup applied to source rows before they are written.
//!
//! MySQL accepts values PostgreSQL rejects outright. Zero dates
//! (`0000-00-00`) and impossible calendar dates become NULL. Text with NUL
//! bytes cannot be stored at all, so the whole row is rejected.

use std::sync::LazyLock;

use chrono::NaiveDate;
use regex::Regex;

use crate::core::{Row, SqlValue};

static DATE_PREFIX: LazyLock<Regex> =
    LazyLock::new(|| Regex::new(r"^[0-9]{4}-[0-9]{2}-[0-9]{2}").expect("valid date prefix pattern"));

const ZERO_DATE: &str = "0000-00-00";

/// Check whether text looks like a date but is not a real calendar date.
///
/// Text without a `YYYY-MM-DD` prefix is never considered a date.
pub fn is_invalid_date(text: &str) -> bool {
    if !DATE_PREFIX.is_match(text) {
        return false;
    }
    if text.starts_with(ZERO_DATE) {
        return true;
    }
    // The prefix match guarantees the first ten bytes are ASCII.
    NaiveDate::parse_from_str(&text[..10], "%Y-%m-%d").is_err()
}

/// Sanitize one value.
///
/// Returns the reason when the value cannot be made acceptable.
pub fn sanitize_value(value: SqlValue) -> Result<SqlValue, String> {
    match value {
        SqlValue::Text(text) => {
            if is_invalid_date(&text) {
                Ok(SqlValue::Null)
            } else if text.contains('\0') {
                Err("text value contains a NUL byte".to_string())
            } else {
                Ok(SqlValue::Text(text))
            }
        }
        other => Ok(other),
    }
}

/// Sanitize every value of a row; any rejected value rejects the row.
pub fn sanitize_row(row: Row) -> Result<Row, String> {
    row.into_iter()
        .enumerate()
        .map(|(i, value)| sanitize_value(value).map_err(|reason| format!("column {}: {}", i + 1, reason)))
        .collect()
}

#[cfg(test)]
mod tests {
    use super::*;

    fn text(s: &str) -> SqlValue {
        SqlValue::Text(s.to_string())
    }

    #[test]
    fn test_zero_dates_become_null() {
        assert_eq!(sanitize_value(text("0000-00-00")).unwrap(), SqlValue::Null);
        assert_eq!(sanitize_value(text("0000-00-00 10:00:00")).unwrap(), SqlValue::Null);
    }

    #[test]
    fn test_valid_date_passes_unchanged() {
        assert_eq!(sanitize_value(text("2024-01-15")).unwrap(), text("2024-01-15"));
        assert_eq!(
            sanitize_value(text("2024-01-15 08:30:00.250")).unwrap(),
            text("2024-01-15 08:30:00.250")
        );
    }

    #[test]
    fn test_impossible_date_becomes_null() {
        assert_eq!(sanitize_value(text("2024-13-99")).unwrap(), SqlValue::Null);
        assert_eq!(sanitize_value(text("2023-02-29 00:00:00")).unwrap(), SqlValue::Null);
    }

    #[test]
    fn test_non_date_text_untouched() {
        assert_eq!(sanitize_value(text("order #2024")).unwrap(), text("order #2024"));
        assert_eq!(sanitize_value(text("20240115")).unwrap(), text("20240115"));
    }

    #[test]
    fn test_null_and_binary_pass_through() {
        assert_eq!(sanitize_value(SqlValue::Null).unwrap(), SqlValue::Null);
        let payload = SqlValue::Bytes(b"0000-00-00".to_vec());
        assert_eq!(sanitize_value(payload.clone()).unwrap(), payload);
        assert_eq!(sanitize_value(SqlValue::Int(7)).unwrap(), SqlValue::Int(7));
    }

    #[test]
    fn test_nul_byte_rejects_row() {
        let row = vec![SqlValue::Int(1), text("bad\0value")];
        let err = sanitize_row(row).unwrap_err();
        assert!(err.contains("column 2"));
    }

    #[test]
    fn test_row_sanitization_keeps_order() {
        let row = vec![SqlValue::Int(1), text("0000-00-00"), text("ok")];
        assert_eq!(
            sanitize_row(row).unwrap(),
            vec![SqlValue::Int(1), SqlValue::Null, text("ok")]
        );
    }
}
