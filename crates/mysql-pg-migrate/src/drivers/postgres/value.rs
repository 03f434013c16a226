//! Binding [`SqlValue`]s to PostgreSQL parameters.
//!
//! Source values arrive as a handful of loose kinds (most columns as text).
//! The conversion is driven by the parameter type PostgreSQL reports for the
//! placeholder, so `"2024-01-15"` becomes a DATE for a date column and stays
//! text for a varchar column. A value that does not fit its column is an
//! error, which rejects the whole statement.

use std::error::Error;

use bytes::{BufMut, BytesMut};
use chrono::{NaiveDate, NaiveDateTime, NaiveTime};
use tokio_postgres::types::{to_sql_checked, IsNull, ToSql, Type};

use crate::core::value::SqlValue;

type BoxError = Box<dyn Error + Sync + Send>;

const DATETIME_FORMATS: &[&str] = &["%Y-%m-%d %H:%M:%S%.f", "%Y-%m-%dT%H:%M:%S%.f"];

const NUMERIC_POS: u16 = 0x0000;
const NUMERIC_NEG: u16 = 0x4000;
/// Largest display scale the numeric wire format can carry.
const NUMERIC_MAX_DSCALE: usize = 0x3FFF;
/// Integer digits addressable by an i16 base-10000 weight.
const NUMERIC_MAX_INT_DIGITS: i64 = (i16::MAX as i64 + 1) * 4;

/// Parameter families we know how to encode.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
enum ParamKind {
    Int2,
    Int4,
    Int8,
    Float4,
    Float8,
    Numeric,
    Bool,
    Date,
    Timestamp,
    TimestampTz,
    Time,
    Json,
    Bytea,
    Text,
}

// `Type` constants are not patterns, hence the chain.
fn param_kind(ty: &Type) -> Option<ParamKind> {
    let kind = if *ty == Type::INT2 {
        ParamKind::Int2
    } else if *ty == Type::INT4 {
        ParamKind::Int4
    } else if *ty == Type::INT8 {
        ParamKind::Int8
    } else if *ty == Type::FLOAT4 {
        ParamKind::Float4
    } else if *ty == Type::FLOAT8 {
        ParamKind::Float8
    } else if *ty == Type::NUMERIC {
        ParamKind::Numeric
    } else if *ty == Type::BOOL {
        ParamKind::Bool
    } else if *ty == Type::DATE {
        ParamKind::Date
    } else if *ty == Type::TIMESTAMP {
        ParamKind::Timestamp
    } else if *ty == Type::TIMESTAMPTZ {
        ParamKind::TimestampTz
    } else if *ty == Type::TIME {
        ParamKind::Time
    } else if *ty == Type::JSON || *ty == Type::JSONB {
        ParamKind::Json
    } else if *ty == Type::BYTEA {
        ParamKind::Bytea
    } else if *ty == Type::TEXT
        || *ty == Type::VARCHAR
        || *ty == Type::BPCHAR
        || *ty == Type::NAME
        || *ty == Type::UNKNOWN
    {
        ParamKind::Text
    } else {
        return None;
    };
    Some(kind)
}

fn mismatch(value: &SqlValue, ty: &Type) -> BoxError {
    format!("cannot convert {} value to {}", value.kind(), ty).into()
}

fn parse_bool(text: &str) -> Option<bool> {
    match text.trim().to_ascii_lowercase().as_str() {
        "1" | "t" | "true" | "y" | "yes" => Some(true),
        "0" | "f" | "false" | "n" | "no" => Some(false),
        _ => None,
    }
}

fn parse_datetime(text: &str) -> Result<NaiveDateTime, BoxError> {
    let text = text.trim();
    for format in DATETIME_FORMATS {
        if let Ok(dt) = NaiveDateTime::parse_from_str(text, format) {
            return Ok(dt);
        }
    }
    let date = NaiveDate::parse_from_str(text, "%Y-%m-%d")?;
    date.and_hms_opt(0, 0, 0)
        .ok_or_else(|| format!("invalid timestamp '{}'", text).into())
}

fn parse_date(text: &str) -> Result<NaiveDate, BoxError> {
    match NaiveDate::parse_from_str(text.trim(), "%Y-%m-%d") {
        Ok(date) => Ok(date),
        Err(_) => Ok(parse_datetime(text)?.date()),
    }
}

/// Encode a decimal literal in PostgreSQL's binary NUMERIC layout.
///
/// Works on the digit string directly, so DECIMAL(65,30) values keep every
/// digit. Accepts an optional sign, a fraction and an `e` exponent.
fn encode_numeric(text: &str, out: &mut BytesMut) -> Result<(), BoxError> {
    let invalid = || -> BoxError { format!("invalid numeric '{}'", text).into() };
    let trimmed = text.trim();

    let (negative, unsigned) = match trimmed.as_bytes().first() {
        Some(b'-') => (true, &trimmed[1..]),
        Some(b'+') => (false, &trimmed[1..]),
        _ => (false, trimmed),
    };
    let (mantissa, exponent) = match unsigned.find(['e', 'E']) {
        Some(at) => (&unsigned[..at], unsigned[at + 1..].parse::<i64>().map_err(|_| invalid())?),
        None => (unsigned, 0),
    };
    let (int_part, frac_part) = mantissa.split_once('.').unwrap_or((mantissa, ""));
    let all_digits = |s: &str| s.bytes().all(|b| b.is_ascii_digit());
    if int_part.len() + frac_part.len() == 0 || !all_digits(int_part) || !all_digits(frac_part) {
        return Err(invalid());
    }

    // Move the decimal point by the exponent, padding with zeros as needed.
    let mut digits = format!("{}{}", int_part, frac_part);
    let point = (int_part.len() as i64).checked_add(exponent).ok_or_else(invalid)?;
    if point < -(NUMERIC_MAX_DSCALE as i64) || point > NUMERIC_MAX_INT_DIGITS {
        return Err(invalid());
    }
    let point = if point < 0 {
        digits.insert_str(0, &"0".repeat(point.unsigned_abs() as usize));
        0
    } else {
        let point = point as usize;
        if point > digits.len() {
            digits.push_str(&"0".repeat(point - digits.len()));
        }
        point
    };
    let (int_digits, frac_digits) = digits.split_at(point);
    let dscale = frac_digits.len();
    if dscale > NUMERIC_MAX_DSCALE {
        return Err(invalid());
    }

    // Base-10000 groups aligned on the decimal point.
    let int_digits = int_digits.trim_start_matches('0');
    let int_pad = (4 - int_digits.len() % 4) % 4;
    let frac_pad = (4 - frac_digits.len() % 4) % 4;
    let aligned = format!(
        "{}{}{}{}",
        "0".repeat(int_pad),
        int_digits,
        frac_digits,
        "0".repeat(frac_pad)
    );
    let mut groups: Vec<i16> = aligned
        .as_bytes()
        .chunks(4)
        .map(|chunk| chunk.iter().fold(0i16, |acc, d| acc * 10 + i16::from(d - b'0')))
        .collect();
    let mut weight = ((int_pad + int_digits.len()) / 4) as i64 - 1;

    let leading = groups.iter().take_while(|g| **g == 0).count();
    groups.drain(..leading);
    weight -= leading as i64;
    while groups.last() == Some(&0) {
        groups.pop();
    }
    if groups.is_empty() {
        weight = 0;
    }

    let ndigits = i16::try_from(groups.len()).map_err(|_| invalid())?;
    let weight = i16::try_from(weight).map_err(|_| invalid())?;
    let sign = if negative && !groups.is_empty() { NUMERIC_NEG } else { NUMERIC_POS };

    out.put_i16(ndigits);
    out.put_i16(weight);
    out.put_u16(sign);
    out.put_u16(dscale as u16);
    for group in groups {
        out.put_i16(group);
    }
    Ok(())
}

impl SqlValue {
    fn as_i64(&self, ty: &Type) -> Result<i64, BoxError> {
        match self {
            SqlValue::Int(v) => Ok(*v),
            SqlValue::Bool(b) => Ok(i64::from(*b)),
            SqlValue::Text(s) => Ok(s.trim().parse::<i64>()?),
            other => Err(mismatch(other, ty)),
        }
    }

    fn as_f64(&self, ty: &Type) -> Result<f64, BoxError> {
        match self {
            SqlValue::Float(v) => Ok(*v),
            SqlValue::Int(v) => Ok(*v as f64),
            SqlValue::Text(s) => Ok(s.trim().parse::<f64>()?),
            other => Err(mismatch(other, ty)),
        }
    }

    fn as_text(&self, ty: &Type) -> Result<String, BoxError> {
        match self {
            SqlValue::Text(s) => Ok(s.clone()),
            SqlValue::Int(v) => Ok(v.to_string()),
            SqlValue::Float(v) => Ok(v.to_string()),
            SqlValue::Bool(b) => Ok(b.to_string()),
            SqlValue::Bytes(b) => Ok(String::from_utf8(b.clone())?),
            SqlValue::Null => Err(mismatch(self, ty)),
        }
    }
}

impl ToSql for SqlValue {
    fn to_sql(&self, ty: &Type, out: &mut BytesMut) -> Result<IsNull, BoxError> {
        if self.is_null() {
            return Ok(IsNull::Yes);
        }
        let kind = param_kind(ty).ok_or_else(|| -> BoxError {
            format!("unsupported parameter type {}", ty).into()
        })?;

        match kind {
            ParamKind::Int2 => i16::try_from(self.as_i64(ty)?)?.to_sql(ty, out),
            ParamKind::Int4 => i32::try_from(self.as_i64(ty)?)?.to_sql(ty, out),
            ParamKind::Int8 => self.as_i64(ty)?.to_sql(ty, out),
            ParamKind::Float4 => (self.as_f64(ty)? as f32).to_sql(ty, out),
            ParamKind::Float8 => self.as_f64(ty)?.to_sql(ty, out),
            ParamKind::Numeric => {
                let text = match self {
                    SqlValue::Int(v) => v.to_string(),
                    SqlValue::Float(v) if v.is_finite() => v.to_string(),
                    SqlValue::Text(s) => s.clone(),
                    other => return Err(mismatch(other, ty)),
                };
                encode_numeric(&text, out)?;
                Ok(IsNull::No)
            }
            ParamKind::Bool => {
                let b = match self {
                    SqlValue::Bool(b) => *b,
                    SqlValue::Int(v) => *v != 0,
                    SqlValue::Text(s) => parse_bool(s)
                        .ok_or_else(|| -> BoxError { format!("invalid boolean '{}'", s).into() })?,
                    other => return Err(mismatch(other, ty)),
                };
                b.to_sql(ty, out)
            }
            ParamKind::Date => match self {
                SqlValue::Text(s) => parse_date(s)?.to_sql(ty, out),
                other => Err(mismatch(other, ty)),
            },
            ParamKind::Timestamp => match self {
                SqlValue::Text(s) => parse_datetime(s)?.to_sql(ty, out),
                other => Err(mismatch(other, ty)),
            },
            ParamKind::TimestampTz => match self {
                SqlValue::Text(s) => parse_datetime(s)?.and_utc().to_sql(ty, out),
                other => Err(mismatch(other, ty)),
            },
            ParamKind::Time => match self {
                SqlValue::Text(s) => NaiveTime::parse_from_str(s.trim(), "%H:%M:%S%.f")?.to_sql(ty, out),
                other => Err(mismatch(other, ty)),
            },
            ParamKind::Json => {
                let json: serde_json::Value = serde_json::from_str(&self.as_text(ty)?)?;
                json.to_sql(ty, out)
            }
            ParamKind::Bytea => match self {
                SqlValue::Bytes(b) => b.as_slice().to_sql(ty, out),
                SqlValue::Text(s) => s.as_bytes().to_sql(ty, out),
                other => Err(mismatch(other, ty)),
            },
            ParamKind::Text => self.as_text(ty)?.as_str().to_sql(ty, out),
        }
    }

    fn accepts(_ty: &Type) -> bool {
        true
    }

    to_sql_checked!();
}
