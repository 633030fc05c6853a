//! SQL literal rendering.
//!
//! Bulk statements are sent as text with their values inlined, so every
//! value written by the engine goes through [`render_literal`].

use crate::timestamp::{format_date, format_time, format_timestamp};
use sqlbulk_core::{Error, Result, TypeError, Value};

/// Render a value as a SQL literal.
///
/// `NULL` is emitted bare; everything else is a quoted, escaped string or a
/// hex blob literal:
///
/// ```
/// use sqlbulk::{Value, render_literal};
///
/// assert_eq!(render_literal(&Value::Null).unwrap(), "NULL");
/// assert_eq!(render_literal(&Value::Int(42)).unwrap(), "'42'");
/// assert_eq!(render_literal(&Value::from("O'Brien")).unwrap(), r"'O\'Brien'");
/// ```
pub fn render_literal(value: &Value) -> Result<String> {
    let text = match value {
        Value::Null => return Ok("NULL".to_string()),
        Value::Bytes(bytes) => return Ok(hex_literal(bytes)),
        Value::Bool(b) => String::from(if *b { "1" } else { "0" }),
        Value::TinyInt(v) => v.to_string(),
        Value::SmallInt(v) => v.to_string(),
        Value::Int(v) => v.to_string(),
        Value::BigInt(v) => v.to_string(),
        Value::Float(v) => finite_f32(*v)?.to_string(),
        Value::Double(v) => finite(*v)?.to_string(),
        Value::Decimal(s) | Value::Text(s) => s.clone(),
        Value::Date(days) => format_date(*days)?,
        Value::Time(micros) => format_time(*micros)?,
        Value::Timestamp(micros) | Value::TimestampTz(micros) => format_timestamp(*micros)?,
        Value::Uuid(bytes) => format_uuid(bytes),
        Value::Json(json) => serde_json::to_string(json)?,
        Value::Array(_) => serde_json::to_string(&value_to_json(value)?)?,
    };
    Ok(quote(&text))
}

/// Escape a string for use inside a single-quoted literal.
///
/// Backslash, both quote characters and NUL, LF, CR and Ctrl-Z are
/// backslash-escaped.
pub fn escape_str(input: &str) -> String {
    let mut out = String::with_capacity(input.len());
    for ch in input.chars() {
        match ch {
            '\\' => out.push_str("\\\\"),
            '\'' => out.push_str("\\'"),
            '"' => out.push_str("\\\""),
            '\0' => out.push_str("\\0"),
            '\n' => out.push_str("\\n"),
            '\r' => out.push_str("\\r"),
            '\u{1a}' => out.push_str("\\Z"),
            c => out.push(c),
        }
    }
    out
}

fn quote(text: &str) -> String {
    format!("'{}'", escape_str(text))
}

fn finite(v: f64) -> Result<f64> {
    if v.is_finite() {
        Ok(v)
    } else {
        Err(non_finite(v.to_string()))
    }
}

fn finite_f32(v: f32) -> Result<f32> {
    if v.is_finite() {
        Ok(v)
    } else {
        Err(non_finite(v.to_string()))
    }
}

fn non_finite(actual: String) -> Error {
    Error::Type(TypeError {
        expected: "finite number",
        actual,
        column: None,
    })
}

/// Widen an `f32` through its shortest decimal form, so `0.1_f32` stays `0.1`.
fn widen_f32(v: f32) -> Result<f64> {
    finite_f32(v)?
        .to_string()
        .parse()
        .map_err(|e| Error::Serde(format!("{v} is not a valid number: {e}")))
}

fn hex_literal(bytes: &[u8]) -> String {
    let mut out = String::with_capacity(bytes.len() * 2 + 3);
    out.push_str("X'");
    for &b in bytes {
        push_hex(&mut out, b, b"0123456789ABCDEF");
    }
    out.push('\'');
    out
}

fn format_uuid(bytes: &[u8; 16]) -> String {
    let mut out = String::with_capacity(36);
    for (i, &b) in bytes.iter().enumerate() {
        if matches!(i, 4 | 6 | 8 | 10) {
            out.push('-');
        }
        push_hex(&mut out, b, b"0123456789abcdef");
    }
    out
}

fn push_hex(out: &mut String, byte: u8, digits: &[u8; 16]) {
    out.push(char::from(digits[usize::from(byte >> 4)]));
    out.push(char::from(digits[usize::from(byte & 0x0f)]));
}

/// Convert an array value into a JSON document for its text form.
fn value_to_json(value: &Value) -> Result<serde_json::Value> {
    use serde_json::Value as Json;

    let json = match value {
        Value::Null => Json::Null,
        Value::Bool(b) => Json::Bool(*b),
        Value::Json(json) => json.clone(),
        Value::Array(items) => Json::Array(
            items
                .iter()
                .map(value_to_json)
                .collect::<Result<Vec<_>>>()?,
        ),
        Value::Float(v) => number(widen_f32(*v)?)?,
        Value::Double(v) => number(*v)?,
        Value::Bytes(_) => {
            return Err(Error::Serde(
                "binary values cannot be nested in an array".into(),
            ));
        }
        other => match other.as_i64() {
            Some(i) => Json::from(i),
            None => Json::String(scalar_text(other)?),
        },
    };
    Ok(json)
}

fn number(v: f64) -> Result<serde_json::Value> {
    serde_json::Number::from_f64(finite(v)?)
        .map(serde_json::Value::Number)
        .ok_or_else(|| Error::Serde(format!("{v} is not representable in JSON")))
}

fn scalar_text(value: &Value) -> Result<String> {
    Ok(match value {
        Value::Decimal(s) | Value::Text(s) => s.clone(),
        Value::Date(days) => format_date(*days)?,
        Value::Time(micros) => format_time(*micros)?,
        Value::Timestamp(micros) | Value::TimestampTz(micros) => format_timestamp(*micros)?,
        Value::Uuid(bytes) => format_uuid(bytes),
        other => other.type_name().to_string(),
    })
}
