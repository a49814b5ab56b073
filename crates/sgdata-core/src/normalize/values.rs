//! Field-level coercions shared by every payload shape.

use serde_json::Value;

use crate::UtcDateTime;

const SENTINELS: [&str; 6] = ["", "na", "n.a.", "-", "null", "n/a"];

/// True for the "no data" markers upstream uses in place of a value.
pub fn is_sentinel(value: &str) -> bool {
    let trimmed = value.trim();
    SENTINELS
        .iter()
        .any(|sentinel| trimmed.eq_ignore_ascii_case(sentinel))
}

/// Trimmed text; numbers are rendered, sentinels and other shapes are unavailable.
pub fn text(value: Option<&Value>) -> Option<String> {
    match value? {
        Value::String(text) if !is_sentinel(text) => Some(text.trim().to_owned()),
        Value::Number(number) => Some(number.to_string()),
        _ => None,
    }
}

/// Number from a JSON number or a string-encoded one (`"4,350"` included).
pub fn number(value: Option<&Value>) -> Option<f64> {
    let parsed = match value? {
        Value::Number(number) => number.as_f64(),
        Value::String(text) if !is_sentinel(text) => {
            let cleaned: String = text.trim().chars().filter(|ch| *ch != ',').collect();
            cleaned.parse::<f64>().ok()
        }
        _ => None,
    };
    parsed.filter(|number| number.is_finite())
}

pub fn integer(value: Option<&Value>) -> Option<i64> {
    let number = number(value)?;
    (number.fract() == 0.0 && number.abs() < 9.0e15).then_some(number as i64)
}

pub fn unsigned(value: Option<&Value>) -> Option<u32> {
    integer(value).and_then(|number| u32::try_from(number).ok())
}

/// Leading four-digit year of `YYYY`, `YYYY-MM` or a full date.
pub fn year(value: Option<&Value>) -> Option<i32> {
    match value? {
        Value::Number(_) => integer(value).and_then(|year| i32::try_from(year).ok()),
        Value::String(text) => {
            let digits = text.trim().get(..4)?;
            if digits.chars().all(|ch| ch.is_ascii_digit()) {
                digits.parse().ok()
            } else {
                None
            }
        }
        _ => None,
    }
}

pub fn timestamp(value: Option<&Value>) -> Option<UtcDateTime> {
    value
        .and_then(Value::as_str)
        .and_then(|text| UtcDateTime::parse_local(text).ok())
}
