use std::{cmp::Ordering, fmt};

use chrono::{Datelike, NaiveDate};

use crate::error::{Result, StatsError};

/// Raw tokens that denote a missing cell.
const MISSING_TOKENS: &[&str] = &["", "na", "n/a", "nan", "null", "none", "<na>", "#n/a"];

/// Slash and dash dates are day-first (`dd/mm/yyyy`), as in SINAN exports.
const DATE_FORMATS: &[&str] = &["%Y-%m-%d", "%d/%m/%Y", "%Y/%m/%d", "%d-%m-%Y"];

/// A single typed cell. Missing cells are represented as `None` around it.
#[derive(Debug, Clone)]
pub enum Value {
    String(String),
    Integer(i64),
    Float(f64),
    Date(NaiveDate),
}

impl Value {
    /// Types a raw CSV field. Returns `None` for the missing markers.
    pub fn infer(raw: &str) -> Option<Value> {
        let trimmed = raw.trim();
        if is_missing_token(trimmed) {
            return None;
        }
        if let Ok(i) = trimmed.parse::<i64>() {
            return Some(Value::Integer(i));
        }
        if let Ok(f) = trimmed.parse::<f64>() {
            return Some(Value::Float(f));
        }
        if let Ok(d) = parse_naive_date(trimmed) {
            return Some(Value::Date(d));
        }
        Some(Value::String(trimmed.to_string()))
    }

    pub fn as_display(&self) -> String {
        match self {
            Value::String(s) => s.clone(),
            Value::Integer(i) => i.to_string(),
            Value::Float(f) => {
                if f.fract() == 0.0 && f.is_finite() {
                    (*f as i64).to_string()
                } else {
                    f.to_string()
                }
            }
            Value::Date(d) => d.format("%Y-%m-%d").to_string(),
        }
    }

    /// Reads the value as a calendar date, parsing strings on the fly.
    pub fn as_date(&self) -> Option<NaiveDate> {
        match self {
            Value::Date(d) => Some(*d),
            Value::String(s) => parse_naive_date(s).ok(),
            _ => None,
        }
    }

    pub fn as_f64(&self) -> Option<f64> {
        match self {
            Value::Integer(i) => Some(*i as f64),
            Value::Float(f) => Some(*f),
            _ => None,
        }
    }

    fn rank(&self) -> u8 {
        match self {
            Value::Integer(_) | Value::Float(_) => 0,
            Value::Date(_) => 1,
            Value::String(_) => 2,
        }
    }
}

impl Ord for Value {
    fn cmp(&self, other: &Self) -> Ordering {
        match (self, other) {
            (Value::Integer(a), Value::Integer(b)) => a.cmp(b),
            (Value::Float(a), Value::Float(b)) => compare_floats(*a, *b),
            (Value::Integer(a), Value::Float(b)) => compare_integer_float(*a, *b),
            (Value::Float(a), Value::Integer(b)) => compare_integer_float(*b, *a).reverse(),
            (Value::Date(a), Value::Date(b)) => a.cmp(b),
            (Value::String(a), Value::String(b)) => a.cmp(b),
            _ => self.rank().cmp(&other.rank()),
        }
    }
}

/// `-0.0 == 0.0`; NaN sorts above (positive) or below (negative) every number.
fn compare_floats(a: f64, b: f64) -> Ordering {
    a.partial_cmp(&b).unwrap_or_else(|| a.total_cmp(&b))
}

/// Compares by exact numeric value. Casting the integer to `f64` would make
/// distinct integers above 2^53 equal to the same float.
fn compare_integer_float(int: i64, float: f64) -> Ordering {
    const TWO_POW_63: f64 = 9_223_372_036_854_775_808.0;
    if float.is_nan() {
        return if float.is_sign_negative() {
            Ordering::Greater
        } else {
            Ordering::Less
        };
    }
    if float >= TWO_POW_63 {
        return Ordering::Less;
    }
    if float < -TWO_POW_63 {
        return Ordering::Greater;
    }
    let whole = float.trunc();
    // In range, so the cast is exact.
    match int.cmp(&(whole as i64)) {
        Ordering::Equal => whole.partial_cmp(&float).unwrap_or(Ordering::Equal),
        unequal => unequal,
    }
}

impl PartialOrd for Value {
    fn partial_cmp(&self, other: &Self) -> Option<Ordering> {
        Some(self.cmp(other))
    }
}

impl PartialEq for Value {
    fn eq(&self, other: &Self) -> bool {
        self.cmp(other) == Ordering::Equal
    }
}

impl Eq for Value {}

impl fmt::Display for Value {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.as_display())
    }
}

pub fn is_missing_token(raw: &str) -> bool {
    MISSING_TOKENS
        .iter()
        .any(|token| raw.eq_ignore_ascii_case(token))
}

pub fn parse_naive_date(value: &str) -> Result<NaiveDate> {
    let trimmed = value.trim();
    // Timestamps such as `2024-01-05 00:00:00` keep only their date part.
    let date_part = trimmed.split([' ', 'T']).next().unwrap_or(trimmed);
    for fmt in DATE_FORMATS {
        if let Ok(parsed) = NaiveDate::parse_from_str(date_part, fmt) {
            return Ok(parsed);
        }
    }
    Err(StatsError::InvalidDate(format!(
        "failed to parse '{value}' as date"
    )))
}

/// Calendar month (1-12) of a cell, when it holds a date.
pub fn month_of(value: &Value) -> Option<u32> {
    value.as_date().map(|d| d.month())
}
