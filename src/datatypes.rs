//! Base datatypes
//!
//! Every leaf element carries one of six base datatypes. Raw values are kept
//! as text in documents; this module parses them into [`TypedValue`]s,
//! formats them back in canonical form, and coerces between datatypes.

use crate::error::{Error, Result};
use chrono::{Duration, NaiveDate, NaiveDateTime};
use once_cell::sync::Lazy;
use regex::Regex;
use std::cmp::Ordering;
use std::fmt;

/// Canonical datetime format used when writing values
pub const DATETIME_FORMAT: &str = "%Y-%m-%d %H:%M:%S";

const DATETIME_INPUT_FORMATS: &[&str] = &[
    "%Y-%m-%d %H:%M:%S%.f",
    "%Y-%m-%dT%H:%M:%S%.f",
    "%Y-%m-%d %H:%M",
];

static ISO_DURATION: Lazy<Regex> = Lazy::new(|| {
    Regex::new(r"^(-)?P(?:(\d+)W)?(?:(\d+)D)?(?:T(?:(\d+)H)?(?:(\d+)M)?(?:(\d+(?:\.\d+)?)S)?)?$")
        .unwrap()
});

/// Primitive value kind of a leaf element
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum BaseDataType {
    /// Free text
    String,
    /// 64-bit signed integer
    Int,
    /// 64-bit floating point number
    Float,
    /// `True` / `False`
    Bool,
    /// Date and time without time zone
    DateTime,
    /// Time span
    Duration,
}

impl BaseDataType {
    /// All base datatypes
    pub const ALL: [BaseDataType; 6] = [
        BaseDataType::String,
        BaseDataType::Int,
        BaseDataType::Float,
        BaseDataType::Bool,
        BaseDataType::DateTime,
        BaseDataType::Duration,
    ];

    /// Look up a base datatype by its token
    pub fn from_token(token: &str) -> Option<Self> {
        match token {
            "string" => Some(BaseDataType::String),
            "int" => Some(BaseDataType::Int),
            "float" => Some(BaseDataType::Float),
            "bool" => Some(BaseDataType::Bool),
            "datetime" => Some(BaseDataType::DateTime),
            "duration" => Some(BaseDataType::Duration),
            _ => None,
        }
    }

    /// Get the token of this datatype
    pub fn as_str(&self) -> &'static str {
        match self {
            BaseDataType::String => "string",
            BaseDataType::Int => "int",
            BaseDataType::Float => "float",
            BaseDataType::Bool => "bool",
            BaseDataType::DateTime => "datetime",
            BaseDataType::Duration => "duration",
        }
    }

    /// Whether values of this type are ordered (and can have bounds)
    pub fn is_ordered(&self) -> bool {
        !matches!(self, BaseDataType::Bool)
    }

    /// Parse a raw value into a typed value
    pub fn parse(&self, raw: &str) -> Result<TypedValue> {
        let text = raw.trim();
        match self {
            BaseDataType::String => Ok(TypedValue::String(raw.to_string())),
            BaseDataType::Int => text
                .parse::<i64>()
                .map(TypedValue::Int)
                .map_err(|_| type_error(raw, *self)),
            BaseDataType::Float => text
                .parse::<f64>()
                .ok()
                .filter(|f| f.is_finite())
                .map(TypedValue::Float)
                .ok_or_else(|| type_error(raw, *self)),
            BaseDataType::Bool => parse_bool(text)
                .map(TypedValue::Bool)
                .ok_or_else(|| type_error(raw, *self)),
            BaseDataType::DateTime => parse_datetime(text)
                .map(TypedValue::DateTime)
                .ok_or_else(|| type_error(raw, *self)),
            BaseDataType::Duration => parse_duration(text)
                .map(TypedValue::Duration)
                .ok_or_else(|| type_error(raw, *self)),
        }
    }
}

impl fmt::Display for BaseDataType {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.as_str())
    }
}

fn type_error(raw: &str, datatype: BaseDataType) -> Error {
    Error::Value(format!("'{}' is not a valid {} value", raw, datatype))
}

/// Parse a boolean in the store's accepted spellings
pub fn parse_bool(text: &str) -> Option<bool> {
    match text {
        "True" | "true" | "1" => Some(true),
        "False" | "false" | "0" => Some(false),
        _ => None,
    }
}

/// Parse a datetime; date-only values mean midnight
pub fn parse_datetime(text: &str) -> Option<NaiveDateTime> {
    DATETIME_INPUT_FORMATS
        .iter()
        .find_map(|fmt| NaiveDateTime::parse_from_str(text, fmt).ok())
        .or_else(|| {
            NaiveDate::parse_from_str(text, "%Y-%m-%d")
                .ok()
                .and_then(|d| d.and_hms_opt(0, 0, 0))
        })
}

/// Parse a duration: plain seconds (`90.5`) or ISO 8601 (`P1DT2H30M`)
///
/// Returns `None` for text that is malformed or out of the representable range.
pub fn parse_duration(text: &str) -> Option<Duration> {
    if let Ok(seconds) = text.parse::<f64>() {
        return seconds_to_duration(seconds);
    }

    let caps = ISO_DURATION.captures(text)?;
    if caps.iter().skip(2).all(|c| c.is_none()) {
        return None;
    }
    let int = |i: usize| -> Option<i64> {
        match caps.get(i) {
            Some(m) => m.as_str().parse::<i64>().ok(),
            None => Some(0),
        }
    };
    let seconds = caps
        .get(6)
        .map_or(Some(0.0), |m| m.as_str().parse::<f64>().ok())?;
    let whole = int(2)?
        .checked_mul(7 * 86_400)?
        .checked_add(int(3)?.checked_mul(86_400)?)?
        .checked_add(int(4)?.checked_mul(3_600)?)?
        .checked_add(int(5)?.checked_mul(60)?)?;
    let duration = Duration::try_seconds(whole)?.checked_add(&seconds_to_duration(seconds)?)?;
    if caps.get(1).is_some() {
        Duration::zero().checked_sub(&duration)
    } else {
        Some(duration)
    }
}

/// Convert fractional seconds to a duration with millisecond precision
fn seconds_to_duration(seconds: f64) -> Option<Duration> {
    let millis = (seconds * 1000.0).round();
    if !millis.is_finite() || millis.abs() >= i64::MAX as f64 {
        return None;
    }
    Duration::try_milliseconds(millis as i64)
}

fn format_seconds(duration: &Duration) -> String {
    let millis = duration.num_milliseconds();
    if millis % 1000 == 0 {
        format!("{}", millis / 1000)
    } else {
        format!("{}", millis as f64 / 1000.0)
    }
}

/// A parsed value of one of the base datatypes
#[derive(Debug, Clone, PartialEq)]
pub enum TypedValue {
    /// Text value
    String(String),
    /// Integer value
    Int(i64),
    /// Floating point value
    Float(f64),
    /// Boolean value
    Bool(bool),
    /// Datetime value
    DateTime(NaiveDateTime),
    /// Duration value
    Duration(Duration),
}

impl TypedValue {
    /// The datatype of this value
    pub fn datatype(&self) -> BaseDataType {
        match self {
            TypedValue::String(_) => BaseDataType::String,
            TypedValue::Int(_) => BaseDataType::Int,
            TypedValue::Float(_) => BaseDataType::Float,
            TypedValue::Bool(_) => BaseDataType::Bool,
            TypedValue::DateTime(_) => BaseDataType::DateTime,
            TypedValue::Duration(_) => BaseDataType::Duration,
        }
    }

    /// Canonical text form, as written to value files
    pub fn to_xml_string(&self) -> String {
        match self {
            TypedValue::String(s) => s.clone(),
            TypedValue::Int(i) => i.to_string(),
            TypedValue::Float(f) => f.to_string(),
            TypedValue::Bool(true) => "True".to_string(),
            TypedValue::Bool(false) => "False".to_string(),
            TypedValue::DateTime(dt) => dt.format(DATETIME_FORMAT).to_string(),
            TypedValue::Duration(d) => format_seconds(d),
        }
    }

    /// Convert this value to another datatype
    ///
    /// Text converts to anything it parses as; everything converts to text.
    /// Numeric conversions must be exact: a float only becomes an int when it
    /// has no fractional part.
    pub fn coerce_to(&self, target: BaseDataType) -> Result<TypedValue> {
        if self.datatype() == target {
            return Ok(self.clone());
        }
        let unsupported = || {
            Error::Value(format!(
                "cannot convert {} value '{}' to {}",
                self.datatype(),
                self.to_xml_string(),
                target
            ))
        };
        match (self, target) {
            (_, BaseDataType::String) => Ok(TypedValue::String(self.to_xml_string())),
            (TypedValue::String(s), _) => target.parse(s),
            (TypedValue::Int(i), BaseDataType::Float) => Ok(TypedValue::Float(*i as f64)),
            (TypedValue::Float(f), BaseDataType::Int) => {
                if f.fract() == 0.0 && *f >= i64::MIN as f64 && *f <= i64::MAX as f64 {
                    Ok(TypedValue::Int(*f as i64))
                } else {
                    Err(unsupported())
                }
            }
            (TypedValue::Bool(b), BaseDataType::Int) => Ok(TypedValue::Int(i64::from(*b))),
            (TypedValue::Int(0), BaseDataType::Bool) => Ok(TypedValue::Bool(false)),
            (TypedValue::Int(1), BaseDataType::Bool) => Ok(TypedValue::Bool(true)),
            (TypedValue::Int(i), BaseDataType::Duration) => Duration::try_seconds(*i)
                .map(TypedValue::Duration)
                .ok_or_else(unsupported),
            (TypedValue::Float(f), BaseDataType::Duration) => seconds_to_duration(*f)
                .map(TypedValue::Duration)
                .ok_or_else(unsupported),
            (TypedValue::Duration(d), BaseDataType::Float) => {
                Ok(TypedValue::Float(d.num_milliseconds() as f64 / 1000.0))
            }
            (TypedValue::Duration(d), BaseDataType::Int) if d.num_milliseconds() % 1000 == 0 => {
                Ok(TypedValue::Int(d.num_seconds()))
            }
            _ => Err(unsupported()),
        }
    }
}

impl PartialOrd for TypedValue {
    fn partial_cmp(&self, other: &Self) -> Option<Ordering> {
        match (self, other) {
            (TypedValue::String(a), TypedValue::String(b)) => a.partial_cmp(b),
            (TypedValue::Int(a), TypedValue::Int(b)) => a.partial_cmp(b),
            (TypedValue::Float(a), TypedValue::Float(b)) => a.partial_cmp(b),
            (TypedValue::Int(a), TypedValue::Float(b)) => (*a as f64).partial_cmp(b),
            (TypedValue::Float(a), TypedValue::Int(b)) => a.partial_cmp(&(*b as f64)),
            (TypedValue::DateTime(a), TypedValue::DateTime(b)) => a.partial_cmp(b),
            (TypedValue::Duration(a), TypedValue::Duration(b)) => a.partial_cmp(b),
            _ => None,
        }
    }
}

impl fmt::Display for TypedValue {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.to_xml_string())
    }
}
