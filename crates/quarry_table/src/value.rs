//! Typed cell values.

use chrono::{NaiveDate, NaiveDateTime, NaiveTime, Timelike};
use std::cmp::Ordering;
use std::fmt;

use crate::schema::FieldType;

/// Date format used when rendering and parsing dates
pub const DATE_FORMAT: &str = "%Y-%m-%d";
/// Date-time format used when rendering
pub const DATETIME_FORMAT: &str = "%Y-%m-%d %H:%M:%S";
/// Time format used when rendering
pub const TIME_FORMAT: &str = "%H:%M:%S";

const DATETIME_INPUT_FORMATS: &[&str] = &[
    "%Y-%m-%dT%H:%M:%S%.f",
    "%Y-%m-%d %H:%M:%S%.f",
    "%Y-%m-%dT%H:%M",
    "%Y-%m-%d %H:%M",
];

const TIME_INPUT_FORMATS: &[&str] = &["%H:%M:%S%.f", "%H:%M"];

/// A single table cell
#[derive(Debug, Clone, PartialEq, Default)]
pub enum Value {
    /// Missing value
    #[default]
    Null,
    /// Boolean
    Bool(bool),
    /// Whole number
    Integer(i64),
    /// Decimal number
    Number(f64),
    /// Text
    String(String),
    /// Calendar date
    Date(NaiveDate),
    /// Date with time of day
    DateTime(NaiveDateTime),
    /// Time of day
    Time(NaiveTime),
}

impl Value {
    /// Whether this is `Null`
    #[must_use]
    pub fn is_null(&self) -> bool {
        matches!(self, Self::Null)
    }

    /// Truthiness: null, false, zero and the empty string are falsy
    #[must_use]
    pub fn is_truthy(&self) -> bool {
        match self {
            Self::Null => false,
            Self::Bool(b) => *b,
            Self::Integer(i) => *i != 0,
            Self::Number(n) => *n != 0.0,
            Self::String(s) => !s.is_empty(),
            Self::Date(_) | Self::DateTime(_) | Self::Time(_) => true,
        }
    }

    /// Numeric view of integer and number cells
    #[must_use]
    pub fn as_f64(&self) -> Option<f64> {
        match self {
            Self::Integer(i) => Some(*i as f64),
            Self::Number(n) => Some(*n),
            _ => None,
        }
    }

    /// Calendar date of date and date-time cells
    #[must_use]
    pub fn as_date(&self) -> Option<NaiveDate> {
        match self {
            Self::Date(d) => Some(*d),
            Self::DateTime(dt) => Some(dt.date()),
            _ => None,
        }
    }

    /// Time of day of date-time and time cells
    #[must_use]
    pub fn as_time(&self) -> Option<NaiveTime> {
        match self {
            Self::DateTime(dt) => Some(dt.time()),
            Self::Time(t) => Some(*t),
            _ => None,
        }
    }

    /// Name of the variant, for error messages
    #[must_use]
    pub fn type_name(&self) -> &'static str {
        match self {
            Self::Null => "null",
            Self::Bool(_) => "boolean",
            Self::Integer(_) => "integer",
            Self::Number(_) => "number",
            Self::String(_) => "string",
            Self::Date(_) => "date",
            Self::DateTime(_) => "datetime",
            Self::Time(_) => "time",
        }
    }

    /// Compare two values of compatible types.
    ///
    /// Integers and numbers compare numerically. Returns `None` when either
    /// side is null or the types cannot be ordered against each other.
    #[must_use]
    pub fn try_cmp(&self, other: &Self) -> Option<Ordering> {
        match (self, other) {
            (Self::Null, _) | (_, Self::Null) => None,
            (Self::Bool(a), Self::Bool(b)) => Some(a.cmp(b)),
            (Self::String(a), Self::String(b)) => Some(a.cmp(b)),
            (Self::Date(a), Self::Date(b)) => Some(a.cmp(b)),
            (Self::DateTime(a), Self::DateTime(b)) => Some(a.cmp(b)),
            (Self::Date(a), Self::DateTime(b)) => Some(a.and_time(NaiveTime::MIN).cmp(b)),
            (Self::DateTime(a), Self::Date(b)) => Some(a.cmp(&b.and_time(NaiveTime::MIN))),
            (Self::Time(a), Self::Time(b)) => Some(a.cmp(b)),
            (Self::Integer(a), Self::Integer(b)) => Some(a.cmp(b)),
            (a, b) => match (a.as_f64(), b.as_f64()) {
                (Some(x), Some(y)) => x.partial_cmp(&y),
                _ => None,
            },
        }
    }

    /// Total order over all values, used for grouping and distinct counts.
    ///
    /// Variants are ranked null, boolean, numeric, string, date, datetime,
    /// time; numbers compare by value regardless of integer/number variant.
    #[must_use]
    pub fn total_cmp(&self, other: &Self) -> Ordering {
        fn rank(v: &Value) -> u8 {
            match v {
                Value::Null => 0,
                Value::Bool(_) => 1,
                Value::Integer(_) | Value::Number(_) => 2,
                Value::String(_) => 3,
                Value::Date(_) => 4,
                Value::DateTime(_) => 5,
                Value::Time(_) => 6,
            }
        }
        match (self, other) {
            (Self::Integer(a), Self::Integer(b)) => a.cmp(b),
            (a, b) if rank(a) == 2 && rank(b) == 2 => {
                let x = a.as_f64().unwrap_or_default();
                let y = b.as_f64().unwrap_or_default();
                x.total_cmp(&y)
            }
            (a, b) if rank(a) != rank(b) => rank(a).cmp(&rank(b)),
            (a, b) => a.try_cmp(b).unwrap_or(Ordering::Equal),
        }
    }

    /// Convert this value to `field_type`.
    ///
    /// Strings are parsed; numeric variants convert between each other when
    /// no precision is lost. Null stays null.
    ///
    /// # Errors
    ///
    /// Returns a description of the failure if the value does not fit
    pub fn coerce(&self, field_type: FieldType) -> Result<Value, String> {
        match (self, field_type) {
            (Self::Null, _) | (_, FieldType::Any) => Ok(self.clone()),
            (Self::String(s), t) => t.parse(s),
            (Self::Integer(i), FieldType::Number) => Ok(Self::Number(*i as f64)),
            (Self::Number(n), FieldType::Integer) if n.fract() == 0.0 && n.is_finite() => {
                Ok(Self::Integer(*n as i64))
            }
            (Self::DateTime(dt), FieldType::Date) => Ok(Self::Date(dt.date())),
            (Self::Date(d), FieldType::DateTime) => Ok(Self::DateTime(d.and_time(NaiveTime::MIN))),
            (Self::DateTime(dt), FieldType::Time) => Ok(Self::Time(dt.time())),
            (v, FieldType::String) => Ok(Self::String(v.to_string())),
            (v, t) if FieldType::of(v) == t => Ok(v.clone()),
            (v, t) => Err(format!("cannot convert {} {} to {}", v.type_name(), v, t)),
        }
    }
}

impl fmt::Display for Value {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::Null => Ok(()),
            Self::Bool(b) => write!(f, "{}", b),
            Self::Integer(i) => write!(f, "{}", i),
            Self::Number(n) => write!(f, "{}", n),
            Self::String(s) => f.write_str(s),
            Self::Date(d) => write!(f, "{}", d.format(DATE_FORMAT)),
            Self::DateTime(dt) => write!(f, "{}", dt.format(DATETIME_FORMAT)),
            Self::Time(t) => write!(f, "{}", t.format(TIME_FORMAT)),
        }
    }
}

impl From<&str> for Value {
    fn from(s: &str) -> Self {
        Self::String(s.to_string())
    }
}

impl From<String> for Value {
    fn from(s: String) -> Self {
        Self::String(s)
    }
}

impl From<i64> for Value {
    fn from(i: i64) -> Self {
        Self::Integer(i)
    }
}

impl From<f64> for Value {
    fn from(n: f64) -> Self {
        Self::Number(n)
    }
}

impl From<bool> for Value {
    fn from(b: bool) -> Self {
        Self::Bool(b)
    }
}

/// Parse a boolean literal
#[must_use]
pub fn parse_bool(text: &str) -> Option<bool> {
    match text.trim() {
        "true" | "True" | "TRUE" | "1" => Some(true),
        "false" | "False" | "FALSE" | "0" => Some(false),
        _ => None,
    }
}

/// Parse an ISO calendar date
#[must_use]
pub fn parse_date(text: &str) -> Option<NaiveDate> {
    NaiveDate::parse_from_str(text.trim(), DATE_FORMAT).ok()
}

/// Parse a date-time, with `T` or space separator and optional trailing `Z`
#[must_use]
pub fn parse_datetime(text: &str) -> Option<NaiveDateTime> {
    let text = text.trim();
    if let Ok(dt) = chrono::DateTime::parse_from_rfc3339(text) {
        return Some(dt.naive_utc());
    }
    let text = text.strip_suffix('Z').unwrap_or(text);
    DATETIME_INPUT_FORMATS
        .iter()
        .find_map(|fmt| NaiveDateTime::parse_from_str(text, fmt).ok())
}

/// Parse a time of day (`HH:MM` or `HH:MM:SS`)
#[must_use]
pub fn parse_time(text: &str) -> Option<NaiveTime> {
    let text = text.trim();
    TIME_INPUT_FORMATS
        .iter()
        .find_map(|fmt| NaiveTime::parse_from_str(text, fmt).ok())
}

/// Minutes since midnight, ignoring seconds
#[must_use]
pub fn minute_of_day(t: NaiveTime) -> u32 {
    t.hour() * 60 + t.minute()
}
