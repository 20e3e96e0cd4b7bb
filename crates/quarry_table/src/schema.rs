//! Field types, fields and table schemas.

use once_cell::sync::Lazy;
use quarry_core::{CoreError, CoreResult};
use regex::Regex;
use serde::{Deserialize, Serialize};

use crate::value::{parse_bool, parse_date, parse_datetime, parse_time, Value};

static FIELD_NAME_SEPARATORS: Lazy<Regex> =
    Lazy::new(|| Regex::new(r"[ /.]").expect("static field separator pattern"));

/// Declared type of a column
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum FieldType {
    /// Text
    String,
    /// Whole number
    Integer,
    /// Decimal number
    Number,
    /// Boolean
    Boolean,
    /// Calendar date
    Date,
    /// Date with time of day
    DateTime,
    /// Time of day
    Time,
    /// Untyped
    Any,
}

impl FieldType {
    /// Candidate types tried in order when inferring a column type
    pub const INFERENCE_ORDER: [FieldType; 6] = [
        FieldType::Integer,
        FieldType::Number,
        FieldType::Boolean,
        FieldType::DateTime,
        FieldType::Date,
        FieldType::Time,
    ];

    /// Type of an existing value
    #[must_use]
    pub fn of(value: &Value) -> Self {
        match value {
            Value::Null => Self::Any,
            Value::Bool(_) => Self::Boolean,
            Value::Integer(_) => Self::Integer,
            Value::Number(_) => Self::Number,
            Value::String(_) => Self::String,
            Value::Date(_) => Self::Date,
            Value::DateTime(_) => Self::DateTime,
            Value::Time(_) => Self::Time,
        }
    }

    /// Whether values of this type are numeric
    #[must_use]
    pub fn is_numeric(&self) -> bool {
        matches!(self, Self::Integer | Self::Number)
    }

    /// Parse a text literal as this type.
    ///
    /// An empty literal is null for every type except string.
    ///
    /// # Errors
    ///
    /// Returns a description of the failure if the text does not parse
    pub fn parse(&self, text: &str) -> Result<Value, String> {
        let trimmed = text.trim();
        if trimmed.is_empty() && *self != Self::String {
            return Ok(Value::Null);
        }
        let parsed = match self {
            Self::String | Self::Any => Some(Value::String(text.to_string())),
            Self::Integer => trimmed.parse::<i64>().ok().map(Value::Integer),
            Self::Number => trimmed
                .parse::<f64>()
                .ok()
                .filter(|n| n.is_finite())
                .map(Value::Number),
            Self::Boolean => parse_bool(trimmed).map(Value::Bool),
            Self::Date => parse_date(trimmed).map(Value::Date),
            Self::DateTime => parse_datetime(trimmed).map(Value::DateTime),
            Self::Time => parse_time(trimmed).map(Value::Time),
        };
        parsed.ok_or_else(|| format!("'{}' is not a valid {}", text, self))
    }

    /// Narrowest common type of a column of computed values
    #[must_use]
    pub fn infer_from<'a>(values: impl IntoIterator<Item = &'a Value>) -> Self {
        let mut inferred = Self::Any;
        for value in values {
            let t = Self::of(value);
            inferred = match (inferred, t) {
                (current, Self::Any) => current,
                (Self::Any, t) => t,
                (a, b) if a == b => a,
                (Self::Integer, Self::Number) | (Self::Number, Self::Integer) => Self::Number,
                _ => Self::String,
            };
        }
        inferred
    }
}

impl std::fmt::Display for FieldType {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        let name = match self {
            Self::String => "string",
            Self::Integer => "integer",
            Self::Number => "number",
            Self::Boolean => "boolean",
            Self::Date => "date",
            Self::DateTime => "datetime",
            Self::Time => "time",
            Self::Any => "any",
        };
        f.write_str(name)
    }
}

/// A named, typed column
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Field {
    /// Column name
    pub name: String,
    /// Declared type
    #[serde(rename = "type")]
    pub field_type: FieldType,
}

impl Field {
    /// Create a new field
    #[must_use]
    pub fn new(name: impl Into<String>, field_type: FieldType) -> Self {
        Self {
            name: name.into(),
            field_type,
        }
    }
}

/// Ordered list of fields
#[derive(Debug, Clone, PartialEq, Eq, Default, Serialize, Deserialize)]
pub struct Schema {
    fields: Vec<Field>,
}

impl Schema {
    /// Create a schema
    #[must_use]
    pub fn new(fields: Vec<Field>) -> Self {
        Self { fields }
    }

    /// Fields in order
    #[must_use]
    pub fn fields(&self) -> &[Field] {
        &self.fields
    }

    /// Field names in order
    #[must_use]
    pub fn names(&self) -> Vec<String> {
        self.fields.iter().map(|f| f.name.clone()).collect()
    }

    /// Number of fields
    #[must_use]
    pub fn len(&self) -> usize {
        self.fields.len()
    }

    /// Whether the schema has no fields
    #[must_use]
    pub fn is_empty(&self) -> bool {
        self.fields.is_empty()
    }

    /// Position of a field
    #[must_use]
    pub fn index_of(&self, name: &str) -> Option<usize> {
        self.fields.iter().position(|f| f.name == name)
    }

    /// Position of a field, or `ColumnNotFound`
    ///
    /// # Errors
    ///
    /// Returns error if no field has this name
    pub fn require(&self, name: &str) -> CoreResult<usize> {
        self.index_of(name).ok_or_else(|| CoreError::ColumnNotFound {
            column: name.to_string(),
        })
    }

    /// Look up a field by name
    #[must_use]
    pub fn field(&self, name: &str) -> Option<&Field> {
        self.fields.iter().find(|f| f.name == name)
    }

    /// Whether a field exists
    #[must_use]
    pub fn contains(&self, name: &str) -> bool {
        self.index_of(name).is_some()
    }

    /// Append a field
    pub fn push(&mut self, field: Field) {
        self.fields.push(field);
    }

    pub(crate) fn fields_mut(&mut self) -> &mut Vec<Field> {
        &mut self.fields
    }
}

/// Clean a column name for use as an identifier.
///
/// Surrounding whitespace is stripped; spaces, `/` and `.` become `_`.
#[must_use]
pub fn canonical_field_name(name: &str) -> String {
    FIELD_NAME_SEPARATORS
        .replace_all(name.trim(), "_")
        .into_owned()
}
