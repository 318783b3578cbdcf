// field.rs — Typed form field values.
//
// Form data arrives as strings but date fields must compare by value:
// "1995-01-01" and "1995-01-01 00:00:00" are the same date.

use std::fmt;

use chrono::{NaiveDate, NaiveDateTime};
use serde::{Deserialize, Serialize};

use crate::error::ChangeSetError;

/// Storage type of a form field.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Default, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum FieldType {
    #[default]
    Text,
    Date,
}

impl FieldType {
    /// Map a store's column type name onto a field type.
    pub fn from_type_name(name: &str) -> Self {
        match name.trim().to_ascii_lowercase().as_str() {
            "date" | "datetime" | "timestamp" => FieldType::Date,
            _ => FieldType::Text,
        }
    }
}

impl fmt::Display for FieldType {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            FieldType::Text => f.write_str("text"),
            FieldType::Date => f.write_str("date"),
        }
    }
}

/// A form field value after type resolution.
///
/// Serialized with its type so text that happens to look like a timestamp
/// stays text: `{"type": "date", "value": "2020-05-06T00:00:00"}`.
#[derive(Debug, Clone, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize)]
#[serde(tag = "type", content = "value", rename_all = "snake_case")]
pub enum FieldValue {
    Date(NaiveDateTime),
    Text(String),
}

const TIMESTAMP_FORMATS: &[&str] = &[
    "%Y-%m-%d %H:%M:%S%.f",
    "%Y-%m-%dT%H:%M:%S%.f",
    "%Y-%m-%d %H:%M",
];

/// Parse a timestamp or a plain date (taken as midnight).
pub fn parse_date(raw: &str) -> Option<NaiveDateTime> {
    let raw = raw.trim();
    for format in TIMESTAMP_FORMATS {
        if let Ok(parsed) = NaiveDateTime::parse_from_str(raw, format) {
            return Some(parsed);
        }
    }
    NaiveDate::parse_from_str(raw, "%Y-%m-%d")
        .ok()
        .and_then(|date| date.and_hms_opt(0, 0, 0))
}

impl FieldValue {
    pub fn text(value: impl Into<String>) -> Self {
        FieldValue::Text(value.into())
    }

    /// Interpret a raw string as a value of `field_type`.
    pub fn parse(field: &str, raw: &str, field_type: FieldType) -> Result<Self, ChangeSetError> {
        match field_type {
            FieldType::Text => Ok(FieldValue::Text(raw.to_string())),
            FieldType::Date => parse_date(raw).map(FieldValue::Date).ok_or_else(|| {
                ChangeSetError::InvalidFieldValue {
                    field: field.to_string(),
                    value: raw.to_string(),
                    field_type,
                }
            }),
        }
    }

    pub fn field_type(&self) -> FieldType {
        match self {
            FieldValue::Date(_) => FieldType::Date,
            FieldValue::Text(_) => FieldType::Text,
        }
    }

    pub fn as_text(&self) -> Option<&str> {
        match self {
            FieldValue::Text(value) => Some(value),
            FieldValue::Date(_) => None,
        }
    }

    /// Whether this value equals `other`, reading text as a date when the
    /// other side is a date.
    pub fn matches(&self, other: &FieldValue) -> bool {
        match (self, other) {
            (FieldValue::Date(a), FieldValue::Text(b)) | (FieldValue::Text(b), FieldValue::Date(a)) => {
                parse_date(b).is_some_and(|parsed| parsed == *a)
            }
            _ => self == other,
        }
    }
}

impl fmt::Display for FieldValue {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            FieldValue::Date(value) => write!(f, "{}", value.format("%Y-%m-%d %H:%M:%S")),
            FieldValue::Text(value) => f.write_str(value),
        }
    }
}
