//! Sink-ready records.

use crate::rules::TopicRule;
use crate::sink::SinkError;
use chrono::{DateTime, Utc};
use serde::Serialize;
use std::collections::BTreeMap;
use std::fmt;

/// Key of the single field emitted per event.
pub const VALUE_FIELD: &str = "value";

/// A typed field value.
#[derive(Debug, Clone, PartialEq, Serialize)]
#[serde(untagged)]
pub enum FieldValue {
    /// 64-bit float
    Float(f64),
    /// Signed 64-bit integer
    Integer(i64),
    /// Text
    String(String),
}

impl fmt::Display for FieldValue {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::Float(v) => write!(f, "{v}"),
            Self::Integer(v) => write!(f, "{v}"),
            Self::String(v) => f.write_str(v),
        }
    }
}

impl From<f64> for FieldValue {
    fn from(value: f64) -> Self {
        Self::Float(value)
    }
}

impl From<i64> for FieldValue {
    fn from(value: i64) -> Self {
        Self::Integer(value)
    }
}

impl From<String> for FieldValue {
    fn from(value: String) -> Self {
        Self::String(value)
    }
}

impl From<&str> for FieldValue {
    fn from(value: &str) -> Self {
        Self::String(value.to_string())
    }
}

/// One coerced reading, ready for storage.
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct Record {
    /// Measurement the point is written under
    pub measurement: String,
    /// Tag set (may be empty)
    pub tags: BTreeMap<String, String>,
    /// Field set
    pub fields: BTreeMap<String, FieldValue>,
    /// Receipt time; sinks let the store assign one when absent
    pub timestamp: Option<DateTime<Utc>>,
}

impl Record {
    /// Attach a timestamp.
    #[must_use]
    pub fn with_timestamp(mut self, timestamp: DateTime<Utc>) -> Self {
        self.timestamp = Some(timestamp);
        self
    }

    /// The `value` field, if present.
    #[must_use]
    pub fn value(&self) -> Option<&FieldValue> {
        self.fields.get(VALUE_FIELD)
    }

    /// Check the record is writable.
    ///
    /// # Errors
    ///
    /// Returns [`SinkError::InvalidRecord`] if the measurement is empty, there
    /// are no fields, or a field key is empty.
    pub fn validate(&self) -> Result<(), SinkError> {
        if self.measurement.is_empty() {
            return Err(SinkError::InvalidRecord("empty measurement".to_string()));
        }
        if self.fields.is_empty() {
            return Err(SinkError::InvalidRecord("record has no fields".to_string()));
        }
        if self.fields.keys().any(String::is_empty) {
            return Err(SinkError::InvalidRecord("empty field key".to_string()));
        }
        Ok(())
    }
}

/// Build the record for a value received on `topic`.
///
/// The tag set is copied out of the rule, so records never share tags with
/// each other or with the rule.
#[must_use]
pub fn build_record(topic: &str, rule: &TopicRule, value: FieldValue) -> Record {
    let measurement = rule
        .measurement
        .clone()
        .unwrap_or_else(|| topic.to_string());

    let mut fields = BTreeMap::new();
    fields.insert(VALUE_FIELD.to_string(), value);

    Record {
        measurement,
        tags: rule.tags.clone(),
        fields,
        timestamp: None,
    }
}
