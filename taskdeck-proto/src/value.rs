//! Document field values exchanged with the remote document store.
//!
//! Remote records are string-keyed maps of [`Value`]s. Timestamp fields are
//! heterogeneous on the wire: the hosted store hands back its own timestamp
//! objects (a map carrying `seconds` and `nanoseconds`), older clients wrote
//! RFC 3339 strings or epoch milliseconds, and freshly written local records
//! carry native [`Value::Timestamp`]s. [`timestamp`] folds all of them into
//! one `DateTime<Utc>`.

use std::collections::BTreeMap;

use chrono::{DateTime, NaiveDate, Utc};
use serde::{Deserialize, Serialize};

/// A string-keyed document body.
pub type Record = BTreeMap<String, Value>;

/// A single document field value.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub enum Value {
    /// Explicit null (field present, no value).
    Null,
    /// Boolean flag.
    Bool(bool),
    /// Signed integer.
    Integer(i64),
    /// Floating point number.
    Float(f64),
    /// UTF-8 text.
    Text(String),
    /// Native timestamp.
    Timestamp(DateTime<Utc>),
    /// Nested map (also used for provider timestamp objects).
    Map(Record),
}

impl Value {
    /// Returns the text content, if this is a [`Value::Text`].
    #[must_use]
    pub fn as_text(&self) -> Option<&str> {
        match self {
            Self::Text(s) => Some(s),
            _ => None,
        }
    }

    /// Returns the integer content, accepting floats with no fractional part.
    #[must_use]
    #[allow(clippy::cast_possible_truncation)]
    pub fn as_integer(&self) -> Option<i64> {
        match self {
            Self::Integer(n) => Some(*n),
            Self::Float(f) if f.is_finite() && f.fract() == 0.0 => Some(*f as i64),
            _ => None,
        }
    }

    /// Returns the boolean content, if this is a [`Value::Bool`].
    #[must_use]
    pub const fn as_bool(&self) -> Option<bool> {
        match self {
            Self::Bool(b) => Some(*b),
            _ => None,
        }
    }

    /// Returns `true` for [`Value::Null`].
    #[must_use]
    pub const fn is_null(&self) -> bool {
        matches!(self, Self::Null)
    }
}

impl From<&str> for Value {
    fn from(s: &str) -> Self {
        Self::Text(s.to_string())
    }
}

impl From<String> for Value {
    fn from(s: String) -> Self {
        Self::Text(s)
    }
}

impl From<bool> for Value {
    fn from(b: bool) -> Self {
        Self::Bool(b)
    }
}

impl From<i64> for Value {
    fn from(n: i64) -> Self {
        Self::Integer(n)
    }
}

impl From<u32> for Value {
    fn from(n: u32) -> Self {
        Self::Integer(i64::from(n))
    }
}

impl From<DateTime<Utc>> for Value {
    fn from(ts: DateTime<Utc>) -> Self {
        Self::Timestamp(ts)
    }
}

impl From<NaiveDate> for Value {
    fn from(date: NaiveDate) -> Self {
        Self::Text(date.format(DATE_KEY_FORMAT).to_string())
    }
}

impl<T: Into<Self>> From<Option<T>> for Value {
    fn from(v: Option<T>) -> Self {
        v.map_or(Self::Null, Into::into)
    }
}

/// A document as delivered by the remote store: its id plus its fields.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Document {
    /// Store-assigned document identifier.
    pub id: String,
    /// Document body.
    pub fields: Record,
}

impl Document {
    /// Creates a document from an id and a record.
    pub fn new(id: impl Into<String>, fields: Record) -> Self {
        Self {
            id: id.into(),
            fields,
        }
    }

    /// Returns the named field, treating explicit nulls as absent.
    #[must_use]
    pub fn field(&self, key: &str) -> Option<&Value> {
        self.fields.get(key).filter(|v| !v.is_null())
    }

    /// Returns the named field as text.
    #[must_use]
    pub fn text(&self, key: &str) -> Option<&str> {
        self.field(key).and_then(Value::as_text)
    }

    /// Returns the named field as an integer.
    #[must_use]
    pub fn integer(&self, key: &str) -> Option<i64> {
        self.field(key).and_then(Value::as_integer)
    }

    /// Returns the named field as a normalized timestamp.
    #[must_use]
    pub fn timestamp(&self, key: &str) -> Option<DateTime<Utc>> {
        self.field(key).and_then(timestamp)
    }
}

/// Format used for calendar-day keys (`2024-03-09`).
pub const DATE_KEY_FORMAT: &str = "%Y-%m-%d";

/// Normalizes any supported timestamp representation into `DateTime<Utc>`.
///
/// Accepted shapes:
/// - [`Value::Timestamp`]
/// - a provider timestamp map with an integer `seconds` field and optional
///   `nanoseconds`
/// - RFC 3339 text, or a bare `YYYY-MM-DD` date (midnight UTC)
/// - integer epoch milliseconds
///
/// Returns `None` for anything else, including out-of-range values.
#[must_use]
pub fn timestamp(value: &Value) -> Option<DateTime<Utc>> {
    match value {
        Value::Timestamp(ts) => Some(*ts),
        Value::Map(map) => {
            let seconds = map.get("seconds").and_then(Value::as_integer)?;
            let nanos = map
                .get("nanoseconds")
                .and_then(Value::as_integer)
                .and_then(|n| u32::try_from(n).ok())
                .unwrap_or(0);
            DateTime::from_timestamp(seconds, nanos)
        }
        Value::Text(s) => parse_timestamp_text(s),
        Value::Integer(ms) => DateTime::from_timestamp_millis(*ms),
        _ => None,
    }
}

/// Parses RFC 3339 or a bare `YYYY-MM-DD` date. Surrounding whitespace is ignored.
#[must_use]
pub fn parse_timestamp_text(s: &str) -> Option<DateTime<Utc>> {
    let s = s.trim();
    if s.is_empty() {
        return None;
    }
    if let Ok(ts) = DateTime::parse_from_rfc3339(s) {
        return Some(ts.with_timezone(&Utc));
    }
    parse_date_key(s).and_then(|d| d.and_hms_opt(0, 0, 0)).map(|dt| dt.and_utc())
}

/// Parses a `YYYY-MM-DD` calendar-day key.
#[must_use]
pub fn parse_date_key(s: &str) -> Option<NaiveDate> {
    NaiveDate::parse_from_str(s.trim(), DATE_KEY_FORMAT).ok()
}

/// Builds a provider-style timestamp map (`{ seconds, nanoseconds }`).
#[must_use]
pub fn provider_timestamp(ts: DateTime<Utc>) -> Value {
    let mut map = Record::new();
    map.insert("seconds".to_string(), Value::Integer(ts.timestamp()));
    map.insert(
        "nanoseconds".to_string(),
        Value::Integer(i64::from(ts.timestamp_subsec_nanos())),
    );
    Value::Map(map)
}
