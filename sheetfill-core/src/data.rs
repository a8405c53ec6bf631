//! Data mapping supplied to a substitution call

use base64::Engine;
use base64::engine::general_purpose::STANDARD;
use chrono::{NaiveDate, NaiveDateTime};
use std::collections::BTreeMap;

/// Serial day 0 in the 1900 date system as Excel counts it
const EXCEL_EPOCH_DAYS_BEFORE_UNIX: f64 = 25569.0;
const MS_PER_DAY: f64 = 86_400_000.0;

/// A value a placeholder can resolve to
#[derive(Debug, Clone, PartialEq, Default)]
pub enum DataValue {
    #[default]
    Null,
    Bool(bool),
    Number(f64),
    String(String),
    Date(NaiveDateTime),
    Bytes(Vec<u8>),
    Array(Vec<DataValue>),
    Object(BTreeMap<String, DataValue>),
}

impl DataValue {
    /// Empty object, handy for building mappings in code
    pub fn object() -> Self {
        DataValue::Object(BTreeMap::new())
    }

    /// Builder-style insert; no-op on non-objects
    pub fn with(mut self, key: &str, value: impl Into<DataValue>) -> Self {
        if let DataValue::Object(map) = &mut self {
            map.insert(key.to_string(), value.into());
        }
        self
    }

    pub fn get(&self, key: &str) -> Option<&DataValue> {
        match self {
            DataValue::Object(map) => map.get(key),
            DataValue::Array(items) => key.parse::<usize>().ok().and_then(|i| items.get(i)),
            _ => None,
        }
    }

    /// Walk a dot-separated path (`address.city`, `items.0.name`)
    pub fn lookup_path(&self, path: &str) -> Option<&DataValue> {
        path.split('.')
            .filter(|segment| !segment.is_empty())
            .try_fold(self, |value, segment| value.get(segment))
    }

    pub fn as_array(&self) -> Option<&[DataValue]> {
        match self {
            DataValue::Array(items) => Some(items),
            _ => None,
        }
    }

    pub fn is_null(&self) -> bool {
        matches!(self, DataValue::Null)
    }

    /// Null or an empty string
    pub fn is_blank(&self) -> bool {
        match self {
            DataValue::Null => true,
            DataValue::String(s) => s.is_empty(),
            _ => false,
        }
    }

    /// Text rendering used for pooled strings and partial substitution
    pub fn stringify(&self) -> String {
        match self {
            DataValue::Null | DataValue::Object(_) | DataValue::Bytes(_) => String::new(),
            DataValue::Bool(true) => "1".to_string(),
            DataValue::Bool(false) => "0".to_string(),
            DataValue::Number(n) => format_number(*n),
            DataValue::String(s) => s.clone(),
            DataValue::Date(dt) => format_number(date_serial(dt)),
            DataValue::Array(items) => items
                .iter()
                .map(DataValue::stringify)
                .collect::<Vec<_>>()
                .join(","),
        }
    }
}

/// Excel serial number for a timestamp (days since 1899-12-30)
pub fn date_serial(dt: &NaiveDateTime) -> f64 {
    dt.and_utc().timestamp_millis() as f64 / MS_PER_DAY + EXCEL_EPOCH_DAYS_BEFORE_UNIX
}

/// Shortest decimal that round-trips; integral values print without a fraction
pub fn format_number(n: f64) -> String {
    if n.is_finite() && n.fract() == 0.0 && n.abs() < 1e15 {
        format!("{}", n as i64)
    } else {
        format!("{n}")
    }
}

impl From<serde_json::Value> for DataValue {
    fn from(value: serde_json::Value) -> Self {
        use serde_json::Value;
        match value {
            Value::Null => DataValue::Null,
            Value::Bool(b) => DataValue::Bool(b),
            Value::Number(n) => n.as_f64().map(DataValue::Number).unwrap_or_default(),
            Value::String(s) => DataValue::String(s),
            Value::Array(items) => DataValue::Array(items.into_iter().map(Into::into).collect()),
            Value::Object(map) => {
                if map.len() == 1 {
                    if let Some(special) = tagged_value(&map) {
                        return special;
                    }
                }
                DataValue::Object(map.into_iter().map(|(k, v)| (k, v.into())).collect())
            }
        }
    }
}

/// `{"$date": "..."}` and `{"$base64": "..."}` wrappers
fn tagged_value(map: &serde_json::Map<String, serde_json::Value>) -> Option<DataValue> {
    if let Some(raw) = map.get("$date").and_then(|v| v.as_str()) {
        return parse_date(raw).map(DataValue::Date);
    }
    if let Some(raw) = map.get("$base64").and_then(|v| v.as_str()) {
        let compact: String = raw.chars().filter(|c| !c.is_whitespace()).collect();
        return STANDARD.decode(compact).ok().map(DataValue::Bytes);
    }
    None
}

fn parse_date(raw: &str) -> Option<NaiveDateTime> {
    let raw = raw.trim().trim_end_matches('Z');
    ["%Y-%m-%dT%H:%M:%S%.f", "%Y-%m-%d %H:%M:%S%.f", "%Y-%m-%dT%H:%M"]
        .iter()
        .find_map(|fmt| NaiveDateTime::parse_from_str(raw, fmt).ok())
        .or_else(|| {
            NaiveDate::parse_from_str(raw, "%Y-%m-%d")
                .ok()
                .and_then(|d| d.and_hms_opt(0, 0, 0))
        })
}

impl From<bool> for DataValue {
    fn from(b: bool) -> Self {
        DataValue::Bool(b)
    }
}

impl From<f64> for DataValue {
    fn from(n: f64) -> Self {
        DataValue::Number(n)
    }
}

impl From<i64> for DataValue {
    fn from(n: i64) -> Self {
        DataValue::Number(n as f64)
    }
}

impl From<i32> for DataValue {
    fn from(n: i32) -> Self {
        DataValue::Number(f64::from(n))
    }
}

impl From<&str> for DataValue {
    fn from(s: &str) -> Self {
        DataValue::String(s.to_string())
    }
}

impl From<String> for DataValue {
    fn from(s: String) -> Self {
        DataValue::String(s)
    }
}

impl From<NaiveDateTime> for DataValue {
    fn from(dt: NaiveDateTime) -> Self {
        DataValue::Date(dt)
    }
}

impl From<NaiveDate> for DataValue {
    fn from(d: NaiveDate) -> Self {
        DataValue::Date(d.and_hms_opt(0, 0, 0).unwrap_or_default())
    }
}

impl<T: Into<DataValue>> From<Vec<T>> for DataValue {
    fn from(items: Vec<T>) -> Self {
        DataValue::Array(items.into_iter().map(Into::into).collect())
    }
}

impl FromIterator<(String, DataValue)> for DataValue {
    fn from_iter<I: IntoIterator<Item = (String, DataValue)>>(iter: I) -> Self {
        DataValue::Object(iter.into_iter().collect())
    }
}
