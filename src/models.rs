use std::fmt;

use chrono::{NaiveDate, NaiveDateTime};
use serde::ser::{Serialize, SerializeMap, Serializer};

/// A raw cell value as read from a sheet, before any schema is applied.
#[derive(Debug, Clone, PartialEq)]
pub enum Cell {
    Empty,
    String(String),
    Int(i64),
    Float(f64),
    Bool(bool),
    DateTime(NaiveDateTime),
    Error(String),
}

impl Cell {
    /// Blank cells count as absent during validation.
    pub fn is_blank(&self) -> bool {
        match self {
            Self::Empty => true,
            Self::String(s) => s.trim().is_empty(),
            _ => false,
        }
    }

    /// Type a CSV field the way a spreadsheet application would on open.
    pub fn from_text(raw: &str) -> Cell {
        let s = raw.trim();
        if s.is_empty() {
            return Cell::Empty;
        }
        if looks_numeric(s) {
            if let Ok(i) = s.parse::<i64>() {
                return Cell::Int(i);
            }
            if let Ok(f) = s.parse::<f64>() {
                return Cell::Float(f);
            }
        }
        if s.eq_ignore_ascii_case("true") {
            return Cell::Bool(true);
        }
        if s.eq_ignore_ascii_case("false") {
            return Cell::Bool(false);
        }
        if let Some(dt) = parse_iso_datetime(s) {
            return Cell::DateTime(dt);
        }
        Cell::String(raw.to_string())
    }
}

fn looks_numeric(s: &str) -> bool {
    s.chars().any(|c| c.is_ascii_digit())
        && s
            .chars()
            .all(|c| c.is_ascii_digit() || matches!(c, '.' | '-' | '+' | 'e' | 'E'))
}

/// Accepts `YYYY-MM-DD`, `YYYY-MM-DDTHH:MM:SS` and `YYYY-MM-DD HH:MM:SS`.
pub fn parse_iso_datetime(raw: &str) -> Option<NaiveDateTime> {
    let raw = raw.trim();
    if let Ok(d) = NaiveDate::parse_from_str(raw, "%Y-%m-%d") {
        return d.and_hms_opt(0, 0, 0);
    }
    ["%Y-%m-%dT%H:%M:%S%.f", "%Y-%m-%d %H:%M:%S%.f"]
        .iter()
        .find_map(|fmt| NaiveDateTime::parse_from_str(raw, fmt).ok())
}

impl fmt::Display for Cell {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::Empty => write!(f, ""),
            Self::String(s) => write!(f, "{s}"),
            Self::Int(i) => write!(f, "{i}"),
            Self::Float(v) => write!(f, "{v}"),
            Self::Bool(b) => write!(f, "{b}"),
            Self::DateTime(dt) => write!(f, "{}", dt.format("%Y-%m-%d %H:%M:%S")),
            Self::Error(e) => write!(f, "{e}"),
        }
    }
}

/// Placeholder literals accepted in place of a typed value.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, serde::Serialize)]
pub enum Sentinel {
    #[serde(rename = "Missing")]
    Missing,
    #[serde(rename = "NA")]
    Na,
}

impl Sentinel {
    pub fn as_str(&self) -> &'static str {
        match self {
            Self::Missing => "Missing",
            Self::Na => "NA",
        }
    }

    pub fn parse(raw: &str) -> Option<Sentinel> {
        match raw {
            "Missing" => Some(Self::Missing),
            "NA" => Some(Self::Na),
            _ => None,
        }
    }
}

/// A coerced value inside a validated record.
#[derive(Debug, Clone, PartialEq, serde::Serialize)]
#[serde(untagged)]
pub enum Value {
    Null,
    Text(String),
    Integer(i64),
    Float(f64),
    Bool(bool),
    Date(NaiveDate),
    DateTime(NaiveDateTime),
    Sentinel(Sentinel),
}

impl Value {
    /// Carry a raw cell over without coercion.
    pub fn from_cell(cell: &Cell) -> Value {
        match cell {
            Cell::Empty => Value::Null,
            Cell::String(s) if s.trim().is_empty() => Value::Null,
            Cell::String(s) => Value::Text(s.clone()),
            Cell::Int(i) => Value::Integer(*i),
            Cell::Float(f) => Value::Float(*f),
            Cell::Bool(b) => Value::Bool(*b),
            Cell::DateTime(dt) if dt.time() == chrono::NaiveTime::MIN => Value::Date(dt.date()),
            Cell::DateTime(dt) => Value::DateTime(*dt),
            Cell::Error(e) => Value::Text(e.clone()),
        }
    }
}

/// One sheet row keyed by normalized header name. Missing trailing cells are
/// simply not present.
#[derive(Debug, Clone, Default, PartialEq)]
pub struct RowRecord {
    fields: Vec<(String, Cell)>,
}

impl RowRecord {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn push(&mut self, key: impl Into<String>, cell: Cell) {
        self.fields.push((key.into(), cell));
    }

    pub fn get(&self, key: &str) -> Option<&Cell> {
        self.fields.iter().find(|(k, _)| k == key).map(|(_, c)| c)
    }

    pub fn iter(&self) -> impl Iterator<Item = (&str, &Cell)> {
        self.fields.iter().map(|(k, c)| (k.as_str(), c))
    }

    pub fn len(&self) -> usize {
        self.fields.len()
    }

    pub fn is_empty(&self) -> bool {
        self.fields.is_empty()
    }
}

impl<K: Into<String>> FromIterator<(K, Cell)> for RowRecord {
    fn from_iter<I: IntoIterator<Item = (K, Cell)>>(iter: I) -> Self {
        let mut record = RowRecord::new();
        for (k, c) in iter {
            record.push(k, c);
        }
        record
    }
}

/// A row that passed validation. Field order follows the schema.
#[derive(Debug, Clone, Default, PartialEq)]
pub struct ValidatedRecord {
    fields: Vec<(String, Value)>,
}

impl ValidatedRecord {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn insert(&mut self, key: impl Into<String>, value: Value) {
        self.fields.push((key.into(), value));
    }

    pub fn get(&self, key: &str) -> Option<&Value> {
        self.fields.iter().find(|(k, _)| k == key).map(|(_, v)| v)
    }

    pub fn keys(&self) -> impl Iterator<Item = &str> {
        self.fields.iter().map(|(k, _)| k.as_str())
    }

    pub fn len(&self) -> usize {
        self.fields.len()
    }

    pub fn is_empty(&self) -> bool {
        self.fields.is_empty()
    }
}

impl Serialize for ValidatedRecord {
    fn serialize<S: Serializer>(&self, serializer: S) -> std::result::Result<S::Ok, S::Error> {
        let mut map = serializer.serialize_map(Some(self.fields.len()))?;
        for (k, v) in &self.fields {
            map.serialize_entry(k, v)?;
        }
        map.end()
    }
}
