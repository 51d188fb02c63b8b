//! Declarative row schemas.
//!
//! A [`Schema`] is an ordered list of [`FieldDef`]s. Validation coerces each
//! raw [`Cell`] of a [`RowRecord`] into a typed [`Value`], checking literal
//! sets, sentinels and optionality, and collects every failing field into a
//! single [`ValidationError`].

use std::collections::HashSet;
use std::fmt;

use chrono::NaiveDate;
use thiserror::Error;

use crate::error::{Result, SheetbookError};
use crate::models::{Cell, RowRecord, Sentinel, ValidatedRecord, Value};

/// Canonical key for a header cell: lower-case, whitespace runs joined by `_`.
pub fn normalize_header(raw: &str) -> String {
    raw.split_whitespace()
        .map(|part| part.to_lowercase())
        .collect::<Vec<_>>()
        .join("_")
}

#[derive(Debug, Clone, PartialEq)]
pub enum FieldType {
    Text,
    Integer,
    Float,
    Bool,
    Date,
    /// One of a fixed set of strings, matched exactly.
    Literal(Vec<String>),
}

impl fmt::Display for FieldType {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::Text => write!(f, "text"),
            Self::Integer => write!(f, "integer"),
            Self::Float => write!(f, "number"),
            Self::Bool => write!(f, "boolean"),
            Self::Date => write!(f, "date"),
            Self::Literal(allowed) => {
                let quoted: Vec<String> = allowed.iter().map(|a| format!("'{a}'")).collect();
                write!(f, "one of {}", quoted.join(", "))
            }
        }
    }
}

#[derive(Debug, Clone, PartialEq)]
pub struct FieldDef {
    pub name: String,
    pub kind: FieldType,
    pub sentinels: Vec<Sentinel>,
    pub optional: bool,
}

impl FieldDef {
    pub fn new(name: &str, kind: FieldType) -> Self {
        Self {
            name: normalize_header(name),
            kind,
            sentinels: Vec::new(),
            optional: false,
        }
    }

    pub fn text(name: &str) -> Self {
        Self::new(name, FieldType::Text)
    }

    pub fn integer(name: &str) -> Self {
        Self::new(name, FieldType::Integer)
    }

    pub fn float(name: &str) -> Self {
        Self::new(name, FieldType::Float)
    }

    pub fn boolean(name: &str) -> Self {
        Self::new(name, FieldType::Bool)
    }

    pub fn date(name: &str) -> Self {
        Self::new(name, FieldType::Date)
    }

    pub fn literal(name: &str, allowed: &[&str]) -> Self {
        Self::new(
            name,
            FieldType::Literal(allowed.iter().map(|a| a.to_string()).collect()),
        )
    }

    pub fn sentinels(mut self, sentinels: &[Sentinel]) -> Self {
        self.sentinels = sentinels.to_vec();
        self
    }

    pub fn optional(mut self) -> Self {
        self.optional = true;
        self
    }

    /// Human-readable description of what this field accepts.
    pub fn expectation(&self) -> String {
        let mut out = self.kind.to_string();
        if !self.sentinels.is_empty() {
            let names: Vec<String> = self
                .sentinels
                .iter()
                .map(|s| format!("'{}'", s.as_str()))
                .collect();
            out.push_str(&format!(" or {}", names.join(", ")));
        }
        if self.optional {
            out.push_str(" (optional)");
        }
        out
    }

    fn coerce(&self, cell: Option<&Cell>) -> std::result::Result<Value, String> {
        let cell = match cell {
            Some(c) if !c.is_blank() => c,
            _ if self.optional => return Ok(Value::Null),
            _ => return Err("field required".to_string()),
        };

        // Sentinels win over type coercion.
        if let Cell::String(s) = cell {
            if let Some(sentinel) = Sentinel::parse(s) {
                if self.sentinels.contains(&sentinel) {
                    return Ok(Value::Sentinel(sentinel));
                }
            }
        }

        let coerced = match (&self.kind, cell) {
            (FieldType::Text, Cell::String(s)) => Some(Value::Text(s.clone())),
            (FieldType::Integer, Cell::Int(i)) => Some(Value::Integer(*i)),
            (FieldType::Integer, Cell::Float(f))
                if f.is_finite() && f.fract() == 0.0 && f.abs() < i64::MAX as f64 =>
            {
                Some(Value::Integer(*f as i64))
            }
            (FieldType::Float, Cell::Int(i)) => Some(Value::Float(*i as f64)),
            (FieldType::Float, Cell::Float(f)) if f.is_finite() => Some(Value::Float(*f)),
            (FieldType::Bool, Cell::Bool(b)) => Some(Value::Bool(*b)),
            (FieldType::Date, Cell::DateTime(dt)) if dt.time() == chrono::NaiveTime::MIN => {
                Some(Value::Date(dt.date()))
            }
            (FieldType::Date, Cell::String(s)) => NaiveDate::parse_from_str(s.trim(), "%Y-%m-%d")
                .ok()
                .map(Value::Date),
            (FieldType::Literal(allowed), Cell::String(s)) if allowed.iter().any(|a| a == s) => {
                Some(Value::Text(s.clone()))
            }
            _ => None,
        };

        coerced.ok_or_else(|| format!("expected {}, got {}", self.expectation(), describe(cell)))
    }
}

fn describe(cell: &Cell) -> String {
    match cell {
        Cell::String(s) => format!("'{s}'"),
        Cell::Int(_) | Cell::Float(_) => format!("number {cell}"),
        Cell::Bool(_) => format!("boolean {cell}"),
        Cell::DateTime(_) => format!("date-time {cell}"),
        Cell::Error(e) => format!("cell error {e}"),
        Cell::Empty => "blank".to_string(),
    }
}

/// One failing field within a rejected row.
#[derive(Debug, Clone, PartialEq)]
pub struct FieldIssue {
    pub field: String,
    pub reason: String,
}

#[derive(Error, Debug, Clone, PartialEq)]
#[error("{}", format_issues(.issues))]
pub struct ValidationError {
    pub issues: Vec<FieldIssue>,
}

fn format_issues(issues: &[FieldIssue]) -> String {
    let detail: Vec<String> = issues
        .iter()
        .map(|i| format!("{}: {}", i.field, i.reason))
        .collect();
    let noun = if issues.len() == 1 { "error" } else { "errors" };
    format!("{} validation {noun}: {}", issues.len(), detail.join("; "))
}

/// Something that turns a raw row into a validated record.
pub trait RowValidator: Send + Sync {
    fn validate(&self, row: &RowRecord) -> std::result::Result<ValidatedRecord, ValidationError>;
}

#[derive(Debug, Clone, PartialEq)]
pub struct Schema {
    name: String,
    fields: Vec<FieldDef>,
    passthrough: bool,
}

impl Schema {
    /// Build a schema, rejecting duplicate field names.
    pub fn new(name: &str, fields: Vec<FieldDef>) -> Result<Self> {
        let mut seen = HashSet::new();
        for field in &fields {
            if field.name.is_empty() {
                return Err(SheetbookError::Other(format!(
                    "schema '{name}' has a field with an empty name"
                )));
            }
            if !seen.insert(field.name.as_str()) {
                return Err(SheetbookError::Other(format!(
                    "schema '{name}' declares field '{}' twice",
                    field.name
                )));
            }
        }
        Ok(Self {
            name: name.to_string(),
            fields,
            passthrough: false,
        })
    }

    /// A schema that enforces nothing and carries every cell through.
    pub fn passthrough(name: &str) -> Self {
        Self {
            name: name.to_string(),
            fields: Vec::new(),
            passthrough: true,
        }
    }

    pub fn name(&self) -> &str {
        &self.name
    }

    pub fn fields(&self) -> &[FieldDef] {
        &self.fields
    }

    pub fn is_passthrough(&self) -> bool {
        self.passthrough
    }

    pub fn validate(&self, row: &RowRecord) -> std::result::Result<ValidatedRecord, ValidationError> {
        let mut record = ValidatedRecord::new();

        if self.passthrough {
            for (key, cell) in row.iter() {
                record.insert(key, Value::from_cell(cell));
            }
            return Ok(record);
        }

        let mut issues = Vec::new();
        for field in &self.fields {
            match field.coerce(row.get(&field.name)) {
                Ok(value) => record.insert(field.name.clone(), value),
                Err(reason) => issues.push(FieldIssue {
                    field: field.name.clone(),
                    reason,
                }),
            }
        }

        if issues.is_empty() {
            Ok(record)
        } else {
            Err(ValidationError { issues })
        }
    }
}

impl RowValidator for Schema {
    fn validate(&self, row: &RowRecord) -> std::result::Result<ValidatedRecord, ValidationError> {
        Schema::validate(self, row)
    }
}
