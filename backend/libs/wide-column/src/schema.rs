//! Statically declared model schemas
//!
//! Each wide-column model declares its table, the ordered row-key components
//! and its column fields once, as a `static Schema`. Nothing is discovered at
//! runtime: the declaration order of `row_key` is the serialization order.

use crate::error::{Result, WideColumnError};
use chrono::{DateTime, Utc};
use std::collections::{BTreeMap, BTreeSet};

/// Scalar type of a field.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum FieldKind {
    String,
    Integer,
    /// UTC timestamp, stored as epoch microseconds.
    Timestamp,
}

impl FieldKind {
    pub fn name(&self) -> &'static str {
        match self {
            FieldKind::String => "string",
            FieldKind::Integer => "integer",
            FieldKind::Timestamp => "timestamp",
        }
    }
}

/// How a serialized value is laid out in byte order.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub enum KeyOrder {
    /// Byte order equals value order.
    #[default]
    Ascending,
    /// Byte order is the inverse of value order (nines' complement of the
    /// padded digits). Integer and timestamp fields only.
    Descending,
    /// Character-reversed padded value. Spreads sequential ids across key
    /// ranges; does not preserve any useful order.
    Reversed,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct FieldSpec {
    pub name: &'static str,
    pub kind: FieldKind,
    pub order: KeyOrder,
    /// `None` for row-key components; they are never stored as columns.
    pub column_family: Option<&'static str>,
}

impl FieldSpec {
    pub const fn key(name: &'static str, kind: FieldKind) -> Self {
        Self {
            name,
            kind,
            order: KeyOrder::Ascending,
            column_family: None,
        }
    }

    pub const fn column(family: &'static str, name: &'static str, kind: FieldKind) -> Self {
        Self {
            name,
            kind,
            order: KeyOrder::Ascending,
            column_family: Some(family),
        }
    }

    pub const fn descending(self) -> Self {
        Self {
            order: KeyOrder::Descending,
            ..self
        }
    }

    pub const fn reversed(self) -> Self {
        Self {
            order: KeyOrder::Reversed,
            ..self
        }
    }

    pub fn is_key(&self) -> bool {
        self.column_family.is_none()
    }

    /// `family:name`
    pub fn column_key(&self) -> Option<String> {
        self.column_family
            .map(|family| format!("{}:{}", family, self.name))
    }
}

#[derive(Debug)]
pub struct Schema {
    pub table: &'static str,
    pub row_key: &'static [&'static str],
    pub fields: &'static [FieldSpec],
}

impl Schema {
    pub fn field(&self, name: &str) -> Option<&FieldSpec> {
        self.fields.iter().find(|f| f.name == name)
    }

    /// Row-key fields in serialization order.
    pub fn key_fields(&self) -> impl Iterator<Item = &FieldSpec> + '_ {
        self.row_key.iter().filter_map(move |name| self.field(name))
    }

    pub fn column_fields(&self) -> impl Iterator<Item = &FieldSpec> + '_ {
        self.fields.iter().filter(|f| !f.is_key())
    }

    pub fn column_families(&self) -> Vec<&'static str> {
        self.fields
            .iter()
            .filter_map(|f| f.column_family)
            .collect::<BTreeSet<_>>()
            .into_iter()
            .collect()
    }

    /// Checks the declaration is self-consistent. Call once at startup.
    pub fn validate(&self) -> Result<()> {
        let invalid = |reason: String| WideColumnError::InvalidSchema {
            table: self.table.to_string(),
            reason,
        };

        if self.table.is_empty() {
            return Err(invalid("missing table name".into()));
        }
        if self.row_key.is_empty() {
            return Err(invalid("row key has no components".into()));
        }

        let mut seen = BTreeSet::new();
        for field in self.fields {
            if !seen.insert(field.name) {
                return Err(invalid(format!("duplicate field {}", field.name)));
            }
            if field.order == KeyOrder::Descending && field.kind == FieldKind::String {
                return Err(invalid(format!(
                    "string field {} cannot be descending",
                    field.name
                )));
            }
        }

        for name in self.row_key {
            match self.field(name) {
                Some(field) if field.is_key() => {}
                Some(_) => {
                    return Err(invalid(format!(
                        "row-key component {} must not have a column family",
                        name
                    )))
                }
                None => return Err(invalid(format!("row-key component {} is undeclared", name))),
            }
        }

        for field in self.column_fields() {
            if self.row_key.contains(&field.name) {
                return Err(invalid(format!("{} is both key and column", field.name)));
            }
        }
        if let Some(orphan) = self
            .fields
            .iter()
            .find(|f| f.is_key() && !self.row_key.contains(&f.name))
        {
            return Err(invalid(format!(
                "{} has no column family and is not part of the row key",
                orphan.name
            )));
        }

        Ok(())
    }
}

#[derive(Debug, Clone, PartialEq, Eq, PartialOrd, Ord)]
pub enum FieldValue {
    Str(String),
    Int(i64),
    Timestamp(DateTime<Utc>),
}

impl FieldValue {
    pub fn as_str(&self) -> Option<&str> {
        match self {
            FieldValue::Str(s) => Some(s),
            _ => None,
        }
    }

    pub fn as_int(&self) -> Option<i64> {
        match self {
            FieldValue::Int(v) => Some(*v),
            _ => None,
        }
    }

    pub fn as_timestamp(&self) -> Option<DateTime<Utc>> {
        match self {
            FieldValue::Timestamp(ts) => Some(*ts),
            _ => None,
        }
    }
}

impl From<&str> for FieldValue {
    fn from(value: &str) -> Self {
        FieldValue::Str(value.to_string())
    }
}

impl From<String> for FieldValue {
    fn from(value: String) -> Self {
        FieldValue::Str(value)
    }
}

impl From<i64> for FieldValue {
    fn from(value: i64) -> Self {
        FieldValue::Int(value)
    }
}

impl From<DateTime<Utc>> for FieldValue {
    fn from(value: DateTime<Utc>) -> Self {
        FieldValue::Timestamp(value)
    }
}

/// Named field values of one row, key components and columns alike.
pub type Record = BTreeMap<String, FieldValue>;
