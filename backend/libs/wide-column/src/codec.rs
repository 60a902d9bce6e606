//! Row-key and column-value codec
//!
//! Row keys are the colon-joined serialized key components, in schema order:
//!
//! ```text
//! {component1}:{component2}:...:{componentN}
//! ```
//!
//! Integers and timestamps are zero-padded to [`INTEGER_WIDTH`] digits so that
//! byte-lexicographic order matches numeric order.

use crate::error::{Result, WideColumnError};
use crate::schema::{FieldKind, FieldSpec, FieldValue, KeyOrder, Record, Schema};
use chrono::{DateTime, Utc};
use std::collections::BTreeMap;

pub const SEPARATOR: char = ':';

/// Fixed digit width of integer and timestamp values.
pub const INTEGER_WIDTH: usize = 16;

const MAX_PADDED_VALUE: i64 = 9_999_999_999_999_999;

/// Raw column map as stored by a backend: `family:name` -> serialized value.
pub type Columns = BTreeMap<String, String>;

/// Row-key components decoded from bytes. Trailing components that were not
/// present in the key decode to `None`.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct DecodedKey {
    pub components: Vec<(&'static str, Option<FieldValue>)>,
}

impl DecodedKey {
    pub fn get(&self, name: &str) -> Option<&FieldValue> {
        self.components
            .iter()
            .find(|(n, _)| *n == name)
            .and_then(|(_, v)| v.as_ref())
    }

    pub fn is_complete(&self) -> bool {
        self.components.iter().all(|(_, v)| v.is_some())
    }

    pub fn into_record(self) -> Record {
        self.components
            .into_iter()
            .filter_map(|(name, value)| value.map(|v| (name.to_string(), v)))
            .collect()
    }
}

pub struct RowKeyCodec;

impl RowKeyCodec {
    /// Serializes one value according to the field's kind and order.
    pub fn serialize_value(field: &FieldSpec, value: &FieldValue) -> Result<String> {
        let raw = match (field.kind, value) {
            (FieldKind::String, FieldValue::Str(s)) => s.clone(),
            (FieldKind::Integer, FieldValue::Int(v)) => pad_integer(field, *v)?,
            (FieldKind::Timestamp, FieldValue::Timestamp(ts)) => {
                pad_integer(field, ts.timestamp_micros())?
            }
            (kind, _) => {
                return Err(WideColumnError::TypeMismatch {
                    field: field.name.to_string(),
                    expected: kind.name(),
                })
            }
        };

        match field.order {
            KeyOrder::Ascending => Ok(raw),
            KeyOrder::Reversed => Ok(raw.chars().rev().collect()),
            KeyOrder::Descending => complement_digits(field, &raw),
        }
    }

    pub fn deserialize_value(field: &FieldSpec, raw: &str) -> Result<FieldValue> {
        let plain = match field.order {
            KeyOrder::Ascending => raw.to_string(),
            KeyOrder::Reversed => raw.chars().rev().collect(),
            KeyOrder::Descending => complement_digits(field, raw)?,
        };

        let decode_err = || WideColumnError::Decode {
            field: field.name.to_string(),
            raw: raw.to_string(),
        };

        match field.kind {
            FieldKind::String => Ok(FieldValue::Str(plain)),
            FieldKind::Integer => plain
                .parse::<i64>()
                .map(FieldValue::Int)
                .map_err(|_| decode_err()),
            FieldKind::Timestamp => {
                let micros = plain.parse::<i64>().map_err(|_| decode_err())?;
                DateTime::<Utc>::from_timestamp_micros(micros)
                    .map(FieldValue::Timestamp)
                    .ok_or_else(decode_err)
            }
        }
    }

    /// Serializes every row-key component of `record`, in schema order.
    ///
    /// All components are mandatory.
    pub fn serialize_key(schema: &Schema, record: &Record) -> Result<Vec<u8>> {
        let mut values = Vec::with_capacity(schema.row_key.len());
        for field in schema.key_fields() {
            let value = record.get(field.name).ok_or_else(|| {
                WideColumnError::BadRowKey(format!("{} is missing in row key", field.name))
            })?;
            values.push(Self::serialize_component(field, value)?);
        }
        Ok(values.join(&SEPARATOR.to_string()).into_bytes())
    }

    /// Serializes the leading row-key components present in `record`, for
    /// prefix scans. A partial prefix ends with the separator so that it only
    /// matches whole components.
    pub fn serialize_key_prefix(schema: &Schema, record: &Record) -> Result<Vec<u8>> {
        let mut values = Vec::new();
        for field in schema.key_fields() {
            match record.get(field.name) {
                Some(value) => values.push(Self::serialize_component(field, value)?),
                None => break,
            }
        }

        if values.is_empty() {
            return Err(WideColumnError::BadRowKey(format!(
                "prefix for {} needs at least {}",
                schema.table, schema.row_key[0]
            )));
        }

        let mut prefix = values.join(&SEPARATOR.to_string());
        if values.len() < schema.row_key.len() {
            prefix.push(SEPARATOR);
        }
        Ok(prefix.into_bytes())
    }

    pub fn deserialize_key(schema: &Schema, row_key: &[u8]) -> Result<DecodedKey> {
        let key = std::str::from_utf8(row_key).map_err(|_| WideColumnError::Decode {
            field: "row_key".to_string(),
            raw: String::from_utf8_lossy(row_key).into_owned(),
        })?;

        let segments: Vec<&str> = if key.is_empty() {
            Vec::new()
        } else {
            key.split(SEPARATOR).collect()
        };

        if segments.len() > schema.row_key.len() {
            return Err(WideColumnError::BadRowKey(format!(
                "{} has {} segments, {} declares {}",
                key,
                segments.len(),
                schema.table,
                schema.row_key.len()
            )));
        }

        let mut components = Vec::with_capacity(schema.row_key.len());
        for (index, field) in schema.key_fields().enumerate() {
            let value = match segments.get(index) {
                Some(raw) => Some(Self::deserialize_value(field, raw)?),
                None => None,
            };
            components.push((field.name, value));
        }

        Ok(DecodedKey { components })
    }

    /// Serializes the column fields of `record`. Absent columns are skipped;
    /// a record with no column values at all is rejected.
    pub fn serialize_columns(schema: &Schema, record: &Record) -> Result<Columns> {
        if let Some(unknown) = record.keys().find(|name| schema.field(name).is_none()) {
            return Err(WideColumnError::UnknownField(unknown.clone()));
        }

        let mut columns = Columns::new();
        for field in schema.column_fields() {
            let (Some(value), Some(column_key)) = (record.get(field.name), field.column_key())
            else {
                continue;
            };
            columns.insert(column_key, Self::serialize_value(field, value)?);
        }

        if columns.is_empty() {
            return Err(WideColumnError::EmptyColumn {
                table: schema.table.to_string(),
            });
        }
        Ok(columns)
    }

    pub fn deserialize_columns(schema: &Schema, columns: &Columns) -> Result<Record> {
        let mut record = Record::new();
        for (column_key, raw) in columns {
            let name = column_key
                .split_once(SEPARATOR)
                .map(|(_, name)| name)
                .unwrap_or(column_key);
            let field = schema
                .field(name)
                .filter(|f| !f.is_key())
                .ok_or_else(|| WideColumnError::UnknownField(column_key.clone()))?;
            record.insert(name.to_string(), Self::deserialize_value(field, raw)?);
        }
        Ok(record)
    }

    fn serialize_component(field: &FieldSpec, value: &FieldValue) -> Result<String> {
        let serialized = Self::serialize_value(field, value)?;
        if serialized.contains(SEPARATOR) {
            return Err(WideColumnError::BadRowKey(format!(
                "{} should not contain '{}' in value: {}",
                field.name, SEPARATOR, serialized
            )));
        }
        Ok(serialized)
    }
}

fn pad_integer(field: &FieldSpec, value: i64) -> Result<String> {
    if !(0..=MAX_PADDED_VALUE).contains(&value) {
        return Err(WideColumnError::ValueOutOfRange {
            field: field.name.to_string(),
            value,
        });
    }
    Ok(format!("{:0width$}", value, width = INTEGER_WIDTH))
}

fn complement_digits(field: &FieldSpec, raw: &str) -> Result<String> {
    raw.chars()
        .map(|c| c.to_digit(10).and_then(|d| char::from_digit(9 - d, 10)))
        .collect::<Option<String>>()
        .ok_or_else(|| WideColumnError::Decode {
            field: field.name.to_string(),
            raw: raw.to_string(),
        })
}
