//! Typed models on top of [`WideColumnStore`]

use crate::error::{Result, WideColumnError};
use crate::schema::{FieldValue, Record, Schema};
use crate::store::WideColumnStore;
use chrono::{DateTime, Utc};

/// A struct persisted as one wide-column row.
pub trait WideColumnModel: Sized {
    const SCHEMA: &'static Schema;

    fn to_record(&self) -> Record;

    fn from_record(record: &Record) -> Result<Self>;
}

impl WideColumnStore {
    pub async fn create_model<M: WideColumnModel>(&self, model: &M) -> Result<Vec<u8>> {
        self.create(M::SCHEMA, &model.to_record()).await
    }

    pub async fn get_model<M: WideColumnModel>(&self, key: &Record) -> Result<Option<M>> {
        match self.get(M::SCHEMA, key).await? {
            Some(row) => M::from_record(&row.record).map(Some),
            None => Ok(None),
        }
    }

    pub async fn scan_models<M: WideColumnModel>(
        &self,
        leading: &Record,
        limit: Option<usize>,
    ) -> Result<Vec<M>> {
        self.scan_prefix(M::SCHEMA, leading, limit)
            .await?
            .iter()
            .map(|row| M::from_record(&row.record))
            .collect()
    }
}

/// Typed field accessors for `from_record` implementations.
pub trait RecordExt {
    fn int(&self, name: &str) -> Result<i64>;
    fn string(&self, name: &str) -> Result<String>;
    fn timestamp(&self, name: &str) -> Result<DateTime<Utc>>;
}

impl RecordExt for Record {
    fn int(&self, name: &str) -> Result<i64> {
        self.get(name)
            .and_then(FieldValue::as_int)
            .ok_or_else(|| mismatch(name, "integer"))
    }

    fn string(&self, name: &str) -> Result<String> {
        self.get(name)
            .and_then(FieldValue::as_str)
            .map(str::to_string)
            .ok_or_else(|| mismatch(name, "string"))
    }

    fn timestamp(&self, name: &str) -> Result<DateTime<Utc>> {
        self.get(name)
            .and_then(FieldValue::as_timestamp)
            .ok_or_else(|| mismatch(name, "timestamp"))
    }
}

fn mismatch(name: &str, expected: &'static str) -> WideColumnError {
    WideColumnError::TypeMismatch {
        field: name.to_string(),
        expected,
    }
}
