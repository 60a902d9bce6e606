//! Wide-column error types

use thiserror::Error;

#[derive(Error, Debug, Clone, PartialEq, Eq)]
pub enum WideColumnError {
    /// A row-key component is missing or its encoded value is illegal.
    #[error("Bad row key: {0}")]
    BadRowKey(String),

    /// A write would persist zero columns.
    #[error("Row for table {table} has no columns to store")]
    EmptyColumn { table: String },

    #[error("Unknown field: {0}")]
    UnknownField(String),

    #[error("Field {field} expects a {expected} value")]
    TypeMismatch {
        field: String,
        expected: &'static str,
    },

    #[error("Cannot decode field {field} from {raw:?}")]
    Decode { field: String, raw: String },

    #[error("Value for {field} is out of range: {value}")]
    ValueOutOfRange { field: String, value: i64 },

    #[error("Invalid schema for table {table}: {reason}")]
    InvalidSchema { table: String, reason: String },

    #[error("Table not found: {0}")]
    TableNotFound(String),

    #[error("Column family {family} is not declared on table {table}")]
    UnknownColumnFamily { table: String, family: String },

    #[error("Destructive operation refused: {0}")]
    DestructiveOperation(String),

    #[error("Backend error: {0}")]
    Backend(String),
}

pub type Result<T> = std::result::Result<T, WideColumnError>;
