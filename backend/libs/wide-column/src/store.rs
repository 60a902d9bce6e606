//! Column-family store over a pluggable backend
//!
//! `WideColumnStore` owns the schema-aware operations (create/get/scan and
//! table lifecycle); a `WideColumnBackend` only deals in table names, raw row
//! keys and `family:name` column maps.

use crate::codec::{Columns, RowKeyCodec};
use crate::error::{Result, WideColumnError};
use crate::schema::{Record, Schema};
use async_trait::async_trait;
use std::collections::{BTreeMap, BTreeSet, HashMap};
use std::ops::Bound;
use std::sync::Arc;
use tokio::sync::RwLock;
use tracing::{debug, info};

/// Raw storage operations a column-family engine must provide.
#[async_trait]
pub trait WideColumnBackend: Send + Sync {
    async fn table_names(&self) -> Result<Vec<String>>;

    async fn create_table(&self, table: &str, column_families: &[&str]) -> Result<()>;

    /// Drops `table` if it exists; no-op otherwise.
    async fn delete_table(&self, table: &str) -> Result<()>;

    /// Upserts columns of one row. Existing columns are overwritten.
    async fn put(&self, table: &str, row_key: &[u8], columns: Columns) -> Result<()>;

    async fn row(&self, table: &str, row_key: &[u8]) -> Result<Option<Columns>>;

    /// Rows with `row_key` starting with `prefix`, in ascending byte order.
    async fn scan_prefix(
        &self,
        table: &str,
        prefix: &[u8],
        limit: Option<usize>,
    ) -> Result<Vec<(Vec<u8>, Columns)>>;
}

#[derive(Default)]
struct Table {
    column_families: BTreeSet<String>,
    rows: BTreeMap<Vec<u8>, Columns>,
}

/// Ordered in-process backend. Rows are kept in a `BTreeMap`, so scans
/// follow the same byte order a region server would use.
#[derive(Default)]
pub struct InMemoryBackend {
    tables: RwLock<HashMap<String, Table>>,
}

impl InMemoryBackend {
    pub fn new() -> Self {
        Self::default()
    }
}

#[async_trait]
impl WideColumnBackend for InMemoryBackend {
    async fn table_names(&self) -> Result<Vec<String>> {
        let tables = self.tables.read().await;
        let mut names: Vec<String> = tables.keys().cloned().collect();
        names.sort();
        Ok(names)
    }

    async fn create_table(&self, table: &str, column_families: &[&str]) -> Result<()> {
        let mut tables = self.tables.write().await;
        tables.entry(table.to_string()).or_insert_with(|| Table {
            column_families: column_families.iter().map(|f| f.to_string()).collect(),
            rows: BTreeMap::new(),
        });
        Ok(())
    }

    async fn delete_table(&self, table: &str) -> Result<()> {
        self.tables.write().await.remove(table);
        Ok(())
    }

    async fn put(&self, table: &str, row_key: &[u8], columns: Columns) -> Result<()> {
        let mut tables = self.tables.write().await;
        let entry = tables
            .get_mut(table)
            .ok_or_else(|| WideColumnError::TableNotFound(table.to_string()))?;

        for column_key in columns.keys() {
            let family = column_key
                .split_once(':')
                .map(|(family, _)| family)
                .unwrap_or(column_key.as_str());
            if !entry.column_families.contains(family) {
                return Err(WideColumnError::UnknownColumnFamily {
                    table: table.to_string(),
                    family: family.to_string(),
                });
            }
        }

        entry.rows.entry(row_key.to_vec()).or_default().extend(columns);
        Ok(())
    }

    async fn row(&self, table: &str, row_key: &[u8]) -> Result<Option<Columns>> {
        let tables = self.tables.read().await;
        let entry = tables
            .get(table)
            .ok_or_else(|| WideColumnError::TableNotFound(table.to_string()))?;
        Ok(entry.rows.get(row_key).cloned())
    }

    async fn scan_prefix(
        &self,
        table: &str,
        prefix: &[u8],
        limit: Option<usize>,
    ) -> Result<Vec<(Vec<u8>, Columns)>> {
        let tables = self.tables.read().await;
        let entry = tables
            .get(table)
            .ok_or_else(|| WideColumnError::TableNotFound(table.to_string()))?;

        let rows = entry
            .rows
            .range::<[u8], _>((Bound::Included(prefix), Bound::Unbounded))
            .take_while(|(key, _)| key.starts_with(prefix))
            .take(limit.unwrap_or(usize::MAX))
            .map(|(key, columns)| (key.clone(), columns.clone()))
            .collect();
        Ok(rows)
    }
}

/// Table-name namespace. Non-production deployments prefix every table so
/// that they can share a cluster with production without collisions.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum TableNamespace {
    Production,
    Prefixed(String),
}

impl TableNamespace {
    pub fn qualify(&self, table: &str) -> String {
        match self {
            TableNamespace::Production => table.to_string(),
            TableNamespace::Prefixed(prefix) => format!("{}{}", prefix, table),
        }
    }

    pub fn is_production(&self) -> bool {
        matches!(self, TableNamespace::Production)
    }
}

/// A decoded row: key components plus stored columns.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Row {
    pub row_key: Vec<u8>,
    pub record: Record,
}

#[derive(Clone)]
pub struct WideColumnStore {
    backend: Arc<dyn WideColumnBackend>,
    namespace: TableNamespace,
}

impl WideColumnStore {
    pub fn new(backend: Arc<dyn WideColumnBackend>, namespace: TableNamespace) -> Self {
        Self { backend, namespace }
    }

    pub fn namespace(&self) -> &TableNamespace {
        &self.namespace
    }

    pub fn table_name(&self, schema: &Schema) -> String {
        self.namespace.qualify(schema.table)
    }

    /// Creates the table with the schema's column families unless it exists.
    pub async fn ensure_table(&self, schema: &Schema) -> Result<()> {
        schema.validate()?;
        let table = self.table_name(schema);
        if self.backend.table_names().await?.contains(&table) {
            return Ok(());
        }

        let families = schema.column_families();
        self.backend.create_table(&table, &families).await?;
        info!(table = %table, families = ?families, "Created wide-column table");
        Ok(())
    }

    /// Drops the table. Refused in production namespaces.
    pub async fn drop_table(&self, schema: &Schema) -> Result<()> {
        let table = self.table_name(schema);
        if self.namespace.is_production() {
            return Err(WideColumnError::DestructiveOperation(format!(
                "dropping {} is only allowed outside production",
                table
            )));
        }
        self.backend.delete_table(&table).await?;
        debug!(table = %table, "Dropped wide-column table");
        Ok(())
    }

    /// Writes one row. Writing an existing row key overwrites its columns.
    pub async fn create(&self, schema: &Schema, record: &Record) -> Result<Vec<u8>> {
        let row_key = RowKeyCodec::serialize_key(schema, record)?;
        let columns = RowKeyCodec::serialize_columns(schema, record)?;
        self.backend
            .put(&self.table_name(schema), &row_key, columns)
            .await?;
        Ok(row_key)
    }

    /// Reads the row addressed by the key components in `key`.
    pub async fn get(&self, schema: &Schema, key: &Record) -> Result<Option<Row>> {
        let row_key = RowKeyCodec::serialize_key(schema, key)?;
        match self.backend.row(&self.table_name(schema), &row_key).await? {
            Some(columns) if !columns.is_empty() => Ok(Some(decode_row(schema, row_key, &columns)?)),
            _ => Ok(None),
        }
    }

    /// All rows whose leading key components equal those in `leading`, in
    /// row-key order.
    pub async fn scan_prefix(
        &self,
        schema: &Schema,
        leading: &Record,
        limit: Option<usize>,
    ) -> Result<Vec<Row>> {
        let prefix = RowKeyCodec::serialize_key_prefix(schema, leading)?;
        let rows = self
            .backend
            .scan_prefix(&self.table_name(schema), &prefix, limit)
            .await?;

        rows.into_iter()
            .map(|(row_key, columns)| decode_row(schema, row_key, &columns))
            .collect()
    }
}

fn decode_row(schema: &Schema, row_key: Vec<u8>, columns: &Columns) -> Result<Row> {
    let mut record = RowKeyCodec::deserialize_key(schema, &row_key)?.into_record();
    record.extend(RowKeyCodec::deserialize_columns(schema, columns)?);
    Ok(Row { row_key, record })
}
