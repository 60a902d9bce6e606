//! Relationship tables on Postgres
//!
//! Each wide-column cell is one row of `wide_column_cells`, keyed by
//! `(table_name, row_key, column_key)`. `BYTEA` compares byte by byte, so a
//! range scan on the primary key returns rows in the same order as the
//! in-memory backend.

use async_trait::async_trait;
use sqlx::PgPool;
use tracing::{debug, error, info};
use wide_column::{Columns, WideColumnBackend, WideColumnError};

type WcResult<T> = std::result::Result<T, WideColumnError>;

#[derive(Clone)]
pub struct PgWideColumnBackend {
    pool: PgPool,
}

impl PgWideColumnBackend {
    pub fn new(pool: PgPool) -> Self {
        Self { pool }
    }

    async fn column_families(&self, table: &str) -> WcResult<Vec<String>> {
        sqlx::query_scalar::<_, Vec<String>>(
            "SELECT column_families FROM wide_column_tables WHERE name = $1",
        )
        .bind(table)
        .fetch_optional(&self.pool)
        .await
        .map_err(backend_error)?
        .ok_or_else(|| WideColumnError::TableNotFound(table.to_string()))
    }
}

#[async_trait]
impl WideColumnBackend for PgWideColumnBackend {
    async fn table_names(&self) -> WcResult<Vec<String>> {
        sqlx::query_scalar::<_, String>("SELECT name FROM wide_column_tables ORDER BY name")
            .fetch_all(&self.pool)
            .await
            .map_err(backend_error)
    }

    async fn create_table(&self, table: &str, column_families: &[&str]) -> WcResult<()> {
        let families: Vec<String> = column_families.iter().map(|f| f.to_string()).collect();
        let created = sqlx::query(
            r#"
            INSERT INTO wide_column_tables (name, column_families)
            VALUES ($1, $2)
            ON CONFLICT (name) DO NOTHING
            "#,
        )
        .bind(table)
        .bind(&families)
        .execute(&self.pool)
        .await
        .map_err(backend_error)?
        .rows_affected();

        if created > 0 {
            info!(table = %table, "Wide-column table created");
        }
        Ok(())
    }

    async fn delete_table(&self, table: &str) -> WcResult<()> {
        sqlx::query("DELETE FROM wide_column_tables WHERE name = $1")
            .bind(table)
            .execute(&self.pool)
            .await
            .map_err(backend_error)?;
        Ok(())
    }

    async fn put(&self, table: &str, row_key: &[u8], columns: Columns) -> WcResult<()> {
        let families = self.column_families(table).await?;
        for column_key in columns.keys() {
            let family = column_family(column_key);
            if !families.iter().any(|f| f == family) {
                return Err(WideColumnError::UnknownColumnFamily {
                    table: table.to_string(),
                    family: family.to_string(),
                });
            }
        }

        let (column_keys, values): (Vec<String>, Vec<String>) = columns.into_iter().unzip();
        sqlx::query(
            r#"
            INSERT INTO wide_column_cells (table_name, row_key, column_key, value)
            SELECT $1::TEXT, $2::BYTEA, * FROM UNNEST($3::TEXT[], $4::TEXT[])
            ON CONFLICT (table_name, row_key, column_key) DO UPDATE SET value = EXCLUDED.value
            "#,
        )
        .bind(table)
        .bind(row_key)
        .bind(&column_keys)
        .bind(&values)
        .execute(&self.pool)
        .await
        .map_err(backend_error)?;

        debug!(table = %table, cells = column_keys.len(), "Wide-column row written");
        Ok(())
    }

    async fn row(&self, table: &str, row_key: &[u8]) -> WcResult<Option<Columns>> {
        self.column_families(table).await?;

        let cells = sqlx::query_as::<_, (String, String)>(
            r#"
            SELECT column_key, value FROM wide_column_cells
            WHERE table_name = $1 AND row_key = $2
            "#,
        )
        .bind(table)
        .bind(row_key)
        .fetch_all(&self.pool)
        .await
        .map_err(backend_error)?;

        Ok(if cells.is_empty() {
            None
        } else {
            Some(cells.into_iter().collect())
        })
    }

    async fn scan_prefix(
        &self,
        table: &str,
        prefix: &[u8],
        limit: Option<usize>,
    ) -> WcResult<Vec<(Vec<u8>, Columns)>> {
        self.column_families(table).await?;

        let cells = sqlx::query_as::<_, (Vec<u8>, String, String)>(
            r#"
            SELECT row_key, column_key, value FROM wide_column_cells
            WHERE table_name = $1 AND row_key IN (
                SELECT DISTINCT row_key FROM wide_column_cells
                WHERE table_name = $1
                  AND row_key >= $2
                  AND ($3::BYTEA IS NULL OR row_key < $3)
                ORDER BY row_key
                LIMIT $4
            )
            ORDER BY row_key, column_key
            "#,
        )
        .bind(table)
        .bind(prefix)
        .bind(prefix_successor(prefix))
        .bind(limit.map(|n| n.min(i64::MAX as usize) as i64))
        .fetch_all(&self.pool)
        .await
        .map_err(backend_error)?;

        Ok(group_rows(cells))
    }
}

fn column_family(column_key: &str) -> &str {
    column_key
        .split_once(':')
        .map(|(family, _)| family)
        .unwrap_or(column_key)
}

/// Smallest key greater than every key starting with `prefix`. `None` when
/// no such key exists (empty prefix or all `0xFF`).
fn prefix_successor(prefix: &[u8]) -> Option<Vec<u8>> {
    let mut upper = prefix.to_vec();
    while let Some(last) = upper.pop() {
        if last < u8::MAX {
            upper.push(last + 1);
            return Some(upper);
        }
    }
    None
}

/// Folds cells ordered by row key into one column map per row.
fn group_rows(cells: Vec<(Vec<u8>, String, String)>) -> Vec<(Vec<u8>, Columns)> {
    let mut rows: Vec<(Vec<u8>, Columns)> = Vec::new();
    for (row_key, column_key, value) in cells {
        match rows.last_mut() {
            Some((key, columns)) if *key == row_key => {
                columns.insert(column_key, value);
            }
            _ => rows.push((row_key, Columns::from([(column_key, value)]))),
        }
    }
    rows
}

fn backend_error(e: sqlx::Error) -> WideColumnError {
    error!(error = %e, "Wide-column query failed");
    WideColumnError::Backend(e.to_string())
}
