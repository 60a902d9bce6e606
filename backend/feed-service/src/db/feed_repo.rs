use super::FeedStore;
use crate::error::Result;
use crate::models::{FeedEntry, NewFeedEntry};
use crate::pagination::{Cursor, CursorParams};
use async_trait::async_trait;
use chrono::{DateTime, Utc};
use sqlx::{PgPool, Postgres, QueryBuilder};
use tracing::{debug, error};

const COLUMNS: &str = "id, user_id, item_id, created_at";

/// `newsfeeds` table on Postgres.
#[derive(Clone)]
pub struct PgFeedStore {
    pool: PgPool,
}

impl PgFeedStore {
    pub fn new(pool: PgPool) -> Self {
        Self { pool }
    }
}

#[async_trait]
impl FeedStore for PgFeedStore {
    async fn insert(&self, entry: &NewFeedEntry) -> Result<Option<FeedEntry>> {
        let row = sqlx::query_as::<_, FeedEntry>(
            r#"
            INSERT INTO newsfeeds (user_id, item_id, created_at)
            VALUES ($1, $2, $3)
            ON CONFLICT (user_id, item_id) DO NOTHING
            RETURNING id, user_id, item_id, created_at
            "#,
        )
        .bind(entry.user_id)
        .bind(entry.item_id)
        .bind(entry.created_at)
        .fetch_optional(&self.pool)
        .await
        .map_err(|e| {
            error!(user_id = entry.user_id, item_id = entry.item_id, error = %e, "Feed entry insert failed");
            e
        })?;

        Ok(row)
    }

    async fn bulk_insert(&self, entries: &[NewFeedEntry]) -> Result<Vec<FeedEntry>> {
        if entries.is_empty() {
            return Ok(Vec::new());
        }

        let user_ids: Vec<i64> = entries.iter().map(|e| e.user_id).collect();
        let item_ids: Vec<i64> = entries.iter().map(|e| e.item_id).collect();
        let created_ats: Vec<DateTime<Utc>> = entries.iter().map(|e| e.created_at).collect();

        let mut rows = sqlx::query_as::<_, FeedEntry>(
            r#"
            INSERT INTO newsfeeds (user_id, item_id, created_at)
            SELECT * FROM UNNEST($1::BIGINT[], $2::BIGINT[], $3::TIMESTAMPTZ[])
            ON CONFLICT (user_id, item_id) DO NOTHING
            RETURNING id, user_id, item_id, created_at
            "#,
        )
        .bind(&user_ids)
        .bind(&item_ids)
        .bind(&created_ats)
        .fetch_all(&self.pool)
        .await
        .map_err(|e| {
            error!(rows = entries.len(), error = %e, "Feed entry bulk insert failed");
            e
        })?;

        rows.sort_by_key(|row| row.id);
        debug!(
            requested = entries.len(),
            inserted = rows.len(),
            "Bulk inserted feed entries"
        );
        Ok(rows)
    }

    async fn list(
        &self,
        user_id: i64,
        params: &CursorParams,
        limit: Option<usize>,
    ) -> Result<Vec<FeedEntry>> {
        let mut query: QueryBuilder<Postgres> =
            QueryBuilder::new(format!("SELECT {} FROM newsfeeds WHERE user_id = ", COLUMNS));
        query.push_bind(user_id);

        match params {
            CursorParams::First => {}
            CursorParams::Before(cursor) => push_cursor(&mut query, cursor, "<"),
            CursorParams::After(cursor) => push_cursor(&mut query, cursor, ">"),
        }

        query.push(" ORDER BY created_at DESC, id DESC");
        if let Some(limit) = limit {
            query.push(" LIMIT ").push_bind(limit as i64);
        }

        let rows = query
            .build_query_as::<FeedEntry>()
            .fetch_all(&self.pool)
            .await
            .map_err(|e| {
                error!(user_id, error = %e, "Feed query failed");
                e
            })?;
        Ok(rows)
    }

    async fn delete_for_item(&self, item_id: i64) -> Result<Vec<i64>> {
        let user_ids = sqlx::query_scalar::<_, i64>(
            "DELETE FROM newsfeeds WHERE item_id = $1 RETURNING user_id",
        )
        .bind(item_id)
        .fetch_all(&self.pool)
        .await?;
        Ok(user_ids)
    }
}

fn push_cursor(query: &mut QueryBuilder<'_, Postgres>, cursor: &Cursor, op: &str) {
    match cursor.id {
        Some(id) => {
            query
                .push(format!(" AND (created_at, id) {} (", op))
                .push_bind(cursor.created_at)
                .push(", ")
                .push_bind(id)
                .push(")");
        }
        None => {
            query
                .push(format!(" AND created_at {} ", op))
                .push_bind(cursor.created_at);
        }
    }
}
