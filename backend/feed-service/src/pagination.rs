//! Endless (cursor) pagination
//!
//! A page request is one of: first page, `before` a cursor (older items) or
//! `after` a cursor (everything newer). Rows are always ordered newest first
//! by `(created_at, id)`.
//!
//! Pages are resolved from the bounded cache when the cached prefix can
//! answer them, otherwise from the durable source.

use crate::error::{AppError, Result};
use crate::models::{FeedEntry, FeedItem, FeedPage};
use async_trait::async_trait;
use chrono::{DateTime, Utc};
use serde::Deserialize;

/// A row with a position in the newest-first order.
pub trait Timestamped {
    fn created_at(&self) -> DateTime<Utc>;

    /// Tie-breaker inside one timestamp.
    fn row_id(&self) -> i64;
}

impl Timestamped for FeedEntry {
    fn created_at(&self) -> DateTime<Utc> {
        self.created_at
    }

    fn row_id(&self) -> i64 {
        self.id
    }
}

impl Timestamped for FeedItem {
    fn created_at(&self) -> DateTime<Utc> {
        self.created_at
    }

    fn row_id(&self) -> i64 {
        self.id
    }
}

/// True when `a` sorts strictly before (is newer than) `b`.
pub fn is_newer<T: Timestamped>(a: &T, b: &T) -> bool {
    (a.created_at(), a.row_id()) > (b.created_at(), b.row_id())
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct Cursor {
    pub created_at: DateTime<Utc>,
    /// When set, rows are compared on `(created_at, id)` instead of the
    /// timestamp alone.
    pub id: Option<i64>,
}

impl Cursor {
    pub fn at(created_at: DateTime<Utc>) -> Self {
        Self {
            created_at,
            id: None,
        }
    }

    pub fn with_id(created_at: DateTime<Utc>, id: i64) -> Self {
        Self {
            created_at,
            id: Some(id),
        }
    }

    pub fn is_after<T: Timestamped>(&self, row: &T) -> bool {
        match self.id {
            Some(id) => (row.created_at(), row.row_id()) < (self.created_at, id),
            None => row.created_at() < self.created_at,
        }
    }

    pub fn is_before<T: Timestamped>(&self, row: &T) -> bool {
        match self.id {
            Some(id) => (row.created_at(), row.row_id()) > (self.created_at, id),
            None => row.created_at() > self.created_at,
        }
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub enum CursorParams {
    #[default]
    First,
    /// Rows older than the cursor
    Before(Cursor),
    /// All rows newer than the cursor
    After(Cursor),
}

impl CursorParams {
    pub fn matches<T: Timestamped>(&self, row: &T) -> bool {
        match self {
            CursorParams::First => true,
            CursorParams::Before(cursor) => cursor.is_after(row),
            CursorParams::After(cursor) => cursor.is_before(row),
        }
    }

    pub fn is_refresh(&self) -> bool {
        matches!(self, CursorParams::After(_))
    }
}

/// Query-string form of a page request.
#[derive(Debug, Default, Clone, Deserialize)]
pub struct PageQuery {
    #[serde(rename = "created_at__lt", alias = "before")]
    pub created_at_lt: Option<String>,
    #[serde(rename = "created_at__gt", alias = "after")]
    pub created_at_gt: Option<String>,
    pub before_id: Option<i64>,
    pub after_id: Option<i64>,
}

impl PageQuery {
    pub fn into_params(self) -> Result<CursorParams> {
        if self.before_id.is_some() && self.created_at_lt.is_none() {
            return Err(AppError::Validation(
                "before_id requires created_at__lt".to_string(),
            ));
        }
        if self.after_id.is_some() && self.created_at_gt.is_none() {
            return Err(AppError::Validation(
                "after_id requires created_at__gt".to_string(),
            ));
        }

        match (self.created_at_lt, self.created_at_gt) {
            (Some(_), Some(_)) => Err(AppError::Validation(
                "created_at__lt and created_at__gt cannot be used together".to_string(),
            )),
            (Some(raw), None) => Ok(CursorParams::Before(Cursor {
                created_at: parse_timestamp("created_at__lt", &raw)?,
                id: self.before_id,
            })),
            (None, Some(raw)) => Ok(CursorParams::After(Cursor {
                created_at: parse_timestamp("created_at__gt", &raw)?,
                id: self.after_id,
            })),
            (None, None) => Ok(CursorParams::First),
        }
    }
}

fn parse_timestamp(name: &str, raw: &str) -> Result<DateTime<Utc>> {
    DateTime::parse_from_rfc3339(raw)
        .map(|ts| ts.with_timezone(&Utc))
        .map_err(|e| AppError::Validation(format!("{} is not an RFC 3339 timestamp: {}", name, e)))
}

/// Durable, newest-first query over one owner's rows.
#[async_trait]
pub trait OrderedSource<T>: Send + Sync {
    /// Rows matching `params`, newest first, at most `limit` of them.
    async fn fetch(&self, params: &CursorParams, limit: Option<usize>) -> Result<Vec<T>>;

    async fn newest(&self, limit: usize) -> Result<Vec<T>> {
        self.fetch(&CursorParams::First, Some(limit)).await
    }
}

#[derive(Debug, Clone, Copy)]
pub struct Paginator {
    page_size: usize,
}

impl Paginator {
    pub fn new(page_size: usize) -> Self {
        Self {
            page_size: page_size.max(1),
        }
    }

    pub fn page_size(&self) -> usize {
        self.page_size
    }

    /// Pages through an in-memory newest-first list.
    pub fn paginate_ordered_list<T: Timestamped + Clone>(
        &self,
        rows: &[T],
        params: &CursorParams,
    ) -> FeedPage<T> {
        match params {
            CursorParams::After(cursor) => FeedPage {
                items: rows
                    .iter()
                    .take_while(|row| cursor.is_before(*row))
                    .cloned()
                    .collect(),
                has_next_page: false,
            },
            CursorParams::First => self.page_from(rows, 0),
            CursorParams::Before(cursor) => {
                match rows.iter().position(|row| cursor.is_after(row)) {
                    Some(start) => self.page_from(rows, start),
                    None => FeedPage::empty(),
                }
            }
        }
    }

    /// Pages through a cached prefix of at most `capacity` rows.
    ///
    /// Returns `None` when the cache cannot prove the answer complete: it is
    /// full and the page runs off its end. The caller must then query the
    /// durable source.
    pub fn paginate_cached_list<T: Timestamped + Clone>(
        &self,
        cached: &[T],
        params: &CursorParams,
        capacity: usize,
    ) -> Option<FeedPage<T>> {
        let page = self.paginate_ordered_list(cached, params);
        let possibly_truncated = cached.len() >= capacity;

        if params.is_refresh() {
            if possibly_truncated && page.items.len() == cached.len() {
                return None;
            }
            return Some(page);
        }

        if page.has_next_page || !possibly_truncated {
            return Some(page);
        }
        None
    }

    /// Resolves a page straight from the durable source.
    pub async fn paginate_source<T: Send>(
        &self,
        source: &dyn OrderedSource<T>,
        params: &CursorParams,
    ) -> Result<FeedPage<T>> {
        if params.is_refresh() {
            let items = source.fetch(params, None).await?;
            return Ok(FeedPage {
                items,
                has_next_page: false,
            });
        }

        let mut items = source.fetch(params, Some(self.page_size + 1)).await?;
        let has_next_page = items.len() > self.page_size;
        items.truncate(self.page_size);
        Ok(FeedPage {
            items,
            has_next_page,
        })
    }

    fn page_from<T: Clone>(&self, rows: &[T], start: usize) -> FeedPage<T> {
        let end = (start + self.page_size).min(rows.len());
        FeedPage {
            items: rows[start..end].to_vec(),
            has_next_page: rows.len() > start + self.page_size,
        }
    }
}
