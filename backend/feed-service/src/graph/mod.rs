//! Follow relationships on wide-column storage
//!
//! Every follow is written twice: a `Follower` row keyed by the followed
//! user and a `Following` row keyed by the follower, so both directions are
//! a single prefix scan. The leading id is character-reversed so that
//! sequential user ids land in different key ranges. The other user's id
//! closes the key, so follows recorded in the same instant stay distinct.

use crate::error::Result;
use async_trait::async_trait;
use chrono::{DateTime, Utc};
use std::collections::HashSet;
use tracing::{debug, info};
use wide_column::{
    FieldKind, FieldSpec, FieldValue, Record, RecordExt, Schema, WideColumnModel,
    WideColumnStore,
};

/// Who follows an author. Consumed by fanout only.
#[async_trait]
pub trait FollowerProvider: Send + Sync {
    async fn follower_ids(&self, author_id: i64) -> Result<Vec<i64>>;
}

pub const FOLLOWERS: Schema = Schema {
    table: "followers",
    row_key: &["to_user_id", "created_at", "follower_id"],
    fields: &[
        FieldSpec::key("to_user_id", FieldKind::Integer).reversed(),
        FieldSpec::key("created_at", FieldKind::Timestamp),
        FieldSpec::key("follower_id", FieldKind::Integer),
        FieldSpec::column("cf", "from_user_id", FieldKind::Integer),
    ],
};

pub const FOLLOWINGS: Schema = Schema {
    table: "followings",
    row_key: &["from_user_id", "created_at", "followee_id"],
    fields: &[
        FieldSpec::key("from_user_id", FieldKind::Integer).reversed(),
        FieldSpec::key("created_at", FieldKind::Timestamp),
        FieldSpec::key("followee_id", FieldKind::Integer),
        FieldSpec::column("cf", "to_user_id", FieldKind::Integer),
    ],
};

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Follower {
    pub to_user_id: i64,
    pub from_user_id: i64,
    pub created_at: DateTime<Utc>,
}

impl WideColumnModel for Follower {
    const SCHEMA: &'static Schema = &FOLLOWERS;

    fn to_record(&self) -> Record {
        let mut record = Record::new();
        record.insert("to_user_id".into(), self.to_user_id.into());
        record.insert("created_at".into(), self.created_at.into());
        record.insert("follower_id".into(), self.from_user_id.into());
        record.insert("from_user_id".into(), self.from_user_id.into());
        record
    }

    fn from_record(record: &Record) -> wide_column::Result<Self> {
        Ok(Self {
            to_user_id: record.int("to_user_id")?,
            from_user_id: record.int("from_user_id")?,
            created_at: record.timestamp("created_at")?,
        })
    }
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Following {
    pub from_user_id: i64,
    pub to_user_id: i64,
    pub created_at: DateTime<Utc>,
}

impl WideColumnModel for Following {
    const SCHEMA: &'static Schema = &FOLLOWINGS;

    fn to_record(&self) -> Record {
        let mut record = Record::new();
        record.insert("from_user_id".into(), self.from_user_id.into());
        record.insert("created_at".into(), self.created_at.into());
        record.insert("followee_id".into(), self.to_user_id.into());
        record.insert("to_user_id".into(), self.to_user_id.into());
        record
    }

    fn from_record(record: &Record) -> wide_column::Result<Self> {
        Ok(Self {
            from_user_id: record.int("from_user_id")?,
            to_user_id: record.int("to_user_id")?,
            created_at: record.timestamp("created_at")?,
        })
    }
}

#[derive(Clone)]
pub struct WideColumnGraph {
    store: WideColumnStore,
}

impl WideColumnGraph {
    pub fn new(store: WideColumnStore) -> Self {
        Self { store }
    }

    /// Creates both relationship tables if missing.
    pub async fn ensure_tables(&self) -> Result<()> {
        for schema in [&FOLLOWERS, &FOLLOWINGS] {
            self.store.ensure_table(schema).await?;
        }
        info!(
            followers = %self.store.table_name(&FOLLOWERS),
            followings = %self.store.table_name(&FOLLOWINGS),
            "Relationship tables ready"
        );
        Ok(())
    }

    pub async fn follow(&self, from_user_id: i64, to_user_id: i64, at: DateTime<Utc>) -> Result<()> {
        self.store
            .create_model(&Following {
                from_user_id,
                to_user_id,
                created_at: at,
            })
            .await?;
        self.store
            .create_model(&Follower {
                to_user_id,
                from_user_id,
                created_at: at,
            })
            .await?;
        debug!(from_user_id, to_user_id, "Follow recorded");
        Ok(())
    }

    pub async fn followers(&self, user_id: i64) -> Result<Vec<Follower>> {
        Ok(self
            .store
            .scan_models::<Follower>(&leading("to_user_id", user_id), None)
            .await?)
    }

    pub async fn followings(&self, user_id: i64) -> Result<Vec<Following>> {
        Ok(self
            .store
            .scan_models::<Following>(&leading("from_user_id", user_id), None)
            .await?)
    }

    pub async fn following_ids(&self, user_id: i64) -> Result<Vec<i64>> {
        let followings = self.followings(user_id).await?;
        Ok(unique(followings.iter().map(|f| f.to_user_id)))
    }
}

#[async_trait]
impl FollowerProvider for WideColumnGraph {
    async fn follower_ids(&self, author_id: i64) -> Result<Vec<i64>> {
        let followers = self.followers(author_id).await?;
        Ok(unique(followers.iter().map(|f| f.from_user_id)))
    }
}

fn leading(name: &str, user_id: i64) -> Record {
    let mut record = Record::new();
    record.insert(name.to_string(), FieldValue::Int(user_id));
    record
}

/// First occurrence wins; scan order is kept.
fn unique(ids: impl Iterator<Item = i64>) -> Vec<i64> {
    let mut seen = HashSet::new();
    ids.filter(|id| seen.insert(*id)).collect()
}
