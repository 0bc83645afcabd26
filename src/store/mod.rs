//! Key-value interaction store
//!
//! The ledger and the similarity cache only need a handful of atomic per-key
//! operations: timestamp-scored logs, TTL'd string values and counters. Both
//! backends implement [`KvStore`]; callers treat every error as "no data".
//! Multi-key writes go through [`KvStore::apply_batch`] so a failure leaves
//! no partial state behind.

use std::time::Duration;

use async_trait::async_trait;

use crate::errors::Result;

pub mod memory;
pub mod redis_client;

pub use memory::MemoryStore;
pub use redis_client::RedisStore;

/// One write inside an all-or-nothing batch
#[derive(Debug, Clone, PartialEq)]
pub enum WriteOp {
    Append { key: String, member: String, score: f64 },
    Expire { key: String, ttl: Duration },
    Increment { key: String, member: String, amount: f64 },
    SetWithTtl { key: String, value: String, ttl: Duration },
}

impl WriteOp {
    pub fn key(&self) -> &str {
        match self {
            WriteOp::Append { key, .. }
            | WriteOp::Expire { key, .. }
            | WriteOp::Increment { key, .. }
            | WriteOp::SetWithTtl { key, .. } => key,
        }
    }
}

/// TTL-capable key-value store with sorted-set and string semantics
#[async_trait]
pub trait KvStore: Send + Sync {
    /// Adds `member` to the sorted set at `key` with `score`
    async fn append(&self, key: &str, member: &str, score: f64) -> Result<()>;

    /// Members with `min <= score <= max`, ascending by score
    async fn range_by_score(&self, key: &str, min: f64, max: f64) -> Result<Vec<String>>;

    async fn get(&self, key: &str) -> Result<Option<String>>;

    async fn set_with_ttl(&self, key: &str, value: &str, ttl: Duration) -> Result<()>;

    /// Adds `amount` to the score of `member`, returning the new score
    async fn increment(&self, key: &str, member: &str, amount: f64) -> Result<f64>;

    async fn expire(&self, key: &str, ttl: Duration) -> Result<()>;

    /// Highest-scored members first
    async fn top_by_score(&self, key: &str, limit: usize) -> Result<Vec<(String, f64)>>;

    /// Applies every op in order, or none of them
    async fn apply_batch(&self, ops: Vec<WriteOp>) -> Result<()>;
}

/// Key layout shared by every backend
pub mod keys {
    pub const POPULAR_SEARCHES: &str = "popular_searches";

    pub fn user_interactions(user_id: &str) -> String {
        format!("user_interactions:{user_id}")
    }

    pub fn business_interactions(business_id: &str) -> String {
        format!("business_interactions:{business_id}")
    }

    pub fn search_queries(user_id: &str) -> String {
        format!("search_queries:{user_id}")
    }

    pub fn user_preferences(user_id: &str) -> String {
        format!("user_preferences:{user_id}")
    }

    pub fn similar_users(user_id: &str) -> String {
        format!("similar_users:{user_id}")
    }
}
