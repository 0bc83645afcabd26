//! In-process store backed by `DashMap`, used in tests and single-node setups

use std::sync::Arc;
use std::time::Duration;
use std::time::Instant;

use async_trait::async_trait;
use dashmap::DashMap;
use tracing::debug;

use super::KvStore;
use super::WriteOp;
use crate::errors::GeoRankError;
use crate::errors::Result;

#[derive(Debug, Clone)]
enum Value {
    Text(String),
    /// Kept sorted by (score, member)
    Sorted(Vec<(String, f64)>),
}

/// Store entry with optional expiry
#[derive(Debug, Clone)]
struct StoreEntry {
    value: Value,
    expires_at: Option<Instant>,
}

impl StoreEntry {
    fn new(value: Value) -> Self {
        Self {
            value,
            expires_at: None,
        }
    }

    fn is_expired(&self) -> bool {
        self.expires_at.is_some_and(|at| Instant::now() > at)
    }
}

#[derive(Clone, Default)]
pub struct MemoryStore {
    entries: Arc<DashMap<String, StoreEntry>>,
}

impl MemoryStore {
    pub fn new() -> Self {
        Self::default()
    }

    /// Number of live keys
    pub fn len(&self) -> usize {
        self.entries.iter().filter(|e| !e.is_expired()).count()
    }

    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }

    /// Drops expired keys
    pub fn cleanup_expired(&self) -> usize {
        let before = self.entries.len();
        self.entries.retain(|_, entry| !entry.is_expired());
        let removed = before - self.entries.len();
        if removed > 0 {
            debug!("Removed {} expired store entries", removed);
        }
        removed
    }

    /// Removes `key` if its entry has expired
    fn evict_if_expired(&self, key: &str) {
        self.entries.remove_if(key, |_, entry| entry.is_expired());
    }

    fn wrong_type(key: &str) -> GeoRankError {
        GeoRankError::Store(format!("WRONGTYPE operation against key {key}"))
    }

    /// Rejects `op` up front if it would hit a key of the wrong type
    fn check_op(&self, op: &WriteOp) -> Result<()> {
        let key = op.key();
        self.evict_if_expired(key);
        let Some(entry) = self.entries.get(key) else {
            return Ok(());
        };
        match (op, &entry.value) {
            (WriteOp::Append { .. } | WriteOp::Increment { .. }, Value::Text(_)) => Err(Self::wrong_type(key)),
            _ => Ok(()),
        }
    }

    fn sorted_insert(set: &mut Vec<(String, f64)>, member: &str, score: f64) {
        set.retain(|(m, _)| m != member);
        let pos = set.partition_point(|(m, s)| (*s, m.as_str()) < (score, member));
        set.insert(pos, (member.to_string(), score));
    }
}

#[async_trait]
impl KvStore for MemoryStore {
    async fn append(&self, key: &str, member: &str, score: f64) -> Result<()> {
        self.evict_if_expired(key);
        let mut entry = self
            .entries
            .entry(key.to_string())
            .or_insert_with(|| StoreEntry::new(Value::Sorted(Vec::new())));
        match &mut entry.value {
            Value::Sorted(set) => {
                Self::sorted_insert(set, member, score);
                Ok(())
            }
            Value::Text(_) => Err(Self::wrong_type(key)),
        }
    }

    async fn range_by_score(&self, key: &str, min: f64, max: f64) -> Result<Vec<String>> {
        self.evict_if_expired(key);
        let Some(entry) = self.entries.get(key) else {
            return Ok(Vec::new());
        };
        match &entry.value {
            Value::Sorted(set) => Ok(set
                .iter()
                .filter(|(_, s)| *s >= min && *s <= max)
                .map(|(m, _)| m.clone())
                .collect()),
            Value::Text(_) => Err(Self::wrong_type(key)),
        }
    }

    async fn get(&self, key: &str) -> Result<Option<String>> {
        self.evict_if_expired(key);
        let Some(entry) = self.entries.get(key) else {
            return Ok(None);
        };
        match &entry.value {
            Value::Text(text) => Ok(Some(text.clone())),
            Value::Sorted(_) => Err(Self::wrong_type(key)),
        }
    }

    async fn set_with_ttl(&self, key: &str, value: &str, ttl: Duration) -> Result<()> {
        self.entries.insert(
            key.to_string(),
            StoreEntry {
                value: Value::Text(value.to_string()),
                expires_at: Some(Instant::now() + ttl),
            },
        );
        Ok(())
    }

    async fn increment(&self, key: &str, member: &str, amount: f64) -> Result<f64> {
        self.evict_if_expired(key);
        let mut entry = self
            .entries
            .entry(key.to_string())
            .or_insert_with(|| StoreEntry::new(Value::Sorted(Vec::new())));
        match &mut entry.value {
            Value::Sorted(set) => {
                let current = set
                    .iter()
                    .find(|(m, _)| m == member)
                    .map_or(0.0, |(_, s)| *s);
                let updated = current + amount;
                Self::sorted_insert(set, member, updated);
                Ok(updated)
            }
            Value::Text(_) => Err(Self::wrong_type(key)),
        }
    }

    async fn expire(&self, key: &str, ttl: Duration) -> Result<()> {
        // A lapsed key is gone; it is not revived by a new TTL
        self.evict_if_expired(key);
        if let Some(mut entry) = self.entries.get_mut(key) {
            entry.expires_at = Some(Instant::now() + ttl);
        }
        Ok(())
    }

    async fn apply_batch(&self, ops: Vec<WriteOp>) -> Result<()> {
        for op in &ops {
            self.check_op(op)?;
        }
        for op in ops {
            match op {
                WriteOp::Append { key, member, score } => self.append(&key, &member, score).await?,
                WriteOp::Expire { key, ttl } => self.expire(&key, ttl).await?,
                WriteOp::Increment { key, member, amount } => {
                    self.increment(&key, &member, amount).await?;
                }
                WriteOp::SetWithTtl { key, value, ttl } => self.set_with_ttl(&key, &value, ttl).await?,
            }
        }
        Ok(())
    }

    async fn top_by_score(&self, key: &str, limit: usize) -> Result<Vec<(String, f64)>> {
        self.evict_if_expired(key);
        let Some(entry) = self.entries.get(key) else {
            return Ok(Vec::new());
        };
        match &entry.value {
            Value::Sorted(set) => Ok(set.iter().rev().take(limit).cloned().collect()),
            Value::Text(_) => Err(Self::wrong_type(key)),
        }
    }
}
