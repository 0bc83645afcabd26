//! Append-only interaction log with per-user and per-business indexes
//!
//! Every write goes through [`KvStore`]; the ledger keeps no state of its own.
//! One interaction is committed as a single batch, so its indexes never diverge.
//! Writes never fail the caller: store errors are logged and dropped. Reads
//! degrade to empty results.

use std::sync::Arc;

use chrono::Duration as ChronoDuration;
use chrono::Utc;
use serde::de::DeserializeOwned;
use serde::Deserialize;
use serde::Serialize;
use tracing::debug;
use tracing::warn;

use crate::config::CollaborativeConfig;
use crate::errors::Result;
use crate::models::BusinessTouch;
use crate::models::UserInteraction;
use crate::models::UserPreferences;
use crate::store::keys;
use crate::store::KvStore;
use crate::store::WriteOp;

/// Entry of the per-user search query log
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct SearchQueryEntry {
    pub query: String,
    pub timestamp: chrono::DateTime<Utc>,
}

/// Aggregate view over the global search popularity set
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct SearchAnalytics {
    pub total_search_queries: u64,
    pub unique_search_terms: usize,
    pub trending_searches: Vec<(String, u64)>,
}

pub struct InteractionLedger {
    store: Arc<dyn KvStore>,
    config: CollaborativeConfig,
}

impl InteractionLedger {
    pub fn new(store: Arc<dyn KvStore>, config: CollaborativeConfig) -> Self {
        Self { store, config }
    }

    pub fn config(&self) -> &CollaborativeConfig {
        &self.config
    }

    pub(crate) fn store(&self) -> &Arc<dyn KvStore> {
        &self.store
    }

    /// Appends an interaction to every index it belongs to and refreshes preferences
    pub async fn record(&self, interaction: &UserInteraction) {
        if let Err(e) = self.try_record(interaction).await {
            warn!(
                "Failed to record {} interaction for user {}: {}",
                interaction.kind, interaction.user_id, e
            );
        }
    }

    /// Stages every write, then commits them as one batch
    async fn try_record(&self, interaction: &UserInteraction) -> Result<()> {
        let ttl = self.config.retention();
        let score = interaction.score();
        let mut ops = Vec::new();

        let user_key = keys::user_interactions(&interaction.user_id);
        ops.push(WriteOp::Append {
            key: user_key.clone(),
            member: serde_json::to_string(interaction)?,
            score,
        });
        ops.push(WriteOp::Expire { key: user_key, ttl });

        if !interaction.is_search_event() {
            let business_key = keys::business_interactions(&interaction.business_id);
            ops.push(WriteOp::Append {
                key: business_key.clone(),
                member: serde_json::to_string(&BusinessTouch::from(interaction))?,
                score,
            });
            ops.push(WriteOp::Expire { key: business_key, ttl });
        }

        if let Some(query) = interaction.query.as_deref().map(str::trim).filter(|q| !q.is_empty()) {
            let search_key = keys::search_queries(&interaction.user_id);
            let entry = serde_json::to_string(&SearchQueryEntry {
                query: query.to_string(),
                timestamp: interaction.timestamp,
            })?;
            ops.push(WriteOp::Append {
                key: search_key.clone(),
                member: entry,
                score,
            });
            ops.push(WriteOp::Expire { key: search_key, ttl });
            ops.push(WriteOp::Increment {
                key: keys::POPULAR_SEARCHES.to_string(),
                member: query.to_string(),
                amount: 1.0,
            });
        }

        let preferences = self.merged_preferences(interaction).await?;
        ops.push(WriteOp::SetWithTtl {
            key: keys::user_preferences(&interaction.user_id),
            value: serde_json::to_string(&preferences)?,
            ttl,
        });

        self.store.apply_batch(ops).await?;

        debug!(
            "Recorded {} for user {} on {}",
            interaction.kind, interaction.user_id, interaction.business_id
        );
        Ok(())
    }

    /// Interactions newer than `since_days`, oldest first
    pub async fn interactions_for(&self, user_id: &str, since_days: u32) -> Vec<UserInteraction> {
        match self.try_interactions_for(user_id, since_days).await {
            Ok(interactions) => interactions,
            Err(e) => {
                warn!("Failed to load interactions for user {}: {}", user_id, e);
                Vec::new()
            }
        }
    }

    pub(crate) async fn try_interactions_for(
        &self,
        user_id: &str,
        since_days: u32,
    ) -> Result<Vec<UserInteraction>> {
        let cutoff = cutoff_score(since_days);
        let raw = self
            .store
            .range_by_score(&keys::user_interactions(user_id), cutoff, f64::INFINITY)
            .await?;
        Ok(decode_all(&raw))
    }

    /// Touches recorded against a business within `since_days`, oldest first
    pub async fn business_touches(&self, business_id: &str, since_days: u32) -> Result<Vec<BusinessTouch>> {
        let cutoff = cutoff_score(since_days);
        let raw = self
            .store
            .range_by_score(&keys::business_interactions(business_id), cutoff, f64::INFINITY)
            .await?;
        Ok(decode_all(&raw))
    }

    /// Folds `interaction` into the stored preferences, creating them if absent
    pub async fn upsert_preferences(&self, interaction: &UserInteraction) -> Result<UserPreferences> {
        let preferences = self.merged_preferences(interaction).await?;
        let json = serde_json::to_string(&preferences)?;
        self.store
            .set_with_ttl(&keys::user_preferences(&interaction.user_id), &json, self.config.retention())
            .await?;
        Ok(preferences)
    }

    async fn merged_preferences(&self, interaction: &UserInteraction) -> Result<UserPreferences> {
        let key = keys::user_preferences(&interaction.user_id);
        let mut preferences = match self.store.get(&key).await? {
            Some(json) => serde_json::from_str(&json)
                .unwrap_or_else(|_| UserPreferences::new(&interaction.user_id)),
            None => UserPreferences::new(&interaction.user_id),
        };
        preferences.absorb(interaction, self.config.max_search_patterns);
        Ok(preferences)
    }

    pub async fn preferences(&self, user_id: &str) -> Option<UserPreferences> {
        let key = keys::user_preferences(user_id);
        match self.store.get(&key).await {
            Ok(Some(json)) => serde_json::from_str(&json)
                .map_err(|e| warn!("Corrupt preferences for user {}: {}", user_id, e))
                .ok(),
            Ok(None) => None,
            Err(e) => {
                warn!("Failed to load preferences for user {}: {}", user_id, e);
                None
            }
        }
    }

    /// Queries the user issued within `since_days`, oldest first
    pub async fn search_history(&self, user_id: &str, since_days: u32) -> Vec<SearchQueryEntry> {
        let cutoff = cutoff_score(since_days);
        match self
            .store
            .range_by_score(&keys::search_queries(user_id), cutoff, f64::INFINITY)
            .await
        {
            Ok(raw) => decode_all(&raw),
            Err(e) => {
                warn!("Failed to load search history for user {}: {}", user_id, e);
                Vec::new()
            }
        }
    }

    /// Most frequent queries with their counts
    pub async fn trending_searches(&self, limit: usize) -> Vec<(String, u64)> {
        match self.store.top_by_score(keys::POPULAR_SEARCHES, limit).await {
            Ok(top) => top
                .into_iter()
                .map(|(query, score)| (query, score.max(0.0) as u64))
                .collect(),
            Err(e) => {
                warn!("Failed to load trending searches: {}", e);
                Vec::new()
            }
        }
    }

    /// Popular queries other than `query`
    pub async fn people_also_searched(&self, query: &str, limit: usize) -> Vec<String> {
        let query = query.trim().to_lowercase();
        self.trending_searches(limit * 2)
            .await
            .into_iter()
            .map(|(q, _)| q)
            .filter(|q| q.to_lowercase() != query)
            .take(limit)
            .collect()
    }

    pub async fn search_analytics(&self) -> SearchAnalytics {
        let trending = self.trending_searches(20).await;
        SearchAnalytics {
            total_search_queries: trending.iter().map(|(_, count)| count).sum(),
            unique_search_terms: trending.len(),
            trending_searches: trending.into_iter().take(10).collect(),
        }
    }
}

fn cutoff_score(since_days: u32) -> f64 {
    let cutoff = Utc::now() - ChronoDuration::days(i64::from(since_days));
    cutoff.timestamp_millis() as f64 / 1000.0
}

fn decode_all<T: DeserializeOwned>(raw: &[String]) -> Vec<T> {
    raw.iter()
        .filter_map(|entry| match serde_json::from_str(entry) {
            Ok(value) => Some(value),
            Err(e) => {
                debug!("Skipping undecodable log entry: {}", e);
                None
            }
        })
        .collect()
}
