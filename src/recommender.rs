//! User-user collaborative filtering over the interaction ledger

use std::collections::BTreeSet;
use std::collections::HashMap;
use std::collections::HashSet;
use std::sync::Arc;

use async_trait::async_trait;
use futures::future::join_all;
use tracing::debug;
use tracing::warn;

use crate::errors::Result;
use crate::ledger::InteractionLedger;
use crate::models::ScoredBusiness;
use crate::models::UserInteraction;
use crate::store::keys;

/// Source of extra candidates for a user
#[async_trait]
pub trait Recommender: Send + Sync {
    /// Up to `limit` businesses for `user_id`, never including `exclude`
    async fn recommendations(
        &self,
        user_id: &str,
        exclude: &HashSet<String>,
        limit: usize,
    ) -> Vec<ScoredBusiness>;
}

/// Used when no interaction store is configured
#[derive(Debug, Clone, Copy, Default)]
pub struct NoopRecommender;

#[async_trait]
impl Recommender for NoopRecommender {
    async fn recommendations(
        &self,
        _user_id: &str,
        _exclude: &HashSet<String>,
        _limit: usize,
    ) -> Vec<ScoredBusiness> {
        Vec::new()
    }
}

/// Cosine similarity of two equally long vectors; 0 when either has zero norm
pub fn cosine_similarity(a: &[f64], b: &[f64]) -> f64 {
    let dot: f64 = a.iter().zip(b).map(|(x, y)| x * y).sum();
    let norm_a = a.iter().map(|x| x * x).sum::<f64>().sqrt();
    let norm_b = b.iter().map(|x| x * x).sum::<f64>().sqrt();
    if norm_a == 0.0 || norm_b == 0.0 {
        return 0.0;
    }
    (dot / (norm_a * norm_b)).clamp(-1.0, 1.0)
}

type Ratings = HashMap<String, f64>;

pub struct CollaborativeRecommender {
    ledger: Arc<InteractionLedger>,
}

impl CollaborativeRecommender {
    pub fn new(ledger: Arc<InteractionLedger>) -> Self {
        Self { ledger }
    }

    fn window_days(&self) -> u32 {
        self.ledger.config().retention_days
    }

    async fn business_interactions(&self, user_id: &str) -> Result<Vec<UserInteraction>> {
        let interactions = self
            .ledger
            .try_interactions_for(user_id, self.window_days())
            .await?;
        Ok(interactions
            .into_iter()
            .filter(|i| !i.is_search_event())
            .collect())
    }

    /// business_id -> rating; later interactions overwrite earlier ones
    async fn ratings(&self, user_id: &str) -> Result<Ratings> {
        Ok(self
            .business_interactions(user_id)
            .await?
            .into_iter()
            .map(|i| (i.business_id, i.implicit_rating))
            .collect())
    }

    fn similarity_of(&self, a: &Ratings, b: &Ratings) -> f64 {
        let mut common: Vec<&String> = a.keys().filter(|k| b.contains_key(*k)).collect();
        if common.len() < self.ledger.config().min_common_businesses {
            return 0.0;
        }
        common.sort();
        let va: Vec<f64> = common.iter().map(|k| a[*k]).collect();
        let vb: Vec<f64> = common.iter().map(|k| b[*k]).collect();
        cosine_similarity(&va, &vb)
    }

    /// Cosine similarity over co-rated businesses, 0 below the overlap minimum
    pub async fn similarity(&self, user_a: &str, user_b: &str) -> f64 {
        let (a, b) = futures::join!(self.ratings(user_a), self.ratings(user_b));
        match (a, b) {
            (Ok(a), Ok(b)) => self.similarity_of(&a, &b),
            (Err(e), _) | (_, Err(e)) => {
                warn!("Similarity {} ~ {} unavailable: {}", user_a, user_b, e);
                0.0
            }
        }
    }

    /// Most similar co-visitors, best first
    pub async fn similar_users(&self, user_id: &str, limit: usize) -> Vec<(String, f64)> {
        match self.try_similar_users(user_id, limit).await {
            Ok(users) => users,
            Err(e) => {
                warn!("Similar users for {} unavailable: {}", user_id, e);
                Vec::new()
            }
        }
    }

    async fn try_similar_users(&self, user_id: &str, limit: usize) -> Result<Vec<(String, f64)>> {
        let config = self.ledger.config();
        let store = self.ledger.store();
        let cache_key = keys::similar_users(user_id);

        if let Some(cached) = store.get(&cache_key).await? {
            match serde_json::from_str::<Vec<(String, f64)>>(&cached) {
                Ok(mut users) => {
                    debug!("Similar users cache hit for {}", user_id);
                    // The cache may hold more neighbours than this caller asked for
                    users.truncate(limit);
                    return Ok(users);
                }
                Err(e) => debug!("Ignoring corrupt similar-users cache for {}: {}", user_id, e),
            }
        }

        let interactions = self.business_interactions(user_id).await?;
        if interactions.len() < config.min_interactions {
            return Ok(Vec::new());
        }

        let own: Ratings = interactions
            .iter()
            .map(|i| (i.business_id.clone(), i.implicit_rating))
            .collect();

        let mut co_visitors = BTreeSet::new();
        for business_id in own.keys() {
            let touches = self
                .ledger
                .business_touches(business_id, self.window_days())
                .await?;
            co_visitors.extend(
                touches
                    .into_iter()
                    .map(|t| t.user_id)
                    .filter(|other| other != user_id),
            );
        }

        let scored = join_all(co_visitors.into_iter().map(|other| {
            let own = &own;
            async move {
                let theirs = self.ratings(&other).await?;
                Ok::<_, crate::GeoRankError>((other, self.similarity_of(own, &theirs)))
            }
        }))
        .await;

        let mut similar: Vec<(String, f64)> = scored
            .into_iter()
            .collect::<Result<Vec<_>>>()?
            .into_iter()
            .filter(|(_, score)| *score > config.similarity_threshold)
            .collect();

        similar.sort_by(|a, b| b.1.total_cmp(&a.1).then_with(|| a.0.cmp(&b.0)));
        similar.truncate(limit);

        let json = serde_json::to_string(&similar)?;
        store
            .set_with_ttl(&cache_key, &json, config.similar_users_cache_ttl())
            .await?;

        debug!("Found {} similar users for {}", similar.len(), user_id);
        Ok(similar)
    }

    async fn try_recommendations(
        &self,
        user_id: &str,
        exclude: &HashSet<String>,
        limit: usize,
    ) -> Result<Vec<ScoredBusiness>> {
        let neighbours = self
            .try_similar_users(user_id, self.ledger.config().similar_users_for_recommendations)
            .await?;
        if neighbours.is_empty() {
            return Ok(Vec::new());
        }

        let touched: HashSet<String> = self
            .business_interactions(user_id)
            .await?
            .into_iter()
            .map(|i| i.business_id)
            .collect();

        let mut scores: HashMap<String, f64> = HashMap::new();
        let mut latest: HashMap<String, UserInteraction> = HashMap::new();

        for (other, similarity) in &neighbours {
            for interaction in self.business_interactions(other).await? {
                if touched.contains(&interaction.business_id) || exclude.contains(&interaction.business_id) {
                    continue;
                }
                *scores.entry(interaction.business_id.clone()).or_insert(0.0) +=
                    similarity * interaction.implicit_rating;

                let newer = latest
                    .get(&interaction.business_id)
                    .map_or(true, |seen| interaction.timestamp >= seen.timestamp);
                if newer {
                    latest.insert(interaction.business_id.clone(), interaction);
                }
            }
        }

        let mut ranked: Vec<(String, f64)> = scores.into_iter().collect();
        ranked.sort_by(|a, b| b.1.total_cmp(&a.1).then_with(|| a.0.cmp(&b.0)));

        Ok(ranked
            .into_iter()
            .take(limit)
            .filter_map(|(business_id, score)| {
                let seen = latest.remove(&business_id)?;
                Some(ScoredBusiness {
                    business_id,
                    business_name: seen.business_name,
                    category: seen.category.unwrap_or_default(),
                    tags: seen.tags,
                    recommendation_score: score,
                })
            })
            .collect())
    }
}

#[async_trait]
impl Recommender for CollaborativeRecommender {
    async fn recommendations(
        &self,
        user_id: &str,
        exclude: &HashSet<String>,
        limit: usize,
    ) -> Vec<ScoredBusiness> {
        match self.try_recommendations(user_id, exclude, limit).await {
            Ok(recommendations) => recommendations,
            Err(e) => {
                warn!("Recommendations for {} unavailable: {}", user_id, e);
                Vec::new()
            }
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::config::CollaborativeConfig;
    use crate::models::BusinessRecord;
    use crate::models::InteractionKind;
    use crate::store::KvStore;
    use crate::store::MemoryStore;

    fn business(id: &str, category: &str) -> BusinessRecord {
        let mut record = BusinessRecord::new(id, "owner", category, vec![id.to_string()], 37.0, -122.0);
        record.business_id = id.to_string();
        record
    }

    fn setup() -> (Arc<InteractionLedger>, CollaborativeRecommender, Arc<MemoryStore>) {
        let store = Arc::new(MemoryStore::new());
        let ledger = Arc::new(InteractionLedger::new(store.clone(), CollaborativeConfig::default()));
        (ledger.clone(), CollaborativeRecommender::new(ledger), store)
    }

    /// Records an interaction whose implicit rating is exactly `rating`
    async fn rate(ledger: &InteractionLedger, user: &str, id: &str, rating: f64) {
        let mut interaction = UserInteraction::with_business(user, "s", &business(id, "Cafe"), InteractionKind::View, None);
        interaction.implicit_rating = rating;
        ledger.record(&interaction).await;
    }

    #[test]
    fn test_cosine_similarity() {
        assert!((cosine_similarity(&[1.0, 0.0], &[1.0, 0.0]) - 1.0).abs() < 1e-12);
        assert_eq!(cosine_similarity(&[1.0, 0.0], &[0.0, 1.0]), 0.0);
        assert_eq!(cosine_similarity(&[0.0, 0.0], &[1.0, 2.0]), 0.0);
        let expected = 26.0 / (34.0_f64.sqrt() * 20.0_f64.sqrt());
        assert!((cosine_similarity(&[5.0, 3.0], &[4.0, 2.0]) - expected).abs() < 1e-12);
    }

    #[tokio::test]
    async fn test_similarity_requires_two_common_businesses() {
        let (ledger, recommender, _) = setup();
        rate(&ledger, "u1", "b1", 5.0).await;
        rate(&ledger, "u2", "b1", 4.0).await;
        assert_eq!(recommender.similarity("u1", "u2").await, 0.0);

        rate(&ledger, "u1", "b2", 3.0).await;
        rate(&ledger, "u2", "b2", 2.0).await;
        let expected = cosine_similarity(&[5.0, 3.0], &[4.0, 2.0]);
        let similarity = recommender.similarity("u1", "u2").await;
        assert!((similarity - expected).abs() < 1e-12);
        assert!((-1.0..=1.0).contains(&similarity));
    }

    #[tokio::test]
    async fn test_latest_rating_wins() {
        let (ledger, recommender, _) = setup();
        let ratings = recommender.ratings("u1").await.unwrap();
        assert!(ratings.is_empty());

        rate(&ledger, "u1", "b1", 2.0).await;
        tokio::time::sleep(std::time::Duration::from_millis(5)).await;
        rate(&ledger, "u1", "b1", 5.0).await;

        let ratings = recommender.ratings("u1").await.unwrap();
        assert_eq!(ratings["b1"], 5.0);
    }

    #[tokio::test]
    async fn test_similar_users_need_enough_history() {
        let (ledger, recommender, store) = setup();
        rate(&ledger, "u1", "b1", 5.0).await;
        rate(&ledger, "u1", "b2", 3.0).await;
        rate(&ledger, "u2", "b1", 5.0).await;
        rate(&ledger, "u2", "b2", 3.0).await;

        assert!(recommender.similar_users("u1", 10).await.is_empty());
        // Early return for thin history is not cached
        assert!(store.get(&keys::similar_users("u1")).await.unwrap().is_none());
    }

    #[tokio::test]
    async fn test_similar_users_and_recommendations() {
        let (ledger, recommender, store) = setup();
        for (id, rating) in [("b1", 5.0), ("b2", 3.0), ("b3", 4.0)] {
            rate(&ledger, "u1", id, rating).await;
        }
        for (id, rating) in [("b1", 4.0), ("b2", 2.0), ("b4", 5.0), ("b5", 2.0)] {
            rate(&ledger, "u2", id, rating).await;
        }
        // Only one common business with u1
        for (id, rating) in [("b1", 5.0), ("b6", 5.0)] {
            rate(&ledger, "u3", id, rating).await;
        }

        let similar = recommender.similar_users("u1", 10).await;
        assert_eq!(similar.len(), 1);
        assert_eq!(similar[0].0, "u2");
        assert!(store.get(&keys::similar_users("u1")).await.unwrap().is_some());

        let recommendations = recommender.recommendations("u1", &HashSet::new(), 10).await;
        let ids: Vec<&str> = recommendations.iter().map(|r| r.business_id.as_str()).collect();
        assert_eq!(ids, vec!["b4", "b5"]);
        assert!((recommendations[0].recommendation_score - similar[0].1 * 5.0).abs() < 1e-9);
        assert_eq!(recommendations[0].business_name, "b4");
        assert_eq!(recommendations[0].category, "Cafe");

        let exclude: HashSet<String> = ["b4".to_string()].into_iter().collect();
        let filtered = recommender.recommendations("u1", &exclude, 10).await;
        assert_eq!(filtered.len(), 1);
        assert_eq!(filtered[0].business_id, "b5");
    }

    #[tokio::test]
    async fn test_cached_similar_users_are_reused() {
        let (_, recommender, store) = setup();
        store
            .set_with_ttl(
                &keys::similar_users("u9"),
                r#"[["u7", 0.9]]"#,
                std::time::Duration::from_secs(60),
            )
            .await
            .unwrap();
        assert_eq!(recommender.similar_users("u9", 5).await, vec![("u7".to_string(), 0.9)]);
    }

    #[tokio::test]
    async fn test_cached_similar_users_respect_limit() {
        let (_, recommender, store) = setup();
        store
            .set_with_ttl(
                &keys::similar_users("u9"),
                r#"[["u7", 0.9], ["u3", 0.8], ["u5", 0.6]]"#,
                std::time::Duration::from_secs(60),
            )
            .await
            .unwrap();

        assert_eq!(recommender.similar_users("u9", 1).await, vec![("u7".to_string(), 0.9)]);
        assert_eq!(recommender.similar_users("u9", 10).await.len(), 3);
    }

    #[tokio::test]
    async fn test_empty_log_yields_empty_recommendations() {
        let (_, recommender, _) = setup();
        assert!(recommender.recommendations("u1", &HashSet::new(), 10).await.is_empty());
        assert!(NoopRecommender.recommendations("u1", &HashSet::new(), 10).await.is_empty());
    }
}
