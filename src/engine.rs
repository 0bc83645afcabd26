//! Request orchestration: retrieve, normalize, rank, log, contextualize, recommend
//!
//! [`SearchEngine`] owns every collaborator behind an `Arc` and is built once
//! at startup, either from injected services or from [`AppConfig`].

use std::collections::HashSet;
use std::sync::Arc;

use chrono::DateTime;
use chrono::FixedOffset;
use chrono::Local;
use chrono::Utc;
use serde::Deserialize;
use serde::Serialize;
use tracing::debug;
use tracing::info;
use tracing::warn;
use uuid::Uuid;

use crate::config::AppConfig;
use crate::context::factors;
use crate::context::Adjusted;
use crate::context::ContextualAdjuster;
use crate::context::RecommendationContext;
use crate::context::TimeOfDay;
use crate::context::UserHistory;
use crate::errors::GeoRankError;
use crate::errors::Result;
use crate::geo;
use crate::ledger::InteractionLedger;
use crate::ledger::SearchAnalytics;
use crate::models::derive_user_id;
use crate::models::BusinessRecord;
use crate::models::InteractionKind;
use crate::models::ScoredBusiness;
use crate::models::UserInteraction;
use crate::normalizer::ParseReport;
use crate::normalizer::RecordNormalizer;
use crate::ranking::HybridRanker;
use crate::ranking::RankedBusiness;
use crate::ranking::SortMode;
use crate::recommender::CollaborativeRecommender;
use crate::recommender::NoopRecommender;
use crate::recommender::Recommender;
use crate::retrieval::HttpRetriever;
use crate::retrieval::RetrievalBackend;
use crate::store::KvStore;
use crate::store::RedisStore;
use crate::weather;
use crate::weather::WeatherProvider;
use crate::weather::WeatherSnapshot;

pub const MAX_LIMIT: usize = 200;

/// Search parameters as received from a caller
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct SearchRequest {
    pub query: String,
    pub user_lat: f64,
    pub user_lon: f64,
    #[serde(default = "default_max_distance_km")]
    pub max_distance_km: f64,
    #[serde(default)]
    pub category_filter: Option<String>,
    #[serde(default)]
    pub tag_filters: Vec<String>,
    #[serde(default = "default_limit")]
    pub limit: usize,
    #[serde(default)]
    pub distance_weight: Option<f64>,
    /// `"distance"` or `"relevance"`
    #[serde(default)]
    pub sort_mode: Option<String>,
    #[serde(default)]
    pub session_id: Option<String>,
    #[serde(default = "default_include_recommendations")]
    pub include_recommendations: bool,
    #[serde(default)]
    pub user_agent: Option<String>,
    #[serde(default)]
    pub client_ip: Option<String>,
}

fn default_max_distance_km() -> f64 {
    10.0
}

fn default_limit() -> usize {
    10
}

fn default_include_recommendations() -> bool {
    true
}

impl SearchRequest {
    pub fn new(query: impl Into<String>, user_lat: f64, user_lon: f64) -> Self {
        Self {
            query: query.into(),
            user_lat,
            user_lon,
            max_distance_km: default_max_distance_km(),
            category_filter: None,
            tag_filters: Vec::new(),
            limit: default_limit(),
            distance_weight: None,
            sort_mode: None,
            session_id: None,
            include_recommendations: default_include_recommendations(),
            user_agent: None,
            client_ip: None,
        }
    }

    #[must_use]
    pub fn with_max_distance(mut self, max_distance_km: f64) -> Self {
        self.max_distance_km = max_distance_km;
        self
    }

    #[must_use]
    pub fn with_limit(mut self, limit: usize) -> Self {
        self.limit = limit;
        self
    }

    #[must_use]
    pub fn with_category(mut self, category: impl Into<String>) -> Self {
        self.category_filter = Some(category.into());
        self
    }

    #[must_use]
    pub fn with_tags(mut self, tags: Vec<String>) -> Self {
        self.tag_filters = tags;
        self
    }

    #[must_use]
    pub fn with_distance_weight(mut self, weight: f64) -> Self {
        self.distance_weight = Some(weight);
        self
    }

    #[must_use]
    pub fn with_sort_mode(mut self, mode: impl Into<String>) -> Self {
        self.sort_mode = Some(mode.into());
        self
    }

    #[must_use]
    pub fn with_session(mut self, session_id: impl Into<String>) -> Self {
        self.session_id = Some(session_id.into());
        self
    }

    #[must_use]
    pub fn with_fingerprint(mut self, user_agent: impl Into<String>, client_ip: impl Into<String>) -> Self {
        self.user_agent = Some(user_agent.into());
        self.client_ip = Some(client_ip.into());
        self
    }

    #[must_use]
    pub fn without_recommendations(mut self) -> Self {
        self.include_recommendations = false;
        self
    }

    /// Parsed sort mode
    pub fn sort_mode(&self) -> Result<Option<SortMode>> {
        self.sort_mode.as_deref().map(str::parse::<SortMode>).transpose()
    }

    /// Rejects requests the engine cannot serve
    pub fn validate(&self) -> Result<()> {
        if self.query.trim().is_empty() {
            return Err(GeoRankError::InvalidInput("query must not be empty".to_string()));
        }
        if !geo::validate_coordinates(self.user_lat, self.user_lon) {
            return Err(GeoRankError::InvalidInput(format!(
                "invalid coordinates ({}, {})",
                self.user_lat, self.user_lon
            )));
        }
        if self.max_distance_km.is_nan() || self.max_distance_km <= 0.0 {
            return Err(GeoRankError::InvalidInput(
                "max_distance_km must be positive".to_string(),
            ));
        }
        if self.limit == 0 || self.limit > MAX_LIMIT {
            return Err(GeoRankError::InvalidInput(format!(
                "limit must be between 1 and {MAX_LIMIT}"
            )));
        }
        if let Some(weight) = self.distance_weight {
            if !(0.0..=1.0).contains(&weight) {
                return Err(GeoRankError::InvalidInput(
                    "distance_weight must be within [0, 1]".to_string(),
                ));
            }
        }
        self.sort_mode()?;
        Ok(())
    }

    /// Query text sent to retrieval, enriched with the category and tag filters
    pub fn enriched_query(&self) -> String {
        let mut query = self.query.trim().to_string();
        if let Some(category) = self.category_filter.as_deref().filter(|c| !c.is_empty()) {
            query.push(' ');
            query.push_str(category);
        }
        if !self.tag_filters.is_empty() {
            query.push(' ');
            query.push_str(&self.tag_filters.join(" "));
        }
        query
    }
}

/// One ranked business in a response
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct SearchResult {
    #[serde(flatten)]
    pub business: BusinessRecord,
    pub hybrid_score: f64,
    pub contextual_score: f64,
    pub final_rank_value: f64,
    pub applied_factors: Vec<String>,
}

impl From<Adjusted<RankedBusiness>> for SearchResult {
    fn from(adjusted: Adjusted<RankedBusiness>) -> Self {
        Self {
            business: adjusted.item.record,
            hybrid_score: adjusted.item.hybrid_score,
            contextual_score: adjusted.contextual_score,
            final_rank_value: adjusted.final_rank_value,
            applied_factors: adjusted.applied_factors,
        }
    }
}

/// Collaborative pick re-scored against the current context
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Recommendation {
    #[serde(flatten)]
    pub business: ScoredBusiness,
    pub contextual_score: f64,
    pub final_rank_value: f64,
    pub applied_factors: Vec<String>,
}

impl From<Adjusted<ScoredBusiness>> for Recommendation {
    fn from(adjusted: Adjusted<ScoredBusiness>) -> Self {
        Self {
            business: adjusted.item,
            contextual_score: adjusted.contextual_score,
            final_rank_value: adjusted.final_rank_value,
            applied_factors: adjusted.applied_factors,
        }
    }
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ContextSummary {
    pub time_of_day: TimeOfDay,
    pub weather: Option<WeatherSnapshot>,
    /// Explanations of every factor in play
    pub applied_factors: Vec<String>,
    pub summary: String,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct SearchResponse {
    pub results: Vec<SearchResult>,
    pub recommendations: Vec<Recommendation>,
    pub context: ContextSummary,
    pub user_id: String,
    pub session_id: String,
    pub parse_report: ParseReport,
    pub generated_at: DateTime<Utc>,
}

/// A non-search interaction reported by a caller
#[derive(Debug, Clone)]
pub struct TrackEvent {
    pub user_id: String,
    pub session_id: String,
    pub business: BusinessRecord,
    pub kind: InteractionKind,
    pub dwell_secs: Option<u64>,
    pub location: Option<(f64, f64)>,
    pub query: Option<String>,
}

impl TrackEvent {
    pub fn new(
        user_id: impl Into<String>,
        session_id: impl Into<String>,
        business: BusinessRecord,
        kind: InteractionKind,
    ) -> Self {
        Self {
            user_id: user_id.into(),
            session_id: session_id.into(),
            business,
            kind,
            dwell_secs: None,
            location: None,
            query: None,
        }
    }

    #[must_use]
    pub fn with_dwell(mut self, dwell_secs: u64) -> Self {
        self.dwell_secs = Some(dwell_secs);
        self
    }

    #[must_use]
    pub fn with_location(mut self, lat: f64, lon: f64) -> Self {
        self.location = Some((lat, lon));
        self
    }

    #[must_use]
    pub fn with_query(mut self, query: impl Into<String>) -> Self {
        self.query = Some(query.into());
        self
    }
}

pub struct SearchEngine {
    config: AppConfig,
    retriever: Arc<dyn RetrievalBackend>,
    weather: Arc<dyn WeatherProvider>,
    ledger: Option<Arc<InteractionLedger>>,
    recommender: Arc<dyn Recommender>,
    normalizer: RecordNormalizer,
    ranker: HybridRanker,
    adjuster: ContextualAdjuster,
    /// Fixed requester offset; local time when unset
    time_offset: Option<FixedOffset>,
}

impl SearchEngine {
    /// Wires injected services; recommendations are enabled iff a store is given
    pub fn new(
        config: AppConfig,
        retriever: Arc<dyn RetrievalBackend>,
        weather: Arc<dyn WeatherProvider>,
        store: Option<Arc<dyn KvStore>>,
    ) -> Self {
        let ledger = store.map(|store| Arc::new(InteractionLedger::new(store, config.collaborative.clone())));
        let recommender: Arc<dyn Recommender> = match &ledger {
            Some(ledger) => Arc::new(CollaborativeRecommender::new(ledger.clone())),
            None => Arc::new(NoopRecommender),
        };

        Self {
            ranker: HybridRanker::new(config.ranking.clone()),
            config,
            retriever,
            weather,
            ledger,
            recommender,
            normalizer: RecordNormalizer::new(),
            adjuster: ContextualAdjuster::new(),
            time_offset: None,
        }
    }

    /// Builds HTTP clients and the Redis store described by `config`
    pub fn from_config(config: AppConfig) -> Result<Self> {
        let retriever: Arc<dyn RetrievalBackend> = Arc::new(HttpRetriever::from_config(&config)?);
        let weather: Arc<dyn WeatherProvider> = Arc::from(weather::provider_from_config(&config)?);
        let store = match &config.redis {
            Some(redis) => {
                let store: Arc<dyn KvStore> = Arc::new(RedisStore::connect(redis)?);
                Some(store)
            }
            None => None,
        };

        info!(
            "Search engine configured (store: {}, weather: {})",
            config.store_enabled(),
            config.weather_endpoint().is_some()
        );
        Ok(Self::new(config, retriever, weather, store))
    }

    #[must_use]
    pub fn with_recommender(mut self, recommender: Arc<dyn Recommender>) -> Self {
        self.recommender = recommender;
        self
    }

    /// Evaluate time-of-day context at a fixed UTC offset instead of local time
    #[must_use]
    pub fn with_time_offset(mut self, offset: FixedOffset) -> Self {
        self.time_offset = Some(offset);
        self
    }

    pub fn ledger(&self) -> Option<&Arc<InteractionLedger>> {
        self.ledger.as_ref()
    }

    fn now(&self) -> DateTime<FixedOffset> {
        match self.time_offset {
            Some(offset) => Utc::now().with_timezone(&offset),
            None => {
                let now = Local::now();
                let offset = *now.offset();
                now.with_timezone(&offset)
            }
        }
    }

    /// Anonymous id from the fingerprint, else the session id
    fn resolve_identity(request: &SearchRequest) -> (String, String) {
        let session_id = request
            .session_id
            .clone()
            .filter(|s| !s.is_empty())
            .unwrap_or_else(|| Uuid::new_v4().to_string());

        let user_id = match (&request.user_agent, &request.client_ip) {
            (Some(agent), Some(ip)) => derive_user_id(agent, ip),
            _ => session_id.clone(),
        };
        (user_id, session_id)
    }

    pub async fn search(&self, request: &SearchRequest) -> Result<SearchResponse> {
        request.validate()?;
        let sort_mode = request.sort_mode()?;
        let (user_id, session_id) = Self::resolve_identity(request);

        let unlimited = self.ranker.is_unlimited(request.max_distance_km);
        let k = if unlimited {
            self.config.retrieval.k_unlimited
        } else {
            self.config.retrieval.k_limited
        };
        let query = request.enriched_query();

        debug!("Search for user {}: '{}' (k={})", user_id, query, k);

        let chunks = tokio::time::timeout(self.config.retrieval_timeout(), self.retriever.retrieve(&query, k))
            .await
            .map_err(|_| GeoRankError::SearchUnavailable("retrieval timed out".to_string()))?
            .map_err(|e| match e {
                GeoRankError::SearchUnavailable(_) => e,
                other => GeoRankError::SearchUnavailable(other.to_string()),
            })?;

        let (mut records, parse_report) = self.normalizer.normalize(&chunks);

        // Filtered-out records must not widen the unlimited-mode divisor
        if let Some(category) = request.category_filter.as_deref().filter(|c| !c.is_empty()) {
            records.retain(|r| r.matches_category(category));
        }
        records.retain(|r| r.matches_any_tag(&request.tag_filters));

        let weights = self
            .ranker
            .resolve_weights(&request.query, request.distance_weight, sort_mode);
        let mut ranked = self.ranker.rank(
            records,
            request.user_lat,
            request.user_lon,
            request.max_distance_km,
            weights,
        );

        ranked.truncate(request.limit);

        let (weather, history) = tokio::join!(
            self.current_weather(request.user_lat, request.user_lon),
            self.user_history(&user_id),
        );

        self.log_search(request, &user_id, &session_id);

        let context = RecommendationContext::new(
            user_id.clone(),
            (request.user_lat, request.user_lon),
            self.now(),
        )
        .with_weather(weather)
        .with_history(history)
        .with_query(request.query.clone());

        let factors = factors::build_factors(&context);
        let adjusted = if sort_mode.is_some() {
            self.adjuster.annotate(ranked, &factors)
        } else {
            self.adjuster.apply(ranked, &factors)
        };
        let results: Vec<SearchResult> = adjusted.into_iter().map(SearchResult::from).collect();

        let recommendations = if request.include_recommendations {
            let exclude: HashSet<String> = results.iter().map(|r| r.business.business_id.clone()).collect();
            let candidates = self
                .recommender
                .recommendations(&user_id, &exclude, request.limit * 2)
                .await;
            let mut adjusted = self.adjuster.apply(candidates, &factors);
            adjusted.truncate(request.limit);
            adjusted.into_iter().map(Recommendation::from).collect()
        } else {
            Vec::new()
        };

        let summary = self.adjuster.summary(&context, &factors);
        info!(
            "Search '{}' returned {} results and {} recommendations",
            request.query,
            results.len(),
            recommendations.len()
        );

        Ok(SearchResponse {
            results,
            recommendations,
            context: ContextSummary {
                time_of_day: context.time_of_day,
                weather: context.weather,
                applied_factors: factors.into_iter().map(|f| f.explanation).collect(),
                summary,
            },
            user_id,
            session_id,
            parse_report,
            generated_at: Utc::now(),
        })
    }

    async fn current_weather(&self, lat: f64, lon: f64) -> Option<WeatherSnapshot> {
        match tokio::time::timeout(self.config.weather_timeout(), self.weather.current_weather(lat, lon)).await {
            Ok(Ok(snapshot)) => Some(snapshot),
            Ok(Err(e)) => {
                debug!("Weather unavailable, skipping weather factor: {}", e);
                None
            }
            Err(_) => {
                warn!("Weather lookup timed out, skipping weather factor");
                None
            }
        }
    }

    async fn user_history(&self, user_id: &str) -> UserHistory {
        let Some(ledger) = &self.ledger else {
            return UserHistory::default();
        };
        let (interactions, preferences) = tokio::join!(
            ledger.interactions_for(user_id, ledger.config().retention_days),
            ledger.preferences(user_id),
        );
        UserHistory::new(interactions, preferences, *self.now().offset())
    }

    /// Records the query on a detached task so it outlives the request
    fn log_search(&self, request: &SearchRequest, user_id: &str, session_id: &str) {
        let Some(ledger) = self.ledger.clone() else {
            return;
        };
        let interaction = UserInteraction::search(
            user_id,
            session_id,
            request.query.trim(),
            request.category_filter.clone(),
            request.tag_filters.clone(),
        )
        .with_location(request.user_lat, request.user_lon);

        tokio::spawn(async move {
            ledger.record(&interaction).await;
        });
    }

    /// Records a view, click, bookmark or share
    pub async fn track(&self, event: TrackEvent) -> Result<UserInteraction> {
        if event.kind == InteractionKind::Search {
            return Err(GeoRankError::InvalidInput(
                "search interactions are recorded by search()".to_string(),
            ));
        }
        if event.user_id.trim().is_empty() {
            return Err(GeoRankError::InvalidInput("user_id must not be empty".to_string()));
        }

        let mut interaction = UserInteraction::with_business(
            event.user_id,
            event.session_id,
            &event.business,
            event.kind,
            event.dwell_secs,
        );
        if let Some((lat, lon)) = event.location {
            interaction = interaction.with_location(lat, lon);
        }
        if let Some(query) = event.query {
            interaction = interaction.with_query(query);
        }

        match &self.ledger {
            Some(ledger) => ledger.record(&interaction).await,
            None => debug!("No interaction store configured, dropping {} event", interaction.kind),
        }
        Ok(interaction)
    }

    /// Search popularity snapshot; empty without a store
    pub async fn analytics(&self) -> SearchAnalytics {
        match &self.ledger {
            Some(ledger) => ledger.search_analytics().await,
            None => SearchAnalytics {
                total_search_queries: 0,
                unique_search_terms: 0,
                trending_searches: Vec::new(),
            },
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_validate_rejects_bad_input() {
        let ok = SearchRequest::new("coffee", 37.7, -122.4);
        assert!(ok.validate().is_ok());

        let cases = [
            SearchRequest::new("   ", 37.7, -122.4),
            SearchRequest::new("coffee", 91.0, -122.4),
            SearchRequest::new("coffee", 37.7, -122.4).with_max_distance(0.0),
            SearchRequest::new("coffee", 37.7, -122.4).with_limit(0),
            SearchRequest::new("coffee", 37.7, -122.4).with_limit(201),
            SearchRequest::new("coffee", 37.7, -122.4).with_distance_weight(1.5),
            SearchRequest::new("coffee", 37.7, -122.4).with_sort_mode("rating"),
        ];
        for request in cases {
            let err = request.validate().unwrap_err();
            assert!(err.is_client_error(), "{err}");
        }
    }

    #[test]
    fn test_limit_bounds_are_inclusive() {
        assert!(SearchRequest::new("q", 0.0, 0.0).with_limit(1).validate().is_ok());
        assert!(SearchRequest::new("q", 0.0, 0.0).with_limit(200).validate().is_ok());
    }

    #[test]
    fn test_enriched_query() {
        let request = SearchRequest::new(" tacos ", 0.0, 0.0)
            .with_category("Mexican")
            .with_tags(vec!["vegan".to_string(), "late".to_string()]);
        assert_eq!(request.enriched_query(), "tacos Mexican vegan late");
        assert_eq!(SearchRequest::new("tacos", 0.0, 0.0).enriched_query(), "tacos");
    }

    #[test]
    fn test_identity_resolution() {
        let fingerprinted = SearchRequest::new("q", 0.0, 0.0)
            .with_session("sess-1")
            .with_fingerprint("Mozilla/5.0", "10.0.0.1");
        let (user, session) = SearchEngine::resolve_identity(&fingerprinted);
        assert_eq!(user, derive_user_id("Mozilla/5.0", "10.0.0.1"));
        assert_eq!(session, "sess-1");

        let session_only = SearchRequest::new("q", 0.0, 0.0).with_session("sess-2");
        assert_eq!(SearchEngine::resolve_identity(&session_only).0, "sess-2");

        let (user, session) = SearchEngine::resolve_identity(&SearchRequest::new("q", 0.0, 0.0));
        assert_eq!(user, session);
        assert!(Uuid::parse_str(&session).is_ok());
    }

    #[test]
    fn test_request_deserialization_defaults() {
        let request: SearchRequest =
            serde_json::from_str(r#"{"query": "pizza", "user_lat": 1.0, "user_lon": 2.0}"#).unwrap();
        assert_eq!(request.max_distance_km, 10.0);
        assert_eq!(request.limit, 10);
        assert!(request.include_recommendations);
        assert!(request.sort_mode().unwrap().is_none());
    }
}
