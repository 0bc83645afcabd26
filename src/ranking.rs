//! Hybrid relevance/distance ranking with adaptive weights

use std::cmp::Ordering;
use std::fmt;
use std::str::FromStr;

use serde::Deserialize;
use serde::Serialize;
use tracing::debug;

use crate::config::RankingConfig;
use crate::geo;
use crate::models::BusinessRecord;
use crate::GeoRankError;

/// Explicit ordering override
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum SortMode {
    Distance,
    Relevance,
}

impl fmt::Display for SortMode {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::Distance => f.write_str("distance"),
            Self::Relevance => f.write_str("relevance"),
        }
    }
}

impl FromStr for SortMode {
    type Err = GeoRankError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s.trim().to_lowercase().as_str() {
            "distance" => Ok(Self::Distance),
            "relevance" => Ok(Self::Relevance),
            other => Err(GeoRankError::InvalidInput(format!("unknown sort mode: {other}"))),
        }
    }
}

/// Relevance and distance weights for one ranking pass
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
pub struct RankingWeights {
    pub relevance: f64,
    pub distance: f64,
}

impl RankingWeights {
    pub const fn new(relevance: f64, distance: f64) -> Self {
        Self { relevance, distance }
    }
}

impl From<(f64, f64)> for RankingWeights {
    fn from((relevance, distance): (f64, f64)) -> Self {
        Self::new(relevance, distance)
    }
}

/// A record with its hybrid score, lower is better
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct RankedBusiness {
    pub record: BusinessRecord,
    pub hybrid_score: f64,
}

/// Blends retrieval relevance with normalized distance
#[derive(Debug, Clone)]
pub struct HybridRanker {
    config: RankingConfig,
}

impl HybridRanker {
    pub fn new(config: RankingConfig) -> Self {
        Self { config }
    }

    /// True when `max_distance_km` disables the cutoff
    pub fn is_unlimited(&self, max_distance_km: f64) -> bool {
        max_distance_km >= self.config.unlimited_threshold_km
    }

    /// True when the query contains a locality cue such as "near me"
    pub fn has_locality_cue(&self, query: &str) -> bool {
        let query = query.to_lowercase();
        self.config
            .locality_cues
            .iter()
            .any(|cue| query.contains(&cue.to_lowercase()))
    }

    /// Picks weights: sort mode, then explicit weight, then locality cue, then defaults
    pub fn resolve_weights(
        &self,
        query: &str,
        distance_weight: Option<f64>,
        sort_mode: Option<SortMode>,
    ) -> RankingWeights {
        match (sort_mode, distance_weight) {
            (Some(SortMode::Distance), _) => RankingWeights::new(0.0, 1.0),
            (Some(SortMode::Relevance), _) => RankingWeights::new(1.0, 0.0),
            (None, Some(w)) => RankingWeights::new(1.0 - w, w),
            (None, None) if self.has_locality_cue(query) => self.config.locality_weights.into(),
            (None, None) => self.config.default_weights.into(),
        }
    }

    /// Scores and sorts `records` relative to the requester.
    ///
    /// Sets each record's rounded `distance_km`. With a finite cutoff, records
    /// beyond it are dropped and distances are normalized by the cutoff;
    /// otherwise by the largest distance in the set (at least 1 km).
    pub fn rank(
        &self,
        records: Vec<BusinessRecord>,
        user_lat: f64,
        user_lon: f64,
        max_distance_km: f64,
        weights: RankingWeights,
    ) -> Vec<RankedBusiness> {
        let unlimited = self.is_unlimited(max_distance_km);
        let total = records.len();

        let measured: Vec<(BusinessRecord, f64)> = records
            .into_iter()
            .map(|record| {
                let distance = geo::distance_km(user_lat, user_lon, record.latitude, record.longitude);
                (record, distance)
            })
            .filter(|(_, distance)| unlimited || *distance <= max_distance_km)
            .collect();

        let divisor = if unlimited {
            measured
                .iter()
                .map(|(_, d)| *d)
                .fold(0.0_f64, f64::max)
                .max(1.0)
        } else {
            max_distance_km
        };

        let mut ranked: Vec<RankedBusiness> = measured
            .into_iter()
            .map(|(mut record, distance)| {
                let normalized = distance / divisor;
                let hybrid_score = weights.relevance * record.relevance_score + weights.distance * normalized;
                record.distance_km = Some(geo::round_km(distance));
                RankedBusiness { record, hybrid_score }
            })
            .collect();

        ranked.sort_by(compare_ranked);

        debug!(
            "Ranked {} of {} candidates (unlimited={}, weights={:?})",
            ranked.len(),
            total,
            unlimited,
            weights
        );

        ranked
    }
}

impl Default for HybridRanker {
    fn default() -> Self {
        Self::new(RankingConfig::default())
    }
}

fn compare_ranked(a: &RankedBusiness, b: &RankedBusiness) -> Ordering {
    a.hybrid_score
        .total_cmp(&b.hybrid_score)
        .then_with(|| a.record.relevance_score.total_cmp(&b.record.relevance_score))
        .then_with(|| a.record.business_id.cmp(&b.record.business_id))
}

#[cfg(test)]
mod tests {
    use super::*;

    const USER: (f64, f64) = (37.7749, -122.4194);

    /// Record roughly `km` kilometers due north of the user
    fn record_north(name: &str, km: f64, relevance: f64) -> BusinessRecord {
        let lat = USER.0 + km / 111.195;
        BusinessRecord::new(name, "owner", "Cafe", vec![], lat, USER.1).with_relevance(relevance)
    }

    fn names(ranked: &[RankedBusiness]) -> Vec<&str> {
        ranked.iter().map(|r| r.record.name.as_str()).collect()
    }

    #[test]
    fn test_weight_resolution_priority() {
        let ranker = HybridRanker::default();

        assert_eq!(
            ranker.resolve_weights("coffee near me", Some(0.9), Some(SortMode::Distance)),
            RankingWeights::new(0.0, 1.0)
        );
        assert_eq!(
            ranker.resolve_weights("coffee", Some(0.9), Some(SortMode::Relevance)),
            RankingWeights::new(1.0, 0.0)
        );
        let explicit = ranker.resolve_weights("coffee near me", Some(0.25), None);
        assert_eq!(explicit, RankingWeights::new(0.75, 0.25));
        assert_eq!(
            ranker.resolve_weights("Coffee NEARBY", None, None),
            RankingWeights::new(0.5, 0.5)
        );
        assert_eq!(ranker.resolve_weights("coffee", None, None), RankingWeights::new(0.7, 0.3));
    }

    #[test]
    fn test_locality_cues_come_from_config() {
        let ranker = HybridRanker::new(RankingConfig {
            locality_cues: vec!["walking distance".to_string()],
            ..RankingConfig::default()
        });
        assert!(ranker.has_locality_cue("tacos within walking distance"));
        assert!(!ranker.has_locality_cue("tacos near me"));
    }

    #[test]
    fn test_locality_cue_weights_scores() {
        let ranker = HybridRanker::default();
        let weights = ranker.resolve_weights("coffee near me", None, None);
        let ranked = ranker.rank(
            vec![record_north("Coffee Shop", 0.5, 0.8), record_north("Bakery", 5.0, 0.2)],
            USER.0,
            USER.1,
            10.0,
            weights,
        );

        let coffee = ranked.iter().find(|r| r.record.name == "Coffee Shop").unwrap();
        let bakery = ranked.iter().find(|r| r.record.name == "Bakery").unwrap();
        assert!((coffee.hybrid_score - (0.5 * 0.8 + 0.5 * 0.05)).abs() < 1e-3);
        assert!((bakery.hybrid_score - (0.5 * 0.2 + 0.5 * 0.5)).abs() < 1e-3);
    }

    #[test]
    fn test_proximity_wins_with_locality_cue_at_equal_relevance() {
        let ranker = HybridRanker::default();
        let weights = ranker.resolve_weights("coffee near me", None, None);
        let ranked = ranker.rank(
            vec![record_north("Far", 5.0, 0.3), record_north("Near", 0.5, 0.3)],
            USER.0,
            USER.1,
            10.0,
            weights,
        );
        assert_eq!(names(&ranked), vec!["Near", "Far"]);
    }

    #[test]
    fn test_distance_mode_orders_by_distance() {
        let ranker = HybridRanker::default();
        let weights = ranker.resolve_weights("anything", None, Some(SortMode::Distance));
        let ranked = ranker.rank(
            vec![
                record_north("C", 7.0, 0.0),
                record_north("A", 1.0, 0.9),
                record_north("B", 3.0, 0.1),
            ],
            USER.0,
            USER.1,
            50.0,
            weights,
        );

        assert_eq!(names(&ranked), vec!["A", "B", "C"]);
        let distances: Vec<f64> = ranked.iter().map(|r| r.record.distance_km.unwrap()).collect();
        assert!(distances.windows(2).all(|w| w[0] <= w[1]));
    }

    #[test]
    fn test_relevance_mode_ignores_distance() {
        let ranker = HybridRanker::default();
        let weights = ranker.resolve_weights("anything", None, Some(SortMode::Relevance));
        let ranked = ranker.rank(
            vec![record_north("Near", 0.1, 0.9), record_north("Far", 9.0, 0.1)],
            USER.0,
            USER.1,
            10.0,
            weights,
        );
        assert_eq!(names(&ranked), vec!["Far", "Near"]);
    }

    #[test]
    fn test_finite_cutoff_excludes_far_records() {
        let ranker = HybridRanker::default();
        let ranked = ranker.rank(
            vec![record_north("Inside", 4.0, 0.5), record_north("Outside", 6.0, 0.0)],
            USER.0,
            USER.1,
            5.0,
            RankingWeights::new(0.7, 0.3),
        );
        assert_eq!(names(&ranked), vec!["Inside"]);
        assert!(ranked[0].record.distance_km.unwrap() <= 5.0);
    }

    #[test]
    fn test_unlimited_search_keeps_everything_and_normalizes_by_max() {
        let ranker = HybridRanker::default();
        let ranked = ranker.rank(
            vec![record_north("Near", 100.0, 0.0), record_north("Far", 1000.0, 0.0)],
            USER.0,
            USER.1,
            20_000.0,
            RankingWeights::new(0.0, 1.0),
        );

        assert_eq!(names(&ranked), vec!["Near", "Far"]);
        assert!((ranked[1].hybrid_score - 1.0).abs() < 1e-9);
        assert!((ranked[0].hybrid_score - 0.1).abs() < 1e-3);
    }

    #[test]
    fn test_unlimited_divisor_is_at_least_one_km() {
        let ranker = HybridRanker::default();
        let ranked = ranker.rank(
            vec![record_north("Close", 0.2, 0.0)],
            USER.0,
            USER.1,
            10_000.0,
            RankingWeights::new(0.0, 1.0),
        );
        assert!((ranked[0].hybrid_score - 0.2).abs() < 1e-3);
    }

    #[test]
    fn test_ties_are_independent_of_input_order() {
        let ranker = HybridRanker::default();
        let a = BusinessRecord::new("A", "o", "Cafe", vec![], USER.0, USER.1).with_relevance(0.4);
        let b = BusinessRecord::new("B", "o", "Cafe", vec![], USER.0, USER.1).with_relevance(0.4);
        let c = BusinessRecord::new("C", "o", "Cafe", vec![], USER.0, USER.1).with_relevance(0.2);

        let weights = RankingWeights::new(0.7, 0.3);
        let forward = ranker.rank(vec![a.clone(), b.clone(), c.clone()], USER.0, USER.1, 10.0, weights);
        let backward = ranker.rank(vec![c, b, a], USER.0, USER.1, 10.0, weights);

        assert_eq!(forward, backward);
        assert_eq!(forward[0].record.name, "C");
    }

    #[test]
    fn test_distances_are_rounded() {
        let ranker = HybridRanker::default();
        let ranked = ranker.rank(
            vec![record_north("X", 1.23456, 0.0)],
            USER.0,
            USER.1,
            10.0,
            RankingWeights::new(0.7, 0.3),
        );
        let d = ranked[0].record.distance_km.unwrap();
        assert_eq!(d, geo::round_km(d));
    }

    #[test]
    fn test_sort_mode_parsing() {
        assert_eq!("Distance".parse::<SortMode>().unwrap(), SortMode::Distance);
        assert_eq!("relevance".parse::<SortMode>().unwrap(), SortMode::Relevance);
        assert!("rating".parse::<SortMode>().unwrap_err().is_client_error());
    }
}
