//! Core data model: business records, interactions and derived preferences

use std::collections::BTreeMap;
use std::fmt;
use std::str::FromStr;

use chrono::DateTime;
use chrono::Utc;
use serde::Deserialize;
use serde::Serialize;
use sha2::Digest;
use sha2::Sha256;

use crate::geo;
use crate::GeoRankError;

/// Business id recorded for interactions that are pure search queries
pub const SEARCH_SENTINEL: &str = "__search__";

/// Canonical business record produced from retrieval output
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct BusinessRecord {
    pub business_id: String,
    /// Business name
    pub name: String,
    pub owner_name: String,
    pub category: String,
    pub tags: Vec<String>,
    pub latitude: f64,
    pub longitude: f64,
    /// Retrieval dissimilarity, lower is more relevant
    pub relevance_score: f64,
    /// Distance from the requester, set during ranking
    pub distance_km: Option<f64>,
    /// Opaque provenance of the retrieval chunk
    pub source_ref: String,
}

impl BusinessRecord {
    /// Builds a record, deriving `business_id` from name and coordinates
    pub fn new(
        name: impl Into<String>,
        owner_name: impl Into<String>,
        category: impl Into<String>,
        tags: Vec<String>,
        latitude: f64,
        longitude: f64,
    ) -> Self {
        let name = name.into();
        Self {
            business_id: derive_business_id(&name, latitude, longitude),
            name,
            owner_name: owner_name.into(),
            category: category.into(),
            tags,
            latitude,
            longitude,
            relevance_score: 0.0,
            distance_km: None,
            source_ref: String::new(),
        }
    }

    #[must_use]
    pub fn with_relevance(mut self, relevance_score: f64) -> Self {
        self.relevance_score = relevance_score;
        self
    }

    #[must_use]
    pub fn with_source(mut self, source_ref: impl Into<String>) -> Self {
        self.source_ref = source_ref.into();
        self
    }

    /// Coordinates as the literal `"lat,lon"` string
    pub fn lat_long(&self) -> String {
        format!("{},{}", self.latitude, self.longitude)
    }

    /// Identity used for deduplication: exact name plus `"lat,lon"`
    pub fn dedup_key(&self) -> String {
        format!("{}_{}", self.name, self.lat_long())
    }

    /// Valid records have a name, a category and in-range coordinates
    pub fn is_valid(&self) -> bool {
        !self.name.trim().is_empty()
            && !self.category.trim().is_empty()
            && geo::validate_coordinates(self.latitude, self.longitude)
    }

    /// Lowercased `"<category> <tags>"` used for contextual matching
    pub fn category_text(&self) -> String {
        category_text(&self.category, &self.tags)
    }

    /// Case-insensitive substring match on the category
    pub fn matches_category(&self, filter: &str) -> bool {
        self.category.to_lowercase().contains(&filter.to_lowercase())
    }

    /// True if any filter is a case-insensitive substring of the joined tags
    pub fn matches_any_tag(&self, filters: &[String]) -> bool {
        if filters.is_empty() {
            return true;
        }
        let joined = self.tags.join(", ").to_lowercase();
        filters.iter().any(|tag| joined.contains(&tag.to_lowercase()))
    }

    /// One-line description for logs and listings
    pub fn summary(&self) -> String {
        let mut summary = format!("{} ({})", self.name, self.category);
        if let Some(distance) = self.distance_km.filter(|d| *d > 0.0) {
            summary.push_str(&format!(" - {} away", geo::format_distance(distance)));
        }
        if !self.tags.is_empty() {
            summary.push_str(&format!(" | Tags: {}", self.tags.join(", ")));
        }
        summary
    }
}

pub(crate) fn category_text(category: &str, tags: &[String]) -> String {
    format!("{} {}", category, tags.join(", ")).to_lowercase()
}

/// First 16 hex chars of `sha256("<name>|<lat>,<lon>")`
pub fn derive_business_id(name: &str, latitude: f64, longitude: f64) -> String {
    short_hash(&format!("{name}|{latitude},{longitude}"))
}

/// Anonymous, stable user id from a requester fingerprint
pub fn derive_user_id(user_agent: &str, ip_address: &str) -> String {
    short_hash(&format!("{user_agent}:{ip_address}"))
}

fn short_hash(input: &str) -> String {
    let digest = Sha256::digest(input.as_bytes());
    hex::encode(digest)[..16].to_string()
}

/// Kind of tracked user action
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum InteractionKind {
    Search,
    View,
    Click,
    Bookmark,
    Share,
}

impl InteractionKind {
    /// Rating before dwell-time adjustments
    pub fn base_rating(self) -> f64 {
        match self {
            Self::Search => 1.0,
            Self::View => 2.0,
            Self::Click => 3.0,
            Self::Share => 4.0,
            Self::Bookmark => 5.0,
        }
    }

    pub fn as_str(self) -> &'static str {
        match self {
            Self::Search => "search",
            Self::View => "view",
            Self::Click => "click",
            Self::Bookmark => "bookmark",
            Self::Share => "share",
        }
    }
}

impl fmt::Display for InteractionKind {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

impl FromStr for InteractionKind {
    type Err = GeoRankError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s.trim().to_lowercase().as_str() {
            "search" => Ok(Self::Search),
            "view" => Ok(Self::View),
            "click" => Ok(Self::Click),
            "bookmark" => Ok(Self::Bookmark),
            "share" => Ok(Self::Share),
            other => Err(GeoRankError::InvalidInput(format!(
                "unknown interaction kind: {other}"
            ))),
        }
    }
}

/// Implicit 1.0-5.0 rating from interaction kind and dwell time
pub fn implicit_rating(kind: InteractionKind, dwell_secs: Option<u64>) -> f64 {
    let mut rating = kind.base_rating();

    if let Some(dwell) = dwell_secs {
        if matches!(kind, InteractionKind::View | InteractionKind::Click) {
            if dwell > 30 {
                rating += 0.5;
            }
            if dwell > 120 {
                rating += 1.0;
            }
        }
    }

    rating.min(5.0)
}

/// Immutable record of one user action
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct UserInteraction {
    pub user_id: String,
    pub business_id: String,
    pub business_name: String,
    pub kind: InteractionKind,
    pub timestamp: DateTime<Utc>,
    #[serde(default)]
    pub query: Option<String>,
    #[serde(default)]
    pub category: Option<String>,
    #[serde(default)]
    pub tags: Vec<String>,
    /// Requester (lat, lon) at interaction time
    #[serde(default)]
    pub location: Option<(f64, f64)>,
    pub session_id: String,
    pub implicit_rating: f64,
}

impl UserInteraction {
    /// Interaction with a specific business, rating derived from kind and dwell
    pub fn with_business(
        user_id: impl Into<String>,
        session_id: impl Into<String>,
        business: &BusinessRecord,
        kind: InteractionKind,
        dwell_secs: Option<u64>,
    ) -> Self {
        Self {
            user_id: user_id.into(),
            business_id: business.business_id.clone(),
            business_name: business.name.clone(),
            kind,
            timestamp: Utc::now(),
            query: None,
            category: Some(business.category.clone()),
            tags: business.tags.clone(),
            location: None,
            session_id: session_id.into(),
            implicit_rating: implicit_rating(kind, dwell_secs),
        }
    }

    /// Pure search event, recorded against [`SEARCH_SENTINEL`]
    pub fn search(
        user_id: impl Into<String>,
        session_id: impl Into<String>,
        query: impl Into<String>,
        category: Option<String>,
        tags: Vec<String>,
    ) -> Self {
        Self {
            user_id: user_id.into(),
            business_id: SEARCH_SENTINEL.to_string(),
            business_name: String::new(),
            kind: InteractionKind::Search,
            timestamp: Utc::now(),
            query: Some(query.into()),
            category,
            tags,
            location: None,
            session_id: session_id.into(),
            implicit_rating: implicit_rating(InteractionKind::Search, None),
        }
    }

    #[must_use]
    pub fn at(mut self, timestamp: DateTime<Utc>) -> Self {
        self.timestamp = timestamp;
        self
    }

    #[must_use]
    pub fn with_location(mut self, lat: f64, lon: f64) -> Self {
        self.location = Some((lat, lon));
        self
    }

    #[must_use]
    pub fn with_query(mut self, query: impl Into<String>) -> Self {
        self.query = Some(query.into()).filter(|q: &String| !q.is_empty());
        self
    }

    pub fn is_search_event(&self) -> bool {
        self.business_id == SEARCH_SENTINEL
    }

    /// Sorted-set score: seconds since epoch with millisecond precision
    pub fn score(&self) -> f64 {
        self.timestamp.timestamp_millis() as f64 / 1000.0
    }
}

/// Entry in a per-business interaction log
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct BusinessTouch {
    pub user_id: String,
    pub kind: InteractionKind,
    pub timestamp: DateTime<Utc>,
    pub rating: f64,
}

impl From<&UserInteraction> for BusinessTouch {
    fn from(interaction: &UserInteraction) -> Self {
        Self {
            user_id: interaction.user_id.clone(),
            kind: interaction.kind,
            timestamp: interaction.timestamp,
            rating: interaction.implicit_rating,
        }
    }
}

/// Per-user aggregate derived from interactions
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct UserPreferences {
    pub user_id: String,
    pub category_weights: BTreeMap<String, f64>,
    pub tag_weights: BTreeMap<String, f64>,
    /// Oldest first, bounded
    pub recent_search_patterns: Vec<String>,
    pub last_updated: DateTime<Utc>,
}

impl UserPreferences {
    pub fn new(user_id: impl Into<String>) -> Self {
        Self {
            user_id: user_id.into(),
            category_weights: BTreeMap::new(),
            tag_weights: BTreeMap::new(),
            recent_search_patterns: Vec::new(),
            last_updated: Utc::now(),
        }
    }

    /// Folds one interaction into the aggregate
    pub fn absorb(&mut self, interaction: &UserInteraction, max_patterns: usize) {
        let rating = interaction.implicit_rating;

        if let Some(category) = interaction.category.as_deref().filter(|c| !c.is_empty()) {
            *self.category_weights.entry(category.to_string()).or_insert(0.0) += rating;
        }

        for tag in interaction.tags.iter().filter(|t| !t.is_empty()) {
            *self.tag_weights.entry(tag.clone()).or_insert(0.0) += rating;
        }

        if let Some(query) = interaction.query.as_deref().filter(|q| !q.is_empty()) {
            if !self.recent_search_patterns.iter().any(|p| p == query) {
                self.recent_search_patterns.push(query.to_string());
                if self.recent_search_patterns.len() > max_patterns {
                    let overflow = self.recent_search_patterns.len() - max_patterns;
                    self.recent_search_patterns.drain(..overflow);
                }
            }
        }

        self.last_updated = Utc::now();
    }
}

/// Business surfaced by collaborative filtering
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ScoredBusiness {
    pub business_id: String,
    pub business_name: String,
    pub category: String,
    pub tags: Vec<String>,
    /// Accumulated similarity-weighted rating, higher is better
    pub recommendation_score: f64,
}
