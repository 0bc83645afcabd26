use std::path::Path;
use std::time::Duration;

use serde::Deserialize;
use serde::Serialize;

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct LoggingConfig {
    pub level: String,
    pub backtrace: bool,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct RetrievalConfig {
    /// Base URL of the vector retrieval service
    pub endpoint: String,
    #[serde(default = "default_retrieval_timeout_secs")]
    pub timeout_secs: u64,
    /// Candidates requested for a bounded-radius search
    #[serde(default = "default_k_limited")]
    pub k_limited: usize,
    /// Candidates requested when the distance cutoff is disabled
    #[serde(default = "default_k_unlimited")]
    pub k_unlimited: usize,
}

pub(crate) fn default_retrieval_timeout_secs() -> u64 {
    10
}

pub(crate) fn default_k_limited() -> usize {
    50
}

pub(crate) fn default_k_unlimited() -> usize {
    200
}

#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct WeatherConfig {
    /// Snapshot endpoint; weather factors are skipped when unset
    #[serde(default)]
    pub endpoint: Option<String>,
    #[serde(default = "default_weather_timeout_secs")]
    pub timeout_secs: u64,
}

pub(crate) fn default_weather_timeout_secs() -> u64 {
    3
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct RedisConfig {
    pub url: String,
    #[serde(default = "default_namespace")]
    pub namespace: String,
    /// Upper bound for a single store round trip
    #[serde(default = "default_op_timeout_ms")]
    pub op_timeout_ms: u64,
}

pub(crate) fn default_namespace() -> String {
    "georank:".to_string()
}

pub(crate) fn default_op_timeout_ms() -> u64 {
    500
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct RankingConfig {
    /// Any max distance at or above this disables the cutoff
    #[serde(default = "default_unlimited_threshold_km")]
    pub unlimited_threshold_km: f64,
    /// Query substrings that shift weight towards proximity
    #[serde(default = "default_locality_cues")]
    pub locality_cues: Vec<String>,
    /// (relevance, distance) weights without a locality cue
    #[serde(default = "default_weights")]
    pub default_weights: (f64, f64),
    /// (relevance, distance) weights when a locality cue is present
    #[serde(default = "default_locality_weights")]
    pub locality_weights: (f64, f64),
}

pub(crate) fn default_unlimited_threshold_km() -> f64 {
    10_000.0
}

pub(crate) fn default_locality_cues() -> Vec<String> {
    ["near me", "nearby", "closest", "around me", "near "]
        .iter()
        .map(|s| (*s).to_string())
        .collect()
}

pub(crate) fn default_weights() -> (f64, f64) {
    (0.7, 0.3)
}

pub(crate) fn default_locality_weights() -> (f64, f64) {
    (0.5, 0.5)
}

impl Default for RankingConfig {
    fn default() -> Self {
        Self {
            unlimited_threshold_km: default_unlimited_threshold_km(),
            locality_cues: default_locality_cues(),
            default_weights: default_weights(),
            locality_weights: default_locality_weights(),
        }
    }
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct CollaborativeConfig {
    /// Interaction logs and preferences expire after this many days
    #[serde(default = "default_retention_days")]
    pub retention_days: u32,
    /// Requester needs this many interactions before similar users are searched
    #[serde(default = "default_min_interactions")]
    pub min_interactions: usize,
    #[serde(default = "default_min_common_businesses")]
    pub min_common_businesses: usize,
    /// Similarities at or below this are discarded
    #[serde(default = "default_similarity_threshold")]
    pub similarity_threshold: f64,
    #[serde(default = "default_similar_users_cache_ttl_secs")]
    pub similar_users_cache_ttl_secs: u64,
    /// Neighbourhood size used when building recommendations
    #[serde(default = "default_similar_users_for_recommendations")]
    pub similar_users_for_recommendations: usize,
    #[serde(default = "default_max_search_patterns")]
    pub max_search_patterns: usize,
}

pub(crate) fn default_retention_days() -> u32 {
    30
}

pub(crate) fn default_min_interactions() -> usize {
    3
}

pub(crate) fn default_min_common_businesses() -> usize {
    2
}

pub(crate) fn default_similarity_threshold() -> f64 {
    0.1
}

pub(crate) fn default_similar_users_cache_ttl_secs() -> u64 {
    3600
}

pub(crate) fn default_similar_users_for_recommendations() -> usize {
    20
}

pub(crate) fn default_max_search_patterns() -> usize {
    20
}

impl Default for CollaborativeConfig {
    fn default() -> Self {
        Self {
            retention_days: default_retention_days(),
            min_interactions: default_min_interactions(),
            min_common_businesses: default_min_common_businesses(),
            similarity_threshold: default_similarity_threshold(),
            similar_users_cache_ttl_secs: default_similar_users_cache_ttl_secs(),
            similar_users_for_recommendations: default_similar_users_for_recommendations(),
            max_search_patterns: default_max_search_patterns(),
        }
    }
}

impl CollaborativeConfig {
    pub fn retention(&self) -> Duration {
        Duration::from_secs(u64::from(self.retention_days) * 24 * 3600)
    }

    pub fn similar_users_cache_ttl(&self) -> Duration {
        Duration::from_secs(self.similar_users_cache_ttl_secs)
    }
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct AppConfig {
    pub logging: LoggingConfig,
    pub retrieval: RetrievalConfig,
    #[serde(default)]
    pub weather: WeatherConfig,
    /// Interaction store; without it the engine runs with recommendations disabled
    #[serde(default)]
    pub redis: Option<RedisConfig>,
    #[serde(default)]
    pub ranking: RankingConfig,
    #[serde(default)]
    pub collaborative: CollaborativeConfig,
}

impl AppConfig {
    /// Load configuration from a TOML file
    pub fn from_file<P: AsRef<Path>>(path: P) -> crate::Result<Self> {
        let content = std::fs::read_to_string(path)?;
        Self::from_toml_str(&content)
    }

    /// Parse configuration from TOML text and validate it
    pub fn from_toml_str(content: &str) -> crate::Result<Self> {
        let config: Self = toml::from_str(content)?;
        config.validate()?;
        Ok(config)
    }

    /// Load configuration from default config file path
    pub fn load() -> crate::Result<Self> {
        // Try to load from config.toml first, then fall back to config.example.toml
        if Path::new("config.toml").exists() {
            Self::from_file("config.toml")
        } else if Path::new("config.example.toml").exists() {
            tracing::warn!(
                "Using config.example.toml. Please create config.toml for production use."
            );
            Self::from_file("config.example.toml")
        } else {
            Err(crate::GeoRankError::Io(std::io::Error::new(
                std::io::ErrorKind::NotFound,
                "No config file found. Please create config.toml or config.example.toml",
            )))
        }
    }

    /// Reject values the engine cannot work with
    pub fn validate(&self) -> crate::Result<()> {
        let check_weights = |name: &str, (rw, dw): (f64, f64)| {
            if !(0.0..=1.0).contains(&rw) || !(0.0..=1.0).contains(&dw) {
                return Err(crate::GeoRankError::Config(format!(
                    "ranking.{name} must be within [0, 1], got ({rw}, {dw})"
                )));
            }
            Ok(())
        };
        check_weights("default_weights", self.ranking.default_weights)?;
        check_weights("locality_weights", self.ranking.locality_weights)?;

        if self.ranking.unlimited_threshold_km <= 0.0 {
            return Err(crate::GeoRankError::Config(
                "ranking.unlimited_threshold_km must be positive".to_string(),
            ));
        }
        if self.collaborative.retention_days == 0 {
            return Err(crate::GeoRankError::Config(
                "collaborative.retention_days must be at least 1".to_string(),
            ));
        }
        Ok(())
    }

    /// Get retrieval endpoint
    pub fn retrieval_endpoint(&self) -> &str {
        &self.retrieval.endpoint
    }

    /// Get retrieval timeout
    pub fn retrieval_timeout(&self) -> Duration {
        Duration::from_secs(self.retrieval.timeout_secs)
    }

    /// Get weather endpoint, if configured
    pub fn weather_endpoint(&self) -> Option<&str> {
        self.weather.endpoint.as_deref()
    }

    /// Get weather timeout
    pub fn weather_timeout(&self) -> Duration {
        Duration::from_secs(self.weather.timeout_secs)
    }

    /// Check if an interaction store is configured
    pub fn store_enabled(&self) -> bool {
        self.redis.is_some()
    }

    /// Get the distance at which searches become unlimited
    pub fn unlimited_threshold_km(&self) -> f64 {
        self.ranking.unlimited_threshold_km
    }
}

impl Default for AppConfig {
    fn default() -> Self {
        Self {
            logging: LoggingConfig {
                level: "info".to_string(),
                backtrace: true,
            },
            retrieval: RetrievalConfig {
                endpoint: "http://localhost:8000".to_string(),
                timeout_secs: default_retrieval_timeout_secs(),
                k_limited: default_k_limited(),
                k_unlimited: default_k_unlimited(),
            },
            weather: WeatherConfig {
                endpoint: None,
                timeout_secs: default_weather_timeout_secs(),
            },
            redis: None,
            ranking: RankingConfig::default(),
            collaborative: CollaborativeConfig::default(),
        }
    }
}
