use thiserror::Error;

#[derive(Error, Debug)]
pub enum GeoRankError {
    /// Rejected request, reason is user-facing
    #[error("Invalid input: {0}")]
    InvalidInput(String),

    /// Retrieval backend down or timed out; nothing to rank
    #[error("Search unavailable: {0}")]
    SearchUnavailable(String),

    #[error("Store error: {0}")]
    Store(String),

    #[error("Weather provider error: {0}")]
    Weather(String),

    #[error("Operation timed out: {0}")]
    Timeout(String),

    #[error("Configuration error: {0}")]
    Config(String),

    #[error("{0}")]
    Custom(String),

    #[error("Serialization error: {0}")]
    Serialization(#[from] serde_json::Error),

    #[error("TOML parsing error: {0}")]
    TomlParsing(#[from] toml::de::Error),

    #[error("IO error: {0}")]
    Io(#[from] std::io::Error),
}

impl GeoRankError {
    /// True for errors the caller caused (4xx-equivalent)
    pub fn is_client_error(&self) -> bool {
        matches!(self, Self::InvalidInput(_))
    }
}

pub type Result<T> = std::result::Result<T, GeoRankError>;
