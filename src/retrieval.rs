//! Vector retrieval backend contract and its HTTP client

use std::time::Duration;

use async_trait::async_trait;
use reqwest::Client;
use serde::Deserialize;
use serde::Serialize;
use tracing::debug;

use crate::config::AppConfig;
use crate::errors::GeoRankError;
use crate::errors::Result;

/// One opaque blob returned by the retrieval backend
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct RetrievedChunk {
    pub text: String,
    /// Dissimilarity, lower is better
    pub relevance: f64,
    #[serde(default)]
    pub source_ref: String,
}

impl RetrievedChunk {
    pub fn new(text: impl Into<String>, relevance: f64) -> Self {
        Self {
            text: text.into(),
            relevance,
            source_ref: String::new(),
        }
    }
}

/// Semantic retrieval capability
#[async_trait]
pub trait RetrievalBackend: Send + Sync {
    async fn retrieve(&self, query: &str, k: usize) -> Result<Vec<RetrievedChunk>>;
}

#[derive(Debug, Serialize)]
struct RetrieveRequest<'a> {
    query: &'a str,
    k: usize,
}

#[derive(Debug, Default, Deserialize)]
struct RetrieveMetadata {
    #[serde(default)]
    path: String,
}

#[derive(Debug, Deserialize)]
struct RetrieveItem {
    #[serde(default)]
    text: String,
    #[serde(default)]
    dist: f64,
    #[serde(default)]
    metadata: RetrieveMetadata,
}

/// Client for a retrieval service exposing `POST /v1/retrieve`
pub struct HttpRetriever {
    endpoint: String,
    client: Client,
}

impl HttpRetriever {
    pub fn new(endpoint: impl Into<String>, timeout: Duration) -> Result<Self> {
        let client = Client::builder()
            .timeout(timeout)
            .pool_idle_timeout(Duration::from_secs(30))
            .build()
            .map_err(|e| GeoRankError::Config(format!("HTTP client build error: {e}")))?;

        Ok(Self {
            endpoint: endpoint.into().trim_end_matches('/').to_string(),
            client,
        })
    }

    pub fn from_config(config: &AppConfig) -> Result<Self> {
        Self::new(config.retrieval_endpoint(), config.retrieval_timeout())
    }
}

#[async_trait]
impl RetrievalBackend for HttpRetriever {
    async fn retrieve(&self, query: &str, k: usize) -> Result<Vec<RetrievedChunk>> {
        debug!("Retrieving k={} for query: {}", k, query);

        let url = format!("{}/v1/retrieve", self.endpoint);
        let response = self
            .client
            .post(&url)
            .json(&RetrieveRequest { query, k })
            .send()
            .await
            .map_err(|e| GeoRankError::SearchUnavailable(format!("retrieve request failed: {e}")))?;

        if !response.status().is_success() {
            return Err(GeoRankError::SearchUnavailable(format!(
                "retrieve returned HTTP {}",
                response.status()
            )));
        }

        let items: Vec<RetrieveItem> = response
            .json()
            .await
            .map_err(|e| GeoRankError::SearchUnavailable(format!("invalid retrieve payload: {e}")))?;

        debug!("Retrieved {} chunks", items.len());

        Ok(items
            .into_iter()
            .map(|item| RetrievedChunk {
                text: item.text,
                relevance: item.dist,
                source_ref: item.metadata.path,
            })
            .collect())
    }
}
