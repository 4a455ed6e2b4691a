//! Cloudflare Vectorize (v2 REST) backend.
//!
//! Vectors are written as NDJSON, queried with metadata, and filtered by the
//! similarity threshold on the client. Ids longer than the service limit are
//! replaced by their blake3 hex digest; the original id travels in metadata.
use std::time::Duration;

use async_trait::async_trait;
use reqwest::{Client, Response, StatusCode};
use serde::Deserialize;
use serde_json::json;
use tracing::{debug, info, warn};
use url::Url;

use super::{
    DistanceMetric, IndexEntry, IndexError, SearchHit, VectorIndex, check_dimensions,
};
use crate::indexer::ChunkMetadata;

pub const DEFAULT_API_BASE: &str = "https://api.cloudflare.com/client/v4";

const MAX_ID_BYTES: usize = 64;
/// Largest `topK` accepted together with `returnMetadata: "all"`.
const MAX_TOP_K_WITH_METADATA: usize = 20;
const METADATA_CONTENT_LIMIT: usize = 8 * 1024;
const METADATA_INDEXES: &[&str] = &["file_path", "language", "chunk_type"];

#[derive(Debug, Clone)]
pub struct VectorizeConfig {
    pub api_base: String,
    pub account_id: String,
    pub api_token: String,
    pub index_name: String,
    pub dimension: usize,
    pub timeout_secs: u64,
}

pub struct VectorizeIndex {
    client: Client,
    indexes_url: String,
    index_name: String,
    api_token: String,
    dimension: usize,
}

#[derive(Debug, Deserialize)]
struct Envelope<T> {
    result: Option<T>,
}

#[derive(Debug, Deserialize)]
struct IndexInfo {
    #[serde(default)]
    config: Option<IndexInfoConfig>,
}

#[derive(Debug, Deserialize)]
struct IndexInfoConfig {
    dimensions: usize,
}

#[derive(Debug, Deserialize)]
struct QueryResult {
    #[serde(default)]
    matches: Vec<QueryMatch>,
}

#[derive(Debug, Deserialize)]
struct QueryMatch {
    id: String,
    score: f32,
    #[serde(default)]
    metadata: Option<serde_json::Value>,
}

impl VectorizeIndex {
    pub fn new(config: VectorizeConfig) -> Result<Self, IndexError> {
        let base = Url::parse(&config.api_base)
            .map_err(|e| IndexError::Backend(format!("invalid api base {}: {e}", config.api_base)))?;
        let client = Client::builder()
            .timeout(Duration::from_secs(config.timeout_secs))
            .build()?;

        Ok(Self {
            client,
            indexes_url: format!(
                "{}/accounts/{}/vectorize/v2/indexes",
                base.as_str().trim_end_matches('/'),
                config.account_id
            ),
            index_name: config.index_name,
            api_token: config.api_token,
            dimension: config.dimension,
        })
    }

    pub fn index_name(&self) -> &str {
        &self.index_name
    }

    fn index_url(&self, action: Option<&str>) -> String {
        match action {
            Some(action) => format!("{}/{}/{}", self.indexes_url, self.index_name, action),
            None => format!("{}/{}", self.indexes_url, self.index_name),
        }
    }

    async fn create_metadata_indexes(&self) {
        let url = self.index_url(Some("metadata_index/create"));
        for property in METADATA_INDEXES {
            let result = self
                .client
                .post(&url)
                .bearer_auth(&self.api_token)
                .json(&json!({ "propertyName": property, "indexType": "string" }))
                .send()
                .await;
            match result {
                Ok(resp) if resp.status().is_success() => {}
                Ok(resp) => warn!(
                    "Metadata index on {} not created: HTTP {}",
                    property,
                    resp.status()
                ),
                Err(e) => warn!("Metadata index on {} not created: {}", property, e),
            }
        }
    }
}

/// Maps a chunk id onto the service's id length limit.
pub fn remote_id(id: &str) -> String {
    if id.len() <= MAX_ID_BYTES {
        id.to_string()
    } else {
        blake3::hash(id.as_bytes()).to_hex().to_string()
    }
}

fn truncate_content(metadata: &mut ChunkMetadata) {
    if metadata.content.len() <= METADATA_CONTENT_LIMIT {
        return;
    }
    let mut cut = METADATA_CONTENT_LIMIT;
    while !metadata.content.is_char_boundary(cut) {
        cut -= 1;
    }
    metadata.content.truncate(cut);
}

async fn ensure_success(response: Response) -> Result<Response, IndexError> {
    let status = response.status();
    if status.is_success() {
        return Ok(response);
    }
    let body = response.text().await.unwrap_or_default();
    Err(IndexError::Backend(format!("HTTP {status}: {body}")))
}

#[async_trait]
impl VectorIndex for VectorizeIndex {
    async fn create_index(&self, dimension: usize, metric: DistanceMetric) -> Result<(), IndexError> {
        if dimension != self.dimension {
            return Err(IndexError::DimensionMismatch {
                expected: self.dimension,
                actual: dimension,
            });
        }

        let existing = self
            .client
            .get(self.index_url(None))
            .bearer_auth(&self.api_token)
            .send()
            .await?;

        if existing.status().is_success() {
            let info: Envelope<IndexInfo> = existing.json().await?;
            if let Some(config) = info.result.and_then(|r| r.config) {
                if config.dimensions != dimension {
                    return Err(IndexError::DimensionMismatch {
                        expected: dimension,
                        actual: config.dimensions,
                    });
                }
            }
            debug!("Vectorize index {} already exists", self.index_name);
            return Ok(());
        }
        if existing.status() != StatusCode::NOT_FOUND {
            ensure_success(existing).await?;
        }

        let body = json!({
            "name": self.index_name,
            "description": "code chunk embeddings",
            "config": { "dimensions": dimension, "metric": metric.as_str() },
        });
        let response = self
            .client
            .post(&self.indexes_url)
            .bearer_auth(&self.api_token)
            .json(&body)
            .send()
            .await?;
        ensure_success(response).await?;
        info!(
            "Created Vectorize index {} ({} dims, {})",
            self.index_name,
            dimension,
            metric.as_str()
        );

        self.create_metadata_indexes().await;
        Ok(())
    }

    async fn upsert(&self, entries: Vec<IndexEntry>) -> Result<usize, IndexError> {
        check_dimensions(self.dimension, &entries)?;
        if entries.is_empty() {
            return Ok(0);
        }

        let count = entries.len();
        let mut body = String::new();
        for mut entry in entries {
            truncate_content(&mut entry.metadata);
            let line = json!({
                "id": remote_id(&entry.id),
                "values": entry.vector,
                "metadata": entry.metadata,
            });
            body.push_str(&line.to_string());
            body.push('\n');
        }

        let response = self
            .client
            .post(self.index_url(Some("upsert")))
            .bearer_auth(&self.api_token)
            .header(reqwest::header::CONTENT_TYPE, "application/x-ndjson")
            .body(body)
            .send()
            .await?;
        if response.status() == StatusCode::NOT_FOUND {
            return Err(IndexError::NotCreated(self.index_name.clone()));
        }
        ensure_success(response).await?;
        debug!("Upserted {} vectors into {}", count, self.index_name);
        Ok(count)
    }

    async fn delete(&self, ids: &[String]) -> Result<(), IndexError> {
        if ids.is_empty() {
            return Ok(());
        }
        let ids: Vec<String> = ids.iter().map(|id| remote_id(id)).collect();
        let response = self
            .client
            .post(self.index_url(Some("delete_by_ids")))
            .bearer_auth(&self.api_token)
            .json(&json!({ "ids": ids }))
            .send()
            .await?;
        if response.status() == StatusCode::NOT_FOUND {
            return Ok(());
        }
        ensure_success(response).await?;
        Ok(())
    }

    async fn search(
        &self,
        query: &[f32],
        top_k: usize,
        threshold: f32,
    ) -> Result<Vec<SearchHit>, IndexError> {
        if top_k == 0 {
            return Ok(Vec::new());
        }
        if query.len() != self.dimension {
            return Err(IndexError::DimensionMismatch {
                expected: self.dimension,
                actual: query.len(),
            });
        }

        let body = json!({
            "vector": query,
            "topK": top_k.min(MAX_TOP_K_WITH_METADATA),
            "returnValues": false,
            "returnMetadata": "all",
        });
        let response = self
            .client
            .post(self.index_url(Some("query")))
            .bearer_auth(&self.api_token)
            .json(&body)
            .send()
            .await?;
        // A missing index holds no vectors.
        if response.status() == StatusCode::NOT_FOUND {
            return Ok(Vec::new());
        }
        let envelope: Envelope<QueryResult> = ensure_success(response).await?.json().await?;
        let matches = envelope.result.map(|r| r.matches).unwrap_or_default();

        let mut hits: Vec<SearchHit> = matches
            .into_iter()
            .filter(|m| m.score >= threshold)
            .filter_map(|m| {
                let metadata = m.metadata?;
                match serde_json::from_value::<ChunkMetadata>(metadata) {
                    Ok(metadata) => Some(SearchHit {
                        id: metadata.chunk_id.clone(),
                        score: m.score,
                        metadata,
                    }),
                    Err(e) => {
                        warn!("Skipping match {} with unreadable metadata: {}", m.id, e);
                        None
                    }
                }
            })
            .collect();

        hits.sort_by(|a, b| b.score.total_cmp(&a.score));
        hits.truncate(top_k);
        Ok(hits)
    }

    async fn delete_index(&self) -> Result<(), IndexError> {
        let response = self
            .client
            .delete(self.index_url(None))
            .bearer_auth(&self.api_token)
            .send()
            .await?;
        if response.status() == StatusCode::NOT_FOUND {
            debug!("Vectorize index {} already absent", self.index_name);
            return Ok(());
        }
        ensure_success(response).await?;
        info!("Deleted Vectorize index {}", self.index_name);
        Ok(())
    }

    fn dimension(&self) -> usize {
        self.dimension
    }
}
