/// Configuration module for coderag.
///
/// Handles loading, validating, and providing default configuration values,
/// and builds the source/embedder/index adapters they describe.
use std::path::Path;
use std::sync::Arc;

use anyhow::{Context, Result};
use serde::{Deserialize, Serialize};
use tracing::{info, warn};
use url::Url;

use crate::embedder::{Embedder, MockEmbedder, OpenAiEmbedder};
use crate::index::vectorize::DEFAULT_API_BASE;
use crate::index::{DistanceMetric, InMemoryIndex, VectorIndex, VectorizeConfig, VectorizeIndex};
use crate::source::{DEFAULT_USER_AGENT, HttpRepoSource, RepoSource};

// ── Default value functions ──────────────────────────────────────────

fn default_user_agent() -> String {
    DEFAULT_USER_AGENT.to_string()
}

fn default_fetch_timeout_secs() -> u64 {
    10
}

fn default_request_timeout_secs() -> u64 {
    30
}

fn default_embedding_base_url() -> String {
    "https://api.openai.com/v1".to_string()
}

fn default_embedding_model() -> String {
    "text-embedding-3-small".to_string()
}

fn default_dimensions() -> usize {
    1536
}

fn default_batch_size() -> usize {
    100
}

fn default_api_key_env() -> String {
    "OPENAI_API_KEY".to_string()
}

fn default_index_name() -> String {
    "code-understanding".to_string()
}

fn default_vectorize_api_base() -> String {
    DEFAULT_API_BASE.to_string()
}

fn default_account_id_env() -> String {
    "CLOUDFLARE_ACCOUNT_ID".to_string()
}

fn default_api_token_env() -> String {
    "CLOUDFLARE_API_TOKEN".to_string()
}

fn default_max_results() -> usize {
    5
}

fn default_similarity_threshold() -> f32 {
    0.7
}

fn default_graph_depth() -> usize {
    1
}

// ── Config structs ───────────────────────────────────────────────────

#[derive(Debug, Deserialize, Serialize, Clone, Default)]
pub struct Config {
    #[serde(default)]
    pub source: SourceConfig,

    #[serde(default)]
    pub embedding: EmbeddingConfig,

    #[serde(default)]
    pub index: IndexConfig,

    #[serde(default)]
    pub retrieval: RetrievalConfig,
}

#[derive(Debug, Deserialize, Serialize, Clone)]
pub struct SourceConfig {
    #[serde(default = "default_user_agent")]
    pub user_agent: String,

    #[serde(default = "default_fetch_timeout_secs")]
    pub timeout_secs: u64,
}

#[derive(Debug, Deserialize, Serialize, Clone, Copy, PartialEq, Eq, Default)]
#[serde(rename_all = "lowercase")]
pub enum EmbeddingProvider {
    #[default]
    OpenAi,
    Mock,
}

#[derive(Debug, Deserialize, Serialize, Clone)]
pub struct EmbeddingConfig {
    #[serde(default)]
    pub provider: EmbeddingProvider,

    #[serde(default = "default_embedding_base_url")]
    pub base_url: String,

    #[serde(default = "default_embedding_model")]
    pub model: String,

    #[serde(default = "default_dimensions")]
    pub dimensions: usize,

    #[serde(default = "default_batch_size")]
    pub batch_size: usize,

    /// Environment variable holding the API key.
    #[serde(default = "default_api_key_env")]
    pub api_key_env: String,

    #[serde(default = "default_request_timeout_secs")]
    pub timeout_secs: u64,
}

#[derive(Debug, Deserialize, Serialize, Clone, Copy, PartialEq, Eq, Default)]
#[serde(rename_all = "lowercase")]
pub enum IndexBackend {
    #[default]
    Memory,
    Vectorize,
}

#[derive(Debug, Deserialize, Serialize, Clone)]
pub struct IndexConfig {
    #[serde(default)]
    pub backend: IndexBackend,

    #[serde(default = "default_index_name")]
    pub name: String,

    #[serde(default)]
    pub metric: DistanceMetric,

    #[serde(default = "default_batch_size")]
    pub write_batch_size: usize,

    #[serde(default = "default_vectorize_api_base")]
    pub api_base: String,

    #[serde(default = "default_account_id_env")]
    pub account_id_env: String,

    #[serde(default = "default_api_token_env")]
    pub api_token_env: String,

    #[serde(default = "default_request_timeout_secs")]
    pub timeout_secs: u64,
}

#[derive(Debug, Deserialize, Serialize, Clone)]
pub struct RetrievalConfig {
    #[serde(default = "default_max_results")]
    pub max_results: usize,

    #[serde(default = "default_similarity_threshold")]
    pub similarity_threshold: f32,

    /// Hops followed over dependency edges for `dependency_chunks`.
    #[serde(default = "default_graph_depth")]
    pub graph_depth: usize,
}

// ── Default impls ────────────────────────────────────────────────────

impl Default for SourceConfig {
    fn default() -> Self {
        Self {
            user_agent: default_user_agent(),
            timeout_secs: default_fetch_timeout_secs(),
        }
    }
}

impl Default for EmbeddingConfig {
    fn default() -> Self {
        Self {
            provider: EmbeddingProvider::default(),
            base_url: default_embedding_base_url(),
            model: default_embedding_model(),
            dimensions: default_dimensions(),
            batch_size: default_batch_size(),
            api_key_env: default_api_key_env(),
            timeout_secs: default_request_timeout_secs(),
        }
    }
}

impl Default for IndexConfig {
    fn default() -> Self {
        Self {
            backend: IndexBackend::default(),
            name: default_index_name(),
            metric: DistanceMetric::default(),
            write_batch_size: default_batch_size(),
            api_base: default_vectorize_api_base(),
            account_id_env: default_account_id_env(),
            api_token_env: default_api_token_env(),
            timeout_secs: default_request_timeout_secs(),
        }
    }
}

impl Default for RetrievalConfig {
    fn default() -> Self {
        Self {
            max_results: default_max_results(),
            similarity_threshold: default_similarity_threshold(),
            graph_depth: default_graph_depth(),
        }
    }
}

// ── Config implementation ────────────────────────────────────────────

fn env_var(name: &str) -> Result<String> {
    std::env::var(name).with_context(|| format!("environment variable {name} is not set"))
}

impl Config {
    /// Load configuration from a JSON file.
    ///
    /// If `config_path` is empty, defaults to `"config.json"`.
    /// If the file does not exist, returns a default config and, for the
    /// default path only, writes a template file.
    pub fn load(config_path: &str) -> Result<Self> {
        let path = if config_path.is_empty() {
            "config.json"
        } else {
            config_path
        };

        if !Path::new(path).exists() {
            info!("{path} not found, using defaults");
            let cfg = Self::default();

            if path == "config.json" {
                match cfg.save(path) {
                    Ok(()) => info!("Generated config template: {path}"),
                    Err(e) => warn!("Failed to generate config template: {e}"),
                }
            }

            return Ok(cfg);
        }

        let data = std::fs::read_to_string(path)
            .with_context(|| format!("failed to read config: {path}"))?;

        let cfg: Config = match serde_json::from_str(&data) {
            Ok(c) => c,
            Err(e) => {
                warn!("Invalid JSON in {path}: {e}");
                warn!("Using default configuration");
                return Ok(Self::default());
            }
        };

        info!("Loaded configuration from {path}");
        Ok(cfg)
    }

    /// Save configuration to a JSON file.
    pub fn save(&self, path: &str) -> Result<()> {
        let data = serde_json::to_string_pretty(self).context("failed to marshal config")?;
        std::fs::write(path, data).with_context(|| format!("failed to write config: {path}"))?;
        Ok(())
    }

    /// Validate configuration values.
    pub fn validate(&self) -> Result<()> {
        anyhow::ensure!(
            self.embedding.dimensions > 0,
            "embedding.dimensions must be positive"
        );
        anyhow::ensure!(
            self.embedding.batch_size > 0,
            "embedding.batch_size must be positive"
        );
        anyhow::ensure!(
            self.index.write_batch_size > 0,
            "index.write_batch_size must be positive"
        );
        anyhow::ensure!(!self.index.name.is_empty(), "index.name must not be empty");
        anyhow::ensure!(
            self.retrieval.max_results > 0,
            "retrieval.max_results must be positive"
        );
        anyhow::ensure!(
            (-1.0..=1.0).contains(&self.retrieval.similarity_threshold),
            "retrieval.similarity_threshold must be within [-1, 1]"
        );
        anyhow::ensure!(
            self.source.timeout_secs > 0,
            "source.timeout_secs must be positive"
        );
        if self.embedding.provider == EmbeddingProvider::OpenAi {
            Url::parse(&self.embedding.base_url)
                .with_context(|| format!("invalid embedding.base_url: {}", self.embedding.base_url))?;
        }
        if self.index.backend == IndexBackend::Vectorize {
            Url::parse(&self.index.api_base)
                .with_context(|| format!("invalid index.api_base: {}", self.index.api_base))?;
        }
        Ok(())
    }

    pub fn build_source(&self) -> Result<Arc<dyn RepoSource>> {
        let source = HttpRepoSource::new(&self.source.user_agent, self.source.timeout_secs)
            .context("failed to build HTTP client for repository source")?;
        Ok(Arc::new(source))
    }

    /// Builds the configured embedder; the OpenAI provider needs its API key
    /// in the environment.
    pub fn build_embedder(&self) -> Result<Arc<dyn Embedder>> {
        let cfg = &self.embedding;
        match cfg.provider {
            EmbeddingProvider::Mock => Ok(Arc::new(MockEmbedder::new(cfg.dimensions))),
            EmbeddingProvider::OpenAi => {
                let api_key = env_var(&cfg.api_key_env)?;
                let embedder = OpenAiEmbedder::new(
                    &cfg.base_url,
                    &api_key,
                    &cfg.model,
                    cfg.dimensions,
                    cfg.timeout_secs,
                )
                .context("failed to build embedding client")?;
                Ok(Arc::new(embedder))
            }
        }
    }

    /// Builds the configured vector index; Vectorize needs its account id and
    /// API token in the environment.
    pub fn build_index(&self) -> Result<Arc<dyn VectorIndex>> {
        let cfg = &self.index;
        match cfg.backend {
            IndexBackend::Memory => Ok(Arc::new(InMemoryIndex::new(self.embedding.dimensions))),
            IndexBackend::Vectorize => {
                let index = VectorizeIndex::new(VectorizeConfig {
                    api_base: cfg.api_base.clone(),
                    account_id: env_var(&cfg.account_id_env)?,
                    api_token: env_var(&cfg.api_token_env)?,
                    index_name: cfg.name.clone(),
                    dimension: self.embedding.dimensions,
                    timeout_secs: cfg.timeout_secs,
                })
                .context("failed to build Vectorize client")?;
                Ok(Arc::new(index))
            }
        }
    }
}

// ── Tests ────────────────────────────────────────────────────────────
