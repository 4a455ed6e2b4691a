//! Retrieval engine: ingestion pipeline and hybrid query.
//!
//! Ingestion runs in stages: parse the dump, chunk and link files, build the
//! knowledge graph and swap it into the engine state, embed chunks in
//! batches, then write embedded chunks to the vector index in batches. A
//! failing batch is skipped and counted in the [`IngestReport`] rather than
//! aborting the run.
//!
//! Queries embed the text, search the index and enrich every hit with graph
//! context read from a snapshot of the current state.
pub mod results;
pub mod state;

use std::sync::Arc;

use thiserror::Error;
use tokio::sync::RwLock;
use tokio_util::sync::CancellationToken;
use tracing::{debug, error, info, warn};

use crate::config::Config;
use crate::dump::parse_dump;
use crate::embedder::{Embedder, EmbedderError, check_batch};
use crate::graph::KnowledgeGraph;
use crate::index::{DistanceMetric, IndexEntry, IndexError, SearchHit, VectorIndex};
use crate::indexer::{CodeChunk, RepoIndexer};
use crate::source::{FetchError, RepoSource};

pub use results::{CodeContext, IngestReport, QueryResult};
pub use state::{ChunkStore, EngineState};

#[derive(Error, Debug)]
pub enum EngineError {
    #[error("fetch failed: {0}")]
    Fetch(#[from] FetchError),

    #[error("embedding failed: {0}")]
    Embedding(#[from] EmbedderError),

    #[error("vector index failed: {0}")]
    Index(#[from] IndexError),

    #[error("ingestion cancelled")]
    Cancelled,
}

/// Batch sizes and query parameters.
#[derive(Debug, Clone)]
pub struct EngineOptions {
    pub embed_batch_size: usize,
    pub write_batch_size: usize,
    pub max_results: usize,
    pub similarity_threshold: f32,
    pub graph_depth: usize,
    pub metric: DistanceMetric,
}

impl Default for EngineOptions {
    fn default() -> Self {
        Self {
            embed_batch_size: 100,
            write_batch_size: 100,
            max_results: 5,
            similarity_threshold: 0.7,
            graph_depth: 1,
            metric: DistanceMetric::Cosine,
        }
    }
}

impl From<&Config> for EngineOptions {
    fn from(config: &Config) -> Self {
        Self {
            embed_batch_size: config.embedding.batch_size,
            write_batch_size: config.index.write_batch_size,
            max_results: config.retrieval.max_results,
            similarity_threshold: config.retrieval.similarity_threshold,
            graph_depth: config.retrieval.graph_depth,
            metric: config.index.metric,
        }
    }
}

pub struct RetrievalEngine {
    source: Arc<dyn RepoSource>,
    embedder: Arc<dyn Embedder>,
    index: Arc<dyn VectorIndex>,
    options: EngineOptions,
    state: RwLock<Arc<EngineState>>,
}

impl RetrievalEngine {
    pub fn new(
        source: Arc<dyn RepoSource>,
        embedder: Arc<dyn Embedder>,
        index: Arc<dyn VectorIndex>,
        options: EngineOptions,
    ) -> Self {
        Self {
            source,
            embedder,
            index,
            options,
            state: RwLock::new(Arc::new(EngineState::default())),
        }
    }

    /// Validates the configuration and builds every adapter it names.
    pub fn from_config(config: &Config) -> anyhow::Result<Self> {
        config.validate()?;
        Ok(Self::new(
            config.build_source()?,
            config.build_embedder()?,
            config.build_index()?,
            EngineOptions::from(config),
        ))
    }

    pub fn options(&self) -> &EngineOptions {
        &self.options
    }

    /// The state built by the most recent ingestion.
    pub async fn snapshot(&self) -> Arc<EngineState> {
        self.state.read().await.clone()
    }

    /// Fetches the dump for `url` and ingests it.
    pub async fn ingest_url(
        &self,
        url: &str,
        cancel: &CancellationToken,
    ) -> Result<IngestReport, EngineError> {
        info!("Fetching repository {url}");
        let raw = tokio::select! {
            biased;
            _ = cancel.cancelled() => return Err(EngineError::Cancelled),
            fetched = self.source.fetch(url) => fetched?,
        };
        self.ingest_dump(&raw, cancel).await
    }

    /// Ingests a raw dump. Cancellation is honoured between batches; chunks
    /// embedded before it are not written.
    pub async fn ingest_dump(
        &self,
        raw: &str,
        cancel: &CancellationToken,
    ) -> Result<IngestReport, EngineError> {
        let mut report = IngestReport::started();

        let structure = parse_dump(raw);
        let repo = RepoIndexer::new().index(&structure);
        report.files = structure.file_count();
        report.entries = structure.entries.len();
        report.chunks = repo.chunks.len();
        report.links = repo.links.len();
        info!(
            "Parsed {} entries, {} files into {} chunks and {} links",
            report.entries, report.files, report.chunks, report.links
        );

        let graph = KnowledgeGraph::build(&structure.entries, &repo.chunks, &repo.links);
        debug!(
            "Knowledge graph: {} nodes, {} edges",
            graph.node_count(),
            graph.edge_count()
        );
        let state = EngineState {
            chunks: ChunkStore::from_chunks(&repo.chunks),
            graph,
            entries: structure.entries,
        };
        *self.state.write().await = Arc::new(state);

        let mut chunks = repo.chunks;
        self.embed_stage(&mut chunks, cancel, &mut report).await;
        if report.cancelled {
            info!(
                "Ingestion cancelled after embedding {} chunks",
                report.embedded
            );
            return Ok(report.finish());
        }

        self.write_stage(&chunks, cancel, &mut report).await?;

        let report = report.finish();
        info!(
            "Ingested {} of {} chunks in {} ms ({} embedding / {} write batches failed)",
            report.stored,
            report.chunks,
            report.duration_ms(),
            report.failed_embedding_batches,
            report.failed_write_batches
        );
        Ok(report)
    }

    async fn embed_stage(
        &self,
        chunks: &mut [CodeChunk],
        cancel: &CancellationToken,
        report: &mut IngestReport,
    ) {
        let dimensions = self.embedder.dimensions();
        let batch_size = self.options.embed_batch_size.max(1);

        for (n, batch) in chunks.chunks_mut(batch_size).enumerate() {
            if cancel.is_cancelled() {
                report.cancelled = true;
                return;
            }
            match self.embed_chunks(batch, dimensions).await {
                Ok(attached) => {
                    report.embedded += attached;
                    debug!("Embedded batch {n} ({attached} chunks)");
                }
                Err(e) => {
                    warn!("Skipping embedding batch {n} ({} chunks): {e}", batch.len());
                    report.failed_embedding_batches += 1;
                }
            }
        }
    }

    async fn embed_chunks(
        &self,
        batch: &mut [CodeChunk],
        dimensions: usize,
    ) -> Result<usize, EmbedderError> {
        let texts: Vec<String> = batch.iter().map(|c| c.content.clone()).collect();
        let vectors = self.embedder.embed_batch(&texts).await?;
        check_batch(texts.len(), dimensions, &vectors)?;

        let mut attached = 0;
        for (chunk, vector) in batch.iter_mut().zip(vectors) {
            if chunk.attach_embedding(vector) {
                attached += 1;
            }
        }
        Ok(attached)
    }

    async fn write_stage(
        &self,
        chunks: &[CodeChunk],
        cancel: &CancellationToken,
        report: &mut IngestReport,
    ) -> Result<(), EngineError> {
        let mut remaining: Vec<IndexEntry> = chunks
            .iter()
            .filter_map(|chunk| {
                chunk.embedding().map(|vector| IndexEntry {
                    id: chunk.id.clone(),
                    vector: vector.to_vec(),
                    metadata: chunk.metadata(),
                })
            })
            .collect();
        if remaining.is_empty() {
            warn!("No embedded chunks to store");
            return Ok(());
        }

        self.index
            .create_index(self.embedder.dimensions(), self.options.metric)
            .await?;

        let batch_size = self.options.write_batch_size.max(1);
        let mut n = 0;
        while !remaining.is_empty() {
            if cancel.is_cancelled() {
                report.cancelled = true;
                return Ok(());
            }
            let rest = remaining.split_off(remaining.len().min(batch_size));
            let batch = std::mem::replace(&mut remaining, rest);
            let len = batch.len();
            match self.index.upsert(batch).await {
                Ok(written) => {
                    report.stored += written;
                    debug!("Stored batch {n} ({written} entries)");
                }
                Err(e) => {
                    error!("Failed to store batch {n} ({len} entries): {e}");
                    report.failed_write_batches += 1;
                }
            }
            n += 1;
        }
        Ok(())
    }

    /// Embeds `text` and returns enriched hits, best first.
    pub async fn query(&self, text: &str) -> Result<Vec<QueryResult>, EngineError> {
        let vector = self.embedder.embed(text).await?;
        Ok(self.query_vector(&vector).await)
    }

    /// Searches with a precomputed vector. A failing search yields no results.
    pub async fn query_vector(&self, vector: &[f32]) -> Vec<QueryResult> {
        let hits = match self
            .index
            .search(
                vector,
                self.options.max_results,
                self.options.similarity_threshold,
            )
            .await
        {
            Ok(hits) => hits,
            Err(e) => {
                error!("Vector search failed: {e}");
                return Vec::new();
            }
        };

        let state = self.snapshot().await;
        hits.into_iter()
            .map(|hit| enrich(&state, hit, self.options.graph_depth))
            .collect()
    }

    /// Drops every vector from the index. The graph state is kept.
    pub async fn delete_index(&self) -> Result<(), EngineError> {
        self.index.delete_index().await?;
        info!("Vector index deleted");
        Ok(())
    }
}

fn enrich(state: &EngineState, hit: SearchHit, graph_depth: usize) -> QueryResult {
    let related_files = state.graph.related_files(&hit.metadata.file_path);
    let related_chunks = related_files
        .iter()
        .flat_map(|path| state.chunks.resolve(state.graph.file_chunks(path)))
        .collect();
    let dependency_ids = state
        .graph
        .related_chunks(&hit.metadata.chunk_id, graph_depth);

    QueryResult {
        chunk_id: hit.metadata.chunk_id.clone(),
        score: hit.score,
        related_files,
        related_chunks,
        dependency_chunks: state.chunks.resolve(&dependency_ids),
        metadata: hit.metadata,
    }
}
