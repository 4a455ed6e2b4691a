/// End-to-end integration tests for the coderag pipeline.
///
/// Tests the complete flow:
///   Dump → Chunks → Graph → Embeddings → Index → Query → Delete
use std::sync::Arc;
use std::sync::atomic::{AtomicUsize, Ordering};

use async_trait::async_trait;
use coderag::config::Config;
use coderag::dump::{BOUNDARY_LEN, parse_dump};
use coderag::embedder::{Embedder, EmbedderError, MockEmbedder};
use coderag::engine::{EngineOptions, RetrievalEngine};
use coderag::index::{
    DistanceMetric, IndexEntry, IndexError, InMemoryIndex, SearchHit, VectorIndex,
};
use coderag::indexer::{ChunkType, STRUCTURE_CHUNK_ID};
use coderag::source::StaticSource;
use tokio_util::sync::CancellationToken;

const DIM: usize = 64;

fn init_tracing() {
    let _ = tracing_subscriber::fmt()
        .with_env_filter(tracing_subscriber::EnvFilter::from_default_env())
        .with_test_writer()
        .try_init();
}

fn boundary() -> String {
    "-".repeat(BOUNDARY_LEN)
}

/// a.py imports b; b.py defines the helper a.py calls.
fn two_file_dump() -> String {
    let b = boundary();
    format!(
        "├── a.py\n└── b.py\n\
         {b}\na.py:\n{b}\nimport b\n\ndef run():\n    return b.helper()\n\
         {b}\nb.py:\n{b}\ndef helper():\n    return 42\n"
    )
}

fn nested_dump() -> String {
    let b = boundary();
    format!(
        "├── README.md\n└── pkg\n    ├── __init__.py\n    ├── models.py\n    └── views.py\n\
         {b}\n/README.md:\n{b}\n# Demo\n\
         {b}\n/pkg/models.py:\n{b}\nclass User:\n    name = \"\"\n\
         {b}\n/pkg/views.py:\n{b}\nfrom pkg import models\n\ndef show(user):\n    return models.User()\n"
    )
}

fn memory_engine(
    dump: String,
    embedder: Arc<dyn Embedder>,
    options: EngineOptions,
) -> (RetrievalEngine, Arc<InMemoryIndex>) {
    let index = Arc::new(InMemoryIndex::new(DIM));
    let engine = RetrievalEngine::new(
        Arc::new(StaticSource::new(dump)),
        embedder,
        index.clone(),
        options,
    );
    (engine, index)
}

/// Fails every call whose ordinal is in `failing`.
struct FlakyEmbedder {
    inner: MockEmbedder,
    calls: AtomicUsize,
    failing: Vec<usize>,
}

#[async_trait]
impl Embedder for FlakyEmbedder {
    async fn embed_batch(&self, texts: &[String]) -> Result<Vec<Vec<f32>>, EmbedderError> {
        let call = self.calls.fetch_add(1, Ordering::SeqCst);
        if self.failing.contains(&call) {
            return Err(EmbedderError::Response(format!("call {call} rejected")));
        }
        self.inner.embed_batch(texts).await
    }

    fn dimensions(&self) -> usize {
        self.inner.dimensions
    }

    fn model_name(&self) -> &str {
        "flaky"
    }
}

/// Rejects every upsert call whose ordinal is in `failing`.
struct FlakyIndex {
    inner: InMemoryIndex,
    upserts: AtomicUsize,
    failing: Vec<usize>,
}

#[async_trait]
impl VectorIndex for FlakyIndex {
    async fn create_index(
        &self,
        dimension: usize,
        metric: DistanceMetric,
    ) -> Result<(), IndexError> {
        self.inner.create_index(dimension, metric).await
    }

    async fn upsert(&self, entries: Vec<IndexEntry>) -> Result<usize, IndexError> {
        let call = self.upserts.fetch_add(1, Ordering::SeqCst);
        if self.failing.contains(&call) {
            return Err(IndexError::Backend(format!("upsert {call} rejected")));
        }
        self.inner.upsert(entries).await
    }

    async fn delete(&self, ids: &[String]) -> Result<(), IndexError> {
        self.inner.delete(ids).await
    }

    async fn search(
        &self,
        query: &[f32],
        top_k: usize,
        threshold: f32,
    ) -> Result<Vec<SearchHit>, IndexError> {
        self.inner.search(query, top_k, threshold).await
    }

    async fn delete_index(&self) -> Result<(), IndexError> {
        self.inner.delete_index().await
    }

    fn dimension(&self) -> usize {
        self.inner.dimension()
    }
}

/// Full pipeline: ingest → query → enriched context
#[tokio::test]
async fn test_full_pipeline() {
    init_tracing();
    let (engine, index) = memory_engine(
        two_file_dump(),
        Arc::new(MockEmbedder::new(DIM)),
        EngineOptions::default(),
    );

    // 1. Ingest through the source
    let report = engine
        .ingest_url("https://github.com/acme/demo", &CancellationToken::new())
        .await
        .unwrap();
    assert_eq!(report.files, 2);
    assert!(report.is_complete(), "report: {report:?}");
    assert_eq!(index.len(), report.chunks);

    // 2. Query with the content of a.py
    let state = engine.snapshot().await;
    let a_content = state.chunks.get("file:a.py").unwrap().content.clone();
    let results = engine.query(&a_content).await.unwrap();
    assert!(!results.is_empty(), "Query should return results");

    // 3. The top hit is a.py and carries b.py as context
    let top = &results[0];
    assert_eq!(top.metadata.file_path, "a.py");
    assert_eq!(top.related_files, vec!["b.py".to_string()]);
    assert!(
        top.related_chunks.iter().any(|c| c.file_path == "b.py"),
        "b.py chunks should be related: {:?}",
        top.related_chunks
    );

    // 4. Scores are passed through untouched and ordered
    for pair in results.windows(2) {
        assert!(pair[0].score >= pair[1].score);
    }
    for r in &results {
        assert!(r.score >= engine.options().similarity_threshold);
        assert!(!r.metadata.content.is_empty());
    }

    // 5. Context for downstream explanation
    let context = top.to_code_context();
    assert_eq!(context.file_path, "a.py");
    assert_eq!(context.language.as_str(), "python");
}

/// The reference from run() to helper() links their chunks
#[tokio::test]
async fn test_dependency_chunks_follow_references() {
    init_tracing();
    let (engine, _) = memory_engine(
        two_file_dump(),
        Arc::new(MockEmbedder::new(DIM)),
        EngineOptions::default(),
    );
    engine
        .ingest_dump(&two_file_dump(), &CancellationToken::new())
        .await
        .unwrap();

    let state = engine.snapshot().await;
    let run = state
        .chunks
        .iter()
        .find(|c| c.name.as_deref() == Some("run"))
        .unwrap()
        .clone();
    assert_eq!(run.chunk_type, ChunkType::Function);

    let results = engine.query(&run.content).await.unwrap();
    let top = &results[0];
    assert_eq!(top.chunk_id, run.chunk_id);
    assert!(
        top.dependency_chunks
            .iter()
            .any(|c| c.name.as_deref() == Some("helper")),
        "helper should be a dependency: {:?}",
        top.dependency_chunks
    );
}

/// Nested directories: siblings inside a package, structure chunk at the root
#[tokio::test]
async fn test_nested_structure_context() {
    init_tracing();
    let (engine, _) = memory_engine(
        nested_dump(),
        Arc::new(MockEmbedder::new(DIM)),
        EngineOptions::default(),
    );
    engine
        .ingest_dump(&nested_dump(), &CancellationToken::new())
        .await
        .unwrap();

    let state = engine.snapshot().await;
    let views = state.chunks.get("file:pkg/views.py").unwrap().content.clone();
    let results = engine.query(&views).await.unwrap();
    let top = &results[0];
    assert_eq!(top.metadata.file_path, "pkg/views.py");
    assert_eq!(
        top.related_files,
        vec!["pkg/__init__.py".to_string(), "pkg/models.py".to_string()]
    );
    // __init__.py has no content section, so only models.py contributes chunks
    assert!(
        top.related_chunks
            .iter()
            .all(|c| c.file_path == "pkg/models.py")
    );

    let structure = state.chunks.get(STRUCTURE_CHUNK_ID).unwrap().content.clone();
    let results = engine.query(&structure).await.unwrap();
    let top = &results[0];
    assert_eq!(top.chunk_id, STRUCTURE_CHUNK_ID);
    assert_eq!(
        top.related_files,
        vec!["README.md".to_string(), "pkg".to_string()]
    );
}

/// Re-ingesting the same dump overwrites ids instead of duplicating them
#[tokio::test]
async fn test_reingest_is_idempotent() {
    init_tracing();
    let (engine, index) = memory_engine(
        two_file_dump(),
        Arc::new(MockEmbedder::new(DIM)),
        EngineOptions::default(),
    );
    let token = CancellationToken::new();

    let first = engine.ingest_dump(&two_file_dump(), &token).await.unwrap();
    let stored_once = index.len();
    let second = engine.ingest_dump(&two_file_dump(), &token).await.unwrap();

    assert_eq!(first.chunks, second.chunks);
    assert_eq!(index.len(), stored_once);
}

/// A failing embedding batch is skipped; the other batches are stored
#[tokio::test]
async fn test_failed_embedding_batch_is_skipped() {
    init_tracing();
    let embedder = FlakyEmbedder {
        inner: MockEmbedder::new(DIM),
        calls: AtomicUsize::new(0),
        failing: vec![1],
    };
    let options = EngineOptions {
        embed_batch_size: 2,
        write_batch_size: 3,
        ..EngineOptions::default()
    };
    let (engine, index) = memory_engine(two_file_dump(), Arc::new(embedder), options);

    let report = engine
        .ingest_dump(&two_file_dump(), &CancellationToken::new())
        .await
        .unwrap();
    assert!(report.chunks >= 5);
    assert_eq!(report.failed_embedding_batches, 1);
    assert_eq!(report.failed_write_batches, 0);
    assert_eq!(report.embedded, report.chunks - 2);
    assert_eq!(report.stored, report.embedded);
    assert_eq!(index.len(), report.stored);

    // Chunks 2 and 3 belonged to the failed batch
    let state = engine.snapshot().await;
    let ids: Vec<String> = state.chunks.iter().map(|c| c.chunk_id.clone()).collect();
    assert!(index.contains(&ids[0]));
    assert!(!index.contains(&ids[2]));
    assert!(!index.contains(&ids[3]));
    assert!(index.contains(&ids[4]));
}

/// A failing index write is skipped; the run still succeeds
#[tokio::test]
async fn test_failed_write_batch_is_skipped() {
    init_tracing();
    let index = Arc::new(FlakyIndex {
        inner: InMemoryIndex::new(DIM),
        upserts: AtomicUsize::new(0),
        failing: vec![1],
    });
    let options = EngineOptions {
        write_batch_size: 3,
        ..EngineOptions::default()
    };
    let engine = RetrievalEngine::new(
        Arc::new(StaticSource::new(two_file_dump())),
        Arc::new(MockEmbedder::new(DIM)),
        index.clone(),
        options,
    );

    // 1. Ingestion returns Ok despite the rejected batch
    let report = engine
        .ingest_dump(&two_file_dump(), &CancellationToken::new())
        .await
        .unwrap();
    assert!(report.chunks >= 7);
    assert_eq!(report.embedded, report.chunks);
    assert_eq!(report.failed_write_batches, 1);
    assert_eq!(report.failed_embedding_batches, 0);
    assert_eq!(report.stored, report.chunks - 3);
    assert!(!report.is_complete());
    assert_eq!(index.inner.len(), report.stored);

    // 2. Only chunks 3..6 belonged to the rejected batch
    let state = engine.snapshot().await;
    let ids: Vec<String> = state.chunks.iter().map(|c| c.chunk_id.clone()).collect();
    for (i, id) in ids.iter().enumerate() {
        assert_eq!(
            index.inner.contains(id),
            !(3..6).contains(&i),
            "chunk {i} ({id})"
        );
    }

    // 3. Stored chunks remain searchable
    let content = state.chunks.get(&ids[0]).unwrap().content.clone();
    let results = engine.query(&content).await.unwrap();
    assert_eq!(results[0].chunk_id, ids[0]);
}

/// A token cancelled before the first batch stores nothing
#[tokio::test]
async fn test_cancelled_before_first_batch() {
    init_tracing();
    let (engine, index) = memory_engine(
        two_file_dump(),
        Arc::new(MockEmbedder::new(DIM)),
        EngineOptions::default(),
    );
    let token = CancellationToken::new();
    token.cancel();

    let report = engine.ingest_dump(&two_file_dump(), &token).await.unwrap();
    assert!(report.cancelled);
    assert_eq!(report.embedded, 0);
    assert_eq!(report.stored, 0);
    assert!(index.is_empty());
}

/// delete_index empties the index; later queries find nothing
#[tokio::test]
async fn test_delete_index() {
    init_tracing();
    let (engine, index) = memory_engine(
        two_file_dump(),
        Arc::new(MockEmbedder::new(DIM)),
        EngineOptions::default(),
    );
    engine
        .ingest_dump(&two_file_dump(), &CancellationToken::new())
        .await
        .unwrap();
    assert!(!index.is_empty());

    engine.delete_index().await.unwrap();
    assert!(index.is_empty());
    assert_eq!(index.dimension(), DIM);

    let state = engine.snapshot().await;
    let content = state.chunks.get("file:b.py").unwrap().content.clone();
    assert!(engine.query(&content).await.unwrap().is_empty());
}

/// Malformed input yields an empty structure and no stored vectors
#[tokio::test]
async fn test_malformed_dump() {
    init_tracing();
    let structure = parse_dump("no tree here\njust text");
    assert!(structure.is_empty());

    let (engine, index) = memory_engine(
        String::new(),
        Arc::new(MockEmbedder::new(DIM)),
        EngineOptions::default(),
    );
    let report = engine
        .ingest_dump("no tree here\njust text", &CancellationToken::new())
        .await
        .unwrap();
    assert_eq!(report.chunks, 0);
    assert!(index.is_empty());
    assert!(engine.query("anything").await.unwrap().is_empty());
}

/// Engine built from configuration with offline adapters
#[tokio::test]
async fn test_engine_from_config() {
    init_tracing();
    let mut config = Config::default();
    config.embedding.provider = coderag::config::EmbeddingProvider::Mock;
    config.embedding.dimensions = DIM;
    config.embedding.batch_size = 4;

    let engine = RetrievalEngine::from_config(&config).unwrap();
    assert_eq!(engine.options().embed_batch_size, 4);

    let report = engine
        .ingest_dump(&two_file_dump(), &CancellationToken::new())
        .await
        .unwrap();
    assert_eq!(report.stored, report.chunks);

    config.embedding.dimensions = 0;
    assert!(RetrievalEngine::from_config(&config).is_err());
}
