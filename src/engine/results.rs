use chrono::{DateTime, Utc};
use serde::Serialize;

use crate::indexer::{ChunkMetadata, Language};

/// Outcome of one ingestion run.
#[derive(Debug, Clone, Serialize)]
pub struct IngestReport {
    /// Files with content in the dump.
    pub files: usize,
    /// Entries drawn in the directory tree.
    pub entries: usize,
    pub chunks: usize,
    pub links: usize,
    pub embedded: usize,
    pub stored: usize,
    pub failed_embedding_batches: usize,
    pub failed_write_batches: usize,
    pub cancelled: bool,
    pub started_at: DateTime<Utc>,
    pub finished_at: DateTime<Utc>,
}

impl IngestReport {
    pub(crate) fn started() -> Self {
        let now = Utc::now();
        Self {
            files: 0,
            entries: 0,
            chunks: 0,
            links: 0,
            embedded: 0,
            stored: 0,
            failed_embedding_batches: 0,
            failed_write_batches: 0,
            cancelled: false,
            started_at: now,
            finished_at: now,
        }
    }

    pub(crate) fn finish(mut self) -> Self {
        self.finished_at = Utc::now();
        self
    }

    pub fn duration_ms(&self) -> i64 {
        (self.finished_at - self.started_at).num_milliseconds()
    }

    /// True when every chunk was embedded and stored without cancellation.
    pub fn is_complete(&self) -> bool {
        !self.cancelled && self.stored == self.chunks
    }
}

/// One search hit enriched with graph context. `score` and `metadata` are
/// exactly what the index returned.
#[derive(Debug, Clone, Serialize)]
pub struct QueryResult {
    pub chunk_id: String,
    pub score: f32,
    pub metadata: ChunkMetadata,
    /// Paths one hop from the hit's file in the directory tree.
    pub related_files: Vec<String>,
    /// Chunks belonging to `related_files`, file by file.
    pub related_chunks: Vec<ChunkMetadata>,
    /// Chunks reached over import/reference edges from the hit.
    pub dependency_chunks: Vec<ChunkMetadata>,
}

impl QueryResult {
    pub fn to_code_context(&self) -> CodeContext {
        CodeContext {
            content: self.metadata.content.clone(),
            file_path: self.metadata.file_path.clone(),
            language: self.metadata.language,
            related_files: self.related_files.clone(),
        }
    }
}

/// Input handed to a downstream explanation step.
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct CodeContext {
    pub content: String,
    pub file_path: String,
    pub language: Language,
    pub related_files: Vec<String>,
}
