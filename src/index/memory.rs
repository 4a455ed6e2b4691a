use std::collections::HashMap;
use std::sync::RwLock;

use async_trait::async_trait;
use tracing::debug;

use super::{
    DistanceMetric, IndexEntry, IndexError, SearchHit, VectorIndex, check_dimensions,
    cosine_similarity,
};
use crate::indexer::ChunkMetadata;

struct StoredVector {
    seq: u64,
    vector: Vec<f32>,
    metadata: ChunkMetadata,
}

#[derive(Default)]
struct Inner {
    entries: HashMap<String, StoredVector>,
    next_seq: u64,
}

/// Brute-force cosine index held in memory.
pub struct InMemoryIndex {
    dimension: usize,
    inner: RwLock<Inner>,
}

impl InMemoryIndex {
    #[must_use]
    pub fn new(dimension: usize) -> Self {
        Self {
            dimension,
            inner: RwLock::new(Inner::default()),
        }
    }

    pub fn len(&self) -> usize {
        self.inner.read().map(|i| i.entries.len()).unwrap_or(0)
    }

    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }

    pub fn contains(&self, id: &str) -> bool {
        self.inner
            .read()
            .map(|i| i.entries.contains_key(id))
            .unwrap_or(false)
    }
}

impl std::fmt::Debug for InMemoryIndex {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("InMemoryIndex")
            .field("dimension", &self.dimension)
            .finish_non_exhaustive()
    }
}

#[async_trait]
impl VectorIndex for InMemoryIndex {
    async fn create_index(
        &self,
        dimension: usize,
        _metric: DistanceMetric,
    ) -> Result<(), IndexError> {
        if dimension != self.dimension {
            return Err(IndexError::DimensionMismatch {
                expected: self.dimension,
                actual: dimension,
            });
        }
        Ok(())
    }

    async fn upsert(&self, entries: Vec<IndexEntry>) -> Result<usize, IndexError> {
        check_dimensions(self.dimension, &entries)?;

        let mut guard = self.inner.write().map_err(|_| IndexError::Lock)?;
        let inner = &mut *guard;
        let count = entries.len();
        for entry in entries {
            match inner.entries.get_mut(&entry.id) {
                // Overwrite keeps the original insertion position.
                Some(existing) => {
                    existing.vector = entry.vector;
                    existing.metadata = entry.metadata;
                }
                None => {
                    let seq = inner.next_seq;
                    inner.next_seq += 1;
                    inner.entries.insert(
                        entry.id,
                        StoredVector {
                            seq,
                            vector: entry.vector,
                            metadata: entry.metadata,
                        },
                    );
                }
            }
        }
        debug!("Upserted {} vectors ({} total)", count, inner.entries.len());
        Ok(count)
    }

    async fn delete(&self, ids: &[String]) -> Result<(), IndexError> {
        let mut inner = self.inner.write().map_err(|_| IndexError::Lock)?;
        for id in ids {
            inner.entries.remove(id);
        }
        Ok(())
    }

    async fn search(
        &self,
        query: &[f32],
        top_k: usize,
        threshold: f32,
    ) -> Result<Vec<SearchHit>, IndexError> {
        let inner = self.inner.read().map_err(|_| IndexError::Lock)?;
        if inner.entries.is_empty() {
            return Ok(Vec::new());
        }
        if query.len() != self.dimension {
            return Err(IndexError::DimensionMismatch {
                expected: self.dimension,
                actual: query.len(),
            });
        }

        let mut scored: Vec<(u64, SearchHit)> = inner
            .entries
            .iter()
            .filter_map(|(id, stored)| {
                let score = cosine_similarity(query, &stored.vector);
                (score >= threshold).then(|| {
                    (
                        stored.seq,
                        SearchHit {
                            id: id.clone(),
                            score,
                            metadata: stored.metadata.clone(),
                        },
                    )
                })
            })
            .collect();

        scored.sort_by(|(seq_a, a), (seq_b, b)| {
            b.score.total_cmp(&a.score).then(seq_a.cmp(seq_b))
        });
        scored.truncate(top_k);

        Ok(scored.into_iter().map(|(_, hit)| hit).collect())
    }

    async fn delete_index(&self) -> Result<(), IndexError> {
        let mut inner = self.inner.write().map_err(|_| IndexError::Lock)?;
        inner.entries.clear();
        inner.next_seq = 0;
        Ok(())
    }

    fn dimension(&self) -> usize {
        self.dimension
    }
}
