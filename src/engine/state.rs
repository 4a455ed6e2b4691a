use std::collections::HashMap;

use crate::dump::PathEntry;
use crate::graph::KnowledgeGraph;
use crate::indexer::{ChunkMetadata, CodeChunk};

/// Chunk metadata by id, kept in ingestion order.
#[derive(Debug, Default)]
pub struct ChunkStore {
    order: Vec<String>,
    by_id: HashMap<String, ChunkMetadata>,
}

impl ChunkStore {
    pub fn from_chunks(chunks: &[CodeChunk]) -> Self {
        let mut store = Self::default();
        for chunk in chunks {
            if store.by_id.contains_key(&chunk.id) {
                continue;
            }
            store.order.push(chunk.id.clone());
            store.by_id.insert(chunk.id.clone(), chunk.metadata());
        }
        store
    }

    pub fn get(&self, id: &str) -> Option<&ChunkMetadata> {
        self.by_id.get(id)
    }

    pub fn len(&self) -> usize {
        self.order.len()
    }

    pub fn is_empty(&self) -> bool {
        self.order.is_empty()
    }

    pub fn iter(&self) -> impl Iterator<Item = &ChunkMetadata> {
        self.order.iter().filter_map(|id| self.by_id.get(id))
    }

    /// Metadata for each id that is present, in the order given.
    pub fn resolve<'a, I>(&self, ids: I) -> Vec<ChunkMetadata>
    where
        I: IntoIterator<Item = &'a String>,
    {
        ids.into_iter()
            .filter_map(|id| self.by_id.get(id).cloned())
            .collect()
    }
}

/// Everything a query needs besides the vector index. Replaced wholesale by
/// each ingestion.
#[derive(Debug, Default)]
pub struct EngineState {
    pub entries: Vec<PathEntry>,
    pub graph: KnowledgeGraph,
    pub chunks: ChunkStore,
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::indexer::{ChunkType, Language};

    #[test]
    fn test_store_keeps_first_occurrence_in_order() {
        let a = CodeChunk::file("a.py", "x = 1", Language::Python);
        let b = CodeChunk::span("b.py", ChunkType::Code, "y = 2".into(), 0, 0, Language::Python);
        let dup = CodeChunk::file("a.py", "changed", Language::Python);

        let store = ChunkStore::from_chunks(&[a, b, dup]);
        assert_eq!(store.len(), 2);
        let ids: Vec<&str> = store.iter().map(|m| m.chunk_id.as_str()).collect();
        assert_eq!(ids, vec!["file:a.py", "b.py:0-0"]);
        assert_eq!(store.get("file:a.py").unwrap().content, "x = 1");
    }

    #[test]
    fn test_resolve_skips_unknown_ids() {
        let store = ChunkStore::from_chunks(&[CodeChunk::file("a.py", "x", Language::Python)]);
        let ids = vec!["missing".to_string(), "file:a.py".to_string()];
        let resolved = store.resolve(&ids);
        assert_eq!(resolved.len(), 1);
        assert_eq!(resolved[0].file_path, "a.py");
    }
}
