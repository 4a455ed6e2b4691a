//! Chunking and dependency extraction over a parsed dump.
pub mod chunk;
pub mod chunker;
pub mod core;
pub mod languages;
pub mod relations;

pub use chunk::{ChunkMetadata, ChunkType, CodeChunk, STRUCTURE_CHUNK_ID};
pub use self::core::{DependencyLink, IndexedRepo, LinkTarget, RepoIndexer};
pub use languages::Language;
pub use relations::DependencyKind;
