//! # coderag: hybrid retrieval over repository dumps
//!
//! Ingests a flattened text dump of a source repository, splits it into
//! chunks, builds a knowledge graph of directory structure and code
//! dependencies, and stores chunk embeddings in a vector index. Queries
//! return the most similar chunks enriched with related files and
//! dependency chunks.
//!
//! ## Architecture
//!
//! - **[`dump`]**: dump parsing (directory tree, file sections)
//! - **[`indexer`]**: heuristic chunking and tree-sitter dependency extraction
//! - **[`graph`]**: knowledge graph over files, chunks and symbols
//! - **[`embedder`]**: embedding trait, OpenAI-compatible client, mock
//! - **[`index`]**: vector index trait, in-memory and Cloudflare Vectorize backends
//! - **[`source`]**: repository dump download (GitHub via uithub)
//! - **[`engine`]**: ingestion pipeline and hybrid query
//! - **[`config`]**: configuration loading, validation and adapter construction

pub mod config;
pub mod dump;
pub mod embedder;
pub mod engine;
pub mod graph;
pub mod index;
pub mod indexer;
pub mod source;
