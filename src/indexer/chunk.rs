use serde::{Deserialize, Serialize};

use super::languages::Language;

/// Id of the synthetic chunk rendering the whole repository tree.
pub const STRUCTURE_CHUNK_ID: &str = "structure";

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum ChunkType {
    Structure,
    File,
    Function,
    ClassMethod,
    Code,
    Imports,
    References,
}

impl ChunkType {
    pub fn as_str(&self) -> &'static str {
        match self {
            ChunkType::Structure => "structure",
            ChunkType::File => "file",
            ChunkType::Function => "function",
            ChunkType::ClassMethod => "class_method",
            ChunkType::Code => "code",
            ChunkType::Imports => "imports",
            ChunkType::References => "references",
        }
    }
}

/// Metadata stored next to each vector.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ChunkMetadata {
    pub chunk_id: String,
    pub chunk_type: ChunkType,
    pub file_path: String,
    pub language: Language,
    pub start_line: usize,
    pub end_line: usize,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub name: Option<String>,
    pub content: String,
}

/// A contiguous, typed span of a file. Line numbers are 0-based, inclusive.
#[derive(Debug, Clone, PartialEq)]
pub struct CodeChunk {
    pub id: String,
    pub file_path: String,
    pub chunk_type: ChunkType,
    pub content: String,
    pub start_line: usize,
    pub end_line: usize,
    pub name: Option<String>,
    /// Enclosing class for definitions nested inside one.
    pub scope: Option<String>,
    pub language: Language,
    embedding: Option<Vec<f32>>,
}

impl CodeChunk {
    /// Chunk covering `start..=end` of a file, id `{file_path}:{start}-{end}`.
    pub fn span(
        file_path: &str,
        chunk_type: ChunkType,
        content: String,
        start_line: usize,
        end_line: usize,
        language: Language,
    ) -> Self {
        Self {
            id: format!("{file_path}:{start_line}-{end_line}"),
            file_path: file_path.to_string(),
            chunk_type,
            content,
            start_line,
            end_line,
            name: None,
            scope: None,
            language,
            embedding: None,
        }
    }

    /// Whole-file chunk, id `file:{file_path}`.
    pub fn file(file_path: &str, content: &str, language: Language) -> Self {
        let end_line = content.lines().count().saturating_sub(1);
        Self {
            id: format!("file:{file_path}"),
            file_path: file_path.to_string(),
            chunk_type: ChunkType::File,
            content: content.to_string(),
            start_line: 0,
            end_line,
            name: None,
            scope: None,
            language,
            embedding: None,
        }
    }

    pub fn structure(text: String) -> Self {
        let end_line = text.lines().count().saturating_sub(1);
        Self {
            id: STRUCTURE_CHUNK_ID.to_string(),
            file_path: String::new(),
            chunk_type: ChunkType::Structure,
            content: text,
            start_line: 0,
            end_line,
            name: None,
            scope: None,
            language: Language::Text,
            embedding: None,
        }
    }

    /// Per-file summary of imports or references, id `{file_path}:{kind}`.
    pub fn summary(
        file_path: &str,
        chunk_type: ChunkType,
        content: String,
        start_line: usize,
        end_line: usize,
        language: Language,
    ) -> Self {
        Self {
            id: format!("{file_path}:{}", chunk_type.as_str()),
            file_path: file_path.to_string(),
            chunk_type,
            content,
            start_line,
            end_line,
            name: None,
            scope: None,
            language,
            embedding: None,
        }
    }

    pub fn with_name(mut self, name: Option<String>) -> Self {
        self.name = name;
        self
    }

    pub fn with_scope(mut self, scope: Option<String>) -> Self {
        self.scope = scope;
        self
    }

    pub fn embedding(&self) -> Option<&[f32]> {
        self.embedding.as_deref()
    }

    /// Attaches an embedding once. Returns false if one was already set.
    pub fn attach_embedding(&mut self, embedding: Vec<f32>) -> bool {
        if self.embedding.is_some() {
            return false;
        }
        self.embedding = Some(embedding);
        true
    }

    pub fn contains_line(&self, line: usize) -> bool {
        self.start_line <= line && line <= self.end_line
    }

    pub fn metadata(&self) -> ChunkMetadata {
        ChunkMetadata {
            chunk_id: self.id.clone(),
            chunk_type: self.chunk_type,
            file_path: self.file_path.clone(),
            language: self.language,
            start_line: self.start_line,
            end_line: self.end_line,
            name: self.name.clone(),
            content: self.content.clone(),
        }
    }
}
