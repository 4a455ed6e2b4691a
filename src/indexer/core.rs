use std::collections::HashMap;

use tracing::{debug, warn};

use super::chunk::{ChunkType, CodeChunk};
use super::chunker::strategy_for;
use super::languages::Language;
use super::relations::{Dependency, DependencyExtractor, DependencyKind, ModuleResolver};
use crate::dump::RepoStructure;

/// Where a dependency edge points.
#[derive(Debug, Clone, PartialEq, Eq, Hash)]
pub enum LinkTarget {
    /// A chunk of this repository.
    Chunk(String),
    /// An import or reference that did not resolve to any chunk.
    Symbol(String),
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct DependencyLink {
    pub source: String,
    pub target: LinkTarget,
    pub kind: DependencyKind,
}

/// Output of one indexing pass.
#[derive(Debug, Default)]
pub struct IndexedRepo {
    pub chunks: Vec<CodeChunk>,
    pub links: Vec<DependencyLink>,
}

#[cfg(test)]
impl IndexedRepo {
    fn chunk(&self, id: &str) -> Option<&CodeChunk> {
        self.chunks.iter().find(|c| c.id == id)
    }
}

/// Turns a parsed dump into chunks and dependency links.
pub struct RepoIndexer {
    extractor: Option<DependencyExtractor>,
}

impl Default for RepoIndexer {
    fn default() -> Self {
        Self::new()
    }
}

impl RepoIndexer {
    pub fn new() -> Self {
        let extractor = match DependencyExtractor::new() {
            Ok(e) => Some(e),
            Err(e) => {
                warn!("Dependency extraction disabled: {}", e);
                None
            }
        };
        Self { extractor }
    }

    /// Chunks every file (tree order, then header-only files), extracts
    /// dependencies and appends the structure chunk.
    pub fn index(&self, structure: &RepoStructure) -> IndexedRepo {
        let files = structure.files_in_order();
        let mut repo = IndexedRepo::default();
        let mut per_file: Vec<(usize, usize)> = Vec::with_capacity(files.len());

        for file in &files {
            let language = Language::from_path(&file.path);
            let start = repo.chunks.len();
            repo.chunks
                .extend(strategy_for(language).chunk(&file.path, &file.text, language));
            per_file.push((start, repo.chunks.len()));
        }

        if let Some(extractor) = &self.extractor {
            let resolver = ModuleResolver::new(
                files
                    .iter()
                    .zip(&per_file)
                    .filter(|(_, (start, end))| end > start)
                    .map(|(f, _)| f.path.as_str()),
            );
            let named = NamedChunks::new(&repo.chunks);

            let mut summaries = Vec::new();
            for (file, &(start, end)) in files.iter().zip(&per_file) {
                if start == end {
                    continue;
                }
                let language = Language::from_path(&file.path);
                if !extractor.supports(language) {
                    continue;
                }
                let deps = extractor.extract(&file.text, language);
                if deps.is_empty() {
                    continue;
                }
                let file_chunks = &repo.chunks[start..end];
                let (chunks, links) =
                    link_file(&file.path, language, file_chunks, &deps, &resolver, &named);
                summaries.extend(chunks);
                repo.links.extend(links);
            }
            repo.chunks.extend(summaries);
        }

        if !structure.entries.is_empty() {
            repo.chunks
                .push(CodeChunk::structure(structure.structure_text()));
        }

        debug!(
            "Indexed {} files into {} chunks, {} dependency links",
            files.len(),
            repo.chunks.len(),
            repo.links.len()
        );
        repo
    }
}

/// Function and class chunks by defined name, in chunk order.
struct NamedChunks {
    by_name: HashMap<String, Vec<(String, String)>>,
}

impl NamedChunks {
    fn new(chunks: &[CodeChunk]) -> Self {
        let mut by_name: HashMap<String, Vec<(String, String)>> = HashMap::new();
        for chunk in chunks {
            if !matches!(chunk.chunk_type, ChunkType::Function | ChunkType::ClassMethod) {
                continue;
            }
            if let Some(name) = &chunk.name {
                by_name
                    .entry(name.clone())
                    .or_default()
                    .push((chunk.file_path.clone(), chunk.id.clone()));
            }
        }
        Self { by_name }
    }

    /// Prefers a definition in the same file.
    fn resolve(&self, name: &str, from_file: &str) -> Option<&str> {
        let candidates = self.by_name.get(name)?;
        candidates
            .iter()
            .find(|(file, _)| file == from_file)
            .or_else(|| candidates.first())
            .map(|(_, id)| id.as_str())
    }
}

fn link_file(
    file_path: &str,
    language: Language,
    file_chunks: &[CodeChunk],
    deps: &[Dependency],
    resolver: &ModuleResolver,
    named: &NamedChunks,
) -> (Vec<CodeChunk>, Vec<DependencyLink>) {
    let mut summaries = Vec::new();
    let mut links = Vec::new();

    for (kind, chunk_type) in [
        (DependencyKind::Imports, ChunkType::Imports),
        (DependencyKind::References, ChunkType::References),
    ] {
        let of_kind: Vec<&Dependency> = deps.iter().filter(|d| d.kind == kind).collect();
        let (Some(first), Some(last)) = (of_kind.first(), of_kind.last()) else {
            continue;
        };

        let content = format!(
            "{} in {}:\n{}",
            kind.as_str(),
            file_path,
            of_kind
                .iter()
                .map(|d| d.name.as_str())
                .collect::<Vec<_>>()
                .join("\n")
        );
        let summary =
            CodeChunk::summary(file_path, chunk_type, content, first.line, last.line, language);

        for dep in &of_kind {
            let target = match kind {
                DependencyKind::Imports => resolver
                    .resolve(&dep.name, file_path, language)
                    .map(|path| LinkTarget::Chunk(format!("file:{path}"))),
                DependencyKind::References => named
                    .resolve(&dep.name, file_path)
                    .map(|id| LinkTarget::Chunk(id.to_string())),
            }
            .unwrap_or_else(|| LinkTarget::Symbol(dep.name.clone()));

            for source in site_chunks(file_chunks, dep.line) {
                if target == LinkTarget::Chunk(source.to_string()) {
                    continue;
                }
                links.push(DependencyLink {
                    source: source.to_string(),
                    target: target.clone(),
                    kind,
                });
            }
            links.push(DependencyLink {
                source: summary.id.clone(),
                target,
                kind,
            });
        }

        summaries.push(summary);
    }

    (summaries, links)
}

/// The file chunk plus the innermost sub-chunk containing `line`.
fn site_chunks(file_chunks: &[CodeChunk], line: usize) -> Vec<&str> {
    let mut sources = Vec::with_capacity(2);
    if let Some(file) = file_chunks.iter().find(|c| c.chunk_type == ChunkType::File) {
        sources.push(file.id.as_str());
    }
    if let Some(inner) = file_chunks
        .iter()
        .filter(|c| c.chunk_type != ChunkType::File && c.contains_line(line))
        .min_by_key(|c| c.end_line - c.start_line)
    {
        sources.push(inner.id.as_str());
    }
    sources
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::dump::{BOUNDARY_LEN, parse_dump};
    use crate::indexer::chunk::STRUCTURE_CHUNK_ID;

    fn two_file_dump() -> String {
        let b = "-".repeat(BOUNDARY_LEN);
        format!(
            "├── a.py\n└── b.py\n\
             {b}\na.py:\n{b}\nimport b\n\ndef run():\n    return b.helper()\n\
             {b}\nb.py:\n{b}\ndef helper():\n    return 42\n"
        )
    }

    #[test]
    fn test_chunk_order_and_structure_last() {
        let repo = RepoIndexer::new().index(&parse_dump(&two_file_dump()));
        let ids: Vec<&str> = repo.chunks.iter().map(|c| c.id.as_str()).collect();

        assert_eq!(ids[0], "file:a.py");
        assert!(ids.contains(&"file:b.py"));
        assert!(ids.contains(&"a.py:imports"));
        assert!(ids.contains(&"a.py:references"));
        assert_eq!(ids.last(), Some(&STRUCTURE_CHUNK_ID));

        let structure = repo.chunk(STRUCTURE_CHUNK_ID).unwrap();
        assert_eq!(structure.content, "a.py (file)\nb.py (file)");
    }

    #[test]
    fn test_import_resolves_to_file_chunk() {
        let repo = RepoIndexer::new().index(&parse_dump(&two_file_dump()));

        let import_links: Vec<&DependencyLink> = repo
            .links
            .iter()
            .filter(|l| l.kind == DependencyKind::Imports)
            .collect();
        assert!(import_links.iter().any(|l| l.source == "file:a.py"
            && l.target == LinkTarget::Chunk("file:b.py".to_string())));
        assert!(import_links.iter().any(|l| l.source == "a.py:imports"));
    }

    #[test]
    fn test_reference_resolves_to_named_chunk() {
        let repo = RepoIndexer::new().index(&parse_dump(&two_file_dump()));
        let helper = repo
            .chunks
            .iter()
            .find(|c| c.name.as_deref() == Some("helper"))
            .unwrap();
        let run = repo
            .chunks
            .iter()
            .find(|c| c.name.as_deref() == Some("run"))
            .unwrap();

        assert!(repo.links.iter().any(|l| l.source == run.id
            && l.kind == DependencyKind::References
            && l.target == LinkTarget::Chunk(helper.id.clone())));
    }

    #[test]
    fn test_unresolved_import_becomes_symbol() {
        let b = "-".repeat(BOUNDARY_LEN);
        let dump = format!("└── a.py\n{b}\na.py:\n{b}\nimport requests\n");
        let repo = RepoIndexer::new().index(&parse_dump(&dump));
        assert!(repo
            .links
            .iter()
            .any(|l| l.target == LinkTarget::Symbol("requests".to_string())));
    }

    #[test]
    fn test_ids_are_deterministic() {
        let dump = parse_dump(&two_file_dump());
        let first: Vec<String> = RepoIndexer::new().index(&dump).chunks.into_iter().map(|c| c.id).collect();
        let second: Vec<String> = RepoIndexer::new().index(&dump).chunks.into_iter().map(|c| c.id).collect();
        assert_eq!(first, second);
    }

    #[test]
    fn test_unsupported_files_have_no_links() {
        let b = "-".repeat(BOUNDARY_LEN);
        let dump = format!("└── README.md\n{b}\nREADME.md:\n{b}\n# Title\nimport nothing\n");
        let repo = RepoIndexer::new().index(&parse_dump(&dump));
        assert!(repo.links.is_empty());
        assert!(repo.chunk("README.md:imports").is_none());
    }
}
