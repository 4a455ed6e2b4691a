use std::collections::{HashMap, HashSet};

use serde::{Deserialize, Serialize};
use thiserror::Error;
use tracing::debug;
use tree_sitter::{Node, Parser, Query, QueryCursor, StreamingIterator};

use super::languages::{GrammarConfig, Language};

#[derive(Error, Debug)]
pub enum ExtractorError {
    #[error("invalid {language} query: {source}")]
    Query {
        language: Language,
        #[source]
        source: tree_sitter::QueryError,
    },
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum DependencyKind {
    Imports,
    References,
}

impl DependencyKind {
    pub fn as_str(&self) -> &'static str {
        match self {
            DependencyKind::Imports => "imports",
            DependencyKind::References => "references",
        }
    }
}

/// An import or call site found in a file. `line` is 0-based.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Dependency {
    pub name: String,
    pub kind: DependencyKind,
    pub line: usize,
}

const BUILTINS: &[&str] = &[
    // go
    "len", "make", "append", "delete", "panic", "recover", "new", "cap", "copy",
    // python
    "print", "range", "str", "int", "float", "bool", "list", "dict", "set", "tuple", "isinstance",
    "super", "open", "enumerate", "zip", "map", "filter", "sorted", "min", "max", "sum", "any",
    "all", "getattr", "setattr", "hasattr", "type", "format", "join", "split", "strip", "get",
    "items", "keys", "values",
    // js / ts
    "require", "log", "push", "then", "catch", "forEach",
    // rust
    "println", "Some", "Ok", "Err", "unwrap", "expect", "clone", "to_string", "into", "iter",
    "collect", "from",
];

struct LanguageQueries {
    grammar: tree_sitter::Language,
    imports: Query,
    calls: Query,
}

/// Extracts imports and call references with tree-sitter.
pub struct DependencyExtractor {
    queries: HashMap<Language, LanguageQueries>,
}

impl DependencyExtractor {
    pub fn new() -> Result<Self, ExtractorError> {
        let mut queries = HashMap::new();

        for config in GrammarConfig::get_all() {
            let compile = |text: &str| {
                Query::new(&config.grammar, text).map_err(|source| ExtractorError::Query {
                    language: config.language,
                    source,
                })
            };
            let imports = compile(config.import_query)?;
            let calls = compile(config.call_query)?;
            queries.insert(
                config.language,
                LanguageQueries {
                    grammar: config.grammar.clone(),
                    imports,
                    calls,
                },
            );
        }

        Ok(Self { queries })
    }

    pub fn supports(&self, language: Language) -> bool {
        self.queries.contains_key(&language)
    }

    /// Returns the file's dependencies, imports first. Unsupported languages
    /// and unparseable content yield nothing.
    pub fn extract(&self, content: &str, language: Language) -> Vec<Dependency> {
        let Some(queries) = self.queries.get(&language) else {
            return Vec::new();
        };

        let mut parser = Parser::new();
        if let Err(e) = parser.set_language(&queries.grammar) {
            debug!("Grammar for {} unavailable: {}", language, e);
            return Vec::new();
        }
        let Some(tree) = parser.parse(content.as_bytes(), None) else {
            return Vec::new();
        };

        let root = tree.root_node();
        let source = content.as_bytes();
        let mut deps = extract_with_query(root, source, &queries.imports, DependencyKind::Imports);
        deps.extend(extract_with_query(
            root,
            source,
            &queries.calls,
            DependencyKind::References,
        ));
        deps
    }
}

fn extract_with_query(
    root: Node,
    source: &[u8],
    query: &Query,
    kind: DependencyKind,
) -> Vec<Dependency> {
    let mut cursor = QueryCursor::new();
    let mut deps = Vec::new();
    let mut seen = HashSet::new();

    let mut matches = cursor.matches(query, root, source);
    while let Some(m) = matches.next() {
        for cap in m.captures {
            let Ok(text) = cap.node.utf8_text(source) else {
                continue;
            };
            let name = text
                .trim()
                .trim_matches(|c| c == '"' || c == '\'' || c == '`')
                .to_string();
            if name.is_empty() {
                continue;
            }
            if kind == DependencyKind::References && BUILTINS.contains(&name.as_str()) {
                continue;
            }
            if seen.insert(name.clone()) {
                deps.push(Dependency {
                    name,
                    kind,
                    line: cap.node.start_position().row,
                });
            }
        }
    }

    deps.sort_by_key(|d| d.line);
    deps
}

const INDEX_STEMS: &[&str] = &["__init__", "index", "mod"];

/// Maps import specifiers to repository files by path-suffix matching.
pub struct ModuleResolver {
    by_key: HashMap<String, String>,
}

impl ModuleResolver {
    /// Builds the lookup from file paths; earlier paths win on conflicts.
    pub fn new<'a>(paths: impl IntoIterator<Item = &'a str>) -> Self {
        let mut by_key: HashMap<String, String> = HashMap::new();

        for path in paths {
            let stem_path = strip_extension(path);
            for key in suffixes(stem_path) {
                by_key.entry(key).or_insert_with(|| path.to_string());
            }

            let (dir, stem) = match stem_path.rsplit_once('/') {
                Some((dir, stem)) => (dir, stem),
                None => ("", stem_path),
            };
            let package_file =
                INDEX_STEMS.contains(&stem) || Language::from_path(path) == Language::Go;
            if package_file && !dir.is_empty() {
                for key in suffixes(dir) {
                    by_key.entry(key).or_insert_with(|| path.to_string());
                }
            }
        }

        Self { by_key }
    }

    /// Resolves an import found in `from_file`. Never resolves to `from_file`.
    pub fn resolve(&self, import: &str, from_file: &str, language: Language) -> Option<&str> {
        let candidate = normalize_import(import, from_file, language);
        let mut segments: Vec<&str> = candidate.split('/').filter(|s| !s.is_empty()).collect();

        // Drop trailing segments so `pkg.mod.Symbol` still finds `pkg/mod`.
        while !segments.is_empty() {
            let key = segments.join("/");
            if let Some(path) = self.by_key.get(&key) {
                if path != from_file {
                    return Some(path.as_str());
                }
            }
            for start in 1..segments.len() {
                let key = segments[start..].join("/");
                if let Some(path) = self.by_key.get(&key) {
                    if path != from_file {
                        return Some(path.as_str());
                    }
                }
            }
            segments.pop();
        }

        None
    }
}

fn strip_extension(path: &str) -> &str {
    let file_start = path.rfind('/').map(|i| i + 1).unwrap_or(0);
    match path[file_start..].rfind('.') {
        Some(dot) if dot > 0 => &path[..file_start + dot],
        _ => path,
    }
}

fn suffixes(path: &str) -> Vec<String> {
    let segments: Vec<&str> = path.split('/').filter(|s| !s.is_empty()).collect();
    (0..segments.len())
        .map(|start| segments[start..].join("/"))
        .collect()
}

/// Converts an import specifier into a slash-separated, extension-less path.
fn normalize_import(import: &str, from_file: &str, language: Language) -> String {
    match language {
        Language::Python => {
            let trimmed = import.trim_start_matches('.');
            let dots = import.len() - trimmed.len();
            let module = trimmed.replace('.', "/");
            if dots == 0 {
                return module;
            }
            // `.mod` is relative to the importing file's package.
            let mut base: Vec<&str> = parent_dir(from_file).split('/').filter(|s| !s.is_empty()).collect();
            for _ in 1..dots {
                base.pop();
            }
            join_segments(base, &module)
        }
        Language::JavaScript | Language::TypeScript => {
            if import.starts_with('.') {
                let base: Vec<&str> = parent_dir(from_file).split('/').filter(|s| !s.is_empty()).collect();
                join_segments(base, strip_extension(import))
            } else {
                strip_extension(import).to_string()
            }
        }
        Language::Rust => {
            let mut segments: Vec<&str> = import
                .trim_end_matches("::*")
                .split("::")
                .filter(|s| !s.is_empty())
                .collect();
            while matches!(segments.first(), Some(&"crate") | Some(&"self") | Some(&"super")) {
                segments.remove(0);
            }
            segments.join("/")
        }
        _ => import.to_string(),
    }
}

fn parent_dir(path: &str) -> &str {
    path.rsplit_once('/').map(|(dir, _)| dir).unwrap_or("")
}

fn join_segments<'a>(mut base: Vec<&'a str>, relative: &'a str) -> String {
    for segment in relative.split('/') {
        match segment {
            "" | "." => {}
            ".." => {
                base.pop();
            }
            other => base.push(other),
        }
    }
    base.join("/")
}
