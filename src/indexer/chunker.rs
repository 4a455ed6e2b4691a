//! Indentation-based chunking.
//!
//! The heuristic tracks a single context level (code, function or class).
//! Definition lines open a new block; any other non-blank line at column
//! zero closes the current block and is included in it, so top-level
//! statements become one-line code chunks. Multi-line statements and
//! decorators at column zero are therefore misclassified as block ends, and
//! nested definitions are not distinguished from their parents.
use std::sync::LazyLock;

use regex::Regex;

use super::chunk::{ChunkType, CodeChunk};
use super::languages::Language;

static FUNCTION_DEF: LazyLock<Regex> = LazyLock::new(|| {
    Regex::new(
        r"^\s*(?:(?:pub(?:\([^)]*\))?|export|default|async|static|public|private|protected|unsafe|const)\s+)*(?:def|fn|func|function\*?)\s+(?:\([^)]*\)\s*)?([A-Za-z_$][\w$]*)",
    )
    .unwrap()
});

static CLASS_DEF: LazyLock<Regex> = LazyLock::new(|| {
    Regex::new(
        r"^\s*(?:(?:pub(?:\([^)]*\))?|export|default|abstract|public|final|data|sealed)\s+)*(?:class|struct|trait|interface|enum)\s+([A-Za-z_$][\w$]*)",
    )
    .unwrap()
});

/// Splits one file into chunks.
pub trait ChunkStrategy: Send + Sync {
    /// Returns the whole-file chunk followed by its sub-chunks, or nothing
    /// for blank content.
    fn chunk(&self, file_path: &str, content: &str, language: Language) -> Vec<CodeChunk>;
}

/// Picks the chunking strategy for a language.
///
/// Every language currently shares [`IndentHeuristic`].
pub fn strategy_for(_language: Language) -> &'static dyn ChunkStrategy {
    &IndentHeuristic
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
enum Context {
    Code,
    Function,
    Class,
}

impl Context {
    fn chunk_type(self) -> ChunkType {
        match self {
            Context::Code => ChunkType::Code,
            Context::Function => ChunkType::Function,
            Context::Class => ChunkType::ClassMethod,
        }
    }
}

struct Block<'a> {
    start: usize,
    lines: Vec<&'a str>,
    context: Context,
    name: Option<String>,
    scope: Option<String>,
}

impl<'a> Block<'a> {
    fn new() -> Self {
        Self {
            start: 0,
            lines: Vec::new(),
            context: Context::Code,
            name: None,
            scope: None,
        }
    }

    fn open(&mut self, line_no: usize, line: &'a str, context: Context, name: Option<String>) {
        self.start = line_no;
        self.lines = vec![line];
        self.context = context;
        self.name = name;
        self.scope = None;
    }

    fn push(&mut self, line_no: usize, line: &'a str) {
        if self.lines.is_empty() {
            self.start = line_no;
        }
        self.lines.push(line);
    }

    /// Emits the gathered lines as a chunk unless they are all blank.
    fn flush(&mut self, file_path: &str, language: Language, out: &mut Vec<CodeChunk>) {
        let lines = std::mem::take(&mut self.lines);
        if lines.iter().all(|l| l.trim().is_empty()) {
            return;
        }
        let end = self.start + lines.len() - 1;
        let chunk = CodeChunk::span(
            file_path,
            self.context.chunk_type(),
            lines.join("\n"),
            self.start,
            end,
            language,
        )
        .with_name(self.name.clone())
        .with_scope(self.scope.clone());
        out.push(chunk);
    }

    fn reset(&mut self) {
        self.context = Context::Code;
        self.name = None;
        self.scope = None;
    }
}

fn is_indented(line: &str) -> bool {
    line.starts_with(char::is_whitespace)
}

fn captured_name(re: &Regex, line: &str) -> Option<Option<String>> {
    re.captures(line)
        .map(|caps| caps.get(1).map(|m| m.as_str().to_string()))
}

/// Indentation heuristic shared by all languages.
#[derive(Debug, Default, Clone, Copy)]
pub struct IndentHeuristic;

impl ChunkStrategy for IndentHeuristic {
    fn chunk(&self, file_path: &str, content: &str, language: Language) -> Vec<CodeChunk> {
        if content.trim().is_empty() {
            return Vec::new();
        }

        let mut chunks = vec![CodeChunk::file(file_path, content, language)];
        let mut block = Block::new();
        let mut current_class: Option<String> = None;

        for (i, line) in content.lines().enumerate() {
            if let Some(name) = captured_name(&FUNCTION_DEF, line) {
                block.flush(file_path, language, &mut chunks);
                block.open(i, line, Context::Function, name);
                if is_indented(line) {
                    block.scope = current_class.clone();
                } else {
                    current_class = None;
                }
                continue;
            }

            if let Some(name) = captured_name(&CLASS_DEF, line) {
                block.flush(file_path, language, &mut chunks);
                current_class = name.clone();
                block.open(i, line, Context::Class, name);
                continue;
            }

            block.push(i, line);

            let dedent = !line.trim().is_empty() && !is_indented(line);
            if dedent {
                block.flush(file_path, language, &mut chunks);
                block.reset();
                current_class = None;
            }
        }

        block.flush(file_path, language, &mut chunks);
        chunks
    }
}
