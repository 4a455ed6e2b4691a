//! Parser for flattened repository dumps.
//!
//! A dump is a single text blob split into sections by boundary lines made of
//! exactly [`BOUNDARY_LEN`] dashes. One section (before the first file header)
//! draws the directory tree with `├── ` / `└── ` / `│   ` glyphs, four columns
//! per level. Every other section is either a file header (a single line
//! ending in `:`) or raw content belonging to the most recent header.
//!
//! ```text
//! ├── src
//! │   └── main.py
//! └── README.md
//! --------------------------------------------------------------------------------
//! /src/main.py:
//! --------------------------------------------------------------------------------
//! print("hi")
//! ```
pub mod sections;
pub mod tree;

use std::collections::HashMap;

use serde::{Deserialize, Serialize};
use tracing::{debug, warn};

/// Length of a section boundary line.
pub const BOUNDARY_LEN: usize = 80;

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum EntryKind {
    File,
    Directory,
}

impl EntryKind {
    pub fn as_str(&self) -> &'static str {
        match self {
            EntryKind::File => "file",
            EntryKind::Directory => "directory",
        }
    }
}

/// One line of the directory tree, resolved to its full path.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct PathEntry {
    pub name: String,
    /// Number of ancestors (0 for top-level entries).
    pub level: usize,
    pub path: String,
    /// Empty for top-level entries.
    pub parent_path: String,
    pub kind: EntryKind,
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct FileContent {
    pub path: String,
    pub text: String,
}

/// Parsed dump: tree entries in drawing order plus file bodies in header order.
#[derive(Debug, Clone, Default)]
pub struct RepoStructure {
    pub entries: Vec<PathEntry>,
    files: Vec<FileContent>,
    file_index: HashMap<String, usize>,
}

impl RepoStructure {
    pub fn is_empty(&self) -> bool {
        self.entries.is_empty() && self.files.is_empty()
    }

    pub fn file_count(&self) -> usize {
        self.files.len()
    }

    #[cfg(test)]
    fn file_content(&self, path: &str) -> Option<&str> {
        self.file_index
            .get(path)
            .map(|&idx| self.files[idx].text.as_str())
    }

    /// Files in tree order first, then files that only appeared as headers.
    pub fn files_in_order(&self) -> Vec<&FileContent> {
        let mut ordered = Vec::with_capacity(self.files.len());
        let mut taken = vec![false; self.files.len()];

        for entry in &self.entries {
            if entry.kind != EntryKind::File {
                continue;
            }
            if let Some(&idx) = self.file_index.get(&entry.path) {
                if !taken[idx] {
                    taken[idx] = true;
                    ordered.push(&self.files[idx]);
                }
            }
        }

        for (idx, file) in self.files.iter().enumerate() {
            if !taken[idx] {
                ordered.push(file);
            }
        }

        ordered
    }

    /// Indented `name (kind)` rendering of the tree.
    pub fn structure_text(&self) -> String {
        self.entries
            .iter()
            .map(|e| format!("{}{} ({})", "  ".repeat(e.level), e.name, e.kind.as_str()))
            .collect::<Vec<_>>()
            .join("\n")
    }

    /// Records a file body; a repeated header replaces the earlier body.
    fn set_content(&mut self, path: String, text: String) {
        if let Some(&idx) = self.file_index.get(&path) {
            self.files[idx].text = text;
            return;
        }
        self.file_index.insert(path.clone(), self.files.len());
        self.files.push(FileContent { path, text });
    }
}

/// Parses a raw dump. Unrecognizable input yields an empty structure.
pub fn parse_dump(raw: &str) -> RepoStructure {
    let mut structure = RepoStructure::default();
    let mut current_file: Option<String> = None;
    let mut buffer: Vec<String> = Vec::new();
    let mut tree_seen = false;

    for section in sections::split_sections(raw) {
        if let Some(path) = sections::header_path(&section) {
            if let Some(prev) = current_file.take() {
                flush_file(&mut structure, prev, &mut buffer);
            }
            current_file = Some(path);
            continue;
        }

        if current_file.is_some() {
            buffer.push(section);
        } else if !tree_seen && tree::is_tree_section(&section) {
            structure.entries = tree::parse_tree(&section);
            tree_seen = true;
        } else {
            debug!("Ignoring section before first file header");
        }
    }

    if let Some(prev) = current_file.take() {
        flush_file(&mut structure, prev, &mut buffer);
    }

    if structure.is_empty() {
        warn!("Dump has no recognizable tree or file headers; structure is empty");
    } else {
        debug!(
            "Parsed dump: {} entries, {} files",
            structure.entries.len(),
            structure.files.len()
        );
    }

    structure
}

fn flush_file(structure: &mut RepoStructure, path: String, buffer: &mut Vec<String>) {
    if buffer.is_empty() {
        return;
    }
    let text = buffer.join("\n");
    buffer.clear();
    structure.set_content(path, text);
}
