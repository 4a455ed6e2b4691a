use std::collections::{HashMap, HashSet};

use super::{EntryKind, PathEntry};

const BRANCH: &str = "├── ";
const LAST_BRANCH: &str = "└── ";
const INDENT_STEP: usize = 4;

/// Characters used to draw the tree, excluding the entry name.
fn is_glyph_char(c: char) -> bool {
    matches!(c, '│' | '├' | '└' | '─') || c.is_whitespace()
}

fn has_branch(line: &str) -> bool {
    line.contains(BRANCH) || line.contains(LAST_BRANCH)
}

/// A section is a tree when every non-blank line draws an entry, is a bare
/// `│` connector, or is a leading root label ending in `/`.
pub fn is_tree_section(section: &str) -> bool {
    let mut branches = 0usize;
    for (idx, line) in section.lines().enumerate() {
        if line.trim().is_empty() || line.chars().all(is_glyph_char) {
            continue;
        }
        if has_branch(line) {
            branches += 1;
        } else if !(idx == 0 && line.trim_end().ends_with('/')) {
            return false;
        }
    }
    branches > 0
}

struct TreeLine<'a> {
    level: usize,
    name: &'a str,
    has_glyph: bool,
}

fn parse_line(line: &str) -> Option<TreeLine<'_>> {
    if line.trim().is_empty() || line.chars().all(is_glyph_char) {
        return None;
    }

    let glyph = [BRANCH, LAST_BRANCH]
        .iter()
        .filter_map(|g| line.find(g).map(|idx| (idx, g.len())))
        .min_by_key(|(idx, _)| *idx);

    match glyph {
        Some((idx, len)) => Some(TreeLine {
            level: line[..idx].chars().count() / INDENT_STEP,
            name: line[idx + len..].trim(),
            has_glyph: true,
        }),
        None => {
            let indent = line.chars().take_while(|c| is_glyph_char(*c)).count();
            Some(TreeLine {
                level: indent / INDENT_STEP,
                name: line.trim_start_matches(is_glyph_char).trim_end(),
                has_glyph: false,
            })
        }
    }
}

struct PendingEntry {
    name: String,
    level: usize,
    path: String,
    parent_path: String,
    explicit_dir: bool,
}

/// Builds path entries from a tree section.
///
/// The level is clamped to the depth of the current path stack so it always
/// equals the entry's ancestor count. Directory classification is a single
/// pass over a parent -> child-count map.
pub fn parse_tree(section: &str) -> Vec<PathEntry> {
    let mut stack: Vec<String> = Vec::new();
    let mut seen: HashSet<String> = HashSet::new();
    let mut child_counts: HashMap<String, usize> = HashMap::new();
    let mut pending: Vec<PendingEntry> = Vec::new();

    for line in section.lines() {
        let Some(parsed) = parse_line(line) else {
            continue;
        };

        // A glyph-less `name/` line before any entry labels the root.
        if !parsed.has_glyph && pending.is_empty() && parsed.name.ends_with('/') {
            continue;
        }

        let explicit_dir = parsed.name.ends_with('/');
        let name = parsed.name.trim_end_matches('/');
        // A separator inside a name would break level == ancestor count.
        if name.is_empty() || name.contains('/') {
            continue;
        }

        let level = parsed.level.min(stack.len());
        stack.truncate(level);
        let parent_path = stack.join("/");
        stack.push(name.to_string());
        let path = stack.join("/");

        if !seen.insert(path.clone()) {
            continue;
        }
        if !parent_path.is_empty() {
            *child_counts.entry(parent_path.clone()).or_default() += 1;
        }

        pending.push(PendingEntry {
            name: name.to_string(),
            level,
            path,
            parent_path,
            explicit_dir,
        });
    }

    pending
        .into_iter()
        .map(|p| {
            let kind = if p.explicit_dir || child_counts.contains_key(&p.path) {
                EntryKind::Directory
            } else {
                EntryKind::File
            };
            PathEntry {
                name: p.name,
                level: p.level,
                path: p.path,
                parent_path: p.parent_path,
                kind,
            }
        })
        .collect()
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_is_tree_section() {
        assert!(is_tree_section("├── a.py\n└── b.py"));
        assert!(is_tree_section("repo/\n├── a.py\n│\n└── b.py"));
        assert!(!is_tree_section("├── a.py\nprint('hello')"));
        assert!(!is_tree_section("no tree here"));
        assert!(!is_tree_section("│\n│"));
    }

    #[test]
    fn test_nested_levels() {
        let section = "├── src\n│   ├── lib.rs\n│   └── bin\n│       └── main.rs\n└── Cargo.toml";
        let entries = parse_tree(section);
        let summary: Vec<(&str, usize, EntryKind)> = entries
            .iter()
            .map(|e| (e.path.as_str(), e.level, e.kind))
            .collect();
        assert_eq!(
            summary,
            vec![
                ("src", 0, EntryKind::Directory),
                ("src/lib.rs", 1, EntryKind::File),
                ("src/bin", 1, EntryKind::Directory),
                ("src/bin/main.rs", 2, EntryKind::File),
                ("Cargo.toml", 0, EntryKind::File),
            ]
        );
        assert_eq!(entries[3].parent_path, "src/bin");
        assert_eq!(entries[3].name, "main.rs");
    }

    #[test]
    fn test_root_label_is_skipped() {
        let entries = parse_tree("myrepo/\n├── a.py\n└── b.py");
        let paths: Vec<&str> = entries.iter().map(|e| e.path.as_str()).collect();
        assert_eq!(paths, vec!["a.py", "b.py"]);
    }

    #[test]
    fn test_trailing_slash_marks_empty_directory() {
        let entries = parse_tree("├── empty/\n└── file.txt");
        assert_eq!(entries[0].path, "empty");
        assert_eq!(entries[0].kind, EntryKind::Directory);
        assert_eq!(entries[1].kind, EntryKind::File);
    }

    #[test]
    fn test_name_with_separator_is_skipped() {
        let entries = parse_tree("├── src/lib.rs\n├── src/\n└── main.rs");
        let paths: Vec<(&str, usize)> = entries.iter().map(|e| (e.path.as_str(), e.level)).collect();
        assert_eq!(paths, vec![("src", 0), ("main.rs", 0)]);
    }

    #[test]
    fn test_indentation_jump_is_clamped() {
        // Second line claims level 2 with only one ancestor available.
        let entries = parse_tree("├── a\n│       └── deep.py");
        assert_eq!(entries[1].path, "a/deep.py");
        assert_eq!(entries[1].level, 1);
        assert_eq!(entries[0].kind, EntryKind::Directory);
    }

    #[test]
    fn test_duplicate_paths_are_dropped() {
        let entries = parse_tree("├── a.py\n├── a.py\n└── b.py");
        assert_eq!(entries.len(), 2);
    }
}
