use super::BOUNDARY_LEN;

/// Returns true for a line made of exactly [`BOUNDARY_LEN`] dashes.
pub fn is_boundary(line: &str) -> bool {
    let trimmed = line.trim();
    trimmed.len() == BOUNDARY_LEN && trimmed.bytes().all(|b| b == b'-')
}

/// Splits a dump into sections on boundary lines.
///
/// Leading and trailing blank lines of each section are dropped, inner
/// indentation is kept. Empty sections are skipped.
pub fn split_sections(raw: &str) -> Vec<String> {
    let mut sections = Vec::new();
    let mut current: Vec<&str> = Vec::new();

    for line in raw.lines() {
        if is_boundary(line) {
            push_section(&mut sections, &current);
            current.clear();
        } else {
            current.push(line);
        }
    }
    push_section(&mut sections, &current);

    sections
}

fn push_section(sections: &mut Vec<String>, lines: &[&str]) {
    let Some(first) = lines.iter().position(|l| !l.trim().is_empty()) else {
        return;
    };
    let last = lines
        .iter()
        .rposition(|l| !l.trim().is_empty())
        .unwrap_or(first);
    sections.push(lines[first..=last].join("\n"));
}

/// If the section is a file header, returns the normalized file path.
///
/// A header is a single line ending in `:`; the colon and any leading `/`
/// are stripped.
pub fn header_path(section: &str) -> Option<String> {
    let line = section.trim();
    if line.contains('\n') {
        return None;
    }
    let path = line.strip_suffix(':')?.trim().trim_start_matches('/');
    if path.is_empty() {
        return None;
    }
    Some(path.to_string())
}
