use hunkwise_core::{FileChange, FileStatus, Hunk};

use crate::language::detect_language;

const FILE_SEPARATOR: &str = "diff --git ";
const DEV_NULL: &str = "/dev/null";

/// Parse unified diff text (as produced by `git diff`) into [`FileChange`] entries.
///
/// Never fails. Text before the first `diff --git ` header is ignored, and a
/// section whose header yields no path is skipped. Heuristic fields are left
/// at their defaults; run [`crate::risk::analyze`] to fill them.
///
/// # Examples
///
/// ```
/// use hunkwise_core::FileStatus;
/// use hunkwise_diff::parser::parse_diff;
///
/// let diff = "diff --git a/hello.rs b/hello.rs\n\
///             --- a/hello.rs\n\
///             +++ b/hello.rs\n\
///             @@ -1,3 +1,4 @@\n\
///              fn main() {\n\
///             +    println!(\"hello\");\n\
///              }\n";
/// let files = parse_diff(diff);
/// assert_eq!(files.len(), 1);
/// assert_eq!(files[0].status, FileStatus::Modified);
/// assert_eq!(files[0].language, "rust");
/// assert_eq!(files[0].lines_added, 1);
///
/// assert!(parse_diff("").is_empty());
/// ```
pub fn parse_diff(input: &str) -> Vec<FileChange> {
    split_sections(input)
        .iter()
        .filter_map(|section| parse_section(section))
        .collect()
}

fn split_sections(input: &str) -> Vec<Vec<&str>> {
    let mut sections = Vec::new();
    let mut current: Option<Vec<&str>> = None;

    for line in input.lines() {
        if line.starts_with(FILE_SEPARATOR) {
            sections.extend(current.take());
            current = Some(vec![line]);
        } else if let Some(section) = current.as_mut() {
            section.push(line);
        }
    }
    sections.extend(current);
    sections
}

fn parse_section(lines: &[&str]) -> Option<FileChange> {
    let header = lines.first()?.strip_prefix(FILE_SEPARATOR)?;
    let (mut old_path, mut path) = header_paths(header)?;

    let mut status = FileStatus::Modified;
    let mut body_start = None;

    for (idx, line) in lines.iter().enumerate().skip(1) {
        if line.starts_with("@@") {
            body_start = Some(idx);
            break;
        }
        if line.starts_with("Binary files ") || line.starts_with("GIT binary patch") {
            status = FileStatus::Binary;
            body_start = Some(idx);
            break;
        }
        if line.starts_with("new file") {
            status = FileStatus::Added;
        } else if line.starts_with("deleted file") {
            status = FileStatus::Deleted;
        } else if let Some(from) = line.strip_prefix("rename from ") {
            status = FileStatus::Renamed;
            old_path = unquote(from).to_string();
        } else if let Some(to) = line.strip_prefix("rename to ") {
            path = unquote(to).to_string();
        }
    }

    if path.is_empty() {
        return None;
    }

    let body: &[&str] = match body_start {
        Some(idx) => &lines[idx..],
        None => &[],
    };
    let hunks = parse_hunks(body);
    let mut file = FileChange::new(path, status);
    file.old_path = (!old_path.is_empty() && old_path != file.path).then_some(old_path);
    file.language = detect_language(&file.path).to_string();
    file.lines_added = hunks.iter().map(|h| h.lines_added).sum();
    file.lines_removed = hunks.iter().map(|h| h.lines_removed).sum();
    file.raw_diff = body.join("\n");
    file.hunks = hunks;
    Some(file)
}

fn parse_hunks(body: &[&str]) -> Vec<Hunk> {
    let mut hunks = Vec::new();
    let mut current: Option<Hunk> = None;

    for line in body {
        if line.starts_with("@@") {
            hunks.extend(current.take());
            current = Some(Hunk {
                header: line.to_string(),
                content: String::new(),
                lines_added: 0,
                lines_removed: 0,
                summary: None,
            });
            continue;
        }

        let Some(hunk) = current.as_mut() else {
            continue;
        };
        hunk.content.push_str(line);
        hunk.content.push('\n');
        if line.starts_with('+') && !line.starts_with("+++") {
            hunk.lines_added += 1;
        } else if line.starts_with('-') && !line.starts_with("---") {
            hunk.lines_removed += 1;
        }
    }
    hunks.extend(current);
    hunks
}

/// Split the remainder of a `diff --git ` line into (old, new) paths.
fn header_paths(header: &str) -> Option<(String, String)> {
    let header = header.trim();

    if let Some(quoted) = header.strip_prefix('"') {
        let end = quoted.find('"')?;
        let old = &quoted[..end];
        let new = quoted[end + 1..].trim();
        return Some((normalize_path(old), normalize_path(new)));
    }

    if header.starts_with("a/") {
        // Identical paths split exactly in half, which survives spaces in names.
        if header.len() > 5 && (header.len() - 1) % 2 == 0 {
            let half = (header.len() - 1) / 2;
            if header.is_char_boundary(half) && header.is_char_boundary(half + 1) {
                let (old, new) = (&header[..half], &header[half + 1..]);
                if new.starts_with("b/") && old.get(2..) == new.get(2..) {
                    return Some((normalize_path(old), normalize_path(new)));
                }
            }
        }
        if let Some(idx) = header.find(" b/") {
            return Some((normalize_path(&header[..idx]), normalize_path(&header[idx + 1..])));
        }
    }

    let mut fields = header.split_whitespace();
    let old = fields.next()?;
    let new = fields.next()?;
    Some((normalize_path(old), normalize_path(new)))
}

/// Drop the leading prefix segment (`a/`, `b/`, ...) but keep `/dev/null` as is.
fn normalize_path(raw: &str) -> String {
    let path = unquote(raw);
    if path == DEV_NULL {
        return path.to_string();
    }
    match path.find('/') {
        Some(idx) if idx + 1 < path.len() => path[idx + 1..].to_string(),
        _ => path.to_string(),
    }
}

fn unquote(raw: &str) -> &str {
    raw.trim().trim_matches('"')
}
