//! Workspace file operations: listing, reading, glob search, creation,
//! deletion, and the two modify strategies (line-range splice and
//! anchored replacement).

use anyhow::{Context, Result, bail};
use std::path::Path;
use tracing::info;

/// Reads larger than this are truncated with a notice.
const READ_CEILING_BYTES: usize = 100 * 1024;
/// Glob searches report at most this many matches.
const SEARCH_MATCH_CAP: usize = 50;
/// Lines of surrounding context shown in a modify preview.
const PREVIEW_CONTEXT_LINES: usize = 3;

/// List a directory's entries, directories first and tagged `[DIR]`.
pub fn list_files(path: &str) -> Result<String> {
    let dir = Path::new(path);
    if !dir.is_dir() {
        bail!("Not a directory: {}", path);
    }
    let mut dirs = Vec::new();
    let mut files = Vec::new();
    for entry in std::fs::read_dir(dir).with_context(|| format!("Failed to list {}", path))? {
        let entry = entry?;
        let name = entry.file_name().to_string_lossy().into_owned();
        if entry.file_type()?.is_dir() {
            dirs.push(format!("[DIR] {}", name));
        } else {
            files.push(name);
        }
    }
    dirs.sort();
    files.sort();
    dirs.extend(files);
    if dirs.is_empty() {
        return Ok(format!("Directory {} is empty", path));
    }
    Ok(dirs.join("\n"))
}

/// Read a file, truncating past the size ceiling so a stray binary or
/// log file cannot flood the conversation.
pub fn read_file(path: &str) -> Result<String> {
    let content =
        std::fs::read_to_string(path).with_context(|| format!("Failed to read {}", path))?;
    if content.len() > READ_CEILING_BYTES {
        let mut end = READ_CEILING_BYTES;
        while !content.is_char_boundary(end) {
            end -= 1;
        }
        return Ok(format!(
            "{}\n... (truncated, file is {} bytes)",
            &content[..end],
            content.len()
        ));
    }
    Ok(content)
}

/// Glob search for files, capped so wide patterns stay readable.
pub fn search_files(pattern: &str) -> Result<String> {
    let mut matches = Vec::new();
    for entry in glob::glob(pattern).with_context(|| format!("Invalid pattern: {}", pattern))? {
        if let Ok(path) = entry {
            matches.push(path.display().to_string());
            if matches.len() >= SEARCH_MATCH_CAP {
                matches.push(format!("... (stopped at {} matches)", SEARCH_MATCH_CAP));
                break;
            }
        }
    }
    if matches.is_empty() {
        return Ok(format!("No files match {}", pattern));
    }
    Ok(matches.join("\n"))
}

/// Create a file, making parent directories as needed.
pub fn create_file(path: &str, content: &str) -> Result<String> {
    if let Some(parent) = Path::new(path).parent() {
        if !parent.as_os_str().is_empty() {
            std::fs::create_dir_all(parent)
                .with_context(|| format!("Failed to create {}", parent.display()))?;
        }
    }
    std::fs::write(path, content).with_context(|| format!("Failed to write {}", path))?;
    info!("Created {}", path);
    Ok(format!("Created {} ({} bytes)", path, content.len()))
}

pub fn delete_file(path: &str) -> Result<String> {
    std::fs::remove_file(path).with_context(|| format!("Failed to delete {}", path))?;
    info!("Deleted {}", path);
    Ok(format!("Deleted {}", path))
}

/// Preview a line-range replacement: the lines that would be removed,
/// with a few lines of surrounding context, without touching the file.
pub fn preview_line_range(path: &str, start: usize, end: usize, replacement: &str) -> Result<String> {
    let content = read_for_edit(path)?;
    let lines: Vec<&str> = content.lines().collect();
    check_range(start, end, lines.len())?;

    let ctx_start = start.saturating_sub(PREVIEW_CONTEXT_LINES + 1);
    let ctx_end = (end + PREVIEW_CONTEXT_LINES).min(lines.len());

    let mut preview = String::new();
    preview.push_str(&format!(
        "Proposed change to {} (lines {}-{}):\n",
        path, start, end
    ));
    for (idx, line) in lines[ctx_start..ctx_end].iter().enumerate() {
        let number = ctx_start + idx + 1;
        let marker = if number >= start && number <= end { "-" } else { " " };
        preview.push_str(&format!("{} {:>4} | {}\n", marker, number, line));
    }
    preview.push_str("Replacement:\n");
    for line in replacement.lines() {
        preview.push_str(&format!("+      | {}\n", line));
    }
    preview.push_str("Confirm to apply.");
    Ok(preview)
}

/// Apply a line-range replacement. `start` and `end` are 1-based and
/// inclusive.
pub fn apply_line_range(path: &str, start: usize, end: usize, replacement: &str) -> Result<String> {
    let content = read_for_edit(path)?;
    let lines: Vec<&str> = content.lines().collect();
    check_range(start, end, lines.len())?;

    let mut out: Vec<&str> = Vec::with_capacity(lines.len());
    out.extend_from_slice(&lines[..start - 1]);
    out.extend(replacement.lines());
    out.extend_from_slice(&lines[end..]);

    let mut new_content = out.join("\n");
    if content.ends_with('\n') {
        new_content.push('\n');
    }
    std::fs::write(path, new_content).with_context(|| format!("Failed to write {}", path))?;
    info!("Modified {} lines {}-{}", path, start, end);
    Ok(format!("Replaced lines {}-{} in {}", start, end, path))
}

/// Replace an anchored snippet. Line endings are normalized to `\n` on
/// both sides before matching; the anchor must occur exactly once or
/// the file is left untouched.
pub fn apply_anchor(path: &str, anchor: &str, replacement: &str) -> Result<String> {
    let content = read_for_edit(path)?;
    let normalized = content.replace("\r\n", "\n");
    let anchor = anchor.replace("\r\n", "\n");

    let count = normalized.matches(&anchor).count();
    match count {
        0 => bail!("Target content not found in {}, aborted", path),
        1 => {}
        n => bail!(
            "Target content is ambiguous in {} ({} occurrences), aborted",
            path,
            n
        ),
    }

    let new_content = normalized.replacen(&anchor, replacement, 1);
    std::fs::write(path, new_content).with_context(|| format!("Failed to write {}", path))?;
    info!("Modified {} via anchored replacement", path);
    Ok(format!("Updated {}", path))
}

fn read_for_edit(path: &str) -> Result<String> {
    std::fs::read_to_string(path).with_context(|| format!("Failed to read {}", path))
}

fn check_range(start: usize, end: usize, total: usize) -> Result<()> {
    if start == 0 || end < start || end > total {
        bail!(
            "Invalid line range {}-{} (file has {} lines)",
            start,
            end,
            total
        );
    }
    Ok(())
}
