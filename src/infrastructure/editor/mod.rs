//! # Structured Editor
//!
//! Structure-aware edits for brace-delimited languages: listing the
//! top-level shape of a file, adding and removing functions and
//! imports, and sorting the import block. Selected per file by
//! extension through [`editor_for`].

use crate::domain::traits::StructuredEditor;
use anyhow::{Context, Result, bail};
use regex::Regex;
use std::path::Path;

/// Pick an editor for a file, or `None` when its language has no
/// structured-edit support.
pub fn editor_for(path: &str) -> Option<Box<dyn StructuredEditor>> {
    let ext = Path::new(path).extension()?.to_str()?;
    match ext {
        "rs" | "ts" | "tsx" | "js" | "jsx" | "mjs" => Some(Box::new(BraceEditor::new())),
        _ => None,
    }
}

/// Editor for languages whose blocks are delimited by braces. Function
/// and import boundaries are recognized syntactically, with bodies
/// consumed by brace counting.
pub struct BraceEditor {
    fn_header: Regex,
    import_line: Regex,
}

impl BraceEditor {
    pub fn new() -> Self {
        Self {
            // Rust and JS/TS function headers, with optional qualifiers.
            fn_header: Regex::new(
                r"^\s*(?:pub(?:\([^)]*\))?\s+)?(?:export\s+)?(?:default\s+)?(?:async\s+)?(?:unsafe\s+)?(?:fn|function)\s+([A-Za-z_][A-Za-z0-9_]*)",
            )
            .expect("valid regex"),
            import_line: Regex::new(r"^\s*(?:use\s+.+;|import\s+.+)\s*$").expect("valid regex"),
        }
    }

    fn read(&self, path: &str) -> Result<String> {
        std::fs::read_to_string(path).with_context(|| format!("Failed to read {}", path))
    }

    fn write(&self, path: &str, content: &str) -> Result<()> {
        std::fs::write(path, content).with_context(|| format!("Failed to write {}", path))
    }

    /// Locate a named function and return its line span, body included.
    fn function_span(&self, lines: &[&str], name: &str) -> Option<(usize, usize)> {
        for (idx, line) in lines.iter().enumerate() {
            let Some(caps) = self.fn_header.captures(line) else {
                continue;
            };
            if caps.get(1).map(|m| m.as_str()) != Some(name) {
                continue;
            }
            // Consume lines until the braces opened by the header balance.
            let mut depth = 0i32;
            let mut opened = false;
            for (offset, body_line) in lines[idx..].iter().enumerate() {
                for ch in body_line.chars() {
                    match ch {
                        '{' => {
                            depth += 1;
                            opened = true;
                        }
                        '}' => depth -= 1,
                        _ => {}
                    }
                }
                if opened && depth <= 0 {
                    return Some((idx, idx + offset));
                }
            }
            return Some((idx, lines.len() - 1));
        }
        None
    }

    /// Index just past the last import line, where new imports go.
    fn import_block_end(&self, lines: &[&str]) -> usize {
        let mut end = 0;
        for (idx, line) in lines.iter().enumerate() {
            if self.import_line.is_match(line) {
                end = idx + 1;
            }
        }
        end
    }
}

impl Default for BraceEditor {
    fn default() -> Self {
        Self::new()
    }
}

impl StructuredEditor for BraceEditor {
    fn list_structure(&self, path: &str) -> Result<String> {
        let content = self.read(path)?;
        let mut entries = Vec::new();
        for (idx, line) in content.lines().enumerate() {
            if self.import_line.is_match(line) {
                entries.push(format!("{:>4}: import {}", idx + 1, line.trim()));
            } else if let Some(caps) = self.fn_header.captures(line) {
                if let Some(name) = caps.get(1) {
                    entries.push(format!("{:>4}: fn {}", idx + 1, name.as_str()));
                }
            }
        }
        if entries.is_empty() {
            return Ok(format!("No recognizable structure in {}", path));
        }
        Ok(entries.join("\n"))
    }

    fn add_function(&self, path: &str, function_code: &str) -> Result<()> {
        let mut content = self.read(path)?;
        if !content.is_empty() && !content.ends_with('\n') {
            content.push('\n');
        }
        content.push('\n');
        content.push_str(function_code.trim_end());
        content.push('\n');
        self.write(path, &content)
    }

    fn remove_function(&self, path: &str, function_name: &str) -> Result<()> {
        let content = self.read(path)?;
        let lines: Vec<&str> = content.lines().collect();
        let Some((start, end)) = self.function_span(&lines, function_name) else {
            bail!("Function '{}' not found in {}", function_name, path);
        };
        let mut out: Vec<&str> = Vec::new();
        out.extend_from_slice(&lines[..start]);
        out.extend_from_slice(&lines[end + 1..]);
        let mut new_content = out.join("\n");
        if content.ends_with('\n') {
            new_content.push('\n');
        }
        self.write(path, &new_content)
    }

    fn add_import(&self, path: &str, import_statement: &str) -> Result<()> {
        let content = self.read(path)?;
        let statement = import_statement.trim();
        if content.lines().any(|l| l.trim() == statement) {
            return Ok(());
        }
        let lines: Vec<&str> = content.lines().collect();
        let insert_at = self.import_block_end(&lines);
        let mut out: Vec<&str> = Vec::new();
        out.extend_from_slice(&lines[..insert_at]);
        out.push(statement);
        out.extend_from_slice(&lines[insert_at..]);
        let mut new_content = out.join("\n");
        if content.ends_with('\n') || content.is_empty() {
            new_content.push('\n');
        }
        self.write(path, &new_content)
    }

    fn remove_import(&self, path: &str, module_path: &str) -> Result<()> {
        let content = self.read(path)?;
        let mut removed = false;
        let lines: Vec<&str> = content
            .lines()
            .filter(|line| {
                let matches = self.import_line.is_match(line) && line.contains(module_path);
                if matches {
                    removed = true;
                }
                !matches
            })
            .collect();
        if !removed {
            bail!("No import matching '{}' in {}", module_path, path);
        }
        let mut new_content = lines.join("\n");
        if content.ends_with('\n') {
            new_content.push('\n');
        }
        self.write(path, &new_content)
    }

    fn organize_imports(&self, path: &str) -> Result<()> {
        let content = self.read(path)?;
        let lines: Vec<&str> = content.lines().collect();

        // Sort each contiguous run of import lines in place.
        let mut out: Vec<String> = Vec::with_capacity(lines.len());
        let mut block: Vec<&str> = Vec::new();
        for line in &lines {
            if self.import_line.is_match(line) {
                block.push(line);
            } else {
                if !block.is_empty() {
                    block.sort_unstable();
                    out.extend(block.drain(..).map(str::to_string));
                }
                out.push((*line).to_string());
            }
        }
        if !block.is_empty() {
            block.sort_unstable();
            out.extend(block.drain(..).map(str::to_string));
        }

        let mut new_content = out.join("\n");
        if content.ends_with('\n') {
            new_content.push('\n');
        }
        self.write(path, &new_content)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::fs;

    fn temp_file(content: &str) -> (tempfile::TempDir, String) {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("code.rs");
        fs::write(&path, content).unwrap();
        let path = path.display().to_string();
        (dir, path)
    }

    #[test]
    fn test_list_structure_finds_functions_and_imports() {
        let (_dir, path) = temp_file("use std::fmt;\n\nfn alpha() {\n}\n\npub fn beta() {\n}\n");
        let structure = BraceEditor::new().list_structure(&path).unwrap();
        assert!(structure.contains("import use std::fmt;"));
        assert!(structure.contains("fn alpha"));
        assert!(structure.contains("fn beta"));
    }

    #[test]
    fn test_remove_function_consumes_body() {
        let (_dir, path) = temp_file(
            "fn keep() {\n    body();\n}\n\nfn drop_me() {\n    if x {\n        y();\n    }\n}\n",
        );
        BraceEditor::new().remove_function(&path, "drop_me").unwrap();
        let content = fs::read_to_string(&path).unwrap();
        assert!(content.contains("fn keep"));
        assert!(!content.contains("drop_me"));
        assert!(!content.contains("if x"));
    }

    #[test]
    fn test_remove_missing_function_fails() {
        let (_dir, path) = temp_file("fn only() {}\n");
        assert!(BraceEditor::new().remove_function(&path, "ghost").is_err());
    }

    #[test]
    fn test_add_import_after_existing_block() {
        let (_dir, path) = temp_file("use a;\nuse b;\n\nfn f() {}\n");
        BraceEditor::new().add_import(&path, "use c;").unwrap();
        let content = fs::read_to_string(&path).unwrap();
        assert_eq!(content, "use a;\nuse b;\nuse c;\n\nfn f() {}\n");
    }

    #[test]
    fn test_add_import_is_idempotent() {
        let (_dir, path) = temp_file("use a;\n");
        BraceEditor::new().add_import(&path, "use a;").unwrap();
        assert_eq!(fs::read_to_string(&path).unwrap(), "use a;\n");
    }

    #[test]
    fn test_organize_sorts_import_block() {
        let (_dir, path) = temp_file("use z;\nuse a;\nuse m;\n\nfn f() {}\n");
        BraceEditor::new().organize_imports(&path).unwrap();
        let content = fs::read_to_string(&path).unwrap();
        assert_eq!(content, "use a;\nuse m;\nuse z;\n\nfn f() {}\n");
    }

    #[test]
    fn test_editor_for_unknown_extension() {
        assert!(editor_for("notes.txt").is_none());
        assert!(editor_for("src/lib.rs").is_some());
    }

    #[test]
    fn test_add_function_appends() {
        let (_dir, path) = temp_file("fn first() {}\n");
        BraceEditor::new()
            .add_function(&path, "fn second() {\n    work();\n}")
            .unwrap();
        let content = fs::read_to_string(&path).unwrap();
        assert!(content.ends_with("fn second() {\n    work();\n}\n"));
        assert!(content.starts_with("fn first() {}\n"));
    }
}
