//! # Validation
//!
//! Post-edit checks on modified files: an external compiler pass for
//! extensions that have one configured, and a tag-balance check for
//! markup files. Findings are fed back to the agent so it can repair
//! its own edits.

use crate::domain::config::ValidationConfig;
use crate::infrastructure::tools::executor::CommandExecutor;
use anyhow::Result;
use regex::Regex;
use std::path::Path;
use tracing::{debug, info};

/// Tags that never take a closing counterpart.
const VOID_TAGS: [&str; 14] = [
    "area", "base", "br", "col", "embed", "hr", "img", "input", "link", "meta", "param",
    "source", "track", "wbr",
];

pub struct Validator {
    config: ValidationConfig,
    tag: Regex,
}

impl Validator {
    pub fn new(config: ValidationConfig) -> Self {
        Self {
            config,
            tag: Regex::new(r"<(/?)([A-Za-z][A-Za-z0-9-]*)[^<>]*?(/?)>").expect("valid regex"),
        }
    }

    /// Validate one file after it was modified. `None` means no
    /// findings (including the disabled and no-check-applies cases).
    pub async fn check(&self, path: &str, executor: &CommandExecutor) -> Result<Option<String>> {
        if !self.config.enabled {
            return Ok(None);
        }
        let Some(ext) = Path::new(path).extension().and_then(|e| e.to_str()) else {
            return Ok(None);
        };

        if let Some(command) = self.config.compilers.get(ext) {
            return self.run_compiler(path, command, executor).await;
        }
        if self.config.markup_extensions.iter().any(|e| e == ext) {
            let content = std::fs::read_to_string(path)?;
            return Ok(self.check_markup(&content));
        }
        Ok(None)
    }

    async fn run_compiler(
        &self,
        path: &str,
        command: &str,
        executor: &CommandExecutor,
    ) -> Result<Option<String>> {
        info!("Validating {} with '{}'", path, command);
        let full = format!("{} {}", command, path);
        let outcome = executor.run(&full).await?;
        if outcome.exit_code == Some(0) && !outcome.timed_out {
            debug!("Validation passed for {}", path);
            return Ok(None);
        }
        Ok(Some(format!(
            "CRITICAL: validation failed for {}. Fix the file and verify again before continuing.\n{}",
            path,
            outcome.render()
        )))
    }

    /// Stack check over open and close tags. Void tags and
    /// self-closing tags never enter the stack.
    fn check_markup(&self, content: &str) -> Option<String> {
        let mut stack: Vec<String> = Vec::new();
        let mut problems: Vec<String> = Vec::new();

        for caps in self.tag.captures_iter(content) {
            let closing = &caps[1] == "/";
            let name = caps[2].to_lowercase();
            let self_closing = &caps[3] == "/";

            if VOID_TAGS.contains(&name.as_str()) || self_closing {
                continue;
            }
            if closing {
                match stack.pop() {
                    Some(open) if open == name => {}
                    Some(open) => {
                        problems.push(format!("</{}> closes <{}>", name, open));
                        break;
                    }
                    None => {
                        problems.push(format!("</{}> has no opening tag", name));
                        break;
                    }
                }
            } else {
                stack.push(name);
            }
        }

        if problems.is_empty() {
            for open in stack.iter().rev() {
                problems.push(format!("<{}> is never closed", open));
            }
        }

        if problems.is_empty() {
            None
        } else {
            Some(format!(
                "CRITICAL: markup structure issues. Fix the file and verify again before continuing.\n{}",
                problems.join("\n")
            ))
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::domain::config::ValidationConfig;

    fn validator() -> Validator {
        Validator::new(ValidationConfig::default())
    }

    #[test]
    fn test_balanced_markup_passes() {
        let v = validator();
        assert!(v.check_markup("<div><p>hi</p></div>").is_none());
    }

    #[test]
    fn test_void_tags_ignored() {
        let v = validator();
        assert!(v.check_markup("<div><br><img src=\"x\"><hr></div>").is_none());
    }

    #[test]
    fn test_self_closing_ignored() {
        let v = validator();
        assert!(v.check_markup("<svg><path d=\"M0 0\"/></svg>").is_none());
    }

    #[test]
    fn test_unclosed_tag_reported() {
        let v = validator();
        let report = v.check_markup("<div><p>hi</div>").unwrap();
        assert!(report.contains("</div> closes <p>"));
    }

    #[test]
    fn test_never_closed_reported() {
        let v = validator();
        let report = v.check_markup("<div><section>").unwrap();
        assert!(report.contains("<section> is never closed"));
        assert!(report.contains("<div> is never closed"));
    }

    #[test]
    fn test_stray_close_reported() {
        let v = validator();
        let report = v.check_markup("</div>").unwrap();
        assert!(report.contains("no opening tag"));
    }

    #[tokio::test]
    async fn test_disabled_validator_is_silent() {
        let config = ValidationConfig {
            enabled: false,
            ..Default::default()
        };
        let v = Validator::new(config);
        let exec = CommandExecutor::new(5);
        assert!(v.check("anything.ts", &exec).await.unwrap().is_none());
    }

    #[tokio::test]
    async fn test_unknown_extension_is_silent() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("notes.txt");
        std::fs::write(&path, "plain text").unwrap();
        let v = validator();
        let exec = CommandExecutor::new(5);
        assert!(v
            .check(&path.display().to_string(), &exec)
            .await
            .unwrap()
            .is_none());
    }

    #[tokio::test]
    async fn test_markup_file_checked_through_check() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("page.html");
        std::fs::write(&path, "<div><span></div>").unwrap();
        let v = validator();
        let exec = CommandExecutor::new(5);
        let report = v.check(&path.display().to_string(), &exec).await.unwrap();
        assert!(report.is_some());
    }
}
