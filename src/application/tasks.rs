//! # Task Tracking
//!
//! The work plan is a markdown document with checkbox items:
//! `- [ ]` pending, `- [/]` in progress, `- [x]` done. This module
//! parses the plan, selects the next task to work on, and flips
//! checkbox markers in place without disturbing the rest of the file.

use crate::domain::types::{PlanState, PlanStatus, Task, TaskStatus};
use anyhow::{Context, Result, bail};
use regex::Regex;
use std::path::PathBuf;
use tracing::{debug, info};

pub struct TaskTracker {
    plan_path: PathBuf,
    checkbox: Regex,
    heading: Regex,
}

impl TaskTracker {
    pub fn new(plan_path: impl Into<PathBuf>) -> Self {
        Self {
            plan_path: plan_path.into(),
            checkbox: Regex::new(r"^\s*[-*]\s+\[( |x|X|/)\]\s+(.*)$").expect("valid regex"),
            heading: Regex::new(r"^#{1,6}\s").expect("valid regex"),
        }
    }

    pub fn plan_path(&self) -> &std::path::Path {
        &self.plan_path
    }

    /// Current plan state: missing file, work remaining (with the next
    /// task to pick up), or everything checked off.
    pub fn state(&self) -> Result<PlanState> {
        let content = match std::fs::read_to_string(&self.plan_path) {
            Ok(c) => c,
            Err(e) if e.kind() == std::io::ErrorKind::NotFound => {
                return Ok(PlanState {
                    status: PlanStatus::Missing,
                    next_task: None,
                    all_tasks: Vec::new(),
                });
            }
            Err(e) => {
                return Err(e)
                    .with_context(|| format!("Failed to read {}", self.plan_path.display()));
            }
        };

        let tasks = self.parse(&content);
        if tasks.is_empty() {
            return Ok(PlanState {
                status: PlanStatus::Missing,
                next_task: None,
                all_tasks: tasks,
            });
        }

        let next = self.select_next(&tasks);
        let status = if next.is_some() {
            PlanStatus::Pending
        } else {
            PlanStatus::Completed
        };
        Ok(PlanState {
            status,
            next_task: next,
            all_tasks: tasks,
        })
    }

    /// Parse checkbox items out of the plan. Indented continuation
    /// lines belong to the task above them; a blank line, another
    /// checkbox, or a heading ends the description.
    fn parse(&self, content: &str) -> Vec<Task> {
        let mut tasks: Vec<Task> = Vec::new();
        for (idx, line) in content.lines().enumerate() {
            if let Some(caps) = self.checkbox.captures(line) {
                let status = match &caps[1] {
                    " " => TaskStatus::Pending,
                    "/" => TaskStatus::InProgress,
                    _ => TaskStatus::Completed,
                };
                tasks.push(Task {
                    id: format!("task-{}", tasks.len() + 1),
                    description: caps[2].trim().to_string(),
                    status,
                    line_number: idx,
                });
            } else if let Some(task) = tasks.last_mut() {
                let only_follows_directly = task.line_number
                    + task.description.lines().count()
                    == idx;
                let indented = line.starts_with(' ') || line.starts_with('\t');
                if only_follows_directly
                    && indented
                    && !line.trim().is_empty()
                    && !self.heading.is_match(line)
                {
                    task.description.push('\n');
                    task.description.push_str(line.trim());
                }
            }
        }
        debug!("Parsed {} tasks from plan", tasks.len());
        tasks
    }

    /// An in-progress task outranks any pending one; ties break by
    /// document order.
    fn select_next(&self, tasks: &[Task]) -> Option<Task> {
        tasks
            .iter()
            .find(|t| t.status == TaskStatus::InProgress)
            .or_else(|| tasks.iter().find(|t| t.status == TaskStatus::Pending))
            .cloned()
    }

    /// Flip one task's checkbox marker. Only the marker character on
    /// the task's line changes; formatting, indentation, and every
    /// other line are preserved. The first line of the task's
    /// description is checked against the file to catch edits that
    /// moved the plan around since it was parsed.
    pub fn set_status(&self, task: &Task, status: TaskStatus) -> Result<()> {
        let content = std::fs::read_to_string(&self.plan_path)
            .with_context(|| format!("Failed to read {}", self.plan_path.display()))?;
        let lines: Vec<&str> = content.lines().collect();

        let line_idx = self.locate(&lines, task)?;
        let marker = match status {
            TaskStatus::Pending => ' ',
            TaskStatus::InProgress => '/',
            TaskStatus::Completed => 'x',
        };

        let line = lines[line_idx];
        let open = line
            .find('[')
            .with_context(|| format!("No checkbox on plan line {}", line_idx + 1))?;
        let mut new_line = String::with_capacity(line.len());
        new_line.push_str(&line[..open + 1]);
        new_line.push(marker);
        new_line.push_str(&line[open + 2..]);

        let mut out: Vec<&str> = lines.clone();
        out[line_idx] = &new_line;
        let mut new_content = out.join("\n");
        if content.ends_with('\n') {
            new_content.push('\n');
        }
        std::fs::write(&self.plan_path, new_content)
            .with_context(|| format!("Failed to write {}", self.plan_path.display()))?;
        info!("Task '{}' marked {:?}", task.marker_description(), status);
        Ok(())
    }

    /// Find the task's line, tolerating plan edits that shifted it.
    fn locate(&self, lines: &[&str], task: &Task) -> Result<usize> {
        let wanted = task.marker_description();
        let line_matches = |line: &str| -> bool {
            self.checkbox
                .captures(line)
                .map(|caps| caps[2].trim().lines().next().unwrap_or("") == wanted)
                .unwrap_or(false)
        };

        if let Some(line) = lines.get(task.line_number) {
            if line_matches(line) {
                return Ok(task.line_number);
            }
        }
        if let Some(idx) = lines.iter().position(|l| line_matches(l)) {
            debug!("Plan drifted, task found at line {}", idx + 1);
            return Ok(idx);
        }
        bail!(
            "Task '{}' no longer present in {}",
            wanted,
            self.plan_path.display()
        )
    }

    /// Human-readable summary of the plan, for the tasks command.
    pub fn render(&self) -> Result<String> {
        let state = self.state()?;
        match state.status {
            PlanStatus::Missing => Ok(format!(
                "No plan found at {}",
                self.plan_path.display()
            )),
            _ => {
                let mut out = String::new();
                for task in &state.all_tasks {
                    let marker = match task.status {
                        TaskStatus::Pending => "[ ]",
                        TaskStatus::InProgress => "[/]",
                        TaskStatus::Completed => "[x]",
                    };
                    out.push_str(&format!("{} {}\n", marker, task.marker_description()));
                }
                let done = state
                    .all_tasks
                    .iter()
                    .filter(|t| t.status == TaskStatus::Completed)
                    .count();
                out.push_str(&format!("{}/{} complete\n", done, state.all_tasks.len()));
                Ok(out)
            }
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::fs;

    fn tracker_with(content: &str) -> (tempfile::TempDir, TaskTracker) {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("plan.md");
        fs::write(&path, content).unwrap();
        (dir, TaskTracker::new(path))
    }

    const PLAN: &str = "# Plan\n\n- [x] Set up project\n- [/] Implement parser\n  with continuation detail\n- [ ] Write tests\n";

    #[test]
    fn test_missing_plan_reports_missing() {
        let dir = tempfile::tempdir().unwrap();
        let tracker = TaskTracker::new(dir.path().join("absent.md"));
        let state = tracker.state().unwrap();
        assert_eq!(state.status, PlanStatus::Missing);
    }

    #[test]
    fn test_parse_statuses_and_continuations() {
        let (_dir, tracker) = tracker_with(PLAN);
        let state = tracker.state().unwrap();
        assert_eq!(state.all_tasks.len(), 3);
        assert_eq!(state.all_tasks[0].status, TaskStatus::Completed);
        assert_eq!(state.all_tasks[1].status, TaskStatus::InProgress);
        assert_eq!(
            state.all_tasks[1].description,
            "Implement parser\nwith continuation detail"
        );
        assert_eq!(state.all_tasks[2].status, TaskStatus::Pending);
    }

    #[test]
    fn test_unindented_prose_is_not_a_continuation() {
        let (_dir, tracker) =
            tracker_with("- [ ] Implement parser\nSome surrounding prose paragraph.\n");
        let state = tracker.state().unwrap();
        assert_eq!(state.all_tasks[0].description, "Implement parser");
    }

    #[test]
    fn test_in_progress_outranks_pending() {
        let (_dir, tracker) =
            tracker_with("- [ ] first pending\n- [/] started later\n- [ ] more\n");
        let state = tracker.state().unwrap();
        let next = state.next_task.unwrap();
        assert_eq!(next.description, "started later");
    }

    #[test]
    fn test_first_pending_when_nothing_in_progress() {
        let (_dir, tracker) = tracker_with("- [x] done\n- [ ] do me\n- [ ] later\n");
        let next = tracker.state().unwrap().next_task.unwrap();
        assert_eq!(next.description, "do me");
    }

    #[test]
    fn test_all_done_is_completed() {
        let (_dir, tracker) = tracker_with("- [x] one\n- [X] two\n");
        let state = tracker.state().unwrap();
        assert_eq!(state.status, PlanStatus::Completed);
        assert!(state.next_task.is_none());
    }

    #[test]
    fn test_marker_roundtrip_preserves_document() {
        let (_dir, tracker) = tracker_with(PLAN);
        let task = tracker.state().unwrap().all_tasks[2].clone();

        tracker.set_status(&task, TaskStatus::InProgress).unwrap();
        let mid = fs::read_to_string(tracker.plan_path()).unwrap();
        assert!(mid.contains("- [/] Write tests"));

        tracker.set_status(&task, TaskStatus::Completed).unwrap();
        let done = fs::read_to_string(tracker.plan_path()).unwrap();
        assert!(done.contains("- [x] Write tests"));
        // Everything except the marker is intact.
        assert!(done.contains("# Plan"));
        assert!(done.contains("  with continuation detail"));
        assert_eq!(done.lines().count(), PLAN.lines().count());
    }

    #[test]
    fn test_set_status_survives_plan_drift() {
        let (_dir, tracker) = tracker_with(PLAN);
        let task = tracker.state().unwrap().all_tasks[2].clone();

        // Insert lines above the task after it was parsed.
        let shifted = format!("## New section\nextra notes\n\n{}", PLAN);
        fs::write(tracker.plan_path(), shifted).unwrap();

        tracker.set_status(&task, TaskStatus::Completed).unwrap();
        let content = fs::read_to_string(tracker.plan_path()).unwrap();
        assert!(content.contains("- [x] Write tests"));
    }

    #[test]
    fn test_set_status_fails_when_task_removed() {
        let (_dir, tracker) = tracker_with(PLAN);
        let task = tracker.state().unwrap().all_tasks[2].clone();
        fs::write(tracker.plan_path(), "- [ ] unrelated\n").unwrap();
        assert!(tracker.set_status(&task, TaskStatus::Completed).is_err());
    }

    #[test]
    fn test_empty_plan_counts_as_missing() {
        let (_dir, tracker) = tracker_with("# Plan with no checkboxes\nprose only\n");
        assert_eq!(tracker.state().unwrap().status, PlanStatus::Missing);
    }
}
