//! # Action Dispatch
//!
//! Executes the actions of one agent turn. Mutating actions go through
//! a confirmation gate with separate session-wide auto-approval for
//! file writes and for shell commands. Action failures are reported
//! back to the agent as result text, never as engine errors, so the
//! agent can correct course on its next turn.

use crate::application::prompts::{self, TASK_COMPLETE, TASK_FAILED};
use crate::application::validation::Validator;
use crate::domain::traits::{Approval, ExternalTool, UserPrompt};
use crate::domain::types::{Action, AgentResponse};
use crate::infrastructure::editor;
use crate::infrastructure::tools::executor::CommandExecutor;
use crate::infrastructure::tools::workspace;
use anyhow::Result;
use std::collections::HashMap;
use std::sync::Arc;
use tracing::{info, warn};

/// Signal raised by a talk action containing a completion sentinel.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum TaskSignal {
    Complete,
    Failed,
}

/// Everything one turn produced: formatted results to feed back to the
/// agent, and a completion signal if the agent raised one.
#[derive(Debug, Default)]
pub struct TurnOutcome {
    pub results: Vec<String>,
    pub signal: Option<TaskSignal>,
    /// The agent addressed the user this turn and expects a reply.
    pub asked_user: bool,
}

impl TurnOutcome {
    /// Concatenated follow-up prompt. Empty when the turn was talk-only.
    pub fn feedback(&self) -> String {
        self.results.concat()
    }
}

pub struct Dispatcher {
    ui: Arc<dyn UserPrompt>,
    executor: CommandExecutor,
    validator: Validator,
    tools: HashMap<String, Arc<dyn ExternalTool>>,
    auto_approve_files: bool,
    auto_approve_commands: bool,
}

impl Dispatcher {
    pub fn new(ui: Arc<dyn UserPrompt>, executor: CommandExecutor, validator: Validator) -> Self {
        Self {
            ui,
            executor,
            validator,
            tools: HashMap::new(),
            auto_approve_files: false,
            auto_approve_commands: false,
        }
    }

    /// Register a named tool reachable through `use_tool`.
    pub fn register_tool(&mut self, name: impl Into<String>, tool: Arc<dyn ExternalTool>) {
        self.tools.insert(name.into(), tool);
    }

    /// Run every action of a turn in order, collecting results.
    pub async fn dispatch_turn(&mut self, response: &AgentResponse) -> Result<TurnOutcome> {
        let mut outcome = TurnOutcome::default();
        for action in &response.actions {
            info!("Dispatching {}", action.kind());
            self.dispatch(action, &mut outcome).await?;
        }
        Ok(outcome)
    }

    async fn dispatch(&mut self, action: &Action, outcome: &mut TurnOutcome) -> Result<()> {
        match action {
            Action::TalkWithUser { content } => {
                let text = content.as_deref().unwrap_or("");
                if !text.is_empty() {
                    self.ui.say(text).await?;
                }
                if text.contains(TASK_COMPLETE) {
                    outcome.signal = Some(TaskSignal::Complete);
                } else if text.contains(TASK_FAILED) {
                    outcome.signal = Some(TaskSignal::Failed);
                } else if !text.is_empty() {
                    outcome.asked_user = true;
                }
            }

            Action::ListFiles { path } => {
                let path = path.as_deref().unwrap_or(".");
                let result = unwrap_result(workspace::list_files(path));
                outcome.results.push(prompts::action_result("list_files", path, &result));
            }

            Action::ReadFile { path } => {
                let Some(path) = required(path, "read_file", "path", outcome) else {
                    return Ok(());
                };
                let result = unwrap_result(workspace::read_file(&path));
                outcome.results.push(prompts::action_result("read_file", &path, &result));
            }

            Action::SearchFile { path } => {
                let Some(pattern) = required(path, "search_file", "path", outcome) else {
                    return Ok(());
                };
                let result = unwrap_result(workspace::search_files(&pattern));
                outcome
                    .results
                    .push(prompts::action_result("search_file", &pattern, &result));
            }

            Action::RunCommand { command } => {
                let Some(command) = required(command, "run_command", "command", outcome) else {
                    return Ok(());
                };
                let result = self.run_command(&command).await?;
                outcome
                    .results
                    .push(prompts::action_result("run_command", &command, &result));
            }

            Action::CreateFile { path, content } => {
                let Some(path) = required(path, "create_file", "path", outcome) else {
                    return Ok(());
                };
                let content = content.as_deref().unwrap_or("");
                let result = self.create_file(&path, content).await?;
                outcome.results.push(prompts::action_result("create_file", &path, &result));
            }

            Action::ModifyFile {
                path,
                content,
                target_content,
                line_range,
                confirmed,
            } => {
                let Some(path) = required(path, "modify_file", "path", outcome) else {
                    return Ok(());
                };
                let result = self
                    .modify_file(
                        &path,
                        content.as_deref(),
                        target_content.as_deref(),
                        line_range.as_deref(),
                        confirmed.unwrap_or(false),
                    )
                    .await?;
                outcome.results.push(prompts::action_result("modify_file", &path, &result));
            }

            Action::DeleteFile { path } => {
                let Some(path) = required(path, "delete_file", "path", outcome) else {
                    return Ok(());
                };
                let result = if self.approve_file(&format!("Delete {}?", path)).await? {
                    unwrap_result(workspace::delete_file(&path))
                } else {
                    declined()
                };
                outcome.results.push(prompts::action_result("delete_file", &path, &result));
            }

            Action::UseTool { tool_name, tool_args } => {
                let Some(name) = required(tool_name, "use_tool", "tool_name", outcome) else {
                    return Ok(());
                };
                let result = self.use_tool(&name, tool_args.as_deref()).await;
                outcome.results.push(prompts::action_result("use_tool", &name, &result));
            }

            Action::AstListStructure { path } => {
                self.structured(path, "ast_list_structure", outcome, |ed, p| {
                    ed.list_structure(p)
                });
            }
            Action::AstAddFunction { path, function_code } => {
                let Some(code) =
                    required(function_code, "ast_add_function", "function_code", outcome)
                else {
                    return Ok(());
                };
                if !self.approve_file_for(path, outcome, "ast_add_function").await? {
                    return Ok(());
                }
                self.structured(path, "ast_add_function", outcome, |ed, p| {
                    ed.add_function(p, &code).map(|_| format!("Function added to {}", p))
                });
            }
            Action::AstRemoveFunction { path, function_name } => {
                let Some(name) =
                    required(function_name, "ast_remove_function", "function_name", outcome)
                else {
                    return Ok(());
                };
                if !self.approve_file_for(path, outcome, "ast_remove_function").await? {
                    return Ok(());
                }
                self.structured(path, "ast_remove_function", outcome, |ed, p| {
                    ed.remove_function(p, &name)
                        .map(|_| format!("Removed function '{}' from {}", name, p))
                });
            }
            Action::AstAddImport { path, import_statement } => {
                let Some(stmt) =
                    required(import_statement, "ast_add_import", "import_statement", outcome)
                else {
                    return Ok(());
                };
                if !self.approve_file_for(path, outcome, "ast_add_import").await? {
                    return Ok(());
                }
                self.structured(path, "ast_add_import", outcome, |ed, p| {
                    ed.add_import(p, &stmt).map(|_| format!("Import added to {}", p))
                });
            }
            Action::AstRemoveImport { path, module_path } => {
                let Some(module) =
                    required(module_path, "ast_remove_import", "module_path", outcome)
                else {
                    return Ok(());
                };
                if !self.approve_file_for(path, outcome, "ast_remove_import").await? {
                    return Ok(());
                }
                self.structured(path, "ast_remove_import", outcome, |ed, p| {
                    ed.remove_import(p, &module)
                        .map(|_| format!("Removed import '{}' from {}", module, p))
                });
            }
            Action::AstOrganizeImports { path } => {
                if !self.approve_file_for(path, outcome, "ast_organize_imports").await? {
                    return Ok(());
                }
                self.structured(path, "ast_organize_imports", outcome, |ed, p| {
                    ed.organize_imports(p).map(|_| format!("Imports organized in {}", p))
                });
            }

            // Structure edits the agent may request but no editor here
            // implements. Reported back as results so the agent falls
            // back to a plain file edit instead of stalling the turn.
            Action::ModifyAst { path, .. }
            | Action::SearchAst { path, .. }
            | Action::AstAddMethod { path, .. }
            | Action::AstModifyMethod { path, .. }
            | Action::AstRemoveMethod { path, .. }
            | Action::AstAddClass { path, .. }
            | Action::AstAddProperty { path, .. }
            | Action::AstRemoveProperty { path, .. }
            | Action::AstAddDecorator { path, .. }
            | Action::AstAddInterface { path, .. }
            | Action::AstAddTypeAlias { path, .. } => {
                let kind = action.kind();
                outcome.results.push(prompts::action_result(
                    kind,
                    path.as_deref().unwrap_or(""),
                    &format!("Error: {} is not supported for this file type. Use modify_file instead.", kind),
                ));
            }
        }
        Ok(())
    }

    async fn run_command(&mut self, command: &str) -> Result<String> {
        if !self.approve_command(&format!("Run command '{}'?", command)).await? {
            return Ok(declined());
        }
        match self.executor.run(command).await {
            Ok(outcome) => Ok(outcome.render()),
            Err(e) => Ok(format!("Error: {:#}", e)),
        }
    }

    async fn create_file(&mut self, path: &str, content: &str) -> Result<String> {
        if !self.approve_file(&format!("Create {}?", path)).await? {
            return Ok(declined());
        }
        let mut result = unwrap_result(workspace::create_file(path, content));
        self.append_validation(path, &mut result).await?;
        Ok(result)
    }

    /// Modify routes on the fields present: an anchor edit applies
    /// immediately once the user approves; a line-range edit is
    /// previewed first and only written when the agent re-sends it
    /// with `confirmed` set.
    async fn modify_file(
        &mut self,
        path: &str,
        content: Option<&str>,
        target_content: Option<&str>,
        line_range: Option<&[usize]>,
        confirmed: bool,
    ) -> Result<String> {
        let Some(content) = content else {
            return Ok("Error: modify_file requires 'content'".into());
        };

        if let Some(anchor) = target_content {
            if !self.approve_file(&format!("Modify {}?", path)).await? {
                return Ok(declined());
            }
            let mut result = unwrap_result(workspace::apply_anchor(path, anchor, content));
            self.append_validation(path, &mut result).await?;
            return Ok(result);
        }

        if let Some(range) = line_range {
            let [start, end] = range else {
                return Ok("Error: line_range must be [start, end]".into());
            };
            let (start, end) = (*start, *end);
            if !confirmed {
                return Ok(unwrap_result(workspace::preview_line_range(
                    path, start, end, content,
                )));
            }
            if !self.approve_file(&format!("Modify {} lines {}-{}?", path, start, end)).await? {
                return Ok(declined());
            }
            let mut result = unwrap_result(workspace::apply_line_range(path, start, end, content));
            self.append_validation(path, &mut result).await?;
            return Ok(result);
        }

        Ok("Error: modify_file requires 'target_content' or 'line_range'".into())
    }

    async fn use_tool(&self, name: &str, args: Option<&str>) -> String {
        let Some(tool) = self.tools.get(name) else {
            return format!(
                "Error: unknown tool '{}'. Available: {}",
                name,
                self.tool_names()
            );
        };
        let args: serde_json::Value = match args {
            Some(raw) => match serde_json::from_str(raw) {
                Ok(v) => v,
                Err(e) => return format!("Error: tool_args is not valid JSON: {}", e),
            },
            None => serde_json::Value::Object(Default::default()),
        };
        match tool.call(args).await {
            Ok(result) => result,
            Err(e) => format!("Error: {:#}", e),
        }
    }

    fn tool_names(&self) -> String {
        let mut names: Vec<&str> = self.tools.keys().map(String::as_str).collect();
        names.sort_unstable();
        if names.is_empty() {
            "(none)".into()
        } else {
            names.join(", ")
        }
    }

    /// Route a structure action through the editor for the file type.
    fn structured<F>(
        &self,
        path: &Option<String>,
        kind: &str,
        outcome: &mut TurnOutcome,
        f: F,
    ) where
        F: FnOnce(&dyn crate::domain::traits::StructuredEditor, &str) -> Result<String>,
    {
        let Some(path) = required(path, kind, "path", outcome) else {
            return;
        };
        let result = match editor::editor_for(&path) {
            Some(ed) => unwrap_result(f(ed.as_ref(), &path)),
            None => format!("Error: no structured editor for {}", path),
        };
        outcome.results.push(prompts::action_result(kind, &path, &result));
    }

    /// File-write approval used by the structure actions, which report
    /// the decline through the result list themselves.
    async fn approve_file_for(
        &mut self,
        path: &Option<String>,
        outcome: &mut TurnOutcome,
        kind: &str,
    ) -> Result<bool> {
        let Some(path) = path.as_deref() else {
            // Missing path is reported by the action handler itself.
            return Ok(true);
        };
        if self.approve_file(&format!("Modify {}?", path)).await? {
            return Ok(true);
        }
        outcome.results.push(prompts::action_result(kind, path, &declined()));
        Ok(false)
    }

    async fn approve_file(&mut self, prompt: &str) -> Result<bool> {
        if self.auto_approve_files {
            return Ok(true);
        }
        match self.ui.confirm(prompt, true).await? {
            Approval::Yes => Ok(true),
            Approval::YesForSession => {
                info!("File changes auto-approved for this session");
                self.auto_approve_files = true;
                Ok(true)
            }
            Approval::No => {
                warn!("File change declined");
                Ok(false)
            }
        }
    }

    async fn approve_command(&mut self, prompt: &str) -> Result<bool> {
        if self.auto_approve_commands {
            return Ok(true);
        }
        match self.ui.confirm(prompt, true).await? {
            Approval::Yes => Ok(true),
            Approval::YesForSession => {
                info!("Commands auto-approved for this session");
                self.auto_approve_commands = true;
                Ok(true)
            }
            Approval::No => {
                warn!("Command declined");
                Ok(false)
            }
        }
    }

    async fn append_validation(&self, path: &str, result: &mut String) -> Result<()> {
        if let Some(report) = self.validator.check(path, &self.executor).await? {
            result.push('\n');
            result.push_str(&report);
        }
        Ok(())
    }
}

fn declined() -> String {
    "Declined by user".into()
}

fn unwrap_result(r: Result<String>) -> String {
    match r {
        Ok(s) => s,
        Err(e) => format!("Error: {:#}", e),
    }
}

/// Pull a required field, recording an error result when it is absent.
fn required(
    field: &Option<String>,
    kind: &str,
    name: &str,
    outcome: &mut TurnOutcome,
) -> Option<String> {
    match field {
        Some(v) if !v.is_empty() => Some(v.clone()),
        _ => {
            outcome.results.push(prompts::action_result(
                kind,
                "",
                &format!("Error: {} requires '{}'", kind, name),
            ));
            None
        }
    }
}
