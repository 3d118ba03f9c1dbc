//! # Prompts
//!
//! Instruction text sent to the agent: the action protocol, the plan
//! authoring request, and per-task work prompts. Also the formatter
//! for feeding action results back into the conversation.

use crate::domain::types::Task;

/// Agent signals that the current task is finished.
pub const TASK_COMPLETE: &str = "TASK_COMPLETE";
/// Agent signals that the current task cannot be finished.
pub const TASK_FAILED: &str = "TASK_FAILED";

/// The response protocol every working turn is prefixed with.
pub const ACTION_PROTOCOL: &str = r#"Respond with a single JSON object of the form:
{"actions": [...], "summary": "optional short status"}

Each action is an object with a "type" field. Available actions:
- {"type": "talk_with_user", "content": "..."} - say something to the user
- {"type": "list_files", "path": "dir"} - list a directory
- {"type": "read_file", "path": "file"} - read a file
- {"type": "search_file", "path": "glob pattern"} - find files by pattern
- {"type": "run_command", "command": "shell command"} - run a command
- {"type": "create_file", "path": "file", "content": "..."} - create a file
- {"type": "modify_file", "path": "file", "content": "...", "line_range": [start, end]} - replace a line range (1-based, inclusive)
- {"type": "modify_file", "path": "file", "content": "...", "target_content": "exact text to replace"} - replace an exact snippet
- {"type": "delete_file", "path": "file"} - delete a file
- {"type": "use_tool", "tool_name": "name", "tool_args": {...}} - invoke a registered tool
- {"type": "ast_list_structure", "path": "file"} - outline a source file
- {"type": "ast_add_function", "path": "file", "function_code": "..."} - append a function
- {"type": "ast_remove_function", "path": "file", "function_name": "name"} - remove a function
- {"type": "ast_add_import", "path": "file", "import_statement": "..."} - add an import
- {"type": "ast_remove_import", "path": "file", "module_path": "name"} - remove an import
- {"type": "ast_organize_imports", "path": "file"} - sort the import block

Emit several actions per turn when they are independent. Results of each
action come back in the next message.

When the current task is fully done, include the word TASK_COMPLETE in a
talk_with_user action. If the task cannot be completed, include TASK_FAILED
with an explanation."#;

/// Ask the agent to write an initial work plan.
pub fn plan_request(goal: &str, plan_path: &str) -> String {
    format!(
        "{protocol}\n\nThere is no work plan yet. Break the following goal into \
small, verifiable tasks and create the plan file '{plan}' using a create_file \
action. Write each task as a markdown checkbox line: '- [ ] task description'. \
Order tasks so earlier ones unblock later ones.\n\nGoal:\n{goal}",
        protocol = ACTION_PROTOCOL,
        plan = plan_path,
        goal = goal,
    )
}

/// Prompt for one working turn on the current task.
pub fn task_prompt(task: &Task, context: Option<&str>) -> String {
    let mut prompt = String::from(ACTION_PROTOCOL);
    prompt.push_str("\n\n");
    if let Some(ctx) = context {
        prompt.push_str("Project context:\n");
        prompt.push_str(ctx);
        prompt.push_str("\n\n");
    }
    prompt.push_str("Current task:\n");
    prompt.push_str(&task.description);
    prompt.push_str("\n\nWork on this task now.");
    prompt
}

/// Free-form conversational turn (dev mode), protocol included.
pub fn chat_prompt(user_input: &str) -> String {
    format!("{}\n\nUser:\n{}", ACTION_PROTOCOL, user_input)
}

/// Format one action's result for the follow-up turn.
pub fn action_result(kind: &str, arg: &str, result: &str) -> String {
    format!("[Action {}({}) Result]:\n{}\n\n", kind, arg, result)
}
