//! # Domain Types
//!
//! The action vocabulary shared between the response interpreter and the
//! dispatcher, plus the plan/task records the tracker emits.

use serde::{Deserialize, Serialize};

/// One typed unit of agent-directed work.
///
/// The remote agent emits these as `{"type": "...", ...}` objects; the tag
/// is closed, so an unknown kind fails deserialization instead of silently
/// routing nowhere. Every variant carries only the fields it needs, and all
/// of them are optional on the wire because the model routinely omits or
/// nulls fields it considers irrelevant.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(tag = "type", rename_all = "snake_case")]
pub enum Action {
    TalkWithUser {
        #[serde(default)]
        content: Option<String>,
    },
    ListFiles {
        #[serde(default)]
        path: Option<String>,
    },
    ReadFile {
        #[serde(default)]
        path: Option<String>,
    },
    SearchFile {
        #[serde(default)]
        path: Option<String>,
    },
    RunCommand {
        #[serde(default)]
        command: Option<String>,
    },
    CreateFile {
        #[serde(default)]
        path: Option<String>,
        #[serde(default)]
        content: Option<String>,
    },
    ModifyFile {
        #[serde(default)]
        path: Option<String>,
        /// Replacement text.
        #[serde(default)]
        content: Option<String>,
        /// Exact anchor snippet locating the edit target.
        #[serde(default)]
        target_content: Option<String>,
        /// 1-based inclusive `[start, end]` alternative to the anchor.
        #[serde(default)]
        line_range: Option<Vec<usize>>,
        /// Line-range edits are previewed first; the write only happens
        /// when the agent repeats the edit with this set.
        #[serde(default)]
        confirmed: Option<bool>,
    },
    DeleteFile {
        #[serde(default)]
        path: Option<String>,
    },
    UseTool {
        #[serde(default)]
        tool_name: Option<String>,
        /// JSON-encoded argument object.
        #[serde(default)]
        tool_args: Option<String>,
    },
    ModifyAst {
        #[serde(default)]
        path: Option<String>,
        /// ast-grep style match pattern.
        #[serde(default)]
        pattern: Option<String>,
        /// Rewrite applied to each match.
        #[serde(default)]
        fix: Option<String>,
    },
    SearchAst {
        #[serde(default)]
        path: Option<String>,
        #[serde(default)]
        pattern: Option<String>,
    },
    AstListStructure {
        #[serde(default)]
        path: Option<String>,
    },
    AstAddMethod {
        #[serde(default)]
        path: Option<String>,
        #[serde(default)]
        class_name: Option<String>,
        #[serde(default)]
        method_code: Option<String>,
    },
    AstModifyMethod {
        #[serde(default)]
        path: Option<String>,
        #[serde(default)]
        class_name: Option<String>,
        #[serde(default)]
        method_name: Option<String>,
        /// Replacement method body; the signature is kept.
        #[serde(default)]
        new_body: Option<String>,
    },
    AstRemoveMethod {
        #[serde(default)]
        path: Option<String>,
        #[serde(default)]
        class_name: Option<String>,
        #[serde(default)]
        method_name: Option<String>,
    },
    AstAddClass {
        #[serde(default)]
        path: Option<String>,
        #[serde(default)]
        class_name: Option<String>,
        #[serde(default)]
        extends_class: Option<String>,
        #[serde(default)]
        implements_interfaces: Option<Vec<String>>,
    },
    AstAddProperty {
        #[serde(default)]
        path: Option<String>,
        #[serde(default)]
        class_name: Option<String>,
        #[serde(default)]
        property_code: Option<String>,
    },
    AstRemoveProperty {
        #[serde(default)]
        path: Option<String>,
        #[serde(default)]
        class_name: Option<String>,
        #[serde(default)]
        property_name: Option<String>,
    },
    AstAddDecorator {
        #[serde(default)]
        path: Option<String>,
        #[serde(default)]
        class_name: Option<String>,
        #[serde(default)]
        decorator_code: Option<String>,
    },
    AstAddInterface {
        #[serde(default)]
        path: Option<String>,
        #[serde(default)]
        interface_code: Option<String>,
    },
    AstAddTypeAlias {
        #[serde(default)]
        path: Option<String>,
        #[serde(default)]
        type_code: Option<String>,
    },
    AstAddFunction {
        #[serde(default)]
        path: Option<String>,
        #[serde(default)]
        function_code: Option<String>,
    },
    AstRemoveFunction {
        #[serde(default)]
        path: Option<String>,
        #[serde(default)]
        function_name: Option<String>,
    },
    AstAddImport {
        #[serde(default)]
        path: Option<String>,
        #[serde(default)]
        import_statement: Option<String>,
    },
    AstRemoveImport {
        #[serde(default)]
        path: Option<String>,
        #[serde(default)]
        module_path: Option<String>,
    },
    AstOrganizeImports {
        #[serde(default)]
        path: Option<String>,
    },
}

impl Action {
    /// Wire name of the action kind, for result formatting and logs.
    pub fn kind(&self) -> &'static str {
        match self {
            Action::TalkWithUser { .. } => "talk_with_user",
            Action::ListFiles { .. } => "list_files",
            Action::ReadFile { .. } => "read_file",
            Action::SearchFile { .. } => "search_file",
            Action::RunCommand { .. } => "run_command",
            Action::CreateFile { .. } => "create_file",
            Action::ModifyFile { .. } => "modify_file",
            Action::DeleteFile { .. } => "delete_file",
            Action::UseTool { .. } => "use_tool",
            Action::ModifyAst { .. } => "modify_ast",
            Action::SearchAst { .. } => "search_ast",
            Action::AstListStructure { .. } => "ast_list_structure",
            Action::AstAddMethod { .. } => "ast_add_method",
            Action::AstModifyMethod { .. } => "ast_modify_method",
            Action::AstRemoveMethod { .. } => "ast_remove_method",
            Action::AstAddClass { .. } => "ast_add_class",
            Action::AstAddProperty { .. } => "ast_add_property",
            Action::AstRemoveProperty { .. } => "ast_remove_property",
            Action::AstAddDecorator { .. } => "ast_add_decorator",
            Action::AstAddInterface { .. } => "ast_add_interface",
            Action::AstAddTypeAlias { .. } => "ast_add_type_alias",
            Action::AstAddFunction { .. } => "ast_add_function",
            Action::AstRemoveFunction { .. } => "ast_remove_function",
            Action::AstAddImport { .. } => "ast_add_import",
            Action::AstRemoveImport { .. } => "ast_remove_import",
            Action::AstOrganizeImports { .. } => "ast_organize_imports",
        }
    }

    /// Convenience constructor for the parser's degradation path.
    pub fn talk(content: impl Into<String>) -> Self {
        Action::TalkWithUser {
            content: Some(content.into()),
        }
    }
}

/// Normalized agent turn. After parsing, `actions` is never empty: the
/// interpreter synthesizes a talk action whenever extraction fails or the
/// agent only sent free text.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct AgentResponse {
    pub actions: Vec<Action>,
    #[serde(default)]
    pub summary: Option<String>,
    #[serde(default)]
    pub conversation_id: Option<String>,
    #[serde(default)]
    pub message: Option<String>,
}

/// Status of a single checklist item in the plan document.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub enum TaskStatus {
    Pending,
    InProgress,
    Completed,
}

/// One checklist task. `id` is positional and regenerated every parse; it
/// has no identity across edits of the plan document.
#[derive(Debug, Clone, PartialEq)]
pub struct Task {
    pub id: String,
    /// Marker-line text plus any indented continuation lines.
    pub description: String,
    pub status: TaskStatus,
    /// 0-based line index of the marker line.
    pub line_number: usize,
}

impl Task {
    /// The marker-line portion of the description, used for drift checks
    /// before mutation.
    pub fn marker_description(&self) -> &str {
        self.description.lines().next().unwrap_or("")
    }
}

/// Overall state of the plan document.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum PlanStatus {
    /// No plan document, or a document with no checkbox lines.
    Missing,
    Pending,
    Completed,
}

/// Result of analyzing the plan document.
#[derive(Debug, Clone)]
pub struct PlanState {
    pub status: PlanStatus,
    pub next_task: Option<Task>,
    pub all_tasks: Vec<Task>,
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_action_roundtrip_tag() {
        let json = r#"{"type":"run_command","command":"cargo check"}"#;
        let action: Action = serde_json::from_str(json).unwrap();
        assert_eq!(
            action,
            Action::RunCommand {
                command: Some("cargo check".into())
            }
        );
        assert_eq!(action.kind(), "run_command");
    }

    #[test]
    fn test_unknown_kind_is_rejected() {
        let json = r#"{"type":"summon_demon","path":"/"}"#;
        assert!(serde_json::from_str::<Action>(json).is_err());
    }

    #[test]
    fn test_null_fields_accepted() {
        // The model frequently nulls fields instead of omitting them.
        let json = r#"{"type":"modify_file","path":"a.rs","content":"x",
                       "target_content":null,"line_range":[3,5],"confirmed":null}"#;
        let action: Action = serde_json::from_str(json).unwrap();
        match action {
            Action::ModifyFile {
                line_range,
                confirmed,
                ..
            } => {
                assert_eq!(line_range, Some(vec![3, 5]));
                assert_eq!(confirmed, None);
            }
            other => panic!("unexpected action: {:?}", other),
        }
    }

    #[test]
    fn test_marker_description_is_first_line() {
        let task = Task {
            id: "task-1".into(),
            description: "Do X\nwith details".into(),
            status: TaskStatus::Pending,
            line_number: 4,
        };
        assert_eq!(task.marker_description(), "Do X");
    }
}
