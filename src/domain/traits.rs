//! # Domain Traits
//!
//! Abstract interfaces at the engine's seams: the remote agent endpoint,
//! the user-facing prompt surface, structurally-aware code editors, and
//! named external tools. Infrastructure provides the real implementations;
//! tests provide scripted ones.

use crate::domain::error::ApiError;
use async_trait::async_trait;

/// Raw material of one agent turn, before interpretation.
#[derive(Debug, Clone, Default)]
pub struct TurnReply {
    /// Accumulated text (streamed deltas or the extracted body).
    pub text: String,
    /// Whole-document metadata when the endpoint answered with a single
    /// JSON document instead of a stream.
    pub document: Option<serde_json::Value>,
    /// Correlation id captured from any frame.
    pub conversation_id: Option<String>,
}

/// Abstract remote agent endpoint.
#[async_trait]
pub trait AgentBackend: Send + Sync {
    /// Send one prompt and collect the reply, invoking `on_chunk` for each
    /// incremental text delta.
    async fn send_turn(
        &self,
        agent_id: &str,
        prompt: &str,
        conversation_id: Option<&str>,
        on_chunk: &mut (dyn for<'a> FnMut(&'a str) + Send),
    ) -> Result<TurnReply, ApiError>;
}

/// Outcome of a confirmation prompt. `YesForSession` escalates to
/// auto-approval for the rest of the session, scoped to one action
/// category.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Approval {
    Yes,
    YesForSession,
    No,
}

/// Abstract user-facing prompt surface. Terminal rendering lives behind
/// this; the engine only ever says, asks, and confirms.
#[async_trait]
pub trait UserPrompt: Send + Sync {
    /// Surface agent-authored text to the user.
    async fn say(&self, text: &str) -> anyhow::Result<()>;

    /// Solicit one line of free text. `None` means the user cancelled.
    async fn ask(&self, prompt: &str) -> anyhow::Result<Option<String>>;

    /// Ask for approval. `allow_session` offers the "approve for the whole
    /// session" choice.
    async fn confirm(&self, prompt: &str, allow_session: bool) -> anyhow::Result<Approval>;
}

/// Structurally-aware editor for one family of file types. Backends are
/// external collaborators; the engine only routes to them by extension.
pub trait StructuredEditor: Send + Sync {
    /// Human-readable outline of the file (classes, functions, imports).
    fn list_structure(&self, path: &str) -> anyhow::Result<String>;
    fn add_function(&self, path: &str, function_code: &str) -> anyhow::Result<()>;
    fn remove_function(&self, path: &str, function_name: &str) -> anyhow::Result<()>;
    fn add_import(&self, path: &str, import_statement: &str) -> anyhow::Result<()>;
    fn remove_import(&self, path: &str, module_path: &str) -> anyhow::Result<()>;
    fn organize_imports(&self, path: &str) -> anyhow::Result<()>;
}

/// A named external tool the agent may invoke via `use_tool`.
#[async_trait]
pub trait ExternalTool: Send + Sync {
    async fn call(&self, args: serde_json::Value) -> anyhow::Result<String>;
}
