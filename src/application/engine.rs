//! # Engine
//!
//! The turn loop. One `step` sends a prompt, interprets the reply, and
//! dispatches its actions; action results feed the next turn until the
//! agent has nothing left to execute or raises a completion signal.
//! `run` drives the plan workflow on top of that; `dev` is a free-form
//! conversation with the same action vocabulary.

use crate::application::conversation::ConversationStore;
use crate::application::dispatcher::{Dispatcher, TaskSignal};
use crate::application::parsing;
use crate::application::prompts;
use crate::application::tasks::TaskTracker;
use crate::domain::config::WorkflowConfig;
use crate::domain::traits::{AgentBackend, UserPrompt};
use crate::domain::types::{PlanStatus, TaskStatus};
use anyhow::{Context, Result};
use std::io::Write;
use std::sync::Arc;
use tracing::{info, warn};

pub struct Engine {
    backend: Arc<dyn AgentBackend>,
    dispatcher: Dispatcher,
    ui: Arc<dyn UserPrompt>,
    conversations: ConversationStore,
    tracker: TaskTracker,
    workflow: WorkflowConfig,
    agent_key: String,
    agent_id: String,
    /// Echo streamed deltas to stdout as they arrive.
    pub stream_to_stdout: bool,
}

impl Engine {
    #[allow(clippy::too_many_arguments)]
    pub fn new(
        backend: Arc<dyn AgentBackend>,
        dispatcher: Dispatcher,
        ui: Arc<dyn UserPrompt>,
        conversations: ConversationStore,
        tracker: TaskTracker,
        workflow: WorkflowConfig,
        agent_key: String,
        agent_id: String,
    ) -> Self {
        Self {
            backend,
            dispatcher,
            ui,
            conversations,
            tracker,
            workflow,
            agent_key,
            agent_id,
            stream_to_stdout: true,
        }
    }

    /// One request/dispatch round trip.
    async fn turn(&mut self, prompt: &str) -> Result<(String, Option<TaskSignal>, bool)> {
        let conversation_id = self.conversations.get(&self.agent_key).map(str::to_string);
        let echo = self.stream_to_stdout;
        let mut on_chunk = move |delta: &str| {
            if echo {
                print!("{}", delta);
                let _ = std::io::stdout().flush();
            }
        };

        let reply = self
            .backend
            .send_turn(
                &self.agent_id,
                prompt,
                conversation_id.as_deref(),
                &mut on_chunk,
            )
            .await
            .context("Agent turn failed")?;
        if echo {
            println!();
        }

        let response =
            parsing::parse_response(&reply.text).context("Agent response failed validation")?;

        if let Some(id) = reply
            .conversation_id
            .as_deref()
            .or(response.conversation_id.as_deref())
        {
            self.conversations.set(&self.agent_key, id)?;
        }

        let outcome = self.dispatcher.dispatch_turn(&response).await?;
        Ok((outcome.feedback(), outcome.signal, outcome.asked_user))
    }

    /// Run turns until the agent stops producing executable actions or
    /// raises a signal. A turn that addressed the user pauses for a
    /// reply; a turn that only produced tool results auto-continues
    /// with them. Bounded by the configured turn ceiling.
    async fn step(&mut self, initial_prompt: String) -> Result<Option<TaskSignal>> {
        let mut prompt = initial_prompt;
        for _ in 0..self.workflow.max_turns {
            let (feedback, signal, asked_user) = self.turn(&prompt).await?;
            if signal.is_some() {
                return Ok(signal);
            }
            if asked_user {
                let Some(reply) = self.ui.ask(">").await? else {
                    return Ok(None);
                };
                prompt = format!("{}{}", feedback, reply);
            } else if !feedback.is_empty() {
                prompt = format!("{}Continue.", feedback);
            } else {
                return Ok(None);
            }
        }
        warn!("Turn ceiling ({}) reached", self.workflow.max_turns);
        self.ui
            .say("Turn limit reached for this step; stopping here.")
            .await?;
        Ok(None)
    }

    fn project_context(&self) -> Option<String> {
        std::fs::read_to_string(&self.workflow.context_path).ok()
    }

    /// Plan-driven workflow: create the plan if it is missing, then
    /// work tasks one at a time until the plan is complete.
    pub async fn run(&mut self, goal: Option<String>) -> Result<()> {
        loop {
            let state = self.tracker.state()?;
            match state.status {
                PlanStatus::Missing => {
                    let goal = match goal.clone() {
                        Some(g) => g,
                        None => {
                            let Some(g) = self
                                .ui
                                .ask("No plan found. What should be built?")
                                .await?
                            else {
                                return Ok(());
                            };
                            g
                        }
                    };
                    info!("Requesting a new plan");
                    let plan_path = self.tracker.plan_path().display().to_string();
                    self.step(prompts::plan_request(&goal, &plan_path)).await?;

                    // A plan must exist after this round, or we would
                    // loop asking for one forever.
                    if self.tracker.state()?.status == PlanStatus::Missing {
                        self.ui
                            .say("The agent did not produce a plan file. Stopping.")
                            .await?;
                        return Ok(());
                    }
                }
                PlanStatus::Pending => {
                    let task = state
                        .next_task
                        .context("Plan pending but no task selected")?;
                    info!("Working task: {}", task.marker_description());
                    self.tracker.set_status(&task, TaskStatus::InProgress)?;

                    let context = self.project_context();
                    let signal = self
                        .step(prompts::task_prompt(&task, context.as_deref()))
                        .await?;

                    match signal {
                        Some(TaskSignal::Complete) => {
                            self.tracker.set_status(&task, TaskStatus::Completed)?;
                        }
                        Some(TaskSignal::Failed) => {
                            self.tracker.set_status(&task, TaskStatus::Pending)?;
                            self.ui
                                .say("Task reported as failed; plan left as pending.")
                                .await?;
                            return Ok(());
                        }
                        None => {
                            self.ui
                                .say("Task did not reach completion; resume with 'run'.")
                                .await?;
                            return Ok(());
                        }
                    }
                }
                PlanStatus::Completed => {
                    self.ui.say("All plan tasks are complete.").await?;
                    return Ok(());
                }
            }
        }
    }

    /// Interactive conversation with the full action vocabulary.
    pub async fn dev(&mut self) -> Result<()> {
        self.ui
            .say("Interactive session. Type 'exit' to leave.")
            .await?;
        loop {
            let Some(input) = self.ui.ask(">").await? else {
                return Ok(());
            };
            if input.is_empty() {
                continue;
            }
            self.step(prompts::chat_prompt(&input)).await?;
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::application::validation::Validator;
    use crate::domain::config::ValidationConfig;
    use crate::domain::error::ApiError;
    use crate::domain::traits::{Approval, TurnReply};
    use crate::infrastructure::tools::executor::CommandExecutor;
    use async_trait::async_trait;
    use std::sync::Mutex;

    /// Backend that replays canned responses in order.
    struct ScriptedBackend {
        replies: Mutex<Vec<String>>,
    }

    impl ScriptedBackend {
        fn new(replies: Vec<String>) -> Arc<Self> {
            Arc::new(Self {
                replies: Mutex::new(replies),
            })
        }
    }

    #[async_trait]
    impl AgentBackend for ScriptedBackend {
        async fn send_turn(
            &self,
            _agent_id: &str,
            _prompt: &str,
            _conversation_id: Option<&str>,
            on_chunk: &mut (dyn for<'a> FnMut(&'a str) + Send),
        ) -> Result<TurnReply, ApiError> {
            let mut replies = self.replies.lock().unwrap();
            let text = if replies.is_empty() {
                r#"{"actions": [{"type": "talk_with_user", "content": "TASK_FAILED out of script"}]}"#
                    .to_string()
            } else {
                replies.remove(0)
            };
            on_chunk(&text);
            Ok(TurnReply {
                text,
                document: None,
                conversation_id: Some("conv-test".into()),
            })
        }
    }

    struct SilentPrompt;

    #[async_trait]
    impl UserPrompt for SilentPrompt {
        async fn say(&self, _text: &str) -> Result<()> {
            Ok(())
        }
        async fn ask(&self, _prompt: &str) -> Result<Option<String>> {
            Ok(None)
        }
        async fn confirm(&self, _prompt: &str, _allow_session: bool) -> Result<Approval> {
            Ok(Approval::YesForSession)
        }
    }

    fn engine_with(
        dir: &tempfile::TempDir,
        backend: Arc<ScriptedBackend>,
        plan_name: &str,
    ) -> Engine {
        let ui: Arc<dyn UserPrompt> = Arc::new(SilentPrompt);
        let validator = Validator::new(ValidationConfig {
            enabled: false,
            ..Default::default()
        });
        let dispatcher = Dispatcher::new(Arc::clone(&ui), CommandExecutor::new(10), validator);
        let conversations = ConversationStore::open(dir.path().join("conversations.json"));
        let plan_path = dir.path().join(plan_name);
        let tracker = TaskTracker::new(&plan_path);
        let workflow = WorkflowConfig {
            plan_path: plan_path.display().to_string(),
            context_path: dir.path().join("context.md").display().to_string(),
            max_turns: 10,
        };
        let mut engine = Engine::new(
            backend,
            dispatcher,
            ui,
            conversations,
            tracker,
            workflow,
            "dev".into(),
            "agent-1".into(),
        );
        engine.stream_to_stdout = false;
        engine
    }

    #[tokio::test]
    async fn test_missing_plan_is_created_then_worked() {
        let dir = tempfile::tempdir().unwrap();
        let plan_path = dir.path().join("plan.md");

        let create_plan = format!(
            r#"{{"actions": [{{"type": "create_file", "path": "{}", "content": "- [ ] only task\n"}}]}}"#,
            plan_path.display()
        );
        let backend = ScriptedBackend::new(vec![
            create_plan,
            // Result of create_file comes back; agent ends the planning step.
            r#"{"actions": [{"type": "talk_with_user", "content": "plan written"}]}"#.into(),
            // Task turn: agent completes immediately.
            r#"{"actions": [{"type": "talk_with_user", "content": "TASK_COMPLETE"}]}"#.into(),
        ]);

        let mut engine = engine_with(&dir, backend, "plan.md");
        engine.run(Some("build the thing".into())).await.unwrap();

        let plan = std::fs::read_to_string(&plan_path).unwrap();
        assert!(plan.contains("- [x] only task"));
    }

    #[tokio::test]
    async fn test_failed_task_reverts_to_pending() {
        let dir = tempfile::tempdir().unwrap();
        std::fs::write(dir.path().join("plan.md"), "- [ ] doomed task\n").unwrap();

        let backend = ScriptedBackend::new(vec![
            r#"{"actions": [{"type": "talk_with_user", "content": "cannot do it, TASK_FAILED"}]}"#
                .into(),
        ]);
        let mut engine = engine_with(&dir, backend, "plan.md");
        engine.run(None).await.unwrap();

        let plan = std::fs::read_to_string(dir.path().join("plan.md")).unwrap();
        assert!(plan.contains("- [ ] doomed task"));
    }

    #[tokio::test]
    async fn test_completed_plan_ends_immediately() {
        let dir = tempfile::tempdir().unwrap();
        std::fs::write(dir.path().join("plan.md"), "- [x] already done\n").unwrap();

        let backend = ScriptedBackend::new(vec![]);
        let mut engine = engine_with(&dir, Arc::clone(&backend), "plan.md");
        // Must not consume any backend turns.
        engine.run(None).await.unwrap();
        assert_eq!(backend.replies.lock().unwrap().len(), 0);
    }

    #[tokio::test]
    async fn test_action_results_feed_next_turn() {
        let dir = tempfile::tempdir().unwrap();
        let file = dir.path().join("data.txt");
        std::fs::write(&file, "file body here").unwrap();
        std::fs::write(dir.path().join("plan.md"), "- [ ] read the file\n").unwrap();

        let read = format!(
            r#"{{"actions": [{{"type": "read_file", "path": "{}"}}]}}"#,
            file.display()
        );
        let backend = ScriptedBackend::new(vec![
            read,
            r#"{"actions": [{"type": "talk_with_user", "content": "saw it, TASK_COMPLETE"}]}"#
                .into(),
        ]);
        let mut engine = engine_with(&dir, backend, "plan.md");
        engine.run(None).await.unwrap();

        let plan = std::fs::read_to_string(dir.path().join("plan.md")).unwrap();
        assert!(plan.contains("- [x] read the file"));
    }

    #[tokio::test]
    async fn test_conversation_id_persisted() {
        let dir = tempfile::tempdir().unwrap();
        std::fs::write(dir.path().join("plan.md"), "- [x] done\n").unwrap();
        let backend = ScriptedBackend::new(vec![
            r#"{"actions": [{"type": "talk_with_user", "content": "hello"}]}"#.into(),
        ]);
        let mut engine = engine_with(&dir, backend, "plan.md");
        engine.turn("hi").await.unwrap();

        let store = ConversationStore::open(dir.path().join("conversations.json"));
        assert_eq!(store.get("dev"), Some("conv-test"));
    }
}
