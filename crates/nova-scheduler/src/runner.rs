// SPDX-License-Identifier: Apache-2.0
//! Agent-task execution path (§4.7 steps 1-3): renders the prompt template,
//! builds the thread/message according to `run_mode`, then hands off to
//! `nova-core::TaskExecutor` for the actual turn.

use std::collections::HashMap;
use std::sync::Arc;

use chrono::Utc;
use nova_core::{append_continuous_message, DaySummarizer, EventBus, TaskExecutor};
use nova_model::ModelProvider;
use nova_runtime::summarizer::{needs_refresh, order_for_nightly_run, TriggerMode};
use nova_store::entities::{Actor, NewMessage, RunMode, Task, TaskDefinition, TaskDefinitionId, TaskStatus, Thread, ThreadMode};
use nova_store::ConversationStore;
use uuid::Uuid;

use crate::template::render_template;

pub struct TaskDefinitionRunner {
    store: Arc<dyn ConversationStore>,
    executor: Arc<TaskExecutor>,
    tz: chrono_tz::Tz,
    events: Arc<EventBus>,
    /// `None` when no summarizing model is configured; the heuristic
    /// new-day trigger and nightly pass then simply don't run, the same
    /// graceful-degradation shape `nova-runtime::embeddings` uses when no
    /// embeddings provider is configured.
    summary_provider: Option<Arc<dyn ModelProvider>>,
}

impl TaskDefinitionRunner {
    pub fn new(store: Arc<dyn ConversationStore>, executor: Arc<TaskExecutor>, tz: chrono_tz::Tz, events: Arc<EventBus>) -> Self {
        Self { store, executor, tz, events, summary_provider: None }
    }

    pub fn with_summary_provider(mut self, provider: Arc<dyn ModelProvider>) -> Self {
        self.summary_provider = Some(provider);
        self
    }

    /// Runs one firing of `def` with the given template variables. Returns
    /// the completed (or failed) Task.
    pub async fn run(&self, def: &TaskDefinition, vars: &HashMap<String, String>) -> anyhow::Result<Task> {
        tracing::info!(task_definition = %def.id, name = %def.name, "firing task definition");
        let agent_ref = def
            .agent_ref
            .ok_or_else(|| anyhow::anyhow!("task definition {} has no agent_ref", def.id))?;
        let prompt = render_template(&def.prompt_template, vars);

        let (thread_id, message_id) = match def.run_mode {
            RunMode::ContinuousMessage => {
                let outcome =
                    append_continuous_message(self.store.as_ref(), def.user, Actor::User, prompt, serde_json::Value::Null, &self.tz)
                        .await?;
                if outcome.opened_new_day {
                    if let Some(yesterday) = &outcome.previous_segment {
                        self.summarize_if_due(yesterday, TriggerMode::Heuristic).await.ok();
                    }
                }
                (outcome.thread_id, outcome.message.id)
            }
            RunMode::NewThread | RunMode::Ephemeral => {
                let thread = self.prepare_thread(def).await?;
                let message = self.store.append_message(NewMessage::standard(def.user, thread, Actor::User, prompt)).await?;
                (thread, message.id)
            }
        };

        let task = Task {
            id: Uuid::new_v4(),
            user: def.user,
            thread: thread_id,
            agent_ref,
            status: TaskStatus::Pending,
            progress_log: vec![],
            result: None,
            source_message_id: Some(message_id),
            created_at: Utc::now(),
        };
        self.store.create_task(task.clone()).await?;

        let result = self.executor.execute(task.id).await;

        if def.run_mode == RunMode::Ephemeral {
            self.store.delete_thread(thread_id).await.ok();
        }

        result
    }

    /// Builds the fresh thread this firing appends into, for the run modes
    /// that don't share the continuous thread.
    async fn prepare_thread(&self, def: &TaskDefinition) -> anyhow::Result<nova_store::entities::ThreadId> {
        let subject = match def.run_mode {
            RunMode::NewThread => format!("thread n\u{b0}{}", Uuid::new_v4().as_simple()),
            RunMode::Ephemeral => def.name.clone(),
            RunMode::ContinuousMessage => unreachable!("handled by append_continuous_message in run()"),
        };
        let thread = Thread { id: Uuid::new_v4(), user: def.user, subject, mode: ThreadMode::Thread, created_at: Utc::now() };
        self.store.create_thread(thread.clone()).await?;
        Ok(thread.id)
    }

    async fn summarize_if_due(&self, segment: &nova_store::entities::DaySegment, mode: TriggerMode) -> anyhow::Result<()> {
        let Some(provider) = self.summary_provider.clone() else { return Ok(()) };
        let messages = self.store.list_messages(segment.thread, None).await?;
        let max_id = messages.iter().map(|m| m.id).max();
        if !needs_refresh(segment, max_id) {
            return Ok(());
        }
        DaySummarizer::new(self.store.clone(), provider, self.events.clone())
            .run(segment, mode, Uuid::new_v4())
            .await?;
        Ok(())
    }

    /// Nightly maintenance pass (§4.3): refreshes every closed day that
    /// needs it, oldest first, so each summary can build on the freshly
    /// updated previous day.
    pub async fn run_nightly_summaries(&self, thread_id: nova_store::entities::ThreadId, provider: Arc<dyn ModelProvider>) -> anyhow::Result<usize> {
        let segments = order_for_nightly_run(self.store.list_day_segments(thread_id).await?);
        let messages = self.store.list_messages(thread_id, None).await?;
        let max_id = messages.iter().map(|m| m.id).max();
        let summarizer = DaySummarizer::new(self.store.clone(), provider, self.events.clone());
        let mut ran = 0;
        for segment in &segments {
            if needs_refresh(segment, max_id) && summarizer.run(segment, TriggerMode::Nightly, Uuid::new_v4()).await? {
                ran += 1;
            }
        }
        Ok(ran)
    }
}

pub async fn fire_due_task_definition(
    store: &dyn ConversationStore,
    runner: &TaskDefinitionRunner,
    definition_id: TaskDefinitionId,
) -> anyhow::Result<Task> {
    let def = store.get_task_definition(definition_id).await?;
    if !def.is_active {
        anyhow::bail!("task definition {definition_id} is not active");
    }
    runner.run(&def, &HashMap::new()).await
}

#[cfg(test)]
mod tests {
    use super::*;
    use nova_core::{ProviderResolver, ToolSetBuilder};
    use nova_model::ScriptedMockProvider;
    use nova_store::entities::{AgentConfig, TaskDefinitionKind, TriggerKind};
    use nova_store::{InMemoryCheckpointStore, InMemoryStore};
    use nova_tools::ToolRegistry;

    struct FixedProvider(Arc<dyn ModelProvider>);

    #[async_trait::async_trait]
    impl ProviderResolver for FixedProvider {
        async fn resolve(&self, _config: &AgentConfig) -> anyhow::Result<Arc<dyn ModelProvider>> {
            Ok(self.0.clone())
        }
    }

    struct EmptyTools;

    #[async_trait::async_trait]
    impl ToolSetBuilder for EmptyTools {
        async fn build(&self, _config: &AgentConfig) -> anyhow::Result<Arc<ToolRegistry>> {
            Ok(Arc::new(ToolRegistry::new()))
        }
    }

    fn sample_def(user: Uuid, agent: Uuid, run_mode: RunMode) -> TaskDefinition {
        TaskDefinition {
            id: Uuid::new_v4(),
            user,
            name: "greeting".into(),
            kind: TaskDefinitionKind::Agent,
            trigger: TriggerKind::Cron,
            cron_expression: Some("0 9 * * *".into()),
            cron_tz: "UTC".into(),
            prompt_template: "Say hello to {{name}}.".into(),
            run_mode,
            agent_ref: Some(agent),
            email_tool_ref: None,
            poll_interval_minutes: None,
            runtime_state: serde_json::Value::Null,
            is_active: true,
        }
    }

    async fn setup() -> (TaskDefinitionRunner, Arc<InMemoryStore>, Uuid, Uuid) {
        let store = Arc::new(InMemoryStore::new());
        let user = Uuid::new_v4();
        let agent = AgentConfig {
            id: Uuid::new_v4(),
            user,
            name: "default".into(),
            system_prompt: "be brief".into(),
            provider: "mock".into(),
            model: "mock-model".into(),
            tool_refs: vec![],
            sub_agent_refs: vec![],
            recursion_cap: 10,
            is_default: true,
        };
        store.create_agent_config(agent.clone()).await.unwrap();

        let provider: Arc<dyn ModelProvider> = Arc::new(ScriptedMockProvider::always_text("Hello!"));
        let events = Arc::new(nova_core::EventBus::new());
        let executor = Arc::new(TaskExecutor::new(
            store.clone(),
            Arc::new(InMemoryCheckpointStore::new()),
            Arc::new(nova_core::InMemoryGraphCheckpointStore::new()),
            Arc::new(FixedProvider(provider)),
            Arc::new(EmptyTools),
            events.clone(),
            chrono_tz::UTC,
        ));
        let runner = TaskDefinitionRunner::new(store.clone(), executor, chrono_tz::UTC, events);
        (runner, store, user, agent.id)
    }

    #[tokio::test]
    async fn new_thread_mode_creates_a_fresh_thread_per_run() {
        let (runner, store, user, agent) = setup().await;
        let mut vars = HashMap::new();
        vars.insert("name".to_string(), "Grace".to_string());
        let def = sample_def(user, agent, RunMode::NewThread);

        let task = runner.run(&def, &vars).await.unwrap();
        assert_eq!(task.status, TaskStatus::Completed);
        let threads = store.list_threads(user).await.unwrap();
        assert_eq!(threads.len(), 1);
        let messages = store.list_messages(threads[0].id, None).await.unwrap();
        assert!(messages.iter().any(|m| m.text == "Say hello to Grace."));
    }

    #[tokio::test]
    async fn ephemeral_mode_deletes_its_thread_after_completion() {
        let (runner, store, user, agent) = setup().await;
        let def = sample_def(user, agent, RunMode::Ephemeral);

        let before = store.list_threads(user).await.unwrap().len();
        runner.run(&def, &HashMap::new()).await.unwrap();
        let after = store.list_threads(user).await.unwrap().len();
        assert_eq!(before, after);
    }

    #[tokio::test]
    async fn continuous_message_mode_appends_into_the_single_continuous_thread() {
        let (runner, store, user, agent) = setup().await;
        let def = sample_def(user, agent, RunMode::ContinuousMessage);

        runner.run(&def, &HashMap::new()).await.unwrap();
        runner.run(&def, &HashMap::new()).await.unwrap();

        let threads = store.list_threads(user).await.unwrap();
        assert_eq!(threads.iter().filter(|t| t.mode == ThreadMode::Continuous).count(), 1);
    }
}
