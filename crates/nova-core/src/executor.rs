// SPDX-License-Identifier: Apache-2.0
//! Task Executor (§4.1): runs one agent turn end-to-end, routes its outcome
//! into durable state plus Event Bus notifications, and exposes the separate
//! `resume` and `compact` variants.

use std::sync::Arc;

use futures::StreamExt;
use nova_model::{CompletionRequest, Message as ModelMessage, ModelProvider, ResponseEvent, Role};
use nova_runtime::context::load_continuous_context;
use nova_store::checkpoint::{new_checkpoint, CheckpointStore as LinkStore};
use nova_store::entities::{
    Actor, AgentConfig, AgentConfigId, CheckpointLink, Interaction, InteractionStatus, MessageType, NewMessage,
    ProgressSeverity, Task, TaskId, TaskStatus, ThreadId, ThreadMode,
};
use nova_store::ConversationStore;
use nova_tools::ToolRegistry;
use uuid::Uuid;

use crate::checkpoint::GraphCheckpointStore;
use crate::error::{categorize, ExecutorError, TaskErrorCategory};
use crate::event_bus::{sanitize_chunk, Event, EventBus};
use crate::graph::{AgentGraph, GraphOutcome, ToolLoopGraph};

const MAX_TOOL_ROUNDS: u32 = 12;
const COMPACTION_RATIO: f64 = 0.3;
const MIN_COMPACTION_WORD_BUDGET: usize = 50;

/// Resolves the concrete provider a given agent config should use. A
/// separate seam from `nova-model` itself, since constructing wire clients
/// (API keys, base URLs) is a `nova-node` wiring concern.
#[async_trait::async_trait]
pub trait ProviderResolver: Send + Sync {
    async fn resolve(&self, config: &AgentConfig) -> anyhow::Result<Arc<dyn ModelProvider>>;
}

/// Resolves the tool surface (built-ins + plugin-discovered + aggregated) an
/// agent config should be handed, per §4.6.
#[async_trait::async_trait]
pub trait ToolSetBuilder: Send + Sync {
    async fn build(&self, config: &AgentConfig) -> anyhow::Result<Arc<ToolRegistry>>;
}

/// RAII cleanup: prunes the event channel for a task on every exit path
/// (§4.1 "Cleanup ... runs on every exit path"), success or failure alike.
struct TaskGuard<'a> {
    events: &'a EventBus,
    task: TaskId,
}

impl Drop for TaskGuard<'_> {
    fn drop(&mut self) {
        self.events.prune_if_idle(self.task);
    }
}

pub struct TaskExecutor {
    store: Arc<dyn ConversationStore>,
    checkpoint_links: Arc<dyn LinkStore>,
    graph_checkpoints: Arc<dyn GraphCheckpointStore>,
    providers: Arc<dyn ProviderResolver>,
    tools: Arc<dyn ToolSetBuilder>,
    events: Arc<EventBus>,
    tz: chrono_tz::Tz,
}

impl TaskExecutor {
    pub fn new(
        store: Arc<dyn ConversationStore>,
        checkpoint_links: Arc<dyn LinkStore>,
        graph_checkpoints: Arc<dyn GraphCheckpointStore>,
        providers: Arc<dyn ProviderResolver>,
        tools: Arc<dyn ToolSetBuilder>,
        events: Arc<EventBus>,
        tz: chrono_tz::Tz,
    ) -> Self {
        Self { store, checkpoint_links, graph_checkpoints, providers, tools, events, tz }
    }

    async fn build_graph(&self, config: &AgentConfig) -> anyhow::Result<(ToolLoopGraph, Arc<dyn ModelProvider>)> {
        let provider = self.providers.resolve(config).await?;
        let tools = self.tools.build(config).await?;
        let graph = ToolLoopGraph::new(
            provider.clone(),
            tools,
            self.graph_checkpoints.clone(),
            config.system_prompt.clone(),
            MAX_TOOL_ROUNDS,
        );
        Ok((graph, provider))
    }

    async fn checkpoint_link_for(&self, thread: ThreadId, agent_ref: AgentConfigId) -> anyhow::Result<CheckpointLink> {
        match self.checkpoint_links.get(thread, agent_ref).await? {
            Some(link) => Ok(link),
            None => {
                let link = new_checkpoint(thread, agent_ref);
                self.checkpoint_links.update(link.clone()).await?;
                Ok(link)
            }
        }
    }

    /// Rebuilds the continuous-context checkpoint iff its fingerprint
    /// changed, per §4.2.
    async fn rebuild_continuous_context_if_stale(
        &self,
        mut link: CheckpointLink,
        user: uuid::Uuid,
        thread: ThreadId,
        exclude_message_id: Option<nova_store::entities::MessageId>,
    ) -> anyhow::Result<CheckpointLink> {
        let (snapshot, messages) =
            load_continuous_context(self.store.as_ref(), user, thread, &self.tz, exclude_message_id).await?;
        let fingerprint = nova_runtime::context::compute_fingerprint(&snapshot);

        if link.continuous_context_fingerprint.as_deref() != Some(fingerprint.as_str()) {
            self.graph_checkpoints.delete(link.id).await?;
            self.graph_checkpoints.update(link.id, messages).await?;
            link.continuous_context_fingerprint = Some(fingerprint);
            link.continuous_context_built_at = Some(chrono::Utc::now());
            self.checkpoint_links.update(link.clone()).await?;
        }
        Ok(link)
    }

    async fn mark_running(&self, mut task: Task) -> anyhow::Result<Task> {
        task.status = TaskStatus::Running;
        task.push_progress("executor started", ProgressSeverity::Info);
        self.store.update_task(task.clone()).await?;
        self.events.publish(task.id, Event::ProgressUpdate { progress_log: task.progress_log.last().unwrap().clone() });
        Ok(task)
    }

    async fn maybe_autotitle(&self, thread: &nova_store::entities::Thread, provider: &dyn ModelProvider) -> anyhow::Result<()> {
        if !thread.has_default_subject() {
            return Ok(());
        }
        let req = CompletionRequest {
            messages: vec![ModelMessage::user(
                "Reply with a 1-3 word title for this conversation, in its language, with no punctuation.",
            )],
            tools: vec![],
            stream: true,
        };
        let mut stream = provider.complete(req).await?;
        let mut title = String::new();
        while let Some(event) = stream.next().await {
            if let ResponseEvent::TextDelta(delta) = event? {
                title.push_str(&delta);
            }
        }
        let title = title.trim();
        if !title.is_empty() {
            self.store.rename_thread(thread.id, title.to_string()).await?;
        }
        Ok(())
    }

    fn context_consumption_event(
        messages: &[ModelMessage],
        usage: Option<nova_model::Usage>,
        provider: &dyn ModelProvider,
    ) -> Event {
        let real_tokens = usage.map(|u| u.input_tokens + u.output_tokens);
        let approx_tokens = if real_tokens.is_none() {
            Some(messages.iter().map(|m| m.approx_tokens() as u32).sum())
        } else {
            None
        };
        Event::ContextConsumption { real_tokens, approx_tokens, max_context: provider.context_window() }
    }

    async fn route_outcome(
        &self,
        mut task: Task,
        agent_ref: AgentConfigId,
        thread: &nova_store::entities::Thread,
        provider: &dyn ModelProvider,
        outcome: GraphOutcome,
    ) -> anyhow::Result<Task> {
        match outcome {
            GraphOutcome::Completed { text, usage } => {
                let message = self
                    .store
                    .append_message(NewMessage::standard(task.user, thread.id, Actor::Agent, text.clone()))
                    .await?;
                task.status = TaskStatus::Completed;
                task.result = Some(text.clone());
                task.push_progress("completed", ProgressSeverity::Success);
                self.store.update_task(task.clone()).await?;

                self.maybe_autotitle(thread, provider).await.ok();

                self.events.publish(task.id, Event::NewMessage { message });
                self.events.publish(
                    task.id,
                    Event::ResponseChunk { chunk: sanitize_chunk(&text) },
                );
                if let Some(tuple) = {
                    let link = self.checkpoint_links.get(thread.id, agent_ref).await?;
                    match link {
                        Some(l) => self
                            .graph_checkpoints
                            .get(l.id)
                            .await
                            .ok()
                            .flatten()
                            .map(|state| (state, usage)),
                        None => None,
                    }
                } {
                    self.events.publish(task.id, Self::context_consumption_event(&tuple.0, tuple.1, provider));
                }
                self.events.publish(
                    task.id,
                    Event::TaskComplete { result: text, thread_id: Some(thread.id), thread_subject: Some(thread.subject.clone()) },
                );
                Ok(task)
            }
            GraphOutcome::Interrupt(payload) => {
                let question_message = self
                    .store
                    .append_message(NewMessage {
                        user: task.user,
                        thread: thread.id,
                        actor: Actor::System,
                        text: payload.question.clone(),
                        internal_data: serde_json::Value::Null,
                        kind: MessageType::Question,
                        interaction: None,
                    })
                    .await?;

                let interaction_id = Uuid::new_v4();
                let interaction = Interaction {
                    id: interaction_id,
                    task: task.id,
                    thread: thread.id,
                    agent_ref,
                    origin_name: payload.origin_name.clone(),
                    question: payload.question.clone(),
                    schema: payload.schema.clone(),
                    answer: None,
                    resume_payload: Some(payload.resume_payload.clone()),
                    status: InteractionStatus::Pending,
                    question_message: Some(question_message.id),
                    created_at: chrono::Utc::now(),
                };
                self.store.create_interaction(interaction).await?;

                task.status = TaskStatus::AwaitingInput;
                task.push_progress("awaiting user input", ProgressSeverity::Info);
                self.store.update_task(task.clone()).await?;

                self.events.publish(task.id, Event::NewMessage { message: question_message });
                self.events.publish(
                    task.id,
                    Event::Interrupt {
                        interaction_id,
                        question: payload.question,
                        schema: payload.schema,
                        origin_name: payload.origin_name,
                    },
                );
                Ok(task)
            }
        }
    }

    async fn fail(&self, mut task: Task, err: ExecutorError) -> anyhow::Result<Task> {
        let category = categorize(&err);
        task.status = TaskStatus::Failed;
        task.result = Some(err.to_string());
        task.push_progress(err.to_string(), ProgressSeverity::Error);
        self.store.update_task(task.clone()).await?;
        self.events.publish(task.id, Event::TaskError { message: err.to_string(), category });
        Ok(task)
    }

    /// §4.1 `execute(task_id)`.
    pub async fn execute(&self, task_id: TaskId) -> anyhow::Result<Task> {
        let _guard = TaskGuard { events: &self.events, task: task_id };

        let task = self.store.get_task(task_id).await.map_err(ExecutorError::Store)?;
        let thread = self.store.get_thread(task.thread).await.map_err(ExecutorError::Store)?;
        let agent_config = self.store.get_agent_config(task.agent_ref).await.map_err(ExecutorError::Store)?;

        let pre_run_task = task.clone();
        let task = match self.mark_running(task).await {
            Ok(t) => t,
            Err(e) => return self.fail(pre_run_task, ExecutorError::Other(e)).await,
        };

        let run: anyhow::Result<(GraphOutcome, Arc<dyn ModelProvider>)> = async {
            let (graph, provider) = self.build_graph(&agent_config).await?;
            let mut link = self.checkpoint_link_for(thread.id, agent_config.id).await?;
            if thread.mode == ThreadMode::Continuous {
                link = self
                    .rebuild_continuous_context_if_stale(link, task.user, thread.id, task.source_message_id)
                    .await?;
            }

            let input = match task.source_message_id {
                Some(id) => {
                    let msg = self.store.get_message(id).await?;
                    vec![ModelMessage::user(msg.text)]
                }
                None => vec![],
            };

            let outcome = graph.invoke(link.id, input).await?;
            anyhow::Ok((outcome, provider))
        }
        .await;

        match run {
            Ok((outcome, provider)) => self.route_outcome(task, agent_config.id, &thread, provider.as_ref(), outcome).await,
            Err(e) => self.fail(task, ExecutorError::Other(e)).await,
        }
    }

    /// §6 "POST /interactions/<id>/answer": idempotent on a non-pending
    /// interaction (returns its task unchanged), otherwise records the
    /// answer, publishes `interaction_update`, and enqueues the resume path.
    pub async fn answer(&self, interaction_id: Uuid, answer: String) -> anyhow::Result<Task> {
        let interaction = self.store.get_interaction(interaction_id).await.map_err(ExecutorError::Store)?;
        if interaction.status != InteractionStatus::Pending {
            return self.store.get_task(interaction.task).await.map_err(|e| e.into());
        }

        self.store.answer_interaction(interaction_id, answer).await.map_err(ExecutorError::Store)?;
        self.events
            .publish(interaction.task, Event::InteractionUpdate { interaction_id, status: InteractionStatus::Answered });

        self.resume(interaction_id).await
    }

    /// §4.1 `resume(interaction_id)`.
    pub async fn resume(&self, interaction_id: Uuid) -> anyhow::Result<Task> {
        let interaction = self.store.get_interaction(interaction_id).await.map_err(ExecutorError::Store)?;
        if interaction.status != InteractionStatus::Answered {
            anyhow::bail!(ExecutorError::InteractionNotAnswered);
        }
        let answer = interaction.answer.clone().ok_or(ExecutorError::InteractionNotAnswered)?;

        let task = self.store.get_task(interaction.task).await.map_err(ExecutorError::Store)?;
        let _guard = TaskGuard { events: &self.events, task: task.id };
        let thread = self.store.get_thread(interaction.thread).await.map_err(ExecutorError::Store)?;
        let agent_config = self.store.get_agent_config(interaction.agent_ref).await.map_err(ExecutorError::Store)?;

        let task = self.mark_running(task).await?;

        let run: anyhow::Result<(GraphOutcome, Arc<dyn ModelProvider>)> = async {
            let (graph, provider) = self.build_graph(&agent_config).await?;
            let link = self.checkpoint_link_for(thread.id, agent_config.id).await?;
            let resume_payload = interaction.resume_payload.clone().unwrap_or(serde_json::Value::Null);
            let outcome = graph.resume(link.id, resume_payload, answer).await?;
            anyhow::Ok((outcome, provider))
        }
        .await;

        match run {
            Ok((outcome, provider)) => self.route_outcome(task, agent_config.id, &thread, provider.as_ref(), outcome).await,
            Err(e) => self.fail(task, ExecutorError::Other(e)).await,
        }
    }

    /// §5 "A pending Interaction may be canceled": idempotent on a
    /// non-pending interaction (returns the task unchanged), otherwise
    /// transitions Task→failed with the canonical cancellation result and
    /// publishes both `interaction_update` and `task_error`.
    pub async fn cancel(&self, interaction_id: Uuid) -> anyhow::Result<Task> {
        let interaction = self.store.get_interaction(interaction_id).await.map_err(ExecutorError::Store)?;
        let task = self.store.get_task(interaction.task).await.map_err(ExecutorError::Store)?;
        if interaction.status != InteractionStatus::Pending {
            return Ok(task);
        }

        let _guard = TaskGuard { events: &self.events, task: task.id };
        self.store.cancel_interaction(interaction_id).await.map_err(ExecutorError::Store)?;
        self.events.publish(task.id, Event::InteractionUpdate { interaction_id, status: InteractionStatus::Canceled });

        self.fail(task, ExecutorError::InteractionCanceled).await
    }

    /// Conversation compacting (§4.1, separate executor variant): summarize
    /// the current checkpoint state down to ~0.3x its token usage and
    /// re-seed with a single synthetic summary message.
    pub async fn compact(&self, thread: ThreadId, agent_ref: AgentConfigId) -> anyhow::Result<()> {
        let agent_config = self.store.get_agent_config(agent_ref).await.map_err(ExecutorError::Store)?;
        let provider = self.providers.resolve(&agent_config).await?;
        let link = self.checkpoint_link_for(thread, agent_ref).await?;
        let state = self.graph_checkpoints.get(link.id).await?.unwrap_or_default();

        let current_tokens: usize = state.iter().map(|m| m.approx_tokens()).sum();
        let word_budget = ((current_tokens as f64) * COMPACTION_RATIO).round().max(MIN_COMPACTION_WORD_BUDGET as f64) as usize;

        let mut messages = state;
        messages.push(ModelMessage::user(format!(
            "Summarize this conversation so far in Markdown, in no more than {word_budget} words, preserving what matters to continue it."
        )));
        let mut stream = provider.complete(CompletionRequest { messages, tools: vec![], stream: true }).await?;
        let mut summary = String::new();
        while let Some(event) = stream.next().await {
            if let ResponseEvent::TextDelta(delta) = event? {
                summary.push_str(&delta);
            }
        }

        self.graph_checkpoints.delete(link.id).await?;
        self.graph_checkpoints
            .update(link.id, vec![ModelMessage { role: Role::Assistant, content: nova_model::MessageContent::Text(summary) }])
            .await?;

        let thread_row = self.store.get_thread(thread).await?;
        let notice = self
            .store
            .append_message(NewMessage {
                user: thread_row.user,
                thread,
                actor: Actor::System,
                text: "Conversation compacted.".into(),
                internal_data: serde_json::json!({"summary": true}),
                kind: MessageType::Standard,
                interaction: None,
            })
            .await?;
        self.events.publish(link.id, Event::NewMessage { message: notice });
        Ok(())
    }
}

/// List-then-create helper for a user's single continuous thread (§3: one
/// continuous-mode thread per user).
pub async fn ensure_continuous_thread(
    store: &dyn ConversationStore,
    user: uuid::Uuid,
) -> anyhow::Result<nova_store::entities::Thread> {
    let existing = store.list_threads(user).await?;
    if let Some(found) = existing.into_iter().find(|t| t.mode == ThreadMode::Continuous) {
        return Ok(found);
    }
    let thread = nova_store::entities::Thread {
        id: Uuid::new_v4(),
        user,
        subject: "thread n\u{b0}1".into(),
        mode: ThreadMode::Continuous,
        created_at: chrono::Utc::now(),
    };
    store.create_thread(thread.clone()).await?;
    Ok(thread)
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::checkpoint::InMemoryGraphCheckpointStore;
    use nova_model::ScriptedMockProvider;
    use nova_store::entities::{AgentConfig, ThreadMode};
    use nova_store::{InMemoryCheckpointStore, InMemoryStore};

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

    async fn sample_setup() -> (TaskExecutor, Arc<InMemoryStore>, Uuid, Uuid, Uuid) {
        let store = Arc::new(InMemoryStore::new());
        let user = Uuid::new_v4();
        let thread = ensure_continuous_thread(store.as_ref(), user).await.unwrap();
        let agent = AgentConfig {
            id: Uuid::new_v4(),
            user,
            name: "default".into(),
            system_prompt: "you are nova".into(),
            provider: "mock".into(),
            model: "mock-model".into(),
            tool_refs: vec![],
            sub_agent_refs: vec![],
            recursion_cap: 10,
            is_default: true,
        };
        store.create_agent_config(agent.clone()).await.unwrap();

        let source = store
            .append_message(NewMessage::standard(user, thread.id, Actor::User, "Hello"))
            .await
            .unwrap();

        let task = Task {
            id: Uuid::new_v4(),
            user,
            thread: thread.id,
            agent_ref: agent.id,
            status: TaskStatus::Pending,
            progress_log: vec![],
            result: None,
            source_message_id: Some(source.id),
            created_at: chrono::Utc::now(),
        };
        store.create_task(task.clone()).await.unwrap();

        let provider: Arc<dyn ModelProvider> = Arc::new(ScriptedMockProvider::always_text("Hi there!"));
        let executor = TaskExecutor::new(
            store.clone(),
            Arc::new(InMemoryCheckpointStore::new()),
            Arc::new(InMemoryGraphCheckpointStore::new()),
            Arc::new(FixedProvider(provider)),
            Arc::new(EmptyTools),
            Arc::new(EventBus::new()),
            chrono_tz::UTC,
        );
        (executor, store, user, thread.id, task.id)
    }

    #[tokio::test]
    async fn execute_completes_and_appends_agent_message() {
        let (executor, store, _user, thread, task_id) = sample_setup().await;
        let task = executor.execute(task_id).await.unwrap();
        assert_eq!(task.status, TaskStatus::Completed);
        let messages = store.list_messages(thread, None).await.unwrap();
        assert!(messages.iter().any(|m| m.text == "Hi there!" && m.actor == Actor::Agent));
    }

    #[tokio::test]
    async fn execute_with_ask_user_creates_pending_interaction() {
        let store = Arc::new(InMemoryStore::new());
        let user = Uuid::new_v4();
        let thread = ensure_continuous_thread(store.as_ref(), user).await.unwrap();
        let agent = AgentConfig {
            id: Uuid::new_v4(),
            user,
            name: "default".into(),
            system_prompt: String::new(),
            provider: "mock".into(),
            model: "mock-model".into(),
            tool_refs: vec![],
            sub_agent_refs: vec![],
            recursion_cap: 10,
            is_default: true,
        };
        store.create_agent_config(agent.clone()).await.unwrap();
        let source = store
            .append_message(NewMessage::standard(user, thread.id, Actor::User, "book a meeting"))
            .await
            .unwrap();
        let task = Task {
            id: Uuid::new_v4(),
            user,
            thread: thread.id,
            agent_ref: agent.id,
            status: TaskStatus::Pending,
            progress_log: vec![],
            result: None,
            source_message_id: Some(source.id),
            created_at: chrono::Utc::now(),
        };
        store.create_task(task.clone()).await.unwrap();

        let provider: Arc<dyn ModelProvider> =
            Arc::new(ScriptedMockProvider::ask_user("call-1", r#"{"question":"Which calendar?","agent_name":"Calendar"}"#));
        let executor = TaskExecutor::new(
            store.clone(),
            Arc::new(InMemoryCheckpointStore::new()),
            Arc::new(InMemoryGraphCheckpointStore::new()),
            Arc::new(FixedProvider(provider)),
            Arc::new(EmptyTools),
            Arc::new(EventBus::new()),
            chrono_tz::UTC,
        );

        let result = executor.execute(task.id).await.unwrap();
        assert_eq!(result.status, TaskStatus::AwaitingInput);
        let pending = store.list_pending_interactions(user).await.unwrap();
        assert_eq!(pending.len(), 1);
        assert_eq!(pending[0].question, "Which calendar?");
    }

    #[tokio::test]
    async fn canceling_a_pending_interaction_fails_the_task_canonically() {
        let store = Arc::new(InMemoryStore::new());
        let user = Uuid::new_v4();
        let thread = ensure_continuous_thread(store.as_ref(), user).await.unwrap();
        let agent = AgentConfig {
            id: Uuid::new_v4(),
            user,
            name: "default".into(),
            system_prompt: String::new(),
            provider: "mock".into(),
            model: "mock-model".into(),
            tool_refs: vec![],
            sub_agent_refs: vec![],
            recursion_cap: 10,
            is_default: true,
        };
        store.create_agent_config(agent.clone()).await.unwrap();
        let source = store
            .append_message(NewMessage::standard(user, thread.id, Actor::User, "book a meeting"))
            .await
            .unwrap();
        let task = Task {
            id: Uuid::new_v4(),
            user,
            thread: thread.id,
            agent_ref: agent.id,
            status: TaskStatus::Pending,
            progress_log: vec![],
            result: None,
            source_message_id: Some(source.id),
            created_at: chrono::Utc::now(),
        };
        store.create_task(task.clone()).await.unwrap();

        let provider: Arc<dyn ModelProvider> =
            Arc::new(ScriptedMockProvider::ask_user("call-1", r#"{"question":"Which calendar?","agent_name":"Calendar"}"#));
        let executor = TaskExecutor::new(
            store.clone(),
            Arc::new(InMemoryCheckpointStore::new()),
            Arc::new(InMemoryGraphCheckpointStore::new()),
            Arc::new(FixedProvider(provider)),
            Arc::new(EmptyTools),
            Arc::new(EventBus::new()),
            chrono_tz::UTC,
        );

        executor.execute(task.id).await.unwrap();
        let pending = store.list_pending_interactions(user).await.unwrap();
        let interaction_id = pending[0].id;

        let canceled = executor.cancel(interaction_id).await.unwrap();
        assert_eq!(canceled.status, TaskStatus::Failed);
        assert_eq!(canceled.result.as_deref(), Some("Interaction canceled by user"));

        // Idempotent: canceling again just returns the already-failed task.
        let again = executor.cancel(interaction_id).await.unwrap();
        assert_eq!(again.status, TaskStatus::Failed);
    }

    #[tokio::test]
    async fn answering_a_pending_interaction_resumes_the_task() {
        let store = Arc::new(InMemoryStore::new());
        let user = Uuid::new_v4();
        let thread = ensure_continuous_thread(store.as_ref(), user).await.unwrap();
        let agent = AgentConfig {
            id: Uuid::new_v4(),
            user,
            name: "default".into(),
            system_prompt: String::new(),
            provider: "mock".into(),
            model: "mock-model".into(),
            tool_refs: vec![],
            sub_agent_refs: vec![],
            recursion_cap: 10,
            is_default: true,
        };
        store.create_agent_config(agent.clone()).await.unwrap();
        let source = store
            .append_message(NewMessage::standard(user, thread.id, Actor::User, "book a meeting"))
            .await
            .unwrap();
        let task = Task {
            id: Uuid::new_v4(),
            user,
            thread: thread.id,
            agent_ref: agent.id,
            status: TaskStatus::Pending,
            progress_log: vec![],
            result: None,
            source_message_id: Some(source.id),
            created_at: chrono::Utc::now(),
        };
        store.create_task(task.clone()).await.unwrap();

        let provider: Arc<dyn ModelProvider> =
            Arc::new(ScriptedMockProvider::ask_user("call-1", r#"{"question":"Which calendar?","agent_name":"Calendar"}"#));
        let executor = TaskExecutor::new(
            store.clone(),
            Arc::new(InMemoryCheckpointStore::new()),
            Arc::new(InMemoryGraphCheckpointStore::new()),
            Arc::new(FixedProvider(provider)),
            Arc::new(EmptyTools),
            Arc::new(EventBus::new()),
            chrono_tz::UTC,
        );

        executor.execute(task.id).await.unwrap();
        let pending = store.list_pending_interactions(user).await.unwrap();
        let interaction_id = pending[0].id;

        let resumed = executor.answer(interaction_id, "Work calendar".into()).await.unwrap();
        assert_eq!(resumed.status, TaskStatus::Completed);

        // Idempotent: answering again doesn't re-run or error.
        let again = executor.answer(interaction_id, "ignored".into()).await.unwrap();
        assert_eq!(again.id, resumed.id);
    }

    #[test]
    fn thread_mode_used_in_import_is_not_dead() {
        let _ = ThreadMode::Thread;
    }

    #[tokio::test]
    async fn compact_publishes_the_compaction_notice_as_a_new_message_event() {
        let store = Arc::new(InMemoryStore::new());
        let user = Uuid::new_v4();
        let thread = ensure_continuous_thread(store.as_ref(), user).await.unwrap();
        let agent = AgentConfig {
            id: Uuid::new_v4(),
            user,
            name: "default".into(),
            system_prompt: String::new(),
            provider: "mock".into(),
            model: "mock-model".into(),
            tool_refs: vec![],
            sub_agent_refs: vec![],
            recursion_cap: 10,
            is_default: true,
        };
        store.create_agent_config(agent.clone()).await.unwrap();
        store
            .append_message(NewMessage::standard(user, thread.id, Actor::User, "a long chat so far"))
            .await
            .unwrap();

        let checkpoint_links = Arc::new(InMemoryCheckpointStore::new());
        let link = new_checkpoint(thread.id, agent.id);
        checkpoint_links.update(link.clone()).await.unwrap();

        let events = Arc::new(EventBus::new());
        let mut rx = events.subscribe(link.id);

        let provider: Arc<dyn ModelProvider> = Arc::new(ScriptedMockProvider::always_text("- summary of the chat"));
        let executor = TaskExecutor::new(
            store.clone(),
            checkpoint_links,
            Arc::new(InMemoryGraphCheckpointStore::new()),
            Arc::new(FixedProvider(provider)),
            Arc::new(EmptyTools),
            events,
            chrono_tz::UTC,
        );

        executor.compact(thread.id, agent.id).await.unwrap();

        let event = rx.recv().await.unwrap();
        match event {
            Event::NewMessage { message } => assert_eq!(message.text, "Conversation compacted."),
            other => panic!("expected Event::NewMessage, got {other:?}"),
        }
    }
}
