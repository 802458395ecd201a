// SPDX-License-Identifier: Apache-2.0
//! End-to-end scenarios across the store/core/scheduler/node crates, using
//! `ScriptedMockProvider` and `FakeMailboxPoller` in place of concrete wire
//! clients (out of scope per `nova-model`/`nova-scheduler`'s own notes).

use std::collections::HashMap;
use std::sync::Arc;

use async_trait::async_trait;
use chrono::{Duration, Utc};
use uuid::Uuid;

use nova_core::{
    append_continuous_message, ensure_continuous_thread, EventBus, InMemoryGraphCheckpointStore, ProviderResolver,
    TaskExecutor, ToolSetBuilder,
};
use nova_model::{ModelProvider, ScriptedMockProvider};
use nova_node::{interactions, AppState};
use nova_scheduler::{fire_due_task_definition, poll_mailbox, CronBridge, EmailEnvelope, FakeMailboxPoller, TaskDefinitionRunner};
use nova_store::entities::{
    Actor, AgentConfig, EmailPollRuntimeState, RunMode, Task, TaskDefinition, TaskDefinitionKind, TaskStatus, TriggerKind,
};
use nova_store::{ConversationStore, InMemoryCheckpointStore, InMemoryStore};
use nova_tools::ToolRegistry;

struct FixedProvider(Arc<dyn ModelProvider>);

#[async_trait]
impl ProviderResolver for FixedProvider {
    async fn resolve(&self, _config: &AgentConfig) -> anyhow::Result<Arc<dyn ModelProvider>> {
        Ok(self.0.clone())
    }
}

struct EmptyTools;

#[async_trait]
impl ToolSetBuilder for EmptyTools {
    async fn build(&self, _config: &AgentConfig) -> anyhow::Result<Arc<ToolRegistry>> {
        Ok(Arc::new(ToolRegistry::new()))
    }
}

fn sample_agent(user: Uuid) -> AgentConfig {
    AgentConfig {
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
    }
}

async fn harness(provider: Arc<dyn ModelProvider>) -> (Arc<InMemoryStore>, Arc<TaskExecutor>, Uuid, AgentConfig) {
    let store = Arc::new(InMemoryStore::new());
    let user = Uuid::new_v4();
    let agent = sample_agent(user);
    store.create_agent_config(agent.clone()).await.unwrap();

    let executor = Arc::new(TaskExecutor::new(
        store.clone(),
        Arc::new(InMemoryCheckpointStore::new()),
        Arc::new(InMemoryGraphCheckpointStore::new()),
        Arc::new(FixedProvider(provider)),
        Arc::new(EmptyTools),
        Arc::new(EventBus::new()),
        chrono_tz::UTC,
    ));
    (store, executor, user, agent)
}

async fn app_state(store: Arc<InMemoryStore>, executor: Arc<TaskExecutor>, user: Uuid) -> Arc<AppState> {
    Arc::new(AppState {
        store,
        executor,
        events: Arc::new(EventBus::new()),
        user,
        tz: chrono_tz::UTC,
        token: nova_node::auth::RawToken::generate().into_stored(),
        summary_provider: None,
    })
}

#[tokio::test]
async fn ingest_runs_a_task_to_completion_and_appends_the_reply() {
    let provider: Arc<dyn ModelProvider> = Arc::new(ScriptedMockProvider::always_text("hello back"));
    let (store, executor, user, agent) = harness(provider).await;

    let outcome = append_continuous_message(store.as_ref(), user, Actor::User, "hi nova", serde_json::Value::Null, &chrono_tz::UTC)
        .await
        .unwrap();

    let task = Task {
        id: Uuid::new_v4(),
        user,
        thread: outcome.thread_id,
        agent_ref: agent.id,
        status: TaskStatus::Pending,
        progress_log: vec![],
        result: None,
        source_message_id: Some(outcome.message.id),
        created_at: Utc::now(),
    };
    store.create_task(task.clone()).await.unwrap();

    let finished = executor.execute(task.id).await.unwrap();
    assert_eq!(finished.status, TaskStatus::Completed);

    let messages = store.list_messages(outcome.thread_id, None).await.unwrap();
    assert!(messages.iter().any(|m| m.actor == Actor::Agent && m.text.contains("hello back")));
}

#[tokio::test]
async fn ask_user_interrupt_then_answer_resumes_and_completes_the_task() {
    let provider: Arc<dyn ModelProvider> = Arc::new(ScriptedMockProvider::ask_user("call-1", r#"{"question":"which one?"}"#));
    let (store, executor, user, agent) = harness(provider).await;

    let outcome = append_continuous_message(store.as_ref(), user, Actor::User, "do the thing", serde_json::Value::Null, &chrono_tz::UTC)
        .await
        .unwrap();
    let task = Task {
        id: Uuid::new_v4(),
        user,
        thread: outcome.thread_id,
        agent_ref: agent.id,
        status: TaskStatus::Pending,
        progress_log: vec![],
        result: None,
        source_message_id: Some(outcome.message.id),
        created_at: Utc::now(),
    };
    store.create_task(task.clone()).await.unwrap();

    let interrupted = executor.execute(task.id).await.unwrap();
    assert_eq!(interrupted.status, TaskStatus::AwaitingInput);

    let pending = store.list_pending_interactions(user).await.unwrap();
    assert_eq!(pending.len(), 1);

    let state = app_state(store.clone(), executor.clone(), user).await;
    let resumed = interactions::answer(&state, pending[0].id, interactions::AnswerRequest { answer: "option B".into() })
        .await
        .unwrap();
    assert_eq!(resumed.status, TaskStatus::Completed);
}

#[tokio::test]
async fn ask_user_interrupt_then_cancel_fails_the_task() {
    let provider: Arc<dyn ModelProvider> = Arc::new(ScriptedMockProvider::ask_user("call-1", r#"{"question":"which one?"}"#));
    let (store, executor, user, agent) = harness(provider).await;

    let outcome = append_continuous_message(store.as_ref(), user, Actor::User, "do the thing", serde_json::Value::Null, &chrono_tz::UTC)
        .await
        .unwrap();
    let task = Task {
        id: Uuid::new_v4(),
        user,
        thread: outcome.thread_id,
        agent_ref: agent.id,
        status: TaskStatus::Pending,
        progress_log: vec![],
        result: None,
        source_message_id: Some(outcome.message.id),
        created_at: Utc::now(),
    };
    store.create_task(task.clone()).await.unwrap();
    executor.execute(task.id).await.unwrap();

    let pending = store.list_pending_interactions(user).await.unwrap();
    let state = app_state(store.clone(), executor.clone(), user).await;
    let failed = interactions::cancel(&state, pending[0].id).await.unwrap();
    assert_eq!(failed.status, TaskStatus::Failed);
    assert_eq!(failed.result.as_deref(), Some("Interaction canceled by user"));
}

#[tokio::test]
async fn continuous_browsing_lists_days_most_recent_first_with_a_query_filter() {
    let provider: Arc<dyn ModelProvider> = Arc::new(ScriptedMockProvider::always_text("ok"));
    let (store, _executor, user, _agent) = harness(provider).await;

    let thread = ensure_continuous_thread(store.as_ref(), user).await.unwrap();
    let d1 = chrono::NaiveDate::from_ymd_opt(2026, 1, 2).unwrap();
    let d2 = chrono::NaiveDate::from_ymd_opt(2026, 3, 15).unwrap();
    store.get_or_create_day_segment(user, thread.id, d1, 1, Utc::now()).await.unwrap();
    store.get_or_create_day_segment(user, thread.id, d2, 2, Utc::now()).await.unwrap();

    let mut segments = store.list_day_segments(thread.id).await.unwrap();
    segments.sort_by(|a, b| b.day_label.cmp(&a.day_label));
    assert_eq!(segments[0].day_label, d2);
    assert_eq!(segments[1].day_label, d1);

    let march_only: Vec<_> = segments.iter().filter(|s| s.day_label.format("%Y-%m").to_string() == "2026-03").collect();
    assert_eq!(march_only.len(), 1);
    assert_eq!(march_only[0].day_label, d2);
}

#[tokio::test]
async fn a_due_cron_task_definition_fires_into_a_fresh_thread() {
    let provider: Arc<dyn ModelProvider> = Arc::new(ScriptedMockProvider::always_text("report sent"));
    let (store, executor, user, agent) = harness(provider).await;

    let def = TaskDefinition {
        id: Uuid::new_v4(),
        user,
        name: "daily report".into(),
        kind: TaskDefinitionKind::Agent,
        trigger: TriggerKind::Cron,
        cron_expression: Some("* * * * *".into()),
        cron_tz: "UTC".into(),
        prompt_template: "send today's report".into(),
        run_mode: RunMode::NewThread,
        agent_ref: Some(agent.id),
        email_tool_ref: None,
        poll_interval_minutes: None,
        runtime_state: serde_json::Value::Null,
        is_active: true,
    };
    store.create_task_definition(def.clone()).await.unwrap();

    let bridge = CronBridge::new();
    bridge.sync(&def).unwrap();
    let due = bridge.due(Utc::now());
    assert_eq!(due, vec![def.id]);

    let runner = TaskDefinitionRunner::new(store.clone(), executor.clone(), chrono_tz::UTC, Arc::new(EventBus::new()));
    let task = fire_due_task_definition(store.as_ref(), &runner, def.id).await.unwrap();
    assert_eq!(task.status, TaskStatus::Completed);

    let continuous = ensure_continuous_thread(store.as_ref(), user).await.unwrap();
    assert_ne!(task.thread, continuous.id, "NewThread mode must not reuse the continuous thread");
}

#[tokio::test]
async fn email_poll_cursor_feeds_a_continuous_message_task_definition() {
    let provider: Arc<dyn ModelProvider> = Arc::new(ScriptedMockProvider::always_text("triaged"));
    let (store, executor, user, agent) = harness(provider).await;

    let poller = FakeMailboxPoller::new(
        1,
        vec![
            EmailEnvelope { uid: 1, from: "a@example.com".into(), subject: "hello".into(), date: "2026-08-01".into() },
            EmailEnvelope { uid: 2, from: "b@example.com".into(), subject: "invoice".into(), date: "2026-08-01".into() },
        ],
    );
    let outcome = poll_mailbox(&poller, EmailPollRuntimeState::default(), 5, Utc::now()).await.unwrap();
    assert_eq!(outcome.headers.len(), 2);
    assert!(outcome.skip_reason.is_none());

    let def = TaskDefinition {
        id: Uuid::new_v4(),
        user,
        name: "triage inbox".into(),
        kind: TaskDefinitionKind::Agent,
        trigger: TriggerKind::EmailPoll,
        cron_expression: None,
        cron_tz: "UTC".into(),
        prompt_template: "new mail from {{from}}: {{subject}}".into(),
        run_mode: RunMode::ContinuousMessage,
        agent_ref: Some(agent.id),
        email_tool_ref: Some(Uuid::new_v4()),
        poll_interval_minutes: Some(5),
        runtime_state: serde_json::to_value(&outcome.state).unwrap(),
        is_active: true,
    };
    store.create_task_definition(def.clone()).await.unwrap();

    let mut vars = HashMap::new();
    vars.insert("from".to_string(), outcome.headers[0].from.clone());
    vars.insert("subject".to_string(), outcome.headers[0].subject.clone());

    let runner = TaskDefinitionRunner::new(store.clone(), executor.clone(), chrono_tz::UTC, Arc::new(EventBus::new()));
    let task = runner.run(&def, &vars).await.unwrap();
    assert_eq!(task.status, TaskStatus::Completed);

    let continuous = ensure_continuous_thread(store.as_ref(), user).await.unwrap();
    assert_eq!(task.thread, continuous.id, "ContinuousMessage mode must append into the single continuous thread");

    let messages = store.list_messages(continuous.id, None).await.unwrap();
    assert!(messages.iter().any(|m| m.text.contains("a@example.com")));

    store.update_task_definition_runtime_state(def.id, serde_json::to_value(&outcome.state).unwrap()).await.unwrap();

    // A second poll a minute later with no new mail sees an empty backlog and
    // an unchanged cursor.
    let second = poll_mailbox(&poller, outcome.state, 5, Utc::now() + Duration::minutes(1)).await.unwrap();
    assert!(second.headers.is_empty());
    assert_eq!(second.state.last_uid, 2);
}
