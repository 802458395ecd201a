// SPDX-License-Identifier: Apache-2.0
//! Interaction answer/cancel (§6): both validate ownership (`task.user ==
//! requester`), are idempotent on non-pending interactions, and delegate to
//! the Task Executor's `answer`/`cancel` — which itself publishes
//! `interaction_update` and (on answer) drives the resume path.

use std::sync::Arc;

use axum::{extract::{Path, State}, Json};
use nova_store::entities::{InteractionId, Task};
use serde::Deserialize;

use crate::error::ApiError;
use crate::AppState;

#[derive(Debug, Deserialize)]
pub struct AnswerRequest {
    pub answer: String,
}

async fn check_ownership(state: &AppState, interaction_id: InteractionId) -> Result<(), ApiError> {
    let interaction = state.store.get_interaction(interaction_id).await?;
    let task = state.store.get_task(interaction.task).await?;
    if task.user != state.user {
        return Err(ApiError::Forbidden);
    }
    Ok(())
}

pub async fn answer(state: &AppState, interaction_id: InteractionId, req: AnswerRequest) -> Result<Task, ApiError> {
    check_ownership(state, interaction_id).await?;
    Ok(state.executor.answer(interaction_id, req.answer).await?)
}

pub async fn cancel(state: &AppState, interaction_id: InteractionId) -> Result<Task, ApiError> {
    check_ownership(state, interaction_id).await?;
    Ok(state.executor.cancel(interaction_id).await?)
}

pub async fn answer_handler(
    State(state): State<Arc<AppState>>,
    Path(interaction_id): Path<InteractionId>,
    Json(req): Json<AnswerRequest>,
) -> Result<Json<Task>, ApiError> {
    Ok(Json(answer(&state, interaction_id, req).await?))
}

pub async fn cancel_handler(
    State(state): State<Arc<AppState>>,
    Path(interaction_id): Path<InteractionId>,
) -> Result<Json<Task>, ApiError> {
    Ok(Json(cancel(&state, interaction_id).await?))
}

#[cfg(test)]
mod tests {
    use super::*;
    use nova_core::{EventBus, InMemoryGraphCheckpointStore, ProviderResolver, ToolSetBuilder};
    use nova_model::{ModelProvider, ScriptedMockProvider};
    use nova_store::entities::{Actor, AgentConfig, NewMessage, Task as StoreTask, TaskStatus, Thread, ThreadMode};
    use nova_store::ConversationStore;
    use nova_store::{InMemoryCheckpointStore, InMemoryStore};
    use uuid::Uuid;

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
        async fn build(&self, _config: &AgentConfig) -> anyhow::Result<Arc<nova_tools::ToolRegistry>> {
            Ok(Arc::new(nova_tools::ToolRegistry::new()))
        }
    }

    async fn pending_interaction_setup() -> (Arc<AppState>, InteractionId, Uuid) {
        let store = Arc::new(InMemoryStore::new());
        let user = Uuid::new_v4();
        let thread = Thread { id: Uuid::new_v4(), user, subject: "t".into(), mode: ThreadMode::Continuous, created_at: chrono::Utc::now() };
        store.create_thread(thread.clone()).await.unwrap();
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
        let source = store.append_message(NewMessage::standard(user, thread.id, Actor::User, "book it")).await.unwrap();
        let task = StoreTask {
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
        let executor = Arc::new(nova_core::TaskExecutor::new(
            store.clone(),
            Arc::new(InMemoryCheckpointStore::new()),
            Arc::new(InMemoryGraphCheckpointStore::new()),
            Arc::new(FixedProvider(provider)),
            Arc::new(EmptyTools),
            Arc::new(EventBus::new()),
            chrono_tz::UTC,
        ));
        executor.execute(task.id).await.unwrap();
        let pending = store.list_pending_interactions(user).await.unwrap();
        let interaction_id = pending[0].id;

        let state = Arc::new(AppState {
            store,
            executor,
            events: Arc::new(EventBus::new()),
            user,
            tz: chrono_tz::UTC,
            token: crate::auth::RawToken::generate().into_stored(),
            summary_provider: None,
        });
        (state, interaction_id, user)
    }

    #[tokio::test]
    async fn answering_as_the_owning_user_resumes_the_task() {
        let (state, interaction_id, _user) = pending_interaction_setup().await;
        let task = answer(&state, interaction_id, AnswerRequest { answer: "Work calendar".into() }).await.unwrap();
        assert_eq!(task.status, TaskStatus::Completed);
    }

    #[tokio::test]
    async fn answering_as_another_user_is_forbidden() {
        let (state, interaction_id, _user) = pending_interaction_setup().await;
        let impostor = Arc::new(AppState {
            store: state.store.clone(),
            executor: state.executor.clone(),
            events: state.events.clone(),
            user: Uuid::new_v4(),
            tz: chrono_tz::UTC,
            token: crate::auth::RawToken::generate().into_stored(),
            summary_provider: None,
        });
        let err = answer(&impostor, interaction_id, AnswerRequest { answer: "nope".into() }).await.unwrap_err();
        assert!(matches!(err, ApiError::Forbidden));
    }

    #[tokio::test]
    async fn canceling_transitions_the_task_to_failed() {
        let (state, interaction_id, _user) = pending_interaction_setup().await;
        let task = cancel(&state, interaction_id).await.unwrap();
        assert_eq!(task.status, TaskStatus::Failed);
        assert_eq!(task.result.as_deref(), Some("Interaction canceled by user"));
    }
}
