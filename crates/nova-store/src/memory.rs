// SPDX-License-Identifier: Apache-2.0
//! In-memory [`ConversationStore`]. Used when `DATABASE_URL` is unset — the
//! fallback path of §4.5 and §6 — and by the rest of the workspace's tests.

use std::collections::HashMap;
use std::sync::Mutex;

use async_trait::async_trait;
use uuid::Uuid;

use crate::entities::*;
use crate::error::{StoreError, StoreResult};
use crate::{CandidateSource, ConversationStore, SearchBackend, SearchCandidate};

#[derive(Default)]
struct Inner {
    threads: HashMap<ThreadId, Thread>,
    messages: HashMap<MessageId, Message>,
    next_message_id: MessageId,
    interactions: HashMap<InteractionId, Interaction>,
    tasks: HashMap<TaskId, Task>,
    day_segments: HashMap<DaySegmentId, DaySegment>,
    day_segment_embeddings: HashMap<DaySegmentId, Embedding>,
    chunks: HashMap<TranscriptChunkId, TranscriptChunk>,
    chunk_embeddings: HashMap<TranscriptChunkId, Embedding>,
    task_definitions: HashMap<TaskDefinitionId, TaskDefinition>,
    agent_configs: HashMap<AgentConfigId, AgentConfig>,
}

#[derive(Default)]
pub struct InMemoryStore {
    inner: Mutex<Inner>,
}

impl InMemoryStore {
    pub fn new() -> Self {
        Self::default()
    }
}

fn not_found(what: &str, id: impl std::fmt::Display) -> StoreError {
    StoreError::NotFound(format!("{what} {id} not found"))
}

#[async_trait]
impl ConversationStore for InMemoryStore {
    fn backend(&self) -> SearchBackend {
        SearchBackend::Fallback
    }

    async fn create_thread(&self, thread: Thread) -> StoreResult<()> {
        self.inner.lock().unwrap().threads.insert(thread.id, thread);
        Ok(())
    }

    async fn get_thread(&self, id: ThreadId) -> StoreResult<Thread> {
        self.inner
            .lock()
            .unwrap()
            .threads
            .get(&id)
            .cloned()
            .ok_or_else(|| not_found("thread", id))
    }

    async fn list_threads(&self, user: UserId) -> StoreResult<Vec<Thread>> {
        let mut v: Vec<Thread> = self
            .inner
            .lock()
            .unwrap()
            .threads
            .values()
            .filter(|t| t.user == user)
            .cloned()
            .collect();
        v.sort_by_key(|t| t.created_at);
        Ok(v)
    }

    async fn rename_thread(&self, id: ThreadId, subject: String) -> StoreResult<()> {
        let mut inner = self.inner.lock().unwrap();
        let thread = inner.threads.get_mut(&id).ok_or_else(|| not_found("thread", id))?;
        thread.subject = subject;
        Ok(())
    }

    async fn delete_thread(&self, id: ThreadId) -> StoreResult<()> {
        self.inner.lock().unwrap().threads.remove(&id);
        Ok(())
    }

    async fn append_message(&self, message: NewMessage) -> StoreResult<Message> {
        let mut inner = self.inner.lock().unwrap();
        inner.next_message_id += 1;
        let id = inner.next_message_id;
        let stored = Message {
            id,
            user: message.user,
            thread: message.thread,
            actor: message.actor,
            text: message.text,
            internal_data: message.internal_data,
            kind: message.kind,
            created_at: chrono::Utc::now(),
            interaction: message.interaction,
        };
        inner.messages.insert(id, stored.clone());
        Ok(stored)
    }

    async fn get_message(&self, id: MessageId) -> StoreResult<Message> {
        self.inner
            .lock()
            .unwrap()
            .messages
            .get(&id)
            .cloned()
            .ok_or_else(|| not_found("message", id))
    }

    async fn list_messages(&self, thread: ThreadId, after: Option<MessageId>) -> StoreResult<Vec<Message>> {
        let mut v: Vec<Message> = self
            .inner
            .lock()
            .unwrap()
            .messages
            .values()
            .filter(|m| m.thread == thread && after.is_none_or(|a| m.id > a))
            .cloned()
            .collect();
        v.sort_by_key(|m| m.id);
        Ok(v)
    }

    async fn latest_message_id(&self, thread: ThreadId) -> StoreResult<Option<MessageId>> {
        Ok(self
            .inner
            .lock()
            .unwrap()
            .messages
            .values()
            .filter(|m| m.thread == thread)
            .map(|m| m.id)
            .max())
    }

    async fn create_interaction(&self, interaction: Interaction) -> StoreResult<()> {
        self.inner.lock().unwrap().interactions.insert(interaction.id, interaction);
        Ok(())
    }

    async fn get_interaction(&self, id: InteractionId) -> StoreResult<Interaction> {
        self.inner
            .lock()
            .unwrap()
            .interactions
            .get(&id)
            .cloned()
            .ok_or_else(|| not_found("interaction", id))
    }

    async fn answer_interaction(&self, id: InteractionId, answer: String) -> StoreResult<Interaction> {
        let mut inner = self.inner.lock().unwrap();
        let interaction = inner
            .interactions
            .get_mut(&id)
            .ok_or_else(|| not_found("interaction", id))?;
        if interaction.status != InteractionStatus::Pending {
            return Err(StoreError::Conflict(format!("interaction {id} is not pending")));
        }
        interaction.answer = Some(answer);
        interaction.status = InteractionStatus::Answered;
        Ok(interaction.clone())
    }

    async fn cancel_interaction(&self, id: InteractionId) -> StoreResult<Interaction> {
        let mut inner = self.inner.lock().unwrap();
        let interaction = inner
            .interactions
            .get_mut(&id)
            .ok_or_else(|| not_found("interaction", id))?;
        interaction.status = InteractionStatus::Canceled;
        Ok(interaction.clone())
    }

    async fn list_pending_interactions(&self, user: UserId) -> StoreResult<Vec<Interaction>> {
        let inner = self.inner.lock().unwrap();
        Ok(inner
            .interactions
            .values()
            .filter(|i| i.status == InteractionStatus::Pending)
            .filter(|i| {
                inner
                    .tasks
                    .get(&i.task)
                    .is_some_and(|t| t.user == user)
            })
            .cloned()
            .collect())
    }

    async fn create_task(&self, task: Task) -> StoreResult<()> {
        self.inner.lock().unwrap().tasks.insert(task.id, task);
        Ok(())
    }

    async fn get_task(&self, id: TaskId) -> StoreResult<Task> {
        self.inner.lock().unwrap().tasks.get(&id).cloned().ok_or_else(|| not_found("task", id))
    }

    async fn update_task(&self, task: Task) -> StoreResult<()> {
        self.inner.lock().unwrap().tasks.insert(task.id, task);
        Ok(())
    }

    async fn list_tasks(&self, user: UserId, status: Option<TaskStatus>) -> StoreResult<Vec<Task>> {
        let mut v: Vec<Task> = self
            .inner
            .lock()
            .unwrap()
            .tasks
            .values()
            .filter(|t| t.user == user && status.is_none_or(|s| t.status == s))
            .cloned()
            .collect();
        v.sort_by_key(|t| t.created_at);
        Ok(v)
    }

    async fn get_or_create_day_segment(
        &self,
        user: UserId,
        thread: ThreadId,
        day_label: chrono::NaiveDate,
        starts_at_message: MessageId,
        starts_at: chrono::DateTime<chrono::Utc>,
    ) -> StoreResult<DaySegment> {
        let mut inner = self.inner.lock().unwrap();
        if let Some(existing) = inner
            .day_segments
            .values()
            .find(|s| s.thread == thread && s.day_label == day_label)
        {
            return Ok(existing.clone());
        }
        let segment = DaySegment {
            id: Uuid::new_v4(),
            user,
            thread,
            day_label,
            starts_at_message,
            starts_at,
            summary_markdown: None,
            summary_until_message: None,
            updated_at: chrono::Utc::now(),
        };
        inner.day_segments.insert(segment.id, segment.clone());
        Ok(segment)
    }

    async fn get_day_segment(&self, id: DaySegmentId) -> StoreResult<DaySegment> {
        self.inner
            .lock()
            .unwrap()
            .day_segments
            .get(&id)
            .cloned()
            .ok_or_else(|| not_found("day_segment", id))
    }

    async fn list_day_segments(&self, thread: ThreadId) -> StoreResult<Vec<DaySegment>> {
        let mut v: Vec<DaySegment> = self
            .inner
            .lock()
            .unwrap()
            .day_segments
            .values()
            .filter(|s| s.thread == thread)
            .cloned()
            .collect();
        v.sort_by_key(|s| s.day_label);
        Ok(v)
    }

    async fn apply_day_segment_summary(
        &self,
        id: DaySegmentId,
        summary_markdown: String,
        summary_until_message: MessageId,
        embedding: Embedding,
    ) -> StoreResult<()> {
        let mut inner = self.inner.lock().unwrap();
        let seg = inner.day_segments.get_mut(&id).ok_or_else(|| not_found("day_segment", id))?;
        seg.summary_markdown = Some(summary_markdown);
        seg.summary_until_message = Some(summary_until_message);
        seg.updated_at = chrono::Utc::now();
        inner.day_segment_embeddings.insert(id, embedding);
        Ok(())
    }

    async fn insert_chunk(&self, chunk: TranscriptChunk) -> StoreResult<()> {
        self.inner.lock().unwrap().chunks.insert(chunk.id, chunk);
        Ok(())
    }

    async fn list_chunks_for_segment(&self, segment: DaySegmentId) -> StoreResult<Vec<TranscriptChunk>> {
        let mut v: Vec<TranscriptChunk> = self
            .inner
            .lock()
            .unwrap()
            .chunks
            .values()
            .filter(|c| c.day_segment == segment)
            .cloned()
            .collect();
        v.sort_by_key(|c| c.start_message);
        Ok(v)
    }

    async fn delete_chunks_for_segment(&self, segment: DaySegmentId) -> StoreResult<()> {
        self.inner.lock().unwrap().chunks.retain(|_, c| c.day_segment != segment);
        Ok(())
    }

    async fn set_chunk_embedding(&self, chunk: TranscriptChunkId, embedding: Embedding) -> StoreResult<()> {
        self.inner.lock().unwrap().chunk_embeddings.insert(chunk, embedding);
        Ok(())
    }

    async fn create_task_definition(&self, def: TaskDefinition) -> StoreResult<()> {
        self.inner.lock().unwrap().task_definitions.insert(def.id, def);
        Ok(())
    }

    async fn get_task_definition(&self, id: TaskDefinitionId) -> StoreResult<TaskDefinition> {
        self.inner
            .lock()
            .unwrap()
            .task_definitions
            .get(&id)
            .cloned()
            .ok_or_else(|| not_found("task_definition", id))
    }

    async fn list_active_task_definitions(&self, trigger: Option<TriggerKind>) -> StoreResult<Vec<TaskDefinition>> {
        Ok(self
            .inner
            .lock()
            .unwrap()
            .task_definitions
            .values()
            .filter(|d| d.is_active && trigger.is_none_or(|t| d.trigger == t))
            .cloned()
            .collect())
    }

    async fn update_task_definition_runtime_state(
        &self,
        id: TaskDefinitionId,
        state: serde_json::Value,
    ) -> StoreResult<()> {
        let mut inner = self.inner.lock().unwrap();
        let def = inner
            .task_definitions
            .get_mut(&id)
            .ok_or_else(|| not_found("task_definition", id))?;
        def.runtime_state = state;
        Ok(())
    }

    async fn create_agent_config(&self, config: AgentConfig) -> StoreResult<()> {
        let mut inner = self.inner.lock().unwrap();
        let siblings: Vec<AgentConfig> =
            inner.agent_configs.values().filter(|c| c.user == config.user && c.id != config.id).cloned().collect();
        check_sub_agent_refs_acyclic(&config, &siblings)?;

        if config.is_default {
            for existing in inner.agent_configs.values_mut() {
                if existing.user == config.user {
                    existing.is_default = false;
                }
            }
        }
        inner.agent_configs.insert(config.id, config);
        Ok(())
    }

    async fn get_agent_config(&self, id: AgentConfigId) -> StoreResult<AgentConfig> {
        self.inner
            .lock()
            .unwrap()
            .agent_configs
            .get(&id)
            .cloned()
            .ok_or_else(|| not_found("agent_config", id))
    }

    async fn get_default_agent_config(&self, user: UserId) -> StoreResult<Option<AgentConfig>> {
        Ok(self
            .inner
            .lock()
            .unwrap()
            .agent_configs
            .values()
            .find(|c| c.user == user && c.is_default)
            .cloned())
    }

    async fn list_agent_configs(&self, user: UserId) -> StoreResult<Vec<AgentConfig>> {
        Ok(self
            .inner
            .lock()
            .unwrap()
            .agent_configs
            .values()
            .filter(|c| c.user == user)
            .cloned()
            .collect())
    }

    async fn substring_candidates(
        &self,
        user: UserId,
        query: &str,
        exclude_message_id: Option<MessageId>,
        limit: usize,
    ) -> StoreResult<Vec<SearchCandidate>> {
        let needle = query.to_lowercase();
        let inner = self.inner.lock().unwrap();
        let mut out = Vec::new();

        for seg in inner.day_segments.values() {
            if seg.user != user {
                continue;
            }
            if let Some(summary) = &seg.summary_markdown {
                if exclude_message_id.is_some_and(|ex| seg.summary_until_message == Some(ex)) {
                    continue;
                }
                let lower = summary.to_lowercase();
                let hits = lower.matches(&needle).count();
                if hits > 0 {
                    out.push(SearchCandidate {
                        source: CandidateSource::DaySegmentSummary,
                        id: seg.id,
                        thread: seg.thread,
                        text: summary.clone(),
                        created_at: seg.updated_at,
                        fts_raw: Some(hits as f64),
                        semantic_distance: None,
                    });
                }
            }
        }

        for chunk in inner.chunks.values() {
            if chunk.user != user {
                continue;
            }
            if exclude_message_id.is_some_and(|ex| chunk.start_message <= ex && ex <= chunk.end_message) {
                continue;
            }
            let lower = chunk.content_text.to_lowercase();
            let hits = lower.matches(&needle).count();
            if hits > 0 {
                out.push(SearchCandidate {
                    source: CandidateSource::TranscriptChunk,
                    id: chunk.id,
                    thread: chunk.thread,
                    text: chunk.content_text.clone(),
                    created_at: chunk.created_at,
                    fts_raw: Some(hits as f64),
                    semantic_distance: None,
                });
            }
        }

        out.sort_by(|a, b| b.fts_raw.partial_cmp(&a.fts_raw).unwrap());
        out.truncate(limit);
        Ok(out)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn sample_thread(user: UserId) -> Thread {
        Thread {
            id: Uuid::new_v4(),
            user,
            subject: "thread n\u{b0}1".into(),
            mode: ThreadMode::Thread,
            created_at: chrono::Utc::now(),
        }
    }

    #[tokio::test]
    async fn append_message_assigns_increasing_ids() {
        let store = InMemoryStore::new();
        let user = Uuid::new_v4();
        let thread = sample_thread(user);
        store.create_thread(thread.clone()).await.unwrap();

        let m1 = store
            .append_message(NewMessage::standard(user, thread.id, Actor::User, "hi"))
            .await
            .unwrap();
        let m2 = store
            .append_message(NewMessage::standard(user, thread.id, Actor::Agent, "hello"))
            .await
            .unwrap();
        assert!(m2.id > m1.id);

        let listed = store.list_messages(thread.id, None).await.unwrap();
        assert_eq!(listed.len(), 2);
        let after = store.list_messages(thread.id, Some(m1.id)).await.unwrap();
        assert_eq!(after.len(), 1);
        assert_eq!(after[0].id, m2.id);
    }

    #[tokio::test]
    async fn answer_interaction_rejects_non_pending() {
        let store = InMemoryStore::new();
        let interaction = Interaction {
            id: Uuid::new_v4(),
            task: Uuid::new_v4(),
            thread: Uuid::new_v4(),
            agent_ref: Uuid::new_v4(),
            origin_name: "planner".into(),
            question: "continue?".into(),
            schema: serde_json::json!({"type": "string"}),
            answer: None,
            resume_payload: None,
            status: InteractionStatus::Pending,
            question_message: None,
            created_at: chrono::Utc::now(),
        };
        store.create_interaction(interaction.clone()).await.unwrap();
        store.answer_interaction(interaction.id, "yes".into()).await.unwrap();
        let err = store.answer_interaction(interaction.id, "again".into()).await;
        assert!(matches!(err, Err(StoreError::Conflict(_))));
    }

    #[tokio::test]
    async fn creating_second_default_agent_config_unsets_the_first() {
        let store = InMemoryStore::new();
        let user = Uuid::new_v4();
        let a = AgentConfig {
            id: Uuid::new_v4(),
            user,
            name: "a".into(),
            system_prompt: "x".into(),
            provider: "mock".into(),
            model: "mock-model".into(),
            tool_refs: vec![],
            sub_agent_refs: vec![],
            recursion_cap: 10,
            is_default: true,
        };
        let mut b = a.clone();
        b.id = Uuid::new_v4();
        b.name = "b".into();

        store.create_agent_config(a.clone()).await.unwrap();
        store.create_agent_config(b.clone()).await.unwrap();

        let default = store.get_default_agent_config(user).await.unwrap().unwrap();
        assert_eq!(default.id, b.id);
        let a_reloaded = store.get_agent_config(a.id).await.unwrap();
        assert!(!a_reloaded.is_default);
    }

    #[tokio::test]
    async fn create_agent_config_rejects_a_cyclic_sub_agent_reference() {
        let store = InMemoryStore::new();
        let user = Uuid::new_v4();
        let a_id = Uuid::new_v4();
        let b_id = Uuid::new_v4();
        let a = AgentConfig {
            id: a_id,
            user,
            name: "a".into(),
            system_prompt: "x".into(),
            provider: "mock".into(),
            model: "mock-model".into(),
            tool_refs: vec![],
            sub_agent_refs: vec![b_id],
            recursion_cap: 10,
            is_default: false,
        };
        let mut b = a.clone();
        b.id = b_id;
        b.name = "b".into();
        b.sub_agent_refs = vec![];

        store.create_agent_config(a.clone()).await.unwrap();
        store.create_agent_config(b.clone()).await.unwrap();

        let mut b_pointing_at_a = b;
        b_pointing_at_a.sub_agent_refs = vec![a_id];
        let err = store.create_agent_config(b_pointing_at_a).await;
        assert!(matches!(err, Err(StoreError::Validation(_))));
    }

    #[tokio::test]
    async fn substring_candidates_matches_case_insensitively() {
        let store = InMemoryStore::new();
        let user = Uuid::new_v4();
        let thread = Uuid::new_v4();
        let segment = store
            .get_or_create_day_segment(
                user,
                thread,
                chrono::NaiveDate::from_ymd_opt(2026, 1, 1).unwrap(),
                1,
                chrono::Utc::now(),
            )
            .await
            .unwrap();
        store
            .apply_day_segment_summary(segment.id, "Discussed the Rust borrow checker".into(), 5, Embedding::pending(1536))
            .await
            .unwrap();

        let hits = store.substring_candidates(user, "rust", None, 10).await.unwrap();
        assert_eq!(hits.len(), 1);
        assert_eq!(hits[0].source, CandidateSource::DaySegmentSummary);
    }
}
