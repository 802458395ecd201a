// SPDX-License-Identifier: Apache-2.0
//! Persistence layer for threads, messages, tasks, interactions, the
//! continuous-context day-segment/chunk index, task definitions and agent
//! configs (§3 DATA MODEL).
//!
//! Two backends implement [`ConversationStore`]: [`memory::InMemoryStore`]
//! (default, no external services) and, behind the `postgres` feature,
//! [`postgres::PostgresStore`] backed by `sqlx` + `pgvector`. Hybrid search
//! (§4.5) needs two different raw-candidate retrieval strategies depending on
//! which backend is active — full-text + vector search in Postgres, a plain
//! substring scan otherwise — so [`SearchBackend`] tells callers which
//! candidate methods on the trait are meaningful; the blending math itself is
//! backend-agnostic and lives in `nova-runtime`.

pub mod checkpoint;
pub mod entities;
mod error;
pub mod memory;
#[cfg(feature = "postgres")]
pub mod postgres;

pub use checkpoint::{CheckpointStore, InMemoryCheckpointStore};
pub use error::{StoreError, StoreResult};
pub use memory::InMemoryStore;
#[cfg(feature = "postgres")]
pub use postgres::PostgresStore;

use async_trait::async_trait;
use entities::*;

/// Which raw-candidate retrieval path a [`ConversationStore`] implements.
/// See §4.5 "PostgreSQL path" vs "Fallback path (no FTS backend)".
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum SearchBackend {
    Postgres,
    Fallback,
}

/// A raw search candidate before recency/weight/semantic blending is applied
/// by `nova-runtime`. `source` distinguishes a day-segment summary hit from a
/// transcript-chunk hit, since the two carry different base weights (§4.5).
#[derive(Debug, Clone)]
pub struct SearchCandidate {
    pub source: CandidateSource,
    pub id: uuid::Uuid,
    pub thread: ThreadId,
    pub text: String,
    pub created_at: chrono::DateTime<chrono::Utc>,
    /// `raw` full-text rank (Postgres: `ts_rank`; fallback: match count).
    pub fts_raw: Option<f64>,
    /// Vector distance to the query embedding, smaller is closer.
    pub semantic_distance: Option<f64>,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum CandidateSource {
    DaySegmentSummary,
    TranscriptChunk,
}

#[async_trait]
pub trait ConversationStore: Send + Sync {
    fn backend(&self) -> SearchBackend;

    // -- threads --
    async fn create_thread(&self, thread: Thread) -> StoreResult<()>;
    async fn get_thread(&self, id: ThreadId) -> StoreResult<Thread>;
    async fn list_threads(&self, user: UserId) -> StoreResult<Vec<Thread>>;
    async fn rename_thread(&self, id: ThreadId, subject: String) -> StoreResult<()>;
    async fn delete_thread(&self, id: ThreadId) -> StoreResult<()>;

    // -- messages --
    async fn append_message(&self, message: NewMessage) -> StoreResult<Message>;
    async fn get_message(&self, id: MessageId) -> StoreResult<Message>;
    async fn list_messages(&self, thread: ThreadId, after: Option<MessageId>) -> StoreResult<Vec<Message>>;
    async fn latest_message_id(&self, thread: ThreadId) -> StoreResult<Option<MessageId>>;

    // -- interactions --
    async fn create_interaction(&self, interaction: Interaction) -> StoreResult<()>;
    async fn get_interaction(&self, id: InteractionId) -> StoreResult<Interaction>;
    async fn answer_interaction(&self, id: InteractionId, answer: String) -> StoreResult<Interaction>;
    async fn cancel_interaction(&self, id: InteractionId) -> StoreResult<Interaction>;
    async fn list_pending_interactions(&self, user: UserId) -> StoreResult<Vec<Interaction>>;

    // -- tasks --
    async fn create_task(&self, task: Task) -> StoreResult<()>;
    async fn get_task(&self, id: TaskId) -> StoreResult<Task>;
    async fn update_task(&self, task: Task) -> StoreResult<()>;
    async fn list_tasks(&self, user: UserId, status: Option<TaskStatus>) -> StoreResult<Vec<Task>>;

    // -- day segments & transcript chunks (§4.2-§4.4) --
    async fn get_or_create_day_segment(
        &self,
        user: UserId,
        thread: ThreadId,
        day_label: chrono::NaiveDate,
        starts_at_message: MessageId,
        starts_at: chrono::DateTime<chrono::Utc>,
    ) -> StoreResult<DaySegment>;
    async fn get_day_segment(&self, id: DaySegmentId) -> StoreResult<DaySegment>;
    async fn list_day_segments(&self, thread: ThreadId) -> StoreResult<Vec<DaySegment>>;

    /// Updates a day segment's summary text and resets its embedding to
    /// pending in one atomic write (§4.3: "inside a DB transaction"). A
    /// crash between the two must never leave the summary updated with a
    /// stale embedding still marked ready.
    async fn apply_day_segment_summary(
        &self,
        id: DaySegmentId,
        summary_markdown: String,
        summary_until_message: MessageId,
        embedding: Embedding,
    ) -> StoreResult<()>;

    async fn insert_chunk(&self, chunk: TranscriptChunk) -> StoreResult<()>;
    async fn list_chunks_for_segment(&self, segment: DaySegmentId) -> StoreResult<Vec<TranscriptChunk>>;
    async fn delete_chunks_for_segment(&self, segment: DaySegmentId) -> StoreResult<()>;

    async fn set_chunk_embedding(&self, chunk: TranscriptChunkId, embedding: Embedding) -> StoreResult<()>;

    // -- task definitions (§4.7) --
    async fn create_task_definition(&self, def: TaskDefinition) -> StoreResult<()>;
    async fn get_task_definition(&self, id: TaskDefinitionId) -> StoreResult<TaskDefinition>;
    async fn list_active_task_definitions(&self, trigger: Option<TriggerKind>) -> StoreResult<Vec<TaskDefinition>>;
    async fn update_task_definition_runtime_state(
        &self,
        id: TaskDefinitionId,
        state: serde_json::Value,
    ) -> StoreResult<()>;

    // -- agent configs --
    async fn create_agent_config(&self, config: AgentConfig) -> StoreResult<()>;
    async fn get_agent_config(&self, id: AgentConfigId) -> StoreResult<AgentConfig>;
    async fn get_default_agent_config(&self, user: UserId) -> StoreResult<Option<AgentConfig>>;
    async fn list_agent_configs(&self, user: UserId) -> StoreResult<Vec<AgentConfig>>;

    // -- hybrid search raw candidates (§4.5) --
    // Implementations only need to fill in the method matching their
    // `backend()`; the other returns an empty vec by default.
    async fn fts_candidates(
        &self,
        _user: UserId,
        _query: &str,
        _exclude_message_id: Option<MessageId>,
        _limit: usize,
    ) -> StoreResult<Vec<SearchCandidate>> {
        Ok(Vec::new())
    }

    async fn semantic_candidates(
        &self,
        _user: UserId,
        _query_embedding: &[f32],
        _exclude_message_id: Option<MessageId>,
        _limit: usize,
    ) -> StoreResult<Vec<SearchCandidate>> {
        Ok(Vec::new())
    }

    /// Fallback-path substring candidates, used when no FTS/semantic backend
    /// is configured at all (§4.5 "Fallback path").
    async fn substring_candidates(
        &self,
        _user: UserId,
        _query: &str,
        _exclude_message_id: Option<MessageId>,
        _limit: usize,
    ) -> StoreResult<Vec<SearchCandidate>> {
        Ok(Vec::new())
    }
}
