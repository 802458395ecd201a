// SPDX-License-Identifier: Apache-2.0
//! `sqlx` + `pgvector` backed [`ConversationStore`]. Selected when
//! `DATABASE_URL` is configured (§6); absent that, [`crate::memory::InMemoryStore`]
//! is used instead.
//!
//! Queries are written against the runtime query builder (`sqlx::query`/
//! `query_as` with explicit `FromRow` structs) rather than the `query!`
//! compile-time macros, since those require a live database at build time.
//! This also means we don't layer `sea_orm` on top the way the richer
//! reference implementation we drew pgvector conventions from does — a
//! deliberate simplification, recorded in DESIGN.md.

use async_trait::async_trait;
use chrono::{DateTime, NaiveDate, Utc};
use pgvector::Vector;
use sqlx::postgres::PgPoolOptions;
use sqlx::{FromRow, PgPool, Row};
use uuid::Uuid;

use crate::entities::*;
use crate::error::{StoreError, StoreResult};
use crate::{CandidateSource, ConversationStore, SearchBackend, SearchCandidate};

pub struct PostgresStore {
    pool: PgPool,
}

impl PostgresStore {
    pub async fn connect(database_url: &str) -> StoreResult<Self> {
        let pool = PgPoolOptions::new()
            .max_connections(10)
            .connect(database_url)
            .await?;
        Ok(Self { pool })
    }

    pub async fn run_migrations(&self) -> StoreResult<()> {
        sqlx::migrate!("./migrations")
            .run(&self.pool)
            .await
            .map_err(|e| StoreError::Other(anyhow::anyhow!(e)))
    }

    pub fn pool(&self) -> &PgPool {
        &self.pool
    }
}

fn not_found(what: &str, id: impl std::fmt::Display) -> StoreError {
    StoreError::NotFound(format!("{what} {id} not found"))
}

#[derive(FromRow)]
struct ThreadRow {
    id: Uuid,
    user_id: Uuid,
    subject: String,
    mode: String,
    created_at: DateTime<Utc>,
}

impl From<ThreadRow> for Thread {
    fn from(r: ThreadRow) -> Self {
        Thread {
            id: r.id,
            user: r.user_id,
            subject: r.subject,
            mode: if r.mode == "continuous" { ThreadMode::Continuous } else { ThreadMode::Thread },
            created_at: r.created_at,
        }
    }
}

#[async_trait]
impl ConversationStore for PostgresStore {
    fn backend(&self) -> SearchBackend {
        SearchBackend::Postgres
    }

    async fn create_thread(&self, thread: Thread) -> StoreResult<()> {
        let mode = match thread.mode {
            ThreadMode::Thread => "thread",
            ThreadMode::Continuous => "continuous",
        };
        sqlx::query(
            "INSERT INTO threads (id, user_id, subject, mode, created_at) VALUES ($1, $2, $3, $4, $5)",
        )
        .bind(thread.id)
        .bind(thread.user)
        .bind(thread.subject)
        .bind(mode)
        .bind(thread.created_at)
        .execute(&self.pool)
        .await?;
        Ok(())
    }

    async fn get_thread(&self, id: ThreadId) -> StoreResult<Thread> {
        let row = sqlx::query_as::<_, ThreadRow>("SELECT id, user_id, subject, mode, created_at FROM threads WHERE id = $1")
            .bind(id)
            .fetch_optional(&self.pool)
            .await?
            .ok_or_else(|| not_found("thread", id))?;
        Ok(row.into())
    }

    async fn list_threads(&self, user: UserId) -> StoreResult<Vec<Thread>> {
        let rows = sqlx::query_as::<_, ThreadRow>(
            "SELECT id, user_id, subject, mode, created_at FROM threads WHERE user_id = $1 ORDER BY created_at",
        )
        .bind(user)
        .fetch_all(&self.pool)
        .await?;
        Ok(rows.into_iter().map(Into::into).collect())
    }

    async fn rename_thread(&self, id: ThreadId, subject: String) -> StoreResult<()> {
        let result = sqlx::query("UPDATE threads SET subject = $1 WHERE id = $2")
            .bind(subject)
            .bind(id)
            .execute(&self.pool)
            .await?;
        if result.rows_affected() == 0 {
            return Err(not_found("thread", id));
        }
        Ok(())
    }

    async fn delete_thread(&self, id: ThreadId) -> StoreResult<()> {
        sqlx::query("DELETE FROM threads WHERE id = $1").bind(id).execute(&self.pool).await?;
        Ok(())
    }

    async fn append_message(&self, message: NewMessage) -> StoreResult<Message> {
        let kind = match message.kind {
            MessageType::Standard => "standard",
            MessageType::Question => "question",
            MessageType::Answer => "answer",
        };
        let actor = match message.actor {
            Actor::User => "user",
            Actor::Agent => "agent",
            Actor::System => "system",
        };
        let row = sqlx::query(
            "INSERT INTO messages (user_id, thread_id, actor, text, internal_data, kind, interaction_id, created_at)
             VALUES ($1, $2, $3, $4, $5, $6, $7, now())
             RETURNING id, created_at",
        )
        .bind(message.user)
        .bind(message.thread)
        .bind(actor)
        .bind(&message.text)
        .bind(&message.internal_data)
        .bind(kind)
        .bind(message.interaction)
        .fetch_one(&self.pool)
        .await?;

        Ok(Message {
            id: row.try_get("id")?,
            user: message.user,
            thread: message.thread,
            actor: message.actor,
            text: message.text,
            internal_data: message.internal_data,
            kind: message.kind,
            created_at: row.try_get("created_at")?,
            interaction: message.interaction,
        })
    }

    async fn get_message(&self, id: MessageId) -> StoreResult<Message> {
        let row = sqlx::query(
            "SELECT id, user_id, thread_id, actor, text, internal_data, kind, interaction_id, created_at
             FROM messages WHERE id = $1",
        )
        .bind(id)
        .fetch_optional(&self.pool)
        .await?
        .ok_or_else(|| not_found("message", id))?;
        row_to_message(&row)
    }

    async fn list_messages(&self, thread: ThreadId, after: Option<MessageId>) -> StoreResult<Vec<Message>> {
        let rows = sqlx::query(
            "SELECT id, user_id, thread_id, actor, text, internal_data, kind, interaction_id, created_at
             FROM messages WHERE thread_id = $1 AND ($2::bigint IS NULL OR id > $2) ORDER BY id",
        )
        .bind(thread)
        .bind(after)
        .fetch_all(&self.pool)
        .await?;
        rows.iter().map(row_to_message).collect()
    }

    async fn latest_message_id(&self, thread: ThreadId) -> StoreResult<Option<MessageId>> {
        let row = sqlx::query("SELECT max(id) as max_id FROM messages WHERE thread_id = $1")
            .bind(thread)
            .fetch_one(&self.pool)
            .await?;
        Ok(row.try_get::<Option<MessageId>, _>("max_id")?)
    }

    async fn create_interaction(&self, interaction: Interaction) -> StoreResult<()> {
        sqlx::query(
            "INSERT INTO interactions (id, task_id, thread_id, agent_ref, origin_name, question, schema, answer, resume_payload, status, question_message_id, created_at)
             VALUES ($1,$2,$3,$4,$5,$6,$7,$8,$9,$10,$11,$12)",
        )
        .bind(interaction.id)
        .bind(interaction.task)
        .bind(interaction.thread)
        .bind(interaction.agent_ref)
        .bind(interaction.origin_name)
        .bind(interaction.question)
        .bind(interaction.schema)
        .bind(interaction.answer)
        .bind(interaction.resume_payload)
        .bind(status_str(interaction.status))
        .bind(interaction.question_message)
        .bind(interaction.created_at)
        .execute(&self.pool)
        .await?;
        Ok(())
    }

    async fn get_interaction(&self, id: InteractionId) -> StoreResult<Interaction> {
        let row = sqlx::query(
            "SELECT id, task_id, thread_id, agent_ref, origin_name, question, schema, answer, resume_payload, status, question_message_id, created_at
             FROM interactions WHERE id = $1",
        )
        .bind(id)
        .fetch_optional(&self.pool)
        .await?
        .ok_or_else(|| not_found("interaction", id))?;
        row_to_interaction(&row)
    }

    async fn answer_interaction(&self, id: InteractionId, answer: String) -> StoreResult<Interaction> {
        let result = sqlx::query(
            "UPDATE interactions SET answer = $1, status = 'answered' WHERE id = $2 AND status = 'pending'",
        )
        .bind(&answer)
        .bind(id)
        .execute(&self.pool)
        .await?;
        if result.rows_affected() == 0 {
            return Err(StoreError::Conflict(format!("interaction {id} is not pending")));
        }
        self.get_interaction(id).await
    }

    async fn cancel_interaction(&self, id: InteractionId) -> StoreResult<Interaction> {
        sqlx::query("UPDATE interactions SET status = 'canceled' WHERE id = $1")
            .bind(id)
            .execute(&self.pool)
            .await?;
        self.get_interaction(id).await
    }

    async fn list_pending_interactions(&self, user: UserId) -> StoreResult<Vec<Interaction>> {
        let rows = sqlx::query(
            "SELECT i.id, i.task_id, i.thread_id, i.agent_ref, i.origin_name, i.question, i.schema, i.answer, i.resume_payload, i.status, i.question_message_id, i.created_at
             FROM interactions i JOIN tasks t ON t.id = i.task_id
             WHERE i.status = 'pending' AND t.user_id = $1",
        )
        .bind(user)
        .fetch_all(&self.pool)
        .await?;
        rows.iter().map(row_to_interaction).collect()
    }

    async fn create_task(&self, task: Task) -> StoreResult<()> {
        sqlx::query(
            "INSERT INTO tasks (id, user_id, thread_id, agent_ref, status, progress_log, result, source_message_id, created_at)
             VALUES ($1,$2,$3,$4,$5,$6,$7,$8,$9)",
        )
        .bind(task.id)
        .bind(task.user)
        .bind(task.thread)
        .bind(task.agent_ref)
        .bind(task_status_str(task.status))
        .bind(serde_json::to_value(&task.progress_log).unwrap_or_default())
        .bind(task.result)
        .bind(task.source_message_id)
        .bind(task.created_at)
        .execute(&self.pool)
        .await?;
        Ok(())
    }

    async fn get_task(&self, id: TaskId) -> StoreResult<Task> {
        let row = sqlx::query(
            "SELECT id, user_id, thread_id, agent_ref, status, progress_log, result, source_message_id, created_at
             FROM tasks WHERE id = $1",
        )
        .bind(id)
        .fetch_optional(&self.pool)
        .await?
        .ok_or_else(|| not_found("task", id))?;
        row_to_task(&row)
    }

    async fn update_task(&self, task: Task) -> StoreResult<()> {
        sqlx::query(
            "UPDATE tasks SET status = $1, progress_log = $2, result = $3 WHERE id = $4",
        )
        .bind(task_status_str(task.status))
        .bind(serde_json::to_value(&task.progress_log).unwrap_or_default())
        .bind(task.result)
        .bind(task.id)
        .execute(&self.pool)
        .await?;
        Ok(())
    }

    async fn list_tasks(&self, user: UserId, status: Option<TaskStatus>) -> StoreResult<Vec<Task>> {
        let rows = sqlx::query(
            "SELECT id, user_id, thread_id, agent_ref, status, progress_log, result, source_message_id, created_at
             FROM tasks WHERE user_id = $1 AND ($2::text IS NULL OR status = $2) ORDER BY created_at",
        )
        .bind(user)
        .bind(status.map(task_status_str))
        .fetch_all(&self.pool)
        .await?;
        rows.iter().map(row_to_task).collect()
    }

    async fn get_or_create_day_segment(
        &self,
        user: UserId,
        thread: ThreadId,
        day_label: NaiveDate,
        starts_at_message: MessageId,
        starts_at: DateTime<Utc>,
    ) -> StoreResult<DaySegment> {
        let row = sqlx::query(
            "INSERT INTO day_segments (id, user_id, thread_id, day_label, starts_at_message, starts_at, updated_at)
             VALUES ($1,$2,$3,$4,$5,$6, now())
             ON CONFLICT (thread_id, day_label) DO UPDATE SET thread_id = EXCLUDED.thread_id
             RETURNING id, user_id, thread_id, day_label, starts_at_message, starts_at, summary_markdown, summary_until_message, updated_at",
        )
        .bind(Uuid::new_v4())
        .bind(user)
        .bind(thread)
        .bind(day_label)
        .bind(starts_at_message)
        .bind(starts_at)
        .fetch_one(&self.pool)
        .await?;
        row_to_day_segment(&row)
    }

    async fn get_day_segment(&self, id: DaySegmentId) -> StoreResult<DaySegment> {
        let row = sqlx::query(
            "SELECT id, user_id, thread_id, day_label, starts_at_message, starts_at, summary_markdown, summary_until_message, updated_at
             FROM day_segments WHERE id = $1",
        )
        .bind(id)
        .fetch_optional(&self.pool)
        .await?
        .ok_or_else(|| not_found("day_segment", id))?;
        row_to_day_segment(&row)
    }

    async fn list_day_segments(&self, thread: ThreadId) -> StoreResult<Vec<DaySegment>> {
        let rows = sqlx::query(
            "SELECT id, user_id, thread_id, day_label, starts_at_message, starts_at, summary_markdown, summary_until_message, updated_at
             FROM day_segments WHERE thread_id = $1 ORDER BY day_label",
        )
        .bind(thread)
        .fetch_all(&self.pool)
        .await?;
        rows.iter().map(row_to_day_segment).collect()
    }

    async fn apply_day_segment_summary(
        &self,
        id: DaySegmentId,
        summary_markdown: String,
        summary_until_message: MessageId,
        embedding: Embedding,
    ) -> StoreResult<()> {
        let mut tx = self.pool.begin().await?;
        sqlx::query(
            "UPDATE day_segments SET summary_markdown = $1, summary_until_message = $2, updated_at = now() WHERE id = $3",
        )
        .bind(summary_markdown)
        .bind(summary_until_message)
        .bind(id)
        .execute(&mut *tx)
        .await?;

        let vector = embedding.vector.map(Vector::from);
        sqlx::query(
            "INSERT INTO day_segment_embeddings (day_segment_id, state, embedding, provider, model)
             VALUES ($1,$2,$3,$4,$5)
             ON CONFLICT (day_segment_id) DO UPDATE
             SET state = EXCLUDED.state, embedding = EXCLUDED.embedding, provider = EXCLUDED.provider, model = EXCLUDED.model",
        )
        .bind(id)
        .bind(embedding_state_str(embedding.state))
        .bind(vector)
        .bind(embedding.provider)
        .bind(embedding.model)
        .execute(&mut *tx)
        .await?;

        tx.commit().await?;
        Ok(())
    }

    async fn insert_chunk(&self, chunk: TranscriptChunk) -> StoreResult<()> {
        sqlx::query(
            "INSERT INTO transcript_chunks (id, user_id, thread_id, day_segment_id, start_message, end_message, content_text, content_hash, token_estimate, created_at)
             VALUES ($1,$2,$3,$4,$5,$6,$7,$8,$9,$10)",
        )
        .bind(chunk.id)
        .bind(chunk.user)
        .bind(chunk.thread)
        .bind(chunk.day_segment)
        .bind(chunk.start_message)
        .bind(chunk.end_message)
        .bind(chunk.content_text)
        .bind(chunk.content_hash)
        .bind(chunk.token_estimate as i64)
        .bind(chunk.created_at)
        .execute(&self.pool)
        .await?;
        Ok(())
    }

    async fn list_chunks_for_segment(&self, segment: DaySegmentId) -> StoreResult<Vec<TranscriptChunk>> {
        let rows = sqlx::query(
            "SELECT id, user_id, thread_id, day_segment_id, start_message, end_message, content_text, content_hash, token_estimate, created_at
             FROM transcript_chunks WHERE day_segment_id = $1 ORDER BY start_message",
        )
        .bind(segment)
        .fetch_all(&self.pool)
        .await?;
        rows.iter().map(row_to_chunk).collect()
    }

    async fn delete_chunks_for_segment(&self, segment: DaySegmentId) -> StoreResult<()> {
        sqlx::query("DELETE FROM transcript_chunks WHERE day_segment_id = $1")
            .bind(segment)
            .execute(&self.pool)
            .await?;
        Ok(())
    }

    async fn set_chunk_embedding(&self, chunk: TranscriptChunkId, embedding: Embedding) -> StoreResult<()> {
        let vector = embedding.vector.map(Vector::from);
        sqlx::query("UPDATE transcript_chunk_embeddings SET state = $1, embedding = $2, provider = $3, model = $4
                     WHERE transcript_chunk_id = $5")
            .bind(embedding_state_str(embedding.state))
            .bind(vector)
            .bind(embedding.provider)
            .bind(embedding.model)
            .bind(chunk)
            .execute(&self.pool)
            .await?;
        Ok(())
    }

    async fn create_task_definition(&self, def: TaskDefinition) -> StoreResult<()> {
        sqlx::query(
            "INSERT INTO task_definitions (id, user_id, name, kind, trigger, cron_expression, cron_tz, prompt_template, run_mode, agent_ref, email_tool_ref, poll_interval_minutes, runtime_state, is_active)
             VALUES ($1,$2,$3,$4,$5,$6,$7,$8,$9,$10,$11,$12,$13,$14)",
        )
        .bind(def.id)
        .bind(def.user)
        .bind(def.name)
        .bind(task_def_kind_str(def.kind))
        .bind(trigger_kind_str(def.trigger))
        .bind(def.cron_expression)
        .bind(def.cron_tz)
        .bind(def.prompt_template)
        .bind(run_mode_str(def.run_mode))
        .bind(def.agent_ref)
        .bind(def.email_tool_ref)
        .bind(def.poll_interval_minutes.map(|v| v as i32))
        .bind(def.runtime_state)
        .bind(def.is_active)
        .execute(&self.pool)
        .await?;
        Ok(())
    }

    async fn get_task_definition(&self, id: TaskDefinitionId) -> StoreResult<TaskDefinition> {
        let row = sqlx::query(
            "SELECT id, user_id, name, kind, trigger, cron_expression, cron_tz, prompt_template, run_mode, agent_ref, email_tool_ref, poll_interval_minutes, runtime_state, is_active
             FROM task_definitions WHERE id = $1",
        )
        .bind(id)
        .fetch_optional(&self.pool)
        .await?
        .ok_or_else(|| not_found("task_definition", id))?;
        row_to_task_definition(&row)
    }

    async fn list_active_task_definitions(&self, trigger: Option<TriggerKind>) -> StoreResult<Vec<TaskDefinition>> {
        let rows = sqlx::query(
            "SELECT id, user_id, name, kind, trigger, cron_expression, cron_tz, prompt_template, run_mode, agent_ref, email_tool_ref, poll_interval_minutes, runtime_state, is_active
             FROM task_definitions WHERE is_active AND ($1::text IS NULL OR trigger = $1)",
        )
        .bind(trigger.map(trigger_kind_str))
        .fetch_all(&self.pool)
        .await?;
        rows.iter().map(row_to_task_definition).collect()
    }

    async fn update_task_definition_runtime_state(
        &self,
        id: TaskDefinitionId,
        state: serde_json::Value,
    ) -> StoreResult<()> {
        sqlx::query("UPDATE task_definitions SET runtime_state = $1 WHERE id = $2")
            .bind(state)
            .bind(id)
            .execute(&self.pool)
            .await?;
        Ok(())
    }

    async fn create_agent_config(&self, config: AgentConfig) -> StoreResult<()> {
        let siblings: Vec<AgentConfig> =
            self.list_agent_configs(config.user).await?.into_iter().filter(|c| c.id != config.id).collect();
        check_sub_agent_refs_acyclic(&config, &siblings)?;

        let mut tx = self.pool.begin().await?;
        if config.is_default {
            sqlx::query("UPDATE agent_configs SET is_default = false WHERE user_id = $1")
                .bind(config.user)
                .execute(&mut *tx)
                .await?;
        }
        sqlx::query(
            "INSERT INTO agent_configs (id, user_id, name, system_prompt, provider, model, tool_refs, sub_agent_refs, recursion_cap, is_default)
             VALUES ($1,$2,$3,$4,$5,$6,$7,$8,$9,$10)",
        )
        .bind(config.id)
        .bind(config.user)
        .bind(config.name)
        .bind(config.system_prompt)
        .bind(config.provider)
        .bind(config.model)
        .bind(&config.tool_refs)
        .bind(&config.sub_agent_refs)
        .bind(config.recursion_cap as i32)
        .bind(config.is_default)
        .execute(&mut *tx)
        .await?;
        tx.commit().await?;
        Ok(())
    }

    async fn get_agent_config(&self, id: AgentConfigId) -> StoreResult<AgentConfig> {
        let row = sqlx::query(
            "SELECT id, user_id, name, system_prompt, provider, model, tool_refs, sub_agent_refs, recursion_cap, is_default
             FROM agent_configs WHERE id = $1",
        )
        .bind(id)
        .fetch_optional(&self.pool)
        .await?
        .ok_or_else(|| not_found("agent_config", id))?;
        row_to_agent_config(&row)
    }

    async fn get_default_agent_config(&self, user: UserId) -> StoreResult<Option<AgentConfig>> {
        let row = sqlx::query(
            "SELECT id, user_id, name, system_prompt, provider, model, tool_refs, sub_agent_refs, recursion_cap, is_default
             FROM agent_configs WHERE user_id = $1 AND is_default",
        )
        .bind(user)
        .fetch_optional(&self.pool)
        .await?;
        row.as_ref().map(row_to_agent_config).transpose()
    }

    async fn list_agent_configs(&self, user: UserId) -> StoreResult<Vec<AgentConfig>> {
        let rows = sqlx::query(
            "SELECT id, user_id, name, system_prompt, provider, model, tool_refs, sub_agent_refs, recursion_cap, is_default
             FROM agent_configs WHERE user_id = $1",
        )
        .bind(user)
        .fetch_all(&self.pool)
        .await?;
        rows.iter().map(row_to_agent_config).collect()
    }

    async fn fts_candidates(
        &self,
        user: UserId,
        query: &str,
        exclude_message_id: Option<MessageId>,
        limit: usize,
    ) -> StoreResult<Vec<SearchCandidate>> {
        let rows = sqlx::query(
            "SELECT 'summary' as source, id, thread_id, summary_markdown as text, updated_at as created_at,
                    ts_rank(to_tsvector('english', summary_markdown), plainto_tsquery('english', $2)) as raw
             FROM day_segments
             WHERE user_id = $1 AND summary_markdown IS NOT NULL
               AND to_tsvector('english', summary_markdown) @@ plainto_tsquery('english', $2)
               AND ($3::bigint IS NULL OR summary_until_message IS DISTINCT FROM $3)
             UNION ALL
             SELECT 'chunk' as source, id, thread_id, content_text as text, created_at,
                    ts_rank(to_tsvector('english', content_text), plainto_tsquery('english', $2)) as raw
             FROM transcript_chunks
             WHERE user_id = $1
               AND to_tsvector('english', content_text) @@ plainto_tsquery('english', $2)
               AND ($3::bigint IS NULL OR NOT (start_message <= $3 AND $3 <= end_message))
             ORDER BY raw DESC LIMIT $4",
        )
        .bind(user)
        .bind(query)
        .bind(exclude_message_id)
        .bind(limit as i64)
        .fetch_all(&self.pool)
        .await?;
        rows.iter().map(row_to_candidate_fts).collect()
    }

    async fn semantic_candidates(
        &self,
        user: UserId,
        query_embedding: &[f32],
        exclude_message_id: Option<MessageId>,
        limit: usize,
    ) -> StoreResult<Vec<SearchCandidate>> {
        let vector = Vector::from(query_embedding.to_vec());
        let rows = sqlx::query(
            "SELECT 'summary' as source, ds.id, ds.thread_id, ds.summary_markdown as text, ds.updated_at as created_at,
                    dse.embedding <-> $2 as distance
             FROM day_segments ds JOIN day_segment_embeddings dse ON dse.day_segment_id = ds.id
             WHERE ds.user_id = $1 AND dse.state = 'ready'
               AND ($3::bigint IS NULL OR ds.summary_until_message IS DISTINCT FROM $3)
             UNION ALL
             SELECT 'chunk' as source, tc.id, tc.thread_id, tc.content_text as text, tc.created_at,
                    tce.embedding <-> $2 as distance
             FROM transcript_chunks tc JOIN transcript_chunk_embeddings tce ON tce.transcript_chunk_id = tc.id
             WHERE tc.user_id = $1 AND tce.state = 'ready'
               AND ($3::bigint IS NULL OR NOT (tc.start_message <= $3 AND $3 <= tc.end_message))
             ORDER BY distance ASC LIMIT $4",
        )
        .bind(user)
        .bind(vector)
        .bind(exclude_message_id)
        .bind(limit as i64)
        .fetch_all(&self.pool)
        .await?;
        rows.iter().map(row_to_candidate_semantic).collect()
    }
}

fn row_to_message(row: &sqlx::postgres::PgRow) -> StoreResult<Message> {
    let kind: String = row.try_get("kind")?;
    let actor: String = row.try_get("actor")?;
    Ok(Message {
        id: row.try_get("id")?,
        user: row.try_get("user_id")?,
        thread: row.try_get("thread_id")?,
        actor: parse_actor(&actor),
        text: row.try_get("text")?,
        internal_data: row.try_get("internal_data")?,
        kind: parse_message_kind(&kind),
        created_at: row.try_get("created_at")?,
        interaction: row.try_get("interaction_id")?,
    })
}

fn row_to_interaction(row: &sqlx::postgres::PgRow) -> StoreResult<Interaction> {
    let status: String = row.try_get("status")?;
    Ok(Interaction {
        id: row.try_get("id")?,
        task: row.try_get("task_id")?,
        thread: row.try_get("thread_id")?,
        agent_ref: row.try_get("agent_ref")?,
        origin_name: row.try_get("origin_name")?,
        question: row.try_get("question")?,
        schema: row.try_get("schema")?,
        answer: row.try_get("answer")?,
        resume_payload: row.try_get("resume_payload")?,
        status: parse_interaction_status(&status),
        question_message: row.try_get("question_message_id")?,
        created_at: row.try_get("created_at")?,
    })
}

fn row_to_task(row: &sqlx::postgres::PgRow) -> StoreResult<Task> {
    let status: String = row.try_get("status")?;
    let progress_log: serde_json::Value = row.try_get("progress_log")?;
    Ok(Task {
        id: row.try_get("id")?,
        user: row.try_get("user_id")?,
        thread: row.try_get("thread_id")?,
        agent_ref: row.try_get("agent_ref")?,
        status: parse_task_status(&status),
        progress_log: serde_json::from_value(progress_log).unwrap_or_default(),
        result: row.try_get("result")?,
        source_message_id: row.try_get("source_message_id")?,
        created_at: row.try_get("created_at")?,
    })
}

fn row_to_day_segment(row: &sqlx::postgres::PgRow) -> StoreResult<DaySegment> {
    Ok(DaySegment {
        id: row.try_get("id")?,
        user: row.try_get("user_id")?,
        thread: row.try_get("thread_id")?,
        day_label: row.try_get("day_label")?,
        starts_at_message: row.try_get("starts_at_message")?,
        starts_at: row.try_get("starts_at")?,
        summary_markdown: row.try_get("summary_markdown")?,
        summary_until_message: row.try_get("summary_until_message")?,
        updated_at: row.try_get("updated_at")?,
    })
}

fn row_to_chunk(row: &sqlx::postgres::PgRow) -> StoreResult<TranscriptChunk> {
    let token_estimate: i64 = row.try_get("token_estimate")?;
    Ok(TranscriptChunk {
        id: row.try_get("id")?,
        user: row.try_get("user_id")?,
        thread: row.try_get("thread_id")?,
        day_segment: row.try_get("day_segment_id")?,
        start_message: row.try_get("start_message")?,
        end_message: row.try_get("end_message")?,
        content_text: row.try_get("content_text")?,
        content_hash: row.try_get("content_hash")?,
        token_estimate: token_estimate as usize,
        created_at: row.try_get("created_at")?,
    })
}

fn row_to_task_definition(row: &sqlx::postgres::PgRow) -> StoreResult<TaskDefinition> {
    let kind: String = row.try_get("kind")?;
    let trigger: String = row.try_get("trigger")?;
    let run_mode: String = row.try_get("run_mode")?;
    let poll_interval_minutes: Option<i32> = row.try_get("poll_interval_minutes")?;
    Ok(TaskDefinition {
        id: row.try_get("id")?,
        user: row.try_get("user_id")?,
        name: row.try_get("name")?,
        kind: parse_task_def_kind(&kind),
        trigger: parse_trigger_kind(&trigger),
        cron_expression: row.try_get("cron_expression")?,
        cron_tz: row.try_get("cron_tz")?,
        prompt_template: row.try_get("prompt_template")?,
        run_mode: parse_run_mode(&run_mode),
        agent_ref: row.try_get("agent_ref")?,
        email_tool_ref: row.try_get("email_tool_ref")?,
        poll_interval_minutes: poll_interval_minutes.map(|v| v as u32),
        runtime_state: row.try_get("runtime_state")?,
        is_active: row.try_get("is_active")?,
    })
}

fn row_to_agent_config(row: &sqlx::postgres::PgRow) -> StoreResult<AgentConfig> {
    let recursion_cap: i32 = row.try_get("recursion_cap")?;
    Ok(AgentConfig {
        id: row.try_get("id")?,
        user: row.try_get("user_id")?,
        name: row.try_get("name")?,
        system_prompt: row.try_get("system_prompt")?,
        provider: row.try_get("provider")?,
        model: row.try_get("model")?,
        tool_refs: row.try_get("tool_refs")?,
        sub_agent_refs: row.try_get("sub_agent_refs")?,
        recursion_cap: recursion_cap as u32,
        is_default: row.try_get("is_default")?,
    })
}

fn row_to_candidate_fts(row: &sqlx::postgres::PgRow) -> StoreResult<SearchCandidate> {
    let source: String = row.try_get("source")?;
    Ok(SearchCandidate {
        source: if source == "summary" { CandidateSource::DaySegmentSummary } else { CandidateSource::TranscriptChunk },
        id: row.try_get("id")?,
        thread: row.try_get("thread_id")?,
        text: row.try_get("text")?,
        created_at: row.try_get("created_at")?,
        fts_raw: Some(row.try_get::<f32, _>("raw")? as f64),
        semantic_distance: None,
    })
}

fn row_to_candidate_semantic(row: &sqlx::postgres::PgRow) -> StoreResult<SearchCandidate> {
    let source: String = row.try_get("source")?;
    Ok(SearchCandidate {
        source: if source == "summary" { CandidateSource::DaySegmentSummary } else { CandidateSource::TranscriptChunk },
        id: row.try_get("id")?,
        thread: row.try_get("thread_id")?,
        text: row.try_get("text")?,
        created_at: row.try_get("created_at")?,
        fts_raw: None,
        semantic_distance: Some(row.try_get::<f32, _>("distance")? as f64),
    })
}

fn parse_actor(s: &str) -> Actor {
    match s {
        "agent" => Actor::Agent,
        "system" => Actor::System,
        _ => Actor::User,
    }
}

fn parse_message_kind(s: &str) -> MessageType {
    match s {
        "question" => MessageType::Question,
        "answer" => MessageType::Answer,
        _ => MessageType::Standard,
    }
}

fn parse_interaction_status(s: &str) -> InteractionStatus {
    match s {
        "answered" => InteractionStatus::Answered,
        "canceled" => InteractionStatus::Canceled,
        _ => InteractionStatus::Pending,
    }
}

fn parse_task_status(s: &str) -> TaskStatus {
    match s {
        "running" => TaskStatus::Running,
        "awaiting_input" => TaskStatus::AwaitingInput,
        "completed" => TaskStatus::Completed,
        "failed" => TaskStatus::Failed,
        _ => TaskStatus::Pending,
    }
}

fn parse_task_def_kind(s: &str) -> TaskDefinitionKind {
    if s == "maintenance" { TaskDefinitionKind::Maintenance } else { TaskDefinitionKind::Agent }
}

fn parse_trigger_kind(s: &str) -> TriggerKind {
    if s == "email_poll" { TriggerKind::EmailPoll } else { TriggerKind::Cron }
}

fn parse_run_mode(s: &str) -> RunMode {
    match s {
        "continuous_message" => RunMode::ContinuousMessage,
        "ephemeral" => RunMode::Ephemeral,
        _ => RunMode::NewThread,
    }
}

fn status_str(s: InteractionStatus) -> &'static str {
    match s {
        InteractionStatus::Pending => "pending",
        InteractionStatus::Answered => "answered",
        InteractionStatus::Canceled => "canceled",
    }
}

fn task_status_str(s: TaskStatus) -> &'static str {
    match s {
        TaskStatus::Pending => "pending",
        TaskStatus::Running => "running",
        TaskStatus::AwaitingInput => "awaiting_input",
        TaskStatus::Completed => "completed",
        TaskStatus::Failed => "failed",
    }
}

fn task_def_kind_str(k: TaskDefinitionKind) -> &'static str {
    match k {
        TaskDefinitionKind::Agent => "agent",
        TaskDefinitionKind::Maintenance => "maintenance",
    }
}

fn trigger_kind_str(t: TriggerKind) -> &'static str {
    match t {
        TriggerKind::Cron => "cron",
        TriggerKind::EmailPoll => "email_poll",
    }
}

fn run_mode_str(m: RunMode) -> &'static str {
    match m {
        RunMode::NewThread => "new_thread",
        RunMode::ContinuousMessage => "continuous_message",
        RunMode::Ephemeral => "ephemeral",
    }
}

fn embedding_state_str(s: EmbeddingState) -> &'static str {
    match s {
        EmbeddingState::Pending => "pending",
        EmbeddingState::Ready => "ready",
        EmbeddingState::Error => "error",
    }
}
