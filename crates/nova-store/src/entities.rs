// SPDX-License-Identifier: Apache-2.0
use chrono::{DateTime, NaiveDate, Utc};
use serde::{Deserialize, Serialize};
use uuid::Uuid;

pub type UserId = Uuid;
pub type ThreadId = Uuid;
pub type MessageId = i64;
pub type InteractionId = Uuid;
pub type TaskId = Uuid;
pub type DaySegmentId = Uuid;
pub type TranscriptChunkId = Uuid;
pub type TaskDefinitionId = Uuid;
pub type AgentConfigId = Uuid;

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum ThreadMode {
    Thread,
    Continuous,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Thread {
    pub id: ThreadId,
    pub user: UserId,
    pub subject: String,
    pub mode: ThreadMode,
    pub created_at: DateTime<Utc>,
}

impl Thread {
    /// Matches the default subject template ("thread n°*") the auto-titling
    /// rule in the Task Executor checks before requesting a generated title.
    pub fn has_default_subject(&self) -> bool {
        self.subject.starts_with("thread n\u{b0}")
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum Actor {
    User,
    Agent,
    System,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum MessageType {
    Standard,
    Question,
    Answer,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Message {
    pub id: MessageId,
    pub user: UserId,
    pub thread: ThreadId,
    pub actor: Actor,
    pub text: String,
    #[serde(default)]
    pub internal_data: serde_json::Value,
    #[serde(rename = "type")]
    pub kind: MessageType,
    pub created_at: DateTime<Utc>,
    /// Set when this message is the question prompt for an Interaction.
    pub interaction: Option<InteractionId>,
}

#[derive(Debug, Clone)]
pub struct NewMessage {
    pub user: UserId,
    pub thread: ThreadId,
    pub actor: Actor,
    pub text: String,
    pub internal_data: serde_json::Value,
    pub kind: MessageType,
    pub interaction: Option<InteractionId>,
}

impl NewMessage {
    pub fn standard(user: UserId, thread: ThreadId, actor: Actor, text: impl Into<String>) -> Self {
        Self {
            user,
            thread,
            actor,
            text: text.into(),
            internal_data: serde_json::Value::Null,
            kind: MessageType::Standard,
            interaction: None,
        }
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum InteractionStatus {
    Pending,
    Answered,
    Canceled,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Interaction {
    pub id: InteractionId,
    pub task: TaskId,
    pub thread: ThreadId,
    pub agent_ref: AgentConfigId,
    pub origin_name: String,
    pub question: String,
    pub schema: serde_json::Value,
    pub answer: Option<String>,
    pub resume_payload: Option<serde_json::Value>,
    pub status: InteractionStatus,
    pub question_message: Option<MessageId>,
    pub created_at: DateTime<Utc>,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum TaskStatus {
    Pending,
    Running,
    AwaitingInput,
    Completed,
    Failed,
}

impl TaskStatus {
    pub fn is_terminal(self) -> bool {
        matches!(self, TaskStatus::Completed | TaskStatus::Failed)
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum ProgressSeverity {
    Info,
    Success,
    Error,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ProgressLogEntry {
    pub step: String,
    pub severity: ProgressSeverity,
    pub timestamp: DateTime<Utc>,
    #[serde(default)]
    pub extra: serde_json::Value,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Task {
    pub id: TaskId,
    pub user: UserId,
    pub thread: ThreadId,
    pub agent_ref: AgentConfigId,
    pub status: TaskStatus,
    pub progress_log: Vec<ProgressLogEntry>,
    pub result: Option<String>,
    pub source_message_id: Option<MessageId>,
    pub created_at: DateTime<Utc>,
}

impl Task {
    pub fn push_progress(&mut self, step: impl Into<String>, severity: ProgressSeverity) {
        self.progress_log.push(ProgressLogEntry {
            step: step.into(),
            severity,
            timestamp: Utc::now(),
            extra: serde_json::Value::Null,
        });
    }
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct CheckpointLink {
    pub id: Uuid,
    pub thread: ThreadId,
    pub agent_ref: AgentConfigId,
    pub continuous_context_fingerprint: Option<String>,
    pub continuous_context_built_at: Option<DateTime<Utc>>,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct DaySegment {
    pub id: DaySegmentId,
    pub user: UserId,
    pub thread: ThreadId,
    pub day_label: NaiveDate,
    pub starts_at_message: MessageId,
    pub starts_at: DateTime<Utc>,
    pub summary_markdown: Option<String>,
    pub summary_until_message: Option<MessageId>,
    pub updated_at: DateTime<Utc>,
}

impl DaySegment {
    pub fn has_non_empty_summary(&self) -> bool {
        self.summary_markdown
            .as_ref()
            .is_some_and(|s| !s.trim().is_empty())
    }

    /// §8 invariant 4: needs-refresh predicate from §4.3.
    pub fn needs_refresh(&self, max_message_id_in_window: Option<MessageId>) -> bool {
        if !self.has_non_empty_summary() {
            return true;
        }
        match self.summary_until_message {
            None => true,
            Some(boundary) => max_message_id_in_window.is_some_and(|max_id| max_id > boundary),
        }
    }
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct TranscriptChunk {
    pub id: TranscriptChunkId,
    pub user: UserId,
    pub thread: ThreadId,
    pub day_segment: DaySegmentId,
    pub start_message: MessageId,
    pub end_message: MessageId,
    pub content_text: String,
    pub content_hash: String,
    pub token_estimate: usize,
    pub created_at: DateTime<Utc>,
}

pub fn content_hash(start: MessageId, end: MessageId, content: &str) -> String {
    use sha2::{Digest, Sha256};
    let mut hasher = Sha256::new();
    hasher.update(start.to_le_bytes());
    hasher.update(end.to_le_bytes());
    hasher.update(content.as_bytes());
    hex::encode(hasher.finalize())
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum EmbeddingState {
    Pending,
    Ready,
    Error,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Embedding {
    pub state: EmbeddingState,
    pub vector: Option<Vec<f32>>,
    pub provider: Option<String>,
    pub model: Option<String>,
    pub dimensions: usize,
}

impl Embedding {
    pub fn pending(dimensions: usize) -> Self {
        Self { state: EmbeddingState::Pending, vector: None, provider: None, model: None, dimensions }
    }

    /// §8 invariant 6: state=ready iff vector is non-null and dimensions match
    /// the fixed column width; shorter vectors are zero-padded, longer ones
    /// rejected (enforced by the caller before constructing this).
    pub fn is_consistent(&self) -> bool {
        match self.state {
            EmbeddingState::Ready => {
                self.vector.as_ref().is_some_and(|v| v.len() == self.dimensions)
            }
            _ => self.vector.is_none(),
        }
    }

    pub fn pad_or_reject(vector: Vec<f32>, dimensions: usize) -> Result<Vec<f32>, crate::StoreError> {
        if vector.len() > dimensions {
            return Err(crate::StoreError::Validation(format!(
                "embedding vector length {} exceeds column width {}",
                vector.len(),
                dimensions
            )));
        }
        let mut v = vector;
        v.resize(dimensions, 0.0);
        Ok(v)
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum TaskDefinitionKind {
    Agent,
    Maintenance,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum TriggerKind {
    Cron,
    EmailPoll,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum RunMode {
    NewThread,
    ContinuousMessage,
    Ephemeral,
}

#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct EmailPollRuntimeState {
    pub last_uid: u32,
    pub uidvalidity: u32,
    pub last_poll_at: Option<DateTime<Utc>>,
    pub initialized: bool,
    pub backlog_skipped_at: Option<DateTime<Utc>>,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct TaskDefinition {
    pub id: TaskDefinitionId,
    pub user: UserId,
    pub name: String,
    pub kind: TaskDefinitionKind,
    pub trigger: TriggerKind,
    pub cron_expression: Option<String>,
    pub cron_tz: String,
    pub prompt_template: String,
    pub run_mode: RunMode,
    pub agent_ref: Option<AgentConfigId>,
    pub email_tool_ref: Option<Uuid>,
    pub poll_interval_minutes: Option<u32>,
    pub runtime_state: serde_json::Value,
    pub is_active: bool,
}

impl TaskDefinition {
    /// §8 invariant 7.
    pub fn email_poll_interval_valid(&self) -> bool {
        if self.trigger != TriggerKind::EmailPoll {
            return true;
        }
        self.email_tool_ref.is_some()
            && self
                .poll_interval_minutes
                .is_some_and(|m| (1..=15).contains(&m))
    }

    /// §8 invariant 8: maintenance tasks must be cron-triggered, daily
    /// (day/month/weekday fields all `*`).
    pub fn maintenance_schedule_valid(&self) -> bool {
        if self.kind != TaskDefinitionKind::Maintenance {
            return true;
        }
        if self.trigger != TriggerKind::Cron {
            return false;
        }
        match &self.cron_expression {
            Some(expr) => {
                let fields: Vec<&str> = expr.split_whitespace().collect();
                fields.len() == 5 && fields[2] == "*" && fields[3] == "*" && fields[4] == "*"
            }
            None => false,
        }
    }
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct AgentConfig {
    pub id: AgentConfigId,
    pub user: UserId,
    pub name: String,
    pub system_prompt: String,
    pub provider: String,
    pub model: String,
    pub tool_refs: Vec<String>,
    pub sub_agent_refs: Vec<AgentConfigId>,
    pub recursion_cap: u32,
    pub is_default: bool,
}

/// §9: sub-agent references must never form a cycle. `candidate` is the
/// config about to be persisted; `siblings` is every other config the same
/// user already owns. DFS with a recursion stack, mirroring the original
/// model's `_has_cycle`.
pub fn check_sub_agent_refs_acyclic(candidate: &AgentConfig, siblings: &[AgentConfig]) -> Result<(), crate::StoreError> {
    let mut by_id: std::collections::HashMap<AgentConfigId, &AgentConfig> =
        siblings.iter().map(|c| (c.id, c)).collect();
    by_id.insert(candidate.id, candidate);

    let mut visited = std::collections::HashSet::new();
    let mut stack = std::collections::HashSet::new();
    if has_cycle(candidate.id, &by_id, &mut visited, &mut stack) {
        return Err(crate::StoreError::Validation(format!(
            "agent config {} has a cyclic sub_agent_refs dependency",
            candidate.id
        )));
    }
    Ok(())
}

fn has_cycle(
    id: AgentConfigId,
    by_id: &std::collections::HashMap<AgentConfigId, &AgentConfig>,
    visited: &mut std::collections::HashSet<AgentConfigId>,
    stack: &mut std::collections::HashSet<AgentConfigId>,
) -> bool {
    if stack.contains(&id) {
        return true;
    }
    if visited.contains(&id) {
        return false;
    }
    visited.insert(id);
    stack.insert(id);

    if let Some(config) = by_id.get(&id) {
        for &dep in &config.sub_agent_refs {
            if has_cycle(dep, by_id, visited, stack) {
                return true;
            }
        }
    }

    stack.remove(&id);
    false
}

/// §4.6: existence (not content) of a credential row is all the registry
/// inspects; the encrypted store owning the actual field values is an
/// external collaborator.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ToolCredential {
    pub user: UserId,
    pub tool_ref: String,
    pub has_any_field: bool,
}
