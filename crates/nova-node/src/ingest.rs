// SPDX-License-Identifier: Apache-2.0
//! Message ingest API (§6): `POST {message, transport?, external_message_id?,
//! selected_agent_id?}` → `202 {status, thread_id, task_id, message_id,
//! day_segment_id, day_label, opened_new_day}`.

use std::sync::Arc;

use axum::{extract::State, http::StatusCode, Json};
use nova_core::append_continuous_message;
use nova_store::entities::{Actor, DaySegmentId, MessageId, Task, TaskStatus, ThreadId};
use serde::{Deserialize, Serialize};
use uuid::Uuid;

use crate::error::ApiError;
use crate::AppState;

#[derive(Debug, Deserialize)]
pub struct IngestRequest {
    pub message: String,
    pub transport: Option<String>,
    pub external_message_id: Option<String>,
    pub selected_agent_id: Option<Uuid>,
}

#[derive(Debug, Serialize)]
pub struct IngestResponse {
    pub status: &'static str,
    pub thread_id: ThreadId,
    pub task_id: Uuid,
    pub message_id: MessageId,
    pub day_segment_id: DaySegmentId,
    pub day_label: chrono::NaiveDate,
    pub opened_new_day: bool,
}

pub async fn handle_ingest(state: &AppState, req: IngestRequest) -> Result<IngestResponse, ApiError> {
    if req.message.trim().is_empty() {
        return Err(ApiError::Validation("message is required".into()));
    }

    let agent_ref = match req.selected_agent_id {
        Some(id) => {
            state.store.get_agent_config(id).await.map_err(|_| ApiError::Validation("unknown selected_agent_id".into()))?;
            id
        }
        None => state
            .store
            .get_default_agent_config(state.user)
            .await?
            .ok_or_else(|| ApiError::Internal(anyhow::anyhow!("no default agent configured for user")))?
            .id,
    };

    let internal_data = serde_json::json!({
        "source": {
            "channel": "http",
            "transport": req.transport,
            "external_message_id": req.external_message_id,
        }
    });

    let outcome =
        append_continuous_message(state.store.as_ref(), state.user, Actor::User, req.message, internal_data, &state.tz).await?;

    let task = Task {
        id: Uuid::new_v4(),
        user: state.user,
        thread: outcome.thread_id,
        agent_ref,
        status: TaskStatus::Pending,
        progress_log: vec![],
        result: None,
        source_message_id: Some(outcome.message.id),
        created_at: chrono::Utc::now(),
    };
    state.store.create_task(task.clone()).await?;

    let executor = state.executor.clone();
    let task_id = task.id;
    tokio::spawn(async move {
        if let Err(e) = executor.execute(task_id).await {
            tracing::warn!(task = %task_id, error = %e, "ingest task execution failed");
        }
    });

    Ok(IngestResponse {
        status: "accepted",
        thread_id: outcome.thread_id,
        task_id: task.id,
        message_id: outcome.message.id,
        day_segment_id: outcome.day_segment_id,
        day_label: outcome.day_label,
        opened_new_day: outcome.opened_new_day,
    })
}

pub async fn ingest_handler(
    State(state): State<Arc<AppState>>,
    Json(req): Json<IngestRequest>,
) -> Result<(StatusCode, Json<IngestResponse>), ApiError> {
    let resp = handle_ingest(&state, req).await?;
    Ok((StatusCode::ACCEPTED, Json(resp)))
}
