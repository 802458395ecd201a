// SPDX-License-Identifier: Apache-2.0
//! Continuous browsing (§6): day list (paginated, `q`-filtered), single-day
//! fetch, message fetch/post, and manual summary regeneration.

use std::sync::Arc;

use axum::{
    extract::{Path, Query, State},
    http::StatusCode,
    Json,
};
use nova_runtime::summarizer::TriggerMode;
use nova_store::entities::{DaySegment, DaySegmentId, Message};
use serde::{Deserialize, Serialize};
use uuid::Uuid;

use crate::error::ApiError;
use crate::ingest::{handle_ingest, IngestRequest, IngestResponse};
use crate::AppState;

const DEFAULT_LIMIT: usize = 20;
const MAX_LIMIT: usize = 100;

#[derive(Debug, Deserialize)]
pub struct ListDaysQuery {
    pub offset: Option<usize>,
    pub limit: Option<usize>,
    pub q: Option<String>,
}

#[derive(Debug, Serialize)]
pub struct DaySummaryDto {
    pub id: DaySegmentId,
    pub day_label: chrono::NaiveDate,
    pub has_summary: bool,
    pub updated_at: chrono::DateTime<chrono::Utc>,
}

impl From<&DaySegment> for DaySummaryDto {
    fn from(s: &DaySegment) -> Self {
        Self { id: s.id, day_label: s.day_label, has_summary: s.has_non_empty_summary(), updated_at: s.updated_at }
    }
}

/// `q` matches a `YYYY`, `YYYY-MM`, or `YYYY-MM-DD` prefix of the ISO date
/// (§6: "optional `q` filter matching `YYYY`, `YYYY-MM`, or `YYYY-MM-DD`").
fn matches_query(day_label: chrono::NaiveDate, q: &str) -> bool {
    day_label.format("%Y-%m-%d").to_string().starts_with(q)
}

pub async fn list_days(state: &AppState, thread_id: nova_store::entities::ThreadId, query: ListDaysQuery) -> Result<Vec<DaySummaryDto>, ApiError> {
    let limit = query.limit.unwrap_or(DEFAULT_LIMIT).clamp(1, MAX_LIMIT);
    let offset = query.offset.unwrap_or(0);

    let mut segments = state.store.list_day_segments(thread_id).await?;
    segments.sort_by(|a, b| b.day_label.cmp(&a.day_label));

    if let Some(q) = &query.q {
        segments.retain(|s| matches_query(s.day_label, q));
    }

    Ok(segments.iter().skip(offset).take(limit).map(DaySummaryDto::from).collect())
}

async fn continuous_thread_id(state: &AppState) -> Result<nova_store::entities::ThreadId, ApiError> {
    Ok(nova_core::ensure_continuous_thread(state.store.as_ref(), state.user).await?.id)
}

pub async fn list_days_handler(
    State(state): State<Arc<AppState>>,
    Query(query): Query<ListDaysQuery>,
) -> Result<Json<Vec<DaySummaryDto>>, ApiError> {
    let thread_id = continuous_thread_id(&state).await?;
    Ok(Json(list_days(&state, thread_id, query).await?))
}

pub async fn fetch_day(state: &AppState, day_segment_id: DaySegmentId) -> Result<DaySegment, ApiError> {
    let segment = state.store.get_day_segment(day_segment_id).await?;
    if segment.user != state.user {
        return Err(ApiError::NotFound(format!("day segment {day_segment_id}")));
    }
    Ok(segment)
}

pub async fn fetch_day_handler(
    State(state): State<Arc<AppState>>,
    Path(day_segment_id): Path<DaySegmentId>,
) -> Result<Json<DaySegment>, ApiError> {
    Ok(Json(fetch_day(&state, day_segment_id).await?))
}

/// Messages within `segment`'s window: from its `starts_at_message` up to
/// (but not including) the next day segment's, or open-ended if `segment`
/// is the most recent one. Past days are effectively read-only since no new
/// message can land inside a closed window once the next day has opened.
pub async fn fetch_messages(state: &AppState, day_segment_id: DaySegmentId) -> Result<Vec<Message>, ApiError> {
    let segment = fetch_day(state, day_segment_id).await?;
    let siblings = state.store.list_day_segments(segment.thread).await?;
    let next_boundary = siblings
        .iter()
        .filter(|s| s.day_label > segment.day_label)
        .map(|s| s.starts_at_message)
        .min();

    let messages = state.store.list_messages(segment.thread, None).await?;
    Ok(messages
        .into_iter()
        .filter(|m| m.id >= segment.starts_at_message && next_boundary.is_none_or(|b| m.id < b))
        .collect())
}

pub async fn fetch_messages_handler(
    State(state): State<Arc<AppState>>,
    Path(day_segment_id): Path<DaySegmentId>,
) -> Result<Json<Vec<Message>>, ApiError> {
    Ok(Json(fetch_messages(&state, day_segment_id).await?))
}

/// Posting into a specific day's container behaves like the ingest API
/// (§6: "post a message → behaves like ingest above").
pub async fn post_message_handler(
    State(state): State<Arc<AppState>>,
    Path(_day_segment_id): Path<DaySegmentId>,
    Json(body): Json<IngestRequest>,
) -> Result<(StatusCode, Json<IngestResponse>), ApiError> {
    let resp = handle_ingest(&state, body).await?;
    Ok((StatusCode::ACCEPTED, Json(resp)))
}

#[derive(Debug, Serialize)]
pub struct SummarizeResponse {
    pub task_id: Uuid,
}

/// Schedules a manual summarizer run for `day_segment_id` and returns a job
/// id the caller can subscribe to over the event channel, the same
/// "call stands in for a queue hop" treatment used for transcript indexing.
pub async fn trigger_summary(state: &AppState, day_segment_id: DaySegmentId) -> Result<Uuid, ApiError> {
    let segment = fetch_day(state, day_segment_id).await?;
    let provider = state
        .summary_provider
        .clone()
        .ok_or_else(|| ApiError::Validation("no summary model configured".into()))?;

    let job_id = Uuid::new_v4();
    let store = state.store.clone();
    let events = state.events.clone();
    tokio::spawn(async move {
        let summarizer = nova_core::DaySummarizer::new(store, provider, events);
        if let Err(e) = summarizer.run(&segment, TriggerMode::Manual, job_id).await {
            tracing::warn!(day_segment = %segment.id, error = %e, "manual summary regeneration failed");
        }
    });
    Ok(job_id)
}

pub async fn trigger_summary_handler(
    State(state): State<Arc<AppState>>,
    Path(day_segment_id): Path<DaySegmentId>,
) -> Result<(StatusCode, Json<SummarizeResponse>), ApiError> {
    let task_id = trigger_summary(&state, day_segment_id).await?;
    Ok((StatusCode::ACCEPTED, Json(SummarizeResponse { task_id })))
}

#[cfg(test)]
mod tests {
    use super::*;
    use nova_core::EventBus;
    use nova_store::entities::{Actor, NewMessage, Thread, ThreadMode};
    use nova_store::{ConversationStore, InMemoryStore};

    fn state_with_store(store: Arc<InMemoryStore>, user: Uuid) -> Arc<AppState> {
        Arc::new(AppState {
            store,
            executor: dummy_executor(),
            events: Arc::new(EventBus::new()),
            user,
            tz: chrono_tz::UTC,
            token: crate::auth::RawToken::generate().into_stored(),
            summary_provider: None,
        })
    }

    fn dummy_executor() -> Arc<nova_core::TaskExecutor> {
        use nova_core::{InMemoryGraphCheckpointStore, ProviderResolver, ToolSetBuilder};
        use nova_model::{ModelProvider, ScriptedMockProvider};
        use nova_store::entities::AgentConfig;
        use nova_store::{InMemoryCheckpointStore, InMemoryStore};

        struct Resolver(Arc<dyn ModelProvider>);
        #[async_trait::async_trait]
        impl ProviderResolver for Resolver {
            async fn resolve(&self, _c: &AgentConfig) -> anyhow::Result<Arc<dyn ModelProvider>> {
                Ok(self.0.clone())
            }
        }
        struct Tools;
        #[async_trait::async_trait]
        impl ToolSetBuilder for Tools {
            async fn build(&self, _c: &AgentConfig) -> anyhow::Result<Arc<nova_tools::ToolRegistry>> {
                Ok(Arc::new(nova_tools::ToolRegistry::new()))
            }
        }
        Arc::new(nova_core::TaskExecutor::new(
            Arc::new(InMemoryStore::new()),
            Arc::new(InMemoryCheckpointStore::new()),
            Arc::new(InMemoryGraphCheckpointStore::new()),
            Arc::new(Resolver(Arc::new(ScriptedMockProvider::always_text("hi")))),
            Arc::new(Tools),
            Arc::new(EventBus::new()),
            chrono_tz::UTC,
        ))
    }

    async fn two_day_setup() -> (Arc<AppState>, nova_store::entities::ThreadId, DaySegmentId, DaySegmentId) {
        let store = Arc::new(InMemoryStore::new());
        let user = Uuid::new_v4();
        let thread = Thread { id: Uuid::new_v4(), user, subject: "t".into(), mode: ThreadMode::Continuous, created_at: chrono::Utc::now() };
        store.create_thread(thread.clone()).await.unwrap();

        let m1 = store.append_message(NewMessage::standard(user, thread.id, Actor::User, "day one")).await.unwrap();
        let day1 = store
            .get_or_create_day_segment(user, thread.id, chrono::NaiveDate::from_ymd_opt(2026, 1, 1).unwrap(), m1.id, m1.created_at)
            .await
            .unwrap();

        let m2 = store.append_message(NewMessage::standard(user, thread.id, Actor::User, "day two")).await.unwrap();
        let day2 = store
            .get_or_create_day_segment(user, thread.id, chrono::NaiveDate::from_ymd_opt(2026, 1, 2).unwrap(), m2.id, m2.created_at)
            .await
            .unwrap();

        let state = state_with_store(store, user);
        (state, thread.id, day1.id, day2.id)
    }

    #[tokio::test]
    async fn list_days_is_most_recent_first_and_respects_limit() {
        let (state, thread, _d1, _d2) = two_day_setup().await;
        let days = list_days(&state, thread, ListDaysQuery { offset: None, limit: Some(1), q: None }).await.unwrap();
        assert_eq!(days.len(), 1);
        assert_eq!(days[0].day_label, chrono::NaiveDate::from_ymd_opt(2026, 1, 2).unwrap());
    }

    #[tokio::test]
    async fn list_days_filters_by_month_prefix() {
        let (state, thread, _d1, _d2) = two_day_setup().await;
        let days = list_days(&state, thread, ListDaysQuery { offset: None, limit: None, q: Some("2026-01".into()) }).await.unwrap();
        assert_eq!(days.len(), 2);
        let none = list_days(&state, thread, ListDaysQuery { offset: None, limit: None, q: Some("2025".into()) }).await.unwrap();
        assert!(none.is_empty());
    }

    #[tokio::test]
    async fn limit_is_clamped_to_the_allowed_range() {
        let (state, thread, _d1, _d2) = two_day_setup().await;
        let days = list_days(&state, thread, ListDaysQuery { offset: None, limit: Some(0), q: None }).await.unwrap();
        assert_eq!(days.len(), 1);
    }

    #[tokio::test]
    async fn fetch_messages_scopes_to_the_days_own_window() {
        let (state, _thread, day1, day2) = two_day_setup().await;
        let first_day_messages = fetch_messages(&state, day1).await.unwrap();
        assert_eq!(first_day_messages.len(), 1);
        assert_eq!(first_day_messages[0].text, "day one");

        let second_day_messages = fetch_messages(&state, day2).await.unwrap();
        assert_eq!(second_day_messages.len(), 1);
        assert_eq!(second_day_messages[0].text, "day two");
    }

    #[tokio::test]
    async fn fetching_another_users_day_segment_is_not_found() {
        let (state, _thread, day1, _day2) = two_day_setup().await;
        let other_state = Arc::new(AppState {
            store: state.store.clone(),
            executor: dummy_executor(),
            events: Arc::new(EventBus::new()),
            user: Uuid::new_v4(),
            tz: chrono_tz::UTC,
            token: crate::auth::RawToken::generate().into_stored(),
            summary_provider: None,
        });
        let err = fetch_day(&other_state, day1).await.unwrap_err();
        assert!(matches!(err, ApiError::NotFound(_)));
    }

    #[tokio::test]
    async fn trigger_summary_without_a_provider_is_rejected() {
        let (state, _thread, day1, _day2) = two_day_setup().await;
        let err = trigger_summary(&state, day1).await.unwrap_err();
        assert!(matches!(err, ApiError::Validation(_)));
    }
}
