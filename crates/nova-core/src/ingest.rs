// SPDX-License-Identifier: Apache-2.0
//! Continuous-thread message ingest (§4.7 `continuous_message` run_mode,
//! §6 message ingest API): the single code path both the scheduler's
//! task-definition runner and the node's HTTP ingest endpoint drive, so
//! "ensure today's DaySegment, index the new tail" has exactly one home.

use nova_runtime::indexer::index_segment;
use nova_store::entities::{Actor, DaySegment, DaySegmentId, Message, MessageType, NewMessage, ThreadId, UserId};
use nova_store::ConversationStore;

use crate::executor::ensure_continuous_thread;

pub struct ContinuousAppendOutcome {
    pub thread_id: ThreadId,
    pub message: Message,
    pub day_segment_id: DaySegmentId,
    pub day_label: chrono::NaiveDate,
    pub opened_new_day: bool,
    /// The day that just closed, when `opened_new_day` — the candidate for
    /// a heuristic summary refresh.
    pub previous_segment: Option<DaySegment>,
}

#[allow(clippy::too_many_arguments)]
pub async fn append_continuous_message(
    store: &dyn ConversationStore,
    user: UserId,
    actor: Actor,
    text: impl Into<String>,
    internal_data: serde_json::Value,
    tz: &chrono_tz::Tz,
) -> anyhow::Result<ContinuousAppendOutcome> {
    let thread = ensure_continuous_thread(store, user).await?;
    let now = chrono::Utc::now();
    let today = now.with_timezone(tz).date_naive();

    let existing_segments = store.list_day_segments(thread.id).await?;
    let opened_new_day = !existing_segments.iter().any(|s| s.day_label == today);
    let previous_segment = if opened_new_day {
        existing_segments.into_iter().max_by_key(|s| s.day_label)
    } else {
        None
    };

    let latest = store.latest_message_id(thread.id).await?.unwrap_or(0);
    let segment = store.get_or_create_day_segment(user, thread.id, today, latest + 1, now).await?;

    let message = store
        .append_message(NewMessage { user, thread: thread.id, actor, text: text.into(), internal_data, kind: MessageType::Standard, interaction: None })
        .await?;

    index_segment(store, user, thread.id, segment.id).await.ok();

    Ok(ContinuousAppendOutcome {
        thread_id: thread.id,
        message,
        day_segment_id: segment.id,
        day_label: today,
        opened_new_day,
        previous_segment,
    })
}

#[cfg(test)]
mod tests {
    use super::*;
    use nova_store::InMemoryStore;
    use std::sync::Arc;
    use uuid::Uuid;

    #[tokio::test]
    async fn first_message_opens_today_and_creates_the_continuous_thread() {
        let store = Arc::new(InMemoryStore::new());
        let user = Uuid::new_v4();
        let outcome =
            append_continuous_message(store.as_ref(), user, Actor::User, "hi", serde_json::Value::Null, &chrono_tz::UTC)
                .await
                .unwrap();
        assert!(outcome.opened_new_day);
        assert!(outcome.previous_segment.is_none());
        assert_eq!(outcome.message.text, "hi");
    }

    #[tokio::test]
    async fn a_second_message_the_same_day_does_not_reopen_it() {
        let store = Arc::new(InMemoryStore::new());
        let user = Uuid::new_v4();
        append_continuous_message(store.as_ref(), user, Actor::User, "hi", serde_json::Value::Null, &chrono_tz::UTC)
            .await
            .unwrap();
        let second =
            append_continuous_message(store.as_ref(), user, Actor::User, "again", serde_json::Value::Null, &chrono_tz::UTC)
                .await
                .unwrap();
        assert!(!second.opened_new_day);
    }
}
