// SPDX-License-Identifier: Apache-2.0
//! Day Summarizer (§4.3): produces/refreshes Markdown summaries of closed
//! days. The actual LLM call is injected as a closure so this module stays
//! testable without a provider — the agent turn itself belongs to
//! `nova-core`, which owns provider/tool wiring.

use chrono::Utc;
use nova_store::entities::{DaySegment, DaySegmentId, Embedding, MessageId};
use nova_store::ConversationStore;

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum TriggerMode {
    Heuristic,
    Nightly,
    Manual,
}

pub fn needs_refresh(segment: &DaySegment, max_message_id_in_window: Option<MessageId>) -> bool {
    segment.needs_refresh(max_message_id_in_window)
}

/// What to feed the summarizing agent for one segment: the prior summary (if
/// any) plus either the full-day transcript (manual mode) or only the delta
/// since `summary_until_message` (heuristic/nightly).
pub struct SummarizationInput {
    pub prior_summary: Option<String>,
    pub transcript: String,
    pub last_included_message: MessageId,
}

pub async fn build_summarization_input(
    store: &dyn ConversationStore,
    segment: &DaySegment,
    mode: TriggerMode,
) -> anyhow::Result<Option<SummarizationInput>> {
    let messages = store.list_messages(segment.thread, None).await?;
    let mut in_window: Vec<_> = messages
        .into_iter()
        .filter(|m| {
            m.created_at >= segment.starts_at
                && match mode {
                    TriggerMode::Manual => true,
                    _ => segment
                        .summary_until_message
                        .is_none_or(|boundary| m.id > boundary),
                }
        })
        .collect();
    in_window.sort_by_key(|m| m.id);

    if in_window.is_empty() {
        return Ok(None);
    }

    let last_included_message = in_window.last().unwrap().id;
    let transcript = in_window
        .iter()
        .filter(|m| m.actor != nova_store::entities::Actor::System)
        .map(|m| format!("{:?}: {}", m.actor, m.text))
        .collect::<Vec<_>>()
        .join("\n");

    let prior_summary = match mode {
        TriggerMode::Manual => None,
        _ => segment.summary_markdown.clone().filter(|s| !s.trim().is_empty()),
    };

    Ok(Some(SummarizationInput { prior_summary, transcript, last_included_message }))
}

/// Strips inline "thinking" markers an agent might emit before the actual
/// summary, matching the `silent_mode` post-processing rule.
pub fn strip_thinking_markers(text: &str) -> String {
    let mut result = text.to_string();
    for (open, close) in [("<thinking>", "</thinking>"), ("[thinking]", "[/thinking]")] {
        while let Some(start) = result.find(open) {
            if let Some(end) = result[start..].find(close) {
                result.replace_range(start..start + end + close.len(), "");
            } else {
                result.replace_range(start.., "");
                break;
            }
        }
    }
    result.trim().to_string()
}

/// Persists a refreshed summary inside a single DB transaction: updates the
/// segment and resets its embedding to pending in one atomic store call, so
/// a crash partway through never leaves a stale embedding paired with a
/// fresh summary.
pub async fn apply_summary(
    store: &dyn ConversationStore,
    segment_id: DaySegmentId,
    summary_markdown: String,
    last_included_message: MessageId,
) -> anyhow::Result<()> {
    let cleaned = strip_thinking_markers(&summary_markdown);
    store
        .apply_day_segment_summary(segment_id, cleaned, last_included_message, Embedding::pending(1536))
        .await?;
    Ok(())
}

/// Ordering for nightly maintenance: strictly chronological so each day's
/// summary can use the freshly-updated previous day as context.
pub fn order_for_nightly_run(mut segments: Vec<DaySegment>) -> Vec<DaySegment> {
    let today = Utc::now().date_naive();
    segments.retain(|s| s.day_label < today);
    segments.sort_by_key(|s| s.day_label);
    segments
}
