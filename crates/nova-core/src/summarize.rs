// SPDX-License-Identifier: Apache-2.0
//! Day Summarizer agent turn (§4.3): `nova-runtime::summarizer` builds the
//! input and applies the result; this module drives the actual completion
//! call in `silent_mode` — no tools, no conversation-visible message.

use std::sync::Arc;
use std::time::Duration;

use futures::StreamExt;
use nova_model::{CompletionRequest, Message, ModelProvider, ResponseEvent};
use nova_runtime::summarizer::{apply_summary, build_summarization_input, TriggerMode};
use nova_store::entities::{DaySegment, ProgressLogEntry, ProgressSeverity, TaskId};
use nova_store::ConversationStore;

use crate::error::TaskErrorCategory;
use crate::event_bus::{Event, EventBus};

/// Celery's default `max_retries` for the original `summarize_day_segment`
/// task (§7: "Celery-style retry with backoff").
const MAX_ATTEMPTS: u32 = 3;
const RETRY_BACKOFF: Duration = Duration::from_secs(60);

pub struct DaySummarizer {
    store: Arc<dyn ConversationStore>,
    provider: Arc<dyn ModelProvider>,
    events: Arc<EventBus>,
    retry_backoff: Duration,
}

impl DaySummarizer {
    pub fn new(store: Arc<dyn ConversationStore>, provider: Arc<dyn ModelProvider>, events: Arc<EventBus>) -> Self {
        Self { store, provider, events, retry_backoff: RETRY_BACKOFF }
    }

    /// Test-only hook so the retry path doesn't force a real 60-second wait.
    #[cfg(test)]
    fn with_backoff(store: Arc<dyn ConversationStore>, provider: Arc<dyn ModelProvider>, events: Arc<EventBus>, retry_backoff: Duration) -> Self {
        Self { store, provider, events, retry_backoff }
    }

    fn progress(&self, task_id: TaskId, step: impl Into<String>, severity: ProgressSeverity) {
        self.events.publish(
            task_id,
            Event::ProgressUpdate {
                progress_log: ProgressLogEntry { step: step.into(), severity, timestamp: chrono::Utc::now(), extra: serde_json::Value::Null },
            },
        );
    }

    /// Refreshes `segment`'s summary if there is anything new to fold in,
    /// retrying on failure with a 60-second backoff up to `MAX_ATTEMPTS`
    /// (§4.3, §7). `task_id` is the channel callers subscribe to for
    /// progress and completion events; it need not name a persisted `Task`.
    /// Returns `false` when the window was empty and nothing ran.
    pub async fn run(&self, segment: &DaySegment, mode: TriggerMode, task_id: TaskId) -> anyhow::Result<bool> {
        let Some(input) = build_summarization_input(self.store.as_ref(), segment, mode).await? else {
            return Ok(false);
        };

        let mut attempt = 0;
        loop {
            attempt += 1;
            match self.attempt(segment, &input).await {
                Ok(()) => {
                    self.events.publish(
                        task_id,
                        Event::ContinuousSummaryReady { day_segment_id: segment.id, day_label: segment.day_label, updated_at: chrono::Utc::now() },
                    );
                    return Ok(true);
                }
                Err(e) if attempt < MAX_ATTEMPTS => {
                    self.progress(task_id, "Summary generation failed, retrying...", ProgressSeverity::Error);
                    tokio::time::sleep(self.retry_backoff).await;
                    let _ = e;
                }
                Err(e) => {
                    self.events.publish(task_id, Event::TaskError { message: e.to_string(), category: TaskErrorCategory::Summary });
                    return Err(e);
                }
            }
        }
    }

    async fn attempt(&self, segment: &DaySegment, input: &nova_runtime::summarizer::SummarizationInput) -> anyhow::Result<()> {
        let mut messages = vec![Message::system(
            "Summarize this day's conversation in Markdown. Preserve decisions, facts, and open \
             threads a future turn would need. Output only the summary, no preamble.",
        )];
        if let Some(prior) = &input.prior_summary {
            messages.push(Message::user(format!("Existing summary so far:\n{prior}")));
        }
        messages.push(Message::user(format!("Transcript:\n{}", input.transcript)));

        let mut stream = self.provider.complete(CompletionRequest { messages, tools: vec![], stream: true }).await?;
        let mut summary = String::new();
        while let Some(event) = stream.next().await {
            if let ResponseEvent::TextDelta(delta) = event? {
                summary.push_str(&delta);
            }
        }

        apply_summary(self.store.as_ref(), segment.id, summary, input.last_included_message).await
    }
}
