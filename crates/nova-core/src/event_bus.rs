// SPDX-License-Identifier: Apache-2.0
//! Per-task pub/sub (§4.8): a `DashMap<TaskId, broadcast::Sender<Event>>`
//! registry, the concurrent-map idiom the rest of this stack uses for shared
//! mutable registries. Delivery is at-least-once to subscribers connected at
//! send time; nothing is persisted beyond the transient channel — the UI
//! reconciles against Task/Interaction state on reconnect.

use dashmap::DashMap;
use nova_store::entities::{DaySegmentId, InteractionId, InteractionStatus, Message, ProgressLogEntry, TaskId, ThreadId};
use serde::Serialize;
use tokio::sync::broadcast;

use crate::error::TaskErrorCategory;

const CHANNEL_CAPACITY: usize = 256;

/// Wire format for the per-task event websocket (§6): JSON over a text
/// frame, tagged by variant name, matching the host gateway's `ControlEvent`
/// wire shape.
#[derive(Debug, Clone, Serialize)]
#[serde(tag = "type", rename_all = "snake_case")]
pub enum Event {
    ProgressUpdate { progress_log: ProgressLogEntry },
    ResponseChunk { chunk: String },
    ContextConsumption { real_tokens: Option<u32>, approx_tokens: Option<u32>, max_context: Option<u32> },
    Interrupt { interaction_id: InteractionId, question: String, schema: serde_json::Value, origin_name: String },
    InteractionUpdate { interaction_id: InteractionId, status: InteractionStatus },
    NewMessage { message: Message },
    ContinuousSummaryReady { day_segment_id: DaySegmentId, day_label: chrono::NaiveDate, updated_at: chrono::DateTime<chrono::Utc> },
    TaskComplete { result: String, thread_id: Option<ThreadId>, thread_subject: Option<String> },
    TaskError { message: String, category: TaskErrorCategory },
}

/// Sanitizes a response chunk before it reaches `response_chunk` subscribers
/// (§4.8: "server-sanitized HTML") by escaping the five HTML metacharacters;
/// the UI renders chunks verbatim, so nothing here is trusted input.
pub fn sanitize_chunk(raw: &str) -> String {
    raw.replace('&', "&amp;")
        .replace('<', "&lt;")
        .replace('>', "&gt;")
        .replace('"', "&quot;")
        .replace('\'', "&#39;")
}

#[derive(Default)]
pub struct EventBus {
    channels: DashMap<TaskId, broadcast::Sender<Event>>,
}

impl EventBus {
    pub fn new() -> Self {
        Self::default()
    }

    /// Gets or creates the broadcast channel for a task.
    fn sender(&self, task: TaskId) -> broadcast::Sender<Event> {
        self.channels
            .entry(task)
            .or_insert_with(|| broadcast::channel(CHANNEL_CAPACITY).0)
            .clone()
    }

    pub fn subscribe(&self, task: TaskId) -> broadcast::Receiver<Event> {
        self.sender(task).subscribe()
    }

    /// Best-effort publish: a task with no subscribers (e.g. between retries)
    /// simply drops the event, matching the bus's no-persistence contract.
    pub fn publish(&self, task: TaskId, event: Event) {
        let _ = self.sender(task).send(event);
    }

    /// Prunes the channel for `task` once it is terminal and has no
    /// remaining subscribers, per §4.8's pruning rule.
    pub fn prune_if_idle(&self, task: TaskId) {
        if let Some(entry) = self.channels.get(&task) {
            if entry.receiver_count() == 0 {
                drop(entry);
                self.channels.remove(&task);
            }
        }
    }

    pub fn subscriber_count(&self, task: TaskId) -> usize {
        self.channels.get(&task).map(|s| s.receiver_count()).unwrap_or(0)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use uuid::Uuid;

    #[test]
    fn sanitize_chunk_escapes_html_metacharacters() {
        assert_eq!(sanitize_chunk("<b>&'\""), "&lt;b&gt;&amp;&#39;&quot;");
    }

    #[tokio::test]
    async fn publish_delivers_to_subscribed_receivers() {
        let bus = EventBus::new();
        let task = Uuid::new_v4();
        let mut rx = bus.subscribe(task);
        bus.publish(task, Event::ResponseChunk { chunk: "hi".into() });
        let event = rx.recv().await.unwrap();
        assert!(matches!(event, Event::ResponseChunk { chunk } if chunk == "hi"));
    }

    #[tokio::test]
    async fn prune_removes_channel_once_no_subscribers_remain() {
        let bus = EventBus::new();
        let task = Uuid::new_v4();
        {
            let _rx = bus.subscribe(task);
            assert_eq!(bus.subscriber_count(task), 1);
        }
        bus.prune_if_idle(task);
        assert_eq!(bus.subscriber_count(task), 0);
    }

    #[tokio::test]
    async fn publish_without_subscribers_does_not_panic() {
        let bus = EventBus::new();
        bus.publish(Uuid::new_v4(), Event::ResponseChunk { chunk: "nobody home".into() });
    }
}
