// SPDX-License-Identifier: Apache-2.0
//! `conversation_get`: fetches the full text `conversation_search` only
//! snippets — a day segment's summary, an explicit id range, or a centered
//! window around a message anchor.

use std::sync::Arc;

use async_trait::async_trait;
use nova_store::entities::MessageId;
use nova_store::ConversationStore;
use serde::{Deserialize, Serialize};

use crate::tool::{OutputCategory, Tool, ToolCall, ToolOutput};

#[derive(Debug, Default, Deserialize)]
struct GetArgs {
    message_id: Option<MessageId>,
    day_segment_id: Option<uuid::Uuid>,
    from_message_id: Option<MessageId>,
    to_message_id: Option<MessageId>,
    #[serde(default = "default_limit")]
    limit: usize,
    before_message_id: Option<MessageId>,
    after_message_id: Option<MessageId>,
}

fn default_limit() -> usize {
    30
}

#[derive(Debug, Serialize)]
#[serde(untagged)]
enum GetResult {
    Summary { day_segment_id: uuid::Uuid, summary: String },
    Messages { messages: Vec<MessageView>, truncated: bool },
}

#[derive(Debug, Serialize)]
struct MessageView {
    id: MessageId,
    actor: String,
    text: String,
}

fn to_view(m: nova_store::entities::Message) -> MessageView {
    MessageView { id: m.id, actor: format!("{:?}", m.actor).to_lowercase(), text: m.text }
}

pub struct ConversationGetTool {
    store: Arc<dyn ConversationStore>,
    user: uuid::Uuid,
}

impl ConversationGetTool {
    pub fn new(store: Arc<dyn ConversationStore>, user: uuid::Uuid) -> Self {
        Self { store, user }
    }

    fn error(call_id: String, kind: &str) -> ToolOutput {
        ToolOutput::err(call_id, format!("{{\"error\":\"{kind}\"}}"))
    }
}

#[async_trait]
impl Tool for ConversationGetTool {
    fn name(&self) -> &str {
        "conversation_get"
    }

    fn description(&self) -> &str {
        "Fetch full conversation text: a day segment's summary, an explicit message range, or a window around a message."
    }

    fn parameters_schema(&self) -> serde_json::Value {
        serde_json::json!({
            "type": "object",
            "properties": {
                "message_id": {"type": "integer"},
                "day_segment_id": {"type": "string", "format": "uuid"},
                "from_message_id": {"type": "integer"},
                "to_message_id": {"type": "integer"},
                "limit": {"type": "integer", "default": 30, "minimum": 1, "maximum": 30},
                "before_message_id": {"type": "integer"},
                "after_message_id": {"type": "integer"}
            }
        })
    }

    fn output_category(&self) -> OutputCategory {
        OutputCategory::HeadTail
    }

    async fn execute(&self, call: ToolCall) -> anyhow::Result<ToolOutput> {
        let args: GetArgs = match serde_json::from_value(call.args) {
            Ok(a) => a,
            Err(_) => return Ok(Self::error(call.id, "invalid_request")),
        };
        let limit = args.limit.clamp(1, 30);

        if let Some(segment_id) = args.day_segment_id {
            return match self.store.get_day_segment(segment_id).await {
                Ok(seg) if seg.user == self.user => Ok(ToolOutput::ok(
                    call.id,
                    serde_json::to_string(&GetResult::Summary {
                        day_segment_id: segment_id,
                        summary: seg.summary_markdown.unwrap_or_default(),
                    })?,
                )),
                _ => Ok(Self::error(call.id, "not_found")),
            };
        }

        if let (Some(from), Some(to)) = (args.from_message_id, args.to_message_id) {
            let from_msg = match self.store.get_message(from).await {
                Ok(m) if m.user == self.user => m,
                _ => return Ok(Self::error(call.id, "not_found")),
            };
            let mut messages = self.store.list_messages(from_msg.thread, Some(from - 1)).await?;
            messages.retain(|m| m.id <= to);
            let truncated = messages.len() > limit;
            messages.truncate(limit);
            return Ok(ToolOutput::ok(
                call.id,
                serde_json::to_string(&GetResult::Messages {
                    messages: messages.into_iter().map(to_view).collect(),
                    truncated,
                })?,
            ));
        }

        if let Some(anchor_id) = args.message_id {
            let anchor = match self.store.get_message(anchor_id).await {
                Ok(m) if m.user == self.user => m,
                _ => return Ok(Self::error(call.id, "not_found")),
            };
            let all = self.store.list_messages(anchor.thread, None).await?;
            let anchor_pos = match all.iter().position(|m| m.id == anchor_id) {
                Some(p) => p,
                None => return Ok(Self::error(call.id, "not_found")),
            };

            let window: Vec<_> = if args.before_message_id.is_some() {
                let start = anchor_pos.saturating_sub(limit);
                all[start..=anchor_pos].to_vec()
            } else if args.after_message_id.is_some() {
                let end = (anchor_pos + limit).min(all.len() - 1);
                all[anchor_pos..=end].to_vec()
            } else {
                let half = limit / 2;
                let start = anchor_pos.saturating_sub(half);
                let end = (anchor_pos + (limit - (anchor_pos - start))).min(all.len() - 1);
                all[start..=end].to_vec()
            };
            let truncated = window.len() >= limit;
            return Ok(ToolOutput::ok(
                call.id,
                serde_json::to_string(&GetResult::Messages {
                    messages: window.into_iter().map(to_view).collect(),
                    truncated,
                })?,
            ));
        }

        Ok(Self::error(call.id, "invalid_request"))
    }
}
