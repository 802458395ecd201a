// SPDX-License-Identifier: Apache-2.0
//! `conversation_search` (§4.5): the model-callable hybrid-recall tool.
//! Candidate retrieval is backend-specific (Postgres FTS+semantic vs the
//! in-memory substring fallback); scoring is shared via `nova-runtime`.

use std::sync::Arc;

use async_trait::async_trait;
use chrono::{NaiveDate, Utc};
use nova_runtime::hybrid_search::{blend_candidates, rank_and_page};
use nova_runtime::EmbeddingService;
use nova_store::entities::ThreadId;
use nova_store::{ConversationStore, SearchBackend};
use serde::{Deserialize, Serialize};

use crate::tool::{OutputCategory, Tool, ToolCall, ToolOutput};

#[derive(Debug, Deserialize)]
struct SearchArgs {
    query: String,
    day: Option<NaiveDate>,
    #[serde(default = "default_recency_days")]
    recency_days: i64,
    #[serde(default = "default_limit")]
    limit: usize,
    #[serde(default)]
    offset: usize,
}

fn default_recency_days() -> i64 {
    14
}
fn default_limit() -> usize {
    6
}

#[derive(Debug, Serialize)]
struct SearchHit {
    id: String,
    thread: String,
    snippet: String,
    score: Option<f64>,
}

/// Locally-anchored ~240-char snippet centered near the first case-insensitive
/// occurrence of the query — a simplified stand-in for the sentence-overlap
/// scoring the PostgreSQL headline path would otherwise produce.
fn local_snippet(text: &str, query: &str, window: usize) -> String {
    let lower_text = text.to_lowercase();
    let lower_query = query.to_lowercase();
    let anchor = lower_text.find(&lower_query).unwrap_or(0);
    let half = window / 2;
    let start = anchor.saturating_sub(half);
    let end = (anchor + lower_query.len() + half).min(text.len());
    let start = text.char_indices().find(|(i, _)| *i >= start).map(|(i, _)| i).unwrap_or(0);
    let end = text
        .char_indices()
        .find(|(i, _)| *i >= end)
        .map(|(i, _)| i)
        .unwrap_or(text.len());
    let mut snippet = text[start..end].to_string();
    if start > 0 {
        snippet = format!("…{snippet}");
    }
    if end < text.len() {
        snippet.push('…');
    }
    snippet
}

pub struct ConversationSearchTool {
    store: Arc<dyn ConversationStore>,
    embeddings: Arc<dyn EmbeddingService>,
    user: uuid::Uuid,
    continuous_thread: ThreadId,
}

impl ConversationSearchTool {
    pub fn new(
        store: Arc<dyn ConversationStore>,
        embeddings: Arc<dyn EmbeddingService>,
        user: uuid::Uuid,
        continuous_thread: ThreadId,
    ) -> Self {
        Self { store, embeddings, user, continuous_thread }
    }
}

#[async_trait]
impl Tool for ConversationSearchTool {
    fn name(&self) -> &str {
        "conversation_search"
    }

    fn description(&self) -> &str {
        "Search this conversation's history by topic; returns ranked snippets with day/message anchors."
    }

    fn parameters_schema(&self) -> serde_json::Value {
        serde_json::json!({
            "type": "object",
            "properties": {
                "query": {"type": "string"},
                "day": {"type": "string", "format": "date"},
                "recency_days": {"type": "integer", "default": 14},
                "limit": {"type": "integer", "default": 6, "minimum": 1, "maximum": 50},
                "offset": {"type": "integer", "default": 0, "minimum": 0, "maximum": 500}
            },
            "required": ["query"]
        })
    }

    fn output_category(&self) -> OutputCategory {
        OutputCategory::MatchList
    }

    async fn execute(&self, call: ToolCall) -> anyhow::Result<ToolOutput> {
        let args: SearchArgs = match serde_json::from_value(call.args) {
            Ok(a) => a,
            Err(e) => return Ok(ToolOutput::err(call.id, format!("{{\"error\":\"invalid_request\",\"detail\":\"{e}\"}}"))),
        };
        if args.query.trim().is_empty() {
            return Ok(ToolOutput::err(call.id, "{\"error\":\"invalid_request\"}".to_string()));
        }
        let limit = args.limit.clamp(1, 50);
        let offset = args.offset.min(500);

        let query_vector = self.embeddings.embed(&args.query).await.unwrap_or(None);
        let semantic_available = query_vector.is_some();

        let candidates = match self.store.backend() {
            SearchBackend::Postgres => {
                let mut out = self.store.fts_candidates(self.user, &args.query, None, 200).await?;
                if let Some(vector) = &query_vector {
                    out.extend(self.store.semantic_candidates(self.user, vector, None, 200).await?);
                }
                out
            }
            SearchBackend::Fallback => self.store.substring_candidates(self.user, &args.query, None, 200).await?,
        };

        let recency_cutoff = Utc::now().date_naive() - chrono::Duration::days(args.recency_days);
        let filtered: Vec<_> = candidates
            .into_iter()
            .filter(|c| c.thread == self.continuous_thread)
            .filter(|c| match args.day {
                Some(day) => c.created_at.date_naive() == day,
                None => c.created_at.date_naive() >= recency_cutoff,
            })
            .collect();

        let scored = blend_candidates(filtered, semantic_available, Utc::now());
        let page = rank_and_page(scored, offset, limit);

        let hits: Vec<SearchHit> = page
            .into_iter()
            .map(|s| SearchHit {
                id: s.candidate.id.to_string(),
                thread: s.candidate.thread.to_string(),
                snippet: local_snippet(&s.candidate.text, &args.query, 240),
                score: if matches!(self.store.backend(), SearchBackend::Postgres) { Some(s.score) } else { None },
            })
            .collect();

        Ok(ToolOutput::ok(call.id, serde_json::to_string(&hits)?))
    }
}
