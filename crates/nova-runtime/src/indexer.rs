// SPDX-License-Identifier: Apache-2.0
//! Transcript Indexer (§4.4): turns a DaySegment's raw messages into
//! overlapping, append-only [`TranscriptChunk`]s sized for lexical/semantic
//! search.

use chrono::Utc;
use nova_store::entities::{content_hash, Actor, DaySegmentId, Embedding, TranscriptChunk};
use nova_store::ConversationStore;
use uuid::Uuid;

const CHUNK_TOKEN_TARGET: usize = 600;
const OVERLAP_TOKENS: usize = 100;
const LINE_CHAR_CAP: usize = 4000;

fn approx_tokens(text: &str) -> usize {
    (text.len() / 4).max(1)
}

fn normalize_line(actor: Actor, text: &str) -> Option<String> {
    let prefix = match actor {
        Actor::User => "User: ",
        Actor::Agent => "Agent: ",
        Actor::System => return None,
    };
    let trimmed: String = text.chars().take(LINE_CHAR_CAP).collect();
    Some(format!("{prefix}{trimmed}"))
}

/// Appends new chunks for one DaySegment's un-indexed tail, and returns the
/// ids of chunks that were created or updated (for the embedding worker to
/// pick up next).
pub async fn index_segment(
    store: &dyn ConversationStore,
    user: uuid::Uuid,
    thread: uuid::Uuid,
    segment_id: DaySegmentId,
) -> anyhow::Result<Vec<Uuid>> {
    let existing = store.list_chunks_for_segment(segment_id).await?;
    let segment = store
        .list_day_segments(thread)
        .await?
        .into_iter()
        .find(|s| s.id == segment_id)
        .ok_or_else(|| anyhow::anyhow!("day segment {segment_id} not found"))?;

    let last_end_message = existing.iter().map(|c| c.end_message).max();

    let mut messages: Vec<_> = store
        .list_messages(thread, None)
        .await?
        .into_iter()
        .filter(|m| m.id >= segment.starts_at_message)
        .collect();
    messages.sort_by_key(|m| m.id);

    // Everything up to and including `last_end_message` is already covered
    // by a chunk. Find the first not-yet-chunked message; if there is none,
    // this run has nothing new to index.
    let new_start_index = match last_end_message {
        Some(end_id) => messages.iter().position(|m| m.id > end_id).unwrap_or(messages.len()),
        None => 0,
    };
    if new_start_index >= messages.len() {
        return Ok(Vec::new());
    }

    // Rewind into the already-chunked tail (never into the new messages
    // found above) so the next chunk's content window shares ~100 tokens
    // with the previous one (§4.4 step 5). New content is never discarded
    // to make room for this — the seed only walks backward from
    // `new_start_index`.
    let mut start_index = new_start_index;
    if last_end_message.is_some() {
        let mut rewound_tokens = 0usize;
        while start_index > 0 {
            let candidate = &messages[start_index - 1];
            start_index -= 1;
            let Some(line) = normalize_line(candidate.actor, &candidate.text) else { continue };
            rewound_tokens += approx_tokens(&line);
            if rewound_tokens >= OVERLAP_TOKENS {
                break;
            }
        }
    }
    let candidates = &messages[start_index..];

    let mut updated = Vec::new();
    let mut buffer = String::new();
    let mut token_estimate = 0usize;
    let mut start_message = None;
    let mut end_message = None;

    for m in candidates {
        let Some(line) = normalize_line(m.actor, &m.text) else { continue };
        if start_message.is_none() {
            start_message = Some(m.id);
        }
        end_message = Some(m.id);
        if !buffer.is_empty() {
            buffer.push('\n');
        }
        buffer.push_str(&line);
        token_estimate += approx_tokens(&line);

        if token_estimate >= CHUNK_TOKEN_TARGET {
            let id = upsert_chunk(
                store,
                user,
                thread,
                segment_id,
                start_message.unwrap(),
                end_message.unwrap(),
                &buffer,
                token_estimate,
            )
            .await?;
            if let Some(id) = id {
                updated.push(id);
            }
            buffer.clear();
            token_estimate = 0;
            start_message = None;
            end_message = None;
        }
    }

    if !buffer.is_empty() {
        if let (Some(start), Some(end)) = (start_message, end_message) {
            let id = upsert_chunk(store, user, thread, segment_id, start, end, &buffer, token_estimate).await?;
            if let Some(id) = id {
                updated.push(id);
            }
        }
    }

    Ok(updated)
}

#[allow(clippy::too_many_arguments)]
async fn upsert_chunk(
    store: &dyn ConversationStore,
    user: uuid::Uuid,
    thread: uuid::Uuid,
    segment_id: DaySegmentId,
    start_message: i64,
    end_message: i64,
    content: &str,
    token_estimate: usize,
) -> anyhow::Result<Option<Uuid>> {
    let hash = content_hash(start_message, end_message, content);
    let existing = store
        .list_chunks_for_segment(segment_id)
        .await?
        .into_iter()
        .find(|c| c.start_message == start_message && c.end_message == end_message);

    if let Some(existing) = existing {
        if existing.content_hash == hash {
            return Ok(None);
        }
    }

    let chunk = TranscriptChunk {
        id: Uuid::new_v4(),
        user,
        thread,
        day_segment: segment_id,
        start_message,
        end_message,
        content_text: content.to_string(),
        content_hash: hash,
        token_estimate,
        created_at: Utc::now(),
    };
    let id = chunk.id;
    store.insert_chunk(chunk).await?;
    store.set_chunk_embedding(id, Embedding::pending(1536)).await?;
    Ok(Some(id))
}
