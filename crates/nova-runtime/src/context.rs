// SPDX-License-Identifier: Apache-2.0
//! Continuous Context Builder (§4.2): what a continuous-thread agent turn
//! should "remember", and the fingerprint that decides whether the
//! checkpoint needs rebuilding.

use chrono::{DateTime, NaiveDate, Utc};
use nova_model::Message as ModelMessage;
use nova_store::entities::{Actor, DaySegment, Message as StoreMessage, MessageId};
use nova_store::ConversationStore;
use sha2::{Digest, Sha256};

const PREVIOUS_SUMMARIES_TOKEN_BUDGET: usize = 4000;
const MESSAGE_CHAR_CAP: usize = 2500;

#[derive(Debug, Clone)]
pub struct ContinuousContextSnapshot {
    pub today: NaiveDate,
    pub previous_summary_1_day: Option<NaiveDate>,
    pub previous_summary_2_day: Option<NaiveDate>,
    pub previous_summary_1_updated_at: Option<DateTime<Utc>>,
    pub previous_summary_2_updated_at: Option<DateTime<Utc>>,
    pub previous_summary_1_hash: String,
    pub previous_summary_2_hash: String,
    pub previous_summaries_token_budget: usize,
    pub previous_summaries_truncated: bool,
    pub today_updated_at: Option<DateTime<Utc>>,
    pub today_start_dt: Option<DateTime<Utc>>,
    pub today_end_dt: Option<DateTime<Utc>>,
    pub today_summary_until_message_id: Option<MessageId>,
    pub today_last_message_id: Option<MessageId>,
}

/// SHA-256 fingerprint over the pipe-joined snapshot fields. Timestamps are
/// normalized to UTC ISO-8601 first so the fingerprint is independent of how
/// a timestamp happens to be represented.
pub fn compute_fingerprint(snapshot: &ContinuousContextSnapshot) -> String {
    fn fmt_dt(v: Option<DateTime<Utc>>) -> String {
        v.map(|d| d.to_rfc3339()).unwrap_or_default()
    }
    fn fmt_date(v: Option<NaiveDate>) -> String {
        v.map(|d| d.to_string()).unwrap_or_default()
    }
    fn fmt_id(v: Option<MessageId>) -> String {
        v.map(|id| id.to_string()).unwrap_or_default()
    }

    let raw = [
        format!("today={}", snapshot.today),
        format!("previous_summary_1_day={}", fmt_date(snapshot.previous_summary_1_day)),
        format!("previous_summary_2_day={}", fmt_date(snapshot.previous_summary_2_day)),
        format!("previous_summary_1_updated_at={}", fmt_dt(snapshot.previous_summary_1_updated_at)),
        format!("previous_summary_2_updated_at={}", fmt_dt(snapshot.previous_summary_2_updated_at)),
        format!("previous_summary_1_hash={}", snapshot.previous_summary_1_hash),
        format!("previous_summary_2_hash={}", snapshot.previous_summary_2_hash),
        format!("previous_summaries_token_budget={}", snapshot.previous_summaries_token_budget),
        format!("previous_summaries_truncated={}", snapshot.previous_summaries_truncated as u8),
        format!("today_updated_at={}", fmt_dt(snapshot.today_updated_at)),
        format!("today_start_dt={}", fmt_dt(snapshot.today_start_dt)),
        format!("today_end_dt={}", fmt_dt(snapshot.today_end_dt)),
        format!("today_summary_until_message_id={}", fmt_id(snapshot.today_summary_until_message_id)),
        format!("today_last_message_id={}", fmt_id(snapshot.today_last_message_id)),
    ]
    .join("|");

    hex::encode(Sha256::digest(raw.as_bytes()))
}

fn approx_tokens(text: &str) -> usize {
    let s = text.trim();
    if s.is_empty() {
        0
    } else {
        (s.len() / 4).max(1)
    }
}

fn truncate_chars(text: &str, limit: usize) -> String {
    let text = text.trim();
    if text.is_empty() {
        return String::new();
    }
    if text.chars().count() <= limit {
        return text.to_string();
    }
    let truncated: String = text.chars().take(limit).collect();
    format!("{truncated}\n…(truncated)…")
}

/// Word-granular trim to a token budget, matching `_trim_to_token_budget`.
fn trim_to_token_budget(text: &str, budget_tokens: usize) -> (String, bool) {
    let s = text.trim();
    if s.is_empty() {
        return (String::new(), false);
    }
    if budget_tokens == 0 {
        return (String::new(), true);
    }

    let mut out_words = Vec::new();
    let mut used = 0usize;
    for word in s.split_whitespace() {
        let wt = approx_tokens(word);
        if used + wt > budget_tokens {
            break;
        }
        out_words.push(word);
        used += wt;
    }

    let mut trimmed = out_words.join(" ");
    let truncated = trimmed.chars().count() < s.chars().count();
    if truncated && !trimmed.is_empty() {
        trimmed.push_str("\n\n…(summary truncated due to strict context budget)…");
    }
    (trimmed, truncated)
}

fn summary_system_message(label: &str, summary_md: &str) -> Option<ModelMessage> {
    let summary_md = summary_md.trim();
    if summary_md.is_empty() {
        return None;
    }
    Some(ModelMessage::system(format!("[{label}]\n{summary_md}")))
}

fn message_to_model(m: &StoreMessage) -> Option<ModelMessage> {
    if m.actor == Actor::System {
        return None;
    }
    let content = truncate_chars(&m.text, MESSAGE_CHAR_CAP);
    if content.is_empty() {
        return None;
    }
    match m.actor {
        Actor::User => Some(ModelMessage::user(content)),
        Actor::Agent => Some(ModelMessage::assistant(content)),
        Actor::System => None,
    }
}

fn day_label_for_user(now: DateTime<Utc>, tz: &chrono_tz::Tz) -> NaiveDate {
    now.with_timezone(tz).date_naive()
}

/// Builds the continuous-thread context per §4.2 and returns the snapshot
/// (for fingerprinting) alongside the message list to seed the checkpoint.
pub async fn load_continuous_context(
    store: &dyn ConversationStore,
    user: uuid::Uuid,
    thread: uuid::Uuid,
    tz: &chrono_tz::Tz,
    exclude_message_id: Option<MessageId>,
) -> anyhow::Result<(ContinuousContextSnapshot, Vec<ModelMessage>)> {
    let now = Utc::now();
    let today = day_label_for_user(now, tz);

    let mut segments = store.list_day_segments(thread).await?;
    segments.retain(|s| s.user == user);

    let mut previous: Vec<&DaySegment> = segments
        .iter()
        .filter(|s| s.day_label < today && s.has_non_empty_summary())
        .collect();
    previous.sort_by(|a, b| b.day_label.cmp(&a.day_label));
    let p1 = previous.first().copied();
    let p2 = previous.get(1).copied();
    let t_seg = segments.iter().find(|s| s.day_label == today);

    let next_seg = segments
        .iter()
        .filter(|s| s.day_label > today)
        .min_by_key(|s| s.day_label);

    let today_start_dt = t_seg.map(|s| s.starts_at);
    let today_end_dt = next_seg.map(|s| s.starts_at);

    let p1_raw = p1.and_then(|s| s.summary_markdown.clone()).unwrap_or_default();
    let p2_raw = p2.and_then(|s| s.summary_markdown.clone()).unwrap_or_default();
    let p1_label = p1.map(|s| format!("Summary of {}", s.day_label)).unwrap_or_default();
    let p2_label = p2.map(|s| format!("Summary of {}", s.day_label)).unwrap_or_default();

    let budget_left = PREVIOUS_SUMMARIES_TOKEN_BUDGET;
    let p1_budget = budget_left.min(approx_tokens(&p1_raw));
    let (p1_summary, p1_truncated) = trim_to_token_budget(&p1_raw, p1_budget);
    let budget_left = budget_left.saturating_sub(approx_tokens(&p1_summary));

    let p2_budget = budget_left.min(approx_tokens(&p2_raw));
    let (p2_summary, p2_truncated) = trim_to_token_budget(&p2_raw, p2_budget);

    let previous_summaries_truncated = p1_truncated || p2_truncated;

    let mut out = Vec::new();
    if let Some(m) = summary_system_message(&p1_label, &p1_summary) {
        out.push(m);
    }
    if let Some(m) = summary_system_message(&p2_label, &p2_summary) {
        out.push(m);
    }
    if previous_summaries_truncated {
        out.push(ModelMessage::system(
            "[Continuous context notice]\nSome previous-day summaries were truncated due to strict token budget. \
             If more historical detail is needed, use conversation_search first, then conversation_get to ground exact passages.",
        ));
    }

    let mut today_summary_until_message_id = None;
    if let Some(seg) = t_seg {
        if let Some(summary) = seg.summary_markdown.as_ref().filter(|s| !s.trim().is_empty()) {
            if let Some(boundary) = seg.summary_until_message {
                today_summary_until_message_id = Some(boundary);
                if let Some(m) = summary_system_message(&format!("Summary of {today}"), summary) {
                    out.push(m);
                }
            }
        }
    }

    let mut today_last_message_id = None;
    if today_start_dt.is_some() {
        let messages = store.list_messages(thread, None).await?;
        for m in messages {
            if m.created_at < today_start_dt.unwrap() {
                continue;
            }
            if let Some(end) = today_end_dt {
                if m.created_at >= end {
                    continue;
                }
            }
            if let Some(boundary) = today_summary_until_message_id {
                if m.id <= boundary {
                    continue;
                }
            }
            if exclude_message_id == Some(m.id) {
                continue;
            }
            if let Some(converted) = message_to_model(&m) {
                out.push(converted);
            }
            today_last_message_id = Some(m.id);
        }
    }

    let snapshot = ContinuousContextSnapshot {
        today,
        previous_summary_1_day: p1.map(|s| s.day_label),
        previous_summary_2_day: p2.map(|s| s.day_label),
        previous_summary_1_updated_at: p1.map(|s| s.updated_at),
        previous_summary_2_updated_at: p2.map(|s| s.updated_at),
        previous_summary_1_hash: hash_if_present(&p1_summary),
        previous_summary_2_hash: hash_if_present(&p2_summary),
        previous_summaries_token_budget: PREVIOUS_SUMMARIES_TOKEN_BUDGET,
        previous_summaries_truncated,
        today_updated_at: t_seg.map(|s| s.updated_at),
        today_start_dt,
        today_end_dt,
        today_summary_until_message_id,
        today_last_message_id,
    };

    Ok((snapshot, out))
}

fn hash_if_present(s: &str) -> String {
    if s.is_empty() {
        String::new()
    } else {
        hex::encode(Sha256::digest(s.as_bytes()))
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use nova_store::entities::{NewMessage, ThreadMode};
    use nova_store::InMemoryStore;

    #[test]
    fn trim_to_zero_budget_drops_everything_but_flags_truncated() {
        let (out, truncated) = trim_to_token_budget("hello world", 0);
        assert_eq!(out, "");
        assert!(truncated);
    }

    #[test]
    fn trim_keeps_leading_words_within_budget() {
        let (out, truncated) = trim_to_token_budget("aaaa bbbb cccc dddd", 2);
        assert_eq!(out, "aaaa");
        assert!(truncated);
    }

    #[test]
    fn fingerprint_changes_when_last_message_id_changes() {
        let mut snap = ContinuousContextSnapshot {
            today: NaiveDate::from_ymd_opt(2026, 1, 1).unwrap(),
            previous_summary_1_day: None,
            previous_summary_2_day: None,
            previous_summary_1_updated_at: None,
            previous_summary_2_updated_at: None,
            previous_summary_1_hash: String::new(),
            previous_summary_2_hash: String::new(),
            previous_summaries_token_budget: 4000,
            previous_summaries_truncated: false,
            today_updated_at: None,
            today_start_dt: None,
            today_end_dt: None,
            today_summary_until_message_id: None,
            today_last_message_id: Some(1),
        };
        let f1 = compute_fingerprint(&snap);
        snap.today_last_message_id = Some(2);
        let f2 = compute_fingerprint(&snap);
        assert_ne!(f1, f2);
    }

    #[tokio::test]
    async fn today_window_excludes_system_messages_and_triggering_message() {
        let store = InMemoryStore::new();
        let user = uuid::Uuid::new_v4();
        let thread = nova_store::entities::Thread {
            id: uuid::Uuid::new_v4(),
            user,
            subject: "t".into(),
            mode: ThreadMode::Continuous,
            created_at: Utc::now(),
        };
        store.create_thread(thread.clone()).await.unwrap();

        let m1 = store
            .append_message(NewMessage::standard(user, thread.id, Actor::User, "hi"))
            .await
            .unwrap();
        let seg = store
            .get_or_create_day_segment(user, thread.id, Utc::now().date_naive(), m1.id, m1.created_at)
            .await
            .unwrap();
        let _ = seg;
        store
            .append_message(NewMessage::standard(user, thread.id, Actor::System, "sys note"))
            .await
            .unwrap();
        let m3 = store
            .append_message(NewMessage::standard(user, thread.id, Actor::Agent, "hello back"))
            .await
            .unwrap();

        let tz = chrono_tz::UTC;
        let (_, messages) = load_continuous_context(&store, user, thread.id, &tz, Some(m3.id))
            .await
            .unwrap();

        assert!(messages.iter().all(|m| m.as_text() != Some("sys note")));
        assert!(messages.iter().all(|m| m.as_text() != Some("hello back")));
        assert!(messages.iter().any(|m| m.as_text() == Some("hi")));
    }
}
