// SPDX-License-Identifier: Apache-2.0
//! Email-poll trigger (§4.7): read-only IMAP UNSEEN polling with a
//! UID/UIDVALIDITY cursor and backlog-skip after a long downtime. The real
//! IMAP session (TLS, auth) is an external collaborator per §1's scope note;
//! this module only specifies the [`MailboxPoller`] seam and implements the
//! cursor algorithm against it.

use chrono::{DateTime, Duration, Utc};
use nova_store::entities::EmailPollRuntimeState;

#[derive(Debug, Clone, PartialEq)]
pub struct EmailEnvelope {
    pub uid: u32,
    pub from: String,
    pub subject: String,
    pub date: String,
}

/// The transport boundary: a real implementation wraps an authenticated IMAP
/// session against the INBOX folder. Polling must never call anything that
/// mutates message flags.
#[async_trait::async_trait]
pub trait MailboxPoller: Send + Sync {
    async fn uidvalidity(&self) -> anyhow::Result<u32>;
    async fn search_unseen(&self) -> anyhow::Result<Vec<u32>>;
    async fn fetch_envelope(&self, uid: u32) -> anyhow::Result<EmailEnvelope>;
}

#[derive(Debug, Clone)]
pub struct PollOutcome {
    pub headers: Vec<EmailEnvelope>,
    pub state: EmailPollRuntimeState,
    pub skip_reason: Option<&'static str>,
}

/// Runs one poll cycle against `poller`, given the task definition's stored
/// cursor state. Mirrors the original trigger's policy: first run processes
/// existing unseen mail, a UIDVALIDITY change resets the cursor, and a gap
/// longer than `2 * poll_interval_minutes` since the last poll skips the
/// backlog entirely rather than replaying it.
pub async fn poll_mailbox(
    poller: &dyn MailboxPoller,
    mut state: EmailPollRuntimeState,
    poll_interval_minutes: u32,
    now: DateTime<Utc>,
) -> anyhow::Result<PollOutcome> {
    let uidvalidity = poller.uidvalidity().await?;
    let mut unseen = poller.search_unseen().await?;
    unseen.sort_unstable();

    let mut last_uid = state.last_uid;
    if state.uidvalidity != 0 && state.uidvalidity != uidvalidity {
        last_uid = 0;
    }

    if let Some(last_poll_at) = state.last_poll_at {
        if now - last_poll_at > Duration::minutes(i64::from(poll_interval_minutes) * 2) {
            tracing::warn!(gap_minutes = (now - last_poll_at).num_minutes(), "email poll backlog skipped");
            state.initialized = true;
            state.uidvalidity = uidvalidity;
            state.last_uid = unseen.last().copied().unwrap_or(last_uid);
            state.last_poll_at = Some(now);
            state.backlog_skipped_at = Some(now);
            return Ok(PollOutcome { headers: vec![], state, skip_reason: Some("backlog_skipped") });
        }
    }

    let new_uids: Vec<u32> = unseen.into_iter().filter(|uid| *uid > last_uid).collect();
    let mut headers = Vec::with_capacity(new_uids.len());
    for uid in &new_uids {
        headers.push(poller.fetch_envelope(*uid).await?);
    }

    state.initialized = true;
    state.uidvalidity = uidvalidity;
    state.last_uid = new_uids.into_iter().max().unwrap_or(last_uid);
    state.last_poll_at = Some(now);
    Ok(PollOutcome { headers, state, skip_reason: None })
}

/// In-memory stand-in for tests: a fixed UIDVALIDITY and INBOX snapshot.
pub struct FakeMailboxPoller {
    pub uidvalidity: u32,
    pub envelopes: Vec<EmailEnvelope>,
}

impl FakeMailboxPoller {
    pub fn new(uidvalidity: u32, envelopes: Vec<EmailEnvelope>) -> Self {
        Self { uidvalidity, envelopes }
    }
}

#[async_trait::async_trait]
impl MailboxPoller for FakeMailboxPoller {
    async fn uidvalidity(&self) -> anyhow::Result<u32> {
        Ok(self.uidvalidity)
    }

    async fn search_unseen(&self) -> anyhow::Result<Vec<u32>> {
        Ok(self.envelopes.iter().map(|e| e.uid).collect())
    }

    async fn fetch_envelope(&self, uid: u32) -> anyhow::Result<EmailEnvelope> {
        self.envelopes
            .iter()
            .find(|e| e.uid == uid)
            .cloned()
            .ok_or_else(|| anyhow::anyhow!("no such uid {uid}"))
    }
}
