// SPDX-License-Identifier: Apache-2.0
//! Checkpoint links record, per (thread, agent) pair, the fingerprint and
//! build time of the last continuous-context assembly (§4.2). They are a
//! small keyed store in their own right rather than fields on `Thread`,
//! since a thread can be driven by more than one agent over its lifetime.

use std::collections::HashMap;
use std::sync::Mutex;

use async_trait::async_trait;
use uuid::Uuid;

use crate::entities::{AgentConfigId, CheckpointLink, ThreadId};
use crate::error::StoreResult;

#[async_trait]
pub trait CheckpointStore: Send + Sync {
    async fn get(&self, thread: ThreadId, agent_ref: AgentConfigId) -> StoreResult<Option<CheckpointLink>>;
    async fn update(&self, link: CheckpointLink) -> StoreResult<()>;
    async fn delete(&self, thread: ThreadId, agent_ref: AgentConfigId) -> StoreResult<()>;
}

#[derive(Default)]
pub struct InMemoryCheckpointStore {
    links: Mutex<HashMap<(ThreadId, AgentConfigId), CheckpointLink>>,
}

impl InMemoryCheckpointStore {
    pub fn new() -> Self {
        Self::default()
    }
}

#[async_trait]
impl CheckpointStore for InMemoryCheckpointStore {
    async fn get(&self, thread: ThreadId, agent_ref: AgentConfigId) -> StoreResult<Option<CheckpointLink>> {
        Ok(self.links.lock().unwrap().get(&(thread, agent_ref)).cloned())
    }

    async fn update(&self, link: CheckpointLink) -> StoreResult<()> {
        self.links
            .lock()
            .unwrap()
            .insert((link.thread, link.agent_ref), link);
        Ok(())
    }

    async fn delete(&self, thread: ThreadId, agent_ref: AgentConfigId) -> StoreResult<()> {
        self.links.lock().unwrap().remove(&(thread, agent_ref));
        Ok(())
    }
}

pub fn new_checkpoint(thread: ThreadId, agent_ref: AgentConfigId) -> CheckpointLink {
    CheckpointLink {
        id: Uuid::new_v4(),
        thread,
        agent_ref,
        continuous_context_fingerprint: None,
        continuous_context_built_at: None,
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use chrono::Utc;

    #[tokio::test]
    async fn get_returns_none_before_any_update() {
        let store = InMemoryCheckpointStore::new();
        let got = store.get(Uuid::new_v4(), Uuid::new_v4()).await.unwrap();
        assert!(got.is_none());
    }

    #[tokio::test]
    async fn update_then_get_roundtrips() {
        let store = InMemoryCheckpointStore::new();
        let thread = Uuid::new_v4();
        let agent = Uuid::new_v4();
        let mut link = new_checkpoint(thread, agent);
        link.continuous_context_fingerprint = Some("abc123".into());
        link.continuous_context_built_at = Some(Utc::now());
        store.update(link.clone()).await.unwrap();

        let got = store.get(thread, agent).await.unwrap().unwrap();
        assert_eq!(got.continuous_context_fingerprint, link.continuous_context_fingerprint);
    }

    #[tokio::test]
    async fn delete_clears_the_link() {
        let store = InMemoryCheckpointStore::new();
        let thread = Uuid::new_v4();
        let agent = Uuid::new_v4();
        store.update(new_checkpoint(thread, agent)).await.unwrap();
        store.delete(thread, agent).await.unwrap();
        assert!(store.get(thread, agent).await.unwrap().is_none());
    }
}
