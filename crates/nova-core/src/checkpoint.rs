// SPDX-License-Identifier: Apache-2.0
//! The opaque Checkpoint Store (§2 component 1): a key→state map keyed by
//! the graph thread-id (a UUID), holding the agent graph's working message
//! list. This is distinct from [`nova_store::CheckpointStore`], which only
//! tracks the `(thread, agent)` → fingerprint link; the state itself lives
//! here, addressed by `CheckpointLink.id`.

use std::collections::HashMap;
use std::sync::Mutex;

use async_trait::async_trait;
use nova_model::Message;
use uuid::Uuid;

/// The opaque snapshot of one agent graph run, exactly the shape
/// §9's minimal contract calls "state": the message list the next `invoke`
/// or `resume` continues from.
pub type GraphState = Vec<Message>;

#[async_trait]
pub trait GraphCheckpointStore: Send + Sync {
    async fn get(&self, id: Uuid) -> anyhow::Result<Option<GraphState>>;
    async fn update(&self, id: Uuid, state: GraphState) -> anyhow::Result<()>;
    async fn delete(&self, id: Uuid) -> anyhow::Result<()>;
}

#[derive(Default)]
pub struct InMemoryGraphCheckpointStore {
    states: Mutex<HashMap<Uuid, GraphState>>,
}

impl InMemoryGraphCheckpointStore {
    pub fn new() -> Self {
        Self::default()
    }
}

#[async_trait]
impl GraphCheckpointStore for InMemoryGraphCheckpointStore {
    async fn get(&self, id: Uuid) -> anyhow::Result<Option<GraphState>> {
        Ok(self.states.lock().unwrap().get(&id).cloned())
    }

    async fn update(&self, id: Uuid, state: GraphState) -> anyhow::Result<()> {
        self.states.lock().unwrap().insert(id, state);
        Ok(())
    }

    async fn delete(&self, id: Uuid) -> anyhow::Result<()> {
        self.states.lock().unwrap().remove(&id);
        Ok(())
    }
}
