// SPDX-License-Identifier: Apache-2.0
//! Task Executor, agent graph contract, checkpoint state, and the per-task
//! Event Bus (§4.1, §4.8, §9) — the orchestration core that binds
//! `nova-model`, `nova-tools`, `nova-store` and `nova-runtime` together.

pub mod checkpoint;
pub mod error;
pub mod event_bus;
pub mod executor;
pub mod graph;
pub mod ingest;
pub mod summarize;

pub use checkpoint::{GraphCheckpointStore, GraphState, InMemoryGraphCheckpointStore};
pub use error::{categorize, ExecutorError, TaskErrorCategory};
pub use event_bus::{sanitize_chunk, Event, EventBus};
pub use executor::{ensure_continuous_thread, ProviderResolver, TaskExecutor, ToolSetBuilder};
pub use graph::{AgentGraph, GraphOutcome, GraphTuple, InterruptPayload, ToolLoopGraph, ASK_USER_TOOL_NAME};
pub use ingest::{append_continuous_message, ContinuousAppendOutcome};
pub use summarize::DaySummarizer;
