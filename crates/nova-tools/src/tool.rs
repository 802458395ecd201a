// SPDX-License-Identifier: Apache-2.0
use async_trait::async_trait;
use serde::{Deserialize, Serialize};

#[derive(Debug, Clone)]
pub struct ToolCall {
    pub id: String,
    pub name: String,
    pub args: serde_json::Value,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum OutputCategory {
    HeadTail,
    MatchList,
    Generic,
}

impl Default for OutputCategory {
    fn default() -> Self {
        Self::Generic
    }
}

#[derive(Debug, Clone)]
pub struct ToolOutput {
    pub call_id: String,
    pub content: String,
    pub is_error: bool,
}

impl ToolOutput {
    pub fn ok(call_id: impl Into<String>, content: impl Into<String>) -> Self {
        Self { call_id: call_id.into(), content: content.into(), is_error: false }
    }

    pub fn err(call_id: impl Into<String>, content: impl Into<String>) -> Self {
        Self { call_id: call_id.into(), content: content.into(), is_error: true }
    }
}

/// A tool the agentic loop can dispatch a model's tool call to. Unlike the
/// approval-gated, per-mode tool surface this is adapted from, every tool
/// registered here runs unattended on the server — there is no approval
/// policy or agent-mode concept in this system, only the reserved
/// `ask_user` call name (intercepted upstream of the registry, see
/// `nova-core`) for anything that genuinely needs a human in the loop.
#[async_trait]
pub trait Tool: Send + Sync {
    fn name(&self) -> &str;
    fn description(&self) -> &str;
    fn parameters_schema(&self) -> serde_json::Value;
    fn output_category(&self) -> OutputCategory {
        OutputCategory::Generic
    }
    async fn execute(&self, call: ToolCall) -> anyhow::Result<ToolOutput>;
}
