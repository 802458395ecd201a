// SPDX-License-Identifier: Apache-2.0
//! The "graph" contract (§9 DESIGN NOTES): a minimal interface the Task
//! Executor consumes to drive one agent turn, satisfied here by
//! [`ToolLoopGraph`] — a hand-rolled tool-calling loop over
//! `nova-model`/`nova-tools` — but swappable for a third-party agent
//! framework without the executor changing.
//!
//! The reserved `ask_user` tool call name is intercepted here, upstream of
//! `ToolRegistry::execute`, and turned into [`GraphOutcome::Interrupt`]
//! instead of being dispatched as an ordinary tool (see `nova-tools::tool`).

use std::collections::HashMap;
use std::sync::Arc;

use async_trait::async_trait;
use futures::StreamExt;
use nova_model::{CompletionRequest, Message, ModelProvider, ResponseEvent, ToolSchema, Usage};
use nova_tools::{ToolCall, ToolRegistry};
use uuid::Uuid;

use crate::checkpoint::GraphCheckpointStore;

pub const ASK_USER_TOOL_NAME: &str = "ask_user";

fn ask_user_schema() -> ToolSchema {
    ToolSchema {
        name: ASK_USER_TOOL_NAME.into(),
        description: "Pause the task and ask the human user a clarifying question.".into(),
        parameters: serde_json::json!({
            "type": "object",
            "properties": {
                "question": {"type": "string"},
                "schema": {"type": "object"},
                "agent_name": {"type": "string"}
            },
            "required": ["question"]
        }),
    }
}

#[derive(Debug, Clone)]
pub struct InterruptPayload {
    pub interaction_id_hint: String,
    pub question: String,
    pub schema: serde_json::Value,
    pub origin_name: String,
    /// Token the executor hands back unchanged at resume time (§9: "resume
    /// token"); here simply the id of the tool call awaiting its result.
    pub resume_payload: serde_json::Value,
}

#[derive(Debug, Clone)]
pub enum GraphOutcome {
    Completed { text: String, usage: Option<Usage> },
    Interrupt(InterruptPayload),
}

#[derive(Debug, Clone)]
pub struct GraphTuple {
    pub messages: Vec<Message>,
    pub last_usage: Option<Usage>,
}

/// §9's minimal graph contract: `invoke`/`resume`/`update_state`/`delete`
/// plus `aget_tuple` for post-run inspection.
#[async_trait]
pub trait AgentGraph: Send + Sync {
    async fn invoke(&self, checkpoint_id: Uuid, input: Vec<Message>) -> anyhow::Result<GraphOutcome>;
    async fn resume(
        &self,
        checkpoint_id: Uuid,
        resume_payload: serde_json::Value,
        answer: String,
    ) -> anyhow::Result<GraphOutcome>;
    async fn update_state(&self, checkpoint_id: Uuid, messages: Vec<Message>) -> anyhow::Result<()>;
    async fn delete(&self, checkpoint_id: Uuid) -> anyhow::Result<()>;
    async fn aget_tuple(&self, checkpoint_id: Uuid) -> anyhow::Result<Option<GraphTuple>>;
}

/// A bounded tool-calling loop: call the provider, dispatch any tool calls
/// through the registry (or interrupt on `ask_user`), feed results back, and
/// repeat up to `max_rounds` before a forced wrap-up.
pub struct ToolLoopGraph {
    provider: Arc<dyn ModelProvider>,
    tools: Arc<ToolRegistry>,
    checkpoints: Arc<dyn GraphCheckpointStore>,
    system_prompt: String,
    max_rounds: u32,
    last_usage: std::sync::Mutex<HashMap<Uuid, Usage>>,
}

impl ToolLoopGraph {
    pub fn new(
        provider: Arc<dyn ModelProvider>,
        tools: Arc<ToolRegistry>,
        checkpoints: Arc<dyn GraphCheckpointStore>,
        system_prompt: impl Into<String>,
        max_rounds: u32,
    ) -> Self {
        Self {
            provider,
            tools,
            checkpoints,
            system_prompt: system_prompt.into(),
            max_rounds: max_rounds.max(1),
            last_usage: std::sync::Mutex::new(HashMap::new()),
        }
    }

    fn tool_schemas(&self) -> Vec<ToolSchema> {
        let mut schemas = self.tools.schemas();
        schemas.push(ask_user_schema());
        schemas
    }

    async fn run(&self, checkpoint_id: Uuid, mut state: Vec<Message>) -> anyhow::Result<GraphOutcome> {
        if state.is_empty() || !matches!(state.first().map(|m| m.role), Some(nova_model::Role::System)) {
            if !self.system_prompt.is_empty() {
                state.insert(0, Message::system(self.system_prompt.clone()));
            }
        }

        let mut last_usage = None;
        for _round in 0..self.max_rounds {
            let req = CompletionRequest {
                messages: state.clone(),
                tools: self.tool_schemas(),
                stream: true,
            };
            let mut stream = self.provider.complete(req).await?;

            let mut text = String::new();
            let mut calls: Vec<(String, String, String)> = Vec::new(); // (id, name, arguments)
            while let Some(event) = stream.next().await {
                match event? {
                    ResponseEvent::TextDelta(delta) => text.push_str(&delta),
                    ResponseEvent::ToolCall { id, name, arguments } => {
                        if let Some(existing) = calls.iter_mut().find(|(cid, _, _)| *cid == id) {
                            existing.2.push_str(&arguments);
                        } else {
                            calls.push((id, name, arguments));
                        }
                    }
                    ResponseEvent::Usage(usage) => last_usage = Some(usage),
                    ResponseEvent::Done => break,
                    ResponseEvent::Error(msg) => return Err(anyhow::anyhow!("agent failure: {msg}")),
                }
            }

            if let Some(usage) = last_usage {
                self.last_usage.lock().unwrap().insert(checkpoint_id, usage);
            }

            if let Some((id, _, arguments)) = calls.iter().find(|(_, name, _)| name == ASK_USER_TOOL_NAME) {
                let parsed: serde_json::Value =
                    serde_json::from_str(arguments).unwrap_or(serde_json::Value::Null);
                let question = parsed
                    .get("question")
                    .and_then(|v| v.as_str())
                    .unwrap_or_default()
                    .to_string();
                let schema = parsed.get("schema").cloned().unwrap_or(serde_json::Value::Null);
                let origin_name = parsed
                    .get("agent_name")
                    .and_then(|v| v.as_str())
                    .unwrap_or("agent")
                    .to_string();

                state.push(Message {
                    role: nova_model::Role::Assistant,
                    content: nova_model::MessageContent::ToolCall {
                        tool_call_id: id.clone(),
                        function: nova_model::FunctionCall { name: ASK_USER_TOOL_NAME.into(), arguments: arguments.clone() },
                    },
                });
                self.checkpoints.update(checkpoint_id, state).await?;

                return Ok(GraphOutcome::Interrupt(InterruptPayload {
                    interaction_id_hint: id.clone(),
                    question,
                    schema,
                    origin_name,
                    resume_payload: serde_json::json!({ "tool_call_id": id }),
                }));
            }

            if calls.is_empty() {
                if !text.is_empty() {
                    state.push(Message::assistant(text.clone()));
                }
                self.checkpoints.update(checkpoint_id, state).await?;
                return Ok(GraphOutcome::Completed { text, usage: last_usage });
            }

            if !text.is_empty() {
                state.push(Message::assistant(text));
            }
            for (id, name, arguments) in &calls {
                state.push(Message {
                    role: nova_model::Role::Assistant,
                    content: nova_model::MessageContent::ToolCall {
                        tool_call_id: id.clone(),
                        function: nova_model::FunctionCall { name: name.clone(), arguments: arguments.clone() },
                    },
                });
                let output = self
                    .tools
                    .execute(ToolCall {
                        id: id.clone(),
                        name: name.clone(),
                        args: serde_json::from_str(arguments).unwrap_or(serde_json::Value::Null),
                    })
                    .await?;
                state.push(Message::tool_result(id.clone(), output.content));
            }
        }

        // Forced wrap-up: out of rounds, report what we have rather than
        // looping forever on a tool-happy model.
        self.checkpoints.update(checkpoint_id, state).await?;
        Ok(GraphOutcome::Completed {
            text: "Reached the maximum number of tool-call rounds for this turn.".into(),
            usage: last_usage,
        })
    }
}

#[async_trait]
impl AgentGraph for ToolLoopGraph {
    async fn invoke(&self, checkpoint_id: Uuid, input: Vec<Message>) -> anyhow::Result<GraphOutcome> {
        let mut state = self.checkpoints.get(checkpoint_id).await?.unwrap_or_default();
        state.extend(input);
        self.run(checkpoint_id, state).await
    }

    async fn resume(
        &self,
        checkpoint_id: Uuid,
        resume_payload: serde_json::Value,
        answer: String,
    ) -> anyhow::Result<GraphOutcome> {
        let mut state = self
            .checkpoints
            .get(checkpoint_id)
            .await?
            .ok_or_else(|| anyhow::anyhow!("no checkpoint state to resume from"))?;
        let tool_call_id = resume_payload
            .get("tool_call_id")
            .and_then(|v| v.as_str())
            .unwrap_or_default()
            .to_string();
        state.push(Message::tool_result(tool_call_id, answer));
        self.run(checkpoint_id, state).await
    }

    async fn update_state(&self, checkpoint_id: Uuid, messages: Vec<Message>) -> anyhow::Result<()> {
        self.checkpoints.update(checkpoint_id, messages).await
    }

    async fn delete(&self, checkpoint_id: Uuid) -> anyhow::Result<()> {
        self.last_usage.lock().unwrap().remove(&checkpoint_id);
        self.checkpoints.delete(checkpoint_id).await
    }

    async fn aget_tuple(&self, checkpoint_id: Uuid) -> anyhow::Result<Option<GraphTuple>> {
        let messages = self.checkpoints.get(checkpoint_id).await?;
        let last_usage = self.last_usage.lock().unwrap().get(&checkpoint_id).copied();
        Ok(messages.map(|messages| GraphTuple { messages, last_usage }))
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::checkpoint::InMemoryGraphCheckpointStore;
    use nova_model::ScriptedMockProvider;

    fn registry() -> Arc<ToolRegistry> {
        Arc::new(ToolRegistry::new())
    }

    #[tokio::test]
    async fn completes_without_tool_calls() {
        let provider = Arc::new(ScriptedMockProvider::always_text("hello there"));
        let graph = ToolLoopGraph::new(provider, registry(), Arc::new(InMemoryGraphCheckpointStore::new()), "you are nova", 5);
        let id = Uuid::new_v4();
        let outcome = graph.invoke(id, vec![Message::user("hi")]).await.unwrap();
        match outcome {
            GraphOutcome::Completed { text, .. } => assert_eq!(text, "hello there"),
            other => panic!("expected Completed, got {other:?}"),
        }
    }

    #[tokio::test]
    async fn ask_user_tool_call_becomes_interrupt() {
        let provider = Arc::new(ScriptedMockProvider::ask_user("call-1", r#"{"question":"Which calendar?","agent_name":"Calendar"}"#));
        let graph = ToolLoopGraph::new(provider, registry(), Arc::new(InMemoryGraphCheckpointStore::new()), "", 5);
        let id = Uuid::new_v4();
        let outcome = graph.invoke(id, vec![Message::user("book a meeting")]).await.unwrap();
        match outcome {
            GraphOutcome::Interrupt(payload) => {
                assert_eq!(payload.question, "Which calendar?");
                assert_eq!(payload.origin_name, "Calendar");
            }
            other => panic!("expected Interrupt, got {other:?}"),
        }
    }

    #[tokio::test]
    async fn resume_appends_tool_result_and_continues() {
        let provider = Arc::new(ScriptedMockProvider::ask_user("call-1", r#"{"question":"Which calendar?"}"#));
        let checkpoints = Arc::new(InMemoryGraphCheckpointStore::new());
        let graph = ToolLoopGraph::new(provider.clone(), registry(), checkpoints.clone(), "", 5);
        let id = Uuid::new_v4();
        let interrupt = graph.invoke(id, vec![Message::user("book a meeting")]).await.unwrap();
        let resume_payload = match interrupt {
            GraphOutcome::Interrupt(p) => p.resume_payload,
            _ => panic!("expected interrupt"),
        };

        // Re-script the provider for the post-resume turn.
        let completed = graph.resume(id, resume_payload, "Work".into()).await.unwrap();
        match completed {
            GraphOutcome::Completed { .. } => {}
            other => panic!("expected Completed after resume, got {other:?}"),
        }
        let state = checkpoints.get(id).await.unwrap().unwrap();
        assert!(state.iter().any(|m| m.as_text() == Some("Work")));
    }
}
