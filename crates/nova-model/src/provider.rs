// SPDX-License-Identifier: Apache-2.0
use async_trait::async_trait;
use futures::Stream;
use std::pin::Pin;

use crate::{CompletionRequest, ResponseEvent};

pub type ResponseStream = Pin<Box<dyn Stream<Item = anyhow::Result<ResponseEvent>> + Send>>;

/// The minimal contract the Task Executor consumes to drive token generation.
///
/// Concrete wire clients (Anthropic, OpenAI, ...) are external collaborators
/// per the purpose statement; this crate specifies only the interface and a
/// [`MockProvider`] used by the rest of the workspace's tests.
#[async_trait]
pub trait ModelProvider: Send + Sync {
    fn name(&self) -> &str;
    fn model_name(&self) -> &str;

    async fn complete(&self, req: CompletionRequest) -> anyhow::Result<ResponseStream>;

    /// Context window size, when known. Used by the Task Executor to compute
    /// the usable input budget for compaction and for the `context_consumption`
    /// event's `max_context` field.
    fn context_window(&self) -> Option<u32> {
        None
    }

    /// Maximum output tokens this provider/model combination accepts.
    fn max_output_tokens(&self) -> Option<u32> {
        None
    }
}
