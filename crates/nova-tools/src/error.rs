// SPDX-License-Identifier: Apache-2.0
//! Errors a [`crate::ToolRegistry`] itself can raise, distinct from a tool's
//! own structured `{error: ...}` JSON payload (§4.5), which never crosses
//! this boundary as an `Err`.

#[derive(Debug, thiserror::Error)]
pub enum ToolError {
    #[error("unknown tool: {0}")]
    UnknownTool(String),

    #[error("aggregation selector unresolved for {subtype}: {detail}")]
    SelectorUnresolved { subtype: String, detail: String },

    #[error(transparent)]
    Store(#[from] nova_store::StoreError),

    #[error(transparent)]
    Other(#[from] anyhow::Error),
}
