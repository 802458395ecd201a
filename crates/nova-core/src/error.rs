// SPDX-License-Identifier: Apache-2.0
//! The union point the categorization heuristic (§4.1, §7) inspects to
//! assign a [`TaskErrorCategory`] without string-sniffing where a typed
//! variant already disambiguates the failure.

use serde::{Deserialize, Serialize};

#[derive(Debug, thiserror::Error)]
pub enum ExecutorError {
    #[error("tool failure: {0}")]
    ToolFailure(String),

    #[error("agent failure: {0}")]
    AgentFailure(String),

    #[error("network error: {0}")]
    NetworkError(String),

    #[error("validation error: {0}")]
    ValidationError(String),

    #[error("no pending interaction for task")]
    NoPendingInteraction,

    #[error("interaction is not answered")]
    InteractionNotAnswered,

    #[error("Interaction canceled by user")]
    InteractionCanceled,

    #[error(transparent)]
    Store(#[from] nova_store::StoreError),

    #[error(transparent)]
    Other(#[from] anyhow::Error),
}

/// `§7` error taxonomy, restricted to the categories the Task Executor emits
/// on `task_error` (`validation_error`/`auth_error`/`not_found` are public-
/// boundary concerns owned by `nova-node`).
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum TaskErrorCategory {
    AgentFailure,
    ToolFailure,
    NetworkError,
    ValidationError,
    SystemError,
    Summary,
    UserCanceled,
}

/// Categorizes an [`ExecutorError`] for the `task_error` event and
/// `progress_log` entry. Typed variants resolve directly; the string
/// heuristic in §4.1's "supplemental" note is the fallback for errors that
/// crossed the `anyhow`-erased tool/model boundary.
pub fn categorize(err: &ExecutorError) -> TaskErrorCategory {
    match err {
        ExecutorError::ToolFailure(_) => TaskErrorCategory::ToolFailure,
        ExecutorError::AgentFailure(_) => TaskErrorCategory::AgentFailure,
        ExecutorError::NetworkError(_) => TaskErrorCategory::NetworkError,
        ExecutorError::ValidationError(_) => TaskErrorCategory::ValidationError,
        ExecutorError::NoPendingInteraction | ExecutorError::InteractionNotAnswered => {
            TaskErrorCategory::ValidationError
        }
        ExecutorError::InteractionCanceled => TaskErrorCategory::UserCanceled,
        ExecutorError::Store(_) => TaskErrorCategory::SystemError,
        ExecutorError::Other(e) => categorize_by_text(&e.to_string()),
    }
}

fn categorize_by_text(text: &str) -> TaskErrorCategory {
    let lower = text.to_lowercase();
    if lower.contains("tool") {
        TaskErrorCategory::ToolFailure
    } else if lower.contains("agent") {
        TaskErrorCategory::AgentFailure
    } else if lower.contains("network") || lower.contains("connection") {
        TaskErrorCategory::NetworkError
    } else if lower.contains("validation") {
        TaskErrorCategory::ValidationError
    } else {
        TaskErrorCategory::SystemError
    }
}
