// SPDX-License-Identifier: Apache-2.0
//! HTTP transport binding for §6: the message ingest API, continuous
//! browsing, interaction answer/cancel, and the per-task event websocket.
//! This crate owns the axum wiring; the semantics it drives all live in
//! `nova-core`, `nova-runtime` and `nova-store`.

pub mod auth;
pub mod browse;
pub mod error;
pub mod events;
pub mod ingest;
pub mod interactions;

use std::sync::Arc;

use axum::{
    middleware,
    routing::{get, post},
    Router,
};
use nova_core::{EventBus, TaskExecutor};
use nova_model::ModelProvider;
use nova_store::entities::UserId;
use nova_store::ConversationStore;

pub use auth::{RawToken, StoredToken};

/// Shared state threaded through every handler. §9's single-tenant-per-
/// deployment reading of the token-auth model (see DESIGN.md "Open
/// Questions"): one bearer token guards one configured `user`, the same
/// shape the host gateway uses for its single operator.
pub struct AppState {
    pub store: Arc<dyn ConversationStore>,
    pub executor: Arc<TaskExecutor>,
    pub events: Arc<EventBus>,
    pub user: UserId,
    pub tz: chrono_tz::Tz,
    pub token: StoredToken,
    /// `None` disables the manual-summary-regeneration endpoint cleanly,
    /// the same graceful-degradation shape used throughout this stack.
    pub summary_provider: Option<Arc<dyn ModelProvider>>,
}

pub fn router(state: Arc<AppState>) -> Router {
    let authenticated = Router::new()
        .route("/messages", post(ingest::ingest_handler))
        .route("/days", get(browse::list_days_handler))
        .route("/days/:day_segment_id", get(browse::fetch_day_handler))
        .route("/days/:day_segment_id/messages", get(browse::fetch_messages_handler).post(browse::post_message_handler))
        .route("/days/:day_segment_id/summarize", post(browse::trigger_summary_handler))
        .route("/interactions/:interaction_id/answer", post(interactions::answer_handler))
        .route("/interactions/:interaction_id/cancel", post(interactions::cancel_handler))
        .route("/tasks/:task_id/events", get(events::ws_handler))
        .route_layer(middleware::from_fn_with_state(state.clone(), auth::bearer_auth_mw));

    Router::new().merge(authenticated).with_state(state)
}
