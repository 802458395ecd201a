// SPDX-License-Identifier: Apache-2.0
//! Maps the public-boundary slice of the error taxonomy (§7) — the parts
//! owned by this crate rather than `nova-core::TaskErrorCategory` — onto
//! HTTP status codes.

use axum::{
    http::StatusCode,
    response::{IntoResponse, Response},
    Json,
};
use serde_json::json;

#[derive(Debug, thiserror::Error)]
pub enum ApiError {
    #[error("{0}")]
    Validation(String),
    #[error("forbidden")]
    Forbidden,
    #[error("not found: {0}")]
    NotFound(String),
    #[error(transparent)]
    Store(#[from] nova_store::StoreError),
    #[error(transparent)]
    Internal(#[from] anyhow::Error),
}

impl IntoResponse for ApiError {
    fn into_response(self) -> Response {
        let (status, category, message) = match &self {
            ApiError::Validation(msg) => (StatusCode::BAD_REQUEST, "validation_error", msg.clone()),
            ApiError::Forbidden => (StatusCode::FORBIDDEN, "auth_error", self.to_string()),
            ApiError::NotFound(what) => (StatusCode::NOT_FOUND, "not_found", what.clone()),
            ApiError::Store(nova_store::StoreError::NotFound(what)) => {
                (StatusCode::NOT_FOUND, "not_found", what.clone())
            }
            ApiError::Store(nova_store::StoreError::Validation(msg)) => {
                (StatusCode::BAD_REQUEST, "validation_error", msg.clone())
            }
            ApiError::Store(e) => (StatusCode::INTERNAL_SERVER_ERROR, "system_error", e.to_string()),
            ApiError::Internal(e) => (StatusCode::INTERNAL_SERVER_ERROR, "system_error", e.to_string()),
        };
        (status, Json(json!({ "error": category, "message": message }))).into_response()
    }
}
