// SPDX-License-Identifier: BUSL-1.1
// Copyright (c) 2026 Alfred Jean LLC

//! HTTP error mapping.
//!
//! Every failure leaves the daemon as `{error: {kind, message}}` with a
//! status derived from the error taxonomy: validation 400, not-found 404,
//! not-claimed and invariant violations 409, everything else 500.

use axum::http::StatusCode;
use axum::response::{IntoResponse, Response};
use axum::Json;
use pp_core::CoreError;
use pp_engine::EngineError;
use pp_storage::StorageError;
use serde_json::json;

pub struct ApiError {
    pub status: StatusCode,
    pub kind: &'static str,
    pub message: String,
}

impl ApiError {
    pub fn validation(message: impl Into<String>) -> Self {
        Self { status: StatusCode::BAD_REQUEST, kind: "validation", message: message.into() }
    }

    pub fn from_core(e: &CoreError) -> Self {
        match e {
            CoreError::Validation(m) => Self {
                status: StatusCode::BAD_REQUEST,
                kind: "validation",
                message: m.clone(),
            },
            CoreError::NotFound(m) => Self {
                status: StatusCode::NOT_FOUND,
                kind: "not_found",
                message: m.clone(),
            },
            CoreError::NotClaimed(m) => Self {
                status: StatusCode::CONFLICT,
                kind: "not_claimed",
                message: format!("item '{m}' is not claimed"),
            },
            CoreError::InvariantViolation(m) => Self {
                status: StatusCode::CONFLICT,
                kind: "invariant_violation",
                message: m.clone(),
            },
        }
    }
}

impl IntoResponse for ApiError {
    fn into_response(self) -> Response {
        let body = Json(json!({
            "error": { "kind": self.kind, "message": self.message }
        }));
        (self.status, body).into_response()
    }
}

impl From<EngineError> for ApiError {
    fn from(e: EngineError) -> Self {
        match e.core() {
            Some(core) => Self::from_core(core),
            None => Self {
                status: StatusCode::INTERNAL_SERVER_ERROR,
                kind: "internal",
                message: e.to_string(),
            },
        }
    }
}

impl From<StorageError> for ApiError {
    fn from(e: StorageError) -> Self {
        match e {
            StorageError::Core(ref core) => Self::from_core(core),
            other => Self {
                status: StatusCode::INTERNAL_SERVER_ERROR,
                kind: "internal",
                message: other.to_string(),
            },
        }
    }
}

impl From<CoreError> for ApiError {
    fn from(e: CoreError) -> Self {
        Self::from_core(&e)
    }
}
