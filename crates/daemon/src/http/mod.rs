// SPDX-License-Identifier: BUSL-1.1
// Copyright (c) 2026 Alfred Jean LLC

//! HTTP surface: router, shared state, bearer auth.

mod error;
mod queues;
mod sessions;
mod stats;

pub use error::ApiError;

use axum::extract::{Request, State};
use axum::http::StatusCode;
use axum::middleware::{self, Next};
use axum::response::Response;
use axum::routing::{get, post};
use axum::Router;
use pp_core::SystemClock;
use pp_engine::{SessionHub, SharedStore};
use std::sync::Arc;

pub struct AppState {
    pub hub: SessionHub<SystemClock>,
    pub auth_token: Option<String>,
}

pub type SharedState = Arc<AppState>;

impl AppState {
    pub fn new(store: SharedStore, auth_token: Option<String>) -> SharedState {
        Arc::new(Self { hub: SessionHub::new(store, SystemClock), auth_token })
    }

    pub fn store(&self) -> &SharedStore {
        self.hub.store()
    }
}

/// Build the full route table over shared state.
pub fn router(state: SharedState) -> Router {
    Router::new()
        // Sessions and event streaming
        .route("/sessions", post(sessions::create_or_join))
        .route("/sessions/:id/events", get(sessions::stream_events))
        .route("/sessions/:id/history", get(sessions::history))
        .route("/sessions/:id/ws", get(sessions::ws_events))
        .route("/sessions/:id/message", post(sessions::post_message))
        .route("/sessions/:id/command", post(sessions::post_command))
        // Job queue
        .route("/jobs/enqueue", post(queues::enqueue_job))
        .route("/jobs/claim", post(queues::claim_job))
        .route("/jobs/:id/complete", post(queues::complete_item))
        .route("/jobs/:id/fail", post(queues::fail_item))
        .route("/jobs/:id/heartbeat", post(queues::job_heartbeat))
        .route("/jobs/:id/log", post(queues::append_job_log))
        // Request queue (client → planner)
        .route("/requests/enqueue", post(queues::enqueue_request))
        .route("/requests/claim", post(queues::claim_request))
        .route("/requests/:id/complete", post(queues::complete_item))
        .route("/requests/:id/fail", post(queues::fail_item))
        // Completion queue (worker → pusher)
        .route("/completions/enqueue", post(queues::enqueue_completion))
        .route("/completions/claim", post(queues::claim_completion))
        .route("/completions/:id/complete", post(queues::complete_item))
        .route("/completions/:id/fail", post(queues::fail_item))
        // Observability
        .route("/workers", get(stats::list_workers))
        .route("/stats", get(stats::stats))
        .layer(middleware::from_fn_with_state(Arc::clone(&state), bearer_auth))
        .with_state(state)
}

/// Reject requests without the configured bearer token. A daemon without a
/// token runs open (loopback deployments).
async fn bearer_auth(
    State(state): State<SharedState>,
    request: Request,
    next: Next,
) -> Result<Response, StatusCode> {
    let Some(expected) = &state.auth_token else {
        return Ok(next.run(request).await);
    };
    let authorized = request
        .headers()
        .get(axum::http::header::AUTHORIZATION)
        .and_then(|v| v.to_str().ok())
        .and_then(|v| v.strip_prefix("Bearer "))
        .map(|token| token == expected)
        .unwrap_or(false);
    if !authorized {
        return Err(StatusCode::UNAUTHORIZED);
    }
    Ok(next.run(request).await)
}

#[cfg(test)]
#[path = "mod_tests.rs"]
mod tests;
