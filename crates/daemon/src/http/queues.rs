// SPDX-License-Identifier: BUSL-1.1
// Copyright (c) 2026 Alfred Jean LLC

//! Queue routes: enqueue / claim / complete / fail for the three item
//! queues, plus worker heartbeats and job activity logs.
//!
//! Every mutation also lands a job-lifecycle event on the owning session's
//! stream so the planner can follow along without polling.

use super::error::ApiError;
use super::SharedState;
use axum::extract::{Path, State};
use axum::Json;
use pp_core::{
    Clock, Envelope, ErrorBlob, JobSpec, QueueName, RequestSpec, SystemClock, WorkerId,
    WorkerStatus,
};
use serde::Deserialize;
use serde_json::json;
use tracing::debug;

fn now_ms() -> u64 {
    SystemClock.epoch_ms()
}

/// Emit a job-lifecycle envelope onto the item's session stream.
/// Best-effort: queue state is the source of truth, the event is telemetry.
fn emit(state: &SharedState, session_id: &str, event_type: &str, data: serde_json::Value) {
    if let Err(e) = state.hub.post_command(session_id, Envelope::new(event_type, data)) {
        debug!(error = %e, event_type, "lifecycle event not recorded");
    }
}

// ── Enqueue ──────────────────────────────────────────────────────────────────

pub async fn enqueue_job(
    State(state): State<SharedState>,
    Json(spec): Json<JobSpec>,
) -> Result<Json<serde_json::Value>, ApiError> {
    let receipt = state.store().lock().enqueue_job(&spec, now_ms())?;
    emit(
        &state,
        spec.session_id.as_str(),
        "job_enqueued",
        json!({ "jobId": receipt.id, "kind": spec.payload.kind(), "priority": spec.priority }),
    );
    Ok(Json(json!({
        "jobId": receipt.id,
        "queuePosition": receipt.queue_position,
        "etaMs": receipt.eta_ms,
    })))
}

pub async fn enqueue_request(
    State(state): State<SharedState>,
    Json(spec): Json<RequestSpec>,
) -> Result<Json<serde_json::Value>, ApiError> {
    let receipt = state.store().lock().enqueue_request(&spec, now_ms())?;
    Ok(Json(json!({
        "requestId": receipt.id,
        "queuePosition": receipt.queue_position,
        "etaMs": receipt.eta_ms,
    })))
}

pub async fn enqueue_completion(
    State(state): State<SharedState>,
    Json(spec): Json<pp_core::CompletionSpec>,
) -> Result<Json<serde_json::Value>, ApiError> {
    let receipt = state.store().lock().enqueue_completion(&spec, now_ms())?;
    Ok(Json(json!({
        "completionId": receipt.id,
        "created": receipt.created,
        "queuePosition": receipt.queue_position,
    })))
}

// ── Claim ────────────────────────────────────────────────────────────────────

#[derive(Debug, Deserialize)]
pub struct ClaimBody {
    #[serde(rename = "workerId")]
    pub worker_id: String,
}

async fn claim(
    state: SharedState,
    queue: QueueName,
    body: ClaimBody,
) -> Result<Json<serde_json::Value>, ApiError> {
    let worker = WorkerId::parse(&body.worker_id)?;
    let claimed = state.store().lock().claim(queue, &worker, now_ms())?;
    let Some(claimed) = claimed else {
        return Ok(Json(json!({ "ok": false })));
    };
    if queue == QueueName::Jobs {
        emit(
            &state,
            claimed.item.session_id.as_str(),
            "job_claimed",
            json!({ "jobId": claimed.item.id, "workerId": body.worker_id }),
        );
    }
    Ok(Json(json!({
        "ok": true,
        "item": claimed.item,
        "queueWaitMs": claimed.queue_wait_ms,
    })))
}

pub async fn claim_job(
    State(state): State<SharedState>,
    Json(body): Json<ClaimBody>,
) -> Result<Json<serde_json::Value>, ApiError> {
    claim(state, QueueName::Jobs, body).await
}

pub async fn claim_request(
    State(state): State<SharedState>,
    Json(body): Json<ClaimBody>,
) -> Result<Json<serde_json::Value>, ApiError> {
    claim(state, QueueName::Requests, body).await
}

pub async fn claim_completion(
    State(state): State<SharedState>,
    Json(body): Json<ClaimBody>,
) -> Result<Json<serde_json::Value>, ApiError> {
    claim(state, QueueName::Completions, body).await
}

// ── Complete / fail ──────────────────────────────────────────────────────────

#[derive(Debug, Default, Deserialize)]
pub struct CompleteBody {
    #[serde(default)]
    pub summary: Option<String>,
    #[serde(default)]
    pub artifacts: serde_json::Value,
}

pub async fn complete_item(
    State(state): State<SharedState>,
    Path(id): Path<String>,
    body: Option<Json<CompleteBody>>,
) -> Result<Json<serde_json::Value>, ApiError> {
    let body = body.map(|Json(b)| b).unwrap_or_default();
    let result = json!({ "summary": body.summary, "artifacts": body.artifacts });
    let item = state.store().lock().complete(&id, result, now_ms())?;
    if item.queue == QueueName::Jobs {
        emit(
            &state,
            item.session_id.as_str(),
            "job_completed",
            json!({ "jobId": item.id, "durationMs": item.duration_ms }),
        );
    }
    Ok(Json(json!({
        "durationMs": item.duration_ms,
        "completedAt": item.completed_at_ms.map(pp_core::iso_ms),
    })))
}

#[derive(Debug, Deserialize)]
pub struct FailBody {
    pub message: String,
    #[serde(default)]
    pub detail: serde_json::Value,
}

pub async fn fail_item(
    State(state): State<SharedState>,
    Path(id): Path<String>,
    Json(body): Json<FailBody>,
) -> Result<Json<serde_json::Value>, ApiError> {
    let error =
        pp_engine::classify_job_failure(ErrorBlob::with_detail(body.message, body.detail));
    let item = state.store().lock().fail(&id, &error, now_ms())?;
    if item.queue == QueueName::Jobs {
        // The planner hears the full blob and may surface a readable
        // summary into the chat stream.
        emit(
            &state,
            item.session_id.as_str(),
            "job_failed",
            json!({ "jobId": item.id, "error": error }),
        );
    }
    Ok(Json(json!({
        "failedAt": item.failed_at_ms.map(pp_core::iso_ms),
        "attempts": item.attempts,
        "canRequeue": item.can_requeue(),
    })))
}

// ── Worker liveness ──────────────────────────────────────────────────────────

#[derive(Debug, Deserialize)]
pub struct HeartbeatBody {
    #[serde(rename = "workerId")]
    pub worker_id: String,
    pub status: WorkerStatus,
    #[serde(default)]
    pub details: Option<serde_json::Value>,
}

pub async fn job_heartbeat(
    State(state): State<SharedState>,
    Path(id): Path<String>,
    Json(body): Json<HeartbeatBody>,
) -> Result<Json<serde_json::Value>, ApiError> {
    let worker = WorkerId::parse(&body.worker_id)?;
    state.store().lock().heartbeat(
        &worker,
        body.status,
        Some(&id),
        body.details.as_ref(),
        now_ms(),
    )?;
    Ok(Json(json!({ "ok": true })))
}

#[derive(Debug, Deserialize)]
pub struct LogBody {
    pub line: String,
}

/// Runner output line: watchdog activity evidence.
pub async fn append_job_log(
    State(state): State<SharedState>,
    Path(id): Path<String>,
    Json(body): Json<LogBody>,
) -> Result<Json<serde_json::Value>, ApiError> {
    state.store().lock().append_job_log(&id, &body.line, now_ms())?;
    Ok(Json(json!({ "ok": true })))
}
