// SPDX-License-Identifier: BUSL-1.1
// Copyright (c) 2026 Alfred Jean LLC

//! Observability routes: status counts and the SLO summary.

use super::error::ApiError;
use super::SharedState;
use axum::extract::{Query, State};
use axum::Json;
use pp_core::{Clock, QueueName, SystemClock, WORKER_ONLINE_TTL_MS};
use pp_engine::{summarize, StatsSnapshot};
use serde::Deserialize;
use serde_json::json;

#[derive(Debug, Deserialize)]
pub struct StatsQuery {
    /// SLO window in hours (default 24).
    #[serde(default = "default_window")]
    pub window_hours: u32,
}

fn default_window() -> u32 {
    24
}

impl Default for StatsQuery {
    fn default() -> Self {
        Self { window_hours: default_window() }
    }
}

pub async fn stats(
    State(state): State<SharedState>,
    query: Option<Query<StatsQuery>>,
) -> Result<Json<serde_json::Value>, ApiError> {
    let Query(query) = query.unwrap_or_default();
    let now = SystemClock.epoch_ms();
    let since = now.saturating_sub(u64::from(query.window_hours) * 3_600_000);

    let store = state.store().lock();
    let snapshot = StatsSnapshot::read(&store)?;
    let slo = summarize(&store.slo_rows(QueueName::Jobs, since)?, query.window_hours);
    Ok(Json(json!({ "queues": snapshot, "slo": slo })))
}

pub async fn list_workers(
    State(state): State<SharedState>,
) -> Result<Json<serde_json::Value>, ApiError> {
    let now = SystemClock.epoch_ms();
    let workers = state.store().lock().list_workers()?;
    let entries: Vec<serde_json::Value> = workers
        .iter()
        .map(|w| {
            json!({
                "id": w.id.as_str(),
                "status": w.status,
                "currentJobId": w.current_job_id,
                "lastHeartbeat": pp_core::iso_ms(w.last_heartbeat_ms),
                "online": w.online(now, WORKER_ONLINE_TTL_MS),
                "details": w.details,
            })
        })
        .collect();
    Ok(Json(json!({ "workers": entries })))
}
