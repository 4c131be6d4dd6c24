// SPDX-License-Identifier: BUSL-1.1
// Copyright (c) 2026 Alfred Jean LLC

//! Stale-claim recovery.
//!
//! A claimed job whose activity evidence has gone quiet past the TTL is
//! auto-failed so the queue does not leak claims when a worker dies
//! mid-run. A worker that is heartbeating and reports itself busy on the
//! exact job gets an activity-aware grace window before the claim is
//! declared stale — long quiet jobs are not false positives.

use crate::error::EngineError;
use pp_core::{ErrorBlob, QueueItem, QueueName, WorkerStatus};
use pp_storage::Store;
use serde_json::json;
use tracing::{info, warn};

/// Hard bound on items examined per sweep.
const SWEEP_LIMIT_MAX: usize = 500;

#[derive(Debug, Clone)]
pub struct WatchdogConfig {
    /// Claim staleness TTL.
    pub claim_ttl_ms: u64,
    /// Worker liveness TTL.
    pub heartbeat_ttl_ms: u64,
    /// Max claims recovered per sweep (≤ 500).
    pub limit: usize,
}

impl Default for WatchdogConfig {
    fn default() -> Self {
        Self {
            claim_ttl_ms: 90_000,
            heartbeat_ttl_ms: pp_core::WORKER_ONLINE_TTL_MS,
            limit: SWEEP_LIMIT_MAX,
        }
    }
}

/// One auto-failed claim.
#[derive(Debug, Clone)]
pub struct RecoveredClaim {
    pub job_id: String,
    pub worker_id: Option<String>,
    pub error: ErrorBlob,
}

impl WatchdogConfig {
    /// Sweep the job queue once, auto-failing stale claims.
    pub fn sweep(
        &self,
        store: &mut Store,
        now_ms: u64,
    ) -> Result<Vec<RecoveredClaim>, EngineError> {
        let limit = self.limit.min(SWEEP_LIMIT_MAX);
        let claimed = store.claimed_items(QueueName::Jobs)?;
        let mut recovered = Vec::new();

        for item in claimed {
            if recovered.len() >= limit {
                break;
            }
            if let Some(claim) = self.recover_if_stale(store, &item, now_ms)? {
                recovered.push(claim);
            }
        }
        if !recovered.is_empty() {
            info!(count = recovered.len(), "recovered stale claims");
        }
        Ok(recovered)
    }

    fn recover_if_stale(
        &self,
        store: &mut Store,
        item: &QueueItem,
        now_ms: u64,
    ) -> Result<Option<RecoveredClaim>, EngineError> {
        let last_activity = store
            .last_activity_ms(item)?
            .unwrap_or(item.enqueued_at_ms);
        let quiet_ms = now_ms.saturating_sub(last_activity);
        if quiet_ms <= self.claim_ttl_ms {
            return Ok(None);
        }

        let worker = match &item.owner {
            Some(owner) => store.get_worker(owner)?,
            None => None,
        };

        // Activity-aware grace: a live worker still busy on this exact job
        // earns min(execution + finalization budget, TTL × 5) extra quiet
        // time before the claim is treated as abandoned.
        if let Some(record) = &worker {
            if record.busy_on(&item.id, now_ms, self.heartbeat_ttl_ms) {
                let grace = (item.budgets.execution_ms + item.budgets.finalization_ms)
                    .min(self.claim_ttl_ms * 5);
                if quiet_ms <= self.claim_ttl_ms + grace {
                    return Ok(None);
                }
            }
        }

        let heartbeat_age_ms =
            worker.as_ref().map(|w| now_ms.saturating_sub(w.last_heartbeat_ms));
        let error = ErrorBlob::with_detail(
            "auto-failed after stale worker claim",
            json!({
                "source": "watchdog",
                "quiet_ms": quiet_ms,
                "claim_ttl_ms": self.claim_ttl_ms,
                "last_activity_ms": last_activity,
                "worker": item.owner,
                "worker_heartbeat_age_ms": heartbeat_age_ms,
            }),
        );
        store.fail(&item.id, &error, now_ms)?;

        if let Some(record) = worker {
            let worker_id = record.id.as_str().to_string();
            store.clear_worker_job(&worker_id, &item.id)?;
            let next_status = if record.online(now_ms, self.heartbeat_ttl_ms) {
                WorkerStatus::Error
            } else {
                WorkerStatus::Offline
            };
            store.set_worker_status(&worker_id, next_status)?;
            warn!(job_id = %item.id, worker = %worker_id, status = %next_status,
                  "auto-failed stale claim");
        } else {
            warn!(job_id = %item.id, "auto-failed stale claim with no registered worker");
        }

        Ok(Some(RecoveredClaim {
            job_id: item.id.clone(),
            worker_id: item.owner.clone(),
            error,
        }))
    }
}

#[cfg(test)]
#[path = "watchdog_tests.rs"]
mod tests;
