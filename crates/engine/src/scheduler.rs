// SPDX-License-Identifier: BUSL-1.1
// Copyright (c) 2026 Alfred Jean LLC

//! Scheduling estimates and the stats snapshot for `/stats`.
//!
//! The three priority tiers carry queue-wait SLAs (20 s / 90 s / 240 s);
//! the ETA for position `p` is `(p − 1) × slot(priority)`. Positions are
//! computed by the store at enqueue time; this module holds the shared
//! arithmetic and the aggregate read path.

use crate::error::EngineError;
use pp_core::{Priority, QueueName};
use pp_storage::{PriorityCounts, StatusCounts, Store};
use serde::Serialize;

/// ETA for a 1-based queue position at a priority tier.
pub fn eta_for_position(position: u64, priority: Priority) -> u64 {
    position.saturating_sub(1) * priority.slot_ms()
}

/// Per-queue status counts.
#[derive(Debug, Clone, Serialize)]
pub struct QueueSnapshot {
    pub counts: StatusCounts,
    pub by_priority: PriorityCounts,
}

/// Aggregate counts across all queues, as served by `/stats`.
#[derive(Debug, Clone, Serialize)]
pub struct StatsSnapshot {
    pub requests: QueueSnapshot,
    pub jobs: QueueSnapshot,
    pub completions: QueueSnapshot,
    pub merge: StatusCounts,
}

impl StatsSnapshot {
    pub fn read(store: &Store) -> Result<Self, EngineError> {
        let snapshot = |queue| -> Result<QueueSnapshot, EngineError> {
            Ok(QueueSnapshot {
                counts: store.counts_by_status(queue)?,
                by_priority: store.counts_by_priority(queue)?,
            })
        };
        Ok(Self {
            requests: snapshot(QueueName::Requests)?,
            jobs: snapshot(QueueName::Jobs)?,
            completions: snapshot(QueueName::Completions)?,
            merge: store.merge_counts()?,
        })
    }
}

#[cfg(test)]
#[path = "scheduler_tests.rs"]
mod tests;
