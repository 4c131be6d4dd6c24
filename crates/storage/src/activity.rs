// SPDX-License-Identifier: BUSL-1.1
// Copyright (c) 2026 Alfred Jean LLC

//! Job activity evidence and SLO source rows.
//!
//! The watchdog decides staleness from the newest of: job-log entries,
//! `first_activity_at_ms`, `started_at_ms`, `claimed_at_ms`. Runners feed
//! the log through the `/jobs/:id/log` surface.

use crate::db::Store;
use crate::error::StorageError;
use pp_core::{ErrorBlob, QueueItem, QueueItemStatus, QueueName};
use rusqlite::params;

/// One terminal row as consumed by the SLO tracker.
#[derive(Debug, Clone)]
pub struct SloRow {
    pub status: QueueItemStatus,
    pub duration_ms: Option<u64>,
    pub queue_wait_ms: Option<u64>,
    pub error: Option<ErrorBlob>,
}

impl Store {
    /// Append one runner output line for a job.
    ///
    /// Stamps `started_at_ms` and `first_activity_at_ms` on the item when
    /// this is the first evidence of life.
    pub fn append_job_log(
        &mut self,
        job_id: &str,
        line: &str,
        now_ms: u64,
    ) -> Result<(), StorageError> {
        let tx = self.conn.transaction()?;
        tx.execute(
            "INSERT INTO job_log (job_id, ts_ms, line) VALUES (?1, ?2, ?3)",
            params![job_id, now_ms as i64, line],
        )?;
        tx.execute(
            "UPDATE queue_items
             SET first_activity_at_ms = COALESCE(first_activity_at_ms, ?2),
                 started_at_ms = COALESCE(started_at_ms, ?2)
             WHERE id = ?1",
            params![job_id, now_ms as i64],
        )?;
        tx.commit()?;
        Ok(())
    }

    /// Newest activity timestamp for a claimed item.
    pub fn last_activity_ms(&self, item: &QueueItem) -> Result<Option<u64>, StorageError> {
        let log_max: Option<i64> = self.conn.query_row(
            "SELECT MAX(ts_ms) FROM job_log WHERE job_id = ?1",
            params![item.id],
            |row| row.get(0),
        )?;
        let candidates = [
            log_max.map(|v| v as u64),
            item.first_activity_at_ms,
            item.started_at_ms,
            item.claimed_at_ms,
        ];
        Ok(candidates.into_iter().flatten().max())
    }

    /// Terminal rows of a queue that reached a terminal state after
    /// `since_ms`, for the sliding-window SLO summary.
    pub fn slo_rows(
        &self,
        queue: QueueName,
        since_ms: u64,
    ) -> Result<Vec<SloRow>, StorageError> {
        let mut stmt = self.conn.prepare(
            "SELECT status, duration_ms, claimed_at_ms, enqueued_at_ms, error
             FROM queue_items
             WHERE queue = ?1
               AND status IN ('completed', 'failed', 'skipped')
               AND COALESCE(completed_at_ms, failed_at_ms, 0) >= ?2",
        )?;
        let rows = stmt.query_map(params![queue.as_str(), since_ms as i64], |row| {
            Ok((
                row.get::<_, String>(0)?,
                row.get::<_, Option<i64>>(1)?,
                row.get::<_, Option<i64>>(2)?,
                row.get::<_, i64>(3)?,
                row.get::<_, Option<String>>(4)?,
            ))
        })?;
        let mut out = Vec::new();
        for row in rows {
            let (status, duration_ms, claimed_at_ms, enqueued_at_ms, error) = row?;
            let status = QueueItemStatus::parse(&status)
                .ok_or_else(|| StorageError::Corrupt(format!("unknown status '{status}'")))?;
            out.push(SloRow {
                status,
                duration_ms: duration_ms.map(|v| v as u64),
                queue_wait_ms: claimed_at_ms.map(|c| c.saturating_sub(enqueued_at_ms) as u64),
                error: error.map(|e| serde_json::from_str(&e)).transpose()?,
            });
        }
        Ok(out)
    }
}

#[cfg(test)]
#[path = "activity_tests.rs"]
mod tests;
