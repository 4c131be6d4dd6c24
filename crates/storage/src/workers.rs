// SPDX-License-Identifier: BUSL-1.1
// Copyright (c) 2026 Alfred Jean LLC

//! Worker registry operations.

use crate::db::Store;
use crate::error::StorageError;
use pp_core::{WorkerId, WorkerRecord, WorkerStatus};
use rusqlite::{params, OptionalExtension, Row};

impl Store {
    /// Record a heartbeat, upserting the worker row.
    pub fn heartbeat(
        &mut self,
        worker: &WorkerId,
        status: WorkerStatus,
        current_job_id: Option<&str>,
        details: Option<&serde_json::Value>,
        now_ms: u64,
    ) -> Result<(), StorageError> {
        self.conn.execute(
            "INSERT INTO workers (id, status, current_job_id, last_heartbeat_ms, details)
             VALUES (?1, ?2, ?3, ?4, COALESCE(?5, 'null'))
             ON CONFLICT(id) DO UPDATE SET
                 status = excluded.status,
                 current_job_id = excluded.current_job_id,
                 last_heartbeat_ms = excluded.last_heartbeat_ms,
                 details = COALESCE(?5, workers.details)",
            params![
                worker.as_str(),
                status.as_str(),
                current_job_id,
                now_ms as i64,
                details.map(serde_json::to_string).transpose()?,
            ],
        )?;
        Ok(())
    }

    pub fn get_worker(&self, id: &str) -> Result<Option<WorkerRecord>, StorageError> {
        let mut stmt = self.conn.prepare(&format!("{WORKER_SELECT} WHERE id = ?1"))?;
        let record = stmt.query_row(params![id], map_worker).optional()?;
        record.transpose().map_err(Into::into)
    }

    pub fn list_workers(&self) -> Result<Vec<WorkerRecord>, StorageError> {
        let mut stmt = self.conn.prepare(&format!("{WORKER_SELECT} ORDER BY id"))?;
        let rows = stmt.query_map([], map_worker)?;
        let mut workers = Vec::new();
        for row in rows {
            workers.push(row??);
        }
        Ok(workers)
    }

    pub fn set_worker_status(
        &mut self,
        id: &str,
        status: WorkerStatus,
    ) -> Result<(), StorageError> {
        self.conn.execute(
            "UPDATE workers SET status = ?2 WHERE id = ?1",
            params![id, status.as_str()],
        )?;
        Ok(())
    }

    /// Clear `current_job_id` only while it still points at `job_id`.
    pub fn clear_worker_job(&mut self, id: &str, job_id: &str) -> Result<(), StorageError> {
        self.conn.execute(
            "UPDATE workers SET current_job_id = NULL
             WHERE id = ?1 AND current_job_id = ?2",
            params![id, job_id],
        )?;
        Ok(())
    }
}

const WORKER_SELECT: &str =
    "SELECT id, status, current_job_id, last_heartbeat_ms, details FROM workers";

type WorkerResult = Result<WorkerRecord, StorageError>;

fn map_worker(row: &Row<'_>) -> rusqlite::Result<WorkerResult> {
    let id: String = row.get(0)?;
    let status: String = row.get(1)?;
    let details: String = row.get(4)?;
    let current_job_id: Option<String> = row.get(2)?;
    let last_heartbeat_ms: i64 = row.get(3)?;
    Ok((|| {
        Ok(WorkerRecord {
            id: WorkerId::parse(&id)
                .map_err(|e| StorageError::Corrupt(format!("bad worker id: {e}")))?,
            status: WorkerStatus::parse(&status)
                .ok_or_else(|| StorageError::Corrupt(format!("unknown worker status '{status}'")))?,
            current_job_id,
            last_heartbeat_ms: last_heartbeat_ms as u64,
            details: serde_json::from_str(&details)?,
        })
    })())
}

#[cfg(test)]
#[path = "workers_tests.rs"]
mod tests;
