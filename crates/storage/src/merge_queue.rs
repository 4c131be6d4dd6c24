// SPDX-License-Identifier: BUSL-1.1
// Copyright (c) 2026 Alfred Jean LLC

//! The merge queue: strictly serial, dedup'd on `(remote, branch, head_sha)`.

use crate::db::Store;
use crate::error::StorageError;
use crate::queues::StatusCounts;
use pp_core::{
    CoreError, EnqueueReceipt, ErrorBlob, MergeJob, MergeJobId, QueueItemStatus,
};
use rusqlite::{params, OptionalExtension, Row};

impl Store {
    /// Enqueue a merge job pinned at `head_sha`.
    ///
    /// Idempotent: a duplicate `(remote, branch, head_sha)` collapses onto
    /// the existing row. The `seen_branches` marker is updated in the same
    /// transaction so the remote scanner stops re-offering this tip.
    pub fn enqueue_merge_job(
        &mut self,
        remote: &str,
        branch: &str,
        head_sha: &str,
        priority: i64,
        max_attempts: u32,
        now_ms: u64,
    ) -> Result<EnqueueReceipt, StorageError> {
        if branch.trim().is_empty() || head_sha.trim().is_empty() {
            return Err(
                CoreError::Validation("merge job requires branch and headSha".into()).into()
            );
        }
        let id = MergeJobId::generate();
        let tx = self.conn.transaction()?;
        let changed = tx.execute(
            "INSERT INTO merge_jobs (id, remote, branch, head_sha, priority, max_attempts, enqueued_at_ms)
             VALUES (?1, ?2, ?3, ?4, ?5, ?6, ?7)
             ON CONFLICT(remote, branch, head_sha) DO NOTHING",
            params![id.as_str(), remote, branch, head_sha, priority, max_attempts, now_ms as i64],
        )?;
        let (id, created) = if changed == 1 {
            (id.as_str().to_string(), true)
        } else {
            let existing: String = tx.query_row(
                "SELECT id FROM merge_jobs WHERE remote = ?1 AND branch = ?2 AND head_sha = ?3",
                params![remote, branch, head_sha],
                |row| row.get(0),
            )?;
            (existing, false)
        };
        tx.execute(
            "INSERT INTO seen_branches (remote, branch, head_sha, observed_at_ms)
             VALUES (?1, ?2, ?3, ?4)
             ON CONFLICT(remote, branch) DO UPDATE SET
                 head_sha = excluded.head_sha,
                 observed_at_ms = excluded.observed_at_ms",
            params![remote, branch, head_sha, now_ms as i64],
        )?;

        let position: i64 = tx.query_row(
            "SELECT COUNT(*) FROM merge_jobs
             WHERE status = 'pending'
               AND (priority > ?2
                    OR (priority = ?2
                        AND rowid <= (SELECT rowid FROM merge_jobs WHERE id = ?1)))",
            params![id, priority],
            |row| row.get(0),
        )?;
        tx.commit()?;
        let queue_position = position.max(1) as u64;
        Ok(EnqueueReceipt { id, created, queue_position, eta_ms: 0 })
    }

    /// Claim the next merge job. The merge queue is queue-wide serial: while
    /// any job is claimed, this returns `None` regardless of owner.
    pub fn claim_merge_job(
        &mut self,
        owner: &str,
        now_ms: u64,
    ) -> Result<Option<MergeJob>, StorageError> {
        let tx = self.conn.transaction()?;
        let in_flight: i64 = tx.query_row(
            "SELECT COUNT(*) FROM merge_jobs WHERE status = 'claimed'",
            [],
            |row| row.get(0),
        )?;
        if in_flight > 0 {
            return Ok(None);
        }
        let next: Option<String> = tx
            .query_row(
                "SELECT id FROM merge_jobs WHERE status = 'pending'
                 ORDER BY priority DESC, enqueued_at_ms ASC, rowid ASC
                 LIMIT 1",
                [],
                |row| row.get(0),
            )
            .optional()?;
        let Some(id) = next else {
            return Ok(None);
        };
        let changed = tx.execute(
            "UPDATE merge_jobs
             SET status = 'claimed', owner = ?2, claimed_at_ms = ?3, attempts = attempts + 1
             WHERE id = ?1 AND status = 'pending'",
            params![id, owner, now_ms as i64],
        )?;
        if changed != 1 {
            return Err(StorageError::Corrupt(format!("merge claim raced on '{id}'")));
        }
        let job = fetch_merge_job(&tx, &id)?
            .ok_or_else(|| StorageError::Corrupt(format!("claimed merge job '{id}' vanished")))?;
        tx.commit()?;
        Ok(Some(job))
    }

    pub fn complete_merge_job(&mut self, id: &str, now_ms: u64) -> Result<(), StorageError> {
        self.finish_merge_job(id, QueueItemStatus::Completed, None, now_ms)
    }

    pub fn fail_merge_job(
        &mut self,
        id: &str,
        error: &ErrorBlob,
        now_ms: u64,
    ) -> Result<(), StorageError> {
        self.finish_merge_job(id, QueueItemStatus::Failed, Some(error), now_ms)
    }

    /// Terminal without success or failure (branch gone, already merged,
    /// attempts exhausted).
    pub fn skip_merge_job(
        &mut self,
        id: &str,
        reason: &ErrorBlob,
        now_ms: u64,
    ) -> Result<(), StorageError> {
        self.finish_merge_job(id, QueueItemStatus::Skipped, Some(reason), now_ms)
    }

    fn finish_merge_job(
        &mut self,
        id: &str,
        status: QueueItemStatus,
        error: Option<&ErrorBlob>,
        now_ms: u64,
    ) -> Result<(), StorageError> {
        let tx = self.conn.transaction()?;
        let row: Option<(String, Option<i64>)> = tx
            .query_row(
                "SELECT status, claimed_at_ms FROM merge_jobs WHERE id = ?1",
                params![id],
                |row| Ok((row.get(0)?, row.get(1)?)),
            )
            .optional()?;
        let Some((current, claimed_at_ms)) = row else {
            return Err(CoreError::NotFound(id.to_string()).into());
        };
        if current != "claimed" {
            return Err(CoreError::NotClaimed(id.to_string()).into());
        }
        let duration_ms = claimed_at_ms.map(|c| (now_ms as i64).saturating_sub(c));
        let done_col = match status {
            QueueItemStatus::Completed => "completed_at_ms",
            _ => "failed_at_ms",
        };
        tx.execute(
            &format!(
                "UPDATE merge_jobs
                 SET status = ?2, {done_col} = ?3, duration_ms = ?4, owner = NULL,
                     last_error = COALESCE(?5, last_error)
                 WHERE id = ?1"
            ),
            params![
                id,
                status.as_str(),
                now_ms as i64,
                duration_ms,
                error.map(serde_json::to_string).transpose()?,
            ],
        )?;
        tx.commit()?;
        Ok(())
    }

    /// Back to pending with attempts preserved; `false` when exhausted.
    pub fn requeue_merge_job(&mut self, id: &str, now_ms: u64) -> Result<bool, StorageError> {
        let tx = self.conn.transaction()?;
        let row: Option<(String, u32, u32)> = tx
            .query_row(
                "SELECT status, attempts, max_attempts FROM merge_jobs WHERE id = ?1",
                params![id],
                |row| Ok((row.get(0)?, row.get(1)?, row.get(2)?)),
            )
            .optional()?;
        let Some((status, attempts, max_attempts)) = row else {
            return Err(CoreError::NotFound(id.to_string()).into());
        };
        if !matches!(status.as_str(), "claimed" | "failed" | "skipped") || attempts >= max_attempts
        {
            return Ok(false);
        }
        tx.execute(
            "UPDATE merge_jobs
             SET status = 'pending', owner = NULL, claimed_at_ms = NULL, enqueued_at_ms = ?2
             WHERE id = ?1",
            params![id, now_ms as i64],
        )?;
        tx.commit()?;
        Ok(true)
    }

    pub fn get_merge_job(&self, id: &str) -> Result<Option<MergeJob>, StorageError> {
        let mut stmt = self.conn.prepare(&format!("{MERGE_SELECT} WHERE id = ?1"))?;
        let job = stmt.query_row(params![id], map_merge_job).optional()?;
        job.transpose().map_err(Into::into)
    }

    pub fn merge_counts(&self) -> Result<StatusCounts, StorageError> {
        let mut stmt =
            self.conn.prepare("SELECT status, COUNT(*) FROM merge_jobs GROUP BY status")?;
        let rows = stmt.query_map([], |row| {
            Ok((row.get::<_, String>(0)?, row.get::<_, i64>(1)?))
        })?;
        let mut counts = StatusCounts::default();
        for row in rows {
            let (status, n) = row?;
            let n = n as u64;
            match status.as_str() {
                "pending" => counts.pending = n,
                "claimed" => counts.claimed = n,
                "completed" => counts.completed = n,
                "failed" => counts.failed = n,
                "skipped" => counts.skipped = n,
                other => return Err(StorageError::Corrupt(format!("unknown status '{other}'"))),
            }
        }
        Ok(counts)
    }

    /// The sha last seen for `(remote, branch)` by the scanner, if any.
    pub fn seen_sha(&self, remote: &str, branch: &str) -> Result<Option<String>, StorageError> {
        Ok(self
            .conn
            .query_row(
                "SELECT head_sha FROM seen_branches WHERE remote = ?1 AND branch = ?2",
                params![remote, branch],
                |row| row.get(0),
            )
            .optional()?)
    }
}

const MERGE_SELECT: &str = "SELECT id, remote, branch, head_sha, status, priority, owner,
    attempts, max_attempts, last_error,
    enqueued_at_ms, claimed_at_ms, completed_at_ms, failed_at_ms, duration_ms
    FROM merge_jobs";

type MergeJobResult = Result<MergeJob, StorageError>;

fn map_merge_job(row: &Row<'_>) -> rusqlite::Result<MergeJobResult> {
    let status: String = row.get(4)?;
    let last_error: Option<String> = row.get(9)?;
    let to_u64 = |v: Option<i64>| v.map(|v| v as u64);
    let id: String = row.get(0)?;
    Ok((|| {
        Ok(MergeJob {
            id: MergeJobId::from_string(id),
            remote: row.get(1)?,
            branch: row.get(2)?,
            head_sha: row.get(3)?,
            status: QueueItemStatus::parse(&status)
                .ok_or_else(|| StorageError::Corrupt(format!("unknown status '{status}'")))?,
            priority: row.get(5)?,
            owner: row.get(6)?,
            attempts: row.get(7)?,
            max_attempts: row.get(8)?,
            last_error: last_error.map(|e| serde_json::from_str(&e)).transpose()?,
            enqueued_at_ms: row.get::<_, i64>(10)? as u64,
            claimed_at_ms: to_u64(row.get(11)?),
            completed_at_ms: to_u64(row.get(12)?),
            failed_at_ms: to_u64(row.get(13)?),
            duration_ms: to_u64(row.get(14)?),
        })
    })())
}

fn fetch_merge_job(
    tx: &rusqlite::Transaction<'_>,
    id: &str,
) -> Result<Option<MergeJob>, StorageError> {
    let mut stmt = tx.prepare(&format!("{MERGE_SELECT} WHERE id = ?1"))?;
    let job = stmt.query_row(params![id], map_merge_job).optional()?;
    job.transpose().map_err(Into::into)
}

#[cfg(test)]
#[path = "merge_queue_tests.rs"]
mod tests;
