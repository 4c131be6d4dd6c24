// SPDX-License-Identifier: BUSL-1.1
// Copyright (c) 2026 Alfred Jean LLC

//! The item queue engine: requests, jobs, and completions.
//!
//! All three queues share one table and one lifecycle; the claim ordering
//! policy is the only thing that differs, and it is encoded in the single
//! `ORDER BY` below (affinity, then priority tier, then FIFO). Requests and
//! completions carry default priority and no affinity, which degrades the
//! same ordering to plain FIFO.

use crate::db::Store;
use crate::error::StorageError;
use pp_core::{
    Budgets, ClaimedItem, CompletionId, CompletionSpec, CoreError, EnqueueReceipt, ErrorBlob,
    JobId, JobSpec, Priority, QueueItem, QueueItemStatus, QueueName, RequestId, RequestSpec,
    SessionId, WorkerId,
};
use rusqlite::{params, OptionalExtension, Row, Transaction};

/// Per-status item counts for one queue.
#[derive(Debug, Default, Clone, PartialEq, Eq, serde::Serialize)]
pub struct StatusCounts {
    pub pending: u64,
    pub claimed: u64,
    pub completed: u64,
    pub failed: u64,
    pub skipped: u64,
}

/// Non-terminal item counts per priority tier.
#[derive(Debug, Default, Clone, PartialEq, Eq, serde::Serialize)]
pub struct PriorityCounts {
    pub interactive: u64,
    pub normal: u64,
    pub background: u64,
}

struct InsertItem<'a> {
    id: String,
    queue: QueueName,
    session_id: &'a SessionId,
    payload: serde_json::Value,
    priority: Priority,
    budgets: Budgets,
    target_owner: Option<&'a str>,
    task_id: Option<&'a str>,
    kind: Option<&'a str>,
    commit_ref: Option<&'a str>,
    branch_ref: Option<&'a str>,
    max_attempts: u32,
}

impl Store {
    /// Enqueue a client request (FIFO, planner-claimed).
    pub fn enqueue_request(
        &mut self,
        spec: &RequestSpec,
        now_ms: u64,
    ) -> Result<EnqueueReceipt, StorageError> {
        spec.validate()?;
        let item = InsertItem {
            id: RequestId::generate().as_str().to_string(),
            queue: QueueName::Requests,
            session_id: &spec.session_id,
            payload: serde_json::json!({ "text": spec.text }),
            priority: Priority::Normal,
            budgets: Budgets::default(),
            target_owner: None,
            task_id: None,
            kind: None,
            commit_ref: None,
            branch_ref: None,
            max_attempts: 3,
        };
        self.insert_item(item, now_ms)
    }

    /// Enqueue a job with priority, budgets, and optional worker affinity.
    pub fn enqueue_job(
        &mut self,
        spec: &JobSpec,
        now_ms: u64,
    ) -> Result<EnqueueReceipt, StorageError> {
        spec.validate()?;
        let item = InsertItem {
            id: JobId::generate().as_str().to_string(),
            queue: QueueName::Jobs,
            session_id: &spec.session_id,
            payload: serde_json::to_value(&spec.payload)?,
            priority: spec.priority,
            budgets: spec.effective_budgets(),
            target_owner: spec.target_owner.as_deref(),
            task_id: spec.task_id.as_deref(),
            kind: Some(spec.payload.kind()),
            commit_ref: None,
            branch_ref: None,
            max_attempts: spec.max_attempts,
        };
        self.insert_item(item, now_ms)
    }

    /// Enqueue a worker completion. Idempotent on
    /// `(session, commit_ref, branch_ref)`: a duplicate returns the
    /// existing id with `created = false`.
    pub fn enqueue_completion(
        &mut self,
        spec: &CompletionSpec,
        now_ms: u64,
    ) -> Result<EnqueueReceipt, StorageError> {
        spec.validate()?;
        let item = InsertItem {
            id: CompletionId::generate().as_str().to_string(),
            queue: QueueName::Completions,
            session_id: &spec.session_id,
            payload: serde_json::to_value(spec)?,
            priority: Priority::Normal,
            budgets: Budgets::default(),
            target_owner: None,
            task_id: Some(&spec.job_id),
            kind: None,
            commit_ref: Some(&spec.commit_ref),
            branch_ref: Some(&spec.branch_ref),
            max_attempts: 3,
        };
        self.insert_item(item, now_ms)
    }

    fn insert_item(
        &mut self,
        item: InsertItem<'_>,
        now_ms: u64,
    ) -> Result<EnqueueReceipt, StorageError> {
        let tx = self.conn.transaction()?;
        let changed = tx.execute(
            "INSERT INTO queue_items (
                id, queue, session_id, payload, priority,
                queue_wait_budget_ms, execution_budget_ms, finalization_budget_ms,
                target_owner, task_id, kind, commit_ref, branch_ref,
                max_attempts, enqueued_at_ms
             ) VALUES (?1, ?2, ?3, ?4, ?5, ?6, ?7, ?8, ?9, ?10, ?11, ?12, ?13, ?14, ?15)
             ON CONFLICT DO NOTHING",
            params![
                item.id,
                item.queue.as_str(),
                item.session_id.as_str(),
                serde_json::to_string(&item.payload)?,
                item.priority.as_str(),
                item.budgets.queue_wait_ms as i64,
                item.budgets.execution_ms as i64,
                item.budgets.finalization_ms as i64,
                item.target_owner,
                item.task_id,
                item.kind,
                item.commit_ref,
                item.branch_ref,
                item.max_attempts,
                now_ms as i64,
            ],
        )?;

        let (id, created) = if changed == 1 {
            (item.id, true)
        } else {
            // Unique-key conflict: collapse onto the existing row.
            let existing: String = tx.query_row(
                "SELECT id FROM queue_items
                 WHERE queue = ?1 AND session_id = ?2 AND commit_ref = ?3 AND branch_ref = ?4",
                params![
                    item.queue.as_str(),
                    item.session_id.as_str(),
                    item.commit_ref,
                    item.branch_ref
                ],
                |row| row.get(0),
            )?;
            (existing, false)
        };

        let (queue_position, eta_ms) = queue_estimate(&tx, item.queue, &id, item.priority)?;
        tx.commit()?;
        Ok(EnqueueReceipt { id, created, queue_position, eta_ms })
    }

    /// Atomically claim the next item for `owner`.
    ///
    /// One transaction: auto-register the worker, verify it holds no other
    /// claim in this queue, pick the next pending row by policy order, and
    /// flip it to `claimed` while incrementing `attempts`. Returns `None`
    /// when nothing is pending or the owner already holds a claim.
    pub fn claim(
        &mut self,
        queue: QueueName,
        owner: &WorkerId,
        now_ms: u64,
    ) -> Result<Option<ClaimedItem>, StorageError> {
        // Auto-register on first contact, even when nothing is pending.
        self.conn.execute(
            "INSERT OR IGNORE INTO workers (id, status, last_heartbeat_ms)
             VALUES (?1, 'idle', ?2)",
            params![owner.as_str(), now_ms as i64],
        )?;

        let tx = self.conn.transaction()?;
        // At most one claimed item per (queue, owner).
        let holding: i64 = tx.query_row(
            "SELECT COUNT(*) FROM queue_items
             WHERE queue = ?1 AND status = 'claimed' AND owner = ?2",
            params![queue.as_str(), owner.as_str()],
            |row| row.get(0),
        )?;
        if holding > 0 {
            return Ok(None);
        }

        let next: Option<String> = tx
            .query_row(
                "SELECT id FROM queue_items
                 WHERE queue = ?1 AND status = 'pending'
                 ORDER BY
                     CASE WHEN target_owner = ?2 THEN 0 ELSE 1 END,
                     CASE priority
                         WHEN 'interactive' THEN 0
                         WHEN 'normal' THEN 1
                         ELSE 2
                     END,
                     enqueued_at_ms ASC,
                     rowid ASC
                 LIMIT 1",
                params![queue.as_str(), owner.as_str()],
                |row| row.get(0),
            )
            .optional()?;
        let Some(id) = next else {
            return Ok(None);
        };

        let changed = tx.execute(
            "UPDATE queue_items
             SET status = 'claimed', owner = ?2, claimed_at_ms = ?3, attempts = attempts + 1
             WHERE id = ?1 AND status = 'pending'",
            params![id, owner.as_str(), now_ms as i64],
        )?;
        if changed != 1 {
            return Err(StorageError::Corrupt(format!("claim raced on item '{id}'")));
        }
        tx.execute(
            "UPDATE workers SET status = 'busy', current_job_id = ?2, last_heartbeat_ms = ?3
             WHERE id = ?1",
            params![owner.as_str(), id, now_ms as i64],
        )?;

        let item = fetch_item(&tx, &id)?
            .ok_or_else(|| StorageError::Corrupt(format!("claimed item '{id}' vanished")))?;
        tx.commit()?;
        let queue_wait_ms = now_ms.saturating_sub(item.enqueued_at_ms);
        Ok(Some(ClaimedItem { item, queue_wait_ms }))
    }

    /// Record a successful result. Errors with `NotClaimed` unless the item
    /// is currently claimed.
    pub fn complete(
        &mut self,
        id: &str,
        result: serde_json::Value,
        now_ms: u64,
    ) -> Result<QueueItem, StorageError> {
        self.finish(id, QueueItemStatus::Completed, Some(result), None, now_ms)
    }

    /// Record a failure with its structured error.
    pub fn fail(
        &mut self,
        id: &str,
        error: &ErrorBlob,
        now_ms: u64,
    ) -> Result<QueueItem, StorageError> {
        self.finish(id, QueueItemStatus::Failed, None, Some(error), now_ms)
    }

    fn finish(
        &mut self,
        id: &str,
        status: QueueItemStatus,
        result: Option<serde_json::Value>,
        error: Option<&ErrorBlob>,
        now_ms: u64,
    ) -> Result<QueueItem, StorageError> {
        let tx = self.conn.transaction()?;
        let row: Option<(String, Option<String>, Option<i64>)> = tx
            .query_row(
                "SELECT status, owner, claimed_at_ms FROM queue_items WHERE id = ?1",
                params![id],
                |row| Ok((row.get(0)?, row.get(1)?, row.get(2)?)),
            )
            .optional()?;
        let Some((current, owner, claimed_at_ms)) = row else {
            return Err(CoreError::NotFound(id.to_string()).into());
        };
        if current != "claimed" {
            return Err(CoreError::NotClaimed(id.to_string()).into());
        }

        let duration_ms = claimed_at_ms.map(|c| (now_ms as i64).saturating_sub(c));
        let (done_col, err_json) = match status {
            QueueItemStatus::Completed => ("completed_at_ms", None),
            QueueItemStatus::Failed => {
                ("failed_at_ms", error.map(serde_json::to_string).transpose()?)
            }
            _ => return Err(CoreError::Validation(format!("cannot finish as {status}")).into()),
        };
        tx.execute(
            &format!(
                "UPDATE queue_items
                 SET status = ?2, {done_col} = ?3, duration_ms = ?4,
                     result = COALESCE(?5, result), error = COALESCE(?6, error)
                 WHERE id = ?1"
            ),
            params![
                id,
                status.as_str(),
                now_ms as i64,
                duration_ms,
                result.map(|r| serde_json::to_string(&r)).transpose()?,
                err_json,
            ],
        )?;

        // Flip the owner back to idle when it holds no other claim.
        if let Some(owner) = owner {
            release_owner(&tx, &owner, id)?;
        }

        let item = fetch_item(&tx, id)?
            .ok_or_else(|| StorageError::Corrupt(format!("finished item '{id}' vanished")))?;
        tx.commit()?;
        Ok(item)
    }

    /// Put a failed/skipped item back to pending, preserving `attempts`.
    ///
    /// Also accepts a claimed item (transient give-up by its owner).
    /// Returns `false` without touching the row when attempts are already
    /// exhausted — terminal stays terminal.
    pub fn requeue(&mut self, id: &str, now_ms: u64) -> Result<bool, StorageError> {
        let tx = self.conn.transaction()?;
        let row: Option<(String, Option<String>, u32, u32)> = tx
            .query_row(
                "SELECT status, owner, attempts, max_attempts FROM queue_items WHERE id = ?1",
                params![id],
                |row| Ok((row.get(0)?, row.get(1)?, row.get(2)?, row.get(3)?)),
            )
            .optional()?;
        let Some((status, owner, attempts, max_attempts)) = row else {
            return Err(CoreError::NotFound(id.to_string()).into());
        };
        let eligible = matches!(status.as_str(), "claimed" | "failed" | "skipped");
        if !eligible || attempts >= max_attempts {
            return Ok(false);
        }
        tx.execute(
            "UPDATE queue_items
             SET status = 'pending', owner = NULL, claimed_at_ms = NULL,
                 started_at_ms = NULL, enqueued_at_ms = ?2
             WHERE id = ?1",
            params![id, now_ms as i64],
        )?;
        if let Some(owner) = owner {
            release_owner(&tx, &owner, id)?;
        }
        tx.commit()?;
        Ok(true)
    }

    pub fn get_item(&self, id: &str) -> Result<Option<QueueItem>, StorageError> {
        let mut stmt = self.conn.prepare(&format!("{ITEM_SELECT} WHERE id = ?1"))?;
        let item = stmt.query_row(params![id], map_item).optional()?;
        item.transpose().map_err(Into::into)
    }

    /// All currently claimed items in a queue (watchdog input).
    pub fn claimed_items(&self, queue: QueueName) -> Result<Vec<QueueItem>, StorageError> {
        let mut stmt = self.conn.prepare(&format!(
            "{ITEM_SELECT} WHERE queue = ?1 AND status = 'claimed' ORDER BY claimed_at_ms ASC"
        ))?;
        let rows = stmt.query_map(params![queue.as_str()], map_item)?;
        let mut items = Vec::new();
        for row in rows {
            items.push(row??);
        }
        Ok(items)
    }

    /// Per-status counts via one grouped scan.
    pub fn counts_by_status(&self, queue: QueueName) -> Result<StatusCounts, StorageError> {
        let mut stmt = self.conn.prepare(
            "SELECT status, COUNT(*) FROM queue_items WHERE queue = ?1 GROUP BY status",
        )?;
        let rows = stmt
            .query_map(params![queue.as_str()], |row| {
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
                other => {
                    return Err(StorageError::Corrupt(format!("unknown status '{other}'")));
                }
            }
        }
        Ok(counts)
    }

    /// Non-terminal counts per priority tier.
    pub fn counts_by_priority(&self, queue: QueueName) -> Result<PriorityCounts, StorageError> {
        let mut stmt = self.conn.prepare(
            "SELECT priority, COUNT(*) FROM queue_items
             WHERE queue = ?1 AND status IN ('pending', 'claimed')
             GROUP BY priority",
        )?;
        let rows = stmt
            .query_map(params![queue.as_str()], |row| {
                Ok((row.get::<_, String>(0)?, row.get::<_, i64>(1)?))
            })?;
        let mut counts = PriorityCounts::default();
        for row in rows {
            let (priority, n) = row?;
            let n = n as u64;
            match priority.as_str() {
                "interactive" => counts.interactive = n,
                "normal" => counts.normal = n,
                "background" => counts.background = n,
                other => {
                    return Err(StorageError::Corrupt(format!("unknown priority '{other}'")));
                }
            }
        }
        Ok(counts)
    }
}

/// Queue position (1-based) and ETA for a pending item.
///
/// Position counts pending rows that the claim ordering ranks at or before
/// this one within its priority tier; ETA is `(position − 1) × slot`.
fn queue_estimate(
    tx: &Transaction<'_>,
    queue: QueueName,
    id: &str,
    priority: Priority,
) -> Result<(u64, u64), StorageError> {
    let position: i64 = tx.query_row(
        "SELECT COUNT(*) FROM queue_items
         WHERE queue = ?1 AND status = 'pending'
           AND (
               CASE priority
                   WHEN 'interactive' THEN 0 WHEN 'normal' THEN 1 ELSE 2
               END < ?3
               OR (
                   CASE priority
                       WHEN 'interactive' THEN 0 WHEN 'normal' THEN 1 ELSE 2
                   END = ?3
                   AND rowid <= (SELECT rowid FROM queue_items WHERE id = ?2)
               )
           )",
        params![queue.as_str(), id, priority.rank()],
        |row| row.get(0),
    )?;
    let position = position.max(1) as u64;
    Ok((position, (position - 1) * priority.slot_ms()))
}

fn release_owner(tx: &Transaction<'_>, owner: &str, item_id: &str) -> Result<(), StorageError> {
    tx.execute(
        "UPDATE workers SET current_job_id = NULL
         WHERE id = ?1 AND current_job_id = ?2",
        params![owner, item_id],
    )?;
    tx.execute(
        "UPDATE workers SET status = 'idle'
         WHERE id = ?1 AND status = 'busy'
           AND NOT EXISTS (
               SELECT 1 FROM queue_items WHERE owner = ?1 AND status = 'claimed'
           )",
        params![owner],
    )?;
    Ok(())
}

const ITEM_SELECT: &str = "SELECT id, queue, session_id, status, owner, payload, error,
    attempts, max_attempts, priority,
    queue_wait_budget_ms, execution_budget_ms, finalization_budget_ms,
    target_owner, task_id, kind, commit_ref, branch_ref,
    enqueued_at_ms, claimed_at_ms, started_at_ms, first_activity_at_ms,
    completed_at_ms, failed_at_ms, duration_ms
    FROM queue_items";

fn fetch_item(tx: &Transaction<'_>, id: &str) -> Result<Option<QueueItem>, StorageError> {
    let mut stmt = tx.prepare(&format!("{ITEM_SELECT} WHERE id = ?1"))?;
    let item = stmt.query_row(params![id], map_item).optional()?;
    item.transpose().map_err(Into::into)
}

type ItemResult = Result<QueueItem, StorageError>;

fn map_item(row: &Row<'_>) -> rusqlite::Result<ItemResult> {
    let queue: String = row.get(1)?;
    let session_id: String = row.get(2)?;
    let status: String = row.get(3)?;
    let payload: String = row.get(5)?;
    let error: Option<String> = row.get(6)?;
    let priority: String = row.get(9)?;

    Ok(build_item(row, queue, session_id, status, payload, error, priority))
}

#[allow(clippy::too_many_arguments)]
fn build_item(
    row: &Row<'_>,
    queue: String,
    session_id: String,
    status: String,
    payload: String,
    error: Option<String>,
    priority: String,
) -> ItemResult {
    let queue = match queue.as_str() {
        "requests" => QueueName::Requests,
        "jobs" => QueueName::Jobs,
        "completions" => QueueName::Completions,
        other => return Err(StorageError::Corrupt(format!("unknown queue '{other}'"))),
    };
    let to_u64 = |v: Option<i64>| v.map(|v| v as u64);
    Ok(QueueItem {
        id: row.get(0)?,
        queue,
        session_id: SessionId::parse(&session_id)
            .map_err(|e| StorageError::Corrupt(format!("bad session id: {e}")))?,
        status: QueueItemStatus::parse(&status)
            .ok_or_else(|| StorageError::Corrupt(format!("unknown status '{status}'")))?,
        owner: row.get(4)?,
        payload: serde_json::from_str(&payload)?,
        error: error.map(|e| serde_json::from_str(&e)).transpose()?,
        attempts: row.get(7)?,
        max_attempts: row.get(8)?,
        priority: Priority::parse(&priority)
            .ok_or_else(|| StorageError::Corrupt(format!("unknown priority '{priority}'")))?,
        budgets: Budgets {
            queue_wait_ms: row.get::<_, i64>(10)? as u64,
            execution_ms: row.get::<_, i64>(11)? as u64,
            finalization_ms: row.get::<_, i64>(12)? as u64,
        },
        target_owner: row.get(13)?,
        task_id: row.get(14)?,
        kind: row.get(15)?,
        commit_ref: row.get(16)?,
        branch_ref: row.get(17)?,
        enqueued_at_ms: row.get::<_, i64>(18)? as u64,
        claimed_at_ms: to_u64(row.get(19)?),
        started_at_ms: to_u64(row.get(20)?),
        first_activity_at_ms: to_u64(row.get(21)?),
        completed_at_ms: to_u64(row.get(22)?),
        failed_at_ms: to_u64(row.get(23)?),
        duration_ms: to_u64(row.get(24)?),
    })
}

#[cfg(test)]
#[path = "queues_tests.rs"]
mod tests;
