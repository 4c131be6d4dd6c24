// SPDX-License-Identifier: BUSL-1.1
// Copyright (c) 2026 Alfred Jean LLC

//! Durable queue item model shared by the request, job, and completion
//! queues.
//!
//! All three queues are instances of one lifecycle:
//! `pending → claimed → {completed | failed | skipped}`, with
//! `failed`/`skipped` eligible for requeue while attempts remain.

use crate::error::{CoreError, ErrorBlob};
use crate::session::SessionId;
use serde::{Deserialize, Serialize};

crate::define_id! {
    /// Unique identifier for a completion queue item.
    pub struct CompletionId("cmp-");
}

/// Status of a queue item through its lifecycle.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum QueueItemStatus {
    Pending,
    Claimed,
    Completed,
    Failed,
    /// Terminal without success or error; merge queue only.
    Skipped,
}

impl QueueItemStatus {
    pub fn is_terminal(&self) -> bool {
        matches!(self, Self::Completed | Self::Failed | Self::Skipped)
    }

    pub fn parse(s: &str) -> Option<Self> {
        match s {
            "pending" => Some(Self::Pending),
            "claimed" => Some(Self::Claimed),
            "completed" => Some(Self::Completed),
            "failed" => Some(Self::Failed),
            "skipped" => Some(Self::Skipped),
            _ => None,
        }
    }

    pub fn as_str(&self) -> &'static str {
        match self {
            Self::Pending => "pending",
            Self::Claimed => "claimed",
            Self::Completed => "completed",
            Self::Failed => "failed",
            Self::Skipped => "skipped",
        }
    }
}

crate::simple_display! {
    QueueItemStatus {
        Pending => "pending",
        Claimed => "claimed",
        Completed => "completed",
        Failed => "failed",
        Skipped => "skipped",
    }
}

/// Scheduling tier for jobs. Interactive jobs are claimed first.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize, Default)]
#[serde(rename_all = "lowercase")]
pub enum Priority {
    Interactive,
    #[default]
    Normal,
    Background,
}

impl Priority {
    /// Claim-order rank: lower claims first.
    pub fn rank(&self) -> i64 {
        match self {
            Self::Interactive => 0,
            Self::Normal => 1,
            Self::Background => 2,
        }
    }

    /// Queue-wait SLA slot used for ETA estimates.
    pub fn slot_ms(&self) -> u64 {
        match self {
            Self::Interactive => 20_000,
            Self::Normal => 90_000,
            Self::Background => 240_000,
        }
    }

    /// Default budgets for a job enqueued at this tier.
    pub fn default_budgets(&self) -> Budgets {
        match self {
            Self::Interactive => Budgets {
                queue_wait_ms: 20_000,
                execution_ms: 5 * 60_000,
                finalization_ms: 60_000,
            },
            Self::Normal => Budgets {
                queue_wait_ms: 90_000,
                execution_ms: 15 * 60_000,
                finalization_ms: 2 * 60_000,
            },
            Self::Background => Budgets {
                queue_wait_ms: 240_000,
                execution_ms: 60 * 60_000,
                finalization_ms: 5 * 60_000,
            },
        }
    }

    pub fn parse(s: &str) -> Option<Self> {
        match s {
            "interactive" => Some(Self::Interactive),
            "normal" => Some(Self::Normal),
            "background" => Some(Self::Background),
            _ => None,
        }
    }

    pub fn as_str(&self) -> &'static str {
        match self {
            Self::Interactive => "interactive",
            Self::Normal => "normal",
            Self::Background => "background",
        }
    }
}

crate::simple_display! {
    Priority {
        Interactive => "interactive",
        Normal => "normal",
        Background => "background",
    }
}

/// The three time bounds a job carries.
///
/// `queue_wait_ms` is a soft SLO bound; `execution_ms` is enforced by the
/// runner; `finalization_ms` is the single extension granted when the
/// runner is still actively producing output at execution expiry.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub struct Budgets {
    pub queue_wait_ms: u64,
    pub execution_ms: u64,
    pub finalization_ms: u64,
}

impl Default for Budgets {
    fn default() -> Self {
        Priority::Normal.default_budgets()
    }
}

/// Which of the three item queues a row belongs to.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum QueueName {
    Requests,
    Jobs,
    Completions,
}

impl QueueName {
    pub fn as_str(&self) -> &'static str {
        match self {
            Self::Requests => "requests",
            Self::Jobs => "jobs",
            Self::Completions => "completions",
        }
    }
}

crate::simple_display! {
    QueueName {
        Requests => "requests",
        Jobs => "jobs",
        Completions => "completions",
    }
}

/// A durable work record in one of the item queues.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct QueueItem {
    pub id: String,
    pub queue: QueueName,
    pub session_id: SessionId,
    pub status: QueueItemStatus,
    /// Agent / worker / pusher currently or last holding the claim.
    pub owner: Option<String>,
    pub payload: serde_json::Value,
    pub error: Option<ErrorBlob>,
    pub attempts: u32,
    pub max_attempts: u32,
    pub priority: Priority,
    pub budgets: Budgets,
    /// Claim affinity: matching owners rank first.
    pub target_owner: Option<String>,
    pub task_id: Option<String>,
    pub kind: Option<String>,
    pub commit_ref: Option<String>,
    pub branch_ref: Option<String>,
    pub enqueued_at_ms: u64,
    pub claimed_at_ms: Option<u64>,
    pub started_at_ms: Option<u64>,
    pub first_activity_at_ms: Option<u64>,
    pub completed_at_ms: Option<u64>,
    pub failed_at_ms: Option<u64>,
    pub duration_ms: Option<u64>,
}

impl QueueItem {
    /// Whether the item may be requeued (attempts remain).
    pub fn can_requeue(&self) -> bool {
        matches!(self.status, QueueItemStatus::Failed | QueueItemStatus::Skipped)
            && self.attempts < self.max_attempts
    }
}

/// Result of an enqueue: the id plus scheduling estimates.
///
/// `created = false` means the enqueue collapsed onto an existing row
/// (idempotent duplicate).
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct EnqueueReceipt {
    pub id: String,
    pub created: bool,
    pub queue_position: u64,
    pub eta_ms: u64,
}

/// A freshly claimed item plus the time it spent pending.
#[derive(Debug, Clone)]
pub struct ClaimedItem {
    pub item: QueueItem,
    pub queue_wait_ms: u64,
}

/// Validated input for a completion enqueue.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct CompletionSpec {
    pub session_id: SessionId,
    pub worker_id: String,
    pub job_id: String,
    pub commit_ref: String,
    pub branch_ref: String,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub summary: Option<String>,
}

impl CompletionSpec {
    pub fn validate(&self) -> Result<(), CoreError> {
        if self.commit_ref.trim().is_empty() {
            return Err(CoreError::Validation("completion requires commitRef".into()));
        }
        if self.branch_ref.trim().is_empty() {
            return Err(CoreError::Validation("completion requires branchRef".into()));
        }
        if self.worker_id.trim().is_empty() {
            return Err(CoreError::Validation("completion requires workerId".into()));
        }
        Ok(())
    }
}

crate::builder! {
    pub struct QueueItemBuilder => QueueItem {
        into {
            id: String = "item-1",
        }
        set {
            queue: QueueName = QueueName::Jobs,
            session_id: SessionId = SessionId::test("test-session"),
            status: QueueItemStatus = QueueItemStatus::Pending,
            payload: serde_json::Value = serde_json::Value::Null,
            attempts: u32 = 0,
            max_attempts: u32 = 3,
            priority: Priority = Priority::Normal,
            budgets: Budgets = Budgets::default(),
            enqueued_at_ms: u64 = 1_000_000,
        }
        option {
            owner: String = None,
            error: ErrorBlob = None,
            target_owner: String = None,
            task_id: String = None,
            kind: String = None,
            commit_ref: String = None,
            branch_ref: String = None,
            claimed_at_ms: u64 = None,
            started_at_ms: u64 = None,
            first_activity_at_ms: u64 = None,
            completed_at_ms: u64 = None,
            failed_at_ms: u64 = None,
            duration_ms: u64 = None,
        }
    }
}

#[cfg(test)]
#[path = "queue_tests.rs"]
mod tests;
