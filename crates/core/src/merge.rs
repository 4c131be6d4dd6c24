// SPDX-License-Identifier: BUSL-1.1
// Copyright (c) 2026 Alfred Jean LLC

//! Merge job model for the serial pusher.
//!
//! A merge job pins a remote branch at a specific head sha. A later push to
//! the same branch produces a new job; the stale one skips itself at
//! validation time.

use crate::error::{CoreError, ErrorBlob};
use crate::queue::QueueItemStatus;
use serde::{Deserialize, Serialize};

crate::define_id! {
    /// Unique identifier for a merge job.
    pub struct MergeJobId("mrg-");
}

/// How commits land on the temp branch before validation.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize, Default)]
#[serde(rename_all = "kebab-case")]
pub enum MergeStrategy {
    /// Fast-forward only; refuse when histories diverge.
    FfOnly,
    /// Merge commit even when fast-forward is possible.
    #[default]
    NoFf,
    /// Replay the branch's unique commits one by one.
    CherryPick,
}

impl MergeStrategy {
    pub fn parse(s: &str) -> Result<Self, CoreError> {
        match s {
            "ff-only" => Ok(Self::FfOnly),
            "no-ff" => Ok(Self::NoFf),
            "cherry-pick" => Ok(Self::CherryPick),
            other => Err(CoreError::Validation(format!(
                "unknown merge strategy '{other}' (expected ff-only, no-ff, or cherry-pick)"
            ))),
        }
    }

    pub fn as_str(&self) -> &'static str {
        match self {
            Self::FfOnly => "ff-only",
            Self::NoFf => "no-ff",
            Self::CherryPick => "cherry-pick",
        }
    }
}

crate::simple_display! {
    MergeStrategy {
        FfOnly => "ff-only",
        NoFf => "no-ff",
        CherryPick => "cherry-pick",
    }
}

/// A queued merge of one pinned branch head into the integration branch.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct MergeJob {
    pub id: MergeJobId,
    pub remote: String,
    pub branch: String,
    /// Commit pin: the branch tip observed at enqueue time.
    pub head_sha: String,
    pub status: QueueItemStatus,
    /// Higher claims first.
    pub priority: i64,
    pub owner: Option<String>,
    pub attempts: u32,
    pub max_attempts: u32,
    pub last_error: Option<ErrorBlob>,
    pub enqueued_at_ms: u64,
    pub claimed_at_ms: Option<u64>,
    pub completed_at_ms: Option<u64>,
    pub failed_at_ms: Option<u64>,
    pub duration_ms: Option<u64>,
}

impl MergeJob {
    /// Short display form: `branch@sha7`.
    pub fn describe(&self) -> String {
        let sha = crate::time_fmt::short(&self.head_sha, 7);
        format!("{}@{}", self.branch, sha)
    }

    pub fn attempts_exhausted(&self) -> bool {
        self.attempts >= self.max_attempts
    }
}

crate::builder! {
    pub struct MergeJobBuilder => MergeJob {
        into {
            remote: String = "origin",
            branch: String = "agent/w1/job-1",
            head_sha: String = "0000000000000000000000000000000000000000",
        }
        set {
            id: MergeJobId = MergeJobId::from_string("mrg-test"),
            status: QueueItemStatus = QueueItemStatus::Pending,
            priority: i64 = 0,
            attempts: u32 = 0,
            max_attempts: u32 = 3,
            enqueued_at_ms: u64 = 1_000_000,
        }
        option {
            owner: String = None,
            last_error: ErrorBlob = None,
            claimed_at_ms: u64 = None,
            completed_at_ms: u64 = None,
            failed_at_ms: u64 = None,
            duration_ms: u64 = None,
        }
    }
}

#[cfg(test)]
#[path = "merge_tests.rs"]
mod tests;
