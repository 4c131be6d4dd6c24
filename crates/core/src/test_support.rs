// SPDX-License-Identifier: BUSL-1.1
// Copyright (c) 2026 Alfred Jean LLC

//! Shared fixtures for other crates' tests (behind the `test-support` feature).

use crate::job::{JobPayload, JobSpec};
use crate::queue::{CompletionSpec, Priority};
use crate::session::SessionId;

/// A minimal valid job spec for queue tests.
pub fn job_spec(session: &str) -> JobSpec {
    JobSpec::new(
        SessionId::test(session),
        JobPayload::Command { command: "true".to_string() },
    )
}

/// A job spec at an explicit priority.
pub fn job_spec_at(session: &str, priority: Priority) -> JobSpec {
    job_spec(session).priority(priority)
}

/// A minimal valid completion spec pinned to a commit.
pub fn completion_spec(session: &str, worker: &str, job: &str, sha: &str) -> CompletionSpec {
    CompletionSpec {
        session_id: SessionId::test(session),
        worker_id: worker.to_string(),
        job_id: job.to_string(),
        commit_ref: sha.to_string(),
        branch_ref: format!("refs/pushpals/agent/{worker}/{job}"),
        summary: None,
    }
}
