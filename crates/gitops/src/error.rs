// SPDX-License-Identifier: BUSL-1.1
// Copyright (c) 2026 Alfred Jean LLC

//! Git subprocess errors.

use thiserror::Error;

#[derive(Debug, Error)]
pub enum GitError {
    #[error("failed to spawn {label}: {source}")]
    Spawn {
        label: String,
        #[source]
        source: std::io::Error,
    },

    #[error("{label} timed out after {timeout_ms}ms")]
    Timeout { label: String, timeout_ms: u64 },

    /// Non-zero exit that is not a merge/cherry-pick conflict.
    #[error("{label} exited {code:?}: {stderr}")]
    Command { label: String, code: Option<i32>, stderr: String },

    /// Merge or cherry-pick stopped on conflicting hunks.
    #[error("conflict during {label}: {output}")]
    Conflict { label: String, output: String },

    /// A ref the operation needs does not exist.
    #[error("missing ref '{0}'")]
    MissingRef(String),
}

impl GitError {
    pub fn is_conflict(&self) -> bool {
        matches!(self, Self::Conflict { .. })
    }

    /// Timeouts and spawn failures may resolve on retry; command failures
    /// and conflicts will not.
    pub fn is_transient(&self) -> bool {
        matches!(self, Self::Timeout { .. } | Self::Spawn { .. })
    }
}
