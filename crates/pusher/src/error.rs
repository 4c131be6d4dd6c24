// SPDX-License-Identifier: BUSL-1.1
// Copyright (c) 2026 Alfred Jean LLC

//! Pusher error type.

use thiserror::Error;

#[derive(Debug, Error)]
pub enum PusherError {
    /// Misconfiguration or unrecoverable environment: the daemon exits
    /// non-zero rather than retrying.
    #[error("fatal: {0}")]
    Fatal(String),

    #[error("config: {0}")]
    Config(String),

    #[error(transparent)]
    Storage(#[from] pp_storage::StorageError),

    #[error(transparent)]
    Git(#[from] pp_git::GitError),

    #[error("lock held by another instance: {0}")]
    LockHeld(String),
}
