// SPDX-License-Identifier: BUSL-1.1
// Copyright (c) 2026 Alfred Jean LLC

//! Storage error type.

use pp_core::CoreError;
use thiserror::Error;

#[derive(Debug, Error)]
pub enum StorageError {
    #[error("sqlite: {0}")]
    Sqlite(#[from] rusqlite::Error),

    #[error("corrupt row: {0}")]
    Corrupt(String),

    #[error("json: {0}")]
    Json(#[from] serde_json::Error),

    #[error(transparent)]
    Core(#[from] CoreError),
}

impl StorageError {
    /// True when the caller hit the not-claimed optimistic-update miss.
    pub fn is_not_claimed(&self) -> bool {
        matches!(self, Self::Core(CoreError::NotClaimed(_)))
    }

    pub fn is_not_found(&self) -> bool {
        matches!(self, Self::Core(CoreError::NotFound(_)))
    }
}
