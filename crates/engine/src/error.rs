// SPDX-License-Identifier: BUSL-1.1
// Copyright (c) 2026 Alfred Jean LLC

//! Engine error type.

use pp_core::CoreError;
use pp_storage::StorageError;
use thiserror::Error;

#[derive(Debug, Error)]
pub enum EngineError {
    #[error(transparent)]
    Storage(#[from] StorageError),

    #[error(transparent)]
    Core(CoreError),
}

impl From<CoreError> for EngineError {
    fn from(e: CoreError) -> Self {
        Self::Core(e)
    }
}

impl EngineError {
    /// The validation / not-found / not-claimed kind, when this error maps
    /// onto one (HTTP handlers dispatch on it).
    pub fn core(&self) -> Option<&CoreError> {
        match self {
            Self::Core(e) => Some(e),
            Self::Storage(StorageError::Core(e)) => Some(e),
            Self::Storage(_) => None,
        }
    }
}
