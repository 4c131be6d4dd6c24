// SPDX-License-Identifier: BUSL-1.1
// Copyright (c) 2026 Alfred Jean LLC

//! Error taxonomy shared across the coordination core.

use serde::{Deserialize, Serialize};
use thiserror::Error;

/// Errors surfaced by the core types and pattern-matched by callers.
///
/// The kind is what callers dispatch on; free-form context travels in the
/// message. Errors that cross a queue boundary are carried as an
/// [`ErrorBlob`] on the failed item instead.
#[derive(Debug, Error, Clone, PartialEq, Eq)]
pub enum CoreError {
    /// Malformed input rejected at the boundary, before any state change.
    #[error("validation: {0}")]
    Validation(String),

    /// Optimistic update against an item that is not currently claimed.
    #[error("item '{0}' is not claimed")]
    NotClaimed(String),

    #[error("'{0}' not found")]
    NotFound(String),

    /// A store invariant would be violated (e.g. event append without a
    /// session row).
    #[error("invariant violation: {0}")]
    InvariantViolation(String),
}

/// Structured error payload attached to failed queue items.
///
/// `message` is the stable, matchable part; `detail` carries free-form
/// evidence (command output, sha comparisons, heartbeat ages).
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ErrorBlob {
    pub message: String,
    #[serde(default, skip_serializing_if = "serde_json::Value::is_null")]
    pub detail: serde_json::Value,
}

impl ErrorBlob {
    pub fn new(message: impl Into<String>) -> Self {
        Self { message: message.into(), detail: serde_json::Value::Null }
    }

    pub fn with_detail(message: impl Into<String>, detail: serde_json::Value) -> Self {
        Self { message: message.into(), detail }
    }
}

impl std::fmt::Display for ErrorBlob {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "{}", self.message)
    }
}

#[cfg(test)]
#[path = "error_tests.rs"]
mod tests;
