// SPDX-License-Identifier: BUSL-1.1
// Copyright (c) 2026 Alfred Jean LLC

//! Session identifier and metadata.
//!
//! A session is a long-lived conversation/event channel addressed by an
//! operator-chosen id. Ids are validated at the boundary; the store never
//! sees an invalid one.

use crate::error::CoreError;
use serde::{Deserialize, Serialize};
use std::borrow::Borrow;
use std::fmt;

/// Maximum length of a session id in bytes.
pub const SESSION_ID_MAX_LEN: usize = 64;

/// Validated session identifier: 1–64 characters of `[a-zA-Z0-9._-]`.
#[derive(Debug, Clone, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(transparent)]
pub struct SessionId(String);

impl SessionId {
    /// Validate and wrap an operator-chosen id.
    pub fn parse(id: impl Into<String>) -> Result<Self, CoreError> {
        let id = id.into();
        if id.is_empty() || id.len() > SESSION_ID_MAX_LEN {
            return Err(CoreError::Validation(format!(
                "session id must be 1-{} characters, got {}",
                SESSION_ID_MAX_LEN,
                id.len()
            )));
        }
        if let Some(bad) = id.chars().find(|c| !is_session_char(*c)) {
            return Err(CoreError::Validation(format!(
                "session id contains invalid character {:?} (allowed: [a-zA-Z0-9._-])",
                bad
            )));
        }
        Ok(Self(id))
    }

    /// Generate a fresh id for callers that did not choose one.
    pub fn generate() -> Self {
        // nanoid's default alphabet includes '_' and '-', both valid here.
        Self(format!("s-{}", nanoid::nanoid!(19)))
    }

    pub fn as_str(&self) -> &str {
        &self.0
    }

    /// Unvalidated constructor for test fixtures.
    #[cfg(any(test, feature = "test-support"))]
    pub fn test(id: &str) -> Self {
        Self(id.to_string())
    }
}

fn is_session_char(c: char) -> bool {
    c.is_ascii_alphanumeric() || c == '.' || c == '_' || c == '-'
}

impl fmt::Display for SessionId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.0)
    }
}

impl Borrow<str> for SessionId {
    fn borrow(&self) -> &str {
        &self.0
    }
}

impl AsRef<str> for SessionId {
    fn as_ref(&self) -> &str {
        &self.0
    }
}

/// Stored session row.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct SessionMeta {
    pub id: SessionId,
    pub created_at_ms: u64,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub label: Option<String>,
}

#[cfg(test)]
#[path = "session_tests.rs"]
mod tests;
