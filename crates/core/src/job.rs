// SPDX-License-Identifier: BUSL-1.1
// Copyright (c) 2026 Alfred Jean LLC

//! Job and request specs as accepted at the enqueue boundary.
//!
//! Job params arrive as opaque key-value blobs; the closed set of kinds is
//! modelled as tagged variants, with the raw blob preserved so unknown
//! fields survive a round trip.

use crate::error::CoreError;
use crate::queue::{Budgets, Priority};
use crate::session::SessionId;
use serde::{Deserialize, Serialize};

crate::define_id! {
    /// Unique identifier for a job queue item.
    pub struct JobId("job-");
}

crate::define_id! {
    /// Unique identifier for a request queue item.
    pub struct RequestId("req-");
}

/// Typed job payload, tagged by `kind`.
///
/// The variant set is closed and known at build time; payloads that do not
/// match a known kind are rejected at enqueue.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(tag = "kind", rename_all = "snake_case")]
pub enum JobPayload {
    /// Edit the repository per an instruction; produces a commit.
    Edit {
        instruction: String,
        #[serde(default, skip_serializing_if = "Option::is_none")]
        base_branch: Option<String>,
    },
    /// Review a commit or branch and report findings.
    Review {
        target_ref: String,
        #[serde(default, skip_serializing_if = "Option::is_none")]
        instruction: Option<String>,
    },
    /// Run a fixed command inside the sandbox.
    Command { command: String },
}

impl JobPayload {
    pub fn kind(&self) -> &'static str {
        match self {
            Self::Edit { .. } => "edit",
            Self::Review { .. } => "review",
            Self::Command { .. } => "command",
        }
    }

    pub fn validate(&self) -> Result<(), CoreError> {
        let empty = match self {
            Self::Edit { instruction, .. } => instruction.trim().is_empty(),
            Self::Review { target_ref, .. } => target_ref.trim().is_empty(),
            Self::Command { command } => command.trim().is_empty(),
        };
        if empty {
            return Err(CoreError::Validation(format!(
                "job payload kind '{}' is missing its required field",
                self.kind()
            )));
        }
        Ok(())
    }
}

/// Validated input for a job enqueue.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct JobSpec {
    pub session_id: SessionId,
    pub payload: JobPayload,
    #[serde(default)]
    pub priority: Priority,
    /// Budget overrides; tier defaults apply when absent.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub budgets: Option<Budgets>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub target_owner: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub task_id: Option<String>,
    #[serde(default = "default_max_attempts")]
    pub max_attempts: u32,
}

fn default_max_attempts() -> u32 {
    3
}

impl JobSpec {
    pub fn new(session_id: SessionId, payload: JobPayload) -> Self {
        Self {
            session_id,
            payload,
            priority: Priority::default(),
            budgets: None,
            target_owner: None,
            task_id: None,
            max_attempts: default_max_attempts(),
        }
    }

    crate::setters! {
        set {
            priority: Priority,
            max_attempts: u32,
        }
        option {
            budgets: Budgets,
            target_owner: String,
            task_id: String,
        }
    }

    /// Budgets to persist: explicit overrides or the tier defaults.
    pub fn effective_budgets(&self) -> Budgets {
        self.budgets.unwrap_or_else(|| self.priority.default_budgets())
    }

    pub fn validate(&self) -> Result<(), CoreError> {
        self.payload.validate()?;
        if self.max_attempts == 0 {
            return Err(CoreError::Validation("maxAttempts must be at least 1".into()));
        }
        Ok(())
    }
}

/// Validated input for a request enqueue (client → planner).
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct RequestSpec {
    pub session_id: SessionId,
    pub text: String,
}

impl RequestSpec {
    pub fn validate(&self) -> Result<(), CoreError> {
        if self.text.trim().is_empty() {
            return Err(CoreError::Validation("request requires non-empty text".into()));
        }
        Ok(())
    }
}

#[cfg(test)]
#[path = "job_tests.rs"]
mod tests;
