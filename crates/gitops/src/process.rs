// SPDX-License-Identifier: BUSL-1.1
// Copyright (c) 2026 Alfred Jean LLC

//! Subprocess execution with a mandatory timeout.

use crate::error::GitError;
use std::time::Duration;
use tokio::process::Command;
use tracing::debug;

/// Default timeout for individual git operations.
pub const DEFAULT_GIT_TIMEOUT: Duration = Duration::from_secs(60);

/// Captured output of a finished command.
#[derive(Debug, Clone)]
pub struct CommandOutput {
    pub code: Option<i32>,
    pub stdout: String,
    pub stderr: String,
}

impl CommandOutput {
    pub fn success(&self) -> bool {
        self.code == Some(0)
    }

    /// Both streams joined, for conflict detection and error detail.
    pub fn combined(&self) -> String {
        let mut out = self.stdout.clone();
        if !self.stderr.is_empty() {
            if !out.is_empty() {
                out.push('\n');
            }
            out.push_str(&self.stderr);
        }
        out
    }
}

/// Run a command, killing it at the timeout.
///
/// Returns the captured output whether or not the exit code is zero;
/// callers decide what a non-zero exit means. A kill on expiry is an
/// error — a half-finished git operation is never a usable result.
pub async fn run_with_timeout(
    mut command: Command,
    timeout: Duration,
    label: &str,
) -> Result<CommandOutput, GitError> {
    command.kill_on_drop(true);
    debug!(label, timeout_ms = timeout.as_millis() as u64, "spawn");
    let fut = command.output();
    let output = match tokio::time::timeout(timeout, fut).await {
        Ok(result) => result.map_err(|source| GitError::Spawn {
            label: label.to_string(),
            source,
        })?,
        Err(_) => {
            return Err(GitError::Timeout {
                label: label.to_string(),
                timeout_ms: timeout.as_millis() as u64,
            })
        }
    };
    Ok(CommandOutput {
        code: output.status.code(),
        stdout: String::from_utf8_lossy(&output.stdout).into_owned(),
        stderr: String::from_utf8_lossy(&output.stderr).into_owned(),
    })
}
