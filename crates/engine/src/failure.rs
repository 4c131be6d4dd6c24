// SPDX-License-Identifier: BUSL-1.1
// Copyright (c) 2026 Alfred Jean LLC

//! Job failure classification.
//!
//! An agent that needs input instead of finishing its job surfaces that
//! through the runner as exit code 3, or — for runners that cannot set an
//! exit code — as output whose final line is a question. Both map to an
//! explicit "clarification needed" error so the planner can route the
//! question back into the chat instead of retrying the job.

use pp_core::ErrorBlob;
use serde_json::json;

/// Runner exit code reserved for "agent asked a question".
pub const CLARIFICATION_EXIT_CODE: i64 = 3;

/// Rewrite a failure blob when it is actually a clarification request.
/// The original blob is preserved under `detail.original`.
pub fn classify_job_failure(error: ErrorBlob) -> ErrorBlob {
    if !is_clarification(&error) {
        return error;
    }
    ErrorBlob::with_detail("clarification needed", json!({ "original": error }))
}

fn is_clarification(error: &ErrorBlob) -> bool {
    if error.detail.get("exit_code").and_then(serde_json::Value::as_i64)
        == Some(CLARIFICATION_EXIT_CODE)
    {
        return true;
    }
    error
        .detail
        .get("output")
        .and_then(serde_json::Value::as_str)
        .and_then(|output| output.trim_end().lines().last())
        .map(|line| line.trim_end().ends_with('?'))
        .unwrap_or(false)
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn exit_code_three_is_clarification() {
        let blob = ErrorBlob::with_detail("job failed", json!({"exit_code": 3}));
        let classified = classify_job_failure(blob);
        assert_eq!(classified.message, "clarification needed");
        assert_eq!(classified.detail["original"]["message"], "job failed");
    }

    #[test]
    fn trailing_question_is_clarification() {
        let blob = ErrorBlob::with_detail(
            "job failed",
            json!({"exit_code": 1, "output": "I made the edit.\nShould I also update the docs?\n"}),
        );
        assert_eq!(classify_job_failure(blob).message, "clarification needed");
    }

    #[test]
    fn ordinary_failures_pass_through() {
        let blob = ErrorBlob::with_detail(
            "job failed",
            json!({"exit_code": 1, "output": "error: tests failed"}),
        );
        let classified = classify_job_failure(blob.clone());
        assert_eq!(classified, blob);
    }

    #[test]
    fn failures_without_detail_pass_through() {
        let blob = ErrorBlob::new("sandbox died");
        assert_eq!(classify_job_failure(blob.clone()), blob);
    }
}
