// SPDX-License-Identifier: BUSL-1.1
// Copyright (c) 2026 Alfred Jean LLC

use super::*;
use serde_json::json;

#[test]
fn job_id_has_prefix_and_fixed_length() {
    let id = JobId::generate();
    assert!(id.as_str().starts_with("job-"));
    assert_eq!(id.as_str().len(), 23);
}

#[test]
fn job_id_serde_is_transparent() {
    let id = JobId::from_string("job-abc");
    assert_eq!(serde_json::to_string(&id).unwrap(), "\"job-abc\"");
}

#[test]
fn payload_kind_tag_round_trips() {
    let payload = JobPayload::Edit { instruction: "fix the bug".into(), base_branch: None };
    let json = serde_json::to_value(&payload).unwrap();
    assert_eq!(json, json!({"kind": "edit", "instruction": "fix the bug"}));

    let parsed: JobPayload = serde_json::from_value(json).unwrap();
    assert_eq!(parsed, payload);
}

#[test]
fn unknown_kind_is_rejected_at_parse() {
    let result: Result<JobPayload, _> =
        serde_json::from_value(json!({"kind": "deploy", "target": "prod"}));
    assert!(result.is_err());
}

#[test]
fn payload_validation_requires_instruction() {
    let payload = JobPayload::Edit { instruction: "  ".into(), base_branch: None };
    assert!(matches!(payload.validate(), Err(CoreError::Validation(_))));

    let payload = JobPayload::Command { command: "cargo test".into() };
    assert!(payload.validate().is_ok());
}

#[test]
fn spec_defaults() {
    let spec = JobSpec::new(
        SessionId::test("s1"),
        JobPayload::Command { command: "true".into() },
    );
    assert_eq!(spec.priority, Priority::Normal);
    assert_eq!(spec.max_attempts, 3);
    assert_eq!(spec.effective_budgets(), Priority::Normal.default_budgets());
}

#[test]
fn spec_budget_override_wins() {
    let budgets = Budgets { queue_wait_ms: 1, execution_ms: 2, finalization_ms: 3 };
    let spec = JobSpec::new(
        SessionId::test("s1"),
        JobPayload::Command { command: "true".into() },
    )
    .budgets(budgets);
    assert_eq!(spec.effective_budgets(), budgets);
}

#[test]
fn spec_rejects_zero_max_attempts() {
    let spec = JobSpec::new(
        SessionId::test("s1"),
        JobPayload::Command { command: "true".into() },
    )
    .max_attempts(0);
    assert!(spec.validate().is_err());
}

#[test]
fn request_spec_requires_text() {
    let spec = RequestSpec { session_id: SessionId::test("s1"), text: "\n".into() };
    assert!(spec.validate().is_err());
    let spec = RequestSpec { session_id: SessionId::test("s1"), text: "add tests".into() };
    assert!(spec.validate().is_ok());
}
