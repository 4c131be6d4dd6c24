// SPDX-License-Identifier: BUSL-1.1
// Copyright (c) 2026 Alfred Jean LLC

use super::*;

#[test]
fn worker_id_trims_whitespace() {
    assert_eq!(WorkerId::parse("  w1  ").unwrap().as_str(), "w1");
}

#[test]
fn worker_id_rejects_empty() {
    assert!(WorkerId::parse("").is_err());
    assert!(WorkerId::parse("   ").is_err());
}

#[test]
fn online_boundary_is_inclusive() {
    let record = WorkerRecord::builder().last_heartbeat_ms(1_000_000).build();
    assert!(record.online(1_000_000 + WORKER_ONLINE_TTL_MS, WORKER_ONLINE_TTL_MS));
    assert!(!record.online(1_000_001 + WORKER_ONLINE_TTL_MS, WORKER_ONLINE_TTL_MS));
}

#[test]
fn online_tolerates_clock_skew() {
    // Heartbeat stamped slightly in the future must not underflow.
    let record = WorkerRecord::builder().last_heartbeat_ms(2_000_000).build();
    assert!(record.online(1_999_000, 15_000));
}

#[test]
fn busy_on_requires_matching_job_and_fresh_heartbeat() {
    let record = WorkerRecord::builder()
        .status(WorkerStatus::Busy)
        .current_job_id("job-1")
        .last_heartbeat_ms(1_000_000)
        .build();

    assert!(record.busy_on("job-1", 1_005_000, 15_000));
    assert!(!record.busy_on("job-2", 1_005_000, 15_000));
    assert!(!record.busy_on("job-1", 1_020_001, 15_000));

    let idle = WorkerRecord::builder()
        .status(WorkerStatus::Idle)
        .current_job_id("job-1")
        .last_heartbeat_ms(1_000_000)
        .build();
    assert!(!idle.busy_on("job-1", 1_005_000, 15_000));
}

#[test]
fn status_parse_round_trips() {
    for status in
        [WorkerStatus::Idle, WorkerStatus::Busy, WorkerStatus::Error, WorkerStatus::Offline]
    {
        assert_eq!(WorkerStatus::parse(status.as_str()), Some(status));
    }
    assert_eq!(WorkerStatus::parse("zombie"), None);
}
