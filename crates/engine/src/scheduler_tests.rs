// SPDX-License-Identifier: BUSL-1.1
// Copyright (c) 2026 Alfred Jean LLC

use super::*;
use pp_core::test_support::job_spec;
use pp_core::WorkerId;
use yare::parameterized;

#[parameterized(
    head_of_line = { 1, Priority::Interactive, 0 },
    second_interactive = { 2, Priority::Interactive, 20_000 },
    third_normal = { 3, Priority::Normal, 180_000 },
    second_background = { 2, Priority::Background, 240_000 },
)]
fn eta_scales_with_position(position: u64, priority: Priority, expected: u64) {
    assert_eq!(eta_for_position(position, priority), expected);
}

#[test]
fn eta_position_zero_clamps() {
    assert_eq!(eta_for_position(0, Priority::Normal), 0);
}

#[test]
fn stats_snapshot_covers_all_queues() {
    let mut store = Store::open_in_memory().unwrap();
    store.enqueue_job(&job_spec("s1"), 1_000).unwrap();
    store.enqueue_job(&job_spec("s1"), 1_001).unwrap();
    store.claim(QueueName::Jobs, &WorkerId::parse("w1").unwrap(), 2_000).unwrap().unwrap();
    store.enqueue_merge_job("origin", "b1", "aaa", 0, 3, 1_000).unwrap();

    let stats = StatsSnapshot::read(&store).unwrap();
    assert_eq!(stats.jobs.counts.pending, 1);
    assert_eq!(stats.jobs.counts.claimed, 1);
    assert_eq!(stats.jobs.by_priority.normal, 2);
    assert_eq!(stats.merge.pending, 1);
    assert_eq!(stats.requests.counts.pending, 0);
}
