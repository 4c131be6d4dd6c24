// SPDX-License-Identifier: BUSL-1.1
// Copyright (c) 2026 Alfred Jean LLC

use super::*;
use pp_core::test_support::job_spec;
use pp_core::{Budgets, QueueItemStatus, WorkerId};

fn config() -> WatchdogConfig {
    WatchdogConfig { claim_ttl_ms: 90_000, heartbeat_ttl_ms: 15_000, limit: 500 }
}

fn claim_one(store: &mut Store, worker: &str, now_ms: u64) -> String {
    store.enqueue_job(&job_spec("s1"), now_ms).unwrap();
    store
        .claim(QueueName::Jobs, &WorkerId::parse(worker).unwrap(), now_ms)
        .unwrap()
        .unwrap()
        .item
        .id
}

// ── Staleness ────────────────────────────────────────────────────────────────

#[test]
fn silent_claim_past_ttl_is_recovered() {
    let mut store = Store::open_in_memory().unwrap();
    let job_id = claim_one(&mut store, "w1", 1_000_000);

    // No heartbeat, no log output, TTL + 1s of silence
    let recovered = config().sweep(&mut store, 1_000_000 + 91_000).unwrap();
    assert_eq!(recovered.len(), 1);
    assert_eq!(recovered[0].job_id, job_id);
    assert_eq!(recovered[0].error.message, "auto-failed after stale worker claim");

    let item = store.get_item(&job_id).unwrap().unwrap();
    assert_eq!(item.status, QueueItemStatus::Failed);
    assert!(item.error.unwrap().message.contains("auto-failed after stale worker claim"));
}

#[test]
fn fresh_claim_is_left_alone() {
    let mut store = Store::open_in_memory().unwrap();
    claim_one(&mut store, "w1", 1_000_000);
    let recovered = config().sweep(&mut store, 1_000_000 + 89_000).unwrap();
    assert!(recovered.is_empty());
}

#[test]
fn recent_log_output_resets_staleness() {
    let mut store = Store::open_in_memory().unwrap();
    let job_id = claim_one(&mut store, "w1", 1_000_000);
    store.append_job_log(&job_id, "still compiling", 1_060_000).unwrap();

    // 91s after claim, but only 31s after the last log line
    let recovered = config().sweep(&mut store, 1_091_000).unwrap();
    assert!(recovered.is_empty());
}

// ── Activity-aware grace ─────────────────────────────────────────────────────

#[test]
fn busy_heartbeating_worker_earns_grace() {
    let mut store = Store::open_in_memory().unwrap();
    let mut spec = job_spec("s1");
    spec.budgets = Some(Budgets { queue_wait_ms: 0, execution_ms: 120_000, finalization_ms: 30_000 });
    store.enqueue_job(&spec, 1_000_000).unwrap();
    let worker = WorkerId::parse("w1").unwrap();
    let job_id =
        store.claim(QueueName::Jobs, &worker, 1_000_000).unwrap().unwrap().item.id;

    let now = 1_000_000 + 100_000; // quiet past TTL (90s) but within TTL+grace (150s)
    store
        .heartbeat(&worker, pp_core::WorkerStatus::Busy, Some(&job_id), None, now - 5_000)
        .unwrap();
    assert!(config().sweep(&mut store, now).unwrap().is_empty());

    // Past TTL + grace the claim is recovered despite the live heartbeat
    let later = 1_000_000 + 241_000;
    store
        .heartbeat(&worker, pp_core::WorkerStatus::Busy, Some(&job_id), None, later - 5_000)
        .unwrap();
    let recovered = config().sweep(&mut store, later).unwrap();
    assert_eq!(recovered.len(), 1);
}

#[test]
fn grace_is_capped_at_five_ttls() {
    let mut store = Store::open_in_memory().unwrap();
    let mut spec = job_spec("s1");
    // Budgets far beyond the cap
    spec.budgets = Some(Budgets {
        queue_wait_ms: 0,
        execution_ms: 24 * 3_600_000,
        finalization_ms: 3_600_000,
    });
    store.enqueue_job(&spec, 1_000_000).unwrap();
    let worker = WorkerId::parse("w1").unwrap();
    let job_id =
        store.claim(QueueName::Jobs, &worker, 1_000_000).unwrap().unwrap().item.id;

    // Quiet for TTL + 5×TTL + 1s: cap applies, claim recovered
    let now = 1_000_000 + 90_000 + 450_000 + 1_000;
    store
        .heartbeat(&worker, pp_core::WorkerStatus::Busy, Some(&job_id), None, now - 1_000)
        .unwrap();
    assert_eq!(config().sweep(&mut store, now).unwrap().len(), 1);
}

#[test]
fn grace_requires_busy_on_this_exact_job() {
    let mut store = Store::open_in_memory().unwrap();
    let job_id = claim_one(&mut store, "w1", 1_000_000);
    let worker = WorkerId::parse("w1").unwrap();

    // Heartbeating but busy on a different job: no grace
    let now = 1_000_000 + 100_000;
    store
        .heartbeat(&worker, pp_core::WorkerStatus::Busy, Some("job-other"), None, now - 1_000)
        .unwrap();
    let recovered = config().sweep(&mut store, now).unwrap();
    assert_eq!(recovered.len(), 1);
    assert_eq!(recovered[0].job_id, job_id);
}

// ── Worker bookkeeping ───────────────────────────────────────────────────────

#[test]
fn dead_worker_marked_offline_and_job_pointer_cleared() {
    let mut store = Store::open_in_memory().unwrap();
    let job_id = claim_one(&mut store, "w1", 1_000_000);

    config().sweep(&mut store, 1_200_000).unwrap();

    let record = store.get_worker("w1").unwrap().unwrap();
    assert_eq!(record.status, pp_core::WorkerStatus::Offline);
    assert!(record.current_job_id.is_none());
    let _ = job_id;
}

#[test]
fn live_but_wedged_worker_marked_error() {
    let mut store = Store::open_in_memory().unwrap();
    let job_id = claim_one(&mut store, "w1", 1_000_000);
    let worker = WorkerId::parse("w1").unwrap();

    // Heartbeating within TTL but idle (not busy on the job): no grace,
    // claim recovered, worker flagged error rather than offline.
    let now = 1_000_000 + 100_000;
    store
        .heartbeat(&worker, pp_core::WorkerStatus::Idle, None, None, now - 2_000)
        .unwrap();
    let recovered = config().sweep(&mut store, now).unwrap();
    assert_eq!(recovered.len(), 1);
    assert_eq!(recovered[0].job_id, job_id);
    assert_eq!(store.get_worker("w1").unwrap().unwrap().status, pp_core::WorkerStatus::Error);
}

#[test]
fn sweep_respects_limit() {
    let mut store = Store::open_in_memory().unwrap();
    for i in 0..5 {
        store.enqueue_job(&job_spec("s1"), 1_000_000).unwrap();
        let worker = WorkerId::parse(format!("w{i}")).unwrap();
        store.claim(QueueName::Jobs, &worker, 1_000_000).unwrap().unwrap();
    }
    let cfg = WatchdogConfig { limit: 2, ..config() };
    assert_eq!(cfg.sweep(&mut store, 2_000_000).unwrap().len(), 2);
    // Second sweep picks up the rest
    assert_eq!(cfg.sweep(&mut store, 2_000_000).unwrap().len(), 2);
    assert_eq!(cfg.sweep(&mut store, 2_000_000).unwrap().len(), 1);
}
