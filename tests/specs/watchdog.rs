// SPDX-License-Identifier: BUSL-1.1
// Copyright (c) 2026 Alfred Jean LLC

//! Stale-claim recovery specs (S4 and the soundness property).

use crate::prelude::*;
use pp_core::{QueueItemStatus, QueueName, WorkerId, WorkerStatus};
use pp_engine::WatchdogConfig;
use pp_storage::Store;

const TTL: u64 = 90_000;

fn watchdog() -> WatchdogConfig {
    WatchdogConfig { claim_ttl_ms: TTL, heartbeat_ttl_ms: 15_000, limit: 500 }
}

// ── S4: stale claim recovered ────────────────────────────────────────────────

#[test]
fn suppressed_heartbeats_and_no_output_recover_exactly_one_job() {
    let mut store = Store::open_in_memory().unwrap();
    store.enqueue_job(&job_spec("s"), 1_000_000).unwrap();
    let worker = WorkerId::parse("w").unwrap();
    let claimed = store.claim(QueueName::Jobs, &worker, 1_000_000).unwrap().unwrap();

    // TTL + 1s of total silence
    let recovered = watchdog().sweep(&mut store, 1_000_000 + TTL + 1_000).unwrap();

    assert_eq!(recovered.len(), 1);
    let item = store.get_item(&claimed.item.id).unwrap().unwrap();
    assert_eq!(item.status, QueueItemStatus::Failed);
    let message = item.error.unwrap().message;
    assert!(
        message.contains("auto-failed after stale worker claim"),
        "unexpected message: {message}"
    );
}

// ── P5: soundness — active workers are never recovered ───────────────────────

#[test]
fn heartbeating_worker_with_fresh_output_is_never_recovered() {
    let mut store = Store::open_in_memory().unwrap();
    store.enqueue_job(&job_spec("s"), 1_000_000).unwrap();
    let worker = WorkerId::parse("w").unwrap();
    let claimed = store.claim(QueueName::Jobs, &worker, 1_000_000).unwrap().unwrap();

    // Worker stays chatty: heartbeat + log line every 30s for ten minutes
    let mut now = 1_000_000;
    for _ in 0..20 {
        now += 30_000;
        store
            .heartbeat(&worker, WorkerStatus::Busy, Some(&claimed.item.id), None, now)
            .unwrap();
        store.append_job_log(&claimed.item.id, "progress", now).unwrap();
        assert!(
            watchdog().sweep(&mut store, now).unwrap().is_empty(),
            "active job recovered at t={now}"
        );
    }
    let item = store.get_item(&claimed.item.id).unwrap().unwrap();
    assert_eq!(item.status, QueueItemStatus::Claimed);
}

#[test]
fn recovered_job_is_claimable_again_after_requeue() {
    let mut store = Store::open_in_memory().unwrap();
    store.enqueue_job(&job_spec("s"), 1_000_000).unwrap();
    let dead = WorkerId::parse("dead-worker").unwrap();
    let claimed = store.claim(QueueName::Jobs, &dead, 1_000_000).unwrap().unwrap();

    watchdog().sweep(&mut store, 1_000_000 + TTL * 2).unwrap();
    assert!(store.requeue(&claimed.item.id, 1_000_000 + TTL * 2 + 1).unwrap());

    let fresh = WorkerId::parse("fresh-worker").unwrap();
    let reclaimed = store
        .claim(QueueName::Jobs, &fresh, 1_000_000 + TTL * 2 + 2)
        .unwrap()
        .unwrap();
    assert_eq!(reclaimed.item.id, claimed.item.id);
    assert_eq!(reclaimed.item.attempts, 2);
}

#[test]
fn timeout_classification_counts_recovered_jobs() {
    let mut store = Store::open_in_memory().unwrap();
    store.enqueue_job(&job_spec("s"), 1_000_000).unwrap();
    let worker = WorkerId::parse("w").unwrap();
    store.claim(QueueName::Jobs, &worker, 1_000_000).unwrap().unwrap();
    watchdog().sweep(&mut store, 1_000_000 + TTL * 2).unwrap();

    let rows = store.slo_rows(QueueName::Jobs, 0).unwrap();
    let summary = pp_engine::summarize(&rows, 24);
    assert_eq!(summary.failed, 1);
    assert_eq!(summary.timeout_failed, 1, "stale-claim recovery must count as timeout");
}
