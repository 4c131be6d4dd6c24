// SPDX-License-Identifier: BUSL-1.1
// Copyright (c) 2026 Alfred Jean LLC

//! Queue engine specs: claim invariants under concurrency, idempotent
//! enqueue, priority ordering.

use crate::prelude::*;
use parking_lot::Mutex;
use pp_core::{Priority, QueueItemStatus, QueueName, WorkerId};
use pp_storage::Store;
use std::sync::Arc;

// ── S5: priority respected ───────────────────────────────────────────────────

#[test]
fn single_worker_claims_in_priority_order() {
    let mut store = Store::open_in_memory().unwrap();
    store.enqueue_job(&job_spec_at("s", Priority::Normal), 1_000).unwrap();
    store.enqueue_job(&job_spec_at("s", Priority::Background), 1_001).unwrap();
    store.enqueue_job(&job_spec_at("s", Priority::Interactive), 1_002).unwrap();

    let worker = WorkerId::parse("w").unwrap();
    let mut order = Vec::new();
    for t in 0..3 {
        let claimed = store.claim(QueueName::Jobs, &worker, 2_000 + t).unwrap().unwrap();
        order.push(claimed.item.priority);
        store.complete(&claimed.item.id, serde_json::Value::Null, 3_000 + t).unwrap();
    }
    assert_eq!(order, vec![Priority::Interactive, Priority::Normal, Priority::Background]);
}

// ── P4: idempotent enqueue ───────────────────────────────────────────────────

#[test]
fn double_enqueue_yields_one_item_with_shared_id() {
    let mut store = Store::open_in_memory().unwrap();
    let spec = completion_spec("s", "w1", "job-1", "abc123");
    let a = store.enqueue_completion(&spec, 1_000).unwrap();
    let b = store.enqueue_completion(&spec, 1_001).unwrap();
    assert_eq!(a.id, b.id);
    let counts = store.counts_by_status(QueueName::Completions).unwrap();
    assert_eq!(
        counts.pending + counts.claimed + counts.completed + counts.failed + counts.skipped,
        1
    );
}

// ── P1: at-most-one claim ────────────────────────────────────────────────────

#[test]
fn concurrent_claims_never_double_assign() {
    let dir = tempfile::tempdir().unwrap();
    let store = Arc::new(Mutex::new(Store::open(&dir.path().join("q.db")).unwrap()));
    {
        let mut store = store.lock();
        for i in 0..8 {
            store.enqueue_job(&job_spec("s"), 1_000 + i).unwrap();
        }
    }

    // 16 workers race; each loops claims without completing.
    let mut handles = Vec::new();
    for w in 0..16 {
        let store = Arc::clone(&store);
        handles.push(std::thread::spawn(move || {
            let worker = WorkerId::parse(format!("w{w}")).unwrap();
            let mut claimed = Vec::new();
            for round in 0..4 {
                if let Some(c) =
                    store.lock().claim(QueueName::Jobs, &worker, 2_000 + round).unwrap()
                {
                    claimed.push(c.item.id);
                }
            }
            (worker, claimed)
        }));
    }

    let mut all_claimed = Vec::new();
    for handle in handles {
        let (worker, claimed) = handle.join().unwrap();
        // Per worker: at most one claim despite four attempts
        assert!(claimed.len() <= 1, "{worker} double-claimed: {claimed:?}");
        all_claimed.extend(claimed);
    }

    // No item was handed to two workers
    let mut deduped = all_claimed.clone();
    deduped.sort();
    deduped.dedup();
    assert_eq!(deduped.len(), all_claimed.len(), "an item was claimed twice");

    // Queue-level accounting agrees
    let counts = store.lock().counts_by_status(QueueName::Jobs).unwrap();
    assert_eq!(counts.claimed as usize, all_claimed.len());
}

#[test]
fn merge_queue_is_globally_serial_under_racing_claimants() {
    let dir = tempfile::tempdir().unwrap();
    let store = Arc::new(Mutex::new(Store::open(&dir.path().join("m.db")).unwrap()));
    {
        let mut store = store.lock();
        for i in 0..6 {
            store
                .enqueue_merge_job("origin", &format!("b{i}"), &format!("sha{i}"), 0, 3, 1_000)
                .unwrap();
        }
    }

    let mut handles = Vec::new();
    for p in 0..8 {
        let store = Arc::clone(&store);
        handles.push(std::thread::spawn(move || {
            store.lock().claim_merge_job(&format!("pusher-{p}"), 2_000).unwrap()
        }));
    }
    let wins: Vec<_> = handles
        .into_iter()
        .filter_map(|h| h.join().unwrap())
        .collect();
    assert_eq!(wins.len(), 1, "merge queue handed out more than one claim");
    assert_eq!(store.lock().merge_counts().unwrap().claimed, 1);
}

// ── Attempts accounting ──────────────────────────────────────────────────────

#[test]
fn crash_mid_run_counts_as_one_attempt() {
    let mut store = Store::open_in_memory().unwrap();
    let mut spec = job_spec("s");
    spec.max_attempts = 2;
    store.enqueue_job(&spec, 1_000).unwrap();
    let worker = WorkerId::parse("w").unwrap();

    // Attempt 1: claim then "crash" (fail via watchdog-style auto-fail)
    let first = store.claim(QueueName::Jobs, &worker, 2_000).unwrap().unwrap();
    assert_eq!(first.item.attempts, 1);
    store.fail(&first.item.id, &pp_core::ErrorBlob::new("crashed"), 3_000).unwrap();
    assert!(store.requeue(&first.item.id, 4_000).unwrap());

    // Attempt 2: claim again, fail again → attempts exhausted, no requeue
    let second = store.claim(QueueName::Jobs, &worker, 5_000).unwrap().unwrap();
    assert_eq!(second.item.attempts, 2);
    store.fail(&second.item.id, &pp_core::ErrorBlob::new("crashed again"), 6_000).unwrap();
    assert!(!store.requeue(&second.item.id, 7_000).unwrap());

    let item = store.get_item(&second.item.id).unwrap().unwrap();
    assert_eq!(item.status, QueueItemStatus::Failed);
}
