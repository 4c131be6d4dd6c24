// SPDX-License-Identifier: BUSL-1.1
// Copyright (c) 2026 Alfred Jean LLC

//! Merge daemon end-to-end specs against real repositories.

use crate::prelude::*;
use pp_pusher::PusherDaemon;
use serial_test::serial;

// ── S1: clean merge ──────────────────────────────────────────────────────────

#[tokio::test]
#[serial]
async fn clean_merge_lands_with_branch_as_second_parent() {
    let fx = GitFixture::new();
    let base = fx.remote_main_sha();
    let sha = fx.publish("refs/pushpals/agent/w1/job-1", "feature.txt", "work\n");

    let mut daemon = PusherDaemon::start(fx.pusher_config()).unwrap();
    daemon.tick().await.unwrap();

    let new_main = fx.remote_main_sha();
    assert_ne!(new_main, base, "integration branch did not advance");
    assert_eq!(git(&fx.work, &["rev-parse", &format!("{new_main}^1")]), base);
    assert_eq!(git(&fx.work, &["rev-parse", &format!("{new_main}^2")]), sha);

    let counts = daemon.store_mut().merge_counts().unwrap();
    assert_eq!(counts.completed, 1);

    // Temp branch gone
    let stray = git(&fx.work, &["branch", "--list", "_merge/*"]);
    assert!(stray.is_empty(), "temp branch survived: {stray}");
}

// ── S2: deterministic conflict ───────────────────────────────────────────────

#[tokio::test]
#[serial]
async fn deterministic_conflict_fails_once_and_stays_failed() {
    let fx = GitFixture::new();
    fx.publish("refs/pushpals/agent/w1/job-1", "README.md", "agent version\n");
    fx.advance_remote_main("README.md", "mainline version\n");
    let base = fx.remote_main_sha();

    let mut daemon = PusherDaemon::start(fx.pusher_config()).unwrap();
    daemon.tick().await.unwrap();

    let counts = daemon.store_mut().merge_counts().unwrap();
    assert_eq!(counts.failed, 1, "conflict should fail, counts: {counts:?}");
    assert_eq!(counts.pending, 0, "deterministic conflict must not requeue");

    // attempts == 1, main untouched (P6)
    assert_eq!(fx.remote_main_sha(), base);

    // Further ticks do not resurrect the job
    daemon.tick().await.unwrap();
    assert_eq!(daemon.store_mut().merge_counts().unwrap().failed, 1);
}

// ── Check failures requeue then land ─────────────────────────────────────────

#[tokio::test]
#[serial]
async fn failing_check_requeues_and_later_pass_lands() {
    let fx = GitFixture::new();
    fx.publish("refs/pushpals/agent/w1/job-1", "feature.txt", "work\n");

    let gate = fx.tmp.path().join("gate");
    let mut config = fx.pusher_config();
    config.checks = vec![format!("test -f {}", gate.display())];

    let mut daemon = PusherDaemon::start(config).unwrap();

    // Gate file missing: check fails, job requeued with attempts preserved
    daemon.tick().await.unwrap();
    let counts = daemon.store_mut().merge_counts().unwrap();
    assert_eq!(counts.pending, 1);
    assert_eq!(counts.completed, 0);

    // Gate satisfied: next tick merges
    std::fs::write(&gate, "open\n").unwrap();
    daemon.tick().await.unwrap();
    assert_eq!(daemon.store_mut().merge_counts().unwrap().completed, 1);
}

#[tokio::test]
#[serial]
async fn exhausted_check_failures_end_in_skipped() {
    let fx = GitFixture::new();
    fx.publish("refs/pushpals/agent/w1/job-1", "feature.txt", "work\n");

    let mut config = fx.pusher_config();
    config.checks = vec!["false".into()];
    config.max_attempts = 2;
    let base = fx.remote_main_sha();

    let mut daemon = PusherDaemon::start(config).unwrap();
    for _ in 0..4 {
        daemon.tick().await.unwrap();
    }

    let counts = daemon.store_mut().merge_counts().unwrap();
    assert_eq!(counts.skipped, 1, "attempts must cap in skipped, counts: {counts:?}");
    assert_eq!(counts.pending, 0);
    assert_eq!(fx.remote_main_sha(), base);
}

// ── Stale job validation ─────────────────────────────────────────────────────

#[tokio::test]
#[serial]
async fn advanced_branch_skips_and_newer_pin_merges() {
    let fx = GitFixture::new();
    let old = fx.publish("refs/pushpals/agent/w1/job-1", "v.txt", "v1\n");

    let mut daemon = PusherDaemon::start(fx.pusher_config()).unwrap();
    // The old pin is already queued (as a server-claim source would have
    // done) when the branch advances underneath it.
    daemon
        .store_mut()
        .enqueue_merge_job("origin", "refs/pushpals/agent/w1/job-1", &old, 0, 3, 1_000)
        .unwrap();
    fx.publish("refs/pushpals/agent/w1/job-1", "v.txt", "v2\n");

    // First tick runs the stale pin (skips as branch-advanced) and
    // discovers the new one; second tick merges it.
    daemon.tick().await.unwrap();
    daemon.tick().await.unwrap();

    let counts = daemon.store_mut().merge_counts().unwrap();
    assert_eq!(counts.completed, 1);
    assert_eq!(counts.skipped, 1);

    git(&fx.work, &["fetch", "--quiet", "origin"]);
    git(&fx.work, &["reset", "--quiet", "--hard", "origin/main"]);
    assert_eq!(std::fs::read_to_string(fx.work.join("v.txt")).unwrap(), "v2\n");
}

// ── P6: terminal transition leaves main advanced or untouched ────────────────

#[tokio::test]
#[serial]
async fn every_terminal_outcome_leaves_main_consistent() {
    let fx = GitFixture::new();
    // One mergeable branch, one conflicting branch
    fx.publish("refs/pushpals/agent/w1/ok", "ok.txt", "ok\n");
    fx.publish("refs/pushpals/agent/w2/conflict", "README.md", "conflict version\n");
    fx.advance_remote_main("README.md", "winner version\n");

    let mut daemon = PusherDaemon::start(fx.pusher_config()).unwrap();
    let before = fx.remote_main_sha();
    for _ in 0..4 {
        daemon.tick().await.unwrap();
    }
    let after = fx.remote_main_sha();

    let counts = daemon.store_mut().merge_counts().unwrap();
    assert_eq!(counts.completed, 1);
    assert_eq!(counts.failed, 1);
    // main advanced exactly by the successful merge
    assert_ne!(after, before);
    assert_eq!(git(&fx.work, &["rev-parse", &format!("{after}^1")]), before);
}

// ── Dedup across restarts ────────────────────────────────────────────────────

#[tokio::test]
#[serial]
async fn restart_does_not_replay_completed_jobs() {
    let fx = GitFixture::new();
    fx.publish("refs/pushpals/agent/w1/job-1", "one.txt", "1\n");

    let config = fx.pusher_config();
    {
        let mut daemon = PusherDaemon::start(config.clone()).unwrap();
        daemon.tick().await.unwrap();
        assert_eq!(daemon.store_mut().merge_counts().unwrap().completed, 1);
    }

    // Same state dir: the seen table and unique key suppress re-enqueue
    let mut daemon = PusherDaemon::start(config).unwrap();
    daemon.tick().await.unwrap();
    let counts = daemon.store_mut().merge_counts().unwrap();
    assert_eq!(counts.completed, 1);
    assert_eq!(counts.pending, 0);
}

#[tokio::test]
#[serial]
async fn skipped_statuses_are_terminal_in_the_store() {
    let fx = GitFixture::new();
    let sha = fx.publish("refs/pushpals/agent/w1/job-1", "gone.txt", "g\n");
    git(&fx.work, &["push", "--quiet", "origin", "--delete", "refs/pushpals/agent/w1/job-1"]);

    let mut daemon = PusherDaemon::start(fx.pusher_config()).unwrap();
    // Seen table was never populated (branch vanished before a scan), so
    // enqueue manually at the pinned sha, as a server-claim source would.
    daemon
        .store_mut()
        .enqueue_merge_job("origin", "refs/pushpals/agent/w1/job-1", &sha, 0, 3, 1_000)
        .unwrap();
    daemon.tick().await.unwrap();

    let counts = daemon.store_mut().merge_counts().unwrap();
    assert_eq!(counts.skipped, 1);
    assert_eq!(counts.pending + counts.claimed, 0);
}
