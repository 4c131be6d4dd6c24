// SPDX-License-Identifier: BUSL-1.1
// Copyright (c) 2026 Alfred Jean LLC

use super::*;
use crate::config::SourceMode;
use pp_git::Repo;
use std::path::{Path, PathBuf};
use std::process::Command as StdCommand;
use std::time::Duration;
use tempfile::TempDir;

struct Fixture {
    _tmp: TempDir,
    work: PathBuf,
    repo: Repo,
}

fn git(dir: &Path, args: &[&str]) -> String {
    let out = StdCommand::new("git")
        .args(args)
        .current_dir(dir)
        .output()
        .unwrap_or_else(|e| panic!("git {args:?}: {e}"));
    assert!(
        out.status.success(),
        "git {args:?} failed: {}",
        String::from_utf8_lossy(&out.stderr)
    );
    String::from_utf8_lossy(&out.stdout).trim().to_string()
}

/// Bare remote + working clone with one commit pushed to `main`.
fn fixture() -> Fixture {
    let tmp = TempDir::new().unwrap();
    let remote = tmp.path().join("remote.git");
    std::fs::create_dir(&remote).unwrap();
    git(&remote, &["init", "--quiet", "--bare", "-b", "main"]);

    let work = tmp.path().join("work");
    git(tmp.path(), &["clone", "--quiet", remote.to_str().unwrap(), "work"]);
    git(&work, &["config", "user.email", "pusher@example.com"]);
    git(&work, &["config", "user.name", "Pusher"]);
    git(&work, &["symbolic-ref", "HEAD", "refs/heads/main"]);
    std::fs::write(work.join("README.md"), "base\n").unwrap();
    git(&work, &["add", "."]);
    git(&work, &["commit", "--quiet", "-m", "init"]);
    git(&work, &["push", "--quiet", "origin", "main"]);

    let repo = Repo::new(&work, Duration::from_secs(30));
    Fixture { _tmp: tmp, work, repo }
}

impl Fixture {
    fn config(&self) -> PusherConfig {
        PusherConfig {
            repo_path: self.work.clone(),
            remote: "origin".into(),
            main_branch: "main".into(),
            branch_prefix: "refs/heads/agent/".into(),
            merge_strategy: pp_core::MergeStrategy::NoFf,
            checks: vec![],
            check_timeout: Duration::from_secs(30),
            git_timeout: Duration::from_secs(30),
            interval: Duration::from_secs(1),
            state_dir: self.work.join(".pusher"),
            max_attempts: 3,
            delete_after_merge: false,
            push_main_after_merge: true,
            push_agent_branch: false,
            dry_run: false,
            skip_clean_check: false,
            auto_create_main_branch: false,
            isolate_worktree: false,
            source: SourceMode::RemoteScan,
            server_url: None,
            auth_token: None,
        }
    }

    fn pipeline(&self, config: PusherConfig) -> Pipeline {
        Pipeline::new(self.repo.clone(), config)
    }

    /// Commit a file on a throwaway branch off main and publish it.
    fn publish_branch(&self, branch: &str, file: &str, contents: &str) -> String {
        git(&self.work, &["checkout", "--quiet", "-b", "_pub", "main"]);
        std::fs::write(self.work.join(file), contents).unwrap();
        git(&self.work, &["add", "."]);
        git(&self.work, &["commit", "--quiet", "-m", &format!("publish {branch}")]);
        let sha = git(&self.work, &["rev-parse", "HEAD"]);
        git(&self.work, &["push", "--quiet", "origin", &format!("HEAD:refs/heads/{branch}")]);
        git(&self.work, &["checkout", "--quiet", "main"]);
        git(&self.work, &["branch", "--quiet", "-D", "_pub"]);
        sha
    }

    /// Advance remote main directly (another writer landing work).
    fn advance_remote_main(&self, file: &str, contents: &str) -> String {
        git(&self.work, &["checkout", "--quiet", "main"]);
        std::fs::write(self.work.join(file), contents).unwrap();
        git(&self.work, &["add", "."]);
        git(&self.work, &["commit", "--quiet", "-m", "other writer"]);
        let sha = git(&self.work, &["rev-parse", "HEAD"]);
        git(&self.work, &["push", "--quiet", "origin", "main"]);
        sha
    }

    fn remote_main_sha(&self) -> String {
        git(&self.work, &["fetch", "--quiet", "origin"]);
        git(&self.work, &["rev-parse", "origin/main"])
    }

    fn job(&self, branch: &str, sha: &str) -> pp_core::MergeJob {
        pp_core::MergeJob::builder().remote("origin").branch(branch).head_sha(sha).build()
    }
}

// ── Clean merge (S1) ─────────────────────────────────────────────────────────

#[tokio::test]
async fn clean_merge_advances_main_with_merge_commit() {
    let fx = fixture();
    let sha = fx.publish_branch("agent/w1/job-1", "feature.txt", "work\n");
    let base = fx.remote_main_sha();

    let outcome = fx.pipeline(fx.config()).run(&fx.job("agent/w1/job-1", &sha)).await.unwrap();

    let MergeOutcome::Merged { new_head } = outcome else {
        panic!("expected merge, got {outcome:?}");
    };
    // no-ff merge commit: first parent old main, second parent the branch tip
    assert_eq!(git(&fx.work, &["rev-parse", &format!("{new_head}^1")]), base);
    assert_eq!(git(&fx.work, &["rev-parse", &format!("{new_head}^2")]), sha);
    // pushed to the remote
    assert_eq!(fx.remote_main_sha(), new_head);
    // temp branch cleaned up
    let branches = git(&fx.work, &["branch", "--list", "_merge/*"]);
    assert!(branches.is_empty(), "temp branch left behind: {branches}");
}

#[tokio::test]
async fn ff_only_strategy_fast_forwards() {
    let fx = fixture();
    let sha = fx.publish_branch("agent/w1/job-2", "ff.txt", "ff\n");
    let mut config = fx.config();
    config.merge_strategy = pp_core::MergeStrategy::FfOnly;

    let outcome = fx.pipeline(config).run(&fx.job("agent/w1/job-2", &sha)).await.unwrap();
    let MergeOutcome::Merged { new_head } = outcome else {
        panic!("expected merge, got {outcome:?}");
    };
    assert_eq!(new_head, sha);
}

#[tokio::test]
async fn without_push_flag_the_merge_stays_local() {
    let fx = fixture();
    let sha = fx.publish_branch("agent/w1/job-15", "local.txt", "l\n");
    let base = fx.remote_main_sha();
    let mut config = fx.config();
    config.push_main_after_merge = false;

    let outcome = fx.pipeline(config).run(&fx.job("agent/w1/job-15", &sha)).await.unwrap();
    let MergeOutcome::Merged { new_head } = outcome else {
        panic!("expected merge, got {outcome:?}");
    };
    // Local integration branch advanced; the operator pushes later
    assert_eq!(git(&fx.work, &["rev-parse", "main"]), new_head);
    assert_eq!(fx.remote_main_sha(), base);
}

// ── Deterministic conflict (S2) ──────────────────────────────────────────────

#[tokio::test]
async fn conflict_against_unchanged_base_fails_without_retry() {
    let fx = fixture();
    let sha = fx.publish_branch("agent/w1/job-3", "README.md", "agent version\n");
    fx.advance_remote_main("README.md", "mainline version\n");
    let base = fx.remote_main_sha();

    let outcome = fx.pipeline(fx.config()).run(&fx.job("agent/w1/job-3", &sha)).await.unwrap();

    let MergeOutcome::Failed { error } = outcome else {
        panic!("expected deterministic failure, got {outcome:?}");
    };
    assert!(error.message.contains("merge conflict against unchanged base"));
    // Integration branch untouched
    assert_eq!(fx.remote_main_sha(), base);
    // Working tree left clean for the next pass
    assert!(fx.repo.status_clean().await.unwrap());
    let branches = git(&fx.work, &["branch", "--list", "_merge/*"]);
    assert!(branches.is_empty());
}

// ── Transient conflict (S3, classification level) ────────────────────────────

#[tokio::test]
async fn conflict_with_moved_base_requeues() {
    let fx = fixture();
    let base_before = fx.remote_main_sha();
    // Base moves after the snapshot was taken
    fx.advance_remote_main("other.txt", "x\n");

    let pipeline = fx.pipeline(fx.config());
    let job = fx.job("agent/w1/job-4", "deadbeef");
    let conflict = pp_git::GitError::Conflict {
        label: "git merge --no-ff".into(),
        output: "CONFLICT (content): README.md".into(),
    };
    let outcome = pipeline
        .classify_conflict(&job, "origin/main", &base_before, &conflict)
        .await;
    let Ok(MergeOutcome::Requeue { reason }) = outcome else {
        panic!("expected requeue");
    };
    assert!(reason.contains("advanced during merge"));
}

#[tokio::test]
async fn moved_base_with_exhausted_attempts_skips() {
    let fx = fixture();
    let base_before = fx.remote_main_sha();
    fx.advance_remote_main("other.txt", "x\n");

    let pipeline = fx.pipeline(fx.config());
    let mut job = fx.job("agent/w1/job-5", "deadbeef");
    job.attempts = 3;
    let conflict = pp_git::GitError::Conflict {
        label: "git merge --no-ff".into(),
        output: "CONFLICT".into(),
    };
    let outcome = pipeline
        .classify_conflict(&job, "origin/main", &base_before, &conflict)
        .await
        .unwrap_or_else(|_| panic!("classification errored"));
    assert!(matches!(
        outcome,
        MergeOutcome::Skipped { reason: SkipReason::AttemptsExhausted { .. } }
    ));
}

// ── Validation skips ─────────────────────────────────────────────────────────

#[tokio::test]
async fn deleted_branch_skips() {
    let fx = fixture();
    let sha = fx.publish_branch("agent/w1/job-6", "gone.txt", "g\n");
    git(&fx.work, &["push", "--quiet", "origin", "--delete", "refs/heads/agent/w1/job-6"]);

    let outcome = fx.pipeline(fx.config()).run(&fx.job("agent/w1/job-6", &sha)).await.unwrap();
    assert_eq!(outcome, MergeOutcome::Skipped { reason: SkipReason::BranchDeleted });
}

#[tokio::test]
async fn advanced_branch_skips_in_favor_of_newer_job() {
    let fx = fixture();
    let old = fx.publish_branch("agent/w1/job-7", "v.txt", "v1\n");
    let new = fx.publish_branch("agent/w1/job-7", "v.txt", "v2\n");

    let outcome = fx.pipeline(fx.config()).run(&fx.job("agent/w1/job-7", &old)).await.unwrap();
    assert_eq!(
        outcome,
        MergeOutcome::Skipped { reason: SkipReason::BranchAdvanced { tip: new } }
    );
}

#[tokio::test]
async fn already_merged_branch_skips() {
    let fx = fixture();
    // The branch points at main's tip: nothing to merge
    let sha = fx.remote_main_sha();
    git(&fx.work, &["push", "--quiet", "origin", "main:refs/heads/agent/w1/job-8"]);

    let outcome = fx.pipeline(fx.config()).run(&fx.job("agent/w1/job-8", &sha)).await.unwrap();
    assert_eq!(outcome, MergeOutcome::Skipped { reason: SkipReason::AlreadyMerged });
}

// ── Checks ───────────────────────────────────────────────────────────────────

#[tokio::test]
async fn failing_check_requeues_while_attempts_remain() {
    let fx = fixture();
    let sha = fx.publish_branch("agent/w1/job-9", "c.txt", "c\n");
    let base = fx.remote_main_sha();
    let mut config = fx.config();
    config.checks = vec!["test -f c.txt".into(), "false".into()];

    let outcome = fx.pipeline(config).run(&fx.job("agent/w1/job-9", &sha)).await.unwrap();
    let MergeOutcome::Requeue { reason } = outcome else {
        panic!("expected requeue, got {outcome:?}");
    };
    assert!(reason.contains("check `false`"));
    // Checks failed → main never advanced
    assert_eq!(fx.remote_main_sha(), base);
}

#[tokio::test]
async fn failing_check_with_exhausted_attempts_skips() {
    let fx = fixture();
    let sha = fx.publish_branch("agent/w1/job-10", "c.txt", "c\n");
    let mut config = fx.config();
    config.checks = vec!["false".into()];

    let mut job = fx.job("agent/w1/job-10", &sha);
    job.attempts = 3;
    let outcome = fx.pipeline(config).run(&job).await.unwrap();
    assert!(matches!(
        outcome,
        MergeOutcome::Skipped { reason: SkipReason::AttemptsExhausted { .. } }
    ));
}

#[tokio::test]
async fn checks_run_on_the_merged_tree() {
    let fx = fixture();
    let sha = fx.publish_branch("agent/w1/job-11", "new-file.txt", "hi\n");
    let mut config = fx.config();
    // Passes only if the merge brought new-file.txt into the tree
    config.checks = vec!["test -f new-file.txt".into()];

    let outcome = fx.pipeline(config).run(&fx.job("agent/w1/job-11", &sha)).await.unwrap();
    assert!(matches!(outcome, MergeOutcome::Merged { .. }));
}

// ── Dry run ──────────────────────────────────────────────────────────────────

#[tokio::test]
async fn dry_run_stops_after_checks() {
    let fx = fixture();
    let sha = fx.publish_branch("agent/w1/job-12", "d.txt", "d\n");
    let base = fx.remote_main_sha();
    let mut config = fx.config();
    config.dry_run = true;

    let outcome = fx.pipeline(config).run(&fx.job("agent/w1/job-12", &sha)).await.unwrap();
    assert_eq!(outcome, MergeOutcome::DryRun { would_merge: sha });
    assert_eq!(fx.remote_main_sha(), base);
}

// ── Fatal configuration ──────────────────────────────────────────────────────

#[tokio::test]
async fn dirty_tree_is_fatal_unless_skipped() {
    let fx = fixture();
    let sha = fx.publish_branch("agent/w1/job-13", "e.txt", "e\n");
    std::fs::write(fx.work.join("junk.txt"), "dirt\n").unwrap();

    let err = fx.pipeline(fx.config()).run(&fx.job("agent/w1/job-13", &sha)).await.unwrap_err();
    assert!(matches!(err, PusherError::Fatal(_)));

    let mut config = fx.config();
    config.skip_clean_check = true;
    // Reset clobbers the junk and the pass proceeds
    let outcome = fx.pipeline(config).run(&fx.job("agent/w1/job-13", &sha)).await.unwrap();
    assert!(matches!(outcome, MergeOutcome::Merged { .. }));
}

#[tokio::test]
async fn delete_after_merge_removes_remote_branch() {
    let fx = fixture();
    let sha = fx.publish_branch("agent/w1/job-14", "f.txt", "f\n");
    let mut config = fx.config();
    config.delete_after_merge = true;

    let outcome = fx.pipeline(config).run(&fx.job("agent/w1/job-14", &sha)).await.unwrap();
    assert!(matches!(outcome, MergeOutcome::Merged { .. }));
    let refs = fx.repo.ls_remote("origin", "refs/heads/agent/*").await.unwrap();
    assert!(refs.is_empty(), "agent branch still on remote: {refs:?}");
}
