// SPDX-License-Identifier: BUSL-1.1
// Copyright (c) 2026 Alfred Jean LLC

//! Shared fixtures for the scenario specs.

#![allow(dead_code)]

use std::path::{Path, PathBuf};
use std::process::Command;
use std::time::Duration;
use tempfile::TempDir;

pub use pp_core::test_support::{completion_spec, job_spec, job_spec_at};

/// Run a git command, panicking on failure.
pub fn git(dir: &Path, args: &[&str]) -> String {
    let out = Command::new("git")
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

/// A bare remote plus the pusher's working clone, seeded with one commit
/// pushed to `main`.
pub struct GitFixture {
    pub tmp: TempDir,
    pub work: PathBuf,
    pub remote: PathBuf,
}

impl GitFixture {
    pub fn new() -> Self {
        let tmp = TempDir::new().unwrap();
        let remote = tmp.path().join("remote.git");
        std::fs::create_dir(&remote).unwrap();
        git(&remote, &["init", "--quiet", "--bare", "-b", "main"]);

        let work = tmp.path().join("work");
        git(tmp.path(), &["clone", "--quiet", remote.to_str().unwrap(), "work"]);
        git(&work, &["config", "user.email", "specs@example.com"]);
        git(&work, &["config", "user.name", "Specs"]);
        git(&work, &["symbolic-ref", "HEAD", "refs/heads/main"]);
        std::fs::write(work.join("README.md"), "base\n").unwrap();
        git(&work, &["add", "."]);
        git(&work, &["commit", "--quiet", "-m", "init"]);
        git(&work, &["push", "--quiet", "origin", "main"]);
        Self { tmp, work, remote }
    }

    /// Publish a commit on top of current main under an agent ref.
    pub fn publish(&self, reference: &str, file: &str, contents: &str) -> String {
        std::fs::write(self.work.join(file), contents).unwrap();
        git(&self.work, &["add", "."]);
        git(&self.work, &["commit", "--quiet", "-m", &format!("publish {reference}")]);
        let sha = git(&self.work, &["rev-parse", "HEAD"]);
        git(&self.work, &["push", "--quiet", "origin", &format!("HEAD:{reference}")]);
        git(&self.work, &["reset", "--quiet", "--hard", "origin/main"]);
        sha
    }

    /// Land a commit directly on remote main (a competing writer).
    pub fn advance_remote_main(&self, file: &str, contents: &str) -> String {
        git(&self.work, &["checkout", "--quiet", "main"]);
        git(&self.work, &["reset", "--quiet", "--hard", "origin/main"]);
        std::fs::write(self.work.join(file), contents).unwrap();
        git(&self.work, &["add", "."]);
        git(&self.work, &["commit", "--quiet", "-m", "competing writer"]);
        let sha = git(&self.work, &["rev-parse", "HEAD"]);
        git(&self.work, &["push", "--quiet", "origin", "main"]);
        sha
    }

    pub fn remote_main_sha(&self) -> String {
        git(&self.work, &["fetch", "--quiet", "origin"]);
        git(&self.work, &["rev-parse", "origin/main"])
    }

    pub fn pusher_config(&self) -> pp_pusher::PusherConfig {
        pp_pusher::PusherConfig {
            repo_path: self.work.clone(),
            remote: "origin".into(),
            main_branch: "main".into(),
            branch_prefix: "refs/pushpals/agent/".into(),
            merge_strategy: pp_core::MergeStrategy::NoFf,
            checks: vec![],
            check_timeout: Duration::from_secs(60),
            git_timeout: Duration::from_secs(60),
            interval: Duration::from_secs(1),
            state_dir: self.tmp.path().join("state"),
            max_attempts: 3,
            delete_after_merge: false,
            push_main_after_merge: true,
            push_agent_branch: false,
            dry_run: false,
            skip_clean_check: false,
            auto_create_main_branch: false,
            isolate_worktree: false,
            source: pp_pusher::SourceMode::RemoteScan,
            server_url: None,
            auth_token: None,
        }
    }
}
