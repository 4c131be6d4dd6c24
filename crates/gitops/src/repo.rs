// SPDX-License-Identifier: BUSL-1.1
// Copyright (c) 2026 Alfred Jean LLC

//! Typed git operations over one working tree.
//!
//! The merge pipeline owns its repository exclusively (daemon file lock),
//! so none of these guard against concurrent writers.

use crate::error::GitError;
use crate::process::{run_with_timeout, CommandOutput};
use std::path::{Path, PathBuf};
use std::time::Duration;
use tokio::process::Command;

/// How commits land on the temp branch.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum MergeKind {
    FfOnly,
    NoFf,
    CherryPick,
}

/// Handle over a git working tree.
#[derive(Debug, Clone)]
pub struct Repo {
    root: PathBuf,
    timeout: Duration,
}

impl Repo {
    pub fn new(root: impl Into<PathBuf>, timeout: Duration) -> Self {
        Self { root: root.into(), timeout }
    }

    pub fn root(&self) -> &Path {
        &self.root
    }

    fn git(&self, args: &[&str]) -> Command {
        let mut cmd = Command::new("git");
        cmd.arg("-C").arg(&self.root).args(args);
        // The daemon may itself run inside a worktree/hook environment.
        cmd.env_remove("GIT_DIR").env_remove("GIT_WORK_TREE");
        cmd
    }

    async fn run(&self, args: &[&str], label: &str) -> Result<CommandOutput, GitError> {
        run_with_timeout(self.git(args), self.timeout, label).await
    }

    /// Run and require exit 0.
    async fn run_ok(&self, args: &[&str], label: &str) -> Result<CommandOutput, GitError> {
        let out = self.run(args, label).await?;
        if !out.success() {
            return Err(GitError::Command {
                label: label.to_string(),
                code: out.code,
                stderr: out.combined().trim().to_string(),
            });
        }
        Ok(out)
    }

    // ── Queries ─────────────────────────────────────────────────────────

    /// Resolve a ref to a sha; `None` when it does not exist.
    pub async fn rev_parse(&self, reference: &str) -> Result<Option<String>, GitError> {
        let out = self
            .run(&["rev-parse", "--verify", "--quiet", reference], "git rev-parse")
            .await?;
        if out.success() {
            Ok(Some(out.stdout.trim().to_string()))
        } else {
            Ok(None)
        }
    }

    /// Resolve a ref that must exist.
    pub async fn require_ref(&self, reference: &str) -> Result<String, GitError> {
        self.rev_parse(reference)
            .await?
            .ok_or_else(|| GitError::MissingRef(reference.to_string()))
    }

    /// Whether `ancestor` is an ancestor of `descendant`.
    pub async fn is_ancestor(
        &self,
        ancestor: &str,
        descendant: &str,
    ) -> Result<bool, GitError> {
        let out = self
            .run(
                &["merge-base", "--is-ancestor", ancestor, descendant],
                "git merge-base --is-ancestor",
            )
            .await?;
        match out.code {
            Some(0) => Ok(true),
            Some(1) => Ok(false),
            code => Err(GitError::Command {
                label: "git merge-base --is-ancestor".into(),
                code,
                stderr: out.combined().trim().to_string(),
            }),
        }
    }

    /// True when the working tree has no uncommitted changes.
    pub async fn status_clean(&self) -> Result<bool, GitError> {
        let out = self.run_ok(&["status", "--porcelain"], "git status").await?;
        Ok(out.stdout.trim().is_empty())
    }

    /// Remote refs matching a prefix, as `(refname, sha)` pairs.
    pub async fn ls_remote(
        &self,
        remote: &str,
        pattern: &str,
    ) -> Result<Vec<(String, String)>, GitError> {
        let out = self.run_ok(&["ls-remote", remote, pattern], "git ls-remote").await?;
        let mut refs = Vec::new();
        for line in out.stdout.lines() {
            let mut parts = line.split_whitespace();
            if let (Some(sha), Some(name)) = (parts.next(), parts.next()) {
                refs.push((name.to_string(), sha.to_string()));
            }
        }
        Ok(refs)
    }

    // ── Mutations ───────────────────────────────────────────────────────

    pub async fn fetch_prune(&self, remote: &str) -> Result<(), GitError> {
        self.run_ok(&["fetch", "--prune", remote], "git fetch").await?;
        Ok(())
    }

    /// Fetch a single ref's objects (no tracking ref needed).
    pub async fn fetch_ref(&self, remote: &str, reference: &str) -> Result<(), GitError> {
        self.run_ok(&["fetch", remote, reference], "git fetch ref").await?;
        Ok(())
    }

    pub async fn checkout(&self, reference: &str) -> Result<(), GitError> {
        self.run_ok(&["checkout", "--quiet", reference], "git checkout").await?;
        Ok(())
    }

    /// `checkout -B branch start_point` — create or reset the branch.
    pub async fn checkout_reset(
        &self,
        branch: &str,
        start_point: &str,
    ) -> Result<(), GitError> {
        self.run_ok(
            &["checkout", "--quiet", "-B", branch, start_point],
            "git checkout -B",
        )
        .await?;
        Ok(())
    }

    pub async fn reset_hard(&self, reference: &str) -> Result<(), GitError> {
        self.run_ok(&["reset", "--hard", "--quiet", reference], "git reset --hard").await?;
        Ok(())
    }

    /// Merge `reference` into the current branch.
    pub async fn merge(
        &self,
        kind: MergeKind,
        reference: &str,
        message: &str,
    ) -> Result<(), GitError> {
        let (out, label) = match kind {
            MergeKind::FfOnly => (
                self.run(&["merge", "--ff-only", reference], "git merge --ff-only").await?,
                "git merge --ff-only",
            ),
            MergeKind::NoFf => (
                self.run(&["merge", "--no-ff", "-m", message, reference], "git merge --no-ff")
                    .await?,
                "git merge --no-ff",
            ),
            MergeKind::CherryPick => {
                return self.cherry_pick_onto(reference).await;
            }
        };
        classify_merge(out, label)
    }

    /// Replay `reference`'s commits not on HEAD, oldest first.
    async fn cherry_pick_onto(&self, reference: &str) -> Result<(), GitError> {
        let range = format!("HEAD..{reference}");
        let out = self
            .run(&["cherry-pick", "--allow-empty", &range], "git cherry-pick")
            .await?;
        classify_merge(out, "git cherry-pick")
    }

    /// Fast-forward the current branch to `reference`; refuses non-ff.
    pub async fn fast_forward(&self, reference: &str) -> Result<(), GitError> {
        self.run_ok(&["merge", "--ff-only", reference], "git merge --ff-only").await?;
        Ok(())
    }

    /// Abort any in-progress merge / rebase / cherry-pick. Failures are
    /// ignored — there may be nothing to abort.
    pub async fn abort_in_progress(&self) {
        let _ = self.run(&["merge", "--abort"], "git merge --abort").await;
        let _ = self.run(&["rebase", "--abort"], "git rebase --abort").await;
        let _ = self.run(&["cherry-pick", "--abort"], "git cherry-pick --abort").await;
    }

    pub async fn delete_branch(&self, branch: &str) -> Result<(), GitError> {
        self.run_ok(&["branch", "-D", branch], "git branch -D").await?;
        Ok(())
    }

    /// Push `src` to `dst` on the remote. Non-fast-forward rejections come
    /// back as `Command` errors for the caller to disambiguate.
    pub async fn push(&self, remote: &str, src: &str, dst: &str) -> Result<(), GitError> {
        let refspec = format!("{src}:{dst}");
        self.run_ok(&["push", remote, &refspec], "git push").await?;
        Ok(())
    }

    pub async fn push_delete(&self, remote: &str, reference: &str) -> Result<(), GitError> {
        self.run_ok(&["push", remote, "--delete", reference], "git push --delete").await?;
        Ok(())
    }
}

/// Distinguish conflicts from other merge failures.
fn classify_merge(out: CommandOutput, label: &str) -> Result<(), GitError> {
    if out.success() {
        return Ok(());
    }
    let combined = out.combined();
    let conflict = combined.contains("CONFLICT")
        || combined.contains("Automatic merge failed")
        || combined.contains("could not apply");
    if conflict {
        Err(GitError::Conflict { label: label.to_string(), output: combined.trim().to_string() })
    } else {
        Err(GitError::Command {
            label: label.to_string(),
            code: out.code,
            stderr: combined.trim().to_string(),
        })
    }
}

#[cfg(test)]
#[path = "repo_tests.rs"]
mod tests;
