// SPDX-License-Identifier: BUSL-1.1
// Copyright (c) 2026 Alfred Jean LLC

//! The serial merge pipeline.
//!
//! One pass per claimed merge job:
//!
//! ```text
//! reset-clean → update-main → validate-job-sha → already-merged?
//!            → create-temp-branch → merge-into-temp → run-checks
//!            → fast-forward-main → push-main → delete-remote-branch? → cleanup
//! ```
//!
//! Transitions are linear on success; cleanup runs on every exit path.
//! Failures classify as skip (stale job), requeue (transient), or fail
//! (deterministic) — a deterministic conflict against an unchanged base is
//! never retried, and the integration branch never advances unless checks
//! passed on the exact merged tree.

use crate::config::PusherConfig;
use crate::error::PusherError;
use pp_core::{ErrorBlob, MergeJob, MergeStrategy};
use pp_git::{retry, run_with_timeout, Backoff, GitError, MergeKind, Repo};
use serde_json::json;
use tracing::{info, warn};

/// Terminal classification of one pipeline pass.
#[derive(Debug, Clone, PartialEq)]
pub enum MergeOutcome {
    /// Checks passed and the integration branch advanced.
    Merged { new_head: String },
    /// The job is stale or out of attempts; terminal without retry.
    Skipped { reason: SkipReason },
    /// Transient condition; the job goes back to pending.
    Requeue { reason: String },
    /// Deterministic failure; never retried.
    Failed { error: ErrorBlob },
    /// Dry-run stopped after checks; nothing was advanced.
    DryRun { would_merge: String },
}

#[derive(Debug, Clone, PartialEq)]
pub enum SkipReason {
    /// The published branch no longer exists on the remote.
    BranchDeleted,
    /// The branch tip moved past the pinned sha; a newer job covers it.
    BranchAdvanced { tip: String },
    /// The pinned commit is already an ancestor of the integration branch.
    AlreadyMerged,
    /// Attempts exhausted on a retryable failure.
    AttemptsExhausted { detail: String },
}

impl SkipReason {
    pub fn as_blob(&self) -> ErrorBlob {
        match self {
            Self::BranchDeleted => ErrorBlob::new("skipped: branch deleted on remote"),
            Self::BranchAdvanced { tip } => ErrorBlob::with_detail(
                "skipped: branch advanced past pinned sha",
                json!({ "tip": tip }),
            ),
            Self::AlreadyMerged => ErrorBlob::new("skipped: already merged"),
            Self::AttemptsExhausted { detail } => ErrorBlob::with_detail(
                "skipped: attempts exhausted",
                json!({ "detail": detail }),
            ),
        }
    }
}

/// Error flow inside one pass: fatal aborts the daemon, git errors fold
/// into a `Failed` outcome at the boundary.
enum StepError {
    Fatal(String),
    Git(GitError),
}

impl From<GitError> for StepError {
    fn from(e: GitError) -> Self {
        Self::Git(e)
    }
}

pub struct Pipeline {
    repo: Repo,
    config: PusherConfig,
}

impl Pipeline {
    pub fn new(repo: Repo, config: PusherConfig) -> Self {
        Self { repo, config }
    }

    /// Drive one claimed merge job through a full pass.
    ///
    /// `Err` is reserved for fatal misconfiguration; every job-level
    /// failure comes back as an outcome.
    pub async fn run(&self, job: &MergeJob) -> Result<MergeOutcome, PusherError> {
        let temp_branch = format!("_merge/{}", job.id);
        let result = self.run_inner(job, &temp_branch).await;
        // On success the advanced integration branch IS the result; only
        // non-merged passes roll the local branch back to the remote ref.
        let keep_main = matches!(result, Ok(MergeOutcome::Merged { .. }));
        self.cleanup(&temp_branch, keep_main).await;
        match result {
            Ok(outcome) => {
                info!(job = %job.describe(), outcome = outcome_tag(&outcome), "pipeline pass done");
                Ok(outcome)
            }
            Err(StepError::Fatal(message)) => Err(PusherError::Fatal(message)),
            Err(StepError::Git(e)) => Ok(MergeOutcome::Failed {
                error: ErrorBlob::with_detail(
                    format!("pipeline git failure: {e}"),
                    json!({ "job": job.describe() }),
                ),
            }),
        }
    }

    async fn run_inner(
        &self,
        job: &MergeJob,
        temp_branch: &str,
    ) -> Result<MergeOutcome, StepError> {
        let remote_main = self.config.remote_main_ref();

        // 1. reset-clean
        self.repo.abort_in_progress().await;
        if !self.config.skip_clean_check && !self.repo.status_clean().await? {
            return Err(StepError::Fatal(format!(
                "working tree at {} is dirty; refusing to merge (use skip-clean-check to override)",
                self.repo.root().display()
            )));
        }
        self.ensure_remote_main(&remote_main).await?;
        self.repo.checkout_reset(&self.config.main_branch, &remote_main).await?;

        // 2. update-main (transient surface: retried with capped backoff)
        let repo = &self.repo;
        let remote = self.config.remote.clone();
        retry("git fetch", &Backoff::default(), || repo.fetch_prune(&remote))
            .await
            .map_err(|e| {
                StepError::Fatal(format!("remote '{}' unreachable: {e}", self.config.remote))
            })?;
        self.repo.reset_hard(&remote_main).await?;
        let main_before = self.repo.require_ref(&remote_main).await?;

        // 3. validate-job-sha
        let branch_ref = qualify_ref(&job.branch);
        let tip = self.remote_tip(&job.remote, &branch_ref).await?;
        let Some(tip) = tip else {
            return Ok(MergeOutcome::Skipped { reason: SkipReason::BranchDeleted });
        };
        if tip != job.head_sha {
            return Ok(MergeOutcome::Skipped { reason: SkipReason::BranchAdvanced { tip } });
        }
        // Bring the pinned commit's objects local.
        self.repo.fetch_ref(&job.remote, &branch_ref).await?;

        // 4. already-merged?
        if self.repo.is_ancestor(&job.head_sha, &main_before).await? {
            return Ok(MergeOutcome::Skipped { reason: SkipReason::AlreadyMerged });
        }

        // 5. create-temp-branch
        self.repo.checkout_reset(temp_branch, &main_before).await?;

        // 6. merge-into-temp
        let message = format!("Merge {} ({})", job.branch, pp_core::iso_ms(job.enqueued_at_ms));
        let kind = merge_kind(self.config.merge_strategy);
        if let Err(e) = self.repo.merge(kind, &job.head_sha, &message).await {
            if !e.is_conflict() {
                return Err(e.into());
            }
            self.repo.abort_in_progress().await;
            return Ok(self.classify_conflict(job, &remote_main, &main_before, &e).await?);
        }

        // 7. run-checks
        if let Some(outcome) = self.run_checks(job).await? {
            return Ok(outcome);
        }
        if self.config.dry_run {
            return Ok(MergeOutcome::DryRun { would_merge: job.head_sha.clone() });
        }

        // 8. fast-forward-main
        self.repo.checkout(&self.config.main_branch).await?;
        if let Err(first) = self.repo.fast_forward(temp_branch).await {
            // Unexpected: temp was branched from <remote>/<main>. Resync and
            // retry once after verifying main is still behind temp.
            warn!(error = %first, "fast-forward failed, resyncing once");
            self.repo.fetch_prune(&job.remote).await?;
            self.repo.reset_hard(&remote_main).await?;
            let behind = self.repo.is_ancestor(&self.config.main_branch, temp_branch).await?;
            if !behind || self.repo.fast_forward(temp_branch).await.is_err() {
                return Ok(MergeOutcome::Failed {
                    error: ErrorBlob::with_detail(
                        "integration branch cannot fast-forward to validated tree",
                        json!({ "temp_branch": temp_branch, "first_error": first.to_string() }),
                    ),
                });
            }
        }
        let new_head = self.repo.require_ref(&self.config.main_branch).await?;

        // 9. push-main
        if self.config.push_main_after_merge {
            if let Some(outcome) = self.push_main(&remote_main).await? {
                return Ok(outcome);
            }
        }

        // 10. delete-remote-branch (best-effort; the merge already landed)
        if self.config.delete_after_merge {
            if let Err(e) = self.repo.push_delete(&job.remote, &branch_ref).await {
                warn!(branch = %job.branch, error = %e, "failed to delete merged branch");
            }
        }

        Ok(MergeOutcome::Merged { new_head })
    }

    /// Conflict classification: base moved → transient, base unchanged →
    /// deterministic. Exhausted attempts downgrade a requeue to a skip.
    async fn classify_conflict(
        &self,
        job: &MergeJob,
        remote_main: &str,
        main_before: &str,
        conflict: &GitError,
    ) -> Result<MergeOutcome, StepError> {
        self.repo.fetch_prune(&job.remote).await?;
        let main_now = self.repo.require_ref(remote_main).await?;
        if main_now != main_before {
            if job.attempts_exhausted() {
                return Ok(MergeOutcome::Skipped {
                    reason: SkipReason::AttemptsExhausted { detail: conflict.to_string() },
                });
            }
            return Ok(MergeOutcome::Requeue {
                reason: format!(
                    "integration branch advanced during merge ({} → {})",
                    pp_core::time_fmt::short(main_before, 7),
                    pp_core::time_fmt::short(&main_now, 7)
                ),
            });
        }
        Ok(MergeOutcome::Failed {
            error: ErrorBlob::with_detail(
                format!("merge conflict against unchanged base: {}", job.describe()),
                json!({ "output": conflict.to_string(), "base": main_before }),
            ),
        })
    }

    /// Run configured checks in order, fail-fast. `Some(outcome)` aborts
    /// the pass; `None` means all checks passed.
    async fn run_checks(&self, job: &MergeJob) -> Result<Option<MergeOutcome>, StepError> {
        for check in &self.config.checks {
            let mut cmd = tokio::process::Command::new("sh");
            cmd.args(["-c", check]).current_dir(self.repo.root());
            let label = format!("check `{check}`");
            let result = run_with_timeout(cmd, self.config.check_timeout, &label).await;

            let failure = match result {
                Ok(out) if out.success() => continue,
                Ok(out) => format!(
                    "{label} exited {:?}: {}",
                    out.code,
                    pp_core::time_fmt::short(out.combined().trim(), 2_000)
                ),
                Err(e) => e.to_string(),
            };
            warn!(job = %job.describe(), failure = %failure, "check failed");
            if job.attempts_exhausted() {
                return Ok(Some(MergeOutcome::Skipped {
                    reason: SkipReason::AttemptsExhausted { detail: failure },
                }));
            }
            return Ok(Some(MergeOutcome::Requeue { reason: failure }));
        }
        Ok(None)
    }

    /// Push the advanced integration branch. `Some(outcome)` means the
    /// push did not land.
    async fn push_main(&self, remote_main: &str) -> Result<Option<MergeOutcome>, StepError> {
        let dst = format!("refs/heads/{}", self.config.main_branch);
        let Err(e) = self.repo.push(&self.config.remote, &self.config.main_branch, &dst).await
        else {
            return Ok(None);
        };

        // Rejected: disambiguate remote-ahead (transient) from everything
        // else (auth/permissions → deterministic).
        self.repo.fetch_prune(&self.config.remote).await?;
        let remote_sha = self.repo.require_ref(remote_main).await?;
        let remote_is_behind =
            self.repo.is_ancestor(&remote_sha, &self.config.main_branch).await?;
        if !remote_is_behind {
            return Ok(Some(MergeOutcome::Requeue {
                reason: format!("push rejected: remote advanced to {remote_sha}"),
            }));
        }
        Ok(Some(MergeOutcome::Failed {
            error: ErrorBlob::with_detail(
                "push rejected with remote not ahead (auth or permissions)",
                json!({ "error": e.to_string() }),
            ),
        }))
    }

    /// Make sure the remote-tracking integration ref exists; optionally
    /// bootstrap it from the local branch.
    async fn ensure_remote_main(&self, remote_main: &str) -> Result<(), StepError> {
        if self.repo.rev_parse(remote_main).await?.is_some() {
            return Ok(());
        }
        if !self.config.auto_create_main_branch {
            return Err(StepError::Fatal(format!(
                "remote-tracking ref '{remote_main}' missing; set auto-create-main-branch to bootstrap"
            )));
        }
        let local = self
            .repo
            .rev_parse(&self.config.main_branch)
            .await?
            .ok_or_else(|| {
                StepError::Fatal(format!(
                    "cannot bootstrap '{remote_main}': local '{}' missing",
                    self.config.main_branch
                ))
            })?;
        info!(sha = %pp_core::time_fmt::short(&local, 7), "bootstrapping integration branch");
        let dst = format!("refs/heads/{}", self.config.main_branch);
        self.repo.push(&self.config.remote, &self.config.main_branch, &dst).await?;
        self.repo.fetch_prune(&self.config.remote).await?;
        Ok(())
    }

    async fn remote_tip(
        &self,
        remote: &str,
        branch_ref: &str,
    ) -> Result<Option<String>, StepError> {
        let refs = self.repo.ls_remote(remote, branch_ref).await?;
        Ok(refs.into_iter().find(|(name, _)| name == branch_ref).map(|(_, sha)| sha))
    }

    /// Always runs: abort anything in progress, park back on the
    /// integration branch, delete the temp branch. `keep_main` skips the
    /// rollback to the remote-tracking ref after a successful merge.
    async fn cleanup(&self, temp_branch: &str, keep_main: bool) {
        self.repo.abort_in_progress().await;
        let remote_main = self.config.remote_main_ref();
        if let Err(e) = self.repo.checkout(&self.config.main_branch).await {
            warn!(error = %e, "cleanup: checkout failed");
        }
        if !keep_main
            && self.repo.rev_parse(&remote_main).await.ok().flatten().is_some()
        {
            if let Err(e) = self.repo.reset_hard(&remote_main).await {
                warn!(error = %e, "cleanup: reset failed");
            }
        }
        match self.repo.rev_parse(temp_branch).await {
            Ok(Some(_)) => {
                if let Err(e) = self.repo.delete_branch(temp_branch).await {
                    warn!(branch = temp_branch, error = %e, "cleanup: temp branch not deleted");
                }
            }
            Ok(None) => {}
            Err(e) => warn!(error = %e, "cleanup: rev-parse failed"),
        }
    }
}

/// Normalize a branch name to a full ref.
fn qualify_ref(branch: &str) -> String {
    if branch.starts_with("refs/") {
        branch.to_string()
    } else {
        format!("refs/heads/{branch}")
    }
}

fn merge_kind(strategy: MergeStrategy) -> MergeKind {
    match strategy {
        MergeStrategy::FfOnly => MergeKind::FfOnly,
        MergeStrategy::NoFf => MergeKind::NoFf,
        MergeStrategy::CherryPick => MergeKind::CherryPick,
    }
}

fn outcome_tag(outcome: &MergeOutcome) -> &'static str {
    match outcome {
        MergeOutcome::Merged { .. } => "merged",
        MergeOutcome::Skipped { .. } => "skipped",
        MergeOutcome::Requeue { .. } => "requeue",
        MergeOutcome::Failed { .. } => "failed",
        MergeOutcome::DryRun { .. } => "dry-run",
    }
}

#[cfg(test)]
#[path = "pipeline_tests.rs"]
mod tests;
