// SPDX-License-Identifier: BUSL-1.1
// Copyright (c) 2026 Alfred Jean LLC

//! Pluggable merge-candidate sources.
//!
//! Two source-of-truth modes exist in deployments: polling the remote for
//! published agent branches, and claiming completions from the
//! coordination server. Both feed the same merge queue; the pipeline never
//! knows which one is wired in.

use crate::pipeline::MergeOutcome;
use async_trait::async_trait;
use pp_core::MergeJob;
use pp_git::Repo;
use pp_storage::Store;
use serde::Deserialize;
use std::collections::HashMap;
use thiserror::Error;
use tracing::{debug, info, warn};

#[derive(Debug, Error)]
pub enum SourceError {
    #[error(transparent)]
    Git(#[from] pp_git::GitError),

    #[error("server: {0}")]
    Http(#[from] reqwest::Error),

    #[error(transparent)]
    Storage(#[from] pp_storage::StorageError),
}

/// Discovers merge candidates and hears about their outcomes.
#[async_trait]
pub trait CompletionSource: Send {
    /// Scan for new work and enqueue merge jobs. Returns how many new jobs
    /// were enqueued.
    async fn discover(&mut self, store: &mut Store, now_ms: u64) -> Result<usize, SourceError>;

    /// Report a terminal outcome upstream (no-op for remote scanning).
    async fn acknowledge(
        &mut self,
        job: &MergeJob,
        outcome: &MergeOutcome,
    ) -> Result<(), SourceError>;
}

// ── Remote scan ──────────────────────────────────────────────────────────────

/// Discovers work by listing remote refs under the agent prefix and
/// diffing against the `seen_branches` table.
pub struct RemoteScanSource {
    repo: Repo,
    remote: String,
    prefix: String,
    max_attempts: u32,
}

impl RemoteScanSource {
    pub fn new(repo: Repo, remote: impl Into<String>, prefix: impl Into<String>, max_attempts: u32) -> Self {
        Self { repo, remote: remote.into(), prefix: prefix.into(), max_attempts }
    }
}

#[async_trait]
impl CompletionSource for RemoteScanSource {
    async fn discover(&mut self, store: &mut Store, now_ms: u64) -> Result<usize, SourceError> {
        let pattern = format!("{}*", self.prefix);
        let refs = self.repo.ls_remote(&self.remote, &pattern).await?;
        let mut enqueued = 0;
        for (name, sha) in refs {
            // `seen` avoids re-issuing enqueues every poll; the queue's
            // unique key makes the enqueue itself idempotent regardless.
            if store.seen_sha(&self.remote, &name)?.as_deref() == Some(sha.as_str()) {
                continue;
            }
            let receipt = store.enqueue_merge_job(
                &self.remote,
                &name,
                &sha,
                0,
                self.max_attempts,
                now_ms,
            )?;
            if receipt.created {
                info!(branch = %name, sha = %pp_core::time_fmt::short(&sha, 7), "discovered branch");
                enqueued += 1;
            }
        }
        debug!(enqueued, "remote scan done");
        Ok(enqueued)
    }

    async fn acknowledge(
        &mut self,
        _job: &MergeJob,
        _outcome: &MergeOutcome,
    ) -> Result<(), SourceError> {
        Ok(())
    }
}

// ── Server claim ─────────────────────────────────────────────────────────────

/// The subset of the claimed completion item the pusher needs.
#[derive(Debug, Deserialize)]
struct ClaimedCompletion {
    id: String,
    commit_ref: String,
    branch_ref: String,
}

#[derive(Debug, Deserialize)]
struct ClaimResponse {
    ok: bool,
    #[serde(default)]
    item: Option<ClaimedCompletion>,
}

/// Claims completions over HTTP from the coordination server and mirrors
/// them into the local merge queue.
pub struct ServerClaimSource {
    client: reqwest::Client,
    base_url: String,
    auth_token: Option<String>,
    remote: String,
    max_attempts: u32,
    /// merge-job key → upstream completion id, for acknowledgements.
    pending: HashMap<String, String>,
}

impl ServerClaimSource {
    pub fn new(
        base_url: impl Into<String>,
        auth_token: Option<String>,
        remote: impl Into<String>,
        max_attempts: u32,
    ) -> Self {
        Self {
            client: reqwest::Client::new(),
            base_url: base_url.into(),
            auth_token,
            remote: remote.into(),
            max_attempts,
            pending: HashMap::new(),
        }
    }

    fn request(&self, path: &str) -> reqwest::RequestBuilder {
        let mut req = self.client.post(format!("{}{path}", self.base_url));
        if let Some(token) = &self.auth_token {
            req = req.bearer_auth(token);
        }
        req
    }

    fn job_key(remote: &str, branch: &str, sha: &str) -> String {
        format!("{remote}\u{1}{branch}\u{1}{sha}")
    }
}

#[async_trait]
impl CompletionSource for ServerClaimSource {
    async fn discover(&mut self, store: &mut Store, now_ms: u64) -> Result<usize, SourceError> {
        let mut enqueued = 0;
        // Drain everything claimable this tick; the server hands out one
        // completion per claim call.
        loop {
            let response: ClaimResponse = self
                .request("/completions/claim")
                .json(&serde_json::json!({ "workerId": "serial-pusher" }))
                .send()
                .await?
                .error_for_status()?
                .json()
                .await?;
            let Some(completion) = response.item.filter(|_| response.ok) else {
                break;
            };
            let receipt = store.enqueue_merge_job(
                &self.remote,
                &completion.branch_ref,
                &completion.commit_ref,
                0,
                self.max_attempts,
                now_ms,
            )?;
            self.pending.insert(
                Self::job_key(&self.remote, &completion.branch_ref, &completion.commit_ref),
                completion.id,
            );
            if receipt.created {
                enqueued += 1;
            }
        }
        Ok(enqueued)
    }

    async fn acknowledge(
        &mut self,
        job: &MergeJob,
        outcome: &MergeOutcome,
    ) -> Result<(), SourceError> {
        let key = Self::job_key(&job.remote, &job.branch, &job.head_sha);
        let Some(completion_id) = self.pending.remove(&key) else {
            return Ok(());
        };
        let result = match outcome {
            MergeOutcome::Merged { new_head } => {
                self.request(&format!("/completions/{completion_id}/complete"))
                    .json(&serde_json::json!({
                        "summary": format!("merged as {new_head}"),
                        "artifacts": { "newHead": new_head },
                    }))
                    .send()
                    .await
            }
            MergeOutcome::Failed { error } => {
                self.request(&format!("/completions/{completion_id}/fail"))
                    .json(&serde_json::json!({
                        "message": error.message,
                        "detail": error.detail,
                    }))
                    .send()
                    .await
            }
            // Requeues and skips stay local; the upstream completion is
            // still claimed by this pusher and will be re-reported when a
            // terminal pass happens.
            _ => {
                self.pending.insert(key, completion_id);
                return Ok(());
            }
        };
        if let Err(e) = result {
            warn!(error = %e, "failed to acknowledge completion upstream");
        }
        Ok(())
    }
}

#[cfg(test)]
#[path = "source_tests.rs"]
mod tests;
